/// User-visible notifications emitted over the client's broadcast
/// channel. A UI layer renders these as toasts, progress labels, etc.
#[derive(Debug, Clone)]
pub enum MirrorEvent {
    /// Cumulative probe progress, 0..=100, advanced once per candidate
    /// whether the candidate passed or failed.
    ProbeProgress { percent: u8 },
    /// The probe run finished; reports how many new options were added
    /// and the approximate network bytes spent on probing.
    ProbeCompleted {
        candidates_added: usize,
        data_usage: u64,
    },
    /// A probe run stopped early at a cancellation checkpoint.
    ProbeAborted,
    /// Playback resolved successfully; names the serving instance.
    NowServing { instance_name: String },
    /// Terminal playback failure (exhaustion or missing audio format).
    PlaybackFailed { reason: String },
}

impl MirrorEvent {
    /// Short human-readable rendering, suitable for a toast.
    pub fn notification(&self) -> String {
        match self {
            MirrorEvent::ProbeProgress { percent } => format!("{}%", percent),
            MirrorEvent::ProbeCompleted {
                candidates_added,
                data_usage,
            } => format!(
                "Regenerated instances: {} added, {} used",
                candidates_added,
                crate::utils::format_bytes(*data_usage)
            ),
            MirrorEvent::ProbeAborted => "Abruptly stopped".to_string(),
            MirrorEvent::NowServing { instance_name } => {
                format!("Playing audio via {}", instance_name)
            }
            MirrorEvent::PlaybackFailed { reason } => format!("Error: {}", reason),
        }
    }
}
