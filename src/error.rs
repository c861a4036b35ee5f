use thiserror::Error;

// Error taxonomy: per-candidate (transient) failures are contained inside
// the probe/resolve loops and logged; only directory-fetch failures,
// aborts and total exhaustion reach callers.
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    ParseFailed(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("All {attempted} fallback instances failed. Please try again later.")]
    AllInstancesFailed { attempted: usize },

    #[error("No audio format found for video {video_id}")]
    NoAudioFormat { video_id: String },

    #[error("Instance probe already running, abort requested")]
    ProbeAlreadyRunning,

    #[error("Instance probe abruptly stopped")]
    ProbeAborted,

    #[error("Playback failed: {0}")]
    PlaybackFailed(String),
}

impl MirrorError {
    /// True for conditions that terminate a whole operation rather than a
    /// single candidate (these are the ones surfaced to the user).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MirrorError::AllInstancesFailed { .. }
                | MirrorError::NoAudioFormat { .. }
                | MirrorError::ProbeAlreadyRunning
                | MirrorError::ProbeAborted
        )
    }
}
