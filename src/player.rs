use crate::MirrorError;

/// Seam to the single global audio output. The original client drove a
/// browser audio element; embedders implement this against whatever
/// backend actually produces sound. The resolver records the track id
/// on the sink (the element's `dataset.id` in the original) so an
/// instance switch can re-resolve the currently loaded track.
pub trait AudioSink: Send {
    fn assign_source(&mut self, url: &str);
    fn clear_source(&mut self);

    fn track_id(&self) -> Option<String>;
    fn set_track_id(&mut self, id: &str);
    fn clear_track_id(&mut self);

    /// Current playback position in seconds.
    fn current_time(&self) -> f64;
    fn seek(&mut self, seconds: f64);

    fn pause(&mut self);
    fn play(&mut self) -> Result<(), MirrorError>;
}

/// Sink that remembers state but produces no sound. Useful for embedders
/// that only want resolution/probing, and as a test double.
#[derive(Debug, Default)]
pub struct NullSink {
    pub source: Option<String>,
    pub track: Option<String>,
    pub position: f64,
    pub playing: bool,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSink for NullSink {
    fn assign_source(&mut self, url: &str) {
        self.source = Some(url.to_string());
    }

    fn clear_source(&mut self) {
        self.source = None;
        self.playing = false;
    }

    fn track_id(&self) -> Option<String> {
        self.track.clone()
    }

    fn set_track_id(&mut self, id: &str) {
        self.track = Some(id.to_string());
    }

    fn clear_track_id(&mut self) {
        self.track = None;
    }

    fn current_time(&self) -> f64 {
        self.position
    }

    fn seek(&mut self, seconds: f64) {
        self.position = seconds;
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn play(&mut self) -> Result<(), MirrorError> {
        if self.source.is_none() {
            return Err(MirrorError::PlaybackFailed("no source assigned".into()));
        }
        self.playing = true;
        Ok(())
    }
}
