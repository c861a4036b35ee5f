mod error;
pub use error::MirrorError;
mod events;
pub use events::MirrorEvent;
mod models;
pub use models::{
    AdaptiveFormat, FallbackInstance, InstanceKind, InstanceRecord, InvidiousDetails,
    InvidiousDirectory, PipedCandidate, RegistrySelection, VideoResponse,
};
mod player;
pub use player::{AudioSink, NullSink};
mod prober;
pub use prober::{
    HttpProbeTransport, ProbeReport, ProbeTransport, Prober, AUDIO_PROBE_VIDEO_ID,
    EXPECTED_THUMBNAIL_WIDTH, THUMBNAIL_PROBE_VIDEO_ID,
};
mod registry;
pub use registry::Registry;
mod resolver;
pub use resolver::{default_fallback_instances, FallbackResolver, HttpVideoApi, VideoApi};
mod settings;
pub use settings::{Settings, SETTINGS};
mod state;
pub use state::ProbeState;
mod storage;
pub use storage::{JsonFileStorage, MemoryStorage, Storage, API_LIST_KEY, AUTO_FETCH_KEY};
pub mod utils;

use std::sync::Arc;

use reqwest::Client;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::utils::{custom_label, derive_custom_name};

/// Main client tying together the instance registry, the instance
/// prober and the playback fallback resolver. It persists user
/// instance preferences through the supplied [`Storage`] and drives
/// playback through the supplied [`AudioSink`].
///
/// # Logging
///
/// This library uses the `tracing` crate for logging. To enable logs,
/// you'll need to initialize a tracing subscriber in your application.
///
/// Example using `tracing_subscriber`:
/// ```no_run
/// use tracing::Level;
/// use tracing_subscriber::FmtSubscriber;
///
/// let subscriber = FmtSubscriber::builder()
///     .with_max_level(Level::DEBUG)
///     .finish();
///
/// tracing::subscriber::set_global_default(subscriber)
///     .expect("Failed to set tracing subscriber");
/// ```
pub struct MirrorClient<S: Storage, P: AudioSink, A: VideoApi = HttpVideoApi> {
    storage: S,
    registry: Arc<RwLock<Registry>>,
    sink: Mutex<P>,
    resolver: FallbackResolver,
    video_api: A,
    transport: HttpProbeTransport,
    prober: Prober,
    event_sender: broadcast::Sender<MirrorEvent>,
    // Serializes instance switches; two racing switches over the single
    // audio sink are a bug, not a behavior to preserve.
    switch_lock: Mutex<()>,
}

impl<S: Storage, P: AudioSink> MirrorClient<S, P> {
    /// Create a client with the registry loaded from `storage` and the
    /// compiled-in fallback instance list. The playback API and the
    /// probe transport share one HTTP client.
    pub fn new(storage: S, sink: P) -> Self {
        let client = resolver::build_http_client();
        Self::assemble(storage, sink, HttpVideoApi::new(client.clone()), client)
    }
}

impl<S: Storage, P: AudioSink, A: VideoApi> MirrorClient<S, P, A> {
    /// Create a client resolving playback through a custom [`VideoApi`].
    pub fn with_video_api(storage: S, sink: P, video_api: A) -> Self {
        Self::assemble(storage, sink, video_api, resolver::build_http_client())
    }

    fn assemble(storage: S, sink: P, video_api: A, client: Arc<Client>) -> Self {
        let registry = Registry::load(&storage);
        let (event_tx, _) = broadcast::channel(SETTINGS.event_buffer_capacity);

        Self {
            storage,
            registry: Arc::new(RwLock::new(registry)),
            sink: Mutex::new(sink),
            resolver: FallbackResolver::default(),
            video_api,
            transport: HttpProbeTransport::new(client),
            prober: Prober::new(event_tx.clone()),
            event_sender: event_tx,
            switch_lock: Mutex::new(()),
        }
    }

    /// Replace the compiled-in fallback list.
    pub fn set_fallback_instances(&mut self, instances: Vec<FallbackInstance>) {
        self.resolver = FallbackResolver::new(instances);
    }

    pub fn event_receiver(&self) -> broadcast::Receiver<MirrorEvent> {
        self.event_sender.subscribe()
    }

    pub fn registry(&self) -> Arc<RwLock<Registry>> {
        self.registry.clone()
    }

    pub async fn selected(&self, kind: InstanceKind) -> InstanceRecord {
        self.registry.read().await.selected(kind).clone()
    }

    pub async fn options(&self, kind: InstanceKind) -> Vec<InstanceRecord> {
        self.registry.read().await.options(kind).to_vec()
    }

    pub fn probe_state(&self) -> ProbeState {
        self.prober.state()
    }

    // Auto-fetch gate: the key's absence means probing runs on load.

    pub fn auto_fetch_enabled(&self) -> bool {
        self.storage.get(AUTO_FETCH_KEY).is_none()
    }

    pub fn set_auto_fetch(&self, enabled: bool) -> Result<(), MirrorError> {
        if enabled {
            self.storage.remove(AUTO_FETCH_KEY)
        } else {
            self.storage.set(AUTO_FETCH_KEY, "false")
        }
    }

    /// Probe the instance directories and extend the registry's options
    /// (see [`Prober::regenerate`]). Call this once on startup when
    /// [`auto_fetch_enabled`](Self::auto_fetch_enabled) is true.
    pub async fn regenerate_instances(&self) -> Result<ProbeReport, MirrorError> {
        self.prober.regenerate(&self.registry, &self.transport).await
    }

    /// Resolve `video_id` through the fallback instances and start
    /// playback. The registry's currently selected playback instance is
    /// tried first, then the compiled-in list. On success the serving
    /// instance becomes the registry's in-memory selection and a
    /// [`MirrorEvent::NowServing`] is emitted; on terminal failure the
    /// sink is left with no source and no track id.
    pub async fn play(&self, video_id: &str) -> Result<FallbackInstance, MirrorError> {
        let head = {
            let registry = self.registry.read().await;
            let selected = registry.selected(InstanceKind::Invidious);
            FallbackInstance::new(selected.name.clone(), selected.url.clone())
        };
        let resolver = self.resolver.prioritised(head);

        let (data, instance) = match resolver.resolve(&self.video_api, video_id).await {
            Ok(found) => found,
            Err(e) => return Err(self.fail_playback(e).await),
        };

        let Some(format) = data.first_audio_format() else {
            return Err(self
                .fail_playback(MirrorError::NoAudioFormat {
                    video_id: video_id.to_string(),
                })
                .await);
        };

        let audio_url = match utils::rewrite_origin(&format.url, &instance.url) {
            Ok(url) => url,
            Err(e) => return Err(self.fail_playback(e).await),
        };

        {
            let mut sink = self.sink.lock().await;
            sink.assign_source(&audio_url);
            sink.set_track_id(video_id);
            if let Err(e) = sink.play() {
                sink.clear_source();
                sink.clear_track_id();
                let _ = self.event_sender.send(MirrorEvent::PlaybackFailed {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        }

        self.registry
            .write()
            .await
            .mark_served(InstanceKind::Invidious, &instance.url);

        info!(instance = %instance.name, video_id, "Playback started");
        let _ = self.event_sender.send(MirrorEvent::NowServing {
            instance_name: instance.name.clone(),
        });
        Ok(instance)
    }

    /// Leave the sink with no source and no stale track id, surface the
    /// failure as an event, and hand the error back.
    async fn fail_playback(&self, e: MirrorError) -> MirrorError {
        warn!(error = %e, "Playback resolution failed");
        let mut sink = self.sink.lock().await;
        sink.clear_source();
        sink.clear_track_id();
        let _ = self.event_sender.send(MirrorEvent::PlaybackFailed {
            reason: e.to_string(),
        });
        e
    }

    /// Change the selection for `kind` to an option chosen from a
    /// directory-derived list. Selecting a new playback instance while
    /// a track is loaded re-resolves that track through the new
    /// fallback order, preserving the playback position: output is
    /// paused for the duration of the switch, the position is captured
    /// before switching and restored once the new source has loaded.
    pub async fn select_instance(
        &self,
        kind: InstanceKind,
        name: &str,
        url: &str,
    ) -> Result<bool, MirrorError> {
        self.apply_selection(kind, name, url, false).await
    }

    /// Record a user-typed URL as the selection for `kind`. The display
    /// name is derived from the URL's hostname; a URL no name can be
    /// derived from is a silent no-op.
    pub async fn select_custom_instance(
        &self,
        kind: InstanceKind,
        url: &str,
    ) -> Result<bool, MirrorError> {
        let Some(name) = derive_custom_name(url) else {
            debug!(url, "No display name derivable from custom URL, ignoring");
            return Ok(false);
        };
        debug!(label = %custom_label(&name), "Derived custom selection label");
        self.apply_selection(kind, &name, url, true).await
    }

    async fn apply_selection(
        &self,
        kind: InstanceKind,
        name: &str,
        url: &str,
        custom: bool,
    ) -> Result<bool, MirrorError> {
        let _guard = self.switch_lock.lock().await;

        let changed = self
            .registry
            .write()
            .await
            .select(&self.storage, kind, name, url, custom)?;
        if !changed || kind != InstanceKind::Invidious {
            return Ok(changed);
        }

        let (track, position) = {
            let mut sink = self.sink.lock().await;
            let track = sink.track_id();
            let position = sink.current_time();
            if track.is_some() {
                sink.pause();
            }
            (track, position)
        };

        if let Some(track) = track {
            debug!(track = %track, position, "Re-resolving loaded track through new instance");
            self.play(&track).await?;
            self.sink.lock().await.seek(position);
        }

        Ok(true)
    }

    /// Run the sink closure against the client's audio sink.
    pub async fn with_sink<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        f(&mut *self.sink.lock().await)
    }
}
