use std::sync::Arc;

use reqwest::Client;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::events::MirrorEvent;
use crate::models::{InstanceKind, InstanceRecord, InvidiousDirectory, PipedCandidate, VideoResponse};
use crate::registry::Registry;
use crate::settings::SETTINGS;
use crate::state::{ProbeState, ProbeStateCell};
use crate::utils::rewrite_origin;
use crate::MirrorError;

/// Video whose default thumbnail is requested through each candidate
/// image proxy. Implementation constant, not user input.
pub const THUMBNAIL_PROBE_VIDEO_ID: &str = "dQw4w9WgXcQ";
/// Video whose playback metadata and audio are probed on each candidate
/// playback instance.
pub const AUDIO_PROBE_VIDEO_ID: &str = "jNQXAC9IVRw";
/// A default-quality thumbnail is 120px wide; anything else means the
/// proxy mangled or replaced the image.
pub const EXPECTED_THUMBNAIL_WIDTH: u32 = 120;
/// Flat estimate of request/response header bytes per probe, added on
/// top of measured body sizes for data-usage reporting.
const PROBE_OVERHEAD_BYTES: u64 = 800;

/// Network operations the prober performs, as a seam for tests.
pub trait ProbeTransport {
    fn fetch_text(
        &self,
        url: &str,
    ) -> impl std::future::Future<Output = Result<String, MirrorError>> + Send;

    fn fetch_bytes(
        &self,
        url: &str,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, MirrorError>> + Send;

    /// Bounded prefix fetch of a media URL. Success means the candidate
    /// actually serves bytes there; returns how many were read.
    fn probe_media(
        &self,
        url: &str,
    ) -> impl std::future::Future<Output = Result<u64, MirrorError>> + Send;
}

/// [`ProbeTransport`] over the shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpProbeTransport {
    client: Arc<Client>,
}

impl HttpProbeTransport {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    async fn checked_get(&self, url: &str) -> Result<reqwest::Response, MirrorError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(MirrorError::InvalidResponse(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        Ok(response)
    }
}

impl ProbeTransport for HttpProbeTransport {
    async fn fetch_text(&self, url: &str) -> Result<String, MirrorError> {
        Ok(self.checked_get(url).await?.text().await?)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, MirrorError> {
        Ok(self.checked_get(url).await?.bytes().await?.to_vec())
    }

    async fn probe_media(&self, url: &str) -> Result<u64, MirrorError> {
        let range = format!("bytes=0-{}", SETTINGS.media_probe_bytes.saturating_sub(1));
        let response = self
            .client
            .get(url)
            .header(reqwest::header::RANGE, range)
            .send()
            .await?;
        // 206 from range-aware servers, 200 from ones that ignore Range
        if !response.status().is_success() {
            return Err(MirrorError::InvalidResponse(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(MirrorError::InvalidResponse(format!("{} served no data", url)));
        }
        Ok(bytes.len() as u64)
    }
}

/// Outcome of a completed probe run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    /// New selectable options admitted across all three kinds.
    pub candidates_added: usize,
    /// Approximate bytes of network traffic the run cost.
    pub data_usage: u64,
}

/// Tests each candidate from the two public instance directories for
/// functional correctness and appends passing ones to the registry's
/// selectable options.
///
/// Candidates are probed strictly sequentially, bounding concurrent
/// network load to one in-flight probe at the cost of run latency
/// scaling linearly with candidate count. A second `regenerate` call
/// while one is running does not start another run: it requests that
/// the in-flight run abort at its next per-candidate checkpoint and
/// fails with [`MirrorError::ProbeAlreadyRunning`].
#[derive(Debug)]
pub struct Prober {
    state: ProbeStateCell,
    events: broadcast::Sender<MirrorEvent>,
}

impl Prober {
    pub fn new(events: broadcast::Sender<MirrorEvent>) -> Self {
        Self {
            state: ProbeStateCell::default(),
            events,
        }
    }

    pub fn state(&self) -> ProbeState {
        self.state.get()
    }

    /// Run the full probe cycle against both directories, appending
    /// passing candidates to `registry`. Already-added options survive
    /// a failed run; there is no partial-state rollback.
    pub async fn regenerate(
        &self,
        registry: &RwLock<Registry>,
        transport: &impl ProbeTransport,
    ) -> Result<ProbeReport, MirrorError> {
        if !self.state.try_start() {
            self.state.request_cancel();
            warn!("Probe already running, requesting abort");
            return Err(MirrorError::ProbeAlreadyRunning);
        }

        let result = self.run(registry, transport).await;
        self.state.set(ProbeState::Idle);

        match &result {
            Ok(report) => {
                info!(
                    added = report.candidates_added,
                    data_usage = report.data_usage,
                    "Probe run completed"
                );
                let _ = self.events.send(MirrorEvent::ProbeCompleted {
                    candidates_added: report.candidates_added,
                    data_usage: report.data_usage,
                });
            }
            Err(MirrorError::ProbeAborted) => {
                info!("Probe run aborted at checkpoint");
                let _ = self.events.send(MirrorEvent::ProbeAborted);
            }
            Err(e) => {
                warn!(error = %e, "Probe run failed");
            }
        }

        result
    }

    fn checkpoint(&self) -> Result<(), MirrorError> {
        if self.state.get() == ProbeState::CancelRequested {
            return Err(MirrorError::ProbeAborted);
        }
        Ok(())
    }

    fn report_progress(&self, processed: usize, rate: f64) {
        let percent = ((processed as f64 * rate).round() as u64).min(100) as u8;
        let _ = self.events.send(MirrorEvent::ProbeProgress { percent });
    }

    async fn run(
        &self,
        registry: &RwLock<Registry>,
        transport: &impl ProbeTransport,
    ) -> Result<ProbeReport, MirrorError> {
        let mut data_usage: u64 = 0;
        let mut added = 0usize;

        // Both directory fetches happen up front; either failing fails
        // the whole run.
        let piped_body = transport.fetch_text(&SETTINGS.piped_directory_url).await?;
        data_usage += piped_body.len() as u64;
        let invidious_body = transport
            .fetch_text(&SETTINGS.invidious_directory_url)
            .await?;
        data_usage += invidious_body.len() as u64;

        let piped: Vec<PipedCandidate> = serde_json::from_str(&piped_body)?;
        let invidious: InvidiousDirectory = serde_json::from_str(&invidious_body)?;

        let total = piped.len() + invidious.len();
        info!(
            piped = piped.len(),
            invidious = invidious.len(),
            "Fetched instance directories"
        );
        if total == 0 {
            self.report_progress(0, 0.0);
            return Ok(ProbeReport {
                candidates_added: 0,
                data_usage,
            });
        }
        let rate = 100.0 / total as f64;
        let mut processed = 0usize;

        for candidate in &piped {
            self.checkpoint()?;
            added += self
                .probe_piped_candidate(registry, transport, candidate, &mut data_usage)
                .await;
            processed += 1;
            self.report_progress(processed, rate);
        }

        for (hostname, details) in &invidious {
            self.checkpoint()?;
            if details.is_admissible() {
                added += self
                    .probe_invidious_candidate(registry, transport, hostname, details, &mut data_usage)
                    .await;
            } else {
                debug!(hostname = %hostname, "Candidate failed admission filter, skipping probe");
            }
            // Skipped candidates still advance the progress counter.
            processed += 1;
            self.report_progress(processed, rate);
        }

        Ok(ProbeReport {
            candidates_added: added,
            data_usage,
        })
    }

    /// Metadata-API candidates are admitted without probing; only the
    /// paired thumbnail proxy is functionally tested. Failures are
    /// contained: log, skip, continue.
    async fn probe_piped_candidate(
        &self,
        registry: &RwLock<Registry>,
        transport: &impl ProbeTransport,
        candidate: &PipedCandidate,
        data_usage: &mut u64,
    ) -> usize {
        let mut added = 0;

        {
            let mut registry = registry.write().await;
            if registry.add_option(
                InstanceKind::Piped,
                InstanceRecord::new(&candidate.name, &candidate.api_url),
            ) {
                added += 1;
            }
        }

        if candidate.image_proxy_url.is_empty() {
            return added;
        }

        let probe_url = format!(
            "{}/vi/{}/default.jpg",
            candidate.image_proxy_url.trim_end_matches('/'),
            THUMBNAIL_PROBE_VIDEO_ID
        );
        match self.check_thumbnail(transport, &probe_url, data_usage).await {
            Ok(()) => {
                let mut registry = registry.write().await;
                if registry.add_option(
                    InstanceKind::Image,
                    InstanceRecord::new(&candidate.name, &candidate.image_proxy_url),
                ) {
                    added += 1;
                }
            }
            Err(e) => {
                warn!(name = %candidate.name, error = %e, "Thumbnail probe failed");
            }
        }

        added
    }

    async fn check_thumbnail(
        &self,
        transport: &impl ProbeTransport,
        url: &str,
        data_usage: &mut u64,
    ) -> Result<(), MirrorError> {
        let bytes = transport.fetch_bytes(url).await?;
        *data_usage += bytes.len() as u64 + PROBE_OVERHEAD_BYTES;

        let image = image::load_from_memory(&bytes)
            .map_err(|e| MirrorError::InvalidResponse(format!("thumbnail undecodable: {}", e)))?;
        if image.width() != EXPECTED_THUMBNAIL_WIDTH {
            return Err(MirrorError::InvalidResponse(format!(
                "thumbnail width {} != {}",
                image.width(),
                EXPECTED_THUMBNAIL_WIDTH
            )));
        }
        Ok(())
    }

    /// A playback candidate must serve metadata with adaptive formats
    /// for the probe video and actually serve audio bytes through its
    /// own origin before it is admitted.
    async fn probe_invidious_candidate(
        &self,
        registry: &RwLock<Registry>,
        transport: &impl ProbeTransport,
        hostname: &str,
        details: &crate::models::InvidiousDetails,
        data_usage: &mut u64,
    ) -> usize {
        match self
            .check_playback(transport, &details.uri, data_usage)
            .await
        {
            Ok(()) => {
                let mut registry = registry.write().await;
                if registry.add_option(
                    InstanceKind::Invidious,
                    InstanceRecord::new(details.display_name(hostname), &details.uri),
                ) {
                    1
                } else {
                    0
                }
            }
            Err(e) => {
                warn!(hostname, error = %e, "Playback probe failed");
                0
            }
        }
    }

    async fn check_playback(
        &self,
        transport: &impl ProbeTransport,
        base: &str,
        data_usage: &mut u64,
    ) -> Result<(), MirrorError> {
        let url = format!(
            "{}/api/v1/videos/{}",
            base.trim_end_matches('/'),
            AUDIO_PROBE_VIDEO_ID
        );
        let body = transport.fetch_text(&url).await?;
        *data_usage += body.len() as u64 + PROBE_OVERHEAD_BYTES;

        let video: VideoResponse = serde_json::from_str(&body)?;
        let first = video.adaptive_formats.first().ok_or_else(|| {
            MirrorError::InvalidResponse(format!("{} served no adaptive formats", base))
        })?;

        let media_url = rewrite_origin(&first.url, base)?;
        let bytes = transport.probe_media(&media_url).await?;
        *data_usage += bytes + PROBE_OVERHEAD_BYTES;
        debug!(base, bytes, "Media probe succeeded");
        Ok(())
    }
}
