use std::sync::Arc;

use reqwest::Client;
use tracing::{debug, info, warn};

use crate::models::{FallbackInstance, VideoResponse};
use crate::settings::SETTINGS;
use crate::MirrorError;

/// Fetches playback metadata from one playback-API instance. The seam
/// exists so the fallback loop can be exercised without a network.
pub trait VideoApi {
    fn fetch_video(
        &self,
        base: &str,
        video_id: &str,
    ) -> impl std::future::Future<Output = Result<VideoResponse, MirrorError>> + Send;
}

/// [`VideoApi`] over HTTP: `GET {base}/api/v1/videos/{id}`.
#[derive(Debug, Clone)]
pub struct HttpVideoApi {
    client: Arc<Client>,
}

impl HttpVideoApi {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

impl VideoApi for HttpVideoApi {
    async fn fetch_video(&self, base: &str, video_id: &str) -> Result<VideoResponse, MirrorError> {
        let url = format!("{}/api/v1/videos/{}", base.trim_end_matches('/'), video_id);
        debug!(%url, "Fetching playback metadata");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(MirrorError::InvalidResponse(format!(
                "{} returned {}",
                base,
                response.status()
            )));
        }

        Ok(response.json::<VideoResponse>().await?)
    }
}

/// Iterates an ordered list of playback-API bases until one yields
/// playable data. No retries against the same instance and no backoff:
/// "retry" here means trying the next candidate in the list.
#[derive(Debug, Clone)]
pub struct FallbackResolver {
    instances: Vec<FallbackInstance>,
}

impl Default for FallbackResolver {
    fn default() -> Self {
        Self::new(default_fallback_instances())
    }
}

impl FallbackResolver {
    pub fn new(instances: Vec<FallbackInstance>) -> Self {
        Self { instances }
    }

    pub fn instances(&self) -> &[FallbackInstance] {
        &self.instances
    }

    /// Resolver with `head` moved to (or inserted at) the front of the
    /// candidate list, so the user's selected instance is tried first.
    pub fn prioritised(&self, head: FallbackInstance) -> Self {
        let mut instances = vec![head.clone()];
        instances.extend(
            self.instances
                .iter()
                .filter(|i| i.url != head.url)
                .cloned(),
        );
        Self { instances }
    }

    /// Try each instance in order; first one returning HTTP success and
    /// a non-empty `adaptiveFormats` wins. A response with zero formats
    /// counts as a failure for that instance. Every instance failing
    /// yields [`MirrorError::AllInstancesFailed`] after exactly as many
    /// attempts as there are candidates.
    pub async fn resolve(
        &self,
        api: &impl VideoApi,
        video_id: &str,
    ) -> Result<(VideoResponse, FallbackInstance), MirrorError> {
        for instance in &self.instances {
            match api.fetch_video(&instance.url, video_id).await {
                Ok(data) if !data.adaptive_formats.is_empty() => {
                    info!(instance = %instance.name, video_id, "Instance resolved playable data");
                    return Ok((data, instance.clone()));
                }
                Ok(_) => {
                    warn!(instance = %instance.name, video_id, "Instance returned no adaptive formats");
                }
                Err(e) => {
                    warn!(instance = %instance.name, video_id, error = %e, "Failed to fetch from instance");
                }
            }
        }

        Err(MirrorError::AllInstancesFailed {
            attempted: self.instances.len(),
        })
    }
}

/// Compiled-in fallback list, tried in order.
pub fn default_fallback_instances() -> Vec<FallbackInstance> {
    vec![
        FallbackInstance::new("inv.nadeko.net \u{1f1e8}\u{1f1f1}", "https://inv.nadeko.net"),
        FallbackInstance::new(
            "invidious.nerdvpn.de \u{1f1fa}\u{1f1e6}",
            "https://invidious.nerdvpn.de",
        ),
        FallbackInstance::new(
            "invidious.jing.rocks \u{1f1ef}\u{1f1f5}",
            "https://invidious.jing.rocks",
        ),
        FallbackInstance::new(
            "invidious.privacyredirect.com \u{1f1eb}\u{1f1ee}",
            "https://invidious.privacyredirect.com",
        ),
    ]
}

/// Shared HTTP client with the pool and timeout configuration all crate
/// requests use.
pub(crate) fn build_http_client() -> Arc<Client> {
    Arc::new(
        Client::builder()
            .pool_idle_timeout(Some(std::time::Duration::from_secs(600)))
            .pool_max_idle_per_host(8)
            .timeout(SETTINGS.request_timeout)
            .connect_timeout(SETTINGS.request_timeout)
            .build()
            .unwrap(),
    )
}
