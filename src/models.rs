use serde::{Deserialize, Serialize};

/// The three endpoint categories the registry tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceKind {
    /// Video/metadata API proxy.
    Piped,
    /// Playback API proxy.
    Invidious,
    /// Thumbnail image proxy.
    Image,
}

impl InstanceKind {
    pub const ALL: [InstanceKind; 3] = [
        InstanceKind::Piped,
        InstanceKind::Invidious,
        InstanceKind::Image,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceKind::Piped => "piped",
            InstanceKind::Invidious => "invidious",
            InstanceKind::Image => "image",
        }
    }
}

/// One selectable endpoint: a display label (possibly flag-decorated),
/// its base URL, and whether the URL was typed by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub name: String,
    pub url: String,
    pub custom: bool,
}

impl InstanceRecord {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            custom: false,
        }
    }

    pub fn custom(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            custom: true,
        }
    }
}

/// The persisted selection blob (storage key `apiList_2`). Missing keys
/// fall back to the compiled-in defaults, so a partial blob still loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySelection {
    #[serde(default = "default_piped")]
    pub piped: InstanceRecord,
    #[serde(default = "default_invidious")]
    pub invidious: InstanceRecord,
    #[serde(default = "default_image")]
    pub image: InstanceRecord,
}

impl Default for RegistrySelection {
    fn default() -> Self {
        Self {
            piped: default_piped(),
            invidious: default_invidious(),
            image: default_image(),
        }
    }
}

impl RegistrySelection {
    pub fn get(&self, kind: InstanceKind) -> &InstanceRecord {
        match kind {
            InstanceKind::Piped => &self.piped,
            InstanceKind::Invidious => &self.invidious,
            InstanceKind::Image => &self.image,
        }
    }

    pub fn get_mut(&mut self, kind: InstanceKind) -> &mut InstanceRecord {
        match kind {
            InstanceKind::Piped => &mut self.piped,
            InstanceKind::Invidious => &mut self.invidious,
            InstanceKind::Image => &mut self.image,
        }
    }
}

pub(crate) fn default_piped() -> InstanceRecord {
    InstanceRecord::new("kavin.rocks \u{1f310}", "https://pipedapi.kavin.rocks")
}

pub(crate) fn default_invidious() -> InstanceRecord {
    InstanceRecord::new("fdn.fr \u{1f1eb}\u{1f1f7}", "https://invidious.fdn.fr")
}

pub(crate) fn default_image() -> InstanceRecord {
    InstanceRecord::new(
        "leptons.xyz \u{1f1e6}\u{1f1f9}",
        "https://pipedproxy.leptons.xyz",
    )
}

// Directory documents

/// One entry of the Piped instances directory.
#[derive(Debug, Clone, Deserialize)]
pub struct PipedCandidate {
    pub name: String,
    #[serde(default)]
    pub locations: String,
    pub api_url: String,
    #[serde(default)]
    pub image_proxy_url: String,
}

/// Per-hostname metadata in the Invidious instances directory.
#[derive(Debug, Clone, Deserialize)]
pub struct InvidiousDetails {
    #[serde(default)]
    pub flag: Option<String>,
    pub uri: String,
    #[serde(default)]
    pub cors: Option<bool>,
    #[serde(default)]
    pub api: Option<bool>,
    #[serde(rename = "type")]
    pub kind: String,
}

/// The directory is an ordered list of `[hostname, details]` pairs.
pub type InvidiousDirectory = Vec<(String, InvidiousDetails)>;

impl InvidiousDetails {
    /// Admission filter: only CORS-enabled, API-enabled https instances
    /// are eligible for probing at all.
    pub fn is_admissible(&self) -> bool {
        self.cors == Some(true) && self.api == Some(true) && self.kind == "https"
    }

    /// Display label for the selectable option, flag-decorated when the
    /// directory carries one.
    pub fn display_name(&self, hostname: &str) -> String {
        match self.flag.as_deref() {
            Some(flag) if !flag.is_empty() => format!("{} {}", hostname, flag),
            _ => hostname.to_string(),
        }
    }
}

// Playback responses

/// Response of `GET {base}/api/v1/videos/{id}`, reduced to the fields
/// playback needs.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoResponse {
    #[serde(rename = "adaptiveFormats", default)]
    pub adaptive_formats: Vec<AdaptiveFormat>,
    #[serde(default)]
    pub title: String,
}

impl VideoResponse {
    /// First adaptive format of the audio family, if any.
    pub fn first_audio_format(&self) -> Option<&AdaptiveFormat> {
        self.adaptive_formats.iter().find(|f| f.is_audio())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdaptiveFormat {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub url: String,
}

impl AdaptiveFormat {
    pub fn is_audio(&self) -> bool {
        self.kind.starts_with("audio")
    }
}

/// A playback-API base the fallback resolver may try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackInstance {
    pub name: String,
    pub url: String,
}

impl FallbackInstance {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}
