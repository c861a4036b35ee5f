use reqwest::Url;

use crate::MirrorError;

/// Display labels starting with this marker indicate a user-supplied URL.
pub const CUSTOM_MARKER: &str = "Custom";

/// Whether a display label denotes a custom (user-typed) selection.
pub fn is_custom_label(text: &str) -> bool {
    text.starts_with(CUSTOM_MARKER)
}

/// Derive the short display name for a custom URL: the second and third
/// dot-separated segments of its hostname, joined. `foo.example.com`
/// becomes `example.com`; a bare `example.com` collapses to `com`.
/// Returns `None` when the URL has no usable hostname (the caller
/// treats that as an input failure and leaves prior state intact).
pub fn derive_custom_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let name = host
        .split('.')
        .skip(1)
        .take(2)
        .collect::<Vec<_>>()
        .join(".");
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Full label for a custom selection, e.g. `Custom : example.com`.
pub fn custom_label(name: &str) -> String {
    format!("{} : {}", CUSTOM_MARKER, name)
}

/// Rewrite a media URL so its origin (scheme + host + port) points at
/// `instance_base`. Mirrors proxy media relative to their own host, so
/// the upstream origin in the format URL must be replaced before the
/// URL is playable through the serving instance.
pub fn rewrite_origin(media_url: &str, instance_base: &str) -> Result<String, MirrorError> {
    let mut url =
        Url::parse(media_url).map_err(|e| MirrorError::InvalidUrl(format!("{}: {}", media_url, e)))?;
    let base = Url::parse(instance_base)
        .map_err(|e| MirrorError::InvalidUrl(format!("{}: {}", instance_base, e)))?;

    url.set_scheme(base.scheme())
        .map_err(|_| MirrorError::InvalidUrl(format!("bad scheme in {}", instance_base)))?;
    url.set_host(base.host_str())
        .map_err(|e| MirrorError::InvalidUrl(format!("{}: {}", instance_base, e)))?;
    url.set_port(base.port())
        .map_err(|_| MirrorError::InvalidUrl(format!("bad port in {}", instance_base)))?;

    Ok(url.to_string())
}

/// Human-readable byte count for data-usage reporting.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
