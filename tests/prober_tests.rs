use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};

use tube_mirrors_rs::{
    InstanceKind, MemoryStorage, MirrorError, MirrorEvent, ProbeState, ProbeTransport, Prober,
    Registry, AUDIO_PROBE_VIDEO_ID, SETTINGS, THUMBNAIL_PROBE_VIDEO_ID,
};

/// ProbeTransport double with scripted responses keyed by URL.
#[derive(Default)]
struct FakeTransport {
    texts: HashMap<String, String>,
    images: HashMap<String, Vec<u8>>,
    media: HashMap<String, u64>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl FakeTransport {
    fn new() -> Self {
        Self::default()
    }

    fn directories(mut self, piped: &str, invidious: &str) -> Self {
        self.texts
            .insert(SETTINGS.piped_directory_url.clone(), piped.to_string());
        self.texts.insert(
            SETTINGS.invidious_directory_url.clone(),
            invidious.to_string(),
        );
        self
    }

    fn text(mut self, url: &str, body: &str) -> Self {
        self.texts.insert(url.to_string(), body.to_string());
        self
    }

    fn image(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.images.insert(url.to_string(), bytes);
        self
    }

    fn media(mut self, url: &str, bytes: u64) -> Self {
        self.media.insert(url.to_string(), bytes);
        self
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ProbeTransport for FakeTransport {
    async fn fetch_text(&self, url: &str) -> Result<String, MirrorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().unwrap().push(url.to_string());
        self.texts
            .get(url)
            .cloned()
            .ok_or_else(|| MirrorError::InvalidResponse(format!("{} unreachable", url)))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, MirrorError> {
        self.calls.lock().unwrap().push(url.to_string());
        self.images
            .get(url)
            .cloned()
            .ok_or_else(|| MirrorError::InvalidResponse(format!("{} unreachable", url)))
    }

    async fn probe_media(&self, url: &str) -> Result<u64, MirrorError> {
        self.calls.lock().unwrap().push(url.to_string());
        self.media
            .get(url)
            .copied()
            .ok_or_else(|| MirrorError::InvalidResponse(format!("{} served no data", url)))
    }
}

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::DynamicImage::new_rgb8(width, height);
    let mut buf = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Jpeg)
        .unwrap();
    buf
}

fn setup() -> (Prober, broadcast::Receiver<MirrorEvent>, RwLock<Registry>) {
    let (tx, rx) = broadcast::channel(100);
    let registry = RwLock::new(Registry::load(&MemoryStorage::new()));
    (Prober::new(tx), rx, registry)
}

fn drain(rx: &mut broadcast::Receiver<MirrorEvent>) -> Vec<MirrorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn progress_percents(events: &[MirrorEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            MirrorEvent::ProbeProgress { percent } => Some(*percent),
            _ => None,
        })
        .collect()
}

const EMPTY_PIPED: &str = "[]";
const EMPTY_INVIDIOUS: &str = "[]";

// A duplicate metadata-API URL in the directory must be added as a
// selectable option at most once.
#[tokio::test]
async fn test_duplicate_piped_url_added_once() {
    let piped = r#"[
        {"name": "adminforge.de", "locations": "DE", "api_url": "https://pipedapi.adminforge.de", "image_proxy_url": ""},
        {"name": "adminforge.de mirror", "locations": "DE", "api_url": "https://pipedapi.adminforge.de", "image_proxy_url": ""}
    ]"#;
    let transport = FakeTransport::new().directories(piped, EMPTY_INVIDIOUS);
    let (prober, mut rx, registry) = setup();

    let report = prober.regenerate(&registry, &transport).await.unwrap();
    assert_eq!(report.candidates_added, 1);

    let registry = registry.read().await;
    // Compiled-in default plus the one new URL.
    assert_eq!(registry.options(InstanceKind::Piped).len(), 2);

    let percents = progress_percents(&drain(&mut rx));
    assert_eq!(percents, vec![50, 100]);
}

// Candidates failing the cors && api && https filter never trigger a
// network probe but still advance the progress counter.
#[tokio::test]
async fn test_inadmissible_candidates_skip_probe_but_advance_progress() {
    let invidious = r#"[
        ["onion.example", {"flag": "", "uri": "http://onion.example", "cors": true, "api": true, "type": "onion"}],
        ["nocors.example", {"flag": "", "uri": "https://nocors.example", "cors": false, "api": true, "type": "https"}],
        ["noapi.example", {"flag": "", "uri": "https://noapi.example", "cors": true, "api": null, "type": "https"}]
    ]"#;
    let transport = FakeTransport::new().directories(EMPTY_PIPED, invidious);
    let (prober, mut rx, registry) = setup();

    let report = prober.regenerate(&registry, &transport).await.unwrap();
    assert_eq!(report.candidates_added, 0);

    // Only the two directory documents were fetched.
    assert_eq!(transport.calls().len(), 2);

    let percents = progress_percents(&drain(&mut rx));
    assert_eq!(percents, vec![33, 67, 100]);
}

// The thumbnail probe requires the loaded image to be exactly 120px
// wide; a proxy serving anything else is not admitted.
#[tokio::test]
async fn test_thumbnail_width_criterion() {
    let piped = r#"[
        {"name": "good.example", "locations": "DE", "api_url": "https://pipedapi.good.example", "image_proxy_url": "https://proxy.good.example"},
        {"name": "bad.example", "locations": "FR", "api_url": "https://pipedapi.bad.example", "image_proxy_url": "https://proxy.bad.example"}
    ]"#;
    let good_thumb = format!(
        "https://proxy.good.example/vi/{}/default.jpg",
        THUMBNAIL_PROBE_VIDEO_ID
    );
    let bad_thumb = format!(
        "https://proxy.bad.example/vi/{}/default.jpg",
        THUMBNAIL_PROBE_VIDEO_ID
    );
    let transport = FakeTransport::new()
        .directories(piped, EMPTY_INVIDIOUS)
        .image(&good_thumb, jpeg(120, 90))
        .image(&bad_thumb, jpeg(320, 180));
    let (prober, _rx, registry) = setup();

    // Two piped options plus one admitted image proxy.
    let report = prober.regenerate(&registry, &transport).await.unwrap();
    assert_eq!(report.candidates_added, 3);

    let registry = registry.read().await;
    let image_urls: Vec<&str> = registry
        .options(InstanceKind::Image)
        .iter()
        .map(|r| r.url.as_str())
        .collect();
    assert!(image_urls.contains(&"https://proxy.good.example"));
    assert!(!image_urls.contains(&"https://proxy.bad.example"));
}

// An admissible playback candidate is admitted only after serving
// metadata with adaptive formats and actual audio bytes through its
// own origin.
#[tokio::test]
async fn test_invidious_candidate_full_probe() {
    let invidious = r#"[
        ["inv.nadeko.net", {"flag": "🇨🇱", "uri": "https://inv.nadeko.net", "cors": true, "api": true, "type": "https"}],
        ["empty.example", {"flag": "", "uri": "https://empty.example", "cors": true, "api": true, "type": "https"}]
    ]"#;
    let nadeko_videos = format!(
        "https://inv.nadeko.net/api/v1/videos/{}",
        AUDIO_PROBE_VIDEO_ID
    );
    let empty_videos = format!(
        "https://empty.example/api/v1/videos/{}",
        AUDIO_PROBE_VIDEO_ID
    );
    let transport = FakeTransport::new()
        .directories(EMPTY_PIPED, invidious)
        .text(
            &nadeko_videos,
            r#"{"adaptiveFormats": [{"type": "audio/mp4", "url": "https://upstream.example/videoplayback?id=1"}]}"#,
        )
        .text(&empty_videos, r#"{"adaptiveFormats": []}"#)
        .media("https://inv.nadeko.net/videoplayback?id=1", 4096);
    let (prober, mut rx, registry) = setup();

    let report = prober.regenerate(&registry, &transport).await.unwrap();
    assert_eq!(report.candidates_added, 1);

    {
        let registry = registry.read().await;
        let options = registry.options(InstanceKind::Invidious);
        let added = options.last().unwrap();
        assert_eq!(added.url, "https://inv.nadeko.net");
        assert_eq!(added.name, "inv.nadeko.net \u{1F1E8}\u{1F1F1}");
    }

    // Empty adaptiveFormats failed the candidate, but progress still
    // reached 100.
    let percents = progress_percents(&drain(&mut rx));
    assert_eq!(percents.last(), Some(&100));
}

// A second regenerate while one is running fails with the re-entrancy
// conflict and makes the in-flight run abort at its next checkpoint.
#[tokio::test]
async fn test_reentrancy_conflict_and_cooperative_abort() {
    let piped = r#"[
        {"name": "a.example", "locations": "", "api_url": "https://pipedapi.a.example", "image_proxy_url": ""}
    ]"#;
    let transport = Arc::new(
        FakeTransport::new()
            .directories(piped, EMPTY_INVIDIOUS)
            .slow(Duration::from_millis(100)),
    );
    let (tx, mut rx) = broadcast::channel(100);
    let prober = Arc::new(Prober::new(tx));
    let registry = Arc::new(RwLock::new(Registry::load(&MemoryStorage::new())));

    let first = {
        let prober = prober.clone();
        let registry = registry.clone();
        let transport = transport.clone();
        tokio::spawn(async move { prober.regenerate(&registry, &*transport).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(prober.state(), ProbeState::Running);

    match prober.regenerate(&registry, &*transport).await {
        Err(MirrorError::ProbeAlreadyRunning) => {}
        other => panic!("Expected ProbeAlreadyRunning, got {:?}", other),
    }

    match first.await.unwrap() {
        Err(MirrorError::ProbeAborted) => {}
        other => panic!("Expected ProbeAborted, got {:?}", other),
    }
    assert_eq!(prober.state(), ProbeState::Idle);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, MirrorEvent::ProbeAborted)));

    // The prober is reusable after an abort.
    let report = prober.regenerate(&registry, &*transport).await.unwrap();
    assert_eq!(report.candidates_added, 1);
}

// Data usage approximates directory bytes plus probe bytes plus a small
// fixed per-probe overhead.
#[tokio::test]
async fn test_data_usage_accumulates() {
    let piped = r#"[
        {"name": "good.example", "locations": "", "api_url": "https://pipedapi.good.example", "image_proxy_url": "https://proxy.good.example"}
    ]"#;
    let thumb_url = format!(
        "https://proxy.good.example/vi/{}/default.jpg",
        THUMBNAIL_PROBE_VIDEO_ID
    );
    let thumb = jpeg(120, 90);
    let body_bytes = (piped.len() + EMPTY_INVIDIOUS.len() + thumb.len()) as u64;
    let transport = FakeTransport::new()
        .directories(piped, EMPTY_INVIDIOUS)
        .image(&thumb_url, thumb);
    let (prober, _rx, registry) = setup();

    let report = prober.regenerate(&registry, &transport).await.unwrap();
    assert!(report.data_usage > body_bytes);
    assert!(report.data_usage < body_bytes + 2_000);
}

// A directory fetch failing fails the run, resets the prober to idle
// and rolls nothing back.
#[tokio::test]
async fn test_directory_failure_resets_to_idle() {
    // Invidious directory missing entirely.
    let transport = FakeTransport::new().text(&SETTINGS.piped_directory_url, EMPTY_PIPED);
    let (prober, _rx, registry) = setup();

    assert!(prober.regenerate(&registry, &transport).await.is_err());
    assert_eq!(prober.state(), ProbeState::Idle);
    {
        let registry = registry.read().await;
        assert_eq!(registry.options(InstanceKind::Piped).len(), 1);
    }

    // A later run with both directories reachable succeeds.
    let transport = FakeTransport::new().directories(EMPTY_PIPED, EMPTY_INVIDIOUS);
    let report = prober.regenerate(&registry, &transport).await.unwrap();
    assert_eq!(report.candidates_added, 0);
}
