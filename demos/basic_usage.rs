use std::error::Error;
use tube_mirrors_rs::{InstanceKind, JsonFileStorage, MirrorClient, MirrorEvent, NullSink};

/// A basic example showing how to load the instance registry, probe the
/// public instance directories, and resolve audio for a video through
/// the fallback mirrors.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Step 1: Create the client. Preferences persist in the platform
    // config directory; swap NullSink for your actual audio backend.
    let client = MirrorClient::new(JsonFileStorage::open_default(), NullSink::new());

    // Step 2: Subscribe to events before doing anything noisy
    let mut receiver = client.event_receiver();
    tokio::spawn(async move {
        while let Ok(event) = receiver.recv().await {
            match &event {
                MirrorEvent::ProbeProgress { .. } => {}
                _ => println!("{}", event.notification()),
            }
        }
    });

    // Step 3: Optionally probe the instance directories for working
    // mirrors (skipped when the user turned auto-fetch off)
    if client.auto_fetch_enabled() {
        match client.regenerate_instances().await {
            Ok(report) => println!(
                "Probe finished: {} instances added",
                report.candidates_added
            ),
            Err(e) => println!("Probe failed: {}", e),
        }
    }

    for option in client.options(InstanceKind::Invidious).await {
        println!("selectable playback instance: {} ({})", option.name, option.url);
    }

    // Step 4: Resolve and "play" a video through the fallback mirrors
    let video_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "jNQXAC9IVRw".to_string());
    match client.play(&video_id).await {
        Ok(instance) => {
            println!("Resolved {} via {}", video_id, instance.name);
            client
                .with_sink(|sink| println!("audio source: {:?}", sink.source))
                .await;
        }
        Err(e) => println!("Playback failed: {}", e),
    }

    Ok(())
}
