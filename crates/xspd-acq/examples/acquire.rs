//! Run one acquisition against a live device or the simulator.
//!
//! ```text
//! cargo run --example acquire -- [config.toml]
//! ```
//!
//! With no argument, connects to `127.0.0.1:8000` (the simulator's
//! default).

use std::sync::Arc;
use std::time::Duration;

use xspd_acq::AcquisitionEngine;
use xspd_client::{ClientConfig, HttpTransport, XspdApi};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };

    let mut api = XspdApi::new(&config.host, config.port, Arc::new(HttpTransport::new()));
    let detector = api.initialize(config.device_id.as_deref()).await?;
    tracing::info!(
        detector = detector.id(),
        firmware = detector.firmware_version(),
        xspd = api.xspd_version()?,
        "connected"
    );

    let interval = Duration::from_secs_f64(config.status_interval_s);
    let engine = AcquisitionEngine::connect(Arc::new(api), detector, interval).await?;
    let mut frames = engine.subscribe_frames();

    engine.start().await?;
    while engine.is_acquiring() {
        match tokio::time::timeout(Duration::from_secs(10), frames.recv()).await {
            Ok(Ok(frame)) => {
                tracing::info!(
                    frame = frame.frame_number,
                    trigger = frame.trigger_number,
                    bytes = frame.data.len(),
                    "frame"
                );
            }
            Ok(Err(_)) => break,
            Err(_) => {
                tracing::warn!("no frame within 10s, stopping");
                engine.stop().await?;
                break;
            }
        }
    }

    tracing::info!(total = engine.frames_published(), "acquisition finished");
    engine.shutdown().await;
    Ok(())
}
