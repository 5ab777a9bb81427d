//! Acquisition engine: arms the stream, decodes frames and publishes them.
//!
//! Two long-lived tasks run per engine. The acquisition task owns the ZMQ
//! subscriber and sleeps (on a watch channel) while disarmed, so frames
//! published outside an acquisition are never read. The monitor task polls
//! detector status and, when the detector is not busy, refreshes module
//! readings. Both tasks stop on one cancellation token; [`shutdown`]
//! cancels, joins the monitor, joins the acquisition task (which closes
//! the socket on exit) and only then returns.
//!
//! [`shutdown`]: AcquisitionEngine::shutdown

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use xspd_client::topology::DetectorConfig;
use xspd_client::{Detector, XspdApi};
use xspd_core::{
    Compressor, CounterMode, DetectorStatus, FrameData, FrameHeader, PixelDepth, Result, XspdError,
};

use crate::decode::decode_frame;
use crate::diff::DualCounterDiff;
use crate::receiver::{FrameReceiver, Received};

/// Floor for the monitor poll interval.
pub const MIN_STATUS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Settings snapshot an acquisition runs under.
///
/// Captured once at arm time; mid-acquisition variable writes do not
/// affect a running acquisition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcqConfig {
    pub width: u32,
    pub height: u32,
    pub depth: PixelDepth,
    pub compressor: Compressor,
    pub counter_mode: CounterMode,
    /// Number of images the caller asked for (`n_frames`).
    pub target_frames: u32,
}

impl AcqConfig {
    /// Raw bytes in one uncompressed frame.
    pub fn frame_bytes(&self) -> usize {
        FrameData::expected_bytes(self.width, self.height, self.depth)
    }

    /// Raw frames the stream must deliver to satisfy `target_frames`.
    /// Dual counter mode emits two raw frames per image.
    pub fn raw_frames_needed(&self) -> u64 {
        let factor = match self.counter_mode {
            CounterMode::Single => 1,
            CounterMode::Dual => 2,
        };
        u64::from(self.target_frames) * factor
    }
}

impl From<DetectorConfig> for AcqConfig {
    fn from(cfg: DetectorConfig) -> Self {
        Self {
            width: cfg.width,
            height: cfg.height,
            depth: cfg.depth,
            compressor: cfg.compressor,
            counter_mode: cfg.counter_mode,
            target_frames: cfg.n_frames,
        }
    }
}

/// Drives acquisitions for one detector.
pub struct AcquisitionEngine {
    api: Arc<XspdApi>,
    detector: Arc<Mutex<Detector>>,
    frame_tx: broadcast::Sender<Arc<FrameData>>,
    armed_tx: Arc<watch::Sender<Option<AcqConfig>>>,
    cancel: CancellationToken,
    frames_published: Arc<AtomicU64>,
    acq_handle: Option<JoinHandle<()>>,
    monitor_handle: Option<JoinHandle<()>>,
}

impl AcquisitionEngine {
    /// Connect the frame subscriber to the detector's active data port and
    /// start the acquisition and monitor tasks.
    pub async fn connect(
        api: Arc<XspdApi>,
        detector: Detector,
        status_interval: Duration,
    ) -> Result<Self> {
        let uri = detector.active_data_port()?.uri();
        let receiver = FrameReceiver::connect(&uri).await?;

        let detector = Arc::new(Mutex::new(detector));
        let (frame_tx, _) = broadcast::channel(16);
        let (armed_tx, armed_rx) = watch::channel(None);
        let armed_tx = Arc::new(armed_tx);
        let cancel = CancellationToken::new();
        let frames_published = Arc::new(AtomicU64::new(0));

        let acq_handle = tokio::spawn(acquisition_loop(
            receiver,
            armed_rx,
            Arc::clone(&armed_tx),
            frame_tx.clone(),
            cancel.clone(),
            Arc::clone(&api),
            Arc::clone(&detector),
            Arc::clone(&frames_published),
        ));
        let monitor_handle = tokio::spawn(monitor_loop(
            Arc::clone(&api),
            Arc::clone(&detector),
            status_interval,
            cancel.clone(),
        ));

        Ok(Self {
            api,
            detector,
            frame_tx,
            armed_tx,
            cancel,
            frames_published,
            acq_handle: Some(acq_handle),
            monitor_handle: Some(monitor_handle),
        })
    }

    /// Subscribe to published frames. Slow consumers may miss frames;
    /// the channel is lossy by design of `tokio::sync::broadcast`.
    pub fn subscribe_frames(&self) -> broadcast::Receiver<Arc<FrameData>> {
        self.frame_tx.subscribe()
    }

    /// Shared handle to the detector topology, e.g. for variable writes
    /// between acquisitions.
    pub fn detector(&self) -> Arc<Mutex<Detector>> {
        Arc::clone(&self.detector)
    }

    /// Images published since the engine was created.
    pub fn frames_published(&self) -> u64 {
        self.frames_published.load(Ordering::SeqCst)
    }

    pub fn is_acquiring(&self) -> bool {
        self.armed_tx.borrow().is_some()
    }

    /// Snapshot the detector settings, issue the `start` command and arm
    /// the acquisition task.
    pub async fn start(&self) -> Result<()> {
        if self.is_acquiring() {
            return Err(XspdError::Busy);
        }

        let detector = self.detector.lock().await;
        let config = AcqConfig::from(detector.read_config(&self.api).await?);
        detector.exec_command(&self.api, "start").await?;
        drop(detector);

        tracing::info!(
            width = config.width,
            height = config.height,
            depth = ?config.depth,
            compressor = %config.compressor,
            counter_mode = %config.counter_mode,
            target_frames = config.target_frames,
            "acquisition started"
        );
        let _ = self.armed_tx.send(Some(config));
        Ok(())
    }

    /// Issue the `stop` command and disarm. A no-op when idle.
    pub async fn stop(&self) -> Result<()> {
        if !self.is_acquiring() {
            return Ok(());
        }

        let detector = self.detector.lock().await;
        detector.exec_command(&self.api, "stop").await?;
        drop(detector);

        let _ = self.armed_tx.send(None);
        tracing::info!("acquisition stopped");
        Ok(())
    }

    /// Stop both tasks and close the frame subscriber.
    ///
    /// The monitor joins before the acquisition task so no status poll can
    /// land while the subscriber is being torn down.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.monitor_handle.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.acq_handle.take() {
            let _ = handle.await;
        }
        tracing::debug!("acquisition engine shut down");
    }
}

#[allow(clippy::too_many_arguments)]
async fn acquisition_loop(
    mut receiver: FrameReceiver,
    mut armed_rx: watch::Receiver<Option<AcqConfig>>,
    armed_tx: Arc<watch::Sender<Option<AcqConfig>>>,
    frame_tx: broadcast::Sender<Arc<FrameData>>,
    cancel: CancellationToken,
    api: Arc<XspdApi>,
    detector: Arc<Mutex<Detector>>,
    frames_published: Arc<AtomicU64>,
) {
    let mut diff: Option<DualCounterDiff> = None;
    let mut raw_collected: u64 = 0;
    let mut was_armed = false;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let armed = *armed_rx.borrow();
        let Some(config) = armed else {
            was_armed = false;
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = armed_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
        };

        if !was_armed {
            raw_collected = 0;
            diff = match config.counter_mode {
                CounterMode::Dual => Some(DualCounterDiff::new(
                    config.depth,
                    config.frame_bytes(),
                )),
                CounterMode::Single => None,
            };
            was_armed = true;
        }

        // Re-check the armed state between frames so a stop or re-arm is
        // never processed under the previous configuration.
        let received = tokio::select! {
            changed = armed_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                was_armed = false;
                continue;
            }
            received = receiver.recv_parts(&cancel) => received,
        };

        match received {
            Received::Closed => break,
            Received::Failed(message) => {
                tracing::error!(message, "failed to receive frame message");
            }
            Received::Parts(parts) => {
                match process_message(&parts, &config, diff.as_mut()) {
                    Err(e) => tracing::warn!(error = %e, "dropping frame"),
                    Ok(published) => {
                        raw_collected += 1;
                        if let Some(frame) = published {
                            frames_published.fetch_add(1, Ordering::SeqCst);
                            let _ = frame_tx.send(Arc::new(frame));
                        }
                        if raw_collected >= config.raw_frames_needed() {
                            finish_acquisition(&api, &detector, &armed_tx).await;
                        }
                    }
                }
            }
        }
    }

    receiver.close().await;
}

/// Self-stop when the target frame count is reached.
async fn finish_acquisition(
    api: &XspdApi,
    detector: &Arc<Mutex<Detector>>,
    armed_tx: &watch::Sender<Option<AcqConfig>>,
) {
    let detector = detector.lock().await;
    if let Err(e) = detector.exec_command(api, "stop").await {
        tracing::error!(error = %e, "failed to stop acquisition after reaching target");
    }
    drop(detector);
    let _ = armed_tx.send(None);
    tracing::info!("acquisition complete");
}

/// Interpret one multipart message under the armed configuration.
///
/// Returns `Ok(None)` for raw frames that are consumed without producing
/// an image (the first half of a dual-counter pair). Any failure drops
/// the half-collected pair as well: a lost raw frame must discard the
/// whole exposure, never difference against the next one.
fn process_message(
    parts: &[Bytes],
    config: &AcqConfig,
    diff: Option<&mut DualCounterDiff>,
) -> Result<Option<FrameData>> {
    let (header, decoded) = match decode_message(parts, config) {
        Ok(decoded) => decoded,
        Err(e) => {
            if let Some(diff) = diff {
                diff.reset();
            }
            return Err(e);
        }
    };

    let data = match diff {
        None => decoded,
        Some(diff) => match diff.push(decoded)? {
            None => return Ok(None),
            Some(difference) => difference,
        },
    };

    Ok(Some(FrameData {
        width: config.width,
        height: config.height,
        depth: config.depth,
        frame_number: header.frame_number,
        trigger_number: header.trigger_number,
        data,
    }))
}

fn decode_message(parts: &[Bytes], config: &AcqConfig) -> Result<(FrameHeader, Vec<u8>)> {
    if parts.len() != 3 {
        return Err(XspdError::Receive(format!(
            "Expected 3 message parts for frame, got {}",
            parts.len()
        )));
    }

    let header = FrameHeader::parse(&parts[1])?;
    if header.status_code != 0 {
        tracing::warn!(
            frame = header.frame_number,
            status_code = header.status_code,
            "frame reported nonzero status"
        );
    }

    let decoded = decode_frame(&parts[2], config.compressor, config.frame_bytes())?;
    Ok((header, decoded))
}

async fn monitor_loop(
    api: Arc<XspdApi>,
    detector: Arc<Mutex<Detector>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let interval = interval.max(MIN_STATUS_POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let mut detector = detector.lock().await;
        match detector.update_status(&api).await {
            Err(e) => tracing::warn!(error = %e, "detector status poll failed"),
            Ok(status) => {
                tracing::trace!(%status, "detector status");
                if status != DetectorStatus::Busy {
                    if let Err(e) = detector.refresh_modules(&api).await {
                        tracing::warn!(error = %e, "module status refresh failed");
                    }
                }
            }
        }
    }
    tracing::debug!("monitor loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(counter_mode: CounterMode) -> AcqConfig {
        AcqConfig {
            width: 4,
            height: 2,
            depth: PixelDepth::U16,
            compressor: Compressor::None,
            counter_mode,
            target_frames: 10,
        }
    }

    fn header_bytes(frame: u16, trigger: u16, status: u16, size: u16) -> Bytes {
        let mut out = Vec::with_capacity(8);
        out.extend_from_slice(&frame.to_le_bytes());
        out.extend_from_slice(&trigger.to_le_bytes());
        out.extend_from_slice(&status.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        Bytes::from(out)
    }

    fn pixels_u16(values: &[u16]) -> Bytes {
        let mut out = Vec::with_capacity(values.len() * 2);
        for v in values {
            out.extend_from_slice(&v.to_le_bytes());
        }
        Bytes::from(out)
    }

    #[test]
    fn raw_frames_needed_doubles_in_dual_mode() {
        assert_eq!(config(CounterMode::Single).raw_frames_needed(), 10);
        assert_eq!(config(CounterMode::Dual).raw_frames_needed(), 20);
    }

    #[test]
    fn frame_bytes_follows_geometry() {
        assert_eq!(config(CounterMode::Single).frame_bytes(), 16);
    }

    #[test]
    fn wrong_part_count_is_rejected() {
        let cfg = config(CounterMode::Single);
        let parts = vec![Bytes::from_static(b"topic"), header_bytes(1, 1, 0, 8)];
        let err = process_message(&parts, &cfg, None).unwrap_err();
        assert!(err
            .to_string()
            .contains("Expected 3 message parts for frame, got 2"));
    }

    #[test]
    fn single_mode_publishes_every_frame() {
        let cfg = config(CounterMode::Single);
        let parts = vec![
            Bytes::from_static(b"topic"),
            header_bytes(7, 3, 0, 8),
            pixels_u16(&[0, 1, 2, 3, 4, 5, 6, 7]),
        ];
        let frame = process_message(&parts, &cfg, None).unwrap().unwrap();
        assert_eq!(frame.frame_number, 7);
        assert_eq!(frame.trigger_number, 3);
        assert_eq!(frame.width, 4);
        assert_eq!(frame.pixel(2, 1), Some(6));
    }

    #[test]
    fn dual_mode_publishes_difference_of_pairs() {
        let cfg = config(CounterMode::Dual);
        let mut diff = DualCounterDiff::new(cfg.depth, cfg.frame_bytes());

        let first = vec![
            Bytes::from_static(b"topic"),
            header_bytes(1, 1, 0, 8),
            pixels_u16(&[5, 5, 5, 5, 5, 5, 5, 5]),
        ];
        assert!(process_message(&first, &cfg, Some(&mut diff))
            .unwrap()
            .is_none());

        let second = vec![
            Bytes::from_static(b"topic"),
            header_bytes(2, 1, 0, 8),
            pixels_u16(&[9, 4, 9, 4, 9, 4, 9, 4]),
        ];
        let frame = process_message(&second, &cfg, Some(&mut diff))
            .unwrap()
            .unwrap();
        // second - first, floored at zero
        assert_eq!(frame.pixel(0, 0), Some(4));
        assert_eq!(frame.pixel(1, 0), Some(0));
    }

    #[test]
    fn dual_mode_failed_frame_discards_the_held_half() {
        let cfg = config(CounterMode::Dual);
        let mut diff = DualCounterDiff::new(cfg.depth, cfg.frame_bytes());

        let first = vec![
            Bytes::from_static(b"topic"),
            header_bytes(1, 1, 0, 8),
            pixels_u16(&[10; 8]),
        ];
        assert!(process_message(&first, &cfg, Some(&mut diff))
            .unwrap()
            .is_none());

        // Second half of the pair arrives truncated and is dropped.
        let truncated = vec![
            Bytes::from_static(b"topic"),
            header_bytes(2, 1, 0, 8),
            pixels_u16(&[10, 10, 10]),
        ];
        assert!(process_message(&truncated, &cfg, Some(&mut diff)).is_err());

        // The next good frame opens a fresh pair; it must not be
        // differenced against frame 1 of the broken exposure.
        let third = vec![
            Bytes::from_static(b"topic"),
            header_bytes(3, 2, 0, 8),
            pixels_u16(&[12; 8]),
        ];
        assert!(process_message(&third, &cfg, Some(&mut diff))
            .unwrap()
            .is_none());

        let fourth = vec![
            Bytes::from_static(b"topic"),
            header_bytes(4, 2, 0, 8),
            pixels_u16(&[15; 8]),
        ];
        let frame = process_message(&fourth, &cfg, Some(&mut diff))
            .unwrap()
            .unwrap();
        assert_eq!(frame.pixel(0, 0), Some(3));
    }

    #[test]
    fn undersized_payload_is_dropped() {
        let cfg = config(CounterMode::Single);
        let parts = vec![
            Bytes::from_static(b"topic"),
            header_bytes(1, 1, 0, 8),
            pixels_u16(&[1, 2, 3]),
        ];
        let err = process_message(&parts, &cfg, None).unwrap_err();
        assert!(matches!(err, XspdError::Decompression { .. }));
    }

    #[test]
    fn short_header_is_dropped() {
        let cfg = config(CounterMode::Single);
        let parts = vec![
            Bytes::from_static(b"topic"),
            Bytes::from_static(&[0, 1, 2]),
            pixels_u16(&[0; 8]),
        ];
        let err = process_message(&parts, &cfg, None).unwrap_err();
        assert!(matches!(err, XspdError::Receive(_)));
    }
}
