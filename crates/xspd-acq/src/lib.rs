//! `xspd-acq`
//!
//! Streaming side of the XSPD client: a ZMQ subscriber for the detector's
//! frame stream, payload decompression, dual-counter differencing, and an
//! [`AcquisitionEngine`] that ties them to the control client.
//!
//! Blosc decompression requires the native c-blosc library and is gated
//! behind the `blosc` cargo feature; without it, frames compressed with
//! blosc fail with [`XspdError::FeatureNotEnabled`].
//!
//! [`XspdError::FeatureNotEnabled`]: xspd_core::XspdError::FeatureNotEnabled

pub mod decode;
pub mod diff;
pub mod engine;
pub mod receiver;

pub use decode::decode_frame;
pub use diff::DualCounterDiff;
pub use engine::{AcqConfig, AcquisitionEngine, MIN_STATUS_POLL_INTERVAL};
pub use receiver::{FrameReceiver, Received};
