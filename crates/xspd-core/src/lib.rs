//! `xspd-core`
//!
//! Core types shared by the XSPD detector client crates.
//!
//! X-Spectrum XSPD detectors expose two interfaces: a REST-style variable
//! store addressed by hierarchical paths (`detector/module/name`), and a
//! ZeroMQ PUB socket streaming multi-part frame messages. This crate holds
//! the pieces both sides need:
//!
//! - [`error::XspdError`]: the error taxonomy for the whole client
//! - [`wire`]: the closed, string-backed enumerations of the variable
//!   protocol, with bidirectional name tables
//! - [`value::VarValue`]: typed marshalling between JSON envelopes and the
//!   textual wire form used by variable writes
//! - [`frame`]: the streaming frame header, pixel formats, and the decoded
//!   frame type handed to consumers

pub mod error;
pub mod frame;
pub mod value;
pub mod wire;

pub use error::{Result, XspdError};
pub use frame::{FrameData, FrameHeader, PixelDepth};
pub use wire::{
    Compressor, CounterMode, DetectorStatus, OnOff, ShuffleMode, Threshold, TriggerMode,
};
