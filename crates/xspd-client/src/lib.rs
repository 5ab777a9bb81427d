//! `xspd-client`
//!
//! REST-side client for X-Spectrum XSPD detectors: a typed variable
//! protocol, device topology resolution, and validated command execution.
//!
//! The entry point is [`XspdApi`]: construct it with a transport, call
//! [`XspdApi::initialize`] once to negotiate the API version and build the
//! [`Detector`] topology, then read and write variables through the typed
//! accessors on [`Detector`], [`Module`] and [`DataPort`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use xspd_client::{transport::HttpTransport, XspdApi};
//!
//! # async fn example() -> xspd_core::Result<()> {
//! let mut api = XspdApi::new("192.168.1.100", 8000, Arc::new(HttpTransport::new()));
//! let mut detector = api.initialize(None).await?;
//! let status = detector.update_status(&api).await?;
//! tracing::info!(%status, "detector reached");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod protocol;
pub mod topology;
pub mod transport;

pub use config::ClientConfig;
pub use protocol::XspdApi;
pub use topology::{DataPort, Detector, DetectorConfig, DetectorSettings, Module, ModuleStatus};
pub use transport::{HttpTransport, MockTransport, RequestKind, Transport};
