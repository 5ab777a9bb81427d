//! Error types for the XSPD client.
//!
//! A single [`XspdError`] enum covers all three layers of the client: the
//! variable protocol (transport and envelope-shape failures), topology
//! resolution (fatal initialization failures), and the streaming path
//! (per-frame failures that are logged and dropped rather than propagated).
//!
//! Propagation policy:
//!
//! - Initialization failures are fatal; the client must not be used
//!   half-initialized.
//! - Per-request variable failures propagate to the immediate caller as
//!   typed errors; retry policy is the caller's decision.
//! - Per-frame streaming failures (`Decompression`, `UnsupportedType`,
//!   `Receive`) are logged inside the acquisition loop and the frame is
//!   dropped; a single corrupt frame never stops acquisition.

use thiserror::Error;

/// Convenience alias for results using the client error type.
pub type Result<T> = std::result::Result<T, XspdError>;

/// Primary error type for the XSPD client.
#[derive(Error, Debug)]
pub enum XspdError {
    /// HTTP transport failure or non-success status for a request.
    #[error("Transport error for {uri}: {message}")]
    Transport { uri: String, message: String },

    /// The device answered with an empty or null JSON body.
    #[error("Empty JSON response from {0}")]
    EmptyResponse(String),

    /// The expected key is missing from an otherwise well-formed envelope.
    #[error("Key {key} not found in response for variable {path}")]
    KeyNotFound { path: String, key: String },

    /// The value under the key does not have the requested shape
    /// (e.g. a string where a number was expected).
    #[error("Unexpected value shape for variable {path}: expected {expected}")]
    ValueShape { path: String, expected: &'static str },

    /// A wire string did not match any entry in the enum's name table.
    #[error("Failed to cast value {value} to enum for variable {path}")]
    EnumCast { path: String, value: String },

    /// The API root did not yield parseable version information.
    #[error("Failed to retrieve API version information: {0}")]
    ApiVersion(String),

    /// An explicitly requested device id is not in the device list.
    #[error("Device with ID {0} does not exist")]
    DeviceNotFound(String),

    /// A numeric device index is outside the device list.
    #[error("Device index {0} is out of range")]
    IndexOutOfRange(usize),

    /// The device info carries no detectors.
    #[error("No detector information found for device ID {0}")]
    NoDetector(String),

    /// The detector entry lacks its id or module list.
    #[error("Detector information is missing 'detector-id' or 'modules' field for device ID {0}")]
    MalformedDetector(String),

    /// The device advertises no data ports.
    #[error("No data ports found for device ID {0}")]
    NoDataPort(String),

    /// A data-port entry lacks one of its mandatory fields.
    #[error("Data port information is missing 'id', 'ip', or 'port' field for device ID {0}")]
    MalformedDataPort(String),

    /// The command is not in the device's advertised command list.
    ///
    /// The extra round trip behind this check exists to turn "nothing
    /// happened" (a no-op PUT to an unrecognized path) into a loud failure.
    #[error("Command '{command}' not found for device ID {device}")]
    UnknownCommand { command: String, device: String },

    /// Decompressed payload size disagrees with the geometry-derived size,
    /// or the codec itself failed.
    #[error("Decompressed size {actual} does not match expected size {expected} ({detail})")]
    Decompression {
        expected: usize,
        actual: usize,
        detail: String,
    },

    /// Frame data cannot be interpreted with the current pixel layout.
    #[error("Unsupported data type for frame subtraction: {0}")]
    UnsupportedType(String),

    /// The detector reports a bit depth with no matching pixel format.
    #[error("Unsupported bit depth: {0}")]
    UnsupportedBitDepth(u32),

    /// HIGH threshold written while the threshold vector is empty.
    #[error("Must set low threshold before setting high threshold")]
    ThresholdOrder,

    /// Version or device information requested before `initialize` ran.
    #[error("XSPD API not initialized")]
    NotInitialized,

    /// An acquisition is already in progress.
    #[error("Acquisition already in progress")]
    Busy,

    /// Support for this codec was not compiled in.
    #[error("Feature '{0}' is not enabled. Rebuild with --features {0}")]
    FeatureNotEnabled(&'static str),

    /// Per-frame receive failure on the streaming socket.
    #[error("Frame receive error: {0}")]
    Receive(String),

    /// Client configuration could not be parsed or validated.
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_out_of_range_message() {
        let err = XspdError::IndexOutOfRange(5);
        assert_eq!(err.to_string(), "Device index 5 is out of range");
    }

    #[test]
    fn threshold_order_message() {
        assert_eq!(
            XspdError::ThresholdOrder.to_string(),
            "Must set low threshold before setting high threshold"
        );
    }

    #[test]
    fn not_initialized_message() {
        assert_eq!(
            XspdError::NotInitialized.to_string(),
            "XSPD API not initialized"
        );
    }

    #[test]
    fn key_not_found_carries_path_and_key() {
        let err = XspdError::KeyNotFound {
            path: "lambda/status".into(),
            key: "value".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("lambda/status"));
        assert!(msg.contains("not found in response for variable"));
    }
}
