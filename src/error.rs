//! Error types for scanner communication.
//!
//! Every fallible operation in this crate returns [`ScannerError`]. Errors fall
//! into three groups:
//!
//! - **Transport faults** ([`ScannerError::ConnectionAbort`]): resolve, connect,
//!   read or write failed, timed out, or the peer closed the socket. The
//!   connection is unusable afterwards.
//! - **Protocol faults** ([`ScannerError::Protocol`]): the device rejected a
//!   request with a structured error. The connection stays usable.
//! - **Stream and format faults** ([`ScannerError::StreamCorrupted`],
//!   [`ScannerError::EndOfStream`], [`ScannerError::InvalidOperation`],
//!   [`ScannerError::Decode`]): raised locally while decoding or replaying.
//!
//! ```rust
//! use scanlink::ScannerError;
//!
//! let error = ScannerError::connection_aborted("peer closed the connection");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::fault::ProtocolFault;

/// Result type alias for scanner operations.
pub type Result<T, E = ScannerError> = std::result::Result<T, E>;

/// Main error type for scanner operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ScannerError {
    #[error("Connection aborted: {reason}")]
    ConnectionAbort {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{0}")]
    Protocol(#[from] ProtocolFault),

    #[error("Stream corrupted: {details}")]
    StreamCorrupted { details: String },

    #[error("Reached end of stream. Check is_end_of_stream() before receiving the next frame")]
    EndOfStream,

    #[error("{operation} cannot be used with a {mode} stream")]
    InvalidOperation { operation: &'static str, mode: &'static str },

    #[error("Failed to decode {context}: {details}")]
    Decode { context: String, details: String },

    #[error("Unexpected response to {request}: received {received}")]
    UnexpectedResponse { request: &'static str, received: &'static str },

    #[error("Recording file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {reason}")]
    Config {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Devices are not synchronized: {details}")]
    NotSynchronized { details: String },
}

impl ScannerError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScannerError::ConnectionAbort { .. } => true,
            ScannerError::Protocol(fault) => fault.is_transient(),
            ScannerError::NotSynchronized { .. } => true,
            ScannerError::Io { .. } => true,
            ScannerError::StreamCorrupted { .. } => false,
            ScannerError::EndOfStream => false,
            ScannerError::InvalidOperation { .. } => false,
            ScannerError::Decode { .. } => false,
            ScannerError::UnexpectedResponse { .. } => false,
            ScannerError::File { .. } => false,
            ScannerError::Config { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ScannerError::ConnectionAbort { .. } => vec![
                "Check that the device is powered and reachable",
                "Verify host name and port",
                "Reconnect; the previous connection cannot be reused",
            ],
            ScannerError::Protocol(ProtocolFault::OutdatedClientProtocol { .. }) => {
                vec!["Update this library to a version matching the device firmware"]
            }
            ScannerError::Protocol(ProtocolFault::OutdatedServerProtocol { .. }) => {
                vec!["Update the device firmware"]
            }
            ScannerError::Protocol(ProtocolFault::NotInRange { .. }) => {
                vec!["Adjust the parameter to lie within the reported range"]
            }
            ScannerError::Protocol(_) => vec![
                "Inspect the device error description",
                "Check the device status and retry",
            ],
            ScannerError::StreamCorrupted { .. } => vec![
                "Verify the recording was written completely",
                "Check the file was not truncated during transfer",
            ],
            ScannerError::EndOfStream => vec![
                "Call is_end_of_stream() before receiving",
                "Call seek_to_first_frame() to replay from the start",
            ],
            ScannerError::InvalidOperation { .. } => {
                vec!["Use this operation only with the stream mode it supports"]
            }
            ScannerError::Decode { .. } => vec![
                "Check library and firmware protocol versions match",
                "Verify the data source integrity",
            ],
            ScannerError::UnexpectedResponse { .. } => {
                vec!["Check library and firmware protocol versions match"]
            }
            ScannerError::File { .. } => {
                vec!["Check the file exists and is readable", "Check file permissions"]
            }
            ScannerError::Io { .. } => vec!["Check disk space and permissions"],
            ScannerError::Config { .. } => vec!["Fix the configuration value and reload"],
            ScannerError::NotSynchronized { .. } => vec![
                "Configure time synchronization on every device",
                "Allow a larger time difference",
            ],
        }
    }

    /// Returns the device fault, if this error is one.
    pub fn protocol_fault(&self) -> Option<&ProtocolFault> {
        match self {
            ScannerError::Protocol(fault) => Some(fault),
            _ => None,
        }
    }

    /// Helper constructor for transport faults.
    pub fn connection_aborted(reason: impl Into<String>) -> Self {
        ScannerError::ConnectionAbort { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport faults with source.
    pub fn connection_aborted_with_source(
        reason: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        ScannerError::ConnectionAbort { reason: reason.into(), source: Some(source.into()) }
    }

    /// Helper constructor for elapsed timeouts, which are transport faults.
    pub fn timed_out(operation: &str, duration: Duration) -> Self {
        ScannerError::ConnectionAbort {
            reason: format!("{} timed out after {:?}", operation, duration),
            source: None,
        }
    }

    /// Helper constructor for corrupted recordings.
    pub fn stream_corrupted(details: impl Into<String>) -> Self {
        ScannerError::StreamCorrupted { details: details.into() }
    }

    /// Helper constructor for decode errors.
    pub fn decode(context: impl Into<String>, details: impl std::fmt::Display) -> Self {
        ScannerError::Decode { context: context.into(), details: details.to_string() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        ScannerError::File { path, source }
    }

    /// Helper constructor for I/O errors with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ScannerError::Io { context: context.into(), source }
    }
}

impl From<prost::DecodeError> for ScannerError {
    fn from(err: prost::DecodeError) -> Self {
        ScannerError::decode("protobuf message", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(test)]
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_carry_their_context(
            reason in ".*",
            details in ".*",
            duration_ms in 1u64..60000u64
          ) {
            let aborted = ScannerError::connection_aborted(reason.clone());
            prop_assert!(aborted.to_string().contains(&reason));

            let corrupted = ScannerError::stream_corrupted(details.clone());
            prop_assert!(corrupted.to_string().contains(&details));

            let timeout = ScannerError::timed_out("connect", Duration::from_millis(duration_ms));
            let is_abort = matches!(timeout, ScannerError::ConnectionAbort { .. });
            prop_assert!(is_abort);
            prop_assert!(timeout.to_string().contains("connect"));
          }

          #[test]
          fn protocol_faults_pass_through_display(
            parameter in "[a-z.]{1,20}",
            minimum in -100.0f32..0.0f32,
            maximum in 0.0f32..100.0f32,
          ) {
            let fault = ProtocolFault::NotInRange {
              parameter: parameter.clone(),
              minimum,
              maximum,
              requested: maximum + 1.0,
              unit: String::new(),
            };
            let error = ScannerError::from(fault.clone());
            prop_assert_eq!(error.to_string(), fault.to_string());
            prop_assert_eq!(error.protocol_fault(), Some(&fault));
          }

          #[test]
          fn error_source_chaining_preserves_information(
            base_message in ".*",
            reasons in prop::collection::vec(".*", 1..5)
          ) {
            let mut current: Box<dyn std::error::Error + Send + Sync> =
              Box::new(std::io::Error::other(base_message.clone()));
            for reason in &reasons {
              current = Box::new(ScannerError::connection_aborted_with_source(reason.clone(), current));
            }

            let mut depth = 0;
            let mut source = Some(current.as_ref() as &(dyn std::error::Error + 'static));
            let mut last = String::new();
            while let Some(err) = source {
              depth += 1;
              last = err.to_string();
              source = err.source();
            }
            prop_assert_eq!(depth, reasons.len() + 1);
            prop_assert_eq!(last, base_message);
          }
        }
    }

    #[test]
    fn transport_faults_are_retryable() {
        assert!(ScannerError::connection_aborted("reset").is_retryable());
        assert!(!ScannerError::EndOfStream.is_retryable());
        assert!(!ScannerError::stream_corrupted("bad length").is_retryable());
        assert!(ScannerError::from(ProtocolFault::ScannerBusy).is_retryable());
        assert!(!ScannerError::from(ProtocolFault::NotFound).is_retryable());
    }

    #[test]
    fn every_error_has_suggestions() {
        let errors = [
            ScannerError::connection_aborted("reset"),
            ScannerError::from(ProtocolFault::HardwareError),
            ScannerError::stream_corrupted("x"),
            ScannerError::EndOfStream,
            ScannerError::InvalidOperation { operation: "seek_to_first_frame", mode: "live" },
            ScannerError::decode("frame", "bad column"),
            ScannerError::UnexpectedResponse { request: "status", received: "hello" },
            ScannerError::file_error(
                PathBuf::from("/tmp/x.bfpc"),
                std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
            ),
            ScannerError::NotSynchronized { details: "drift".to_string() },
        ];
        for error in errors {
            assert!(!error.recovery_suggestions().is_empty(), "{error:?}");
        }
    }

    #[test]
    fn invalid_operation_names_operation_and_mode() {
        let error = ScannerError::InvalidOperation { operation: "is_end_of_stream", mode: "live" };
        assert_eq!(error.to_string(), "is_end_of_stream cannot be used with a live stream");
    }
}
