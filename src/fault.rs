//! Typed faults reported by the device.
//!
//! The device answers a failed request with an error envelope whose populated
//! branch names the failure. [`ProtocolFault`] mirrors those branches one to
//! one; a branch this crate does not know yet becomes
//! [`ProtocolFault::UnknownErrorCode`] carrying the raw field number.

use prost::encoding::{WireType, decode_key, decode_varint};
use thiserror::Error;

use crate::protocol::{Error as ErrorEnvelope, error_kind as kind};

/// Field number of the `error` branch inside a response.
const RESPONSE_ERROR_FIELD: u32 = 1;

/// A structured error reported by the device for a single request.
///
/// The display form is `"<Name>: (errno: N)\n\t<description>"`.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProtocolFault {
    #[error("Unknown: (errno: 1)\n\tAn unknown error occurred: {description}")]
    Unknown { description: String },

    #[error("NotImplemented: (errno: 2)\n\tThe request is not implemented: {reason}")]
    NotImplemented { reason: String },

    #[error("Empty: (errno: 3)\n\tThe request was empty")]
    Empty,

    #[error("ServerImplementation: (errno: 4)\n\tThe device failed to handle the request")]
    ServerImplementation,

    #[error("InvalidRequest: (errno: 5)\n\tThe request is invalid: {validation_error}")]
    InvalidRequest { validation_error: String },

    #[error("ConnectionClosed: (errno: 6)\n\tThe device closed the connection")]
    ConnectionClosed,

    #[error(
        "OutdatedServerProtocol: (errno: 11)\n\tThe device firmware is too old, protocol version {required_version} is required"
    )]
    OutdatedServerProtocol { required_version: u32 },

    #[error(
        "OutdatedClientProtocol: (errno: 12)\n\tThis client is too old, protocol version {required_version} is required"
    )]
    OutdatedClientProtocol { required_version: u32 },

    #[error("ScannerBusy: (errno: 13)\n\tThe device is busy with another request")]
    ScannerBusy,

    #[error("WrongOperationMode: (errno: 14)\n\tThe request is not possible in the current operation mode")]
    WrongOperationMode,

    #[error("NotAllowed: (errno: 15)\n\tThe request is not allowed")]
    NotAllowed,

    #[error("HardwareError: (errno: 16)\n\tThe device reported a hardware error")]
    HardwareError,

    #[error("SystemStop: (errno: 17)\n\tThe device is stopping")]
    SystemStop,

    #[error("NotFound: (errno: 18)\n\tThe requested item was not found")]
    NotFound,

    #[error("UnknownErrorCode: (errno: 21)\n\tThe device reported unknown error code {error_code}")]
    UnknownErrorCode { error_code: u32 },

    #[error(
        "NotInRange: (errno: 22)\n\tParameter '{parameter}' is out of range: requested {requested}{unit}, allowed {minimum}{unit} to {maximum}{unit}"
    )]
    NotInRange { parameter: String, minimum: f32, maximum: f32, requested: f32, unit: String },

    #[error("TimeSyncFailed: (errno: 23)\n\tTime synchronization failed:\n{ntp_daemon_log}")]
    TimeSyncFailed { ntp_daemon_log: String },

    #[error("NoDeviceDiscovered: (errno: 24)\n\tNo device was discovered")]
    NoDeviceDiscovered,

    #[error("NotSupported: (errno: 25)\n\tThe request is not supported: {reason}")]
    NotSupported { reason: String },
}

impl ProtocolFault {
    /// Builds the fault from a decoded envelope.
    ///
    /// `raw_branch` is the field number found in the raw bytes; it is only
    /// consulted when the envelope decoded without a known branch.
    pub fn from_envelope(envelope: &ErrorEnvelope, raw_branch: Option<u32>) -> Self {
        let Some(branch) = &envelope.kind else {
            return ProtocolFault::UnknownErrorCode { error_code: raw_branch.unwrap_or_default() };
        };

        match branch {
            kind::Kind::Unknown(e) => {
                ProtocolFault::Unknown { description: e.description().to_string() }
            }
            kind::Kind::NotImplemented(e) => {
                ProtocolFault::NotImplemented { reason: e.reason().to_string() }
            }
            kind::Kind::Empty(_) => ProtocolFault::Empty,
            kind::Kind::ServerImplementation(_) => ProtocolFault::ServerImplementation,
            kind::Kind::InvalidRequest(e) => {
                ProtocolFault::InvalidRequest { validation_error: e.validation_error().to_string() }
            }
            kind::Kind::ConnectionClosed(_) => ProtocolFault::ConnectionClosed,
            kind::Kind::OutdatedServerProtocol(e) => {
                ProtocolFault::OutdatedServerProtocol { required_version: e.required_version() }
            }
            kind::Kind::OutdatedClientProtocol(e) => {
                ProtocolFault::OutdatedClientProtocol { required_version: e.required_version() }
            }
            kind::Kind::ScannerBusy(_) => ProtocolFault::ScannerBusy,
            kind::Kind::WrongOperationMode(_) => ProtocolFault::WrongOperationMode,
            kind::Kind::NotAllowed(_) => ProtocolFault::NotAllowed,
            kind::Kind::HardwareError(_) => ProtocolFault::HardwareError,
            kind::Kind::SystemStop(_) => ProtocolFault::SystemStop,
            kind::Kind::NotFound(_) => ProtocolFault::NotFound,
            kind::Kind::UnknownErrorCode(e) => {
                ProtocolFault::UnknownErrorCode { error_code: e.error_code() }
            }
            kind::Kind::NotInRange(e) => ProtocolFault::NotInRange {
                parameter: e.parameter().to_string(),
                minimum: e.minimum(),
                maximum: e.maximum(),
                requested: e.requested(),
                unit: e.unit().to_string(),
            },
            kind::Kind::TimeSyncFailed(e) => {
                ProtocolFault::TimeSyncFailed { ntp_daemon_log: e.ntp_daemon_log().to_string() }
            }
            kind::Kind::NoDeviceDiscovered(_) => ProtocolFault::NoDeviceDiscovered,
            kind::Kind::NotSupported(e) => {
                ProtocolFault::NotSupported { reason: e.reason().to_string() }
            }
        }
    }

    /// Error number, equal to the envelope field number.
    pub fn errno(&self) -> u32 {
        match self {
            ProtocolFault::Unknown { .. } => 1,
            ProtocolFault::NotImplemented { .. } => 2,
            ProtocolFault::Empty => 3,
            ProtocolFault::ServerImplementation => 4,
            ProtocolFault::InvalidRequest { .. } => 5,
            ProtocolFault::ConnectionClosed => 6,
            ProtocolFault::OutdatedServerProtocol { .. } => 11,
            ProtocolFault::OutdatedClientProtocol { .. } => 12,
            ProtocolFault::ScannerBusy => 13,
            ProtocolFault::WrongOperationMode => 14,
            ProtocolFault::NotAllowed => 15,
            ProtocolFault::HardwareError => 16,
            ProtocolFault::SystemStop => 17,
            ProtocolFault::NotFound => 18,
            ProtocolFault::UnknownErrorCode { .. } => 21,
            ProtocolFault::NotInRange { .. } => 22,
            ProtocolFault::TimeSyncFailed { .. } => 23,
            ProtocolFault::NoDeviceDiscovered => 24,
            ProtocolFault::NotSupported { .. } => 25,
        }
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProtocolFault::ScannerBusy
                | ProtocolFault::WrongOperationMode
                | ProtocolFault::TimeSyncFailed { .. }
        )
    }

    /// Converts the fault back into the envelope the device would send.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        let marker = kind::Marker {};
        let branch = match self {
            ProtocolFault::Unknown { description } => {
                kind::Kind::Unknown(kind::Unknown { description: Some(description.clone()) })
            }
            ProtocolFault::NotImplemented { reason } => {
                kind::Kind::NotImplemented(kind::NotImplemented { reason: Some(reason.clone()) })
            }
            ProtocolFault::Empty => kind::Kind::Empty(marker),
            ProtocolFault::ServerImplementation => kind::Kind::ServerImplementation(marker),
            ProtocolFault::InvalidRequest { validation_error } => {
                kind::Kind::InvalidRequest(kind::InvalidRequest {
                    validation_error: Some(validation_error.clone()),
                })
            }
            ProtocolFault::ConnectionClosed => kind::Kind::ConnectionClosed(marker),
            ProtocolFault::OutdatedServerProtocol { required_version } => {
                kind::Kind::OutdatedServerProtocol(kind::OutdatedProtocol {
                    required_version: Some(*required_version),
                })
            }
            ProtocolFault::OutdatedClientProtocol { required_version } => {
                kind::Kind::OutdatedClientProtocol(kind::OutdatedProtocol {
                    required_version: Some(*required_version),
                })
            }
            ProtocolFault::ScannerBusy => kind::Kind::ScannerBusy(marker),
            ProtocolFault::WrongOperationMode => kind::Kind::WrongOperationMode(marker),
            ProtocolFault::NotAllowed => kind::Kind::NotAllowed(marker),
            ProtocolFault::HardwareError => kind::Kind::HardwareError(marker),
            ProtocolFault::SystemStop => kind::Kind::SystemStop(marker),
            ProtocolFault::NotFound => kind::Kind::NotFound(marker),
            ProtocolFault::UnknownErrorCode { error_code } => {
                kind::Kind::UnknownErrorCode(kind::UnknownErrorCode {
                    error_code: Some(*error_code),
                })
            }
            ProtocolFault::NotInRange { parameter, minimum, maximum, requested, unit } => {
                kind::Kind::NotInRange(kind::NotInRange {
                    parameter: Some(parameter.clone()),
                    minimum: Some(*minimum),
                    maximum: Some(*maximum),
                    requested: Some(*requested),
                    unit: Some(unit.clone()),
                })
            }
            ProtocolFault::TimeSyncFailed { ntp_daemon_log } => {
                kind::Kind::TimeSyncFailed(kind::TimeSyncFailed {
                    ntp_daemon_log: Some(ntp_daemon_log.clone()),
                })
            }
            ProtocolFault::NoDeviceDiscovered => kind::Kind::NoDeviceDiscovered(marker),
            ProtocolFault::NotSupported { reason } => {
                kind::Kind::NotSupported(kind::NotSupported { reason: Some(reason.clone()) })
            }
        };
        ErrorEnvelope { kind: Some(branch) }
    }
}

/// Finds the field number of the first branch inside the `error` field of a
/// raw response. Returns `None` if the bytes do not contain one.
pub(crate) fn raw_error_branch(response: &[u8]) -> Option<u32> {
    let mut buf = response;
    while !buf.is_empty() {
        let (tag, wire_type) = decode_key(&mut buf).ok()?;
        if tag == RESPONSE_ERROR_FIELD && wire_type == WireType::LengthDelimited {
            let len = usize::try_from(decode_varint(&mut buf).ok()?).ok()?;
            let mut envelope = buf.get(..len)?;
            if envelope.is_empty() {
                return None;
            }
            let (branch, _) = decode_key(&mut envelope).ok()?;
            return Some(branch);
        }
        buf = skip_field(wire_type, buf)?;
    }
    None
}

fn skip_field(wire_type: WireType, mut buf: &[u8]) -> Option<&[u8]> {
    let skip = match wire_type {
        WireType::Varint => {
            decode_varint(&mut buf).ok()?;
            0
        }
        WireType::SixtyFourBit => 8,
        WireType::ThirtyTwoBit => 4,
        WireType::LengthDelimited => usize::try_from(decode_varint(&mut buf).ok()?).ok()?,
        WireType::StartGroup | WireType::EndGroup => return None,
    };
    buf.get(skip..)
}
