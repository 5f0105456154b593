use crate::command::Command;
use nusb::transfer::TransferError;
use num_enum::{FromPrimitive, IntoPrimitive};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The primary error type for the `sts-lib` library.
#[derive(Error, Debug)]
pub enum StsError {
    #[error("USB device not found. Is the Ocean Optics STS connected?")]
    DeviceNotFound,

    #[error("Device index {index} out of range, {found} spectrometer(s) connected")]
    IndexOutOfRange { index: usize, found: usize },

    #[error("USB error: {0}")]
    Usb(#[from] nusb::Error),

    #[error("USB transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Timeout after {timeout:?} on endpoint {endpoint:#04x}")]
    TransportTimeout { endpoint: u8, timeout: Duration },

    #[error("Short read on endpoint {endpoint:#04x}: expected {expected} bytes, got {actual}")]
    ShortRead {
        endpoint: u8,
        expected: usize,
        actual: usize,
    },

    #[error("Malformed frame{}: {reason}", .command.as_ref().map(|c| format!(" in reply to {c}")).unwrap_or_default())]
    MalformedFrame {
        command: Option<Command>,
        reason: String,
    },

    #[error("{command} failed with device error {code}")]
    Device {
        command: Command,
        code: DeviceErrorCode,
    },

    #[error("Invalid argument for {command}: {reason}")]
    InvalidArgument { command: Command, reason: String },

    #[error("{0} is not supported by this driver")]
    NotSupported(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StsError {
    /// Raw device error code, if the device reported one.
    pub fn device_code(&self) -> Option<u16> {
        match self {
            StsError::Device { code, .. } => Some((*code).into()),
            _ => None,
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        StsError::MalformedFrame {
            command: None,
            reason: reason.into(),
        }
    }

    /// Names `command` in a malformed-frame error that does not name one yet.
    pub(crate) fn in_reply_to(self, command: Command) -> Self {
        match self {
            StsError::MalformedFrame { command: None, reason } => StsError::MalformedFrame {
                command: Some(command),
                reason,
            },
            other => other,
        }
    }

    pub(crate) fn invalid(command: Command, reason: impl Into<String>) -> Self {
        StsError::InvalidArgument {
            command,
            reason: reason.into(),
        }
    }
}

/// Error numbers carried in the header of a NACK or exception frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum DeviceErrorCode {
    Success = 0,
    InvalidProtocol = 1,
    UnknownMessageType = 2,
    BadChecksum = 3,
    MessageTooLarge = 4,
    PayloadLengthMismatch = 5,
    PayloadDataInvalid = 6,
    DeviceNotReady = 7,
    UnknownChecksumType = 8,
    UnexpectedReset = 9,
    TooManyBuses = 10,
    OutOfMemory = 11,
    NoData = 12,
    InternalError = 13,
    DecryptionFailed = 100,
    InvalidFirmwareLayout = 101,
    WrongPacketSize = 102,
    IncompatibleHardwareRevision = 103,
    IncompatibleFlashMap = 104,
    Deferred = 255,

    #[num_enum(catch_all)]
    Unknown(u16),
}

impl DeviceErrorCode {
    /// Human-readable category for the code.
    pub fn category(&self) -> &'static str {
        match self {
            DeviceErrorCode::Success => "No detectable errors",
            DeviceErrorCode::InvalidProtocol => "Invalid/unsupported protocol",
            DeviceErrorCode::UnknownMessageType => "Unknown message type",
            DeviceErrorCode::BadChecksum => "Bad checksum",
            DeviceErrorCode::MessageTooLarge => "Message too large",
            DeviceErrorCode::PayloadLengthMismatch => "Payload length does not match message type",
            DeviceErrorCode::PayloadDataInvalid => "Payload data invalid",
            DeviceErrorCode::DeviceNotReady => "Device not ready for given message type",
            DeviceErrorCode::UnknownChecksumType => "Unknown checksum type",
            DeviceErrorCode::UnexpectedReset => "Device reset unexpectedly",
            DeviceErrorCode::TooManyBuses => "Commands have come from too many bus interfaces",
            DeviceErrorCode::OutOfMemory => "Out of memory, failed to allocate space to complete request",
            DeviceErrorCode::NoData => "Command is valid, but desired information does not exist",
            DeviceErrorCode::InternalError => "Internal device error, may be unrecoverable",
            DeviceErrorCode::DecryptionFailed => "Could not decrypt properly",
            DeviceErrorCode::InvalidFirmwareLayout => "Firmware layout invalid",
            DeviceErrorCode::WrongPacketSize => "Data packet was wrong size (not 64 bytes)",
            DeviceErrorCode::IncompatibleHardwareRevision => "Hardware revision not compatible with firmware",
            DeviceErrorCode::IncompatibleFlashMap => "Existing flash map not compatible with firmware",
            DeviceErrorCode::Deferred => "Operation deferred, do not ACK or NACK yet",
            DeviceErrorCode::Unknown(_) => "Error undetermined",
        }
    }

    /// Code 255: the device has not finished and the read should be repeated.
    pub fn is_deferred(&self) -> bool {
        matches!(self, DeviceErrorCode::Deferred)
    }
}

impl fmt::Display for DeviceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", u16::from(*self), self.category())
    }
}
