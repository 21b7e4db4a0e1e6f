//! Frame commands and the one-byte status codes carried by
//! keep-alive and error frames.

use std::fmt;

use crate::error::FrameError;

/// Command byte of a frame. All commands have the high bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameCommand {
    /// Echo request/response.
    Ping = 0x81,
    /// Sent by the authenticator while it is still processing.
    KeepAlive = 0x82,
    /// Encapsulated CTAP/U2F message.
    Msg = 0x83,
    /// Abort the request currently being processed.
    Cancel = 0xBE,
    /// Authenticator-reported failure.
    Error = 0xBF,
}

impl FrameCommand {
    /// Human-readable command name.
    pub fn name(self) -> &'static str {
        match self {
            FrameCommand::Ping => "PING",
            FrameCommand::KeepAlive => "KEEPALIVE",
            FrameCommand::Msg => "MSG",
            FrameCommand::Cancel => "CANCEL",
            FrameCommand::Error => "ERROR",
        }
    }
}

impl TryFrom<u8> for FrameCommand {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, FrameError> {
        match value {
            0x81 => Ok(FrameCommand::Ping),
            0x82 => Ok(FrameCommand::KeepAlive),
            0x83 => Ok(FrameCommand::Msg),
            0xBE => Ok(FrameCommand::Cancel),
            0xBF => Ok(FrameCommand::Error),
            other => Err(FrameError::UnknownCommand(other)),
        }
    }
}

impl From<FrameCommand> for u8 {
    fn from(command: FrameCommand) -> Self {
        command as u8
    }
}

impl fmt::Display for FrameCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02x})", self.name(), u8::from(*self))
    }
}

/// Status carried by a `KeepAlive` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeepaliveCode {
    /// The authenticator is still working on the request.
    Processing = 0x01,
    /// The authenticator waits for user presence.
    TupNeeded = 0x02,
}

impl KeepaliveCode {
    /// Decode a keep-alive status byte.
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(KeepaliveCode::Processing),
            0x02 => Some(KeepaliveCode::TupNeeded),
            _ => None,
        }
    }
}

impl fmt::Display for KeepaliveCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeepaliveCode::Processing => "PROCESSING",
            KeepaliveCode::TupNeeded => "TUP_NEEDED",
        };
        write!(f, "{name} (0x{:02x})", *self as u8)
    }
}

/// Status carried by an `Error` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    /// The command in the request is unknown or invalid.
    InvalidCmd = 0x01,
    /// A parameter in the request is invalid.
    InvalidPar = 0x02,
    /// The length of the request is invalid.
    InvalidLen = 0x03,
    /// A continuation fragment arrived out of sequence.
    InvalidSeq = 0x04,
    /// The request timed out on the authenticator.
    ReqTimeout = 0x05,
    /// The authenticator is busy with another request.
    Busy = 0x06,
    /// Value not available.
    Na = 0x0A,
    /// Unspecified error.
    Other = 0x7F,
}

impl ErrorCode {
    /// Decode an error status byte.
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(ErrorCode::InvalidCmd),
            0x02 => Some(ErrorCode::InvalidPar),
            0x03 => Some(ErrorCode::InvalidLen),
            0x04 => Some(ErrorCode::InvalidSeq),
            0x05 => Some(ErrorCode::ReqTimeout),
            0x06 => Some(ErrorCode::Busy),
            0x0A => Some(ErrorCode::Na),
            0x7F => Some(ErrorCode::Other),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::InvalidCmd => "INVALID_CMD",
            ErrorCode::InvalidPar => "INVALID_PAR",
            ErrorCode::InvalidLen => "INVALID_LEN",
            ErrorCode::InvalidSeq => "INVALID_SEQ",
            ErrorCode::ReqTimeout => "REQ_TIMEOUT",
            ErrorCode::Busy => "BUSY",
            ErrorCode::Na => "NA",
            ErrorCode::Other => "OTHER",
        };
        write!(f, "{name} (0x{:02x})", *self as u8)
    }
}
