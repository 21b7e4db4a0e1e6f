use std::time::Duration;

use fidoble_frame::{Frame, FrameCommand, FrameError};

/// Why a transaction ended without a matching response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    /// The control point cannot carry a fragment header; nothing was written.
    #[error("control point length too short ({length} bytes, min {min})")]
    ControlPointTooShort { length: usize, min: usize },

    /// The request frame could not be split into fragments.
    #[error("request frame cannot be fragmented: {0}")]
    Encoding(#[source] FrameError),

    /// The connection reported a failed control point write.
    #[error("control point write failed")]
    WriteFailed,

    /// The first response fragment did not parse.
    #[error("malformed frame initialization fragment: {0}")]
    MalformedInitializationFragment(#[source] FrameError),

    /// A later response fragment did not parse or was rejected by the assembler.
    #[error("malformed frame continuation fragment: {0}")]
    MalformedContinuationFragment(#[source] FrameError),

    /// A `KeepAlive` frame did not carry exactly one status byte.
    #[error("invalid keep-alive frame")]
    InvalidKeepAlive,

    /// An `Error` frame did not carry exactly one status byte.
    #[error("invalid error frame")]
    InvalidErrorFrame,

    /// The authenticator answered with a valid `Error` frame.
    #[error("authenticator reported error {}", describe_device_error(.0))]
    Device(Frame),

    /// The response command matches neither the request nor `KeepAlive`/`Error`.
    #[error("unexpected response command {actual} (request was {expected})")]
    UnexpectedCommand {
        expected: FrameCommand,
        actual: FrameCommand,
    },

    /// No write acknowledgement or response fragment within the device timeout.
    #[error("device timed out after {0:?}")]
    Timeout(Duration),

    /// The transaction was cancelled by its owner.
    #[error("transaction cancelled")]
    Cancelled,

    /// The notification stream closed mid-transaction.
    #[error("connection closed")]
    Disconnected,

    /// The transaction was driven out of order.
    #[error(transparent)]
    State(#[from] StateError),
}

impl TransactionError {
    /// The authenticator's `Error` frame, if this is a device-reported error.
    pub fn frame(&self) -> Option<&Frame> {
        match self {
            TransactionError::Device(frame) => Some(frame),
            _ => None,
        }
    }

    /// Consume the error and return the authenticator's `Error` frame, if any.
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            TransactionError::Device(frame) => Some(frame),
            _ => None,
        }
    }
}

fn describe_device_error(frame: &Frame) -> String {
    match frame.error_code() {
        Some(code) => code.to_string(),
        None => format!("{:02x?}", frame.data().as_ref()),
    }
}

/// Precondition violations: the caller drove the state machine out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// A new request was started while another one is outstanding.
    #[error("a request is already in flight")]
    RequestInFlight,

    /// A write acknowledgement arrived with no control point write pending.
    #[error("no control point write is pending")]
    NoPendingWrite,
}

pub type Result<T> = std::result::Result<T, TransactionError>;
