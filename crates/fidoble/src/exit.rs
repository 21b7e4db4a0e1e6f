use std::fmt;
use std::io;

use fidoble_frame::FrameError;
use fidoble_transaction::TransactionError;

// Process exit codes. 64 is EX_USAGE; 124 matches timeout(1).
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut => TIMEOUT,
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => DATA_INVALID,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    let code = match err {
        FrameError::ControlPointTooShort { .. } => USAGE,
        _ => DATA_INVALID,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transaction_error(context: &str, err: &TransactionError) -> CliError {
    let code = match err {
        TransactionError::ControlPointTooShort { .. } => USAGE,
        TransactionError::Encoding(_)
        | TransactionError::MalformedInitializationFragment(_)
        | TransactionError::MalformedContinuationFragment(_)
        | TransactionError::InvalidKeepAlive
        | TransactionError::InvalidErrorFrame
        | TransactionError::UnexpectedCommand { .. } => DATA_INVALID,
        TransactionError::Timeout(_) => TIMEOUT,
        TransactionError::WriteFailed
        | TransactionError::Device(_)
        | TransactionError::Cancelled
        | TransactionError::Disconnected => FAILURE,
        TransactionError::State(_) => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use fidoble_frame::{Frame, FrameCommand};

    use super::*;

    #[test]
    fn transaction_errors_map_to_exit_codes() {
        let cases = [
            (TransactionError::Timeout(Duration::from_secs(3)), TIMEOUT),
            (
                TransactionError::ControlPointTooShort { length: 2, min: 3 },
                USAGE,
            ),
            (TransactionError::InvalidKeepAlive, DATA_INVALID),
            (
                TransactionError::Device(Frame::new(FrameCommand::Error, vec![0x06])),
                FAILURE,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(transaction_error("simulate", &err).code, code, "{err}");
        }
    }

    #[test]
    fn frame_errors_map_to_exit_codes() {
        let short = FrameError::ControlPointTooShort { length: 1, min: 3 };
        assert_eq!(frame_error("fragment", short).code, USAGE);
        assert_eq!(
            frame_error("assemble", FrameError::UnknownCommand(0x01)).code,
            DATA_INVALID
        );
    }
}
