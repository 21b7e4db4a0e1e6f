/// Errors that can occur while fragmenting or parsing frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The control point cannot hold an initialization fragment header.
    #[error("control point length too short ({length} bytes, min {min})")]
    ControlPointTooShort { length: usize, min: usize },

    /// The payload does not fit the 16-bit length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The fragment is shorter than its header.
    #[error("truncated fragment ({len} bytes, need at least {min})")]
    Truncated { len: usize, min: usize },

    /// The command byte does not name a known frame command.
    #[error("unknown frame command 0x{0:02x}")]
    UnknownCommand(u8),

    /// The declared frame length disagrees with the carried data.
    #[error("length mismatch (declared {declared} bytes, have {actual})")]
    LengthMismatch { declared: usize, actual: usize },

    /// A continuation fragment arrived out of sequence or with a bad sequence byte.
    #[error("invalid continuation sequence (expected {expected}, got {actual})")]
    InvalidSequence { expected: u8, actual: u8 },
}

pub type Result<T> = std::result::Result<T, FrameError>;
