use std::collections::VecDeque;

use bytes::{BufMut, Bytes, BytesMut};

use crate::command::{ErrorCode, FrameCommand, KeepaliveCode};
use crate::error::{FrameError, Result};

/// Initialization fragment header: command (1) + length (2) = 3 bytes.
pub const INITIALIZATION_HEADER_SIZE: usize = 3;

/// Continuation fragment header: sequence (1) = 1 byte.
pub const CONTINUATION_HEADER_SIZE: usize = 1;

/// Smallest control point that can carry an initialization fragment header.
pub const MIN_CONTROL_POINT_LENGTH: usize = INITIALIZATION_HEADER_SIZE;

/// Largest payload expressible in the 16-bit length field.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Continuation sequence numbers are 7 bits wide.
pub const SEQUENCE_MASK: u8 = 0x7F;

/// A logical FIDO BLE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    command: FrameCommand,
    data: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(command: FrameCommand, data: impl Into<Bytes>) -> Self {
        Self {
            command,
            data: data.into(),
        }
    }

    /// The frame command.
    pub fn command(&self) -> FrameCommand {
        self.command
    }

    /// The frame payload.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Consume the frame and return its payload.
    pub fn into_data(self) -> Bytes {
        self.data
    }

    /// Whether the payload is well-formed for the command.
    ///
    /// `KeepAlive` and `Error` frames must carry exactly one status byte.
    pub fn is_valid(&self) -> bool {
        match self.command {
            FrameCommand::Ping | FrameCommand::Msg | FrameCommand::Cancel => true,
            FrameCommand::KeepAlive | FrameCommand::Error => self.data.len() == 1,
        }
    }

    /// Status code of a `KeepAlive` frame.
    pub fn keepalive_code(&self) -> Option<KeepaliveCode> {
        if self.command != FrameCommand::KeepAlive {
            return None;
        }
        self.data.first().copied().and_then(KeepaliveCode::from_byte)
    }

    /// Status code of an `Error` frame.
    pub fn error_code(&self) -> Option<ErrorCode> {
        if self.command != FrameCommand::Error {
            return None;
        }
        self.data.first().copied().and_then(ErrorCode::from_byte)
    }

    /// Split the frame into fragments of at most `max_fragment_size` bytes.
    ///
    /// The initialization fragment carries the first `max_fragment_size - 3`
    /// payload bytes; every continuation fragment carries up to
    /// `max_fragment_size - 1` bytes, numbered from 0 and wrapping at 0x80.
    pub fn to_fragments(
        &self,
        max_fragment_size: usize,
    ) -> Result<(InitializationFragment, VecDeque<ContinuationFragment>)> {
        if max_fragment_size < MIN_CONTROL_POINT_LENGTH {
            return Err(FrameError::ControlPointTooShort {
                length: max_fragment_size,
                min: MIN_CONTROL_POINT_LENGTH,
            });
        }
        let data_length =
            u16::try_from(self.data.len()).map_err(|_| FrameError::PayloadTooLarge {
                size: self.data.len(),
                max: MAX_PAYLOAD,
            })?;

        let mut remaining = self.data.clone();
        let init_len = remaining
            .len()
            .min(max_fragment_size - INITIALIZATION_HEADER_SIZE);
        let init =
            InitializationFragment::new(self.command, data_length, remaining.split_to(init_len));

        let cont_capacity = max_fragment_size - CONTINUATION_HEADER_SIZE;
        let mut continuations = VecDeque::new();
        let mut sequence = 0u8;
        while !remaining.is_empty() {
            let len = remaining.len().min(cont_capacity);
            let chunk = remaining.split_to(len);
            continuations.push_back(ContinuationFragment::new(sequence, chunk));
            sequence = sequence.wrapping_add(1) & SEQUENCE_MASK;
        }

        Ok((init, continuations))
    }
}

/// First fragment of a frame.
///
/// Wire format:
/// ```text
/// ┌─────────────┬──────────────┬─────────────────────┐
/// │ Command (1) │ Length (2BE) │ Data                │
/// │ 0x81..0xBF  │ total frame  │ leading payload     │
/// └─────────────┴──────────────┴─────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializationFragment {
    command: FrameCommand,
    data_length: u16,
    data: Bytes,
}

impl InitializationFragment {
    /// Create an initialization fragment.
    pub fn new(command: FrameCommand, data_length: u16, data: impl Into<Bytes>) -> Self {
        Self {
            command,
            data_length,
            data: data.into(),
        }
    }

    /// Parse an initialization fragment from raw notification bytes.
    pub fn parse(src: &[u8]) -> Result<Self> {
        if src.len() < INITIALIZATION_HEADER_SIZE {
            return Err(FrameError::Truncated {
                len: src.len(),
                min: INITIALIZATION_HEADER_SIZE,
            });
        }

        let command = FrameCommand::try_from(src[0])?;
        let data_length = u16::from_be_bytes([src[1], src[2]]);
        let data = &src[INITIALIZATION_HEADER_SIZE..];
        if usize::from(data_length) < data.len() {
            return Err(FrameError::LengthMismatch {
                declared: usize::from(data_length),
                actual: data.len(),
            });
        }

        Ok(Self {
            command,
            data_length,
            data: Bytes::copy_from_slice(data),
        })
    }

    /// Append the wire encoding to `dst`.
    pub fn serialize(&self, dst: &mut BytesMut) {
        dst.reserve(INITIALIZATION_HEADER_SIZE + self.data.len());
        dst.put_u8(self.command.into());
        dst.put_u16(self.data_length);
        dst.put_slice(&self.data);
    }

    /// The frame command.
    pub fn command(&self) -> FrameCommand {
        self.command
    }

    /// Total payload length of the whole frame.
    pub fn data_length(&self) -> u16 {
        self.data_length
    }

    /// Payload bytes carried by this fragment.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Wire size of this fragment.
    pub fn wire_size(&self) -> usize {
        INITIALIZATION_HEADER_SIZE + self.data.len()
    }
}

/// Subsequent fragment of a frame: `[sequence][data...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationFragment {
    sequence: u8,
    data: Bytes,
}

impl ContinuationFragment {
    /// Create a continuation fragment.
    pub fn new(sequence: u8, data: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            data: data.into(),
        }
    }

    /// Parse a continuation fragment from raw notification bytes.
    pub fn parse(src: &[u8]) -> Result<Self> {
        let Some((&sequence, data)) = src.split_first() else {
            return Err(FrameError::Truncated {
                len: 0,
                min: CONTINUATION_HEADER_SIZE,
            });
        };
        // A set high bit marks a command byte, never a sequence number.
        if sequence & !SEQUENCE_MASK != 0 {
            return Err(FrameError::InvalidSequence {
                expected: sequence & SEQUENCE_MASK,
                actual: sequence,
            });
        }

        Ok(Self {
            sequence,
            data: Bytes::copy_from_slice(data),
        })
    }

    /// Append the wire encoding to `dst`.
    pub fn serialize(&self, dst: &mut BytesMut) {
        dst.reserve(CONTINUATION_HEADER_SIZE + self.data.len());
        dst.put_u8(self.sequence);
        dst.put_slice(&self.data);
    }

    /// Sequence number, 0..=0x7F.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Payload bytes carried by this fragment.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Wire size of this fragment.
    pub fn wire_size(&self) -> usize {
        CONTINUATION_HEADER_SIZE + self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn single_fragment_frame() {
        let frame = Frame::new(FrameCommand::Msg, payload(10));
        let (init, conts) = frame.to_fragments(64).unwrap();

        assert_eq!(init.command(), FrameCommand::Msg);
        assert_eq!(init.data_length(), 10);
        assert_eq!(init.data().len(), 10);
        assert!(conts.is_empty());
    }

    #[test]
    fn fragments_fit_control_point() {
        let frame = Frame::new(FrameCommand::Msg, payload(50));
        let (init, conts) = frame.to_fragments(20).unwrap();

        assert_eq!(init.wire_size(), 20);
        assert_eq!(init.data().len(), 17);
        // 33 remaining bytes at 19 per continuation fragment.
        assert_eq!(conts.len(), 2);
        assert_eq!(conts[0].wire_size(), 20);
        assert_eq!(conts[1].data().len(), 14);
        assert_eq!(conts[0].sequence(), 0);
        assert_eq!(conts[1].sequence(), 1);
    }

    #[test]
    fn minimal_control_point_carries_no_init_data() {
        let frame = Frame::new(FrameCommand::Ping, payload(4));
        let (init, conts) = frame.to_fragments(3).unwrap();

        assert!(init.data().is_empty());
        assert_eq!(conts.len(), 2);
        assert!(conts.iter().all(|c| c.data().len() <= 2));
    }

    #[test]
    fn sequence_numbers_wrap() {
        let frame = Frame::new(FrameCommand::Msg, payload(500));
        let (_, conts) = frame.to_fragments(4).unwrap();

        assert!(conts.len() > 0x80);
        assert_eq!(conts[0x7F].sequence(), 0x7F);
        assert_eq!(conts[0x80].sequence(), 0);
        assert_eq!(conts[0x81].sequence(), 1);
    }

    #[test]
    fn control_point_too_short() {
        let frame = Frame::new(FrameCommand::Ping, payload(1));
        let err = frame.to_fragments(2).unwrap_err();
        assert!(matches!(err, FrameError::ControlPointTooShort { length: 2, .. }));
    }

    #[test]
    fn payload_too_large() {
        let frame = Frame::new(FrameCommand::Msg, payload(MAX_PAYLOAD + 1));
        let err = frame.to_fragments(512).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn initialization_wire_format() {
        let init = InitializationFragment::new(FrameCommand::Msg, 0x0102, &b"ab"[..]);
        let mut buf = BytesMut::new();
        init.serialize(&mut buf);

        assert_eq!(buf.as_ref(), &[0x83, 0x01, 0x02, b'a', b'b']);
        assert_eq!(InitializationFragment::parse(&buf).unwrap(), init);
    }

    #[test]
    fn continuation_wire_format() {
        let cont = ContinuationFragment::new(5, &b"xyz"[..]);
        let mut buf = BytesMut::new();
        cont.serialize(&mut buf);

        assert_eq!(buf.as_ref(), &[0x05, b'x', b'y', b'z']);
        assert_eq!(ContinuationFragment::parse(&buf).unwrap(), cont);
    }

    #[test]
    fn parse_truncated_initialization() {
        let err = InitializationFragment::parse(&[0x83, 0x00]).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { len: 2, .. }));
    }

    #[test]
    fn parse_unknown_command() {
        let err = InitializationFragment::parse(&[0x42, 0x00, 0x00]).unwrap_err();
        assert_eq!(err, FrameError::UnknownCommand(0x42));
    }

    #[test]
    fn parse_overlong_initialization() {
        let err = InitializationFragment::parse(&[0x83, 0x00, 0x01, 1, 2]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::LengthMismatch {
                declared: 1,
                actual: 2
            }
        ));
    }

    #[test]
    fn parse_empty_continuation() {
        assert!(matches!(
            ContinuationFragment::parse(&[]),
            Err(FrameError::Truncated { .. })
        ));
    }

    #[test]
    fn parse_continuation_with_command_byte() {
        assert!(matches!(
            ContinuationFragment::parse(&[0x83, 1]),
            Err(FrameError::InvalidSequence { .. })
        ));
    }

    #[test]
    fn validity_rules() {
        assert!(Frame::new(FrameCommand::Msg, Bytes::new()).is_valid());
        assert!(Frame::new(FrameCommand::Ping, payload(9)).is_valid());
        assert!(Frame::new(FrameCommand::KeepAlive, vec![0x01]).is_valid());
        assert!(!Frame::new(FrameCommand::KeepAlive, Bytes::new()).is_valid());
        assert!(!Frame::new(FrameCommand::Error, vec![0x01, 0x02]).is_valid());
    }

    #[test]
    fn status_code_accessors() {
        let keepalive = Frame::new(FrameCommand::KeepAlive, vec![0x02]);
        assert_eq!(keepalive.keepalive_code(), Some(KeepaliveCode::TupNeeded));
        assert_eq!(keepalive.error_code(), None);

        let error = Frame::new(FrameCommand::Error, vec![0x04]);
        assert_eq!(error.error_code(), Some(ErrorCode::InvalidSeq));
        assert_eq!(error.keepalive_code(), None);
    }
}
