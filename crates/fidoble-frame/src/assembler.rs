use bytes::BytesMut;
use tracing::debug;

use crate::codec::{ContinuationFragment, Frame, InitializationFragment, SEQUENCE_MASK};
use crate::command::FrameCommand;
use crate::error::{FrameError, Result};

/// Reassembles a [`Frame`] from its fragments.
///
/// Created from the initialization fragment; continuation fragments must
/// follow in sequence order and may not carry more data than the
/// initialization fragment declared.
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    command: FrameCommand,
    data_length: usize,
    data: BytesMut,
    sequence: u8,
}

impl FrameAssembler {
    /// Start assembling from an initialization fragment.
    pub fn new(fragment: &InitializationFragment) -> Self {
        let data_length = usize::from(fragment.data_length());
        let mut data = BytesMut::with_capacity(data_length);
        data.extend_from_slice(fragment.data());
        Self {
            command: fragment.command(),
            data_length,
            data,
            sequence: 0,
        }
    }

    /// Add the next continuation fragment.
    pub fn add_fragment(&mut self, fragment: &ContinuationFragment) -> Result<()> {
        if fragment.sequence() != self.sequence {
            debug!(
                expected = self.sequence,
                actual = fragment.sequence(),
                "continuation fragment out of sequence"
            );
            return Err(FrameError::InvalidSequence {
                expected: self.sequence,
                actual: fragment.sequence(),
            });
        }
        let total = self.data.len() + fragment.data().len();
        if total > self.data_length {
            return Err(FrameError::LengthMismatch {
                declared: self.data_length,
                actual: total,
            });
        }

        self.data.extend_from_slice(fragment.data());
        self.sequence = self.sequence.wrapping_add(1) & SEQUENCE_MASK;
        Ok(())
    }

    /// Whether all declared payload bytes have arrived.
    pub fn is_done(&self) -> bool {
        self.data.len() >= self.data_length
    }

    /// Command of the frame being assembled.
    pub fn command(&self) -> FrameCommand {
        self.command
    }

    /// The completed frame, or `None` while fragments are missing.
    pub fn frame(&self) -> Option<Frame> {
        self.is_done()
            .then(|| Frame::new(self.command, self.data.clone().freeze()))
    }

    /// Consume the assembler and return the completed frame.
    pub fn into_frame(self) -> Option<Frame> {
        if !self.is_done() {
            return None;
        }
        Some(Frame::new(self.command, self.data.freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    fn reassemble(frame: &Frame, max_fragment_size: usize) -> Frame {
        let (init, conts) = frame.to_fragments(max_fragment_size).unwrap();
        let mut assembler = FrameAssembler::new(&init);
        for cont in &conts {
            assert!(!assembler.is_done());
            assembler.add_fragment(cont).unwrap();
        }
        assert!(assembler.is_done());
        assembler.into_frame().unwrap()
    }

    #[test]
    fn fragmentation_roundtrip_across_control_points() {
        let frame = Frame::new(FrameCommand::Msg, payload(300));
        for max_fragment_size in [3, 4, 20, 64, 512] {
            assert_eq!(reassemble(&frame, max_fragment_size), frame);
        }
    }

    #[test]
    fn roundtrip_through_wire_bytes() {
        let frame = Frame::new(FrameCommand::Ping, payload(45));
        let (init, conts) = frame.to_fragments(20).unwrap();

        let mut wire = BytesMut::new();
        init.serialize(&mut wire);
        let mut assembler = FrameAssembler::new(&InitializationFragment::parse(&wire).unwrap());
        for cont in &conts {
            wire.clear();
            cont.serialize(&mut wire);
            let parsed = ContinuationFragment::parse(&wire).unwrap();
            assembler.add_fragment(&parsed).unwrap();
        }

        assert_eq!(assembler.into_frame().unwrap(), frame);
    }

    #[test]
    fn empty_frame_is_done_immediately() {
        let init = InitializationFragment::new(FrameCommand::Msg, 0, bytes::Bytes::new());
        let assembler = FrameAssembler::new(&init);
        assert!(assembler.is_done());
        assert_eq!(
            assembler.frame().unwrap(),
            Frame::new(FrameCommand::Msg, bytes::Bytes::new())
        );
    }

    #[test]
    fn incomplete_frame_not_available() {
        let init = InitializationFragment::new(FrameCommand::Msg, 4, &b"ab"[..]);
        let assembler = FrameAssembler::new(&init);
        assert!(!assembler.is_done());
        assert!(assembler.frame().is_none());
        assert!(assembler.into_frame().is_none());
    }

    #[test]
    fn out_of_sequence_rejected() {
        let init = InitializationFragment::new(FrameCommand::Msg, 4, &b"ab"[..]);
        let mut assembler = FrameAssembler::new(&init);

        let err = assembler
            .add_fragment(&ContinuationFragment::new(1, &b"cd"[..]))
            .unwrap_err();
        assert_eq!(
            err,
            FrameError::InvalidSequence {
                expected: 0,
                actual: 1
            }
        );
    }

    #[test]
    fn overlong_continuation_rejected() {
        let init = InitializationFragment::new(FrameCommand::Msg, 3, &b"ab"[..]);
        let mut assembler = FrameAssembler::new(&init);

        let err = assembler
            .add_fragment(&ContinuationFragment::new(0, &b"cd"[..]))
            .unwrap_err();
        assert!(matches!(err, FrameError::LengthMismatch { declared: 3, actual: 4 }));
    }

    #[test]
    fn rejected_fragment_leaves_state_untouched() {
        let init = InitializationFragment::new(FrameCommand::Msg, 3, &b"ab"[..]);
        let mut assembler = FrameAssembler::new(&init);

        assert!(assembler
            .add_fragment(&ContinuationFragment::new(0, &b"cd"[..]))
            .is_err());
        assembler
            .add_fragment(&ContinuationFragment::new(0, &b"c"[..]))
            .unwrap();

        assert_eq!(
            assembler.into_frame().unwrap(),
            Frame::new(FrameCommand::Msg, &b"abc"[..])
        );
    }

    #[test]
    fn fragment_after_completion_rejected() {
        let init = InitializationFragment::new(FrameCommand::Msg, 2, &b"ab"[..]);
        let mut assembler = FrameAssembler::new(&init);
        assert!(assembler.is_done());

        assert!(assembler
            .add_fragment(&ContinuationFragment::new(0, &b"c"[..]))
            .is_err());
    }
}
