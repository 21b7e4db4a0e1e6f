//! FIDO BLE framing: frames, fragments and reassembly.
//!
//! A logical [`Frame`] is split into one initialization fragment followed by
//! zero or more continuation fragments, each sized to fit the authenticator's
//! control point characteristic:
//! - Initialization fragment: command byte, 2-byte big-endian total length,
//!   leading payload bytes
//! - Continuation fragment: 7-bit sequence number, trailing payload bytes
//!
//! Incoming fragments are stitched back together by a [`FrameAssembler`].

pub mod assembler;
pub mod codec;
pub mod command;
pub mod error;

pub use assembler::FrameAssembler;
pub use codec::{
    ContinuationFragment, Frame, InitializationFragment, CONTINUATION_HEADER_SIZE,
    INITIALIZATION_HEADER_SIZE, MAX_PAYLOAD, MIN_CONTROL_POINT_LENGTH, SEQUENCE_MASK,
};
pub use command::{ErrorCode, FrameCommand, KeepaliveCode};
pub use error::{FrameError, Result};
