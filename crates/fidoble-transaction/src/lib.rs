//! FIDO BLE request/response transactions.
//!
//! [`FrameTransaction`] is the sans-IO core: it fragments a request frame to
//! the control point length, writes the fragments one at a time, reassembles
//! the response from status notifications and supervises the device timeout.
//! Every request ends in exactly one completion.
//!
//! With the `async` feature, [`BleTransport`] drives a transaction over a
//! [`fidoble_transport::BleConnection`] on tokio.

pub mod error;
pub mod transaction;

#[cfg(feature = "async")]
pub mod driver;

#[cfg(feature = "async")]
pub use driver::BleTransport;
pub use error::{Result, StateError, TransactionError};
pub use transaction::{
    FrameTransaction, TransactionAction, TransactionConfig, DEFAULT_DEVICE_TIMEOUT,
};
