//! BLE control point connection abstraction.
//!
//! A FIDO authenticator is driven through two GATT characteristics:
//! - the control point, written one fragment at a time
//! - the status characteristic, whose notifications carry response fragments
//!
//! [`BleConnection`] is the write half. Notifications are delivered to the
//! transaction layer separately (see `channel::channel_link` behind the
//! `async` feature for an in-memory implementation of both halves).

pub mod connection;
pub mod error;

#[cfg(feature = "async")]
pub mod channel;

pub use connection::{BleConnection, WriteCallback};
pub use error::{Result, TransportError};

#[cfg(feature = "async")]
pub use channel::{channel_link, ChannelConnection, Notifications, PeerEndpoint, PendingWrite};
