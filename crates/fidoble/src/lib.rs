//! FIDO authenticator transactions over Bluetooth Low Energy.
//!
//! fidoble fragments authenticator frames to fit a BLE control point,
//! reassembles responses from status notifications and runs exactly one
//! request/response exchange at a time, with device timeouts, keep-alives and
//! authenticator error frames handled along the way.
//!
//! # Crate Structure
//!
//! - [`frame`]: frame commands, fragments and reassembly
//! - [`transport`]: the control point connection abstraction
//! - [`transaction`]: the transaction state machine and its tokio driver
//! - [`simulator`]: a virtual authenticator (behind `simulator` feature)

/// Re-export frame types.
pub mod frame {
    pub use fidoble_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use fidoble_transport::*;
}

/// Re-export transaction types.
pub mod transaction {
    pub use fidoble_transaction::*;
}

#[cfg(feature = "simulator")]
pub mod simulator;
