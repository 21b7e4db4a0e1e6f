/// Errors that can occur on a BLE connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The other side of the connection has gone away.
    #[error("connection closed")]
    Closed,

    /// The notification queue is full.
    #[error("notification queue full")]
    QueueFull,
}

pub type Result<T> = std::result::Result<T, TransportError>;
