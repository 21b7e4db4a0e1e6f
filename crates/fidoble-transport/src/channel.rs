//! In-memory BLE link backed by tokio channels.
//!
//! The host side gets a [`ChannelConnection`] (control point writes) and a
//! [`Notifications`] receiver (status notifications). The device side gets a
//! [`PeerEndpoint`] that sees every write and decides when, and whether, to
//! acknowledge it.

use std::fmt;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::connection::{BleConnection, WriteCallback};
use crate::error::{Result, TransportError};

/// Receiver of status notifications on the host side.
pub type Notifications = mpsc::Receiver<Bytes>;

/// Create a connected host/device pair.
///
/// `capacity` bounds the number of queued status notifications.
pub fn channel_link(capacity: usize) -> (ChannelConnection, Notifications, PeerEndpoint) {
    let (write_tx, write_rx) = mpsc::unbounded_channel();
    let (notify_tx, notify_rx) = mpsc::channel(capacity.max(1));

    let connection = ChannelConnection { writes: write_tx };
    let peer = PeerEndpoint {
        writes: write_rx,
        notifications: notify_tx,
    };
    (connection, notify_rx, peer)
}

/// Host side of an in-memory link.
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    writes: mpsc::UnboundedSender<PendingWrite>,
}

impl BleConnection for ChannelConnection {
    fn write_control_point(&mut self, data: Bytes, on_written: WriteCallback) {
        trace!(len = data.len(), "control point write");
        let write = PendingWrite {
            data,
            ack: Some(on_written),
        };
        // A dropped peer hands the write back; dropping it fails the write.
        if let Err(mpsc::error::SendError(write)) = self.writes.send(write) {
            debug!("peer gone, failing control point write");
            drop(write);
        }
    }
}

/// A control point write awaiting acknowledgement by the device side.
///
/// Dropping it without calling [`PendingWrite::ack`] reports a failed write.
pub struct PendingWrite {
    data: Bytes,
    ack: Option<WriteCallback>,
}

impl PendingWrite {
    /// Bytes written to the control point.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Complete the write with the given outcome.
    pub fn ack(mut self, success: bool) {
        if let Some(ack) = self.ack.take() {
            ack(success);
        }
    }
}

impl Drop for PendingWrite {
    fn drop(&mut self) {
        if let Some(ack) = self.ack.take() {
            ack(false);
        }
    }
}

impl fmt::Debug for PendingWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingWrite")
            .field("len", &self.data.len())
            .field("acked", &self.ack.is_none())
            .finish()
    }
}

/// Device side of an in-memory link.
#[derive(Debug)]
pub struct PeerEndpoint {
    writes: mpsc::UnboundedReceiver<PendingWrite>,
    notifications: mpsc::Sender<Bytes>,
}

impl PeerEndpoint {
    /// Wait for the next control point write. `None` once the host is gone.
    pub async fn next_write(&mut self) -> Option<PendingWrite> {
        self.writes.recv().await
    }

    /// Take a queued control point write without waiting.
    pub fn try_next_write(&mut self) -> Option<PendingWrite> {
        self.writes.try_recv().ok()
    }

    /// Send a status notification to the host.
    pub async fn notify(&self, data: impl Into<Bytes>) -> Result<()> {
        self.notifications
            .send(data.into())
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Send a status notification without waiting for queue space.
    pub fn try_notify(&self, data: impl Into<Bytes>) -> Result<()> {
        self.notifications
            .try_send(data.into())
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => TransportError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<bool>>>, WriteCallback) {
        let acks = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&acks);
        let callback: WriteCallback = Box::new(move |ok| sink.lock().unwrap().push(ok));
        (acks, callback)
    }

    #[tokio::test]
    async fn write_reaches_peer_and_ack_returns() {
        let (mut connection, _notifications, mut peer) = channel_link(4);
        let (acks, callback) = recorder();

        connection.write_control_point(Bytes::from_static(b"\x81\x00\x01\xaa"), callback);
        let write = peer.next_write().await.unwrap();
        assert_eq!(write.data().as_ref(), b"\x81\x00\x01\xaa");
        assert!(acks.lock().unwrap().is_empty());

        write.ack(true);
        assert_eq!(acks.lock().unwrap().as_slice(), &[true]);
    }

    #[tokio::test]
    async fn dropped_write_reports_failure() {
        let (mut connection, _notifications, mut peer) = channel_link(4);
        let (acks, callback) = recorder();

        connection.write_control_point(Bytes::from_static(b"x"), callback);
        drop(peer.next_write().await.unwrap());

        assert_eq!(acks.lock().unwrap().as_slice(), &[false]);
    }

    #[test]
    fn write_after_peer_gone_fails_immediately() {
        let (mut connection, _notifications, peer) = channel_link(4);
        drop(peer);
        let (acks, callback) = recorder();

        connection.write_control_point(Bytes::from_static(b"x"), callback);

        assert_eq!(acks.lock().unwrap().as_slice(), &[false]);
    }

    #[tokio::test]
    async fn notifications_flow_to_host() {
        let (_connection, mut notifications, peer) = channel_link(4);

        peer.notify(&b"\x83\x00\x00"[..]).await.unwrap();
        peer.try_notify(&b"\x82\x00\x01\x01"[..]).unwrap();

        assert_eq!(notifications.recv().await.unwrap().as_ref(), b"\x83\x00\x00");
        assert_eq!(notifications.recv().await.unwrap().as_ref(), b"\x82\x00\x01\x01");
    }

    #[test]
    fn try_notify_reports_full_and_closed() {
        let (_connection, notifications, peer) = channel_link(1);

        peer.try_notify(&b"a"[..]).unwrap();
        assert!(matches!(peer.try_notify(&b"b"[..]), Err(TransportError::QueueFull)));

        drop(notifications);
        assert!(matches!(peer.try_notify(&b"c"[..]), Err(TransportError::Closed)));
    }

    #[test]
    fn try_next_write_is_non_blocking() {
        let (mut connection, _notifications, mut peer) = channel_link(1);
        assert!(peer.try_next_write().is_none());

        let (_acks, callback) = recorder();
        connection.write_control_point(Bytes::from_static(b"x"), callback);
        assert!(peer.try_next_write().is_some());
    }
}
