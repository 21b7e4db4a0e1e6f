//! Tokio driver that runs a [`FrameTransaction`] against a live connection.

use std::time::Instant;

use bytes::Bytes;
use fidoble_frame::Frame;
use fidoble_transport::{BleConnection, Notifications};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Result, TransactionError};
use crate::transaction::{FrameTransaction, TransactionAction, TransactionConfig};

type WriteAck = (u64, bool);

/// A BLE authenticator link: control point writes out, status notifications in.
///
/// Requests are serialized by `&mut self`. Dropping a `transact` future
/// mid-flight leaves the request outstanding; the next call abandons it
/// before starting and discards notifications already queued for it.
/// Frames carry no request id, so a reply the device sends for the abandoned
/// request after the next request has gone out is taken as that request's
/// answer.
#[derive(Debug)]
pub struct BleTransport<C> {
    connection: C,
    notifications: Notifications,
    transaction: FrameTransaction,
    acks_tx: mpsc::UnboundedSender<WriteAck>,
    acks_rx: mpsc::UnboundedReceiver<WriteAck>,
    write_id: u64,
}

impl<C: BleConnection> BleTransport<C> {
    pub fn new(
        connection: C,
        notifications: Notifications,
        control_point_length: u16,
        config: TransactionConfig,
    ) -> Self {
        let (acks_tx, acks_rx) = mpsc::unbounded_channel();
        Self {
            connection,
            notifications,
            transaction: FrameTransaction::new(control_point_length, config),
            acks_tx,
            acks_rx,
            write_id: 0,
        }
    }

    /// The underlying state machine.
    pub fn transaction(&self) -> &FrameTransaction {
        &self.transaction
    }

    /// Send `request` and wait for the authenticator's answer.
    pub async fn transact(&mut self, request: Frame) -> Result<Frame> {
        self.transact_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`BleTransport::transact`], abandoning the request once `cancel` fires.
    pub async fn transact_with_cancel(
        &mut self,
        request: Frame,
        cancel: &CancellationToken,
    ) -> Result<Frame> {
        if !self.transaction.is_idle() {
            debug!("abandoning request left by a dropped transact future");
            self.transaction.abort(TransactionError::Cancelled);
        }
        self.drain_stale();

        let actions = self.transaction.write_request_frame(request, now())?;
        if let Some(result) = self.execute(actions) {
            return result;
        }

        loop {
            let deadline = self.transaction.poll_timeout();
            let actions = tokio::select! {
                biased;

                () = cancel.cancelled() => self.transaction.cancel(),

                Some((id, success)) = self.acks_rx.recv() => {
                    if id != self.write_id || !self.transaction.has_pending_write() {
                        trace!(id, "ignoring stale write acknowledgement");
                        continue;
                    }
                    self.transaction.on_request_fragment_written(success, now())?
                }

                notification = self.notifications.recv() => match notification {
                    Some(data) => self.transaction.on_response_fragment(&data, now()),
                    None => self.transaction.abort(TransactionError::Disconnected),
                },

                () = sleep_until(deadline) => self.transaction.handle_timeout(now()),
            };

            if let Some(result) = self.execute(actions) {
                return result;
            }
        }
    }

    fn execute(&mut self, actions: Vec<TransactionAction>) -> Option<Result<Frame>> {
        let mut completed = None;
        for action in actions {
            match action {
                TransactionAction::WriteFragment(data) => self.write(data),
                TransactionAction::Complete(result) => completed = Some(result),
            }
        }
        completed
    }

    fn write(&mut self, data: Bytes) {
        self.write_id = self.write_id.wrapping_add(1);
        let id = self.write_id;
        let acks = self.acks_tx.clone();
        self.connection.write_control_point(
            data,
            Box::new(move |success| {
                // The transport may be gone; the acknowledgement is moot then.
                let _ = acks.send((id, success));
            }),
        );
    }

    fn drain_stale(&mut self) {
        let mut dropped = 0usize;
        while self.notifications.try_recv().is_ok() {
            dropped += 1;
        }
        while self.acks_rx.try_recv().is_ok() {}
        if dropped > 0 {
            debug!(dropped, "discarded stale notifications");
        }
    }
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}
