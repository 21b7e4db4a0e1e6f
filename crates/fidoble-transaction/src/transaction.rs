//! Request/response state machine for one FIDO BLE authenticator.
//!
//! [`FrameTransaction`] performs no I/O. Time is passed in, and every entry
//! point returns the [`TransactionAction`]s its caller must execute:
//! - `WriteFragment`: write the bytes to the control point, then report the
//!   outcome through [`FrameTransaction::on_request_fragment_written`]
//! - `Complete`: the single result of the current request
//!
//! Exactly one request/response cycle is outstanding at a time. Request
//! fragments are written strictly one after another; response fragments are
//! fed in through [`FrameTransaction::on_response_fragment`] as status
//! notifications arrive. A response may finish assembling before the last
//! request fragment is acknowledged; it is held until that acknowledgement,
//! except for keep-alives, which only extend the wait.
//!
//! ```text
//!  write_request_frame ──> WriteFragment ──ack──> WriteFragment ──ack──┐
//!                                                                      │
//!        ┌──────────── KeepAlive (restart timeout) <──┐                ↓
//!        ↓                                            │       await response
//!  on_response_fragment ──> assemble ──> done? ──> process ──> Complete
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use fidoble_frame::{
    ContinuationFragment, Frame, FrameAssembler, FrameCommand, InitializationFragment,
    MIN_CONTROL_POINT_LENGTH,
};
use tracing::{debug, error, warn};

use crate::error::{StateError, TransactionError};

/// Default time to wait for a write acknowledgement or the next response fragment.
pub const DEFAULT_DEVICE_TIMEOUT: Duration = Duration::from_secs(3);

/// Configuration for a frame transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionConfig {
    /// Deadline for each write acknowledgement and each response fragment.
    /// Restarted, not accumulated, at every qualifying event.
    pub device_timeout: Duration,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            device_timeout: DEFAULT_DEVICE_TIMEOUT,
        }
    }
}

/// Effects requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionAction {
    /// Write this fragment to the control point.
    WriteFragment(Bytes),
    /// The request finished; deliver this result to its owner.
    Complete(Result<Frame, TransactionError>),
}

/// Fragmenting, reassembling request/response state machine.
#[derive(Debug)]
pub struct FrameTransaction {
    control_point_length: u16,
    config: TransactionConfig,
    request_frame: Option<Frame>,
    request_cont_fragments: VecDeque<ContinuationFragment>,
    response_assembler: Option<FrameAssembler>,
    has_pending_write: bool,
    completion_pending: bool,
    deadline: Option<Instant>,
    buffer: BytesMut,
}

impl FrameTransaction {
    /// Create a transaction for a control point of `control_point_length` bytes.
    pub fn new(control_point_length: u16, config: TransactionConfig) -> Self {
        Self {
            control_point_length,
            config,
            request_frame: None,
            request_cont_fragments: VecDeque::new(),
            response_assembler: None,
            has_pending_write: false,
            completion_pending: false,
            deadline: None,
            buffer: BytesMut::with_capacity(usize::from(control_point_length)),
        }
    }

    /// Maximum number of bytes per control point write.
    pub fn control_point_length(&self) -> u16 {
        self.control_point_length
    }

    /// Current configuration.
    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// No request outstanding and no result owed.
    pub fn is_idle(&self) -> bool {
        self.request_frame.is_none() && !self.completion_pending
    }

    /// Whether a control point write awaits its acknowledgement.
    pub fn has_pending_write(&self) -> bool {
        self.has_pending_write
    }

    /// Deadline of the armed timeout, if any.
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.deadline
    }

    /// Start a request/response cycle.
    ///
    /// The transaction must be idle; starting a second request while one is
    /// outstanding is rejected with [`StateError::RequestInFlight`].
    ///
    /// A control point shorter than 3 bytes yields `Complete(Err(..))`
    /// without writing anything. The completion is returned, never delivered
    /// from inside this call.
    pub fn write_request_frame(
        &mut self,
        frame: Frame,
        now: Instant,
    ) -> Result<Vec<TransactionAction>, StateError> {
        let control_point_length = usize::from(self.control_point_length);
        if control_point_length < MIN_CONTROL_POINT_LENGTH {
            debug!(control_point_length, "control point length too short");
            return Ok(vec![TransactionAction::Complete(Err(
                TransactionError::ControlPointTooShort {
                    length: control_point_length,
                    min: MIN_CONTROL_POINT_LENGTH,
                },
            ))]);
        }

        if !self.is_idle() {
            return Err(StateError::RequestInFlight);
        }

        let (init, cont_fragments) = match frame.to_fragments(control_point_length) {
            Ok(fragments) => fragments,
            Err(err) => {
                error!(%err, "cannot fragment request frame");
                return Ok(vec![TransactionAction::Complete(Err(
                    TransactionError::Encoding(err),
                ))]);
            }
        };

        debug!(
            command = %frame.command(),
            len = frame.data().len(),
            fragments = cont_fragments.len() + 1,
            "writing request frame"
        );
        self.request_frame = Some(frame);
        self.request_cont_fragments = cont_fragments;
        self.completion_pending = true;

        let mut actions = Vec::new();
        self.write_request_fragment(|buf| init.serialize(buf), now, &mut actions);
        Ok(actions)
    }

    /// Report the outcome of the last `WriteFragment`.
    pub fn on_request_fragment_written(
        &mut self,
        success: bool,
        now: Instant,
    ) -> Result<Vec<TransactionAction>, StateError> {
        if !self.has_pending_write {
            return Err(StateError::NoPendingWrite);
        }
        self.has_pending_write = false;
        self.stop_timeout();

        let mut actions = Vec::new();
        if !success {
            error!("control point write failed");
            self.on_error(TransactionError::WriteFailed, &mut actions);
            return Ok(actions);
        }

        if let Some(next) = self.request_cont_fragments.pop_front() {
            self.write_request_fragment(|buf| next.serialize(buf), now, &mut actions);
            return Ok(actions);
        }

        // The whole request is written. The response may already be complete.
        if self
            .response_assembler
            .as_ref()
            .is_some_and(FrameAssembler::is_done)
        {
            self.process_response_frame(now, &mut actions);
            return Ok(actions);
        }

        self.start_timeout(now);
        Ok(actions)
    }

    /// Feed one status notification.
    ///
    /// Fragments arriving while no request is outstanding are discarded.
    pub fn on_response_fragment(&mut self, data: &[u8], now: Instant) -> Vec<TransactionAction> {
        let mut actions = Vec::new();
        if !self.completion_pending {
            warn!(len = data.len(), "discarding unsolicited response fragment");
            return actions;
        }
        self.stop_timeout();

        match self.response_assembler.as_mut() {
            None => match InitializationFragment::parse(data) {
                Ok(fragment) => self.response_assembler = Some(FrameAssembler::new(&fragment)),
                Err(err) => {
                    error!(%err, "malformed frame initialization fragment");
                    self.on_error(
                        TransactionError::MalformedInitializationFragment(err),
                        &mut actions,
                    );
                    return actions;
                }
            },
            Some(assembler) => {
                let added = ContinuationFragment::parse(data)
                    .and_then(|fragment| assembler.add_fragment(&fragment));
                if let Err(err) = added {
                    error!(%err, "malformed frame continuation fragment");
                    self.on_error(
                        TransactionError::MalformedContinuationFragment(err),
                        &mut actions,
                    );
                    return actions;
                }
            }
        }

        let Some(command) = self
            .response_assembler
            .as_ref()
            .filter(|assembler| assembler.is_done())
            .map(FrameAssembler::command)
        else {
            self.start_timeout(now);
            return actions;
        };

        // Keep-alives may be handled before the request is fully acknowledged;
        // anything else waits for the last write acknowledgement.
        if !self.has_pending_write || command == FrameCommand::KeepAlive {
            self.process_response_frame(now, &mut actions);
        } else {
            debug!("response complete before request write acknowledged; holding");
            self.start_timeout(now);
        }
        actions
    }

    /// Fire the timeout if its deadline has passed.
    pub fn handle_timeout(&mut self, now: Instant) -> Vec<TransactionAction> {
        let mut actions = Vec::new();
        match self.deadline {
            Some(deadline) if now >= deadline => {
                warn!(timeout = ?self.config.device_timeout, "device timeout");
                self.on_error(
                    TransactionError::Timeout(self.config.device_timeout),
                    &mut actions,
                );
            }
            _ => {}
        }
        actions
    }

    /// Abandon the outstanding request, completing it with `Cancelled`.
    ///
    /// No-op when idle.
    pub fn cancel(&mut self) -> Vec<TransactionAction> {
        self.abort(TransactionError::Cancelled)
    }

    /// Abandon the outstanding request, completing it with `error`.
    ///
    /// No-op when idle.
    pub fn abort(&mut self, error: TransactionError) -> Vec<TransactionAction> {
        let mut actions = Vec::new();
        if self.is_idle() {
            return actions;
        }
        debug!(%error, "aborting transaction");
        self.on_error(error, &mut actions);
        actions
    }

    fn write_request_fragment(
        &mut self,
        serialize: impl FnOnce(&mut BytesMut),
        now: Instant,
        actions: &mut Vec<TransactionAction>,
    ) {
        self.buffer.clear();
        serialize(&mut self.buffer);
        debug_assert!(!self.has_pending_write, "control point write already pending");
        self.has_pending_write = true;
        actions.push(TransactionAction::WriteFragment(self.buffer.split().freeze()));
        self.start_timeout(now);
    }

    fn process_response_frame(&mut self, now: Instant, actions: &mut Vec<TransactionAction>) {
        let Some(response) = self
            .response_assembler
            .take()
            .and_then(FrameAssembler::into_frame)
        else {
            return;
        };
        let Some(request_command) = self.request_frame.as_ref().map(Frame::command) else {
            warn!(command = %response.command(), "response frame with no request outstanding");
            return;
        };

        if response.command() == request_command {
            self.request_frame = None;
            self.complete(Ok(response), actions);
            return;
        }

        match response.command() {
            FrameCommand::KeepAlive => {
                if !response.is_valid() {
                    error!("invalid keep-alive frame");
                    self.on_error(TransactionError::InvalidKeepAlive, actions);
                    return;
                }
                match response.keepalive_code() {
                    Some(code) => debug!(%code, "CMD_KEEPALIVE"),
                    None => debug!(code = response.data()[0], "CMD_KEEPALIVE (unknown code)"),
                }
                self.start_timeout(now);
            }
            FrameCommand::Error => {
                if !response.is_valid() {
                    error!("invalid error frame");
                    self.on_error(TransactionError::InvalidErrorFrame, actions);
                    return;
                }
                error!(code = ?response.error_code(), "CMD_ERROR");
                self.on_error(TransactionError::Device(response), actions);
            }
            other => {
                error!(command = %other, expected = %request_command, "unexpected response command");
                self.on_error(
                    TransactionError::UnexpectedCommand {
                        expected: request_command,
                        actual: other,
                    },
                    actions,
                );
            }
        }
    }

    fn on_error(&mut self, error: TransactionError, actions: &mut Vec<TransactionAction>) {
        self.request_frame = None;
        self.request_cont_fragments.clear();
        self.response_assembler = None;
        // An unacknowledged write is abandoned; its late acknowledgement is stale.
        self.has_pending_write = false;
        self.stop_timeout();
        // The result may already have been delivered through another path.
        self.complete(Err(error), actions);
    }

    fn complete(
        &mut self,
        result: Result<Frame, TransactionError>,
        actions: &mut Vec<TransactionAction>,
    ) {
        if !self.completion_pending {
            return;
        }
        self.completion_pending = false;
        actions.push(TransactionAction::Complete(result));
    }

    fn start_timeout(&mut self, now: Instant) {
        self.deadline = Some(now + self.config.device_timeout);
    }

    fn stop_timeout(&mut self) {
        self.deadline = None;
    }
}
