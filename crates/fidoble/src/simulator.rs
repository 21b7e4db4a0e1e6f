//! Virtual FIDO BLE authenticator.
//!
//! Sits on the device side of a [`channel_link`](crate::transport::channel_link):
//! acknowledges control point writes, reassembles each request frame and
//! answers according to its [`Behavior`], fragmenting the reply to the
//! control point length. Every write and notification is recorded in a
//! [`Transcript`].

use std::fmt;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use fidoble_frame::{
    ContinuationFragment, ErrorCode, Frame, FrameAssembler, FrameCommand, FrameError,
    InitializationFragment, KeepaliveCode,
};
use fidoble_transport::{PeerEndpoint, PendingWrite};
use tracing::{debug, warn};

/// How the virtual authenticator answers a complete request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    /// Reply with the request's command and payload.
    Echo,
    /// Send `count` keep-alives, `interval` apart, then echo.
    KeepAliveThenEcho { count: usize, interval: Duration },
    /// Reply with an `Error` frame carrying this status byte.
    Error(u8),
    /// Acknowledge writes but never reply.
    Silent,
    /// Fail every control point write.
    FailWrite,
    /// Reply with a truncated initialization fragment.
    Malformed,
}

/// Direction of a recorded fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Control point write.
    HostToDevice,
    /// Status notification.
    DeviceToHost,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::HostToDevice => "host->device",
            Direction::DeviceToHost => "device->host",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One fragment on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireEvent {
    pub direction: Direction,
    pub data: Bytes,
    /// Write outcome reported to the host; `None` for notifications.
    pub acked: Option<bool>,
}

/// Everything the virtual authenticator saw and sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    pub events: Vec<WireEvent>,
    /// Requests fully reassembled.
    pub requests: usize,
}

/// Device-side emulation of a FIDO BLE authenticator.
#[derive(Debug)]
pub struct VirtualAuthenticator {
    peer: PeerEndpoint,
    control_point_length: u16,
    behavior: Behavior,
    assembler: Option<FrameAssembler>,
    transcript: Transcript,
}

impl VirtualAuthenticator {
    pub fn new(peer: PeerEndpoint, control_point_length: u16, behavior: Behavior) -> Self {
        Self {
            peer,
            control_point_length,
            behavior,
            assembler: None,
            transcript: Transcript::default(),
        }
    }

    /// Serve requests until the host side goes away.
    pub async fn run(mut self) -> Transcript {
        while let Some(write) = self.peer.next_write().await {
            if !self.on_write(write).await {
                break;
            }
        }
        debug!(requests = self.transcript.requests, "virtual authenticator stopped");
        self.transcript
    }

    /// Handle one control point write. Returns `false` once the host is gone.
    async fn on_write(&mut self, write: PendingWrite) -> bool {
        let data = write.data().clone();
        if self.behavior == Behavior::FailWrite {
            self.record(Direction::HostToDevice, data, Some(false));
            write.ack(false);
            return true;
        }
        self.record(Direction::HostToDevice, data.clone(), Some(true));
        write.ack(true);

        match self.absorb(&data) {
            Ok(Some(request)) => {
                self.transcript.requests += 1;
                debug!(command = %request.command(), len = request.data().len(), "request received");
                self.respond(request).await
            }
            Ok(None) => true,
            Err(err) => {
                warn!(%err, "rejecting malformed request fragment");
                self.assembler = None;
                let code = match err {
                    FrameError::InvalidSequence { .. } => ErrorCode::InvalidSeq,
                    FrameError::UnknownCommand(_) => ErrorCode::InvalidCmd,
                    _ => ErrorCode::InvalidLen,
                };
                self.send(&Frame::new(FrameCommand::Error, vec![code as u8]))
                    .await
            }
        }
    }

    /// Feed a request fragment; yields the request once it is complete.
    fn absorb(&mut self, data: &[u8]) -> Result<Option<Frame>, FrameError> {
        match self.assembler.as_mut() {
            None => {
                let fragment = InitializationFragment::parse(data)?;
                self.assembler = Some(FrameAssembler::new(&fragment));
            }
            Some(assembler) => assembler.add_fragment(&ContinuationFragment::parse(data)?)?,
        }

        if self.assembler.as_ref().is_some_and(FrameAssembler::is_done) {
            return Ok(self.assembler.take().and_then(FrameAssembler::into_frame));
        }
        Ok(None)
    }

    async fn respond(&mut self, request: Frame) -> bool {
        match self.behavior.clone() {
            Behavior::Echo => self.send(&request).await,
            Behavior::KeepAliveThenEcho { count, interval } => {
                let keepalive =
                    Frame::new(FrameCommand::KeepAlive, vec![KeepaliveCode::Processing as u8]);
                for _ in 0..count {
                    tokio::time::sleep(interval).await;
                    if !self.send(&keepalive).await {
                        return false;
                    }
                }
                self.send(&request).await
            }
            Behavior::Error(code) => self.send(&Frame::new(FrameCommand::Error, vec![code])).await,
            Behavior::Silent | Behavior::FailWrite => true,
            Behavior::Malformed => {
                let truncated = Bytes::from(vec![u8::from(request.command())]);
                self.notify(truncated).await
            }
        }
    }

    async fn send(&mut self, frame: &Frame) -> bool {
        let max_fragment_size = usize::from(self.control_point_length);
        let (init, conts) = match frame.to_fragments(max_fragment_size) {
            Ok(fragments) => fragments,
            Err(err) => {
                warn!(%err, "cannot fragment reply, answering INVALID_LEN");
                let invalid = Frame::new(FrameCommand::Error, vec![ErrorCode::InvalidLen as u8]);
                match invalid.to_fragments(max_fragment_size) {
                    Ok(fragments) => fragments,
                    Err(err) => {
                        warn!(%err, "control point too short for any reply");
                        return true;
                    }
                }
            }
        };

        let mut buf = BytesMut::with_capacity(usize::from(self.control_point_length));
        init.serialize(&mut buf);
        if !self.notify(buf.split().freeze()).await {
            return false;
        }
        for cont in &conts {
            cont.serialize(&mut buf);
            if !self.notify(buf.split().freeze()).await {
                return false;
            }
        }
        true
    }

    async fn notify(&mut self, data: Bytes) -> bool {
        self.record(Direction::DeviceToHost, data.clone(), None);
        if self.peer.notify(data).await.is_err() {
            debug!("host closed the notification stream");
            return false;
        }
        true
    }

    fn record(&mut self, direction: Direction, data: Bytes, acked: Option<bool>) {
        self.transcript.events.push(WireEvent {
            direction,
            data,
            acked,
        });
    }
}
