//! src/session/mod.rs
//!
//! Defines the `DragSession`, the per-window half of the cross-window
//! handshake. It owns the window's identity, remembers which peer (if any)
//! has claimed the current drag, and decides which protocol message a local
//! event turns into. It never touches the network itself: every operation
//! returns the message to post, and the caller hands it to the outbox.

use crate::domain::{DragNode, Point, SerializedEvent, SessionId, WindowGeometry};
use std::time::Duration;
use tokio::time::Instant;

pub mod protocol;

use protocol::{InitDrag, MessageBody, ProtocolMessage, RemotePointer};

#[derive(Clone, Debug, PartialEq)]
pub enum SessionState {
    Idle,
    /// A `Ping` is out and nobody has claimed the drag yet.
    Probing { since: Instant },
    /// `listener` answered positively. `init_sent` flips once `InitDrag` went out.
    Bound { listener: SessionId, init_sent: bool },
}

/// What the origin window is dragging, in the form a peer can rebuild.
#[derive(Clone, Copy, Debug)]
pub struct OutgoingDrag<'a> {
    pub node: &'a DragNode,
    pub event: Option<&'a SerializedEvent>,
}

#[derive(Debug)]
pub struct DragSession {
    id: SessionId,
    state: SessionState,
}

impl Default for DragSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DragSession {
    pub fn new() -> Self {
        Self::with_id(SessionId::generate())
    }

    pub fn with_id(id: SessionId) -> Self {
        Self {
            id,
            state: SessionState::Idle,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn listener(&self) -> Option<&SessionId> {
        match &self.state {
            SessionState::Bound { listener, .. } => Some(listener),
            _ => None,
        }
    }

    /// True once a peer has claimed the drag and received `InitDrag`.
    pub fn has_handed_off(&self) -> bool {
        matches!(self.state, SessionState::Bound { init_sent: true, .. })
    }

    pub fn is_self_echo(&self, msg: &ProtocolMessage) -> bool {
        msg.sender == self.id
    }

    pub fn message(&self, body: MessageBody) -> ProtocolMessage {
        ProtocolMessage::new(self.id.clone(), body)
    }

    /// The local pointer is outside this window during a drag. `client` has
    /// X already converted to screen-absolute and Y window-relative.
    pub fn on_pointer_outside(
        &mut self,
        client: Point,
        geometry: WindowGeometry,
        drag: Option<OutgoingDrag<'_>>,
        now: Instant,
    ) -> Option<ProtocolMessage> {
        let pointer = RemotePointer {
            client,
            origin: geometry,
        };
        match &mut self.state {
            SessionState::Idle => {
                self.state = SessionState::Probing { since: now };
                Some(self.message(MessageBody::Ping { client }))
            }
            SessionState::Probing { .. } => Some(self.message(MessageBody::Ping { client })),
            SessionState::Bound { init_sent, .. } if *init_sent => {
                Some(self.message(MessageBody::CoordinatesUpdate(pointer)))
            }
            SessionState::Bound { init_sent, listener } => {
                let Some(drag) = drag else {
                    tracing::debug!(listener = %listener, "Peer bound but nothing to hand over");
                    return None;
                };
                *init_sent = true;
                Some(self.message(MessageBody::InitDrag(Box::new(InitDrag {
                    pointer,
                    node: drag.node.clone(),
                    event: drag.event.cloned(),
                }))))
            }
        }
    }

    /// The local drag was released. Returns the `Drop` to broadcast and
    /// returns the session to idle.
    pub fn on_release(&mut self, client: Point, geometry: WindowGeometry) -> ProtocolMessage {
        let body = if self.has_handed_off() {
            MessageBody::Drop(Some(RemotePointer {
                client,
                origin: geometry,
            }))
        } else {
            MessageBody::Drop(None)
        };
        self.state = SessionState::Idle;
        self.message(body)
    }

    /// A bare `Drop`: tells every remote listener to cancel.
    pub fn cancel(&mut self) -> ProtocolMessage {
        self.state = SessionState::Idle;
        self.message(MessageBody::Drop(None))
    }

    /// A peer claimed the drag. Only a pending probe can be claimed; the first
    /// responder wins.
    pub fn on_positive_response(&mut self, from: &SessionId) -> bool {
        if !matches!(self.state, SessionState::Probing { .. }) {
            tracing::trace!(peer = %from, "Ignoring unsolicited positive ping response");
            return false;
        }
        tracing::debug!(listener = %from, "Peer claimed the drag");
        self.state = SessionState::Bound {
            listener: from.clone(),
            init_sent: false,
        };
        true
    }

    /// A peer reported the pointer is not over it. Ends a probe outright;
    /// unbinds only when it comes from the current listener.
    pub fn on_negative_response(&mut self, from: &SessionId) -> bool {
        let release = match &self.state {
            SessionState::Probing { .. } => true,
            SessionState::Bound { listener, .. } => listener == from,
            SessionState::Idle => false,
        };
        if release {
            tracing::debug!(peer = %from, "Listener released the drag");
            self.state = SessionState::Idle;
        }
        release
    }

    /// Gives up on a probe nobody answered within `timeout`.
    pub fn expire_probe(&mut self, now: Instant, timeout: Duration) -> bool {
        match self.state {
            SessionState::Probing { since } if now.duration_since(since) >= timeout => {
                tracing::debug!(session = %self.id, "Handshake timed out");
                self.state = SessionState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Deadline of the pending probe, if any.
    pub fn probe_deadline(&self, timeout: Duration) -> Option<Instant> {
        match self.state {
            SessionState::Probing { since } => Some(since + timeout),
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.state = SessionState::Idle;
    }
}
