//! src/session/protocol.rs
//!
//! The cross-window protocol messages and their JSON wire form. On the wire
//! every message is one flat object with a numeric `messageType`
//! discriminant; in memory it is a tagged union.

use crate::{
    domain::{DragNode, Point, Rect, SerializedEvent, SessionId, WindowGeometry},
    error::{Error, Result},
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Ping = 0,
    PositivePingResponse = 1,
    NegativePingResponse = 2,
    InitDrag = 3,
    CoordinatesUpdate = 4,
    Drop = 5,
}

impl TryFrom<u8> for MessageKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => MessageKind::Ping,
            1 => MessageKind::PositivePingResponse,
            2 => MessageKind::NegativePingResponse,
            3 => MessageKind::InitDrag,
            4 => MessageKind::CoordinatesUpdate,
            5 => MessageKind::Drop,
            other => {
                return Err(Error::MalformedMessage(format!(
                    "unknown messageType {other}"
                )))
            }
        })
    }
}

/// Pointer position as sent by the originating window: X is screen-absolute,
/// Y is relative to the sender's viewport. Carried together with the
/// sender's geometry at send time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RemotePointer {
    pub client: Point,
    pub origin: WindowGeometry,
}

/// Everything a receiving window needs to continue a drag started elsewhere.
#[derive(Clone, Debug, PartialEq)]
pub struct InitDrag {
    pub pointer: RemotePointer,
    pub node: DragNode,
    pub event: Option<SerializedEvent>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MessageBody {
    Ping { client: Point },
    PositivePingResponse,
    NegativePingResponse,
    InitDrag(Box<InitDrag>),
    CoordinatesUpdate(RemotePointer),
    /// `None` is a bare drop: cancel every remote listener.
    Drop(Option<RemotePointer>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProtocolMessage {
    pub sender: SessionId,
    pub body: MessageBody,
}

impl ProtocolMessage {
    pub fn new(sender: SessionId, body: MessageBody) -> Self {
        Self { sender, body }
    }

    pub fn kind(&self) -> MessageKind {
        match self.body {
            MessageBody::Ping { .. } => MessageKind::Ping,
            MessageBody::PositivePingResponse => MessageKind::PositivePingResponse,
            MessageBody::NegativePingResponse => MessageKind::NegativePingResponse,
            MessageBody::InitDrag(_) => MessageKind::InitDrag,
            MessageBody::CoordinatesUpdate(_) => MessageKind::CoordinatesUpdate,
            MessageBody::Drop(_) => MessageKind::Drop,
        }
    }

    /// The pointer coordinates carried by the message, if any.
    pub fn client_point(&self) -> Option<Point> {
        match &self.body {
            MessageBody::Ping { client } => Some(*client),
            MessageBody::InitDrag(init) => Some(init.pointer.client),
            MessageBody::CoordinatesUpdate(pointer) => Some(pointer.client),
            MessageBody::Drop(pointer) => pointer.map(|p| p.client),
            MessageBody::PositivePingResponse | MessageBody::NegativePingResponse => None,
        }
    }

    pub fn encode(&self) -> Result<String> {
        let wire = WireMessage::try_from(self)?;
        Ok(serde_json::to_string(&wire)?)
    }

    pub fn decode(text: &str) -> Result<Self> {
        let wire: WireMessage = serde_json::from_str(text)?;
        Self::try_from(wire)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message_type: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    drag_node: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    drag_rect: Option<Rect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    event: Option<SerializedEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin_screen_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin_screen_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin_inner_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin_inner_height: Option<f64>,
}

impl WireMessage {
    fn set_pointer(&mut self, pointer: &RemotePointer) {
        self.client_x = Some(pointer.client.x);
        self.client_y = Some(pointer.client.y);
        self.origin_screen_x = Some(pointer.origin.screen_x);
        self.origin_screen_y = Some(pointer.origin.screen_y);
        self.origin_inner_width = Some(pointer.origin.inner_width);
        self.origin_inner_height = Some(pointer.origin.inner_height);
    }

    fn client(&self) -> Option<Point> {
        Some(Point::new(self.client_x?, self.client_y?))
    }

    fn pointer(&self) -> Option<RemotePointer> {
        Some(RemotePointer {
            client: self.client()?,
            origin: WindowGeometry::new(
                self.origin_screen_x?,
                self.origin_screen_y?,
                self.origin_inner_width?,
                self.origin_inner_height?,
            ),
        })
    }
}

impl TryFrom<&ProtocolMessage> for WireMessage {
    type Error = Error;

    fn try_from(msg: &ProtocolMessage) -> Result<Self> {
        let mut wire = WireMessage {
            id: Some(msg.sender.as_str().to_string()),
            message_type: Some(msg.kind() as u8),
            ..WireMessage::default()
        };
        match &msg.body {
            MessageBody::Ping { client } => {
                wire.client_x = Some(client.x);
                wire.client_y = Some(client.y);
            }
            MessageBody::PositivePingResponse | MessageBody::NegativePingResponse => {}
            MessageBody::InitDrag(init) => {
                wire.set_pointer(&init.pointer);
                wire.drag_node = Some(init.node.to_serializable()?);
                wire.drag_rect = init.node.rect;
                wire.event = init.event.clone();
            }
            MessageBody::CoordinatesUpdate(pointer) => wire.set_pointer(pointer),
            MessageBody::Drop(pointer) => {
                if let Some(pointer) = pointer {
                    wire.set_pointer(pointer);
                }
            }
        }
        Ok(wire)
    }
}

impl TryFrom<WireMessage> for ProtocolMessage {
    type Error = Error;

    fn try_from(wire: WireMessage) -> Result<Self> {
        let sender = wire
            .id
            .clone()
            .and_then(SessionId::from_wire)
            .ok_or_else(|| Error::MalformedMessage("missing sender id".into()))?;
        let kind = wire
            .message_type
            .ok_or_else(|| Error::MalformedMessage("missing messageType".into()))
            .and_then(MessageKind::try_from)?;

        let missing = |what: &str| Error::MalformedMessage(format!("{kind:?} without {what}"));

        let body = match kind {
            MessageKind::Ping => MessageBody::Ping {
                client: wire.client().ok_or_else(|| missing("coordinates"))?,
            },
            MessageKind::PositivePingResponse => MessageBody::PositivePingResponse,
            MessageKind::NegativePingResponse => MessageBody::NegativePingResponse,
            MessageKind::InitDrag => {
                let pointer = wire.pointer().ok_or_else(|| missing("pointer geometry"))?;
                let raw_node = wire.drag_node.ok_or_else(|| missing("dragNode"))?;
                let mut node = DragNode::from_serializable(raw_node)?;
                if wire.drag_rect.is_some() {
                    node.rect = wire.drag_rect;
                }
                MessageBody::InitDrag(Box::new(InitDrag {
                    pointer,
                    node,
                    event: wire.event,
                }))
            }
            MessageKind::CoordinatesUpdate => MessageBody::CoordinatesUpdate(
                wire.pointer().ok_or_else(|| missing("pointer geometry"))?,
            ),
            MessageKind::Drop => MessageBody::Drop(wire.pointer()),
        };
        Ok(ProtocolMessage { sender, body })
    }
}
