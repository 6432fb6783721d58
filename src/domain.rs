//! src/domain.rs
//!
//! Core data structures shared by the broker, the drag session and the
//! controller: session identity, screen geometry, drop targets and the
//! serialized forms of a dragged node and of the pointer event that started
//! the drag.

use serde::{Deserialize, Serialize};
use std::fmt;

// --- Session Identity ---

/// An opaque token generated once per window instance. Used to recognise the
/// window's own messages when the broker echoes them back.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a fresh random identity.
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::random();
        Self(hex::encode(bytes))
    }

    /// Wraps an identity received from a peer. Empty strings are rejected.
    pub fn from_wire(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        (!raw.is_empty()).then_some(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.0.get(..8).unwrap_or(&self.0);
        write!(f, "session::{}", short)
    }
}

// --- Geometry ---

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }
}

/// A window's absolute desktop position and viewport size at one instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowGeometry {
    pub screen_x: f64,
    pub screen_y: f64,
    pub inner_width: f64,
    pub inner_height: f64,
}

impl WindowGeometry {
    pub fn new(screen_x: f64, screen_y: f64, inner_width: f64, inner_height: f64) -> Self {
        Self {
            screen_x,
            screen_y,
            inner_width,
            inner_height,
        }
    }
}

// --- Drop targets ---

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DockLocation {
    Top,
    Bottom,
    Left,
    Right,
    #[default]
    Center,
}

impl DockLocation {
    /// The half of `outer` a node docked at this location would occupy.
    pub fn dock_rect(self, outer: Rect) -> Rect {
        match self {
            DockLocation::Top => Rect::new(outer.x, outer.y, outer.width, outer.height / 2.0),
            DockLocation::Bottom => Rect::new(
                outer.x,
                outer.y + outer.height / 2.0,
                outer.width,
                outer.height / 2.0,
            ),
            DockLocation::Left => Rect::new(outer.x, outer.y, outer.width / 2.0, outer.height),
            DockLocation::Right => Rect::new(
                outer.x + outer.width / 2.0,
                outer.y,
                outer.width / 2.0,
                outer.height,
            ),
            DockLocation::Center => outer,
        }
    }
}

/// A resolved place where the dragged node would land if released now.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DropInfo {
    pub node_id: String,
    pub location: DockLocation,
    /// Insertion index within the target; `None` means "append / whole target".
    pub index: Option<usize>,
    /// Rectangle to show as the outline preview, in layout coordinates.
    pub rect: Rect,
}

// --- Serialized payloads ---

/// Enough of a draggable node to rebuild a placeholder in another window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DragNode {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rect: Option<Rect>,
    /// Any further node attributes, carried through untouched.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl DragNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rect: None,
            attributes: serde_json::Map::new(),
        }
    }

    pub fn with_rect(mut self, rect: Rect) -> Self {
        self.rect = Some(rect);
        self
    }

    pub fn to_serializable(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    pub fn from_serializable(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

/// A pointer event as seen by one window. Positions are client coordinates
/// of that window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub kind: String,
    pub client_x: f64,
    pub client_y: f64,
    /// Non-positional event fields (buttons, modifiers, ...).
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    /// Serialized handle to whatever the event targeted.
    #[serde(default)]
    pub target: Option<String>,
}

impl PointerEvent {
    pub fn new(kind: impl Into<String>, client_x: f64, client_y: f64) -> Self {
        Self {
            kind: kind.into(),
            client_x,
            client_y,
            data: serde_json::Map::new(),
            target: None,
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.client_x, self.client_y)
    }

    /// Strips the positional fields so the rest can travel inside `InitDrag`.
    pub fn snapshot(&self) -> SerializedEvent {
        SerializedEvent {
            kind: self.kind.clone(),
            event_data: self.data.clone(),
            serialized_event_target: self.target.clone().unwrap_or_default(),
        }
    }

    /// Rebuilds an equivalent event at a translated position.
    pub fn reconstruct(snapshot: &SerializedEvent, client_x: f64, client_y: f64) -> Self {
        Self {
            kind: snapshot.kind.clone(),
            client_x,
            client_y,
            data: snapshot.event_data.clone(),
            target: (!snapshot.serialized_event_target.is_empty())
                .then(|| snapshot.serialized_event_target.clone()),
        }
    }
}

/// Wire form of the pointer event that started a cross-window drag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub event_data: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub serialized_event_target: String,
}
