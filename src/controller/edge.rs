//! src/controller/edge.rs
//!
//! Edge docking: while dragging close to an outer edge of the layout the
//! drop prefers that edge over whatever lies beneath the pointer.

use crate::domain::{DockLocation, DropInfo, Point, Rect};

/// Sizing of the edge indicators, in layout pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeZone {
    pub enabled: bool,
    /// Length of an indicator along its edge. Half of it around each edge's
    /// midpoint forms the centre band.
    pub length: f64,
    /// Distance from an edge that counts as "at" the edge.
    pub width: f64,
}

impl EdgeZone {
    /// Which hidden edge the pointer at `pos` is near. `current` is the
    /// location resolved on the previous move. A pointer outside `outer` is
    /// not near any edge.
    pub fn locate(&self, outer: Rect, pos: Point, current: DockLocation) -> DockLocation {
        if !self.enabled || !outer.contains(pos) {
            return DockLocation::Center;
        }
        let c = outer.center();
        let offset = self.length / 2.0;
        let in_band = (pos.y > c.y - offset && pos.y < c.y + offset)
            || (pos.x > c.x - offset && pos.x < c.x + offset);
        if current == DockLocation::Center && in_band {
            return DockLocation::Center;
        }

        if pos.x <= outer.x + self.width {
            DockLocation::Left
        } else if pos.x >= outer.right() - self.width {
            DockLocation::Right
        } else if pos.y <= outer.y + self.width {
            DockLocation::Top
        } else if pos.y >= outer.bottom() - self.width {
            DockLocation::Bottom
        } else {
            DockLocation::Center
        }
    }
}

/// Applies the edge preference to a resolved target.
pub fn prefer_edge(
    found: Option<DropInfo>,
    edge: DockLocation,
    outer: Rect,
    root_id: impl FnOnce() -> String,
) -> Option<DropInfo> {
    if edge == DockLocation::Center {
        return found;
    }
    Some(DropInfo {
        node_id: root_id(),
        location: edge,
        index: None,
        rect: edge.dock_rect(outer),
    })
}
