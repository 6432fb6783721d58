//! src/geometry.rs
//!
//! Translates pointer coordinates between two windows' screen spaces. The only
//! shared reference points are each window's screen origin and viewport size,
//! sampled at different instants, so the translation aims for visually
//! continuous movement rather than exact positions.

use crate::{
    config::VerticalBounds,
    domain::{Point, WindowGeometry},
};

/// `origin` lies entirely to the left of `current`.
pub fn is_left_of(origin: &WindowGeometry, current: &WindowGeometry) -> bool {
    origin.screen_x + origin.inner_width < current.screen_x
}

/// `origin` lies entirely to the right of `current`.
pub fn is_right_of(origin: &WindowGeometry, current: &WindowGeometry) -> bool {
    origin.screen_x > current.screen_x + current.inner_width
}

/// `origin` lies entirely above `current`.
pub fn is_above(origin: &WindowGeometry, current: &WindowGeometry) -> bool {
    origin.screen_y + origin.inner_height < current.screen_y
}

/// `origin` lies entirely below `current`.
pub fn is_below(origin: &WindowGeometry, current: &WindowGeometry) -> bool {
    origin.screen_y > current.screen_y + current.inner_height
}

/// Maps a screen-absolute X sent by `origin` into `current`'s client space.
///
/// `start_x` is the latched reference X of the ongoing external drag; when
/// nothing has been latched yet the current window's left edge stands in.
pub fn translate_x(
    client_x: f64,
    origin: &WindowGeometry,
    current: &WindowGeometry,
    start_x: Option<f64>,
) -> f64 {
    let anchor = start_x.unwrap_or(current.screen_x);
    let right = is_right_of(origin, current);
    let stacked = is_above(origin, current) || is_below(origin, current);

    // Right (with or without below) and overlapping windows map directly.
    // Left (with or without above) measures from the latched reference.
    // Purely stacked windows add back the horizontal gap between the two.
    if is_left_of(origin, current) {
        client_x - anchor
    } else if !right && stacked {
        client_x - current.screen_x + (current.screen_x - origin.screen_x)
    } else {
        client_x - current.screen_x
    }
}

/// Maps a viewport-relative Y sent by `origin` into `current`'s client space.
pub fn translate_y(client_y: f64, origin: &WindowGeometry, current: &WindowGeometry) -> f64 {
    if current.screen_y == origin.screen_y {
        client_y
    } else {
        origin.screen_y - current.screen_y + client_y
    }
}

/// Receiver-side test: is a pointer sent by a peer over this window?
///
/// X must lie in `[screen_x, screen_x + inner_width]`. Y is tested according
/// to `vertical`. The Y on the wire is relative to the sender's window while
/// the bounds are screen-absolute, so `Strict` only gives the right answer
/// for windows that share `screen_y`.
pub fn contains_pointer(
    window: &WindowGeometry,
    client: Point,
    vertical: VerticalBounds,
) -> bool {
    let left = window.screen_x;
    let right = window.screen_x + window.inner_width;
    let top = window.screen_y;
    let bottom = window.screen_y + window.inner_height;

    let x_inside = client.x >= left && client.x <= right;
    let y_inside = match vertical {
        VerticalBounds::Permissive => client.y > top || client.y < bottom,
        VerticalBounds::Strict => client.y >= top && client.y <= bottom,
    };
    x_inside && y_inside
}

/// Per-drag translation state. Holds the reference values latched the first
/// time the vertical origins differ, so horizontal translation stays stable
/// while the windows keep moving.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CoordinateMapper {
    start_x: Option<f64>,
    start_y: Option<f64>,
}

impl CoordinateMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets the latched references. Called when a new external drag begins.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn start_x(&self) -> Option<f64> {
        self.start_x
    }

    pub fn start_y(&self) -> Option<f64> {
        self.start_y
    }

    /// Translates a peer's pointer into this window's client coordinates.
    pub fn translate(
        &mut self,
        client: Point,
        origin: &WindowGeometry,
        current: &WindowGeometry,
    ) -> Point {
        if current.screen_y != origin.screen_y {
            self.start_y.get_or_insert(client.y);
            self.start_x.get_or_insert(client.x);
        }
        Point::new(
            translate_x(client.x, origin, current, self.start_x),
            translate_y(client.y, origin, current),
        )
    }
}
