//! src/controller/collab.rs
//!
//! The collaborators the controller drives but does not own: the layout
//! model that resolves drop targets and applies mutations, and the preview
//! surface that draws the drag rectangle, outline and edge indicators.

use crate::{
    domain::{DockLocation, DragNode, DropInfo, Rect},
    error::Result,
};

/// A mutation of the layout model committed by a completed drop.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Move `node` (possibly a placeholder rebuilt from another window) next to
    /// or into `to_node`.
    MoveNode {
        node: DragNode,
        to_node: String,
        location: DockLocation,
        index: Option<usize>,
    },
    /// Create a node from `json` next to or into `to_node`.
    AddNode {
        json: DragNode,
        to_node: String,
        location: DockLocation,
        index: Option<usize>,
    },
    /// Remove a node that now lives in another window.
    DeleteNode { node_id: String },
}

impl Action {
    pub fn move_to(node: DragNode, target: &DropInfo) -> Self {
        Action::MoveNode {
            node,
            to_node: target.node_id.clone(),
            location: target.location,
            index: target.index,
        }
    }

    pub fn add_to(json: DragNode, target: &DropInfo) -> Self {
        Action::AddNode {
            json,
            to_node: target.node_id.clone(),
            location: target.location,
            index: target.index,
        }
    }
}

/// The document tree and its layout, as seen by the drag controller.
/// Coordinates are relative to the layout's own rectangle.
pub trait LayoutModel {
    fn find_drop_target(&self, node: &DragNode, x: f64, y: f64) -> Option<DropInfo>;

    fn apply_action(&mut self, action: Action) -> Option<DragNode>;

    /// The rectangle all docking happens within.
    fn outer_rect(&self) -> Rect;

    fn root_id(&self) -> String;

    fn has_maximized_tabset(&self) -> bool {
        false
    }

    /// The selected tab of a tabset target and its rectangle. Only needed when
    /// a custom tab-drag hook is installed.
    fn selected_tab(&self, _tabset_id: &str) -> Option<(String, Rect)> {
        None
    }
}

/// What the drag rectangle shows.
#[derive(Clone, Debug, PartialEq)]
pub enum PreviewContent {
    Text(String),
    Node(DragNode),
}

/// Presentation of a drag in progress.
pub trait DragPreview {
    /// Shows (or moves) the drag rectangle.
    fn show_preview(&mut self, rect: Rect, content: &PreviewContent);

    fn hide_preview(&mut self);

    fn position_outline(&mut self, rect: Rect);

    fn hide_outline(&mut self);

    /// Rendered size of the drag rectangle, used to keep it inside the layout.
    fn preview_size(&self) -> (f64, f64) {
        (0.0, 0.0)
    }

    fn show_edge_indicators(&mut self, _visible: bool) {}

    /// Highlights the hidden border the pointer is near; `Center` clears it.
    fn highlight_edge(&mut self, _location: DockLocation) {}
}

/// Invoked once a drag that created a new node ends. `None` means nothing
/// was created here (cancelled, or handed to another window).
pub type NewNodeCallback = Box<dyn FnOnce(Option<&DragNode>) -> Result<()> + Send>;

/// Invoked instead of a model mutation when a custom destination is dropped on.
pub type CustomDropCallback = Box<dyn FnOnce(&TabDragContext) -> Result<()> + Send>;

/// Invoked when a custom destination is replaced by a different one.
pub type InvalidateCallback = Box<dyn FnOnce() -> Result<()> + Send>;

/// Asked on every move over the selected tab of a tabset; may claim the drop.
pub type TabDragHook =
    Box<dyn FnMut(&TabDragContext) -> Result<Option<CustomDropDestination>> + Send>;

/// Where a drag currently hovers, relative to the selected tab under it.
#[derive(Clone, Debug, PartialEq)]
pub struct TabDragContext {
    pub dragging: DragNode,
    pub over: String,
    pub x: f64,
    pub y: f64,
    pub location: DockLocation,
}

/// A destination claimed by a tab-drag hook.
pub struct CustomDropDestination {
    /// Identifies the destination across moves; an unchanged key does not
    /// trigger invalidation.
    pub key: u64,
    /// Outline rectangle, relative to the tab it was claimed over.
    pub rect: Rect,
    pub cursor: Option<String>,
    pub callback: CustomDropCallback,
    pub invalidated: Option<InvalidateCallback>,
}

impl std::fmt::Debug for CustomDropDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomDropDestination")
            .field("key", &self.key)
            .field("rect", &self.rect)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}
