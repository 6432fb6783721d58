//! src/controller/mod.rs
//!
//! Defines the `DragController`, which drives one window's drag lifecycle.
//! Local pointer events and protocol messages relayed by the broker both feed
//! it. It decides when a drag is local, when it must be offered to another
//! window, and when a drop (local or remote-originated) mutates the layout.
//!
//! The controller is single-threaded and owns its `DragSession`,
//! `CoordinateMapper` and collaborators outright.

use crate::{
    config::{VerticalBounds, WindowConfig},
    domain::{
        DockLocation, DragNode, DropInfo, Point, PointerEvent, Rect, SerializedEvent, SessionId,
        WindowGeometry,
    },
    error::{Error, Result},
    geometry::{contains_pointer, CoordinateMapper},
    session::{
        protocol::{InitDrag, MessageBody, ProtocolMessage, RemotePointer},
        DragSession, OutgoingDrag, SessionState,
    },
    transport::Outbox,
};
use std::panic::{self, AssertUnwindSafe};
use tokio::time::Instant;

pub mod collab;
pub mod edge;

use collab::{
    Action, CustomDropDestination, DragPreview, LayoutModel, NewNodeCallback, PreviewContent,
    TabDragContext, TabDragHook,
};
use edge::{prefer_edge, EdgeZone};

/// Gap between the pointer and the top of the drag rectangle.
const PREVIEW_OFFSET_Y: f64 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DragPhase {
    Idle,
    /// Dragging inside this window.
    LocalDragging,
    /// Dragged outside this window; a `Ping` is out.
    AwaitingRemoteBind,
    /// Another window claimed the drag.
    RemoteBound,
    /// Continuing a drag that another window started.
    RemoteOriginDrag,
}

enum DragSource {
    Existing(DragNode),
    New {
        json: DragNode,
        on_drop: Option<NewNodeCallback>,
    },
}

impl DragSource {
    fn node(&self) -> &DragNode {
        match self {
            DragSource::Existing(node) => node,
            DragSource::New { json, .. } => json,
        }
    }
}

struct RemoteOrigin {
    sender: SessionId,
}

struct ActiveDrag {
    source: DragSource,
    text: Option<String>,
    event: Option<SerializedEvent>,
    drop_info: Option<DropInfo>,
    custom_drop: Option<CustomDropDestination>,
    /// What the tab drag hook was shown for `custom_drop`.
    custom_ctx: Option<TabDragContext>,
    edge: DockLocation,
    out_of_bounds: bool,
    remote: Option<RemoteOrigin>,
}

impl ActiveDrag {
    fn new(source: DragSource, text: Option<String>, event: &PointerEvent) -> Self {
        Self {
            source,
            text,
            event: Some(event.snapshot()),
            drop_info: None,
            custom_drop: None,
            custom_ctx: None,
            edge: DockLocation::Center,
            out_of_bounds: false,
            remote: None,
        }
    }

    fn preview_content(&self) -> PreviewContent {
        match &self.text {
            Some(text) => PreviewContent::Text(text.clone()),
            None => PreviewContent::Node(self.source.node().clone()),
        }
    }
}

/// Drives the drag lifecycle of one window.
pub struct DragController<M, P> {
    session: DragSession,
    mapper: CoordinateMapper,
    model: M,
    preview: P,
    outbox: Outbox,
    window: WindowGeometry,
    layout_rect: Rect,
    edge_zone: EdgeZone,
    vertical_bounds: VerticalBounds,
    tab_drag_hook: Option<TabDragHook>,
    drag: Option<ActiveDrag>,
    phase: DragPhase,
}

impl<M: LayoutModel, P: DragPreview> DragController<M, P> {
    pub fn new(
        config: &WindowConfig,
        session: DragSession,
        model: M,
        preview: P,
        outbox: Outbox,
        window: WindowGeometry,
        layout_rect: Rect,
    ) -> Self {
        Self {
            session,
            mapper: CoordinateMapper::new(),
            model,
            preview,
            outbox,
            window,
            layout_rect,
            edge_zone: EdgeZone {
                enabled: config.enable_edge_dock,
                length: config.edge_rect_length,
                width: config.edge_rect_width,
            },
            vertical_bounds: config.vertical_bounds,
            tab_drag_hook: None,
            drag: None,
            phase: DragPhase::Idle,
        }
    }

    pub fn phase(&self) -> DragPhase {
        self.phase
    }

    pub fn session(&self) -> &DragSession {
        &self.session
    }

    pub fn drop_info(&self) -> Option<&DropInfo> {
        self.drag.as_ref().and_then(|d| d.drop_info.as_ref())
    }

    pub fn dragged_node(&self) -> Option<&DragNode> {
        self.drag.as_ref().map(|d| d.source.node())
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn preview(&self) -> &P {
        &self.preview
    }

    pub fn set_tab_drag_hook(&mut self, hook: Option<TabDragHook>) {
        self.tab_drag_hook = hook;
    }

    /// Records a new window position/size or layout rectangle.
    pub fn set_geometry(&mut self, window: WindowGeometry, layout_rect: Rect) {
        self.window = window;
        self.layout_rect = layout_rect;
    }

    // --- Local drag entry points ---

    /// Starts dragging an existing node of this window's layout.
    pub fn start_drag(&mut self, node: DragNode, text: Option<String>, event: &PointerEvent) {
        let drag = ActiveDrag::new(DragSource::Existing(node), text, event);
        self.begin(drag, DragPhase::LocalDragging);
        self.drag_to(event.position());
    }

    /// Starts dragging a node that does not exist yet; it is created on drop.
    pub fn start_new_node_drag(
        &mut self,
        json: DragNode,
        text: Option<String>,
        on_drop: Option<NewNodeCallback>,
        event: &PointerEvent,
    ) {
        let source = DragSource::New { json, on_drop };
        self.begin(ActiveDrag::new(source, text, event), DragPhase::LocalDragging);
        self.drag_to(event.position());
    }

    pub fn pointer_move(&mut self, event: &PointerEvent) {
        if !self.is_local_drag() {
            return;
        }
        if let Some(drag) = self.drag.as_mut() {
            drag.event = Some(event.snapshot());
        }
        self.drag_to(event.position());
        self.check_window_exit(event.position());
    }

    pub fn pointer_up(&mut self, event: &PointerEvent) {
        if !self.is_local_drag() {
            return;
        }
        let Some(drag) = self.drag.take() else {
            return;
        };
        self.teardown();

        let handed_off = drag.out_of_bounds && self.session.has_handed_off();
        let screen = self.screen_point(event.position());
        let release = self.session.on_release(screen, self.window);
        self.outbox.post(release);

        if handed_off {
            tracing::info!(node = %drag.source.node().id, "Drag handed off to another window");
            match drag.source {
                DragSource::Existing(node) => {
                    let action = Action::DeleteNode { node_id: node.id };
                    self.apply_guarded(action);
                }
                DragSource::New { on_drop, .. } => notify_new_node(on_drop, None),
            }
            return;
        }
        self.finish(drag);
    }

    /// Abandons the drag in progress without touching the layout.
    pub fn cancel(&mut self) {
        let Some(drag) = self.drag.take() else {
            return;
        };
        self.teardown();
        if drag.remote.is_none() {
            let cancel = self.session.cancel();
            self.outbox.post(cancel);
        }
        self.mapper.reset();
        if let DragSource::New { on_drop, .. } = drag.source {
            notify_new_node(on_drop, None);
        }
    }

    /// Gives up on a handshake nobody answered in time.
    pub fn expire_handshake(&mut self, now: Instant, timeout: std::time::Duration) {
        if self.session.expire_probe(now, timeout) && self.phase == DragPhase::AwaitingRemoteBind {
            self.phase = DragPhase::LocalDragging;
        }
    }

    // --- Broker messages ---

    pub fn handle_message(&mut self, msg: ProtocolMessage) {
        if self.session.is_self_echo(&msg) {
            tracing::trace!(kind = ?msg.kind(), "Discarding self-echo");
            return;
        }
        let ProtocolMessage { sender, body } = msg;

        match body {
            MessageBody::PositivePingResponse => {
                if self.session.on_positive_response(&sender) {
                    self.sync_phase_with_session();
                }
            }
            MessageBody::NegativePingResponse => {
                if self.session.on_negative_response(&sender) {
                    self.sync_phase_with_session();
                }
            }
            MessageBody::Drop(pointer) => self.handle_remote_drop(&sender, pointer),
            MessageBody::Ping { client } => {
                if self.contains(client) {
                    tracing::debug!(peer = %sender, "Pointer is over this window. Claiming drag.");
                    let reply = self.session.message(MessageBody::PositivePingResponse);
                    self.outbox.post(reply);
                }
            }
            MessageBody::InitDrag(init) => {
                if self.contains(init.pointer.client) {
                    self.start_remote_drag(sender, *init);
                } else {
                    self.reject_remote(&sender);
                }
            }
            MessageBody::CoordinatesUpdate(pointer) => {
                if self.contains(pointer.client) {
                    self.remote_move(&sender, pointer);
                } else {
                    self.reject_remote(&sender);
                }
            }
        }
    }

    fn contains(&self, client: Point) -> bool {
        contains_pointer(&self.window, client, self.vertical_bounds)
    }

    fn start_remote_drag(&mut self, sender: SessionId, init: InitDrag) {
        if self.drag.is_some() {
            tracing::debug!(
                peer = %sender,
                phase = ?self.phase,
                "Already dragging. Ignoring InitDrag."
            );
            return;
        }
        tracing::info!(
            peer = %sender,
            node = %init.node.id,
            "Continuing drag started in another window"
        );

        self.mapper.reset();
        let pos = self
            .mapper
            .translate(init.pointer.client, &init.pointer.origin, &self.window);
        let event = match &init.event {
            Some(snapshot) => PointerEvent::reconstruct(snapshot, pos.x, pos.y),
            None => PointerEvent::new("mousemove", pos.x, pos.y),
        };

        let text = Some(init.node.name.clone());
        let mut drag = ActiveDrag::new(DragSource::Existing(init.node), text, &event);
        drag.remote = Some(RemoteOrigin { sender });
        self.begin(drag, DragPhase::RemoteOriginDrag);
        self.drag_to(pos);
    }

    fn remote_move(&mut self, sender: &SessionId, pointer: RemotePointer) {
        if !self.is_remote_drag_from(sender) {
            return;
        }
        let pos = self.mapper.translate(pointer.client, &pointer.origin, &self.window);
        self.drag_to(pos);
    }

    /// The pointer a peer reported is not over this window.
    fn reject_remote(&mut self, sender: &SessionId) {
        tracing::debug!(peer = %sender, "Pointer left this window. Releasing drag.");
        let reply = self.session.message(MessageBody::NegativePingResponse);
        self.outbox.post(reply);

        if self.is_remote_drag_from(sender) {
            self.drop_remote_drag();
        } else if self.drag.is_none() {
            self.session.reset();
        }
    }

    fn handle_remote_drop(&mut self, sender: &SessionId, pointer: Option<RemotePointer>) {
        if self.is_remote_drag_from(sender) {
            match pointer {
                Some(_) => {
                    if let Some(drag) = self.drag.take() {
                        tracing::info!(
                            peer = %sender,
                            resolved = drag.drop_info.is_some(),
                            "Remote drag dropped here"
                        );
                        self.teardown();
                        self.finish(drag);
                    }
                }
                None => self.drop_remote_drag(),
            }
            self.session.reset();
            self.mapper.reset();
        } else if self.drag.is_none() {
            self.session.reset();
        }
    }

    fn drop_remote_drag(&mut self) {
        if self.drag.take().is_some() {
            tracing::debug!("Remote drag cancelled");
            self.teardown();
        }
        self.mapper.reset();
    }

    fn is_remote_drag_from(&self, sender: &SessionId) -> bool {
        self.phase == DragPhase::RemoteOriginDrag
            && self
                .drag
                .as_ref()
                .and_then(|d| d.remote.as_ref())
                .is_some_and(|r| &r.sender == sender)
    }

    fn is_local_drag(&self) -> bool {
        matches!(
            self.phase,
            DragPhase::LocalDragging | DragPhase::AwaitingRemoteBind | DragPhase::RemoteBound
        )
    }

    // --- Shared drag mechanics ---

    fn begin(&mut self, drag: ActiveDrag, phase: DragPhase) {
        if self.drag.is_some() {
            self.teardown();
        }
        self.preview.hide_outline();
        if !self.model.has_maximized_tabset() {
            self.preview.show_edge_indicators(true);
        }
        self.drag = Some(drag);
        self.phase = phase;
        tracing::debug!(?phase, "Drag started");
    }

    /// Moves the drag to `client` (this window's client coordinates) and
    /// re-resolves the drop target. Never mutates the model.
    fn drag_to(&mut self, client: Point) {
        let Some(drag) = self.drag.as_mut() else {
            return;
        };
        let layout = self.layout_rect;
        let pos = Point::new(client.x - layout.x, client.y - layout.y);
        let outer = self.model.outer_rect();

        let edge = self.edge_zone.locate(outer, pos, drag.edge);
        if edge != drag.edge {
            drag.edge = edge;
            self.preview.highlight_edge(edge);
        }

        let (w, h) = self.preview.preview_size();
        let mut left = pos.x - w / 2.0;
        if left + w > layout.width {
            left = layout.width - w;
        }
        let rect = Rect::new(left.max(0.0), pos.y + PREVIEW_OFFSET_Y, w, h);
        self.preview.show_preview(rect, &drag.preview_content());

        let found = self.model.find_drop_target(drag.source.node(), pos.x, pos.y);
        let model = &self.model;
        let resolved = prefer_edge(found, edge, outer, || model.root_id());
        if let Some(info) = resolved {
            self.resolve_target(info, pos);
        }
    }

    fn resolve_target(&mut self, info: DropInfo, pos: Point) {
        let Some(drag) = self.drag.as_mut() else {
            return;
        };
        let previous = drag.custom_drop.take();
        let previous_key = previous.as_ref().map(|c| c.key);
        let mut invalidated = previous.and_then(|c| c.invalidated);

        let mut custom = None;
        let mut custom_ctx = None;
        if let Some(hook) = self.tab_drag_hook.as_mut() {
            if info.index.is_none() {
                if let Some((over, tab_rect)) = self.model.selected_tab(&info.node_id) {
                    if tab_rect.contains(pos) {
                        let ctx = TabDragContext {
                            dragging: drag.source.node().clone(),
                            over,
                            x: pos.x - tab_rect.x,
                            y: pos.y - tab_rect.y,
                            location: info.location,
                        };
                        custom = guarded("tab drag hook", || hook(&ctx)).flatten().map(
                            |mut dest: CustomDropDestination| {
                                dest.rect.x += tab_rect.x;
                                dest.rect.y += tab_rect.y;
                                dest
                            },
                        );
                        if custom.is_some() {
                            custom_ctx = Some(ctx);
                        }
                    }
                }
            }
        }

        let key = custom.as_ref().map(|c| c.key);
        if key.is_some() && key == previous_key {
            invalidated = None;
        }

        let outline = custom.as_ref().map_or(info.rect, |c| c.rect);
        drag.custom_drop = custom;
        drag.custom_ctx = custom_ctx;
        drag.drop_info = Some(info);
        self.preview.position_outline(outline);

        if let Some(invalidated) = invalidated {
            guarded("invalidation callback", invalidated);
        }
    }

    /// Offers the drag to other windows once the pointer leaves this one.
    fn check_window_exit(&mut self, client: Point) {
        let layout = self.layout_rect;
        let outside = client.x < layout.x
            || client.x > layout.right()
            || client.y < layout.y
            || client.y > layout.bottom();

        let screen = self.screen_point(client);
        let Some(drag) = self.drag.as_mut() else {
            return;
        };
        drag.out_of_bounds = outside;
        if !outside {
            // Back inside: whoever claimed the drag has to let go of it, and
            // an answer to a pending ping no longer counts.
            if self.session.listener().is_some() {
                let cancel = self.session.cancel();
                self.outbox.post(cancel);
            } else if matches!(self.session.state(), SessionState::Probing { .. }) {
                self.session.reset();
            }
            self.sync_phase_with_session();
            return;
        }

        let outgoing = OutgoingDrag {
            node: drag.source.node(),
            event: drag.event.as_ref(),
        };
        if let Some(msg) =
            self.session
                .on_pointer_outside(screen, self.window, Some(outgoing), Instant::now())
        {
            self.outbox.post(msg);
        }
        self.sync_phase_with_session();
    }

    fn sync_phase_with_session(&mut self) {
        if !self.is_local_drag() {
            return;
        }
        self.phase = match self.session.state() {
            SessionState::Idle => DragPhase::LocalDragging,
            SessionState::Probing { .. } => DragPhase::AwaitingRemoteBind,
            SessionState::Bound { .. } => DragPhase::RemoteBound,
        };
    }

    /// X becomes screen-absolute, Y stays window-relative.
    fn screen_point(&self, client: Point) -> Point {
        Point::new(client.x + self.window.screen_x, client.y)
    }

    /// Removes every trace of the drag from the screen.
    fn teardown(&mut self) {
        self.preview.hide_outline();
        self.preview.hide_preview();
        self.preview.show_edge_indicators(false);
        self.preview.highlight_edge(DockLocation::Center);
        self.phase = DragPhase::Idle;
    }

    /// Commits a finished drag against the model, or reports the cancel.
    fn finish(&mut self, drag: ActiveDrag) {
        let ActiveDrag {
            source,
            drop_info,
            custom_drop,
            custom_ctx,
            ..
        } = drag;

        let Some(target) = drop_info else {
            tracing::debug!("Drag ended without a drop target");
            if let DragSource::New { on_drop, .. } = source {
                notify_new_node(on_drop, None);
            }
            return;
        };

        match (custom_drop, source) {
            (Some(custom), source) => {
                let ctx = custom_ctx.unwrap_or_else(|| TabDragContext {
                    dragging: source.node().clone(),
                    over: target.node_id.clone(),
                    x: 0.0,
                    y: 0.0,
                    location: target.location,
                });
                let callback = custom.callback;
                guarded("custom drop callback", || callback(&ctx));
                if let DragSource::New { on_drop, .. } = source {
                    notify_new_node(on_drop, None);
                }
            }
            (None, DragSource::New { json, on_drop }) => {
                let created = self.apply_guarded(Action::add_to(json, &target));
                notify_new_node(on_drop, created.as_ref());
            }
            (None, DragSource::Existing(node)) => {
                self.apply_guarded(Action::move_to(node, &target));
            }
        }
    }

    fn apply_guarded(&mut self, action: Action) -> Option<DragNode> {
        tracing::debug!(?action, "Applying layout action");
        let model = &mut self.model;
        guarded("layout action", || Ok(model.apply_action(action))).flatten()
    }
}

fn notify_new_node(on_drop: Option<NewNodeCallback>, node: Option<&DragNode>) {
    if let Some(on_drop) = on_drop {
        guarded("new node callback", || on_drop(node));
    }
}

/// Runs a caller-supplied callback, logging failures and panics instead of
/// propagating them.
fn guarded<T>(what: &'static str, f: impl FnOnce() -> Result<T>) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            tracing::error!(callback = what, error = %e, "Callback failed");
            None
        }
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            let e = Error::Callback(reason);
            tracing::error!(callback = what, error = %e, "Callback panicked");
            None
        }
    }
}
