//! src/window.rs
//!
//! Defines the `WindowService`, which hosts one window's `DragController` in
//! its own task. It serialises the window's pointer events, the messages
//! relayed by the broker and the handshake timer into one ordered stream, and
//! publishes the resulting drag status over a `watch` channel.

use crate::{
    config::WindowConfig,
    controller::{
        collab::{DragPreview, LayoutModel, NewNodeCallback, TabDragHook},
        DragController, DragPhase,
    },
    domain::{DragNode, DropInfo, PointerEvent, Rect, SessionId, WindowGeometry},
    error::{Error, Result},
    session::{protocol::ProtocolMessage, DragSession},
    transport::{Outbox, Transport},
};
use std::time::Duration;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;

/// Input from the window hosting the layout.
pub enum WindowEvent {
    DragStart {
        node: DragNode,
        text: Option<String>,
        event: PointerEvent,
    },
    NewNodeDragStart {
        json: DragNode,
        text: Option<String>,
        on_drop: Option<NewNodeCallback>,
        event: PointerEvent,
    },
    PointerMove(PointerEvent),
    PointerUp(PointerEvent),
    Cancel,
    Resized {
        window: WindowGeometry,
        layout_rect: Rect,
    },
    SetTabDragHook(Option<TabDragHook>),
}

/// Snapshot of the controller, published after every step.
#[derive(Clone, Debug, PartialEq)]
pub struct DragStatus {
    pub phase: DragPhase,
    pub listener: Option<SessionId>,
    pub drop_info: Option<DropInfo>,
    pub dragging: Option<String>,
}

impl Default for DragStatus {
    fn default() -> Self {
        Self {
            phase: DragPhase::Idle,
            listener: None,
            drop_info: None,
            dragging: None,
        }
    }
}

pub struct WindowService<M, P> {
    controller: DragController<M, P>,
    events_rx: mpsc::Receiver<WindowEvent>,
    inbound_rx: mpsc::Receiver<ProtocolMessage>,
    status_tx: watch::Sender<DragStatus>,
    handshake_timeout: Option<Duration>,
}

impl<M: LayoutModel, P: DragPreview> WindowService<M, P> {
    pub fn new(
        controller: DragController<M, P>,
        events_rx: mpsc::Receiver<WindowEvent>,
        inbound_rx: mpsc::Receiver<ProtocolMessage>,
        status_tx: watch::Sender<DragStatus>,
        handshake_timeout: Option<Duration>,
    ) -> Self {
        Self {
            controller,
            events_rx,
            inbound_rx,
            status_tx,
            handshake_timeout,
        }
    }

    /// The main run loop for the `WindowService`.
    pub async fn run(mut self, shutdown_token: CancellationToken) {
        tracing::debug!(session = %self.controller.session().id(), "Window service started");
        loop {
            let deadline = self
                .handshake_timeout
                .and_then(|t| self.controller.session().probe_deadline(t));

            tokio::select! {
                _ = shutdown_token.cancelled() => {
                    tracing::info!("Window service received shutdown signal.");
                    break;
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                Some(msg) = self.inbound_rx.recv() => self.controller.handle_message(msg),
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() =>
                {
                    if let Some(timeout) = self.handshake_timeout {
                        self.controller.expire_handshake(Instant::now(), timeout);
                    }
                },
                else => {
                    tracing::info!("Channels closed. Window service shutting down.");
                    break;
                }
            }
            self.publish_status();
        }
        self.controller.cancel();
        self.publish_status();
    }

    fn handle_event(&mut self, event: WindowEvent) {
        match event {
            WindowEvent::DragStart { node, text, event } => {
                self.controller.start_drag(node, text, &event);
            }
            WindowEvent::NewNodeDragStart {
                json,
                text,
                on_drop,
                event,
            } => self.controller.start_new_node_drag(json, text, on_drop, &event),
            WindowEvent::PointerMove(event) => self.controller.pointer_move(&event),
            WindowEvent::PointerUp(event) => self.controller.pointer_up(&event),
            WindowEvent::Cancel => self.controller.cancel(),
            WindowEvent::Resized {
                window,
                layout_rect,
            } => self.controller.set_geometry(window, layout_rect),
            WindowEvent::SetTabDragHook(hook) => self.controller.set_tab_drag_hook(hook),
        }
    }

    fn publish_status(&self) {
        let status = DragStatus {
            phase: self.controller.phase(),
            listener: self.controller.session().listener().cloned(),
            drop_info: self.controller.drop_info().cloned(),
            dragging: self.controller.dragged_node().map(|n| n.id.clone()),
        };
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }
}

/// The outside view of a running window.
pub struct WindowHandle {
    id: SessionId,
    events_tx: mpsc::Sender<WindowEvent>,
    status_rx: watch::Receiver<DragStatus>,
    tasks: Vec<JoinHandle<()>>,
}

impl WindowHandle {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub async fn send(&self, event: WindowEvent) -> Result<()> {
        self.events_tx
            .send(event)
            .await
            .map_err(|_| Error::WindowClosed)
    }

    pub fn status(&self) -> DragStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DragStatus> {
        self.status_rx.clone()
    }

    /// Waits until the published status satisfies `predicate`.
    pub async fn wait_for<F>(&self, predicate: F) -> Result<DragStatus>
    where
        F: Fn(&DragStatus) -> bool,
    {
        let mut rx = self.status_rx.clone();
        let status = rx
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| Error::WindowClosed)?;
        Ok(status.clone())
    }

    /// Waits for the window's tasks to finish after shutdown.
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            task.await?;
        }
        Ok(())
    }
}

/// Connects a window to the broker and spawns its transport and service.
/// Returns once the broker has registered the window.
pub async fn spawn_window<M, P>(
    config: &WindowConfig,
    model: M,
    preview: P,
    window: WindowGeometry,
    layout_rect: Rect,
    shutdown_token: CancellationToken,
) -> Result<WindowHandle>
where
    M: LayoutModel + Send + 'static,
    P: DragPreview + Send + 'static,
{
    let (outbox, outbound_rx) = Outbox::channel(config.outbox_capacity);
    let (inbound_tx, inbound_rx) = mpsc::channel(config.outbox_capacity);
    let (events_tx, events_rx) = mpsc::channel(config.outbox_capacity);
    let (status_tx, status_rx) = watch::channel(DragStatus::default());

    let transport = Transport::connect(&config.broker_url, outbound_rx, inbound_tx).await?;
    let transport_task = tokio::spawn(transport.run(shutdown_token.clone()));

    let session = DragSession::new();
    let id = session.id().clone();
    let controller =
        DragController::new(config, session, model, preview, outbox, window, layout_rect);
    let service = WindowService::new(
        controller,
        events_rx,
        inbound_rx,
        status_tx,
        config.handshake_timeout(),
    );
    let service_task = tokio::spawn(service.run(shutdown_token));
    tracing::info!(session = %id, "Window joined the drag relay");

    Ok(WindowHandle {
        id,
        events_tx,
        status_rx,
        tasks: vec![transport_task, service_task],
    })
}
