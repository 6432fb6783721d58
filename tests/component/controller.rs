//! tests/component/controller.rs
//!
//! Drives pairs of `DragController`s directly, relaying their outgoing
//! messages by hand, so every step of a cross-window drag can be inspected.

use crate::common::harness::{TestLayout, TestWindow};
use drag_relay::{
    config::WindowConfig,
    controller::{
        collab::{Action, CustomDropDestination, NewNodeCallback, PreviewContent, TabDragContext},
        DragPhase,
    },
    domain::{DockLocation, DragNode, PointerEvent, Rect},
    error::Error,
    session::protocol::{MessageBody, MessageKind, ProtocolMessage},
};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use test_log::test;
use tokio::time::Instant;

fn full() -> Rect {
    Rect::new(0.0, 0.0, 800.0, 600.0)
}

fn tab() -> DragNode {
    DragNode::new("tab-1", "Output").with_rect(Rect::new(0.0, 0.0, 80.0, 24.0))
}

fn at(x: f64, y: f64) -> PointerEvent {
    PointerEvent::new("mousemove", x, y)
}

fn down(x: f64, y: f64) -> PointerEvent {
    PointerEvent::new("mousedown", x, y)
}

fn bodies(messages: &[ProtocolMessage]) -> Vec<MessageBody> {
    messages.iter().map(|m| m.body.clone()).collect()
}

/// Window 1 at screenX 0 holding `tab-1`.
fn origin_window() -> TestWindow {
    let layout = TestLayout::new().with_tabset("ts-1", full(), Some(0), &["tab-1"]);
    TestWindow::new("window-1", 0.0, layout)
}

/// The origin window plus window 2 at screenX 900 whose single tabset `T`
/// accepts drops at index 2.
fn windows() -> (TestWindow, TestWindow) {
    let layout = TestLayout::new().with_tabset("T", full(), Some(2), &["a", "b"]);
    (origin_window(), TestWindow::new("window-2", 900.0, layout))
}

/// Relays everything both windows posted to both windows (the broker echoes
/// to the sender too) until nothing is left in flight.
fn settle(w1: &mut TestWindow, w2: &mut TestWindow) {
    loop {
        let mut in_flight = w1.drain();
        in_flight.extend(w2.drain());
        if in_flight.is_empty() {
            return;
        }
        w1.deliver(&in_flight);
        w2.deliver(&in_flight);
    }
}

/// Drags `tab-1` out of window 1 until window 2 is continuing it.
fn hand_off(w1: &mut TestWindow, w2: &mut TestWindow) {
    w1.controller.start_drag(tab(), None, &PointerEvent::new("mousedown", 100.0, 100.0));
    w1.controller.pointer_move(&at(950.0, 100.0));
    settle(w1, w2);
    assert_eq!(w1.controller.phase(), DragPhase::RemoteBound);

    w1.controller.pointer_move(&at(960.0, 100.0));
    settle(w1, w2);
    assert_eq!(w2.controller.phase(), DragPhase::RemoteOriginDrag);
}

#[test]
fn pointer_outside_every_window_keeps_probing() {
    let (mut w1, mut w2) = windows();
    w1.controller.start_drag(tab(), None, &PointerEvent::new("mousedown", 100.0, 100.0));
    w1.controller.pointer_move(&at(810.0, 100.0));

    let sent = w1.drain();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].body,
        MessageBody::Ping {
            client: drag_relay::domain::Point::new(810.0, 100.0)
        }
    );

    w2.deliver(&sent);
    assert!(w2.drain().is_empty(), "810 lies outside [900, 1700]");
    assert_eq!(w1.controller.phase(), DragPhase::AwaitingRemoteBind);
}

#[test]
fn window_under_the_pointer_claims_and_continues_the_drag() {
    let (mut w1, mut w2) = windows();
    w1.controller.start_drag(tab(), None, &PointerEvent::new("mousedown", 100.0, 100.0));
    w1.controller.pointer_move(&at(950.0, 100.0));

    let ping = w1.drain();
    w2.deliver(&ping);
    let reply = w2.drain();
    assert_eq!(
        reply.iter().map(ProtocolMessage::kind).collect::<Vec<_>>(),
        vec![MessageKind::PositivePingResponse]
    );

    w1.deliver(&reply);
    assert_eq!(w1.controller.phase(), DragPhase::RemoteBound);
    assert_eq!(w1.controller.session().listener(), Some(w2.controller.session().id()));

    w1.controller.pointer_move(&at(960.0, 100.0));
    let init = w1.drain();
    assert_eq!(init.len(), 1);
    let MessageBody::InitDrag(payload) = &init[0].body else {
        panic!("expected InitDrag, got {:?}", init[0].kind());
    };
    assert_eq!(payload.node, tab());

    w2.deliver(&init);
    assert_eq!(w2.controller.phase(), DragPhase::RemoteOriginDrag);
    assert_eq!(w2.controller.dragged_node().map(|n| n.id.as_str()), Some("tab-1"));
    assert_eq!(w2.controller.drop_info().map(|d| d.node_id.as_str()), Some("T"));

    let screen = w2.preview.snapshot();
    assert_eq!(screen.outline, Some(full()));
    let (rect, content) = screen.preview.expect("drag rectangle is shown");
    assert_eq!(content, PreviewContent::Text("Output".into()));
    // 960 on screen is 60 inside window 2.
    assert_eq!(rect.x, 10.0);
    assert_eq!(rect.y, 105.0);
}

#[test]
fn remote_drop_applies_the_move_exactly_once() {
    let (mut w1, mut w2) = windows();
    hand_off(&mut w1, &mut w2);

    w1.controller.pointer_up(&at(960.0, 100.0));
    let drop = w1.drain();
    assert!(matches!(drop[0].body, MessageBody::Drop(Some(_))));
    assert_eq!(w1.layout.actions(), vec![Action::DeleteNode { node_id: "tab-1".into() }]);
    assert!(w1.layout.children_of("ts-1").is_empty());

    w2.deliver(&drop);
    w2.deliver(&drop);
    let actions = w2.layout.actions();
    assert_eq!(actions.len(), 1);
    assert!(matches!(
        &actions[0],
        Action::MoveNode {
            node,
            to_node,
            index: Some(2),
            ..
        } if node.id == "tab-1" && to_node == "T"
    ));
    assert_eq!(w2.layout.children_of("T"), vec!["a", "b", "tab-1"]);
    assert_eq!(w2.controller.phase(), DragPhase::Idle);
    assert!(w2.preview.snapshot().is_clear());
}

#[test]
fn remote_drop_over_empty_chrome_changes_nothing() {
    let mut w1 = origin_window();
    // No tabsets: nothing under the pointer resolves.
    let mut w2 = TestWindow::new("window-2", 900.0, TestLayout::new());
    hand_off(&mut w1, &mut w2);
    assert!(w2.controller.drop_info().is_none());

    w1.controller.pointer_up(&at(960.0, 100.0));
    settle(&mut w1, &mut w2);

    assert!(w2.layout.actions().is_empty());
    assert!(w2.preview.snapshot().is_clear());
    assert_eq!(w2.controller.phase(), DragPhase::Idle);
}

#[test]
fn duplicate_coordinates_update_resolves_the_same_target() {
    let (mut w1, mut w2) = windows();
    hand_off(&mut w1, &mut w2);

    w1.controller.pointer_move(&at(1000.0, 200.0));
    let update = w1.drain();
    assert_eq!(update[0].kind(), MessageKind::CoordinatesUpdate);

    w2.deliver(&update);
    let once = (w2.controller.drop_info().cloned(), w2.preview.snapshot().preview);
    w2.deliver(&update);
    let twice = (w2.controller.drop_info().cloned(), w2.preview.snapshot().preview);
    assert_eq!(once, twice);
    assert!(w2.layout.actions().is_empty());
}

#[test]
fn own_messages_echoed_back_change_nothing() {
    let (mut w1, _) = windows();
    w1.controller.start_drag(tab(), None, &PointerEvent::new("mousedown", 100.0, 100.0));
    w1.controller.pointer_move(&at(950.0, 100.0));
    let ping = w1.drain();

    w1.deliver(&ping);
    assert!(w1.drain().is_empty(), "a window never answers its own ping");
    assert_eq!(w1.controller.phase(), DragPhase::AwaitingRemoteBind);

    let own_claim = ProtocolMessage::new(
        w1.controller.session().id().clone(),
        MessageBody::PositivePingResponse,
    );
    w1.deliver(&[own_claim]);
    assert_eq!(w1.controller.phase(), DragPhase::AwaitingRemoteBind);
}

#[test]
fn pointer_leaving_the_listener_releases_it() {
    let (mut w1, mut w2) = windows();
    hand_off(&mut w1, &mut w2);

    // Past window 2's right edge.
    w1.controller.pointer_move(&at(2000.0, 100.0));
    let update = w1.drain();
    w2.deliver(&update);
    let reply = w2.drain();
    assert_eq!(reply[0].kind(), MessageKind::NegativePingResponse);
    assert_eq!(w2.controller.phase(), DragPhase::Idle);
    assert!(w2.preview.snapshot().is_clear());

    w1.deliver(&reply);
    assert_eq!(w1.controller.phase(), DragPhase::LocalDragging);
    assert_eq!(w1.controller.session().listener(), None);

    w1.controller.pointer_move(&at(2010.0, 100.0));
    assert_eq!(w1.drain()[0].kind(), MessageKind::Ping);
}

#[test]
fn returning_to_the_origin_window_cancels_the_listener() {
    let (mut w1, mut w2) = windows();
    hand_off(&mut w1, &mut w2);

    w1.controller.pointer_move(&at(100.0, 100.0));
    let sent = w1.drain();
    assert_eq!(sent.iter().map(|m| &m.body).collect::<Vec<_>>(), vec![&MessageBody::Drop(None)]);
    assert_eq!(w1.controller.phase(), DragPhase::LocalDragging);

    w2.deliver(&sent);
    assert_eq!(w2.controller.phase(), DragPhase::Idle);
    assert!(w2.preview.snapshot().is_clear());

    w1.controller.pointer_up(&at(100.0, 100.0));
    settle(&mut w1, &mut w2);
    assert!(w2.layout.actions().is_empty());
    assert!(matches!(
        &w1.layout.actions()[..],
        [Action::MoveNode { to_node, .. }] if to_node == "ts-1"
    ));
}

#[test]
fn answer_arriving_after_the_pointer_returned_is_ignored() {
    let (mut w1, mut w2) = windows();
    w1.controller.start_drag(tab(), None, &PointerEvent::new("mousedown", 100.0, 100.0));
    w1.controller.pointer_move(&at(950.0, 100.0));
    w2.deliver(&w1.drain());
    let answer = w2.drain();
    assert!(answer.iter().any(|m| m.kind() == MessageKind::PositivePingResponse));

    w1.controller.pointer_move(&at(100.0, 100.0));
    assert_eq!(w1.controller.phase(), DragPhase::LocalDragging);
    assert!(w1.controller.session().probe_deadline(Duration::from_millis(1500)).is_none());

    w1.deliver(&answer);
    assert_eq!(w1.controller.phase(), DragPhase::LocalDragging);
    assert!(w1.controller.session().listener().is_none());
}

#[test]
fn local_drop_moves_the_node_and_cancels_remote_listeners() {
    let (mut w1, _) = windows();
    w1.controller.start_drag(tab(), Some("Output".into()), &down(100.0, 100.0));
    assert!(w1.preview.snapshot().edges_visible);

    w1.controller.pointer_move(&at(300.0, 200.0));
    assert_eq!(w1.controller.phase(), DragPhase::LocalDragging);
    assert!(w1.drain().is_empty(), "nothing is broadcast while inside");

    w1.controller.pointer_up(&at(300.0, 200.0));
    assert_eq!(bodies(&w1.drain()), vec![MessageBody::Drop(None)]);
    assert!(matches!(
        &w1.layout.actions()[..],
        [Action::MoveNode { to_node, index: Some(0), .. }] if to_node == "ts-1"
    ));
    assert!(w1.preview.snapshot().is_clear());
}

#[test]
fn drag_rectangle_stays_inside_the_layout() {
    let (mut w1, _) = windows();
    w1.controller.start_drag(tab(), None, &PointerEvent::new("mousedown", 20.0, 100.0));
    let (rect, _) = w1.preview.snapshot().preview.unwrap();
    assert_eq!(rect.x, 0.0);

    w1.controller.pointer_move(&at(790.0, 100.0));
    let (rect, _) = w1.preview.snapshot().preview.unwrap();
    assert_eq!(rect.x, 700.0);
}

#[test]
fn failing_new_node_callback_still_tears_down() {
    let (mut w1, _) = windows();
    let seen = Arc::new(Mutex::new(None));
    let seen_in_callback = seen.clone();
    let on_drop: NewNodeCallback = Box::new(move |node| {
        *seen_in_callback.lock().unwrap() = node.map(|n| n.id.clone());
        Err(Error::Callback("refused".into()))
    });

    let json = DragNode::new("new-tab", "New");
    w1.controller.start_new_node_drag(json, Some("New".into()), Some(on_drop), &down(300.0, 200.0));
    w1.controller.pointer_up(&at(300.0, 200.0));

    assert!(matches!(
        &w1.layout.actions()[..],
        [Action::AddNode { json, .. }] if json.id == "new-tab"
    ));
    assert_eq!(seen.lock().unwrap().as_deref(), Some("new-tab"));
    assert_eq!(w1.controller.phase(), DragPhase::Idle);
    assert!(w1.preview.snapshot().is_clear());
}

#[test]
fn cancelled_new_node_drag_reports_nothing_created() {
    let (mut w1, _) = windows();
    let calls = Arc::new(AtomicUsize::new(0));
    let created = Arc::new(Mutex::new(Some(String::new())));
    let (calls_cb, created_cb) = (calls.clone(), created.clone());
    let on_drop: NewNodeCallback = Box::new(move |node| {
        calls_cb.fetch_add(1, Ordering::SeqCst);
        *created_cb.lock().unwrap() = node.map(|n| n.id.clone());
        Ok(())
    });

    let json = DragNode::new("new-tab", "New");
    w1.controller.start_new_node_drag(json, None, Some(on_drop), &down(300.0, 200.0));
    w1.controller.cancel();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*created.lock().unwrap(), None);
    assert!(w1.layout.actions().is_empty());
    assert_eq!(bodies(&w1.drain()), vec![MessageBody::Drop(None)]);
}

#[test]
fn pointer_at_an_outer_edge_prefers_docking_there() {
    let (mut w1, _) = windows();
    w1.controller.start_drag(tab(), None, &PointerEvent::new("mousedown", 100.0, 100.0));
    w1.controller.pointer_move(&at(5.0, 100.0));

    let info = w1.controller.drop_info().cloned().unwrap();
    assert_eq!(info.node_id, "root");
    assert_eq!(info.location, DockLocation::Left);
    assert_eq!(info.rect, Rect::new(0.0, 0.0, 400.0, 600.0));
    assert_eq!(w1.preview.snapshot().highlighted, DockLocation::Left);

    w1.controller.pointer_up(&at(5.0, 100.0));
    assert!(matches!(
        &w1.layout.actions()[..],
        [Action::MoveNode {
            to_node,
            location: DockLocation::Left,
            index: None,
            ..
        }] if to_node == "root"
    ));
}

#[test]
fn edge_indicators_stay_hidden_while_a_tabset_is_maximized() {
    let layout = TestLayout::new().with_tabset("ts-1", full(), Some(0), &["tab-1"]).maximized();
    let mut w1 = TestWindow::new("window-1", 0.0, layout);
    w1.controller.start_drag(tab(), None, &PointerEvent::new("mousedown", 100.0, 100.0));
    assert!(!w1.preview.snapshot().edges_visible);
}

#[test]
fn unanswered_ping_times_out_back_to_local_drag() {
    let (mut w1, _) = windows();
    w1.controller.start_drag(tab(), None, &PointerEvent::new("mousedown", 100.0, 100.0));
    w1.controller.pointer_move(&at(810.0, 100.0));
    assert_eq!(w1.controller.phase(), DragPhase::AwaitingRemoteBind);

    let timeout = WindowConfig::default().handshake_timeout().unwrap();
    w1.controller.expire_handshake(Instant::now(), timeout);
    assert_eq!(w1.controller.phase(), DragPhase::AwaitingRemoteBind);

    w1.controller.expire_handshake(Instant::now() + timeout, timeout);
    assert_eq!(w1.controller.phase(), DragPhase::LocalDragging);
    assert!(w1.controller.session().listener().is_none());
}

#[test]
fn strict_vertical_bounds_reject_pings_above_the_window() {
    let config = WindowConfig {
        vertical_bounds: drag_relay::config::VerticalBounds::Strict,
        ..WindowConfig::default()
    };
    let mut w2 = TestWindow::with_config("window-2", 900.0, TestLayout::new(), &config);
    let ping = ProtocolMessage::new(
        drag_relay::domain::SessionId::from_wire("window-1").unwrap(),
        MessageBody::Ping { client: drag_relay::domain::Point::new(950.0, -40.0) },
    );
    w2.deliver(&[ping.clone()]);
    assert!(w2.drain().is_empty());

    let (_, mut permissive) = windows();
    permissive.deliver(&[ping]);
    assert_eq!(permissive.drain()[0].kind(), MessageKind::PositivePingResponse);
}

#[test]
fn custom_tab_drop_replaces_the_model_action() {
    let layout = TestLayout::new()
        .with_tabset("ts-1", full(), None, &["tab-1"])
        .with_selected_tab("tab-9", Rect::new(0.0, 30.0, 800.0, 570.0));
    let mut w1 = TestWindow::new("window-1", 0.0, layout);

    let invalidated = Arc::new(AtomicUsize::new(0));
    let dropped = Arc::new(Mutex::new(None));
    let (invalidated_hook, dropped_hook) = (invalidated.clone(), dropped.clone());
    w1.controller.set_tab_drag_hook(Some(Box::new(move |ctx: &TabDragContext| {
        // Left and right halves of the tab are different destinations.
        let key = if ctx.x < 400.0 { 1 } else { 2 };
        let invalidated = invalidated_hook.clone();
        let dropped = dropped_hook.clone();
        Ok(Some(CustomDropDestination {
            key,
            rect: Rect::new(0.0, 0.0, 10.0, 10.0),
            cursor: None,
            callback: Box::new(move |ctx: &TabDragContext| {
                *dropped.lock().unwrap() = Some((key, ctx.over.clone(), ctx.x, ctx.y));
                Ok(())
            }),
            invalidated: Some(Box::new(move || {
                invalidated.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })),
        }))
    })));

    w1.controller.start_drag(tab(), None, &PointerEvent::new("mousedown", 100.0, 100.0));
    assert_eq!(w1.preview.snapshot().outline, Some(Rect::new(0.0, 30.0, 10.0, 10.0)));
    w1.controller.pointer_move(&at(120.0, 100.0));
    assert_eq!(invalidated.load(Ordering::SeqCst), 0, "same destination");
    w1.controller.pointer_move(&at(500.0, 100.0));
    assert_eq!(invalidated.load(Ordering::SeqCst), 1);

    w1.controller.pointer_up(&at(500.0, 100.0));
    // The callback sees the tab and tab-relative point the hook was shown.
    assert_eq!(
        *dropped.lock().unwrap(),
        Some((2, "tab-9".to_string(), 500.0, 70.0))
    );
    assert!(w1.layout.actions().is_empty());
}

#[test]
fn handshake_deadline_follows_the_probe() {
    let (mut w1, _) = windows();
    let timeout = Duration::from_millis(1500);
    assert!(w1.controller.session().probe_deadline(timeout).is_none());
    w1.controller.start_drag(tab(), None, &PointerEvent::new("mousedown", 100.0, 100.0));
    w1.controller.pointer_move(&at(810.0, 100.0));
    assert!(w1.controller.session().probe_deadline(timeout).is_some());
}
