//! tests/integration/handoff.rs
//!
//! Two windows, each with its own transport and window service, drag a tab
//! from one to the other through a real relay.

use crate::common::harness::{RecordingPreview, TestLayout, TestRelay};
use drag_relay::{
    controller::{collab::Action, DragPhase},
    domain::{DragNode, PointerEvent, Rect, WindowGeometry},
    window::{spawn_window, WindowEvent, WindowHandle},
};
use std::time::Duration;
use test_log::test;
use tokio_util::sync::CancellationToken;

const STEP: Duration = Duration::from_secs(2);

fn full() -> Rect {
    Rect::new(0.0, 0.0, 800.0, 600.0)
}

async fn wait_phase(window: &WindowHandle, phase: DragPhase) {
    tokio::time::timeout(STEP, window.wait_for(|s| s.phase == phase))
        .await
        .unwrap_or_else(|_| panic!("window never reached {phase:?}"))
        .unwrap();
}

#[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn tab_dragged_across_windows_moves_to_the_target() {
    let result = tokio::time::timeout(Duration::from_secs(15), async {
        let relay = TestRelay::spawn().await.expect("Failed to spawn relay");
        let config = relay.window_config();
        let token = CancellationToken::new();

        let layout_1 = TestLayout::new().with_tabset("ts-1", full(), Some(0), &["tab-1"]);
        let log_1 = layout_1.log();
        let w1 = spawn_window(
            &config,
            layout_1,
            RecordingPreview::default(),
            WindowGeometry::new(0.0, 0.0, 800.0, 600.0),
            full(),
            token.clone(),
        )
        .await
        .expect("window 1");

        let layout_2 = TestLayout::new().with_tabset("T", full(), Some(2), &["a", "b"]);
        let log_2 = layout_2.log();
        let preview_2 = RecordingPreview::default();
        let w2 = spawn_window(
            &config,
            layout_2,
            preview_2.clone(),
            WindowGeometry::new(900.0, 0.0, 800.0, 600.0),
            full(),
            token.clone(),
        )
        .await
        .expect("window 2");
        relay.wait_for_connections(2, STEP).await.unwrap();

        let node = DragNode::new("tab-1", "Output").with_rect(Rect::new(0.0, 0.0, 80.0, 24.0));
        w1.send(WindowEvent::DragStart {
            node,
            text: None,
            event: PointerEvent::new("mousedown", 100.0, 100.0),
        })
        .await
        .unwrap();
        wait_phase(&w1, DragPhase::LocalDragging).await;

        w1.send(WindowEvent::PointerMove(PointerEvent::new("mousemove", 950.0, 100.0)))
            .await
            .unwrap();
        wait_phase(&w1, DragPhase::RemoteBound).await;
        assert_eq!(w1.status().listener.as_ref(), Some(w2.id()));

        w1.send(WindowEvent::PointerMove(PointerEvent::new("mousemove", 960.0, 100.0)))
            .await
            .unwrap();
        wait_phase(&w2, DragPhase::RemoteOriginDrag).await;
        let status = w2.wait_for(|s| s.drop_info.is_some()).await.unwrap();
        assert_eq!(status.dragging.as_deref(), Some("tab-1"));
        assert_eq!(preview_2.snapshot().outline, Some(full()));

        w1.send(WindowEvent::PointerUp(PointerEvent::new("mouseup", 960.0, 100.0)))
            .await
            .unwrap();
        wait_phase(&w1, DragPhase::Idle).await;
        wait_phase(&w2, DragPhase::Idle).await;

        assert_eq!(log_1.actions(), vec![Action::DeleteNode { node_id: "tab-1".into() }]);
        assert_eq!(log_2.children_of("T"), vec!["a", "b", "tab-1"]);
        assert!(preview_2.snapshot().is_clear());

        token.cancel();
        w1.join().await.unwrap();
        w2.join().await.unwrap();
        relay.shutdown();
    })
    .await;

    assert!(result.is_ok(), "Test timed out");
}

#[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn unanswered_handshake_gives_up() {
    let result = tokio::time::timeout(Duration::from_secs(10), async {
        let relay = TestRelay::spawn().await.expect("Failed to spawn relay");
        let mut config = relay.window_config();
        config.handshake_timeout_ms = 300;
        let token = CancellationToken::new();

        let w1 = spawn_window(
            &config,
            TestLayout::new().with_tabset("ts-1", full(), Some(0), &["tab-1"]),
            RecordingPreview::default(),
            WindowGeometry::new(0.0, 0.0, 800.0, 600.0),
            full(),
            token.clone(),
        )
        .await
        .expect("window 1");

        w1.send(WindowEvent::DragStart {
            node: DragNode::new("tab-1", "Output"),
            text: None,
            event: PointerEvent::new("mousedown", 100.0, 100.0),
        })
        .await
        .unwrap();
        // Nobody else is connected, so nobody answers.
        w1.send(WindowEvent::PointerMove(PointerEvent::new("mousemove", 810.0, 100.0)))
            .await
            .unwrap();
        wait_phase(&w1, DragPhase::AwaitingRemoteBind).await;
        wait_phase(&w1, DragPhase::LocalDragging).await;

        token.cancel();
        w1.join().await.unwrap();
        relay.shutdown();
    })
    .await;

    assert!(result.is_ok(), "Test timed out");
}
