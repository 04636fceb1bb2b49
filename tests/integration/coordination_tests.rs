use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use graph_layout_coordinator::config::MetricsConfig;
use graph_layout_coordinator::metrics::MetricsCollector;
use graph_layout_coordinator::worker::{execute_job, JobMeta, WorkerJob};
use graph_layout_coordinator::{
    Config, Coordinator, Edge, LayeredEngine, LayoutError, LayoutInput, LayoutManager, LayoutOptions,
    LayoutOutcome, LayoutUpdate, Phase, PreparedLayout,
};
use tokio::sync::mpsc;

use crate::support::{extents, find_overlap, manager_with, sized, FailingEngine, InflatingEngine, SlowEngine};

const WAIT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn overlapping_requests_cancel_the_first() -> Result<()> {
    let engine = Arc::new(SlowEngine::new(Duration::from_millis(50)));
    let mut manager = manager_with(engine.clone());
    let input = LayoutInput::fresh(vec![sized("A"), sized("B")], vec![Edge::new("A", "B")]);

    let first = manager.request_layout_with_defaults(&input)?;
    let second = manager.request_layout_with_defaults(&input)?;
    assert!(second.id > first.id);

    assert!(LayoutOutcome::resolve(first.positions).await.is_cancelled());
    assert!(LayoutOutcome::resolve(first.layout).await.is_cancelled());

    let layout = tokio::time::timeout(WAIT, LayoutOutcome::resolve(second.layout))
        .await?
        .ready()
        .expect("second request completes");
    assert_eq!(layout.vertices.len(), 2);
    assert_eq!(layout.edges.len(), 1);
    assert!(engine.calls.load(Ordering::SeqCst) >= 1);

    manager.dispose().await;
    Ok(())
}

#[tokio::test]
async fn stale_reply_never_reaches_caller() -> Result<()> {
    let metrics = Arc::new(MetricsCollector::new(&MetricsConfig::default())?);
    let (updates_tx, mut updates) = mpsc::unbounded_channel();
    let (mut coordinator, mut replies) =
        Coordinator::new(Arc::new(LayeredEngine::new()), &Config::default(), metrics.clone(), updates_tx);

    let options = LayoutOptions { use_dot_edges: true, ..Default::default() };
    let input = LayoutInput::fresh(vec![sized("A"), sized("B")], vec![Edge::new("A", "B")]);
    let first = PreparedLayout::prepare(1, &input, options.clone())?;
    let late = execute_job(
        &LayeredEngine::new(),
        &WorkerJob { meta: JobMeta { layout_id: 1, worker_id: 1, phase: Phase::DotOnly }, job: first.job.clone() },
    );

    coordinator.get_layout(first)?;
    coordinator.get_layout(PreparedLayout::prepare(2, &input, options)?)?;

    // a complete, valid result for the superseded request
    coordinator.handle_reply(late);
    assert!(updates.try_recv().is_err());

    // the first worker may have replied before it was killed
    let update = loop {
        let reply = tokio::time::timeout(WAIT, replies.recv()).await?.expect("worker reply");
        coordinator.handle_reply(reply);
        if let Ok(update) = updates.try_recv() {
            break update;
        }
    };
    assert!(matches!(update, LayoutUpdate::Done { layout_id: 2, .. }));
    assert!(updates.try_recv().is_err());

    assert!(!metrics.gather_text()?.contains("layout_stale_replies_total 0"));
    coordinator.dispose();
    Ok(())
}

#[tokio::test]
async fn positions_precede_final_layout() -> Result<()> {
    let mut manager = LayoutManager::from_config(&Config::default())?;
    let input = LayoutInput::fresh(
        vec![sized("A"), sized("B"), sized("C")],
        vec![Edge::new("A", "B"), Edge::new("A", "C")],
    );
    let pending = manager.request_layout_with_defaults(&input)?;

    let positions = tokio::time::timeout(WAIT, LayoutOutcome::resolve(pending.positions))
        .await?
        .ready()
        .expect("positions");
    let layout = tokio::time::timeout(WAIT, LayoutOutcome::resolve(pending.layout))
        .await?
        .ready()
        .expect("layout");

    assert_eq!(positions.graph, layout.graph);
    assert_eq!(positions.vertices.len(), layout.vertices.len());
    for (early, last) in positions.vertices.iter().zip(&layout.vertices) {
        assert_eq!(early.key, last.key);
        assert!((early.left - last.left).abs() < 1e-3);
        assert!((early.top - last.top).abs() < 1e-3);
    }
    assert_eq!(layout.edges.len(), 2);
    assert!(find_overlap(&layout.vertices, 1e-6).is_none());

    manager.dispose().await;
    Ok(())
}

#[tokio::test]
async fn graft_keeps_existing_vertices_and_rezeroes() -> Result<()> {
    let mut manager = LayoutManager::from_config(&Config::default())?;
    let base_input = LayoutInput::fresh(vec![sized("A"), sized("B")], vec![Edge::new("A", "B")]);
    let base = LayoutOutcome::resolve(manager.request_layout_with_defaults(&base_input)?.layout)
        .await
        .ready()
        .expect("base layout");

    assert_eq!(base.vertices.len(), 2);
    assert_eq!(base.edges.len(), 1);
    assert!(base.graph.width >= 20.0 + LayoutOptions::default().ranksep - 1e-9);
    assert!(base.graph.height >= 10.0);

    let input = LayoutInput::extend(
        base.graph,
        base.vertices.clone(),
        base.edges.clone(),
        vec![sized("C")],
        vec![Edge::new("B", "C")],
    );
    let layout = tokio::time::timeout(WAIT, LayoutOutcome::resolve(manager.request_layout_with_defaults(&input)?.layout))
        .await?
        .ready()
        .expect("grafted layout");

    assert_eq!(layout.new_vertex_keys, vec!["C"]);
    assert_eq!(layout.vertices.len(), 3);
    assert_eq!(layout.edges.len(), 2);
    for before in &base.vertices {
        let after = layout.vertices.iter().find(|v| v.key == before.key).expect("kept vertex");
        assert!((after.left - before.left).abs() < 1e-6);
        assert!((after.top - before.top).abs() < 1e-6);
    }

    let (min_x, min_y, max_x, max_y) = extents(&layout.vertices);
    assert!(min_x.abs() < 1e-6 && min_y.abs() < 1e-6);
    assert!((max_x - layout.graph.width).abs() < 1e-6);
    assert!((max_y - layout.graph.height).abs() < 1e-6);
    assert!(find_overlap(&layout.vertices, 1e-6).is_none());

    manager.dispose().await;
    Ok(())
}

#[tokio::test]
async fn size_drift_fails_the_request() -> Result<()> {
    let mut manager = manager_with(Arc::new(InflatingEngine));
    let pending = manager.request_layout_with_defaults(&LayoutInput::fresh(vec![sized("A")], vec![]))?;

    match tokio::time::timeout(WAIT, LayoutOutcome::resolve(pending.layout)).await? {
        LayoutOutcome::Failed(message) => assert!(message.contains("size threshold"), "{}", message),
        other => panic!("expected failure, got {:?}", other),
    }

    manager.dispose().await;
    Ok(())
}

#[tokio::test]
async fn engine_failure_stalls_until_superseded() -> Result<()> {
    let mut manager = manager_with(Arc::new(FailingEngine));
    let pending = manager.request_layout_with_defaults(&LayoutInput::fresh(vec![sized("A")], vec![]))?;

    let mut layout = pending.layout;
    let stalled = tokio::time::timeout(Duration::from_millis(200), &mut layout).await;
    assert!(stalled.is_err(), "no final update after a worker error");

    manager.dispose().await;
    assert!(LayoutOutcome::resolve(layout).await.is_cancelled());
    Ok(())
}

#[tokio::test]
async fn disposed_manager_fails_fast() -> Result<()> {
    let mut manager = LayoutManager::from_config(&Config::default())?;
    manager.dispose().await;

    let err = manager
        .request_layout_with_defaults(&LayoutInput::fresh(vec![sized("A")], vec![]))
        .unwrap_err();
    assert_eq!(err, LayoutError::Disposed);
    Ok(())
}

#[tokio::test]
async fn unanchored_vertices_are_rejected_before_any_worker() -> Result<()> {
    let mut manager = LayoutManager::from_config(&Config::default())?;
    let base = LayoutOutcome::resolve(
        manager
            .request_layout_with_defaults(&LayoutInput::fresh(vec![sized("A")], vec![]))?
            .layout,
    )
    .await
    .ready()
    .expect("base layout");

    let input = LayoutInput::extend(base.graph, base.vertices, base.edges, vec![sized("X")], vec![]);
    assert_eq!(
        manager.request_layout_with_defaults(&input).unwrap_err(),
        LayoutError::Unanchored(vec!["X".into()])
    );

    manager.dispose().await;
    Ok(())
}
