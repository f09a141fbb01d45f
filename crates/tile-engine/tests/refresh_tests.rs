//! Coordinator polling and the supervised worker pool.

mod common;

use common::{Harness, RUN_A, RUN_B};
use std::sync::Arc;
use std::time::Duration;
use tile_common::{RunId, TileCoord, TileError};
use tile_engine::{Coordinator, OrchestratorFactory, RawOptions, RefreshMessage, WorkerPool};
use tokio::sync::broadcast;

const COORD: TileCoord = TileCoord { z: 2, x: 1, y: 1 };

fn factory(harness: &Arc<Harness>) -> OrchestratorFactory {
    let harness = harness.clone();
    Arc::new(move || harness.orchestrator())
}

/// Poll the pool until every worker reports `run` for the fake source.
async fn wait_for_run(pool: &WorkerPool, run: RunId) {
    let mut confirmed = 0;
    for _ in 0..300 {
        if let Ok(meta) = pool.meta().await {
            if meta.sources["fake"].latest == Some(run) {
                confirmed += 1;
                // Round-robin: consecutive hits cover every worker
                if confirmed >= pool.size() * 2 {
                    return;
                }
                continue;
            }
        }
        confirmed = 0;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("workers never reported run {}", run);
}

// ============================================================================
// Coordinator
// ============================================================================

#[tokio::test]
async fn test_poll_announces_each_new_run_once() {
    let harness = Arc::new(Harness::new());
    let (shutdown, _) = broadcast::channel(1);
    let pool = Arc::new(WorkerPool::start(2, factory(&harness), &shutdown));
    let coordinator = Coordinator::new(harness.orchestrator(), pool.clone(), Duration::from_secs(60));

    assert_eq!(coordinator.poll_once().await, 0);

    harness.upstream.publish(RUN_A);
    // Both the fake and gfs sources see the new run
    assert_eq!(coordinator.poll_once().await, 2);
    assert_eq!(coordinator.poll_once().await, 0);
    assert_eq!(pool.last_loaded().get("fake"), Some(&RUN_A));

    wait_for_run(&pool, RUN_A).await;

    harness.upstream.publish(RUN_B);
    assert_eq!(coordinator.poll_once().await, 2);
    wait_for_run(&pool, RUN_B).await;
}

#[tokio::test]
async fn test_coordinator_run_stops_on_shutdown() {
    let harness = Arc::new(Harness::new());
    harness.upstream.publish(RUN_A);
    let (shutdown, _) = broadcast::channel(1);
    let pool = Arc::new(WorkerPool::start(1, factory(&harness), &shutdown));
    let coordinator = Coordinator::new(harness.orchestrator(), pool.clone(), Duration::from_millis(20));

    let handle = tokio::spawn(coordinator.run(shutdown.subscribe()));
    // The first tick polls immediately
    wait_for_run(&pool, RUN_A).await;

    shutdown.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("coordinator did not stop")
        .unwrap();
}

// ============================================================================
// Worker pool
// ============================================================================

#[tokio::test]
async fn test_requests_before_any_run_are_not_loaded() {
    let harness = Arc::new(Harness::new());
    let (shutdown, _) = broadcast::channel(1);
    let pool = WorkerPool::start(2, factory(&harness), &shutdown);

    let err = pool
        .get_tile("counting", COORD, RawOptions::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, TileError::NotLoaded(_)));
}

#[tokio::test]
async fn test_workers_serve_tiles_after_broadcast() {
    let harness = Arc::new(Harness::new());
    let (shutdown, _) = broadcast::channel(1);
    let pool = WorkerPool::start(3, factory(&harness), &shutdown);
    assert_eq!(pool.size(), 3);

    pool.broadcast(RefreshMessage::Loaded {
        source: "fake".to_string(),
        run: RUN_A,
    });
    wait_for_run(&pool, RUN_A).await;
    // Every worker loads into its own orchestrator
    assert_eq!(harness.upstream.load_count(), 3);

    for _ in 0..6 {
        let tile = pool
            .get_tile("counting", COORD, RawOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(
            tile.etag(),
            format!("\"counting-fake-{}-0-1-1-2.png\"", RUN_A)
        );
    }
    // The workers share one cache
    assert_eq!(harness.layer.renders(), 1);
}

#[tokio::test]
async fn test_panicking_worker_restarts_and_replays_runs() {
    let harness = Arc::new(Harness::new());
    let (shutdown, _) = broadcast::channel(1);
    let pool = WorkerPool::start(1, factory(&harness), &shutdown);

    harness.upstream.panic_on_next_loads(1);
    pool.broadcast(RefreshMessage::Loaded {
        source: "fake".to_string(),
        run: RUN_A,
    });

    wait_for_run(&pool, RUN_A).await;
    assert_eq!(pool.restarts(), 1);
    // The crashed load plus the replayed one
    assert_eq!(harness.upstream.load_count(), 2);

    let tile = pool
        .get_tile("counting", COORD, RawOptions::new(None, Some("6")), None)
        .await
        .unwrap();
    assert!(matches!(tile, tile_engine::TileResponse::Fresh { .. }));
}

#[tokio::test]
async fn test_pool_is_unavailable_after_shutdown() {
    let harness = Arc::new(Harness::new());
    let (shutdown, _) = broadcast::channel(1);
    let pool = WorkerPool::start(2, factory(&harness), &shutdown);
    pool.broadcast(RefreshMessage::Loaded {
        source: "fake".to_string(),
        run: RUN_A,
    });
    wait_for_run(&pool, RUN_A).await;

    shutdown.send(()).unwrap();

    let mut last = None;
    for _ in 0..100 {
        match pool.meta().await {
            Err(e) => {
                last = Some(e);
                break;
            }
            Ok(_) => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    }
    assert!(matches!(last, Some(TileError::ServiceUnavailable(_))));
    assert_eq!(pool.restarts(), 0);
}
