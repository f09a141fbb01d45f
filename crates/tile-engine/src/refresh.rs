//! Download coordination and the supervised worker pool.
//!
//! The coordinator is the only component that talks to upstream. Each new
//! run it downloads is broadcast as [`RefreshMessage::Loaded`] to every
//! worker, and each worker loads it into its own orchestrator, so workers
//! never share grid memory. Tile requests are routed round-robin.
//!
//! A supervisor task per worker restarts it with a fresh orchestrator if it
//! panics, replaying the last `Loaded` message of every source.

use crate::layer::RawOptions;
use crate::metrics;
use crate::orchestrator::{MapMeta, Orchestrator, TileResponse};
use data_sources::Strike;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tile_common::{RunId, TileCoord, TileError, TileResult};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshMessage {
    /// `source` has `run` on disk, ready to load.
    Loaded { source: String, run: RunId },
}

enum WorkerMessage {
    Refresh(RefreshMessage),
    Render {
        layer: String,
        coord: TileCoord,
        options: RawOptions,
        if_none_match: Option<String>,
        reply: oneshot::Sender<TileResult<TileResponse>>,
    },
    Meta {
        reply: oneshot::Sender<MapMeta>,
    },
    Lightning {
        since: i64,
        to: i64,
        reply: oneshot::Sender<TileResult<Vec<Strike>>>,
    },
}

/// Builds the private orchestrator of a (re)started worker.
pub type OrchestratorFactory = Arc<dyn Fn() -> Orchestrator + Send + Sync>;

struct PoolState {
    inboxes: Vec<mpsc::UnboundedSender<WorkerMessage>>,
    last_loaded: BTreeMap<String, RunId>,
}

fn lock(state: &Mutex<PoolState>) -> MutexGuard<'_, PoolState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

fn replay(state: &PoolState, inbox: &mpsc::UnboundedSender<WorkerMessage>) {
    for (source, run) in &state.last_loaded {
        let message = RefreshMessage::Loaded {
            source: source.clone(),
            run: *run,
        };
        inbox.send(WorkerMessage::Refresh(message)).ok();
    }
}

pub struct WorkerPool {
    state: Arc<Mutex<PoolState>>,
    next: AtomicUsize,
    restarts: Arc<AtomicU64>,
}

impl WorkerPool {
    /// Spawn `workers` supervised workers (at least one). They stop when
    /// `shutdown` fires or is dropped.
    pub fn start(
        workers: usize,
        factory: OrchestratorFactory,
        shutdown: &broadcast::Sender<()>,
    ) -> Self {
        let workers = workers.max(1);
        let state = Arc::new(Mutex::new(PoolState {
            inboxes: Vec::with_capacity(workers),
            last_loaded: BTreeMap::new(),
        }));
        let restarts = Arc::new(AtomicU64::new(0));

        for index in 0..workers {
            let (inbox, receiver) = mpsc::unbounded_channel();
            lock(&state).inboxes.push(inbox);
            tokio::spawn(supervise(
                index,
                receiver,
                state.clone(),
                factory.clone(),
                restarts.clone(),
                shutdown.subscribe(),
            ));
        }
        info!(workers = workers, "Worker pool started");

        Self {
            state,
            next: AtomicUsize::new(0),
            restarts,
        }
    }

    pub fn size(&self) -> usize {
        lock(&self.state).inboxes.len()
    }

    /// Total worker restarts since start.
    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::Relaxed)
    }

    /// Last run announced per source; replayed to restarted workers.
    pub fn last_loaded(&self) -> BTreeMap<String, RunId> {
        lock(&self.state).last_loaded.clone()
    }

    /// Record `message` and deliver it to every worker.
    pub fn broadcast(&self, message: RefreshMessage) {
        let mut state = lock(&self.state);
        let RefreshMessage::Loaded { source, run } = &message;
        state.last_loaded.insert(source.clone(), *run);
        for inbox in &state.inboxes {
            // A restarting worker gets the message through replay
            inbox.send(WorkerMessage::Refresh(message.clone())).ok();
        }
    }

    fn dispatch(&self, message: WorkerMessage) -> TileResult<()> {
        let state = lock(&self.state);
        let index = self.next.fetch_add(1, Ordering::Relaxed) % state.inboxes.len();
        state.inboxes[index]
            .send(message)
            .map_err(|_| TileError::ServiceUnavailable(format!("worker {} is restarting", index)))
    }

    async fn ask<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> WorkerMessage) -> TileResult<T> {
        let (reply, response) = oneshot::channel();
        self.dispatch(build(reply))?;
        response.await.map_err(|_| {
            TileError::ServiceUnavailable("worker stopped before replying".to_string())
        })
    }

    pub async fn get_tile(
        &self,
        layer: &str,
        coord: TileCoord,
        options: RawOptions,
        if_none_match: Option<String>,
    ) -> TileResult<TileResponse> {
        self.ask(|reply| WorkerMessage::Render {
            layer: layer.to_string(),
            coord,
            options,
            if_none_match,
            reply,
        })
        .await?
    }

    pub async fn meta(&self) -> TileResult<MapMeta> {
        self.ask(|reply| WorkerMessage::Meta { reply }).await
    }

    pub async fn lightning_between(&self, since: i64, to: i64) -> TileResult<Vec<Strike>> {
        self.ask(|reply| WorkerMessage::Lightning { since, to, reply })
            .await?
    }
}

/// Keep worker `index` running until shutdown.
async fn supervise(
    index: usize,
    mut receiver: mpsc::UnboundedReceiver<WorkerMessage>,
    state: Arc<Mutex<PoolState>>,
    factory: OrchestratorFactory,
    restarts: Arc<AtomicU64>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let orchestrator = Arc::new(factory());
        let mut worker = tokio::spawn(run_worker(index, orchestrator, receiver));

        let outcome = tokio::select! {
            _ = shutdown.recv() => {
                worker.abort();
                info!(worker = index, "Worker stopping");
                return;
            }
            outcome = &mut worker => outcome,
        };
        match outcome {
            Ok(()) => warn!(worker = index, "Worker exited, restarting"),
            Err(e) if e.is_panic() => error!(worker = index, "Worker panicked, restarting"),
            Err(e) => warn!(worker = index, error = %e, "Worker stopped, restarting"),
        }
        restarts.fetch_add(1, Ordering::Relaxed);
        metrics::record_worker_restart(index);

        let (inbox, next_receiver) = mpsc::unbounded_channel();
        {
            let mut state = lock(&state);
            replay(&state, &inbox);
            state.inboxes[index] = inbox;
        }
        receiver = next_receiver;
    }
}

/// One worker: loads run in order on an inline loader, renders run as
/// spawned tasks so distinct tiles render concurrently. A panic while
/// loading takes the whole worker down.
async fn run_worker(
    index: usize,
    orchestrator: Arc<Orchestrator>,
    mut inbox: mpsc::UnboundedReceiver<WorkerMessage>,
) {
    let (load_tx, mut load_rx) = mpsc::unbounded_channel::<RefreshMessage>();

    let loader = {
        let orchestrator = orchestrator.clone();
        async move {
            while let Some(RefreshMessage::Loaded { source, run }) = load_rx.recv().await {
                match orchestrator.load(&source, run).await {
                    Ok(true) => info!(worker = index, source = %source, run = %run, "Loaded run"),
                    Ok(false) => {
                        warn!(worker = index, source = %source, run = %run, "Kept previous run")
                    }
                    Err(e) => {
                        error!(worker = index, source = %source, run = %run, error = %e, "Load failed")
                    }
                }
            }
        }
    };

    let dispatcher = async move {
        while let Some(message) = inbox.recv().await {
            match message {
                WorkerMessage::Refresh(refresh) => {
                    load_tx.send(refresh).ok();
                }
                WorkerMessage::Render {
                    layer,
                    coord,
                    options,
                    if_none_match,
                    reply,
                } => {
                    let orchestrator = orchestrator.clone();
                    tokio::spawn(async move {
                        let result = orchestrator
                            .get_tile(&layer, coord, &options, if_none_match.as_deref())
                            .await;
                        reply.send(result).ok();
                    });
                }
                WorkerMessage::Meta { reply } => {
                    reply.send(orchestrator.meta()).ok();
                }
                WorkerMessage::Lightning { since, to, reply } => {
                    reply.send(orchestrator.lightning_between(since, to)).ok();
                }
            }
        }
    };

    tokio::join!(loader, dispatcher);
}

/// Polls upstream through a download-only orchestrator.
pub struct Coordinator {
    orchestrator: Orchestrator,
    pool: Arc<WorkerPool>,
    interval: Duration,
}

impl Coordinator {
    pub fn new(orchestrator: Orchestrator, pool: Arc<WorkerPool>, interval: Duration) -> Self {
        Self {
            orchestrator,
            pool,
            interval,
        }
    }

    /// Download every source once and announce new runs. Returns how many.
    #[instrument(skip(self))]
    pub async fn poll_once(&self) -> usize {
        let mut fresh = Vec::new();
        self.orchestrator
            .download_all(|source, run| {
                fresh.push(RefreshMessage::Loaded {
                    source: source.to_string(),
                    run,
                })
            })
            .await;

        let count = fresh.len();
        for message in fresh {
            self.pool.broadcast(message);
        }
        count
    }

    /// Poll immediately, then every interval, until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutting down coordinator");
                    break;
                }
                _ = ticker.tick() => {
                    let new_runs = self.poll_once().await;
                    info!(new_runs = new_runs, "Poll complete");
                }
            }
        }
    }
}
