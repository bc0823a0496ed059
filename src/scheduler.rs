// Periodic generator loops with tracked, bounded delivery and graceful drain
use crate::context::{RunContext, rate_mbps};
use crate::observability::metrics::{DeliveryMetrics, GeneratorMetrics};
use crate::shutdown::{ShutdownCoordinator, ShutdownListener, ShutdownSignal};
use crate::synth::Cancelled;
use crate::transport::DeliveryError;
use crate::workload::Workload;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct LoopSpec {
    /// Independent loops to launch, each with its own timer
    pub loops: usize,
    /// Time between ticks of one loop
    pub interval: Duration,
    /// Deliveries a single loop may have outstanding at once
    pub max_in_flight: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    Idle = 0,
    Running = 1,
    ShuttingDown = 2,
    Stopped = 3,
}

impl LoopState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LoopState::Idle,
            1 => LoopState::Running,
            2 => LoopState::ShuttingDown,
            _ => LoopState::Stopped,
        }
    }
}

#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(LoopState::Idle as u8))
    }

    fn set(&self, state: LoopState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    fn get(&self) -> LoopState {
        LoopState::from_u8(self.0.load(Ordering::SeqCst))
    }
}

/// Counters shared by every loop of one workload.
#[derive(Debug, Default)]
pub struct WorkloadStats {
    pub ticks: AtomicU64,
    pub delivered: AtomicU64,
    pub failed: AtomicU64,
    pub cancelled: AtomicU64,
}

impl WorkloadStats {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }
}

pub struct Scheduler {
    ctx: RunContext,
    shutdown: ShutdownCoordinator,
    states: Mutex<Vec<Arc<StateCell>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    drain_lock: tokio::sync::Mutex<()>,
}

impl Scheduler {
    pub fn new(ctx: RunContext, shutdown: ShutdownCoordinator) -> Self {
        Self {
            ctx,
            shutdown,
            states: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            drain_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Launch `spec.loops` independent loops driving `workload`.
    pub fn spawn<W: Workload>(&self, workload: W, spec: LoopSpec) -> Arc<WorkloadStats> {
        let workload = Arc::new(workload);
        let stats = Arc::new(WorkloadStats::default());

        if self.shutdown.is_shutdown_requested() {
            warn!("Shutdown already requested, not starting {} loops", workload.name());
            return stats;
        }

        let mut tasks = self.tasks.lock();
        let mut states = self.states.lock();
        for loop_id in 0..spec.loops {
            let state = Arc::new(StateCell::new());
            states.push(state.clone());

            let handle = tokio::spawn(run_loop(
                workload.clone(),
                loop_id,
                spec,
                state,
                stats.clone(),
                self.shutdown.listener(),
            ));
            tasks.push(handle);
        }

        info!(
            "Started {} {} loops (interval: {:?}, max in flight: {})",
            spec.loops,
            workload.name(),
            spec.interval,
            spec.max_in_flight
        );

        stats
    }

    /// Periodically log the delivered data rate until shutdown.
    pub fn spawn_reporter(&self, every: Duration) {
        if self.shutdown.is_shutdown_requested() {
            return;
        }
        let handle = tokio::spawn(run_reporter(
            self.ctx.clone(),
            every,
            self.shutdown.listener(),
        ));
        self.tasks.lock().push(handle);
    }

    pub fn loop_states(&self) -> Vec<LoopState> {
        self.states.lock().iter().map(|s| s.get()).collect()
    }

    /// Stop every loop and wait until all dispatched deliveries finished.
    /// Safe to call more than once and before any loop was spawned.
    pub async fn shutdown(&self) {
        let _guard = self.drain_lock.lock().await;

        if self.shutdown.request_shutdown(ShutdownSignal::Graceful) {
            info!("Shutdown requested, draining in-flight deliveries");
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        if tasks.is_empty() {
            return;
        }

        for handle in tasks {
            if let Err(e) = handle.await {
                log_join_error("loop", e);
            }
        }
        info!(
            "All loops stopped, {} bytes delivered in {:?}",
            self.ctx.throughput.total(),
            self.ctx.elapsed()
        );
    }

    /// Block until a shutdown signal arrives, then drain.
    pub async fn run_until_shutdown(&self) -> ShutdownSignal {
        let signal = self.shutdown.wait_for_shutdown().await;
        match signal {
            ShutdownSignal::Interrupt => info!("Interrupted, stopping generator loops"),
            ShutdownSignal::Graceful => info!("Terminating, stopping generator loops"),
        }
        self.shutdown().await;
        signal
    }
}

/// Holds one slot of the in-flight gauge until dropped, including when the
/// delivery task panics or is aborted.
struct InFlight(&'static str);

impl InFlight {
    fn start(workload: &'static str) -> Self {
        DeliveryMetrics::delivery_started(workload);
        Self(workload)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        DeliveryMetrics::delivery_finished(self.0);
    }
}

fn log_join_error(what: &str, err: JoinError) {
    if err.is_panic() {
        error!("A {} task panicked: {}", what, err);
    } else {
        debug!("A {} task was cancelled: {}", what, err);
    }
}

fn log_delivery_failure(workload: &'static str, loop_id: usize, err: &DeliveryError) {
    match err {
        DeliveryError::RemoteRejected { status } => error!(
            kind = err.kind(),
            status = *status,
            "Failed to deliver {} batch from loop {}: {}",
            workload,
            loop_id,
            err
        ),
        _ => error!(
            kind = err.kind(),
            "Failed to deliver {} batch from loop {}: {}",
            workload,
            loop_id,
            err
        ),
    }
}

async fn run_loop<W: Workload>(
    workload: Arc<W>,
    loop_id: usize,
    spec: LoopSpec,
    state: Arc<StateCell>,
    stats: Arc<WorkloadStats>,
    mut shutdown: ShutdownListener,
) {
    let name = workload.name();
    let mut rng = StdRng::from_entropy();
    let permits = Arc::new(Semaphore::new(spec.max_in_flight.max(1)));
    let mut in_flight: JoinSet<()> = JoinSet::new();

    // First tick fires one interval after start.
    let mut ticker = interval_at(Instant::now() + spec.interval, spec.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    state.set(LoopState::Running);
    debug!("{} loop {} running", name, loop_id);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    log_join_error("delivery", e);
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        stats.ticks.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let unit = match workload.generate(&mut rng, &mut shutdown).await {
            Ok(unit) => unit,
            Err(Cancelled) => {
                debug!("{} loop {}: generation cancelled by shutdown", name, loop_id);
                stats.cancelled.fetch_add(1, Ordering::Relaxed);
                GeneratorMetrics::generation_cancelled(name);
                break;
            }
        };
        GeneratorMetrics::generation_duration(name, started.elapsed());
        GeneratorMetrics::unit_generated(name, W::unit_len(&unit));

        let permit = tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let workload = workload.clone();
        let stats = stats.clone();
        let tracker = InFlight::start(name);
        in_flight.spawn(async move {
            let _permit = permit;
            let _tracker = tracker;
            let started = Instant::now();
            let result = workload.deliver(unit).await;
            DeliveryMetrics::duration(name, started.elapsed());

            match result {
                Ok(bytes) => {
                    stats.delivered.fetch_add(1, Ordering::Relaxed);
                    DeliveryMetrics::success(name, bytes);
                    debug!("{} loop {} delivered {} bytes", name, loop_id, bytes);
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    DeliveryMetrics::failure(name, e.kind());
                    log_delivery_failure(name, loop_id, &e);
                }
            }
        });
    }

    state.set(LoopState::ShuttingDown);
    if !in_flight.is_empty() {
        debug!(
            "{} loop {} draining {} deliveries",
            name,
            loop_id,
            in_flight.len()
        );
    }
    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            log_join_error("delivery", e);
        }
    }
    state.set(LoopState::Stopped);
    debug!("{} loop {} stopped", name, loop_id);
}

async fn run_reporter(ctx: RunContext, every: Duration, mut shutdown: ShutdownListener) {
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_total = ctx.throughput.total();
    let mut last_at = Instant::now();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {}
        }

        let total = ctx.throughput.total();
        let now = Instant::now();
        let overall = rate_mbps(total, ctx.elapsed());
        let window = rate_mbps(total.saturating_sub(last_total), now - last_at);
        last_total = total;
        last_at = now;

        DeliveryMetrics::throughput_mbps(window);
        info!(
            "Data transfer rate: {:.2} MB/s (last {:?}: {:.2} MB/s)",
            overall, every, window
        );
    }
}
