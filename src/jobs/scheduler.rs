//! Reconciliation scheduler
//!
//! One loop per registered reconciler. On every tick the loop asks the store
//! for the reconciler's eligible orders and feeds them to its worker pool.
//! There is no in-process retry: a failed job or a skipped pass is simply
//! picked up again by a later tick, because the row is still eligible.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::worker_pool::WorkerPool;
use crate::config::SchedulerConfig;
use crate::error::{ReconcileError, StoreError};
use crate::models::order::Eligibility;
use crate::services::store::OrderStore;

/// Time given to in-flight jobs once shutdown is requested
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Business logic run by a worker for one order
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Store predicate selecting the orders this reconciler handles
    fn eligibility(&self) -> Eligibility;

    async fn reconcile(&self, order_id: i32) -> Result<(), ReconcileError>;
}

pub struct Scheduler {
    store: Arc<dyn OrderStore>,
    config: SchedulerConfig,
    shutdown: CancellationToken,
    shutdown_grace: Duration,
    loops: JoinSet<()>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn OrderStore>,
        config: SchedulerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            config,
            shutdown,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            loops: JoinSet::new(),
        }
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Start a worker pool and a scheduling loop for `reconciler`
    pub fn register(&mut self, reconciler: Arc<dyn Reconciler>) {
        let pool = WorkerPool::start(reconciler.name(), self.config.workers, reconciler.clone());

        tracing::info!(
            reconciler = reconciler.name(),
            eligibility = %reconciler.eligibility(),
            workers = self.config.workers,
            interval_ms = self.config.tick_interval.as_millis() as u64,
            "Registering reconciler"
        );

        self.loops.spawn(run_loop(
            self.store.clone(),
            reconciler,
            pool,
            self.config.tick_interval,
            self.shutdown.clone(),
            self.shutdown_grace,
        ));
    }

    /// Wait for every loop to stop. Loops stop once the shutdown token fires.
    pub async fn join(mut self) {
        while let Some(joined) = self.loops.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Scheduler loop ended abnormally");
            }
        }
        tracing::info!("Reconciliation scheduler stopped");
    }
}

async fn run_loop(
    store: Arc<dyn OrderStore>,
    reconciler: Arc<dyn Reconciler>,
    pool: WorkerPool,
    period: Duration,
    shutdown: CancellationToken,
    grace: Duration,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // Submitting can block on a busy pool; shutdown must still win
        tokio::select! {
            _ = shutdown.cancelled() => break,
            outcome = run_pass(store.as_ref(), reconciler.eligibility(), &pool) => {
                match outcome {
                    Ok(0) => {}
                    Ok(submitted) => {
                        tracing::debug!(reconciler = reconciler.name(), submitted, "Reconciliation pass dispatched");
                    }
                    Err(e) => {
                        tracing::error!(
                            reconciler = reconciler.name(),
                            error = %e,
                            "Eligibility query failed, skipping pass"
                        );
                    }
                }
            }
        }
    }

    tracing::info!(reconciler = reconciler.name(), "Shutdown requested, draining worker pool");
    pool.shutdown(grace).await;
}

/// One pass: load the eligible set and submit every id.
///
/// A failed query dispatches nothing. Returns the number of submitted jobs.
pub async fn run_pass(
    store: &dyn OrderStore,
    eligibility: Eligibility,
    pool: &WorkerPool,
) -> Result<usize, StoreError> {
    let order_ids = store.load_eligible(eligibility).await?;

    let mut submitted = 0;
    for order_id in order_ids {
        if let Err(e) = pool.submit(order_id).await {
            tracing::warn!(pool = pool.name(), order_id, error = %e, "Could not submit job");
            break;
        }
        submitted += 1;
    }

    Ok(submitted)
}
