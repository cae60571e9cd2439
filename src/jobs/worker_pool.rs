//! Fixed-size worker pool draining one reconciler's job channel
//!
//! `size` workers are spawned once and share a single receiver. The channel
//! holds at most one queued job, so `submit` waits while every worker is busy.
//! A worker that panics inside a job logs the panic and keeps serving.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use super::scheduler::Reconciler;
use crate::error::ReconcileError;

/// One pending job slot between the scheduler and the workers
const JOB_CHANNEL_CAPACITY: usize = 1;

#[derive(Debug, thiserror::Error)]
#[error("worker pool {0} is closed")]
pub struct PoolClosed(pub &'static str);

pub struct WorkerPool {
    name: &'static str,
    sender: mpsc::Sender<i32>,
    workers: JoinSet<()>,
}

impl WorkerPool {
    /// Spawn `size` workers running `reconciler` for every received order id
    pub fn start(name: &'static str, size: usize, reconciler: Arc<dyn Reconciler>) -> Self {
        let (sender, receiver) = mpsc::channel(JOB_CHANNEL_CAPACITY);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = JoinSet::new();
        for worker_id in 0..size.max(1) {
            workers.spawn(worker_loop(
                name,
                worker_id,
                receiver.clone(),
                reconciler.clone(),
            ));
        }

        tracing::info!(pool = name, workers = size.max(1), "Worker pool started");

        Self {
            name,
            sender,
            workers,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Hand one order id to the pool, waiting for a free slot
    pub async fn submit(&self, order_id: i32) -> Result<(), PoolClosed> {
        self.sender
            .send(order_id)
            .await
            .map_err(|_| PoolClosed(self.name))
    }

    /// Close the channel and wait for queued and in-flight jobs.
    ///
    /// Workers still running after `grace` are aborted. Abandoned jobs are
    /// picked up again by the next scheduler tick after restart.
    pub async fn shutdown(self, grace: Duration) {
        let WorkerPool {
            name,
            sender,
            mut workers,
        } = self;
        drop(sender);

        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(pool = name, error = %e, "Worker task ended abnormally");
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                pool = name,
                remaining = workers.len(),
                "Worker pool did not drain in time, aborting in-flight jobs"
            );
            workers.shutdown().await;
        }

        tracing::info!(pool = name, "Worker pool stopped");
    }
}

async fn worker_loop(
    pool: &'static str,
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<i32>>>,
    reconciler: Arc<dyn Reconciler>,
) {
    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };

        let Some(order_id) = job else {
            break;
        };

        let outcome = AssertUnwindSafe(reconciler.reconcile(order_id))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {
                tracing::debug!(pool, worker_id, order_id, "Job finished");
            }
            Ok(Err(e)) => log_failure(pool, order_id, &e),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(pool, worker_id, order_id, panic = %message, "Job panicked");
            }
        }
    }

    tracing::debug!(pool, worker_id, "Worker exiting");
}

fn log_failure(pool: &'static str, order_id: i32, error: &ReconcileError) {
    match error {
        ReconcileError::Provider(e) => {
            tracing::warn!(pool, order_id, kind = %e.kind(), error = %e, "Job failed, retrying next tick")
        }
        ReconcileError::Store(e) => {
            tracing::error!(pool, order_id, error = %e, "Job aborted on store failure")
        }
        ReconcileError::Skipped { reason, .. } => {
            tracing::warn!(pool, order_id, reason = %reason, "Job skipped")
        }
    }
}
