//! Runtime lifecycle management
//!
//! One scheduler task per transport family plus a batch monitor that
//! publishes completed ticks. Every task stops on the returned token.

use crate::core::batch::BatchTracker;
use crate::core::scheduler::{PollScheduler, SchedulerConfig, SchedulerContext};
use crate::core::transport::FieldTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything the workers share
pub struct RuntimeDeps {
    pub scheduler: SchedulerConfig,
    /// One transport per family that has a worker
    pub transports: Vec<Arc<dyn FieldTransport>>,
    pub ctx: SchedulerContext,
    /// How often the batch monitor checks the ledger
    pub monitor_interval: Duration,
}

/// Running acquisition tasks
pub struct AcquisitionHandles {
    pub workers: Vec<JoinHandle<()>>,
    pub token: CancellationToken,
}

impl AcquisitionHandles {
    /// Cancel every task and wait for it to finish
    pub async fn shutdown(self) {
        self.token.cancel();
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!("Worker join: {}", e);
            }
        }
        info!("Acquisition stopped");
    }
}

/// Spawn the scheduler workers and the batch monitor
pub fn start_acquisition(deps: RuntimeDeps) -> AcquisitionHandles {
    let token = CancellationToken::new();
    let mut workers = Vec::with_capacity(deps.transports.len() + 1);

    for transport in deps.transports {
        let scheduler = PollScheduler::new(deps.scheduler.clone(), transport, deps.ctx.clone());
        workers.push(tokio::spawn(scheduler.run(token.child_token())));
    }

    let (monitor, _) = start_batch_monitor(
        Arc::clone(&deps.ctx.batch),
        deps.monitor_interval,
        token.child_token(),
    );
    workers.push(monitor);

    info!("Acquisition started: {} task(s)", workers.len());
    AcquisitionHandles { workers, token }
}

/// Log and drain the ledger each time every tracked device is accounted for
pub fn start_batch_monitor(
    batch: Arc<BatchTracker>,
    period: Duration,
    token: CancellationToken,
) -> (JoinHandle<()>, CancellationToken) {
    let task_token = token.clone();

    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let Some(entries) = batch.take_if_complete() else {
                        continue;
                    };
                    let succeeded: usize = entries.values().map(|e| e.succeeded).sum();
                    let failed: usize = entries.values().map(|e| e.failed).sum();
                    info!(
                        "Batch complete: {} device(s), {} ok, {} failed",
                        entries.len(),
                        succeeded,
                        failed
                    );
                }
                () = task_token.cancelled() => {
                    debug!("Batch monitor received cancellation signal");
                    break;
                }
            }
        }
    });

    (handle, token)
}
