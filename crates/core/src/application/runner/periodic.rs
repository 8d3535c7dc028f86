// Periodic runner loop

use super::constants::ERROR_RECOVERY_SLEEP_DURATION;
use super::{JobRunner, ShutdownToken};
use crate::application::recovery::RecoveryService;
use crate::error::Result;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Runs the job runner on a fixed interval until shutdown
pub struct PeriodicRunner {
    runner: JobRunner,
    recovery: Option<RecoveryService>,
    interval: Duration,
}

impl PeriodicRunner {
    pub fn new(runner: JobRunner, interval: Duration) -> Self {
        Self {
            runner,
            recovery: None,
            interval,
        }
    }

    /// Sweep stale locks before every pass
    pub fn with_recovery(mut self, recovery: RecoveryService) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// One iteration: sweep, then run. Returns the number of delivered jobs.
    pub async fn tick(&mut self) -> Result<usize> {
        if let Some(recovery) = &self.recovery {
            recovery.release_stale_locks().await?;
        }

        let report = self.runner.run().await?;
        if !report.is_clean() {
            warn!(
                run_id = %report.run_id,
                failed = report.failed.len(),
                errors = ?self.runner.errors(),
                "Run finished with failed jobs, they will be retried on the next pass"
            );
        }
        Ok(report.delivered)
    }

    /// Run loop with graceful shutdown support
    pub async fn run(&mut self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(interval_ms = self.interval.as_millis() as u64, "Periodic runner started");
        loop {
            if shutdown.is_shutdown() {
                info!("Periodic runner shutting down");
                break;
            }
            let pause = match self.tick().await {
                Ok(_) => self.interval,
                Err(e) => {
                    error!(error = %e, "Runner pass failed");
                    ERROR_RECOVERY_SLEEP_DURATION.min(self.interval)
                }
            };
            tokio::select! {
                _ = sleep(pause) => {},
                _ = shutdown.wait() => {
                    info!("Periodic runner interrupted while idle");
                    break;
                }
            }
        }
        info!("Periodic runner stopped");
        Ok(())
    }
}
