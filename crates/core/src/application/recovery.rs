// Stale lock recovery
use crate::application::runner::constants::DEFAULT_STALE_LOCK_WINDOW_MS;
use crate::port::{JobStore, TimeProvider};
use std::sync::Arc;
use tracing::{info, warn};

/// Stale lock recovery service
///
/// A runner that crashes mid-run leaves its jobs locked under a run id nobody
/// will release. This service clears claims older than the recovery window so
/// the jobs become eligible again. A job released this way may have been
/// delivered already; it is then delivered a second time.
pub struct RecoveryService {
    job_store: Arc<dyn JobStore>,
    time_provider: Arc<dyn TimeProvider>,
    stale_after_ms: i64,
}

impl RecoveryService {
    /// Create a new recovery service
    ///
    /// # Arguments
    /// * `job_store` - Job store
    /// * `time_provider` - Time provider
    /// * `stale_after_ms` - Optional custom recovery window (default: 15 minutes)
    ///
    /// Runs restamp each claim before delivering it, so the window only has to
    /// exceed the longest single delivery.
    pub fn new(
        job_store: Arc<dyn JobStore>,
        time_provider: Arc<dyn TimeProvider>,
        stale_after_ms: Option<i64>,
    ) -> Self {
        Self {
            job_store,
            time_provider,
            stale_after_ms: stale_after_ms.unwrap_or(DEFAULT_STALE_LOCK_WINDOW_MS),
        }
    }

    /// Release locks older than the recovery window
    ///
    /// # Returns
    /// Number of jobs released
    pub async fn release_stale_locks(&self) -> crate::error::Result<u64> {
        let cutoff = self.time_provider.now_millis() - self.stale_after_ms;

        let released = self.job_store.release_stale(cutoff).await?;
        if released > 0 {
            warn!(
                released = %released,
                cutoff = %cutoff,
                "Released stale job locks left by an unfinished run"
            );
        } else {
            info!(cutoff = %cutoff, "No stale job locks found");
        }
        Ok(released)
    }
}
