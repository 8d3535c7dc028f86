// Run ID Provider Port

use crate::domain::RunId;

/// Run identifier provider
///
/// Identifiers must not collide across runner instances that run at the same
/// time, including instances in other processes sharing the job table.
pub trait RunIdProvider: Send + Sync {
    /// Generate a fresh run identifier
    fn generate_run_id(&self) -> RunId;
}

/// Process id + UUID v4 provider (production)
pub struct ProcessRunIdProvider;

impl RunIdProvider for ProcessRunIdProvider {
    fn generate_run_id(&self) -> RunId {
        RunId::new(format!(
            "{}-{}",
            std::process::id(),
            uuid::Uuid::new_v4().simple()
        ))
    }
}
