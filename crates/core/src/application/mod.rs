// Application Layer - Use Cases and Business Logic

pub mod metrics;
pub mod recovery;
pub mod retry;
pub mod runner;

// Re-exports
pub use metrics::{MetricReceipt, MetricsClient};
pub use recovery::RecoveryService;
pub use retry::RetryPolicy;
pub use runner::{
    shutdown_channel, FailedJob, JobFailure, JobRunner, PeriodicRunner, RunReport, ShutdownSender,
    ShutdownToken,
};
