// Domain Layer - Pure business logic and entities

pub mod job;
pub mod metric;

// Re-exports
pub use job::{CompletedJob, Job, JobId, NewJob, RunId};
pub use metric::{EncodedValue, MetricValue, Scalar};
