// Port Layer - Interfaces for external dependencies

pub mod id_provider; // Run identifiers (lock tokens)
pub mod job_store;
pub mod time_provider;
pub mod transaction;
pub mod transport;

// Re-exports
pub use id_provider::RunIdProvider;
pub use job_store::{AuditLog, JobStore};
pub use time_provider::TimeProvider;
pub use transaction::{JobStoreTransaction, Transaction, TransactionalJobStore};
pub use transport::{DeliveryError, MetricTransport};
