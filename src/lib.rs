//! Maker-checker approval gate with request dispatch.
//!
//! This crate holds sensitive back-office operations until a second person signs off. A
//! maker creates an approval request naming a handler type, a request type and an opaque
//! payload; a checker approves, declines or defers it; an approved request is executed by
//! routing the payload to the one operation registered for that pair.
//!
//! - [`dispatch`]: the registry mapping `(handler type, request type)` to an operation
//! - [`approval`]: the request lifecycle as a typestate machine
//! - [`manager`]: storage, in memory or PostgreSQL, with optimistic versioning
//! - [`workflow`]: the maker-checker rules, audit trail and notifications tying it together

pub mod approval;
pub mod audit;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod notify;
pub mod workflow;

// Re-export commonly used types
pub use approval::*;
pub use audit::{ActivityType, AuditEntry, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use dispatch::{
    DispatchRequest, DispatchResponse, HandlerModule, HandlerRegistry, HandlerType, Operation,
    RegistryBuilder, async_operation, fn_operation, typed_operation,
};
pub use error::{CountersignError, Result};
pub use manager::memory::InMemoryApprovalStore;
#[cfg(feature = "postgres")]
pub use manager::postgres::PostgresApprovalStore;
pub use manager::{ApprovalFilter, ApprovalStore};
#[cfg(feature = "metrics")]
pub use metrics::CountersignMetrics;
pub use notify::{Channel, MockNotifier, NoopNotifier, Notification, Notifier, WebhookNotifier};
pub use workflow::{ApprovalWorkflow, NotificationMode, WorkflowConfig};

/// Get the countersign database migrator
///
/// Returns a migrator that can be run against a connection pool.
#[cfg(feature = "postgres")]
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}
