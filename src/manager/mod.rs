//! Persistence traits for the approval gate.
//!
//! This module defines the `ApprovalStore` trait, which provides the interface for
//! recording approval requests and moving them through their lifecycle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::approval::{
    AnyApprovalRequest, ApprovalRequest, ApprovalRequestId, ApprovalRequestStatus,
    ApprovalState, NotTreated,
};
use crate::dispatch::HandlerType;
use crate::error::Result;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

/// Filter for listing approval requests. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApprovalFilter {
    pub status: Option<ApprovalRequestStatus>,
    pub handler_type: Option<HandlerType>,
    /// Username of the maker
    pub maker: Option<String>,
    pub limit: Option<usize>,
}

impl ApprovalFilter {
    pub fn with_status(mut self, status: ApprovalRequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_handler_type(mut self, handler_type: impl Into<HandlerType>) -> Self {
        self.handler_type = Some(handler_type.into());
        self
    }

    pub fn with_maker(mut self, maker: impl Into<String>) -> Self {
        self.maker = Some(maker.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `request` passes the filter (ignores `limit`).
    pub fn matches(&self, request: &AnyApprovalRequest) -> bool {
        let data = request.data();
        self.status.is_none_or(|status| request.status() == status)
            && self
                .handler_type
                .as_ref()
                .is_none_or(|handler_type| &data.handler_type == handler_type)
            && self
                .maker
                .as_deref()
                .is_none_or(|maker| data.maker.username == maker)
    }
}

/// Storage trait for persisting and querying approval requests.
///
/// The type system ensures valid state transitions, so implementations don't
/// need to validate them. They do enforce the version check: the transition methods
/// write `version + 1`, and `persist` must fail with `VersionConflict` unless the stored
/// request still carries `version`.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// Record a newly created request.
    async fn insert(&self, request: &ApprovalRequest<NotTreated>) -> Result<()>;

    /// Update an existing request's state in storage.
    ///
    /// # Errors
    /// - `ApprovalRequestNotFound` if the request was never inserted
    /// - `VersionConflict` if another writer got there first
    async fn persist<T: ApprovalState + Clone + 'static>(
        &self,
        request: &ApprovalRequest<T>,
    ) -> Result<()>
    where
        AnyApprovalRequest: From<ApprovalRequest<T>>;

    /// Get a request in whatever state it is in.
    async fn get(&self, id: ApprovalRequestId) -> Result<AnyApprovalRequest>;

    /// List requests matching the filter, newest first.
    async fn list(&self, filter: ApprovalFilter) -> Result<Vec<AnyApprovalRequest>>;
}
