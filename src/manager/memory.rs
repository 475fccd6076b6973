//! In-memory implementation of `ApprovalStore`.
//!
//! All state is held in memory and lost on restart. Used by tests and by
//! deployments that keep approvals for the lifetime of a single process.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ApprovalFilter, ApprovalStore};
use crate::approval::{
    AnyApprovalRequest, ApprovalRequest, ApprovalRequestId, ApprovalState, NotTreated,
};
use crate::error::{CountersignError, Result};

/// In-memory approval store.
///
/// Stores requests in a `HashMap` protected by a `RwLock`. The version check happens
/// under the write lock, so it is atomic with the update.
pub struct InMemoryApprovalStore {
    requests: RwLock<HashMap<ApprovalRequestId, AnyApprovalRequest>>,
}

impl InMemoryApprovalStore {
    pub fn new() -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.requests.read().await.len()
    }
}

impl Default for InMemoryApprovalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApprovalStore for InMemoryApprovalStore {
    async fn insert(&self, request: &ApprovalRequest<NotTreated>) -> Result<()> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.data.id) {
            return Err(CountersignError::Validation(format!(
                "approval request {} already exists",
                request.data.id
            )));
        }
        requests.insert(request.data.id, AnyApprovalRequest::from(request.clone()));
        Ok(())
    }

    async fn persist<T: ApprovalState + Clone + 'static>(
        &self,
        request: &ApprovalRequest<T>,
    ) -> Result<()>
    where
        AnyApprovalRequest: From<ApprovalRequest<T>>,
    {
        let id = request.data.id;
        let expected = request.data.version - 1;

        let mut requests = self.requests.write().await;
        let stored = requests
            .get_mut(&id)
            .ok_or(CountersignError::ApprovalRequestNotFound(id))?;

        if stored.version() != expected {
            tracing::debug!(
                approval_id = %id,
                expected,
                stored_version = stored.version(),
                "Rejecting stale write"
            );
            return Err(CountersignError::VersionConflict { id, expected });
        }

        *stored = AnyApprovalRequest::from(request.clone());
        Ok(())
    }

    async fn get(&self, id: ApprovalRequestId) -> Result<AnyApprovalRequest> {
        let requests = self.requests.read().await;
        requests
            .get(&id)
            .cloned()
            .ok_or(CountersignError::ApprovalRequestNotFound(id))
    }

    async fn list(&self, filter: ApprovalFilter) -> Result<Vec<AnyApprovalRequest>> {
        let requests = self.requests.read().await;
        let mut matching: Vec<AnyApprovalRequest> = requests
            .values()
            .filter(|request| filter.matches(request))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.data().created_at.cmp(&a.data().created_at));
        if let Some(limit) = filter.limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }
}
