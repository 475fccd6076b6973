//! State transitions for approval requests using the typestate pattern.
//!
//! Each transition consumes the request, builds the request in its next state with the
//! version bumped by one, and persists it. The store refuses the write unless it still
//! holds the previous version, which serializes concurrent reviewers on a single request.
//!
//! ```text
//! create() ──> ApprovalRequest<NotTreated> ──submit()──> ApprovalRequest<Submitted>
//!                                                          │   │   │
//!                      ApprovalRequest<Pending> <─defer()──┘   │   └─decline()─> ApprovalRequest<Declined>
//!                        │  └──submit()──> Submitted           │
//!                        ├──approve()──> Treated               │
//!                        └──decline()──> Declined              │
//!                                                              └─approve()─> ApprovalRequest<Treated>
//!
//! ApprovalRequest<Treated> ──begin_execution()──> ApprovalRequest<Processing> ──complete()──> ApprovalRequest<Executed>
//!                                                   └──abort()──> ApprovalRequest<Treated>
//! ```
//!
//! `Executed` and `Declined` expose no transitions at all.

use chrono::Utc;
use metrics::counter;

use crate::error::{CountersignError, Result};
use crate::manager::ApprovalStore;

use super::state::{
    Actor, AnyApprovalRequest, ApprovalAction, ApprovalRequest, ApprovalRequestData,
    ApprovalRequestId, ApprovalState, Decision, Declined, Executed, NewApprovalRequest,
    NotTreated, Pending, Processing, Submitted, Treated,
};

/// Move `data` into `state`, bumping the version.
fn advance<F: ApprovalState, T: ApprovalState>(
    data: ApprovalRequestData,
    state: T,
) -> ApprovalRequest<T> {
    tracing::debug!(
        approval_id = %data.id,
        from = %F::STATUS,
        to = %T::STATUS,
        version = data.version + 1,
        "Approval request transition"
    );

    ApprovalRequest {
        data: ApprovalRequestData {
            version: data.version + 1,
            ..data
        },
        state,
    }
}

/// Persist a transitioned request, counting the transition once the store accepts it.
async fn commit<F, T, S>(request: ApprovalRequest<T>, storage: &S) -> Result<ApprovalRequest<T>>
where
    F: ApprovalState,
    T: ApprovalState + Clone + 'static,
    S: ApprovalStore + ?Sized,
    AnyApprovalRequest: From<ApprovalRequest<T>>,
{
    storage.persist(&request).await?;
    counter!(
        "countersign_transitions_total",
        "from" => F::STATUS.as_str(),
        "to" => T::STATUS.as_str()
    )
    .increment(1);
    Ok(request)
}

impl ApprovalRequest<NotTreated> {
    /// Create a new approval request owned by `maker` and persist it.
    pub async fn create<S: ApprovalStore + ?Sized>(
        maker: Actor,
        input: NewApprovalRequest,
        storage: &S,
    ) -> Result<ApprovalRequest<NotTreated>> {
        if input.request_type.trim().is_empty() {
            return Err(CountersignError::Validation(
                "request type must not be empty".to_string(),
            ));
        }
        if maker.username.trim().is_empty() {
            return Err(CountersignError::Validation(
                "maker username must not be empty".to_string(),
            ));
        }

        let request = ApprovalRequest {
            state: NotTreated {},
            data: ApprovalRequestData {
                id: ApprovalRequestId::new(),
                handler_type: input.handler_type,
                request_type: input.request_type,
                payload: input.payload,
                description: input.description,
                maker,
                created_at: Utc::now(),
                version: 0,
            },
        };
        storage.insert(&request).await?;
        counter!("countersign_requests_created_total").increment(1);
        Ok(request)
    }

    pub async fn submit<S: ApprovalStore + ?Sized>(
        self,
        storage: &S,
    ) -> Result<ApprovalRequest<Submitted>> {
        let request = advance::<NotTreated, _>(
            self.data,
            Submitted {
                submitted_at: Utc::now(),
            },
        );
        commit::<NotTreated, _, _>(request, storage).await
    }
}

impl ApprovalRequest<Submitted> {
    /// Send the request back to the maker without deciding on it.
    pub async fn defer<S: ApprovalStore + ?Sized>(
        self,
        reviewer: Actor,
        reason: String,
        storage: &S,
    ) -> Result<ApprovalRequest<Pending>> {
        let request = advance::<Submitted, _>(
            self.data,
            Pending {
                submitted_at: self.state.submitted_at,
                deferred_at: Utc::now(),
                deferred_by: reviewer,
                reason,
            },
        );
        commit::<Submitted, _, _>(request, storage).await
    }

    pub async fn approve<S: ApprovalStore + ?Sized>(
        self,
        reviewer: Actor,
        comment: Option<String>,
        storage: &S,
    ) -> Result<ApprovalRequest<Treated>> {
        let decision = Decision::new(reviewer, ApprovalAction::Approve, comment)?;
        let request = advance::<Submitted, _>(
            self.data,
            Treated {
                submitted_at: self.state.submitted_at,
                decision,
                last_failure: None,
            },
        );
        commit::<Submitted, _, _>(request, storage).await
    }

    pub async fn decline<S: ApprovalStore + ?Sized>(
        self,
        reviewer: Actor,
        comment: Option<String>,
        storage: &S,
    ) -> Result<ApprovalRequest<Declined>> {
        let decision = Decision::new(reviewer, ApprovalAction::Decline, comment)?;
        let request = advance::<Submitted, _>(
            self.data,
            Declined {
                submitted_at: self.state.submitted_at,
                decision,
            },
        );
        commit::<Submitted, _, _>(request, storage).await
    }
}

impl ApprovalRequest<Pending> {
    /// Resubmit after the maker has addressed the reviewer's reason.
    pub async fn submit<S: ApprovalStore + ?Sized>(
        self,
        storage: &S,
    ) -> Result<ApprovalRequest<Submitted>> {
        let request = advance::<Pending, _>(
            self.data,
            Submitted {
                submitted_at: Utc::now(),
            },
        );
        commit::<Pending, _, _>(request, storage).await
    }

    pub async fn approve<S: ApprovalStore + ?Sized>(
        self,
        reviewer: Actor,
        comment: Option<String>,
        storage: &S,
    ) -> Result<ApprovalRequest<Treated>> {
        let decision = Decision::new(reviewer, ApprovalAction::Approve, comment)?;
        let request = advance::<Pending, _>(
            self.data,
            Treated {
                submitted_at: self.state.submitted_at,
                decision,
                last_failure: None,
            },
        );
        commit::<Pending, _, _>(request, storage).await
    }

    pub async fn decline<S: ApprovalStore + ?Sized>(
        self,
        reviewer: Actor,
        comment: Option<String>,
        storage: &S,
    ) -> Result<ApprovalRequest<Declined>> {
        let decision = Decision::new(reviewer, ApprovalAction::Decline, comment)?;
        let request = advance::<Pending, _>(
            self.data,
            Declined {
                submitted_at: self.state.submitted_at,
                decision,
            },
        );
        commit::<Pending, _, _>(request, storage).await
    }
}

impl ApprovalRequest<Treated> {
    /// Claim the request for execution.
    ///
    /// Persisting `Processing` before the operation runs means a second executor
    /// racing on the same request loses with `VersionConflict` instead of running it twice.
    pub async fn begin_execution<S: ApprovalStore + ?Sized>(
        self,
        executor: Actor,
        storage: &S,
    ) -> Result<ApprovalRequest<Processing>> {
        let request = advance::<Treated, _>(
            self.data,
            Processing {
                submitted_at: self.state.submitted_at,
                decision: self.state.decision,
                started_at: Utc::now(),
                started_by: executor,
            },
        );
        commit::<Treated, _, _>(request, storage).await
    }
}

impl ApprovalRequest<Processing> {
    pub async fn complete<S: ApprovalStore + ?Sized>(
        self,
        result: serde_json::Value,
        storage: &S,
    ) -> Result<ApprovalRequest<Executed>> {
        let request = advance::<Processing, _>(
            self.data,
            Executed {
                submitted_at: self.state.submitted_at,
                decision: self.state.decision,
                started_at: self.state.started_at,
                executed_at: Utc::now(),
                executed_by: self.state.started_by,
                result,
            },
        );
        commit::<Processing, _, _>(request, storage).await
    }

    /// Return to `Treated` after the operation failed, keeping the failure message.
    pub async fn abort<S: ApprovalStore + ?Sized>(
        self,
        failure: String,
        storage: &S,
    ) -> Result<ApprovalRequest<Treated>> {
        let request = advance::<Processing, _>(
            self.data,
            Treated {
                submitted_at: self.state.submitted_at,
                decision: self.state.decision,
                last_failure: Some(failure),
            },
        );
        commit::<Processing, _, _>(request, storage).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{AnyApprovalRequest, ApprovalRequestStatus, ApprovalStatus};
    use crate::dispatch::HandlerType;
    use crate::manager::memory::InMemoryApprovalStore;

    fn new_input() -> NewApprovalRequest {
        NewApprovalRequest {
            handler_type: HandlerType::from("fee"),
            request_type: "UPDATE_FEE".to_string(),
            payload: serde_json::json!({"fee_id": 7, "amount": "1.50"}),
            description: Some("raise card fee".to_string()),
        }
    }

    #[tokio::test]
    async fn test_full_lifecycle_bumps_version_and_persists() {
        let store = InMemoryApprovalStore::new();
        let maker = Actor::new("maker", "MAKER");
        let checker = Actor::new("checker", "CHECKER");

        let created = ApprovalRequest::create(maker, new_input(), &store)
            .await
            .unwrap();
        assert_eq!(created.data.version, 0);
        let id = created.id();

        let submitted = created.submit(&store).await.unwrap();
        let treated = submitted
            .approve(checker.clone(), Some("ok".to_string()), &store)
            .await
            .unwrap();
        assert_eq!(treated.state.decision.status, ApprovalStatus::Approved);

        let processing = treated.begin_execution(checker, &store).await.unwrap();
        let executed = processing
            .complete(serde_json::json!({"updated": true}), &store)
            .await
            .unwrap();
        assert_eq!(executed.data.version, 4);

        let stored = store.get(id).await.unwrap();
        assert_eq!(stored.status(), ApprovalRequestStatus::Executed);
        assert_eq!(stored.version(), 4);
        assert!(stored.is_terminal());
    }

    #[tokio::test]
    async fn test_defer_then_resubmit() {
        let store = InMemoryApprovalStore::new();
        let created = ApprovalRequest::create(Actor::new("maker", "MAKER"), new_input(), &store)
            .await
            .unwrap();
        let pending = created
            .submit(&store)
            .await
            .unwrap()
            .defer(
                Actor::new("checker", "CHECKER"),
                "attach the fee schedule".to_string(),
                &store,
            )
            .await
            .unwrap();
        assert_eq!(pending.state.reason, "attach the fee schedule");

        let resubmitted = pending.submit(&store).await.unwrap();
        assert_eq!(
            store.get(resubmitted.id()).await.unwrap().status(),
            ApprovalRequestStatus::Submitted
        );
    }

    #[tokio::test]
    async fn test_abort_returns_to_treated_with_failure() {
        let store = InMemoryApprovalStore::new();
        let checker = Actor::new("checker", "CHECKER");
        let processing = ApprovalRequest::create(Actor::new("maker", "MAKER"), new_input(), &store)
            .await
            .unwrap()
            .submit(&store)
            .await
            .unwrap()
            .approve(checker.clone(), None, &store)
            .await
            .unwrap()
            .begin_execution(checker, &store)
            .await
            .unwrap();

        let treated = processing
            .abort("terminal API unavailable".to_string(), &store)
            .await
            .unwrap();
        assert_eq!(
            treated.state.last_failure.as_deref(),
            Some("terminal API unavailable")
        );

        match store.get(treated.id()).await.unwrap() {
            AnyApprovalRequest::Treated(r) => assert!(r.state.last_failure.is_some()),
            other => panic!("expected Treated, got {}", other.variant()),
        }
    }

    #[tokio::test]
    async fn test_stale_copy_loses_race() {
        let store = InMemoryApprovalStore::new();
        let submitted = ApprovalRequest::create(Actor::new("maker", "MAKER"), new_input(), &store)
            .await
            .unwrap()
            .submit(&store)
            .await
            .unwrap();

        let stale = submitted.clone();
        submitted
            .approve(Actor::new("checker-a", "CHECKER"), None, &store)
            .await
            .unwrap();

        let err = stale
            .decline(Actor::new("checker-b", "CHECKER"), None, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, CountersignError::VersionConflict { .. }));
        assert_eq!(
            store.get(stale_id(&err)).await.unwrap().status(),
            ApprovalRequestStatus::Treated
        );
    }

    fn stale_id(err: &CountersignError) -> ApprovalRequestId {
        match err {
            CountersignError::VersionConflict { id, .. } => *id,
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_rejects_empty_request_type() {
        let store = InMemoryApprovalStore::new();
        let mut input = new_input();
        input.request_type = "  ".to_string();
        let err = ApprovalRequest::create(Actor::new("maker", "MAKER"), input, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, CountersignError::Validation(_)));
    }

    #[test]
    fn test_transitions_are_counted_once_persisted() {
        let recorder = crate::metrics::recording::CountingRecorder::default();
        let store = InMemoryApprovalStore::new();
        let store = &store;

        recorder.record(|| async move {
            let checker = Actor::new("checker", "CHECKER");
            let maker = Actor::new("maker", "MAKER");
            let submitted = ApprovalRequest::create(maker, new_input(), store)
                .await
                .unwrap()
                .submit(store)
                .await
                .unwrap();
            let stale = submitted.clone();
            let pending = submitted
                .defer(checker.clone(), "attach the fee schedule".to_string(), store)
                .await
                .unwrap();
            pending
                .submit(store)
                .await
                .unwrap()
                .decline(checker.clone(), None, store)
                .await
                .unwrap();
            stale.approve(checker, None, store).await.unwrap_err();
        });

        assert_eq!(recorder.counter("countersign_requests_created_total{}"), 1);
        assert_eq!(
            recorder.counter("countersign_transitions_total{from=NOT_TREATED,to=SUBMITTED}"),
            1
        );
        assert_eq!(
            recorder.counter("countersign_transitions_total{from=SUBMITTED,to=PENDING}"),
            1
        );
        assert_eq!(
            recorder.counter("countersign_transitions_total{from=PENDING,to=SUBMITTED}"),
            1
        );
        assert_eq!(
            recorder.counter("countersign_transitions_total{from=SUBMITTED,to=DECLINED}"),
            1
        );
        // The stale approve was refused by the store.
        assert_eq!(
            recorder.counter("countersign_transitions_total{from=SUBMITTED,to=TREATED}"),
            0
        );
    }
}
