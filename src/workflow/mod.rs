//! Maker-checker orchestration.
//!
//! `ApprovalWorkflow` is the entry point callers use: a maker creates and submits a
//! request, a different checker approves, declines or defers it, and an approved request
//! is executed by dispatching its payload through the [`HandlerRegistry`].
//!
//! Every state change goes through the typestate transitions in
//! [`crate::domain::approval::transitions`], so the store's version check serializes
//! concurrent reviewers. After each change the workflow writes an audit entry and sends a
//! notification. Neither of those can undo a change that is already persisted: failures
//! are logged and the operation still succeeds.
//!
//! An operation's outcome is written back with a bounded retry. A request whose outcome
//! could not be written stays `Processing`; [`ApprovalWorkflow::record_execution`] and
//! [`ApprovalWorkflow::recover_stale`] move it on.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::approval::{
    Actor, AnyApprovalRequest, ApprovalAction, ApprovalRequest, ApprovalRequestData,
    ApprovalRequestId, ApprovalRequestStatus, ApprovalState, Declined, Executed,
    NewApprovalRequest, NotTreated, Pending, Processing, Submitted, Treated,
};
use crate::audit::{ActivityType, AuditEntry, AuditSink, TracingAuditSink};
use crate::dispatch::HandlerRegistry;
use crate::error::{CountersignError, Result};
use crate::manager::{ApprovalFilter, ApprovalStore};
use crate::notify::{Channel, NoopNotifier, Notification, Notifier};

#[cfg(feature = "metrics")]
use crate::metrics::CountersignMetrics;

/// How notifications are delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationMode {
    /// Spawn delivery on the tokio runtime and return immediately
    #[default]
    FireAndForget,
    /// Await delivery before the operation returns
    Synchronous,
}

/// Configuration for the approval workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Execute the operation as part of `approve` instead of waiting for `execute`
    pub execute_on_approval: bool,

    /// Let the maker review their own request
    pub allow_self_approval: bool,

    pub notification_mode: NotificationMode,

    pub notification_channel: Channel,

    /// Who is told that a request awaits review
    pub checker_recipients: Vec<String>,

    /// Limit applied by `list` when the filter sets none
    pub default_list_limit: usize,

    /// How many times an operation's outcome is written before giving up
    pub persist_attempts: u32,

    /// Base delay between those writes in milliseconds (multiplied by the attempt number)
    pub persist_backoff_ms: u64,

    /// Maximum time a request can stay in `Processing` before `recover_stale` returns it
    /// to `Treated` (milliseconds). This handles executors that crashed mid-run.
    pub processing_timeout_ms: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            execute_on_approval: false,
            allow_self_approval: false,
            notification_mode: NotificationMode::FireAndForget,
            notification_channel: Channel::Email,
            checker_recipients: Vec::new(),
            default_list_limit: 100,
            persist_attempts: 3,
            persist_backoff_ms: 50,
            processing_timeout_ms: 600000, // 10 minutes
        }
    }
}

/// Maker-checker approval gate in front of a [`HandlerRegistry`].
///
/// # Example
/// ```ignore
/// let registry = HandlerRegistry::builder()
///     .register("fee", "UPDATE_FEE", async_operation(update_fee))
///     .build();
/// let workflow = ApprovalWorkflow::new(Arc::new(InMemoryApprovalStore::new()), Arc::new(registry))
///     .with_config(WorkflowConfig { execute_on_approval: true, ..Default::default() });
///
/// let request = workflow.create(maker.clone(), input).await?;
/// workflow.submit(request.id(), &maker).await?;
/// workflow.approve(request.id(), &checker, None).await?;
/// ```
pub struct ApprovalWorkflow<S, N = NoopNotifier, A = TracingAuditSink>
where
    S: ApprovalStore,
    N: Notifier,
    A: AuditSink,
{
    store: Arc<S>,
    registry: Arc<HandlerRegistry>,
    notifier: Arc<N>,
    audit: Arc<A>,
    config: WorkflowConfig,
    #[cfg(feature = "metrics")]
    metrics: Option<CountersignMetrics>,
}

impl<S: ApprovalStore> ApprovalWorkflow<S> {
    /// Create a workflow that logs audit entries through `tracing` and sends no notifications.
    pub fn new(store: Arc<S>, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            store,
            registry,
            notifier: Arc::new(NoopNotifier),
            audit: Arc::new(TracingAuditSink),
            config: WorkflowConfig::default(),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }
}

impl<S, N, A> ApprovalWorkflow<S, N, A>
where
    S: ApprovalStore,
    N: Notifier + 'static,
    A: AuditSink,
{
    pub fn with_notifier<N2: Notifier + 'static>(self, notifier: Arc<N2>) -> ApprovalWorkflow<S, N2, A> {
        ApprovalWorkflow {
            store: self.store,
            registry: self.registry,
            notifier,
            audit: self.audit,
            config: self.config,
            #[cfg(feature = "metrics")]
            metrics: self.metrics,
        }
    }

    pub fn with_audit_sink<A2: AuditSink>(self, audit: Arc<A2>) -> ApprovalWorkflow<S, N, A2> {
        ApprovalWorkflow {
            store: self.store,
            registry: self.registry,
            notifier: self.notifier,
            audit,
            config: self.config,
            #[cfg(feature = "metrics")]
            metrics: self.metrics,
        }
    }

    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: CountersignMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Record a new request on behalf of `maker`.
    ///
    /// Fails with `NoHandlerFound` or `AmbiguousHandler` before anything is stored if
    /// the request type does not resolve to exactly one operation.
    #[tracing::instrument(skip(self, maker, input), fields(maker = %maker.username, handler_type = %input.handler_type, request_type = %input.request_type))]
    pub async fn create(
        &self,
        maker: Actor,
        input: NewApprovalRequest,
    ) -> Result<ApprovalRequest<NotTreated>> {
        self.registry
            .resolve(input.handler_type.as_str(), &input.request_type)?;

        let request = ApprovalRequest::create(maker.clone(), input, self.store.as_ref()).await?;
        tracing::info!(approval_id = %request.data.id, "Approval request created");

        self.record(
            &maker,
            ActivityType::Create,
            &request.data,
            format!("created {} request", request.data.request_type),
        )
        .await;
        Ok(request)
    }

    /// Send a request for review. Only the maker may submit.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.username))]
    pub async fn submit(
        &self,
        id: ApprovalRequestId,
        actor: &Actor,
    ) -> Result<ApprovalRequest<Submitted>> {
        let current = self.store.get(id).await?;
        current.ensure_allowed(ApprovalAction::Submit)?;
        if current.data().maker.username != actor.username {
            return Err(CountersignError::Validation(format!(
                "only the maker of approval request {} can submit it",
                id
            )));
        }

        let submitted = match current {
            AnyApprovalRequest::NotTreated(request) => request.submit(self.store.as_ref()).await?,
            AnyApprovalRequest::Pending(request) => request.submit(self.store.as_ref()).await?,
            other => return Err(invalid_transition(&other, ApprovalAction::Submit)),
        };
        tracing::info!(approval_id = %id, "Approval request submitted");

        let data = &submitted.data;
        self.record(
            actor,
            ActivityType::Submit,
            data,
            format!("submitted {} request for approval", data.request_type),
        )
        .await;
        if !self.config.checker_recipients.is_empty() {
            self.notify(
                self.config.checker_recipients.clone(),
                data,
                &submitted,
                format!(
                    "{} request from {} awaits your review",
                    data.request_type,
                    data.maker.name()
                ),
            )
            .await;
        }
        Ok(submitted)
    }

    /// Send a submitted request back to the maker, recording why.
    #[tracing::instrument(skip(self, reviewer, reason), fields(reviewer = %reviewer.username))]
    pub async fn defer(
        &self,
        id: ApprovalRequestId,
        reviewer: &Actor,
        reason: impl Into<String>,
    ) -> Result<ApprovalRequest<Pending>> {
        let current = self.store.get(id).await?;
        current.ensure_allowed(ApprovalAction::Defer)?;
        self.ensure_checker(current.data(), reviewer)?;

        let pending = match current {
            AnyApprovalRequest::Submitted(request) => {
                request
                    .defer(reviewer.clone(), reason.into(), self.store.as_ref())
                    .await?
            }
            other => return Err(invalid_transition(&other, ApprovalAction::Defer)),
        };
        tracing::info!(approval_id = %id, "Approval request deferred");
        self.record_decision(&pending.data, ApprovalAction::Defer);

        let data = &pending.data;
        let message = format!(
            "{} request deferred by {}: {}",
            data.request_type,
            reviewer.name(),
            pending.state.reason
        );
        self.record(reviewer, ActivityType::Defer, data, message.clone())
            .await;
        self.notify_maker(data, &pending, message).await;
        Ok(pending)
    }

    /// Approve a submitted or deferred request.
    ///
    /// With `execute_on_approval` set the operation runs straight away and the returned
    /// request is `Executed`. If that run fails, the approval stands (the request stays
    /// `Treated`) and the operation's error is returned.
    #[tracing::instrument(skip(self, reviewer, comment), fields(reviewer = %reviewer.username))]
    pub async fn approve(
        &self,
        id: ApprovalRequestId,
        reviewer: &Actor,
        comment: Option<String>,
    ) -> Result<AnyApprovalRequest> {
        let current = self.store.get(id).await?;
        current.ensure_allowed(ApprovalAction::Approve)?;
        self.ensure_checker(current.data(), reviewer)?;

        let treated = match current {
            AnyApprovalRequest::Submitted(request) => {
                request
                    .approve(reviewer.clone(), comment, self.store.as_ref())
                    .await?
            }
            AnyApprovalRequest::Pending(request) => {
                request
                    .approve(reviewer.clone(), comment, self.store.as_ref())
                    .await?
            }
            other => return Err(invalid_transition(&other, ApprovalAction::Approve)),
        };
        tracing::info!(approval_id = %id, "Approval request approved");
        self.record_decision(&treated.data, ApprovalAction::Approve);

        let data = &treated.data;
        let message = format!(
            "{} request approved by {}",
            data.request_type,
            reviewer.name()
        );
        self.record(reviewer, ActivityType::Approve, data, message.clone())
            .await;
        self.notify_maker(data, &treated, message).await;

        if self.config.execute_on_approval {
            return self.run(treated, reviewer).await.map(AnyApprovalRequest::from);
        }
        Ok(treated.into())
    }

    /// Decline a submitted or deferred request. Declined is final.
    #[tracing::instrument(skip(self, reviewer, comment), fields(reviewer = %reviewer.username))]
    pub async fn decline(
        &self,
        id: ApprovalRequestId,
        reviewer: &Actor,
        comment: Option<String>,
    ) -> Result<ApprovalRequest<Declined>> {
        let current = self.store.get(id).await?;
        current.ensure_allowed(ApprovalAction::Decline)?;
        self.ensure_checker(current.data(), reviewer)?;

        let declined = match current {
            AnyApprovalRequest::Submitted(request) => {
                request
                    .decline(reviewer.clone(), comment, self.store.as_ref())
                    .await?
            }
            AnyApprovalRequest::Pending(request) => {
                request
                    .decline(reviewer.clone(), comment, self.store.as_ref())
                    .await?
            }
            other => return Err(invalid_transition(&other, ApprovalAction::Decline)),
        };
        tracing::info!(approval_id = %id, "Approval request declined");
        self.record_decision(&declined.data, ApprovalAction::Decline);

        let data = &declined.data;
        let message = match &declined.state.decision.comment {
            Some(comment) => format!(
                "{} request declined by {}: {}",
                data.request_type,
                reviewer.name(),
                comment
            ),
            None => format!(
                "{} request declined by {}",
                data.request_type,
                reviewer.name()
            ),
        };
        self.record(reviewer, ActivityType::Decline, data, message.clone())
            .await;
        self.notify_maker(data, &declined, message).await;
        Ok(declined)
    }

    /// Run the operation behind an approved request.
    ///
    /// On success the operation's result is stored on the `Executed` request. On failure
    /// the request returns to `Treated` with the failure recorded and the operation's
    /// error is returned unchanged, so the request can be executed again.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.username))]
    pub async fn execute(
        &self,
        id: ApprovalRequestId,
        actor: &Actor,
    ) -> Result<ApprovalRequest<Executed>> {
        let current = self.store.get(id).await?;
        current.ensure_allowed(ApprovalAction::BeginExecution)?;

        match current {
            AnyApprovalRequest::Treated(request) => self.run(request, actor).await,
            other => Err(invalid_transition(&other, ApprovalAction::BeginExecution)),
        }
    }

    /// Store the outcome of an operation that ran but whose result was never recorded.
    ///
    /// This is the way out of `Processing` when `execute` failed with
    /// `ExecutionNotRecorded`: pass the `result` carried by that error.
    #[tracing::instrument(skip(self, actor, result), fields(actor = %actor.username))]
    pub async fn record_execution(
        &self,
        id: ApprovalRequestId,
        actor: &Actor,
        result: Value,
    ) -> Result<ApprovalRequest<Executed>> {
        let current = self.store.get(id).await?;
        current.ensure_allowed(ApprovalAction::CompleteExecution)?;

        let executed = match current {
            AnyApprovalRequest::Processing(request) => {
                request.complete(result, self.store.as_ref()).await?
            }
            other => return Err(invalid_transition(&other, ApprovalAction::CompleteExecution)),
        };
        tracing::info!(approval_id = %id, "Approval request execution recorded");

        let data = &executed.data;
        let message = format!(
            "{} request executed (recorded by {})",
            data.request_type,
            actor.name()
        );
        self.record(actor, ActivityType::Execute, data, message.clone())
            .await;
        self.notify_maker(data, &executed, message).await;
        Ok(executed)
    }

    /// Return requests stuck in `Processing` for longer than `processing_timeout_ms` to
    /// `Treated`, so they can be executed again.
    ///
    /// A request is left in `Processing` when its executor crashed or could not store the
    /// outcome. Recovered requests carry a `last_failure` saying so. If the operation is
    /// known to have run, use [`Self::record_execution`] instead.
    ///
    /// Returns the ids of the recovered requests. A request another writer moves first is
    /// skipped.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.username))]
    pub async fn recover_stale(&self, actor: &Actor) -> Result<Vec<ApprovalRequestId>> {
        let timeout_ms = i64::try_from(self.config.processing_timeout_ms).unwrap_or(i64::MAX);
        let now = Utc::now();
        let processing = self
            .store
            .list(ApprovalFilter::default().with_status(ApprovalRequestStatus::Processing))
            .await?;

        let mut recovered = Vec::new();
        for request in processing {
            let AnyApprovalRequest::Processing(request) = request else {
                continue;
            };
            let age_ms = now
                .signed_duration_since(request.state.started_at)
                .num_milliseconds();
            if age_ms < timeout_ms {
                continue;
            }

            let id = request.data.id;
            let failure = format!(
                "execution started by {} abandoned after {}ms without a recorded outcome",
                request.state.started_by.username, age_ms
            );
            let treated = match request.abort(failure.clone(), self.store.as_ref()).await {
                Ok(treated) => treated,
                Err(CountersignError::VersionConflict { .. }) => {
                    tracing::debug!(
                        approval_id = %id,
                        "Stale request moved by another writer, skipping"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            let data = &treated.data;
            let message = format!("{} request {}", data.request_type, failure);
            self.record(actor, ActivityType::ExecutionFailed, data, message.clone())
                .await;
            self.notify_maker(data, &treated, message).await;
            recovered.push(id);
        }

        if !recovered.is_empty() {
            tracing::warn!(
                count = recovered.len(),
                approval_ids = ?recovered,
                processing_timeout_ms = self.config.processing_timeout_ms,
                "Returned stale PROCESSING requests to TREATED"
            );
        }
        Ok(recovered)
    }

    /// Ask the request's operation what executing it would do, without executing it.
    pub async fn preview(&self, id: ApprovalRequestId) -> Result<Value> {
        let request = self.store.get(id).await?;
        let data = request.data();
        self.registry
            .preview(data.handler_type.as_str(), &data.request_type, &data.payload)
            .await
    }

    pub async fn get(&self, id: ApprovalRequestId) -> Result<AnyApprovalRequest> {
        self.store.get(id).await
    }

    /// List requests, newest first. Applies `default_list_limit` when the filter has no limit.
    pub async fn list(&self, mut filter: ApprovalFilter) -> Result<Vec<AnyApprovalRequest>> {
        if filter.limit.is_none() {
            filter.limit = Some(self.config.default_list_limit);
        }
        self.store.list(filter).await
    }

    async fn run(
        &self,
        request: ApprovalRequest<Treated>,
        actor: &Actor,
    ) -> Result<ApprovalRequest<Executed>> {
        let processing = request
            .begin_execution(actor.clone(), self.store.as_ref())
            .await?;
        let id = processing.data.id;
        let handler_type = processing.data.handler_type.clone();
        let request_type = processing.data.request_type.clone();

        let started = Instant::now();
        let outcome = self
            .registry
            .dispatch(
                handler_type.as_str(),
                &request_type,
                processing.data.payload.clone(),
            )
            .await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(result) => {
                #[cfg(feature = "metrics")]
                if let Some(metrics) = &self.metrics {
                    metrics.record_execution(handler_type.as_str(), &request_type, "executed", elapsed);
                }

                let executed = self.record_outcome(processing, result).await?;
                tracing::info!(
                    approval_id = %id,
                    duration_ms = elapsed.as_millis() as u64,
                    "Approval request executed"
                );

                let data = &executed.data;
                let message = format!("{} request executed", data.request_type);
                self.record(actor, ActivityType::Execute, data, message.clone())
                    .await;
                self.notify_maker(data, &executed, message).await;
                Ok(executed)
            }
            Err(error) => {
                #[cfg(feature = "metrics")]
                if let Some(metrics) = &self.metrics {
                    metrics.record_execution(handler_type.as_str(), &request_type, "failed", elapsed);
                }

                tracing::warn!(approval_id = %id, error = %error, "Approved operation failed");
                let store = self.store.as_ref();
                let failure = error.to_string();
                let aborted = self
                    .persist_with_retry(id, || processing.clone().abort(failure.clone(), store))
                    .await;
                match aborted {
                    Ok(treated) => {
                        let data = &treated.data;
                        let message =
                            format!("{} request failed to execute: {}", data.request_type, error);
                        self.record(actor, ActivityType::ExecutionFailed, data, message.clone())
                            .await;
                        self.notify_maker(data, &treated, message).await;
                    }
                    Err(abort_error) => {
                        tracing::error!(
                            approval_id = %id,
                            error = %abort_error,
                            "Failed to return request to TREATED after operation failure, left PROCESSING"
                        );
                    }
                }
                Err(error)
            }
        }
    }

    /// Store the result of an operation that has already run.
    ///
    /// The write is retried. If it still fails, the request is re-read in case an earlier
    /// attempt landed; otherwise the result is handed back in `ExecutionNotRecorded`.
    async fn record_outcome(
        &self,
        processing: ApprovalRequest<Processing>,
        result: Value,
    ) -> Result<ApprovalRequest<Executed>> {
        let id = processing.data.id;
        let store = self.store.as_ref();
        let written = self
            .persist_with_retry(id, || processing.clone().complete(result.clone(), store))
            .await;

        match written {
            Ok(executed) => Ok(executed),
            Err(error) => match self.store.get(id).await {
                Ok(AnyApprovalRequest::Executed(executed)) => Ok(executed),
                _ => {
                    tracing::error!(
                        approval_id = %id,
                        error = %error,
                        "Operation ran but its result could not be recorded, left PROCESSING"
                    );
                    Err(CountersignError::ExecutionNotRecorded {
                        id,
                        result,
                        source: Box::new(error),
                    })
                }
            },
        }
    }

    /// Run `write` up to `persist_attempts` times with linear backoff.
    ///
    /// A `VersionConflict` is returned at once: the request has moved and a retry would
    /// conflict again.
    async fn persist_with_retry<T, F, Fut>(
        &self,
        id: ApprovalRequestId,
        mut write: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.config.persist_attempts.max(1);
        let mut attempt = 1;
        loop {
            match write().await {
                Ok(value) => return Ok(value),
                Err(e @ CountersignError::VersionConflict { .. }) => return Err(e),
                Err(e) if attempt < attempts => {
                    let backoff_ms = self
                        .config
                        .persist_backoff_ms
                        .saturating_mul(u64::from(attempt));
                    tracing::warn!(
                        approval_id = %id,
                        attempt,
                        backoff_ms,
                        error = %e,
                        "Failed to persist approval request, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn ensure_checker(&self, data: &ApprovalRequestData, reviewer: &Actor) -> Result<()> {
        if !self.config.allow_self_approval && data.maker.username == reviewer.username {
            return Err(CountersignError::MakerCheckerViolation {
                id: data.id,
                username: reviewer.username.clone(),
            });
        }
        Ok(())
    }

    #[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
    fn record_decision(&self, data: &ApprovalRequestData, action: ApprovalAction) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_decision(data.handler_type.as_str(), action.as_str());
        }
    }

    async fn record(
        &self,
        actor: &Actor,
        activity: ActivityType,
        data: &ApprovalRequestData,
        description: String,
    ) {
        let entry = AuditEntry::new(actor, activity, data.handler_type.as_str(), description)
            .with_approval_id(data.id);
        if let Err(e) = self.audit.log(entry).await {
            tracing::error!(
                approval_id = %data.id,
                activity_type = activity.as_str(),
                error = %e,
                "Failed to write audit entry"
            );
        }
    }

    async fn notify_maker<T>(&self, data: &ApprovalRequestData, request: &ApprovalRequest<T>, body: String)
    where
        T: ApprovalState,
    {
        self.notify(vec![data.maker.username.clone()], data, request, body)
            .await;
    }

    async fn notify<T>(
        &self,
        recipients: Vec<String>,
        data: &ApprovalRequestData,
        request: &ApprovalRequest<T>,
        body: String,
    ) where
        T: ApprovalState,
    {
        let channel = self.config.notification_channel;
        if !self.notifier.supports(channel) {
            tracing::warn!(%channel, approval_id = %data.id, "Notifier does not support channel, skipping notification");
            return;
        }

        let notification = Notification {
            channel,
            recipients,
            subject: format!("Approval request {} is {}", data.id, request.status()),
            body,
            approval_id: Some(data.id),
            status: Some(request.status()),
        };

        match self.config.notification_mode {
            NotificationMode::Synchronous => {
                if let Err(e) = self.notifier.send(&notification).await {
                    tracing::warn!(approval_id = %data.id, error = %e, "Failed to send notification");
                }
            }
            NotificationMode::FireAndForget => {
                let notifier = Arc::clone(&self.notifier);
                tokio::spawn(async move {
                    if let Err(e) = notifier.send(&notification).await {
                        tracing::warn!(
                            approval_id = ?notification.approval_id,
                            error = %e,
                            "Failed to send notification"
                        );
                    }
                });
            }
        }
    }
}

fn invalid_transition(request: &AnyApprovalRequest, action: ApprovalAction) -> CountersignError {
    CountersignError::InvalidStateTransition {
        from: request.status().to_string(),
        action: action.to_string(),
    }
}
