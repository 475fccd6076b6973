//! Core types for the approval gate.
//!
//! This module defines the type-safe approval request lifecycle using the typestate pattern.
//! Each request progresses through distinct states, enforced at compile time. The
//! [`ApprovalRequestStatus`] enum mirrors the states for storage, filtering and for checking
//! actions against requests whose state is only known at runtime.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatch::HandlerType;
use crate::error::{CountersignError, Result};

/// Status of an approval request, as stored in the `status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalRequestStatus {
    NotTreated,
    Submitted,
    Pending,
    Processing,
    Treated,
    Executed,
    Declined,
}

impl ApprovalRequestStatus {
    pub const ALL: [ApprovalRequestStatus; 7] = [
        ApprovalRequestStatus::NotTreated,
        ApprovalRequestStatus::Submitted,
        ApprovalRequestStatus::Pending,
        ApprovalRequestStatus::Processing,
        ApprovalRequestStatus::Treated,
        ApprovalRequestStatus::Executed,
        ApprovalRequestStatus::Declined,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalRequestStatus::NotTreated => "NOT_TREATED",
            ApprovalRequestStatus::Submitted => "SUBMITTED",
            ApprovalRequestStatus::Pending => "PENDING",
            ApprovalRequestStatus::Processing => "PROCESSING",
            ApprovalRequestStatus::Treated => "TREATED",
            ApprovalRequestStatus::Executed => "EXECUTED",
            ApprovalRequestStatus::Declined => "DECLINED",
        }
    }

    /// No action is legal from a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApprovalRequestStatus::Executed | ApprovalRequestStatus::Declined
        )
    }

    /// Apply an action to this status, returning the status it leads to.
    ///
    /// ```text
    /// NOT_TREATED ──submit──> SUBMITTED ──approve──> TREATED ──begin_execution──> PROCESSING
    ///                          │    ▲                  ▲                             │
    ///                        defer  submit             └──────────abort──────────────┤
    ///                          ▼    │                                                │
    ///                          PENDING ──approve──> TREATED                       complete
    ///                                                                                ▼
    /// SUBMITTED | PENDING ──decline──> DECLINED                                  EXECUTED
    /// ```
    ///
    /// # Errors
    /// `InvalidStateTransition` for every pair not drawn above, including every action
    /// from `EXECUTED` or `DECLINED`.
    pub fn apply(self, action: ApprovalAction) -> Result<ApprovalRequestStatus> {
        use ApprovalAction as A;
        use ApprovalRequestStatus as S;

        let next = match (self, action) {
            (S::NotTreated | S::Pending, A::Submit) => S::Submitted,
            (S::Submitted, A::Defer) => S::Pending,
            (S::Submitted | S::Pending, A::Approve) => S::Treated,
            (S::Submitted | S::Pending, A::Decline) => S::Declined,
            (S::Treated, A::BeginExecution) => S::Processing,
            (S::Processing, A::CompleteExecution) => S::Executed,
            (S::Processing, A::AbortExecution) => S::Treated,
            (from, action) => {
                return Err(CountersignError::InvalidStateTransition {
                    from: from.to_string(),
                    action: action.to_string(),
                });
            }
        };
        Ok(next)
    }

    /// The per-decision status implied by this request status.
    pub fn approval_status(&self) -> ApprovalStatus {
        match self {
            ApprovalRequestStatus::NotTreated
            | ApprovalRequestStatus::Submitted
            | ApprovalRequestStatus::Pending => ApprovalStatus::Initiated,
            ApprovalRequestStatus::Treated
            | ApprovalRequestStatus::Processing
            | ApprovalRequestStatus::Executed => ApprovalStatus::Approved,
            ApprovalRequestStatus::Declined => ApprovalStatus::Declined,
        }
    }
}

impl fmt::Display for ApprovalRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalRequestStatus {
    type Err = CountersignError;

    fn from_str(s: &str) -> Result<Self> {
        ApprovalRequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CountersignError::Validation(format!("unknown approval status '{s}'")))
    }
}

/// Something a maker, checker or executor can do to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Submit,
    Defer,
    Approve,
    Decline,
    BeginExecution,
    CompleteExecution,
    AbortExecution,
}

impl ApprovalAction {
    pub const ALL: [ApprovalAction; 7] = [
        ApprovalAction::Submit,
        ApprovalAction::Defer,
        ApprovalAction::Approve,
        ApprovalAction::Decline,
        ApprovalAction::BeginExecution,
        ApprovalAction::CompleteExecution,
        ApprovalAction::AbortExecution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalAction::Submit => "submit",
            ApprovalAction::Defer => "defer",
            ApprovalAction::Approve => "approve",
            ApprovalAction::Decline => "decline",
            ApprovalAction::BeginExecution => "begin_execution",
            ApprovalAction::CompleteExecution => "complete_execution",
            ApprovalAction::AbortExecution => "abort_execution",
        }
    }
}

impl fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single reviewer decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Initiated,
    Approved,
    Declined,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Initiated => "INITIATED",
            ApprovalStatus::Approved => "APPROVED",
            ApprovalStatus::Declined => "DECLINED",
        }
    }

    /// `INITIATED → APPROVED | DECLINED`; a decision is never revisited.
    pub fn decide(self, action: ApprovalAction) -> Result<ApprovalStatus> {
        match (self, action) {
            (ApprovalStatus::Initiated, ApprovalAction::Approve) => Ok(ApprovalStatus::Approved),
            (ApprovalStatus::Initiated, ApprovalAction::Decline) => Ok(ApprovalStatus::Declined),
            (from, action) => Err(CountersignError::InvalidStateTransition {
                from: from.to_string(),
                action: action.to_string(),
            }),
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The user acting on a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub username: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Actor {
    pub fn new(username: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role: role.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Display name if known, otherwise the username.
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// A checker's verdict on a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub reviewer: Actor,
    pub status: ApprovalStatus,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    pub fn new(reviewer: Actor, action: ApprovalAction, comment: Option<String>) -> Result<Self> {
        Ok(Self {
            reviewer,
            status: ApprovalStatus::Initiated.decide(action)?,
            comment,
            decided_at: Utc::now(),
        })
    }
}

/// Marker trait for valid approval request states.
pub trait ApprovalState: Send + Sync {
    const STATUS: ApprovalRequestStatus;
}

/// A proposed change awaiting review.
///
/// Uses the typestate pattern: the generic parameter `T` is the current state, so only the
/// transitions legal from that state can be called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest<T: ApprovalState> {
    /// The current state of the request.
    pub state: T,
    /// The maker-supplied request data.
    pub data: ApprovalRequestData,
}

impl<T: ApprovalState> ApprovalRequest<T> {
    pub fn id(&self) -> ApprovalRequestId {
        self.data.id
    }

    pub fn status(&self) -> ApprovalRequestStatus {
        T::STATUS
    }
}

/// What the maker asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequestData {
    pub id: ApprovalRequestId,

    /// Selects the dispatch table the request is executed against
    pub handler_type: HandlerType,

    /// Name of the operation within the handler type (e.g. `CREATE_OUTLET`)
    pub request_type: String,

    /// Opaque payload handed to the operation on execution
    pub payload: serde_json::Value,

    pub description: Option<String>,

    pub maker: Actor,

    pub created_at: DateTime<Utc>,

    /// Incremented by every transition; stores only accept a write whose
    /// version is exactly one past the stored one.
    pub version: i64,
}

/// Input for creating an approval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewApprovalRequest {
    pub handler_type: HandlerType,
    pub request_type: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub description: Option<String>,
}

// ============================================================================
// Approval Request States
// ============================================================================

/// Created but not yet submitted for review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotTreated {}

impl ApprovalState for NotTreated {
    const STATUS: ApprovalRequestStatus = ApprovalRequestStatus::NotTreated;
}

/// Waiting for a checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submitted {
    pub submitted_at: DateTime<Utc>,
}

impl ApprovalState for Submitted {
    const STATUS: ApprovalRequestStatus = ApprovalRequestStatus::Submitted;
}

/// Sent back by a checker until the maker resubmits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pending {
    pub submitted_at: DateTime<Utc>,
    pub deferred_at: DateTime<Utc>,
    pub deferred_by: Actor,
    pub reason: String,
}

impl ApprovalState for Pending {
    const STATUS: ApprovalRequestStatus = ApprovalRequestStatus::Pending;
}

/// Approved and ready to execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Treated {
    pub submitted_at: DateTime<Utc>,
    pub decision: Decision,
    /// Error message of the last aborted execution, if any
    pub last_failure: Option<String>,
}

impl ApprovalState for Treated {
    const STATUS: ApprovalRequestStatus = ApprovalRequestStatus::Treated;
}

/// The bound operation is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Processing {
    pub submitted_at: DateTime<Utc>,
    pub decision: Decision,
    pub started_at: DateTime<Utc>,
    pub started_by: Actor,
}

impl ApprovalState for Processing {
    const STATUS: ApprovalRequestStatus = ApprovalRequestStatus::Processing;
}

/// The operation ran to completion (terminal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Executed {
    pub submitted_at: DateTime<Utc>,
    pub decision: Decision,
    pub started_at: DateTime<Utc>,
    pub executed_at: DateTime<Utc>,
    pub executed_by: Actor,
    pub result: serde_json::Value,
}

impl ApprovalState for Executed {
    const STATUS: ApprovalRequestStatus = ApprovalRequestStatus::Executed;
}

/// Rejected by a checker (terminal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declined {
    pub submitted_at: DateTime<Utc>,
    pub decision: Decision,
}

impl ApprovalState for Declined {
    const STATUS: ApprovalRequestStatus = ApprovalRequestStatus::Declined;
}

/// Unique identifier for an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalRequestId(pub Uuid);

impl ApprovalRequestId {
    pub fn new() -> Self {
        ApprovalRequestId(Uuid::new_v4())
    }
}

impl Default for ApprovalRequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ApprovalRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Display only first 8 characters for readability in logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl From<Uuid> for ApprovalRequestId {
    fn from(uuid: Uuid) -> Self {
        ApprovalRequestId(uuid)
    }
}

impl std::ops::Deref for ApprovalRequestId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ============================================================================
// Unified Approval Request Representation
// ============================================================================

/// Enum that can hold an approval request in any state.
///
/// This is used for storage and API responses where we need to handle
/// requests uniformly regardless of their current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "request")]
pub enum AnyApprovalRequest {
    NotTreated(ApprovalRequest<NotTreated>),
    Submitted(ApprovalRequest<Submitted>),
    Pending(ApprovalRequest<Pending>),
    Treated(ApprovalRequest<Treated>),
    Processing(ApprovalRequest<Processing>),
    Executed(ApprovalRequest<Executed>),
    Declined(ApprovalRequest<Declined>),
}

impl AnyApprovalRequest {
    /// Get the request data regardless of state.
    pub fn data(&self) -> &ApprovalRequestData {
        match self {
            AnyApprovalRequest::NotTreated(r) => &r.data,
            AnyApprovalRequest::Submitted(r) => &r.data,
            AnyApprovalRequest::Pending(r) => &r.data,
            AnyApprovalRequest::Treated(r) => &r.data,
            AnyApprovalRequest::Processing(r) => &r.data,
            AnyApprovalRequest::Executed(r) => &r.data,
            AnyApprovalRequest::Declined(r) => &r.data,
        }
    }

    pub fn id(&self) -> ApprovalRequestId {
        self.data().id
    }

    pub fn version(&self) -> i64 {
        self.data().version
    }

    pub fn status(&self) -> ApprovalRequestStatus {
        match self {
            AnyApprovalRequest::NotTreated(_) => ApprovalRequestStatus::NotTreated,
            AnyApprovalRequest::Submitted(_) => ApprovalRequestStatus::Submitted,
            AnyApprovalRequest::Pending(_) => ApprovalRequestStatus::Pending,
            AnyApprovalRequest::Treated(_) => ApprovalRequestStatus::Treated,
            AnyApprovalRequest::Processing(_) => ApprovalRequestStatus::Processing,
            AnyApprovalRequest::Executed(_) => ApprovalRequestStatus::Executed,
            AnyApprovalRequest::Declined(_) => ApprovalRequestStatus::Declined,
        }
    }

    pub fn approval_status(&self) -> ApprovalStatus {
        self.status().approval_status()
    }

    /// The checker's decision, once one has been taken.
    pub fn decision(&self) -> Option<&Decision> {
        match self {
            AnyApprovalRequest::Treated(r) => Some(&r.state.decision),
            AnyApprovalRequest::Processing(r) => Some(&r.state.decision),
            AnyApprovalRequest::Executed(r) => Some(&r.state.decision),
            AnyApprovalRequest::Declined(r) => Some(&r.state.decision),
            AnyApprovalRequest::NotTreated(_)
            | AnyApprovalRequest::Submitted(_)
            | AnyApprovalRequest::Pending(_) => None,
        }
    }

    /// Get the variant name of the current state.
    pub fn variant(&self) -> &'static str {
        match self {
            AnyApprovalRequest::NotTreated(_) => "NotTreated",
            AnyApprovalRequest::Submitted(_) => "Submitted",
            AnyApprovalRequest::Pending(_) => "Pending",
            AnyApprovalRequest::Treated(_) => "Treated",
            AnyApprovalRequest::Processing(_) => "Processing",
            AnyApprovalRequest::Executed(_) => "Executed",
            AnyApprovalRequest::Declined(_) => "Declined",
        }
    }

    /// Check if this request is in a terminal state (Executed or Declined).
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Check that `action` is legal from the current state.
    pub fn ensure_allowed(&self, action: ApprovalAction) -> Result<ApprovalRequestStatus> {
        self.status().apply(action)
    }
}

// Conversion traits for going from typed ApprovalRequest to AnyApprovalRequest

impl From<ApprovalRequest<NotTreated>> for AnyApprovalRequest {
    fn from(r: ApprovalRequest<NotTreated>) -> Self {
        AnyApprovalRequest::NotTreated(r)
    }
}

impl From<ApprovalRequest<Submitted>> for AnyApprovalRequest {
    fn from(r: ApprovalRequest<Submitted>) -> Self {
        AnyApprovalRequest::Submitted(r)
    }
}

impl From<ApprovalRequest<Pending>> for AnyApprovalRequest {
    fn from(r: ApprovalRequest<Pending>) -> Self {
        AnyApprovalRequest::Pending(r)
    }
}

impl From<ApprovalRequest<Treated>> for AnyApprovalRequest {
    fn from(r: ApprovalRequest<Treated>) -> Self {
        AnyApprovalRequest::Treated(r)
    }
}

impl From<ApprovalRequest<Processing>> for AnyApprovalRequest {
    fn from(r: ApprovalRequest<Processing>) -> Self {
        AnyApprovalRequest::Processing(r)
    }
}

impl From<ApprovalRequest<Executed>> for AnyApprovalRequest {
    fn from(r: ApprovalRequest<Executed>) -> Self {
        AnyApprovalRequest::Executed(r)
    }
}

impl From<ApprovalRequest<Declined>> for AnyApprovalRequest {
    fn from(r: ApprovalRequest<Declined>) -> Self {
        AnyApprovalRequest::Declined(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_reject_every_action() {
        for from in [ApprovalRequestStatus::Executed, ApprovalRequestStatus::Declined] {
            for action in ApprovalAction::ALL {
                let err = from.apply(action).unwrap_err();
                assert!(
                    matches!(err, CountersignError::InvalidStateTransition { .. }),
                    "{from} + {action} should be rejected, got {err:?}"
                );
            }
        }
    }

    #[test]
    fn test_transition_table() {
        use ApprovalAction as A;
        use ApprovalRequestStatus as S;

        let legal = [
            (S::NotTreated, A::Submit, S::Submitted),
            (S::Pending, A::Submit, S::Submitted),
            (S::Submitted, A::Defer, S::Pending),
            (S::Submitted, A::Approve, S::Treated),
            (S::Pending, A::Approve, S::Treated),
            (S::Submitted, A::Decline, S::Declined),
            (S::Pending, A::Decline, S::Declined),
            (S::Treated, A::BeginExecution, S::Processing),
            (S::Processing, A::CompleteExecution, S::Executed),
            (S::Processing, A::AbortExecution, S::Treated),
        ];

        for from in S::ALL {
            for action in A::ALL {
                let expected = legal
                    .iter()
                    .find(|(f, a, _)| *f == from && *a == action)
                    .map(|(_, _, to)| *to);
                match (from.apply(action), expected) {
                    (Ok(to), Some(expected)) => assert_eq!(to, expected),
                    (Err(CountersignError::InvalidStateTransition { .. }), None) => {}
                    (got, expected) => {
                        panic!("{from} + {action}: got {got:?}, expected {expected:?}")
                    }
                }
            }
        }
    }

    #[test]
    fn test_decision_status_is_one_shot() {
        assert_eq!(
            ApprovalStatus::Initiated.decide(ApprovalAction::Approve).unwrap(),
            ApprovalStatus::Approved
        );
        assert_eq!(
            ApprovalStatus::Initiated.decide(ApprovalAction::Decline).unwrap(),
            ApprovalStatus::Declined
        );
        assert!(ApprovalStatus::Approved.decide(ApprovalAction::Decline).is_err());
        assert!(ApprovalStatus::Declined.decide(ApprovalAction::Approve).is_err());
        assert!(ApprovalStatus::Initiated.decide(ApprovalAction::Submit).is_err());
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in ApprovalRequestStatus::ALL {
            assert_eq!(status.as_str().parse::<ApprovalRequestStatus>().unwrap(), status);
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                serde_json::Value::String(status.as_str().to_string())
            );
        }
        assert!("APPROVED".parse::<ApprovalRequestStatus>().is_err());
    }

    #[test]
    fn test_any_request_serializes_with_state_tag() {
        let request = ApprovalRequest {
            state: Submitted {
                submitted_at: Utc::now(),
            },
            data: ApprovalRequestData {
                id: ApprovalRequestId::new(),
                handler_type: HandlerType::from("outlet"),
                request_type: "CREATE_OUTLET".to_string(),
                payload: serde_json::json!({"name": "Ikeja"}),
                description: None,
                maker: Actor::new("ada", "MAKER"),
                created_at: Utc::now(),
                version: 1,
            },
        };
        let any = AnyApprovalRequest::from(request);
        let json = serde_json::to_value(&any).unwrap();
        assert_eq!(json["state"], "Submitted");
        assert_eq!(json["request"]["data"]["handler_type"], "outlet");

        let back: AnyApprovalRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, any);
        assert_eq!(back.approval_status(), ApprovalStatus::Initiated);
        assert!(back.decision().is_none());
    }
}
