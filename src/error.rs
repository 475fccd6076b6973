//! Error types for the approval gate.

use thiserror::Error;

use crate::approval::ApprovalRequestId;

/// Result type alias using the countersign error type.
pub type Result<T> = std::result::Result<T, CountersignError>;

/// Main error type for the approval gate.
#[derive(Error, Debug)]
pub enum CountersignError {
    /// No operation is registered for the handler type / request type pair
    #[error("no handler for request type {request_type}")]
    NoHandlerFound {
        handler_type: String,
        request_type: String,
    },

    /// More than one operation is registered for the pair
    #[error("ambiguous handler: {count} operations registered for request type {request_type} (handler type {handler_type})")]
    AmbiguousHandler {
        handler_type: String,
        request_type: String,
        count: usize,
    },

    /// The action is not legal from the current status
    #[error("Invalid state transition: cannot {action} a request in state {from}")]
    InvalidStateTransition { from: String, action: String },

    /// An optional capability was invoked on an implementation that does not provide it
    #[error("implementation not found for {0}")]
    ImplementationNotFound(String),

    /// Approval request not found
    #[error("Approval request not found: {0}")]
    ApprovalRequestNotFound(ApprovalRequestId),

    /// Another writer changed the request since it was read
    #[error("Version conflict on approval request {id}: expected version {expected}")]
    VersionConflict { id: ApprovalRequestId, expected: i64 },

    /// The reviewer is the maker of the request
    #[error("Maker-checker violation: {username} cannot review approval request {id}")]
    MakerCheckerViolation {
        id: ApprovalRequestId,
        username: String,
    },

    /// The operation ran but its outcome could not be stored; the request is left
    /// `PROCESSING` and `result` is what the operation returned
    #[error("Approval request {id} executed but its result was not recorded: {source}")]
    ExecutionNotRecorded {
        id: ApprovalRequestId,
        result: serde_json::Value,
        #[source]
        source: Box<CountersignError>,
    },

    /// Validation error (e.g., empty request type, wrong actor)
    #[error("Validation error: {0}")]
    Validation(String),

    /// HTTP client error
    #[error("HTTP request failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database error
    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CountersignError {
    /// Stable, machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            CountersignError::NoHandlerFound { .. } => "NO_HANDLER_FOUND",
            CountersignError::AmbiguousHandler { .. } => "AMBIGUOUS_HANDLER",
            CountersignError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            CountersignError::ImplementationNotFound(_) => "IMPLEMENTATION_NOT_FOUND",
            CountersignError::ApprovalRequestNotFound(_) => "APPROVAL_REQUEST_NOT_FOUND",
            CountersignError::VersionConflict { .. } => "VERSION_CONFLICT",
            CountersignError::MakerCheckerViolation { .. } => "MAKER_CHECKER_VIOLATION",
            CountersignError::ExecutionNotRecorded { .. } => "EXECUTION_NOT_RECORDED",
            CountersignError::Validation(_) => "VALIDATION_ERROR",
            CountersignError::HttpClient(_) => "NOTIFICATION_TRANSPORT",
            CountersignError::Serialization(_) => "SERIALIZATION_ERROR",
            #[cfg(feature = "postgres")]
            CountersignError::Database(_) => "DATABASE_ERROR",
            CountersignError::Other(_) => "INTERNAL_ERROR",
        }
    }
}

/// Structured error representation handed back to callers.
///
/// Stores the stable code next to the human message so the error survives
/// being stored alongside a request or sent over the wire.
pub mod error_body {
    use std::error::Error as _;

    use serde::{Deserialize, Serialize};

    use super::CountersignError;

    /// Serialized error format: stable code, message and source chain.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ErrorBody {
        /// Stable error code, see [`CountersignError::code`]
        pub code: String,
        /// The main error message
        pub message: String,
        /// Chain of source errors, if any
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub sources: Vec<String>,
    }

    impl From<&CountersignError> for ErrorBody {
        fn from(error: &CountersignError) -> Self {
            let mut sources = Vec::new();
            let mut current = error.source();
            while let Some(source) = current {
                sources.push(source.to_string());
                current = source.source();
            }
            ErrorBody {
                code: error.code().to_string(),
                message: error.to_string(),
                sources,
            }
        }
    }

    /// Serializes an error to a JSON string.
    pub fn serialize_error(error: &CountersignError) -> String {
        let body = ErrorBody::from(error);
        serde_json::to_string(&body).unwrap_or_else(|_| {
            format!(
                r#"{{"code":"{}","message":"{}"}}"#,
                body.code,
                body.message.replace('"', "\\\"")
            )
        })
    }

    /// Deserializes an error body from a JSON string.
    ///
    /// Anything that does not parse is kept verbatim under `INTERNAL_ERROR`.
    pub fn deserialize_error(json: &str) -> ErrorBody {
        serde_json::from_str::<ErrorBody>(json).unwrap_or_else(|_| ErrorBody {
            code: "INTERNAL_ERROR".to_string(),
            message: json.to_string(),
            sources: Vec::new(),
        })
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::approval::{ApprovalAction, ApprovalRequestStatus};

        #[test]
        fn test_no_handler_message_and_code() {
            let error = CountersignError::NoHandlerFound {
                handler_type: "merchant".to_string(),
                request_type: "CREATE_OUTLET".to_string(),
            };
            assert_eq!(error.to_string(), "no handler for request type CREATE_OUTLET");

            let body = ErrorBody::from(&error);
            assert_eq!(body.code, "NO_HANDLER_FOUND");
            assert!(body.sources.is_empty());
        }

        #[test]
        fn test_serialized_error_keeps_code() {
            let error = CountersignError::InvalidStateTransition {
                from: ApprovalRequestStatus::Declined.to_string(),
                action: ApprovalAction::Submit.to_string(),
            };
            let json = serialize_error(&error);
            let body = deserialize_error(&json);
            assert_eq!(body.code, "INVALID_STATE_TRANSITION");
            assert!(body.message.contains("DECLINED"));
        }

        #[test]
        fn test_anyhow_context_chain_is_kept() {
            let error = CountersignError::Other(
                anyhow::anyhow!("Root cause").context("Top context"),
            );
            let body = ErrorBody::from(&error);
            assert_eq!(body.code, "INTERNAL_ERROR");
            assert!(body.message.contains("Top context"));
        }

        #[test]
        fn test_garbage_deserializes_to_internal_error() {
            let body = deserialize_error("not json");
            assert_eq!(body.code, "INTERNAL_ERROR");
            assert_eq!(body.message, "not json");
        }
    }
}
