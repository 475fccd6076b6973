//! Request/response envelope for dispatch calls arriving as data.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::HandlerType;

/// A dispatch call as it travels over the wire or sits in a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub handler_type: HandlerType,
    pub request_type: String,
    #[serde(default)]
    pub payload: Value,
}

/// The result of a [`DispatchRequest`], echoing the routing keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub handler_type: HandlerType,
    pub request_type: String,
    pub result: Value,
}

impl DispatchRequest {
    pub fn new(
        handler_type: impl Into<HandlerType>,
        request_type: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            handler_type: handler_type.into(),
            request_type: request_type.into(),
            payload,
        }
    }

    pub(crate) fn respond(self, result: Value) -> DispatchResponse {
        DispatchResponse {
            handler_type: self.handler_type,
            request_type: self.request_type,
            result,
        }
    }
}
