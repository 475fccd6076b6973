//! Request dispatcher: routes a `(handler type, request type)` pair to exactly one operation.
//!
//! The registry is assembled once at startup from the registrations each module contributes
//! through [`HandlerModule`], then frozen. A frozen [`HandlerRegistry`] is shared behind an
//! `Arc` and read from any number of tasks without locking.
//!
//! # Example
//! ```ignore
//! let registry = HandlerRegistry::builder()
//!     .register("outlet", "CREATE_OUTLET", typed_operation(create_outlet))
//!     .module(&FeeModule::new(fees))
//!     .build();
//!
//! let result = registry
//!     .dispatch("outlet", "CREATE_OUTLET", json!({"merchant_id": 4, "name": "Yaba"}))
//!     .await?;
//! ```

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CountersignError, Result};

pub mod envelope;
pub mod operation;

pub use envelope::{DispatchRequest, DispatchResponse};
pub use operation::{
    AsyncFnOperation, FnOperation, Operation, TypedOperation, async_operation, fn_operation,
    typed_operation,
};

/// Logical category label that selects a dispatch table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerType(String);

impl HandlerType {
    pub fn new(name: impl Into<String>) -> Self {
        HandlerType(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HandlerType {
    fn from(name: &str) -> Self {
        HandlerType(name.to_string())
    }
}

impl From<String> for HandlerType {
    fn from(name: String) -> Self {
        HandlerType(name)
    }
}

impl Borrow<str> for HandlerType {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for HandlerType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One `(handler type, request type, operation)` triple.
#[derive(Clone)]
pub struct Registration {
    pub handler_type: HandlerType,
    pub request_type: String,
    pub operation: Arc<dyn Operation>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("handler_type", &self.handler_type)
            .field("request_type", &self.request_type)
            .finish_non_exhaustive()
    }
}

/// A unit of startup code that contributes registrations.
///
/// Each business module (outlets, fees, settlement accounts, ...) implements this once and
/// is handed to [`RegistryBuilder::module`].
pub trait HandlerModule {
    /// Name used in logs.
    fn name(&self) -> &str;

    fn register(&self, builder: RegistryBuilder) -> RegistryBuilder;
}

/// Collects registrations before the registry is frozen.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    registrations: Vec<Registration>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation.
    ///
    /// Registering the same pair twice is not rejected here; the pair becomes ambiguous and
    /// every dispatch to it fails with `AmbiguousHandler`.
    pub fn register<O: Operation + 'static>(
        self,
        handler_type: impl Into<HandlerType>,
        request_type: impl Into<String>,
        operation: O,
    ) -> Self {
        self.register_arc(handler_type, request_type, Arc::new(operation))
    }

    /// Register an already shared operation.
    pub fn register_arc(
        mut self,
        handler_type: impl Into<HandlerType>,
        request_type: impl Into<String>,
        operation: Arc<dyn Operation>,
    ) -> Self {
        self.registrations.push(Registration {
            handler_type: handler_type.into(),
            request_type: request_type.into(),
            operation,
        });
        self
    }

    /// Add every registration a module contributes.
    pub fn module<M: HandlerModule + ?Sized>(self, module: &M) -> Self {
        let before = self.registrations.len();
        let builder = module.register(self);
        tracing::debug!(
            module = module.name(),
            registrations = builder.registrations.len() - before,
            "Registered handler module"
        );
        builder
    }

    /// Freeze the registrations into a registry.
    pub fn build(self) -> HandlerRegistry {
        let mut tables: HashMap<HandlerType, HashMap<String, Vec<Arc<dyn Operation>>>> =
            HashMap::new();

        for registration in self.registrations {
            let operations = tables
                .entry(registration.handler_type.clone())
                .or_default()
                .entry(registration.request_type.clone())
                .or_default();
            operations.push(registration.operation);

            if operations.len() > 1 {
                tracing::warn!(
                    handler_type = %registration.handler_type,
                    request_type = %registration.request_type,
                    count = operations.len(),
                    "Duplicate registration, dispatch to this request type will fail"
                );
            }
        }

        let registry = HandlerRegistry { tables };
        tracing::info!(
            handler_types = registry.tables.len(),
            registrations = registry.len(),
            "Handler registry built"
        );
        registry
    }
}

/// Immutable name → operation lookup table.
pub struct HandlerRegistry {
    tables: HashMap<HandlerType, HashMap<String, Vec<Arc<dyn Operation>>>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handler_types", &self.handler_types())
            .field("registrations", &self.len())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Locate the single operation bound to the pair.
    ///
    /// # Errors
    /// - `NoHandlerFound` if the handler type or request type is unknown
    /// - `AmbiguousHandler` if the pair was registered more than once
    pub fn resolve(&self, handler_type: &str, request_type: &str) -> Result<&Arc<dyn Operation>> {
        let operations = self
            .tables
            .get(handler_type)
            .and_then(|table| table.get(request_type))
            .map(Vec::as_slice)
            .unwrap_or_default();

        match operations {
            [operation] => Ok(operation),
            [] => Err(CountersignError::NoHandlerFound {
                handler_type: handler_type.to_string(),
                request_type: request_type.to_string(),
            }),
            many => Err(CountersignError::AmbiguousHandler {
                handler_type: handler_type.to_string(),
                request_type: request_type.to_string(),
                count: many.len(),
            }),
        }
    }

    /// Invoke the operation bound to the pair with `payload`.
    ///
    /// The operation's result, success or error, is returned unchanged. Nothing is retried.
    #[tracing::instrument(skip(self, payload))]
    pub async fn dispatch(
        &self,
        handler_type: &str,
        request_type: &str,
        payload: Value,
    ) -> Result<Value> {
        let operation = match self.resolve(handler_type, request_type) {
            Ok(operation) => operation,
            Err(e) => {
                record_dispatch(handler_type, request_type, e.code());
                tracing::debug!(error = %e, "Dispatch lookup failed");
                return Err(e);
            }
        };

        let started = Instant::now();
        let result = operation.execute(payload).await;
        histogram!(
            "countersign_dispatch_duration_seconds",
            "handler_type" => handler_type.to_string(),
            "request_type" => request_type.to_string()
        )
        .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(_) => {
                record_dispatch(handler_type, request_type, "ok");
                tracing::debug!("Operation completed");
            }
            Err(e) => {
                record_dispatch(handler_type, request_type, "operation_error");
                tracing::debug!(error = %e, "Operation returned an error");
            }
        }

        result
    }

    /// Dispatch a request arriving as an envelope.
    pub async fn dispatch_envelope(&self, request: DispatchRequest) -> Result<DispatchResponse> {
        let result = self
            .dispatch(
                request.handler_type.as_str(),
                &request.request_type,
                request.payload.clone(),
            )
            .await?;
        Ok(request.respond(result))
    }

    /// Ask the bound operation to describe the effect of `payload`.
    pub async fn preview(
        &self,
        handler_type: &str,
        request_type: &str,
        payload: &Value,
    ) -> Result<Value> {
        self.resolve(handler_type, request_type)?
            .preview(payload)
            .await
    }

    pub fn contains(&self, handler_type: &str, request_type: &str) -> bool {
        self.resolve(handler_type, request_type).is_ok()
    }

    /// Handler types with at least one registration, sorted.
    pub fn handler_types(&self) -> Vec<&HandlerType> {
        let mut types: Vec<_> = self.tables.keys().collect();
        types.sort();
        types
    }

    /// Request types registered under `handler_type`, sorted.
    pub fn request_types(&self, handler_type: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .tables
            .get(handler_type)
            .map(|table| table.keys().map(String::as_str).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    /// Total number of registrations, duplicates included.
    pub fn len(&self) -> usize {
        self.tables
            .values()
            .flat_map(|table| table.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn record_dispatch(handler_type: &str, request_type: &str, outcome: &'static str) {
    counter!(
        "countersign_dispatch_total",
        "handler_type" => handler_type.to_string(),
        "request_type" => request_type.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
