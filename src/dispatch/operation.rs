//! Operations bound into the dispatch registry.
//!
//! An [`Operation`] is what runs once a request has been approved. The payload and result
//! are opaque JSON; adapters are provided for binding plain closures, async closures and
//! typed functions whose input is deserialized from the payload.

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{CountersignError, Result};

/// A callable registered under a `(handler type, request type)` pair.
///
/// `execute` is required. `preview` is an optional capability: implementations that
/// can describe the effect of a payload without applying it override it, everyone else
/// reports `ImplementationNotFound` rather than pretending to succeed.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Apply the approved change.
    async fn execute(&self, payload: Value) -> Result<Value>;

    /// Describe what `execute` would do with `payload`, without doing it.
    async fn preview(&self, _payload: &Value) -> Result<Value> {
        Err(CountersignError::ImplementationNotFound(
            "preview".to_string(),
        ))
    }
}

/// Operation backed by a synchronous closure.
pub struct FnOperation<F> {
    f: F,
}

/// Bind a synchronous closure as an [`Operation`].
pub fn fn_operation<F>(f: F) -> FnOperation<F>
where
    F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
{
    FnOperation { f }
}

#[async_trait]
impl<F> Operation for FnOperation<F>
where
    F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
{
    async fn execute(&self, payload: Value) -> Result<Value> {
        (self.f)(payload)
    }
}

/// Operation backed by an async closure.
pub struct AsyncFnOperation<F, Fut> {
    f: F,
    _future: PhantomData<fn() -> Fut>,
}

/// Bind an async closure as an [`Operation`].
pub fn async_operation<F, Fut>(f: F) -> AsyncFnOperation<F, Fut>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    AsyncFnOperation {
        f,
        _future: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> Operation for AsyncFnOperation<F, Fut>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn execute(&self, payload: Value) -> Result<Value> {
        (self.f)(payload).await
    }
}

/// Operation whose payload is deserialized into `Req` and whose `Resp` is serialized back.
pub struct TypedOperation<F, Req, Resp, Fut> {
    f: F,
    _types: PhantomData<fn(Req) -> (Resp, Fut)>,
}

/// Bind an async function over concrete request/response types as an [`Operation`].
///
/// A payload that does not deserialize into `Req` fails with `Serialization` before the
/// function is called.
///
/// # Example
/// ```ignore
/// #[derive(Deserialize)]
/// struct CreateOutlet { merchant_id: u64, name: String }
///
/// let op = typed_operation(|req: CreateOutlet| async move {
///     Ok(outlets.create(req.merchant_id, &req.name).await?)
/// });
/// ```
pub fn typed_operation<F, Req, Resp, Fut>(f: F) -> TypedOperation<F, Req, Resp, Fut>
where
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    Fut: Future<Output = Result<Resp>> + Send + 'static,
{
    TypedOperation {
        f,
        _types: PhantomData,
    }
}

#[async_trait]
impl<F, Req, Resp, Fut> Operation for TypedOperation<F, Req, Resp, Fut>
where
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    Fut: Future<Output = Result<Resp>> + Send + 'static,
{
    async fn execute(&self, payload: Value) -> Result<Value> {
        let request: Req = serde_json::from_value(payload)?;
        let response = (self.f)(request).await?;
        Ok(serde_json::to_value(response)?)
    }
}
