use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// The untyped payload that flows through a channel.
///
/// # Design background (Why)
/// Cyre's original payloads are dynamically typed (Design Notes, spec
/// §9): any JSON-representable value may be handed to `call`. Rather than
/// reach for a hand-rolled tagged union, this wraps [`serde_json::Value`],
/// which already gives deep structural equality (needed for change
/// detection), `Debug`, and a JSON escape hatch for hosts that want typed
/// payloads layered on top.
#[derive(Clone, Debug, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Payload(pub Value);

impl Payload {
    pub fn null() -> Self {
        Self(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    pub fn into_inner(self) -> Value {
        self.0
    }

    pub fn inner(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The tagged-variant result a handler produces.
///
/// # Design background (Why)
/// The source relies on runtime reflection ("does the returned object look
/// like `{id, payload}`?") to detect a chain reaction. Design Notes §9
/// calls for a tagged variant instead: the dispatcher switches on this enum
/// rather than probing shape at runtime, which is both the idiomatic and
/// the only type-safe option in Rust.
#[derive(Clone, Debug, PartialEq)]
pub enum HandlerResult {
    /// A plain value; no chain reaction is triggered.
    Value(Payload),
    /// A chain request: the dispatcher issues a nested `call(id, payload)`
    /// before returning to the original caller (spec §4.6).
    Chain { id: String, payload: Option<Payload> },
}

impl HandlerResult {
    pub fn value(payload: impl Into<Payload>) -> Self {
        Self::Value(payload.into())
    }

    pub fn chain(id: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self::Chain {
            id: id.into(),
            payload: Some(payload.into()),
        }
    }
}

impl From<Value> for HandlerResult {
    fn from(value: Value) -> Self {
        Self::Value(Payload(value))
    }
}

impl From<Payload> for HandlerResult {
    fn from(payload: Payload) -> Self {
        Self::Value(payload)
    }
}

/// The subscriber contract: one handler per channel (registry I2), invoked
/// with the pipeline's final payload.
///
/// # Contract (What)
/// - Implementations must be `Send + Sync + 'static` so a single
///   subscription can be invoked from any task the dispatcher runs on.
/// - A handler must not panic across the call boundary; unwinding out of
///   `call` is treated by the dispatcher the same as a returned error
///   would be in a fallible handler (recorded as `handler-error`, never
///   propagated to the caller of `Cyre::call`).
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, payload: Payload) -> HandlerResult;
}

/// Adapts a plain async closure into a [`Handler`], so hosts can write
/// `cyre.on("a", handler_fn(|p| async move { ... }))` instead of defining
/// a named type for every subscription.
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn call(&self, payload: Payload) -> HandlerResult {
        (self.f)(payload).await
    }
}

/// Builds a [`Handler`] from an async closure. See [`FnHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler { f })
}
