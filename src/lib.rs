//! Cyre: an in-process reactive action/event bus.
//!
//! Callers `call` a named *channel* with a payload; the payload is routed
//! through a compiled per-channel protection pipeline (throttle, debounce,
//! change detection, validation, middleware...) before reaching the
//! subscribed handler. Channels may be scheduled (delay/interval/repeat)
//! instead of executed synchronously, and a system-wide breathing
//! controller throttles non-critical work under sustained load.
//!
//! # Layout
//!
//! - [`kernel`] — payload and handler-result types shared across the crate.
//! - [`router`] — path grammar and branch (namespace) resolution.
//! - [`configuration`] — the channel configuration vocabulary.
//! - [`registry`] — channel and subscriber storage (C4/C5).
//! - [`pipeline`] — the compiler and the fixed-order protection stages (C7/C4.4).
//! - [`runtime`] — the clock abstraction and the TimeKeeper scheduler (C1/C8).
//! - [`governance`] — the breathing/stress controller (C3).
//! - [`observability`] — the bounded metrics ring (C2).
//! - [`dispatcher`] and [`response`] — the call path and its result shape (C9).
//! - [`bus`] — [`Cyre`], the value the host instantiates.

mod kernel;
mod router;
mod configuration;
mod registry;
mod pipeline;
mod runtime;
mod governance;
mod observability;
mod dispatcher;
mod response;
mod bus;
mod error;

pub use kernel::payload::{handler_fn, Handler, HandlerResult, Payload};
pub use router::branch::Branch;
pub use router::path::Path;
pub use configuration::action::{ActionConfig, ActionSnapshot, Priority, Repeat};
pub use registry::subscriber::Subscription;
pub use observability::metrics::{MetricCounters, MetricEvent, MetricKind, MetricQuery};
pub use pipeline::{Middleware, MiddlewareOutcome};
pub use governance::breathing::SystemHealth;
pub use runtime::clock::{Clock, MockClock};
pub use response::{ExecutionPath, IntraLink, Response, ResponseMetadata};
pub use error::CyreError;
pub use bus::{default_bus, ActionAck, Cyre};

/// Re-exports commonly imported together, mirroring the teacher's `prelude`
/// convention for reducing import boilerplate in host call sites.
pub mod prelude {
    pub use crate::{
        ActionConfig, Branch, CyreError, Cyre, Handler, HandlerResult, Path, Payload, Priority,
        Repeat, Response,
    };
}
