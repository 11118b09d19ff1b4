//! The error taxonomy from spec §7, realized as a closed `thiserror` enum.
//!
//! # Propagation policy (Why)
//! Registration (`action`, `on`) is the only place this type is surfaced as
//! an `Err` to the host — everywhere else it is folded into a non-ok
//! [`crate::Response`] via [`CyreError::into_response`], so a `call` never
//! throws to the host (spec §7, "every `call` returns a response").

use crate::response::Response;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum CyreError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no channel registered for path")]
    NoChannel,

    #[error("no subscriber registered for path")]
    NoSubscriber,

    #[error("invalid path: {0}")]
    InvalidId(String),

    #[error("handler is not callable")]
    InvalidHandler,

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("throttled, retry after {remaining_ms}ms")]
    Throttled { remaining_ms: u64 },

    #[error("debounced")]
    Debounced,

    #[error("skipped: {0}")]
    Skipped(String),

    #[error("blocked")]
    Blocked,

    #[error("system recuperating")]
    SystemRecuperating,

    #[error("middleware rejected: {0}")]
    MiddlewareRejected(String),

    #[error("middleware error: {0}")]
    MiddlewareError(String),

    #[error("handler error: {0}")]
    HandlerError(String),

    #[error("scheduler error: {0}")]
    SchedulerError(String),

    #[error("chain cycle detected at {0}")]
    ChainCycle(String),
}

impl CyreError {
    /// Folds a rejection into the stable non-ok [`Response`] shape.
    ///
    /// Protection rejections, middleware rejections and handler errors are
    /// all "local" per spec §7 — they never unwind out of `call`, they are
    /// just reported through this conversion.
    pub fn into_response(self) -> Response {
        let message = self.to_string();
        match self {
            CyreError::Throttled { .. } => Response::reject("throttled", message),
            CyreError::Debounced => Response::ok_with_message(crate::Payload::null(), message),
            CyreError::Skipped(_) => Response::ok_with_message(crate::Payload::null(), message),
            CyreError::Blocked => Response::reject("blocked", message),
            CyreError::SystemRecuperating => {
                Response::reject("system-recuperating", message)
            }
            CyreError::ValidationFailed(_) => Response::reject("validation-failed", message),
            CyreError::MiddlewareRejected(_) => {
                Response::reject("middleware-rejected", message)
            }
            CyreError::MiddlewareError(_) => Response::reject("middleware-error", message),
            CyreError::HandlerError(ref err) => Response::error("handler-error", message, err.clone()),
            CyreError::SchedulerError(_) => Response::reject("scheduler-error", message),
            CyreError::ChainCycle(_) => Response::reject("chain-cycle", message),
            CyreError::NoChannel => Response::reject("no-channel", message),
            CyreError::NoSubscriber => Response::reject("no-subscriber", message),
            CyreError::InvalidId(_) => Response::reject("invalid-id", message),
            CyreError::InvalidHandler => Response::reject("invalid-handler", message),
            CyreError::InvalidConfig(_) => Response::reject("invalid-config", message),
        }
    }
}
