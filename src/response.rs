//! The stable, always-`Ok` result of a `call` (spec §7): protection
//! rejections, middleware rejections, and handler errors are all folded
//! into this shape rather than unwinding out of `call`.

use crate::kernel::payload::Payload;

/// Which branch of the pipeline produced this response, useful for
/// assertions in tests and for dashboards distinguishing "executed"
/// from "protection stage stopped it here".
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionPath {
    /// The handler ran via a plan with no protection stages or
    /// middleware beyond the always-on system gate (spec §3 I3).
    FastPath,
    /// The handler ran through one or more active protection stages.
    Pipeline,
    /// A protection stage stopped the pipeline before the handler ran.
    Rejected,
    /// The call forwarded its payload into a scheduled firing instead
    /// of executing synchronously.
    Scheduled,
}

/// The chain reaction a handler's result triggered (spec §4.6, §6): the
/// dispatcher's nested `call(id, payload)` is embedded here, in full,
/// rather than just a success bit — a chain of chains nests naturally
/// since `chain_result` is itself a complete `Response`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IntraLink {
    pub id: String,
    pub payload: Option<Payload>,
    pub chain_result: Box<Response>,
}

/// Metadata describing how a response was produced, orthogonal to the
/// `ok`/`payload`/`message` fields callers usually care about first.
#[derive(Clone, Debug, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct ResponseMetadata {
    pub execution_path: Option<ExecutionPath>,
    pub reason: Option<String>,
    pub intra_link: Option<IntraLink>,
}

/// The value every `Cyre::call` resolves to (spec §7).
///
/// # Contract (What)
/// - `ok` is `true` only when the handler ran and returned normally (or
///   the call was accepted as a no-op, e.g. a debounced call that will
///   fire later).
/// - `payload` carries the handler's returned value on success, or
///   `Payload::null()` when there is none to report.
/// - `message` is a short, human-readable summary; stable identifiers
///   for programmatic branching live in `metadata.reason`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Response {
    pub ok: bool,
    pub payload: Payload,
    pub message: String,
    pub metadata: ResponseMetadata,
}

impl Response {
    pub fn ok(payload: Payload) -> Self {
        Self {
            ok: true,
            payload,
            message: String::new(),
            metadata: ResponseMetadata {
                execution_path: Some(ExecutionPath::Pipeline),
                ..Default::default()
            },
        }
    }

    /// Tags this response's `executionPath` (spec §6). Called by the
    /// dispatcher once it knows whether the channel's compiled plan was
    /// `fastPath` (spec §3 I3).
    pub fn with_execution_path(mut self, path: ExecutionPath) -> Self {
        self.metadata.execution_path = Some(path);
        self
    }

    pub fn ok_with_message(payload: Payload, message: impl Into<String>) -> Self {
        Self {
            ok: true,
            payload,
            message: message.into(),
            metadata: ResponseMetadata::default(),
        }
    }

    pub fn scheduled() -> Self {
        Self {
            ok: true,
            payload: Payload::null(),
            message: "scheduled".to_owned(),
            metadata: ResponseMetadata {
                execution_path: Some(ExecutionPath::Scheduled),
                ..Default::default()
            },
        }
    }

    pub fn reject(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            payload: Payload::null(),
            message: message.into(),
            metadata: ResponseMetadata {
                execution_path: Some(ExecutionPath::Rejected),
                reason: Some(reason.into()),
                intra_link: None,
            },
        }
    }

    pub fn error(reason: impl Into<String>, message: impl Into<String>, detail: String) -> Self {
        let mut response = Self::reject(reason, message);
        response.metadata.reason = Some(detail);
        response
    }

    /// Attaches the chain reaction triggered by this response's handler
    /// (spec §4.6 / §6 `metadata.intraLink.chainResult`).
    pub fn with_chain_link(
        mut self,
        id: impl Into<String>,
        payload: Option<Payload>,
        chain_result: Response,
    ) -> Self {
        self.metadata.intra_link = Some(IntraLink {
            id: id.into(),
            payload,
            chain_result: Box::new(chain_result),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_carries_execution_path_and_reason() {
        let response = Response::reject("throttled", "too soon");
        assert!(!response.ok);
        assert_eq!(response.metadata.execution_path, Some(ExecutionPath::Rejected));
        assert_eq!(response.metadata.reason.as_deref(), Some("throttled"));
    }
}
