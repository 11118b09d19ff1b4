use crate::bus::{ActionAck, Cyre};
use crate::configuration::action::ActionConfig;
use crate::error::CyreError;
use crate::kernel::payload::{Handler, Payload};
use crate::registry::subscriber::Subscription;
use crate::response::Response;
use crate::router::path::Path;
use std::sync::Arc;

/// A path-prefix namespace scope (spec §4.2). A branch is a value, not a
/// type hierarchy: it wraps a handle to the owning bus plus the prefix it
/// rewrites caller-supplied ids through.
///
/// # Relative path conventions (Open Question, recorded in `DESIGN.md`)
/// - A bare local id (`"k"`) is namespaced under the branch: `prefix/k`.
/// - A leading `./` is explicit current-branch scoping; equivalent to the
///   bare form after the marker is stripped.
/// - A leading `../` walks one level up the branch's own prefix before
///   resolving the remainder; it may be repeated for multiple levels.
/// - A leading `/` is an explicit absolute path: the branch prefix is
///   ignored entirely and the remainder is parsed as a full path. This
///   is the only way to satisfy spec §4.2's "a call on an absolute full
///   path ignores the caller's branch", since the channel path grammar
///   itself has no leading slash.
#[derive(Clone)]
pub struct Branch {
    bus: Cyre,
    prefix: String,
    max_depth: Option<usize>,
}

impl Branch {
    pub(crate) fn root(bus: Cyre) -> Self {
        Self {
            bus,
            prefix: String::new(),
            max_depth: None,
        }
    }

    pub(crate) fn new(bus: Cyre, prefix: String, max_depth: Option<usize>) -> Self {
        Self {
            bus,
            prefix,
            max_depth,
        }
    }

    /// The branch's own prefix (empty for the bus's implicit root branch).
    pub fn path(&self) -> &str {
        &self.prefix
    }

    /// Creates a nested branch whose prefix is `self.path()/id`.
    pub fn create_branch(
        &self,
        id: &str,
        max_depth: Option<usize>,
    ) -> Result<Branch, CyreError> {
        let full = Path::join(&self.prefix, id)?;
        Ok(Branch::new(self.bus.clone(), full.as_str().to_owned(), max_depth))
    }

    /// Resolves a caller-supplied path against this branch's prefix,
    /// applying the `./`, `../`, and leading-`/` conventions above.
    pub fn resolve(&self, raw: &str) -> Result<Path, CyreError> {
        if let Some(absolute) = raw.strip_prefix('/') {
            return Path::parse(absolute);
        }

        let mut prefix = self.prefix.clone();
        let mut remainder = raw;
        loop {
            if let Some(rest) = remainder.strip_prefix("../") {
                prefix = parent_prefix(&prefix);
                remainder = rest;
                continue;
            }
            if let Some(rest) = remainder.strip_prefix("./") {
                remainder = rest;
                continue;
            }
            break;
        }

        let resolved = Path::join(&prefix, remainder)?;

        if let Some(max_depth) = self.max_depth {
            let base_depth = if self.prefix.is_empty() {
                0
            } else {
                self.prefix.split('/').count()
            };
            if resolved.depth() > base_depth + max_depth {
                return Err(CyreError::InvalidId(format!(
                    "path {raw:?} exceeds branch max depth {max_depth}"
                )));
            }
        }

        Ok(resolved)
    }

    pub async fn action(&self, mut cfg: ActionConfig) -> Result<ActionAck, CyreError> {
        let resolved = self.resolve(&cfg.id)?;
        cfg.id = resolved.as_str().to_owned();
        self.bus.action(cfg).await
    }

    pub async fn on(
        &self,
        path: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<Subscription, CyreError> {
        let resolved = self.resolve(path)?;
        self.bus.on_path(resolved, handler).await
    }

    pub async fn call(&self, path: &str, payload: Option<Payload>) -> Response {
        match self.resolve(path) {
            Ok(resolved) => self.bus.call_path(resolved, payload).await,
            Err(err) => err.into_response(),
        }
    }

    pub async fn forget(&self, path: &str) -> Result<bool, CyreError> {
        let resolved = self.resolve(path)?;
        self.bus.forget_path(&resolved).await
    }

    /// Destroys this branch: every channel registered under its prefix
    /// (including ones registered through nested branches) is forgotten
    /// (spec §3 "destroying a branch destroys all channels under that
    /// prefix"). Returns the number of channels removed.
    pub async fn destroy(self) -> usize {
        self.bus.forget_prefix(&self.prefix).await
    }
}

fn parent_prefix(prefix: &str) -> String {
    match prefix.rsplit_once('/') {
        Some((head, _)) => head.to_owned(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Cyre;

    #[test]
    fn resolves_relative_forms() {
        let bus = Cyre::new();
        let b1 = bus.create_branch("b1", None).unwrap();
        assert_eq!(b1.resolve("k").unwrap().as_str(), "b1/k");
        assert_eq!(b1.resolve("./k").unwrap().as_str(), "b1/k");
        assert_eq!(b1.resolve("/top").unwrap().as_str(), "top");

        let nested = b1.create_branch("b2", None).unwrap();
        assert_eq!(nested.resolve("k").unwrap().as_str(), "b1/b2/k");
        assert_eq!(nested.resolve("../k").unwrap().as_str(), "b1/k");
    }

    #[test]
    fn enforces_max_depth() {
        let bus = Cyre::new();
        let b1 = bus.create_branch("b1", Some(1)).unwrap();
        assert!(b1.resolve("k").is_ok());
        assert!(b1.resolve("a/b").is_err());
    }
}
