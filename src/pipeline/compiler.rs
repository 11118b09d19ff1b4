use std::sync::Arc;

use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::configuration::action::{ActionConfig, Repeat};
use crate::pipeline::stage::StageKind;
use crate::router::path::Path;

/// The result of compiling a channel's [`ActionConfig`] into an ordered
/// subsequence of [`StageKind`] (spec §4.4, §7 "Pipeline Compiler").
///
/// `verification_hash` lets the dispatcher detect, cheaply, whether a
/// cached plan still matches the channel's current configuration
/// without re-walking every field (spec §3 invariant I3 — a channel's
/// compiled pipeline always matches its current config).
/// A coarse cost category for a compiled plan, surfaced only for
/// observability (spec §4.3 "a category tag used for observability
/// only") — never consulted by the dispatcher to change behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum OverheadClass {
    /// `SystemGate` + `Handler` only.
    FastPath,
    /// One or more protection stages, no scheduler.
    Pipeline,
    /// Delay/interval/repeat configured; every call hands off to the
    /// scheduler instead of dispatching synchronously.
    Scheduled,
}

pub struct CompiledPlan {
    pub active_stages: Vec<StageKind>,
    /// Spec §3 invariant I3: no protection stages beyond the always-on
    /// system gate, and no middleware — only `SystemGate` and `Handler`
    /// are compiled in.
    pub fast_path: bool,
    /// Spec §3 invariant I4.
    pub requires_scheduler: bool,
    pub overhead_hint: OverheadClass,
    pub verification_hash: String,
}

impl CompiledPlan {
    pub fn has_stage(&self, stage: StageKind) -> bool {
        self.active_stages.contains(&stage)
    }
}

/// Compiles an [`ActionConfig`] into a [`CompiledPlan`]: the optional
/// stages present are exactly those the config actually configures, so
/// the dispatcher never evaluates a no-op stage (spec §4.4).
pub struct PipelineCompiler;

impl PipelineCompiler {
    pub fn compile(config: &ActionConfig) -> CompiledPlan {
        let mut active = Vec::with_capacity(StageKind::ORDER.len());
        for stage in StageKind::ORDER {
            let include = match stage {
                StageKind::SystemGate => true,
                StageKind::RepeatZero => matches!(config.repeat, Repeat::Never),
                StageKind::Validation => config.required || config.schema.is_some(),
                StageKind::Selector => config.selector.is_some(),
                StageKind::Condition => config.condition.is_some(),
                StageKind::Throttle => config.throttle.is_some(),
                StageKind::Debounce => config.debounce.is_some(),
                StageKind::ChangeDetection => config.detect_changes,
                StageKind::Transform => config.transform.is_some(),
                StageKind::Middleware => !config.middleware.is_empty(),
                StageKind::Handler => true,
            };
            if include {
                active.push(stage);
            }
        }

        let requires_scheduler = config.requires_scheduler();
        let fast_path = !requires_scheduler
            && active
                .iter()
                .all(|stage| matches!(stage, StageKind::SystemGate | StageKind::Handler));
        let overhead_hint = if requires_scheduler {
            OverheadClass::Scheduled
        } else if fast_path {
            OverheadClass::FastPath
        } else {
            OverheadClass::Pipeline
        };

        let verification_hash = Self::hash(config, &active);
        CompiledPlan {
            active_stages: active,
            fast_path,
            requires_scheduler,
            overhead_hint,
            verification_hash,
        }
    }

    /// Hashes the scalar configuration surface plus the compiled stage
    /// list, the same "iterate stable fields, feed a SHA-256, hex
    /// encode" shape used elsewhere in this codebase for
    /// tamper/drift-evident state hashing. Closures (`schema`,
    /// `condition`, `selector`, `transform`) aren't hashed by content —
    /// only their presence is, via the stage list itself.
    fn hash(config: &ActionConfig, active: &[StageKind]) -> String {
        let snapshot = config.describe();
        let mut hasher = Sha256::new();
        hasher.update(snapshot.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(snapshot.kind.as_bytes());
        hasher.update([0u8]);
        hash_opt_u64(&mut hasher, snapshot.throttle);
        hash_opt_u64(&mut hasher, snapshot.debounce);
        hash_opt_u64(&mut hasher, snapshot.max_wait);
        hasher.update([snapshot.detect_changes as u8]);
        hasher.update([snapshot.required as u8]);
        hasher.update([snapshot.block as u8]);
        hash_opt_u64(&mut hasher, snapshot.interval);
        hash_opt_u64(&mut hasher, snapshot.delay);
        hasher.update(snapshot.repeat.as_bytes());
        hasher.update([0u8]);
        hasher.update(snapshot.priority.as_bytes());
        hasher.update([0u8]);
        for id in &snapshot.middleware {
            hasher.update(id.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update([0xFF]);
        for stage in active {
            hasher.update([*stage as u8]);
        }
        hex_encode(&hasher.finalize())
    }
}

fn hash_opt_u64(hasher: &mut Sha256, value: Option<u64>) {
    match value {
        Some(v) => {
            hasher.update([1u8]);
            hasher.update(v.to_le_bytes());
        }
        None => hasher.update([0u8]),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    const TABLE: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(TABLE[(byte >> 4) as usize] as char);
        out.push(TABLE[(byte & 0x0F) as usize] as char);
    }
    out
}

/// Caches compiled plans per channel path so re-dispatching a channel
/// doesn't re-walk its config on every call; invalidated whenever the
/// channel is re-registered (spec §7 "Pipeline Compiler" caching note).
#[derive(Default)]
pub struct PipelineCache {
    plans: DashMap<Path, Arc<CompiledPlan>>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self {
            plans: DashMap::new(),
        }
    }

    pub fn get_or_compile(&self, path: &Path, config: &ActionConfig) -> Arc<CompiledPlan> {
        if let Some(existing) = self.plans.get(path) {
            return existing.value().clone();
        }
        let plan = Arc::new(PipelineCompiler::compile(config));
        self.plans.insert(path.clone(), plan.clone());
        plan
    }

    pub fn invalidate(&self, path: &Path) {
        self.plans.remove(path);
    }

    pub fn clear(&self) {
        self.plans.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_only_configured_optional_stages() {
        let config = ActionConfig::new("a").with_throttle(100);
        let plan = PipelineCompiler::compile(&config);
        assert!(plan.has_stage(StageKind::SystemGate));
        assert!(plan.has_stage(StageKind::Throttle));
        assert!(!plan.has_stage(StageKind::Debounce));
        assert!(plan.has_stage(StageKind::Handler));
    }

    #[test]
    fn hash_changes_when_config_changes() {
        let a = PipelineCompiler::compile(&ActionConfig::new("a").with_throttle(100));
        let b = PipelineCompiler::compile(&ActionConfig::new("a").with_throttle(200));
        assert_ne!(a.verification_hash, b.verification_hash);
    }

    #[test]
    fn cache_invalidation_forces_recompile() {
        let cache = PipelineCache::new();
        let path = Path::parse("a").unwrap();
        let config = ActionConfig::new("a").with_throttle(100);
        let plan1 = cache.get_or_compile(&path, &config);
        let plan2 = cache.get_or_compile(&path, &config);
        assert!(Arc::ptr_eq(&plan1, &plan2));
        cache.invalidate(&path);
        let plan3 = cache.get_or_compile(&path, &config);
        assert!(!Arc::ptr_eq(&plan1, &plan3));
    }
}
