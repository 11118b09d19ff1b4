use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// A stress reading sampled once per breathing beat (spec §4.8).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StressSample {
    pub call_rate: f64,
    pub error_rate: f64,
}

/// Stretches scheduled intervals and gates non-critical calls under
/// load, inspired by the adaptive retry weighting used elsewhere in
/// this codebase for RTT/backlog-aware backoff: stress is folded into
/// an exponential pressure factor rather than a hard on/off switch, so
/// recovery is gradual instead of thrashing at the threshold.
///
/// # Hysteresis (Why)
/// Entering and exiting recuperation at the same threshold causes rapid
/// flapping right at the boundary. A 20-point gap between the enter and
/// exit thresholds means the system must visibly recover, not just dip
/// under the line for one sample, before `Critical`-only gating lifts.
pub struct BreathingController {
    stress: AtomicU32,
    is_recuperating: AtomicBool,
    beats: AtomicU64,
}

/// A point-in-time snapshot of the breathing controller's state,
/// exposed to hosts via `Cyre::get_system_health` (spec §4.8).
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct SystemHealth {
    pub stress: u32,
    pub is_recuperating: bool,
    pub beat_count: u64,
}

const RECUPERATE_ENTER_STRESS: u32 = 90;
const RECUPERATE_EXIT_STRESS: u32 = 70;
const MAX_STRETCH_FACTOR: f64 = 4.0;

impl Default for BreathingController {
    fn default() -> Self {
        Self::new()
    }
}

impl BreathingController {
    pub fn new() -> Self {
        Self {
            stress: AtomicU32::new(0),
            is_recuperating: AtomicBool::new(false),
            beats: AtomicU64::new(0),
        }
    }

    /// Current stress reading in `[0, 100]`.
    pub fn stress(&self) -> u32 {
        self.stress.load(Ordering::Acquire)
    }

    pub fn is_recuperating(&self) -> bool {
        self.is_recuperating.load(Ordering::Acquire)
    }

    pub fn beat_count(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }

    pub fn health(&self) -> SystemHealth {
        SystemHealth {
            stress: self.stress(),
            is_recuperating: self.is_recuperating(),
            beat_count: self.beat_count(),
        }
    }

    /// Folds a fresh sample into the stress reading and updates the
    /// recuperation hysteresis. Called periodically by the bus's
    /// breathing loop (spec §4.8 "the system samples its own load and
    /// throttles itself before callers notice").
    pub fn beat(&self, sample: StressSample) {
        self.beats.fetch_add(1, Ordering::Relaxed);
        let call_pressure = clamp01(sample.call_rate / MAX_EXPECTED_CALL_RATE);
        let error_pressure = clamp01(sample.error_rate);
        let combined = (call_pressure * 0.6 + error_pressure * 0.4) * 100.0;
        let next_stress = combined.round().clamp(0.0, 100.0) as u32;
        self.stress.store(next_stress, Ordering::Release);

        if next_stress >= RECUPERATE_ENTER_STRESS {
            self.is_recuperating.store(true, Ordering::Release);
        } else if next_stress < RECUPERATE_EXIT_STRESS {
            self.is_recuperating.store(false, Ordering::Release);
        }
    }

    /// Stretches a scheduled interval under load: stress above the exit
    /// threshold exponentially lengthens the wait, up to
    /// `MAX_STRETCH_FACTOR`, so repeat-interval timers back off instead
    /// of adding to the load that caused the stress in the first place.
    pub fn stretch_interval_ms(&self, base_ms: u64) -> u64 {
        let stress = self.stress() as f64 / 100.0;
        if stress <= 0.0 {
            return base_ms;
        }
        let factor = 1.0 + (MAX_STRETCH_FACTOR - 1.0) * stress.powf(1.5);
        ((base_ms as f64) * factor).round() as u64
    }
}

const MAX_EXPECTED_CALL_RATE: f64 = 200.0;

fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enters_and_exits_recuperation_with_hysteresis() {
        let controller = BreathingController::new();
        controller.beat(StressSample {
            call_rate: 190.0,
            error_rate: 0.9,
        });
        assert!(controller.is_recuperating());

        controller.beat(StressSample {
            call_rate: 150.0,
            error_rate: 0.2,
        });
        assert!(
            controller.is_recuperating(),
            "should stay recuperating until stress drops below the exit threshold"
        );

        controller.beat(StressSample {
            call_rate: 0.0,
            error_rate: 0.0,
        });
        assert!(!controller.is_recuperating());
    }

    #[test]
    fn stretches_interval_proportionally_to_stress() {
        let controller = BreathingController::new();
        assert_eq!(controller.stretch_interval_ms(100), 100);
        controller.beat(StressSample {
            call_rate: 200.0,
            error_rate: 1.0,
        });
        assert!(controller.stretch_interval_ms(100) > 100);
    }
}
