// castellum-core/src/engine.rs
//
// The decision engine (spec §4.2): given a resource's configured logic and
// an asset's current size/usage, decide which resize targets are eligible.
// Pure, deterministic, zero I/O — every input is a value, every output is a
// value.

use std::collections::BTreeMap;

use crate::model::{AssetStatus, Reason, ResourceLogic, StepRule, ThresholdSet};

/// Reasons eligible right now, mapped to the target size each would resize
/// to. Exactly one of `High` and `Critical` can be present; `Low` is
/// independent and may appear alongside either.
pub type Eligibility = BTreeMap<Reason, u64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

/// Run the three-phase algorithm for both directions and assemble the
/// combined eligibility map (spec §4.2).
pub fn decide(logic: &ResourceLogic, status: &AssetStatus) -> Eligibility {
    let mut out = Eligibility::new();

    if let Some((reason, target)) = decide_up(logic, status) {
        out.insert(reason, target);
    }
    if let Some(target) = decide_down(logic, status) {
        out.insert(Reason::Low, target);
    }

    out
}

fn usage_pct(usage_value: f64, size: u64) -> f64 {
    if size == 0 {
        0.0
    } else {
        100.0 * usage_value / size as f64
    }
}

/// Phase 2 threshold trigger for one band: any metric whose usage% crosses
/// the configured percentage in the direction that band names.
fn threshold_trigger(thresholds: &ThresholdSet, status: &AssetStatus, reason: Reason) -> bool {
    if status.size == 0 {
        // Corner case (spec §4.2): a zero-size, zero-usage asset is left
        // alone by thresholds; only enforceable bounds can still act on it.
        return false;
    }
    status.usage.iter().any(|(metric, usage_value)| {
        let Some(Some(pct)) = thresholds.get(metric) else {
            return false;
        };
        if *pct <= 0.0 {
            return false;
        }
        let pct_now = usage_pct(*usage_value, status.size);
        match reason {
            Reason::Low => pct_now <= *pct,
            Reason::High | Reason::Critical => pct_now >= *pct,
        }
    })
}

/// Downsize path: always attributed to `Reason::Low`.
fn decide_down(logic: &ResourceLogic, status: &AssetStatus) -> Option<u64> {
    let mut lo: u64 = 1;
    let mut hi: u64 = u64::MAX;

    if let Some(strict_min) = status.strict_min {
        lo = lo.max(strict_min);
    }
    if let Some(strict_max) = status.strict_max {
        hi = hi.min(strict_max);
    }
    if let Some(min_free) = logic.min_free_size {
        let mut bound = 0u64;
        for usage_value in status.usage.values() {
            bound = bound.max(usage_value.ceil() as u64 + min_free);
        }
        if let Some(strict_max) = status.strict_max {
            bound = bound.min(strict_max);
        }
        lo = lo.max(bound);
    }
    if let Some(min_size) = logic.min_size {
        lo = lo.max(min_size);
    }

    if status.size > 0 {
        for (metric, usage_value) in &status.usage {
            let ceiling_pct = logic
                .high_thresholds
                .get(metric)
                .copied()
                .flatten()
                .filter(|p| *p > 0.0)
                .or_else(|| {
                    logic
                        .critical_thresholds
                        .get(metric)
                        .copied()
                        .flatten()
                        .filter(|p| *p > 0.0)
                });
            if let Some(pct) = ceiling_pct {
                let bound = ((100.0 * usage_value / pct).floor() as i64 + 1).max(1) as u64;
                lo = lo.max(bound);
            }
        }
    }

    if lo > hi {
        // A strict hard cap always wins over the soft anti-reentry guard.
        hi = lo;
        if let Some(strict_max) = status.strict_max {
            hi = hi.min(strict_max);
            lo = lo.min(hi);
        }
    }

    let triggered = threshold_trigger(&logic.low_thresholds, status, Reason::Low)
        || status.strict_max.is_some_and(|m| m < status.size);
    if !triggered {
        return None;
    }

    let raw = compute_target(logic, status, Reason::Low, Direction::Down);
    let clamped = raw.clamp(lo.min(hi), hi.max(lo));
    if clamped == status.size {
        return None;
    }
    Some(clamped)
}

/// Upsize path: attributed to either `High` or `Critical`.
fn decide_up(logic: &ResourceLogic, status: &AssetStatus) -> Option<(Reason, u64)> {
    let mut lo: u64 = 1;
    let mut hi: u64 = u64::MAX;

    if let Some(strict_min) = status.strict_min {
        lo = lo.max(strict_min);
    }
    if let Some(strict_max) = status.strict_max {
        hi = hi.min(strict_max);
    }

    let mut min_free_lower = None;
    if let Some(min_free) = logic.min_free_size {
        let mut bound = 0u64;
        for usage_value in status.usage.values() {
            bound = bound.max(usage_value.ceil() as u64 + min_free);
        }
        if let Some(strict_max) = status.strict_max {
            bound = bound.min(strict_max);
        }
        lo = lo.max(bound);
        min_free_lower = Some(bound);
    }
    if let Some(max_size) = logic.max_size {
        hi = hi.min(max_size);
    }

    // Anti-overshoot: don't resize so far that usage% falls back below the
    // low threshold, which would make the asset immediately eligible for a
    // downsize again.
    for (metric, usage_value) in &status.usage {
        if let Some(Some(pct)) = logic.low_thresholds.get(metric) {
            if *pct > 0.0 {
                let bound = ((100.0 * usage_value / pct).floor() - 1.0).max(1.0) as u64;
                hi = hi.min(bound);
            }
        }
    }

    let mut reason = None;
    if threshold_trigger(&logic.critical_thresholds, status, Reason::Critical) {
        reason = Some(Reason::Critical);
    } else if threshold_trigger(&logic.high_thresholds, status, Reason::High) {
        reason = Some(Reason::High);
    }

    if reason.is_none() {
        let strict_min_forces = status.strict_min.is_some_and(|m| m > status.size);
        let min_free_forces = min_free_lower.is_some_and(|b| b > status.size);

        if min_free_forces && logic.min_free_size_is_critical {
            reason = Some(Reason::Critical);
        } else if strict_min_forces || min_free_forces {
            let any_high_configured = logic
                .high_thresholds
                .values()
                .any(|p| p.is_some_and(|p| p > 0.0));
            reason = Some(if any_high_configured {
                Reason::High
            } else {
                Reason::Critical
            });
        }
    }

    let reason = reason?;

    for (metric, usage_value) in &status.usage {
        if let Some(Some(pct)) = logic.thresholds_for(reason).get(metric) {
            if *pct > 0.0 {
                let needed = (100.0 * usage_value / pct).ceil() as u64;
                lo = lo.max(needed);
            }
        }
    }

    if lo > hi {
        hi = lo;
        if let Some(strict_max) = status.strict_max {
            hi = hi.min(strict_max);
            lo = lo.min(hi);
        }
    }

    let raw = compute_target(logic, status, reason, Direction::Up);
    let clamped = raw.clamp(lo.min(hi), hi.max(lo));
    if clamped == status.size {
        return None;
    }
    Some((reason, clamped))
}

/// Phase 3: turn a triggered reason into one candidate target size, before
/// clamping to the Phase 1 interval.
fn compute_target(
    logic: &ResourceLogic,
    status: &AssetStatus,
    reason: Reason,
    dir: Direction,
) -> u64 {
    match logic.step {
        StepRule::Percentage(step_pct) => {
            let step_amt = step_size(status.size, step_pct, dir);
            let mut target = match dir {
                Direction::Up => status.size.saturating_add(step_amt),
                Direction::Down => status.size.saturating_sub(step_amt).max(1),
            };

            if reason == Reason::Critical {
                // Iterate on the new size until every metric with a
                // critical threshold clears it, bounded to guarantee
                // termination (spec §8 property 6).
                for _ in 0..32 {
                    let still_exceeds = status.usage.iter().any(|(metric, usage_value)| {
                        logic
                            .critical_thresholds
                            .get(metric)
                            .copied()
                            .flatten()
                            .filter(|p| *p > 0.0)
                            .is_some_and(|pct| usage_pct(*usage_value, target) >= pct)
                    });
                    if !still_exceeds {
                        break;
                    }
                    let step_amt = step_size(target, step_pct, dir);
                    let next = target.saturating_add(step_amt);
                    if next == target {
                        break;
                    }
                    target = next;
                }
            }
            target
        }
        StepRule::Single => {
            let thresholds: ThresholdSet = if reason == Reason::Critical {
                merge_prefer_high(&logic.high_thresholds, &logic.critical_thresholds)
            } else {
                logic.thresholds_for(reason).clone()
            };
            let delta: f64 = match dir {
                Direction::Up => -0.0001,
                Direction::Down => 0.0001,
            };

            let mut candidates = Vec::new();
            for (metric, usage_value) in &status.usage {
                let Some(Some(pct)) = thresholds.get(metric) else {
                    continue;
                };
                if *pct <= 0.0 {
                    continue;
                }
                let denom = pct + delta;
                if denom <= 0.0 {
                    continue;
                }
                let raw = 100.0 * usage_value / denom;
                let candidate = match dir {
                    Direction::Up => raw.ceil(),
                    Direction::Down => raw.floor(),
                };
                candidates.push(candidate.max(1.0) as u64);
            }

            match dir {
                Direction::Up => candidates.into_iter().max().unwrap_or(status.size),
                Direction::Down => candidates.into_iter().min().unwrap_or(status.size),
            }
        }
    }
}

/// The literal step amount a percentage-step resize moves by. Downsizes
/// round the step down (the conservative, smaller-leave choice); upsizes
/// round up, so a resize always makes strictly more progress than an exact
/// proportional share would (spec §8 S1 vs. S2).
fn step_size(size: u64, step_pct: f64, dir: Direction) -> u64 {
    let raw = size as f64 * step_pct / 100.0;
    let stepped = match dir {
        Direction::Up => raw.ceil(),
        Direction::Down => raw.floor(),
    };
    (stepped as u64).max(1)
}

/// For single-step critical resizes: prefer the high threshold when a
/// metric has one configured, so one resize clears both bands at once
/// (spec §4.2).
fn merge_prefer_high(high: &ThresholdSet, critical: &ThresholdSet) -> ThresholdSet {
    let mut merged = critical.clone();
    for (metric, pct) in high {
        if pct.is_some() {
            merged.insert(metric.clone(), *pct);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn thresholds(pairs: &[(&str, f64)]) -> ThresholdSet {
        pairs
            .iter()
            .map(|(m, p)| (m.to_string(), Some(*p)))
            .collect()
    }

    fn empty_thresholds() -> ThresholdSet {
        BTreeMap::new()
    }

    fn usage(pairs: &[(&str, f64)]) -> crate::model::Usage {
        pairs.iter().map(|(m, v)| (m.to_string(), *v)).collect()
    }

    fn basic_logic(step_pct: f64) -> ResourceLogic {
        ResourceLogic {
            low_thresholds: thresholds(&[("usage", 20.0)]),
            high_thresholds: thresholds(&[("usage", 80.0)]),
            critical_thresholds: thresholds(&[("usage", 95.0)]),
            low_delay_secs: 3600,
            high_delay_secs: 1800,
            step: StepRule::Percentage(step_pct),
            min_size: None,
            max_size: None,
            min_free_size: None,
            min_free_size_is_critical: false,
            low_requires_greenlight: false,
            high_requires_greenlight: false,
        }
    }

    #[test]
    fn no_trigger_when_usage_in_band() {
        let logic = basic_logic(20.0);
        let status = AssetStatus {
            size: 1000,
            usage: usage(&[("usage", 500.0)]),
            strict_min: None,
            strict_max: None,
        };
        assert!(decide(&logic, &status).is_empty());
    }

    #[test]
    fn high_threshold_triggers_upsize_percentage_step() {
        // S1 from spec §8: low=20%@3600s, high=80%@1800s, step=20%, size=1024, usage=900.
        let logic = basic_logic(20.0);
        let status = AssetStatus {
            size: 1024,
            usage: usage(&[("usage", 900.0)]),
            strict_min: None,
            strict_max: None,
        };
        let result = decide(&logic, &status);
        assert_eq!(result.get(&Reason::High), Some(&1229));
        assert!(!result.contains_key(&Reason::Critical));
    }

    #[test]
    fn low_threshold_triggers_downsize_percentage_step() {
        // S2 from spec §8: usage drops to 200 (19.5%, below the 20% low
        // threshold) before confirmation elapses. Downsize target is 820;
        // recomputed usage (200/820 = 24.4%) stays above the low band, so a
        // follow-up tick would not re-trigger a downsize.
        let logic = basic_logic(20.0);
        let status = AssetStatus {
            size: 1024,
            usage: usage(&[("usage", 200.0)]),
            strict_min: None,
            strict_max: None,
        };
        let result = decide(&logic, &status);
        // 200/1024 = 19.5% <= 20% -> low triggers; target = 1024 - floor(1024*0.2) = 820
        assert_eq!(result.get(&Reason::Low), Some(&820));
    }

    #[test]
    fn critical_single_step_clears_band() {
        // S3: critical=95%, no high, step n/a (single_step false here — use
        // percentage) asset size 100 usage 98.
        let mut logic = basic_logic(10.0);
        logic.high_thresholds = empty_thresholds();
        logic.critical_thresholds = thresholds(&[("usage", 95.0)]);
        let status = AssetStatus {
            size: 100,
            usage: usage(&[("usage", 98.0)]),
            strict_min: None,
            strict_max: None,
        };
        let result = decide(&logic, &status);
        assert_eq!(result.get(&Reason::Critical), Some(&110));
    }

    #[test]
    fn min_free_size_forces_high_when_no_high_band_conflict() {
        // S4: min_free_size=10, asset size=20, usage=15, free=5 < 10.
        let mut logic = basic_logic(20.0);
        logic.min_free_size = Some(10);
        let status = AssetStatus {
            size: 20,
            usage: usage(&[("usage", 15.0)]),
            strict_min: None,
            strict_max: None,
        };
        let result = decide(&logic, &status);
        assert_eq!(result.get(&Reason::High), Some(&25));
    }

    #[test]
    fn single_step_upsize_clears_high_band() {
        // S5: single_step=true, high=80%, asset size=100, usage=90.
        let mut logic = basic_logic(0.0);
        logic.step = StepRule::Single;
        let status = AssetStatus {
            size: 100,
            usage: usage(&[("usage", 90.0)]),
            strict_min: None,
            strict_max: None,
        };
        let result = decide(&logic, &status);
        assert_eq!(result.get(&Reason::High), Some(&113));
        let new_pct = usage_pct(90.0, 113);
        assert!(new_pct < 80.0);
    }

    #[test]
    fn result_never_equals_current_size() {
        let logic = basic_logic(20.0);
        let status = AssetStatus {
            size: 1024,
            usage: usage(&[("usage", 1024.0)]),
            strict_min: None,
            strict_max: None,
        };
        // Usage is at 100%, above critical (95%); target must differ from
        // current size even though clamping could otherwise collapse to it.
        let result = decide(&logic, &status);
        for (_, target) in result.iter() {
            assert_ne!(*target, status.size);
        }
    }

    #[test]
    fn zero_size_zero_usage_is_left_alone() {
        let logic = basic_logic(20.0);
        let status = AssetStatus {
            size: 0,
            usage: usage(&[("usage", 0.0)]),
            strict_min: None,
            strict_max: None,
        };
        assert!(decide(&logic, &status).is_empty());
    }

    #[test]
    fn strict_max_forces_downsize_under_low_reason() {
        let logic = basic_logic(20.0);
        let status = AssetStatus {
            size: 1000,
            usage: usage(&[("usage", 500.0)]),
            strict_min: None,
            strict_max: Some(900),
        };
        let result = decide(&logic, &status);
        assert!(result.contains_key(&Reason::Low));
        assert!(result[&Reason::Low] <= 900);
    }

    #[test]
    fn downsize_target_never_exceeds_high_threshold() {
        let logic = basic_logic(15.0);
        let status = AssetStatus {
            size: 10_000,
            usage: usage(&[("usage", 1_500.0)]),
            strict_min: None,
            strict_max: None,
        };
        if let Some(target) = decide(&logic, &status).get(&Reason::Low) {
            let pct = usage_pct(1_500.0, *target);
            assert!(pct <= 80.0 + 1e-6);
        }
    }
}
