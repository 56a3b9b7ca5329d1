//! Post-run scoring of one repeat, plus cross-repeat repeatability.

use std::collections::BTreeMap;

use arm_traits::{Pose, SERVO_COUNT};

use crate::types::{StepResult, TestResult, Verdict, round_to};

/// More reversals than this in one repeat raise an ergonomic flag.
pub const REVERSAL_LIMIT: usize = 4;
/// Holds at least this long near the range ends raise an ergonomic flag.
pub const EXTREME_HOLD_MS: u64 = 3000;
/// Comfortable angle band for long holds.
pub const COMFORT_MIN: i32 = 20;
pub const COMFORT_MAX: i32 = 160;
/// Divergence above this many percent fails the repeat.
pub const DIVERGENCE_FAIL_PCT: f64 = 10.0;
/// Relative timing drift above this warns.
pub const DRIFT_WARN_RATIO: f64 = 0.2;

/// Percent of the 0..180 range each servo's targets span, to one decimal.
pub fn range_coverage(steps: &[StepResult]) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    if steps.is_empty() {
        return out;
    }
    for servo in 0..SERVO_COUNT {
        let angles = steps.iter().map(|s| s.target_angles[servo]);
        let lo = angles.clone().min().unwrap_or(0);
        let hi = angles.max().unwrap_or(0);
        let span = f64::from(hi) - f64::from(lo);
        out.insert(format!("servo{}", servo + 1), round_to(span / 180.0 * 100.0, 1));
    }
    out
}

/// Direction changes in the target sequence, summed over servos.
///
/// A reversal needs two consecutive non-zero deltas of opposite sign.
pub fn count_reversals(steps: &[StepResult]) -> usize {
    let targets: Vec<&Pose> = steps.iter().map(|s| &s.target_angles).collect();
    let mut count = 0;
    for window in targets.windows(3) {
        let [a, b, c] = [window[0], window[1], window[2]];
        for servo in 0..SERVO_COUNT {
            let prev = i64::from(b[servo]) - i64::from(a[servo]);
            let next = i64::from(c[servo]) - i64::from(b[servo]);
            if prev != 0 && next != 0 && (prev > 0) != (next > 0) {
                count += 1;
            }
        }
    }
    count
}

pub fn ergonomic_flags(steps: &[StepResult]) -> Vec<String> {
    let mut flags = Vec::new();
    let reversals = count_reversals(steps);
    if reversals > REVERSAL_LIMIT {
        flags.push(format!("sharp_reversals:{reversals}"));
    }
    for s in steps {
        let strained = s
            .target_angles
            .iter()
            .any(|a| !(COMFORT_MIN..=COMFORT_MAX).contains(a));
        if s.hold_ms >= EXTREME_HOLD_MS && strained {
            flags.push(format!("extreme_hold:{}", s.label));
        }
    }
    flags
}

/// Mean absolute deviation of step targets from the designed path, as a
/// percent of the full range, to two decimals. Extra entries on either side
/// are ignored.
pub fn path_divergence(designed: Option<&[Pose]>, steps: &[StepResult]) -> f64 {
    let Some(designed) = designed else {
        return 0.0;
    };
    let comparisons = designed.len().min(steps.len());
    if comparisons == 0 {
        return 0.0;
    }
    let total: u64 = designed
        .iter()
        .zip(steps)
        .flat_map(|(d, s)| d.iter().zip(&s.target_angles).map(|(a, b)| u64::from(a.abs_diff(*b))))
        .sum();
    let max_possible = (comparisons * SERVO_COUNT * 180) as f64;
    round_to(total as f64 / max_possible * 100.0, 2)
}

/// Relative drift per step; steps with no planned time are left out.
pub fn timing_drifts(steps: &[StepResult]) -> Vec<f64> {
    steps
        .iter()
        .filter(|s| s.planned_duration_ms > 0)
        .map(|s| {
            let planned = s.planned_duration_ms as f64;
            (s.actual_duration_ms - planned).abs() / planned
        })
        .collect()
}

/// Ergonomics warn, divergence fails, drift only warns a clean repeat.
pub fn verdict(flags: &[String], divergence: f64, drifts: &[f64]) -> Verdict {
    let mut v = Verdict::Pass;
    if !flags.is_empty() {
        v = Verdict::Warning;
    }
    if divergence > DIVERGENCE_FAIL_PCT {
        v = Verdict::Fail;
    }
    if v == Verdict::Pass && drifts.iter().any(|d| *d > DRIFT_WARN_RATIO) {
        v = Verdict::Warning;
    }
    v
}

/// Fill coverage, flags, divergence and verdict. A repeat without steps is
/// left untouched.
pub fn compute_metrics(result: &mut TestResult, designed_path: Option<&[Pose]>) {
    if result.steps.is_empty() {
        return;
    }
    result.range_coverage = range_coverage(&result.steps);
    result.ergonomic_flags = ergonomic_flags(&result.steps);
    result.path_divergence = path_divergence(designed_path, &result.steps);
    let drifts = timing_drifts(&result.steps);
    result.verdict = verdict(&result.ergonomic_flags, result.path_divergence, &drifts);
}

/// Mean population standard deviation of end angles across repeats, per
/// (step, servo), to two decimals. Zero with fewer than two repeats.
pub fn repeatability(results: &[TestResult]) -> f64 {
    if results.len() < 2 {
        return 0.0;
    }
    let step_count = results.iter().map(|r| r.steps.len()).min().unwrap_or(0);
    let n = results.len() as f64;
    let mut deviations = Vec::with_capacity(step_count * SERVO_COUNT);
    for step in 0..step_count {
        for servo in 0..SERVO_COUNT {
            let values: Vec<f64> = results
                .iter()
                .map(|r| f64::from(r.steps[step].actual_end_angles[servo]))
                .collect();
            let mean = values.iter().sum::<f64>() / n;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            deviations.push(variance.sqrt());
        }
    }
    if deviations.is_empty() {
        return 0.0;
    }
    round_to(deviations.iter().sum::<f64>() / deviations.len() as f64, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn step(target: Pose, hold_ms: u64, label: &str) -> StepResult {
        StepResult {
            label: label.to_string(),
            target_angles: target,
            actual_start_angles: target,
            actual_end_angles: target,
            planned_duration_ms: 1000,
            actual_duration_ms: 1000.0,
            hold_ms,
        }
    }

    fn targets(ts: &[Pose]) -> Vec<StepResult> {
        ts.iter().map(|t| step(*t, 0, "s")).collect()
    }

    #[test]
    fn coverage_uses_targets() {
        let steps = targets(&[[10, 90, 90, 0], [100, 90, 45, 180]]);
        let cov = range_coverage(&steps);
        assert_eq!(cov["servo1"], 50.0);
        assert_eq!(cov["servo2"], 0.0);
        assert_eq!(cov["servo3"], 25.0);
        assert_eq!(cov["servo4"], 100.0);
        assert_eq!(cov.len(), 4);
    }

    #[test]
    fn coverage_rounds_to_one_decimal() {
        let cov = range_coverage(&targets(&[[0, 0, 0, 0], [1, 2, 3, 4]]));
        assert_eq!(cov["servo1"], 0.6);
        assert_eq!(cov["servo3"], 1.7);
    }

    #[rstest]
    // zig-zag on one servo: 3 reversals
    #[case(&[[90, 90, 90, 90], [100, 90, 90, 90], [80, 90, 90, 90], [100, 90, 90, 90], [80, 90, 90, 90]], 3)]
    // flat segment between moves breaks the window
    #[case(&[[90, 90, 90, 90], [100, 90, 90, 90], [100, 90, 90, 90], [80, 90, 90, 90]], 0)]
    // monotonic
    #[case(&[[10, 10, 10, 10], [20, 20, 20, 20], [30, 30, 30, 30]], 0)]
    // all four servos reverse once
    #[case(&[[90, 90, 90, 90], [100, 80, 100, 80], [90, 90, 90, 90]], 4)]
    fn reversal_counting(#[case] ts: &[Pose], #[case] want: usize) {
        assert_eq!(count_reversals(&targets(ts)), want);
    }

    #[test]
    fn extreme_unclamped_targets_do_not_overflow() {
        let steps = targets(&[
            [i32::MIN, 90, 90, 90],
            [i32::MAX, 90, 90, 90],
            [i32::MIN, 90, 90, 90],
        ]);
        assert_eq!(count_reversals(&steps), 1);
        let cov = range_coverage(&steps);
        let expected = round_to(f64::from(u32::MAX) / 180.0 * 100.0, 1);
        assert_eq!(cov["servo1"], expected);
        assert_eq!(cov["servo2"], 0.0);
    }

    #[test]
    fn sharp_reversals_flag_above_limit() {
        let steps = targets(&[
            [90, 90, 90, 90],
            [100, 80, 100, 80],
            [90, 90, 90, 90],
            [100, 90, 90, 90],
        ]);
        assert_eq!(count_reversals(&steps), 5);
        assert_eq!(ergonomic_flags(&steps), vec!["sharp_reversals:5".to_string()]);

        let four = targets(&[[90, 90, 90, 90], [100, 80, 100, 80], [90, 90, 90, 90]]);
        assert!(ergonomic_flags(&four).is_empty());
    }

    #[rstest]
    #[case(3000, [15, 90, 90, 90], true)]
    #[case(3000, [90, 90, 90, 161], true)]
    #[case(2999, [15, 90, 90, 90], false)]
    #[case(5000, [20, 160, 90, 90], false)]
    fn extreme_hold(#[case] hold: u64, #[case] target: Pose, #[case] flagged: bool) {
        let flags = ergonomic_flags(&[step(target, hold, "squeeze")]);
        assert_eq!(flags == vec!["extreme_hold:squeeze".to_string()], flagged);
        assert_eq!(flags.is_empty(), !flagged);
    }

    #[test]
    fn divergence_truncates_to_shorter_path() {
        let steps = targets(&[[90, 90, 90, 90], [100, 100, 100, 100]]);
        let designed = [[90, 90, 90, 90], [90, 90, 90, 90], [0, 0, 0, 0]];
        // 40 degrees off over 2 * 4 * 180
        assert_eq!(path_divergence(Some(&designed[..]), &steps), 2.78);
        assert_eq!(path_divergence(None, &steps), 0.0);
        assert_eq!(path_divergence(Some(&[][..]), &steps), 0.0);
    }

    #[test]
    fn drift_skips_zero_planned() {
        let mut a = step([90; 4], 0, "a");
        a.planned_duration_ms = 0;
        a.actual_duration_ms = 50.0;
        let mut b = step([90; 4], 0, "b");
        b.actual_duration_ms = 1300.0;
        let drifts = timing_drifts(&[a, b]);
        assert_eq!(drifts.len(), 1);
        assert!((drifts[0] - 0.3).abs() < 1e-9);
    }

    #[rstest]
    #[case(&[], 0.0, &[], Verdict::Pass)]
    #[case(&["sharp_reversals:5"], 0.0, &[], Verdict::Warning)]
    #[case(&["sharp_reversals:5"], 15.0, &[], Verdict::Fail)]
    #[case(&[], 15.0, &[0.5], Verdict::Fail)]
    #[case(&[], 10.0, &[0.21], Verdict::Warning)]
    #[case(&[], 0.0, &[0.2], Verdict::Pass)]
    #[case(&["extreme_hold:x"], 0.0, &[0.9], Verdict::Warning)]
    fn verdict_precedence(
        #[case] flags: &[&str],
        #[case] divergence: f64,
        #[case] drifts: &[f64],
        #[case] want: Verdict,
    ) {
        let flags: Vec<String> = flags.iter().map(|s| s.to_string()).collect();
        assert_eq!(verdict(&flags, divergence, drifts), want);
    }

    #[test]
    fn empty_repeat_keeps_defaults() {
        let mut r = TestResult::new("t", 0);
        compute_metrics(&mut r, Some(&[[0, 0, 0, 0]][..]));
        assert!(r.range_coverage.is_empty());
        assert_eq!(r.verdict, Verdict::Pass);
        assert_eq!(r.path_divergence, 0.0);
    }

    fn repeat_with_ends(ends: &[Pose]) -> TestResult {
        let mut r = TestResult::new("t", 0);
        for e in ends {
            let mut s = step([90; 4], 0, "s");
            s.actual_end_angles = *e;
            r.steps.push(s);
        }
        r
    }

    #[test]
    fn repeatability_single_repeat_is_zero() {
        assert_eq!(repeatability(&[repeat_with_ends(&[[90, 90, 90, 90]])]), 0.0);
        assert_eq!(repeatability(&[]), 0.0);
    }

    #[test]
    fn repeatability_is_mean_population_std_dev() {
        let a = repeat_with_ends(&[[90, 90, 90, 90], [100, 100, 100, 100]]);
        let b = repeat_with_ends(&[[92, 90, 90, 90], [100, 100, 100, 100]]);
        // one (step, servo) pair with std-dev 1 among 8
        assert_eq!(repeatability(&[a, b]), 0.13);
    }

    #[test]
    fn repeatability_uses_shortest_repeat() {
        let a = repeat_with_ends(&[[90, 90, 90, 90], [10, 10, 10, 10]]);
        let b = repeat_with_ends(&[[90, 90, 90, 90]]);
        assert_eq!(repeatability(&[a, b]), 0.0);
    }
}
