//! Software mirror of the firmware's per-tick servo stepping.
//!
//! The controller moves every servo one degree per tick toward its (clamped)
//! target, sleeps `speed` ms after each tick, stops once every servo has
//! arrived or 180 ticks have passed, then settles for `20 * speed` ms.

use std::iter::FusedIterator;

use arm_traits::Pose;

/// Lowest angle the firmware will drive a servo to.
pub const ANGLE_MIN: i32 = 10;
/// Highest angle the firmware will drive a servo to.
pub const ANGLE_MAX: i32 = 170;
/// Upper bound on ticks per move.
pub const TICK_MAX: u32 = 180;
/// Settle delay after the tick loop, in ticks.
pub const HOLD_MULTIPLIER: u64 = 20;

#[inline]
pub fn clamp_angle(angle: i32) -> i32 {
    angle.clamp(ANGLE_MIN, ANGLE_MAX)
}

#[inline]
pub fn clamp_pose(pose: &Pose) -> Pose {
    pose.map(clamp_angle)
}

/// One tick for one servo: move a degree toward `target`, hold when equal.
#[inline]
pub fn step_angle(target: i32, current: i32) -> i32 {
    match target.cmp(&current) {
        std::cmp::Ordering::Greater => current + 1,
        std::cmp::Ordering::Less => current - 1,
        std::cmp::Ordering::Equal => current,
    }
}

/// One tick for all servos at once.
#[inline]
pub fn step_pose(target: &Pose, current: &Pose) -> Pose {
    std::array::from_fn(|i| step_angle(target[i], current[i]))
}

/// Largest per-servo travel from `current` to the clamped `target`.
fn max_distance(current: &Pose, target: &Pose) -> u64 {
    current
        .iter()
        .zip(target)
        .map(|(c, t)| u64::from(clamp_angle(*t).abs_diff(*c)))
        .max()
        .unwrap_or(0)
}

/// Wall time of one move including the settle delay.
///
/// Without poses the worst case of a full 180-tick travel is assumed.
pub fn total_duration_ms(speed_ms: u32, poses: Option<(&Pose, &Pose)>) -> u64 {
    let ticks = poses
        .map_or(u64::from(TICK_MAX), |(current, target)| {
            max_distance(current, target)
        })
        .min(u64::from(TICK_MAX));
    let speed = u64::from(speed_ms);
    speed * ticks + speed * HOLD_MULTIPLIER
}

/// Lazy `(pose, elapsed_ms)` stream of one move. See [`interpolate_poses`].
#[derive(Debug, Clone)]
pub struct PoseSequence {
    pose: Pose,
    target: Pose,
    speed_ms: u64,
    tick: u32,
    total_ms: u64,
    ticking: bool,
    finished: bool,
}

impl Iterator for PoseSequence {
    type Item = (Pose, u64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.ticking {
            self.tick += 1;
            self.pose = step_pose(&self.target, &self.pose);
            if self.pose == self.target || self.tick >= TICK_MAX {
                self.ticking = false;
            }
            return Some((self.pose, u64::from(self.tick) * self.speed_ms));
        }
        self.finished = true;
        Some((self.pose, self.total_ms))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            (0, Some(0))
        } else if self.ticking {
            let left = (TICK_MAX - self.tick) as usize;
            (2, Some(left + 1))
        } else {
            (1, Some(1))
        }
    }
}

impl FusedIterator for PoseSequence {}

/// Predicted poses of a move from `current` toward `target`.
///
/// Yields one pose per tick with `tick * speed_ms`, then a final copy of the
/// last pose stamped with [`total_duration_ms`] for the move. The sequence is
/// never longer than 181 items and never shorter than 2.
pub fn interpolate_poses(current: Pose, target: Pose, speed_ms: u32) -> PoseSequence {
    PoseSequence {
        pose: current,
        target: clamp_pose(&target),
        speed_ms: u64::from(speed_ms),
        tick: 0,
        total_ms: total_duration_ms(speed_ms, Some((&current, &target))),
        ticking: true,
        finished: false,
    }
}

/// Pose the arm is expected to hold `elapsed_ms` into a move.
///
/// Elapsed time is clamped to the move's duration; a zero speed counts as
/// fully elapsed.
pub fn predict_angle_at_time(current: Pose, target: Pose, speed_ms: u32, elapsed_ms: f64) -> Pose {
    let total = total_duration_ms(speed_ms, Some((&current, &target))) as f64;
    let elapsed = if elapsed_ms.is_nan() {
        0.0
    } else {
        elapsed_ms.clamp(0.0, total)
    };
    let ticks = if speed_ms == 0 {
        TICK_MAX
    } else {
        // bounded by TICK_MAX, so the cast cannot truncate
        (elapsed / f64::from(speed_ms))
            .floor()
            .min(f64::from(TICK_MAX)) as u32
    };

    let target = clamp_pose(&target);
    let mut pose = current;
    for _ in 0..ticks {
        if pose == target {
            break;
        }
        pose = step_pose(&target, &pose);
    }
    pose
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const HOME: Pose = [90, 90, 90, 90];

    #[rstest]
    #[case(100, 90, 91)]
    #[case(80, 90, 89)]
    #[case(90, 90, 90)]
    fn step_angle_moves_one_degree(#[case] target: i32, #[case] current: i32, #[case] want: i32) {
        assert_eq!(step_angle(target, current), want);
    }

    #[rstest]
    #[case(0, 10)]
    #[case(10, 10)]
    #[case(95, 95)]
    #[case(170, 170)]
    #[case(400, 170)]
    fn clamp_bounds(#[case] a: i32, #[case] want: i32) {
        assert_eq!(clamp_angle(a), want);
    }

    #[test]
    fn ten_degree_move() {
        let seq: Vec<_> = interpolate_poses(HOME, [100, 80, 95, 85], 10).collect();
        assert_eq!(seq.len(), 11);
        assert_eq!(seq[0], ([91, 89, 91, 89], 10));
        assert_eq!(seq[4], ([95, 85, 95, 85], 50));
        assert_eq!(seq[9], ([100, 80, 95, 85], 100));
        assert_eq!(seq[10], ([100, 80, 95, 85], 300));
    }

    #[test]
    fn out_of_range_target_is_clamped() {
        let last = interpolate_poses(HOME, [0, 180, 5, 175], 1).last();
        assert_eq!(last.map(|(p, _)| p), Some([10, 170, 10, 170]));
    }

    #[test]
    fn hold_still_yields_two_items() {
        let seq: Vec<_> = interpolate_poses(HOME, HOME, 15).collect();
        assert_eq!(seq, vec![(HOME, 15), (HOME, 300)]);
    }

    #[test]
    fn unreachable_target_stops_after_tick_max() {
        // current below the clamp floor: 200 degrees away
        let seq: Vec<_> = interpolate_poses([-30, 90, 90, 90], [170, 90, 90, 90], 2).collect();
        assert_eq!(seq.len(), 181);
        assert_eq!(seq[179], ([150, 90, 90, 90], 360));
        assert_eq!(seq[180], ([150, 90, 90, 90], 400));
    }

    #[test]
    fn sequence_is_fused() {
        let mut seq = interpolate_poses(HOME, HOME, 1);
        assert!(seq.next().is_some());
        assert!(seq.next().is_some());
        assert!(seq.next().is_none());
        assert!(seq.next().is_none());
    }

    #[test]
    fn duration_worst_case_without_poses() {
        assert_eq!(total_duration_ms(15, None), 3000);
        assert_eq!(total_duration_ms(10, Some((&HOME, &[100, 80, 95, 85]))), 300);
    }

    #[rstest]
    #[case(0.0, [90, 90, 90, 90])]
    #[case(-50.0, [90, 90, 90, 90])]
    #[case(9.9, [90, 90, 90, 90])]
    #[case(10.0, [91, 89, 91, 89])]
    #[case(55.0, [95, 85, 95, 85])]
    #[case(120.0, [100, 80, 95, 85])]
    #[case(1.0e9, [100, 80, 95, 85])]
    #[case(f64::NAN, [90, 90, 90, 90])]
    fn prediction_at_time(#[case] elapsed: f64, #[case] want: Pose) {
        assert_eq!(predict_angle_at_time(HOME, [100, 80, 95, 85], 10, elapsed), want);
    }

    #[test]
    fn zero_speed_predicts_final_pose() {
        assert_eq!(predict_angle_at_time(HOME, [0, 180, 90, 90], 0, 0.0), [10, 170, 90, 90]);
    }
}
