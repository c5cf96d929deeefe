//! Per-order phase accumulators.
//!
//! Durations are whole seconds. They only grow while an order is active and
//! are replaced by [`PhaseAccumulators::default`] when a new order starts.
//! At each transition the unfolded remainder of a second stays with the
//! next phase, so the sum keeps tracking wall-clock time.

use std::ops::Add;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::phase::Phase;
use crate::phase_timer::elapsed_secs;
use crate::types::Timestamp;

/// Time spent in setup, running and stopped for the current order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhaseAccumulators {
    pub setup_secs: u64,
    pub run_secs: u64,
    pub stop_secs: u64,
}

impl PhaseAccumulators {
    pub fn new(setup_secs: u64, run_secs: u64, stop_secs: u64) -> Self {
        Self {
            setup_secs,
            run_secs,
            stop_secs,
        }
    }

    /// Add `secs` to the accumulator tracking `phase`.
    ///
    /// Phases without an accumulator (idle, suspended, finished) are ignored.
    pub fn fold(&mut self, phase: Phase, secs: u64) {
        match phase {
            Phase::Setup => self.setup_secs = self.setup_secs.saturating_add(secs),
            Phase::Running => self.run_secs = self.run_secs.saturating_add(secs),
            Phase::Stopped => self.stop_secs = self.stop_secs.saturating_add(secs),
            Phase::Idle | Phase::Suspended | Phase::Finished => {}
        }
    }

    /// Fold the time elapsed since `since` into the accumulator of `phase`.
    ///
    /// Returns the number of seconds that were added. A missing base
    /// timestamp adds nothing.
    pub fn fold_elapsed(&mut self, phase: Phase, since: Option<Timestamp>, now: Timestamp) -> u64 {
        let secs = since.map(|base| elapsed_secs(base, now)).unwrap_or(0);
        self.fold(phase, secs);
        secs
    }

    /// Fold the time spent in `phase` since `since` and return the base the
    /// next phase counts from.
    ///
    /// Only whole seconds are folded. The returned base is `since` moved
    /// forward by exactly those seconds, so the sub-second remainder carries
    /// over into the next phase. Without a base, or with one ahead of `now`,
    /// the next phase starts at `now`.
    pub fn close_phase(
        &mut self,
        phase: Phase,
        since: Option<Timestamp>,
        now: Timestamp,
    ) -> Timestamp {
        match since {
            Some(base) if base <= now => {
                let secs = self.fold_elapsed(phase, Some(base), now);
                base + Duration::seconds(secs as i64)
            }
            _ => now,
        }
    }

    /// Accumulated value for `phase`, zero for phases without one.
    pub fn get(&self, phase: Phase) -> u64 {
        match phase {
            Phase::Setup => self.setup_secs,
            Phase::Running => self.run_secs,
            Phase::Stopped => self.stop_secs,
            Phase::Idle | Phase::Suspended | Phase::Finished => 0,
        }
    }

    pub fn total(&self) -> u64 {
        self.setup_secs
            .saturating_add(self.run_secs)
            .saturating_add(self.stop_secs)
    }

    /// True when no accumulator of `self` is below the matching one of
    /// `earlier`.
    pub fn dominates(&self, earlier: &PhaseAccumulators) -> bool {
        self.setup_secs >= earlier.setup_secs
            && self.run_secs >= earlier.run_secs
            && self.stop_secs >= earlier.stop_secs
    }
}

impl Add for PhaseAccumulators {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            setup_secs: self.setup_secs.saturating_add(rhs.setup_secs),
            run_secs: self.run_secs.saturating_add(rhs.run_secs),
            stop_secs: self.stop_secs.saturating_add(rhs.stop_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).unwrap()
    }

    #[test]
    fn fold_routes_to_matching_accumulator() {
        let mut acc = PhaseAccumulators::default();
        acc.fold(Phase::Setup, 30);
        acc.fold(Phase::Running, 90);
        acc.fold(Phase::Stopped, 10);
        assert_eq!(acc, PhaseAccumulators::new(30, 90, 10));
        assert_eq!(acc.total(), 130);
    }

    #[test]
    fn fold_ignores_phases_without_accumulator() {
        let mut acc = PhaseAccumulators::new(1, 2, 3);
        acc.fold(Phase::Idle, 100);
        acc.fold(Phase::Finished, 100);
        assert_eq!(acc, PhaseAccumulators::new(1, 2, 3));
    }

    #[test]
    fn fold_elapsed_floors_to_whole_seconds() {
        let mut acc = PhaseAccumulators::default();
        let added = acc.fold_elapsed(
            Phase::Running,
            Some(t0()),
            t0() + Duration::milliseconds(4_999),
        );
        assert_eq!(added, 4);
        assert_eq!(acc.run_secs, 4);
    }

    #[test]
    fn fold_elapsed_with_base_in_the_future_adds_nothing() {
        let mut acc = PhaseAccumulators::new(5, 5, 5);
        acc.fold_elapsed(Phase::Setup, Some(t0() + Duration::seconds(60)), t0());
        assert_eq!(acc.setup_secs, 5);
    }

    #[test]
    fn fold_elapsed_without_base_adds_nothing() {
        let mut acc = PhaseAccumulators::default();
        assert_eq!(acc.fold_elapsed(Phase::Running, None, t0()), 0);
    }

    #[test]
    fn close_phase_carries_the_sub_second_remainder() {
        let mut acc = PhaseAccumulators::default();
        let now = t0() + Duration::milliseconds(30_900);

        let next = acc.close_phase(Phase::Setup, Some(t0()), now);

        assert_eq!(acc.setup_secs, 30);
        assert_eq!(next, t0() + Duration::seconds(30));
        assert_eq!(next, now - Duration::milliseconds(900));
    }

    #[test]
    fn close_phase_without_usable_base_starts_now() {
        let mut acc = PhaseAccumulators::default();
        assert_eq!(acc.close_phase(Phase::Running, None, t0()), t0());

        let ahead = t0() + Duration::seconds(5);
        assert_eq!(acc.close_phase(Phase::Running, Some(ahead), t0()), t0());
        assert_eq!(acc, PhaseAccumulators::default());
    }

    #[test]
    fn add_sums_each_phase() {
        let sum = PhaseAccumulators::new(10, 100, 0) + PhaseAccumulators::new(2, 5, 1);
        assert_eq!(sum, PhaseAccumulators::new(12, 105, 1));
    }

    #[test]
    fn dominates_detects_decrease() {
        let earlier = PhaseAccumulators::new(10, 10, 10);
        assert!(PhaseAccumulators::new(10, 11, 10).dominates(&earlier));
        assert!(!PhaseAccumulators::new(9, 20, 20).dominates(&earlier));
    }
}
