//! Live timer for the current phase.
//!
//! The base of the timer is the phase-change timestamp recorded in the
//! remote store. When an operator joins a machine that is already running,
//! the operator's session start takes over so the display reflects their own
//! session.

use serde::Serialize;

use crate::accumulators::PhaseAccumulators;
use crate::phase::Phase;
use crate::types::Timestamp;

/// Whole seconds between `since` and `now`, floored and clamped at zero.
pub fn elapsed_secs(since: Timestamp, now: Timestamp) -> u64 {
    let millis = (now - since).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis / 1000) as u64
    }
}

/// Format seconds as `HH:MM:SS`. Hours are not capped at 24.
pub fn format_hms(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Pick the timestamp the live timer counts from.
///
/// The operator session start only wins while the phase is `Running` and
/// when it is later than the phase-change timestamp. Without a phase-change
/// timestamp there is no base at all.
pub fn timer_base(
    phase: Phase,
    phase_changed_at: Option<Timestamp>,
    session_started_at: Option<Timestamp>,
) -> Option<Timestamp> {
    match (phase, phase_changed_at, session_started_at) {
        (Phase::Running, Some(changed), Some(session)) if session > changed => Some(session),
        (_, changed, _) => changed,
    }
}

/// Live `HH:MM:SS` for the current phase, or `None` when nothing is being
/// measured.
pub fn live_timer(
    phase: Phase,
    phase_changed_at: Option<Timestamp>,
    session_started_at: Option<Timestamp>,
    now: Timestamp,
) -> Option<String> {
    if !phase.is_active() {
        return None;
    }
    let secs = timer_base(phase, phase_changed_at, session_started_at)
        .map(|base| elapsed_secs(base, now))
        .unwrap_or(0);
    Some(format_hms(secs))
}

/// What the station shows for one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimerDisplay {
    pub phase: Phase,
    /// `None` while idle.
    pub current: Option<String>,
    pub setup_total: String,
    pub run_total: String,
    pub stop_total: String,
}

impl TimerDisplay {
    /// Build the display from stored accumulators and the live timer.
    ///
    /// Totals are the stored accumulators; the live elapsed time is only
    /// folded in by the controller at a transition.
    pub fn compute(
        phase: Phase,
        phase_changed_at: Option<Timestamp>,
        session_started_at: Option<Timestamp>,
        accumulated: &PhaseAccumulators,
        now: Timestamp,
    ) -> Self {
        Self {
            phase,
            current: live_timer(phase, phase_changed_at, session_started_at, now),
            setup_total: format_hms(accumulated.setup_secs),
            run_total: format_hms(accumulated.run_secs),
            stop_total: format_hms(accumulated.stop_secs),
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

    // -- format_hms --

    #[test]
    fn format_zero() {
        assert_eq!(format_hms(0), "00:00:00");
    }

    #[test]
    fn format_pads_each_field() {
        assert_eq!(format_hms(3_723), "01:02:03");
    }

    #[test]
    fn format_does_not_wrap_at_24_hours() {
        assert_eq!(format_hms(100 * 3600 + 59), "100:00:59");
    }

    // -- elapsed_secs --

    #[test]
    fn elapsed_floors_partial_seconds() {
        assert_eq!(elapsed_secs(t0(), t0() + Duration::milliseconds(1_999)), 1);
    }

    #[test]
    fn elapsed_clamps_negative_to_zero() {
        assert_eq!(elapsed_secs(t0() + Duration::seconds(5), t0()), 0);
    }

    // -- timer_base --

    #[test]
    fn session_start_wins_when_later_and_running() {
        let session = t0() + Duration::seconds(600);
        assert_eq!(
            timer_base(Phase::Running, Some(t0()), Some(session)),
            Some(session)
        );
    }

    #[test]
    fn session_start_ignored_outside_running() {
        let session = t0() + Duration::seconds(600);
        assert_eq!(timer_base(Phase::Setup, Some(t0()), Some(session)), Some(t0()));
    }

    #[test]
    fn earlier_session_start_is_ignored() {
        let session = t0() - Duration::seconds(600);
        assert_eq!(
            timer_base(Phase::Running, Some(t0()), Some(session)),
            Some(t0())
        );
    }

    #[test]
    fn session_start_alone_is_not_a_base() {
        assert_eq!(timer_base(Phase::Running, None, Some(t0())), None);
    }

    // -- live_timer --

    #[test]
    fn idle_suppresses_timer() {
        assert_eq!(live_timer(Phase::Idle, Some(t0()), None, t0()), None);
    }

    #[test]
    fn missing_timestamp_shows_zeroed_timer() {
        assert_eq!(
            live_timer(Phase::Setup, None, None, t0()),
            Some("00:00:00".to_string())
        );
    }

    #[test]
    fn missing_timestamp_shows_zeroed_timer_despite_operator_session() {
        assert_eq!(
            live_timer(Phase::Running, None, Some(t0()), t0() + Duration::seconds(90)),
            Some("00:00:00".to_string())
        );
    }

    #[test]
    fn running_timer_counts_from_phase_change() {
        let now = t0() + Duration::seconds(3_661);
        assert_eq!(
            live_timer(Phase::Running, Some(t0()), None, now),
            Some("01:01:01".to_string())
        );
    }

    #[test]
    fn display_uses_stored_accumulators_for_totals() {
        let acc = PhaseAccumulators::new(30, 90, 10);
        let display = TimerDisplay::compute(
            Phase::Running,
            Some(t0()),
            None,
            &acc,
            t0() + Duration::seconds(5),
        );
        assert_eq!(display.current.as_deref(), Some("00:00:05"));
        assert_eq!(display.setup_total, "00:00:30");
        assert_eq!(display.run_total, "00:01:30");
        assert_eq!(display.stop_total, "00:00:10");
    }
}
