//! Local operational phase of a machine/order pairing and its state machine.
//!
//! ```text
//! IDLE -> SETUP -> RUNNING -> { STOPPED | SUSPENDED | FINISHED }
//!           ^         ^          |
//!           +---------+----------+   (resume returns to the pre-stop phase)
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::status::MachineStatus;

/// Operational phase observed by the station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// No order on the machine.
    #[default]
    Idle,
    Setup,
    Running,
    Stopped,
    Suspended,
    Finished,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Setup => "SETUP",
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
            Self::Suspended => "SUSPENDED",
            Self::Finished => "FINISHED",
        }
    }

    /// Phases with a running clock and an order attached.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Setup | Self::Running | Self::Stopped)
    }

    /// Phases a stop can be registered from, and resumed back into.
    pub fn is_resumable(self) -> bool {
        matches!(self, Self::Setup | Self::Running)
    }

    /// Returns the set of phases reachable from `self`.
    ///
    /// `Idle` is reachable from every active phase because a transfer or a
    /// self-heal releases the machine without finishing the order.
    pub fn valid_transitions(self) -> &'static [Phase] {
        match self {
            Self::Idle => &[Self::Setup],
            Self::Setup => &[
                Self::Running,
                Self::Stopped,
                Self::Suspended,
                Self::Finished,
                Self::Idle,
            ],
            Self::Running => &[Self::Stopped, Self::Suspended, Self::Finished, Self::Idle],
            Self::Stopped => &[
                Self::Setup,
                Self::Running,
                Self::Suspended,
                Self::Finished,
                Self::Idle,
            ],
            Self::Suspended => &[Self::Idle, Self::Setup],
            Self::Finished => &[Self::Idle, Self::Setup],
        }
    }

    pub fn can_transition(self, to: Phase) -> bool {
        self.valid_transitions().contains(&to)
    }

    /// Validate a transition, returning a `CoreError::Validation` for
    /// invalid ones.
    pub fn validate_transition(self, to: Phase) -> Result<(), CoreError> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err(CoreError::Validation(format!(
                "Invalid phase transition: {self} -> {to}"
            )))
        }
    }

    /// Machine status written to the remote store while in this phase.
    pub fn machine_status(self) -> MachineStatus {
        match self {
            Self::Setup => MachineStatus::Setup,
            Self::Running => MachineStatus::Running,
            Self::Stopped => MachineStatus::Stopped,
            Self::Idle | Self::Suspended | Self::Finished => MachineStatus::Available,
        }
    }

    /// Local phase implied by a machine status read from the remote store.
    pub fn from_machine_status(status: MachineStatus) -> Self {
        match status {
            MachineStatus::Setup => Self::Setup,
            MachineStatus::Running => Self::Running,
            MachineStatus::Stopped => Self::Stopped,
            MachineStatus::Suspended => Self::Suspended,
            MachineStatus::Available | MachineStatus::Maintenance | MachineStatus::InUse => {
                Self::Idle
            }
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Phase {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IDLE" => Ok(Self::Idle),
            "SETUP" => Ok(Self::Setup),
            "RUNNING" => Ok(Self::Running),
            "STOPPED" => Ok(Self::Stopped),
            "SUSPENDED" => Ok(Self::Suspended),
            "FINISHED" => Ok(Self::Finished),
            other => Err(CoreError::Validation(format!("Unknown phase: '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Valid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn idle_to_setup() {
        assert!(Phase::Idle.can_transition(Phase::Setup));
    }

    #[test]
    fn setup_to_running() {
        assert!(Phase::Setup.can_transition(Phase::Running));
    }

    #[test]
    fn running_to_stopped() {
        assert!(Phase::Running.can_transition(Phase::Stopped));
    }

    #[test]
    fn stopped_resumes_to_either_pre_stop_phase() {
        assert!(Phase::Stopped.can_transition(Phase::Setup));
        assert!(Phase::Stopped.can_transition(Phase::Running));
    }

    #[test]
    fn finished_can_advance_to_next_setup() {
        assert!(Phase::Finished.can_transition(Phase::Setup));
    }

    // -----------------------------------------------------------------------
    // Invalid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn idle_cannot_start_running() {
        assert!(!Phase::Idle.can_transition(Phase::Running));
    }

    #[test]
    fn idle_cannot_stop() {
        assert!(!Phase::Idle.can_transition(Phase::Stopped));
    }

    #[test]
    fn running_cannot_go_back_to_setup() {
        assert!(!Phase::Running.can_transition(Phase::Setup));
    }

    #[test]
    fn validate_transition_names_both_phases() {
        let err = Phase::Idle.validate_transition(Phase::Finished).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("IDLE"));
        assert!(msg.contains("FINISHED"));
    }

    // -----------------------------------------------------------------------
    // Status mapping
    // -----------------------------------------------------------------------

    #[test]
    fn released_phases_map_to_available() {
        assert_eq!(Phase::Idle.machine_status(), MachineStatus::Available);
        assert_eq!(Phase::Suspended.machine_status(), MachineStatus::Available);
        assert_eq!(Phase::Finished.machine_status(), MachineStatus::Available);
    }

    #[test]
    fn active_phases_round_trip_through_machine_status() {
        for phase in [Phase::Setup, Phase::Running, Phase::Stopped] {
            assert_eq!(Phase::from_machine_status(phase.machine_status()), phase);
        }
    }

    #[test]
    fn maintenance_is_observed_as_idle() {
        assert_eq!(
            Phase::from_machine_status(MachineStatus::Maintenance),
            Phase::Idle
        );
    }

    #[test]
    fn labels_parse_back() {
        assert_eq!("STOPPED".parse::<Phase>().unwrap(), Phase::Stopped);
        assert_eq!(Phase::Setup.label().parse::<Phase>().unwrap(), Phase::Setup);
        assert!("running".parse::<Phase>().is_err());
    }
}
