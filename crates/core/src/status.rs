//! Machine, production-order and production-log status values.
//!
//! The string forms match the values stored in the `machines.status`,
//! `production_orders.status` and `production_logs.kind` text columns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Machine status
// ---------------------------------------------------------------------------

/// Operational status of a machine as recorded in the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineStatus {
    Available,
    Setup,
    Running,
    Stopped,
    Suspended,
    Maintenance,
    InUse,
}

impl MachineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Setup => "SETUP",
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
            Self::Suspended => "SUSPENDED",
            Self::Maintenance => "MAINTENANCE",
            Self::InUse => "IN_USE",
        }
    }

    /// Statuses that only make sense while an order is attached.
    pub fn requires_order(self) -> bool {
        matches!(self, Self::Setup | Self::Running | Self::Stopped)
    }
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(Self::Available),
            "SETUP" => Ok(Self::Setup),
            "RUNNING" => Ok(Self::Running),
            "STOPPED" => Ok(Self::Stopped),
            "SUSPENDED" => Ok(Self::Suspended),
            "MAINTENANCE" => Ok(Self::Maintenance),
            "IN_USE" => Ok(Self::InUse),
            other => Err(CoreError::Validation(format!(
                "Unknown machine status: '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Order status
// ---------------------------------------------------------------------------

/// Lifecycle status of a production order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    InProgress,
    Suspended,
    Finished,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Suspended => "SUSPENDED",
            Self::Finished => "FINISHED",
        }
    }

    pub fn is_finished(self) -> bool {
        self == Self::Finished
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "SUSPENDED" => Ok(Self::Suspended),
            "FINISHED" => Ok(Self::Finished),
            other => Err(CoreError::Validation(format!(
                "Unknown order status: '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Production log kind
// ---------------------------------------------------------------------------

/// What produced a production-log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductionLogKind {
    /// Quantity declared by the operator during the run.
    Manual,
    /// Quantity pushed by a machine counter.
    Sensor,
    /// Remainder logged when the order is finalized.
    Finalization,
    /// Remainder logged when the order is parked.
    Suspension,
    /// Partial hand-off to the next process step.
    Transfer,
}

impl ProductionLogKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "MANUAL",
            Self::Sensor => "SENSOR",
            Self::Finalization => "FINALIZATION",
            Self::Suspension => "SUSPENSION",
            Self::Transfer => "TRANSFER",
        }
    }

    /// Kinds that move the live counters of the active order when another
    /// client records them. Closing kinds are followed by a counter reset.
    pub fn counts_toward_active_order(self) -> bool {
        matches!(self, Self::Manual | Self::Sensor)
    }
}

impl fmt::Display for ProductionLogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductionLogKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MANUAL" => Ok(Self::Manual),
            "SENSOR" => Ok(Self::Sensor),
            "FINALIZATION" => Ok(Self::Finalization),
            "SUSPENSION" => Ok(Self::Suspension),
            "TRANSFER" => Ok(Self::Transfer),
            other => Err(CoreError::Validation(format!(
                "Unknown production log kind: '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_status_string_forms_parse_back() {
        for status in [
            MachineStatus::Available,
            MachineStatus::Setup,
            MachineStatus::Running,
            MachineStatus::Stopped,
            MachineStatus::Suspended,
            MachineStatus::Maintenance,
            MachineStatus::InUse,
        ] {
            assert_eq!(status.as_str().parse::<MachineStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_machine_status_is_rejected() {
        let err = "BROKEN".parse::<MachineStatus>().unwrap_err();
        assert!(err.to_string().contains("BROKEN"));
    }

    #[test]
    fn only_active_statuses_require_an_order() {
        assert!(MachineStatus::Setup.requires_order());
        assert!(MachineStatus::Running.requires_order());
        assert!(MachineStatus::Stopped.requires_order());
        assert!(!MachineStatus::Available.requires_order());
        assert!(!MachineStatus::Maintenance.requires_order());
    }

    #[test]
    fn serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&OrderStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
        let json = serde_json::to_string(&MachineStatus::InUse).unwrap();
        assert_eq!(json, "\"IN_USE\"");
    }

    #[test]
    fn closing_log_kinds_do_not_move_counters() {
        assert!(ProductionLogKind::Manual.counts_toward_active_order());
        assert!(ProductionLogKind::Sensor.counts_toward_active_order());
        assert!(!ProductionLogKind::Finalization.counts_toward_active_order());
        assert!(!ProductionLogKind::Transfer.counts_toward_active_order());
    }
}
