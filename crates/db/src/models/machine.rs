//! Machine entity model and status update DTO.

use mes_core::client_state::MachineSnapshot;
use mes_core::error::CoreError;
use mes_core::status::MachineStatus;
use mes_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `machines` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Machine {
    pub id: DbId,
    pub name: String,
    pub sector: Option<String>,
    pub status: String,
    pub status_changed_at: Option<Timestamp>,
    pub current_order_id: Option<DbId>,
    pub operator_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Machine {
    pub fn status(&self) -> Result<MachineStatus, CoreError> {
        self.status.parse()
    }

    /// Convert the row into the snapshot kept by the client state store.
    pub fn snapshot(&self) -> Result<MachineSnapshot, CoreError> {
        Ok(MachineSnapshot {
            id: self.id,
            name: self.name.clone(),
            sector: self.sector.clone(),
            status: self.status()?,
            status_changed_at: self.status_changed_at,
            current_order_id: self.current_order_id,
            operator_id: self.operator_id,
        })
    }
}

/// DTO for a status change. The operator association is never touched by
/// a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MachineStatusUpdate {
    pub status: MachineStatus,
    /// `None` clears the current order.
    pub order_id: Option<DbId>,
    pub changed_at: Timestamp,
}

impl MachineStatusUpdate {
    pub fn new(status: MachineStatus, order_id: Option<DbId>, changed_at: Timestamp) -> Self {
        Self {
            status,
            order_id,
            changed_at,
        }
    }

    /// Release the machine: `AVAILABLE`, no order, operator preserved.
    pub fn released(changed_at: Timestamp) -> Self {
        Self::new(MachineStatus::Available, None, changed_at)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn row(status: &str) -> Machine {
        Machine {
            id: 1,
            name: "Press 1".into(),
            sector: Some("Stamping".into()),
            status: status.into(),
            status_changed_at: None,
            current_order_id: Some(4),
            operator_id: Some(9),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn snapshot_carries_status_and_associations() {
        let snapshot = row("RUNNING").snapshot().unwrap();
        assert_eq!(snapshot.status, MachineStatus::Running);
        assert_eq!(snapshot.current_order_id, Some(4));
        assert_eq!(snapshot.operator_id, Some(9));
    }

    #[test]
    fn snapshot_rejects_unknown_status() {
        assert!(row("ON_FIRE").snapshot().is_err());
    }
}
