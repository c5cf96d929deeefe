//! Operator-machine assignment model.

use mes_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `operator_assignments` table. Open while `ended_at` is
/// null.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct OperatorAssignment {
    pub id: DbId,
    pub operator_id: DbId,
    pub machine_id: DbId,
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
}
