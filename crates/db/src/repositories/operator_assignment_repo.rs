//! Repository for the `operator_assignments` table.

use mes_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::operator_assignment::OperatorAssignment;

/// Column list for `operator_assignments` queries.
const COLUMNS: &str = "id, operator_id, machine_id, started_at, ended_at";

/// Provides open/close operations for operator-machine assignments.
pub struct OperatorAssignmentRepo;

impl OperatorAssignmentRepo {
    /// Open an assignment of `operator_id` to `machine_id`.
    pub async fn open(
        pool: &PgPool,
        operator_id: DbId,
        machine_id: DbId,
        started_at: Timestamp,
    ) -> Result<OperatorAssignment, sqlx::Error> {
        let query = format!(
            "INSERT INTO operator_assignments (operator_id, machine_id, started_at) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OperatorAssignment>(&query)
            .bind(operator_id)
            .bind(machine_id)
            .bind(started_at)
            .fetch_one(pool)
            .await
    }

    /// Close every open assignment on a machine. Returns the number closed.
    pub async fn close_open_for_machine(
        pool: &PgPool,
        machine_id: DbId,
        ended_at: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE operator_assignments SET ended_at = $2 \
             WHERE machine_id = $1 AND ended_at IS NULL",
        )
        .bind(machine_id)
        .bind(ended_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
