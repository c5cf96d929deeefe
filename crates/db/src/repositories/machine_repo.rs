//! Repository for the `machines` table.

use mes_core::status::MachineStatus;
use mes_core::types::DbId;
use sqlx::PgPool;

use crate::models::machine::{Machine, MachineStatusUpdate};

/// Column list for `machines` queries.
const COLUMNS: &str = "\
    id, name, sector, status, status_changed_at, current_order_id, \
    operator_id, created_at, updated_at";

/// Provides read and status operations for machines.
pub struct MachineRepo;

impl MachineRepo {
    /// Find a machine by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Machine>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM machines WHERE id = $1");
        sqlx::query_as::<_, Machine>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List all machines ordered by name.
    pub async fn list(pool: &PgPool) -> Result<Vec<Machine>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM machines ORDER BY name ASC");
        sqlx::query_as::<_, Machine>(&query).fetch_all(pool).await
    }

    /// Find the machine currently working on `order_id`, if any.
    ///
    /// A machine that still references the order but has been released
    /// (`AVAILABLE`) does not count.
    pub async fn find_active_for_order(
        pool: &PgPool,
        order_id: DbId,
    ) -> Result<Option<Machine>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM machines \
             WHERE current_order_id = $1 AND status <> $2 \
             ORDER BY status_changed_at DESC NULLS LAST \
             LIMIT 1"
        );
        sqlx::query_as::<_, Machine>(&query)
            .bind(order_id)
            .bind(MachineStatus::Available.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Write a status change. `operator_id` is deliberately left untouched.
    ///
    /// Returns `true` if a row was updated.
    pub async fn update_status(
        pool: &PgPool,
        id: DbId,
        input: &MachineStatusUpdate,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE machines SET \
                status = $2, \
                current_order_id = $3, \
                status_changed_at = $4, \
                updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(input.status.as_str())
        .bind(input.order_id)
        .bind(input.changed_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record which operator is logged in at the machine.
    pub async fn set_operator(
        pool: &PgPool,
        id: DbId,
        operator_id: Option<DbId>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE machines SET operator_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(operator_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
