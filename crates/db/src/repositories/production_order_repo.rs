//! Repository for the `production_orders` table.

use mes_core::status::OrderStatus;
use mes_core::types::DbId;
use sqlx::PgPool;

use crate::models::production_order::{secs_to_db, OrderProgress, ProductionOrder};

/// Column list for `production_orders` queries.
const COLUMNS: &str = "\
    id, code, target_quantity, priority, status, machine_id, sequence, \
    setup_secs, run_secs, stop_secs, good_quantity, scrap_quantity, \
    finished_at, created_at, updated_at";

/// Provides lifecycle operations for production orders.
pub struct ProductionOrderRepo;

impl ProductionOrderRepo {
    /// Find an order by its internal ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<ProductionOrder>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM production_orders WHERE id = $1");
        sqlx::query_as::<_, ProductionOrder>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Next order queued on `machine_id` that is not finished, by sequence
    /// position, skipping `exclude_id`.
    ///
    /// Orders without a sequence position sort last, then by priority
    /// (highest first) and creation time.
    pub async fn next_queued(
        pool: &PgPool,
        machine_id: DbId,
        exclude_id: DbId,
    ) -> Result<Option<ProductionOrder>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM production_orders \
             WHERE machine_id = $1 AND id <> $2 AND status <> $3 \
             ORDER BY sequence ASC NULLS LAST, priority DESC, created_at ASC \
             LIMIT 1"
        );
        sqlx::query_as::<_, ProductionOrder>(&query)
            .bind(machine_id)
            .bind(exclude_id)
            .bind(OrderStatus::Finished.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Mark an order as in progress on `machine_id`.
    pub async fn start(pool: &PgPool, id: DbId, machine_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE production_orders SET \
                status = $2, machine_id = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(OrderStatus::InProgress.as_str())
        .bind(machine_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mirror accumulators and status onto the order. Quantities and
    /// `finished_at` are only overwritten when provided.
    pub async fn record_progress(
        pool: &PgPool,
        id: DbId,
        input: &OrderProgress,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE production_orders SET \
                status = $2, \
                setup_secs = $3, \
                run_secs = $4, \
                stop_secs = $5, \
                good_quantity = COALESCE($6, good_quantity), \
                scrap_quantity = COALESCE($7, scrap_quantity), \
                finished_at = COALESCE($8, finished_at), \
                updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(input.status.as_str())
        .bind(secs_to_db(input.accumulated.setup_secs))
        .bind(secs_to_db(input.accumulated.run_secs))
        .bind(secs_to_db(input.accumulated.stop_secs))
        .bind(input.good_quantity)
        .bind(input.scrap_quantity)
        .bind(input.finished_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
