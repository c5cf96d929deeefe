//! Repository for the `production_logs` table.

use sqlx::PgPool;

use crate::models::production_log::{CreateProductionLog, ProductionLog};

/// Column list for `production_logs` queries.
const COLUMNS: &str = "\
    id, machine_id, order_id, kind, quantity, scrap, started_at, ended_at, \
    client_id, idempotency_key, created_at";

/// Provides append operations for production logs.
pub struct ProductionLogRepo;

impl ProductionLogRepo {
    /// Insert a log, or return the existing row for the same idempotency
    /// key.
    ///
    /// The no-op `DO UPDATE` makes `RETURNING` yield the existing row on
    /// conflict.
    pub async fn insert(
        pool: &PgPool,
        input: &CreateProductionLog,
    ) -> Result<ProductionLog, sqlx::Error> {
        let query = format!(
            "INSERT INTO production_logs \
                (machine_id, order_id, kind, quantity, scrap, started_at, ended_at, \
                 client_id, idempotency_key) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (idempotency_key) DO UPDATE \
                SET idempotency_key = EXCLUDED.idempotency_key \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProductionLog>(&query)
            .bind(input.machine_id)
            .bind(input.order_id)
            .bind(input.kind.as_str())
            .bind(input.quantity)
            .bind(input.scrap)
            .bind(input.started_at)
            .bind(input.ended_at)
            .bind(input.client_id)
            .bind(input.idempotency_key)
            .fetch_one(pool)
            .await
    }
}
