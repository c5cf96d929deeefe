//! Repository for the `lots` table.

use sqlx::PgPool;

use crate::models::lot::{CreateLot, Lot};

/// Column list for `lots` queries.
const COLUMNS: &str = "\
    id, code, order_id, machine_id, sector, released_quantity, scrap_quantity, \
    idempotency_key, created_at";

/// Provides insert operations for traceability lots.
pub struct LotRepo;

impl LotRepo {
    /// Insert a lot, or return the existing row for the same idempotency
    /// key.
    pub async fn insert(pool: &PgPool, input: &CreateLot) -> Result<Lot, sqlx::Error> {
        let query = format!(
            "INSERT INTO lots \
                (code, order_id, machine_id, sector, released_quantity, scrap_quantity, \
                 idempotency_key) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (idempotency_key) DO UPDATE \
                SET idempotency_key = EXCLUDED.idempotency_key \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Lot>(&query)
            .bind(&input.code)
            .bind(input.order_id)
            .bind(input.machine_id)
            .bind(&input.sector)
            .bind(input.released_quantity)
            .bind(input.scrap_quantity)
            .bind(input.idempotency_key)
            .fetch_one(pool)
            .await
    }
}
