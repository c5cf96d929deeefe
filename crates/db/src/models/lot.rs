//! Traceability lot model.

use mes_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `lots` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Lot {
    pub id: DbId,
    pub code: String,
    pub order_id: DbId,
    pub machine_id: DbId,
    pub sector: Option<String>,
    pub released_quantity: i64,
    pub scrap_quantity: i64,
    pub idempotency_key: Uuid,
    pub created_at: Timestamp,
}

/// DTO for inserting a lot. Idempotent on `idempotency_key`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateLot {
    pub code: String,
    pub order_id: DbId,
    pub machine_id: DbId,
    pub sector: Option<String>,
    pub released_quantity: i64,
    pub scrap_quantity: i64,
    pub idempotency_key: Uuid,
}
