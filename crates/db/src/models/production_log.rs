//! Production log model (append-only).

use mes_core::error::CoreError;
use mes_core::status::ProductionLogKind;
use mes_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `production_logs` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct ProductionLog {
    pub id: DbId,
    pub machine_id: DbId,
    pub order_id: DbId,
    pub kind: String,
    pub quantity: i64,
    pub scrap: i64,
    pub started_at: Option<Timestamp>,
    pub ended_at: Timestamp,
    pub client_id: Option<Uuid>,
    pub idempotency_key: Uuid,
    pub created_at: Timestamp,
}

impl ProductionLog {
    pub fn kind(&self) -> Result<ProductionLogKind, CoreError> {
        self.kind.parse()
    }
}

/// DTO for inserting a production log. Inserting twice with the same
/// `idempotency_key` returns the first row.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateProductionLog {
    pub machine_id: DbId,
    pub order_id: DbId,
    pub kind: ProductionLogKind,
    pub quantity: i64,
    pub scrap: i64,
    pub started_at: Option<Timestamp>,
    pub ended_at: Timestamp,
    pub client_id: Option<Uuid>,
    pub idempotency_key: Uuid,
}
