//! Production order entity model and progress DTO.

use mes_core::accumulators::PhaseAccumulators;
use mes_core::client_state::ActiveOrder;
use mes_core::error::CoreError;
use mes_core::status::OrderStatus;
use mes_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `production_orders` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct ProductionOrder {
    pub id: DbId,
    pub code: String,
    pub target_quantity: i64,
    pub priority: i32,
    pub status: String,
    pub machine_id: Option<DbId>,
    pub sequence: Option<i32>,
    pub setup_secs: i64,
    pub run_secs: i64,
    pub stop_secs: i64,
    pub good_quantity: Option<i64>,
    pub scrap_quantity: Option<i64>,
    pub finished_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ProductionOrder {
    pub fn status(&self) -> Result<OrderStatus, CoreError> {
        self.status.parse()
    }

    /// Accumulated phase durations mirrored on the order record.
    pub fn accumulators(&self) -> PhaseAccumulators {
        PhaseAccumulators::new(
            u64::try_from(self.setup_secs).unwrap_or(0),
            u64::try_from(self.run_secs).unwrap_or(0),
            u64::try_from(self.stop_secs).unwrap_or(0),
        )
    }

    /// Identity of the order, with no recorded base.
    pub fn active_order(&self) -> ActiveOrder {
        ActiveOrder {
            id: self.id,
            code: self.code.clone(),
            target_quantity: self.target_quantity,
            recorded: PhaseAccumulators::default(),
        }
    }
}

/// DTO mirroring the station's accumulators and, for terminal statuses, the
/// reported quantities onto the order record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct OrderProgress {
    pub status: OrderStatus,
    pub accumulated: PhaseAccumulators,
    pub good_quantity: Option<i64>,
    pub scrap_quantity: Option<i64>,
    pub finished_at: Option<Timestamp>,
}

/// Postgres BIGINT view of an accumulator value.
pub fn secs_to_db(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}
