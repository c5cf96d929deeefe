//! The remote store contract used by the station, and its Postgres
//! implementation.
//!
//! The lifecycle controller and the realtime consumer only see
//! [`ShopFloorStore`]; [`PgShopFloorStore`] maps each call onto the
//! repositories.

use async_trait::async_trait;
use mes_core::error::CoreError;
use mes_core::types::{DbId, Timestamp};

use crate::models::lot::{CreateLot, Lot};
use crate::models::machine::{Machine, MachineStatusUpdate};
use crate::models::operator_assignment::OperatorAssignment;
use crate::models::production_log::{CreateProductionLog, ProductionLog};
use crate::models::production_order::{OrderProgress, ProductionOrder};
use crate::models::stoppage::{CreateStoppage, Stoppage};
use crate::repositories::{
    LotRepo, MachineRepo, OperatorAssignmentRepo, ProductionLogRepo, ProductionOrderRepo,
    StoppageRepo,
};
use crate::DbPool;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure of a remote store call.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row came back with a value the domain does not know.
    #[error(transparent)]
    Decode(#[from] CoreError),

    /// Transport-level failure reported by a non-SQL store.
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Row-level access to the tables the station reads and writes.
///
/// Every method is a single independent write or read: there is no
/// transaction spanning calls.
#[async_trait]
pub trait ShopFloorStore: Send + Sync {
    // -- machines --

    async fn get_machine(&self, id: DbId) -> Result<Machine, StoreError>;

    async fn list_machines(&self) -> Result<Vec<Machine>, StoreError>;

    /// The machine (not released) currently working on `order_id`.
    async fn find_machine_for_order(&self, order_id: DbId)
        -> Result<Option<Machine>, StoreError>;

    async fn update_machine_status(
        &self,
        id: DbId,
        update: &MachineStatusUpdate,
    ) -> Result<(), StoreError>;

    async fn set_machine_operator(
        &self,
        id: DbId,
        operator_id: Option<DbId>,
    ) -> Result<(), StoreError>;

    // -- orders --

    async fn get_order(&self, id: DbId) -> Result<ProductionOrder, StoreError>;

    async fn next_queued_order(
        &self,
        machine_id: DbId,
        exclude_id: DbId,
    ) -> Result<Option<ProductionOrder>, StoreError>;

    async fn start_order(&self, order_id: DbId, machine_id: DbId) -> Result<(), StoreError>;

    async fn record_order_progress(
        &self,
        order_id: DbId,
        progress: &OrderProgress,
    ) -> Result<(), StoreError>;

    // -- stoppages --

    async fn insert_stoppage(&self, input: &CreateStoppage) -> Result<Stoppage, StoreError>;

    async fn close_open_stoppage(
        &self,
        machine_id: DbId,
        ended_at: Timestamp,
    ) -> Result<Option<Stoppage>, StoreError>;

    // -- production logs & lots --

    async fn insert_production_log(
        &self,
        input: &CreateProductionLog,
    ) -> Result<ProductionLog, StoreError>;

    async fn insert_lot(&self, input: &CreateLot) -> Result<Lot, StoreError>;

    // -- operator assignments --

    async fn open_operator_assignment(
        &self,
        operator_id: DbId,
        machine_id: DbId,
        started_at: Timestamp,
    ) -> Result<OperatorAssignment, StoreError>;

    async fn close_operator_assignments(
        &self,
        machine_id: DbId,
        ended_at: Timestamp,
    ) -> Result<u64, StoreError>;
}

// ---------------------------------------------------------------------------
// Postgres implementation
// ---------------------------------------------------------------------------

/// [`ShopFloorStore`] backed by a Postgres pool.
#[derive(Clone)]
pub struct PgShopFloorStore {
    pool: DbPool,
}

impl PgShopFloorStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn require<T>(row: Option<T>, entity: &'static str, id: DbId) -> Result<T, StoreError> {
    row.ok_or(StoreError::NotFound { entity, id })
}

fn require_updated(updated: bool, entity: &'static str, id: DbId) -> Result<(), StoreError> {
    if updated {
        Ok(())
    } else {
        Err(StoreError::NotFound { entity, id })
    }
}

#[async_trait]
impl ShopFloorStore for PgShopFloorStore {
    async fn get_machine(&self, id: DbId) -> Result<Machine, StoreError> {
        require(MachineRepo::find_by_id(&self.pool, id).await?, "machine", id)
    }

    async fn list_machines(&self) -> Result<Vec<Machine>, StoreError> {
        Ok(MachineRepo::list(&self.pool).await?)
    }

    async fn find_machine_for_order(
        &self,
        order_id: DbId,
    ) -> Result<Option<Machine>, StoreError> {
        Ok(MachineRepo::find_active_for_order(&self.pool, order_id).await?)
    }

    async fn update_machine_status(
        &self,
        id: DbId,
        update: &MachineStatusUpdate,
    ) -> Result<(), StoreError> {
        let updated = MachineRepo::update_status(&self.pool, id, update).await?;
        require_updated(updated, "machine", id)
    }

    async fn set_machine_operator(
        &self,
        id: DbId,
        operator_id: Option<DbId>,
    ) -> Result<(), StoreError> {
        let updated = MachineRepo::set_operator(&self.pool, id, operator_id).await?;
        require_updated(updated, "machine", id)
    }

    async fn get_order(&self, id: DbId) -> Result<ProductionOrder, StoreError> {
        require(
            ProductionOrderRepo::find_by_id(&self.pool, id).await?,
            "production_order",
            id,
        )
    }

    async fn next_queued_order(
        &self,
        machine_id: DbId,
        exclude_id: DbId,
    ) -> Result<Option<ProductionOrder>, StoreError> {
        Ok(ProductionOrderRepo::next_queued(&self.pool, machine_id, exclude_id).await?)
    }

    async fn start_order(&self, order_id: DbId, machine_id: DbId) -> Result<(), StoreError> {
        let updated = ProductionOrderRepo::start(&self.pool, order_id, machine_id).await?;
        require_updated(updated, "production_order", order_id)
    }

    async fn record_order_progress(
        &self,
        order_id: DbId,
        progress: &OrderProgress,
    ) -> Result<(), StoreError> {
        let updated = ProductionOrderRepo::record_progress(&self.pool, order_id, progress).await?;
        require_updated(updated, "production_order", order_id)
    }

    async fn insert_stoppage(&self, input: &CreateStoppage) -> Result<Stoppage, StoreError> {
        Ok(StoppageRepo::insert(&self.pool, input).await?)
    }

    async fn close_open_stoppage(
        &self,
        machine_id: DbId,
        ended_at: Timestamp,
    ) -> Result<Option<Stoppage>, StoreError> {
        Ok(StoppageRepo::close_open(&self.pool, machine_id, ended_at).await?)
    }

    async fn insert_production_log(
        &self,
        input: &CreateProductionLog,
    ) -> Result<ProductionLog, StoreError> {
        Ok(ProductionLogRepo::insert(&self.pool, input).await?)
    }

    async fn insert_lot(&self, input: &CreateLot) -> Result<Lot, StoreError> {
        Ok(LotRepo::insert(&self.pool, input).await?)
    }

    async fn open_operator_assignment(
        &self,
        operator_id: DbId,
        machine_id: DbId,
        started_at: Timestamp,
    ) -> Result<OperatorAssignment, StoreError> {
        Ok(OperatorAssignmentRepo::open(&self.pool, operator_id, machine_id, started_at).await?)
    }

    async fn close_operator_assignments(
        &self,
        machine_id: DbId,
        ended_at: Timestamp,
    ) -> Result<u64, StoreError> {
        Ok(OperatorAssignmentRepo::close_open_for_machine(&self.pool, machine_id, ended_at).await?)
    }
}
