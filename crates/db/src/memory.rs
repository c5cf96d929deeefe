//! In-process [`ShopFloorStore`] for tests, demos and offline stations.
//!
//! Mirrors the Postgres semantics the station relies on (idempotent log and
//! lot inserts, operator preserved on status changes, queue ordering) and
//! supports one-shot fault injection per operation.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use mes_core::status::{MachineStatus, OrderStatus};
use mes_core::types::{DbId, Timestamp};

use crate::models::lot::{CreateLot, Lot};
use crate::models::machine::{Machine, MachineStatusUpdate};
use crate::models::operator_assignment::OperatorAssignment;
use crate::models::production_log::{CreateProductionLog, ProductionLog};
use crate::models::production_order::{secs_to_db, OrderProgress, ProductionOrder};
use crate::models::stoppage::{CreateStoppage, Stoppage};
use crate::store::{ShopFloorStore, StoreError};

/// Store operations, used for fault injection and the write journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetMachine,
    ListMachines,
    FindMachineForOrder,
    UpdateMachineStatus,
    SetMachineOperator,
    GetOrder,
    NextQueuedOrder,
    StartOrder,
    RecordOrderProgress,
    InsertStoppage,
    CloseOpenStoppage,
    InsertProductionLog,
    InsertLot,
    OpenOperatorAssignment,
    CloseOperatorAssignments,
}

/// One write applied to the store: the operation and the row it targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreWrite {
    pub op: StoreOp,
    pub target_id: DbId,
}

#[derive(Default)]
struct Tables {
    next_id: DbId,
    machines: BTreeMap<DbId, Machine>,
    orders: BTreeMap<DbId, ProductionOrder>,
    stoppages: Vec<Stoppage>,
    production_logs: Vec<ProductionLog>,
    lots: Vec<Lot>,
    assignments: Vec<OperatorAssignment>,
    writes: Vec<StoreWrite>,
    failures: HashSet<StoreOp>,
}

impl Tables {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    /// Consume a pending injected failure for `op`.
    fn check(&mut self, op: StoreOp) -> Result<(), StoreError> {
        if self.failures.remove(&op) {
            Err(StoreError::Unavailable(format!("injected failure on {op:?}")))
        } else {
            Ok(())
        }
    }

    fn record(&mut self, op: StoreOp, target_id: DbId) {
        self.writes.push(StoreWrite { op, target_id });
    }
}

/// [`ShopFloorStore`] holding every table in memory.
#[derive(Default)]
pub struct InMemoryShopFloorStore {
    tables: Mutex<Tables>,
}

impl InMemoryShopFloorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -- seeding --

    pub fn add_machine(&self, name: &str, sector: Option<&str>) -> DbId {
        let mut t = self.lock();
        let id = t.next_id();
        let now = Utc::now();
        t.machines.insert(
            id,
            Machine {
                id,
                name: name.to_string(),
                sector: sector.map(str::to_string),
                status: MachineStatus::Available.as_str().to_string(),
                status_changed_at: None,
                current_order_id: None,
                operator_id: None,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub fn add_order(
        &self,
        code: &str,
        target_quantity: i64,
        machine_id: Option<DbId>,
        sequence: Option<i32>,
    ) -> DbId {
        let mut t = self.lock();
        let id = t.next_id();
        let now = Utc::now();
        t.orders.insert(
            id,
            ProductionOrder {
                id,
                code: code.to_string(),
                target_quantity,
                priority: 0,
                status: OrderStatus::Pending.as_str().to_string(),
                machine_id,
                sequence,
                setup_secs: 0,
                run_secs: 0,
                stop_secs: 0,
                good_quantity: None,
                scrap_quantity: None,
                finished_at: None,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    /// Overwrite a machine row as-is, e.g. to simulate another station.
    pub fn put_machine(&self, machine: Machine) {
        self.lock().machines.insert(machine.id, machine);
    }

    // -- fault injection --

    /// Make the next call of `op` fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, op: StoreOp) {
        self.lock().failures.insert(op);
    }

    // -- inspection --

    pub fn machine(&self, id: DbId) -> Option<Machine> {
        self.lock().machines.get(&id).cloned()
    }

    pub fn order(&self, id: DbId) -> Option<ProductionOrder> {
        self.lock().orders.get(&id).cloned()
    }

    pub fn stoppages(&self) -> Vec<Stoppage> {
        self.lock().stoppages.clone()
    }

    pub fn production_logs(&self) -> Vec<ProductionLog> {
        self.lock().production_logs.clone()
    }

    pub fn lots(&self) -> Vec<Lot> {
        self.lock().lots.clone()
    }

    pub fn assignments(&self) -> Vec<OperatorAssignment> {
        self.lock().assignments.clone()
    }

    /// Every successful write, in order.
    pub fn writes(&self) -> Vec<StoreWrite> {
        self.lock().writes.clone()
    }

    pub fn writes_to(&self, op: StoreOp, target_id: DbId) -> usize {
        self.lock()
            .writes
            .iter()
            .filter(|w| w.op == op && w.target_id == target_id)
            .count()
    }
}

#[async_trait]
impl ShopFloorStore for InMemoryShopFloorStore {
    async fn get_machine(&self, id: DbId) -> Result<Machine, StoreError> {
        let mut t = self.lock();
        t.check(StoreOp::GetMachine)?;
        t.machines.get(&id).cloned().ok_or(StoreError::NotFound {
            entity: "machine",
            id,
        })
    }

    async fn list_machines(&self) -> Result<Vec<Machine>, StoreError> {
        let mut t = self.lock();
        t.check(StoreOp::ListMachines)?;
        let mut machines: Vec<Machine> = t.machines.values().cloned().collect();
        machines.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(machines)
    }

    async fn find_machine_for_order(
        &self,
        order_id: DbId,
    ) -> Result<Option<Machine>, StoreError> {
        let mut t = self.lock();
        t.check(StoreOp::FindMachineForOrder)?;
        Ok(t.machines
            .values()
            .find(|m| {
                m.current_order_id == Some(order_id)
                    && m.status != MachineStatus::Available.as_str()
            })
            .cloned())
    }

    async fn update_machine_status(
        &self,
        id: DbId,
        update: &MachineStatusUpdate,
    ) -> Result<(), StoreError> {
        let mut t = self.lock();
        t.check(StoreOp::UpdateMachineStatus)?;
        let machine = t.machines.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "machine",
            id,
        })?;
        machine.status = update.status.as_str().to_string();
        machine.current_order_id = update.order_id;
        machine.status_changed_at = Some(update.changed_at);
        machine.updated_at = Utc::now();
        t.record(StoreOp::UpdateMachineStatus, id);
        Ok(())
    }

    async fn set_machine_operator(
        &self,
        id: DbId,
        operator_id: Option<DbId>,
    ) -> Result<(), StoreError> {
        let mut t = self.lock();
        t.check(StoreOp::SetMachineOperator)?;
        let machine = t.machines.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "machine",
            id,
        })?;
        machine.operator_id = operator_id;
        t.record(StoreOp::SetMachineOperator, id);
        Ok(())
    }

    async fn get_order(&self, id: DbId) -> Result<ProductionOrder, StoreError> {
        let mut t = self.lock();
        t.check(StoreOp::GetOrder)?;
        t.orders.get(&id).cloned().ok_or(StoreError::NotFound {
            entity: "production_order",
            id,
        })
    }

    async fn next_queued_order(
        &self,
        machine_id: DbId,
        exclude_id: DbId,
    ) -> Result<Option<ProductionOrder>, StoreError> {
        let mut t = self.lock();
        t.check(StoreOp::NextQueuedOrder)?;
        let mut queued: Vec<&ProductionOrder> = t
            .orders
            .values()
            .filter(|o| {
                o.machine_id == Some(machine_id)
                    && o.id != exclude_id
                    && o.status != OrderStatus::Finished.as_str()
            })
            .collect();
        queued.sort_by_key(|o| (o.sequence.is_none(), o.sequence, -o.priority, o.created_at));
        Ok(queued.first().map(|o| (*o).clone()))
    }

    async fn start_order(&self, order_id: DbId, machine_id: DbId) -> Result<(), StoreError> {
        let mut t = self.lock();
        t.check(StoreOp::StartOrder)?;
        let order = t.orders.get_mut(&order_id).ok_or(StoreError::NotFound {
            entity: "production_order",
            id: order_id,
        })?;
        order.status = OrderStatus::InProgress.as_str().to_string();
        order.machine_id = Some(machine_id);
        t.record(StoreOp::StartOrder, order_id);
        Ok(())
    }

    async fn record_order_progress(
        &self,
        order_id: DbId,
        progress: &OrderProgress,
    ) -> Result<(), StoreError> {
        let mut t = self.lock();
        t.check(StoreOp::RecordOrderProgress)?;
        let order = t.orders.get_mut(&order_id).ok_or(StoreError::NotFound {
            entity: "production_order",
            id: order_id,
        })?;
        order.status = progress.status.as_str().to_string();
        order.setup_secs = secs_to_db(progress.accumulated.setup_secs);
        order.run_secs = secs_to_db(progress.accumulated.run_secs);
        order.stop_secs = secs_to_db(progress.accumulated.stop_secs);
        if progress.good_quantity.is_some() {
            order.good_quantity = progress.good_quantity;
        }
        if progress.scrap_quantity.is_some() {
            order.scrap_quantity = progress.scrap_quantity;
        }
        if progress.finished_at.is_some() {
            order.finished_at = progress.finished_at;
        }
        t.record(StoreOp::RecordOrderProgress, order_id);
        Ok(())
    }

    async fn insert_stoppage(&self, input: &CreateStoppage) -> Result<Stoppage, StoreError> {
        let mut t = self.lock();
        t.check(StoreOp::InsertStoppage)?;
        let id = t.next_id();
        let stoppage = Stoppage {
            id,
            machine_id: input.machine_id,
            order_id: input.order_id,
            reason_id: input.reason_id,
            notes: input.notes.clone(),
            prior_phase: input.prior_phase.map(|p| p.label().to_string()),
            started_at: input.started_at,
            ended_at: None,
        };
        t.stoppages.push(stoppage.clone());
        t.record(StoreOp::InsertStoppage, input.machine_id);
        Ok(stoppage)
    }

    async fn close_open_stoppage(
        &self,
        machine_id: DbId,
        ended_at: Timestamp,
    ) -> Result<Option<Stoppage>, StoreError> {
        let mut t = self.lock();
        t.check(StoreOp::CloseOpenStoppage)?;
        let mut latest: Option<Stoppage> = None;
        for stoppage in t
            .stoppages
            .iter_mut()
            .filter(|s| s.machine_id == machine_id && s.ended_at.is_none())
        {
            stoppage.ended_at = Some(ended_at);
            if latest
                .as_ref()
                .map_or(true, |l| stoppage.started_at >= l.started_at)
            {
                latest = Some(stoppage.clone());
            }
        }
        t.record(StoreOp::CloseOpenStoppage, machine_id);
        Ok(latest)
    }

    async fn insert_production_log(
        &self,
        input: &CreateProductionLog,
    ) -> Result<ProductionLog, StoreError> {
        let mut t = self.lock();
        t.check(StoreOp::InsertProductionLog)?;
        if let Some(existing) = t
            .production_logs
            .iter()
            .find(|l| l.idempotency_key == input.idempotency_key)
        {
            return Ok(existing.clone());
        }
        let id = t.next_id();
        let log = ProductionLog {
            id,
            machine_id: input.machine_id,
            order_id: input.order_id,
            kind: input.kind.as_str().to_string(),
            quantity: input.quantity,
            scrap: input.scrap,
            started_at: input.started_at,
            ended_at: input.ended_at,
            client_id: input.client_id,
            idempotency_key: input.idempotency_key,
            created_at: Utc::now(),
        };
        t.production_logs.push(log.clone());
        t.record(StoreOp::InsertProductionLog, input.order_id);
        Ok(log)
    }

    async fn insert_lot(&self, input: &CreateLot) -> Result<Lot, StoreError> {
        let mut t = self.lock();
        t.check(StoreOp::InsertLot)?;
        if let Some(existing) = t
            .lots
            .iter()
            .find(|l| l.idempotency_key == input.idempotency_key)
        {
            return Ok(existing.clone());
        }
        let id = t.next_id();
        let lot = Lot {
            id,
            code: input.code.clone(),
            order_id: input.order_id,
            machine_id: input.machine_id,
            sector: input.sector.clone(),
            released_quantity: input.released_quantity,
            scrap_quantity: input.scrap_quantity,
            idempotency_key: input.idempotency_key,
            created_at: Utc::now(),
        };
        t.lots.push(lot.clone());
        t.record(StoreOp::InsertLot, input.order_id);
        Ok(lot)
    }

    async fn open_operator_assignment(
        &self,
        operator_id: DbId,
        machine_id: DbId,
        started_at: Timestamp,
    ) -> Result<OperatorAssignment, StoreError> {
        let mut t = self.lock();
        t.check(StoreOp::OpenOperatorAssignment)?;
        let id = t.next_id();
        let assignment = OperatorAssignment {
            id,
            operator_id,
            machine_id,
            started_at,
            ended_at: None,
        };
        t.assignments.push(assignment.clone());
        t.record(StoreOp::OpenOperatorAssignment, machine_id);
        Ok(assignment)
    }

    async fn close_operator_assignments(
        &self,
        machine_id: DbId,
        ended_at: Timestamp,
    ) -> Result<u64, StoreError> {
        let mut t = self.lock();
        t.check(StoreOp::CloseOperatorAssignments)?;
        let mut closed = 0;
        for assignment in t
            .assignments
            .iter_mut()
            .filter(|a| a.machine_id == machine_id && a.ended_at.is_none())
        {
            assignment.ended_at = Some(ended_at);
            closed += 1;
        }
        t.record(StoreOp::CloseOperatorAssignments, machine_id);
        Ok(closed)
    }
}
