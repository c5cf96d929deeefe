//! Production-order lifecycle controller.
//!
//! [`LifecycleController`] turns operator commands into remote writes on the
//! [`ShopFloorStore`] and, once every write of a command has succeeded, into
//! local state changes on the [`StateStore`]. Each successful command is
//! broadcast on the [`EventBus`] as a local machine update.
//!
//! Releasing an order (finalize, suspend, transfer) takes several
//! independent writes. The command is identified by a UUID v7 that doubles
//! as the idempotency key of the rows it inserts, so a command that failed
//! part-way is kept as pending and can be replayed with
//! [`retry_pending`](LifecycleController::retry_pending) without duplicating
//! rows.

use std::sync::Arc;

use mes_core::accumulators::PhaseAccumulators;
use mes_core::client_state::{ActiveOrder, ClientState, MachineSnapshot};
use mes_core::clock::Clock;
use mes_core::lot::lot_code;
use mes_core::oee::{compute_oee, Oee};
use mes_core::phase::Phase;
use mes_core::reports::{
    production_delta, CompletionReport, OverrideAuthorization, ProductionDeclaration, StopReport,
};
use mes_core::state_store::StateStore;
use mes_core::status::{MachineStatus, OrderStatus, ProductionLogKind};
use mes_core::types::{ClientId, CommandId, DbId, Timestamp};
use mes_db::models::lot::CreateLot;
use mes_db::models::machine::MachineStatusUpdate;
use mes_db::models::production_log::{CreateProductionLog, ProductionLog};
use mes_db::models::production_order::{OrderProgress, ProductionOrder};
use mes_db::models::stoppage::{CreateStoppage, Stoppage};
use mes_db::{ShopFloorStore, StoreError};
use mes_events::{EventBus, MachineUpdate};
use tokio::sync::Mutex;
use uuid::Uuid;
use validator::Validate;

use crate::error::{LifecycleError, LifecycleResult};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// The three ways an order leaves the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseKind {
    Finalize,
    Suspend,
    Transfer,
}

impl ReleaseKind {
    fn log_kind(self) -> ProductionLogKind {
        match self {
            Self::Finalize => ProductionLogKind::Finalization,
            Self::Suspend => ProductionLogKind::Suspension,
            Self::Transfer => ProductionLogKind::Transfer,
        }
    }

    /// Status written to the order. A transferred order stays in progress.
    fn order_status(self) -> OrderStatus {
        match self {
            Self::Finalize => OrderStatus::Finished,
            Self::Suspend => OrderStatus::Suspended,
            Self::Transfer => OrderStatus::InProgress,
        }
    }
}

/// A release command with everything captured when it was issued, so that a
/// replay writes exactly the same rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub id: CommandId,
    pub kind: ReleaseKind,
    pub report: CompletionReport,
    pub machine_id: DbId,
    pub sector: Option<String>,
    pub order: ActiveOrder,
    pub phase: Phase,
    pub phase_changed_at: Option<Timestamp>,
    /// Session accumulators with the active phase folded in at `issued_at`.
    /// The order's recorded base is in [`ActiveOrder::recorded`].
    pub accumulated: PhaseAccumulators,
    pub produced: u64,
    pub scrap: u64,
    pub issued_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotRef {
    pub id: DbId,
    pub code: String,
}

/// Result of a release command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseOutcome {
    pub command_id: CommandId,
    pub kind: ReleaseKind,
    /// Good units written to the production log (never negative).
    pub logged_quantity: u64,
    /// Set for [`ReleaseKind::Finalize`] only.
    pub lot: Option<LotRef>,
    /// Order whose setup was started automatically after a finalize.
    pub next_order: Option<ActiveOrder>,
}

struct RemoteRelease {
    logged_quantity: u64,
    lot: Option<LotRef>,
    next_order: Option<ProductionOrder>,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Drives one station through the order lifecycle.
pub struct LifecycleController {
    store: Arc<dyn ShopFloorStore>,
    state: Arc<StateStore>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    client_id: ClientId,
    /// Serialises commands and holds the release command awaiting retry.
    pending: Mutex<Option<PendingCommand>>,
}

impl LifecycleController {
    pub fn new(
        store: Arc<dyn ShopFloorStore>,
        state: Arc<StateStore>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        client_id: ClientId,
    ) -> Self {
        Self {
            store,
            state,
            bus,
            clock,
            client_id,
            pending: Mutex::new(None),
        }
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub async fn pending_command(&self) -> Option<PendingCommand> {
        self.pending.lock().await.clone()
    }

    /// Drop the pending command after the operator reconciled it by hand.
    pub async fn discard_pending(&self) -> Option<PendingCommand> {
        let discarded = self.pending.lock().await.take();
        if let Some(command) = &discarded {
            tracing::warn!(
                command_id = %command.id,
                kind = ?command.kind,
                order_id = command.order.id,
                "Pending command discarded"
            );
        }
        discarded
    }

    /// OEE of the active order, live time included.
    pub fn current_oee(&self) -> Oee {
        let state = self.state.snapshot();
        let mut accumulated = state.accumulated;
        if state.phase.is_active() {
            accumulated.fold_elapsed(state.phase, state.phase_changed_at, self.clock.now());
        }
        compute_oee(&accumulated, state.produced, state.scrap, state.meta)
    }

    // -- machine selection --

    /// Select the machine this station operates and reconcile local state
    /// with its record.
    ///
    /// A machine left in an active status without an order is released.
    /// When the machine carries an order, the phase comes from the machine
    /// record. Accumulators and the phase clock are kept when the local
    /// order matches; otherwise accumulators are read from the order and the
    /// clock from the machine's status change.
    pub async fn select_machine(&self, machine_id: DbId) -> LifecycleResult<MachineSnapshot> {
        let _guard = self.pending.lock().await;

        let machine = self
            .store
            .get_machine(machine_id)
            .await
            .map_err(LifecycleError::remote("load_machine"))?;
        let mut snapshot = machine
            .snapshot()
            .map_err(StoreError::from)
            .map_err(LifecycleError::remote("load_machine"))?;
        let current = self.state.snapshot();

        if snapshot.status.requires_order() && snapshot.current_order_id.is_none() {
            let now = self.clock.now();
            tracing::warn!(
                machine_id,
                status = %snapshot.status,
                "Machine active without an order, releasing it"
            );
            self.store
                .update_machine_status(machine_id, &MachineStatusUpdate::released(now))
                .await
                .map_err(LifecycleError::remote("self_heal"))?;
            snapshot.status = MachineStatus::Available;
            snapshot.status_changed_at = Some(now);

            let healed = snapshot.clone();
            self.state.batch(move |s| {
                s.selected_machine_id = Some(machine_id);
                s.machine = Some(healed);
                clear_order(s);
            });
            self.broadcast(machine_id, MachineStatus::Available, None, now);
            return Ok(snapshot);
        }

        match snapshot.current_order_id {
            Some(order_id) => {
                let same_order = current.selected_machine_id == Some(machine_id)
                    && current.active_order_id() == Some(order_id);
                let order = if same_order {
                    None
                } else {
                    Some(
                        self.store
                            .get_order(order_id)
                            .await
                            .map_err(LifecycleError::remote("load_order"))?,
                    )
                };
                let phase = Phase::from_machine_status(snapshot.status);
                let restored = snapshot.clone();

                self.state.batch(move |s| {
                    s.selected_machine_id = Some(machine_id);
                    if let Some(order) = order {
                        s.order = Some(order.active_order());
                        s.meta = target_meta(order.target_quantity);
                        s.accumulated = order.accumulators();
                        s.produced = 0;
                        s.scrap = 0;
                        s.pre_stop_phase = None;
                    }
                    let keep_clock =
                        same_order && s.phase == phase && s.phase_changed_at.is_some();
                    if !keep_clock {
                        s.phase_changed_at = restored.status_changed_at.or(s.phase_changed_at);
                    }
                    s.phase = phase;
                    s.machine = Some(restored);
                });
                tracing::info!(machine_id, order_id, %phase, same_order, "Machine selected");
            }
            None => {
                let selected = snapshot.clone();
                self.state.batch(move |s| {
                    s.selected_machine_id = Some(machine_id);
                    s.machine = Some(selected);
                    clear_order(s);
                });
                tracing::info!(machine_id, "Machine selected, no order attached");
            }
        }

        Ok(snapshot)
    }

    // -- phase transitions --

    /// Start setting up `order_id` on the selected machine.
    ///
    /// An order active on another machine is rejected with
    /// [`LifecycleError::OrderInUse`] unless `authorization` is given.
    pub async fn start_setup(
        &self,
        order_id: DbId,
        authorization: Option<OverrideAuthorization>,
    ) -> LifecycleResult<ActiveOrder> {
        let pending = self.pending.lock().await;
        ensure_no_pending(&pending)?;
        self.begin_setup(order_id, authorization.as_ref()).await
    }

    async fn begin_setup(
        &self,
        order_id: DbId,
        authorization: Option<&OverrideAuthorization>,
    ) -> LifecycleResult<ActiveOrder> {
        if let Some(auth) = authorization {
            auth.validate()?;
        }
        let state = self.state.snapshot();
        let machine_id = selected_machine(&state)?;
        if state.phase.is_active() {
            return Err(LifecycleError::invalid(format!(
                "machine is still in {} with another order",
                state.phase
            )));
        }
        state.phase.validate_transition(Phase::Setup)?;

        let order = self
            .store
            .get_order(order_id)
            .await
            .map_err(LifecycleError::remote("load_order"))?;
        let status = order
            .status()
            .map_err(StoreError::from)
            .map_err(LifecycleError::remote("load_order"))?;
        if status.is_finished() {
            return Err(LifecycleError::invalid(format!(
                "order {} is already finished",
                order.code
            )));
        }

        let holder = self
            .store
            .find_machine_for_order(order_id)
            .await
            .map_err(LifecycleError::remote("check_order_in_use"))?;
        if let Some(holder) = holder.filter(|m| m.id != machine_id) {
            match authorization {
                None => {
                    return Err(LifecycleError::OrderInUse {
                        order_code: order.code,
                        machine_name: holder.name,
                    })
                }
                Some(auth) => tracing::warn!(
                    order_id,
                    holder_machine_id = holder.id,
                    authorized_by = auth.authorized_by,
                    reason = %auth.reason,
                    "Order in use on another machine, starting under override"
                ),
            }
        }

        let now = self.clock.now();
        self.store
            .start_order(order_id, machine_id)
            .await
            .map_err(LifecycleError::remote("start_order"))?;
        self.store
            .update_machine_status(
                machine_id,
                &MachineStatusUpdate::new(MachineStatus::Setup, Some(order_id), now),
            )
            .await
            .map_err(LifecycleError::remote("machine_setup"))?;

        let active = ActiveOrder {
            recorded: order.accumulators(),
            ..order.active_order()
        };
        let local = active.clone();
        self.state.batch(move |s| {
            s.meta = target_meta(local.target_quantity);
            s.order = Some(local);
            s.produced = 0;
            s.scrap = 0;
            s.phase = Phase::Setup;
            s.phase_changed_at = Some(now);
            s.accumulated = PhaseAccumulators::default();
            s.pre_stop_phase = None;
            patch_machine(s, MachineStatus::Setup, Some(order_id), now);
        });
        self.broadcast(machine_id, MachineStatus::Setup, Some(order_id), now);

        tracing::info!(machine_id, order_id, order_code = %active.code, "Setup started");
        Ok(active)
    }

    /// Leave setup and start producing.
    pub async fn start_production(&self) -> LifecycleResult<()> {
        let pending = self.pending.lock().await;
        ensure_no_pending(&pending)?;

        let state = self.state.snapshot();
        let machine_id = selected_machine(&state)?;
        let order = active_order(&state)?;
        if state.phase != Phase::Setup {
            return Err(LifecycleError::invalid(format!(
                "production starts from SETUP, machine is in {}",
                state.phase
            )));
        }

        let now = self.clock.now();
        self.store
            .update_machine_status(
                machine_id,
                &MachineStatusUpdate::new(MachineStatus::Running, Some(order.id), now),
            )
            .await
            .map_err(LifecycleError::remote("machine_running"))?;

        let accumulated =
            self.enter_phase(&state, machine_id, order.id, Phase::Running, now, |_| {});
        tracing::info!(
            machine_id,
            order_id = order.id,
            setup_secs = accumulated.setup_secs,
            "Production started"
        );
        Ok(())
    }

    /// Register a stoppage from `SETUP` or `RUNNING`.
    pub async fn stop(&self, report: StopReport) -> LifecycleResult<()> {
        report.validate()?;
        let pending = self.pending.lock().await;
        ensure_no_pending(&pending)?;

        let state = self.state.snapshot();
        let machine_id = selected_machine(&state)?;
        let order = active_order(&state)?;
        if !state.phase.is_resumable() {
            return Err(LifecycleError::invalid(format!(
                "a stop needs SETUP or RUNNING, machine is in {}",
                state.phase
            )));
        }

        let prior = state.phase;
        let now = self.clock.now();

        self.store
            .insert_stoppage(&CreateStoppage {
                machine_id,
                order_id: Some(order.id),
                reason_id: report.reason_id,
                notes: report.notes.clone(),
                prior_phase: Some(prior),
                started_at: now,
            })
            .await
            .map_err(LifecycleError::remote("stoppage"))?;
        let closed = self
            .store
            .close_operator_assignments(machine_id, now)
            .await
            .map_err(LifecycleError::remote("close_operator_assignments"))?;
        self.store
            .update_machine_status(
                machine_id,
                &MachineStatusUpdate::new(MachineStatus::Stopped, Some(order.id), now),
            )
            .await
            .map_err(LifecycleError::remote("machine_stopped"))?;

        self.enter_phase(&state, machine_id, order.id, Phase::Stopped, now, |s| {
            s.pre_stop_phase = Some(prior);
            s.operator_id = None;
            s.operator_session_started_at = None;
        });
        tracing::info!(
            machine_id,
            order_id = order.id,
            reason_id = report.reason_id,
            %prior,
            closed_assignments = closed,
            "Machine stopped"
        );
        Ok(())
    }

    /// Close the open stoppage and return to the phase active before it.
    ///
    /// The prior phase comes from the stoppage record, then the local
    /// record of the stop, and defaults to `RUNNING`.
    pub async fn resume(&self) -> LifecycleResult<Phase> {
        let pending = self.pending.lock().await;
        ensure_no_pending(&pending)?;

        let state = self.state.snapshot();
        let machine_id = selected_machine(&state)?;
        let order = active_order(&state)?;
        if state.phase != Phase::Stopped {
            return Err(LifecycleError::invalid(format!(
                "resume needs STOPPED, machine is in {}",
                state.phase
            )));
        }

        let now = self.clock.now();
        let closed = self
            .store
            .close_open_stoppage(machine_id, now)
            .await
            .map_err(LifecycleError::remote("close_stoppage"))?;
        let target = closed
            .as_ref()
            .and_then(Stoppage::prior_phase)
            .or(state.pre_stop_phase.filter(|p| p.is_resumable()))
            .unwrap_or(Phase::Running);

        self.store
            .update_machine_status(
                machine_id,
                &MachineStatusUpdate::new(target.machine_status(), Some(order.id), now),
            )
            .await
            .map_err(LifecycleError::remote("machine_resume"))?;

        let accumulated = self.enter_phase(&state, machine_id, order.id, target, now, |s| {
            s.pre_stop_phase = None;
        });
        tracing::info!(
            machine_id,
            order_id = order.id,
            phase = %target,
            stop_secs = accumulated.stop_secs,
            "Machine resumed"
        );
        Ok(target)
    }

    // -- releasing the order --

    /// Finish the order, release the machine, create its lot and start the
    /// next queued order if there is one.
    pub async fn finalize(&self, report: CompletionReport) -> LifecycleResult<ReleaseOutcome> {
        self.release(ReleaseKind::Finalize, report).await
    }

    /// Put the order on hold and release the machine.
    pub async fn suspend(&self, report: CompletionReport) -> LifecycleResult<ReleaseOutcome> {
        self.release(ReleaseKind::Suspend, report).await
    }

    /// Hand the partial production over and release the machine; the order
    /// stays in progress.
    pub async fn transfer(&self, report: CompletionReport) -> LifecycleResult<ReleaseOutcome> {
        self.release(ReleaseKind::Transfer, report).await
    }

    /// Replay the release command that failed part-way, with its original
    /// idempotency key.
    pub async fn retry_pending(&self) -> LifecycleResult<ReleaseOutcome> {
        let mut pending = self.pending.lock().await;
        let command = pending.clone().ok_or(LifecycleError::NoPendingCommand)?;
        tracing::info!(command_id = %command.id, kind = ?command.kind, "Retrying pending command");
        self.run_release(&mut pending, command).await
    }

    async fn release(
        &self,
        kind: ReleaseKind,
        report: CompletionReport,
    ) -> LifecycleResult<ReleaseOutcome> {
        report.validate()?;
        let mut pending = self.pending.lock().await;
        ensure_no_pending(&pending)?;

        let state = self.state.snapshot();
        let machine_id = selected_machine(&state)?;
        let order = active_order(&state)?;
        if !state.phase.is_active() {
            return Err(LifecycleError::invalid(format!(
                "no order in progress, machine is in {}",
                state.phase
            )));
        }

        let issued_at = self.clock.now();
        let mut accumulated = state.accumulated;
        accumulated.fold_elapsed(state.phase, state.phase_changed_at, issued_at);

        let command = PendingCommand {
            id: Uuid::now_v7(),
            kind,
            report,
            machine_id,
            sector: state.machine.as_ref().and_then(|m| m.sector.clone()),
            order,
            phase: state.phase,
            phase_changed_at: state.phase_changed_at,
            accumulated,
            produced: state.produced,
            scrap: state.scrap,
            issued_at,
        };
        tracing::info!(
            command_id = %command.id,
            ?kind,
            machine_id,
            order_id = command.order.id,
            good_total = report.good_total,
            "Releasing order"
        );
        self.run_release(&mut pending, command).await
    }

    async fn run_release(
        &self,
        pending: &mut Option<PendingCommand>,
        command: PendingCommand,
    ) -> LifecycleResult<ReleaseOutcome> {
        match self.execute_release(&command).await {
            Ok(remote) => {
                *pending = None;
                Ok(self.complete_release(&command, remote).await)
            }
            Err(e) => {
                tracing::error!(
                    command_id = %command.id,
                    kind = ?command.kind,
                    error = %e,
                    "Release failed part-way, kept for retry"
                );
                *pending = Some(command);
                Err(e)
            }
        }
    }

    /// Every remote write of a release. Each step is either an idempotent
    /// insert keyed by the command id or a set-value update, so the whole
    /// sequence can be replayed.
    async fn execute_release(&self, command: &PendingCommand) -> LifecycleResult<RemoteRelease> {
        let machine_id = command.machine_id;
        let order_id = command.order.id;
        let report = command.report;
        let logged_quantity = production_delta(report.good_total, command.produced);
        let scrap_delta = production_delta(report.scrap_total, command.scrap);

        self.store
            .insert_production_log(&CreateProductionLog {
                machine_id,
                order_id,
                kind: command.kind.log_kind(),
                quantity: quantity_to_db(logged_quantity),
                scrap: quantity_to_db(scrap_delta),
                started_at: command.phase_changed_at,
                ended_at: command.issued_at,
                client_id: Some(self.client_id),
                idempotency_key: command.id,
            })
            .await
            .map_err(LifecycleError::remote("production_log"))?;

        if command.phase == Phase::Stopped {
            self.store
                .close_open_stoppage(machine_id, command.issued_at)
                .await
                .map_err(LifecycleError::remote("close_stoppage"))?;
        }

        let finished = command.kind == ReleaseKind::Finalize;
        self.store
            .record_order_progress(
                order_id,
                &OrderProgress {
                    status: command.kind.order_status(),
                    accumulated: command.order.recorded + command.accumulated,
                    good_quantity: finished.then_some(report.good_total),
                    scrap_quantity: finished.then_some(report.scrap_total),
                    finished_at: finished.then_some(command.issued_at),
                },
            )
            .await
            .map_err(LifecycleError::remote("order_progress"))?;

        self.store
            .update_machine_status(machine_id, &MachineStatusUpdate::released(command.issued_at))
            .await
            .map_err(LifecycleError::remote("release_machine"))?;

        if !finished {
            return Ok(RemoteRelease {
                logged_quantity,
                lot: None,
                next_order: None,
            });
        }

        let lot = self
            .store
            .insert_lot(&CreateLot {
                code: lot_code(&command.order.code, command.issued_at),
                order_id,
                machine_id,
                sector: command.sector.clone(),
                released_quantity: report.good_total,
                scrap_quantity: report.scrap_total,
                idempotency_key: command.id,
            })
            .await
            .map_err(LifecycleError::remote("lot"))?;
        let next_order = self
            .store
            .next_queued_order(machine_id, order_id)
            .await
            .map_err(LifecycleError::remote("next_order"))?;

        Ok(RemoteRelease {
            logged_quantity,
            lot: Some(LotRef {
                id: lot.id,
                code: lot.code,
            }),
            next_order,
        })
    }

    async fn complete_release(
        &self,
        command: &PendingCommand,
        remote: RemoteRelease,
    ) -> ReleaseOutcome {
        let machine_id = command.machine_id;
        let at = command.issued_at;
        self.state.batch(|s| {
            clear_order(s);
            patch_machine(s, MachineStatus::Available, None, at);
        });
        self.broadcast(machine_id, MachineStatus::Available, None, at);
        tracing::info!(
            command_id = %command.id,
            kind = ?command.kind,
            machine_id,
            order_id = command.order.id,
            logged_quantity = remote.logged_quantity,
            lot_code = remote.lot.as_ref().map(|l| l.code.as_str()),
            "Order released"
        );

        let mut next_order = None;
        if let Some(next) = remote.next_order {
            match self.begin_setup(next.id, None).await {
                Ok(active) => next_order = Some(active),
                Err(e) => tracing::warn!(
                    machine_id,
                    next_order_id = next.id,
                    error = %e,
                    "Could not start the next queued order"
                ),
            }
        }

        ReleaseOutcome {
            command_id: command.id,
            kind: command.kind,
            logged_quantity: remote.logged_quantity,
            lot: remote.lot,
            next_order,
        }
    }

    // -- production & operators --

    /// Record quantities declared by the operator against the active order.
    pub async fn register_production(
        &self,
        declaration: ProductionDeclaration,
    ) -> LifecycleResult<ProductionLog> {
        declaration.validate()?;
        let pending = self.pending.lock().await;
        ensure_no_pending(&pending)?;

        let state = self.state.snapshot();
        let machine_id = selected_machine(&state)?;
        let order = active_order(&state)?;
        if !state.phase.is_active() {
            return Err(LifecycleError::invalid("no order in progress"));
        }

        let log = self
            .store
            .insert_production_log(&CreateProductionLog {
                machine_id,
                order_id: order.id,
                kind: ProductionLogKind::Manual,
                quantity: declaration.good,
                scrap: declaration.scrap,
                started_at: None,
                ended_at: self.clock.now(),
                client_id: Some(self.client_id),
                idempotency_key: Uuid::now_v7(),
            })
            .await
            .map_err(LifecycleError::remote("production_log"))?;

        self.state.batch(|s| {
            s.produced = s.produced.saturating_add_signed(declaration.good);
            s.scrap = s.scrap.saturating_add_signed(declaration.scrap);
        });
        tracing::info!(
            machine_id,
            order_id = order.id,
            good = declaration.good,
            scrap = declaration.scrap,
            "Production registered"
        );
        Ok(log)
    }

    /// Assign `operator_id` to the selected machine and start their session.
    pub async fn join_operator(&self, operator_id: DbId) -> LifecycleResult<()> {
        if operator_id < 1 {
            return Err(LifecycleError::invalid("operator id must be positive"));
        }
        let _guard = self.pending.lock().await;
        let state = self.state.snapshot();
        let machine_id = selected_machine(&state)?;
        let now = self.clock.now();

        self.store
            .close_operator_assignments(machine_id, now)
            .await
            .map_err(LifecycleError::remote("close_operator_assignments"))?;
        self.store
            .open_operator_assignment(operator_id, machine_id, now)
            .await
            .map_err(LifecycleError::remote("open_operator_assignment"))?;
        self.store
            .set_machine_operator(machine_id, Some(operator_id))
            .await
            .map_err(LifecycleError::remote("machine_operator"))?;

        self.state.batch(|s| {
            s.operator_id = Some(operator_id);
            s.operator_session_started_at = Some(now);
            if let Some(machine) = s.machine.as_mut() {
                machine.operator_id = Some(operator_id);
            }
        });
        self.broadcast_current(machine_id, now);
        tracing::info!(machine_id, operator_id, "Operator joined");
        Ok(())
    }

    /// End the operator session on the selected machine.
    pub async fn leave_operator(&self) -> LifecycleResult<()> {
        let _guard = self.pending.lock().await;
        let state = self.state.snapshot();
        let machine_id = selected_machine(&state)?;
        let now = self.clock.now();

        let closed = self
            .store
            .close_operator_assignments(machine_id, now)
            .await
            .map_err(LifecycleError::remote("close_operator_assignments"))?;
        self.store
            .set_machine_operator(machine_id, None)
            .await
            .map_err(LifecycleError::remote("machine_operator"))?;

        self.state.batch(|s| {
            s.operator_id = None;
            s.operator_session_started_at = None;
            if let Some(machine) = s.machine.as_mut() {
                machine.operator_id = None;
            }
        });
        self.broadcast_current(machine_id, now);
        tracing::info!(machine_id, closed_assignments = closed, "Operator left");
        Ok(())
    }

    // -- helpers --

    /// Close the phase of `from` at `now`, commit `phase` locally and
    /// broadcast it. Returns the accumulators after the fold.
    ///
    /// The new phase counts from the closed phase's base moved forward by
    /// the folded seconds, which trails `now` by the carried remainder.
    fn enter_phase(
        &self,
        from: &ClientState,
        machine_id: DbId,
        order_id: DbId,
        phase: Phase,
        now: Timestamp,
        extra: impl FnOnce(&mut ClientState),
    ) -> PhaseAccumulators {
        let mut accumulated = from.accumulated;
        let base = accumulated.close_phase(from.phase, from.phase_changed_at, now);
        let status = phase.machine_status();
        self.state.batch(|s| {
            s.phase = phase;
            s.phase_changed_at = Some(base);
            s.accumulated = accumulated;
            patch_machine(s, status, Some(order_id), now);
            extra(s);
        });
        self.broadcast(machine_id, status, Some(order_id), now);
        accumulated
    }

    fn broadcast(
        &self,
        machine_id: DbId,
        status: MachineStatus,
        order_id: Option<DbId>,
        at: Timestamp,
    ) {
        let state = self.state.snapshot();
        let operator_id = state
            .machine
            .as_ref()
            .and_then(|m| m.operator_id)
            .or(state.operator_id);
        self.bus.publish(
            MachineUpdate::new(machine_id, status)
                .with_order(order_id)
                .with_operator(operator_id)
                .at(at),
        );
    }

    fn broadcast_current(&self, machine_id: DbId, at: Timestamp) {
        let state = self.state.snapshot();
        let status = state
            .machine
            .as_ref()
            .map(|m| m.status)
            .unwrap_or_else(|| state.phase.machine_status());
        self.broadcast(machine_id, status, state.active_order_id(), at);
    }
}

fn ensure_no_pending(pending: &Option<PendingCommand>) -> LifecycleResult<()> {
    match pending {
        Some(command) => Err(LifecycleError::CommandPending {
            command_id: command.id,
        }),
        None => Ok(()),
    }
}

fn selected_machine(state: &ClientState) -> LifecycleResult<DbId> {
    state
        .selected_machine_id
        .ok_or_else(|| LifecycleError::invalid("no machine selected"))
}

fn active_order(state: &ClientState) -> LifecycleResult<ActiveOrder> {
    state
        .order
        .clone()
        .ok_or_else(|| LifecycleError::invalid("no active order"))
}

/// Drop the order and everything measured for it.
fn clear_order(s: &mut ClientState) {
    s.order = None;
    s.phase = Phase::Idle;
    s.phase_changed_at = None;
    s.accumulated = PhaseAccumulators::default();
    s.produced = 0;
    s.scrap = 0;
    s.meta = 0;
    s.pre_stop_phase = None;
}

fn patch_machine(
    s: &mut ClientState,
    status: MachineStatus,
    order_id: Option<DbId>,
    at: Timestamp,
) {
    if let Some(machine) = s.machine.as_mut() {
        machine.status = status;
        machine.current_order_id = order_id;
        machine.status_changed_at = Some(at);
    }
}

fn target_meta(target_quantity: i64) -> u64 {
    u64::try_from(target_quantity).unwrap_or(0)
}

fn quantity_to_db(quantity: u64) -> i64 {
    i64::try_from(quantity).unwrap_or(i64::MAX)
}
