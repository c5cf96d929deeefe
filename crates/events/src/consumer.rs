//! Applies floor events to the machine cache and the client state.
//!
//! [`RealtimeConsumer`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! and runs as a long-lived background task. It stops when its cancellation
//! token fires or the bus is dropped.

use std::sync::Arc;

use mes_core::client_state::MachineSnapshot;
use mes_core::state_store::StateStore;
use mes_core::types::ClientId;
use mes_db::ShopFloorStore;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::{EventBus, FloorEvent, MachineUpdate, ProductionLogged, UpdateSource};
use crate::cache::MachineCache;

/// Background service keeping the cache and the selected machine current.
pub struct RealtimeConsumer {
    store: Arc<dyn ShopFloorStore>,
    cache: Arc<MachineCache>,
    state: Arc<StateStore>,
    client_id: ClientId,
}

impl RealtimeConsumer {
    pub fn new(
        store: Arc<dyn ShopFloorStore>,
        cache: Arc<MachineCache>,
        state: Arc<StateStore>,
        client_id: ClientId,
    ) -> Self {
        Self {
            store,
            cache,
            state,
            client_id,
        }
    }

    /// Subscribe to `bus` and run [`run`](Self::run) on a new task.
    pub fn spawn(self, bus: &EventBus, cancel: CancellationToken) -> JoinHandle<()> {
        let receiver = bus.subscribe();
        tokio::spawn(async move { self.run(receiver, cancel).await })
    }

    /// Run the consumer loop until cancelled or the bus closes.
    pub async fn run(
        &self,
        mut receiver: broadcast::Receiver<FloorEvent>,
        cancel: CancellationToken,
    ) {
        tracing::info!(client_id = %self.client_id, "Realtime consumer started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Realtime consumer stopping");
                    break;
                }
                received = receiver.recv() => match received {
                    Ok(event) => self.handle(&event).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            skipped = n,
                            "Realtime consumer lagged, refetching machines"
                        );
                        self.refresh().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bus closed, realtime consumer shutting down");
                        break;
                    }
                },
            }
        }
    }

    /// Apply a single event.
    pub async fn handle(&self, event: &FloorEvent) {
        match event {
            FloorEvent::MachineUpdated(update) => self.apply_machine_update(update).await,
            FloorEvent::ProductionLogged(logged) => self.apply_production(logged),
        }
    }

    async fn apply_machine_update(&self, update: &MachineUpdate) {
        let patched = self.cache.apply(update).await;
        let selected = self.state.snapshot().selected_machine_id == Some(update.machine_id);

        tracing::debug!(
            machine_id = update.machine_id,
            status = %update.status,
            source = ?update.source,
            patched,
            "Machine update received"
        );

        if selected || update.source == UpdateSource::Database || !patched {
            self.refresh().await;
        }
    }

    /// Counters move only for rows another station wrote against our order.
    fn apply_production(&self, logged: &ProductionLogged) {
        let state = self.state.snapshot();
        if state.active_order_id() != Some(logged.order_id)
            || !logged.kind.counts_toward_active_order()
            || logged.client_id == Some(self.client_id)
        {
            return;
        }

        tracing::info!(
            order_id = logged.order_id,
            kind = %logged.kind,
            quantity = logged.quantity,
            scrap = logged.scrap,
            "Applying production logged by another station"
        );
        // Both counters move in one revision.
        self.state.batch(|s| {
            s.produced = s.produced.saturating_add_signed(logged.quantity);
            s.scrap = s.scrap.saturating_add_signed(logged.scrap);
        });
    }

    /// Refetch every machine and refresh the selected machine snapshot.
    ///
    /// On failure the cache is left as it was. Returns whether the refetch
    /// succeeded.
    pub async fn refresh(&self) -> bool {
        let machines = match self.store.list_machines().await {
            Ok(machines) => machines,
            Err(e) => {
                tracing::warn!(error = %e, "Machine refetch failed, keeping cached list");
                return false;
            }
        };

        let snapshots: Vec<MachineSnapshot> = machines
            .iter()
            .filter_map(|m| match m.snapshot() {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    tracing::warn!(machine_id = m.id, error = %e, "Skipping undecodable machine");
                    None
                }
            })
            .collect();

        if let Some(selected) = self.state.snapshot().selected_machine_id {
            if let Some(machine) = snapshots.iter().find(|m| m.id == selected) {
                if self.state.snapshot().machine.as_ref() != Some(machine) {
                    self.state.set_machine(Some(machine.clone()));
                }
            }
        }
        self.cache.replace_all(snapshots).await;
        true
    }
}
