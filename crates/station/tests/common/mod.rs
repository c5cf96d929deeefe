//! Shared fixture for the station integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use mes_core::clock::ManualClock;
use mes_core::state_store::{MemoryPersistence, StateStore};
use mes_core::types::{DbId, Timestamp};
use mes_db::InMemoryShopFloorStore;
use mes_events::EventBus;
use mes_station::LifecycleController;
use uuid::Uuid;

pub fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).unwrap()
}

pub struct Station {
    pub store: Arc<InMemoryShopFloorStore>,
    pub state: Arc<StateStore>,
    pub persistence: Arc<MemoryPersistence>,
    pub bus: Arc<EventBus>,
    pub clock: Arc<ManualClock>,
    pub controller: LifecycleController,
}

impl Station {
    /// A station over an empty store, clock at [`t0`].
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryShopFloorStore::new()))
    }

    /// A second station sharing `store`, as on another device.
    pub fn with_store(store: Arc<InMemoryShopFloorStore>) -> Self {
        let persistence = Arc::new(MemoryPersistence::new());
        let state = Arc::new(StateStore::new(persistence.clone()));
        let bus = Arc::new(EventBus::default());
        let clock = Arc::new(ManualClock::new(t0()));
        let controller = LifecycleController::new(
            store.clone(),
            state.clone(),
            bus.clone(),
            clock.clone(),
            Uuid::now_v7(),
        );
        Self {
            store,
            state,
            persistence,
            bus,
            clock,
            controller,
        }
    }

    /// Seed one machine and select it.
    pub async fn with_machine(name: &str) -> (Self, DbId) {
        let station = Self::new();
        let machine_id = station.store.add_machine(name, Some("Stamping"));
        station
            .controller
            .select_machine(machine_id)
            .await
            .expect("select seeded machine");
        (station, machine_id)
    }

    pub fn advance(&self, secs: i64) {
        self.clock.advance_secs(secs);
    }

    pub fn advance_millis(&self, millis: i64) {
        self.clock.advance(Duration::milliseconds(millis));
    }
}
