//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans [`FloorEvent`]s out to every subscriber. Both the
//! lifecycle controller (after its own writes) and the Postgres listener
//! publish here; the realtime consumer is the main subscriber.

use chrono::Utc;
use mes_core::status::{MachineStatus, ProductionLogKind};
use mes_core::types::{ClientId, DbId, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Where a floor event originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateSource {
    /// Broadcast by this station right after a successful write.
    Local,
    /// Delivered by a database change notification.
    Database,
}

/// New status of one machine, with its optional associations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineUpdate {
    pub machine_id: DbId,
    pub status: MachineStatus,
    pub operator_id: Option<DbId>,
    pub order_id: Option<DbId>,
    pub source: UpdateSource,
    pub at: Timestamp,
}

impl MachineUpdate {
    /// A locally originated update stamped with the current time.
    pub fn new(machine_id: DbId, status: MachineStatus) -> Self {
        Self {
            machine_id,
            status,
            operator_id: None,
            order_id: None,
            source: UpdateSource::Local,
            at: Utc::now(),
        }
    }

    pub fn with_order(mut self, order_id: Option<DbId>) -> Self {
        self.order_id = order_id;
        self
    }

    pub fn with_operator(mut self, operator_id: Option<DbId>) -> Self {
        self.operator_id = operator_id;
        self
    }

    pub fn with_source(mut self, source: UpdateSource) -> Self {
        self.source = source;
        self
    }

    pub fn at(mut self, at: Timestamp) -> Self {
        self.at = at;
        self
    }
}

/// A production log row was written by some station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionLogged {
    pub log_id: DbId,
    pub machine_id: DbId,
    pub order_id: DbId,
    pub kind: ProductionLogKind,
    pub quantity: i64,
    pub scrap: i64,
    /// Station that wrote the row, when known.
    pub client_id: Option<ClientId>,
}

/// Anything that happened on the shop floor that a station may care about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FloorEvent {
    MachineUpdated(MachineUpdate),
    ProductionLogged(ProductionLogged),
}

impl FloorEvent {
    pub fn machine_id(&self) -> DbId {
        match self {
            Self::MachineUpdated(u) => u.machine_id,
            Self::ProductionLogged(l) => l.machine_id,
        }
    }
}

impl From<MachineUpdate> for FloorEvent {
    fn from(update: MachineUpdate) -> Self {
        Self::MachineUpdated(update)
    }
}

impl From<ProductionLogged> for FloorEvent {
    fn from(logged: ProductionLogged) -> Self {
        Self::ProductionLogged(logged)
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// When the buffer is full the oldest events are dropped and slow receivers
/// observe `RecvError::Lagged`.
pub struct EventBus {
    sender: broadcast::Sender<FloorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Dropped silently when nobody is subscribed.
    pub fn publish(&self, event: impl Into<FloorEvent>) {
        let _ = self.sender.send(event.into());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FloorEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
