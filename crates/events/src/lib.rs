//! Realtime plumbing for the station.
//!
//! - [`bus`]: in-process broadcast of [`FloorEvent`](bus::FloorEvent)s.
//! - [`cache`]: the shared machine list kept in sync with the floor.
//! - [`consumer`]: applies floor events to the cache and the client state.
//! - [`listener`]: bridges Postgres `LISTEN/NOTIFY` onto the bus.

pub mod bus;
pub mod cache;
pub mod consumer;
pub mod listener;

pub use bus::{EventBus, FloorEvent, MachineUpdate, ProductionLogged, UpdateSource};
pub use cache::MachineCache;
pub use consumer::RealtimeConsumer;
pub use listener::PgChangeListener;
