//! Shop-floor station core: domain enums, the machine phase state machine,
//! phase accumulators, the live phase timer and the persisted client state
//! store.
//!
//! This crate has zero internal deps so it can be used by the database
//! layer, the realtime consumer and the station controller alike.

pub mod accumulators;
pub mod client_state;
pub mod clock;
pub mod error;
pub mod lot;
pub mod oee;
pub mod phase;
pub mod phase_timer;
pub mod reports;
pub mod state_store;
pub mod status;
pub mod types;
