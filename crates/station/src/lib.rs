//! Station runtime: the production-order lifecycle controller, the phase
//! ticker and the environment configuration used by the `mes-station`
//! daemon.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod ticker;

pub use config::StationConfig;
pub use error::LifecycleError;
pub use lifecycle::LifecycleController;
pub use ticker::PhaseTicker;
