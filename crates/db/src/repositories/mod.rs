//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod lot_repo;
pub mod machine_repo;
pub mod operator_assignment_repo;
pub mod production_log_repo;
pub mod production_order_repo;
pub mod stoppage_repo;

pub use lot_repo::LotRepo;
pub use machine_repo::MachineRepo;
pub use operator_assignment_repo::OperatorAssignmentRepo;
pub use production_log_repo::ProductionLogRepo;
pub use production_order_repo::ProductionOrderRepo;
pub use stoppage_repo::StoppageRepo;
