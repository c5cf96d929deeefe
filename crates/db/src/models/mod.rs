//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A create DTO for inserts, where rows are inserted by the station

pub mod lot;
pub mod machine;
pub mod operator_assignment;
pub mod production_log;
pub mod production_order;
pub mod stoppage;
