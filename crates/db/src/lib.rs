//! Postgres access for the shop-floor station.
//!
//! - [`models`]: row structs and insert/update DTOs.
//! - [`repositories`]: zero-sized repositories over `&PgPool`.
//! - [`store`]: the [`ShopFloorStore`] contract the controller depends on,
//!   and its Postgres implementation.
//! - [`memory`]: an in-process implementation of the same contract.

use sqlx::postgres::PgPoolOptions;

pub mod memory;
pub mod models;
pub mod repositories;
pub mod store;

pub use memory::InMemoryShopFloorStore;
pub use store::{PgShopFloorStore, ShopFloorStore, StoreError};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to make sure the database answers.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded migrations under `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
