//! Integration tests for the shop-floor repositories.
//!
//! These run against a real Postgres (`DATABASE_URL`) through
//! `#[sqlx::test]`, which creates a scratch database per test and applies the
//! crate migrations. Run with `cargo test -p mes-db -- --ignored`.

use chrono::{TimeZone, Utc};
use mes_core::phase::Phase;
use mes_core::status::{MachineStatus, ProductionLogKind};
use mes_core::types::{DbId, Timestamp};
use mes_db::models::machine::MachineStatusUpdate;
use mes_db::models::production_log::CreateProductionLog;
use mes_db::models::stoppage::CreateStoppage;
use mes_db::repositories::{MachineRepo, ProductionLogRepo, ProductionOrderRepo, StoppageRepo};
use sqlx::PgPool;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).unwrap()
}

async fn insert_machine(pool: &PgPool, name: &str) -> DbId {
    sqlx::query_scalar("INSERT INTO machines (name, operator_id) VALUES ($1, 77) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn insert_order(pool: &PgPool, code: &str, machine_id: DbId, sequence: i32) -> DbId {
    sqlx::query_scalar(
        "INSERT INTO production_orders (code, target_quantity, machine_id, sequence) \
         VALUES ($1, 100, $2, $3) RETURNING id",
    )
    .bind(code)
    .bind(machine_id)
    .bind(sequence)
    .fetch_one(pool)
    .await
    .unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn status_update_preserves_operator(pool: PgPool) {
    let machine_id = insert_machine(&pool, "Press 1").await;
    let order_id = insert_order(&pool, "OP-1", machine_id, 1).await;

    MachineRepo::update_status(
        &pool,
        machine_id,
        &MachineStatusUpdate::new(MachineStatus::Setup, Some(order_id), t0()),
    )
    .await
    .unwrap();
    MachineRepo::update_status(&pool, machine_id, &MachineStatusUpdate::released(t0()))
        .await
        .unwrap();

    let machine = MachineRepo::find_by_id(&pool, machine_id).await.unwrap().unwrap();
    assert_eq!(machine.status().unwrap(), MachineStatus::Available);
    assert_eq!(machine.current_order_id, None);
    assert_eq!(machine.operator_id, Some(77));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn next_queued_follows_sequence_and_skips_current(pool: PgPool) {
    let machine_id = insert_machine(&pool, "Lathe").await;
    let first = insert_order(&pool, "OP-A", machine_id, 1).await;
    let second = insert_order(&pool, "OP-B", machine_id, 2).await;
    insert_order(&pool, "OP-C", machine_id, 3).await;

    let next = ProductionOrderRepo::next_queued(&pool, machine_id, first)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.id, second);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn production_log_insert_is_idempotent(pool: PgPool) {
    let machine_id = insert_machine(&pool, "Mill").await;
    let order_id = insert_order(&pool, "OP-9", machine_id, 1).await;
    let input = CreateProductionLog {
        machine_id,
        order_id,
        kind: ProductionLogKind::Finalization,
        quantity: 12,
        scrap: 1,
        started_at: Some(t0()),
        ended_at: t0(),
        client_id: None,
        idempotency_key: Uuid::now_v7(),
    };

    let first = ProductionLogRepo::insert(&pool, &input).await.unwrap();
    let second = ProductionLogRepo::insert(&pool, &input).await.unwrap();

    assert_eq!(first.id, second.id);
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM production_logs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a Postgres DATABASE_URL"]
async fn closing_stoppage_returns_prior_phase(pool: PgPool) {
    let machine_id = insert_machine(&pool, "Oven").await;
    StoppageRepo::insert(
        &pool,
        &CreateStoppage {
            machine_id,
            order_id: None,
            reason_id: 3,
            notes: Some("jam".into()),
            prior_phase: Some(Phase::Setup),
            started_at: t0(),
        },
    )
    .await
    .unwrap();

    let closed = StoppageRepo::close_open(&pool, machine_id, t0())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(closed.prior_phase(), Some(Phase::Setup));
    assert!(StoppageRepo::close_open(&pool, machine_id, t0())
        .await
        .unwrap()
        .is_none());
}
