//! `mes-station` -- shop-floor station daemon.
//!
//! Connects to the MES database, restores the persisted client state,
//! reselects the machine and keeps the machine list, the client state and
//! the phase timer live until Ctrl-C. See [`StationConfig`] for the
//! environment variables.

use std::sync::Arc;

use anyhow::Context;
use mes_core::clock::{Clock, SystemClock};
use mes_core::state_store::{JsonFilePersistence, StateStore};
use mes_db::{PgShopFloorStore, ShopFloorStore};
use mes_events::{EventBus, MachineCache, PgChangeListener, RealtimeConsumer};
use mes_station::{LifecycleController, PhaseTicker, StationConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mes_station=info,mes_events=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = StationConfig::from_env().context("invalid station configuration")?;
    let client_id = Uuid::now_v7();
    tracing::info!(
        %client_id,
        state_file = %config.state_file.display(),
        "Starting mes-station"
    );

    let pool = mes_db::create_pool(&config.database_url, config.db_max_connections)
        .await
        .context("failed to connect to the database")?;
    mes_db::health_check(&pool).await.context("database health check failed")?;
    mes_db::run_migrations(&pool).await.context("failed to run migrations")?;

    let store: Arc<dyn ShopFloorStore> = Arc::new(PgShopFloorStore::new(pool.clone()));
    let state = Arc::new(StateStore::new(Arc::new(JsonFilePersistence::new(
        config.state_file.clone(),
    ))));
    if state.restore() {
        tracing::info!("Restored persisted station state");
    }
    let bus = Arc::new(EventBus::default());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = Arc::new(MachineCache::new());
    let cancel = CancellationToken::new();

    let consumer = RealtimeConsumer::new(store.clone(), cache.clone(), state.clone(), client_id);
    consumer.refresh().await;
    let consumer_handle = consumer.spawn(&bus, cancel.clone());

    let listener_handle = tokio::spawn(PgChangeListener::run(
        pool.clone(),
        bus.clone(),
        cancel.clone(),
    ));

    let controller = LifecycleController::new(store, state.clone(), bus, clock.clone(), client_id);
    let machine_id = config.machine_id.or(state.snapshot().selected_machine_id);
    if let Some(machine_id) = machine_id {
        match controller.select_machine(machine_id).await {
            Ok(machine) => tracing::info!(
                machine_id,
                name = %machine.name,
                status = %machine.status,
                "Machine selected"
            ),
            Err(e) => tracing::error!(machine_id, error = %e, "Failed to select machine"),
        }
    } else {
        tracing::warn!("No machine selected; set STATION_MACHINE_ID");
    }
    tracing::info!(machines = cache.len().await, "Station ready");

    let ticker = PhaseTicker::spawn(state, clock, config.tick, &cancel);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    cancel.cancel();
    ticker.shutdown().await;
    if let Err(e) = consumer_handle.await {
        tracing::warn!(error = %e, "Realtime consumer task failed");
    }
    match listener_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "Change listener exited with an error"),
        Err(e) => tracing::warn!(error = %e, "Change listener task failed"),
    }

    tracing::info!("mes-station stopped");
    Ok(())
}
