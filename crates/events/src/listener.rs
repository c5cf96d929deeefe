//! Postgres change notifications onto the event bus.
//!
//! The migration installs triggers that `pg_notify` a JSON payload on every
//! machine change and every production log insert. [`PgChangeListener`]
//! `LISTEN`s on that channel and republishes each payload as a
//! [`FloorEvent`] with source [`UpdateSource::Database`].

use std::sync::Arc;
use std::time::Duration;

use mes_core::status::{MachineStatus, ProductionLogKind};
use mes_core::types::{ClientId, DbId, Timestamp};
use mes_db::DbPool;
use serde::Deserialize;
use sqlx::postgres::PgListener;
use tokio_util::sync::CancellationToken;

use crate::bus::{EventBus, FloorEvent, MachineUpdate, ProductionLogged, UpdateSource};

/// Notification channel the triggers publish on. Fixed in the mes-db
/// migrations, so it is not configurable.
pub const CHANGE_CHANNEL: &str = "floor_changes";

/// Pause between failed receive attempts.
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Trigger payload, discriminated by the source table.
#[derive(Debug, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
enum ChangePayload {
    Machines {
        machine_id: DbId,
        status: MachineStatus,
        operator_id: Option<DbId>,
        order_id: Option<DbId>,
        at: Timestamp,
    },
    ProductionLogs {
        log_id: DbId,
        machine_id: DbId,
        order_id: DbId,
        kind: ProductionLogKind,
        quantity: i64,
        scrap: i64,
        client_id: Option<ClientId>,
    },
}

impl From<ChangePayload> for FloorEvent {
    fn from(payload: ChangePayload) -> Self {
        match payload {
            ChangePayload::Machines {
                machine_id,
                status,
                operator_id,
                order_id,
                at,
            } => MachineUpdate::new(machine_id, status)
                .with_operator(operator_id)
                .with_order(order_id)
                .with_source(UpdateSource::Database)
                .at(at)
                .into(),
            ChangePayload::ProductionLogs {
                log_id,
                machine_id,
                order_id,
                kind,
                quantity,
                scrap,
                client_id,
            } => ProductionLogged {
                log_id,
                machine_id,
                order_id,
                kind,
                quantity,
                scrap,
                client_id,
            }
            .into(),
        }
    }
}

/// Decode one notification payload.
pub fn parse_notification(payload: &str) -> Result<FloorEvent, serde_json::Error> {
    serde_json::from_str::<ChangePayload>(payload).map(FloorEvent::from)
}

/// Background service bridging `LISTEN/NOTIFY` to the [`EventBus`].
pub struct PgChangeListener;

impl PgChangeListener {
    /// Run the listener loop until `cancel` is triggered.
    ///
    /// Returns an error only if the initial `LISTEN` cannot be set up;
    /// later receive failures are logged and retried.
    pub async fn run(
        pool: DbPool,
        bus: Arc<EventBus>,
        cancel: CancellationToken,
    ) -> Result<(), sqlx::Error> {
        let mut listener = PgListener::connect_with(&pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;
        tracing::info!(channel = CHANGE_CHANNEL, "Listening for floor changes");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Change listener stopping");
                    break;
                }
                received = listener.recv() => match received {
                    Ok(notification) => match parse_notification(notification.payload()) {
                        Ok(event) => bus.publish(event),
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                payload = notification.payload(),
                                "Ignoring malformed change notification"
                            );
                        }
                    },
                    Err(e) => {
                        tracing::error!(error = %e, "Change listener receive failed, retrying");
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(RETRY_DELAY) => {}
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parses_machine_payload_as_database_update() {
        let payload = r#"{"table":"machines","machine_id":3,"status":"STOPPED",
            "operator_id":12,"order_id":null,"at":"2026-03-02T06:00:00.123456+00:00"}"#;

        assert_matches!(parse_notification(payload), Ok(FloorEvent::MachineUpdated(u)) => {
            assert_eq!(u.machine_id, 3);
            assert_eq!(u.status, MachineStatus::Stopped);
            assert_eq!(u.operator_id, Some(12));
            assert_eq!(u.order_id, None);
            assert_eq!(u.source, UpdateSource::Database);
        });
    }

    #[test]
    fn parses_production_log_payload() {
        let payload = r#"{"table":"production_logs","log_id":8,"machine_id":3,"order_id":40,
            "kind":"SENSOR","quantity":25,"scrap":2,
            "client_id":"01890a5d-ac96-774b-bcce-b302099a8057"}"#;

        assert_matches!(parse_notification(payload), Ok(FloorEvent::ProductionLogged(l)) => {
            assert_eq!(l.order_id, 40);
            assert_eq!(l.kind, ProductionLogKind::Sensor);
            assert_eq!(l.quantity, 25);
            assert!(l.client_id.is_some());
        });
    }

    #[test]
    fn channel_matches_the_migration_triggers() {
        let migration =
            include_str!("../../db/migrations/20260301000001_create_shop_floor_tables.sql");
        let notify = format!("pg_notify('{CHANGE_CHANNEL}'");
        assert_eq!(migration.matches(notify.as_str()).count(), 2);
    }

    #[test]
    fn rejects_unknown_table_and_status() {
        assert!(parse_notification(r#"{"table":"lots","id":1}"#).is_err());
        assert!(parse_notification(
            r#"{"table":"machines","machine_id":1,"status":"EXPLODED","at":"2026-03-02T06:00:00Z"}"#
        )
        .is_err());
    }
}
