//! Repository for the `stoppages` table.

use mes_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::stoppage::{CreateStoppage, Stoppage};

/// Column list for `stoppages` queries.
const COLUMNS: &str = "\
    id, machine_id, order_id, reason_id, notes, prior_phase, started_at, ended_at";

/// Provides open/close operations for machine stoppages.
pub struct StoppageRepo;

impl StoppageRepo {
    /// Open a stoppage.
    pub async fn insert(pool: &PgPool, input: &CreateStoppage) -> Result<Stoppage, sqlx::Error> {
        let query = format!(
            "INSERT INTO stoppages \
                (machine_id, order_id, reason_id, notes, prior_phase, started_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Stoppage>(&query)
            .bind(input.machine_id)
            .bind(input.order_id)
            .bind(input.reason_id)
            .bind(&input.notes)
            .bind(input.prior_phase.map(|p| p.label()))
            .bind(input.started_at)
            .fetch_one(pool)
            .await
    }

    /// Close every open stoppage of a machine and return the most recent
    /// one.
    pub async fn close_open(
        pool: &PgPool,
        machine_id: DbId,
        ended_at: Timestamp,
    ) -> Result<Option<Stoppage>, sqlx::Error> {
        let query = format!(
            "UPDATE stoppages SET ended_at = $2 \
             WHERE machine_id = $1 AND ended_at IS NULL \
             RETURNING {COLUMNS}"
        );
        let mut closed = sqlx::query_as::<_, Stoppage>(&query)
            .bind(machine_id)
            .bind(ended_at)
            .fetch_all(pool)
            .await?;
        closed.sort_by_key(|s| s.started_at);
        Ok(closed.pop())
    }
}
