//! Stoppage record model.

use mes_core::phase::Phase;
use mes_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `stoppages` table. Open while `ended_at` is null.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Stoppage {
    pub id: DbId,
    pub machine_id: DbId,
    pub order_id: Option<DbId>,
    pub reason_id: DbId,
    pub notes: Option<String>,
    /// Phase label active before the stop, see [`Phase::label`].
    pub prior_phase: Option<String>,
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
}

impl Stoppage {
    /// The resumable phase recorded with the stop, if it is one.
    pub fn prior_phase(&self) -> Option<Phase> {
        self.prior_phase
            .as_deref()
            .and_then(|label| label.parse::<Phase>().ok())
            .filter(|phase| phase.is_resumable())
    }
}

/// DTO for opening a stoppage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateStoppage {
    pub machine_id: DbId,
    pub order_id: Option<DbId>,
    pub reason_id: DbId,
    pub notes: Option<String>,
    pub prior_phase: Option<Phase>,
    pub started_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn stoppage(prior: Option<&str>) -> Stoppage {
        Stoppage {
            id: 1,
            machine_id: 2,
            order_id: Some(3),
            reason_id: 4,
            notes: None,
            prior_phase: prior.map(str::to_string),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    #[test]
    fn prior_phase_only_yields_resumable_phases() {
        assert_eq!(stoppage(Some("SETUP")).prior_phase(), Some(Phase::Setup));
        assert_eq!(stoppage(Some("RUNNING")).prior_phase(), Some(Phase::Running));
        assert_eq!(stoppage(Some("IDLE")).prior_phase(), None);
        assert_eq!(stoppage(Some("garbage")).prior_phase(), None);
        assert_eq!(stoppage(None).prior_phase(), None);
    }
}
