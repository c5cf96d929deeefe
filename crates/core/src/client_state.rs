//! Locally observed machine/order/phase state.

use serde::{Deserialize, Serialize};

use crate::accumulators::PhaseAccumulators;
use crate::phase::Phase;
use crate::status::MachineStatus;
use crate::types::{DbId, Timestamp};

/// The machine as last read from the remote store or patched by a realtime
/// update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub id: DbId,
    pub name: String,
    pub sector: Option<String>,
    pub status: MachineStatus,
    pub status_changed_at: Option<Timestamp>,
    pub current_order_id: Option<DbId>,
    pub operator_id: Option<DbId>,
}

/// Identity of the order the station is working on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveOrder {
    pub id: DbId,
    pub code: String,
    pub target_quantity: i64,
    /// Durations already stored on the order when this station started it.
    /// Zero when the local accumulators were loaded from the order instead.
    #[serde(default)]
    pub recorded: PhaseAccumulators,
}

/// Which live counter an adjustment applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    Produced,
    Scrap,
}

/// Partial timer update. `None` fields keep their current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerSync {
    pub phase_changed_at: Option<Timestamp>,
    pub setup_secs: Option<u64>,
    pub run_secs: Option<u64>,
    pub stop_secs: Option<u64>,
}

impl TimerSync {
    /// Set every field: a new phase base and the full accumulator set.
    pub fn full(phase_changed_at: Timestamp, accumulated: PhaseAccumulators) -> Self {
        Self {
            phase_changed_at: Some(phase_changed_at),
            setup_secs: Some(accumulated.setup_secs),
            run_secs: Some(accumulated.run_secs),
            stop_secs: Some(accumulated.stop_secs),
        }
    }
}

/// Full client state held by the [`StateStore`](crate::state_store::StateStore).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientState {
    pub selected_machine_id: Option<DbId>,
    pub machine: Option<MachineSnapshot>,
    pub order: Option<ActiveOrder>,
    pub phase: Phase,
    pub phase_changed_at: Option<Timestamp>,
    pub accumulated: PhaseAccumulators,
    pub produced: u64,
    pub scrap: u64,
    /// Target quantity of the active order.
    pub meta: u64,
    /// Phase active when the current stop was registered.
    pub pre_stop_phase: Option<Phase>,
    pub operator_id: Option<DbId>,
    pub operator_session_started_at: Option<Timestamp>,
    /// Bumped on every mutation; not persisted.
    pub revision: u64,
}

impl ClientState {
    pub fn active_order_id(&self) -> Option<DbId> {
        self.order.as_ref().map(|o| o.id)
    }
}

/// The subset of [`ClientState`] that survives a restart.
///
/// The machine snapshot is not kept: it is re-read from the remote store
/// when the selected machine is restored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    pub selected_machine_id: Option<DbId>,
    pub order: Option<ActiveOrder>,
    pub phase: Phase,
    pub phase_changed_at: Option<Timestamp>,
    pub accumulated: PhaseAccumulators,
    pub produced: u64,
    pub scrap: u64,
    pub meta: u64,
    pub pre_stop_phase: Option<Phase>,
    pub operator_id: Option<DbId>,
    pub operator_session_started_at: Option<Timestamp>,
}

impl From<&ClientState> for PersistedState {
    fn from(state: &ClientState) -> Self {
        Self {
            selected_machine_id: state.selected_machine_id,
            order: state.order.clone(),
            phase: state.phase,
            phase_changed_at: state.phase_changed_at,
            accumulated: state.accumulated,
            produced: state.produced,
            scrap: state.scrap,
            meta: state.meta,
            pre_stop_phase: state.pre_stop_phase,
            operator_id: state.operator_id,
            operator_session_started_at: state.operator_session_started_at,
        }
    }
}

impl PersistedState {
    /// Copy the persisted fields into `state`, leaving the rest untouched.
    pub fn apply_to(self, state: &mut ClientState) {
        state.selected_machine_id = self.selected_machine_id;
        state.order = self.order;
        state.phase = self.phase;
        state.phase_changed_at = self.phase_changed_at;
        state.accumulated = self.accumulated;
        state.produced = self.produced;
        state.scrap = self.scrap;
        state.meta = self.meta;
        state.pre_stop_phase = self.pre_stop_phase;
        state.operator_id = self.operator_id;
        state.operator_session_started_at = self.operator_session_started_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_subset_omits_machine_and_revision() {
        let state = ClientState {
            selected_machine_id: Some(3),
            machine: Some(MachineSnapshot {
                id: 3,
                name: "Press 3".into(),
                sector: None,
                status: MachineStatus::Running,
                status_changed_at: None,
                current_order_id: Some(9),
                operator_id: None,
            }),
            produced: 12,
            revision: 40,
            ..Default::default()
        };

        let persisted = PersistedState::from(&state);
        let mut restored = ClientState::default();
        persisted.apply_to(&mut restored);

        assert_eq!(restored.selected_machine_id, Some(3));
        assert_eq!(restored.produced, 12);
        assert!(restored.machine.is_none());
        assert_eq!(restored.revision, 0);
    }

    #[test]
    fn persisted_state_tolerates_missing_fields() {
        let persisted: PersistedState =
            serde_json::from_str(r#"{"selected_machine_id": 7}"#).unwrap();
        assert_eq!(persisted.selected_machine_id, Some(7));
        assert_eq!(persisted.phase, Phase::Idle);
    }
}
