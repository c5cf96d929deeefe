//! Shared machine list, patched by realtime updates.

use mes_core::client_state::MachineSnapshot;
use mes_core::types::DbId;
use tokio::sync::RwLock;

use crate::bus::MachineUpdate;

/// The station's view of every machine on the floor.
///
/// Thread-safe via interior `RwLock`; wrap in `Arc` to share.
#[derive(Default)]
pub struct MachineCache {
    machines: RwLock<Vec<MachineSnapshot>>,
}

impl MachineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole list with a fresh read from the store.
    pub async fn replace_all(&self, machines: Vec<MachineSnapshot>) {
        *self.machines.write().await = machines;
    }

    /// Patch the entry matching `update.machine_id`.
    ///
    /// Status, change time and both associations are overwritten; name and
    /// sector are kept. Returns `false` when no entry matches.
    pub async fn apply(&self, update: &MachineUpdate) -> bool {
        let mut machines = self.machines.write().await;
        match machines.iter_mut().find(|m| m.id == update.machine_id) {
            Some(machine) => {
                machine.status = update.status;
                machine.status_changed_at = Some(update.at);
                machine.current_order_id = update.order_id;
                machine.operator_id = update.operator_id;
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, machine_id: DbId) -> Option<MachineSnapshot> {
        self.machines
            .read()
            .await
            .iter()
            .find(|m| m.id == machine_id)
            .cloned()
    }

    pub async fn list(&self) -> Vec<MachineSnapshot> {
        self.machines.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.machines.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.machines.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use mes_core::status::MachineStatus;

    use super::*;

    fn snapshot(id: DbId, name: &str) -> MachineSnapshot {
        MachineSnapshot {
            id,
            name: name.into(),
            sector: Some("Molding".into()),
            status: MachineStatus::Available,
            status_changed_at: None,
            current_order_id: None,
            operator_id: None,
        }
    }

    #[tokio::test]
    async fn apply_patches_only_the_matching_entry() {
        let cache = MachineCache::new();
        cache
            .replace_all(vec![snapshot(1, "Injector 1"), snapshot(2, "Injector 2")])
            .await;

        let update = MachineUpdate::new(2, MachineStatus::Setup)
            .with_order(Some(40))
            .with_operator(Some(5));
        assert!(cache.apply(&update).await);

        let first = cache.get(1).await.unwrap();
        let second = cache.get(2).await.unwrap();
        assert_eq!(first.status, MachineStatus::Available);
        assert_eq!(second.status, MachineStatus::Setup);
        assert_eq!(second.current_order_id, Some(40));
        assert_eq!(second.operator_id, Some(5));
        assert_eq!(second.name, "Injector 2");
        assert_eq!(second.status_changed_at, Some(update.at));
    }

    #[tokio::test]
    async fn apply_reports_unknown_machine() {
        let cache = MachineCache::new();
        cache.replace_all(vec![snapshot(1, "Injector 1")]).await;

        assert!(!cache.apply(&MachineUpdate::new(9, MachineStatus::Running)).await);
        assert_eq!(cache.len().await, 1);
    }
}
