//! Persisted client state store.
//!
//! [`StateStore`] is the single source of truth for the locally observed
//! machine/order/phase state. It is an explicit container injected into the
//! controller and the realtime consumer; observers subscribe through a
//! `tokio::sync::watch` channel. After every mutation the persisted subset
//! is written through a [`StatePersistence`] backend on a best-effort basis.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tempfile::NamedTempFile;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::watch;

use crate::accumulators::PhaseAccumulators;
use crate::client_state::{
    ActiveOrder, ClientState, CounterKind, MachineSnapshot, PersistedState, TimerSync,
};
use crate::error::CoreError;
use crate::phase::Phase;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Persistence backends
// ---------------------------------------------------------------------------

/// Durable storage for the persisted subset of the client state.
pub trait StatePersistence: Send + Sync {
    fn load(&self) -> Result<Option<PersistedState>, CoreError>;
    fn save(&self, state: &PersistedState) -> Result<(), CoreError>;
}

/// Stores the persisted subset as a JSON document on disk.
///
/// Each write goes to its own uniquely named temp file in the target's
/// directory which is then renamed over the target, so a crash mid-write
/// leaves the previous document intact and concurrent writers never share
/// a temp file.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatePersistence for JsonFilePersistence {
    fn load(&self) -> Result<Option<PersistedState>, CoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CoreError::Internal(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                )))
            }
        };
        serde_json::from_str(&raw).map(Some).map_err(|e| {
            CoreError::Internal(format!(
                "Corrupt state file {}: {e}",
                self.path.display()
            ))
        })
    }

    fn save(&self, state: &PersistedState) -> Result<(), CoreError> {
        let json = serde_json::to_vec_pretty(state)
            .map_err(|e| CoreError::Internal(format!("Failed to encode state: {e}")))?;
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let write = || -> std::io::Result<()> {
            let mut file = NamedTempFile::new_in(dir)?;
            file.write_all(&json)?;
            file.as_file().sync_all()?;
            file.persist(&self.path).map_err(|e| e.error)?;
            Ok(())
        };
        off_worker(write).map_err(|e| {
            CoreError::Internal(format!("Failed to write {}: {e}", self.path.display()))
        })
    }
}

/// Run blocking file I/O, moving a multi-threaded runtime worker out of the
/// way first. Current-thread runtimes cannot do that and run it inline.
fn off_worker<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

/// Keeps the persisted subset in memory. Used by tests and ephemeral
/// stations.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    slot: Mutex<Option<PersistedState>>,
    saves: AtomicUsize,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PersistedState) -> Self {
        Self {
            slot: Mutex::new(Some(state)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> Option<PersistedState> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl StatePersistence for MemoryPersistence {
    fn load(&self) -> Result<Option<PersistedState>, CoreError> {
        Ok(self.stored())
    }

    fn save(&self, state: &PersistedState) -> Result<(), CoreError> {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

/// Observable, persisted state container.
///
/// None of the mutations can fail. Persistence errors are logged and
/// otherwise ignored.
pub struct StateStore {
    sender: watch::Sender<ClientState>,
    persistence: Arc<dyn StatePersistence>,
    /// Held from snapshot to save so the last write carries the last state.
    writing: Mutex<()>,
}

impl StateStore {
    pub fn new(persistence: Arc<dyn StatePersistence>) -> Self {
        let (sender, _) = watch::channel(ClientState::default());
        Self {
            sender,
            persistence,
            writing: Mutex::new(()),
        }
    }

    /// A store backed by [`MemoryPersistence`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryPersistence::new()))
    }

    /// Load the persisted subset, if any. Returns `true` when state was
    /// restored.
    pub fn restore(&self) -> bool {
        match self.persistence.load() {
            Ok(Some(persisted)) => {
                self.sender.send_modify(|state| {
                    persisted.apply_to(state);
                    state.revision += 1;
                });
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to restore station state, starting empty");
                false
            }
        }
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> ClientState {
        self.sender.borrow().clone()
    }

    /// Receive a notification after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.sender.subscribe()
    }

    pub fn set_selected_machine(&self, machine_id: Option<DbId>) {
        self.update(|state| state.selected_machine_id = machine_id);
    }

    pub fn set_machine(&self, machine: Option<MachineSnapshot>) {
        self.update(|state| state.machine = machine);
    }

    /// Switch the active order. Counters are per order, so they are always
    /// reset; `meta` follows the new order's target quantity.
    pub fn set_active_order(&self, order: Option<ActiveOrder>) {
        self.update(|state| {
            state.produced = 0;
            state.scrap = 0;
            state.meta = order
                .as_ref()
                .map(|o| u64::try_from(o.target_quantity).unwrap_or(0))
                .unwrap_or(0);
            state.order = order;
        });
    }

    pub fn set_phase(&self, phase: Phase) {
        self.update(|state| state.phase = phase);
    }

    pub fn set_pre_stop_phase(&self, phase: Option<Phase>) {
        self.update(|state| state.pre_stop_phase = phase);
    }

    /// Merge a partial timer update; omitted fields keep their value.
    pub fn sync_timers(&self, sync: TimerSync) {
        self.update(|state| {
            if let Some(at) = sync.phase_changed_at {
                state.phase_changed_at = Some(at);
            }
            let acc: &mut PhaseAccumulators = &mut state.accumulated;
            if let Some(secs) = sync.setup_secs {
                acc.setup_secs = secs;
            }
            if let Some(secs) = sync.run_secs {
                acc.run_secs = secs;
            }
            if let Some(secs) = sync.stop_secs {
                acc.stop_secs = secs;
            }
        });
    }

    /// Apply a signed delta to a counter, clamped at zero.
    pub fn adjust_counter(&self, kind: CounterKind, delta: i64) {
        self.update(|state| {
            let counter = match kind {
                CounterKind::Produced => &mut state.produced,
                CounterKind::Scrap => &mut state.scrap,
            };
            *counter = if delta >= 0 {
                counter.saturating_add(delta.unsigned_abs())
            } else {
                counter.saturating_sub(delta.unsigned_abs())
            };
        });
    }

    /// Clear every field back to its initial value.
    pub fn reset(&self) {
        self.update(|state| {
            let revision = state.revision;
            *state = ClientState {
                revision,
                ..ClientState::default()
            };
        });
    }

    /// Apply several mutations with a single notification and write.
    pub fn batch(&self, f: impl FnOnce(&mut ClientState)) {
        self.update(f);
    }

    fn update(&self, f: impl FnOnce(&mut ClientState)) {
        self.sender.send_modify(|state| {
            f(state);
            state.revision += 1;
        });
        self.persist();
    }

    fn persist(&self) {
        let _writing = self.writing.lock().unwrap_or_else(|e| e.into_inner());
        let persisted = PersistedState::from(&*self.sender.borrow());
        if let Err(e) = self.persistence.save(&persisted) {
            tracing::warn!(error = %e, "Failed to persist station state");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
