use acd_core::{ConnectionState, ProjectState, Revisions};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Shared projection plus a generation counter. Every session carries the
/// generation it was started with; once the counter moves on, that session's
/// writes are refused. Bumps happen under the same lock as writes, so a check
/// and a bump can never interleave.
#[derive(Debug)]
pub struct StateStore {
    generation: AtomicU64,
    tx: watch::Sender<ProjectState>,
}

impl StateStore {
    pub fn new(log_capacity: usize) -> Self {
        let (tx, _) = watch::channel(ProjectState::unscoped(log_capacity));
        Self {
            generation: AtomicU64::new(0),
            tx,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> watch::Receiver<ProjectState> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> ProjectState {
        self.tx.borrow().clone()
    }

    /// Reads the current projection without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&ProjectState) -> R) -> R {
        f(&self.tx.borrow())
    }

    pub fn connection(&self) -> ConnectionState {
        self.read(ProjectState::connection)
    }

    pub fn revisions(&self) -> Revisions {
        self.read(ProjectState::revisions)
    }

    /// Opens a new generation for `scope`. Switching to a different scope
    /// starts from a fresh projection; re-entering the same one keeps the
    /// last-known values.
    pub fn begin_scope(&self, scope: &str, log_capacity: usize) -> u64 {
        let mut opened = 0;
        self.tx.send_modify(|state| {
            opened = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
            if state.scope() != Some(scope) {
                *state = ProjectState::for_scope(scope, log_capacity);
            }
        });
        opened
    }

    /// Invalidates the running generation and marks the view disconnected.
    pub fn retire(&self) {
        self.tx.send_modify(|state| {
            self.generation.fetch_add(1, Ordering::AcqRel);
            state.set_connection(ConnectionState::Disconnected);
        });
    }

    /// Runs `f` only while `generation` is current. `f` reports whether it
    /// changed anything; subscribers are woken only if it did. Returns `None`
    /// for a stale generation.
    pub fn mutate<R>(
        &self,
        generation: u64,
        f: impl FnOnce(&mut ProjectState) -> (R, bool),
    ) -> Option<R> {
        let mut outcome = None;
        self.tx.send_if_modified(|state| {
            if self.generation.load(Ordering::Acquire) != generation {
                return false;
            }
            let (value, changed) = f(state);
            outcome = Some(value);
            changed
        });
        outcome
    }

    /// `None` when `generation` is stale, otherwise whether the state moved.
    pub fn set_connection(&self, generation: u64, next: ConnectionState) -> Option<bool> {
        self.mutate(generation, |state| {
            let changed = state.set_connection(next);
            (changed, changed)
        })
    }
}
