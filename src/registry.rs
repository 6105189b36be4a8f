//! Ordered collection of session records plus the display selection.
//!
//! Each record sits in its own `watch` channel: the owning supervisor holds a
//! [`SessionWriter`] and replaces fields in place, readers borrow or clone a
//! consistent snapshot. A broadcast channel tells the display collaborator
//! which record (or the selection) changed, so it never caches the selected
//! index itself.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::session::Session;

/// Change notification for display consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEvent {
    SessionChanged(usize),
    SelectionChanged(usize),
}

/// All sessions, indexed by their stable id.
pub struct SessionRegistry {
    slots: Vec<Arc<watch::Sender<Session>>>,
    selected: AtomicUsize,
    events: broadcast::Sender<RegistryEvent>,
}

impl SessionRegistry {
    /// Build a registry from sessions whose ids are their positions.
    pub fn new(sessions: Vec<Session>) -> Self {
        debug_assert!(sessions.iter().enumerate().all(|(i, s)| s.id == i));
        let (events, _) = broadcast::channel(256);
        Self {
            slots: sessions
                .into_iter()
                .map(|s| Arc::new(watch::Sender::new(s)))
                .collect(),
            selected: AtomicUsize::new(0),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Clone of one session's current state.
    pub fn get(&self, id: usize) -> Option<Session> {
        self.slots.get(id).map(|slot| slot.borrow().clone())
    }

    /// Clones of every session, in id order.
    pub fn snapshot_all(&self) -> Vec<Session> {
        self.slots.iter().map(|slot| slot.borrow().clone()).collect()
    }

    pub fn selected_index(&self) -> usize {
        self.selected.load(Ordering::SeqCst)
    }

    /// Snapshot of the session the display is showing.
    pub fn selected(&self) -> Option<Session> {
        self.get(self.selected_index())
    }

    /// Move the selection by `delta`, wrapping at both ends. Returns the new index.
    pub fn select(&self, delta: isize) -> usize {
        let count = self.slots.len();
        if count == 0 {
            return 0;
        }
        let current = self.selected_index();
        let next = wrap_index(current, delta, count);
        self.selected.store(next, Ordering::SeqCst);
        let _ = self.events.send(RegistryEvent::SelectionChanged(next));
        next
    }

    /// Change notifications for the display collaborator.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Per-session receiver that wakes on every change to that record.
    pub fn watch(&self, id: usize) -> Option<watch::Receiver<Session>> {
        self.slots.get(id).map(|slot| slot.subscribe())
    }

    /// Write handle for the supervisor that owns session `id`.
    pub(crate) fn writer(&self, id: usize) -> Option<SessionWriter> {
        self.slots.get(id).map(|slot| SessionWriter {
            id,
            slot: Arc::clone(slot),
            events: self.events.clone(),
        })
    }
}

/// `(current + delta) mod count`, never negative.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn wrap_index(current: usize, delta: isize, count: usize) -> usize {
    (current as isize + delta).rem_euclid(count as isize) as usize
}

/// Exclusive write access to one session record.
pub struct SessionWriter {
    id: usize,
    slot: Arc<watch::Sender<Session>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl SessionWriter {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Apply `f` to the record and notify readers.
    pub fn update(&self, f: impl FnOnce(&mut Session)) {
        self.slot.send_modify(f);
        let _ = self.events.send(RegistryEvent::SessionChanged(self.id));
    }

    /// Read one value from the record without cloning it.
    pub fn read<T>(&self, f: impl FnOnce(&Session) -> T) -> T {
        f(&self.slot.borrow())
    }
}
