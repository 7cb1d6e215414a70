//! Keyed observable state.
//!
//! Each [`State`] holds the latest value for one [`StateKey`]. Writers replace
//! the whole value with [`State::set`]; readers either take the latest value
//! once with [`State::take`] or register a callback with [`State::subscribe`].
//!
//! Stores are single-threaded (`Rc<RefCell<..>>`). Subscribers are notified in
//! registration order after the value has been committed, so a callback may
//! read any store, including the one that notified it.

use serde::Serialize;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::model::{Highlighted, Relation, Rename, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    Tables,
    Relations,
    Highlighted,
    Rename,
}

impl StateKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tables => "tables",
            Self::Relations => "relations",
            Self::Highlighted => "highlighted",
            Self::Rename => "rename",
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Callback<T> = Rc<dyn Fn(&T)>;

struct Inner<T> {
    key: StateKey,
    value: Option<T>,
    version: u64,
    next_id: u64,
    subscribers: Vec<(u64, Callback<T>)>,
}

/// Shared handle to a keyed value. Clones refer to the same store.
pub struct State<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for State<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("State")
            .field("key", &inner.key)
            .field("version", &inner.version)
            .field("value", &inner.value)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + 'static> State<T> {
    pub fn new(key: StateKey) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                key,
                value: None,
                version: 0,
                next_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    pub fn key(&self) -> StateKey {
        self.inner.borrow().key
    }

    /// Number of `set` calls so far.
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    pub fn has_value(&self) -> bool {
        self.inner.borrow().value.is_some()
    }

    /// Replaces the value and notifies every subscriber.
    pub fn set(&self, value: T) {
        let callbacks: Vec<Callback<T>> = {
            let mut inner = self.inner.borrow_mut();
            inner.value = Some(value.clone());
            inner.version += 1;
            tracing::trace!(key = %inner.key, version = inner.version, "state replaced");
            inner.subscribers.iter().map(|(_, cb)| Rc::clone(cb)).collect()
        };

        for callback in callbacks {
            callback(&value);
        }
    }

    /// Latest value, read once. `None` until the first `set`.
    pub fn take(&self) -> Option<T> {
        self.inner.borrow().value.clone()
    }

    /// Registers `callback` for every future `set`. If the store already has a
    /// value the callback also runs once immediately with it.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + 'static,
    {
        let callback: Callback<T> = Rc::new(callback);
        let (id, current) = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push((id, Rc::clone(&callback)));
            (id, inner.value.clone())
        };

        if let Some(value) = current {
            callback(&value);
        }

        let weak: Weak<RefCell<Inner<T>>> = Rc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.borrow_mut().subscribers.retain(|(sid, _)| *sid != id);
                }
            })),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }
}

/// Removes its callback from the store when dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// One store per key, shared between the builder service and its consumers.
#[derive(Debug, Clone)]
pub struct StateRegistry {
    tables: State<Vec<Table>>,
    relations: State<Vec<Relation>>,
    highlighted: State<Highlighted>,
    rename: State<Rename>,
}

impl Default for StateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StateRegistry {
    pub fn new() -> Self {
        Self {
            tables: State::new(StateKey::Tables),
            relations: State::new(StateKey::Relations),
            highlighted: State::new(StateKey::Highlighted),
            rename: State::new(StateKey::Rename),
        }
    }

    pub fn tables(&self) -> &State<Vec<Table>> {
        &self.tables
    }

    pub fn relations(&self) -> &State<Vec<Relation>> {
        &self.relations
    }

    pub fn highlighted(&self) -> &State<Highlighted> {
        &self.highlighted
    }

    pub fn rename(&self) -> &State<Rename> {
        &self.rename
    }

    pub fn version(&self, key: StateKey) -> u64 {
        match key {
            StateKey::Tables => self.tables.version(),
            StateKey::Relations => self.relations.version(),
            StateKey::Highlighted => self.highlighted.version(),
            StateKey::Rename => self.rename.version(),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tables: self.tables.take().unwrap_or_default(),
            relations: self.relations.take().unwrap_or_default(),
            highlighted: self.highlighted.take(),
            rename: self.rename.take(),
        }
    }
}

/// Point-in-time copy of every store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub tables: Vec<Table>,
    pub relations: Vec<Relation>,
    pub highlighted: Option<Highlighted>,
    pub rename: Option<Rename>,
}
