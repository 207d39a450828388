//! Subscription Registry
//!
//! Source of truth for the desired channel-key set. While connected,
//! `add`/`remove` return the delta to send on the wire; while
//! disconnected they only mutate the in-memory set, which is replayed
//! in full after every successful (re)connect.
//!
//! The set survives transport replacement and is cleared only by
//! explicit consumer action.

use std::collections::HashSet;

use parking_lot::RwLock;

use crate::domain::state::ChannelKey;

/// Delta between the registry and a requested change.
///
/// Only deltas ever go on the wire: a desired-set swap never becomes a
/// full unsubscribe-and-resubscribe, which would open update gaps for
/// unaffected keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChanges {
    /// Keys that newly need a wire subscribe.
    pub subscribe: Vec<ChannelKey>,
    /// Keys that newly need a wire unsubscribe.
    pub unsubscribe: Vec<ChannelKey>,
}

impl SubscriptionChanges {
    /// Whether there is nothing to send.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }
}

/// Tracks the desired channel-key set for one client.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    keys: RwLock<HashSet<ChannelKey>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add keys to the desired set.
    ///
    /// Returns only the keys that were actually new; re-adding a
    /// present key is idempotent and produces no wire traffic.
    pub fn add(&self, keys: &[ChannelKey]) -> SubscriptionChanges {
        let mut set = self.keys.write();
        let subscribe: Vec<ChannelKey> = keys
            .iter()
            .filter(|k| set.insert((*k).clone()))
            .cloned()
            .collect();

        SubscriptionChanges {
            subscribe,
            unsubscribe: Vec::new(),
        }
    }

    /// Remove keys from the desired set.
    ///
    /// Returns only the keys that were actually present.
    pub fn remove(&self, keys: &[ChannelKey]) -> SubscriptionChanges {
        let mut set = self.keys.write();
        let unsubscribe: Vec<ChannelKey> =
            keys.iter().filter(|k| set.remove(*k)).cloned().collect();

        SubscriptionChanges {
            subscribe: Vec::new(),
            unsubscribe,
        }
    }

    /// Diff the registry against a complete desired set and apply it.
    ///
    /// Returns the delta needed to move the wire state from the current
    /// set to `desired`.
    pub fn diff(&self, desired: &[ChannelKey]) -> SubscriptionChanges {
        let target: HashSet<ChannelKey> = desired.iter().cloned().collect();
        let mut set = self.keys.write();

        let subscribe: Vec<ChannelKey> = target.difference(&set).cloned().collect();
        let unsubscribe: Vec<ChannelKey> = set.difference(&target).cloned().collect();
        *set = target;

        SubscriptionChanges {
            subscribe,
            unsubscribe,
        }
    }

    /// Full current set, for replay after a successful open.
    #[must_use]
    pub fn replay_set(&self) -> Vec<ChannelKey> {
        let mut keys: Vec<ChannelKey> = self.keys.read().iter().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// Whether a key is currently desired.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.keys.read().contains(key)
    }

    /// Number of desired keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    /// Whether the desired set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }

    /// Drop every key. Explicit consumer action only.
    pub fn clear(&self) {
        self.keys.write().clear();
    }
}
