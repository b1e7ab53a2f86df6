//! Per-call resolution caches.
//!
//! A [`Pass`] is created by each top-level entry point and threaded through
//! the call tree by `&mut`. It memoises inheritable-item sets, item
//! prerequisite outcomes and leaf outcomes, and carries the visited sets that
//! guard against prerequisite cycles. Dropping it discards everything.

use crate::entity::{Entity, EntityId};
use crate::prerequisite::Outcome;
use std::collections::{HashMap, HashSet};

/// Identity of an embedded-item override: the sorted ids it contains.
pub type OverrideKey = Option<Vec<EntityId>>;

pub fn override_key(items: Option<&[&Entity]>) -> OverrideKey {
    items.map(|items| {
        let mut ids: Vec<EntityId> = items.iter().map(|item| item.id).collect();
        ids.sort();
        ids
    })
}

/// Cache key for an item's own prerequisite outcome.
pub(crate) type ItemKey = (EntityId, EntityId, OverrideKey);

/// Cache key for a leaf: target, leaf label, requirement, display text,
/// override, strictness. The text is part of the key because cached outcomes
/// carry the node's message.
pub(crate) type LeafKey = (EntityId, String, String, Option<String>, OverrideKey, bool);

/// Caches shared by one top-level resolution call.
#[derive(Debug, Default)]
pub struct Pass<'a> {
    inheritable: HashMap<EntityId, Vec<&'a Entity>>,
    resolving: HashSet<EntityId>,
    item_outcomes: HashMap<ItemKey, bool>,
    evaluating: HashSet<ItemKey>,
    leaf_outcomes: HashMap<LeafKey, Outcome>,
}

impl<'a> Pass<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn inheritable(&self, actor: EntityId) -> Option<&Vec<&'a Entity>> {
        self.inheritable.get(&actor)
    }

    pub(crate) fn store_inheritable(&mut self, actor: EntityId, items: Vec<&'a Entity>) {
        self.inheritable.insert(actor, items);
    }

    /// Mark an actor's inheritable set as in progress. False if it already was.
    pub(crate) fn begin_resolving(&mut self, actor: EntityId) -> bool {
        self.resolving.insert(actor)
    }

    pub(crate) fn end_resolving(&mut self, actor: EntityId) {
        self.resolving.remove(&actor);
    }

    pub(crate) fn item_outcome(&self, key: &ItemKey) -> Option<bool> {
        self.item_outcomes.get(key).copied()
    }

    pub(crate) fn store_item_outcome(&mut self, key: ItemKey, passes: bool) {
        self.item_outcomes.insert(key, passes);
    }

    /// Mark an item as being evaluated. False means the item is already on the
    /// stack, i.e. a prerequisite cycle.
    pub(crate) fn begin_item(&mut self, key: ItemKey) -> bool {
        self.evaluating.insert(key)
    }

    pub(crate) fn end_item(&mut self, key: &ItemKey) {
        self.evaluating.remove(key);
    }

    pub(crate) fn leaf_outcome(&self, key: &LeafKey) -> Option<&Outcome> {
        self.leaf_outcomes.get(key)
    }

    pub(crate) fn store_leaf_outcome(&mut self, key: LeafKey, outcome: Outcome) {
        self.leaf_outcomes.insert(key, outcome);
    }
}
