//! Inheritable-item resolution.
//!
//! An actor's inheritable set is every item whose changes count toward the
//! actor: always-inherited types, equipped items, and feats/talents/traits
//! whose own prerequisites pass against the items admitted so far. Admitting
//! one item can unlock another, so the set is grown to a fixed point.

use crate::entity::Entity;
use crate::pass::Pass;
use crate::prerequisite::{meets_prerequisites_in, PrerequisiteOptions};
use std::collections::HashSet;

/// The items of `actor` whose changes count toward it, in snapshot order.
pub fn inheritable_items(actor: &Entity) -> Vec<&Entity> {
    let mut pass = Pass::new();
    inheritable_items_in(&mut pass, actor)
}

/// Memoised per actor for the lifetime of `pass`.
pub(crate) fn inheritable_items_in<'a>(pass: &mut Pass<'a>, actor: &'a Entity) -> Vec<&'a Entity> {
    if !actor.is_actor() {
        return Vec::new();
    }
    if let Some(cached) = pass.inheritable(actor.id) {
        return cached.clone();
    }

    let mut admitted: Vec<&'a Entity> = Vec::new();
    let mut candidates: Vec<&'a Entity> = Vec::new();
    for item in &actor.items {
        if item.kind.inherits_always() || item.is_equipped() {
            admitted.push(item);
        } else if item.kind.inherits_conditionally() {
            if item.prerequisite().is_none() {
                admitted.push(item);
            } else {
                candidates.push(item);
            }
        }
    }

    if !pass.begin_resolving(actor.id) {
        // Re-entered while computing this actor's set: no conditional items.
        tracing::warn!(actor = %actor.name, "inheritable items requested while being resolved");
        return in_snapshot_order(actor, &admitted);
    }

    let mut round = 0;
    while !candidates.is_empty() {
        round += 1;
        let mut admitted_this_round = 0;
        let mut remaining = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let options = PrerequisiteOptions::default().with_embedded_item_override(&admitted);
            let passes = !meets_prerequisites_in(pass, actor, candidate.prerequisite(), &options)
                .does_fail;
            if passes {
                admitted.push(candidate);
                admitted_this_round += 1;
            } else {
                remaining.push(candidate);
            }
        }

        tracing::debug!(
            actor = %actor.name,
            round,
            admitted = admitted_this_round,
            pending = remaining.len(),
            "inheritable item round"
        );
        candidates = remaining;
        if admitted_this_round == 0 {
            break;
        }
    }

    pass.end_resolving(actor.id);
    let items = in_snapshot_order(actor, &admitted);
    pass.store_inheritable(actor.id, items.clone());
    items
}

fn in_snapshot_order<'a>(actor: &'a Entity, admitted: &[&'a Entity]) -> Vec<&'a Entity> {
    let ids: HashSet<_> = admitted.iter().map(|item| item.id).collect();
    actor.items.iter().filter(|item| ids.contains(&item.id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use crate::prerequisite::Prerequisite;

    fn names(items: &[&Entity]) -> Vec<String> {
        items.iter().map(|item| item.name.clone()).collect()
    }

    #[test]
    fn test_base_set() {
        let actor = Entity::character("Vel")
            .with_item(Entity::item(EntityType::Species, "Human"))
            .with_item(Entity::item(EntityType::Weapon, "Vibroblade").equipped())
            .with_item(Entity::item(EntityType::Weapon, "Holdout Blaster"))
            .with_item(Entity::item(EntityType::Feat, "Alertness"));
        assert_eq!(
            names(&inheritable_items(&actor)),
            vec!["Human", "Vibroblade", "Alertness"]
        );
    }

    #[test]
    fn test_chain_is_admitted_in_any_order() {
        // B depends on A and appears first.
        let actor = Entity::character("Vel")
            .with_item(
                Entity::item(EntityType::Feat, "Dual Weapon Mastery II")
                    .with_prerequisite(Prerequisite::feat("Dual Weapon Mastery I")),
            )
            .with_item(
                Entity::item(EntityType::Feat, "Dual Weapon Mastery I")
                    .with_prerequisite(Prerequisite::feat("Weapon Finesse")),
            )
            .with_item(Entity::item(EntityType::Feat, "Weapon Finesse"));
        assert_eq!(inheritable_items(&actor).len(), 3);
    }

    #[test]
    fn test_unmet_prerequisite_is_excluded() {
        let actor = Entity::character("Vel").with_item(
            Entity::item(EntityType::Talent, "Force Haze")
                .with_prerequisite(Prerequisite::feat("Force Sensitivity")),
        );
        assert!(inheritable_items(&actor).is_empty());
    }

    #[test]
    fn test_non_actor_has_no_inheritable_items() {
        let item = Entity::item(EntityType::Weapon, "Blaster")
            .with_item(Entity::item(EntityType::Upgrade, "Scope").equipped());
        assert!(inheritable_items(&item).is_empty());
    }
}
