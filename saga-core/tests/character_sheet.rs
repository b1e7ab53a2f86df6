//! Attribute aggregation, inheritance and prerequisites over whole actors.

use saga_core::testing::{
    assert_attribute, assert_fails_with, assert_inherits, assert_not_inherits, assert_passes,
    feat_with, sample_soldier,
};
use saga_core::{
    get_inheritable_attribute, inheritable_items, meets_prerequisites, AttributeQuery,
    AttributeValue, Change, Entity, EntityType, Prerequisite, PrerequisiteOptions, ReduceMode,
    RequirementKind, StackMode, Value,
};

fn check(actor: &Entity, tree: &Prerequisite) -> saga_core::PrerequisiteResult {
    meets_prerequisites(Some(actor), Some(tree), &PrerequisiteOptions::default())
}

// =============================================================================
// ATTRIBUTES
// =============================================================================

#[test]
fn test_soldier_attributes() {
    let soldier = sample_soldier("Kel");

    assert_attribute(&soldier, &AttributeQuery::new("hitPoints").reduce(ReduceMode::Sum), "3d8");
    assert_attribute(&soldier, &AttributeQuery::new("defense").reduce(ReduceMode::Sum), 1);
    assert_attribute(&soldier, &AttributeQuery::new("damage").reduce(ReduceMode::Sum), "3d8");

    let proficiencies = get_inheritable_attribute(
        &soldier,
        &AttributeQuery::new("armorProficiency").reduce(ReduceMode::Unique),
    );
    assert_eq!(
        proficiencies.values(),
        &[Value::from("Light"), Value::from("Medium")]
    );
}

#[test]
fn test_summary_names_sources() {
    let soldier = sample_soldier("Kel");
    let summary = get_inheritable_attribute(
        &soldier,
        &AttributeQuery::new("weaponProficiency").reduce(ReduceMode::Summary),
    );
    assert_eq!(
        summary.as_value(),
        Some(&Value::from("Soldier: Pistols; Soldier: Rifles;"))
    );
}

#[test]
fn test_disabled_effects_are_skipped_unless_requested() {
    let actor = Entity::character("Vos").with_item(
        Entity::item(EntityType::Class, "Scout")
            .with_change(Change::new("defense", 2))
            .with_effect(
                Entity::effect("Stunned")
                    .with_change(Change::new("defense", -5))
                    .disabled(),
            ),
    );

    let query = AttributeQuery::new("defense").reduce(ReduceMode::Sum);
    assert_eq!(get_inheritable_attribute(&actor, &query).as_number(), Some(2.0));

    let query = AttributeQuery::new("defense")
        .reduce(ReduceMode::Sum)
        .include_disabled();
    assert_eq!(get_inheritable_attribute(&actor, &query).as_number(), Some(-3.0));
}

#[test]
fn test_mapped_query_and_override() {
    let actor = Entity::character("Vos")
        .with_item(feat_with("Toughness", "hitPoints", 3))
        .with_item(
            Entity::item(EntityType::Trait, "Small")
                .with_change(Change::new("size", "Small").with_mode(StackMode::Override)),
        )
        .with_change(Change::new("size", "Medium"));

    let result = get_inheritable_attribute(
        &actor,
        &AttributeQuery::keys(["hitPoints", "size"]).reduce(ReduceMode::Sum),
    );
    let AttributeValue::Mapped(map) = &result else {
        panic!("expected a mapped result, got {result:?}");
    };
    assert_eq!(map["hitPoints"].as_number(), Some(3.0));
    assert_eq!(map["size"].as_value(), Some(&Value::from("Small")));
}

#[test]
fn test_embedded_item_override_replaces_inheritance() {
    let soldier = sample_soldier("Kel");
    let toughness = feat_with("Toughness", "hitPoints", 3);
    let only = [&toughness];
    let query = AttributeQuery::new("hitPoints")
        .reduce(ReduceMode::Sum)
        .with_embedded_item_override(&only);
    assert_eq!(get_inheritable_attribute(&soldier, &query).as_number(), Some(3.0));
}

// =============================================================================
// INHERITANCE
// =============================================================================

#[test]
fn test_conditional_items_follow_their_prerequisites() {
    let actor = Entity::character("Vos")
        .with_item(
            Entity::item(EntityType::Feat, "Dual Weapon Mastery II")
                .with_prerequisite(Prerequisite::feat("Dual Weapon Mastery I")),
        )
        .with_item(
            Entity::item(EntityType::Feat, "Dual Weapon Mastery I")
                .with_prerequisite(Prerequisite::leaf(RequirementKind::BaseAttackBonus, "1")),
        )
        .with_item(Entity::item(EntityType::Class, "Jedi").with_change(Change::new("baseAttackBonus", 1)))
        .with_item(
            Entity::item(EntityType::Talent, "Block")
                .with_prerequisite(Prerequisite::feat("Force Sensitivity")),
        )
        .with_item(Entity::item(EntityType::Weapon, "Vibroblade"))
        .with_item(Entity::item(EntityType::Weapon, "Lightsaber").equipped());

    let items = inheritable_items(&actor);
    assert_inherits(&items, "Jedi");
    assert_inherits(&items, "Dual Weapon Mastery I");
    assert_inherits(&items, "Dual Weapon Mastery II");
    assert_inherits(&items, "Lightsaber");
    assert_not_inherits(&items, "Block");
    assert_not_inherits(&items, "Vibroblade");
}

#[test]
fn test_unmet_feat_does_not_contribute_changes() {
    let actor = Entity::character("Vos").with_item(
        Entity::item(EntityType::Feat, "Improved Defenses")
            .with_prerequisite(Prerequisite::leaf(RequirementKind::BaseAttackBonus, "5"))
            .with_change(Change::new("defense", 1)),
    );
    let query = AttributeQuery::new("defense").reduce(ReduceMode::Sum);
    assert_eq!(get_inheritable_attribute(&actor, &query).as_number(), Some(0.0));
}

// =============================================================================
// PREREQUISITES
// =============================================================================

#[test]
fn test_soldier_prerequisites() {
    let soldier = sample_soldier("Kel");

    assert_passes(&check(&soldier, &Prerequisite::leaf(RequirementKind::Age, "18+")));
    assert_passes(&check(&soldier, &Prerequisite::leaf(RequirementKind::Size, "medium")));
    assert_passes(&check(&soldier, &Prerequisite::leaf(RequirementKind::CharacterLevel, "1")));
    assert_passes(&check(&soldier, &Prerequisite::leaf(RequirementKind::TrainedSkill, "Perception")));
    assert_passes(&check(&soldier, &Prerequisite::leaf(RequirementKind::Proficiency, "rifles")));
    assert_passes(&check(&soldier, &Prerequisite::leaf(RequirementKind::Equipped, "Blaster Rifle")));
    assert_passes(&check(&soldier, &Prerequisite::leaf(RequirementKind::Gender, "female")));
    assert_passes(&check(&soldier, &Prerequisite::attribute("baseAttackBonus:1")));

    assert_fails_with(
        &check(&soldier, &Prerequisite::leaf(RequirementKind::CharacterLevel, "3")),
        "Character Level: 3",
    );
    assert_fails_with(
        &check(&soldier, &Prerequisite::attribute("baseAttackBonus:>1")),
        "Attribute: baseAttackBonus:>1",
    );
}

#[test]
fn test_and_with_two_failures_wraps_once() {
    let soldier = sample_soldier("Kel");
    let tree = Prerequisite::all(vec![
        Prerequisite::feat("Force Sensitivity"),
        Prerequisite::talent("Block"),
        Prerequisite::class("Soldier"),
    ]);
    let result = check(&soldier, &tree);
    assert!(result.does_fail);
    assert_eq!(result.failure_list.len(), 1);
    assert_eq!(result.failure_list[0].message, "all of:");
    assert_eq!(result.failure_list[0].children.len(), 2);
    assert_eq!(result.success_list.len(), 1);
}

#[test]
fn test_or_counts_successes() {
    let soldier = sample_soldier("Kel");
    let tree = Prerequisite::any(
        2,
        vec![
            Prerequisite::leaf(RequirementKind::Proficiency, "Pistols"),
            Prerequisite::leaf(RequirementKind::Proficiency, "Rifles"),
            Prerequisite::leaf(RequirementKind::Proficiency, "Lightsabers"),
        ],
    );
    assert_passes(&check(&soldier, &tree));

    let tree = Prerequisite::any(
        2,
        vec![
            Prerequisite::leaf(RequirementKind::Proficiency, "Pistols"),
            Prerequisite::leaf(RequirementKind::Proficiency, "Lightsabers"),
        ],
    )
    .with_text("Two weapon proficiencies");
    assert_fails_with(&check(&soldier, &tree), "Two weapon proficiencies");
}

#[test]
fn test_not_inverts() {
    let soldier = sample_soldier("Kel");
    assert_passes(&check(&soldier, &Prerequisite::not(Prerequisite::feat("Force Sensitivity"))));
    assert_fails_with(
        &check(&soldier, &Prerequisite::not(Prerequisite::class("Soldier"))),
        "not Class: Soldier",
    );
}

#[test]
fn test_prerequisite_json_from_host() {
    let json = serde_json::json!({
        "type": "AND",
        "children": [
            {"type": "CLASS", "requirement": "Soldier"},
            {"type": "OR", "count": 1, "children": [
                {"type": "TRAINED SKILL", "requirement": "Endurance"},
                {"type": "TRAINED SKILL", "requirement": "Stealth"}
            ]},
            {"type": "BASE ATTACK BONUS", "requirement": 1}
        ]
    });
    let tree: Prerequisite = serde_json::from_value(json).unwrap();
    assert_passes(&check(&sample_soldier("Kel"), &tree));

    let empty: Prerequisite = serde_json::from_value(serde_json::json!({})).unwrap();
    assert_passes(&check(&Entity::character("Nobody"), &empty));
}

#[test]
fn test_missing_target_fails_and_missing_tree_passes() {
    let tree = Prerequisite::feat("Toughness");
    assert!(meets_prerequisites(None, Some(&tree), &PrerequisiteOptions::default()).does_fail);
    assert_passes(&meets_prerequisites(
        Some(&Entity::character("Vos")),
        None,
        &PrerequisiteOptions::default(),
    ));
}

#[test]
fn test_strict_mode_rejects_unknown_types() {
    let soldier = sample_soldier("Kel");
    let tree = Prerequisite::leaf(RequirementKind::from_label("HOMEBREW"), "anything");
    assert_passes(&check(&soldier, &tree));

    let strict = PrerequisiteOptions::default().with_strict(true);
    assert!(meets_prerequisites(Some(&soldier), Some(&tree), &strict).does_fail);
}
