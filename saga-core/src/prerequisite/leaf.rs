//! Leaf checks.

use super::node::{Prerequisite, Requirement, RequirementKind};
use super::result::{FailureEntry, Outcome, PrerequisiteError};
use super::Evaluation;
use crate::attribute::{resolve_attribute, AttributeQuery, AttributeValue, ReduceMode};
use crate::entity::{Entity, EntityType};
use crate::expression::{resolve_expression, VariableSource};
use crate::value::Value;

fn malformed(requirement: &Requirement, reason: impl Into<String>) -> PrerequisiteError {
    PrerequisiteError::Malformed {
        kind: requirement.kind.label().to_string(),
        requirement: requirement.requirement.clone(),
        reason: reason.into(),
    }
}

fn parse_number(requirement: &Requirement) -> Result<f64, PrerequisiteError> {
    requirement
        .requirement
        .trim()
        .trim_end_matches('+')
        .parse::<f64>()
        .map_err(|_| malformed(requirement, "expected a number"))
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

// ============================================================================
// Comparisons
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    /// No operator given: numbers must reach the value, text must match.
    Reach,
}

/// The right-hand side of an ATTRIBUTE requirement, e.g. `>=13`.
#[derive(Debug, Clone, PartialEq)]
struct Comparison {
    op: CompareOp,
    expected: String,
}

impl Comparison {
    fn parse(text: &str) -> Comparison {
        let text = text.trim();
        for (prefix, op) in [
            (">=", CompareOp::Ge),
            ("<=", CompareOp::Le),
            (">", CompareOp::Gt),
            ("<", CompareOp::Lt),
            ("=", CompareOp::Eq),
        ] {
            if let Some(rest) = text.strip_prefix(prefix) {
                return Comparison {
                    op,
                    expected: rest.trim().to_string(),
                };
            }
        }
        Comparison {
            op: CompareOp::Reach,
            expected: text.to_string(),
        }
    }

    fn matches(&self, actual: &Value) -> bool {
        let expected = Value::Text(self.expected.clone());
        match (actual.as_number(), expected.as_number()) {
            (Some(x), Some(y)) => match self.op {
                CompareOp::Gt => x > y,
                CompareOp::Lt => x < y,
                CompareOp::Ge | CompareOp::Reach => x >= y,
                CompareOp::Le => x <= y,
                CompareOp::Eq => x == y,
            },
            _ => match self.op {
                CompareOp::Eq | CompareOp::Reach => same_name(&actual.to_string(), &self.expected),
                _ => false,
            },
        }
    }
}

/// An AGE requirement: `N`, `N+` or `N-M`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct AgeRange {
    min: f64,
    max: Option<f64>,
}

impl AgeRange {
    fn parse(text: &str) -> Option<AgeRange> {
        let text = text.trim();
        if let Some(min) = text.strip_suffix('+') {
            return Some(AgeRange {
                min: min.trim().parse().ok()?,
                max: None,
            });
        }
        if let Some((min, max)) = text.split_once('-') {
            return Some(AgeRange {
                min: min.trim().parse().ok()?,
                max: Some(max.trim().parse().ok()?),
            });
        }
        let exact: f64 = text.parse().ok()?;
        Some(AgeRange {
            min: exact,
            max: Some(exact),
        })
    }

    fn contains(&self, age: f64) -> bool {
        age >= self.min && self.max.map_or(true, |max| age <= max)
    }
}

// ============================================================================
// Checks
// ============================================================================

impl<'p, 'a: 'p, 'o: 'p> Evaluation<'p, 'a, 'o> {
    pub(super) fn check(
        &mut self,
        node: &Prerequisite,
        requirement: &Requirement,
    ) -> Result<Outcome, PrerequisiteError> {
        let verdict = |passed: bool, count: usize| {
            if passed {
                Outcome::success(node, count)
            } else {
                Outcome::failure(node.describe())
            }
        };
        let wanted = requirement.requirement.as_str();

        let outcome = match &requirement.kind {
            RequirementKind::Age => {
                let range = AgeRange::parse(wanted)
                    .ok_or_else(|| malformed(requirement, "expected N, N+ or N-M"))?;
                let passed = self.target.system.age.is_some_and(|age| range.contains(age));
                verdict(passed, 1)
            }
            RequirementKind::Size => {
                let sizes = self.attribute("size", ReduceMode::ValuesToLowercase);
                let passed = sizes.values().iter().any(|size| same_name(&size.to_string(), wanted));
                verdict(passed, 1)
            }
            RequirementKind::CharacterLevel => {
                let needed = parse_number(requirement)?;
                let level = self
                    .available()
                    .iter()
                    .filter(|item| item.kind == EntityType::Class)
                    .count();
                verdict(level as f64 >= needed, 1)
            }
            RequirementKind::BaseAttackBonus => {
                let needed = parse_number(requirement)?;
                let bab = self.number("baseAttackBonus");
                verdict(bab >= needed, 1)
            }
            RequirementKind::DarkSideScore => {
                let needed = parse_number(requirement)?;
                let score =
                    self.target.system.dark_side_score.unwrap_or(0.0) + self.number("darkSideScore");
                verdict(score >= needed, 1)
            }
            RequirementKind::Feat => self.owned_item(node, EntityType::Feat, wanted),
            RequirementKind::Talent => self.owned_item(node, EntityType::Talent, wanted),
            RequirementKind::Class => self.owned_item(node, EntityType::Class, wanted),
            RequirementKind::Trait => self.owned_item(node, EntityType::Trait, wanted),
            RequirementKind::Species => self.owned_item(node, EntityType::Species, wanted),
            RequirementKind::ForcePower => self.owned_item(node, EntityType::ForcePower, wanted),
            RequirementKind::ForceTechnique => {
                self.owned_item(node, EntityType::ForceTechnique, wanted)
            }
            RequirementKind::ForceSecret => self.owned_item(node, EntityType::ForceSecret, wanted),
            RequirementKind::TalentTree => {
                let talents: Vec<&Entity> = self
                    .available()
                    .into_iter()
                    .filter(|item| {
                        item.kind == EntityType::Talent
                            && item
                                .system
                                .talent_tree
                                .as_deref()
                                .is_some_and(|tree| same_name(tree, wanted))
                    })
                    .collect();
                let count = talents
                    .into_iter()
                    .filter(|talent| self.item_passes(talent))
                    .count();
                verdict(count > 0, count)
            }
            RequirementKind::Item => {
                let passed = self
                    .owned_items()
                    .iter()
                    .any(|item| same_name(&item.name, wanted));
                verdict(passed, 1)
            }
            RequirementKind::TrainedSkill => {
                let listed = self
                    .target
                    .system
                    .trained_skills
                    .iter()
                    .any(|skill| same_name(skill, wanted));
                let granted = self
                    .attribute("trainedSkills", ReduceMode::Values)
                    .values()
                    .iter()
                    .any(|skill| same_name(&skill.to_string(), wanted));
                verdict(listed || granted, 1)
            }
            RequirementKind::Proficiency => {
                let proficiencies = self.attribute_keys(
                    &["weaponProficiency", "armorProficiency"],
                    ReduceMode::ValuesToLowercase,
                );
                let passed = match &proficiencies {
                    AttributeValue::Mapped(map) => map
                        .values()
                        .flat_map(|value| value.values().iter())
                        .any(|p| same_name(&p.to_string(), wanted)),
                    _ => false,
                };
                verdict(passed, 1)
            }
            RequirementKind::Attribute => {
                let (key, expected) = wanted
                    .split_once(':')
                    .ok_or_else(|| malformed(requirement, "expected key:value"))?;
                let key = key.trim();
                if key.is_empty() {
                    return Err(malformed(requirement, "empty attribute key"));
                }
                let actual = self.attribute_value(key);
                verdict(Comparison::parse(expected).matches(&actual), 1)
            }
            RequirementKind::Equipped => {
                let passed = self
                    .owned_items()
                    .iter()
                    .any(|item| item.is_equipped() && same_name(&item.name, wanted));
                verdict(passed, 1)
            }
            RequirementKind::Gender => {
                let passed = self
                    .target
                    .system
                    .gender
                    .as_deref()
                    .is_some_and(|gender| same_name(gender, wanted));
                verdict(passed, 1)
            }
            RequirementKind::Special => Outcome {
                successes: Outcome::success(node, 1).successes,
                failures: vec![FailureEntry::informational(node.describe())],
            },
            RequirementKind::Unsupported(label) => {
                if self.options.strict {
                    Outcome::failure(format!("Unsupported prerequisite type: {label}"))
                } else {
                    tracing::warn!(kind = %label, "unsupported prerequisite type skipped");
                    Outcome::default()
                }
            }
        };
        Ok(outcome)
    }

    /// Owned items of `kind` named `name` whose own prerequisites pass.
    fn owned_item(&mut self, node: &Prerequisite, kind: EntityType, name: &str) -> Outcome {
        let matches: Vec<&Entity> = self
            .available()
            .into_iter()
            .filter(|item| item.kind == kind && same_name(&item.name, name))
            .collect();
        let count = matches
            .into_iter()
            .filter(|item| self.item_passes(item))
            .count();
        if count > 0 {
            Outcome::success(node, count)
        } else {
            Outcome::failure(node.describe())
        }
    }

    /// Every owned item, narrowed to the override when one is given.
    fn owned_items(&self) -> Vec<&'p Entity> {
        match self.options.embedded_item_override {
            Some(items) => items.to_vec(),
            None => self.target.items.iter().collect(),
        }
    }

    fn attribute(&mut self, key: &str, mode: ReduceMode) -> AttributeValue {
        let mut query = AttributeQuery::new(key).reduce(mode);
        if let Some(items) = self.options.embedded_item_override {
            query = query.with_embedded_item_override(items);
        }
        resolve_attribute(self.pass, self.target, &query)
    }

    fn attribute_keys(&mut self, keys: &[&str], mode: ReduceMode) -> AttributeValue {
        let mut query = AttributeQuery::keys(keys.iter().copied()).reduce(mode);
        if let Some(items) = self.options.embedded_item_override {
            query = query.with_embedded_item_override(items);
        }
        resolve_attribute(self.pass, self.target, &query)
    }

    fn number(&mut self, key: &str) -> f64 {
        self.attribute(key, ReduceMode::Sum).as_number().unwrap_or(0.0)
    }

    /// The summed attribute, or the target's variable of the same name when
    /// no change contributes to it.
    fn attribute_value(&mut self, key: &str) -> Value {
        let contributing = self
            .attribute(key, ReduceMode::Count)
            .as_number()
            .unwrap_or(0.0);
        if contributing > 0.0 {
            return self
                .attribute(key, ReduceMode::Sum)
                .as_value()
                .cloned()
                .unwrap_or_default();
        }
        match self.target.variable(key) {
            Some(value) => resolve_expression(&value, self.target),
            None => Value::Number(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::Change;
    use crate::prerequisite::{meets_prerequisites, PrerequisiteOptions};

    fn check(actor: &Entity, tree: Prerequisite) -> bool {
        meets_prerequisites(Some(actor), Some(&tree), &PrerequisiteOptions::default()).passes()
    }

    #[test]
    fn test_comparison_parse() {
        assert_eq!(
            Comparison::parse(">=13"),
            Comparison {
                op: CompareOp::Ge,
                expected: "13".into()
            }
        );
        assert_eq!(Comparison::parse("Medium").op, CompareOp::Reach);
        assert!(Comparison::parse("<5").matches(&Value::Number(4.0)));
        assert!(Comparison::parse("13").matches(&Value::Number(15.0)));
        assert!(Comparison::parse("true").matches(&Value::Bool(true)));
        assert!(!Comparison::parse(">x").matches(&Value::from("y")));
    }

    #[test]
    fn test_age_ranges() {
        let actor = Entity::character("Old Ben").with_age(57.0);
        assert!(check(&actor, Prerequisite::leaf(RequirementKind::Age, "40+")));
        assert!(check(&actor, Prerequisite::leaf(RequirementKind::Age, "40-60")));
        assert!(!check(&actor, Prerequisite::leaf(RequirementKind::Age, "12-17")));
        assert!(check(&actor, Prerequisite::leaf(RequirementKind::Age, "57")));
        // Malformed requirements fail closed.
        assert!(!check(&actor, Prerequisite::leaf(RequirementKind::Age, "ancient")));
    }

    #[test]
    fn test_character_level_counts_classes() {
        let actor = Entity::character("Kel")
            .with_item(Entity::item(EntityType::Class, "Soldier"))
            .with_item(Entity::item(EntityType::Class, "Soldier"))
            .with_item(Entity::item(EntityType::Class, "Scout"));
        assert!(check(&actor, Prerequisite::leaf(RequirementKind::CharacterLevel, "3")));
        assert!(!check(&actor, Prerequisite::leaf(RequirementKind::CharacterLevel, "4")));
    }

    #[test]
    fn test_size_from_species() {
        let actor = Entity::character("Wicket").with_item(
            Entity::item(EntityType::Species, "Ewok").with_change(Change::new("size", "Small")),
        );
        assert!(check(&actor, Prerequisite::leaf(RequirementKind::Size, "small")));
        assert!(!check(&actor, Prerequisite::leaf(RequirementKind::Size, "Medium")));
    }

    #[test]
    fn test_attribute_from_changes_or_variables() {
        let actor = Entity::character("Kel")
            .with_variable("@DEX", 15)
            .with_change(Change::new("isDroid", false));
        assert!(check(&actor, Prerequisite::attribute("DEX:13")));
        assert!(!check(&actor, Prerequisite::attribute("DEX:>15")));
        assert!(check(&actor, Prerequisite::attribute("isDroid:false")));
        assert!(!check(&actor, Prerequisite::attribute("no separator")));
    }

    #[test]
    fn test_talent_tree_counts_talents() {
        let actor = Entity::character("Kel")
            .with_item(Entity::item(EntityType::Talent, "Evasion").with_talent_tree("Awareness"))
            .with_item(
                Entity::item(EntityType::Talent, "Acute Senses").with_talent_tree("Awareness"),
            );
        let tree = Prerequisite::any(
            2,
            vec![Prerequisite::leaf(RequirementKind::TalentTree, "Awareness")],
        );
        assert!(check(&actor, tree));
    }

    #[test]
    fn test_skills_proficiencies_and_equipment() {
        let actor = Entity::character("Kel")
            .with_trained_skill("Perception")
            .with_item(
                Entity::item(EntityType::Feat, "Weapon Proficiency (Rifles)")
                    .with_change(Change::new("weaponProficiency", "Rifles")),
            )
            .with_item(Entity::item(EntityType::Armor, "Combat Jumpsuit").equipped())
            .with_gender("female");
        assert!(check(&actor, Prerequisite::leaf(RequirementKind::TrainedSkill, "perception")));
        assert!(!check(&actor, Prerequisite::leaf(RequirementKind::TrainedSkill, "Stealth")));
        assert!(check(&actor, Prerequisite::leaf(RequirementKind::Proficiency, "rifles")));
        assert!(check(&actor, Prerequisite::leaf(RequirementKind::Equipped, "Combat Jumpsuit")));
        assert!(check(&actor, Prerequisite::leaf(RequirementKind::Gender, "Female")));
    }

    #[test]
    fn test_item_leaves_honour_the_override() {
        let armor = Entity::item(EntityType::Armor, "Combat Jumpsuit").equipped();
        let actor = Entity::character("Kel").with_item(armor);
        let equipped = Prerequisite::leaf(RequirementKind::Equipped, "Combat Jumpsuit");
        let owned = Prerequisite::leaf(RequirementKind::Item, "Combat Jumpsuit");

        let none: Vec<&Entity> = Vec::new();
        let narrowed = PrerequisiteOptions::default().with_embedded_item_override(&none);
        assert!(!meets_prerequisites(Some(&actor), Some(&equipped), &narrowed).passes());
        assert!(!meets_prerequisites(Some(&actor), Some(&owned), &narrowed).passes());

        let all: Vec<&Entity> = actor.items.iter().collect();
        let full = PrerequisiteOptions::default().with_embedded_item_override(&all);
        assert!(meets_prerequisites(Some(&actor), Some(&equipped), &full).passes());
        assert!(meets_prerequisites(Some(&actor), Some(&owned), &full).passes());
    }

    #[test]
    fn test_same_leaf_keeps_each_nodes_text() {
        let actor = Entity::character("Kel");
        let tree = Prerequisite::all(vec![
            Prerequisite::feat("Toughness").with_text("Needs Toughness"),
            Prerequisite::feat("Toughness").with_text("Toughness, again"),
        ]);
        let result = meets_prerequisites(Some(&actor), Some(&tree), &PrerequisiteOptions::default());
        let messages: Vec<&str> = result.failure_list[0]
            .children
            .iter()
            .map(|entry| entry.message.as_str())
            .collect();
        assert_eq!(messages, vec!["Needs Toughness", "Toughness, again"]);
    }

    #[test]
    fn test_special_is_informational() {
        let actor = Entity::character("Kel");
        let tree = Prerequisite::leaf(RequirementKind::Special, "").with_text("GM approval");
        let result = meets_prerequisites(Some(&actor), Some(&tree), &PrerequisiteOptions::default());
        assert!(result.passes());
        assert_eq!(result.failure_list.len(), 1);
        assert!(!result.failure_list[0].fail);
        assert_eq!(result.failure_list[0].message, "GM approval");
    }

    #[test]
    fn test_dark_side_score() {
        let actor = Entity::character("Kel")
            .with_dark_side_score(2.0)
            .with_change(Change::new("darkSideScore", 1));
        assert!(check(&actor, Prerequisite::leaf(RequirementKind::DarkSideScore, "3")));
        assert!(!check(&actor, Prerequisite::leaf(RequirementKind::DarkSideScore, "4")));
    }
}
