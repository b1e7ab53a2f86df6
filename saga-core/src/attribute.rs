//! Attribute aggregation over an entity and its inheritable items.
//!
//! An attribute is never stored: it is derived on every read by collecting
//! the matching change records from the entity, its enabled effects and, for
//! actors, every admitted inheritable item, then reducing them.

use crate::change::{Change, StackMode};
use crate::entity::Entity;
use crate::expression::{resolve_expression, VariableSource};
use crate::inheritance::inheritable_items_in;
use crate::pass::Pass;
use crate::value::{normalize, resolve_expression_reduce, scalar, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Reduce Modes
// ============================================================================

#[derive(Debug, Error)]
#[error("Unknown reduce mode: {0}")]
pub struct UnknownReduceMode(String);

/// How collected changes are folded into a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReduceMode {
    Sum,
    Expression,
    And,
    Or,
    Max,
    Min,
    First,
    Values,
    ValuesToLowercase,
    Unique,
    NumericValues,
    Summary,
    Count,
}

impl ReduceMode {
    pub const ALL: [ReduceMode; 13] = [
        ReduceMode::Sum,
        ReduceMode::Expression,
        ReduceMode::And,
        ReduceMode::Or,
        ReduceMode::Max,
        ReduceMode::Min,
        ReduceMode::First,
        ReduceMode::Values,
        ReduceMode::ValuesToLowercase,
        ReduceMode::Unique,
        ReduceMode::NumericValues,
        ReduceMode::Summary,
        ReduceMode::Count,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ReduceMode::Sum => "SUM",
            ReduceMode::Expression => "EXPRESSION",
            ReduceMode::And => "AND",
            ReduceMode::Or => "OR",
            ReduceMode::Max => "MAX",
            ReduceMode::Min => "MIN",
            ReduceMode::First => "FIRST",
            ReduceMode::Values => "VALUES",
            ReduceMode::ValuesToLowercase => "VALUES_TO_LOWERCASE",
            ReduceMode::Unique => "UNIQUE",
            ReduceMode::NumericValues => "NUMERIC_VALUES",
            ReduceMode::Summary => "SUMMARY",
            ReduceMode::Count => "COUNT",
        }
    }
}

impl FromStr for ReduceMode {
    type Err = UnknownReduceMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace([' ', '-'], "_");
        ReduceMode::ALL
            .into_iter()
            .find(|mode| mode.name() == normalized)
            .ok_or_else(|| UnknownReduceMode(s.to_string()))
    }
}

impl fmt::Display for ReduceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// Results
// ============================================================================

/// The result of an attribute query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Value(Value),
    Values(Vec<Value>),
    /// Raw filtered changes, when no reduce mode is given.
    Changes(Vec<Change>),
    /// One result per key, for multi-key queries.
    Mapped(BTreeMap<String, AttributeValue>),
    /// MAX, MIN or FIRST over nothing.
    Empty,
}

impl AttributeValue {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            AttributeValue::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        self.as_value().and_then(Value::as_number)
    }

    pub fn values(&self) -> &[Value] {
        match self {
            AttributeValue::Values(values) => values,
            _ => &[],
        }
    }

    pub fn changes(&self) -> &[Change] {
        match self {
            AttributeValue::Changes(changes) => changes,
            _ => &[],
        }
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        match self {
            AttributeValue::Mapped(map) => map.get(key),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Value(value) => write!(f, "{value}"),
            AttributeValue::Values(values) => {
                let parts: Vec<String> = values.iter().map(Value::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            AttributeValue::Changes(changes) => {
                for (i, change) in changes.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(
                        f,
                        "{} {} {} (priority {}, from {})",
                        change.key,
                        change.mode,
                        change.value,
                        change.priority,
                        change.source_name().unwrap_or("unknown")
                    )?;
                }
                Ok(())
            }
            AttributeValue::Mapped(map) => {
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                Ok(())
            }
            AttributeValue::Empty => Ok(()),
        }
    }
}

// ============================================================================
// Query
// ============================================================================

/// Switches that change which sources are collected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributeFlags {
    /// Collect changes from disabled effects and items too.
    pub include_disabled: bool,
}

/// A filter over collected changes, typically by provenance.
pub type ChangeFilter<'q> = Box<dyn Fn(&Change) -> bool + 'q>;

/// What to collect and how to reduce it.
pub struct AttributeQuery<'q> {
    keys: Vec<String>,
    mapped: bool,
    reduce: Option<ReduceMode>,
    filter: Option<ChangeFilter<'q>>,
    flags: AttributeFlags,
    embedded_item_override: Option<&'q [&'q Entity]>,
}

impl<'q> AttributeQuery<'q> {
    /// Query a single key.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            keys: vec![key.into()],
            mapped: false,
            reduce: None,
            filter: None,
            flags: AttributeFlags::default(),
            embedded_item_override: None,
        }
    }

    /// Query several keys at once. The result is [`AttributeValue::Mapped`].
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            mapped: true,
            ..Self::new(String::new())
        }
    }

    pub fn reduce(mut self, mode: ReduceMode) -> Self {
        self.reduce = Some(mode);
        self
    }

    pub fn filter(mut self, filter: impl Fn(&Change) -> bool + 'q) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn flags(mut self, flags: AttributeFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn include_disabled(mut self) -> Self {
        self.flags.include_disabled = true;
        self
    }

    /// Use `items` as the actor's inheritable set instead of computing it.
    pub fn with_embedded_item_override(mut self, items: &'q [&'q Entity]) -> Self {
        self.embedded_item_override = Some(items);
        self
    }
}

impl fmt::Debug for AttributeQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeQuery")
            .field("keys", &self.keys)
            .field("reduce", &self.reduce)
            .field("filtered", &self.filter.is_some())
            .field("flags", &self.flags)
            .field(
                "embedded_item_override",
                &self.embedded_item_override.map(<[_]>::len),
            )
            .finish()
    }
}

// ============================================================================
// Aggregation
// ============================================================================

/// Resolve an attribute of `entity` in a fresh pass.
pub fn get_inheritable_attribute(entity: &Entity, query: &AttributeQuery<'_>) -> AttributeValue {
    let mut pass = Pass::new();
    resolve_attribute(&mut pass, entity, query)
}

/// Resolve an attribute inside an existing pass.
pub(crate) fn resolve_attribute<'a>(
    pass: &mut Pass<'a>,
    entity: &'a Entity,
    query: &AttributeQuery<'_>,
) -> AttributeValue {
    let changes = collect_changes(pass, entity, query);

    let mut results: BTreeMap<String, AttributeValue> = BTreeMap::new();
    for key in &query.keys {
        let matching: Vec<Change> = changes.iter().filter(|c| c.key == *key).cloned().collect();
        results.insert(key.clone(), reduce_changes(query.reduce, matching, entity));
    }

    if query.mapped {
        AttributeValue::Mapped(results)
    } else {
        results
            .into_values()
            .next()
            .unwrap_or(AttributeValue::Empty)
    }
}

/// Every change reachable from `entity`, attributed and filtered.
fn collect_changes<'a>(
    pass: &mut Pass<'a>,
    entity: &'a Entity,
    query: &AttributeQuery<'_>,
) -> Vec<Change> {
    let mut changes = Vec::new();
    push_own_changes(entity, query.flags, &mut changes);

    if entity.is_actor() {
        match query.embedded_item_override {
            Some(items) => {
                for item in items {
                    push_own_changes(item, query.flags, &mut changes);
                }
            }
            None => {
                for item in inheritable_items_in(pass, entity) {
                    push_own_changes(item, query.flags, &mut changes);
                }
            }
        }
    }

    match &query.filter {
        Some(filter) => changes.into_iter().filter(|c| filter(c)).collect(),
        None => changes,
    }
}

fn push_own_changes(entity: &Entity, flags: AttributeFlags, out: &mut Vec<Change>) {
    if entity.is_disabled() && !flags.include_disabled {
        return;
    }
    out.extend(entity.changes().iter().map(|c| c.sourced_from(entity)));
    for effect in &entity.effects {
        if effect.is_disabled() && !flags.include_disabled {
            continue;
        }
        out.extend(effect.changes().iter().map(|c| c.sourced_from(effect)));
    }
}

/// Fold collected changes by `mode`. No mode returns the changes themselves.
pub fn reduce_changes(
    mode: Option<ReduceMode>,
    changes: Vec<Change>,
    vars: &dyn VariableSource,
) -> AttributeValue {
    match mode {
        None => AttributeValue::Changes(changes),
        Some(mode) => reduce_array(mode, &changes, vars),
    }
}

/// Reduce a change list with a reduce mode.
pub fn reduce_array(mode: ReduceMode, changes: &[Change], vars: &dyn VariableSource) -> AttributeValue {
    let resolved = || changes.iter().map(|c| resolve_expression(&c.value, vars));

    match mode {
        ReduceMode::Sum | ReduceMode::Expression => {
            AttributeValue::Value(resolve_expression_reduce(changes, vars))
        }
        ReduceMode::And => AttributeValue::Value(Value::Bool(resolved().all(|v| v.is_truthy()))),
        ReduceMode::Or => AttributeValue::Value(Value::Bool(resolved().any(|v| v.is_truthy()))),
        ReduceMode::Max | ReduceMode::Min => {
            let mut best: Option<Value> = None;
            for value in changes.iter().map(|c| normalize(&c.value, vars)) {
                best = Some(match best {
                    None => value,
                    Some(current) => {
                        let better = if mode == ReduceMode::Max {
                            scalar(&value) > scalar(&current)
                        } else {
                            scalar(&value) < scalar(&current)
                        };
                        if better {
                            value
                        } else {
                            current
                        }
                    }
                });
            }
            best.map_or(AttributeValue::Empty, AttributeValue::Value)
        }
        ReduceMode::First => changes
            .first()
            .map_or(AttributeValue::Empty, |c| AttributeValue::Value(c.value.clone())),
        ReduceMode::Values => AttributeValue::Values(bucketed_values(changes)),
        ReduceMode::ValuesToLowercase => AttributeValue::Values(
            bucketed_values(changes)
                .iter()
                .map(Value::to_lowercase)
                .collect(),
        ),
        ReduceMode::Unique => {
            let mut unique: Vec<Value> = Vec::new();
            for value in bucketed_values(changes) {
                if !unique.contains(&value) {
                    unique.push(value);
                }
            }
            AttributeValue::Values(unique)
        }
        ReduceMode::NumericValues => AttributeValue::Values(
            resolved()
                .filter_map(|v| v.as_number())
                .map(Value::Number)
                .collect(),
        ),
        ReduceMode::Summary => {
            let parts: Vec<String> = changes
                .iter()
                .map(|c| format!("{}: {};", c.source_name().unwrap_or("unknown"), c.value))
                .collect();
            AttributeValue::Value(Value::Text(parts.join(" ")))
        }
        ReduceMode::Count => AttributeValue::Value(Value::from(changes.len())),
    }
}

/// Values in priority order. An OVERRIDE discards everything collected in
/// earlier buckets and the non-override values of its own bucket.
fn bucketed_values(changes: &[Change]) -> Vec<Value> {
    let mut buckets: BTreeMap<i32, Vec<&Change>> = BTreeMap::new();
    for change in changes {
        buckets.entry(change.priority).or_default().push(change);
    }

    let mut values = Vec::new();
    for bucket in buckets.values() {
        let overrides: Vec<Value> = bucket
            .iter()
            .filter(|c| c.mode == StackMode::Override)
            .map(|c| c.value.clone())
            .collect();
        if overrides.is_empty() {
            values.extend(bucket.iter().map(|c| c.value.clone()));
        } else {
            values = overrides;
        }
    }
    values
}

/// An item's name followed by the `nameSuffix` values its modifications add.
pub fn display_name(item: &Entity) -> String {
    let id = item.id;
    let query = AttributeQuery::new("nameSuffix")
        .reduce(ReduceMode::Values)
        .filter(move |change| !change.is_from(id));
    let suffixes: Vec<String> = get_inheritable_attribute(item, &query)
        .values()
        .iter()
        .map(Value::to_string)
        .filter(|suffix| !suffix.trim().is_empty())
        .collect();

    if suffixes.is_empty() {
        item.name.clone()
    } else {
        format!("{} {}", item.name, suffixes.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use crate::expression::NoVariables;

    fn fighter() -> Entity {
        Entity::character("Rook")
            .with_change(Change::new("defense", 1))
            .with_item(
                Entity::item(EntityType::Feat, "Toughness").with_change(Change::new("hitPoints", 5)),
            )
            .with_item(
                Entity::item(EntityType::Armor, "Padded Suit")
                    .equipped()
                    .with_change(Change::new("defense", 2)),
            )
            .with_item(
                Entity::item(EntityType::Armor, "Spare Armor").with_change(Change::new("defense", 9)),
            )
    }

    #[test]
    fn test_reduce_mode_parses_names() {
        assert_eq!(
            "values_to_lowercase".parse::<ReduceMode>().unwrap(),
            ReduceMode::ValuesToLowercase
        );
        assert_eq!("SUM".parse::<ReduceMode>().unwrap(), ReduceMode::Sum);
        assert!("AVERAGE".parse::<ReduceMode>().is_err());
    }

    #[test]
    fn test_sum_collects_actor_and_equipped_items() {
        let actor = fighter();
        let query = AttributeQuery::new("defense").reduce(ReduceMode::Sum);
        assert_eq!(
            get_inheritable_attribute(&actor, &query).as_number(),
            Some(3.0)
        );
    }

    #[test]
    fn test_no_reduce_returns_sourced_changes() {
        let actor = fighter();
        let query = AttributeQuery::new("hitPoints");
        let result = get_inheritable_attribute(&actor, &query);
        assert_eq!(result.changes().len(), 1);
        assert_eq!(result.changes()[0].source_name(), Some("Toughness"));
    }

    #[test]
    fn test_key_list_is_mapped() {
        let actor = fighter();
        let query = AttributeQuery::keys(["defense", "hitPoints"]).reduce(ReduceMode::Sum);
        let result = get_inheritable_attribute(&actor, &query);
        assert_eq!(result.get("defense").and_then(|v| v.as_number()), Some(3.0));
        assert_eq!(result.get("hitPoints").and_then(|v| v.as_number()), Some(5.0));
    }

    #[test]
    fn test_disabled_effects_need_flag() {
        let item = Entity::item(EntityType::Weapon, "Blaster Pistol")
            .with_effect(Entity::effect("Overcharged").disabled().with_change(Change::new("damage", "1d6")));
        let query = AttributeQuery::new("damage").reduce(ReduceMode::Count);
        assert_eq!(get_inheritable_attribute(&item, &query).as_number(), Some(0.0));

        let query = AttributeQuery::new("damage")
            .reduce(ReduceMode::Count)
            .include_disabled();
        assert_eq!(get_inheritable_attribute(&item, &query).as_number(), Some(1.0));
    }

    #[test]
    fn test_boolean_folds() {
        let changes = vec![Change::new("k", true), Change::new("k", "false")];
        assert_eq!(
            reduce_array(ReduceMode::And, &changes, &NoVariables),
            AttributeValue::Value(Value::Bool(false))
        );
        assert_eq!(
            reduce_array(ReduceMode::Or, &changes, &NoVariables),
            AttributeValue::Value(Value::Bool(true))
        );
        assert_eq!(
            reduce_array(ReduceMode::And, &[], &NoVariables),
            AttributeValue::Value(Value::Bool(true))
        );
        assert_eq!(
            reduce_array(ReduceMode::Or, &[], &NoVariables),
            AttributeValue::Value(Value::Bool(false))
        );
    }

    #[test]
    fn test_max_min_by_weighted_scalar() {
        let changes = vec![Change::new("k", "2d4"), Change::new("k", "1d10"), Change::new("k", 9)];
        assert_eq!(
            reduce_array(ReduceMode::Max, &changes, &NoVariables),
            AttributeValue::Value(Value::from("1d10"))
        );
        assert_eq!(
            reduce_array(ReduceMode::Min, &changes, &NoVariables),
            AttributeValue::Value(Value::from("2d4"))
        );
        assert_eq!(
            reduce_array(ReduceMode::Max, &[], &NoVariables),
            AttributeValue::Empty
        );
    }

    #[test]
    fn test_values_respect_override_priority() {
        let changes = vec![
            Change::new("languages", "Basic"),
            Change::new("languages", "Huttese"),
            Change::new("languages", "Binary")
                .with_mode(StackMode::Override)
                .with_priority(2),
            Change::new("languages", "Bocce").with_priority(3),
        ];
        assert_eq!(
            reduce_array(ReduceMode::Values, &changes, &NoVariables),
            AttributeValue::Values(vec![Value::from("Binary"), Value::from("Bocce")])
        );
    }

    #[test]
    fn test_unique_lowercase_and_numeric() {
        let changes = vec![
            Change::new("k", "Rifles"),
            Change::new("k", "Rifles"),
            Change::new("k", "3"),
        ];
        assert_eq!(
            reduce_array(ReduceMode::Unique, &changes, &NoVariables).values().len(),
            2
        );
        assert_eq!(
            reduce_array(ReduceMode::ValuesToLowercase, &changes, &NoVariables).values()[0],
            Value::from("rifles")
        );
        assert_eq!(
            reduce_array(ReduceMode::NumericValues, &changes, &NoVariables),
            AttributeValue::Values(vec![Value::Number(3.0)])
        );
    }

    #[test]
    fn test_summary_names_sources() {
        let actor = fighter();
        let query = AttributeQuery::new("defense").reduce(ReduceMode::Summary);
        assert_eq!(
            get_inheritable_attribute(&actor, &query),
            AttributeValue::Value(Value::from("Rook: 1; Padded Suit: 2;"))
        );
    }

    #[test]
    fn test_filter_by_provenance() {
        let actor = fighter();
        let actor_id = actor.id;
        let query = AttributeQuery::new("defense")
            .reduce(ReduceMode::Sum)
            .filter(move |c| !c.is_from(actor_id));
        assert_eq!(
            get_inheritable_attribute(&actor, &query).as_number(),
            Some(2.0)
        );
    }

    #[test]
    fn test_display_name_skips_own_suffix() {
        let rifle = Entity::item(EntityType::Weapon, "Blaster Rifle")
            .with_change(Change::new("nameSuffix", "(Stock)"))
            .with_effect(Entity::effect("Modified").with_change(Change::new("nameSuffix", "(Modified)")));
        assert_eq!(display_name(&rifle), "Blaster Rifle (Modified)");
    }
}
