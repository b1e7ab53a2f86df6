//! Change records: the single rule-effect contributions attached to entities.
//!
//! A change names an attribute key, a stacking mode and a value. Changes are
//! read-only snapshots while an attribute is being resolved.

use crate::entity::{Entity, EntityId};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default priority for changes that don't specify one.
pub const DEFAULT_PRIORITY: i32 = 1;

/// Error when a stacking mode can't be decoded from a snapshot.
#[derive(Debug, Error)]
#[error("Unknown stacking mode: {0}")]
pub struct UnknownStackMode(String);

/// How a change combines with other changes for the same key.
///
/// Snapshots may spell the mode by name or by the host's numeric code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(try_from = "RawStackMode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StackMode {
    #[default]
    Add,
    Downgrade,
    Upgrade,
    Multiply,
    Override,
    PostRollMultiply,
}

impl StackMode {
    /// Order in which modes are applied inside one priority bucket.
    pub const ORDER: [StackMode; 6] = [
        StackMode::Add,
        StackMode::Downgrade,
        StackMode::Upgrade,
        StackMode::Multiply,
        StackMode::Override,
        StackMode::PostRollMultiply,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StackMode::Add => "ADD",
            StackMode::Downgrade => "DOWNGRADE",
            StackMode::Upgrade => "UPGRADE",
            StackMode::Multiply => "MULTIPLY",
            StackMode::Override => "OVERRIDE",
            StackMode::PostRollMultiply => "POST_ROLL_MULTIPLY",
        }
    }

    /// Decode the host's numeric mode code. Code 0 (custom) behaves like ADD.
    pub fn from_code(code: u8) -> Option<StackMode> {
        match code {
            0 | 2 => Some(StackMode::Add),
            1 => Some(StackMode::Multiply),
            3 => Some(StackMode::Downgrade),
            4 => Some(StackMode::Upgrade),
            5 => Some(StackMode::Override),
            6 => Some(StackMode::PostRollMultiply),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<StackMode> {
        let normalized = name.trim().to_uppercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "ADD" | "CUSTOM" => Some(StackMode::Add),
            "DOWNGRADE" => Some(StackMode::Downgrade),
            "UPGRADE" => Some(StackMode::Upgrade),
            "MULTIPLY" => Some(StackMode::Multiply),
            "OVERRIDE" => Some(StackMode::Override),
            "POST_ROLL_MULTIPLY" => Some(StackMode::PostRollMultiply),
            _ => normalized.parse::<u8>().ok().and_then(StackMode::from_code),
        }
    }
}

impl fmt::Display for StackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawStackMode {
    Code(u8),
    Name(String),
}

impl TryFrom<RawStackMode> for StackMode {
    type Error = UnknownStackMode;

    fn try_from(raw: RawStackMode) -> Result<Self, Self::Error> {
        match raw {
            RawStackMode::Code(code) => {
                StackMode::from_code(code).ok_or_else(|| UnknownStackMode(code.to_string()))
            }
            RawStackMode::Name(name) => {
                StackMode::from_name(&name).ok_or(UnknownStackMode(name))
            }
        }
    }
}

/// Where a collected change came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: EntityId,
    pub name: String,
}

/// A single attribute contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub key: String,
    #[serde(default)]
    pub mode: StackMode,
    #[serde(default)]
    pub value: Value,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRef>,
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

impl Change {
    /// Create an ADD change at the default priority.
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            mode: StackMode::Add,
            value: value.into(),
            priority: DEFAULT_PRIORITY,
            source: None,
        }
    }

    pub fn with_mode(mut self, mode: StackMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Copy of this change attributed to `entity` unless it already names a source.
    pub fn sourced_from(&self, entity: &Entity) -> Change {
        let mut change = self.clone();
        if change.source.is_none() {
            change.source = Some(entity.source_ref());
        }
        change
    }

    /// Display name of the source, if known.
    pub fn source_name(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.name.as_str())
    }

    pub fn is_from(&self, id: EntityId) -> bool {
        self.source.as_ref().is_some_and(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_defaults_to_add() {
        let change: Change = serde_json::from_str(r#"{"key": "defense", "value": 2}"#).unwrap();
        assert_eq!(change.mode, StackMode::Add);
        assert_eq!(change.priority, DEFAULT_PRIORITY);
        assert_eq!(change.value, Value::Number(2.0));
    }

    #[test]
    fn test_mode_from_code_and_name() {
        let by_code: Change =
            serde_json::from_str(r#"{"key": "k", "mode": 5, "value": "x"}"#).unwrap();
        assert_eq!(by_code.mode, StackMode::Override);

        let by_name: Change =
            serde_json::from_str(r#"{"key": "k", "mode": "POST_ROLL_MULTIPLY", "value": 2}"#)
                .unwrap();
        assert_eq!(by_name.mode, StackMode::PostRollMultiply);

        let custom: Change = serde_json::from_str(r#"{"key": "k", "mode": 0}"#).unwrap();
        assert_eq!(custom.mode, StackMode::Add);

        assert!(serde_json::from_str::<Change>(r#"{"key": "k", "mode": 9}"#).is_err());
    }

    #[test]
    fn test_mode_serializes_by_name() {
        let change = Change::new("k", 1).with_mode(StackMode::Upgrade);
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["mode"], "UPGRADE");
    }

    #[test]
    fn test_sourced_from_keeps_existing_source() {
        let feat = Entity::item(crate::entity::EntityType::Feat, "Toughness");
        let other = Entity::item(crate::entity::EntityType::Feat, "Other");

        let sourced = Change::new("hitPoints", 3).sourced_from(&feat);
        assert!(sourced.is_from(feat.id));

        let resourced = sourced.sourced_from(&other);
        assert!(resourced.is_from(feat.id));
        assert_eq!(resourced.source_name(), Some("Toughness"));
    }
}
