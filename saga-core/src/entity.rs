//! Entity snapshots: actors, items and active effects.
//!
//! Entities are read-only inputs supplied by the host. Actors own items,
//! items own active effects, and every entity owns its change records.

use crate::change::{Change, SourceRef};
use crate::choice::Choice;
use crate::expression::VariableSource;
use crate::prerequisite::Prerequisite;
use crate::value::Value;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Read a host id. Ids that are not UUIDs (hosts commonly use short
    /// random strings) map to a stable name-based UUID, so the same host id
    /// always yields the same `EntityId`.
    pub fn from_host_id(raw: &str) -> Self {
        match Uuid::parse_str(raw.trim()) {
            Ok(uuid) => Self(uuid),
            Err(_) => {
                tracing::debug!(id = %raw, "non-UUID entity id, deriving a name-based UUID");
                Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, raw.trim().as_bytes()))
            }
        }
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(EntityId::from_host_id(&raw))
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Entity Types
// ============================================================================

/// Document type of an entity. Unknown host types are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    Character,
    Npc,
    Vehicle,
    Species,
    Class,
    Feat,
    Talent,
    Trait,
    ForcePower,
    ForceTechnique,
    ForceSecret,
    Weapon,
    Armor,
    Equipment,
    Upgrade,
    Background,
    Destiny,
    Affiliation,
    VehicleBaseType,
    BeastType,
    Language,
    Effect,
    Other(String),
}

impl EntityType {
    pub fn from_name(name: &str) -> EntityType {
        match name.trim().to_lowercase().replace([' ', '_'], "").as_str() {
            "character" => EntityType::Character,
            "npc" => EntityType::Npc,
            "vehicle" => EntityType::Vehicle,
            "species" => EntityType::Species,
            "class" => EntityType::Class,
            "feat" => EntityType::Feat,
            "talent" => EntityType::Talent,
            "trait" => EntityType::Trait,
            "forcepower" => EntityType::ForcePower,
            "forcetechnique" => EntityType::ForceTechnique,
            "forcesecret" => EntityType::ForceSecret,
            "weapon" => EntityType::Weapon,
            "armor" => EntityType::Armor,
            "equipment" => EntityType::Equipment,
            "upgrade" => EntityType::Upgrade,
            "background" => EntityType::Background,
            "destiny" => EntityType::Destiny,
            "affiliation" => EntityType::Affiliation,
            "vehiclebasetype" => EntityType::VehicleBaseType,
            "beasttype" => EntityType::BeastType,
            "language" => EntityType::Language,
            "effect" | "activeeffect" => EntityType::Effect,
            _ => EntityType::Other(name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EntityType::Character => "character",
            EntityType::Npc => "npc",
            EntityType::Vehicle => "vehicle",
            EntityType::Species => "species",
            EntityType::Class => "class",
            EntityType::Feat => "feat",
            EntityType::Talent => "talent",
            EntityType::Trait => "trait",
            EntityType::ForcePower => "forcePower",
            EntityType::ForceTechnique => "forceTechnique",
            EntityType::ForceSecret => "forceSecret",
            EntityType::Weapon => "weapon",
            EntityType::Armor => "armor",
            EntityType::Equipment => "equipment",
            EntityType::Upgrade => "upgrade",
            EntityType::Background => "background",
            EntityType::Destiny => "destiny",
            EntityType::Affiliation => "affiliation",
            EntityType::VehicleBaseType => "vehicleBaseType",
            EntityType::BeastType => "beastType",
            EntityType::Language => "language",
            EntityType::Effect => "effect",
            EntityType::Other(name) => name,
        }
    }

    /// Actor-like containers whose inheritable items contribute changes.
    pub fn is_actor(&self) -> bool {
        matches!(
            self,
            EntityType::Character | EntityType::Npc | EntityType::Vehicle
        )
    }

    /// Item types that always count toward their owner.
    pub fn inherits_always(&self) -> bool {
        matches!(
            self,
            EntityType::Species
                | EntityType::Class
                | EntityType::Background
                | EntityType::Destiny
                | EntityType::Affiliation
                | EntityType::VehicleBaseType
                | EntityType::BeastType
                | EntityType::Language
                | EntityType::ForcePower
                | EntityType::ForceTechnique
                | EntityType::ForceSecret
        )
    }

    /// Item types admitted only once their own prerequisite passes.
    pub fn inherits_conditionally(&self) -> bool {
        matches!(
            self,
            EntityType::Feat | EntityType::Talent | EntityType::Trait
        )
    }
}

impl From<String> for EntityType {
    fn from(name: String) -> Self {
        EntityType::from_name(&name)
    }
}

impl From<EntityType> for String {
    fn from(kind: EntityType) -> Self {
        kind.name().to_string()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// System Data
// ============================================================================

/// The rules data carried by an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct System {
    pub changes: Vec<Change>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prerequisite: Option<Prerequisite>,
    #[serde(deserialize_with = "lenient_flag")]
    pub equipped: bool,
    #[serde(deserialize_with = "lenient_flag")]
    pub disabled: bool,
    #[serde(deserialize_with = "lenient_flag")]
    pub ignore_prerequisites: bool,
    #[serde(deserialize_with = "lenient_flag")]
    pub suppress_dialog: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dark_side_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub talent_tree: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trained_skills: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, Value>,
}

/// Host flags arrive as booleans or as marker strings such as `"equipped"`.
fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
        Missing(()),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Text(text) => {
            let text = text.trim();
            !text.is_empty() && !text.eq_ignore_ascii_case("false")
        }
        Flag::Missing(()) => false,
    })
}

// ============================================================================
// Entity
// ============================================================================

/// An actor, item or active effect snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(default, alias = "_id")]
    pub id: EntityId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntityType,
    #[serde(default)]
    pub system: System,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Entity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effects: Vec<Entity>,
}

impl Entity {
    pub fn new(kind: EntityType, name: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            kind,
            system: System::default(),
            items: Vec::new(),
            effects: Vec::new(),
        }
    }

    pub fn character(name: impl Into<String>) -> Self {
        Self::new(EntityType::Character, name)
    }

    pub fn item(kind: EntityType, name: impl Into<String>) -> Self {
        Self::new(kind, name)
    }

    pub fn effect(name: impl Into<String>) -> Self {
        Self::new(EntityType::Effect, name)
    }

    // Builder methods

    pub fn with_change(mut self, change: Change) -> Self {
        self.system.changes.push(change);
        self
    }

    pub fn with_changes(mut self, changes: impl IntoIterator<Item = Change>) -> Self {
        self.system.changes.extend(changes);
        self
    }

    pub fn with_prerequisite(mut self, prerequisite: Prerequisite) -> Self {
        self.system.prerequisite = Some(prerequisite);
        self
    }

    pub fn with_item(mut self, item: Entity) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_effect(mut self, effect: Entity) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_choice(mut self, choice: Choice) -> Self {
        self.system.choices.push(choice);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let name = name.strip_prefix('@').map(str::to_string).unwrap_or(name);
        self.system.variables.insert(name, value.into());
        self
    }

    pub fn with_age(mut self, age: f64) -> Self {
        self.system.age = Some(age);
        self
    }

    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.system.gender = Some(gender.into());
        self
    }

    pub fn with_dark_side_score(mut self, score: f64) -> Self {
        self.system.dark_side_score = Some(score);
        self
    }

    pub fn with_talent_tree(mut self, tree: impl Into<String>) -> Self {
        self.system.talent_tree = Some(tree.into());
        self
    }

    pub fn with_trained_skill(mut self, skill: impl Into<String>) -> Self {
        self.system.trained_skills.push(skill.into());
        self
    }

    pub fn equipped(mut self) -> Self {
        self.system.equipped = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.system.disabled = true;
        self
    }

    pub fn ignoring_prerequisites(mut self) -> Self {
        self.system.ignore_prerequisites = true;
        self
    }

    pub fn suppressing_dialogs(mut self) -> Self {
        self.system.suppress_dialog = true;
        self
    }

    // Accessors

    pub fn is_actor(&self) -> bool {
        self.kind.is_actor()
    }

    pub fn is_equipped(&self) -> bool {
        self.system.equipped
    }

    pub fn is_disabled(&self) -> bool {
        self.system.disabled
    }

    pub fn changes(&self) -> &[Change] {
        &self.system.changes
    }

    pub fn prerequisite(&self) -> Option<&Prerequisite> {
        self.system.prerequisite.as_ref()
    }

    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            id: self.id,
            name: self.name.clone(),
        }
    }

    pub fn items_of<'a>(&'a self, kind: &'a EntityType) -> impl Iterator<Item = &'a Entity> + 'a {
        self.items.iter().filter(move |item| item.kind == *kind)
    }

    /// Find an owned item by name (case-insensitive).
    pub fn find_item(&self, name: &str) -> Option<&Entity> {
        self.items
            .iter()
            .find(|item| item.name.eq_ignore_ascii_case(name.trim()))
    }
}

impl VariableSource for Entity {
    fn variable(&self, name: &str) -> Option<Value> {
        let bare = name.strip_prefix('@').unwrap_or(name);
        self.system
            .variables
            .get(bare)
            .or_else(|| self.system.variables.get(&format!("@{bare}")))
            .cloned()
    }
}
