//! Catalog of canonical item definitions and option universes.
//!
//! Choice resolution looks feats and talents up by name to check their
//! prerequisites, and expands sentinel options over the skill and weapon
//! lists. The host's compendium sits behind the [`Catalog`] trait; the
//! [`StandardCatalog`] carries the core lists.

use crate::change::Change;
use crate::entity::{Entity, EntityType};
use crate::prerequisite::{Prerequisite, RequirementKind};

/// Option universes a catalog can enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionUniverse {
    Skills,
    WeaponGroups,
    ExoticWeapons,
}

/// Resolves names to canonical definitions.
pub trait Catalog: Send + Sync {
    /// The canonical definition of `name` with type `kind`.
    fn find(&self, name: &str, kind: &EntityType) -> Option<Entity>;

    fn list(&self, universe: OptionUniverse) -> Vec<String>;
}

lazy_static::lazy_static! {
    pub static ref SKILLS: Vec<&'static str> = vec![
        "Acrobatics",
        "Climb",
        "Deception",
        "Endurance",
        "Gather Information",
        "Initiative",
        "Jump",
        "Knowledge (Bureaucracy)",
        "Knowledge (Galactic Lore)",
        "Knowledge (Life Sciences)",
        "Knowledge (Physical Sciences)",
        "Knowledge (Social Sciences)",
        "Knowledge (Tactics)",
        "Knowledge (Technology)",
        "Mechanics",
        "Perception",
        "Persuasion",
        "Pilot",
        "Ride",
        "Stealth",
        "Survival",
        "Swim",
        "Treat Injury",
        "Use Computer",
        "Use the Force",
    ];

    pub static ref WEAPON_GROUPS: Vec<&'static str> = vec![
        "Simple Weapons",
        "Pistols",
        "Rifles",
        "Lightsabers",
        "Heavy Weapons",
        "Advanced Melee Weapons",
    ];

    pub static ref EXOTIC_WEAPONS: Vec<&'static str> = vec![
        "Amphistaff",
        "Atlatl",
        "Bowcaster",
        "Cesta",
        "Flamethrower",
        "Lightfoil",
        "Net",
        "Ryyk Blade",
    ];

    /// Feats the sentinel options provide, with their prerequisites.
    pub static ref STANDARD_FEATS: Vec<Entity> = vec![
        Entity::item(EntityType::Feat, "Skill Focus")
            .with_change(Change::new("skillFocus", "#payload#")),
        Entity::item(EntityType::Feat, "Skill Mastery")
            .with_change(Change::new("skillMastery", "#payload#")),
        Entity::item(EntityType::Feat, "Skill Training")
            .with_change(Change::new("trainedSkills", "#payload#")),
        Entity::item(EntityType::Feat, "Weapon Proficiency")
            .with_change(Change::new("weaponProficiency", "#payload#")),
        Entity::item(EntityType::Feat, "Exotic Weapon Proficiency")
            .with_prerequisite(Prerequisite::leaf(RequirementKind::BaseAttackBonus, "1"))
            .with_change(Change::new("weaponProficiency", "#payload#")),
        Entity::item(EntityType::Feat, "Weapon Focus")
            .with_change(Change::new("weaponFocus", "#payload#")),
        Entity::item(EntityType::Feat, "Weapon Specialization")
            .with_prerequisite(Prerequisite::leaf(RequirementKind::BaseAttackBonus, "1"))
            .with_change(Change::new("weaponSpecialization", "#payload#")),
        Entity::item(EntityType::Feat, "Force Sensitivity")
            .with_change(Change::new("forceSensitivity", true)),
        Entity::item(EntityType::Feat, "Force Training")
            .with_prerequisite(Prerequisite::feat("Force Sensitivity")),
        Entity::item(EntityType::Feat, "Toughness")
            .with_change(Change::new("hitPointEq", "@charLevel")),
    ];
}

/// The built-in catalog, optionally extended with host definitions.
#[derive(Debug, Clone, Default)]
pub struct StandardCatalog {
    extra: Vec<Entity>,
}

impl StandardCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or shadow a definition.
    pub fn with_entry(mut self, entry: Entity) -> Self {
        self.extra.push(entry);
        self
    }
}

impl Catalog for StandardCatalog {
    fn find(&self, name: &str, kind: &EntityType) -> Option<Entity> {
        let name = name.trim();
        self.extra
            .iter()
            .rev()
            .chain(STANDARD_FEATS.iter())
            .find(|entry| entry.kind == *kind && entry.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    fn list(&self, universe: OptionUniverse) -> Vec<String> {
        let list: &[&str] = match universe {
            OptionUniverse::Skills => SKILLS.as_slice(),
            OptionUniverse::WeaponGroups => WEAPON_GROUPS.as_slice(),
            OptionUniverse::ExoticWeapons => EXOTIC_WEAPONS.as_slice(),
        };
        list.iter().map(|s| s.to_string()).collect()
    }
}
