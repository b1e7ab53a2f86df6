//! Choice resolution.
//!
//! Some items carry parametric choices: "Weapon Focus" asks which weapon
//! group, "Skill Focus" which skill. Resolving an item's choices expands
//! sentinel options against what the actor lacks, picks an answer (supplied
//! up front, implied by a single option, or asked of a [`Prompter`]), and
//! folds the chosen options back onto a copy of the item.

use crate::attribute::{get_inheritable_attribute, AttributeQuery, ReduceMode};
use crate::catalog::{Catalog, OptionUniverse};
use crate::change::Change;
use crate::entity::{Entity, EntityType};
use crate::prerequisite::{meets_prerequisites, PrerequisiteOptions};
use crate::value::Value;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Placeholder replaced by the chosen payload.
pub const PAYLOAD_MARKER: &str = "#payload#";

// ============================================================================
// Choice data
// ============================================================================

/// A parametric choice on an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    pub description: String,
    #[serde(default)]
    pub options: Vec<ChoiceOption>,
    /// Resolve without asking when exactly one option is available.
    #[serde(default)]
    pub one_option: bool,
    /// Message when no option is available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_options: Option<String>,
}

impl Choice {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            options: Vec::new(),
            one_option: false,
            no_options: None,
        }
    }

    pub fn with_option(mut self, option: ChoiceOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn one_option(mut self) -> Self {
        self.one_option = true;
        self
    }

    pub fn with_no_options(mut self, message: impl Into<String>) -> Self {
        self.no_options = Some(message.into());
        self
    }
}

/// One selectable option. A sentinel name expands into many options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceOption {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<Change>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provided_items: Vec<ProvidedItem>,
}

impl ChoiceOption {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: None,
            changes: Vec::new(),
            provided_items: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_change(mut self, change: Change) -> Self {
        self.changes.push(change);
        self
    }

    pub fn providing(mut self, item: ProvidedItem) -> Self {
        self.provided_items.push(item);
        self
    }
}

/// An item the chosen option grants, by name and type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvidedItem {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntityType,
}

impl ProvidedItem {
    pub fn new(kind: EntityType, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Option generators named in place of a concrete option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentinel {
    AvailableSkillFocus,
    AvailableSkillMastery,
    AvailableTrainedSkills,
    AvailableWeaponFocus,
    AvailableWeaponSpecialization,
    AvailableWeaponProficiencies,
    AvailableExoticWeaponProficiency,
}

impl Sentinel {
    pub fn from_name(name: &str) -> Option<Sentinel> {
        match name.trim() {
            "AVAILABLE_SKILL_FOCUS" => Some(Sentinel::AvailableSkillFocus),
            "AVAILABLE_SKILL_MASTERY" => Some(Sentinel::AvailableSkillMastery),
            "AVAILABLE_TRAINED_SKILLS" => Some(Sentinel::AvailableTrainedSkills),
            "AVAILABLE_WEAPON_FOCUS" => Some(Sentinel::AvailableWeaponFocus),
            "AVAILABLE_WEAPON_SPECIALIZATION" => Some(Sentinel::AvailableWeaponSpecialization),
            "AVAILABLE_WEAPON_PROFICIENCIES" => Some(Sentinel::AvailableWeaponProficiencies),
            "AVAILABLE_EXOTIC_WEAPON_PROFICIENCY" => {
                Some(Sentinel::AvailableExoticWeaponProficiency)
            }
            _ => None,
        }
    }
}

// ============================================================================
// Prompting
// ============================================================================

/// What the prompt collaborator is asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub title: String,
    pub content: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptAnswer {
    Selected(String),
    Cancelled,
    /// The entity is in bulk/import mode; the operation must fail closed.
    Suppressed,
}

/// Asks a human to pick an option.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn prompt(&self, request: PromptRequest) -> PromptAnswer;
}

/// A prompter for headless flows: every prompt is suppressed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuppressedPrompter;

#[async_trait]
impl Prompter for SuppressedPrompter {
    async fn prompt(&self, _request: PromptRequest) -> PromptAnswer {
        PromptAnswer::Suppressed
    }
}

// ============================================================================
// Resolution
// ============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum ChoiceError {
    #[error("{0}")]
    NoOptions(String),

    #[error("Choice '{choice}' was cancelled")]
    Cancelled { choice: String },

    #[error("Choice '{choice}' needs an answer but dialogs are suppressed")]
    Suppressed { choice: String },

    #[error("'{answer}' is not an option for '{choice}'")]
    InvalidAnswer { choice: String, answer: String },
}

/// Collaborators and inputs for one resolution.
pub struct ChoiceContext<'c> {
    pub actor: Option<&'c Entity>,
    pub catalog: &'c dyn Catalog,
    pub prompter: &'c dyn Prompter,
    /// Pre-supplied answers, one per choice in order.
    pub answers: Vec<String>,
    pub strict: bool,
}

impl<'c> ChoiceContext<'c> {
    pub fn new(catalog: &'c dyn Catalog, prompter: &'c dyn Prompter) -> Self {
        Self {
            actor: None,
            catalog,
            prompter,
            answers: Vec::new(),
            strict: false,
        }
    }

    pub fn with_actor(mut self, actor: &'c Entity) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_answers<I, S>(mut self, answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.answers = answers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    fn suppressed(&self, item: &Entity) -> bool {
        item.system.suppress_dialog || self.actor.is_some_and(|a| a.system.suppress_dialog)
    }
}

/// The option picked for one choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub choice: String,
    pub option: String,
    pub payload: Option<String>,
}

/// An item with its choices folded in.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChoices {
    pub item: Entity,
    pub provided_items: Vec<ProvidedItem>,
    pub selections: Vec<Selection>,
}

/// Resolve every choice on `item`.
pub async fn resolve_choices(
    item: &Entity,
    ctx: &ChoiceContext<'_>,
) -> Result<ResolvedChoices, ChoiceError> {
    let mut chosen: Vec<(Selection, ChoiceOption)> = Vec::new();

    for (index, choice) in item.system.choices.iter().enumerate() {
        let options = available_options(choice, ctx);
        if options.is_empty() {
            let message = choice
                .no_options
                .clone()
                .unwrap_or_else(|| format!("No options are available for '{}'", choice.description));
            return Err(ChoiceError::NoOptions(message));
        }

        let option = pick(item, index, choice, options, ctx).await?;
        tracing::debug!(item = %item.name, choice = %choice.description, option = %option.name, "choice resolved");
        chosen.push((
            Selection {
                choice: choice.description.clone(),
                option: option.name.clone(),
                payload: option.payload.clone(),
            },
            option,
        ));
    }

    Ok(fold(item, chosen))
}

async fn pick(
    item: &Entity,
    index: usize,
    choice: &Choice,
    mut options: Vec<ChoiceOption>,
    ctx: &ChoiceContext<'_>,
) -> Result<ChoiceOption, ChoiceError> {
    if let Some(answer) = ctx.answers.get(index) {
        return take_option(&mut options, answer).ok_or_else(|| ChoiceError::InvalidAnswer {
            choice: choice.description.clone(),
            answer: answer.clone(),
        });
    }

    if options.len() == 1 && choice.one_option {
        return Ok(options.remove(0));
    }

    if ctx.suppressed(item) {
        return Err(ChoiceError::Suppressed {
            choice: choice.description.clone(),
        });
    }

    let request = PromptRequest {
        title: item.name.clone(),
        content: choice.description.clone(),
        options: options.iter().map(|o| o.name.clone()).collect(),
    };
    match ctx.prompter.prompt(request).await {
        PromptAnswer::Selected(answer) => {
            take_option(&mut options, &answer).ok_or_else(|| ChoiceError::InvalidAnswer {
                choice: choice.description.clone(),
                answer,
            })
        }
        PromptAnswer::Cancelled => Err(ChoiceError::Cancelled {
            choice: choice.description.clone(),
        }),
        PromptAnswer::Suppressed => Err(ChoiceError::Suppressed {
            choice: choice.description.clone(),
        }),
    }
}

fn take_option(options: &mut Vec<ChoiceOption>, answer: &str) -> Option<ChoiceOption> {
    let answer = answer.trim();
    let position = options.iter().position(|option| {
        option.name.eq_ignore_ascii_case(answer)
            || option
                .payload
                .as_deref()
                .is_some_and(|payload| payload.eq_ignore_ascii_case(answer))
    })?;
    Some(options.remove(position))
}

/// Concrete options of a choice: sentinels expanded, feats and talents gated.
fn available_options(choice: &Choice, ctx: &ChoiceContext<'_>) -> Vec<ChoiceOption> {
    let mut options = Vec::new();
    for option in &choice.options {
        match Sentinel::from_name(&option.name) {
            Some(sentinel) => {
                for payload in expand(sentinel, ctx) {
                    options.push(ChoiceOption {
                        name: payload.clone(),
                        payload: Some(payload),
                        ..option.clone()
                    });
                }
            }
            None => options.push(option.clone()),
        }
    }
    options.retain(|option| provides_allowed_items(option, ctx));
    options
}

/// Lower-cased values of an actor attribute.
fn known(actor: Option<&Entity>, key: &str) -> HashSet<String> {
    let Some(actor) = actor else {
        return HashSet::new();
    };
    let query = AttributeQuery::new(key).reduce(ReduceMode::ValuesToLowercase);
    get_inheritable_attribute(actor, &query)
        .values()
        .iter()
        .map(Value::to_string)
        .collect()
}

fn expand(sentinel: Sentinel, ctx: &ChoiceContext<'_>) -> Vec<String> {
    let actor = ctx.actor;
    let catalog = ctx.catalog;
    let weapons = || {
        let mut all = catalog.list(OptionUniverse::WeaponGroups);
        all.extend(catalog.list(OptionUniverse::ExoticWeapons));
        all
    };
    let trained = || {
        let mut trained = known(actor, "trainedSkills");
        if let Some(actor) = actor {
            trained.extend(actor.system.trained_skills.iter().map(|s| s.to_lowercase()));
        }
        trained
    };
    // Entries of `universe` inside `has` and outside `lacks`.
    let select = |universe: Vec<String>, has: Option<HashSet<String>>, lacks: HashSet<String>| {
        universe
            .into_iter()
            .filter(|entry| {
                let key = entry.to_lowercase();
                has.as_ref().map_or(true, |has| has.contains(&key)) && !lacks.contains(&key)
            })
            .collect::<Vec<_>>()
    };

    match sentinel {
        Sentinel::AvailableSkillFocus => select(
            catalog.list(OptionUniverse::Skills),
            Some(trained()),
            known(actor, "skillFocus"),
        ),
        Sentinel::AvailableSkillMastery => select(
            catalog.list(OptionUniverse::Skills),
            Some(known(actor, "skillFocus")),
            known(actor, "skillMastery"),
        ),
        Sentinel::AvailableTrainedSkills => {
            select(catalog.list(OptionUniverse::Skills), None, trained())
        }
        Sentinel::AvailableWeaponFocus => select(
            weapons(),
            Some(known(actor, "weaponProficiency")),
            known(actor, "weaponFocus"),
        ),
        Sentinel::AvailableWeaponSpecialization => select(
            weapons(),
            Some(known(actor, "weaponFocus")),
            known(actor, "weaponSpecialization"),
        ),
        Sentinel::AvailableWeaponProficiencies => select(
            catalog.list(OptionUniverse::WeaponGroups),
            None,
            known(actor, "weaponProficiency"),
        ),
        Sentinel::AvailableExoticWeaponProficiency => select(
            catalog.list(OptionUniverse::ExoticWeapons),
            None,
            known(actor, "weaponProficiency"),
        ),
    }
}

/// Feats and talents are offered only if their definition's prerequisite
/// passes for the actor.
fn provides_allowed_items(option: &ChoiceOption, ctx: &ChoiceContext<'_>) -> bool {
    let Some(actor) = ctx.actor else {
        return true;
    };
    option
        .provided_items
        .iter()
        .filter(|provided| matches!(provided.kind, EntityType::Feat | EntityType::Talent))
        .all(|provided| {
            let name = substitute(&provided.name, option.payload.as_deref());
            let definition = ctx
                .catalog
                .find(&name, &provided.kind)
                .or_else(|| ctx.catalog.find(base_name(&name), &provided.kind));
            let Some(definition) = definition else {
                tracing::debug!(item = %name, "no catalog definition, offering without a check");
                return true;
            };
            let options = PrerequisiteOptions::default()
                .with_is_add(true)
                .with_strict(ctx.strict);
            meets_prerequisites(Some(actor), definition.prerequisite(), &options).passes()
        })
}

/// `"Weapon Focus (Rifles)"` -> `"Weapon Focus"`.
fn base_name(name: &str) -> &str {
    name.split_once(" (").map_or(name, |(base, _)| base).trim()
}

fn substitute(text: &str, payload: Option<&str>) -> String {
    match payload {
        Some(payload) => text.replace(PAYLOAD_MARKER, payload),
        None => text.to_string(),
    }
}

fn substitute_change(change: &Change, payload: Option<&str>) -> Change {
    let mut change = change.clone();
    if let Value::Text(text) = &change.value {
        change.value = Value::Text(substitute(text, payload));
    }
    change
}

fn fold(item: &Entity, chosen: Vec<(Selection, ChoiceOption)>) -> ResolvedChoices {
    let mut resolved = item.clone();
    resolved.system.choices.clear();
    let mut provided_items = Vec::new();
    let mut selections = Vec::new();

    for (selection, option) in chosen {
        let payload = option.payload.as_deref();
        if let Some(payload) = payload {
            resolved.name = substitute(&resolved.name, Some(payload));
            resolved.system.payload = Some(payload.to_string());
            resolved.system.changes = resolved
                .system
                .changes
                .iter()
                .map(|change| substitute_change(change, Some(payload)))
                .collect();
        }
        resolved
            .system
            .changes
            .extend(option.changes.iter().map(|c| substitute_change(c, payload)));
        provided_items.extend(option.provided_items.iter().map(|provided| ProvidedItem {
            name: substitute(&provided.name, payload),
            kind: provided.kind.clone(),
        }));
        selections.push(selection);
    }

    ResolvedChoices {
        item: resolved,
        provided_items,
        selections,
    }
}
