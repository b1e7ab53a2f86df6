//! Prerequisite tree nodes.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors in a prerequisite tree's shape.
#[derive(Debug, Error, PartialEq)]
pub enum NodeError {
    #[error("{kind} prerequisite cannot have children")]
    LeafWithChildren { kind: String },

    #[error("{kind} prerequisite is missing its requirement")]
    MissingRequirement { kind: String },
}

/// Typed leaf predicates. Unknown host types are kept as `Unsupported`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequirementKind {
    Age,
    Size,
    CharacterLevel,
    BaseAttackBonus,
    DarkSideScore,
    Feat,
    Talent,
    TalentTree,
    Class,
    Trait,
    Species,
    ForcePower,
    ForceTechnique,
    ForceSecret,
    Item,
    TrainedSkill,
    Proficiency,
    Attribute,
    Equipped,
    Gender,
    Special,
    Unsupported(String),
}

impl RequirementKind {
    pub fn from_label(label: &str) -> RequirementKind {
        match normalize_label(label).as_str() {
            "AGE" => RequirementKind::Age,
            "SIZE" => RequirementKind::Size,
            "CHARACTER LEVEL" => RequirementKind::CharacterLevel,
            "BASE ATTACK BONUS" => RequirementKind::BaseAttackBonus,
            "DARK SIDE SCORE" => RequirementKind::DarkSideScore,
            "FEAT" => RequirementKind::Feat,
            "TALENT" => RequirementKind::Talent,
            "TALENT TREE" => RequirementKind::TalentTree,
            "CLASS" => RequirementKind::Class,
            "TRAIT" => RequirementKind::Trait,
            "SPECIES" => RequirementKind::Species,
            "FORCE POWER" => RequirementKind::ForcePower,
            "FORCE TECHNIQUE" => RequirementKind::ForceTechnique,
            "FORCE SECRET" => RequirementKind::ForceSecret,
            "ITEM" => RequirementKind::Item,
            "TRAINED SKILL" => RequirementKind::TrainedSkill,
            "PROFICIENCY" => RequirementKind::Proficiency,
            "ATTRIBUTE" => RequirementKind::Attribute,
            "EQUIPPED" => RequirementKind::Equipped,
            "GENDER" => RequirementKind::Gender,
            "SPECIAL" => RequirementKind::Special,
            _ => RequirementKind::Unsupported(label.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            RequirementKind::Age => "AGE",
            RequirementKind::Size => "SIZE",
            RequirementKind::CharacterLevel => "CHARACTER LEVEL",
            RequirementKind::BaseAttackBonus => "BASE ATTACK BONUS",
            RequirementKind::DarkSideScore => "DARK SIDE SCORE",
            RequirementKind::Feat => "FEAT",
            RequirementKind::Talent => "TALENT",
            RequirementKind::TalentTree => "TALENT TREE",
            RequirementKind::Class => "CLASS",
            RequirementKind::Trait => "TRAIT",
            RequirementKind::Species => "SPECIES",
            RequirementKind::ForcePower => "FORCE POWER",
            RequirementKind::ForceTechnique => "FORCE TECHNIQUE",
            RequirementKind::ForceSecret => "FORCE SECRET",
            RequirementKind::Item => "ITEM",
            RequirementKind::TrainedSkill => "TRAINED SKILL",
            RequirementKind::Proficiency => "PROFICIENCY",
            RequirementKind::Attribute => "ATTRIBUTE",
            RequirementKind::Equipped => "EQUIPPED",
            RequirementKind::Gender => "GENDER",
            RequirementKind::Special => "SPECIAL",
            RequirementKind::Unsupported(label) => label,
        }
    }

    /// Human-readable name used in generated messages.
    pub fn title(&self) -> String {
        self.label()
            .split(' ')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<String>>()
            .join(" ")
    }
}

fn normalize_label(label: &str) -> String {
    label
        .trim()
        .to_uppercase()
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// A typed leaf check.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    pub kind: RequirementKind,
    pub requirement: String,
    pub text: Option<String>,
}

/// A prerequisite tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPrerequisite", into = "RawPrerequisite")]
pub enum Prerequisite {
    And {
        text: Option<String>,
        children: Vec<Prerequisite>,
    },
    Or {
        text: Option<String>,
        count: usize,
        children: Vec<Prerequisite>,
    },
    Not {
        text: Option<String>,
        children: Vec<Prerequisite>,
    },
    Leaf(Requirement),
}

impl Prerequisite {
    pub fn leaf(kind: RequirementKind, requirement: impl Into<String>) -> Self {
        Prerequisite::Leaf(Requirement {
            kind,
            requirement: requirement.into(),
            text: None,
        })
    }

    pub fn feat(name: impl Into<String>) -> Self {
        Self::leaf(RequirementKind::Feat, name)
    }

    pub fn talent(name: impl Into<String>) -> Self {
        Self::leaf(RequirementKind::Talent, name)
    }

    pub fn class(name: impl Into<String>) -> Self {
        Self::leaf(RequirementKind::Class, name)
    }

    pub fn attribute(requirement: impl Into<String>) -> Self {
        Self::leaf(RequirementKind::Attribute, requirement)
    }

    pub fn all(children: Vec<Prerequisite>) -> Self {
        Prerequisite::And {
            text: None,
            children,
        }
    }

    pub fn any(count: usize, children: Vec<Prerequisite>) -> Self {
        Prerequisite::Or {
            text: None,
            count,
            children,
        }
    }

    pub fn not(child: Prerequisite) -> Self {
        Prerequisite::Not {
            text: None,
            children: vec![child],
        }
    }

    /// Set the user-facing message of this node.
    pub fn with_text(mut self, message: impl Into<String>) -> Self {
        let message = Some(message.into());
        match &mut self {
            Prerequisite::And { text, .. }
            | Prerequisite::Or { text, .. }
            | Prerequisite::Not { text, .. } => *text = message,
            Prerequisite::Leaf(requirement) => requirement.text = message,
        }
        self
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Prerequisite::And { text, .. }
            | Prerequisite::Or { text, .. }
            | Prerequisite::Not { text, .. } => text.as_deref(),
            Prerequisite::Leaf(requirement) => requirement.text.as_deref(),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Prerequisite::And { .. } => "AND",
            Prerequisite::Or { .. } => "OR",
            Prerequisite::Not { .. } => "NOT",
            Prerequisite::Leaf(requirement) => requirement.kind.label(),
        }
    }

    /// The node's message: its text, or one generated from its contents.
    pub fn describe(&self) -> String {
        if let Some(text) = self.text() {
            return text.to_string();
        }
        match self {
            Prerequisite::And { children, .. } => {
                format!("all of: {}", describe_children(children))
            }
            Prerequisite::Or {
                count, children, ..
            } => format!("at least {count} of: {}", describe_children(children)),
            Prerequisite::Not { children, .. } => format!("not: {}", describe_children(children)),
            Prerequisite::Leaf(requirement) => {
                format!("{}: {}", requirement.kind.title(), requirement.requirement)
            }
        }
    }
}

fn describe_children(children: &[Prerequisite]) -> String {
    children
        .iter()
        .map(Prerequisite::describe)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Prerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

// ============================================================================
// Wire form
// ============================================================================

/// The host's JSON shape: a `type` discriminator plus optional fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPrerequisite {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Prerequisite>,
}

impl TryFrom<RawPrerequisite> for Prerequisite {
    type Error = NodeError;

    fn try_from(raw: RawPrerequisite) -> Result<Self, Self::Error> {
        let label = raw.kind.as_deref().map(normalize_label);
        match label.as_deref() {
            // An untyped node is a plain group; `{}` is the empty tree.
            None | Some("AND") => Ok(Prerequisite::And {
                text: raw.text,
                children: raw.children,
            }),
            Some("OR") => Ok(Prerequisite::Or {
                text: raw.text,
                count: raw.count.unwrap_or(1),
                children: raw.children,
            }),
            Some("NOT") => Ok(Prerequisite::Not {
                text: raw.text,
                children: raw.children,
            }),
            Some(_) => {
                let kind_label = raw.kind.unwrap_or_default();
                if !raw.children.is_empty() {
                    return Err(NodeError::LeafWithChildren { kind: kind_label });
                }
                let kind = RequirementKind::from_label(&kind_label);
                let requirement = match raw.requirement {
                    Some(value) => value.to_string(),
                    None if kind == RequirementKind::Special => String::new(),
                    None => return Err(NodeError::MissingRequirement { kind: kind_label }),
                };
                Ok(Prerequisite::Leaf(Requirement {
                    kind,
                    requirement,
                    text: raw.text,
                }))
            }
        }
    }
}

impl From<Prerequisite> for RawPrerequisite {
    fn from(node: Prerequisite) -> Self {
        match node {
            Prerequisite::And { text, children } => RawPrerequisite {
                kind: Some("AND".to_string()),
                text,
                children,
                ..Default::default()
            },
            Prerequisite::Or {
                text,
                count,
                children,
            } => RawPrerequisite {
                kind: Some("OR".to_string()),
                text,
                count: Some(count),
                children,
                ..Default::default()
            },
            Prerequisite::Not { text, children } => RawPrerequisite {
                kind: Some("NOT".to_string()),
                text,
                children,
                ..Default::default()
            },
            Prerequisite::Leaf(requirement) => RawPrerequisite {
                kind: Some(requirement.kind.label().to_string()),
                requirement: Some(Value::Text(requirement.requirement)),
                text: requirement.text,
                ..Default::default()
            },
        }
    }
}
