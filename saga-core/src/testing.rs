//! Testing utilities for the rules engine.
//!
//! This module provides tools for integration testing:
//! - `MockPrompt` for deterministic choice resolution without a human
//! - Fixture builders for typical actors
//! - Assertion helpers for prerequisite and attribute results

use crate::attribute::{get_inheritable_attribute, AttributeQuery};
use crate::change::{Change, StackMode};
use crate::choice::{PromptAnswer, PromptRequest, Prompter};
use crate::entity::{Entity, EntityType};
use crate::prerequisite::{Prerequisite, PrerequisiteResult};
use crate::value::Value;
use async_trait::async_trait;
use std::sync::Mutex;

/// A prompter that returns scripted answers in order and records every
/// request. Once the script runs out every prompt is cancelled.
#[derive(Debug, Default)]
pub struct MockPrompt {
    answers: Mutex<Vec<PromptAnswer>>,
    requests: Mutex<Vec<PromptRequest>>,
}

impl MockPrompt {
    pub fn new(answers: Vec<PromptAnswer>) -> Self {
        let mut answers = answers;
        answers.reverse();
        Self {
            answers: Mutex::new(answers),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Script a single selection.
    pub fn selecting(answer: impl Into<String>) -> Self {
        Self::new(vec![PromptAnswer::Selected(answer.into())])
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<PromptRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Prompter for MockPrompt {
    async fn prompt(&self, request: PromptRequest) -> PromptAnswer {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        self.answers
            .lock()
            .ok()
            .and_then(|mut answers| answers.pop())
            .unwrap_or(PromptAnswer::Cancelled)
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// A level-one soldier: human, Soldier class, rifle and pistol proficiency,
/// trained in Endurance and Perception.
pub fn sample_soldier(name: impl Into<String>) -> Entity {
    Entity::character(name)
        .with_age(27.0)
        .with_gender("Female")
        .with_trained_skill("Endurance")
        .with_trained_skill("Perception")
        .with_item(
            Entity::item(EntityType::Species, "Human")
                .with_change(Change::new("size", "Medium"))
                .with_change(Change::new("speed", 6)),
        )
        .with_item(
            Entity::item(EntityType::Class, "Soldier")
                .with_change(Change::new("baseAttackBonus", 1))
                .with_change(Change::new("hitPoints", "3d8"))
                .with_change(Change::new("weaponProficiency", "Pistols"))
                .with_change(Change::new("weaponProficiency", "Rifles"))
                .with_change(Change::new("armorProficiency", "Light"))
                .with_change(Change::new("defense", 1)),
        )
        .with_item(
            Entity::item(EntityType::Feat, "Armor Proficiency (Medium)")
                .with_prerequisite(Prerequisite::feat("Armor Proficiency (Light)"))
                .with_change(Change::new("armorProficiency", "Medium")),
        )
        .with_item(
            Entity::item(EntityType::Feat, "Armor Proficiency (Light)")
                .with_change(Change::new("armorProficiency", "Light")),
        )
        .with_item(
            Entity::item(EntityType::Weapon, "Blaster Rifle")
                .with_change(Change::new("damage", "3d8"))
                .equipped(),
        )
}

/// A feat granting `key` with a single ADD change.
pub fn feat_with(name: impl Into<String>, key: &str, value: impl Into<Value>) -> Entity {
    Entity::item(EntityType::Feat, name).with_change(Change::new(key, value))
}

/// A bare `ADD` change with a priority.
pub fn change_at(key: &str, value: impl Into<Value>, mode: StackMode, priority: i32) -> Change {
    Change::new(key, value).with_mode(mode).with_priority(priority)
}

// ============================================================================
// Assertion helpers
// ============================================================================

#[track_caller]
pub fn assert_passes(result: &PrerequisiteResult) {
    assert!(
        result.passes(),
        "Expected prerequisites to pass, failures: {:?}",
        result.failure_messages()
    );
}

#[track_caller]
pub fn assert_fails_with(result: &PrerequisiteResult, message: &str) {
    assert!(result.does_fail, "Expected prerequisites to fail");
    assert!(
        result
            .failure_messages()
            .iter()
            .any(|m| m.trim() == message),
        "Expected failure '{}', got {:?}",
        message,
        result.failure_messages()
    );
}

#[track_caller]
pub fn assert_attribute(actor: &Entity, query: &AttributeQuery<'_>, expected: impl Into<Value>) {
    let expected = expected.into();
    let actual = get_inheritable_attribute(actor, query);
    assert_eq!(
        actual.as_value(),
        Some(&expected),
        "Attribute mismatch, got {actual}"
    );
}

#[track_caller]
pub fn assert_inherits(items: &[&Entity], name: &str) {
    assert!(
        items.iter().any(|item| item.name == name),
        "Expected '{}' to be inheritable, got {:?}",
        name,
        items.iter().map(|item| item.name.as_str()).collect::<Vec<_>>()
    );
}

#[track_caller]
pub fn assert_not_inherits(items: &[&Entity], name: &str) {
    assert!(
        items.iter().all(|item| item.name != name),
        "Expected '{}' not to be inheritable",
        name
    );
}
