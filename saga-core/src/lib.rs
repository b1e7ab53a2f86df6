//! Rules engine for Saga-edition character sheets.
//!
//! This crate provides:
//! - An expression evaluator for the dice/tag mini-language
//! - Change stacking and attribute aggregation over an actor's items
//! - The inheritable-item fixed point
//! - Prerequisite evaluation with display-ready success and failure lists
//! - Choice resolution for parametric items
//!
//! # Quick Start
//!
//! ```ignore
//! use saga_core::{get_inheritable_attribute, load_snapshot, AttributeQuery, ReduceMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let actor = load_snapshot("kel.json").await?;
//!
//!     let query = AttributeQuery::new("baseAttackBonus").reduce(ReduceMode::Sum);
//!     println!("BAB: {}", get_inheritable_attribute(&actor, &query));
//!
//!     Ok(())
//! }
//! ```

pub mod attribute;
pub mod catalog;
pub mod change;
pub mod choice;
pub mod config;
pub mod entity;
pub mod expression;
pub mod inheritance;
pub mod pass;
pub mod prerequisite;
pub mod snapshot;
pub mod testing;
pub mod value;

// Primary public API
pub use attribute::{
    get_inheritable_attribute, reduce_array, AttributeFlags, AttributeQuery, AttributeValue,
    ReduceMode,
};
pub use catalog::{Catalog, OptionUniverse, StandardCatalog};
pub use change::{Change, SourceRef, StackMode};
pub use choice::{
    resolve_choices, Choice, ChoiceContext, ChoiceError, ChoiceOption, PromptAnswer,
    PromptRequest, Prompter, ProvidedItem, ResolvedChoices,
};
pub use config::RulesConfig;
pub use entity::{Entity, EntityId, EntityType, System};
pub use expression::{resolve_expression, resolve_json, resolve_weight, NoVariables, VariableSource};
pub use inheritance::inheritable_items;
pub use prerequisite::{
    meets_prerequisites, FailureEntry, Prerequisite, PrerequisiteOptions, PrerequisiteResult,
    RequirementKind, SuccessEntry,
};
pub use snapshot::{load_snapshot, parse_snapshot, save_snapshot, SnapshotError};
pub use testing::MockPrompt;
pub use value::{resolve_expression_reduce, resolve_value, Value};
