//! Prerequisite evaluation.
//!
//! A prerequisite tree is a boolean combinator tree (AND, OR with a count,
//! NOT) over typed leaf checks. Evaluation is a plain recursion that produces
//! success and failure lists for display. Leaves consult the attribute
//! aggregator and the actor's inheritable items, and item leaves (FEAT, CLASS,
//! TALENT, ...) also require the referenced item's own prerequisite to pass.
//!
//! Outcomes are memoised in the [`Pass`] of the top-level call. Item
//! prerequisite cycles fail closed.

mod leaf;
pub mod node;
pub mod result;

pub use node::{NodeError, Prerequisite, RawPrerequisite, Requirement, RequirementKind};
pub(crate) use result::Outcome;
pub use result::{FailureEntry, PrerequisiteError, PrerequisiteResult, SuccessEntry};

use crate::entity::Entity;
use crate::pass::{override_key, Pass};

/// Flags controlling a prerequisite check.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrerequisiteOptions<'o> {
    /// The check gates adding an item; honours the target's `ignorePrerequisites`.
    pub is_add: bool,
    pub skip_prerequisite: bool,
    /// Bulk import: everything passes.
    pub is_upload: bool,
    /// Unsupported leaf types fail instead of being skipped.
    pub strict: bool,
    /// Items to treat as the target's inheritable set.
    pub embedded_item_override: Option<&'o [&'o Entity]>,
}

impl<'o> PrerequisiteOptions<'o> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_is_add(mut self, is_add: bool) -> Self {
        self.is_add = is_add;
        self
    }

    pub fn with_skip_prerequisite(mut self, skip: bool) -> Self {
        self.skip_prerequisite = skip;
        self
    }

    pub fn with_is_upload(mut self, is_upload: bool) -> Self {
        self.is_upload = is_upload;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_embedded_item_override(mut self, items: &'o [&'o Entity]) -> Self {
        self.embedded_item_override = Some(items);
        self
    }

    fn short_circuits(&self, target: &Entity) -> bool {
        (self.is_add && target.system.ignore_prerequisites) || self.skip_prerequisite || self.is_upload
    }
}

/// Check `tree` against `target`.
///
/// An absent tree always passes; an absent target always fails.
pub fn meets_prerequisites(
    target: Option<&Entity>,
    tree: Option<&Prerequisite>,
    options: &PrerequisiteOptions<'_>,
) -> PrerequisiteResult {
    let Some(tree) = tree else {
        return PrerequisiteResult::pass();
    };
    let Some(target) = target else {
        return PrerequisiteResult::fail("There is no target to check prerequisites against");
    };
    let mut pass = Pass::new();
    meets_prerequisites_in(&mut pass, target, Some(tree), options)
}

/// Check `tree` inside an existing pass.
pub(crate) fn meets_prerequisites_in<'a>(
    pass: &mut Pass<'a>,
    target: &'a Entity,
    tree: Option<&Prerequisite>,
    options: &PrerequisiteOptions<'_>,
) -> PrerequisiteResult {
    let Some(tree) = tree else {
        return PrerequisiteResult::pass();
    };
    if options.short_circuits(target) {
        return PrerequisiteResult::pass();
    }
    let outcome = Evaluation::new(pass, target, options).node(tree);
    PrerequisiteResult::from_outcome(outcome)
}

// ============================================================================
// Tree evaluation
// ============================================================================

/// One walk over a tree for one target.
struct Evaluation<'p, 'a, 'o> {
    pass: &'p mut Pass<'a>,
    target: &'a Entity,
    options: &'p PrerequisiteOptions<'o>,
    available: Option<Vec<&'p Entity>>,
}

impl<'p, 'a: 'p, 'o: 'p> Evaluation<'p, 'a, 'o> {
    fn new(pass: &'p mut Pass<'a>, target: &'a Entity, options: &'p PrerequisiteOptions<'o>) -> Self {
        Self {
            pass,
            target,
            options,
            available: None,
        }
    }

    fn node(&mut self, node: &Prerequisite) -> Outcome {
        match node {
            Prerequisite::And { text, children } => self.all(text.as_deref(), children),
            Prerequisite::Or {
                text,
                count,
                children,
            } => self.any(text.as_deref(), *count, children),
            Prerequisite::Not { text, children } => self.not(node, text.as_deref(), children),
            Prerequisite::Leaf(requirement) => self.leaf(node, requirement),
        }
    }

    fn all(&mut self, text: Option<&str>, children: &[Prerequisite]) -> Outcome {
        let mut outcome = Outcome::default();
        for child in children {
            let child = self.node(child);
            outcome.successes.extend(child.successes);
            outcome.failures.extend(child.failures);
        }

        let failing = outcome.failures.iter().filter(|f| f.fail).count();
        if failing > 1 {
            let failures = std::mem::take(&mut outcome.failures);
            outcome.failures = vec![FailureEntry::wrapping(text.unwrap_or("all of:"), failures)];
        } else if failing == 1 {
            if let Some(text) = text {
                let failures = std::mem::take(&mut outcome.failures);
                outcome.failures = vec![FailureEntry::wrapping(text, failures)];
            }
        }
        outcome
    }

    fn any(&mut self, text: Option<&str>, required: usize, children: &[Prerequisite]) -> Outcome {
        let mut outcome = Outcome::default();
        let mut unmet = Vec::new();
        let mut total = 0;

        for child in children {
            let child = self.node(child);
            if child.fails() {
                unmet.extend(child.failures);
            } else {
                total += child.success_count();
                outcome.successes.extend(child.successes);
                outcome.failures.extend(child.failures);
            }
        }

        if total < required {
            let message = text
                .map(str::to_string)
                .unwrap_or_else(|| format!("at least {required} of:"));
            outcome.failures.push(FailureEntry {
                fail: true,
                message,
                children: unmet,
            });
        }
        outcome
    }

    fn not(&mut self, node: &Prerequisite, text: Option<&str>, children: &[Prerequisite]) -> Outcome {
        let inner = match children {
            [single] => self.node(single),
            many => self.all(None, many),
        };

        if inner.fails() {
            return Outcome::success(node, 1);
        }

        // The child passed: its successes are what makes this node fail.
        let relabelled: Vec<FailureEntry> = inner
            .successes
            .iter()
            .map(|s| FailureEntry::failing(format!("not {}", s.prereq.describe())))
            .collect();
        let failure = match (text, relabelled.is_empty()) {
            (Some(text), _) => FailureEntry {
                fail: true,
                message: text.to_string(),
                children: relabelled,
            },
            (None, true) => FailureEntry::failing(node.describe()),
            (None, false) if relabelled.len() == 1 => relabelled[0].clone(),
            (None, false) => FailureEntry::wrapping("none of:", relabelled),
        };
        Outcome {
            successes: Vec::new(),
            failures: vec![failure],
        }
    }

    fn leaf(&mut self, node: &Prerequisite, requirement: &Requirement) -> Outcome {
        let key = (
            self.target.id,
            requirement.kind.label().to_string(),
            requirement.requirement.clone(),
            node.text().map(str::to_string),
            override_key(self.options.embedded_item_override),
            self.options.strict,
        );
        if let Some(cached) = self.pass.leaf_outcome(&key) {
            return cached.clone();
        }

        let outcome = match self.check(node, requirement) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(error = %err, "prerequisite check failed, treating as unmet");
                Outcome::failure(node.describe())
            }
        };
        self.pass.store_leaf_outcome(key, outcome.clone());
        outcome
    }

    /// The target's inheritable items, or the override when one is given.
    fn available(&mut self) -> Vec<&'p Entity> {
        if let Some(items) = &self.available {
            return items.clone();
        }
        let items: Vec<&'p Entity> = match self.options.embedded_item_override {
            Some(items) => items.to_vec(),
            None if self.target.is_actor() => {
                crate::inheritance::inheritable_items_in(self.pass, self.target)
            }
            None => self.target.items.iter().collect(),
        };
        self.available = Some(items.clone());
        items
    }

    /// Whether `item`'s own prerequisite passes for the target. Cycles fail closed.
    fn item_passes(&mut self, item: &Entity) -> bool {
        let Some(prerequisite) = item.prerequisite() else {
            return true;
        };
        let key = (
            self.target.id,
            item.id,
            override_key(self.options.embedded_item_override),
        );
        if let Some(passes) = self.pass.item_outcome(&key) {
            return passes;
        }
        if !self.pass.begin_item(key.clone()) {
            tracing::warn!(item = %item.name, "prerequisite cycle detected, treating as unmet");
            return false;
        }

        let nested = PrerequisiteOptions {
            is_add: false,
            skip_prerequisite: false,
            is_upload: false,
            ..*self.options
        };
        let passes = !Evaluation::new(self.pass, self.target, &nested)
            .node(prerequisite)
            .fails();

        self.pass.end_item(&key);
        self.pass.store_item_outcome(key, passes);
        passes
    }
}
