//! Priority and mode stacking of change values.

use super::{
    add_values, downgrade_values, multiply_values, normalize, post_roll_multiply, upgrade_values,
    Value,
};
use crate::change::{Change, StackMode};
use crate::expression::VariableSource;
use std::collections::BTreeMap;

/// Reduce a list of changes to one value.
///
/// Changes are bucketed by priority (ascending). Inside a bucket the modes are
/// applied in [`StackMode::ORDER`] regardless of input order. An empty list
/// reduces to `0`.
pub fn resolve_expression_reduce(changes: &[Change], vars: &dyn VariableSource) -> Value {
    let mut buckets: BTreeMap<i32, Vec<&Change>> = BTreeMap::new();
    for change in changes {
        buckets.entry(change.priority).or_default().push(change);
    }

    let mut accumulator: Option<Value> = None;
    for bucket in buckets.values() {
        for mode in StackMode::ORDER {
            for change in bucket.iter().filter(|c| c.mode == mode) {
                let value = normalize(&change.value, vars);
                if value.is_empty() {
                    continue;
                }
                accumulator = apply(mode, accumulator, value);
            }
        }
    }

    accumulator.unwrap_or(Value::Number(0.0))
}

fn apply(mode: StackMode, accumulator: Option<Value>, value: Value) -> Option<Value> {
    match (mode, accumulator) {
        (StackMode::Override, _) => Some(value),
        (StackMode::Add | StackMode::Upgrade | StackMode::Downgrade, None) => Some(value),
        (StackMode::Multiply | StackMode::PostRollMultiply, None) => {
            tracing::debug!(?mode, factor = %value, "no accumulator to multiply, change ignored");
            None
        }
        (StackMode::Add, Some(acc)) => Some(add_values(&acc, &value)),
        (StackMode::Upgrade, Some(acc)) => Some(upgrade_values(&acc, &value)),
        (StackMode::Downgrade, Some(acc)) => Some(downgrade_values(&acc, &value)),
        (StackMode::Multiply, Some(acc)) => Some(multiply_values(&acc, &value)),
        (StackMode::PostRollMultiply, Some(acc)) => Some(post_roll_multiply(&acc, &value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::NoVariables;

    fn reduce(changes: Vec<Change>) -> Value {
        resolve_expression_reduce(&changes, &NoVariables)
    }

    #[test]
    fn test_add_then_multiply() {
        let changes = vec![
            Change::new("k", 5),
            Change::new("k", 5).with_mode(StackMode::Multiply),
        ];
        assert_eq!(reduce(changes), Value::Number(25.0));
    }

    #[test]
    fn test_mode_order_ignores_input_order() {
        let changes = vec![
            Change::new("k", 5).with_mode(StackMode::Multiply),
            Change::new("k", 5),
        ];
        assert_eq!(reduce(changes), Value::Number(25.0));
    }

    #[test]
    fn test_upgrade_and_downgrade() {
        let up = vec![
            Change::new("k", 5),
            Change::new("k", 7).with_mode(StackMode::Upgrade),
        ];
        assert_eq!(reduce(up), Value::Number(7.0));

        let down = vec![
            Change::new("k", 5),
            Change::new("k", 3).with_mode(StackMode::Downgrade),
        ];
        assert_eq!(reduce(down), Value::Number(3.0));
    }

    #[test]
    fn test_priority_buckets_ascend() {
        let changes = vec![
            Change::new("k", 5).with_priority(-1),
            Change::new("k", 5).with_priority(2),
            Change::new("k", 3),
        ];
        assert_eq!(reduce(changes), Value::Number(13.0));
    }

    #[test]
    fn test_override_replaces_earlier_buckets_only() {
        let changes = vec![
            Change::new("k", 10),
            Change::new("k", 2).with_mode(StackMode::Override),
            Change::new("k", 1).with_priority(5),
        ];
        assert_eq!(reduce(changes), Value::Number(3.0));
    }

    #[test]
    fn test_distinct_tags_stay_separate() {
        let changes = vec![Change::new("k", "ammo:100"), Change::new("k", "ammo2:55")];
        assert_eq!(reduce(changes), Value::from("ammo:100 + ammo2:55"));
    }

    #[test]
    fn test_dice_stacking() {
        let changes = vec![
            Change::new("damage", "2d6"),
            Change::new("damage", "1d6 + 2"),
            Change::new("damage", 2).with_mode(StackMode::PostRollMultiply),
        ];
        assert_eq!(reduce(changes), Value::from("(3d6 + 2)x2"));
    }

    #[test]
    fn test_post_roll_multiply_marks_numbers() {
        let changes = vec![
            Change::new("damage", 5),
            Change::new("damage", 2).with_mode(StackMode::PostRollMultiply),
        ];
        assert_eq!(reduce(changes), Value::from("5x2"));
    }

    #[test]
    fn test_post_roll_multiply_folds_single_die() {
        let changes = vec![
            Change::new("damage", "3d8"),
            Change::new("damage", 2).with_mode(StackMode::PostRollMultiply),
            Change::new("damage", 3).with_mode(StackMode::PostRollMultiply),
        ];
        assert_eq!(reduce(changes), Value::from("3d8x6"));
    }

    #[test]
    fn test_post_roll_multiply_runs_after_multiply() {
        let changes = vec![
            Change::new("damage", 2).with_mode(StackMode::PostRollMultiply),
            Change::new("damage", 3).with_mode(StackMode::Multiply),
            Change::new("damage", 4),
        ];
        assert_eq!(reduce(changes), Value::from("12x2"));
    }

    #[test]
    fn test_empty_reduction_is_zero() {
        assert_eq!(reduce(vec![]), Value::Number(0.0));
    }

    #[test]
    fn test_multiply_without_accumulator_is_ignored() {
        let only_multiply = vec![Change::new("k", 2).with_mode(StackMode::Multiply)];
        assert_eq!(reduce(only_multiply), Value::Number(0.0));

        let only_post_roll = vec![Change::new("k", 2).with_mode(StackMode::PostRollMultiply)];
        assert_eq!(reduce(only_post_roll), Value::Number(0.0));

        // A later bucket still starts from nothing.
        let later_add = vec![
            Change::new("k", 2).with_mode(StackMode::Multiply),
            Change::new("k", 7).with_priority(3),
        ];
        assert_eq!(reduce(later_add), Value::Number(7.0));
    }
}
