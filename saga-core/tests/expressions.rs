//! Expression evaluation and change stacking through the public API.

use saga_core::testing::change_at;
use saga_core::value::{post_roll_multiply, render_terms, resolve_value};
use saga_core::{
    resolve_expression, resolve_expression_reduce, resolve_json, resolve_weight, Change, Entity,
    NoVariables, StackMode, Value,
};

fn eval(expr: &str) -> Value {
    resolve_expression(&Value::from(expr), &NoVariables)
}

// =============================================================================
// EXPRESSIONS
// =============================================================================

#[test]
fn test_arithmetic_and_functions() {
    assert_eq!(eval("MAX(1,5)+MAX(1,5)"), Value::Number(10.0));
    assert_eq!(eval("MAX(1,MAX(2,5))+3"), Value::Number(8.0));
    assert_eq!(eval("1+2-3+5-4"), Value::Number(1.0));
    assert_eq!(eval("1+2-(3+5)-4"), Value::Number(-9.0));
    assert_eq!(eval("-3*8"), Value::Number(-24.0));
}

#[test]
fn test_variables_come_from_the_actor() {
    let actor = Entity::character("Kel")
        .with_variable("@charLevel", 4)
        .with_variable("strMod", 2);

    let value = resolve_expression(&Value::from("@charLevel + @strMod"), &actor);
    assert_eq!(value, Value::Number(6.0));

    let half = resolve_expression(&Value::from("@charLevel / 2"), &actor);
    assert_eq!(half, Value::Number(2.0));
}

#[test]
fn test_dice_render_and_reparse() {
    let vars = NoVariables;
    for expr in ["2d6 + 3", "1d8x2", "3d6 - 1", "1d20 + 1d4 + 5"] {
        let rendered = render_terms(&resolve_value(&Value::from(expr), &vars));
        let again = render_terms(&resolve_value(&Value::from(rendered.as_str()), &vars));
        assert_eq!(rendered, again, "rendering of '{expr}' is not stable");
    }
}

#[test]
fn test_json_and_weights() {
    let json = serde_json::json!({"value": {"value": "2d4+1d4"}});
    assert_eq!(resolve_json(&json, &NoVariables), Value::from("3d4"));

    assert_eq!(resolve_weight("5 Ton", 1.0, 5.0), 5000.0);
    assert_eq!(resolve_weight("(40 x Cost Factor) kg", 1.0, 5.0), 200.0);
}

#[test]
fn test_post_roll_multiply_of_a_single_die() {
    assert_eq!(
        post_roll_multiply(&Value::from("2d6"), &Value::Number(3.0)),
        Value::from("2d6x3")
    );
}

#[test]
fn test_post_roll_multiply_never_multiplies() {
    assert_eq!(
        post_roll_multiply(&Value::Number(5.0), &Value::Number(2.0)),
        Value::from("5x2")
    );
    assert_eq!(
        post_roll_multiply(&Value::from("1d6 + 1d8"), &Value::Number(2.0)),
        Value::from("(1d6 + 1d8)x2")
    );

    let changes = vec![
        Change::new("damage", 5),
        Change::new("damage", 2).with_mode(StackMode::PostRollMultiply),
    ];
    let stacked = resolve_expression_reduce(&changes, &NoVariables);
    assert_ne!(stacked, Value::Number(10.0));
    assert_eq!(stacked, Value::from("5x2"));
}

// =============================================================================
// STACKING
// =============================================================================

#[test]
fn test_modes_apply_in_fixed_order_within_a_bucket() {
    let changes = vec![
        Change::new("hp", 5).with_mode(StackMode::Multiply),
        Change::new("hp", 5),
    ];
    assert_eq!(resolve_expression_reduce(&changes, &NoVariables), Value::Number(25.0));
}

#[test]
fn test_priorities_fold_lowest_first() {
    let changes = vec![
        change_at("hp", 5, StackMode::Add, -1),
        change_at("hp", 5, StackMode::Add, 2),
        Change::new("hp", 3),
    ];
    assert_eq!(resolve_expression_reduce(&changes, &NoVariables), Value::Number(13.0));
}

#[test]
fn test_override_discards_lower_buckets() {
    let changes = vec![
        change_at("speed", 6, StackMode::Add, 1),
        change_at("speed", 4, StackMode::Override, 2),
        change_at("speed", 2, StackMode::Add, 3),
    ];
    assert_eq!(resolve_expression_reduce(&changes, &NoVariables), Value::Number(6.0));
}

#[test]
fn test_upgrade_and_downgrade() {
    let upgrade = vec![Change::new("damage", 5), Change::new("damage", 7).with_mode(StackMode::Upgrade)];
    assert_eq!(resolve_expression_reduce(&upgrade, &NoVariables), Value::Number(7.0));

    let downgrade = vec![
        Change::new("damage", 5),
        Change::new("damage", 3).with_mode(StackMode::Downgrade),
    ];
    assert_eq!(resolve_expression_reduce(&downgrade, &NoVariables), Value::Number(3.0));
}

#[test]
fn test_tagged_terms_stay_distinct() {
    let changes = vec![Change::new("ammo", "ammo:100"), Change::new("ammo", "ammo2:55")];
    assert_eq!(
        resolve_expression_reduce(&changes, &NoVariables),
        Value::from("ammo:100 + ammo2:55")
    );
}
