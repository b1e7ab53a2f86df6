//! Arithmetic and dice expression evaluator.
//!
//! A purpose-built evaluator for short rules-text formulas such as
//! `MAX(1,@STRMOD)+2` or `1d8 + @HALF_LEVEL`. Parenthesised groups are
//! reduced deepest-first; then multiplicative, additive and comparison
//! operators are reduced one step at a time. Dice are never rolled, they are
//! combined through the value resolver.
//!
//! Malformed input never fails: the evaluator logs a warning and returns the
//! best-effort text.

use crate::value::{
    add_values, divide_values, format_number, lex, multiply_values, negate_value, scalar,
    subtract_values, terms_of, terms_to_value, Op, Token, Value,
};
use std::collections::{BTreeMap, HashMap};

const MAX_DEPTH: usize = 8;

// ============================================================================
// Variables
// ============================================================================

/// Lookup table for `@NAME` references. Names are passed without the `@`.
pub trait VariableSource {
    fn variable(&self, name: &str) -> Option<Value>;
}

/// A source with no variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVariables;

impl VariableSource for NoVariables {
    fn variable(&self, _name: &str) -> Option<Value> {
        None
    }
}

impl VariableSource for HashMap<String, Value> {
    fn variable(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl VariableSource for BTreeMap<String, Value> {
    fn variable(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

// ============================================================================
// Public entry points
// ============================================================================

/// Resolve an expression to a number, boolean or best-effort string.
pub fn resolve_expression(expr: &Value, vars: &dyn VariableSource) -> Value {
    resolve_at(expr, vars, 0)
}

/// Resolve a JSON value. Objects carrying a `value` field unwrap recursively.
pub fn resolve_json(json: &serde_json::Value, vars: &dyn VariableSource) -> Value {
    match json {
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(n) => Value::Number(n),
            None => Value::Text(n.to_string()),
        },
        serde_json::Value::String(text) => resolve_expression(&Value::Text(text.clone()), vars),
        serde_json::Value::Object(map) => match map.get("value") {
            Some(inner) => resolve_json(inner, vars),
            None => {
                tracing::warn!(json = %json, "object has no value to resolve");
                Value::Text(json.to_string())
            }
        },
        serde_json::Value::Null => Value::default(),
        serde_json::Value::Array(_) => {
            tracing::warn!(json = %json, "cannot resolve an array as an expression");
            Value::Text(json.to_string())
        }
    }
}

/// Resolve a weight such as `"5 Ton"` or `"(40 x Cost Factor) kg"` to kilograms,
/// multiplied by `quantity`.
pub fn resolve_weight(weight: &str, quantity: f64, cost_factor: f64) -> f64 {
    let mut text = weight.to_lowercase();
    let mut unit = 1.0;
    if text.contains("ton") {
        unit = 1000.0;
        text = text.replace("tons", "").replace("ton", "");
    }
    text = text
        .replace("kgs", "")
        .replace("kg", "")
        .replace("cost factor", &format_number(cost_factor))
        .replace(" x ", " * ");

    match resolve_expression(&Value::Text(text), &NoVariables).as_number() {
        Some(kg) => kg * unit * quantity,
        None => {
            tracing::warn!(weight, "unparseable weight");
            0.0
        }
    }
}

// ============================================================================
// Evaluation
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Item {
    Value(Value),
    Function(String),
    Tag(String),
    Op(Op),
    Open,
    Close,
    Comma,
}

#[derive(Debug)]
struct Malformed(&'static str);

fn resolve_at(expr: &Value, vars: &dyn VariableSource, depth: usize) -> Value {
    let text = match expr {
        Value::Text(text) => text.trim(),
        other => return other.clone(),
    };
    if text.is_empty() {
        return Value::default();
    }

    let tokens = lex(text);
    let items = to_items(&tokens, vars, depth);

    // Plain multi-word text is a value, not a malformed expression.
    if items.len() > 1 && items.iter().all(|i| matches!(i, Item::Value(_))) {
        return Value::Text(text.to_string());
    }

    match evaluate(items) {
        Ok(value) => value,
        Err(Malformed(reason)) => {
            tracing::warn!(expression = text, reason, "malformed expression");
            Value::Text(text.to_string())
        }
    }
}

fn to_items(tokens: &[Token], vars: &dyn VariableSource, depth: usize) -> Vec<Item> {
    let mut items = Vec::with_capacity(tokens.len());
    for (i, token) in tokens.iter().enumerate() {
        let item = match token {
            Token::Number(n) => Item::Value(Value::Number(*n)),
            Token::Die {
                count,
                sides,
                multiplier,
            } => {
                let mut die = format!("{count}d{sides}");
                if let Some(k) = multiplier {
                    die.push_str(&format!("x{k}"));
                }
                Item::Value(Value::Text(die))
            }
            Token::Variable(name) => Item::Value(resolve_variable(name, vars, depth)),
            Token::Word(word) => {
                let upper = word.to_uppercase();
                let is_call = tokens.get(i + 1) == Some(&Token::Open);
                if is_call && (upper == "MAX" || upper == "MIN") {
                    Item::Function(upper)
                } else if word.eq_ignore_ascii_case("true") {
                    Item::Value(Value::Bool(true))
                } else if word.eq_ignore_ascii_case("false") {
                    Item::Value(Value::Bool(false))
                } else {
                    Item::Value(Value::Text(word.clone()))
                }
            }
            Token::Tag(tag) => Item::Tag(tag.clone()),
            Token::Op(op) => Item::Op(*op),
            Token::Open => Item::Open,
            Token::Close => Item::Close,
            Token::Comma => Item::Comma,
        };
        items.push(item);
    }
    items
}

fn resolve_variable(name: &str, vars: &dyn VariableSource, depth: usize) -> Value {
    match vars.variable(name) {
        Some(value) if depth < MAX_DEPTH => resolve_at(&value, vars, depth + 1),
        Some(_) => {
            tracing::warn!(variable = name, "variable nesting too deep");
            Value::Text(format!("@{name}"))
        }
        None => {
            tracing::warn!(variable = name, "unresolved variable");
            Value::Text(format!("@{name}"))
        }
    }
}

/// Reduce parenthesised groups deepest-first, then the remaining flat stream.
fn evaluate(mut items: Vec<Item>) -> Result<Value, Malformed> {
    loop {
        let Some(close) = items.iter().position(|i| *i == Item::Close) else {
            break;
        };
        let Some(open) = items[..close].iter().rposition(|i| *i == Item::Open) else {
            return Err(Malformed("unbalanced ')'"));
        };

        let function = match open.checked_sub(1).map(|i| &items[i]) {
            Some(Item::Function(name)) => Some(name.clone()),
            _ => None,
        };
        let inner = &items[open + 1..close];
        let (start, result) = match function {
            Some(name) => (open - 1, call(&name, inner)),
            None => (open, reduce_flat(inner.to_vec())),
        };
        let value = result?;
        items.splice(start..=close, [Item::Value(value)]);
    }

    if items.contains(&Item::Open) {
        return Err(Malformed("unbalanced '('"));
    }
    reduce_flat(items)
}

fn call(name: &str, args: &[Item]) -> Result<Value, Malformed> {
    let mut values = Vec::new();
    for arg in args.split(|i| *i == Item::Comma) {
        values.push(reduce_flat(arg.to_vec())?);
    }

    let mut best: Option<Value> = None;
    for value in values {
        best = Some(match best {
            None => value,
            Some(current) => {
                let replace = match name {
                    "MAX" => scalar(&value) > scalar(&current),
                    _ => scalar(&value) < scalar(&current),
                };
                if replace {
                    value
                } else {
                    current
                }
            }
        });
    }
    best.ok_or(Malformed("function called without arguments"))
}

fn is_operand(item: Option<&Item>) -> bool {
    matches!(item, Some(Item::Value(_)))
}

/// Reduce a stream with no parentheses.
fn reduce_flat(mut items: Vec<Item>) -> Result<Value, Malformed> {
    if items.is_empty() {
        return Err(Malformed("empty operand"));
    }
    if items.contains(&Item::Comma) {
        return Err(Malformed("comma outside a function call"));
    }

    bind_signs(&mut items);
    bind_tags(&mut items)?;

    for ops in [
        &[Op::Mul, Op::Div][..],
        &[Op::Add, Op::Sub][..],
        &[Op::Gt, Op::Lt, Op::Ge, Op::Le, Op::Eq][..],
    ] {
        while let Some(i) = items
            .iter()
            .position(|item| matches!(item, Item::Op(op) if ops.contains(op)))
        {
            if i == 0 || !is_operand(items.get(i - 1)) || !is_operand(items.get(i + 1)) {
                return Err(Malformed("operator without operands"));
            }
            let (Item::Value(left), Item::Op(op), Item::Value(right)) =
                (&items[i - 1], &items[i], &items[i + 1])
            else {
                return Err(Malformed("operator without operands"));
            };
            let value = apply(*op, left, right);
            items.splice(i - 1..=i + 1, [Item::Value(value)]);
        }
    }

    match items.as_slice() {
        [Item::Value(value)] => Ok(value.clone()),
        _ => Err(Malformed("operands without an operator")),
    }
}

/// A `-` at the start or directly after another operator is a sign.
fn bind_signs(items: &mut Vec<Item>) {
    let mut i = 0;
    while i < items.len() {
        let sign_position = i == 0 || matches!(items[i - 1], Item::Op(_) | Item::Tag(_));
        if sign_position && is_operand(items.get(i + 1)) {
            match (&items[i], &items[i + 1]) {
                (Item::Op(Op::Sub), Item::Value(value)) => {
                    let negated = negate_value(value);
                    items.splice(i..=i + 1, [Item::Value(negated)]);
                }
                (Item::Op(Op::Add), Item::Value(_)) => {
                    items.remove(i);
                }
                _ => {}
            }
        }
        i += 1;
    }
}

/// Attach `tag:` prefixes to the operand that follows them.
fn bind_tags(items: &mut Vec<Item>) -> Result<(), Malformed> {
    while let Some(i) = items.iter().position(|item| matches!(item, Item::Tag(_))) {
        let (Item::Tag(tag), Some(Item::Value(value))) = (&items[i], items.get(i + 1)) else {
            return Err(Malformed("tag without a value"));
        };
        let tagged: Vec<_> = terms_of(value)
            .into_iter()
            .map(|term| term.tagged(Some(tag.clone())))
            .collect();
        let value = terms_to_value(&tagged);
        items.splice(i..=i + 1, [Item::Value(value)]);
    }
    Ok(())
}

fn apply(op: Op, left: &Value, right: &Value) -> Value {
    match op {
        Op::Mul => multiply_values(left, right),
        Op::Div => divide_values(left, right),
        Op::Add => add_values(left, right),
        Op::Sub => subtract_values(left, right),
        Op::Gt | Op::Lt | Op::Ge | Op::Le | Op::Eq => Value::Bool(compare(op, left, right)),
    }
}

fn compare(op: Op, left: &Value, right: &Value) -> bool {
    let (x, y) = match (left.as_number(), right.as_number()) {
        (Some(x), Some(y)) => (x, y),
        _ if op == Op::Eq => return left.to_string() == right.to_string(),
        _ => (scalar(left), scalar(right)),
    };
    match op {
        Op::Gt => x > y,
        Op::Lt => x < y,
        Op::Ge => x >= y,
        Op::Le => x <= y,
        _ => x == y,
    }
}
