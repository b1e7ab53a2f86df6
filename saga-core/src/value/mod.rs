//! Value resolution: turning change values into term groups and combining them.
//!
//! A value is a number, a boolean or a string in the tagged/dice notation
//! (`2d6 + 3`, `ammo:100`, `@STRMOD`). Values are resolved into [`Term`]s,
//! combined by grouping key `(tag, sides, multiplier)` and rendered back to the
//! same notation, so dice stay dice and distinct tags never merge.

pub mod stack;
pub mod term;

pub use stack::resolve_expression_reduce;
pub use term::{lex, Amount, Op, Term, Token};

use crate::expression::{resolve_expression, VariableSource};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How deep `@VARIABLE` values may refer to other variables.
const MAX_VARIABLE_DEPTH: usize = 8;

// ============================================================================
// Value
// ============================================================================

/// A resolved scalar as it appears in snapshots and results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Default for Value {
    fn default() -> Self {
        Value::Text(String::new())
    }
}

impl Value {
    /// The numeric reading of this value, if it has one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(_) => None,
            Value::Text(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }

    pub fn as_text(&self) -> String {
        self.to_string()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Text(text) if text.trim().is_empty())
    }

    /// Boolean reading used by the AND/OR reductions.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Text(text) => {
                let text = text.trim();
                if text.eq_ignore_ascii_case("true") {
                    true
                } else if text.eq_ignore_ascii_case("false") {
                    false
                } else if let Some(n) = self.as_number() {
                    n != 0.0
                } else {
                    !text.is_empty()
                }
            }
        }
    }

    pub fn to_lowercase(&self) -> Value {
        match self {
            Value::Text(text) => Value::Text(text.to_lowercase()),
            other => other.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Text(text) => write!(f, "{text}"),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

/// Render a number the way the sheet shows it: integral values have no fraction.
pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        // Covers -0 as well.
        "0".to_string()
    } else {
        n.to_string()
    }
}

// ============================================================================
// Term resolution
// ============================================================================

/// Resolve a value into its terms, expanding `@VARIABLES` through `vars`.
///
/// Strings containing `*`, `/`, parentheses or comparisons are first run
/// through the expression evaluator.
pub fn resolve_value(value: &Value, vars: &dyn VariableSource) -> Vec<Term> {
    resolve_at(value, Some(vars), 0)
}

/// Terms of a value without variable expansion. `@NAME` stays literal.
pub(crate) fn terms_of(value: &Value) -> Vec<Term> {
    resolve_at(value, None, 0)
}

fn needs_expression(text: &str) -> bool {
    text.contains(['*', '/', '(', ')', '<', '>', '='])
}

fn resolve_at(value: &Value, vars: Option<&dyn VariableSource>, depth: usize) -> Vec<Term> {
    match value {
        Value::Number(n) => vec![Term::number(*n)],
        Value::Bool(b) => vec![Term::text(b.to_string())],
        Value::Text(text) => match vars {
            Some(vars) if needs_expression(text) => {
                let reduced = resolve_expression(value, vars);
                match reduced {
                    Value::Text(reduced) => walk_text(&reduced, None, depth),
                    other => resolve_at(&other, None, depth),
                }
            }
            _ => walk_text(text, vars, depth),
        },
    }
}

/// Text with no operands to combine is kept verbatim as a single term.
fn walk_text(text: &str, vars: Option<&dyn VariableSource>, depth: usize) -> Vec<Term> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let tokens = lex(text);
    let combinable = tokens.iter().any(|token| {
        matches!(
            token,
            Token::Number(_)
                | Token::Die { .. }
                | Token::Variable(_)
                | Token::Tag(_)
                | Token::Op(Op::Add | Op::Sub)
        )
    });
    if combinable {
        walk(&tokens, vars, depth)
    } else {
        vec![Term::text(text)]
    }
}

/// Walk a token stream, splitting on `+`/`-` and keeping the sign of each operand.
fn walk(tokens: &[Token], vars: Option<&dyn VariableSource>, depth: usize) -> Vec<Term> {
    let mut terms = Vec::new();
    let mut sign = 1.0;
    let mut tag: Option<String> = None;
    let mut pending: Vec<String> = Vec::new();

    let flush = |pending: &mut Vec<String>,
                 terms: &mut Vec<Term>,
                 sign: &mut f64,
                 tag: &mut Option<String>| {
        if !pending.is_empty() {
            let text = pending.join(" ");
            pending.clear();
            terms.push(Term::text(text).scale(*sign).tagged(tag.take()));
            *sign = 1.0;
        }
    };

    for token in tokens {
        match token {
            Token::Op(Op::Add) => {
                flush(&mut pending, &mut terms, &mut sign, &mut tag);
            }
            Token::Op(Op::Sub) => {
                flush(&mut pending, &mut terms, &mut sign, &mut tag);
                sign = -sign;
            }
            Token::Tag(name) => {
                flush(&mut pending, &mut terms, &mut sign, &mut tag);
                tag = Some(name.clone());
            }
            Token::Number(n) => {
                flush(&mut pending, &mut terms, &mut sign, &mut tag);
                terms.push(Term::number(sign * n).tagged(tag.take()));
                sign = 1.0;
            }
            Token::Die {
                count,
                sides,
                multiplier,
            } => {
                flush(&mut pending, &mut terms, &mut sign, &mut tag);
                terms.push(Term::dice(sign * f64::from(*count), *sides, *multiplier).tagged(tag.take()));
                sign = 1.0;
            }
            Token::Variable(name) => {
                flush(&mut pending, &mut terms, &mut sign, &mut tag);
                let expanded = match vars {
                    Some(vars) if depth < MAX_VARIABLE_DEPTH => vars
                        .variable(name)
                        .map(|value| resolve_at(&value, Some(vars), depth + 1)),
                    Some(_) => {
                        tracing::warn!(variable = %name, "variable nesting too deep");
                        None
                    }
                    None => None,
                };
                match expanded {
                    Some(resolved) => {
                        let group_tag = tag.take();
                        terms.extend(
                            resolved
                                .into_iter()
                                .map(|term| term.scale(sign).tagged(group_tag.clone())),
                        );
                    }
                    None => {
                        if vars.is_some() {
                            tracing::warn!(variable = %name, "unresolved variable");
                        }
                        terms.push(Term::text(format!("@{name}")).scale(sign).tagged(tag.take()));
                    }
                }
                sign = 1.0;
            }
            Token::Word(word) => pending.push(word.clone()),
            Token::Op(op) => pending.push(op.symbol().to_string()),
            Token::Open => pending.push("(".to_string()),
            Token::Close => pending.push(")".to_string()),
            Token::Comma => pending.push(",".to_string()),
        }
    }
    flush(&mut pending, &mut terms, &mut sign, &mut tag);

    terms
}

/// Sum terms sharing a grouping key. Zero terms are dropped when others remain.
pub fn combine_terms(terms: Vec<Term>) -> Vec<Term> {
    let mut combined: Vec<Term> = Vec::new();
    for term in terms {
        match combined.iter_mut().find(|existing| existing.same_group(&term)) {
            Some(existing) => {
                if let (Amount::Number(total), Amount::Number(n)) =
                    (&mut existing.amount, &term.amount)
                {
                    *total += n;
                }
            }
            None => combined.push(term),
        }
    }

    if combined.len() > 1 {
        let non_zero: Vec<Term> = combined.iter().filter(|t| !t.is_zero()).cloned().collect();
        combined = if non_zero.is_empty() {
            vec![Term::number(0.0)]
        } else {
            non_zero
        };
    }
    combined
}

/// Render terms in the value notation, `a + b - c`.
pub fn render_terms(terms: &[Term]) -> String {
    let mut out = String::new();
    for (i, term) in terms.iter().enumerate() {
        let (negative, magnitude) = term.split_sign();
        match (i, negative) {
            (0, true) => {
                out.push('-');
                out.push_str(&magnitude);
            }
            (0, false) => out.push_str(&magnitude),
            (_, true) => {
                out.push_str(" - ");
                out.push_str(&magnitude);
            }
            (_, false) => {
                out.push_str(" + ");
                out.push_str(&magnitude);
            }
        }
    }
    out
}

/// Collapse combined terms into a value. A lone plain number stays numeric.
pub fn terms_to_value(terms: &[Term]) -> Value {
    match terms {
        [] => Value::Number(0.0),
        [single] => match single.plain_number() {
            Some(n) => Value::Number(n),
            None => Value::Text(single.to_string()),
        },
        _ => Value::Text(render_terms(terms)),
    }
}

/// Canonical form of a value: resolved, combined and rendered.
pub fn normalize(value: &Value, vars: &dyn VariableSource) -> Value {
    if value.is_empty() {
        return value.clone();
    }
    terms_to_value(&combine_terms(resolve_value(value, vars)))
}

// ============================================================================
// Arithmetic over values
// ============================================================================

pub fn add_values(a: &Value, b: &Value) -> Value {
    let mut terms = terms_of(a);
    terms.extend(terms_of(b));
    terms_to_value(&combine_terms(terms))
}

pub fn negate_value(value: &Value) -> Value {
    let terms: Vec<Term> = terms_of(value).iter().map(|t| t.scale(-1.0)).collect();
    terms_to_value(&combine_terms(terms))
}

pub fn subtract_values(a: &Value, b: &Value) -> Value {
    add_values(a, &negate_value(b))
}

/// The single plain number a value reduces to, if any.
fn lone_number(terms: &[Term]) -> Option<f64> {
    match combine_terms(terms.to_vec()).as_slice() {
        [single] => single.plain_number(),
        _ => None,
    }
}

/// Multiply two values. Dice multiplied by a number scale their count.
pub fn multiply_values(a: &Value, b: &Value) -> Value {
    let ta = terms_of(a);
    let tb = terms_of(b);
    let (terms, factor) = match (lone_number(&ta), lone_number(&tb)) {
        (Some(x), Some(y)) => return Value::Number(x * y),
        (_, Some(k)) => (ta, k),
        (Some(k), _) => (tb, k),
        (None, None) => {
            tracing::warn!(left = %a, right = %b, "cannot multiply non-numeric values");
            return Value::Text(format!("{a} * {b}"));
        }
    };
    let scaled: Vec<Term> = terms.iter().map(|t| t.scale(factor)).collect();
    terms_to_value(&combine_terms(scaled))
}

pub fn divide_values(a: &Value, b: &Value) -> Value {
    match lone_number(&terms_of(b)) {
        Some(k) if k != 0.0 => {
            let scaled: Vec<Term> = terms_of(a).iter().map(|t| t.scale(1.0 / k)).collect();
            terms_to_value(&combine_terms(scaled))
        }
        _ => {
            tracing::warn!(left = %a, right = %b, "cannot divide by a non-numeric or zero value");
            Value::Text(format!("{a} / {b}"))
        }
    }
}

/// Dice-size-weighted magnitude of a value.
pub fn scalar(value: &Value) -> f64 {
    terms_of(value).iter().map(Term::scalar).sum()
}

/// The larger of two values by scalar. Ties keep `a`.
pub fn upgrade_values(a: &Value, b: &Value) -> Value {
    if scalar(b) > scalar(a) {
        b.clone()
    } else {
        a.clone()
    }
}

/// The smaller of two values by scalar. Ties keep `a`.
pub fn downgrade_values(a: &Value, b: &Value) -> Value {
    if scalar(b) < scalar(a) {
        b.clone()
    } else {
        a.clone()
    }
}

/// Mark a value as multiplied after the roll: `2d6` with 2 becomes `2d6x2`.
///
/// The value is marked, never multiplied: a single dice group folds the
/// factor into its multiplier, a plain number becomes `5x2`, anything else is
/// wrapped as `(value)xK`.
pub fn post_roll_multiply(value: &Value, factor: &Value) -> Value {
    let terms = combine_terms(terms_of(value));
    let k = match factor.as_number() {
        Some(k) => k,
        None => {
            tracing::warn!(factor = %factor, "post-roll multiplier is not numeric");
            return value.clone();
        }
    };

    match terms.as_slice() {
        [single] if single.plain_number().is_some() => {
            Value::Text(format!("{}x{}", single, format_number(k)))
        }
        [single] if single.is_dice() => match folded_multiplier(single, k) {
            Some(multiplier) => {
                let mut term = single.clone();
                term.multiplier = Some(multiplier);
                Value::Text(term.to_string())
            }
            None => Value::Text(format!("({})x{}", render_terms(&terms), format_number(k))),
        },
        _ => Value::Text(format!("({})x{}", render_terms(&terms), format_number(k))),
    }
}

/// The die multiplier after folding in `k`, when `k` is a positive integer
/// and the product fits.
fn folded_multiplier(term: &Term, k: f64) -> Option<u32> {
    if k.fract() != 0.0 || k < 1.0 || k > f64::from(u32::MAX) {
        return None;
    }
    let folded = term.multiplier.unwrap_or(1).checked_mul(k as u32);
    if folded.is_none() {
        tracing::debug!(term = %term, factor = k, "post-roll multiplier overflows, wrapping instead");
    }
    folded
}
