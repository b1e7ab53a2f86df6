//! Lexer and term model for the value mini-language.
//!
//! Values on change records use a small notation: numbers, dice (`2d6`,
//! `2d6x2`), tags that group a quantity (`ammo:100`), `@VARIABLES` and the
//! arithmetic operators. The lexer produces the token set shared by the value
//! resolver and the expression evaluator.

use super::format_number;
use std::fmt;

/// Binary operators understood by the expression grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
}

impl Op {
    pub fn symbol(&self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Gt => ">",
            Op::Lt => "<",
            Op::Ge => ">=",
            Op::Le => "<=",
            Op::Eq => "=",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(self, Op::Gt | Op::Lt | Op::Ge | Op::Le | Op::Eq)
    }
}

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Die {
        count: u32,
        sides: u32,
        multiplier: Option<u32>,
    },
    /// `name:` prefix grouping the operand that follows it.
    Tag(String),
    /// `@NAME`, stored without the `@`.
    Variable(String),
    Word(String),
    Op(Op),
    Open,
    Close,
    Comma,
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '+' | '-' | '*' | '/' | '(' | ')' | ',' | '<' | '>' | '=' | ':')
}

fn read_digits(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    i
}

fn parse_u32(chars: &[char]) -> Option<u32> {
    chars.iter().collect::<String>().parse().ok()
}

/// Lex a number or die starting at `start`. Returns the token and the index after it.
fn lex_number(chars: &[char], start: usize) -> (Token, usize) {
    let int_end = read_digits(chars, start);
    let mut end = int_end;
    if end + 1 < chars.len() && chars[end] == '.' && chars[end + 1].is_ascii_digit() {
        end = read_digits(chars, end + 1);
    }

    let is_integer = end == int_end;
    let has_die = end + 1 < chars.len()
        && matches!(chars[end], 'd' | 'D')
        && chars[end + 1].is_ascii_digit();

    if is_integer && has_die {
        let sides_end = read_digits(chars, end + 1);
        let count = parse_u32(&chars[start..int_end]);
        let sides = parse_u32(&chars[end + 1..sides_end]);
        let mut next = sides_end;
        let mut multiplier = None;
        if next + 1 < chars.len() && matches!(chars[next], 'x' | 'X') && chars[next + 1].is_ascii_digit()
        {
            let mult_end = read_digits(chars, next + 1);
            multiplier = parse_u32(&chars[next + 1..mult_end]);
            next = mult_end;
        }
        if let (Some(count), Some(sides)) = (count, sides) {
            return (
                Token::Die {
                    count,
                    sides,
                    multiplier,
                },
                next,
            );
        }
    }

    let text: String = chars[start..end].iter().collect();
    // Digits always parse; fall back to a word for absurdly long literals.
    match text.parse::<f64>() {
        Ok(n) if n.is_finite() => (Token::Number(n), end),
        _ => (Token::Word(text), end),
    }
}

/// Split an input string into tokens. Whitespace separates tokens and is dropped.
pub fn lex(input: &str) -> Vec<Token> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' => {
                let (token, next) = lex_number(&chars, i);
                tokens.push(token);
                i = next;
            }
            '+' | '-' | '*' | '/' => {
                tokens.push(Token::Op(match c {
                    '+' => Op::Add,
                    '-' => Op::Sub,
                    '*' => Op::Mul,
                    _ => Op::Div,
                }));
                i += 1;
            }
            '>' | '<' => {
                let or_equal = chars.get(i + 1) == Some(&'=');
                tokens.push(Token::Op(match (c, or_equal) {
                    ('>', true) => Op::Ge,
                    ('>', false) => Op::Gt,
                    ('<', true) => Op::Le,
                    _ => Op::Lt,
                }));
                i += if or_equal { 2 } else { 1 };
            }
            '=' => {
                tokens.push(Token::Op(Op::Eq));
                i += if chars.get(i + 1) == Some(&'=') { 2 } else { 1 };
            }
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Word(":".to_string()));
                i += 1;
            }
            _ => {
                let mut end = i + 1;
                while end < chars.len() && !is_delimiter(chars[end]) {
                    end += 1;
                }
                let word: String = chars[i..end].iter().collect();
                if chars.get(end) == Some(&':') && !word.starts_with('@') {
                    tokens.push(Token::Tag(word));
                    end += 1;
                } else if let Some(name) = word.strip_prefix('@').filter(|n| !n.is_empty()) {
                    tokens.push(Token::Variable(name.to_string()));
                } else {
                    tokens.push(Token::Word(word));
                }
                i = end;
            }
        }
    }

    tokens
}

/// The quantity carried by a term.
#[derive(Debug, Clone, PartialEq)]
pub enum Amount {
    Number(f64),
    Text(String),
}

/// One resolved operand: a number, a die group or an unresolvable string,
/// optionally grouped under a tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub amount: Amount,
    pub sides: Option<u32>,
    pub multiplier: Option<u32>,
    pub item: Option<String>,
}

impl Term {
    pub fn number(value: f64) -> Self {
        Self {
            amount: Amount::Number(value),
            sides: None,
            multiplier: None,
            item: None,
        }
    }

    pub fn dice(count: f64, sides: u32, multiplier: Option<u32>) -> Self {
        Self {
            amount: Amount::Number(count),
            sides: Some(sides),
            multiplier,
            item: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            amount: Amount::Text(text.into()),
            sides: None,
            multiplier: None,
            item: None,
        }
    }

    /// Group this term under `tag`, if any.
    pub fn tagged(mut self, tag: Option<String>) -> Self {
        if tag.is_some() {
            self.item = tag;
        }
        self
    }

    pub fn is_dice(&self) -> bool {
        self.sides.is_some()
    }

    /// An untagged, dice-free number.
    pub fn plain_number(&self) -> Option<f64> {
        match self.amount {
            Amount::Number(n) if self.sides.is_none() && self.item.is_none() => Some(n),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self.amount, Amount::Number(n) if n == 0.0)
    }

    /// Dice-size-weighted magnitude used for upgrade/downgrade comparisons.
    pub fn scalar(&self) -> f64 {
        match self.amount {
            Amount::Number(n) => {
                n * f64::from(self.sides.unwrap_or(1)) * f64::from(self.multiplier.unwrap_or(1))
            }
            Amount::Text(_) => 0.0,
        }
    }

    /// Terms sharing tag, die size and multiplier sum together.
    pub fn same_group(&self, other: &Term) -> bool {
        matches!(
            (&self.amount, &other.amount),
            (Amount::Number(_), Amount::Number(_))
        ) && self.item == other.item
            && self.sides == other.sides
            && self.multiplier == other.multiplier
    }

    /// Multiply the term by `factor`. Dice scale their count.
    pub fn scale(&self, factor: f64) -> Term {
        let amount = match &self.amount {
            Amount::Number(n) => Amount::Number(n * factor),
            Amount::Text(text) if factor == -1.0 => match text.strip_prefix('-') {
                Some(positive) => Amount::Text(positive.to_string()),
                None => Amount::Text(format!("-{text}")),
            },
            Amount::Text(text) if factor == 1.0 => Amount::Text(text.clone()),
            Amount::Text(text) => Amount::Text(format!("{text}*{}", format_number(factor))),
        };
        Term {
            amount,
            ..self.clone()
        }
    }

    /// Split an untagged negative term into `(true, magnitude)` for rendering.
    pub(crate) fn split_sign(&self) -> (bool, String) {
        if self.item.is_none() {
            match &self.amount {
                Amount::Number(n) if *n < 0.0 => return (true, self.scale(-1.0).to_string()),
                Amount::Text(text) => {
                    if let Some(positive) = text.strip_prefix('-') {
                        return (true, positive.to_string());
                    }
                }
                _ => {}
            }
        }
        (false, self.to_string())
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tag) = &self.item {
            write!(f, "{tag}:")?;
        }
        match (&self.amount, self.sides) {
            (Amount::Number(count), Some(sides)) => {
                write!(f, "{}d{}", format_number(*count), sides)?;
                if let Some(multiplier) = self.multiplier {
                    write!(f, "x{multiplier}")?;
                }
                Ok(())
            }
            (Amount::Number(n), None) => write!(f, "{}", format_number(*n)),
            (Amount::Text(text), _) => write!(f, "{text}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lex_dice_and_operators() {
        let tokens = lex("2d6x2 + 3");
        assert_eq!(
            tokens,
            vec![
                Token::Die {
                    count: 2,
                    sides: 6,
                    multiplier: Some(2)
                },
                Token::Op(Op::Add),
                Token::Number(3.0),
            ]
        );
    }

    #[test]
    fn test_lex_tags_and_variables() {
        let tokens = lex("ammo:100-@STRMOD");
        assert_eq!(
            tokens,
            vec![
                Token::Tag("ammo".to_string()),
                Token::Number(100.0),
                Token::Op(Op::Sub),
                Token::Variable("STRMOD".to_string()),
            ]
        );
    }

    #[test]
    fn test_lex_comparisons() {
        assert_eq!(
            lex("1>=2<3==4"),
            vec![
                Token::Number(1.0),
                Token::Op(Op::Ge),
                Token::Number(2.0),
                Token::Op(Op::Lt),
                Token::Number(3.0),
                Token::Op(Op::Eq),
                Token::Number(4.0),
            ]
        );
    }

    #[test]
    fn test_lex_decimal_is_not_a_die() {
        assert_eq!(
            lex("1.5d6"),
            vec![Token::Number(1.5), Token::Word("d6".to_string())]
        );
    }

    #[test]
    fn test_lex_lone_colon_makes_progress() {
        assert_eq!(lex(":"), vec![Token::Word(":".to_string())]);
    }

    #[test]
    fn test_term_display() {
        assert_eq!(Term::dice(2.0, 6, None).to_string(), "2d6");
        assert_eq!(Term::dice(1.0, 8, Some(3)).to_string(), "1d8x3");
        assert_eq!(
            Term::number(100.0).tagged(Some("ammo".into())).to_string(),
            "ammo:100"
        );
        assert_eq!(Term::number(2.5).to_string(), "2.5");
    }

    #[test]
    fn test_scalar_weights_dice() {
        assert_eq!(Term::dice(2.0, 6, None).scalar(), 12.0);
        assert_eq!(Term::dice(1.0, 10, Some(2)).scalar(), 20.0);
        assert_eq!(Term::number(7.0).scalar(), 7.0);
        assert_eq!(Term::text("Medium").scalar(), 0.0);
    }
}
