use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

static NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?$")
        .expect("numeric pattern is valid")
});

/// Scalar value held by a Sigil variable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "value")]
pub enum Value {
    Str(String),
    Number(f64),
    Bool(bool),
    #[default]
    Empty,
}

impl Value {
    /// Infer a value from literal script text.
    ///
    /// Numeric-looking text becomes a number, `true`/`false` become booleans and
    /// empty text becomes [`Value::Empty`].
    pub fn infer(text: &str) -> Value {
        if text.is_empty() {
            Value::Empty
        } else if let Some(n) = parse_number(text) {
            Value::Number(n)
        } else if text == "true" {
            Value::Bool(true)
        } else if text == "false" {
            Value::Bool(false)
        } else {
            Value::Str(text.to_string())
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Str(s) => parse_number(s),
            _ => None,
        }
    }

    /// Truthiness used by single-operand conditions.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Empty => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty() && s != "false",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Empty => Ok(()),
        }
    }
}

/// Parse text as a number only when it looks numeric.
///
/// `str::parse::<f64>` alone would also accept `inf` and `NaN`, which must stay strings
/// (`rpt inf` relies on that).
pub fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if NUMERIC.is_match(text) {
        text.parse().ok()
    } else {
        None
    }
}

/// Comparison operators accepted in conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CmpOp {
    pub fn from_token(token: &str) -> Option<CmpOp> {
        Some(match token {
            "==" => CmpOp::Eq,
            "!=" => CmpOp::Ne,
            ">" => CmpOp::Gt,
            "<" => CmpOp::Lt,
            ">=" => CmpOp::Ge,
            "<=" => CmpOp::Le,
            _ => return None,
        })
    }

    fn holds(self, ordering: Option<Ordering>) -> bool {
        let Some(ordering) = ordering else {
            return self == CmpOp::Ne;
        };
        match self {
            CmpOp::Eq => ordering == Ordering::Equal,
            CmpOp::Ne => ordering != Ordering::Equal,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Ge => ordering != Ordering::Less,
            CmpOp::Le => ordering != Ordering::Greater,
        }
    }
}

/// Compare two values: numerically when both sides look numeric, as text otherwise.
pub fn compare(lhs: &Value, op: CmpOp, rhs: &Value) -> bool {
    match (lhs.as_number(), rhs.as_number()) {
        (Some(l), Some(r)) => op.holds(l.partial_cmp(&r)),
        _ => op.holds(Some(lhs.to_string().cmp(&rhs.to_string()))),
    }
}
