//! Pure assertion functions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DriverError;

/// Result of comparing observed page state with an expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionOutcome {
    pub passed: bool,
    pub message: String,
}

impl AssertionOutcome {
    fn pass(message: String) -> Self {
        Self { passed: true, message }
    }

    fn fail(message: String) -> Self {
        Self { passed: false, message }
    }
}

/// Check that `actual` contains `expected`.
///
/// Whitespace runs are collapsed on both sides first; rendered text often
/// differs from the source only by line breaks.
pub fn assert_text(actual: &str, expected: &str) -> AssertionOutcome {
    let actual_norm = normalize_whitespace(actual);
    let expected_norm = normalize_whitespace(expected);
    if actual_norm.contains(&expected_norm) {
        AssertionOutcome::pass(format!("text contains '{}'", expected_norm))
    } else {
        AssertionOutcome::fail(format!(
            "expected text containing '{}', found '{}'",
            expected_norm,
            truncate(&actual_norm, 120)
        ))
    }
}

/// Check an element count against a predicate.
pub fn assert_count(count: usize, predicate: &CountPredicate) -> AssertionOutcome {
    if predicate.matches(count) {
        AssertionOutcome::pass(format!("count {} satisfies {}", count, predicate))
    } else {
        AssertionOutcome::fail(format!("expected count {}, found {}", predicate, count))
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Eq,
    Ne,
    Ge,
    Gt,
    Le,
    Lt,
}

impl Comparison {
    fn symbol(&self) -> &'static str {
        match self {
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
            Comparison::Ge => ">=",
            Comparison::Gt => ">",
            Comparison::Le => "<=",
            Comparison::Lt => "<",
        }
    }
}

/// Count expectation such as `>=1`, `==0` or a bare `3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "String")]
pub struct CountPredicate {
    pub op: Comparison,
    pub value: usize,
}

impl CountPredicate {
    pub fn new(op: Comparison, value: usize) -> Self {
        Self { op, value }
    }

    pub fn matches(&self, count: usize) -> bool {
        match self.op {
            Comparison::Eq => count == self.value,
            Comparison::Ne => count != self.value,
            Comparison::Ge => count >= self.value,
            Comparison::Gt => count > self.value,
            Comparison::Le => count <= self.value,
            Comparison::Lt => count < self.value,
        }
    }
}

impl fmt::Display for CountPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.symbol(), self.value)
    }
}

impl From<CountPredicate> for String {
    fn from(p: CountPredicate) -> Self {
        p.to_string()
    }
}

impl FromStr for CountPredicate {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // Two-character operators first so ">=" is not read as ">".
        let (op, rest) = [
            (">=", Comparison::Ge),
            ("<=", Comparison::Le),
            ("==", Comparison::Eq),
            ("!=", Comparison::Ne),
            (">", Comparison::Gt),
            ("<", Comparison::Lt),
            ("=", Comparison::Eq),
        ]
        .iter()
        .find_map(|(prefix, op)| s.strip_prefix(prefix).map(|rest| (*op, rest)))
        .unwrap_or((Comparison::Eq, s));

        let value = rest.trim().parse::<usize>().map_err(|_| {
            DriverError::InvalidScenario(format!("invalid count predicate '{}'", s))
        })?;
        Ok(Self { op, value })
    }
}

impl TryFrom<serde_json::Value> for CountPredicate {
    type Error = DriverError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Number(n) => n
                .as_u64()
                .map(|v| Self::new(Comparison::Eq, v as usize))
                .ok_or_else(|| {
                    DriverError::InvalidScenario(format!("invalid count predicate '{}'", n))
                }),
            serde_json::Value::String(s) => s.parse(),
            other => Err(DriverError::InvalidScenario(format!(
                "invalid count predicate '{}'",
                other
            ))),
        }
    }
}
