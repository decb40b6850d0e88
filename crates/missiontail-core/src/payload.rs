//! Typed view of the counter service payload.
//!
//! The payload is an arbitrarily nested JSON document. It is converted into a
//! [`PayloadNode`] tree once, then walked depth-first (pre-order) with an
//! explicit stack to find the first object whose match field carries the
//! configured value.

use serde_json::Value;

use crate::config::CounterConfig;
use crate::error::CounterError;

/// Leaf value of the payload tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl Scalar {
    /// Whether this scalar reads as `expected`. Numbers compare by their
    /// decimal text.
    #[must_use]
    pub fn matches_text(&self, expected: &str) -> bool {
        match self {
            Self::String(s) => s == expected,
            Self::Number(n) => n.to_string() == expected,
            Self::Bool(b) => b.to_string() == expected,
            Self::Null => false,
        }
    }

    /// Integer reading of this scalar: an integer, an integral float, or a
    /// string holding either.
    #[must_use]
    pub fn as_count(&self) -> Option<i64> {
        match self {
            Self::Number(n) => number_to_count(n),
            Self::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(float_to_count))
            }
            Self::Null | Self::Bool(_) => None,
        }
    }
}

fn number_to_count(n: &serde_json::Number) -> Option<i64> {
    n.as_i64()
        .or_else(|| n.as_u64().and_then(|v| i64::try_from(v).ok()))
        .or_else(|| n.as_f64().and_then(float_to_count))
}

#[allow(clippy::cast_possible_truncation)]
fn float_to_count(f: f64) -> Option<i64> {
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (f.is_finite() && f.fract() == 0.0 && in_range).then_some(f as i64)
}

/// Node of the payload tree.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadNode {
    /// Object members, in key order.
    Object(Vec<(String, PayloadNode)>),
    Array(Vec<PayloadNode>),
    Scalar(Scalar),
}

impl From<Value> for PayloadNode {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Null => Self::Scalar(Scalar::Null),
            Value::Bool(b) => Self::Scalar(Scalar::Bool(b)),
            Value::Number(n) => Self::Scalar(Scalar::Number(n)),
            Value::String(s) => Self::Scalar(Scalar::String(s)),
        }
    }
}

impl PayloadNode {
    /// Parse JSON text into a tree.
    pub fn parse(text: &str) -> Result<Self, CounterError> {
        serde_json::from_str::<Value>(text)
            .map(Self::from)
            .map_err(|e| CounterError::Parse(format!("invalid JSON payload: {e}")))
    }

    /// Direct member lookup on an object node.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&PayloadNode> {
        match self {
            Self::Object(members) => members.iter().find(|(k, _)| k == field).map(|(_, v)| v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// First object node, in pre-order, whose `field` member is a scalar
    /// reading as `value`. The node itself is considered before its children.
    #[must_use]
    pub fn find_first(&self, field: &str, value: &str) -> Option<&PayloadNode> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                Self::Object(members) => {
                    if node
                        .get(field)
                        .and_then(Self::as_scalar)
                        .is_some_and(|s| s.matches_text(value))
                    {
                        return Some(node);
                    }
                    stack.extend(members.iter().rev().map(|(_, child)| child));
                }
                Self::Array(items) => stack.extend(items.iter().rev()),
                Self::Scalar(_) => {}
            }
        }
        None
    }
}

/// Locate the configured entry in `text` and read its counter.
pub fn extract_counter(text: &str, config: &CounterConfig) -> Result<i64, CounterError> {
    let tree = PayloadNode::parse(text)?;
    let entry = tree
        .find_first(&config.match_field, &config.match_value)
        .ok_or_else(|| {
            CounterError::Parse(format!(
                "no entry with {} = {}",
                config.match_field, config.match_value
            ))
        })?;
    entry
        .get(&config.count_field)
        .and_then(PayloadNode::as_scalar)
        .and_then(Scalar::as_count)
        .ok_or_else(|| {
            CounterError::Parse(format!(
                "entry {} has no integer field {}",
                config.match_value, config.count_field
            ))
        })
}
