//! Typed values and decision structures carried by a decision signal.
//!
//! Pure data — built by the decoder, read by handlers, dropped when the
//! dispatch that produced them completes.

use std::fmt;

/// The scalar kinds the wire supports. Anything else is a decode error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    Float,
    Str,
}

/// A single typed scalar inside a decision.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyValue {
    Int(i32),
    Float(f64),
    Str(String),
}

impl PolicyValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            PolicyValue::Int(_) => ValueKind::Int,
            PolicyValue::Float(_) => ValueKind::Float,
            PolicyValue::Str(_) => ValueKind::Str,
        }
    }
}

impl fmt::Display for PolicyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyValue::Int(i) => write!(f, "{i}"),
            PolicyValue::Float(x) => write!(f, "{x}"),
            PolicyValue::Str(s) => write!(f, "{s}"),
        }
    }
}

/// One `(key, value)` pair of a decision. Wire order is preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValuePair {
    pub key: String,
    pub value: PolicyValue,
}

/// An ordered group of key/value pairs describing one concrete action.
///
/// Lookup is by key — the first pair with a matching key wins. Iteration
/// follows wire order, which carries no semantic weight beyond display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decision {
    pairs: Vec<KeyValuePair>,
}

impl Decision {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, key: String, value: PolicyValue) {
        self.pairs.push(KeyValuePair { key, value });
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyValuePair> {
        self.pairs.iter()
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.value(key).is_some()
    }

    /// Kind of the value stored under `key`, if present.
    pub fn kind(&self, key: &str) -> Option<ValueKind> {
        self.value(key).map(PolicyValue::kind)
    }

    pub fn value(&self, key: &str) -> Option<&PolicyValue> {
        self.pairs.iter().find(|p| p.key == key).map(|p| &p.value)
    }

    /// String value under `key`. `None` when absent or of another kind.
    pub fn str(&self, key: &str) -> Option<&str> {
        match self.value(key)? {
            PolicyValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value under `key`. `None` when absent or of another kind.
    pub fn int(&self, key: &str) -> Option<i32> {
        match self.value(key)? {
            PolicyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float value under `key`. `None` when absent or of another kind.
    pub fn float(&self, key: &str) -> Option<f64> {
        match self.value(key)? {
            PolicyValue::Float(x) => Some(*x),
            _ => None,
        }
    }
}

/// A named, ordered group of decisions delivered together in one message.
///
/// Built fresh per inbound signal and dropped as soon as every matching
/// handler has been invoked for it — handlers borrow it and must extract
/// what they need before returning.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionSet {
    name: String,
    decisions: Vec<Decision>,
}

impl DecisionSet {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            decisions: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, decision: Decision) {
        self.decisions.push(decision);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }
}
