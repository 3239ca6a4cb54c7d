// SPDX-License-Identifier: MIT
//! Best-effort decoder for inbound decision signal payloads.
//!
//! The payload shape is `[txid, entries]` where `entries` is an ordered
//! sequence of `[name, decisions]` pairs, each decision an ordered sequence
//! of `[key, value]` pairs and each value one of {int32, float64, string}.
//!
//! Decoding is fail-soft: a structural violation clears the well-formed
//! flag for the whole message but drops only the offending element — a bad
//! pair loses the pair, a bad decision loses the decision, a bad entry
//! loses the entry. Sibling elements keep decoding so handlers whose slice
//! of the message is intact still get their data.

use serde_json::Value;
use tracing::debug;

use super::value::{Decision, DecisionSet, PolicyValue};

/// Upper bound on floating-point values accepted in a single decision.
/// Pairs beyond the cap are dropped and the message is flagged malformed.
pub const MAX_FLOATS_PER_DECISION: usize = 8;

/// Everything that could be decoded from one signal body.
#[derive(Debug)]
pub struct DecodedEntries {
    /// Decision sets in wire order, holding whatever survived decoding.
    pub sets: Vec<DecisionSet>,
    /// `false` when any element of the message was structurally invalid.
    pub well_formed: bool,
}

/// Read the leading transaction id of a decision payload.
///
/// `None` means the payload cannot even identify its transaction — the
/// caller drops the message without emitting anything.
pub fn transaction_id(params: &Value) -> Option<u32> {
    let n = params.as_array()?.first()?.as_u64()?;
    u32::try_from(n).ok()
}

/// Decode everything after the transaction id, best-effort.
pub fn decode_entries(params: &Value) -> DecodedEntries {
    let mut sets = Vec::new();

    let entries = match params.as_array().and_then(|args| args.get(1)) {
        Some(Value::Array(entries)) => entries,
        _ => {
            debug!("decision payload has no entry list");
            return DecodedEntries {
                sets,
                well_formed: false,
            };
        }
    };

    let mut well_formed = true;
    for entry in entries {
        match decode_entry(entry, &mut well_formed) {
            Some(set) => sets.push(set),
            None => {
                debug!("malformed decision-set entry dropped");
                well_formed = false;
            }
        }
    }

    DecodedEntries { sets, well_formed }
}

/// One `[name, decisions]` entry. `None` when the entry itself is not a
/// two-element array of string + array.
fn decode_entry(entry: &Value, well_formed: &mut bool) -> Option<DecisionSet> {
    let fields = entry.as_array()?;
    let (name, decisions) = match fields.as_slice() {
        [Value::String(name), Value::Array(decisions)] => (name, decisions),
        _ => return None,
    };

    let mut set = DecisionSet::new(name.clone());
    for decision in decisions {
        match decode_decision(decision, well_formed) {
            Some(d) => set.push(d),
            None => {
                debug!(set = %name, "malformed decision dropped");
                *well_formed = false;
            }
        }
    }
    Some(set)
}

fn decode_decision(decision: &Value, well_formed: &mut bool) -> Option<Decision> {
    let pairs = decision.as_array()?;

    let mut out = Decision::new();
    let mut floats = 0usize;
    for pair in pairs {
        match decode_pair(pair) {
            Some((key, value)) => {
                if matches!(value, PolicyValue::Float(_)) {
                    floats += 1;
                    if floats > MAX_FLOATS_PER_DECISION {
                        debug!(key = %key, "float cap exceeded — pair dropped");
                        *well_formed = false;
                        continue;
                    }
                }
                out.push(key, value);
            }
            None => {
                debug!("malformed key/value pair dropped");
                *well_formed = false;
            }
        }
    }
    Some(out)
}

/// One `[key, value]` pair. `None` on any shape or kind violation,
/// including integers outside the i32 range.
fn decode_pair(pair: &Value) -> Option<(String, PolicyValue)> {
    let fields = pair.as_array()?;
    let (key, raw) = match fields.as_slice() {
        [Value::String(key), raw] => (key, raw),
        _ => return None,
    };

    let value = match raw {
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                PolicyValue::Int(i32::try_from(n.as_i64()?).ok()?)
            } else {
                PolicyValue::Float(n.as_f64()?)
            }
        }
        Value::String(s) => PolicyValue::Str(s.clone()),
        _ => return None,
    };

    Some((key.clone(), value))
}
