use std::fmt::{self, Write as _};

use serde_json::Value;

use weft_core::ids::ToolCallId;
use weft_core::messages::ToolCall;

/// Canonical identity of a tool call: name plus normalized arguments.
///
/// Object keys are sorted recursively, strings are trimmed and integral
/// floats compare equal to integers. The call id plays no part.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToolCallSignature(String);

impl ToolCallSignature {
    pub fn of(call: &ToolCall) -> Self {
        let mut out = String::with_capacity(call.name.len() + 32);
        out.push_str(call.name.trim());
        out.push(':');
        write_canonical(&mut out, &unstringify(&call.arguments));
        Self(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ToolCallSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order-insensitive signature of a whole batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct BatchSignature(Vec<ToolCallSignature>);

impl BatchSignature {
    pub fn of<'a>(signatures: impl IntoIterator<Item = &'a ToolCallSignature>) -> Self {
        let mut sigs: Vec<_> = signatures.into_iter().cloned().collect();
        sigs.sort();
        Self(sigs)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// One distinct call of a batch and the ids of later calls that share its
/// signature.
#[derive(Clone, Debug)]
pub struct DedupedCall {
    pub call: ToolCall,
    pub signature: ToolCallSignature,
    pub duplicate_ids: Vec<ToolCallId>,
}

impl DedupedCall {
    /// Every id that should receive this call's result, representative first.
    pub fn all_ids(&self) -> impl Iterator<Item = &ToolCallId> {
        std::iter::once(&self.call.id).chain(self.duplicate_ids.iter())
    }
}

/// Collapse calls that share a signature, keeping first-occurrence order.
pub fn dedupe(calls: &[ToolCall]) -> Vec<DedupedCall> {
    let mut groups: Vec<DedupedCall> = Vec::with_capacity(calls.len());
    for call in calls {
        let signature = ToolCallSignature::of(call);
        match groups.iter_mut().find(|g| g.signature == signature) {
            Some(group) => group.duplicate_ids.push(call.id.clone()),
            None => groups.push(DedupedCall {
                call: call.clone(),
                signature,
                duplicate_ids: Vec::new(),
            }),
        }
    }
    groups
}

// Some models send the argument object as a JSON string.
fn unstringify(arguments: &Value) -> Value {
    if let Value::String(s) = arguments {
        if let Ok(parsed @ Value::Object(_)) = serde_json::from_str::<Value>(s.trim()) {
            return parsed;
        }
    }
    arguments.clone()
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Value::Number(n) => write_number(out, n),
        Value::String(s) => out.push_str(&Value::String(s.trim().to_string()).to_string()),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(out, &map[key]);
            }
            out.push('}');
        }
    }
}

fn write_number(out: &mut String, n: &serde_json::Number) {
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "{i}");
    } else if let Some(u) = n.as_u64() {
        let _ = write!(out, "{u}");
    } else if let Some(f) = n.as_f64() {
        if f.fract() == 0.0 && f.abs() < 9.0e15 {
            let _ = write!(out, "{}", f as i64);
        } else {
            let _ = write!(out, "{f}");
        }
    }
}
