//! Typed property values and the per-container Value Store.

use std::collections::HashMap;

use crate::error::{DaemonError, ErrorCode};

/// The kind a property's value is typed as (spec §2 "Property Registry").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    String,
    Bool,
    Int,
    UInt,
    List,
    Map,
}

/// A typed, already-validated property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Bool(bool),
    Int(i64),
    UInt(u64),
    List(Vec<String>),
    Map(HashMap<String, String>),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::String(_) => Kind::String,
            Value::Bool(_) => Kind::Bool,
            Value::Int(_) => Kind::Int,
            Value::UInt(_) => Kind::UInt,
            Value::List(_) => Kind::List,
            Value::Map(_) => Kind::Map,
        }
    }

    /// Canonical wire representation — round-trips through `SetProperty`
    /// then `GetProperty` (spec §8 "SetProperty then GetProperty returns
    /// the normalized value").
    pub fn to_wire(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::UInt(u) => u.to_string(),
            Value::List(items) => items.join(";"),
            Value::Map(map) => {
                let mut keys: Vec<_> = map.keys().collect();
                keys.sort();
                keys.into_iter()
                    .map(|k| format!("{}={}", k, map[k]))
                    .collect::<Vec<_>>()
                    .join(";")
            }
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::UInt(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

/// What a container's Value Store holds for one property: either an
/// explicit value, or a marker that `Get` must resolve via inheritance or
/// the registry default (spec §2 "Value Store").
#[derive(Debug, Clone)]
pub enum Slot {
    Default,
    Explicit(Value),
}

/// Per-container typed map from property name to slot (spec §2, §3
/// "Configuration: a Value Store keyed by property name").
#[derive(Debug, Clone, Default)]
pub struct ValueStore {
    slots: HashMap<String, Slot>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self { slots: HashMap::new() }
    }

    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.get(name)
    }

    pub fn is_default(&self, name: &str) -> bool {
        !matches!(self.slots.get(name), Some(Slot::Explicit(_)))
    }

    pub fn set_explicit(&mut self, name: impl Into<String>, value: Value) {
        self.slots.insert(name.into(), Slot::Explicit(value));
    }

    /// Reset a property back to following its default/inherited chain.
    pub fn reset_to_default(&mut self, name: &str) {
        self.slots.remove(name);
    }

    /// Serialize every explicitly-set property for persistence (spec §4.1
    /// "Set ... append-writes a single (name, raw) record").
    pub fn explicit_pairs(&self) -> Vec<(String, String)> {
        self.slots
            .iter()
            .filter_map(|(name, slot)| match slot {
                Slot::Explicit(value) => Some((name.clone(), value.to_wire())),
                Slot::Default => None,
            })
            .collect()
    }
}

pub fn invalid_value(msg: impl Into<String>) -> DaemonError {
    DaemonError::new(ErrorCode::InvalidValue, msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_pairs_only_includes_set_properties() {
        let mut store = ValueStore::new();
        store.set_explicit("command", Value::String("/bin/true".into()));
        assert!(store.is_default("memory_limit"));
        assert!(!store.is_default("command"));
        assert_eq!(store.explicit_pairs(), vec![("command".to_string(), "/bin/true".to_string())]);
    }

    #[test]
    fn list_round_trips_through_wire_format() {
        let v = Value::List(vec!["a".into(), "b".into()]);
        assert_eq!(v.to_wire(), "a;b");
    }
}
