//! The property registry: a process-wide, statically built map from
//! property name to its descriptor (spec §4.1, §9 "registration builds a
//! static lookup map").

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::container::{Container, State};
use crate::error::DaemonError;
use crate::property::value::{Kind, Value};

/// Mutability / visibility flags carried by a property (spec §2).
#[derive(Debug, Clone, Copy, Default)]
pub struct Flags {
    pub hidden: bool,
    /// Reading a default-valued property recurses to the parent's own
    /// `Get` rather than stopping at this container's default.
    pub inherited: bool,
    pub read_only_if_has_parent: bool,
    pub superuser_only: bool,
}

pub type DefaultFn = fn(&Container) -> Value;
pub type ValidatorFn = fn(&str) -> Result<Value, DaemonError>;

/// Everything the registry knows about one property.
pub struct Descriptor {
    pub name: &'static str,
    pub kind: Kind,
    pub flags: Flags,
    /// Container states in which `Set` is permitted for this property.
    pub valid_states: &'static [State],
    pub default: DefaultFn,
    pub validator: ValidatorFn,
}

impl Descriptor {
    pub fn settable_in(&self, state: State) -> bool {
        self.valid_states.contains(&state)
    }
}

pub struct Registry {
    descriptors: HashMap<&'static str, Descriptor>,
}

impl Registry {
    pub fn get(&self, name: &str) -> Option<&Descriptor> {
        self.descriptors.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.descriptors.keys().copied()
    }

    fn build(entries: Vec<Descriptor>) -> Self {
        let mut descriptors = HashMap::new();
        for entry in entries {
            descriptors.insert(entry.name, entry);
        }
        Self { descriptors }
    }
}

pub static REGISTRY: Lazy<Registry> = Lazy::new(|| Registry::build(super::catalog::catalog()));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_registers_command_and_memory_limit() {
        assert!(REGISTRY.contains("command"));
        assert!(REGISTRY.contains("memory_limit"));
        assert!(!REGISTRY.contains("not_a_real_property"));
    }
}
