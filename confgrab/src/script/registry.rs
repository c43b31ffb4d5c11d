//! Registry for looking up device scripts by name.

use std::collections::HashMap;
use std::sync::Arc;

use super::definition::DeviceScript;
use super::vendors;
use crate::error::ScriptError;

/// Registry of device scripts.
///
/// There is no global instance; the scheduler owns one and hands out
/// shared references to the scripts it holds.
#[derive(Debug, Default, Clone)]
pub struct ScriptRegistry {
    scripts: HashMap<String, Arc<DeviceScript>>,
}

impl ScriptRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
        }
    }

    /// Create a registry holding the built-in vendor scripts.
    pub fn with_builtin() -> Result<Self, ScriptError> {
        let mut registry = Self::new();
        registry.register(vendors::cisco_ios::script()?)?;
        registry.register(vendors::arista_eos::script()?)?;
        registry.register(vendors::juniper_junos::script()?)?;
        Ok(registry)
    }

    /// Register a script. Names must be unique.
    pub fn register(&mut self, script: DeviceScript) -> Result<(), ScriptError> {
        if self.scripts.contains_key(script.name()) {
            return Err(ScriptError::AlreadyRegistered {
                name: script.name().to_string(),
            });
        }
        self.scripts
            .insert(script.name().to_string(), Arc::new(script));
        Ok(())
    }

    /// Get a script by name.
    pub fn get(&self, name: &str) -> Option<Arc<DeviceScript>> {
        self.scripts.get(name).cloned()
    }

    /// Get a script by name, failing if it is not registered.
    pub fn resolve(&self, name: &str) -> Result<Arc<DeviceScript>, ScriptError> {
        self.get(name).ok_or_else(|| ScriptError::UnknownScript {
            name: name.to_string(),
        })
    }

    /// Check if a script is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.scripts.contains_key(name)
    }

    /// List all registered script names.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.scripts.keys()
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}
