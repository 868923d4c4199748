use std::collections::BTreeMap;

use tracing::debug;

use super::script::Script;
use crate::host::Host;

/// Factory function type for creating script instances
pub type ScriptFactory<H> = fn() -> Box<dyn Script<H>>;

/// Registry of available scripts
pub struct ScriptRegistry<H: Host> {
    /// Map of script ID to factory function
    factories: BTreeMap<String, ScriptFactory<H>>,
}

impl<H: Host> ScriptRegistry<H> {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register a script factory under an explicit id
    pub fn register(&mut self, id: impl Into<String>, factory: ScriptFactory<H>) {
        let id = id.into();
        debug!(target: "scripting", "Registering script factory: {}", id);
        self.factories.insert(id, factory);
    }

    /// Register a script factory under the id the script reports
    pub fn register_factory(&mut self, factory: ScriptFactory<H>) {
        let id = factory().id();
        self.register(id, factory);
    }

    /// Create a fresh instance of a script
    pub fn create(&self, id: &str) -> Option<Box<dyn Script<H>>> {
        self.factories.get(id).map(|factory| factory())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Get the list of all registered script IDs, sorted
    pub fn available_scripts(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

impl<H: Host> Default for ScriptRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Macro to register multiple scripts at once
///
/// # Example
/// ```ignore
/// let mut registry = ScriptRegistry::new();
/// register_scripts!(registry, HelloWorldScript, PatrolScript);
/// ```
#[macro_export]
macro_rules! register_scripts {
    ($registry:expr, $($script:ty),+ $(,)?) => {
        $(
            $registry.register_factory(|| Box::new(<$script>::default()));
        )+
    };
}
