// Capability Registry
// Ordered set of capabilities built once per session. Registration order is
// what the model sees as the enumerated action set.

use super::capability::{Capability, CapabilityHandler, Registered};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Capability '{0}' is already registered")]
    Duplicate(String),
    #[error("{name} is not a valid tool, try one of [{available}].")]
    NotFound { name: String, available: String },
}

#[derive(Default)]
pub struct CapabilityRegistry {
    entries: Vec<Arc<dyn Capability>>,
    index: HashMap<String, usize>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, capability: Arc<dyn Capability>) -> Result<(), RegistryError> {
        let name = capability.descriptor().name.clone();
        if self.index.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.index.insert(name, self.entries.len());
        self.entries.push(capability);
        Ok(())
    }

    pub fn register_handler<H: CapabilityHandler>(&mut self, handler: H) -> Result<(), RegistryError> {
        self.register(Arc::new(Registered::new(handler)))
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Capability>, RegistryError> {
        self.index
            .get(name)
            .map(|&idx| Arc::clone(&self.entries[idx]))
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    /// Capabilities in registration order.
    pub fn list(&self) -> &[Arc<dyn Capability>] {
        &self.entries
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|c| c.descriptor().name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `name: description` lines for the decision prompt.
    pub fn render_for_prompt(&self) -> String {
        self.entries
            .iter()
            .map(|c| {
                let d = c.descriptor();
                match c.input_schema().prompt_hint() {
                    Some(hint) => format!("> {}: {} {}", d.name, d.description, hint),
                    None => format!("> {}: {}", d.name, d.description),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.names())
            .finish()
    }
}
