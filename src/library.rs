use crate::macros::Macro;
use std::collections::HashMap;
use std::sync::RwLock;

/// Lookup boundary to the external persisted macro store. The run-sub-macro
/// command resolves names through this; editing and persistence live outside
/// the core.
pub trait MacroLibrary: Send + Sync {
    fn get_by_name(&self, name: &str) -> Option<Macro>;
}

#[derive(Debug, Default)]
pub struct InMemoryLibrary {
    macros: RwLock<HashMap<String, Macro>>,
}

impl InMemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, definition: Macro) {
        self.macros
            .write()
            .unwrap()
            .insert(definition.name.clone(), definition);
    }
}

impl MacroLibrary for InMemoryLibrary {
    fn get_by_name(&self, name: &str) -> Option<Macro> {
        self.macros.read().unwrap().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::MacroKind;

    #[test]
    fn test_lookup_by_name() {
        let library = InMemoryLibrary::new();
        library.insert(Macro::new("repair", "/ac Repair", MacroKind::Native));
        assert!(library.get_by_name("repair").is_some());
        assert!(library.get_by_name("missing").is_none());
    }
}
