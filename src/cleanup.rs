use crate::macros::{Macro, MacroId};
use crate::triggers::extractor;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, warn};

/// Conventional cleanup function names recognized in macro source.
const CLEANUP_FUNCTIONS: [&str; 3] = ["OnCleanup", "OnStop", "OnError"];

/// Why cleanup is being dispatched; forwarded for logging and host echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupReason {
    Stopped,
    Errored,
}

#[derive(Debug, Clone)]
struct CleanupEntry {
    definition: Macro,
    functions: Vec<String>,
}

/// Locates author-declared cleanup routines and packages them for execution
/// when a macro stops or fails. Temporary macros are exempt; a transient
/// handler does not own cleanup obligations of its own.
#[derive(Debug, Default)]
pub struct CleanupManager {
    registered: RwLock<HashMap<MacroId, CleanupEntry>>,
}

impl CleanupManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan the macro source for the conventional cleanup function names and
    /// record whichever are present.
    pub fn register_cleanup_functions(&self, definition: &Macro) {
        if definition.temporary {
            return;
        }
        let functions: Vec<String> = CLEANUP_FUNCTIONS
            .iter()
            .filter(|name| extractor::find_function(&definition.content, name).is_some())
            .map(|name| name.to_string())
            .collect();
        if functions.is_empty() {
            return;
        }
        debug!(
            "Macro {} declares cleanup functions: {}",
            definition.id,
            functions.join(", ")
        );
        self.registered.write().unwrap().insert(
            definition.id.clone(),
            CleanupEntry {
                definition: definition.clone(),
                functions,
            },
        );
    }

    pub fn has_cleanup_functions(&self, id: &MacroId) -> bool {
        self.registered.read().unwrap().contains_key(id)
    }

    /// Extract each recorded cleanup body and wrap it as a temporary macro
    /// for the scheduler to run. A body that no longer extracts is logged
    /// and skipped so one bad routine cannot block the others.
    pub fn execute_cleanup(&self, id: &MacroId, reason: CleanupReason) -> Vec<Macro> {
        let entry = match self.registered.read().unwrap().get(id) {
            Some(entry) => entry.clone(),
            None => return Vec::new(),
        };
        debug!("Dispatching cleanup for macro {} ({:?})", id, reason);
        entry
            .functions
            .iter()
            .filter_map(|name| {
                match extractor::find_function(&entry.definition.content, name) {
                    Some(body) => Some(Macro::temporary(&entry.definition, name, &body)),
                    None => {
                        warn!("Cleanup function {} no longer extracts from macro {}", name, id);
                        None
                    }
                }
            })
            .collect()
    }

    pub fn unregister_cleanup_functions(&self, id: &MacroId) {
        self.registered.write().unwrap().remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::MacroKind;

    const SOURCE: &str = r#"
/ac "Muscle Memory"
function OnCleanup()
  yield("/echo cleaning up")
end
function OnError()
  yield("/echo failed")
end
"#;

    #[test]
    fn test_registration_finds_conventional_names() {
        let manager = CleanupManager::new();
        let definition = Macro::new("craft", SOURCE, MacroKind::Script);
        manager.register_cleanup_functions(&definition);
        assert!(manager.has_cleanup_functions(&definition.id));
    }

    #[test]
    fn test_no_cleanup_functions_means_no_registration() {
        let manager = CleanupManager::new();
        let definition = Macro::new("plain", "/ac Reflect", MacroKind::Native);
        manager.register_cleanup_functions(&definition);
        assert!(!manager.has_cleanup_functions(&definition.id));
    }

    #[test]
    fn test_temporary_macros_are_exempt() {
        let manager = CleanupManager::new();
        let parent = Macro::new("parent", SOURCE, MacroKind::Script);
        let temp = Macro::temporary(&parent, "OnCleanup", "function OnCleanup()\nend");
        manager.register_cleanup_functions(&temp);
        assert!(!manager.has_cleanup_functions(&temp.id));
    }

    #[test]
    fn test_execute_wraps_each_function() {
        let manager = CleanupManager::new();
        let definition = Macro::new("craft", SOURCE, MacroKind::Script);
        manager.register_cleanup_functions(&definition);

        let macros = manager.execute_cleanup(&definition.id, CleanupReason::Errored);
        assert_eq!(macros.len(), 2);
        assert!(macros.iter().all(|m| m.temporary));
        assert!(macros[0].id.as_str().contains("OnCleanup"));
        assert!(macros[1].content.contains("OnError()"));
    }

    #[test]
    fn test_unregister_clears_entry() {
        let manager = CleanupManager::new();
        let definition = Macro::new("craft", SOURCE, MacroKind::Script);
        manager.register_cleanup_functions(&definition);
        manager.unregister_cleanup_functions(&definition.id);
        assert!(manager.execute_cleanup(&definition.id, CleanupReason::Stopped).is_empty());
    }
}
