use crate::macros::{Macro, MacroId};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Edges {
    parent_of: HashMap<MacroId, MacroId>,
    children_of: HashMap<MacroId, Vec<MacroId>>,
}

/// Tracks the parent → transient-child relationships created by trigger and
/// cleanup dispatch. Every temporary macro has exactly one parent; each edge
/// is removed exactly once, either when the child reaches a terminal state
/// or when the parent itself is unregistered.
#[derive(Debug, Default)]
pub struct MacroHierarchyManager {
    edges: RwLock<Edges>,
}

impl MacroHierarchyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a parent/child edge for a freshly synthesized temporary macro.
    pub fn register_temporary_macro(&self, parent: &MacroId, child: &Macro) {
        let mut edges = self.edges.write().unwrap();
        if edges.parent_of.contains_key(&child.id) {
            warn!("Temporary macro {} is already registered", child.id);
            return;
        }
        edges.parent_of.insert(child.id.clone(), parent.clone());
        edges
            .children_of
            .entry(parent.clone())
            .or_default()
            .push(child.id.clone());
        debug!("Registered temporary macro {} under {}", child.id, parent);
    }

    pub fn parent_of(&self, child: &MacroId) -> Option<MacroId> {
        self.edges.read().unwrap().parent_of.get(child).cloned()
    }

    /// Walk up through any chain of temporary macros to the first ancestor
    /// that is not itself a registered child.
    pub fn root_parent_of(&self, child: &MacroId) -> Option<MacroId> {
        let edges = self.edges.read().unwrap();
        let mut current = edges.parent_of.get(child)?;
        while let Some(next) = edges.parent_of.get(current) {
            current = next;
        }
        Some(current.clone())
    }

    pub fn children_of(&self, parent: &MacroId) -> Vec<MacroId> {
        self.edges
            .read()
            .unwrap()
            .children_of
            .get(parent)
            .cloned()
            .unwrap_or_default()
    }

    /// All descendants of a macro, children first.
    pub fn descendants_of(&self, parent: &MacroId) -> Vec<MacroId> {
        let edges = self.edges.read().unwrap();
        let mut found = Vec::new();
        let mut pending = vec![parent.clone()];
        while let Some(id) = pending.pop() {
            if let Some(children) = edges.children_of.get(&id) {
                for child in children {
                    found.push(child.clone());
                    pending.push(child.clone());
                }
            }
        }
        found
    }

    /// Remove one child edge. Idempotent; the second removal is a no-op.
    pub fn unregister_temporary_macro(&self, child: &MacroId) {
        let mut edges = self.edges.write().unwrap();
        let Some(parent) = edges.parent_of.remove(child) else {
            return;
        };
        if let Some(children) = edges.children_of.get_mut(&parent) {
            children.retain(|id| id != child);
            if children.is_empty() {
                edges.children_of.remove(&parent);
            }
        }
        debug!("Detached temporary macro {} from {}", child, parent);
    }

    /// Remove a macro and cascade to every registered descendant.
    pub fn unregister_macro(&self, id: &MacroId) {
        for child in self.descendants_of(id) {
            self.unregister_temporary_macro(&child);
        }
        self.unregister_temporary_macro(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::MacroKind;

    fn temp(parent: &Macro, name: &str) -> Macro {
        Macro::temporary(parent, name, &format!("function {}()\nend", name))
    }

    #[test]
    fn test_parent_and_children_queries() {
        let manager = MacroHierarchyManager::new();
        let parent = Macro::new("parent", "", MacroKind::Script);
        let child = temp(&parent, "OnLogin");
        manager.register_temporary_macro(&parent.id, &child);

        assert_eq!(manager.parent_of(&child.id), Some(parent.id.clone()));
        assert_eq!(manager.children_of(&parent.id), vec![child.id.clone()]);
    }

    #[test]
    fn test_root_parent_walks_temporary_chain() {
        let manager = MacroHierarchyManager::new();
        let root = Macro::new("root", "", MacroKind::Script);
        let child = temp(&root, "OnUpdate");
        let grandchild = temp(&child, "OnChatMessage");
        manager.register_temporary_macro(&root.id, &child);
        manager.register_temporary_macro(&child.id, &grandchild);

        assert_eq!(manager.root_parent_of(&grandchild.id), Some(root.id.clone()));
        assert_eq!(manager.root_parent_of(&child.id), Some(root.id.clone()));
        assert_eq!(manager.root_parent_of(&root.id), None);
    }

    #[test]
    fn test_unregister_cascades_to_descendants() {
        let manager = MacroHierarchyManager::new();
        let root = Macro::new("root", "", MacroKind::Script);
        let child = temp(&root, "OnUpdate");
        let grandchild = temp(&child, "OnChatMessage");
        manager.register_temporary_macro(&root.id, &child);
        manager.register_temporary_macro(&child.id, &grandchild);

        manager.unregister_macro(&root.id);
        assert!(manager.parent_of(&child.id).is_none());
        assert!(manager.parent_of(&grandchild.id).is_none());
        assert!(manager.children_of(&root.id).is_empty());
    }

    #[test]
    fn test_edge_removed_exactly_once() {
        let manager = MacroHierarchyManager::new();
        let parent = Macro::new("parent", "", MacroKind::Script);
        let child = temp(&parent, "OnLogin");
        manager.register_temporary_macro(&parent.id, &child);
        manager.unregister_temporary_macro(&child.id);
        // Second removal must be a silent no-op.
        manager.unregister_temporary_macro(&child.id);
        assert!(manager.children_of(&parent.id).is_empty());
    }
}
