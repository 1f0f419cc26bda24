use crate::triggers::TriggerEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Identity of a macro. Stable across runs for persisted macros; temporary
/// macros get a synthesized `<parentId>_<functionName>_<uniqueSuffix>` id so
/// concurrent occurrences of the same trigger never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacroId(String);

impl MacroId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn named(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn temporary(parent: &MacroId, function_name: &str) -> Self {
        Self(format!(
            "{}_{}_{}",
            parent.0,
            function_name,
            Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MacroId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MacroId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MacroKind {
    /// Constrained command vocabulary, one `/command` per line.
    Native,
    /// Embedded scripting dialect that yields native command lines.
    Script,
}

/// Typed config value attached to a macro by the editor collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MacroMetadata {
    /// Trigger events the whole macro is subscribed to.
    pub triggers: Vec<TriggerEvent>,
    /// Extra whole-macro repetitions after the first run.
    pub repeat: u32,
    /// Delay between whole-macro repetitions.
    pub loop_delay_ms: u64,
    pub settings: HashMap<String, MetadataValue>,
}

/// A named, persisted unit of automation source text plus metadata. The core
/// reads `content`/`metadata`/`kind`; editing and persistence belong to the
/// external editor and config store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Macro {
    pub id: MacroId,
    pub name: String,
    pub content: String,
    pub kind: MacroKind,
    pub metadata: MacroMetadata,
    /// Set for transient macros synthesized from a trigger-matched function
    /// body or a cleanup routine. Never persisted.
    pub temporary: bool,
}

impl Macro {
    pub fn new(name: impl Into<String>, content: impl Into<String>, kind: MacroKind) -> Self {
        Self {
            id: MacroId::new(),
            name: name.into(),
            content: content.into(),
            kind,
            metadata: MacroMetadata::default(),
            temporary: false,
        }
    }

    pub fn with_id(mut self, id: MacroId) -> Self {
        self.id = id;
        self
    }

    pub fn with_metadata(mut self, metadata: MacroMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Package one extracted function body into a transient macro. The body
    /// keeps the function definition and gains a trailing self-invocation so
    /// the script engine actually runs it.
    pub fn temporary(parent: &Macro, function_name: &str, body: &str) -> Self {
        Self {
            id: MacroId::temporary(&parent.id, function_name),
            name: format!("{} [{}]", parent.name, function_name),
            content: format!("{}\n{}()\n", body.trim_end(), function_name),
            kind: parent.kind,
            metadata: MacroMetadata::default(),
            temporary: true,
        }
    }
}
