pub mod definition;
pub mod state;

pub use definition::{Macro, MacroId, MacroKind, MacroMetadata, MetadataValue};
pub use state::{MacroState, MacroStatus};
