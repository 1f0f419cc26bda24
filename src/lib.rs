pub mod cleanup;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod host;
pub mod library;
pub mod macros;
pub mod parser;
pub mod scheduler;
pub mod triggers;

pub use error::{EngineError, HostError, MacroError, SchedulerError, SyntaxError, TriggerError};

pub use config::Configuration;
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use macros::{Macro, MacroId, MacroKind, MacroState};
pub use parser::MacroParser;
pub use scheduler::{MacroScheduler, SchedulerEvent};
pub use triggers::{TriggerEvent, TriggerEventManager, TriggerPayload};
