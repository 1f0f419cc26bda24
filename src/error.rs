use crate::macros::MacroId;
use thiserror::Error;

// Main application error type

#[derive(Error, Debug)]
pub enum MacroError {
    #[error("Syntax Error: {0}")]
    Syntax(#[from] SyntaxError),
    #[error("Scheduler Error: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("Engine Error: {0}")]
    Engine(#[from] EngineError),
    #[error("Host Error: {0}")]
    Host(#[from] HostError),
    #[error("Trigger Error: {0}")]
    Trigger(#[from] TriggerError),
    #[error("Setup Error: {0}")]
    Setup(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("`{0}` does not match any trigger event")]
    UnknownEvent(String),
}

/// Malformed command or modifier text. Always local to one line and always
/// carries the offending text; parsing never continues past the first bad
/// line of a macro.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("Unrecognized command line: `{0}`")]
    MalformedLine(String),
    #[error("Invalid modifier `{text}`: {reason}")]
    InvalidModifier { text: String, reason: String },
    #[error("Invalid parameter for /{command}: {reason} (in `{text}`)")]
    InvalidParameter {
        command: String,
        reason: String,
        text: String,
    },
    #[error("Unterminated quote in `{0}`")]
    UnterminatedQuote(String),
    #[error("Unknown virtual key `{0}`")]
    UnknownKey(String),
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Macro `{0}` is already running")]
    AlreadyRunning(MacroId),
    #[error("Macro `{0}` was not found in the library")]
    UnknownMacro(String),
    #[error("No engine accepts the content of macro `{0}`")]
    Unsupported(MacroId),
    #[error("Macro `{0}` failed to parse: {1}")]
    Parse(MacroId, SyntaxError),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Syntax Error: {0}")]
    Syntax(#[from] SyntaxError),
    #[error("Timed out after {waited_ms}ms waiting for {what}")]
    Timeout { what: String, waited_ms: u64 },
    #[error("Host Error: {0}")]
    Host(#[from] HostError),
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Script runtime failed: {0}")]
    Script(String),
}

// Host verb failures surface as EngineError::Host at the engine boundary.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("No target named `{0}` within reach")]
    TargetNotFound(String),
    #[error("Action `{0}` could not be used")]
    ActionFailed(String),
    #[error("UI element `{0}` is not visible")]
    AddonNotVisible(String),
    #[error("No item `{0}` in the inventory")]
    ItemNotFound(String),
    #[error("Recipe `{0}` is not known")]
    UnknownRecipe(String),
    #[error("Host session is shutting down")]
    Unavailable,
}
