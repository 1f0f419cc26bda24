use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a running macro. `Ready` is initial; `Completed` and `Error`
/// are terminal and require a brand-new start request to leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MacroState {
    Ready,
    Running,
    Paused,
    Completed,
    Error,
}

impl MacroState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MacroState::Completed | MacroState::Error)
    }

    pub fn can_transition_to(&self, next: MacroState) -> bool {
        match (self, next) {
            (MacroState::Ready, MacroState::Running) => true,
            (MacroState::Running, MacroState::Paused) => true,
            (MacroState::Paused, MacroState::Running) => true,
            (MacroState::Running | MacroState::Paused, MacroState::Completed) => true,
            // Anything short of terminal may fail; Error also overrides a
            // parent's visible state when a child handler dies.
            (current, MacroState::Error) => !current.is_terminal(),
            _ => false,
        }
    }
}

/// Last observed state of a macro, retained after the execution state is torn
/// down so the editor/inspector can still show what happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroStatus {
    pub state: MacroState,
    pub message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl MacroStatus {
    pub fn ready() -> Self {
        Self {
            state: MacroState::Ready,
            message: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_round_trip() {
        assert!(MacroState::Running.can_transition_to(MacroState::Paused));
        assert!(MacroState::Paused.can_transition_to(MacroState::Running));
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        assert!(!MacroState::Completed.can_transition_to(MacroState::Running));
        assert!(!MacroState::Error.can_transition_to(MacroState::Running));
        assert!(!MacroState::Completed.can_transition_to(MacroState::Error));
    }

    #[test]
    fn test_error_reachable_from_any_live_state() {
        assert!(MacroState::Ready.can_transition_to(MacroState::Error));
        assert!(MacroState::Running.can_transition_to(MacroState::Error));
        assert!(MacroState::Paused.can_transition_to(MacroState::Error));
    }
}
