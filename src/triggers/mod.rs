pub mod event_manager;
pub mod extractor;

pub use event_manager::{TriggerEventManager, TriggerFunction};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Closed set of host-originated occurrences a macro or macro function may
/// subscribe to. Exactly one dispatch entry set exists per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerEvent {
    /// Generic per-tick update from the host frame loop.
    OnUpdate,
    OnLogin,
    OnLogout,
    OnZoneChange,
    OnConditionChange,
    OnChatMessage,
    /// UI element lifecycle callback (setup/refresh/teardown).
    OnAddonEvent,
    /// Product-specific external hook fired after per-character automation.
    OnCharacterPostProcess,
}

impl TriggerEvent {
    pub const ALL: [TriggerEvent; 8] = [
        TriggerEvent::OnUpdate,
        TriggerEvent::OnLogin,
        TriggerEvent::OnLogout,
        TriggerEvent::OnZoneChange,
        TriggerEvent::OnConditionChange,
        TriggerEvent::OnChatMessage,
        TriggerEvent::OnAddonEvent,
        TriggerEvent::OnCharacterPostProcess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerEvent::OnUpdate => "OnUpdate",
            TriggerEvent::OnLogin => "OnLogin",
            TriggerEvent::OnLogout => "OnLogout",
            TriggerEvent::OnZoneChange => "OnZoneChange",
            TriggerEvent::OnConditionChange => "OnConditionChange",
            TriggerEvent::OnChatMessage => "OnChatMessage",
            TriggerEvent::OnAddonEvent => "OnAddonEvent",
            TriggerEvent::OnCharacterPostProcess => "OnCharacterPostProcess",
        }
    }

    /// Case-insensitive resolution, used when a function name registers as a
    /// trigger handler.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload forwarded to handlers when an event fires.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerPayload {
    pub sender: Option<String>,
    pub message: Option<String>,
    pub zone_id: Option<u32>,
    pub condition: Option<String>,
    pub condition_value: Option<bool>,
    pub addon: Option<String>,
    pub values: HashMap<String, serde_json::Value>,
}

impl TriggerPayload {
    pub fn chat(sender: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sender: Some(sender.into()),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn zone(zone_id: u32) -> Self {
        Self {
            zone_id: Some(zone_id),
            ..Self::default()
        }
    }

    pub fn condition(name: impl Into<String>, value: bool) -> Self {
        Self {
            condition: Some(name.into()),
            condition_value: Some(value),
            ..Self::default()
        }
    }

    pub fn addon(name: impl Into<String>) -> Self {
        Self {
            addon: Some(name.into()),
            ..Self::default()
        }
    }
}
