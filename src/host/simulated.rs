use crate::error::HostError;
use crate::host::{HostGateway, KeyState, TargetOptions};
use crate::parser::{CallbackValue, KeyChord};
use std::collections::HashSet;
use std::sync::Mutex;

/// One recorded host verb invocation, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Target(String),
    Action(String),
    Click(String),
    Key(KeyChord, KeyState),
    Equip(u32),
    Interact,
    Recipe(String),
    Callback(String, bool, Vec<CallbackValue>),
    Native(String),
    Echo(String),
}

#[derive(Debug, Default)]
struct SimulatedState {
    conditions: HashSet<String>,
    visible_addons: HashSet<String>,
    known_recipes: HashSet<String>,
    action_pending: bool,
    zone_id: u32,
    logged_in: bool,
    calls: Vec<HostCall>,
}

/// Scriptable in-memory host session. Tests and the demo binary flip its
/// flags to stand in for the live client; every verb call is recorded.
#[derive(Debug, Default)]
pub struct SimulatedHost {
    state: Mutex<SimulatedState>,
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_condition(&self, name: &str, active: bool) {
        let mut state = self.state.lock().unwrap();
        if active {
            state.conditions.insert(name.to_ascii_lowercase());
        } else {
            state.conditions.remove(&name.to_ascii_lowercase());
        }
    }

    pub fn set_addon_visible(&self, name: &str, visible: bool) {
        let mut state = self.state.lock().unwrap();
        if visible {
            state.visible_addons.insert(name.to_string());
        } else {
            state.visible_addons.remove(name);
        }
    }

    pub fn add_recipe(&self, name: &str) {
        self.state.lock().unwrap().known_recipes.insert(name.to_string());
    }

    pub fn set_action_pending(&self, pending: bool) {
        self.state.lock().unwrap().action_pending = pending;
    }

    pub fn set_zone(&self, zone_id: u32) {
        self.state.lock().unwrap().zone_id = zone_id;
    }

    pub fn set_logged_in(&self, logged_in: bool) {
        self.state.lock().unwrap().logged_in = logged_in;
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: HostCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl HostGateway for SimulatedHost {
    fn target(&self, name: &str, _options: &TargetOptions) -> Result<(), HostError> {
        self.record(HostCall::Target(name.to_string()));
        Ok(())
    }

    fn use_action(&self, name: &str) -> Result<(), HostError> {
        self.record(HostCall::Action(name.to_string()));
        Ok(())
    }

    fn click(&self, element: &str, _options: &TargetOptions) -> Result<(), HostError> {
        if !self.addon_visible(element) {
            return Err(HostError::AddonNotVisible(element.to_string()));
        }
        self.record(HostCall::Click(element.to_string()));
        Ok(())
    }

    fn send_key(&self, chord: &KeyChord, state: KeyState) -> Result<(), HostError> {
        self.record(HostCall::Key(chord.clone(), state));
        Ok(())
    }

    fn equip_item(&self, item_id: u32, _high_quality: bool) -> Result<(), HostError> {
        self.record(HostCall::Equip(item_id));
        Ok(())
    }

    fn interact(&self) -> Result<(), HostError> {
        self.record(HostCall::Interact);
        Ok(())
    }

    fn open_recipe(&self, name: &str) -> Result<(), HostError> {
        let known = self.state.lock().unwrap().known_recipes.contains(name);
        if !known {
            return Err(HostError::UnknownRecipe(name.to_string()));
        }
        self.record(HostCall::Recipe(name.to_string()));
        Ok(())
    }

    fn fire_callback(
        &self,
        addon: &str,
        update: bool,
        values: &[CallbackValue],
    ) -> Result<(), HostError> {
        self.record(HostCall::Callback(addon.to_string(), update, values.to_vec()));
        Ok(())
    }

    fn run_native(&self, line: &str) -> Result<(), HostError> {
        self.record(HostCall::Native(line.to_string()));
        Ok(())
    }

    fn echo(&self, message: &str) {
        self.record(HostCall::Echo(message.to_string()));
    }

    fn addon_visible(&self, name: &str) -> bool {
        self.state.lock().unwrap().visible_addons.contains(name)
    }

    fn condition_active(&self, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .conditions
            .contains(&name.to_ascii_lowercase())
    }

    fn action_pending(&self) -> bool {
        self.state.lock().unwrap().action_pending
    }

    fn zone_id(&self) -> u32 {
        self.state.lock().unwrap().zone_id
    }

    fn logged_in(&self) -> bool {
        self.state.lock().unwrap().logged_in
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_flags_are_case_insensitive() {
        let host = SimulatedHost::new();
        host.set_condition("Crafting", true);
        assert!(host.condition_active("crafting"));
        host.set_condition("crafting", false);
        assert!(!host.condition_active("Crafting"));
    }

    #[test]
    fn test_click_requires_visible_addon() {
        let host = SimulatedHost::new();
        assert!(host.click("RecipeNote", &TargetOptions::default()).is_err());
        host.set_addon_visible("RecipeNote", true);
        assert!(host.click("RecipeNote", &TargetOptions::default()).is_ok());
        assert_eq!(host.calls(), vec![HostCall::Click("RecipeNote".to_string())]);
    }
}
