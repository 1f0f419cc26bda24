pub mod frame;
pub mod simulated;

pub use frame::{FrameExecutor, FrameLoop};
pub use simulated::{HostCall, SimulatedHost};

use crate::error::HostError;
use crate::parser::{CallbackValue, KeyChord, ModifierSet};

/// How a key chord is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Press,
    Hold,
    Release,
}

/// Disambiguation options distilled from a command's modifier set and passed
/// to the host verbs that resolve names against live state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TargetOptions {
    pub index: Option<u32>,
    pub list_index: Option<u32>,
    pub party_slot: Option<u8>,
    pub max_distance: Option<f32>,
    pub high_quality: bool,
}

impl TargetOptions {
    pub fn from_modifiers(modifiers: &ModifierSet) -> Self {
        Self {
            index: modifiers.index.map(|m| m.index),
            list_index: modifiers.list_index.map(|m| m.index),
            party_slot: modifiers.party_slot.map(|m| m.slot),
            max_distance: modifiers.distance.map(|m| m.distance),
            high_quality: modifiers.high_quality,
        }
    }
}

/// The opaque host capability surface the native interpreter calls into.
/// Verbs mutate live session state and are marshalled onto the host-update
/// thread by the engine; queries are cheap reads and run inline. The live
/// session shares no transactional isolation between concurrently running
/// macros; only the core's own bookkeeping is synchronized.
pub trait HostGateway: Send + Sync {
    fn target(&self, name: &str, options: &TargetOptions) -> Result<(), HostError>;
    fn use_action(&self, name: &str) -> Result<(), HostError>;
    fn click(&self, element: &str, options: &TargetOptions) -> Result<(), HostError>;
    fn send_key(&self, chord: &KeyChord, state: KeyState) -> Result<(), HostError>;
    fn equip_item(&self, item_id: u32, high_quality: bool) -> Result<(), HostError>;
    fn interact(&self) -> Result<(), HostError>;
    fn open_recipe(&self, name: &str) -> Result<(), HostError>;
    fn fire_callback(
        &self,
        addon: &str,
        update: bool,
        values: &[CallbackValue],
    ) -> Result<(), HostError>;
    /// Forward an unrecognized command line verbatim.
    fn run_native(&self, line: &str) -> Result<(), HostError>;
    fn echo(&self, message: &str);

    fn addon_visible(&self, name: &str) -> bool;
    fn condition_active(&self, name: &str) -> bool;
    /// Whether the last queued action is still awaiting host acknowledgement.
    fn action_pending(&self) -> bool;
    fn zone_id(&self) -> u32;
    fn logged_in(&self) -> bool;
}
