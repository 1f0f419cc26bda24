use serde::Deserialize;

/// What happens when a conditional guard is still unsatisfied at its
/// max-wait ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardTimeoutBehavior {
    /// Skip the guarded command and keep walking.
    Skip,
    /// Fail the macro with a timeout error.
    Fail,
}

/// What happens when a start request names a macro id that already has an
/// execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateStartPolicy {
    Reject,
    /// Tear the running copy down first, then start fresh.
    Restart,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Cycle time of the designated host-update thread.
    pub frame_tick_ms: u64,
    /// Poll interval while waiting on condition guards and UI elements.
    pub condition_poll_ms: u64,
    /// Ceiling for guard polls that carry no explicit `<maxwait>`.
    pub default_max_wait_ms: u64,
    pub guard_timeout: GuardTimeoutBehavior,
    pub duplicate_start: DuplicateStartPolicy,
    /// Whether stopping a parent macro cascades to its live children.
    pub cascade_stop_children: bool,
    /// Raise the per-tick update trigger from the coordinator's frame loop.
    pub raise_update_events: bool,
    pub event_buffer_size: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            frame_tick_ms: 50,
            condition_poll_ms: 250,
            default_max_wait_ms: 5000,
            guard_timeout: GuardTimeoutBehavior::Skip,
            duplicate_start: DuplicateStartPolicy::Reject,
            cascade_stop_children: true,
            raise_update_events: false,
            event_buffer_size: 64,
        }
    }
}

impl Configuration {
    /// Layer an optional `macrobot` config file and `MACROBOT_*` environment
    /// variables over the defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("macrobot").required(false))
            .add_source(config::Environment::with_prefix("MACROBOT"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let configuration = Configuration::default();
        assert_eq!(configuration.guard_timeout, GuardTimeoutBehavior::Skip);
        assert_eq!(configuration.duplicate_start, DuplicateStartPolicy::Reject);
        assert!(configuration.cascade_stop_children);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let configuration = Configuration::load().expect("load failed");
        assert_eq!(configuration.frame_tick_ms, 50);
    }
}
