use crate::error::TriggerError;
use crate::macros::{Macro, MacroId};
use crate::scheduler::MacroScheduler;
use crate::triggers::{extractor, TriggerEvent, TriggerPayload};
use indexmap::IndexMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// One registered handler: a macro, an optional function name, and the event
/// it answers to. An empty function name means the whole macro is the
/// handler; otherwise only that function's body runs, packaged as a
/// temporary macro per occurrence.
#[derive(Debug, Clone)]
pub struct TriggerFunction {
    pub definition: Macro,
    pub function_name: Option<String>,
    pub event: TriggerEvent,
}

/// Maps host events to their registered handlers and fans occurrences out.
/// One failing handler never blocks dispatch to the rest.
pub struct TriggerEventManager {
    scheduler: Arc<MacroScheduler>,
    handlers: RwLock<IndexMap<TriggerEvent, Vec<TriggerFunction>>>,
}

impl TriggerEventManager {
    pub fn new(scheduler: Arc<MacroScheduler>) -> Self {
        Self {
            scheduler,
            handlers: RwLock::new(IndexMap::new()),
        }
    }

    /// Subscribe a whole macro to an event.
    pub fn register_trigger(&self, definition: &Macro, event: TriggerEvent) {
        let mut handlers = self.handlers.write().unwrap();
        let entries = handlers.entry(event).or_default();
        if entries
            .iter()
            .any(|h| h.definition.id == definition.id && h.function_name.is_none())
        {
            return;
        }
        debug!("Macro {} subscribed to {}", definition.id, event);
        entries.push(TriggerFunction {
            definition: definition.clone(),
            function_name: None,
            event,
        });
    }

    pub fn unregister_trigger(&self, id: &MacroId, event: TriggerEvent) {
        if let Some(entries) = self.handlers.write().unwrap().get_mut(&event) {
            entries.retain(|h| !(h.definition.id == *id && h.function_name.is_none()));
        }
    }

    /// Subscribe one named function inside a macro. The name must match a
    /// trigger event value, case-insensitively.
    pub fn register_function_trigger(
        &self,
        definition: &Macro,
        function_name: &str,
    ) -> Result<TriggerEvent, TriggerError> {
        let event = TriggerEvent::from_name(function_name)
            .ok_or_else(|| TriggerError::UnknownEvent(function_name.to_string()))?;
        let mut handlers = self.handlers.write().unwrap();
        let entries = handlers.entry(event).or_default();
        if entries.iter().any(|h| {
            h.definition.id == definition.id
                && h.function_name.as_deref() == Some(function_name)
        }) {
            return Ok(event);
        }
        debug!(
            "Function {} of macro {} subscribed to {}",
            function_name, definition.id, event
        );
        entries.push(TriggerFunction {
            definition: definition.clone(),
            function_name: Some(function_name.to_string()),
            event,
        });
        Ok(event)
    }

    pub fn unregister_function_trigger(&self, id: &MacroId, function_name: &str) {
        if let Some(event) = TriggerEvent::from_name(function_name) {
            if let Some(entries) = self.handlers.write().unwrap().get_mut(&event) {
                entries.retain(|h| {
                    !(h.definition.id == *id
                        && h.function_name.as_deref() == Some(function_name))
                });
            }
        }
    }

    /// Subscribe a macro to everything its metadata declares, plus every
    /// embedded function whose name matches a trigger event.
    pub fn register_macro(&self, definition: &Macro) {
        for event in definition.metadata.triggers.clone() {
            self.register_trigger(definition, event);
        }
        for event in TriggerEvent::ALL {
            if extractor::find_function(&definition.content, event.as_str()).is_some() {
                let _ = self.register_function_trigger(definition, event.as_str());
            }
        }
    }

    /// Drop every subscription held by a macro.
    pub fn unregister_macro(&self, id: &MacroId) {
        for entries in self.handlers.write().unwrap().values_mut() {
            entries.retain(|h| h.definition.id != *id);
        }
    }

    /// Fan one occurrence out to every registered handler. Extraction or
    /// start failure of one handler is logged and skipped.
    pub async fn raise_trigger_event(&self, event: TriggerEvent, payload: Option<TriggerPayload>) {
        let handlers: Vec<TriggerFunction> = self
            .handlers
            .read()
            .unwrap()
            .get(&event)
            .cloned()
            .unwrap_or_default();
        if handlers.is_empty() {
            return;
        }
        debug!("Raising {} to {} handler(s)", event, handlers.len());
        for handler in handlers {
            match &handler.function_name {
                None => {
                    if let Err(e) = self
                        .scheduler
                        .start_macro(handler.definition.clone(), payload.clone())
                        .await
                    {
                        debug!(
                            "Handler macro {} not started for {}: {}",
                            handler.definition.id, event, e
                        );
                    }
                }
                Some(function_name) => {
                    self.dispatch_function(&handler, function_name, payload.clone())
                        .await;
                }
            }
        }
    }

    async fn dispatch_function(
        &self,
        handler: &TriggerFunction,
        function_name: &str,
        payload: Option<TriggerPayload>,
    ) {
        let Some(body) = extractor::find_function(&handler.definition.content, function_name)
        else {
            warn!(
                "Function {} not found in macro {}, handler skipped",
                function_name, handler.definition.id
            );
            return;
        };
        let child = Macro::temporary(&handler.definition, function_name, &body);
        let child_id = child.id.clone();
        let hierarchy = self.scheduler.hierarchy();
        hierarchy.register_temporary_macro(&handler.definition.id, &child);
        if let Err(e) = self.scheduler.start_macro(child, payload).await {
            warn!(
                "Handler {} of macro {} failed to start: {}",
                function_name, handler.definition.id, e
            );
            hierarchy.unregister_temporary_macro(&child_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::engine::ScriptEngine;
    use crate::host::{FrameLoop, HostCall, SimulatedHost};
    use crate::library::InMemoryLibrary;
    use crate::macros::{MacroKind, MacroState};
    use std::time::Duration;

    struct Fixture {
        host: Arc<SimulatedHost>,
        scheduler: Arc<MacroScheduler>,
        manager: TriggerEventManager,
        _frame_loop: FrameLoop,
    }

    fn fixture() -> Fixture {
        let host = Arc::new(SimulatedHost::new());
        let (frame_loop, frame) = FrameLoop::start(Duration::from_millis(1));
        let mut config = Configuration::default();
        config.condition_poll_ms = 5;
        config.default_max_wait_ms = 50;
        let scheduler = MacroScheduler::new(
            host.clone(),
            frame,
            Arc::new(InMemoryLibrary::new()),
            ScriptEngine::with_line_runtime(),
            Arc::new(config),
        );
        let manager = TriggerEventManager::new(scheduler.clone());
        Fixture {
            host,
            scheduler,
            manager,
            _frame_loop: frame_loop,
        }
    }

    async fn settle(fx: &Fixture) {
        for _ in 0..100 {
            if fx.scheduler.get_macros().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_function_name_must_match_an_event() {
        let fx = fixture();
        let definition = Macro::new("m", "function Helper()\nend", MacroKind::Script);
        assert!(matches!(
            fx.manager.register_function_trigger(&definition, "Helper"),
            Err(TriggerError::UnknownEvent(_))
        ));
        assert_eq!(
            fx.manager
                .register_function_trigger(&definition, "onlogin")
                .unwrap(),
            TriggerEvent::OnLogin
        );
    }

    #[tokio::test]
    async fn test_whole_macro_handler_starts_on_event() {
        let fx = fixture();
        let definition = Macro::new("greeter", "/interact", MacroKind::Native);
        fx.manager.register_trigger(&definition, TriggerEvent::OnLogin);
        fx.manager
            .raise_trigger_event(TriggerEvent::OnLogin, None)
            .await;
        settle(&fx).await;
        assert_eq!(fx.host.calls(), vec![HostCall::Interact]);
    }

    #[tokio::test]
    async fn test_function_handler_runs_extracted_body() {
        let fx = fixture();
        let definition = Macro::new(
            "chatty",
            "function OnChatMessage()\n  /target Dummy\nend\n",
            MacroKind::Script,
        );
        fx.manager
            .register_function_trigger(&definition, "OnChatMessage")
            .unwrap();
        fx.manager
            .raise_trigger_event(
                TriggerEvent::OnChatMessage,
                Some(TriggerPayload::chat("Alice", "hello")),
            )
            .await;
        settle(&fx).await;
        assert_eq!(fx.host.calls(), vec![HostCall::Target("Dummy".to_string())]);
    }

    #[tokio::test]
    async fn test_concurrent_occurrences_get_distinct_ids() {
        let fx = fixture();
        let definition = Macro::new(
            "slow",
            "function OnZoneChange()\n  /wait 0.1\nend\n",
            MacroKind::Script,
        );
        fx.manager
            .register_function_trigger(&definition, "OnZoneChange")
            .unwrap();
        fx.manager
            .raise_trigger_event(TriggerEvent::OnZoneChange, None)
            .await;
        fx.manager
            .raise_trigger_event(TriggerEvent::OnZoneChange, None)
            .await;
        // Both temporary macros are live at once under different ids.
        let running = fx.scheduler.get_macros();
        assert_eq!(running.len(), 2);
        assert_ne!(running[0].id, running[1].id);
        fx.scheduler.stop_all_macros().await;
    }

    #[tokio::test]
    async fn test_missing_function_skips_without_blocking_others() {
        let fx = fixture();
        let broken = Macro::new("broken", "-- no function here", MacroKind::Script);
        let working = Macro::new("working", "/interact", MacroKind::Native);
        // Register by hand so the missing function is only discovered at
        // dispatch time.
        fx.manager
            .handlers
            .write()
            .unwrap()
            .entry(TriggerEvent::OnLogout)
            .or_default()
            .push(TriggerFunction {
                definition: broken,
                function_name: Some("OnLogout".to_string()),
                event: TriggerEvent::OnLogout,
            });
        fx.manager.register_trigger(&working, TriggerEvent::OnLogout);
        fx.manager
            .raise_trigger_event(TriggerEvent::OnLogout, None)
            .await;
        settle(&fx).await;
        assert_eq!(fx.host.calls(), vec![HostCall::Interact]);
    }

    #[tokio::test]
    async fn test_child_error_forces_root_ancestor_into_error() {
        let fx = fixture();
        let definition = Macro::new(
            "parent",
            "function OnConditionChange()\n  /wait abc\nend\n",
            MacroKind::Script,
        );
        let parent_id = definition.id.clone();
        fx.manager
            .register_function_trigger(&definition, "OnConditionChange")
            .unwrap();
        fx.manager
            .raise_trigger_event(
                TriggerEvent::OnConditionChange,
                Some(TriggerPayload::condition("crafting", true)),
            )
            .await;
        for _ in 0..200 {
            if fx.scheduler.get_macro_state(&parent_id) == Some(MacroState::Error) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(
            fx.scheduler.get_macro_state(&parent_id),
            Some(MacroState::Error)
        );
        let status = fx.scheduler.status(&parent_id).unwrap();
        assert!(status.message.unwrap().contains("child macro"));
    }

    #[tokio::test]
    async fn test_register_macro_picks_up_metadata_and_functions() {
        let fx = fixture();
        let mut definition = Macro::new(
            "full",
            "function OnLogin()\n  /interact\nend\n",
            MacroKind::Script,
        );
        definition.metadata.triggers.push(TriggerEvent::OnZoneChange);
        fx.manager.register_macro(&definition);

        let handlers = fx.manager.handlers.read().unwrap();
        assert_eq!(handlers.get(&TriggerEvent::OnZoneChange).unwrap().len(), 1);
        assert_eq!(handlers.get(&TriggerEvent::OnLogin).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unregister_macro_drops_all_subscriptions() {
        let fx = fixture();
        let definition = Macro::new(
            "full",
            "function OnLogin()\nend\n",
            MacroKind::Script,
        );
        fx.manager.register_trigger(&definition, TriggerEvent::OnUpdate);
        fx.manager
            .register_function_trigger(&definition, "OnLogin")
            .unwrap();
        fx.manager.unregister_macro(&definition.id);
        let handlers = fx.manager.handlers.read().unwrap();
        assert!(handlers.values().all(|entries| entries.is_empty()));
    }
}
