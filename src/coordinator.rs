use crate::config::Configuration;
use crate::engine::{ScriptEngine, ScriptRuntimeFactory};
use crate::error::MacroError;
use crate::host::{FrameLoop, HostGateway};
use crate::library::{InMemoryLibrary, MacroLibrary};
use crate::scheduler::MacroScheduler;
use crate::triggers::{TriggerEvent, TriggerEventManager};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Ties the host-update loop, the scheduler, and the trigger manager into
/// one owned unit with a single cancellation token.
pub struct Coordinator {
    scheduler: Arc<MacroScheduler>,
    triggers: Arc<TriggerEventManager>,
    frame_loop: FrameLoop,
    cancel_token: CancellationToken,
    update_task: Option<tokio::task::JoinHandle<()>>,
}

impl Coordinator {
    fn new(
        configuration: Configuration,
        host: Arc<dyn HostGateway>,
        library: Arc<dyn MacroLibrary>,
        script_factory: Box<dyn ScriptRuntimeFactory>,
    ) -> Self {
        let cancel_token = CancellationToken::new();
        let (frame_loop, frame) =
            FrameLoop::start(Duration::from_millis(configuration.frame_tick_ms.max(1)));
        let config = Arc::new(configuration);
        let scheduler = MacroScheduler::new(
            host,
            frame,
            library,
            ScriptEngine::new(script_factory),
            config.clone(),
        );
        let triggers = Arc::new(TriggerEventManager::new(scheduler.clone()));
        let update_task = config
            .raise_update_events
            .then(|| Self::start_update_task(triggers.clone(), cancel_token.clone(), &config));
        Self {
            scheduler,
            triggers,
            frame_loop,
            cancel_token,
            update_task,
        }
    }

    /// Raise the generic per-tick update event alongside the frame loop.
    fn start_update_task(
        triggers: Arc<TriggerEventManager>,
        cancel_token: CancellationToken,
        config: &Configuration,
    ) -> tokio::task::JoinHandle<()> {
        let tick = Duration::from_millis(config.frame_tick_ms.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = interval.tick() => {
                        triggers.raise_trigger_event(TriggerEvent::OnUpdate, None).await;
                    }
                }
            }
        })
    }

    pub fn scheduler(&self) -> Arc<MacroScheduler> {
        self.scheduler.clone()
    }

    pub fn triggers(&self) -> Arc<TriggerEventManager> {
        self.triggers.clone()
    }

    /// Orderly shutdown: stop raising events, stop every macro and wait for
    /// teardown, then join the frame thread.
    pub async fn stop(&mut self) {
        info!("Coordinator stopping");
        self.cancel_token.cancel();
        if let Some(task) = self.update_task.take() {
            let _ = task.await;
        }
        self.scheduler.stop_all_macros().await;
        self.frame_loop.stop();
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        if let Some(task) = self.update_task.take() {
            task.abort();
        }
    }
}

pub struct CoordinatorBuilder {
    configuration: Configuration,
    host: Option<Arc<dyn HostGateway>>,
    library: Option<Arc<dyn MacroLibrary>>,
    script_factory: Option<Box<dyn ScriptRuntimeFactory>>,
}

impl CoordinatorBuilder {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            host: None,
            library: None,
            script_factory: None,
        }
    }

    pub fn host(mut self, host: Arc<dyn HostGateway>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn library(mut self, library: Arc<dyn MacroLibrary>) -> Self {
        self.library = Some(library);
        self
    }

    pub fn script_runtime(mut self, factory: Box<dyn ScriptRuntimeFactory>) -> Self {
        self.script_factory = Some(factory);
        self
    }

    // Overrides the frame tick from the loaded configuration.
    pub fn frame_tick_ms(mut self, frame_tick_ms: u64) -> Self {
        self.configuration.frame_tick_ms = frame_tick_ms;
        self
    }

    // Enables the per-tick update trigger, this will override the loaded
    // configuration.
    pub fn raise_update_events(mut self, raise: bool) -> Self {
        self.configuration.raise_update_events = raise;
        self
    }

    pub fn build(self) -> Result<Coordinator, MacroError> {
        let host = self
            .host
            .ok_or(MacroError::Setup("Host gateway not set".to_string()))?;
        let library = self
            .library
            .unwrap_or_else(|| Arc::new(InMemoryLibrary::new()));
        let script_factory = self
            .script_factory
            .unwrap_or_else(crate::engine::LineScriptRuntime::factory);
        Ok(Coordinator::new(
            self.configuration,
            host,
            library,
            script_factory,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SimulatedHost;
    use crate::macros::{Macro, MacroKind};

    #[tokio::test]
    async fn test_build_requires_host() {
        let result = CoordinatorBuilder::new(Configuration::default()).build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_update_trigger_reinvokes_registered_macro() {
        let host = Arc::new(SimulatedHost::new());
        let mut coordinator = CoordinatorBuilder::new(Configuration::default())
            .host(host.clone())
            .frame_tick_ms(10)
            .raise_update_events(true)
            .build()
            .expect("Failed to build coordinator");

        let definition = Macro::new("ticker", "/interact", MacroKind::Native);
        coordinator
            .triggers()
            .register_trigger(&definition, TriggerEvent::OnUpdate);
        tokio::time::sleep(Duration::from_millis(100)).await;
        coordinator.stop().await;
        // Re-invoked on successive ticks once the prior run finished.
        assert!(host.calls().len() >= 2);
    }

    #[tokio::test]
    async fn test_stop_is_clean_with_running_macro() {
        let host = Arc::new(SimulatedHost::new());
        let mut coordinator = CoordinatorBuilder::new(Configuration::default())
            .host(host)
            .build()
            .expect("Failed to build coordinator");
        let scheduler = coordinator.scheduler();
        let definition = Macro::new("waiter", "/wait 30", MacroKind::Native);
        scheduler.start_macro(definition, None).await.unwrap();
        coordinator.stop().await;
        assert!(scheduler.get_macros().is_empty());
    }
}
