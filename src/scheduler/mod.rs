pub mod execution;

pub use execution::{LoopControls, MacroExecutionState, PauseGate};

use crate::cleanup::{CleanupManager, CleanupReason};
use crate::config::{Configuration, DuplicateStartPolicy};
use crate::engine::{
    Engine, EngineEvent, ExecutionContext, NativeEngine, RunOutcome, ScriptEngine, StartRequest,
};
use crate::error::{EngineError, SchedulerError};
use crate::hierarchy::MacroHierarchyManager;
use crate::host::{FrameExecutor, HostGateway};
use crate::library::MacroLibrary;
use crate::macros::{Macro, MacroId, MacroKind, MacroState, MacroStatus};
use crate::triggers::TriggerPayload;
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Public notifications re-published to the rest of the application. This is
/// the observer channel; internal completion bookkeeping rides on the run
/// task itself, never on these events.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    StateChanged {
        id: MacroId,
        old: MacroState,
        new: MacroState,
    },
    ErrorRaised {
        id: MacroId,
        message: String,
    },
    CleanupRequested {
        id: MacroId,
        reason: CleanupReason,
    },
}

type ExecutionMap = Arc<Mutex<HashMap<MacroId, MacroExecutionState>>>;
type StatusMap = Arc<Mutex<HashMap<MacroId, MacroStatus>>>;

/// The orchestration root: owns the concurrent map of running macros,
/// dispatches to the correct engine, serializes control requests, and
/// re-publishes engine events.
pub struct MacroScheduler {
    native: Arc<NativeEngine>,
    script: Arc<ScriptEngine>,
    executions: ExecutionMap,
    statuses: StatusMap,
    events: broadcast::Sender<SchedulerEvent>,
    hierarchy: Arc<MacroHierarchyManager>,
    cleanup: Arc<CleanupManager>,
    library: Arc<dyn MacroLibrary>,
    host: Arc<dyn HostGateway>,
    frame: FrameExecutor,
    config: Arc<Configuration>,
    start_tx: mpsc::Sender<StartRequest>,
}

impl MacroScheduler {
    pub fn new(
        host: Arc<dyn HostGateway>,
        frame: FrameExecutor,
        library: Arc<dyn MacroLibrary>,
        script_engine: ScriptEngine,
        config: Arc<Configuration>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(config.event_buffer_size.max(1));
        let (start_tx, start_rx) = mpsc::channel(config.event_buffer_size.max(1));
        let scheduler = Arc::new(Self {
            native: Arc::new(NativeEngine::new()),
            script: Arc::new(script_engine),
            executions: Arc::new(Mutex::new(HashMap::new())),
            statuses: Arc::new(Mutex::new(HashMap::new())),
            events,
            hierarchy: Arc::new(MacroHierarchyManager::new()),
            cleanup: Arc::new(CleanupManager::new()),
            library,
            host,
            frame,
            config,
            start_tx,
        });
        Self::spawn_start_drain(Arc::downgrade(&scheduler), start_rx);
        scheduler
    }

    /// Queued start requests come from the run-sub-macro command and from
    /// cleanup dispatch; they must not block the requesting macro's task.
    fn spawn_start_drain(scheduler: Weak<Self>, mut start_rx: mpsc::Receiver<StartRequest>) {
        tokio::spawn(async move {
            while let Some(request) = start_rx.recv().await {
                let Some(scheduler) = scheduler.upgrade() else {
                    break;
                };
                let name = request.definition.name.clone();
                let id = request.definition.id.clone();
                let temporary = request.definition.temporary;
                if let Err(e) = scheduler
                    .start_macro(request.definition, request.args)
                    .await
                {
                    warn!("Queued start of `{}` rejected: {}", name, e);
                    if temporary {
                        scheduler.hierarchy.unregister_temporary_macro(&id);
                    }
                }
            }
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    pub fn hierarchy(&self) -> Arc<MacroHierarchyManager> {
        self.hierarchy.clone()
    }

    pub fn cleanup_manager(&self) -> Arc<CleanupManager> {
        self.cleanup.clone()
    }

    /// Route ad-hoc content to the dialect whose engine claims it.
    pub fn detect_kind(&self, content: &str) -> MacroKind {
        if self.native.can_execute(content) {
            MacroKind::Native
        } else {
            MacroKind::Script
        }
    }

    fn engine_for(&self, kind: MacroKind) -> Arc<dyn Engine> {
        match kind {
            MacroKind::Native => self.native.clone(),
            MacroKind::Script => self.script.clone(),
        }
    }

    /// Accept a start request: enforce the one-execution-per-id guarantee,
    /// validate the source before the macro can reach `Running`, then spawn
    /// the run task and its monitor. Runtime failures never unwind out of
    /// here; they surface as an `Error` state transition.
    pub async fn start_macro(
        &self,
        definition: Macro,
        args: Option<TriggerPayload>,
    ) -> Result<(), SchedulerError> {
        let id = definition.id.clone();

        let prior = {
            let mut executions = self.executions.lock().unwrap();
            match self.config.duplicate_start {
                DuplicateStartPolicy::Reject => {
                    if executions.contains_key(&id) {
                        return Err(SchedulerError::AlreadyRunning(id));
                    }
                    None
                }
                DuplicateStartPolicy::Restart => executions.remove(&id),
            }
        };
        if let Some(prior) = prior {
            info!("Restart policy tearing down running copy of {}", id);
            prior.stop();
            let _ = prior.monitor.await;
        }

        let engine = self.engine_for(definition.kind);
        if !engine.can_execute(&definition.content) {
            return Err(SchedulerError::Unsupported(id));
        }
        engine
            .validate(&definition)
            .map_err(|e| SchedulerError::Parse(id.clone(), e))?;

        self.cleanup.register_cleanup_functions(&definition);

        let run_token = Uuid::new_v4();
        let cancel_token = CancellationToken::new();
        let pause_gate = PauseGate::new();
        let loop_controls = Arc::new(LoopControls::default());
        let (event_tx, event_rx) = mpsc::channel(self.config.event_buffer_size.max(1));

        self.statuses
            .lock()
            .unwrap()
            .insert(id.clone(), MacroStatus::ready());

        let ctx = ExecutionContext {
            id: id.clone(),
            host: self.host.clone(),
            frame: self.frame.clone(),
            cancel_token: cancel_token.clone(),
            pause_gate: pause_gate.clone(),
            loop_controls: loop_controls.clone(),
            events: event_tx,
            starter: self.start_tx.clone(),
            library: self.library.clone(),
            trigger_args: args,
            config: self.config.clone(),
        };

        let run_handle = tokio::spawn({
            let engine = engine.clone();
            let definition = definition.clone();
            async move { engine.run(definition, ctx).await }
        });

        let monitor = tokio::spawn(Self::monitor(
            MonitorContext {
                id: id.clone(),
                run_token,
                definition: definition.clone(),
                executions: self.executions.clone(),
                statuses: self.statuses.clone(),
                events: self.events.clone(),
                hierarchy: self.hierarchy.clone(),
                cleanup: self.cleanup.clone(),
                start_tx: self.start_tx.clone(),
            },
            run_handle,
            event_rx,
        ));

        info!("Started macro {} ({})", definition.name, id);
        self.executions.lock().unwrap().insert(
            id,
            MacroExecutionState {
                definition,
                run_token,
                cancel_token,
                pause_gate,
                loop_controls,
                monitor,
            },
        );
        Ok(())
    }

    /// Pause at the next suspension point. No-op unless the macro is live.
    pub fn pause_macro(&self, id: &MacroId) {
        if let Some(state) = self.executions.lock().unwrap().get(id) {
            debug!("Pausing macro {}", id);
            state.pause_gate.pause();
        }
    }

    pub fn resume_macro(&self, id: &MacroId) {
        if let Some(state) = self.executions.lock().unwrap().get(id) {
            debug!("Resuming macro {}", id);
            state.pause_gate.resume();
        }
    }

    pub fn pause_at_next_loop(&self, id: &MacroId) {
        if let Some(state) = self.executions.lock().unwrap().get(id) {
            state.loop_controls.request_pause();
        }
    }

    pub fn stop_at_next_loop(&self, id: &MacroId) {
        if let Some(state) = self.executions.lock().unwrap().get(id) {
            state.loop_controls.request_stop();
        }
    }

    /// Cancel a macro and, when configured, every live descendant registered
    /// in the hierarchy. Idempotent; unknown ids are a no-op.
    pub fn stop_macro(&self, id: &MacroId) {
        let mut targets = vec![id.clone()];
        if self.config.cascade_stop_children {
            targets.extend(self.hierarchy.descendants_of(id));
        }
        let executions = self.executions.lock().unwrap();
        for target in &targets {
            if let Some(state) = executions.get(target) {
                debug!("Stopping macro {}", target);
                state.stop();
            }
        }
    }

    /// Stop everything and wait for every monitor to finish its teardown.
    pub async fn stop_all_macros(&self) {
        let states: Vec<MacroExecutionState> = {
            let mut executions = self.executions.lock().unwrap();
            executions.drain().map(|(_, state)| state).collect()
        };
        let monitors: Vec<_> = states
            .into_iter()
            .map(|state| {
                state.stop();
                state.monitor
            })
            .collect();
        join_all(monitors).await;
    }

    pub fn get_macro_state(&self, id: &MacroId) -> Option<MacroState> {
        self.statuses.lock().unwrap().get(id).map(|s| s.state)
    }

    /// Retained status, including the error message of a failed run.
    pub fn status(&self, id: &MacroId) -> Option<MacroStatus> {
        self.statuses.lock().unwrap().get(id).cloned()
    }

    /// Snapshot of the currently running macros.
    pub fn get_macros(&self) -> Vec<Macro> {
        self.executions
            .lock()
            .unwrap()
            .values()
            .map(|state| state.definition.clone())
            .collect()
    }

    async fn monitor(
        ctx: MonitorContext,
        mut run_handle: tokio::task::JoinHandle<Result<RunOutcome, EngineError>>,
        mut event_rx: mpsc::Receiver<EngineEvent>,
    ) {
        let mut events_open = true;
        let result = loop {
            tokio::select! {
                res = &mut run_handle => break res,
                maybe_event = event_rx.recv(), if events_open => match maybe_event {
                    Some(event) => Self::forward_engine_event(&ctx, event),
                    None => events_open = false,
                },
            }
        };
        while let Ok(event) = event_rx.try_recv() {
            Self::forward_engine_event(&ctx, event);
        }

        let (terminal, message, cleanup_reason) = match result {
            Ok(Ok(RunOutcome::Finished)) => (MacroState::Completed, None, None),
            Ok(Ok(RunOutcome::Stopped)) => (
                MacroState::Completed,
                Some("stopped by request".to_string()),
                Some(CleanupReason::Stopped),
            ),
            Ok(Err(e)) => {
                warn!("Macro {} failed: {}", ctx.id, e);
                (
                    MacroState::Error,
                    Some(e.to_string()),
                    Some(CleanupReason::Errored),
                )
            }
            Err(e) => {
                error!("Macro {} run task died: {}", ctx.id, e);
                (
                    MacroState::Error,
                    Some(format!("run task died: {}", e)),
                    Some(CleanupReason::Errored),
                )
            }
        };

        let old = Self::set_status(&ctx.statuses, &ctx.id, terminal, message.clone());
        let _ = ctx.events.send(SchedulerEvent::StateChanged {
            id: ctx.id.clone(),
            old,
            new: terminal,
        });
        if terminal == MacroState::Error {
            let _ = ctx.events.send(SchedulerEvent::ErrorRaised {
                id: ctx.id.clone(),
                message: message.unwrap_or_default(),
            });
        }

        // Author-declared cleanup runs when the macro stopped or failed,
        // never on natural completion.
        if !ctx.definition.temporary {
            if let Some(reason) = cleanup_reason {
                let routines = ctx.cleanup.execute_cleanup(&ctx.id, reason);
                if !routines.is_empty() {
                    let _ = ctx.events.send(SchedulerEvent::CleanupRequested {
                        id: ctx.id.clone(),
                        reason,
                    });
                    for routine in routines {
                        ctx.hierarchy
                            .register_temporary_macro(&ctx.id, &routine);
                        if ctx
                            .start_tx
                            .send(StartRequest {
                                definition: routine,
                                args: None,
                            })
                            .await
                            .is_err()
                        {
                            warn!("Scheduler gone, cleanup for {} dropped", ctx.id);
                        }
                    }
                }
            }
        }

        // A failing transient handler must be visible at the macro the user
        // is actually observing.
        if ctx.definition.temporary {
            if terminal == MacroState::Error {
                if let Some(root) = ctx.hierarchy.root_parent_of(&ctx.id) {
                    warn!("Propagating child {} failure to root {}", ctx.id, root);
                    let old = Self::set_status(
                        &ctx.statuses,
                        &root,
                        MacroState::Error,
                        Some(format!("child macro {} failed", ctx.id)),
                    );
                    let _ = ctx.events.send(SchedulerEvent::StateChanged {
                        id: root.clone(),
                        old,
                        new: MacroState::Error,
                    });
                }
            }
            ctx.hierarchy.unregister_temporary_macro(&ctx.id);
        }

        // Drop our own execution entry unless a restart already replaced it.
        {
            let mut executions = ctx.executions.lock().unwrap();
            if executions
                .get(&ctx.id)
                .is_some_and(|state| state.run_token == ctx.run_token)
            {
                executions.remove(&ctx.id);
            }
        }
        debug!("Macro {} reached {:?}", ctx.id, terminal);
    }

    fn forward_engine_event(ctx: &MonitorContext, event: EngineEvent) {
        match event {
            EngineEvent::StateChanged { id, old, new } => {
                Self::set_status(&ctx.statuses, &id, new, None);
                let _ = ctx.events.send(SchedulerEvent::StateChanged { id, old, new });
            }
            EngineEvent::ErrorRaised { id, message } => {
                let _ = ctx.events.send(SchedulerEvent::ErrorRaised { id, message });
            }
        }
    }

    /// Update the retained status, returning the previous state.
    fn set_status(
        statuses: &StatusMap,
        id: &MacroId,
        state: MacroState,
        message: Option<String>,
    ) -> MacroState {
        let mut statuses = statuses.lock().unwrap();
        let status = statuses.entry(id.clone()).or_insert_with(MacroStatus::ready);
        let old = status.state;
        status.state = state;
        if message.is_some() {
            status.message = message;
        }
        if state.is_terminal() {
            status.finished_at = Some(Utc::now());
        }
        old
    }
}

struct MonitorContext {
    id: MacroId,
    run_token: Uuid,
    definition: Macro,
    executions: ExecutionMap,
    statuses: StatusMap,
    events: broadcast::Sender<SchedulerEvent>,
    hierarchy: Arc<MacroHierarchyManager>,
    cleanup: Arc<CleanupManager>,
    start_tx: mpsc::Sender<StartRequest>,
}
