pub mod native;
pub mod script;

pub use native::NativeEngine;
pub use script::{LineScriptRuntime, ScriptEngine, ScriptRuntime, ScriptRuntimeFactory};

use crate::config::{Configuration, GuardTimeoutBehavior};
use crate::error::{EngineError, SyntaxError};
use crate::host::{FrameExecutor, HostGateway, KeyState, TargetOptions};
use crate::library::MacroLibrary;
use crate::macros::{Macro, MacroId, MacroKind, MacroState};
use crate::parser::{Command, CommandKind, ConditionModifier};
use crate::scheduler::execution::{LoopControls, PauseGate};
use crate::triggers::TriggerPayload;
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How a run ended short of an error. Cleanup only runs for `Stopped` (and
/// for errors); a macro that walks off the end of its command list finished
/// naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Finished,
    Stopped,
}

/// Engine-side notifications, re-published by the scheduler on its broadcast
/// channel. Completion itself is not an event; the scheduler awaits the run
/// task directly.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    StateChanged {
        id: MacroId,
        old: MacroState,
        new: MacroState,
    },
    ErrorRaised {
        id: MacroId,
        message: String,
    },
}

/// A request to start another macro, queued by the run-sub-macro command and
/// by cleanup dispatch, drained by the scheduler.
#[derive(Debug)]
pub struct StartRequest {
    pub definition: Macro,
    pub args: Option<TriggerPayload>,
}

/// Everything a running macro needs from its owner: the host surface, the
/// affinity executor, the control primitives the scheduler keeps in the
/// execution state, and the channels back out.
#[derive(Clone)]
pub struct ExecutionContext {
    pub id: MacroId,
    pub host: Arc<dyn HostGateway>,
    pub frame: FrameExecutor,
    pub cancel_token: CancellationToken,
    pub pause_gate: PauseGate,
    pub loop_controls: Arc<LoopControls>,
    pub events: mpsc::Sender<EngineEvent>,
    pub starter: mpsc::Sender<StartRequest>,
    pub library: Arc<dyn MacroLibrary>,
    pub trigger_args: Option<TriggerPayload>,
    pub config: Arc<Configuration>,
}

impl ExecutionContext {
    pub async fn state_changed(&self, old: MacroState, new: MacroState) {
        let _ = self
            .events
            .send(EngineEvent::StateChanged {
                id: self.id.clone(),
                old,
                new,
            })
            .await;
    }

    /// Suspension point between commands: observe cancellation, then block on
    /// the pause gate if it is closed, reporting the transitions. Returns
    /// false once the macro is cancelled.
    pub async fn checkpoint(&self) -> bool {
        if self.cancel_token.is_cancelled() {
            return false;
        }
        if self.pause_gate.is_paused() {
            self.state_changed(MacroState::Running, MacroState::Paused).await;
            tokio::select! {
                _ = self.cancel_token.cancelled() => return false,
                _ = self.pause_gate.wait_if_paused() => {}
            }
            if self.cancel_token.is_cancelled() {
                return false;
            }
            self.state_changed(MacroState::Paused, MacroState::Running).await;
        }
        true
    }

    /// Cancellable sleep. Returns false if the macro was stopped mid-sleep.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel_token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

/// The executor contract shared by both dialects: start, observe the shared
/// pause/cancel primitives, report state changes and errors through the
/// context, and tell auto-detection helpers what content it accepts.
#[async_trait]
pub trait Engine: Send + Sync {
    fn kind(&self) -> MacroKind;

    /// Routing hook for ad-hoc snippets: native content is recognized by its
    /// leading command prefix, everything else defaults to the script engine.
    fn can_execute(&self, content: &str) -> bool;

    /// Parse check performed at start time, before the macro ever reaches
    /// `Running`.
    fn validate(&self, definition: &Macro) -> Result<(), SyntaxError>;

    async fn run(
        &self,
        definition: Macro,
        ctx: ExecutionContext,
    ) -> Result<RunOutcome, EngineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollOutcome {
    Satisfied,
    TimedOut,
    Stopped,
}

/// What the walk should do after one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFlow {
    Continue,
    /// Observed cancellation mid-command.
    Stopped,
}

/// Executes single commands against the host. Shared by the native walker
/// and the script engine so both dialects drive one command vocabulary and
/// one modifier set.
pub struct CommandExecutor;

impl CommandExecutor {
    /// Run one command: conditional guard, the verb itself (marshalled onto
    /// the host-update thread when it touches live state), then the attached
    /// wait and echo modifiers.
    pub async fn execute(
        &self,
        command: &Command,
        ctx: &ExecutionContext,
    ) -> Result<CommandFlow, EngineError> {
        if let Some(condition) = &command.modifiers.condition {
            let ceiling = command
                .modifiers
                .max_wait
                .map(|m| m.ms)
                .unwrap_or(ctx.config.default_max_wait_ms);
            match self.poll_condition(ctx, condition, ceiling).await {
                PollOutcome::Satisfied => {}
                PollOutcome::Stopped => return Ok(CommandFlow::Stopped),
                PollOutcome::TimedOut => match ctx.config.guard_timeout {
                    GuardTimeoutBehavior::Skip => {
                        tracing::debug!(
                            "Skipping /{} for macro {}: guard not satisfied within {}ms",
                            command.name,
                            ctx.id,
                            ceiling
                        );
                        return Ok(CommandFlow::Continue);
                    }
                    GuardTimeoutBehavior::Fail => {
                        return Err(EngineError::Timeout {
                            what: format!("condition {}", condition.conditions.join(",")),
                            waited_ms: ceiling,
                        })
                    }
                },
            }
        }

        match self.dispatch(command, ctx).await? {
            CommandFlow::Stopped => return Ok(CommandFlow::Stopped),
            CommandFlow::Continue => {}
        }

        if let Some(wait) = &command.modifiers.wait {
            let duration_ms = if wait.min_ms == wait.max_ms {
                wait.min_ms
            } else {
                rand::rng().random_range(wait.min_ms..=wait.max_ms)
            };
            if !ctx.sleep(Duration::from_millis(duration_ms)).await {
                return Ok(CommandFlow::Stopped);
            }
        }

        if command.modifiers.echo {
            ctx.host.echo(&format!("/{} done", command.name));
        }
        Ok(CommandFlow::Continue)
    }

    async fn dispatch(
        &self,
        command: &Command,
        ctx: &ExecutionContext,
    ) -> Result<CommandFlow, EngineError> {
        let options = TargetOptions::from_modifiers(&command.modifiers);
        match &command.kind {
            CommandKind::Action { name } => {
                self.on_frame(ctx, {
                    let name = name.clone();
                    move |host| host.use_action(&name)
                })
                .await?;
                // Wait for the host to acknowledge the action unless the
                // author opted out with <unsafe>.
                if !command.modifiers.unsafe_mode {
                    let ceiling = command
                        .modifiers
                        .max_wait
                        .map(|m| m.ms)
                        .unwrap_or(ctx.config.default_max_wait_ms);
                    let host = ctx.host.clone();
                    match self
                        .poll(ctx, ceiling, move || !host.action_pending())
                        .await
                    {
                        PollOutcome::Satisfied => {}
                        PollOutcome::Stopped => return Ok(CommandFlow::Stopped),
                        PollOutcome::TimedOut => {
                            return Err(EngineError::Timeout {
                                what: format!("action `{}` acknowledgement", name),
                                waited_ms: ceiling,
                            })
                        }
                    }
                }
            }
            CommandKind::Target { name } => {
                self.on_frame(ctx, {
                    let name = name.clone();
                    move |host| host.target(&name, &options)
                })
                .await?;
            }
            CommandKind::Click { element } => {
                self.on_frame(ctx, {
                    let element = element.clone();
                    move |host| host.click(&element, &options)
                })
                .await?;
            }
            CommandKind::SendKey { chord } => {
                ctx.host.send_key(chord, KeyState::Press)?;
            }
            CommandKind::HoldKey { chord } => {
                ctx.host.send_key(chord, KeyState::Hold)?;
            }
            CommandKind::ReleaseKey { chord } => {
                ctx.host.send_key(chord, KeyState::Release)?;
            }
            CommandKind::WaitAddon { addon } => {
                let ceiling = command
                    .modifiers
                    .max_wait
                    .map(|m| m.ms)
                    .unwrap_or(ctx.config.default_max_wait_ms);
                let host = ctx.host.clone();
                let name = addon.clone();
                match self.poll(ctx, ceiling, move || host.addon_visible(&name)).await {
                    PollOutcome::Satisfied => {}
                    PollOutcome::Stopped => return Ok(CommandFlow::Stopped),
                    PollOutcome::TimedOut => {
                        return Err(EngineError::Timeout {
                            what: format!("UI element `{}`", addon),
                            waited_ms: ceiling,
                        })
                    }
                }
            }
            CommandKind::Equip { item_id } => {
                let item_id = *item_id;
                let high_quality = command.modifiers.high_quality;
                self.on_frame(ctx, move |host| host.equip_item(item_id, high_quality))
                    .await?;
            }
            CommandKind::Interact => {
                self.on_frame(ctx, |host| host.interact()).await?;
            }
            CommandKind::Recipe { name } => {
                self.on_frame(ctx, {
                    let name = name.clone();
                    move |host| host.open_recipe(&name)
                })
                .await?;
            }
            CommandKind::Require { condition } => {
                let ceiling = command
                    .modifiers
                    .max_wait
                    .map(|m| m.ms)
                    .unwrap_or(ctx.config.default_max_wait_ms);
                let host = ctx.host.clone();
                let name = condition.clone();
                match self
                    .poll(ctx, ceiling, move || host.condition_active(&name))
                    .await
                {
                    PollOutcome::Satisfied => {}
                    PollOutcome::Stopped => return Ok(CommandFlow::Stopped),
                    PollOutcome::TimedOut => {
                        return Err(EngineError::Timeout {
                            what: format!("precondition `{}`", condition),
                            waited_ms: ceiling,
                        })
                    }
                }
            }
            CommandKind::RunMacro { name } => {
                let definition = ctx.library.get_by_name(name).ok_or_else(|| {
                    EngineError::Unsupported(format!("macro `{}` is not in the library", name))
                })?;
                let request = StartRequest {
                    definition,
                    args: None,
                };
                if ctx.starter.send(request).await.is_err() {
                    return Ok(CommandFlow::Stopped);
                }
            }
            CommandKind::Callback { addon, update, values } => {
                self.on_frame(ctx, {
                    let addon = addon.clone();
                    let update = *update;
                    let values = values.clone();
                    move |host| host.fire_callback(&addon, update, &values)
                })
                .await?;
            }
            CommandKind::Wait { duration_ms } => {
                if !ctx.sleep(Duration::from_millis(*duration_ms)).await {
                    return Ok(CommandFlow::Stopped);
                }
            }
            CommandKind::Native { line } => {
                self.on_frame(ctx, {
                    let line = line.clone();
                    move |host| host.run_native(&line)
                })
                .await?;
            }
            CommandKind::Loop { .. } | CommandKind::Gate { .. } => {
                return Err(EngineError::Unsupported(
                    "loop control is only valid inside a native macro body".to_string(),
                ))
            }
        }
        Ok(CommandFlow::Continue)
    }

    /// Marshal one host verb onto the designated host-update thread and await
    /// its completion before advancing.
    async fn on_frame<F>(&self, ctx: &ExecutionContext, job: F) -> Result<(), EngineError>
    where
        F: FnOnce(&dyn HostGateway) -> Result<(), crate::error::HostError> + Send + 'static,
    {
        let host = ctx.host.clone();
        ctx.frame.run(move || job(host.as_ref())).await??;
        Ok(())
    }

    async fn poll_condition(
        &self,
        ctx: &ExecutionContext,
        condition: &ConditionModifier,
        ceiling_ms: u64,
    ) -> PollOutcome {
        let host = ctx.host.clone();
        let conditions = condition.conditions.clone();
        let negated = condition.negated;
        self.poll(ctx, ceiling_ms, move || {
            let any_active = conditions.iter().any(|c| host.condition_active(c));
            any_active != negated
        })
        .await
    }

    /// Poll a predicate until satisfied, the ceiling elapses, or the macro is
    /// stopped. The predicate is checked once before any sleep.
    async fn poll(
        &self,
        ctx: &ExecutionContext,
        ceiling_ms: u64,
        mut predicate: impl FnMut() -> bool,
    ) -> PollOutcome {
        let interval = Duration::from_millis(ctx.config.condition_poll_ms.max(1));
        let mut waited = Duration::ZERO;
        loop {
            if predicate() {
                return PollOutcome::Satisfied;
            }
            if waited.as_millis() as u64 >= ceiling_ms {
                return PollOutcome::TimedOut;
            }
            if !ctx.sleep(interval).await {
                return PollOutcome::Stopped;
            }
            waited += interval;
        }
    }
}
