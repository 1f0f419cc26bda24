use crate::engine::{CommandExecutor, CommandFlow, Engine, ExecutionContext, RunOutcome};
use crate::error::{EngineError, SyntaxError};
use crate::macros::{Macro, MacroKind, MacroState};
use crate::parser::{Command, CommandKind, MacroParser};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Interpreter for the constrained native dialect: the parsed command list is
/// walked strictly in source order, loop and gate commands rewind it, and the
/// deferred pause/stop-at-next-loop flags are consulted at every loop
/// boundary.
pub struct NativeEngine {
    parser: MacroParser,
    executor: CommandExecutor,
}

impl NativeEngine {
    pub fn new() -> Self {
        Self {
            parser: MacroParser::new(),
            executor: CommandExecutor,
        }
    }

    /// Walk the command list once. Loop counters are per-walk; a `/loop`
    /// rewinds to the top, an exhausted `/gate` finishes the macro.
    async fn walk(
        &self,
        commands: &[Command],
        ctx: &ExecutionContext,
    ) -> Result<RunOutcome, EngineError> {
        let mut remaining: HashMap<usize, u32> = HashMap::new();
        let mut index = 0;
        while index < commands.len() {
            if !ctx.checkpoint().await {
                return Ok(RunOutcome::Stopped);
            }
            let command = &commands[index];
            match &command.kind {
                CommandKind::Loop { count } => {
                    if self.consult_loop_controls(ctx) {
                        return Ok(RunOutcome::Finished);
                    }
                    let left = remaining.entry(index).or_insert(*count);
                    if *left > 0 {
                        if *left != u32::MAX {
                            *left -= 1;
                        }
                        tracing::debug!("Macro {} looping, {} repeats left", ctx.id, left);
                        index = 0;
                    } else {
                        index += 1;
                    }
                }
                CommandKind::Gate { count } => {
                    if self.consult_loop_controls(ctx) {
                        return Ok(RunOutcome::Finished);
                    }
                    let left = remaining.entry(index).or_insert(*count);
                    if *left == 0 {
                        tracing::debug!("Macro {} gate exhausted, finishing", ctx.id);
                        return Ok(RunOutcome::Finished);
                    }
                    if *left != u32::MAX {
                        *left -= 1;
                    }
                    index += 1;
                }
                _ => match self.executor.execute(command, ctx).await? {
                    CommandFlow::Stopped => return Ok(RunOutcome::Stopped),
                    CommandFlow::Continue => index += 1,
                },
            }
        }
        Ok(RunOutcome::Finished)
    }

    /// Returns true when a deferred stop request was pending. A deferred
    /// pause request closes the gate; the next checkpoint blocks on it.
    fn consult_loop_controls(&self, ctx: &ExecutionContext) -> bool {
        if ctx.loop_controls.take_stop() {
            tracing::debug!("Macro {} honoring stop-at-next-loop", ctx.id);
            return true;
        }
        if ctx.loop_controls.take_pause() {
            tracing::debug!("Macro {} honoring pause-at-next-loop", ctx.id);
            ctx.pause_gate.pause();
        }
        false
    }
}

impl Default for NativeEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Engine for NativeEngine {
    fn kind(&self) -> MacroKind {
        MacroKind::Native
    }

    fn can_execute(&self, content: &str) -> bool {
        content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .is_some_and(|line| line.starts_with('/'))
    }

    fn validate(&self, definition: &Macro) -> Result<(), SyntaxError> {
        self.parser.parse(&definition.content).map(|_| ())
    }

    async fn run(
        &self,
        definition: Macro,
        ctx: ExecutionContext,
    ) -> Result<RunOutcome, EngineError> {
        let commands = self.parser.parse(&definition.content)?;
        ctx.state_changed(MacroState::Ready, MacroState::Running).await;

        let repeats = definition.metadata.repeat;
        for iteration in 0..=repeats {
            match self.walk(&commands, &ctx).await? {
                RunOutcome::Stopped => return Ok(RunOutcome::Stopped),
                RunOutcome::Finished => {}
            }
            if iteration < repeats && definition.metadata.loop_delay_ms > 0 {
                if !ctx
                    .sleep(Duration::from_millis(definition.metadata.loop_delay_ms))
                    .await
                {
                    return Ok(RunOutcome::Stopped);
                }
            }
        }
        Ok(RunOutcome::Finished)
    }
}
