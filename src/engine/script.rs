use crate::engine::{CommandExecutor, CommandFlow, Engine, ExecutionContext, RunOutcome};
use crate::error::{EngineError, SyntaxError};
use crate::macros::{Macro, MacroKind, MacroState};
use crate::parser::{CommandKind, MacroParser};
use async_trait::async_trait;

/// Cooperative command source for the embedded scripting dialect. The
/// runtime owns sequencing; every yielded string is fed back through the
/// native parser and executor so both dialects share one vocabulary and one
/// modifier set.
#[async_trait]
pub trait ScriptRuntime: Send {
    /// Produce the next command line, or `None` when the script has run to
    /// completion.
    async fn resume(&mut self, ctx: &ExecutionContext) -> Result<Option<String>, EngineError>;
}

/// Creates one runtime per run. The real dialect binding (stdlib, host
/// query functions) is external glue injected through this seam.
pub trait ScriptRuntimeFactory: Send + Sync {
    fn create(&self, definition: &Macro) -> Result<Box<dyn ScriptRuntime>, EngineError>;
}

/// Degenerate built-in runtime: walks the source top to bottom, yields
/// command lines, and treats everything else as dialect statements with no
/// host effect. Tests and the demo use it; production injects a real
/// runtime through the factory.
pub struct LineScriptRuntime {
    lines: Vec<String>,
    index: usize,
}

impl LineScriptRuntime {
    pub fn new(source: &str) -> Self {
        Self {
            lines: source.lines().map(str::to_string).collect(),
            index: 0,
        }
    }

    pub fn factory() -> Box<dyn ScriptRuntimeFactory> {
        struct Factory;
        impl ScriptRuntimeFactory for Factory {
            fn create(&self, definition: &Macro) -> Result<Box<dyn ScriptRuntime>, EngineError> {
                Ok(Box::new(LineScriptRuntime::new(&definition.content)))
            }
        }
        Box::new(Factory)
    }
}

#[async_trait]
impl ScriptRuntime for LineScriptRuntime {
    async fn resume(&mut self, _ctx: &ExecutionContext) -> Result<Option<String>, EngineError> {
        while self.index < self.lines.len() {
            let line = self.lines[self.index].trim().to_string();
            self.index += 1;
            if line.is_empty() || line.starts_with("--") {
                continue;
            }
            if line.starts_with('/') {
                return Ok(Some(line));
            }
            tracing::trace!("Line runtime ignoring dialect statement: {}", line);
        }
        Ok(None)
    }
}

/// Hosts the embedded scripting dialect. The runtime yields command strings
/// cooperatively; this engine parses and executes each one, honoring the
/// shared pause/cancel primitives between yields.
pub struct ScriptEngine {
    parser: MacroParser,
    executor: CommandExecutor,
    factory: Box<dyn ScriptRuntimeFactory>,
}

impl ScriptEngine {
    pub fn new(factory: Box<dyn ScriptRuntimeFactory>) -> Self {
        Self {
            parser: MacroParser::new(),
            executor: CommandExecutor,
            factory,
        }
    }

    pub fn with_line_runtime() -> Self {
        Self::new(LineScriptRuntime::factory())
    }
}

#[async_trait]
impl Engine for ScriptEngine {
    fn kind(&self) -> MacroKind {
        MacroKind::Script
    }

    /// Anything the native engine does not claim defaults to the script
    /// engine.
    fn can_execute(&self, _content: &str) -> bool {
        true
    }

    fn validate(&self, _definition: &Macro) -> Result<(), SyntaxError> {
        // Script sources are validated by the runtime at creation; yielded
        // command lines are checked as they arrive.
        Ok(())
    }

    async fn run(
        &self,
        definition: Macro,
        ctx: ExecutionContext,
    ) -> Result<RunOutcome, EngineError> {
        let mut runtime = self.factory.create(&definition)?;
        ctx.state_changed(MacroState::Ready, MacroState::Running).await;

        loop {
            if !ctx.checkpoint().await {
                return Ok(RunOutcome::Stopped);
            }
            let Some(line) = runtime.resume(&ctx).await? else {
                return Ok(RunOutcome::Finished);
            };
            let command = self.parser.parse_line(&line)?;
            if matches!(
                command.kind,
                CommandKind::Loop { .. } | CommandKind::Gate { .. }
            ) {
                return Err(EngineError::Unsupported(
                    "loop control is only valid inside a native macro body".to_string(),
                ));
            }
            match self.executor.execute(&command, &ctx).await? {
                CommandFlow::Stopped => return Ok(RunOutcome::Stopped),
                CommandFlow::Continue => {}
            }
        }
    }
}
