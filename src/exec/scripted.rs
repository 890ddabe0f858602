//! A [`CommandRunner`] that never spawns anything.
//!
//! Responses are matched by program name and an optional argument fragment.
//! Every invocation is recorded so callers can assert on ordering and
//! arguments. Hooks simulate side effects of the real tool, such as
//! `xtrabackup --copy-back` populating a data directory.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CommandOutput, CommandRunner, CommandSpec};
use crate::{Result, VaultError};

/// Side effect executed when a matching command runs
pub type CommandHook = Arc<dyn Fn(&CommandSpec) + Send + Sync>;

/// One recorded invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    /// The command as it was requested
    pub spec: CommandSpec,
    /// Consumer side when the invocation was a pipe
    pub piped_into: Option<CommandSpec>,
}

enum Response {
    Output(CommandOutput),
    SpawnError(String),
}

struct Rule {
    program: String,
    fragment: Option<String>,
    response: Response,
}

impl Rule {
    fn matches(&self, spec: &CommandSpec) -> bool {
        spec.program() == self.program
            && self
                .fragment
                .as_ref()
                .map_or(true, |fragment| spec.get_args().iter().any(|arg| arg.contains(fragment.as_str())))
    }
}

/// Scripted runner for pipeline tests
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    rules: Arc<Mutex<Vec<Rule>>>,
    hooks: Arc<Mutex<Vec<(String, CommandHook)>>>,
    recorded: Arc<Mutex<Vec<RecordedCommand>>>,
}

impl ScriptedRunner {
    /// A runner where every command succeeds with empty output
    pub fn new() -> Self {
        Self::default()
    }

    fn push_rule(&self, program: &str, fragment: Option<&str>, response: Response) {
        self.rules.lock().push(Rule {
            program: program.to_string(),
            fragment: fragment.map(str::to_string),
            response,
        });
    }

    /// Fail `program` (exit 1, `stderr`) when any argument contains `fragment`
    pub fn fail(&self, program: &str, fragment: Option<&str>, stderr: &str) -> &Self {
        self.push_rule(program, fragment, Response::Output(CommandOutput::failed(1, stderr)));
        self
    }

    /// Succeed with `stdout` for `program` when any argument contains `fragment`
    pub fn respond(&self, program: &str, fragment: Option<&str>, stdout: &str) -> &Self {
        self.push_rule(program, fragment, Response::Output(CommandOutput::succeeded(stdout)));
        self
    }

    /// Make `program` fail to start, as if it were not installed
    pub fn missing(&self, program: &str) -> &Self {
        self.push_rule(program, None, Response::SpawnError(format!("Failed to spawn {}: not found", program)));
        self
    }

    /// Run `hook` every time `program` is invoked
    pub fn on_run<F>(&self, program: &str, hook: F) -> &Self
    where
        F: Fn(&CommandSpec) + Send + Sync + 'static,
    {
        self.hooks.lock().push((program.to_string(), Arc::new(hook)));
        self
    }

    /// All invocations, in order
    pub fn invocations(&self) -> Vec<RecordedCommand> {
        self.recorded.lock().clone()
    }

    /// Invocations of one program, in order
    pub fn invocations_of(&self, program: &str) -> Vec<CommandSpec> {
        self.recorded
            .lock()
            .iter()
            .filter(|r| r.spec.program() == program)
            .map(|r| r.spec.clone())
            .collect()
    }

    fn respond_to(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let hooks: Vec<CommandHook> = self
            .hooks
            .lock()
            .iter()
            .filter(|(program, _)| program == spec.program())
            .map(|(_, hook)| hook.clone())
            .collect();
        for hook in hooks {
            hook(spec);
        }

        // Later rules take precedence over earlier ones
        let rules = self.rules.lock();
        match rules.iter().rev().find(|rule| rule.matches(spec)) {
            Some(Rule { response: Response::Output(output), .. }) => Ok(output.clone()),
            Some(Rule { response: Response::SpawnError(message), .. }) => Err(VaultError::Tool(message.clone())),
            None => Ok(CommandOutput::succeeded("")),
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec, _timeout: Duration) -> Result<CommandOutput> {
        self.recorded.lock().push(RecordedCommand {
            spec: spec.clone(),
            piped_into: None,
        });
        self.respond_to(spec)
    }

    async fn run_piped(
        &self,
        producer: &CommandSpec,
        consumer: &CommandSpec,
        _timeout: Duration,
    ) -> Result<CommandOutput> {
        self.recorded.lock().push(RecordedCommand {
            spec: producer.clone(),
            piped_into: Some(consumer.clone()),
        });
        let upstream = self.respond_to(producer)?;
        if !upstream.success() {
            return Ok(upstream);
        }
        self.respond_to(consumer)
    }
}
