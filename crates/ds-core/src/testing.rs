//! Test doubles shared by the service tests.

use std::sync::Mutex;

use indexmap::IndexMap;

use crate::error::{DevstackError, Result};
use crate::services::output::{Confirmer, OutputSink, StyledLine, Tone};
use crate::services::process::{CommandOutput, Invocation, LineStream, ProcessRunner};
use crate::services::vault::SecretStore;

struct Rule {
    pattern: String,
    output: CommandOutput,
    once: bool,
}

/// Scripted process runner. The first rule whose pattern is a substring of the
/// command line answers; unmatched commands succeed with empty output.
#[derive(Default)]
pub(crate) struct FakeRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Invocation>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, pattern: &str, output: CommandOutput) -> &Self {
        self.push(pattern, output, false)
    }

    /// Answer a single matching call, then fall through to later rules.
    pub fn once(&self, pattern: &str, output: CommandOutput) -> &Self {
        self.push(pattern, output, true)
    }

    fn push(&self, pattern: &str, output: CommandOutput, once: bool) -> &Self {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            output,
            once,
        });
        self
    }

    fn answer(&self, invocation: &Invocation) -> CommandOutput {
        self.calls.lock().unwrap().push(invocation.clone());
        let line = invocation.command_line();
        let mut rules = self.rules.lock().unwrap();
        match rules.iter().position(|r| line.contains(&r.pattern)) {
            Some(i) if rules[i].once => rules.remove(i).output,
            Some(i) => rules[i].output.clone(),
            None => CommandOutput::default(),
        }
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(Invocation::command_line).collect()
    }

    pub fn calls_matching(&self, pattern: &str) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|c| c.command_line().contains(pattern))
            .collect()
    }
}

impl ProcessRunner for FakeRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        Ok(self.answer(invocation))
    }

    fn stream_lines(&self, invocation: &Invocation) -> Result<LineStream> {
        let output = self.answer(invocation);
        Ok(LineStream::from_lines(
            output.stdout_text().lines().map(str::to_string).collect::<Vec<_>>(),
        ))
    }
}

pub(crate) fn ok(stdout: &str) -> CommandOutput {
    CommandOutput::new(0, stdout, "")
}

pub(crate) fn fail(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput::new(code, "", stderr)
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    lines: Mutex<Vec<StyledLine>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texts(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .map(|l| l.text.clone())
            .collect()
    }

    pub fn with_tone(&self, tone: Tone) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.tone == tone)
            .map(|l| l.text.clone())
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.texts().iter().any(|t| t.contains(needle))
    }
}

impl OutputSink for RecordingSink {
    fn write_line(&self, line: StyledLine) {
        self.lines.lock().unwrap().push(line);
    }
}

pub(crate) struct StaticConfirmer {
    answer: bool,
    prompts: Mutex<Vec<String>>,
}

impl StaticConfirmer {
    pub fn yes() -> Self {
        Self {
            answer: true,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn no() -> Self {
        Self {
            answer: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Confirmer for StaticConfirmer {
    fn confirm(&self, prompt: &str) -> bool {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answer
    }
}

/// In-memory secret store; `unavailable` makes every read fail like a down server.
#[derive(Default)]
pub(crate) struct StaticSecrets {
    secrets: IndexMap<String, IndexMap<String, String>>,
    unavailable: bool,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn with(mut self, path: &str, key: &str, value: &str) -> Self {
        self.secrets
            .entry(path.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self
    }
}

impl SecretStore for StaticSecrets {
    async fn get_secret(&self, path: &str, key: Option<&str>) -> Result<IndexMap<String, String>> {
        if self.unavailable {
            return Err(DevstackError::unavailable("connection refused"));
        }
        let data = self
            .secrets
            .get(path)
            .ok_or_else(|| DevstackError::SecretNotFound {
                path: path.to_string(),
                key: None,
            })?;
        match key {
            None => Ok(data.clone()),
            Some(key) => {
                let value = data.get(key).ok_or_else(|| DevstackError::SecretNotFound {
                    path: path.to_string(),
                    key: Some(key.to_string()),
                })?;
                Ok(IndexMap::from([(key.to_string(), value.clone())]))
            }
        }
    }
}
