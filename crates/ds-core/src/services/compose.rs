use std::future::Future;

use crate::error::{DevstackError, Result};
use crate::models::health::ComposeContainer;
use crate::models::{HealthReport, HealthState, ProfileCatalog, ResolvedSelection, ServiceHealth, Settings};
use crate::services::output::OutputSink;
use crate::services::process::{run_checked, Invocation, LineStream, ProcessRunner};
use crate::services::vm::{StopOutcome, VmController};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownOutcome {
    /// Only the named containers were stopped; `clean` is false when some
    /// were already gone or refused to stop.
    Selected { containers: Vec<String>, clean: bool },
    NothingSelected,
    Everything { vm: StopOutcome },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellOutcome {
    Exited(i32),
    ShellNotFound { shell: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogsEnd {
    Completed,
    Cancelled,
}

/// `docker compose` scoped to the project root and to profile selections.
pub struct ServiceGroup<'a, R> {
    runner: &'a R,
    settings: &'a Settings,
    catalog: &'a ProfileCatalog,
}

impl<'a, R: ProcessRunner> ServiceGroup<'a, R> {
    pub fn new(runner: &'a R, settings: &'a Settings, catalog: &'a ProfileCatalog) -> Self {
        Self {
            runner,
            settings,
            catalog,
        }
    }

    fn compose(&self) -> Invocation {
        Invocation::new("docker")
            .arg("compose")
            .current_dir(&self.settings.project_root)
    }

    fn vm(&self) -> VmController<'a, R> {
        VmController::new(self.runner, self.settings)
    }

    /// Tear down every profile group, then bring up exactly `selection`.
    pub async fn up(&self, selection: &ResolvedSelection, detached: bool) -> Result<()> {
        let mut cleanup = self.compose();
        for profile in self.catalog.names() {
            cleanup = cleanup.args(["--profile".to_string(), profile]);
        }
        let cleanup = cleanup.arg("down");
        let output = self.runner.run(&cleanup).await?;
        if !output.success() {
            tracing::warn!(code = output.code, "orphan cleanup failed; continuing");
        }

        let mut up = self.compose();
        for profile in &selection.profiles {
            up = up.args(["--profile", profile.as_str()]);
        }
        up = up.arg("up");
        if detached {
            up = up.arg("-d");
        }
        let up = up.envs(&selection.environment).inherit_output();
        tracing::info!(profiles = ?selection.profiles, detached, "bringing services up");
        run_checked(self.runner, &up).await?;
        Ok(())
    }

    pub async fn down(&self, selection: Option<&ResolvedSelection>) -> Result<DownOutcome> {
        match selection {
            Some(selection) => {
                let containers = selection.container_names();
                if containers.is_empty() {
                    return Ok(DownOutcome::NothingSelected);
                }
                let inv = Invocation::new("docker")
                    .arg("stop")
                    .args(containers.iter().cloned());
                let output = self.runner.run(&inv).await?;
                if !output.success() {
                    tracing::warn!(code = output.code, stderr = %output.stderr_text().trim(), "some containers did not stop");
                }
                Ok(DownOutcome::Selected {
                    containers,
                    clean: output.success(),
                })
            }
            None => {
                if !self.vm().is_running().await? {
                    return Ok(DownOutcome::Everything {
                        vm: StopOutcome::WasNotRunning,
                    });
                }
                run_checked(self.runner, &self.compose().arg("down").inherit_output()).await?;
                let vm = self.vm().stop().await?;
                Ok(DownOutcome::Everything { vm })
            }
        }
    }

    pub async fn restart(&self) -> Result<()> {
        self.vm().require_running().await?;
        run_checked(self.runner, &self.compose().arg("restart").inherit_output()).await?;
        Ok(())
    }

    /// The compose service table, or `None` when nothing is running.
    pub async fn status_table(&self) -> Result<Option<String>> {
        let output = self
            .runner
            .run(&self.compose().args(["ps", "--format", "table"]))
            .await?;
        let text = output.stdout_text();
        // A table with only its header row lists no services.
        let rows = text.lines().filter(|l| !l.trim().is_empty()).count();
        if !output.success() || !text.contains("NAME") || rows < 2 {
            return Ok(None);
        }
        Ok(Some(text))
    }

    pub async fn health(&self) -> Result<HealthReport> {
        self.vm().require_running().await?;
        let output = run_checked(
            self.runner,
            &self.compose().args(["ps", "--format", "json"]),
        )
        .await?;
        let containers = parse_ps_json(&output.stdout_text())?;
        if containers.is_empty() {
            return Ok(HealthReport::NoServices);
        }
        Ok(HealthReport::Services(
            containers
                .into_iter()
                .map(|c| ServiceHealth {
                    classification: HealthState::classify(&c.state, &c.health),
                    service: c.service,
                    state: c.state,
                    health: c.health,
                })
                .collect(),
        ))
    }

    pub async fn service_running(&self, service: &str) -> Result<bool> {
        service_running(self.runner, self.settings, service).await
    }

    pub fn logs(&self, service: Option<&str>, follow: bool, tail: u32) -> Result<LineStream> {
        let mut inv = self.compose().arg("logs");
        if follow {
            inv = inv.arg("-f");
        }
        inv = inv.args(["--tail".to_string(), tail.to_string()]);
        if let Some(service) = service {
            inv = inv.arg(service);
        }
        self.runner.stream_lines(&inv)
    }

    /// Attach the caller's terminal to `shell` inside `service`.
    pub async fn shell(&self, service: &str, shell: &str) -> Result<ShellOutcome> {
        self.vm().require_running().await?;
        let inv = self
            .compose()
            .args(["exec", service, shell])
            .inherit_output();
        let output = self.runner.run(&inv).await?;
        // 126/127: the shell binary is missing or not executable in the container.
        match output.code {
            126 | 127 => Ok(ShellOutcome::ShellNotFound {
                shell: shell.to_string(),
            }),
            code => Ok(ShellOutcome::Exited(code)),
        }
    }
}

/// Forward lines to `sink` until the stream ends or `cancel` resolves.
/// Cancellation stops the producer and is not an error.
pub async fn pump_lines<C>(mut stream: LineStream, sink: &dyn OutputSink, cancel: C) -> Result<LogsEnd>
where
    C: Future<Output = ()>,
{
    tokio::pin!(cancel);
    loop {
        tokio::select! {
            biased;
            _ = &mut cancel => {
                stream.cancel().await?;
                return Ok(LogsEnd::Cancelled);
            }
            line = stream.next_line() => match line {
                Some(line) => sink.plain(line),
                None => break,
            },
        }
    }
    let code = stream.wait().await?;
    tracing::debug!(code, "log stream ended");
    Ok(LogsEnd::Completed)
}

/// Whether compose reports `service` as running.
pub async fn service_running<R: ProcessRunner>(
    runner: &R,
    settings: &Settings,
    service: &str,
) -> Result<bool> {
    let inv = Invocation::new("docker")
        .args(["compose", "ps", service, "--format", "json"])
        .current_dir(&settings.project_root);
    let output = runner.run(&inv).await?;
    if !output.success() {
        return Ok(false);
    }
    Ok(parse_ps_json(&output.stdout_text())?
        .iter()
        .any(|c| c.state == "running"))
}

/// `ps --format json` prints an array on older compose releases and one
/// object per line on newer ones.
pub(crate) fn parse_ps_json(raw: &str) -> Result<Vec<ComposeContainer>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    if raw.starts_with('[') {
        return Ok(serde_json::from_str(raw)?);
    }
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(DevstackError::from))
        .collect()
}
