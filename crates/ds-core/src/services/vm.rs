use indexmap::IndexMap;

use crate::error::{DevstackError, Result};
use crate::models::{Settings, VmResources};
use crate::services::output::Confirmer;
use crate::services::process::{run_checked, Invocation, ProcessRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    WasNotRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    Reset,
    Cancelled,
}

/// Drives the Colima VM. Every method re-reads the VM state; nothing is cached.
pub struct VmController<'a, R> {
    runner: &'a R,
    settings: &'a Settings,
}

impl<'a, R: ProcessRunner> VmController<'a, R> {
    pub fn new(runner: &'a R, settings: &'a Settings) -> Self {
        Self { runner, settings }
    }

    fn colima(&self) -> Invocation {
        Invocation::new("colima")
    }

    pub async fn state(&self) -> Result<VmState> {
        let inv = self
            .colima()
            .args(["status", "-p", self.settings.vm_profile.as_str()]);
        let output = self.runner.run(&inv).await?;
        // colima reports status on stderr
        let text = output.combined_text().to_lowercase();
        let running = output.success() && text.contains("running") && !text.contains("not running");
        Ok(if running {
            VmState::Running
        } else {
            VmState::Stopped
        })
    }

    pub async fn is_running(&self) -> Result<bool> {
        Ok(self.state().await? == VmState::Running)
    }

    /// Fail with a `Prerequisite` pointing at `start` unless the VM is up.
    pub async fn require_running(&self) -> Result<()> {
        if self.is_running().await? {
            return Ok(());
        }
        Err(DevstackError::prerequisite(
            "Colima VM is not running",
            "manage-devstack start",
        ))
    }

    pub async fn ensure_running(
        &self,
        resources: VmResources,
        env: &IndexMap<String, String>,
    ) -> Result<StartOutcome> {
        if self.is_running().await? {
            tracing::info!(profile = %self.settings.vm_profile, "vm already running");
            return Ok(StartOutcome::AlreadyRunning);
        }
        let inv = self
            .colima()
            .args(["start", "-p", self.settings.vm_profile.as_str()])
            .args(["--cpu".to_string(), resources.cpu.to_string()])
            .args(["--memory".to_string(), resources.memory_gib.to_string()])
            .args(["--disk".to_string(), resources.disk_gib.to_string()])
            .arg("--network-address")
            .envs(env)
            .inherit_output();
        tracing::info!(
            profile = %self.settings.vm_profile,
            cpu = resources.cpu,
            memory = resources.memory_gib,
            disk = resources.disk_gib,
            "starting vm"
        );
        run_checked(self.runner, &inv).await?;
        Ok(StartOutcome::Started)
    }

    pub async fn stop(&self) -> Result<StopOutcome> {
        if !self.is_running().await? {
            return Ok(StopOutcome::WasNotRunning);
        }
        let inv = self
            .colima()
            .args(["stop", "-p", self.settings.vm_profile.as_str()])
            .inherit_output();
        run_checked(self.runner, &inv).await?;
        tracing::info!(profile = %self.settings.vm_profile, "vm stopped");
        Ok(StopOutcome::Stopped)
    }

    /// Remove every container and volume, then delete the VM. Nothing runs
    /// unless `confirmer` agrees.
    pub async fn reset(&self, confirmer: &dyn Confirmer) -> Result<ResetOutcome> {
        if !confirmer.confirm(
            "This deletes the Colima VM and ALL container data including volumes. Continue?",
        ) {
            return Ok(ResetOutcome::Cancelled);
        }

        let down = Invocation::new("docker")
            .args(["compose", "down", "-v"])
            .current_dir(&self.settings.project_root)
            .inherit_output();
        let output = self.runner.run(&down).await?;
        if !output.success() {
            // The VM may already be gone; deleting it still applies.
            tracing::warn!(code = output.code, "compose teardown failed during reset");
        }

        let delete = self
            .colima()
            .args(["delete", "-p", self.settings.vm_profile.as_str(), "--force"])
            .inherit_output();
        run_checked(self.runner, &delete).await?;
        tracing::info!(profile = %self.settings.vm_profile, "vm reset");
        Ok(ResetOutcome::Reset)
    }

    /// The VM's network address, when colima reports one.
    pub async fn address(&self) -> Result<Option<String>> {
        let inv = self
            .colima()
            .args(["ls", "-p", self.settings.vm_profile.as_str(), "-j"]);
        let output = self.runner.run(&inv).await?;
        if !output.success() {
            return Ok(None);
        }
        Ok(parse_address(&output.stdout_text()))
    }

    /// Human-readable `colima list` table for this profile.
    pub async fn describe(&self) -> Result<String> {
        let inv = self
            .colima()
            .args(["list", "-p", self.settings.vm_profile.as_str()]);
        Ok(self.runner.run(&inv).await?.stdout_text())
    }
}

/// Accepts a JSON object, an array of objects, or newline-delimited objects.
fn parse_address(raw: &str) -> Option<String> {
    let from_value = |value: &serde_json::Value| -> Option<String> {
        let entry = match value {
            serde_json::Value::Array(items) => items.first()?,
            other => other,
        };
        entry
            .get("address")
            .and_then(serde_json::Value::as_str)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
    };
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw.trim()) {
        return from_value(&value);
    }
    raw.lines()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
        .find_map(|v| from_value(&v))
}
