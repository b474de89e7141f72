use std::path::PathBuf;

use chrono::NaiveDateTime;

/// Directory names double as creation timestamps.
pub const BACKUP_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A single per-service dump stored inside a backup set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub service: String,
    pub path: PathBuf,
}

/// A timestamped, write-once collection of service dumps and a config snapshot.
#[derive(Debug, Clone)]
pub struct BackupSet {
    pub id: String,
    pub path: PathBuf,
    pub created_at: NaiveDateTime,
    pub artifacts: Vec<Artifact>,
    pub config_snapshot: Option<PathBuf>,
}

impl BackupSet {
    /// A set without a single service artifact does not count as a backup.
    pub fn is_valid(&self) -> bool {
        !self.artifacts.is_empty()
    }

    pub fn artifact(&self, service: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.service == service)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Succeeded,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub service: String,
    pub status: StepStatus,
}

impl StepReport {
    pub fn succeeded(service: &str) -> Self {
        Self {
            service: service.to_string(),
            status: StepStatus::Succeeded,
        }
    }

    pub fn skipped(service: &str, reason: impl Into<String>) -> Self {
        Self {
            service: service.to_string(),
            status: StepStatus::Skipped(reason.into()),
        }
    }

    pub fn failed(service: &str, reason: impl Into<String>) -> Self {
        Self {
            service: service.to_string(),
            status: StepStatus::Failed(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Succeeded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    Complete,
    Partial,
    Failed,
}

/// Result of a backup or restore run: one report per attempted step.
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub set: BackupSet,
    pub steps: Vec<StepReport>,
}

impl BackupReport {
    pub fn outcome(&self) -> BackupOutcome {
        if self.steps.iter().all(StepReport::is_success) {
            BackupOutcome::Complete
        } else if self.set.is_valid() || self.set.config_snapshot.is_some() {
            BackupOutcome::Partial
        } else {
            BackupOutcome::Failed
        }
    }

    /// Partial with no service dump at all: only `.env` was saved.
    pub fn config_only(&self) -> bool {
        !self.set.is_valid() && self.set.config_snapshot.is_some()
    }

    /// Headline printed after a backup run.
    pub fn summary(&self) -> String {
        let id = &self.set.id;
        match self.outcome() {
            BackupOutcome::Complete => format!("✓ Backup {id} complete"),
            BackupOutcome::Partial if self.config_only() => {
                format!("⚠ Backup {id} is configuration only; no service data was captured:")
            }
            BackupOutcome::Partial => format!("⚠ Backup {id} completed with problems:"),
            BackupOutcome::Failed => format!("✗ Backup {id} produced no artifacts"),
        }
    }

    pub fn unsuccessful(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| !s.is_success())
    }
}

/// One row of the `restore` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupListing {
    pub name: String,
    pub created_at: Option<NaiveDateTime>,
    pub size_bytes: u64,
}

impl BackupListing {
    /// Parsed timestamp, or the raw directory name when it does not parse.
    pub fn display_date(&self) -> String {
        match self.created_at {
            Some(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => self.name.clone(),
        }
    }

    pub fn display_size(&self) -> String {
        format_size(self.size_bytes)
    }
}

/// Human-readable size in the style of `du -h`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["K", "M", "G", "T"];
    if bytes < 1024 {
        return format!("{bytes}B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1}{}", UNITS[unit])
}
