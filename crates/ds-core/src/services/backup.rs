use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};

use crate::error::{DevstackError, Result};
use crate::models::backup::BACKUP_ID_FORMAT;
use crate::models::{
    Artifact, BackupListing, BackupOutcome, BackupReport, BackupSet, Settings, StepReport,
};
use crate::services::output::{Confirmer, OutputSink};
use crate::services::process::{Invocation, ProcessRunner};
use crate::services::vault::SecretStore;
use crate::services::vm::VmController;

const CONFIG_SNAPSHOT: &str = ".env.backup";
const CONFIG_STEP: &str = "config";

/// A credential read from the secret store and handed to the container
/// through an environment variable, never argv.
struct Credential {
    path: &'static str,
    key: &'static str,
    env: &'static str,
}

/// One stateful service: how to dump it, where the dump lives, how to load it back.
struct ServiceStep {
    service: &'static str,
    label: &'static str,
    artifact: &'static str,
    dump: &'static [&'static str],
    restore: &'static [&'static str],
    credential: Option<Credential>,
}

const STEPS: &[ServiceStep] = &[
    ServiceStep {
        service: "postgres",
        label: "PostgreSQL",
        artifact: "postgres_all.sql",
        dump: &["pg_dumpall", "-U", "dev_admin"],
        restore: &["psql", "-U", "dev_admin", "postgres"],
        credential: None,
    },
    ServiceStep {
        service: "mysql",
        label: "MySQL",
        artifact: "mysql_all.sql",
        dump: &["mysqldump", "-u", "root", "--all-databases"],
        restore: &["mysql", "-u", "root"],
        credential: Some(Credential {
            path: "mysql",
            key: "password",
            env: "MYSQL_PWD",
        }),
    },
    ServiceStep {
        service: "mongodb",
        label: "MongoDB",
        artifact: "mongodb_dump.archive",
        dump: &["mongodump", "--archive"],
        restore: &["mongorestore", "--archive", "--drop"],
        credential: None,
    },
    ServiceStep {
        service: "forgejo",
        label: "Forgejo",
        artifact: "forgejo_data.tar.gz",
        dump: &["tar", "czf", "-", "/data"],
        restore: &["sh", "-c", "rm -rf /data/* && tar xzf - -C /"],
        credential: None,
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored { name: String, steps: Vec<StepReport> },
    Cancelled,
}

/// Runs the fixed per-service backup and restore steps, one at a time.
/// A failing step is reported and the remaining steps still run.
pub struct BackupCoordinator<'a, R, S> {
    runner: &'a R,
    secrets: &'a S,
    settings: &'a Settings,
}

impl<'a, R: ProcessRunner, S: SecretStore> BackupCoordinator<'a, R, S> {
    pub fn new(runner: &'a R, secrets: &'a S, settings: &'a Settings) -> Self {
        Self {
            runner,
            secrets,
            settings,
        }
    }

    pub async fn backup(&self, sink: &dyn OutputSink) -> Result<BackupReport> {
        self.backup_at(Local::now().naive_local(), sink).await
    }

    pub async fn backup_at(&self, now: NaiveDateTime, sink: &dyn OutputSink) -> Result<BackupReport> {
        VmController::new(self.runner, self.settings)
            .require_running()
            .await?;

        let id = now.format(BACKUP_ID_FORMAT).to_string();
        let root = self.settings.backups_dir();
        std::fs::create_dir_all(&root)?;
        let dir = root.join(&id);
        if let Err(e) = std::fs::create_dir(&dir) {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                return Err(DevstackError::prerequisite(
                    format!("backup '{id}' already exists; refusing to overwrite it"),
                    "wait a second and run manage-devstack backup again",
                ));
            }
            return Err(e.into());
        }
        sink.info(format!("Creating backup in: {}", dir.display()));

        let mut set = BackupSet {
            id,
            path: dir.clone(),
            created_at: now,
            artifacts: Vec::new(),
            config_snapshot: None,
        };
        let mut steps = Vec::new();

        for step in STEPS {
            let report = self.dump_one(step, &dir).await;
            announce(sink, step.label, "backed up", &report);
            if report.is_success() {
                set.artifacts.push(Artifact {
                    service: step.service.to_string(),
                    path: dir.join(step.artifact),
                });
            }
            steps.push(report);
        }

        let snapshot = dir.join(CONFIG_SNAPSHOT);
        let report = copy_config(&self.settings.env_file(), &snapshot);
        announce(sink, "Configuration", "backed up", &report);
        if report.is_success() {
            set.config_snapshot = Some(snapshot);
        }
        steps.push(report);

        let report = BackupReport { set, steps };
        if report.outcome() == BackupOutcome::Failed {
            // Nothing was captured; an empty set must not be offered for restore.
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                tracing::warn!(dir = %dir.display(), error = %e, "could not remove empty backup");
            }
            tracing::warn!(id = %report.set.id, "backup captured nothing");
            return Ok(report);
        }
        tracing::info!(id = %report.set.id, artifacts = report.set.artifacts.len(), "backup finished");
        Ok(report)
    }

    async fn credential_env(&self, step: &ServiceStep) -> std::result::Result<Option<(String, String)>, String> {
        let Some(credential) = &step.credential else {
            return Ok(None);
        };
        match self
            .secrets
            .get_secret(credential.path, Some(credential.key))
            .await
        {
            Ok(fields) => match fields.get(credential.key) {
                Some(value) if !value.is_empty() => {
                    Ok(Some((credential.env.to_string(), value.clone())))
                }
                _ => Err("no credential".to_string()),
            },
            Err(e) => {
                tracing::warn!(service = step.service, error = %e, "credential lookup failed");
                Err(format!("no credential ({e})"))
            }
        }
    }

    fn exec(&self, step: &ServiceStep, args: &[&str], credential: &Option<(String, String)>) -> Invocation {
        let mut inv = Invocation::new("docker")
            .args(["compose", "exec", "-T"])
            .current_dir(&self.settings.project_root);
        if let Some((name, value)) = credential {
            inv = inv.args(["-e", name.as_str()]).env(name.clone(), value.clone());
        }
        inv.arg(step.service).args(args.iter().copied())
    }

    async fn dump_one(&self, step: &ServiceStep, dir: &Path) -> StepReport {
        let credential = match self.credential_env(step).await {
            Ok(credential) => credential,
            Err(reason) => return StepReport::skipped(step.service, reason),
        };
        let inv = self.exec(step, step.dump, &credential);
        match self.runner.run(&inv).await {
            Ok(output) if output.success() => {
                match std::fs::write(dir.join(step.artifact), &output.stdout) {
                    Ok(()) => StepReport::succeeded(step.service),
                    Err(e) => StepReport::failed(step.service, format!("could not write dump: {e}")),
                }
            }
            Ok(output) => StepReport::failed(step.service, exit_reason(output.code, &output.stderr_text())),
            Err(e) => StepReport::failed(step.service, e.to_string()),
        }
    }

    /// Restore every artifact present in the named backup, configuration last.
    pub async fn restore(
        &self,
        name: &str,
        confirmer: &dyn Confirmer,
        sink: &dyn OutputSink,
    ) -> Result<RestoreOutcome> {
        let dir = self.locate(name)?;
        VmController::new(self.runner, self.settings)
            .require_running()
            .await?;

        if !confirmer.confirm(&format!(
            "This will overwrite current data with backup '{name}'. Continue?"
        )) {
            return Ok(RestoreOutcome::Cancelled);
        }

        let mut steps = Vec::new();
        for step in STEPS {
            let report = self.load_one(step, &dir).await;
            announce(sink, step.label, "restored", &report);
            steps.push(report);
        }

        let report = copy_config(&dir.join(CONFIG_SNAPSHOT), &self.settings.env_file());
        announce(sink, "Configuration", "restored", &report);
        steps.push(report);

        tracing::info!(backup = name, "restore finished");
        Ok(RestoreOutcome::Restored {
            name: name.to_string(),
            steps,
        })
    }

    async fn load_one(&self, step: &ServiceStep, dir: &Path) -> StepReport {
        let artifact = dir.join(step.artifact);
        if !artifact.is_file() {
            return StepReport::skipped(step.service, "not in backup");
        }
        let payload = match std::fs::read(&artifact) {
            Ok(payload) => payload,
            Err(e) => return StepReport::failed(step.service, format!("could not read dump: {e}")),
        };
        let credential = match self.credential_env(step).await {
            Ok(credential) => credential,
            Err(reason) => return StepReport::skipped(step.service, reason),
        };
        let inv = self.exec(step, step.restore, &credential).stdin(payload);
        match self.runner.run(&inv).await {
            Ok(output) if output.success() => StepReport::succeeded(step.service),
            Ok(output) => StepReport::failed(step.service, exit_reason(output.code, &output.stderr_text())),
            Err(e) => StepReport::failed(step.service, e.to_string()),
        }
    }

    /// Only plain directory names under the backups directory are accepted.
    fn locate(&self, name: &str) -> Result<PathBuf> {
        let unsafe_name = name.is_empty()
            || name.contains(['/', '\\'])
            || name.contains("..")
            || name == ".";
        if unsafe_name {
            return Err(DevstackError::NotFound(name.to_string()));
        }
        let dir = self.settings.backups_dir().join(name);
        if !dir.is_dir() || !holds_backup(&dir) {
            return Err(DevstackError::NotFound(name.to_string()));
        }
        Ok(dir)
    }

    /// Available backups, newest first.
    pub fn list(&self) -> Result<Vec<BackupListing>> {
        list_backups(&self.settings.backups_dir())
    }
}

pub fn list_backups(root: &Path) -> Result<Vec<BackupListing>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut listings = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        listings.push(BackupListing {
            created_at: NaiveDateTime::parse_from_str(&name, BACKUP_ID_FORMAT).ok(),
            size_bytes: dir_size(&entry.path())?,
            name,
        });
    }
    // Timestamped sets newest first; unparsable names after them.
    listings.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.name.cmp(&a.name))
    });
    Ok(listings)
}

/// A set counts only when it holds at least one known artifact or the config snapshot.
fn holds_backup(dir: &Path) -> bool {
    STEPS
        .iter()
        .map(|step| step.artifact)
        .chain([CONFIG_SNAPSHOT])
        .any(|name| dir.join(name).is_file())
}

fn dir_size(path: &Path) -> Result<u64> {
    let mut total = 0;
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            total += dir_size(&entry.path())?;
        } else if file_type.is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

fn copy_config(from: &Path, to: &Path) -> StepReport {
    if !from.is_file() {
        return StepReport::skipped(CONFIG_STEP, format!("{} not found", from.display()));
    }
    match std::fs::copy(from, to) {
        Ok(_) => StepReport::succeeded(CONFIG_STEP),
        Err(e) => StepReport::failed(CONFIG_STEP, e.to_string()),
    }
}

fn exit_reason(code: i32, stderr: &str) -> String {
    match stderr.trim().lines().last() {
        Some(line) if !line.is_empty() => format!("exit {code}: {line}"),
        _ => format!("exit {code}"),
    }
}

fn announce(sink: &dyn OutputSink, label: &str, verb: &str, report: &StepReport) {
    use crate::models::StepStatus;
    match &report.status {
        StepStatus::Succeeded => sink.success(format!("✓ {label} {verb}")),
        StepStatus::Skipped(reason) => sink.warning(format!("⚠ {label} skipped ({reason})")),
        StepStatus::Failed(reason) => {
            tracing::warn!(service = %report.service, %reason, "step failed");
            sink.warning(format!("⚠ {label} failed ({reason})"))
        }
    }
}
