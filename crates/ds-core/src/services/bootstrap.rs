use std::path::PathBuf;

use crate::error::{DevstackError, Result};
use crate::models::{Settings, UnsealProgress};
use crate::services::compose;
use crate::services::output::OutputSink;
use crate::services::process::{run_checked, Invocation, ProcessRunner};
use crate::services::vault::{SecretStore, VaultClient};
use crate::services::vm::VmController;

/// Services with credentials in the secret store.
pub const PASSWORD_SERVICES: &[&str] = &[
    "postgres", "mysql", "redis-1", "redis-2", "redis-3", "rabbitmq", "mongodb", "forgejo",
];

const FORGEJO_BOOTSTRAP: &str = "/usr/local/bin/forgejo-bootstrap.sh";

/// What happened to Forgejo's database after the secrets bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForgejoDatabase {
    Created,
    /// psql refused; the database may already exist or postgres is still starting.
    NotReady(String),
    /// No SQL file in the checkout, so nothing was attempted.
    NoScript,
}

/// Runs the one-time setup scripts that live next to the stack.
pub struct ServiceBootstrap<'a, R> {
    runner: &'a R,
    settings: &'a Settings,
}

impl<'a, R: ProcessRunner> ServiceBootstrap<'a, R> {
    pub fn new(runner: &'a R, settings: &'a Settings) -> Self {
        Self { runner, settings }
    }

    fn script(&self, name: &str) -> Result<PathBuf> {
        let path = self.settings.vault_script(name);
        if !path.is_file() {
            return Err(DevstackError::prerequisite(
                format!("Vault script not found at {}", path.display()),
                "run manage-devstack from the devstack checkout or set DEVSTACK_HOME",
            ));
        }
        Ok(path)
    }

    pub async fn vault_init(&self) -> Result<()> {
        VmController::new(self.runner, self.settings)
            .require_running()
            .await?;
        let script = self.script("vault-init.sh")?;
        let inv = Invocation::new("bash")
            .arg(script.to_string_lossy())
            .current_dir(&self.settings.project_root)
            .inherit_output();
        run_checked(self.runner, &inv).await?;
        Ok(())
    }

    /// Run the PKI and secrets bootstrap script against the configured store,
    /// then prepare Forgejo's database. Only the script can fail the command.
    pub async fn vault_bootstrap(&self, token: &str) -> Result<ForgejoDatabase> {
        VmController::new(self.runner, self.settings)
            .require_running()
            .await?;
        let script = self.script("vault-bootstrap.sh")?;
        let inv = Invocation::new("bash")
            .arg(script.to_string_lossy())
            .env("VAULT_ADDR", self.settings.vault_addr.as_str())
            .env("VAULT_TOKEN", token)
            .current_dir(&self.settings.project_root)
            .inherit_output();
        run_checked(self.runner, &inv).await?;
        self.create_forgejo_database().await
    }

    async fn create_forgejo_database(&self) -> Result<ForgejoDatabase> {
        let sql = self.settings.forgejo_db_sql();
        if !sql.is_file() {
            tracing::debug!(path = %sql.display(), "no forgejo database script");
            return Ok(ForgejoDatabase::NoScript);
        }
        let inv = Invocation::new("docker")
            .args(["compose", "exec", "-T", "postgres", "psql", "-U", "devuser", "-d", "postgres"])
            .current_dir(&self.settings.project_root)
            .stdin(std::fs::read(&sql)?);
        let outcome = match self.runner.run(&inv).await {
            Ok(output) if output.success() => ForgejoDatabase::Created,
            Ok(output) => ForgejoDatabase::NotReady(output.stderr_text().trim().to_string()),
            Err(e) => ForgejoDatabase::NotReady(e.to_string()),
        };
        if let ForgejoDatabase::NotReady(reason) = &outcome {
            tracing::warn!(%reason, "forgejo database step did not complete");
        }
        Ok(outcome)
    }

    pub async fn forgejo_init(&self) -> Result<()> {
        VmController::new(self.runner, self.settings)
            .require_running()
            .await?;
        if !compose::service_running(self.runner, self.settings, "forgejo").await? {
            return Err(DevstackError::prerequisite(
                "Forgejo container is not running",
                "manage-devstack start --profile minimal",
            ));
        }
        let inv = Invocation::new("docker")
            .args(["compose", "exec", "forgejo", FORGEJO_BOOTSTRAP])
            .current_dir(&self.settings.project_root)
            .inherit_output();
        run_checked(self.runner, &inv).await?;
        Ok(())
    }
}

/// Fields shown by `vault-show-password` for `service`.
pub fn credential_fields(service: &str) -> Result<&'static [(&'static str, &'static str)]> {
    if !PASSWORD_SERVICES.iter().any(|s| *s == service) {
        return Err(DevstackError::InvalidPath {
            path: service.to_string(),
            reason: format!("unknown service; available: {}", PASSWORD_SERVICES.join(", ")),
        });
    }
    let fields: &'static [(&'static str, &'static str)] = match service {
        "forgejo" => &[
            ("admin_user", "Username"),
            ("admin_email", "Email"),
            ("admin_password", "Password"),
        ],
        _ => &[("password", "Password")],
    };
    Ok(fields)
}

/// Label and value for every credential field of `service`.
pub async fn show_credentials<S: SecretStore>(
    secrets: &S,
    service: &str,
) -> Result<Vec<(&'static str, String)>> {
    let mut shown = Vec::new();
    for (key, label) in credential_fields(service)? {
        let mut fields = secrets.get_secret(service, Some(*key)).await?;
        let value = fields
            .shift_remove(*key)
            .ok_or_else(|| DevstackError::SecretNotFound {
                path: service.to_string(),
                key: Some(key.to_string()),
            })?;
        shown.push((*label, value));
    }
    Ok(shown)
}

/// Submit key shares until the store reports unsealed.
pub async fn unseal(
    client: &VaultClient,
    keys: &[String],
    sink: &dyn OutputSink,
) -> Result<UnsealProgress> {
    let mut last = None;
    for (i, key) in keys.iter().enumerate() {
        sink.dim(format!("Unsealing with key {}/{}...", i + 1, keys.len()));
        let progress = client.unseal(key).await?;
        let sealed = progress.sealed;
        last = Some(progress);
        if !sealed {
            break;
        }
    }
    last.ok_or_else(|| DevstackError::prerequisite("no unseal keys given", "manage-devstack vault-init"))
}
