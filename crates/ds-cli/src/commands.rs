use std::process::ExitCode;

use ds_core::models::{
    BackupOutcome, ClusterTopology, HealthReport, HealthState, ProfileCatalog, Settings, StepStatus,
};
use ds_core::services::backup::{BackupCoordinator, RestoreOutcome};
use ds_core::services::bootstrap::{self, ForgejoDatabase, ServiceBootstrap};
use ds_core::services::cluster::{ClusterBootstrapper, ClusterOutcome};
use ds_core::services::compose::{self, DownOutcome, LogsEnd, ServiceGroup, ShellOutcome};
use ds_core::services::config_loader;
use ds_core::services::output::{OutputSink, Tone};
use ds_core::services::process::TokioRunner;
use ds_core::services::profile_resolver::ProfileResolver;
use ds_core::services::vault::{self, VaultClient};
use ds_core::services::vm::{ResetOutcome, StartOutcome, StopOutcome, VmController, VmState};
use ds_core::{DevstackError, Result};

use crate::cli::{Command, StartArgs};
use crate::console::PromptConfirmer;
use crate::render;

/// Everything a command handler needs for one invocation.
pub struct Context<'a> {
    pub settings: Settings,
    pub runner: TokioRunner,
    pub sink: &'a dyn OutputSink,
}

impl<'a> Context<'a> {
    pub fn new(settings: Settings, sink: &'a dyn OutputSink) -> Self {
        Self {
            settings,
            runner: TokioRunner,
            sink,
        }
    }

    fn vm(&self) -> VmController<'_, TokioRunner> {
        VmController::new(&self.runner, &self.settings)
    }

    fn catalog(&self) -> Result<ProfileCatalog> {
        config_loader::load_catalog(&self.settings.profiles_file())
    }

    fn resolver(&self) -> Result<ProfileResolver> {
        Ok(ProfileResolver::new(
            self.catalog()?,
            self.settings.profile_env_dir(),
        ))
    }
}

/// Run one command to completion.
pub async fn dispatch(command: Command, ctx: &Context<'_>) -> Result<ExitCode> {
    tracing::debug!(?command, "dispatching");
    match command {
        Command::Start(args) => start(ctx, args).await,
        Command::Stop { profiles } => stop(ctx, &profiles).await,
        Command::Restart => restart(ctx).await,
        Command::Status => status(ctx).await,
        Command::Health => health(ctx).await,
        Command::Reset { yes } => reset(ctx, yes).await,
        Command::Logs {
            service,
            follow,
            tail,
        } => logs(ctx, service.as_deref(), follow, tail).await,
        Command::Shell { service, shell } => shell_into(ctx, &service, &shell).await,
        Command::Profiles => profiles(ctx),
        Command::Ip => ip(ctx).await,
        Command::Backup => backup(ctx).await,
        Command::Restore { name, yes } => restore(ctx, name.as_deref(), yes).await,
        Command::VaultInit => vault_init(ctx).await,
        Command::VaultUnseal => vault_unseal(ctx).await,
        Command::VaultStatus => vault_status(ctx).await,
        Command::VaultToken => vault_token(ctx),
        Command::VaultBootstrap => vault_bootstrap(ctx).await,
        Command::VaultCaCert => vault_ca_cert(ctx),
        Command::VaultShowPassword { service } => vault_show_password(ctx, &service).await,
        Command::ForgejoInit => forgejo_init(ctx).await,
        Command::RedisClusterInit => redis_cluster_init(ctx).await,
    }
}

async fn start(ctx: &Context<'_>, args: StartArgs) -> Result<ExitCode> {
    let sink = ctx.sink;
    // Unknown profiles fail before anything external runs.
    let resolver = ctx.resolver()?;
    let selection = resolver.resolve(&args.profiles)?;

    sink.heading("Starting DevStack Core");
    sink.info(format!("Profiles: {}", selection.profiles.join(", ")));
    sink.dim(format!("Services: {}", selection.services.join(", ")));

    match ctx
        .vm()
        .ensure_running(ctx.settings.resources, &selection.environment)
        .await?
    {
        StartOutcome::AlreadyRunning => sink.success("✓ Colima VM already running"),
        StartOutcome::Started => sink.success("✓ Colima VM started"),
    }

    sink.info("Starting services...");
    let group = ServiceGroup::new(&ctx.runner, &ctx.settings, resolver.catalog());
    group.up(&selection, args.detached()).await?;
    sink.success("✓ Services started");

    if args.detached() {
        if let Some(table) = group.status_table().await? {
            sink.block(Tone::Plain, &table);
        }
    }

    sink.heading("Next Steps");
    if selection.includes_profile("standard") || selection.includes_profile("full") {
        sink.plain("  Initialize the Redis cluster:  manage-devstack redis-cluster-init");
    }
    sink.plain("  Check service health:          manage-devstack health");
    sink.plain("  Follow the logs:               manage-devstack logs -f");
    Ok(ExitCode::SUCCESS)
}

async fn stop(ctx: &Context<'_>, profiles: &[String]) -> Result<ExitCode> {
    let sink = ctx.sink;
    if profiles.is_empty() {
        sink.heading("Stopping DevStack Core");
        let catalog = ProfileCatalog::default();
        let group = ServiceGroup::new(&ctx.runner, &ctx.settings, &catalog);
        match group.down(None).await? {
            DownOutcome::Everything {
                vm: StopOutcome::Stopped,
            } => sink.success("✓ All services and the Colima VM stopped"),
            DownOutcome::Everything {
                vm: StopOutcome::WasNotRunning,
            } => sink.info("Colima VM was not running; nothing to stop"),
            other => tracing::warn!(?other, "unexpected outcome for a full stop"),
        }
        return Ok(ExitCode::SUCCESS);
    }

    let resolver = ctx.resolver()?;
    let selection = resolver.resolve(profiles)?;
    sink.heading(format!("Stopping profiles: {}", selection.profiles.join(", ")));
    let group = ServiceGroup::new(&ctx.runner, &ctx.settings, resolver.catalog());
    match group.down(Some(&selection)).await? {
        DownOutcome::Selected {
            containers,
            clean: true,
        } => sink.success(format!("✓ Stopped {}", containers.join(", "))),
        DownOutcome::Selected {
            containers,
            clean: false,
        } => sink.warning(format!(
            "⚠ Some containers were already stopped or missing: {}",
            containers.join(", ")
        )),
        DownOutcome::NothingSelected => sink.warning("⚠ The selected profiles have no services"),
        DownOutcome::Everything { .. } => {}
    }
    sink.dim("The Colima VM keeps running; use 'manage-devstack stop' to stop everything");
    Ok(ExitCode::SUCCESS)
}

async fn restart(ctx: &Context<'_>) -> Result<ExitCode> {
    let catalog = ProfileCatalog::default();
    let group = ServiceGroup::new(&ctx.runner, &ctx.settings, &catalog);
    ctx.sink.heading("Restarting services");
    group.restart().await?;
    ctx.sink.success("✓ Services restarted");
    if let Some(table) = group.status_table().await? {
        ctx.sink.block(Tone::Plain, &table);
    }
    Ok(ExitCode::SUCCESS)
}

async fn status(ctx: &Context<'_>) -> Result<ExitCode> {
    let sink = ctx.sink;
    sink.heading("DevStack Core Status");
    let vm = ctx.vm();
    if vm.state().await? == VmState::Stopped {
        sink.warning("Colima VM: not running");
        sink.dim("Start it with: manage-devstack start");
        return Ok(ExitCode::SUCCESS);
    }

    sink.success("Colima VM: running");
    sink.block(Tone::Dim, &vm.describe().await?);

    let catalog = ProfileCatalog::default();
    let group = ServiceGroup::new(&ctx.runner, &ctx.settings, &catalog);
    match group.status_table().await? {
        Some(table) => sink.block(Tone::Plain, &table),
        None => sink.warning("No services running"),
    }
    Ok(ExitCode::SUCCESS)
}

async fn health(ctx: &Context<'_>) -> Result<ExitCode> {
    let catalog = ProfileCatalog::default();
    let group = ServiceGroup::new(&ctx.runner, &ctx.settings, &catalog);
    ctx.sink.heading("Service Health");
    match group.health().await? {
        HealthReport::NoServices => {
            ctx.sink.warning("No services running");
            ctx.sink.dim("Start them with: manage-devstack start");
        }
        HealthReport::Services(services) => {
            ctx.sink.block(Tone::Plain, &render::health_table(&services));
            let healthy = services
                .iter()
                .filter(|s| s.classification == HealthState::RunningHealthy)
                .count();
            let starting = services
                .iter()
                .filter(|s| s.classification == HealthState::RunningStarting)
                .count();
            let mut summary = format!("{healthy}/{} services healthy", services.len());
            if starting > 0 {
                summary.push_str(&format!(", {starting} still starting"));
            }
            if healthy == services.len() {
                ctx.sink.success(summary);
            } else {
                ctx.sink.warning(summary);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn reset(ctx: &Context<'_>, yes: bool) -> Result<ExitCode> {
    ctx.sink.heading("Reset DevStack Core");
    ctx.sink
        .warning("⚠ This deletes the Colima VM and every container volume.");
    match ctx.vm().reset(&PromptConfirmer::new(yes)).await? {
        ResetOutcome::Reset => {
            ctx.sink.success("✓ Colima VM and container data deleted");
            ctx.sink.dim("Start fresh with: manage-devstack start");
        }
        ResetOutcome::Cancelled => ctx.sink.info("Reset cancelled; nothing was changed"),
    }
    Ok(ExitCode::SUCCESS)
}

async fn logs(ctx: &Context<'_>, service: Option<&str>, follow: bool, tail: u32) -> Result<ExitCode> {
    let catalog = ProfileCatalog::default();
    let group = ServiceGroup::new(&ctx.runner, &ctx.settings, &catalog);
    let stream = group.logs(service, follow, tail)?;
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "could not listen for interrupts");
            std::future::pending::<()>().await;
        }
    };
    match compose::pump_lines(stream, ctx.sink, interrupt).await? {
        LogsEnd::Completed => {}
        LogsEnd::Cancelled => ctx.sink.dim("Stopped following logs"),
    }
    Ok(ExitCode::SUCCESS)
}

async fn shell_into(ctx: &Context<'_>, service: &str, shell: &str) -> Result<ExitCode> {
    let catalog = ProfileCatalog::default();
    let group = ServiceGroup::new(&ctx.runner, &ctx.settings, &catalog);
    match group.shell(service, shell).await? {
        ShellOutcome::Exited(0) => Ok(ExitCode::SUCCESS),
        ShellOutcome::Exited(code) => Ok(ExitCode::from(u8::try_from(code).unwrap_or(1))),
        ShellOutcome::ShellNotFound { shell } => {
            ctx.sink
                .error(format!("✗ Shell '{shell}' not found in the {service} container"));
            ctx.sink.dim(format!(
                "Try another shell: manage-devstack shell {service} --shell sh"
            ));
            Ok(ExitCode::FAILURE)
        }
    }
}

fn profiles(ctx: &Context<'_>) -> Result<ExitCode> {
    let catalog = ctx.catalog()?;
    let sink = ctx.sink;
    sink.heading("Available Profiles");
    sink.block(Tone::Plain, &render::profiles_table(&catalog));
    if !catalog.custom_profiles.is_empty() {
        sink.heading("Custom Profiles");
        for (name, profile) in &catalog.custom_profiles {
            sink.plain(format!("  {name}: {}", profile.description));
        }
    }
    sink.dim("Combine profiles with: manage-devstack start --profile standard --profile reference");
    Ok(ExitCode::SUCCESS)
}

async fn ip(ctx: &Context<'_>) -> Result<ExitCode> {
    let vm = ctx.vm();
    vm.require_running().await?;
    match vm.address().await? {
        Some(address) => {
            ctx.sink.plain(address);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            ctx.sink.warning("Could not determine the Colima VM address");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn backup(ctx: &Context<'_>) -> Result<ExitCode> {
    let sink = ctx.sink;
    let secrets = VaultClient::from_settings(&ctx.settings)?;
    let coordinator = BackupCoordinator::new(&ctx.runner, &secrets, &ctx.settings);
    sink.heading("DevStack Core - Backup");
    let report = coordinator.backup(sink).await?;
    sink.info(format!("Backup directory: {}", report.set.path.display()));

    match report.outcome() {
        BackupOutcome::Complete => {
            sink.success(report.summary());
            Ok(ExitCode::SUCCESS)
        }
        BackupOutcome::Partial => {
            sink.warning(report.summary());
            for step in report.unsuccessful() {
                match &step.status {
                    StepStatus::Skipped(reason) => {
                        sink.warning(format!("  {} skipped: {reason}", step.service))
                    }
                    StepStatus::Failed(reason) => {
                        sink.warning(format!("  {} failed: {reason}", step.service))
                    }
                    StepStatus::Succeeded => {}
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        BackupOutcome::Failed => {
            sink.error(report.summary());
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn restore(ctx: &Context<'_>, name: Option<&str>, yes: bool) -> Result<ExitCode> {
    let sink = ctx.sink;
    let secrets = VaultClient::from_settings(&ctx.settings)?;
    let coordinator = BackupCoordinator::new(&ctx.runner, &secrets, &ctx.settings);

    let Some(name) = name else {
        let listings = coordinator.list()?;
        if listings.is_empty() {
            sink.warning(format!(
                "No backups found in {}",
                ctx.settings.backups_dir().display()
            ));
            return Ok(ExitCode::SUCCESS);
        }
        sink.heading("Available Backups");
        sink.block(Tone::Plain, &render::backups_table(&listings));
        sink.dim("Restore with: manage-devstack restore <backup>");
        return Ok(ExitCode::SUCCESS);
    };

    sink.heading(format!("DevStack Core - Restore {name}"));
    match coordinator
        .restore(name, &PromptConfirmer::new(yes), sink)
        .await?
    {
        RestoreOutcome::Cancelled => {
            sink.info("Restore cancelled; nothing was changed");
            Ok(ExitCode::SUCCESS)
        }
        RestoreOutcome::Restored { name, steps } => {
            let problems = steps
                .iter()
                .filter(|s| matches!(s.status, StepStatus::Failed(_)))
                .count();
            if problems == 0 {
                sink.success(format!("✓ Restored backup {name}"));
            } else {
                sink.warning(format!(
                    "⚠ Restored backup {name}; {problems} step(s) failed"
                ));
            }
            sink.dim("Restart services to pick up restored data: manage-devstack restart");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn vault_init(ctx: &Context<'_>) -> Result<ExitCode> {
    ctx.sink.heading("Vault Initialization");
    ServiceBootstrap::new(&ctx.runner, &ctx.settings)
        .vault_init()
        .await?;
    ctx.sink.success("✓ Vault initialized and unsealed");
    ctx.sink.info(format!(
        "Root token stored at {}",
        ctx.settings.root_token_file().display()
    ));
    ctx.sink.dim("Next: manage-devstack vault-bootstrap");
    Ok(ExitCode::SUCCESS)
}

async fn vault_unseal(ctx: &Context<'_>) -> Result<ExitCode> {
    ctx.vm().require_running().await?;
    let keys = vault::read_unseal_keys(&ctx.settings)?;
    let client = VaultClient::from_settings(&ctx.settings)?;
    ctx.sink.heading("Unsealing Vault");
    let progress = bootstrap::unseal(&client, &keys, ctx.sink).await?;
    if progress.sealed {
        ctx.sink.warning(format!(
            "⚠ Vault is still sealed ({}/{} key shares accepted)",
            progress.progress, progress.threshold
        ));
        return Ok(ExitCode::FAILURE);
    }
    ctx.sink.success("✓ Vault unsealed");
    Ok(ExitCode::SUCCESS)
}

fn yes_no(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "yes",
        Some(false) => "no",
        None => "unknown",
    }
}

async fn vault_status(ctx: &Context<'_>) -> Result<ExitCode> {
    ctx.vm().require_running().await?;
    let client = VaultClient::from_settings(&ctx.settings)?;
    let health = client.check_health().await;
    let sink = ctx.sink;

    sink.heading("Vault Status");
    sink.plain(format!("Address:     {}", ctx.settings.vault_addr));
    if health.is_healthy() {
        sink.success("Status:      healthy");
    } else {
        sink.warning("Status:      unhealthy");
    }
    sink.plain(format!("Initialized: {}", yes_no(health.initialized)));
    sink.plain(format!("Sealed:      {}", yes_no(health.sealed)));
    sink.plain(format!("Standby:     {}", yes_no(health.standby)));
    if let Some(error) = &health.error {
        sink.warning(format!("Error:       {error}"));
    }

    let token_file = ctx.settings.root_token_file();
    if token_file.exists() {
        sink.info(format!("Root token:  {}", token_file.display()));
    } else {
        sink.warning("Root token:  not found (run manage-devstack vault-init)");
    }
    Ok(ExitCode::SUCCESS)
}

fn vault_token(ctx: &Context<'_>) -> Result<ExitCode> {
    ctx.sink.plain(vault::read_root_token(&ctx.settings)?);
    Ok(ExitCode::SUCCESS)
}

async fn vault_bootstrap(ctx: &Context<'_>) -> Result<ExitCode> {
    let token = vault::resolve_token(&ctx.settings, std::env::var("VAULT_TOKEN").ok())?;
    ctx.sink.heading("Vault Bootstrap");
    let database = ServiceBootstrap::new(&ctx.runner, &ctx.settings)
        .vault_bootstrap(&token)
        .await?;
    match database {
        ForgejoDatabase::Created => ctx.sink.success("✓ Forgejo database created successfully"),
        ForgejoDatabase::NotReady(_) => ctx
            .sink
            .warning("⚠ Forgejo database may already exist or PostgreSQL is not ready"),
        ForgejoDatabase::NoScript => {}
    }
    ctx.sink.success("✓ Vault PKI and service credentials bootstrapped");
    ctx.sink
        .dim("Show a credential with: manage-devstack vault-show-password <service>");
    Ok(ExitCode::SUCCESS)
}

fn vault_ca_cert(ctx: &Context<'_>) -> Result<ExitCode> {
    let path = ctx.settings.ca_chain_file();
    if !path.is_file() {
        return Err(DevstackError::prerequisite(
            format!("CA certificate chain not found at {}", path.display()),
            "manage-devstack vault-bootstrap",
        ));
    }
    ctx.sink
        .block(Tone::Plain, &std::fs::read_to_string(&path)?);
    Ok(ExitCode::SUCCESS)
}

async fn vault_show_password(ctx: &Context<'_>, service: &str) -> Result<ExitCode> {
    bootstrap::credential_fields(service)?;
    let client = VaultClient::from_settings(&ctx.settings)?;
    for (label, value) in bootstrap::show_credentials(&client, service).await? {
        ctx.sink.plain(format!("{label}: {value}"));
    }
    Ok(ExitCode::SUCCESS)
}

async fn forgejo_init(ctx: &Context<'_>) -> Result<ExitCode> {
    ctx.sink.heading("Forgejo Initialization");
    ServiceBootstrap::new(&ctx.runner, &ctx.settings)
        .forgejo_init()
        .await?;
    ctx.sink.success("✓ Forgejo initialized");
    ctx.sink
        .dim("Admin credentials: manage-devstack vault-show-password forgejo");
    Ok(ExitCode::SUCCESS)
}

async fn redis_cluster_init(ctx: &Context<'_>) -> Result<ExitCode> {
    ctx.vm().require_running().await?;
    let client = VaultClient::from_settings(&ctx.settings)?;
    ctx.sink.heading("Redis Cluster Initialization");
    let outcome = ClusterBootstrapper::new(&ctx.runner, &client, ClusterTopology::default())
        .init_cluster()
        .await?;
    match &outcome {
        ClusterOutcome::Created { .. } => ctx.sink.success("✓ Redis cluster created"),
        ClusterOutcome::AlreadyInitialized { .. } => {
            ctx.sink.info("Redis cluster already initialized")
        }
    }
    if !outcome.nodes().is_empty() {
        ctx.sink
            .block(Tone::Plain, &render::cluster_table(outcome.nodes()));
    }
    Ok(ExitCode::SUCCESS)
}
