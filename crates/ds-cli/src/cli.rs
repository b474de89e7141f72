use clap::{Args, Parser, Subcommand};

/// Manage the local development stack: the Colima VM, profile-selected
/// services, Vault, backups and the Redis cluster.
#[derive(Debug, Parser)]
#[command(name = "manage-devstack", version)]
pub struct Cli {
    /// Write a debug log to .devstack-debug.log in the project root
    #[arg(long, global = true, env = "DEVSTACK_DEBUG")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the Colima VM and the services of the selected profiles
    Start(StartArgs),
    /// Stop the services of the given profiles, or everything including the VM
    Stop {
        /// Only stop services belonging to these profiles
        #[arg(short, long = "profile", value_name = "PROFILE")]
        profiles: Vec<String>,
    },
    /// Restart all running services
    Restart,
    /// Show VM and service status
    Status,
    /// Check health of all running services
    Health,
    /// Delete the VM and all container data (destructive)
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show service logs
    Logs {
        /// Only show logs for this service
        service: Option<String>,
        /// Keep streaming new lines until interrupted
        #[arg(short, long)]
        follow: bool,
        /// Number of lines to show from the end of the logs
        #[arg(short = 'n', long, default_value_t = 100)]
        tail: u32,
    },
    /// Open an interactive shell inside a service container
    Shell {
        service: String,
        /// Shell program to run inside the container
        #[arg(short, long, default_value = "sh")]
        shell: String,
    },
    /// List available service profiles
    Profiles,
    /// Show the Colima VM's IP address
    Ip,
    /// Back up all service data into a timestamped directory
    Backup,
    /// Restore from a backup, or list backups when no name is given
    Restore {
        /// Backup directory name, e.g. 20250110_143022
        name: Option<String>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Initialize and unseal Vault (manual)
    VaultInit,
    /// Unseal Vault with the stored unseal keys
    VaultUnseal,
    /// Show Vault health and root token location
    VaultStatus,
    /// Print the Vault root token to stdout
    VaultToken,
    /// Bootstrap Vault PKI and service credentials
    VaultBootstrap,
    /// Print the Vault CA certificate chain to stdout
    VaultCaCert,
    /// Show a service's credentials from Vault
    VaultShowPassword {
        /// postgres, mysql, redis-1, redis-2, redis-3, rabbitmq, mongodb or forgejo
        service: String,
    },
    /// Create the Forgejo admin user and initial configuration
    ForgejoInit,
    /// Create the 3-node Redis cluster (standard and full profiles)
    RedisClusterInit,
}

#[derive(Debug, Args)]
pub struct StartArgs {
    /// Service profile(s) to start; repeat to combine
    #[arg(short, long = "profile", value_name = "PROFILE", default_value = "standard")]
    pub profiles: Vec<String>,

    /// Run services in the background (default)
    #[arg(short, long, overrides_with = "no_detach")]
    pub detach: bool,

    /// Run services in the foreground
    #[arg(long, overrides_with = "detach")]
    pub no_detach: bool,
}

impl StartArgs {
    pub fn detached(&self) -> bool {
        !self.no_detach
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("manage-devstack").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn start_defaults_to_standard_detached() {
        let Command::Start(args) = parse(&["start"]).command else {
            panic!("expected start");
        };
        assert_eq!(args.profiles, vec!["standard"]);
        assert!(args.detached());
    }

    #[test]
    fn repeated_profiles_keep_order() {
        let Command::Start(args) = parse(&["start", "-p", "minimal", "--profile", "reference", "--no-detach"]).command
        else {
            panic!("expected start");
        };
        assert_eq!(args.profiles, vec!["minimal", "reference"]);
        assert!(!args.detached());
    }

    #[test]
    fn last_detach_flag_wins() {
        let Command::Start(args) = parse(&["start", "--no-detach", "-d"]).command else {
            panic!("expected start");
        };
        assert!(args.detached());
    }

    #[test]
    fn logs_defaults() {
        let cli = parse(&["logs", "vault", "-f", "--debug"]);
        assert!(cli.debug);
        match cli.command {
            Command::Logs {
                service,
                follow,
                tail,
            } => {
                assert_eq!(service.as_deref(), Some("vault"));
                assert!(follow);
                assert_eq!(tail, 100);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn kebab_case_command_names() {
        assert!(matches!(
            parse(&["vault-show-password", "mysql"]).command,
            Command::VaultShowPassword { .. }
        ));
        assert!(matches!(
            parse(&["redis-cluster-init"]).command,
            Command::RedisClusterInit
        ));
        assert!(matches!(parse(&["vault-ca-cert"]).command, Command::VaultCaCert));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
