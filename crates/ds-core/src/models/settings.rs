use std::path::{Path, PathBuf};

use crate::error::{DevstackError, Result};

pub const PROFILES_FILENAME: &str = "profiles.yaml";

const DEFAULT_VM_PROFILE: &str = "default";
const DEFAULT_CPU: u32 = 4;
const DEFAULT_MEMORY_GIB: u32 = 8;
const DEFAULT_DISK_GIB: u32 = 60;
const DEFAULT_VAULT_ADDR: &str = "http://localhost:8200";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmResources {
    pub cpu: u32,
    pub memory_gib: u32,
    pub disk_gib: u32,
}

impl Default for VmResources {
    fn default() -> Self {
        Self {
            cpu: DEFAULT_CPU,
            memory_gib: DEFAULT_MEMORY_GIB,
            disk_gib: DEFAULT_DISK_GIB,
        }
    }
}

/// Everything an invocation needs to know about where things live.
/// Re-derived on every run; nothing here is persisted.
#[derive(Debug, Clone)]
pub struct Settings {
    pub project_root: PathBuf,
    pub vm_profile: String,
    pub resources: VmResources,
    pub vault_addr: String,
    pub vault_config_dir: PathBuf,
}

impl Settings {
    pub fn new(project_root: PathBuf, vault_config_dir: PathBuf) -> Self {
        Self {
            project_root,
            vm_profile: DEFAULT_VM_PROFILE.to_string(),
            resources: VmResources::default(),
            vault_addr: DEFAULT_VAULT_ADDR.to_string(),
            vault_config_dir,
        }
    }

    /// Build settings from the process environment and working directory.
    pub fn from_env() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Self::from_lookup(&cwd, |key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(cwd: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let project_root = match lookup("DEVSTACK_HOME") {
            Some(home) if !home.is_empty() => PathBuf::from(home),
            _ => find_project_root(cwd),
        };
        let vault_config_dir = match lookup("VAULT_CONFIG_DIR") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
                .join("vault"),
        };

        let mut settings = Self::new(project_root, vault_config_dir);
        if let Some(profile) = lookup("COLIMA_PROFILE").filter(|p| !p.is_empty()) {
            settings.vm_profile = profile;
        }
        if let Some(addr) = lookup("VAULT_ADDR").filter(|a| !a.is_empty()) {
            settings.vault_addr = addr.trim_end_matches('/').to_string();
        }
        settings.resources = VmResources {
            cpu: parse_number(&lookup, "COLIMA_CPU", DEFAULT_CPU)?,
            memory_gib: parse_number(&lookup, "COLIMA_MEMORY", DEFAULT_MEMORY_GIB)?,
            disk_gib: parse_number(&lookup, "COLIMA_DISK", DEFAULT_DISK_GIB)?,
        };
        Ok(settings)
    }

    pub fn profiles_file(&self) -> PathBuf {
        self.project_root.join(PROFILES_FILENAME)
    }

    pub fn profile_env_dir(&self) -> PathBuf {
        self.project_root.join("configs").join("profiles")
    }

    /// The configuration file captured by backups.
    pub fn env_file(&self) -> PathBuf {
        self.project_root.join(".env")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.project_root.join("backups")
    }

    pub fn vault_script(&self, name: &str) -> PathBuf {
        self.project_root
            .join("configs")
            .join("vault")
            .join("scripts")
            .join(name)
    }

    /// SQL that creates Forgejo's database, applied after vault-bootstrap.
    pub fn forgejo_db_sql(&self) -> PathBuf {
        self.project_root
            .join("configs")
            .join("postgres")
            .join("02-create-forgejo-db.sql")
    }

    pub fn root_token_file(&self) -> PathBuf {
        self.vault_config_dir.join("root-token")
    }

    pub fn unseal_keys_file(&self) -> PathBuf {
        self.vault_config_dir.join("keys.json")
    }

    pub fn ca_chain_file(&self) -> PathBuf {
        self.vault_config_dir.join("ca").join("ca-chain.pem")
    }

    pub fn debug_log_file(&self) -> PathBuf {
        self.project_root.join(".devstack-debug.log")
    }
}

fn parse_number<F>(lookup: &F, key: &str, default: u32) -> Result<u32>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
            DevstackError::InvalidConfig(format!("{key} must be a positive integer, got '{raw}'"))
        }),
        _ => Ok(default),
    }
}

/// Walk up from `start` looking for `profiles.yaml`; fall back to `start`.
pub fn find_project_root(start: &Path) -> PathBuf {
    let mut dir = start;
    loop {
        if dir.join(PROFILES_FILENAME).exists() {
            return dir.to_path_buf();
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => break,
        }
    }
    start.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let dir = tempfile::tempdir().unwrap();
        let settings =
            Settings::from_lookup(dir.path(), lookup(&[("VAULT_CONFIG_DIR", "/tmp/v")])).unwrap();
        assert_eq!(settings.vm_profile, "default");
        assert_eq!(settings.resources, VmResources::default());
        assert_eq!(settings.vault_addr, "http://localhost:8200");
        assert_eq!(settings.project_root, dir.path());
        assert_eq!(settings.root_token_file(), PathBuf::from("/tmp/v/root-token"));
    }

    #[test]
    fn each_sizing_variable_overrides_independently() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::from_lookup(
            dir.path(),
            lookup(&[("COLIMA_MEMORY", "12"), ("COLIMA_PROFILE", "devstack")]),
        )
        .unwrap();
        assert_eq!(settings.vm_profile, "devstack");
        assert_eq!(settings.resources.cpu, 4);
        assert_eq!(settings.resources.memory_gib, 12);
        assert_eq!(settings.resources.disk_gib, 60);
    }

    #[test]
    fn rejects_non_numeric_sizing() {
        let dir = tempfile::tempdir().unwrap();
        let result = Settings::from_lookup(dir.path(), lookup(&[("COLIMA_CPU", "lots")]));
        assert!(matches!(result, Err(DevstackError::InvalidConfig(_))));
    }

    #[test]
    fn finds_project_root_above_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PROFILES_FILENAME), "profiles: {}\n").unwrap();
        let nested = dir.path().join("configs").join("postgres");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_project_root(&nested), dir.path());
    }

    #[test]
    fn devstack_home_wins_over_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let settings =
            Settings::from_lookup(dir.path(), lookup(&[("DEVSTACK_HOME", "/srv/devstack")]))
                .unwrap();
        assert_eq!(settings.project_root, PathBuf::from("/srv/devstack"));
        assert_eq!(settings.backups_dir(), PathBuf::from("/srv/devstack/backups"));
    }
}
