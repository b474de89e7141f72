// Each test binary compiles this module independently and uses a different
// subset of helpers, so unused-function warnings are expected.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::TempDir;

use ds_core::models::{Profile, ProfileCatalog, ProfileResources};

pub const PROFILES_YAML: &str = "\
profiles:
  minimal:
    description: Essentials
    services: [vault, postgres]
    resources:
      ram_estimate: 2GB
  standard:
    description: Full stack
    services: [vault, postgres, redis-1]
custom_profiles:
  reference:
    description: Reference apps
    services: [reference-api]
";

/// A throwaway project root with its own secrets-store config directory.
pub struct Project {
    pub dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("profiles.yaml"), PROFILES_YAML).unwrap();
        Self { dir }
    }

    /// A project root without `profiles.yaml`.
    pub fn bare() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn vault_dir(&self) -> PathBuf {
        self.root().join("vault-config")
    }

    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.root().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// The binary, pointed at this project with a clean environment.
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("manage-devstack").unwrap();
        cmd.current_dir(self.root())
            .env("DEVSTACK_HOME", self.root())
            .env("VAULT_CONFIG_DIR", self.vault_dir())
            .env("VAULT_ADDR", "http://127.0.0.1:9")
            .env("NO_COLOR", "1")
            .env_remove("VAULT_TOKEN")
            .env_remove("RUST_LOG")
            .env_remove("DEVSTACK_DEBUG")
            .env_remove("COLIMA_PROFILE")
            .env_remove("COLIMA_CPU")
            .env_remove("COLIMA_MEMORY")
            .env_remove("COLIMA_DISK");
        cmd
    }
}

/// The catalog described by [`PROFILES_YAML`], built in memory.
pub fn sample_catalog() -> ProfileCatalog {
    let mut catalog = ProfileCatalog::default();
    catalog.profiles.insert(
        "minimal".into(),
        Profile {
            description: "Essentials".into(),
            services: vec!["vault".into(), "postgres".into()],
            resources: ProfileResources {
                ram_estimate: Some("2GB".into()),
            },
        },
    );
    catalog.profiles.insert(
        "standard".into(),
        Profile {
            description: "Full stack".into(),
            services: vec!["vault".into(), "postgres".into(), "redis-1".into()],
            resources: ProfileResources::default(),
        },
    );
    catalog
}
