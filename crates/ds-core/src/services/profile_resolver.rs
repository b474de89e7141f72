use std::path::PathBuf;

use indexmap::IndexMap;

use crate::error::{DevstackError, Result};
use crate::models::{ProfileCatalog, ResolvedSelection};
use crate::services::config_loader;

/// Used when the caller names no profile at all.
pub const DEFAULT_PROFILE: &str = "standard";

pub struct ProfileResolver {
    catalog: ProfileCatalog,
    env_dir: PathBuf,
}

impl ProfileResolver {
    pub fn new(catalog: ProfileCatalog, env_dir: PathBuf) -> Self {
        Self { catalog, env_dir }
    }

    pub fn catalog(&self) -> &ProfileCatalog {
        &self.catalog
    }

    /// Every name is validated before any service or env file is touched,
    /// so an unknown profile resolves nothing.
    pub fn resolve<S: AsRef<str>>(&self, requested: &[S]) -> Result<ResolvedSelection> {
        let names: Vec<String> = if requested.is_empty() {
            vec![DEFAULT_PROFILE.to_string()]
        } else {
            requested.iter().map(|s| s.as_ref().to_string()).collect()
        };

        for name in &names {
            if self.catalog.get(name).is_none() {
                return Err(DevstackError::UnknownProfile {
                    name: name.clone(),
                    available: self.catalog.names(),
                });
            }
        }

        let mut profiles: Vec<String> = Vec::new();
        let mut services: Vec<String> = Vec::new();
        let mut environment = IndexMap::new();

        for name in &names {
            if profiles.contains(name) {
                continue;
            }
            profiles.push(name.clone());

            if let Some(profile) = self.catalog.get(name) {
                for service in &profile.services {
                    if !services.contains(service) {
                        services.push(service.clone());
                    }
                }
            }

            for (key, value) in config_loader::load_profile_env(&self.env_dir, name)? {
                // Later profiles win; shift_remove keeps the winner at its new position.
                environment.shift_remove(&key);
                environment.insert(key, value);
            }
        }

        tracing::debug!(?profiles, service_count = services.len(), "resolved profiles");
        Ok(ResolvedSelection {
            profiles,
            services,
            environment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Profile;
    use std::fs;

    fn profile(services: &[&str]) -> Profile {
        Profile {
            description: String::new(),
            services: services.iter().map(|s| s.to_string()).collect(),
            resources: Default::default(),
        }
    }

    fn resolver(dir: &std::path::Path) -> ProfileResolver {
        let mut catalog = ProfileCatalog::default();
        catalog
            .profiles
            .insert("standard".into(), profile(&["a", "b", "c"]));
        catalog.profiles.insert("reference".into(), profile(&["c", "d"]));
        catalog.profiles.insert("p1".into(), profile(&["a"]));
        catalog.profiles.insert("p2".into(), profile(&["b"]));
        catalog.custom_profiles.insert("extra".into(), profile(&["e", "a"]));
        ProfileResolver::new(catalog, dir.to_path_buf())
    }

    #[test]
    fn union_keeps_first_occurrence_order() {
        let dir = tempfile::tempdir().unwrap();
        let selection = resolver(dir.path())
            .resolve(&["standard", "reference"])
            .unwrap();
        assert_eq!(selection.services, vec!["a", "b", "c", "d"]);
        assert_eq!(selection.profiles, vec!["standard", "reference"]);
    }

    #[test]
    fn shared_service_appears_once_at_first_position() {
        let dir = tempfile::tempdir().unwrap();
        let selection = resolver(dir.path()).resolve(&["extra", "standard"]).unwrap();
        assert_eq!(selection.services, vec!["e", "a", "b", "c"]);
    }

    #[test]
    fn empty_request_uses_default_profile() {
        let dir = tempfile::tempdir().unwrap();
        let selection = resolver(dir.path()).resolve::<&str>(&[]).unwrap();
        assert_eq!(selection.profiles, vec!["standard"]);
        assert_eq!(selection.container_names(), vec!["dev-a", "dev-b", "dev-c"]);
    }

    #[test]
    fn unknown_profile_fails_with_available_names() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolver(dir.path())
            .resolve(&["standard", "nope"])
            .unwrap_err();
        match err {
            DevstackError::UnknownProfile { name, available } => {
                assert_eq!(name, "nope");
                assert_eq!(available, vec!["standard", "reference", "p1", "p2", "extra"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn later_profile_wins_env_collisions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("p1.env"), "K=1\nONLY_P1=x\n").unwrap();
        fs::write(dir.path().join("p2.env"), "K=2\n").unwrap();
        let r = resolver(dir.path());

        let forward = r.resolve(&["p1", "p2"]).unwrap();
        assert_eq!(forward.environment.get("K").map(String::as_str), Some("2"));
        assert_eq!(forward.environment.get("ONLY_P1").map(String::as_str), Some("x"));

        let reverse = r.resolve(&["p2", "p1"]).unwrap();
        assert_eq!(reverse.environment.get("K").map(String::as_str), Some("1"));
    }

    #[test]
    fn profile_without_env_file_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let selection = resolver(dir.path()).resolve(&["reference"]).unwrap();
        assert!(selection.environment.is_empty());
    }
}
