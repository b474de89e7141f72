use std::path::Path;

use indexmap::IndexMap;

use crate::error::{DevstackError, Result};
use crate::models::{Profile, ProfileCatalog};

/// Load and validate the profile catalog.
pub fn load_catalog(path: &Path) -> Result<ProfileCatalog> {
    if !path.exists() {
        return Err(DevstackError::ConfigNotFound(path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(path)?;
    let catalog: ProfileCatalog = serde_yaml::from_str(&contents)
        .map_err(|e| DevstackError::InvalidConfig(e.to_string()))?;
    validate(&catalog)?;
    Ok(catalog)
}

fn validate(catalog: &ProfileCatalog) -> Result<()> {
    if catalog.profiles.is_empty() && catalog.custom_profiles.is_empty() {
        return Err(DevstackError::InvalidConfig(
            "profiles.yaml defines no profiles".into(),
        ));
    }
    for (name, profile) in catalog.profiles.iter().chain(&catalog.custom_profiles) {
        validate_profile(name, profile)?;
    }
    Ok(())
}

fn validate_profile(name: &str, profile: &Profile) -> Result<()> {
    if name.trim().is_empty() {
        return Err(DevstackError::InvalidConfig("profile name is empty".into()));
    }
    for (i, service) in profile.services.iter().enumerate() {
        if profile.services[..i].contains(service) {
            return Err(DevstackError::InvalidConfig(format!(
                "profile '{name}' lists service '{service}' more than once"
            )));
        }
    }
    Ok(())
}

/// Read `<dir>/<profile>.env`. A missing file is an empty overlay.
pub fn load_profile_env(dir: &Path, profile: &str) -> Result<IndexMap<String, String>> {
    let path = dir.join(format!("{profile}.env"));
    if !path.exists() {
        tracing::debug!(profile, path = %path.display(), "no env overrides");
        return Ok(IndexMap::new());
    }
    let iter = dotenv::from_path_iter(&path).map_err(|e| {
        DevstackError::InvalidConfig(format!("{}: {e}", path.display()))
    })?;
    let mut vars = IndexMap::new();
    for item in iter {
        let (key, value) = item
            .map_err(|e| DevstackError::InvalidConfig(format!("{}: {e}", path.display())))?;
        vars.insert(key, value);
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const CATALOG: &str = r#"
profiles:
  minimal:
    description: Git hosting and essential development
    services: [vault, postgres, pgbouncer, forgejo, redis-1]
    resources:
      ram_estimate: 2GB
  standard:
    description: Full development stack
    services: [vault, postgres, redis-1, redis-2, redis-3, mysql]
custom_profiles:
  data:
    services: [postgres, mongodb]
"#;

    #[test]
    fn parse_catalog_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.yaml");
        fs::write(&path, CATALOG).unwrap();
        let catalog = load_catalog(&path).unwrap();
        assert_eq!(catalog.names(), vec!["minimal", "standard", "data"]);
        let minimal = catalog.get("minimal").unwrap();
        assert_eq!(minimal.services[0], "vault");
        assert_eq!(minimal.resources.ram_estimate.as_deref(), Some("2GB"));
        assert!(catalog.get("data").unwrap().description.is_empty());
        assert!(catalog.all_services().contains(&"mongodb".to_string()));
    }

    #[test]
    fn missing_catalog_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_catalog(&dir.path().join("profiles.yaml")),
            Err(DevstackError::ConfigNotFound(_))
        ));
    }

    #[test]
    fn duplicate_service_in_profile_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.yaml");
        fs::write(&path, "profiles:\n  bad:\n    services: [a, b, a]\n").unwrap();
        let err = load_catalog(&path).unwrap_err();
        assert!(err.to_string().contains("'a' more than once"));
    }

    #[test]
    fn env_overrides_are_read_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("standard.env"),
            "# comment\nREDIS_CLUSTER_ENABLED=true\nPOSTGRES_MAX_CONNECTIONS=200\n",
        )
        .unwrap();
        let vars = load_profile_env(dir.path(), "standard").unwrap();
        assert_eq!(
            vars.iter().collect::<Vec<_>>(),
            vec![
                (&"REDIS_CLUSTER_ENABLED".to_string(), &"true".to_string()),
                (&"POSTGRES_MAX_CONNECTIONS".to_string(), &"200".to_string()),
            ]
        );
    }

    #[test]
    fn missing_env_file_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_profile_env(dir.path(), "minimal").unwrap().is_empty());
    }
}
