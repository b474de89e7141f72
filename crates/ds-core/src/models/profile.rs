use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Informational footprint shown by `profiles`; never enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram_estimate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub resources: ProfileResources,
}

/// The parsed `profiles.yaml`. Map order follows the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileCatalog {
    #[serde(default)]
    pub profiles: IndexMap<String, Profile>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub custom_profiles: IndexMap<String, Profile>,
}

impl ProfileCatalog {
    /// Standard profiles shadow custom ones with the same name.
    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles
            .get(name)
            .or_else(|| self.custom_profiles.get(name))
    }

    /// Every profile name, standard first, in file order.
    pub fn names(&self) -> Vec<String> {
        self.profiles
            .keys()
            .chain(self.custom_profiles.keys())
            .cloned()
            .collect()
    }

    /// Union of all services any profile can start.
    pub fn all_services(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for profile in self.profiles.values().chain(self.custom_profiles.values()) {
            for service in &profile.services {
                if !seen.contains(service) {
                    seen.push(service.clone());
                }
            }
        }
        seen
    }
}

/// The concrete outcome of resolving requested profile names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSelection {
    pub profiles: Vec<String>,
    pub services: Vec<String>,
    pub environment: IndexMap<String, String>,
}

impl ResolvedSelection {
    /// Container names follow the compose file's `dev-<service>` convention.
    pub fn container_names(&self) -> Vec<String> {
        self.services.iter().map(|s| format!("dev-{s}")).collect()
    }

    pub fn includes_profile(&self, name: &str) -> bool {
        self.profiles.iter().any(|p| p == name)
    }
}
