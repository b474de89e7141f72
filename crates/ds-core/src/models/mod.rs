pub mod backup;
pub mod cluster;
pub mod health;
pub mod profile;
pub mod settings;
pub mod vault;

pub use backup::{Artifact, BackupListing, BackupOutcome, BackupReport, BackupSet, StepReport, StepStatus};
pub use cluster::{ClusterNode, ClusterNodeSpec, ClusterTopology};
pub use health::{HealthReport, HealthState, ServiceHealth};
pub use profile::{Profile, ProfileCatalog, ProfileResources, ResolvedSelection};
pub use settings::{Settings, VmResources};
pub use vault::{UnsealProgress, VaultHealth, VaultStatus};
