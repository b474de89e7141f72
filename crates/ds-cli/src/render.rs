use tabled::settings::Style;
use tabled::{Table, Tabled};

use ds_core::models::{BackupListing, ClusterNode, ProfileCatalog, ServiceHealth};

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Services")]
    services: usize,
    #[tabled(rename = "RAM")]
    ram: String,
    #[tabled(rename = "Description")]
    description: String,
}

#[derive(Tabled)]
struct HealthRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Status")]
    state: String,
    #[tabled(rename = "Health")]
    health: &'static str,
}

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "Backup")]
    name: String,
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Size")]
    size: String,
}

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Node")]
    id: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Role")]
    role: &'static str,
    #[tabled(rename = "Slots")]
    slots: String,
}

fn rounded<T: Tabled>(rows: Vec<T>) -> String {
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    table.to_string()
}

/// Standard profiles only; custom profiles are listed separately.
pub fn profiles_table(catalog: &ProfileCatalog) -> String {
    rounded(
        catalog
            .profiles
            .iter()
            .map(|(name, profile)| ProfileRow {
                name: name.clone(),
                services: profile.services.len(),
                ram: profile
                    .resources
                    .ram_estimate
                    .clone()
                    .unwrap_or_else(|| "-".into()),
                description: profile.description.clone(),
            })
            .collect(),
    )
}

pub fn health_table(services: &[ServiceHealth]) -> String {
    rounded(
        services
            .iter()
            .map(|s| HealthRow {
                service: s.service.clone(),
                state: s.state.clone(),
                health: s.classification.label(),
            })
            .collect(),
    )
}

pub fn backups_table(listings: &[BackupListing]) -> String {
    rounded(
        listings
            .iter()
            .map(|l| BackupRow {
                name: l.name.clone(),
                date: l.display_date(),
                size: l.display_size(),
            })
            .collect(),
    )
}

pub fn cluster_table(nodes: &[ClusterNode]) -> String {
    rounded(
        nodes
            .iter()
            .map(|n| NodeRow {
                id: n.id.chars().take(8).collect(),
                address: n.address.clone(),
                role: if n.is_master() { "master" } else { "replica" },
                slots: if n.slots.is_empty() {
                    "-".into()
                } else {
                    n.slots.join(" ")
                },
            })
            .collect(),
    )
}
