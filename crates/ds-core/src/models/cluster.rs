/// A member node: the container that must be running and the address
/// other nodes use to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNodeSpec {
    pub container: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterTopology {
    pub nodes: Vec<ClusterNodeSpec>,
    /// Secret path holding the shared auth credential.
    pub credential_path: String,
    pub credential_key: String,
}

impl Default for ClusterTopology {
    fn default() -> Self {
        let nodes = [
            ("dev-redis-1", "172.20.0.13:6379"),
            ("dev-redis-2", "172.20.0.16:6379"),
            ("dev-redis-3", "172.20.0.17:6379"),
        ]
        .into_iter()
        .map(|(container, endpoint)| ClusterNodeSpec {
            container: container.to_string(),
            endpoint: endpoint.to_string(),
        })
        .collect();
        Self {
            nodes,
            credential_path: "redis-1".to_string(),
            credential_key: "password".to_string(),
        }
    }
}

impl ClusterTopology {
    /// Node that issues cluster commands.
    pub fn coordinator(&self) -> Option<&ClusterNodeSpec> {
        self.nodes.first()
    }
}

/// A node as reported by `CLUSTER NODES` after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNode {
    pub id: String,
    pub address: String,
    pub flags: Vec<String>,
    pub slots: Vec<String>,
}

impl ClusterNode {
    pub fn is_master(&self) -> bool {
        self.flags.iter().any(|f| f == "master")
    }
}
