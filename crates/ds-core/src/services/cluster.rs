use std::sync::LazyLock;

use regex::Regex;

use crate::error::{DevstackError, Result};
use crate::models::{ClusterNode, ClusterTopology};
use crate::services::process::{Invocation, ProcessRunner};
use crate::services::vault::SecretStore;

static ALREADY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\balready\b").unwrap());

const AUTH_ENV: &str = "REDISCLI_AUTH";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterOutcome {
    Created { nodes: Vec<ClusterNode> },
    /// Creation was refused because the nodes already form a cluster.
    AlreadyInitialized { message: String, nodes: Vec<ClusterNode> },
}

impl ClusterOutcome {
    pub fn nodes(&self) -> &[ClusterNode] {
        match self {
            Self::Created { nodes } | Self::AlreadyInitialized { nodes, .. } => nodes,
        }
    }
}

pub struct ClusterBootstrapper<'a, R, S> {
    runner: &'a R,
    secrets: &'a S,
    topology: ClusterTopology,
}

impl<'a, R: ProcessRunner, S: SecretStore> ClusterBootstrapper<'a, R, S> {
    pub fn new(runner: &'a R, secrets: &'a S, topology: ClusterTopology) -> Self {
        Self {
            runner,
            secrets,
            topology,
        }
    }

    /// Safe to call repeatedly: an existing cluster counts as success.
    pub async fn init_cluster(&self) -> Result<ClusterOutcome> {
        let coordinator = self.topology.coordinator().ok_or_else(|| {
            DevstackError::InvalidConfig("cluster topology has no nodes".into())
        })?;

        for node in &self.topology.nodes {
            if !self.container_running(&node.container).await? {
                return Err(DevstackError::prerequisite(
                    format!("Redis node {} is not running", node.container),
                    "manage-devstack start --profile standard",
                ));
            }
        }

        let password = self.credential().await?;

        let create = self
            .redis_cli(&coordinator.container, &password)
            .arg("--cluster")
            .arg("create")
            .args(self.topology.nodes.iter().map(|n| n.endpoint.clone()))
            .args(["--cluster-replicas", "0", "--cluster-yes"]);
        tracing::info!(nodes = self.topology.nodes.len(), "creating redis cluster");
        let output = self.runner.run(&create).await?;

        let outcome = if output.success() {
            None
        } else {
            let text = output.combined_text();
            if !ALREADY_RE.is_match(&text) {
                return Err(DevstackError::ExternalCommandFailed {
                    command: create.command_line(),
                    code: Some(output.code),
                    detail: last_line(&text),
                });
            }
            tracing::info!("redis cluster already initialized");
            Some(last_matching_line(&text))
        };

        let nodes = self.cluster_nodes(&coordinator.container, &password).await?;
        Ok(match outcome {
            None => ClusterOutcome::Created { nodes },
            Some(message) => ClusterOutcome::AlreadyInitialized { message, nodes },
        })
    }

    async fn credential(&self) -> Result<String> {
        let (path, key) = (&self.topology.credential_path, &self.topology.credential_key);
        let fields = self
            .secrets
            .get_secret(path, Some(key.as_str()))
            .await
            .map_err(|e| {
                DevstackError::prerequisite(
                    format!("could not read the Redis password from secret/{path}: {e}"),
                    "manage-devstack vault-bootstrap",
                )
            })?;
        fields
            .get(key.as_str())
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| {
                DevstackError::prerequisite(
                    format!("secret/{path} has no '{key}' field"),
                    "manage-devstack vault-bootstrap",
                )
            })
    }

    async fn container_running(&self, container: &str) -> Result<bool> {
        let filter = format!("name={container}");
        let inv = Invocation::new("docker").args([
            "ps",
            "--filter",
            filter.as_str(),
            "--format",
            "{{.Names}}",
        ]);
        let output = self.runner.run(&inv).await?;
        // The name filter is a substring match; require an exact line.
        Ok(output.success() && output.stdout_text().lines().any(|l| l.trim() == container))
    }

    fn redis_cli(&self, container: &str, password: &str) -> Invocation {
        Invocation::new("docker")
            .args(["exec", "-e", AUTH_ENV, container, "redis-cli"])
            .env(AUTH_ENV, password)
    }

    async fn cluster_nodes(&self, container: &str, password: &str) -> Result<Vec<ClusterNode>> {
        let inv = self.redis_cli(container, password).args(["cluster", "nodes"]);
        let output = self.runner.run(&inv).await?.check(&inv)?;
        Ok(parse_cluster_nodes(&output.stdout_text()))
    }
}

/// Parse `CLUSTER NODES` output: `<id> <ip:port@cport> <flags> <master> <ping> <pong> <epoch> <link> <slot>...`
pub fn parse_cluster_nodes(raw: &str) -> Vec<ClusterNode> {
    raw.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 8 {
                return None;
            }
            let address = fields[1].split('@').next().unwrap_or(fields[1]);
            Some(ClusterNode {
                id: fields[0].to_string(),
                address: address.to_string(),
                flags: fields[2].split(',').map(str::to_string).collect(),
                slots: fields[8..].iter().map(|s| s.to_string()).collect(),
            })
        })
        .collect()
}

fn last_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or("no output")
        .to_string()
}

fn last_matching_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| ALREADY_RE.is_match(l))
        .last()
        .unwrap_or_else(|| text.trim())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::process::CommandOutput;
    use crate::testing::{fail, ok, FakeRunner, StaticSecrets};

    const NODES: &str = "\
07c37dfeb235213a872192d90877d0cd55635b91 172.20.0.13:6379@16379 myself,master - 0 1426238317239 1 connected 0-5460
e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 172.20.0.16:6379@16379 master - 0 1426238316232 2 connected 5461-10922
67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 172.20.0.17:6379@16379 master - 0 1426238318243 3 connected 10923-16383
";

    fn all_nodes_up(runner: &FakeRunner) {
        for n in 1..=3 {
            runner.on(
                &format!("name=dev-redis-{n} "),
                ok(&format!("dev-redis-{n}\n")),
            );
        }
        runner.on("cluster nodes", ok(NODES));
    }

    fn secrets() -> StaticSecrets {
        StaticSecrets::new().with("redis-1", "password", "redispw")
    }

    #[tokio::test]
    async fn creates_cluster_and_returns_topology() {
        let runner = FakeRunner::new();
        all_nodes_up(&runner);
        let secrets = secrets();
        let outcome = ClusterBootstrapper::new(&runner, &secrets, ClusterTopology::default())
            .init_cluster()
            .await
            .unwrap();

        let ClusterOutcome::Created { nodes } = outcome else {
            panic!("expected a new cluster");
        };
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].address, "172.20.0.13:6379");
        assert!(nodes.iter().all(ClusterNode::is_master));
        assert_eq!(nodes[2].slots, vec!["10923-16383"]);

        let create = &runner.calls_matching("--cluster create")[0];
        assert_eq!(
            create.command_line(),
            "docker exec -e REDISCLI_AUTH dev-redis-1 redis-cli --cluster create \
             172.20.0.13:6379 172.20.0.16:6379 172.20.0.17:6379 --cluster-replicas 0 --cluster-yes"
        );
        assert_eq!(create.env, vec![("REDISCLI_AUTH".to_string(), "redispw".to_string())]);
    }

    #[tokio::test]
    async fn second_run_is_an_idempotent_success() {
        let runner = FakeRunner::new();
        all_nodes_up(&runner);
        runner
            .once("--cluster create", ok(""))
            .on(
                "--cluster create",
                CommandOutput::new(
                    1,
                    ">>> Creating cluster\n",
                    "[ERR] Node 172.20.0.13:6379 is not empty. Either the node already knows other nodes (check with CLUSTER NODES) or contains some key in database 0.\n",
                ),
            );
        let secrets = secrets();
        let bootstrapper =
            ClusterBootstrapper::new(&runner, &secrets, ClusterTopology::default());

        let first = bootstrapper.init_cluster().await.unwrap();
        let second = bootstrapper.init_cluster().await.unwrap();

        assert!(matches!(first, ClusterOutcome::Created { .. }));
        match second {
            ClusterOutcome::AlreadyInitialized { message, nodes } => {
                assert!(message.contains("already knows other nodes"));
                assert_eq!(nodes.len(), 3);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn other_create_failures_propagate() {
        let runner = FakeRunner::new();
        all_nodes_up(&runner);
        runner.on("--cluster create", fail(1, "[ERR] Could not connect to Redis at 172.20.0.16:6379"));
        let secrets = secrets();
        let err = ClusterBootstrapper::new(&runner, &secrets, ClusterTopology::default())
            .init_cluster()
            .await
            .unwrap_err();
        assert!(matches!(err, DevstackError::ExternalCommandFailed { .. }));
    }

    #[tokio::test]
    async fn stopped_node_is_a_prerequisite() {
        let runner = FakeRunner::new();
        runner.on("name=dev-redis-1 ", ok("dev-redis-1\n"));
        // dev-redis-2 only appears as a prefix of another container
        runner.on("name=dev-redis-2 ", ok("dev-redis-20\n"));
        let secrets = secrets();
        let err = ClusterBootstrapper::new(&runner, &secrets, ClusterTopology::default())
            .init_cluster()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dev-redis-2 is not running"));
        assert!(runner.calls_matching("redis-cli").is_empty());
    }

    #[tokio::test]
    async fn missing_credential_is_a_prerequisite() {
        let runner = FakeRunner::new();
        all_nodes_up(&runner);
        let secrets = StaticSecrets::unavailable();
        let err = ClusterBootstrapper::new(&runner, &secrets, ClusterTopology::default())
            .init_cluster()
            .await
            .unwrap_err();
        assert!(matches!(err, DevstackError::Prerequisite { .. }));
        assert!(runner.calls_matching("redis-cli").is_empty());
    }

    #[test]
    fn replica_lines_parse_without_slots() {
        let nodes = parse_cluster_nodes(
            "abc 172.20.0.18:6379@16379 slave 07c3 0 1426238317239 4 connected\n",
        );
        assert_eq!(nodes[0].flags, vec!["slave"]);
        assert!(nodes[0].slots.is_empty());
        assert!(!nodes[0].is_master());
    }
}
