use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use indexmap::IndexMap;
use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{DevstackError, Result};
use crate::models::{Settings, UnsealProgress, VaultHealth};

static SECRET_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9/_-]+$").unwrap());

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const UNSEAL_THRESHOLD: usize = 3;

/// Read access to service credentials.
pub trait SecretStore: Send + Sync {
    /// Fields stored at `path`, or just `key` when one is requested.
    fn get_secret(
        &self,
        path: &str,
        key: Option<&str>,
    ) -> impl Future<Output = Result<IndexMap<String, String>>> + Send;
}

/// Strip surrounding separators and reject anything outside `[A-Za-z0-9/_-]`
/// or containing a traversal sequence. Runs before any request is built.
pub fn validate_path(path: &str) -> Result<String> {
    let trimmed = path.trim_matches('/');
    let invalid = |reason: &str| DevstackError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };
    if trimmed.is_empty() {
        return Err(invalid("path is empty"));
    }
    if trimmed.contains("..") {
        return Err(invalid("parent-directory traversal is not allowed"));
    }
    if !SECRET_PATH_RE.is_match(trimmed) {
        return Err(invalid(
            "only letters, digits, '-', '_' and '/' are allowed",
        ));
    }
    Ok(trimmed.to_string())
}

pub fn read_root_token(settings: &Settings) -> Result<String> {
    let path = settings.root_token_file();
    if !path.exists() {
        return Err(DevstackError::prerequisite(
            format!("Vault root token not found at {}", path.display()),
            "manage-devstack vault-init",
        ));
    }
    let token = std::fs::read_to_string(&path)?.trim().to_string();
    if token.is_empty() {
        return Err(DevstackError::prerequisite(
            format!("Vault root token file {} is empty", path.display()),
            "manage-devstack vault-init",
        ));
    }
    Ok(token)
}

/// An explicit `VAULT_TOKEN` wins over the persisted root token.
pub fn resolve_token(settings: &Settings, env_token: Option<String>) -> Result<String> {
    match env_token.filter(|t| !t.trim().is_empty()) {
        Some(token) => Ok(token.trim().to_string()),
        None => read_root_token(settings),
    }
}

#[derive(Deserialize)]
struct KeysFile {
    #[serde(default)]
    unseal_keys_b64: Vec<String>,
}

/// The first three unseal keys from `keys.json`.
pub fn read_unseal_keys(settings: &Settings) -> Result<Vec<String>> {
    let path = settings.unseal_keys_file();
    if !path.exists() {
        return Err(DevstackError::prerequisite(
            format!("Vault unseal keys not found at {}", path.display()),
            "manage-devstack vault-init",
        ));
    }
    let keys: KeysFile = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    if keys.unseal_keys_b64.len() < UNSEAL_THRESHOLD {
        return Err(DevstackError::prerequisite(
            format!(
                "not enough unseal keys in {} (need {UNSEAL_THRESHOLD}, found {})",
                path.display(),
                keys.unseal_keys_b64.len()
            ),
            "manage-devstack vault-init",
        ));
    }
    Ok(keys
        .unseal_keys_b64
        .into_iter()
        .take(UNSEAL_THRESHOLD)
        .collect())
}

#[derive(Deserialize)]
struct SecretEnvelope {
    data: SecretData,
}

#[derive(Deserialize)]
struct SecretData {
    #[serde(default)]
    data: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct HealthBody {
    initialized: Option<bool>,
    sealed: Option<bool>,
    standby: Option<bool>,
}

/// HTTP client for the secrets store's KV v2 and sys endpoints.
pub struct VaultClient {
    http: reqwest::Client,
    addr: String,
    token: Option<String>,
}

impl VaultClient {
    pub fn new(addr: &str, token: Option<String>) -> Result<Self> {
        Self::with_timeout(addr, token, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(addr: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DevstackError::StoreUnavailable {
                message: "could not build HTTP client".into(),
                cause: Some(e),
            })?;
        Ok(Self {
            http,
            addr: addr.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Client for the configured address, authenticated when a token can be found.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let token = match resolve_token(settings, std::env::var("VAULT_TOKEN").ok()) {
            Ok(token) => Some(token),
            Err(DevstackError::Prerequisite { .. }) => None,
            Err(e) => return Err(e),
        };
        Self::new(&settings.vault_addr, token)
    }

    fn token(&self) -> Result<&str> {
        self.token.as_deref().ok_or_else(|| {
            DevstackError::prerequisite(
                "no Vault token available (VAULT_TOKEN unset and no root token file)",
                "manage-devstack vault-init",
            )
        })
    }

    /// Best-effort probe; transport failures come back as an unhealthy report.
    pub async fn check_health(&self) -> VaultHealth {
        let url = format!("{}/v1/sys/health?standbyok=true", self.addr);
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, "vault health probe failed");
                return VaultHealth::unreachable(describe_transport(&e));
            }
        };
        let mut health = VaultHealth::from_status_code(response.status().as_u16());
        if let Ok(body) = response.json::<HealthBody>().await {
            health.initialized = body.initialized.or(health.initialized);
            health.sealed = body.sealed.or(health.sealed);
            health.standby = body.standby.or(health.standby);
        }
        health
    }

    /// Submit one unseal key share.
    pub async fn unseal(&self, key: &str) -> Result<UnsealProgress> {
        let url = format!("{}/v1/sys/unseal", self.addr);
        let response = self
            .http
            .put(&url)
            .json(&serde_json::json!({ "key": key }))
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(DevstackError::unavailable(format!(
                "unseal request returned {status}"
            )));
        }
        response.json().await.map_err(transport_error)
    }
}

impl SecretStore for VaultClient {
    async fn get_secret(&self, path: &str, key: Option<&str>) -> Result<IndexMap<String, String>> {
        let path = validate_path(path)?;
        let token = self.token()?;
        let url = format!("{}/v1/secret/data/{path}", self.addr);
        tracing::debug!(%path, key, "reading secret");

        let response = self
            .http
            .get(&url)
            .header("X-Vault-Token", token)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(DevstackError::SecretNotFound { path, key: None });
            }
            // Forbidden is reported as unavailability so callers cannot probe for existence.
            StatusCode::FORBIDDEN => {
                return Err(DevstackError::unavailable("request was rejected"));
            }
            status if !status.is_success() => {
                return Err(DevstackError::unavailable(format!(
                    "unexpected response {status}"
                )));
            }
            _ => {}
        }

        let envelope: SecretEnvelope = response.json().await.map_err(transport_error)?;
        let fields: IndexMap<String, String> = envelope
            .data
            .data
            .into_iter()
            .filter_map(|(k, v)| match v {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some((k, s)),
                other => Some((k, other.to_string())),
            })
            .collect();

        match key {
            None => Ok(fields),
            Some(key) => match fields.get(key) {
                Some(value) => Ok(IndexMap::from([(key.to_string(), value.clone())])),
                None => Err(DevstackError::SecretNotFound {
                    path,
                    key: Some(key.to_string()),
                }),
            },
        }
    }
}

fn describe_transport(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".into()
    } else if e.is_connect() {
        "could not connect".into()
    } else if e.is_decode() {
        "malformed response".into()
    } else {
        "request failed".into()
    }
}

fn transport_error(e: reqwest::Error) -> DevstackError {
    DevstackError::StoreUnavailable {
        message: describe_transport(&e),
        cause: Some(e),
    }
}
