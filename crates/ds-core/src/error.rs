use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DevstackError {
    #[error("unknown profile '{name}' (available: {})", .available.join(", "))]
    UnknownProfile { name: String, available: Vec<String> },

    #[error("invalid secret path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("{}", secret_not_found_message(.path, .key))]
    SecretNotFound { path: String, key: Option<String> },

    #[error("secrets store unavailable: {message}")]
    StoreUnavailable {
        message: String,
        #[source]
        cause: Option<reqwest::Error>,
    },

    #[error("{message}")]
    Prerequisite { message: String, hint: String },

    #[error("command `{command}` failed{}: {detail}", exit_suffix(.code))]
    ExternalCommandFailed {
        command: String,
        code: Option<i32>,
        detail: String,
    },

    #[error("backup '{0}' not found")]
    NotFound(String),

    #[error("config file not found at {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl DevstackError {
    pub fn prerequisite(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Prerequisite {
            message: message.into(),
            hint: hint.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
            cause: None,
        }
    }

    /// The corrective command or action to suggest alongside the error.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::UnknownProfile { .. } => Some("list profiles with: manage-devstack profiles".into()),
            Self::Prerequisite { hint, .. } => Some(hint.clone()),
            Self::SecretNotFound { path, .. } => Some(format!(
                "make sure the secret exists: vault kv get secret/{path}"
            )),
            Self::StoreUnavailable { .. } => {
                Some("check the secrets store with: manage-devstack vault-status".into())
            }
            Self::NotFound(_) => Some("list available backups with: manage-devstack restore".into()),
            Self::ConfigNotFound(_) => {
                Some("run from the project root or set DEVSTACK_HOME".into())
            }
            _ => None,
        }
    }
}

fn secret_not_found_message(path: &str, key: &Option<String>) -> String {
    match key {
        Some(key) => format!("key '{key}' not found in secret '{path}'"),
        None => format!("secret '{path}' not found"),
    }
}

fn exit_suffix(code: &Option<i32>) -> String {
    code.map(|c| format!(" (exit {c})")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, DevstackError>;
