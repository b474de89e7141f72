use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultStatus {
    Healthy,
    Unhealthy,
}

/// Result of the best-effort health probe. The seal fields are unknown
/// when the store could not be reached at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultHealth {
    pub status: VaultStatus,
    pub initialized: Option<bool>,
    pub sealed: Option<bool>,
    pub standby: Option<bool>,
    pub error: Option<String>,
}

impl VaultHealth {
    pub fn from_status_code(code: u16) -> Self {
        Self {
            status: if code == 200 {
                VaultStatus::Healthy
            } else {
                VaultStatus::Unhealthy
            },
            initialized: Some(code != 501),
            sealed: Some(code == 503),
            standby: Some(code == 429),
            error: None,
        }
    }

    pub fn unreachable(error: impl Into<String>) -> Self {
        Self {
            status: VaultStatus::Unhealthy,
            initialized: None,
            sealed: None,
            standby: None,
            error: Some(error.into()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == VaultStatus::Healthy
    }
}

/// Response body of `PUT /v1/sys/unseal`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UnsealProgress {
    pub sealed: bool,
    #[serde(rename = "t", default)]
    pub threshold: u32,
    #[serde(default)]
    pub progress: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_status_codes() {
        assert!(VaultHealth::from_status_code(200).is_healthy());
        let sealed = VaultHealth::from_status_code(503);
        assert_eq!(sealed.sealed, Some(true));
        assert_eq!(sealed.initialized, Some(true));
        let uninit = VaultHealth::from_status_code(501);
        assert_eq!(uninit.initialized, Some(false));
        assert_eq!(VaultHealth::from_status_code(429).standby, Some(true));
    }
}
