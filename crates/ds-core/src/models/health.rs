use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    RunningHealthy,
    RunningUnhealthy,
    /// Healthcheck defined but still inside its start period.
    RunningStarting,
    RunningNoHealthcheck,
    NotRunning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHealth {
    pub service: String,
    /// Raw container state as reported by compose (`running`, `exited`, ...).
    pub state: String,
    /// Raw health string; empty when the container defines no healthcheck.
    pub health: String,
    pub classification: HealthState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthReport {
    NoServices,
    Services(Vec<ServiceHealth>),
}

/// One entry of `docker compose ps --format json`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ComposeContainer {
    #[serde(rename = "Service", default)]
    pub service: String,
    #[serde(rename = "State", default)]
    pub state: String,
    #[serde(rename = "Health", default)]
    pub health: String,
}

impl HealthState {
    pub fn classify(state: &str, health: &str) -> Self {
        if state != "running" {
            return Self::NotRunning;
        }
        match health {
            "healthy" => Self::RunningHealthy,
            "starting" => Self::RunningStarting,
            "" | "unknown" => Self::RunningNoHealthcheck,
            _ => Self::RunningUnhealthy,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::RunningHealthy => "healthy",
            Self::RunningUnhealthy => "unhealthy",
            Self::RunningStarting => "starting",
            Self::RunningNoHealthcheck => "no healthcheck",
            Self::NotRunning => "not running",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_every_state() {
        assert_eq!(HealthState::classify("running", "healthy"), HealthState::RunningHealthy);
        assert_eq!(HealthState::classify("running", "starting"), HealthState::RunningStarting);
        assert_eq!(HealthState::classify("running", "unhealthy"), HealthState::RunningUnhealthy);
        assert_eq!(HealthState::classify("running", ""), HealthState::RunningNoHealthcheck);
        assert_eq!(HealthState::classify("exited", "healthy"), HealthState::NotRunning);
        assert_eq!(HealthState::classify("exited", "starting"), HealthState::NotRunning);
    }

    #[test]
    fn starting_is_not_reported_as_unhealthy() {
        let state = HealthState::classify("running", "starting");
        assert_ne!(state, HealthState::RunningUnhealthy);
        assert_eq!(state.label(), "starting");
    }
}
