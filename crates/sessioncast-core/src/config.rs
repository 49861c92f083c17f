use std::time::Duration;

use url::Url;

use crate::error::SessionCastError;

pub const DEFAULT_RELAY_URL: &str = "wss://relay.sessioncast.io/ws";

/// Settings for the relay connection.
///
/// Built through [`RelayConfig::builder`]; `token` and `machine_id` are
/// required and must be non-empty, everything else has defaults.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub url: String,
    pub token: String,
    pub machine_id: String,
    /// Human-readable name shown to viewers; defaults to `machine_id`.
    pub label: String,
    pub reconnect_enabled: bool,
    pub reconnect_initial_delay: Duration,
    pub reconnect_max_delay: Duration,
    /// Failures tolerated before the circuit breaker opens.
    pub max_reconnect_attempts: u32,
    pub circuit_breaker_duration: Duration,
}

impl RelayConfig {
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder::default()
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfigBuilder {
    url: String,
    token: String,
    machine_id: String,
    label: Option<String>,
    reconnect_enabled: bool,
    reconnect_initial_delay: Duration,
    reconnect_max_delay: Duration,
    max_reconnect_attempts: u32,
    circuit_breaker_duration: Duration,
}

impl Default for RelayConfigBuilder {
    fn default() -> Self {
        Self {
            url: DEFAULT_RELAY_URL.to_string(),
            token: String::new(),
            machine_id: String::new(),
            label: None,
            reconnect_enabled: true,
            reconnect_initial_delay: Duration::from_secs(2),
            reconnect_max_delay: Duration::from_secs(60),
            max_reconnect_attempts: 5,
            circuit_breaker_duration: Duration::from_secs(120),
        }
    }
}

impl RelayConfigBuilder {
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    pub fn machine_id(mut self, machine_id: impl Into<String>) -> Self {
        self.machine_id = machine_id.into();
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn reconnect_enabled(mut self, enabled: bool) -> Self {
        self.reconnect_enabled = enabled;
        self
    }

    pub fn reconnect_initial_delay(mut self, delay: Duration) -> Self {
        self.reconnect_initial_delay = delay;
        self
    }

    pub fn reconnect_max_delay(mut self, delay: Duration) -> Self {
        self.reconnect_max_delay = delay;
        self
    }

    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn circuit_breaker_duration(mut self, duration: Duration) -> Self {
        self.circuit_breaker_duration = duration;
        self
    }

    pub fn build(self) -> Result<RelayConfig, SessionCastError> {
        if self.token.trim().is_empty() {
            return Err(SessionCastError::ConfigInvalid(
                "relay token is required".into(),
            ));
        }
        if self.machine_id.trim().is_empty() {
            return Err(SessionCastError::ConfigInvalid(
                "machine id is required".into(),
            ));
        }
        Url::parse(&self.url).map_err(|err| {
            SessionCastError::ConfigInvalid(format!("invalid relay url {:?}: {err}", self.url))
        })?;

        let label = self.label.unwrap_or_else(|| self.machine_id.clone());
        Ok(RelayConfig {
            url: self.url,
            token: self.token,
            machine_id: self.machine_id,
            label,
            reconnect_enabled: self.reconnect_enabled,
            reconnect_initial_delay: self.reconnect_initial_delay,
            reconnect_max_delay: self.reconnect_max_delay,
            max_reconnect_attempts: self.max_reconnect_attempts,
            circuit_breaker_duration: self.circuit_breaker_duration,
        })
    }
}
