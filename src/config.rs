// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Scoped API library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::error::{ConfigError, InvalidBaseUrlSnafu};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://api.freemius.com";
pub const SANDBOX_API_URL: &str = "https://sandbox-api.freemius.com";

/// Client settings supplied by the embedding application.
///
/// Every field has a default, so any serde format can be used to load a partial configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Target the sandbox environment instead of production.
    pub sandbox: bool,
    /// Override the base URL selected by `sandbox`.
    pub api_url: Option<String>,
    /// Per-attempt timeout. `None` disables the timeout.
    pub timeout_secs: Option<u64>,
    /// Additional attempts after a transient transport failure.
    pub retries: u32,
    /// Delay before the first retry; doubled for each subsequent one.
    pub retry_backoff_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            sandbox: false,
            api_url: None,
            timeout_secs: Some(60),
            retries: 0,
            retry_backoff_ms: 250,
        }
    }
}

impl ClientConfig {
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url = match &self.api_url {
            Some(url) => url.as_str(),
            None if self.sandbox => SANDBOX_API_URL,
            None => DEFAULT_API_URL,
        };
        Url::parse(url).context(InvalidBaseUrlSnafu { url })
    }

    pub fn call_policy(&self) -> CallPolicy {
        CallPolicy {
            timeout: self.timeout_secs.map(Duration::from_secs),
            retries: self.retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

/// How the executor drives a single call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallPolicy {
    pub timeout: Option<Duration>,
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        ClientConfig::default().call_policy()
    }
}

impl CallPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff
            .checked_mul(1u32 << attempt.saturating_sub(1).min(16))
            .unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_selects_base_url() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url().unwrap().as_str(), "https://api.freemius.com/");
        let config = ClientConfig {
            sandbox: true,
            ..Default::default()
        };
        assert_eq!(
            config.base_url().unwrap().as_str(),
            "https://sandbox-api.freemius.com/"
        );
        let config = ClientConfig {
            sandbox: true,
            api_url: Some("http://localhost:8080".to_string()),
            ..Default::default()
        };
        assert_eq!(config.base_url().unwrap().as_str(), "http://localhost:8080/");
    }

    #[test]
    fn invalid_override_is_rejected() {
        let config = ClientConfig {
            api_url: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.base_url(),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn partial_configs_fill_defaults() {
        let config: ClientConfig = serde_json::from_str(r#"{"retries": 3}"#).unwrap();
        assert_eq!(config.retries, 3);
        assert_eq!(config.timeout_secs, Some(60));
        assert!(!config.sandbox);
    }

    #[test]
    fn backoff_doubles() {
        let policy = CallPolicy {
            timeout: None,
            retries: 3,
            backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
    }
}
