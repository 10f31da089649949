// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Scoped API library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::canonical::{canonicalize, ping_path};
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::error::ConfigError;
use crate::executor::RequestExecutor;
use crate::signer::{sign, SigningInput};
use crate::transport::{SurfTransport, Transport};
use crate::types::{ApiError, ApiResult, FileParams, Method, Params, Scope, ScopeContext};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{event, Level};
use url::{form_urlencoded, Url};

/// A client bound to one authentication scope.
///
/// ```ignore
/// let client = ApiClient::new(Scope::Developer(1234), "pk_...", "sk_...", &ClientConfig::default())?;
/// let tag = client
///     .api("plugins/115/tags", Method::Post, params, files)
///     .await;
/// let url = client.signed_url("/plugins/115/tags/9.zip?is_premium=true")?;
/// ```
pub struct ApiClient<T = SurfTransport> {
    ctx: ScopeContext,
    executor: RequestExecutor<T>,
    base_url: Url,
    clock: Arc<dyn Clock>,
    clock_diff: i64,
}

impl ApiClient<SurfTransport> {
    /// Create a client which talks HTTP to the API selected by `config`.
    pub fn new(
        scope: Scope,
        public_key: impl Into<String>,
        secret_key: impl Into<String>,
        config: &ClientConfig,
    ) -> Result<Self, ConfigError> {
        let transport = SurfTransport::new(config.base_url()?);
        Self::with_transport(scope, public_key, secret_key, config, transport)
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn with_transport(
        scope: Scope,
        public_key: impl Into<String>,
        secret_key: impl Into<String>,
        config: &ClientConfig,
        transport: T,
    ) -> Result<Self, ConfigError> {
        let ctx = ScopeContext::new(scope, public_key, secret_key, config.sandbox)?;
        Ok(Self {
            ctx,
            executor: RequestExecutor::new(transport, config.call_policy()),
            base_url: config.base_url()?,
            clock: Arc::new(SystemClock),
            clock_diff: 0,
        })
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn context(&self) -> &ScopeContext {
        &self.ctx
    }

    pub fn is_sandbox(&self) -> bool {
        self.ctx.is_sandbox()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Seconds the local clock runs ahead of the API server.
    pub fn clock_diff(&self) -> i64 {
        self.clock_diff
    }

    pub fn set_clock_diff(&mut self, seconds: i64) {
        self.clock_diff = seconds;
    }

    // Signatures are dated in server time. Differences beyond the representable range saturate.
    fn signing_time(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        let saturated = if self.clock_diff > 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        };
        chrono::Duration::try_seconds(self.clock_diff)
            .and_then(|diff| now.checked_sub_signed(diff))
            .unwrap_or(saturated)
    }

    /// Call `path` relative to this client's scope.
    pub async fn api(
        &self,
        path: &str,
        method: Method,
        params: Params,
        files: FileParams,
    ) -> ApiResult {
        self.executor
            .execute(&self.ctx, path, method, params, files, self.signing_time())
            .await
    }

    /// Like [api](Self::api), decoding the response into `R` and error envelopes into `Err`.
    pub async fn api_as<R: DeserializeOwned>(
        &self,
        path: &str,
        method: Method,
        params: Params,
        files: FileParams,
    ) -> Result<R, ApiError> {
        self.api(path, method, params, files).await.into_result()
    }

    async fn ping(&self) -> ApiResult {
        self.executor
            .execute_canonical(
                &self.ctx,
                &ping_path(),
                Method::Get,
                Params::new(),
                FileParams::new(),
                self.signing_time(),
            )
            .await
    }

    /// Check connectivity to the API.
    pub async fn test(&self) -> bool {
        let pong = self.ping().await;
        let ok = pong
            .decoded()
            .and_then(|value| value.get("api"))
            .and_then(Value::as_str)
            == Some("pong");
        if !ok {
            event!(Level::WARN, "API ping failed: {}", pong);
        }
        ok
    }

    /// Seconds the local clock is ahead of the API server's clock.
    pub async fn find_clock_diff(&self) -> Result<i64, ApiError> {
        let now = self.clock.now();
        let pong = self.ping().await;
        if let Some(error) = pong.error() {
            return Err(error);
        }
        let timestamp = pong
            .decoded()
            .and_then(|value| value.get("timestamp"))
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::invalid_response(format!("ping has no timestamp: {}", pong)))?;
        let server = parse_timestamp(timestamp).ok_or_else(|| {
            ApiError::invalid_response(format!("unrecognized timestamp {:?}", timestamp))
        })?;
        Ok((now - server).num_seconds())
    }

    /// Measure the clock difference and use it for subsequent signatures.
    pub async fn sync_clock(&mut self) -> Result<i64, ApiError> {
        let diff = self.find_clock_diff().await?;
        event!(Level::DEBUG, "clock diff with API server: {}s", diff);
        self.set_clock_diff(diff);
        Ok(diff)
    }

    /// A URL for `path` which any HTTP client can fetch without further credentials.
    pub fn signed_url(&self, path: &str) -> Result<String, ConfigError> {
        let canonical = canonicalize(self.ctx.scope(), path);
        let input = SigningInput {
            method: Method::Get,
            resource: &canonical.path,
            body: None,
            content_type: None,
        };
        let auth = sign(&self.ctx, &input, self.signing_time())?;

        let mut query = canonical.query.trim_start_matches('?').to_string();
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(
            &form_urlencoded::Serializer::new(String::new())
                .append_pair("auth_date", &auth.date)
                .append_pair("authorization", &auth.authorization)
                .finish(),
        );
        Ok(format!(
            "{}{}?{}",
            self.base_url.as_str().trim_end_matches('/'),
            canonical.path,
            query
        ))
    }
}

/// Parse a server timestamp: RFC 3339, RFC 2822, or `YYYY-MM-DD HH:MM:SS` in UTC.
pub fn parse_timestamp(timestamp: &str) -> Option<DateTime<Utc>> {
    let timestamp = timestamp.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = DateTime::parse_from_rfc2822(timestamp) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|t| Utc.from_utc_datetime(&t))
}
