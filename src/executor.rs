// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Scoped API library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::canonical::{canonicalize, ping_path};
use crate::config::CallPolicy;
use crate::error::{PanickedSnafu, TimeoutSnafu, TransportError};
use crate::signer::{sign, SigningInput, JSON_CONTENT_TYPE};
use crate::transport::{SignedEnvelope, Transport};
use crate::types::{ApiError, ApiResult, FileParams, Method, Params, ScopeContext};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{event, Level};

/// A [Transport] backed by a plain function, mostly useful as a test double.
pub struct FnTransport<F>(pub F);

impl<F> Transport for FnTransport<F>
where
    F: Fn(&SignedEnvelope) -> Result<String, TransportError> + Send + Sync,
{
    fn invoke<'a>(
        &'a self,
        envelope: &'a SignedEnvelope,
    ) -> BoxFuture<'a, Result<Vec<u8>, TransportError>> {
        Box::pin(async move { (self.0)(envelope).map(String::into_bytes) })
    }
}

/// Drives single API calls: canonicalize, sign, send, and normalize the outcome.
///
/// Neither [execute](Self::execute) nor [execute_canonical](Self::execute_canonical) ever fails.
/// Every failure, whether reported by the API or raised on the way, is returned as an
/// `{"error": {...}}` envelope inside the [ApiResult].
#[derive(Clone, Debug)]
pub struct RequestExecutor<T> {
    transport: T,
    policy: CallPolicy,
}

impl<T: Transport> RequestExecutor<T> {
    pub fn new(transport: T, policy: CallPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn policy(&self) -> &CallPolicy {
        &self.policy
    }

    /// Call `raw_path` relative to the scope of `ctx`.
    pub async fn execute(
        &self,
        ctx: &ScopeContext,
        raw_path: &str,
        method: Method,
        params: Params,
        files: FileParams,
        at: DateTime<Utc>,
    ) -> ApiResult {
        let canonical = canonicalize(ctx.scope(), raw_path);
        self.execute_canonical(ctx, &canonical.full_path(), method, params, files, at)
            .await
    }

    /// Call an already canonical path, such as the unscoped ping endpoint.
    pub async fn execute_canonical(
        &self,
        ctx: &ScopeContext,
        path: &str,
        method: Method,
        params: Params,
        files: FileParams,
        at: DateTime<Utc>,
    ) -> ApiResult {
        let envelope = match envelope(ctx, path, method, params, files, at) {
            Ok(envelope) => envelope,
            Err(err) => return ApiResult::from_error(err),
        };
        event!(
            Level::DEBUG,
            "--> {} {} {{signed: {}, files: {}}}",
            envelope.method,
            envelope.path,
            envelope.auth.is_some(),
            envelope.files.len(),
        );

        match self.send(&envelope).await {
            Ok(body) => {
                let len = body.len();
                let result = ApiResult::from_bytes(body);
                if result.decoded().is_none() {
                    event!(
                        Level::WARN,
                        "<-- {} {}: response is not JSON ({} bytes), returning raw body",
                        envelope.method,
                        envelope.path,
                        len
                    );
                }
                result
            }
            Err(err) => {
                event!(
                    Level::WARN,
                    "<-- {} {}: {}",
                    envelope.method,
                    envelope.path,
                    err
                );
                ApiResult::from_error(err.into_api_error())
            }
        }
    }

    async fn send(&self, envelope: &SignedEnvelope) -> Result<Vec<u8>, TransportError> {
        let mut attempt = 0;
        loop {
            match self.attempt(envelope).await {
                Err(err) if err.is_transient() && attempt < self.policy.retries => {
                    attempt += 1;
                    let delay = self.policy.backoff_for(attempt);
                    event!(
                        Level::DEBUG,
                        "retrying {} {} in {:?} (attempt {} of {}): {}",
                        envelope.method,
                        envelope.path,
                        delay,
                        attempt,
                        self.policy.retries,
                        err
                    );
                    async_std::task::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    async fn attempt(&self, envelope: &SignedEnvelope) -> Result<Vec<u8>, TransportError> {
        // `invoke` itself runs inside the guarded future, so eager panics are caught too.
        let call =
            AssertUnwindSafe(async move { self.transport.invoke(envelope).await }).catch_unwind();
        let outcome = match self.policy.timeout {
            Some(after) => async_std::future::timeout(after, call)
                .await
                .map_err(|_| TimeoutSnafu { after }.build())?,
            None => call.await,
        };
        match outcome {
            Ok(result) => result,
            Err(panic) => PanickedSnafu {
                message: panic_message(panic.as_ref()),
            }
            .fail(),
        }
    }
}

fn envelope(
    ctx: &ScopeContext,
    path: &str,
    method: Method,
    params: Params,
    files: FileParams,
    at: DateTime<Utc>,
) -> Result<SignedEnvelope, ApiError> {
    let (body, content_type) = if method.has_body() && files.is_empty() && !params.is_empty() {
        (
            Some(Value::Object(params.clone()).to_string()),
            Some(JSON_CONTENT_TYPE),
        )
    } else {
        (None, None)
    };

    let resource = path.split('?').next().unwrap_or(path);
    // The connectivity check is the only unauthenticated endpoint.
    let auth = if resource.eq_ignore_ascii_case(&ping_path()) {
        None
    } else {
        let input = SigningInput {
            method,
            resource,
            body: body.as_deref(),
            content_type,
        };
        Some(sign(ctx, &input, at).map_err(|err| ApiError::catch_all(err, file!(), line!()))?)
    };

    Ok(SignedEnvelope {
        path: path.to_string(),
        method,
        params,
        files,
        body,
        content_type,
        auth,
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
