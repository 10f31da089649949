// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Scoped API library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::types::ApiError;
use snafu::{IntoError, Location, Snafu};
use std::path::PathBuf;
use std::time::Duration;

/// Misconfiguration of the client itself.
///
/// These are fatal: they are returned from constructors and parsers and never folded into an
/// [ApiResult](crate::ApiResult).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("Scope not implemented: {}", scope))]
    UnknownScope { scope: String },

    #[snafu(display("missing credentials: {} is empty", field))]
    MissingCredentials { field: &'static str },

    #[snafu(display("secret key cannot be used for signing"))]
    InvalidKey,

    #[snafu(display("unsupported HTTP method {}", method))]
    UnsupportedMethod { method: String },

    #[snafu(display("invalid base URL {}: {}", url, source))]
    InvalidBaseUrl {
        url: String,
        source: url::ParseError,
    },
}

/// Failures raised by a [Transport](crate::Transport).
///
/// The executor never lets these escape: [TransportError::Domain] is returned to the caller as the
/// API's own error envelope, and everything else becomes an `Unknown` [ApiError] pointing at the
/// location where the failure was raised.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransportError {
    /// The API answered with an error envelope.
    #[snafu(display("{}", error))]
    Domain { error: ApiError },

    #[snafu(display("{}", error))]
    Http {
        error: surf::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// The response arrived but its body could not be read.
    #[snafu(display("unable to read response body: {}", error))]
    Body {
        error: surf::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("unexpected response status {}: {}", status, body))]
    Status {
        status: u16,
        body: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("unable to read {}: {}", path.display(), source))]
    Io {
        path: PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("request timed out after {:?}", after))]
    Timeout {
        after: Duration,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("transport panicked: {}", message))]
    Panicked {
        message: String,
        #[snafu(implicit)]
        location: Location,
    },
}

impl TransportError {
    /// Convert from a generic client-side error.
    ///
    /// If `source` carries an [ApiError] (for instance one lifted into a [surf::Error] by
    /// middleware) it is recovered as a [TransportError::Domain]; otherwise the error is kept as
    /// an opaque HTTP failure.
    #[track_caller]
    pub fn from_client_error(source: surf::Error) -> Self {
        match source.downcast::<ApiError>() {
            Ok(error) => TransportError::Domain { error },
            Err(error) => HttpSnafu { error }.build(),
        }
    }

    /// Whether the same request may succeed if sent again.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Http { .. } | TransportError::Timeout { .. } => true,
            TransportError::Status { status, .. } => *status >= 500,
            TransportError::Domain { .. }
            | TransportError::Body { .. }
            | TransportError::Io { .. }
            | TransportError::Panicked { .. } => false,
        }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            TransportError::Domain { .. } => None,
            TransportError::Http { location, .. }
            | TransportError::Body { location, .. }
            | TransportError::Status { location, .. }
            | TransportError::Io { location, .. }
            | TransportError::Timeout { location, .. }
            | TransportError::Panicked { location, .. } => Some(location),
        }
    }

    /// Normalize into the uniform error shape.
    pub fn into_api_error(self) -> ApiError {
        let (file, line) = match self.location() {
            Some(location) => (location.file, location.line),
            None => (file!(), line!()),
        };
        match self {
            TransportError::Domain { error } => error,
            other => ApiError::catch_all(&other, file, line),
        }
    }
}

/// Context for embedding network client errors into [TransportError].
///
/// This type implements the [IntoError] trait from SNAFU, so it can be used with
/// [ResultExt::context](snafu::ResultExt::context) just like automatically generated SNAFU
/// contexts.
///
/// Calling `some_result.context(ClientError)` will convert a potential error from a [surf::Error]
/// using [TransportError::from_client_error].
pub struct ClientError;

impl IntoError<TransportError> for ClientError {
    type Source = surf::Error;

    #[track_caller]
    fn into_error(self, source: Self::Source) -> TransportError {
        TransportError::from_client_error(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snafu::ResultExt;

    fn api_error() -> ApiError {
        ApiError {
            kind: "InvalidPluginId".to_string(),
            message: "Invalid plugin id.".to_string(),
            code: "invalid_plugin_id".to_string(),
            http: 400,
        }
    }

    #[test]
    fn domain_errors_pass_through_unchanged() {
        let err = TransportError::Domain { error: api_error() };
        assert!(!err.is_transient());
        assert_eq!(err.into_api_error(), api_error());
    }

    #[test]
    fn client_errors_recover_embedded_api_errors() {
        let source = surf::Error::new(surf::StatusCode::BadRequest, api_error());
        let res: Result<(), surf::Error> = Err(source);
        match res.context(ClientError) {
            Err(TransportError::Domain { error }) => assert_eq!(error, api_error()),
            other => panic!("expected domain error, got {:?}", other),
        }
    }

    #[test]
    fn other_failures_become_unknown_with_location() {
        let source = surf::Error::from_str(surf::StatusCode::BadGateway, "connection reset");
        let err = TransportError::from_client_error(source);
        assert!(err.is_transient());
        let line = err.location().unwrap().line;

        let api = err.into_api_error();
        assert_eq!(api.kind, "Unknown");
        assert_eq!(api.code, "unknown");
        assert_eq!(api.http, 402);
        assert!(api.message.starts_with("connection reset ("));
        assert!(api
            .message
            .ends_with(&format!("src/error.rs: {})", line)));
    }

    #[test]
    fn unreadable_bodies_are_not_retried() {
        let err = BodySnafu {
            error: surf::Error::from_str(surf::StatusCode::Ok, "stream did not contain valid UTF-8"),
        }
        .build();
        assert!(!err.is_transient());
        let api = err.into_api_error();
        assert_eq!(api.kind, "Unknown");
        assert!(api.message.contains("valid UTF-8"));
    }

    #[test]
    fn only_server_side_statuses_are_transient() {
        let err = StatusSnafu {
            status: 503u16,
            body: "busy",
        }
        .build();
        assert!(err.is_transient());
        let err = StatusSnafu {
            status: 404u16,
            body: "missing",
        }
        .build();
        assert!(!err.is_transient());
    }
}
