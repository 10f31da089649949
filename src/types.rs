// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Scoped API library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::error::{
    ConfigError, MissingCredentialsSnafu, UnknownScopeSnafu, UnsupportedMethodSnafu,
};
use fmt::{Display, Formatter};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Version segment prepended to every canonical path.
pub const API_VERSION: u32 = 1;

/// Response format suffix appended to canonical paths.
pub const FORMAT: &str = "json";

/// Request parameters. Sent as query pairs for GET/DELETE and as a JSON body for POST/PUT.
pub type Params = serde_json::Map<String, Value>;

/// Form field name to local file path, sent as multipart parts.
pub type FileParams = BTreeMap<String, PathBuf>;

/// The kind of principal a client authenticates as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    App,
    Developer,
    Store,
    User,
    Plugin,
    Install,
}

impl ScopeKind {
    pub const ALL: [ScopeKind; 6] = [
        ScopeKind::App,
        ScopeKind::Developer,
        ScopeKind::Store,
        ScopeKind::User,
        ScopeKind::Plugin,
        ScopeKind::Install,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScopeKind::App => "app",
            ScopeKind::Developer => "developer",
            ScopeKind::Store => "store",
            ScopeKind::User => "user",
            ScopeKind::Plugin => "plugin",
            ScopeKind::Install => "install",
        }
    }

    /// Attach an id to this kind.
    pub fn with_id(self, id: u64) -> Scope {
        match self {
            ScopeKind::App => Scope::App(id),
            ScopeKind::Developer => Scope::Developer(id),
            ScopeKind::Store => Scope::Store(id),
            ScopeKind::User => Scope::User(id),
            ScopeKind::Plugin => Scope::Plugin(id),
            ScopeKind::Install => Scope::Install(id),
        }
    }
}

impl FromStr for ScopeKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScopeKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownScopeSnafu { scope: s }.build())
    }
}

impl Display for ScopeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authentication scope together with the id of the principal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    App(u64),
    Developer(u64),
    Store(u64),
    User(u64),
    Plugin(u64),
    Install(u64),
}

impl Scope {
    /// Parse a scope from its wire name, e.g. `("developer", 42)`.
    pub fn parse(kind: &str, id: u64) -> Result<Self, ConfigError> {
        Ok(kind.parse::<ScopeKind>()?.with_id(id))
    }

    pub fn kind(&self) -> ScopeKind {
        match self {
            Scope::App(_) => ScopeKind::App,
            Scope::Developer(_) => ScopeKind::Developer,
            Scope::Store(_) => ScopeKind::Store,
            Scope::User(_) => ScopeKind::User,
            Scope::Plugin(_) => ScopeKind::Plugin,
            Scope::Install(_) => ScopeKind::Install,
        }
    }

    pub fn id(&self) -> u64 {
        match *self {
            Scope::App(id)
            | Scope::Developer(id)
            | Scope::Store(id)
            | Scope::User(id)
            | Scope::Plugin(id)
            | Scope::Install(id) => id,
        }
    }

    /// The path segment naming this scope's collection, e.g. `developers`.
    pub fn segment(&self) -> &'static str {
        match self {
            Scope::App(_) => "apps",
            Scope::Developer(_) => "developers",
            Scope::Store(_) => "stores",
            Scope::User(_) => "users",
            Scope::Plugin(_) => "plugins",
            Scope::Install(_) => "installs",
        }
    }
}

/// Credentials and environment of a client. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct ScopeContext {
    scope: Scope,
    public_key: String,
    secret_key: String,
    sandbox: bool,
}

impl ScopeContext {
    pub fn new(
        scope: Scope,
        public_key: impl Into<String>,
        secret_key: impl Into<String>,
        sandbox: bool,
    ) -> Result<Self, ConfigError> {
        let public_key = public_key.into();
        let secret_key = secret_key.into();
        if public_key.is_empty() {
            return MissingCredentialsSnafu { field: "public key" }.fail();
        }
        if secret_key.is_empty() {
            return MissingCredentialsSnafu { field: "secret key" }.fail();
        }
        Ok(Self {
            scope,
            public_key,
            secret_key,
            sandbox,
        })
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn id(&self) -> u64 {
        self.scope.id()
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub(crate) fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn is_sandbox(&self) -> bool {
        self.sandbox
    }
}

// The secret key must never end up in logs.
impl fmt::Debug for ScopeContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeContext")
            .field("scope", &self.scope)
            .field("public_key", &self.public_key)
            .field("secret_key", &"<redacted>")
            .field("sandbox", &self.sandbox)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    /// Whether params travel in the request body rather than the query string.
    pub fn has_body(self) -> bool {
        matches!(self, Method::Post | Method::Put)
    }
}

impl FromStr for Method {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            _ => UnsupportedMethodSnafu { method: s }.fail(),
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for surf::http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => surf::http::Method::Get,
            Method::Post => surf::http::Method::Post,
            Method::Put => surf::http::Method::Put,
            Method::Delete => surf::http::Method::Delete,
        }
    }
}

/// A fully qualified API path, e.g. `/v1/developers/42/plugins/7.json?fields=id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalRequest {
    /// Versioned, scoped path including the format suffix but not the query.
    pub path: String,
    /// Query string including its leading `?`, or empty.
    pub query: String,
    /// The suffix that was appended, if any.
    pub format: Option<&'static str>,
}

impl CanonicalRequest {
    pub fn full_path(&self) -> String {
        format!("{}{}", self.path, self.query)
    }
}

impl Display for CanonicalRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.path, self.query)
    }
}

/// Uniform error shape, whether the API reported it or the call failed locally.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "code_as_string")]
    pub code: String,
    #[serde(default)]
    pub http: u16,
}

impl ApiError {
    pub const UNKNOWN: &'static str = "Unknown";

    /// Wrap an unexpected failure. `origin` is rendered as `file: line`.
    pub fn catch_all(message: impl Display, file: &str, line: u32) -> Self {
        Self {
            kind: Self::UNKNOWN.to_string(),
            message: format!("{} ({}: {})", message, file, line),
            code: "unknown".to_string(),
            http: 402,
        }
    }

    pub(crate) fn invalid_response(message: impl Display) -> Self {
        Self {
            kind: "InvalidResponse".to_string(),
            message: message.to_string(),
            code: "invalid_response".to_string(),
            http: 502,
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}, http {}]: {}", self.kind, self.code, self.http, self.message)
    }
}

impl std::error::Error for ApiError {}

// Some endpoints report numeric codes.
fn code_as_string<'de, D: serde::Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// The `{"error": {...}}` object carried by failed responses.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub error: ApiError,
}

impl From<ApiError> for ErrorEnvelope {
    fn from(error: ApiError) -> Self {
        Self { error }
    }
}

impl Display for ErrorEnvelope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt_as_json(self, f)
    }
}

/// Outcome of an API call. Decoding is attempted once; undecodable bodies are kept verbatim.
#[derive(Clone, Debug, PartialEq)]
pub enum ApiResult {
    Decoded(Value),
    Raw(String),
    /// A body which is not UTF-8 text, such as a downloaded archive.
    Binary(Vec<u8>),
}

impl ApiResult {
    /// Like [from_body](Self::from_body), keeping bodies that are not UTF-8 as [ApiResult::Binary].
    pub fn from_bytes(body: Vec<u8>) -> Self {
        match String::from_utf8(body) {
            Ok(text) => Self::from_body(text),
            Err(err) => ApiResult::Binary(err.into_bytes()),
        }
    }

    /// Decode `body`, falling back to the raw string when it is not JSON or decodes to `null`.
    pub fn from_body(body: String) -> Self {
        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Null) | Err(_) => ApiResult::Raw(body),
            Ok(value) => ApiResult::Decoded(value),
        }
    }

    pub fn from_error(error: ApiError) -> Self {
        let envelope = ErrorEnvelope::from(error);
        // Serializing a struct of strings and an integer cannot fail.
        match serde_json::to_value(&envelope) {
            Ok(value) => ApiResult::Decoded(value),
            Err(_) => ApiResult::Raw(envelope.to_string()),
        }
    }

    pub fn decoded(&self) -> Option<&Value> {
        match self {
            ApiResult::Decoded(value) => Some(value),
            ApiResult::Raw(_) | ApiResult::Binary(_) => None,
        }
    }

    /// The error carried by this result, if it is an error envelope.
    pub fn error(&self) -> Option<ApiError> {
        let error = self.decoded()?.as_object()?.get("error")?;
        if !error.is_object() {
            return None;
        }
        ApiError::deserialize(error).ok()
    }

    pub fn is_error(&self) -> bool {
        self.error().is_some()
    }

    /// Convert into a typed result, surfacing error envelopes as `Err`.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        if let Some(error) = self.error() {
            return Err(error);
        }
        match self {
            ApiResult::Decoded(value) => serde_json::from_value(value).map_err(|err| {
                ApiError::invalid_response(format!("response does not match expected shape: {}", err))
            }),
            ApiResult::Raw(body) => Err(ApiError::invalid_response(format!(
                "response is not JSON: {}",
                body
            ))),
            ApiResult::Binary(body) => Err(ApiError::invalid_response(format!(
                "response is binary ({} bytes)",
                body.len()
            ))),
        }
    }
}

impl Display for ApiResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ApiResult::Decoded(value) => fmt_as_json(value, f),
            ApiResult::Raw(body) => f.write_str(body),
            ApiResult::Binary(body) => f.write_str(&String::from_utf8_lossy(body)),
        }
    }
}

// Display implementation for types which serialize to JSON. Displays as a valid JSON object.
pub fn fmt_as_json<T: Serialize>(v: &T, f: &mut Formatter<'_>) -> fmt::Result {
    let string = serde_json::to_string(v).map_err(|_| fmt::Error)?;
    write!(f, "{}", string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scope_kinds_parse_from_wire_names() {
        for kind in ScopeKind::ALL {
            assert_eq!(kind.as_str().parse::<ScopeKind>().unwrap(), kind);
        }
        assert_eq!(Scope::parse("developer", 42).unwrap(), Scope::Developer(42));
    }

    #[test]
    fn unknown_scope_is_a_configuration_error() {
        let err = Scope::parse("vendor", 1).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownScope { ref scope } if scope == "vendor"));
        assert_eq!(err.to_string(), "Scope not implemented: vendor");
        // Matching is exact, not case-insensitive.
        assert!("Developer".parse::<ScopeKind>().is_err());
    }

    #[test]
    fn context_requires_both_keys() {
        assert!(matches!(
            ScopeContext::new(Scope::App(1), "", "sk", false),
            Err(ConfigError::MissingCredentials { field: "public key" })
        ));
        assert!(matches!(
            ScopeContext::new(Scope::App(1), "pk", "", false),
            Err(ConfigError::MissingCredentials { field: "secret key" })
        ));
        let ctx = ScopeContext::new(Scope::App(1), "pk", "sk", true).unwrap();
        assert!(ctx.is_sandbox());
        assert!(!format!("{:?}", ctx).contains("sk\""));
    }

    #[test]
    fn method_parsing_is_case_insensitive() {
        assert_eq!("post".parse::<Method>().unwrap(), Method::Post);
        assert_eq!("Delete".parse::<Method>().unwrap(), Method::Delete);
        assert!("PATCH".parse::<Method>().is_err());
    }

    #[test]
    fn raw_fallback_for_undecodable_bodies() {
        assert_eq!(
            ApiResult::from_body("<html>".to_string()),
            ApiResult::Raw("<html>".to_string())
        );
        assert_eq!(
            ApiResult::from_body("null".to_string()),
            ApiResult::Raw("null".to_string())
        );
        assert_eq!(ApiResult::from_body(String::new()), ApiResult::Raw(String::new()));
        assert_eq!(
            ApiResult::from_body("{\"id\":1}".to_string()),
            ApiResult::Decoded(json!({"id": 1}))
        );
    }

    #[test]
    fn non_utf8_bodies_are_kept_as_bytes() {
        let zip = vec![0x50, 0x4b, 0x03, 0x04, 0xff, 0xfe, 0x00];
        let result = ApiResult::from_bytes(zip.clone());
        assert_eq!(result, ApiResult::Binary(zip));
        assert!(result.decoded().is_none());
        assert!(!result.is_error());
        assert_eq!(
            result.into_result::<Value>().unwrap_err().kind,
            "InvalidResponse"
        );

        assert_eq!(
            ApiResult::from_bytes(b"{\"id\":1}".to_vec()),
            ApiResult::Decoded(json!({"id": 1}))
        );
        assert_eq!(
            ApiResult::from_bytes(b"PK\x03\x04".to_vec()),
            ApiResult::Raw("PK\u{3}\u{4}".to_string())
        );
    }

    #[test]
    fn error_envelopes_surface_as_err() {
        let result = ApiResult::Decoded(json!({
            "error": {"type": "InvalidPlugin", "message": "no such plugin", "code": 404, "http": 404}
        }));
        let err = result.clone().into_result::<Value>().unwrap_err();
        assert_eq!(err.kind, "InvalidPlugin");
        assert_eq!(err.code, "404");
        assert_eq!(err.http, 404);
        assert!(result.is_error());

        // An "error" field that is not an object is ordinary data.
        let result = ApiResult::Decoded(json!({"error": false, "id": 3}));
        assert!(!result.is_error());
    }

    #[test]
    fn catch_all_records_origin() {
        let err = ApiError::catch_all("connection reset", "src/transport.rs", 17);
        let value = serde_json::to_value(ErrorEnvelope::from(err)).unwrap();
        assert_eq!(
            value,
            json!({"error": {
                "type": "Unknown",
                "message": "connection reset (src/transport.rs: 17)",
                "code": "unknown",
                "http": 402
            }})
        );
    }

    #[test]
    fn raw_bodies_are_not_typed_results() {
        let err = ApiResult::Raw("oops".to_string())
            .into_result::<Value>()
            .unwrap_err();
        assert_eq!(err.kind, "InvalidResponse");
    }
}
