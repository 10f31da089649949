// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Scoped API library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::error::{BodySnafu, ClientError, IoSnafu, StatusSnafu, TransportError};
use crate::signer::{AuthHeaders, JSON_CONTENT_TYPE};
use crate::types::{ErrorEnvelope, FileParams, Method, Params};
use futures::future::BoxFuture;
use rand::{distributions::Alphanumeric, Rng};
use serde_json::Value;
use snafu::ResultExt;
use std::path::Path;
use surf::{Body, Client, Request, Response, StatusCode, Url};
use tracing::{event, Level};

/// Everything needed to put one request on the wire.
#[derive(Clone, Debug)]
pub struct SignedEnvelope {
    /// Canonical path, including the query string if any.
    pub path: String,
    pub method: Method,
    pub params: Params,
    pub files: FileParams,
    /// Serialized JSON body for POST/PUT requests without files.
    pub body: Option<String>,
    pub content_type: Option<&'static str>,
    /// `None` for unauthenticated endpoints.
    pub auth: Option<AuthHeaders>,
}

/// The capability of sending a signed request and returning the raw response body bytes.
///
/// Implementations raise [TransportError::Domain] when the API answers with an error envelope and
/// any other variant for failures of the call itself.
pub trait Transport: Send + Sync {
    fn invoke<'a>(&'a self, envelope: &'a SignedEnvelope)
        -> BoxFuture<'a, Result<Vec<u8>, TransportError>>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn invoke<'a>(
        &'a self,
        envelope: &'a SignedEnvelope,
    ) -> BoxFuture<'a, Result<Vec<u8>, TransportError>> {
        (**self).invoke(envelope)
    }
}

/// [Transport] over HTTP using a [surf::Client].
#[derive(Clone)]
pub struct SurfTransport {
    client: Client,
    base_url: Url,
}

impl std::fmt::Debug for SurfTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfTransport")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

impl SurfTransport {
    pub fn new(base_url: Url) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn build_request(&self, envelope: &SignedEnvelope) -> Result<Request, TransportError> {
        let mut url = self.url_for(&envelope.path);
        if !envelope.method.has_body() && !envelope.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &envelope.params {
                pairs.append_pair(key, &param_string(value));
            }
        }

        let mut req = Request::new(envelope.method.into(), url);
        if let Some(auth) = &envelope.auth {
            req.insert_header("Date", auth.date.as_str());
            req.insert_header("Authorization", auth.authorization.as_str());
            if !auth.content_md5.is_empty() {
                req.insert_header("Content-MD5", auth.content_md5.as_str());
            }
        }

        if envelope.method.has_body() {
            if !envelope.files.is_empty() {
                let (boundary, body) = multipart_body(&envelope.params, &envelope.files).await?;
                req.set_body(Body::from_bytes(body));
                req.insert_header(
                    "Content-Type",
                    format!("multipart/form-data; boundary={}", boundary).as_str(),
                );
            } else if let Some(body) = &envelope.body {
                req.set_body(Body::from_string(body.clone()));
                // Must match the content type that was signed.
                req.insert_header(
                    "Content-Type",
                    envelope.content_type.unwrap_or(JSON_CONTENT_TYPE),
                );
            }
        }
        Ok(req)
    }

    // `path` is absolute, so it is appended to the base rather than joined.
    fn url_for(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let (path, query) = match path.find('?') {
            Some(pos) => (&path[..pos], Some(&path[pos + 1..])),
            None => (path, None),
        };
        let prefix = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}{}", prefix, path));
        url.set_query(query);
        url
    }
}

impl Transport for SurfTransport {
    fn invoke<'a>(
        &'a self,
        envelope: &'a SignedEnvelope,
    ) -> BoxFuture<'a, Result<Vec<u8>, TransportError>> {
        Box::pin(async move {
            let req = self.build_request(envelope).await?;
            let res = self.client.send(req).await.context(ClientError)?;
            response_to_result(res).await
        })
    }
}

/// Read the body of a response, turning non-success statuses into errors.
///
/// Error bodies that follow the `{"error": {...}}` convention become [TransportError::Domain]; any
/// other non-success response is reported with its status and body. Success bodies are returned as
/// bytes, whatever their encoding.
pub async fn response_to_result(mut res: Response) -> Result<Vec<u8>, TransportError> {
    let status = res.status();
    let body = res
        .body_bytes()
        .await
        .map_err(|error| BodySnafu { error }.build())?;
    if status.is_success() {
        return Ok(body);
    }
    match serde_json::from_slice::<ErrorEnvelope>(&body) {
        Ok(envelope) => {
            event!(
                Level::DEBUG,
                "API error response {{status: {}, type: {}}}",
                status,
                envelope.error.kind
            );
            let mut error = envelope.error;
            if error.http == 0 {
                error.http = status as u16;
            }
            Err(TransportError::Domain { error })
        }
        Err(_) => StatusSnafu {
            status: status as u16,
            body: String::from_utf8_lossy(&body),
        }
        .fail(),
    }
}

fn param_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

struct Part {
    headers: String,
    contents: Vec<u8>,
}

/// Encode `params` and `files` as `multipart/form-data`, returning the boundary and the body.
async fn multipart_body(
    params: &Params,
    files: &FileParams,
) -> Result<(String, Vec<u8>), TransportError> {
    let mut parts = Vec::with_capacity(params.len() + files.len());
    for (name, value) in params {
        parts.push(Part {
            headers: format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                quote(name)
            ),
            contents: param_string(value).into_bytes(),
        });
    }
    for (name, path) in files {
        let contents = async_std::fs::read(async_std::path::PathBuf::from(path.clone()))
            .await
            .context(IoSnafu { path })?;
        parts.push(Part {
            headers: format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                quote(name),
                quote(&file_name(path)),
                content_type_for(path)
            ),
            contents,
        });
    }

    let boundary = pick_boundary(&parts, random_boundary);
    let mut body = Vec::new();
    for part in &parts {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(part.headers.as_bytes());
        body.extend_from_slice(&part.contents);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    Ok((boundary, body))
}

/// Draw boundaries from `candidates` until one occurs in none of the parts.
fn pick_boundary(parts: &[Part], mut candidates: impl FnMut() -> String) -> String {
    loop {
        let boundary = candidates();
        let needle = boundary.as_bytes();
        let collides = parts.iter().any(|part| {
            contains(part.headers.as_bytes(), needle) || contains(&part.contents, needle)
        });
        if !collides {
            return boundary;
        }
        event!(Level::DEBUG, "multipart boundary {} occurs in the payload", boundary);
    }
}

fn random_boundary() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("----scoped-api-{}", suffix)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

// Percent-encode the characters that would end a quoted header value or the header itself.
fn quote(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("zip") => "application/zip",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}
