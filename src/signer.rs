// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Scoped API library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Request authentication.
//!
//! Each request carries a `Date` header and an `Authorization` header of the form
//! `FS <id>:<public key>:<signature>`. The signature is an HMAC-SHA256, keyed with the scope's
//! secret key, over the newline-joined method, body digest, content type, date and resource path.
//! The server recomputes it from the same inputs, so the secret key never leaves the client and a
//! signature cannot be replayed against a different method, path or body.

use crate::base64url;
use crate::error::{ConfigError, InvalidKeySnafu};
use crate::types::{Method, ScopeContext};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// The request attributes covered by a signature.
#[derive(Clone, Copy, Debug)]
pub struct SigningInput<'a> {
    pub method: Method,
    /// Canonical path without the query string.
    pub resource: &'a str,
    /// Serialized request body, if one is sent.
    pub body: Option<&'a str>,
    pub content_type: Option<&'a str>,
}

/// Authentication headers for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthHeaders {
    pub date: String,
    pub authorization: String,
    /// Hex MD5 of the body, empty when no body is signed.
    pub content_md5: String,
}

/// Sign a request dated `at`.
pub fn sign(
    ctx: &ScopeContext,
    input: &SigningInput<'_>,
    at: DateTime<Utc>,
) -> Result<AuthHeaders, ConfigError> {
    let date = format_date(at);
    let content_md5 = match input.body {
        Some(body) if input.method.has_body() && !body.is_empty() => {
            format!("{:x}", md5::compute(body))
        }
        _ => String::new(),
    };
    let string_to_sign = [
        input.method.as_str(),
        content_md5.as_str(),
        input.content_type.unwrap_or(""),
        date.as_str(),
        input.resource,
    ]
    .join("\n");

    let mut mac = <HmacSha256 as Mac>::new_from_slice(ctx.secret_key().as_bytes())
        .map_err(|_| InvalidKeySnafu.build())?;
    mac.update(string_to_sign.as_bytes());
    let signature = base64url::encode(hex::encode(mac.finalize().into_bytes()));

    // Identical keys mean the secret is the public key hash.
    let auth_type = if ctx.secret_key() == ctx.public_key() {
        "FSP"
    } else {
        "FS"
    };
    Ok(AuthHeaders {
        date,
        authorization: format!(
            "{} {}:{}:{}",
            auth_type,
            ctx.id(),
            ctx.public_key(),
            signature
        ),
        content_md5,
    })
}

/// RFC 2822 with a zero-padded day, e.g. `Mon, 06 Mar 2023 09:05:01 +0000`.
pub fn format_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S %z").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Scope;
    use chrono::TimeZone;

    fn ctx() -> ScopeContext {
        ScopeContext::new(Scope::Developer(42), "pk_abc", "sk_xyz", false).unwrap()
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 3, 6, 9, 5, 1).unwrap()
    }

    fn expected_signature(secret: &str, string_to_sign: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(string_to_sign.as_bytes());
        base64url::encode(hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn dates_are_rfc2822_utc() {
        assert_eq!(format_date(at()), "Mon, 06 Mar 2023 09:05:01 +0000");
    }

    #[test]
    fn get_requests_sign_without_body() {
        let input = SigningInput {
            method: Method::Get,
            resource: "/v1/developers/42/plugins.json",
            body: None,
            content_type: None,
        };
        let headers = sign(&ctx(), &input, at()).unwrap();
        assert_eq!(headers.date, "Mon, 06 Mar 2023 09:05:01 +0000");
        assert_eq!(headers.content_md5, "");

        let signature = expected_signature(
            "sk_xyz",
            "GET\n\n\nMon, 06 Mar 2023 09:05:01 +0000\n/v1/developers/42/plugins.json",
        );
        assert_eq!(
            headers.authorization,
            format!("FS 42:pk_abc:{}", signature)
        );
    }

    #[test]
    fn post_bodies_are_digested() {
        let body = r#"{"add_contributor":true}"#;
        let input = SigningInput {
            method: Method::Post,
            resource: "/v1/developers/42/plugins/7/tags.json",
            body: Some(body),
            content_type: Some(JSON_CONTENT_TYPE),
        };
        let headers = sign(&ctx(), &input, at()).unwrap();
        let md5 = format!("{:x}", md5::compute(body));
        assert_eq!(headers.content_md5, md5);

        let signature = expected_signature(
            "sk_xyz",
            &format!(
                "POST\n{}\napplication/json\nMon, 06 Mar 2023 09:05:01 +0000\n/v1/developers/42/plugins/7/tags.json",
                md5
            ),
        );
        assert!(headers.authorization.ends_with(&signature));
    }

    #[test]
    fn signatures_bind_method_and_path() {
        let base = SigningInput {
            method: Method::Get,
            resource: "/v1/developers/42/plugins.json",
            body: None,
            content_type: None,
        };
        let other_path = SigningInput {
            resource: "/v1/developers/42/users.json",
            ..base
        };
        let other_method = SigningInput {
            method: Method::Delete,
            ..base
        };
        let a = sign(&ctx(), &base, at()).unwrap().authorization;
        assert_ne!(a, sign(&ctx(), &other_path, at()).unwrap().authorization);
        assert_ne!(a, sign(&ctx(), &other_method, at()).unwrap().authorization);
        assert!(!a.contains("sk_xyz"));
    }

    #[test]
    fn public_key_hash_auth() {
        let ctx = ScopeContext::new(Scope::Install(5), "same", "same", false).unwrap();
        let input = SigningInput {
            method: Method::Get,
            resource: "/v1/installs/5.json",
            body: None,
            content_type: None,
        };
        let headers = sign(&ctx, &input, at()).unwrap();
        assert!(headers.authorization.starts_with("FSP 5:same:"));
    }
}
