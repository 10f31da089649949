// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Scoped API library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! # Client for scoped, signed REST APIs.
//!
//! Every call is made on behalf of a scope: an app, developer, store, user, plugin or install,
//! identified by its id and authenticated with a public/secret key pair. A short resource path
//! such as `plugins/7/tags` is turned into a versioned, scope-prefixed, format-suffixed path
//! (`/v1/developers/42/plugins/7/tags.json`) by the [canonical] module, signed with an
//! HMAC over the method, body digest, date and path by the [signer] module, and sent by a
//! [Transport].
//!
//! Calls always produce a value. The API's own error objects (`{"error": {...}}`) and any failure
//! raised on the way, from network errors to a panicking transport, are folded into the same
//! [ApiError] shape inside the returned [ApiResult]. Callers who prefer Rust error handling can use
//! [ApiResult::into_result] or [ApiClient::api_as] to get a `Result<T, ApiError>`.
//!
//! The HTTP side is pluggable. [SurfTransport] talks to the API using `surf`, while any other
//! implementation of [Transport] (for instance an [FnTransport] in tests) can be injected with
//! [ApiClient::with_transport]. Misconfiguration, such as an unknown scope name or missing keys,
//! is reported up front as a [ConfigError] and never reaches the request path.

pub mod base64url;
pub mod canonical;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod executor;
pub mod signer;
pub mod transport;
pub mod types;

pub use client::ApiClient;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{CallPolicy, ClientConfig};
pub use error::*;
pub use executor::{FnTransport, RequestExecutor};
pub use transport::{SignedEnvelope, SurfTransport, Transport};
pub use types::*;
