// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Scoped API library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Turning short resource paths into fully qualified API paths.
//!
//! A relative path like `plugins/7/tags` issued by a developer with id 42 becomes
//! `/v1/developers/42/plugins/7/tags.json`. Query strings are carried through untouched, and a
//! path that already names a file (anything containing a `.`) is left without a format suffix.

use crate::types::{CanonicalRequest, Scope, API_VERSION, FORMAT};

/// Canonicalize `raw_path` under `scope`.
pub fn canonicalize(scope: &Scope, raw_path: &str) -> CanonicalRequest {
    let trimmed = raw_path.trim_matches('/');
    let (path, query) = match trimmed.find('?') {
        Some(pos) => trimmed.split_at(pos),
        None => (trimmed, ""),
    };
    let path = strip_format(path);

    let mut canonical = format!("/v{}/{}/{}", API_VERSION, scope.segment(), scope.id());
    if !path.is_empty() {
        canonical.push('/');
        canonical.push_str(path);
    }
    let format = if path.contains('.') {
        None
    } else {
        canonical.push('.');
        canonical.push_str(FORMAT);
        Some(FORMAT)
    };

    CanonicalRequest {
        path: canonical,
        query: query.to_string(),
        format,
    }
}

/// The unscoped connectivity endpoint, e.g. `/v1/ping.json`.
pub fn ping_path() -> String {
    format!("/v{}/ping.{}", API_VERSION, FORMAT)
}

// Case-insensitively drop one trailing `.json`.
fn strip_format(path: &str) -> &str {
    let suffix_len = FORMAT.len() + 1;
    if path.len() < suffix_len || !path.is_char_boundary(path.len() - suffix_len) {
        return path;
    }
    let (head, tail) = path.split_at(path.len() - suffix_len);
    if tail.starts_with('.') && tail[1..].eq_ignore_ascii_case(FORMAT) {
        head
    } else {
        path
    }
}
