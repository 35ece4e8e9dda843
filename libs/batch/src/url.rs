//! Relative URL decomposition
//!
//! Splits a Sub-Request's relative URL into path segments and a query map. The query string of
//! a Sub-Request is independent of the outer batch call's own query parameters.

use std::collections::BTreeMap;

/// Query key used by several routes as a secondary dispatch discriminant.
pub const COMMAND_PARAM: &str = "command";

/// Decomposed form of a relative URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecomposedUrl {
    pub segments: Vec<String>,
    pub query: QueryParams,
}

/// Query parameters as `key -> values`, values kept in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    values: BTreeMap<String, Vec<String>>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw query string (without the leading `?`).
    pub fn parse(raw: &str) -> Self {
        let mut params = Self::new();
        for pair in raw.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode_query_component(key);
            if key.is_empty() {
                continue;
            }
            params.push(key, decode_query_component(value));
        }
        params
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.entry(key.into()).or_default().push(value.into());
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn all(&self, key: &str) -> &[String] {
        self.values.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// The `command` discriminant, trimmed; blank counts as absent.
    pub fn command(&self) -> Option<&str> {
        self.first(COMMAND_PARAM)
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// Decompose a relative URL into path segments and query parameters.
///
/// The cut between path and query happens at the first `?`. Leading slashes and empty
/// segments are dropped and a leading `v<digits>` version segment is stripped.
pub fn decompose(relative_url: &str) -> DecomposedUrl {
    let (path, query) = split_query(relative_url.trim());

    let mut segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(decode_path_segment)
        .collect();

    if segments.first().is_some_and(|s| is_version_segment(s)) {
        segments.remove(0);
    }

    DecomposedUrl {
        segments,
        query: query.map(QueryParams::parse).unwrap_or_default(),
    }
}

/// Split `path?query` at the first `?`.
pub fn split_query(relative_url: &str) -> (&str, Option<&str>) {
    match relative_url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (relative_url, None),
    }
}

/// Cut a raw segment at its first `?`.
///
/// Identifier segments can arrive with a query suffix glued to them (`42?command=approve`)
/// when a caller split the URL on `/` before removing the query.
pub fn strip_query_suffix(segment: &str) -> &str {
    segment.split_once('?').map_or(segment, |(head, _)| head)
}

/// Version prefix convention: `v` followed by one or more digits.
fn is_version_segment(segment: &str) -> bool {
    segment
        .strip_prefix('v')
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

fn decode_path_segment(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

fn decode_query_component(component: &str) -> String {
    let spaced = component.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}
