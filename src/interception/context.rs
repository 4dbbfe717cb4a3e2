// src/interception/context.rs
//! Mutable request/response views handed to interception handlers
//!
//! A handler receives a deep copy of the snapshot built from a pause
//! event. The engine compares the copy against the original afterwards to
//! decide what, if anything, must be overridden on the wire: an untouched
//! copy produces a minimal resume, any change produces a fully-specified
//! continue/fulfill command.

use crate::interception::routes::Method;
use crate::interception::status::reason_phrase;
use bytes::Bytes;
use std::collections::HashMap;

/// An ordered multimap of string fields.
///
/// Used for query strings and parsed body forms, both of which are
/// legitimately multi-valued and order-sensitive on the wire. Equality is
/// order-independent: same size, same key/value multiset.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value stored under `key`, in insertion order.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Replace every entry under `key` with a single value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.entries.retain(|(k, _)| k != &key);
        self.entries.push((key, value.into()));
    }

    /// Add a value under `key`, keeping existing entries.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Drop every entry under `key`.
    pub fn remove(&mut self, key: &str) {
        self.entries.retain(|(k, _)| k != key);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl PartialEq for FieldMap {
    fn eq(&self, other: &Self) -> bool {
        if self.entries.len() != other.entries.len() {
            return false;
        }
        let mut counts: HashMap<(&str, &str), usize> = HashMap::new();
        for (k, v) in &self.entries {
            *counts.entry((k.as_str(), v.as_str())).or_default() += 1;
        }
        for (k, v) in &other.entries {
            match counts.get_mut(&(k.as_str(), v.as_str())) {
                Some(n) if *n > 0 => *n -= 1,
                _ => return false,
            }
        }
        true
    }
}

impl Eq for FieldMap {}

impl FromIterator<(String, String)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// A case-insensitive, order-preserving header map.
///
/// Keys are folded to lowercase when inserted, so lookups succeed for any
/// input casing and the map always serializes lower-cased, whatever casing
/// a handler wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    inner: FieldMap,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value of the header, any input casing.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner.get(&name.to_ascii_lowercase())
    }

    /// Every value of the header, any input casing.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.inner.get_all(&name.to_ascii_lowercase())
    }

    /// Replace the header with a single value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.set(name.into().to_ascii_lowercase(), value);
    }

    /// Add a header value, keeping existing ones (Set-Cookie and friends).
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.append(name.into().to_ascii_lowercase(), value);
    }

    pub fn remove(&mut self, name: &str) {
        self.inner.remove(&name.to_ascii_lowercase());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Entries in insertion order, keys already lower-cased.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.inner.iter()
    }
}

impl FromIterator<(String, String)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

/// The mutable request-phase view of an outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct InterceptedRequest {
    /// HTTP method.
    pub method: Method,

    /// Full URL (authority + path + query; fragment excluded).
    pub url: String,

    /// Query parameters, derived from the URL's query string. Mutations
    /// here are re-serialized into the URL actually sent.
    pub query: FieldMap,

    /// Path parameters captured by the route matcher. Mutations here
    /// regenerate the outbound path through the route's template.
    pub params: HashMap<String, String>,

    /// Raw request body.
    pub body: Bytes,

    /// Structured body projection, populated when a codec recognized the
    /// content type; empty otherwise.
    pub form: FieldMap,

    /// Request headers, keys folded to lowercase.
    pub headers: HeaderMap,
}

impl InterceptedRequest {
    /// The request's content type header, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    /// Compare against the pre-callback snapshot, field by field.
    pub fn diff(&self, original: &InterceptedRequest) -> RequestDiff {
        RequestDiff {
            method: self.method != original.method,
            url: self.url != original.url,
            headers: self.headers != original.headers,
            params: self.params != original.params,
            query: self.query != original.query,
            form: self.form != original.form,
            body: self.body != original.body,
        }
    }
}

/// Which request fields a handler changed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestDiff {
    pub method: bool,
    pub url: bool,
    pub headers: bool,
    pub params: bool,
    pub query: bool,
    pub form: bool,
    pub body: bool,
}

impl RequestDiff {
    /// True when any field changed.
    pub fn any(&self) -> bool {
        self.method
            || self.url
            || self.headers
            || self.params
            || self.query
            || self.form
            || self.body
    }
}

/// The mutable response-phase view of an intercepted response.
#[derive(Debug, Clone, PartialEq)]
pub struct InterceptedResponse {
    /// Numeric status code.
    pub status: u16,

    /// Reason phrase; defaulted from the status table when the wire
    /// carried none.
    pub status_text: String,

    /// Response headers, keys folded to lowercase.
    pub headers: HeaderMap,

    /// Raw response body, already decoded from the transport encoding.
    pub body: Bytes,

    /// Structured body projection, same semantics as the request form.
    pub form: FieldMap,
}

impl InterceptedResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    /// Compare against the pre-callback snapshot, field by field.
    pub fn diff(&self, original: &InterceptedResponse) -> ResponseDiff {
        ResponseDiff {
            status: self.status != original.status,
            status_text: self.status_text != original.status_text,
            headers: self.headers != original.headers,
            form: self.form != original.form,
            body: self.body != original.body,
        }
    }

    /// The reason phrase to put on the wire: the explicit text when set,
    /// otherwise the table default for the (possibly updated) status code.
    pub fn effective_status_text(&self) -> Option<String> {
        if !self.status_text.is_empty() {
            Some(self.status_text.clone())
        } else {
            reason_phrase(self.status).map(str::to_string)
        }
    }
}

/// Which response fields a handler changed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseDiff {
    pub status: bool,
    pub status_text: bool,
    pub headers: bool,
    pub form: bool,
    pub body: bool,
}

impl ResponseDiff {
    /// True when any field changed.
    pub fn any(&self) -> bool {
        self.status || self.status_text || self.headers || self.form || self.body
    }
}
