// src/interception/routes.rs
//! Route table for dispatching intercepted traffic to handlers
//!
//! Routes are keyed by the composite (method, origin); each key holds an
//! ordered list of compiled path patterns with their handler pairs.
//! Lookup scans that list in registration order and the first matching
//! pattern wins, so overlapping patterns behave predictably.

use crate::interception::context::{InterceptedRequest, InterceptedResponse};
use crate::interception::pattern::PathPattern;
use crate::utils::errors::{InterceptError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Standard HTTP request methods eligible for interception.
///
/// Methods outside this set never reach route resolution; dispatch passes
/// them through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
}

impl Method {
    /// Every supported method, in a stable order. `any` registrations
    /// enumerate this list.
    pub const ALL: [Method; 9] = [
        Method::Get,
        Method::Head,
        Method::Post,
        Method::Put,
        Method::Delete,
        Method::Connect,
        Method::Options,
        Method::Trace,
        Method::Patch,
    ];

    /// Parse a wire-format method name, case-insensitively.
    pub fn parse(value: &str) -> Result<Self> {
        let method = match value.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "CONNECT" => Method::Connect,
            "OPTIONS" => Method::Options,
            "TRACE" => Method::Trace,
            "PATCH" => Method::Patch,
            _ => return Err(InterceptError::UnsupportedMethod(value.to_string())),
        };
        Ok(method)
    }

    /// The wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request-phase hook, invoked with the mutable request view.
pub type RequestHandler = Arc<dyn Fn(&mut InterceptedRequest) + Send + Sync>;

/// Response-phase hook, invoked with the mutable response view.
pub type ResponseHandler = Arc<dyn Fn(&mut InterceptedResponse) + Send + Sync>;

/// The pair of optional hooks bound to one route.
#[derive(Clone, Default)]
pub struct RouteHandlers {
    pub(crate) on_request: Option<RequestHandler>,
    pub(crate) on_response: Option<ResponseHandler>,
}

impl RouteHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a request-phase hook.
    pub fn on_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut InterceptedRequest) + Send + Sync + 'static,
    {
        self.on_request = Some(Arc::new(hook));
        self
    }

    /// Attach a response-phase hook.
    pub fn on_response<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut InterceptedResponse) + Send + Sync + 'static,
    {
        self.on_response = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for RouteHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteHandlers")
            .field("on_request", &self.on_request.is_some())
            .field("on_response", &self.on_response.is_some())
            .finish()
    }
}

/// One registered route: a compiled path pattern plus its hooks.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub(crate) pattern: PathPattern,
    pub(crate) handlers: RouteHandlers,
}

/// Route table keyed by (method, origin).
///
/// Entries are immutable once registered and live for the lifetime of the
/// engine instance.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<(Method, String), Vec<RouteEntry>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler pair for one method on a full URL pattern
    /// (`scheme://authority/path-template`). The template compiles
    /// immediately; compile errors reject this registration only.
    pub fn register(&mut self, method: Method, pattern: &str, handlers: RouteHandlers) -> Result<()> {
        self.register_all(&[method], pattern, handlers)
    }

    /// Register the same handler pair under several methods, compiling the
    /// pattern once.
    pub fn register_all(
        &mut self,
        methods: &[Method],
        pattern: &str,
        handlers: RouteHandlers,
    ) -> Result<()> {
        let (origin, template) = split_pattern(pattern)?;
        let compiled = PathPattern::compile(&template)?;

        for method in methods {
            info!("registered route {} {}{}", method, origin, compiled.template());
            self.routes
                .entry((*method, origin.clone()))
                .or_default()
                .push(RouteEntry {
                    pattern: compiled.clone(),
                    handlers: handlers.clone(),
                });
        }
        Ok(())
    }

    /// Entries registered for (method, origin), in registration order.
    pub fn entries(&self, method: Method, origin: &str) -> &[RouteEntry] {
        self.routes
            .get(&(method, origin.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Resolve the first entry whose pattern matches `path`, returning it
    /// with the captured path parameters.
    pub fn resolve(
        &self,
        method: Method,
        origin: &str,
        path: &str,
    ) -> Option<(&RouteEntry, HashMap<String, String>)> {
        for entry in self.entries(method, origin) {
            if let Some(params) = entry.pattern.matches(path) {
                debug!(
                    "route {} {}{} matched {}",
                    method,
                    origin,
                    entry.pattern.template(),
                    path
                );
                return Some((entry, params));
            }
        }
        None
    }

    /// Total number of registered entries across all keys.
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Split a registration pattern into its ASCII origin and path template.
fn split_pattern(pattern: &str) -> Result<(String, String)> {
    let url =
        Url::parse(pattern).map_err(|e| InterceptError::InvalidUrl(format!("{pattern}: {e}")))?;
    if !url.has_host() {
        return Err(InterceptError::InvalidUrl(format!(
            "route pattern has no host: {pattern}"
        )));
    }
    Ok((url.origin().ascii_serialization(), url.path().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_handlers() -> RouteHandlers {
        RouteHandlers::new()
    }

    #[test]
    fn test_register_and_resolve() {
        let mut table = RouteTable::new();
        table
            .register(Method::Get, "http://127.0.0.1/test", empty_handlers())
            .unwrap();

        let resolved = table.resolve(Method::Get, "http://127.0.0.1", "/test");
        assert!(resolved.is_some());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_first_match_wins() {
        let mut table = RouteTable::new();
        table
            .register(Method::Get, "http://a.example/x/:id", empty_handlers())
            .unwrap();
        table
            .register(Method::Get, "http://a.example/x/fixed", empty_handlers())
            .unwrap();

        // Both patterns match; registration order decides.
        let (entry, params) = table
            .resolve(Method::Get, "http://a.example", "/x/fixed")
            .unwrap();
        assert_eq!(entry.pattern.template(), "/x/:id");
        assert_eq!(params.get("id").map(String::as_str), Some("fixed"));
    }

    #[test]
    fn test_method_and_origin_isolation() {
        let mut table = RouteTable::new();
        table
            .register(Method::Get, "http://a/test", empty_handlers())
            .unwrap();

        assert!(table.resolve(Method::Post, "http://a", "/test").is_none());
        assert!(table.resolve(Method::Get, "http://b", "/test").is_none());
        assert!(table.resolve(Method::Get, "http://a", "/test").is_some());
    }

    #[test]
    fn test_default_port_is_normalized() {
        let mut table = RouteTable::new();
        table
            .register(Method::Get, "http://127.0.0.1:80/test", empty_handlers())
            .unwrap();

        // Event origins carry no default port either.
        assert!(table.resolve(Method::Get, "http://127.0.0.1", "/test").is_some());
    }

    #[test]
    fn test_bad_pattern_rejects_registration() {
        let mut table = RouteTable::new();
        assert!(table
            .register(Method::Get, "not a url", empty_handlers())
            .is_err());
        assert!(table
            .register(Method::Get, "http://a/x/:", empty_handlers())
            .is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn test_register_all_compiles_once() {
        let mut table = RouteTable::new();
        table
            .register_all(&Method::ALL, "http://a/any", empty_handlers())
            .unwrap();
        assert_eq!(table.len(), Method::ALL.len());
        assert!(table.resolve(Method::Patch, "http://a", "/any").is_some());
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(Method::parse("get").unwrap(), Method::Get);
        assert_eq!(Method::parse("POST").unwrap(), Method::Post);
        assert!(matches!(
            Method::parse("BAD"),
            Err(InterceptError::UnsupportedMethod(_))
        ));
    }
}
