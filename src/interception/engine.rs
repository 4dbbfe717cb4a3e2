// src/interception/engine.rs
//! Interception engine
//!
//! The central dispatcher: consumes pause events from the transport,
//! classifies the phase, resolves the matching route, runs the user's
//! hook against a mutable snapshot, and issues the continue/fulfill
//! command that reflects exactly what the hook changed. An untouched
//! snapshot produces a minimal resume; any change produces a command
//! carrying every mutable field, since the transport applies only fields
//! that are explicitly present.

use crate::interception::codec::{BodyCodec, CodecRegistry};
use crate::interception::context::{
    FieldMap, HeaderMap, InterceptedRequest, InterceptedResponse, RequestDiff,
};
use crate::interception::pattern::PathPattern;
use crate::interception::routes::{Method, RequestHandler, ResponseHandler, RouteHandlers, RouteTable};
use crate::interception::status::reason_phrase;
use crate::transport::fetch::{
    encode_body, ContinueRequestParams, ContinueResponseParams, EnableInterceptionParams,
    FetchTransport, FulfillRequestParams, HeaderEntry, RequestPausedEvent,
};
use crate::utils::errors::{InterceptError, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

/// Configuration for the interception engine.
#[derive(Debug, Clone)]
pub struct InterceptorConfig {
    /// URL pattern handed to the transport when interception starts.
    pub url_pattern: String,

    /// Log intercepted request traffic.
    pub log_requests: bool,

    /// Log intercepted response traffic.
    pub log_responses: bool,

    /// Maximum body size to log (bytes).
    pub max_log_body_size: usize,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            url_pattern: "*".to_string(),
            log_requests: true,
            log_responses: true,
            max_log_body_size: 10_000, // 10KB
        }
    }
}

/// A request that passed its request phase and awaits its response phase.
///
/// Bookkeeping only: response-phase handling rebuilds its own snapshot
/// from the incoming pause event and never reads these records back.
#[derive(Debug, Clone)]
pub struct PendingIntercept {
    /// Transport-assigned request identifier.
    pub request_id: String,

    /// Method of the intercepted request.
    pub method: Method,

    /// URL as it left the request phase.
    pub url: String,

    /// When the request phase was handled.
    pub intercepted_at: DateTime<Utc>,
}

/// HTTP(S) interception engine over a Fetch-domain transport.
///
/// Registration (`handle`, `get`, `post`, `any`, `register_body_parser`)
/// happens before `enable`; afterwards the route table and codec registry
/// are read-mostly while dispatch runs on the transport's event stream.
pub struct FetchInterceptor {
    config: InterceptorConfig,
    transport: Arc<dyn FetchTransport>,
    routes: RwLock<RouteTable>,
    codecs: RwLock<CodecRegistry>,
    pending: DashMap<String, PendingIntercept>,
}

impl FetchInterceptor {
    /// Create an engine with default configuration and the built-in body
    /// codecs.
    pub fn new(transport: Arc<dyn FetchTransport>) -> Self {
        Self::with_config(InterceptorConfig::default(), transport)
    }

    /// Create an engine with custom configuration.
    pub fn with_config(config: InterceptorConfig, transport: Arc<dyn FetchTransport>) -> Self {
        Self {
            config,
            transport,
            routes: RwLock::new(RouteTable::new()),
            codecs: RwLock::new(CodecRegistry::with_defaults()),
            pending: DashMap::new(),
        }
    }

    /// Register hooks for one method on a full URL pattern
    /// (`scheme://authority/path-template`). Fails fast on unsupported
    /// methods and malformed templates; no handler is installed then.
    pub fn handle(&self, method: &str, pattern: &str, handlers: RouteHandlers) -> Result<()> {
        let method = Method::parse(method)?;
        self.routes.write().register(method, pattern, handlers)
    }

    /// Register hooks for `GET` requests.
    pub fn get(&self, pattern: &str, handlers: RouteHandlers) -> Result<()> {
        self.handle("GET", pattern, handlers)
    }

    /// Register hooks for `POST` requests.
    pub fn post(&self, pattern: &str, handlers: RouteHandlers) -> Result<()> {
        self.handle("POST", pattern, handlers)
    }

    /// Register the same hooks under every supported method.
    pub fn any(&self, pattern: &str, handlers: RouteHandlers) -> Result<()> {
        self.routes.write().register_all(&Method::ALL, pattern, handlers)
    }

    /// Extend the codec registry. A codec with the same MIME type shadows
    /// the built-in one.
    pub fn register_body_parser(&self, codec: Arc<dyn BodyCodec>) {
        self.codecs.write().register(codec);
    }

    /// Requests that passed their request phase and are awaiting their
    /// response phase.
    pub fn pending(&self) -> Vec<PendingIntercept> {
        self.pending.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Subscribe the dispatcher to the transport's pause-event stream and
    /// start intercepting.
    pub async fn enable(self: &Arc<Self>) -> Result<()> {
        let mut events = self.transport.subscribe_request_paused();
        let engine = Arc::clone(self);

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let request_id = event.request_id.clone();
                if let Err(e) = engine.on_request_paused(event).await {
                    error!("dispatch failed for request {}: {}", request_id, e);
                }
            }
            debug!("pause event stream closed");
        });

        info!("enabling interception for pattern {}", self.config.url_pattern);
        self.transport
            .enable_interception(EnableInterceptionParams::with_url_pattern(
                &self.config.url_pattern,
            ))
            .await
    }

    /// Dispatch one pause event. Public so embedders driving their own
    /// event loop can feed events directly.
    pub async fn on_request_paused(&self, event: RequestPausedEvent) -> Result<()> {
        if event.is_response_phase() {
            self.handle_response_phase(event).await
        } else {
            self.handle_request_phase(event).await
        }
    }

    async fn handle_request_phase(&self, event: RequestPausedEvent) -> Result<()> {
        let request_id = event.request_id.clone();

        // Methods outside the supported set bypass interception entirely.
        let Ok(method) = Method::parse(&event.request.method) else {
            debug!(
                "passing through unsupported method {} for {}",
                event.request.method, event.request.url
            );
            return self
                .transport
                .continue_request(ContinueRequestParams::passthrough(request_id))
                .await;
        };

        let Some((url, origin)) = parse_event_url(&event.request.url) else {
            debug!("passing through unparsable URL {}", event.request.url);
            return self
                .transport
                .continue_request(ContinueRequestParams::passthrough(request_id))
                .await;
        };

        let resolved = {
            let routes = self.routes.read();
            routes
                .resolve(method, &origin, url.path())
                .map(|(entry, params)| (entry.clone(), params))
        };

        let Some((route, params)) = resolved else {
            debug!("no route for {} {}", method, event.request.url);
            return self
                .transport
                .continue_request(ContinueRequestParams::passthrough(request_id))
                .await;
        };

        if self.config.log_requests {
            self.log_request(&event);
        }

        // A matched route always enters response interception so the
        // response phase can still be observed.
        let Some(hook) = route.handlers.on_request.clone() else {
            return self
                .transport
                .continue_request(ContinueRequestParams::observe_response(request_id))
                .await;
        };

        let original = self.build_request_context(method, &url, params, &event);
        let mut current = original.clone();

        if !invoke_request_hook(&hook, &mut current) {
            warn!(
                "request hook panicked for {} {}; resuming unmodified",
                method, original.url
            );
            return self
                .transport
                .continue_request(ContinueRequestParams::observe_response(request_id))
                .await;
        }

        self.pending.insert(
            request_id.clone(),
            PendingIntercept {
                request_id: request_id.clone(),
                method: current.method,
                url: current.url.clone(),
                intercepted_at: Utc::now(),
            },
        );

        let diff = current.diff(&original);
        if !diff.any() {
            return self
                .transport
                .continue_request(ContinueRequestParams::observe_response(request_id))
                .await;
        }

        let out_url = rebuild_url(&current, &original, &route.pattern, &diff)?;
        let out_body = self.reencode_body(
            diff.form,
            current.content_type(),
            &current.form,
            &current.body,
            &original.body,
        );

        self.transport
            .continue_request(ContinueRequestParams {
                request_id,
                url: Some(out_url),
                method: Some(current.method.as_str().to_string()),
                post_data: Some(encode_body(&out_body)),
                headers: Some(header_entries(&current.headers)),
                intercept_response: Some(true),
            })
            .await
    }

    async fn handle_response_phase(&self, event: RequestPausedEvent) -> Result<()> {
        let request_id = event.request_id.clone();

        // The request/response pair is complete; drop the bookkeeping
        // entry no matter how this phase resolves.
        self.pending.remove(&request_id);

        let Ok(method) = Method::parse(&event.request.method) else {
            return self
                .transport
                .continue_response(ContinueResponseParams::passthrough(request_id))
                .await;
        };

        let Some((url, origin)) = parse_event_url(&event.request.url) else {
            return self
                .transport
                .continue_response(ContinueResponseParams::passthrough(request_id))
                .await;
        };

        let resolved = {
            let routes = self.routes.read();
            routes
                .resolve(method, &origin, url.path())
                .map(|(entry, _)| entry.clone())
        };

        let Some(route) = resolved else {
            return self
                .transport
                .continue_response(ContinueResponseParams::passthrough(request_id))
                .await;
        };

        let Some(hook) = route.handlers.on_response.clone() else {
            return self
                .transport
                .continue_response(ContinueResponseParams::passthrough(request_id))
                .await;
        };

        if self.config.log_responses {
            self.log_response(&event);
        }

        let status = event.response_status_code.unwrap_or_default();
        let status_text = event
            .response_status_text
            .clone()
            .filter(|text| !text.is_empty())
            .or_else(|| reason_phrase(status).map(str::to_string))
            .unwrap_or_default();

        let headers: HeaderMap = event
            .response_headers
            .iter()
            .flatten()
            .map(|entry| (entry.name.clone(), entry.value.clone()))
            .collect();

        // Browsers withhold full headers and body for redirects; substitute
        // an empty body instead of asking the transport.
        let body = if (300..400).contains(&status) {
            Bytes::new()
        } else {
            self.transport
                .get_response_body(&request_id)
                .await?
                .decode()?
        };

        let form = self.parse_form(&headers, &body);
        let original = InterceptedResponse {
            status,
            status_text,
            headers,
            body,
            form,
        };
        let mut current = original.clone();

        if !invoke_response_hook(&hook, &mut current) {
            warn!(
                "response hook panicked for {}; resuming unmodified",
                event.request.url
            );
            return self
                .transport
                .continue_response(ContinueResponseParams::passthrough(request_id))
                .await;
        }

        let diff = current.diff(&original);
        if !diff.any() {
            return self
                .transport
                .continue_response(ContinueResponseParams::passthrough(request_id))
                .await;
        }

        let out_body = self.reencode_body(
            diff.form,
            current.content_type(),
            &current.form,
            &current.body,
            &original.body,
        );

        self.transport
            .fulfill_request(FulfillRequestParams {
                request_id,
                response_code: current.status,
                response_phrase: current.effective_status_text(),
                response_headers: Some(header_entries(&current.headers)),
                body: Some(encode_body(&out_body)),
            })
            .await
    }

    fn build_request_context(
        &self,
        method: Method,
        url: &Url,
        params: HashMap<String, String>,
        event: &RequestPausedEvent,
    ) -> InterceptedRequest {
        let mut clean_url = url.clone();
        clean_url.set_fragment(None);

        let query: FieldMap = clean_url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        // Wire request headers arrive as an unordered map; sort for a
        // stable snapshot.
        let mut pairs: Vec<(&String, &String)> = event.request.headers.iter().collect();
        pairs.sort();
        let headers: HeaderMap = pairs
            .into_iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let body: Bytes = event
            .request
            .post_data
            .as_deref()
            .map(|data| Bytes::copy_from_slice(data.as_bytes()))
            .unwrap_or_default();

        let form = self.parse_form(&headers, &body);

        InterceptedRequest {
            method,
            url: clean_url.to_string(),
            query,
            params,
            body,
            form,
            headers,
        }
    }

    /// Project a body through the codec matching its content type; opaque
    /// or unparsable bodies yield an empty form.
    fn parse_form(&self, headers: &HeaderMap, body: &Bytes) -> FieldMap {
        if body.is_empty() {
            return FieldMap::new();
        }
        let Some(content_type) = headers.get("content-type") else {
            return FieldMap::new();
        };
        let Some(codec) = self.codecs.read().resolve(content_type) else {
            return FieldMap::new();
        };
        codec.parse(body)
    }

    /// Decide which bytes travel when a hook changed something: the
    /// re-encoded form when the form itself changed and a codec covers the
    /// (possibly updated) content type; otherwise the raw body; and the
    /// original bytes when the hook emptied the raw body.
    fn reencode_body(
        &self,
        form_changed: bool,
        content_type: Option<&str>,
        form: &FieldMap,
        body: &Bytes,
        original_body: &Bytes,
    ) -> Bytes {
        if form_changed {
            if let Some(content_type) = content_type {
                if let Some(codec) = self.codecs.read().resolve(content_type) {
                    return codec.encode(form);
                }
            }
        }
        if !body.is_empty() {
            body.clone()
        } else {
            original_body.clone()
        }
    }

    fn log_request(&self, event: &RequestPausedEvent) {
        debug!("request paused: {} {}", event.request.method, event.request.url);
        if let Some(data) = &event.request.post_data {
            let shown = data.len().min(self.config.max_log_body_size);
            debug!("  body: {}", String::from_utf8_lossy(&data.as_bytes()[..shown]));
        }
    }

    fn log_response(&self, event: &RequestPausedEvent) {
        debug!(
            "response paused: {} {}",
            event.response_status_code.unwrap_or_default(),
            event.request.url
        );
        for entry in event.response_headers.iter().flatten() {
            debug!("  {}: {}", entry.name, entry.value);
        }
    }
}

/// Parse an event URL into (parsed URL, ASCII origin).
fn parse_event_url(raw: &str) -> Option<(Url, String)> {
    let url = Url::parse(raw).ok()?;
    if !url.has_host() {
        return None;
    }
    let origin = url.origin().ascii_serialization();
    Some((url, origin))
}

/// Compose the outgoing URL: the hook's URL as base, the path regenerated
/// from mutated path parameters, and the query string re-serialized from
/// the mutated query map.
fn rebuild_url(
    current: &InterceptedRequest,
    original: &InterceptedRequest,
    pattern: &PathPattern,
    diff: &RequestDiff,
) -> Result<String> {
    if !diff.url && !diff.params && !diff.query {
        return Ok(current.url.clone());
    }

    let mut url = Url::parse(&current.url)
        .map_err(|e| InterceptError::InvalidUrl(format!("{}: {e}", current.url)))?;

    if diff.params {
        // Parameters the hook removed fall back to their captured values.
        let mut merged = original.params.clone();
        merged.extend(current.params.clone());
        url.set_path(&pattern.render(&merged));
    }

    if diff.query {
        if current.query.is_empty() {
            url.set_query(None);
        } else {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (key, value) in current.query.iter() {
                pairs.append_pair(key, value);
            }
        }
    }

    url.set_fragment(None);
    Ok(url.to_string())
}

/// Flatten a header map into ordered wire entries (keys already
/// lower-cased by the map itself).
fn header_entries(headers: &HeaderMap) -> Vec<HeaderEntry> {
    headers
        .iter()
        .map(|(name, value)| HeaderEntry {
            name: name.to_string(),
            value: value.to_string(),
        })
        .collect()
}

/// Run a request hook, shielding the dispatcher from panics. Returns
/// false when the hook panicked; the caller resumes unmodified then.
fn invoke_request_hook(hook: &RequestHandler, ctx: &mut InterceptedRequest) -> bool {
    catch_unwind(AssertUnwindSafe(|| hook(ctx))).is_ok()
}

/// Run a response hook, shielding the dispatcher from panics.
fn invoke_response_hook(hook: &ResponseHandler, ctx: &mut InterceptedResponse) -> bool {
    catch_unwind(AssertUnwindSafe(|| hook(ctx))).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fetch::{PausedRequest, ResponseBodyPayload};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    #[derive(Debug, Clone, PartialEq)]
    enum IssuedCommand {
        Enable(EnableInterceptionParams),
        ContinueRequest(ContinueRequestParams),
        ContinueResponse(ContinueResponseParams),
        Fulfill(FulfillRequestParams),
    }

    #[derive(Default)]
    struct MockTransport {
        commands: Mutex<Vec<IssuedCommand>>,
        body: Mutex<Option<ResponseBodyPayload>>,
        body_calls: AtomicUsize,
        events: Mutex<Option<mpsc::Receiver<RequestPausedEvent>>>,
    }

    impl MockTransport {
        fn with_body(body: &str) -> Self {
            let transport = Self::default();
            *transport.body.lock() = Some(ResponseBodyPayload {
                body: body.to_string(),
                base64_encoded: false,
            });
            transport
        }

        fn commands(&self) -> Vec<IssuedCommand> {
            self.commands.lock().clone()
        }
    }

    #[async_trait]
    impl FetchTransport for MockTransport {
        fn subscribe_request_paused(&self) -> mpsc::Receiver<RequestPausedEvent> {
            self.events
                .lock()
                .take()
                .unwrap_or_else(|| mpsc::channel(1).1)
        }

        async fn enable_interception(&self, params: EnableInterceptionParams) -> Result<()> {
            self.commands.lock().push(IssuedCommand::Enable(params));
            Ok(())
        }

        async fn continue_request(&self, params: ContinueRequestParams) -> Result<()> {
            self.commands
                .lock()
                .push(IssuedCommand::ContinueRequest(params));
            Ok(())
        }

        async fn continue_response(&self, params: ContinueResponseParams) -> Result<()> {
            self.commands
                .lock()
                .push(IssuedCommand::ContinueResponse(params));
            Ok(())
        }

        async fn fulfill_request(&self, params: FulfillRequestParams) -> Result<()> {
            self.commands.lock().push(IssuedCommand::Fulfill(params));
            Ok(())
        }

        async fn get_response_body(&self, _request_id: &str) -> Result<ResponseBodyPayload> {
            self.body_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.lock().clone().unwrap_or(ResponseBodyPayload {
                body: String::new(),
                base64_encoded: false,
            }))
        }
    }

    fn request_event(id: &str, method: &str, url: &str) -> RequestPausedEvent {
        RequestPausedEvent {
            request_id: id.to_string(),
            request: PausedRequest {
                url: url.to_string(),
                method: method.to_string(),
                headers: HashMap::new(),
                post_data: None,
                has_post_data: None,
            },
            response_status_code: None,
            response_status_text: None,
            response_headers: None,
        }
    }

    fn response_event(
        id: &str,
        method: &str,
        url: &str,
        status: u16,
        status_text: &str,
        headers: &[(&str, &str)],
    ) -> RequestPausedEvent {
        let mut event = request_event(id, method, url);
        event.response_status_code = Some(status);
        event.response_status_text = Some(status_text.to_string());
        event.response_headers = Some(
            headers
                .iter()
                .map(|(name, value)| HeaderEntry {
                    name: name.to_string(),
                    value: value.to_string(),
                })
                .collect(),
        );
        event
    }

    fn engine(transport: Arc<MockTransport>) -> FetchInterceptor {
        FetchInterceptor::new(transport)
    }

    #[tokio::test]
    async fn test_pass_through_when_no_route() {
        let transport = Arc::new(MockTransport::default());
        let interceptor = engine(Arc::clone(&transport));

        interceptor
            .on_request_paused(request_event("r1", "GET", "http://other.example/test"))
            .await
            .unwrap();
        interceptor
            .on_request_paused(response_event(
                "r1",
                "GET",
                "http://other.example/test",
                200,
                "OK",
                &[],
            ))
            .await
            .unwrap();

        assert_eq!(
            transport.commands(),
            vec![
                IssuedCommand::ContinueRequest(ContinueRequestParams::passthrough("r1")),
                IssuedCommand::ContinueResponse(ContinueResponseParams::passthrough("r1")),
            ]
        );
        assert!(interceptor.pending().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_method_bypasses_interception() {
        let transport = Arc::new(MockTransport::default());
        let interceptor = engine(Arc::clone(&transport));

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        interceptor
            .post(
                "http://127.0.0.1/test",
                RouteHandlers::new().on_request(move |_req| {
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        // Registration under an unknown method fails fast.
        assert!(matches!(
            interceptor.handle("BAD", "http://127.0.0.1/test", RouteHandlers::new()),
            Err(InterceptError::UnsupportedMethod(_))
        ));

        // A live request with an unknown method never reaches routing.
        interceptor
            .on_request_paused(request_event("r1", "BAD", "http://127.0.0.1/test"))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            transport.commands(),
            vec![IssuedCommand::ContinueRequest(
                ContinueRequestParams::passthrough("r1")
            )]
        );
    }

    #[tokio::test]
    async fn test_noop_hook_gets_minimal_continue_with_interception() {
        let transport = Arc::new(MockTransport::default());
        let interceptor = engine(Arc::clone(&transport));

        let observed = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&observed);
        interceptor
            .get(
                "http://127.0.0.1/test",
                RouteHandlers::new().on_request(move |req| {
                    *sink.lock() = Some((req.query.len(), req.form.len()));
                }),
            )
            .unwrap();

        interceptor
            .on_request_paused(request_event("r1", "GET", "http://127.0.0.1/test"))
            .await
            .unwrap();

        // Hook ran once, with empty query and form.
        assert_eq!(*observed.lock(), Some((0, 0)));
        assert_eq!(
            transport.commands(),
            vec![IssuedCommand::ContinueRequest(
                ContinueRequestParams::observe_response("r1")
            )]
        );
    }

    #[tokio::test]
    async fn test_any_single_change_sends_every_field() {
        let transport = Arc::new(MockTransport::default());
        let interceptor = engine(Arc::clone(&transport));

        interceptor
            .get(
                "http://127.0.0.1/test",
                RouteHandlers::new().on_request(|req| {
                    req.headers.set("FoO", "Bar");
                }),
            )
            .unwrap();

        interceptor
            .on_request_paused(request_event("r1", "GET", "http://127.0.0.1/test"))
            .await
            .unwrap();

        let commands = transport.commands();
        let IssuedCommand::ContinueRequest(params) = &commands[0] else {
            panic!("expected a continue command, got {:?}", commands);
        };

        // One changed header forces every mutable field onto the wire.
        assert_eq!(params.url.as_deref(), Some("http://127.0.0.1/test"));
        assert_eq!(params.method.as_deref(), Some("GET"));
        assert_eq!(params.post_data.as_deref(), Some(""));
        assert_eq!(params.intercept_response, Some(true));

        // Header names are case-folded on the way out.
        let headers = params.headers.as_ref().unwrap();
        assert!(headers.contains(&HeaderEntry {
            name: "foo".to_string(),
            value: "Bar".to_string(),
        }));
    }

    #[tokio::test]
    async fn test_param_mutation_rewrites_path() {
        let transport = Arc::new(MockTransport::default());
        let interceptor = engine(Arc::clone(&transport));

        interceptor
            .get(
                "http://127.0.0.1/test/:id",
                RouteHandlers::new().on_request(|req| {
                    assert_eq!(req.params.get("id").map(String::as_str), Some("9"));
                    req.params.insert("id".to_string(), "12345".to_string());
                }),
            )
            .unwrap();

        interceptor
            .on_request_paused(request_event("r1", "GET", "http://127.0.0.1/test/9"))
            .await
            .unwrap();

        let commands = transport.commands();
        let IssuedCommand::ContinueRequest(params) = &commands[0] else {
            panic!("expected a continue command, got {:?}", commands);
        };
        assert_eq!(params.url.as_deref(), Some("http://127.0.0.1/test/12345"));
    }

    #[tokio::test]
    async fn test_query_mutation_rewrites_url() {
        let transport = Arc::new(MockTransport::default());
        let interceptor = engine(Arc::clone(&transport));

        interceptor
            .get(
                "http://127.0.0.1/search",
                RouteHandlers::new().on_request(|req| {
                    assert_eq!(req.query.get("q"), Some("old"));
                    req.query.set("q", "new");
                }),
            )
            .unwrap();

        interceptor
            .on_request_paused(request_event(
                "r1",
                "GET",
                "http://127.0.0.1/search?q=old&page=2",
            ))
            .await
            .unwrap();

        let commands = transport.commands();
        let IssuedCommand::ContinueRequest(params) = &commands[0] else {
            panic!("expected a continue command, got {:?}", commands);
        };
        assert_eq!(
            params.url.as_deref(),
            Some("http://127.0.0.1/search?page=2&q=new")
        );
    }

    #[tokio::test]
    async fn test_response_status_change_fulfills_with_full_payload() {
        let transport = Arc::new(MockTransport::with_body("<h1>Hello world!</h1>"));
        let interceptor = engine(Arc::clone(&transport));

        interceptor
            .get(
                "http://127.0.0.1/test",
                RouteHandlers::new().on_response(|res| {
                    res.status = 400;
                    res.status_text = "Not Found".to_string();
                }),
            )
            .unwrap();

        interceptor
            .on_request_paused(response_event(
                "r1",
                "GET",
                "http://127.0.0.1/test",
                200,
                "OK",
                &[("foo", "bar"), ("content-type", "application/json")],
            ))
            .await
            .unwrap();

        assert_eq!(
            transport.commands(),
            vec![IssuedCommand::Fulfill(FulfillRequestParams {
                request_id: "r1".to_string(),
                response_code: 400,
                response_phrase: Some("Not Found".to_string()),
                response_headers: Some(vec![
                    HeaderEntry {
                        name: "foo".to_string(),
                        value: "bar".to_string(),
                    },
                    HeaderEntry {
                        name: "content-type".to_string(),
                        value: "application/json".to_string(),
                    },
                ]),
                body: Some(encode_body(b"<h1>Hello world!</h1>")),
            })]
        );
    }

    #[tokio::test]
    async fn test_response_form_change_reencodes_body() {
        let transport = Arc::new(MockTransport::with_body("<h1>Hello world!</h1>"));
        let interceptor = engine(Arc::clone(&transport));

        interceptor
            .get(
                "http://127.0.0.1/test",
                RouteHandlers::new().on_response(|res| {
                    res.form.set("foo", "bar");
                }),
            )
            .unwrap();

        interceptor
            .on_request_paused(response_event(
                "r1",
                "GET",
                "http://127.0.0.1/test",
                200,
                "OK",
                &[("content-type", "application/json")],
            ))
            .await
            .unwrap();

        let commands = transport.commands();
        let IssuedCommand::Fulfill(params) = &commands[0] else {
            panic!("expected a fulfill command, got {:?}", commands);
        };
        assert_eq!(params.body.as_deref(), Some(encode_body(br#"{"foo":"bar"}"#).as_str()));
        assert_eq!(params.response_code, 200);
        assert_eq!(params.response_phrase.as_deref(), Some("OK"));
    }

    #[tokio::test]
    async fn test_untouched_response_resumes_minimal() {
        let transport = Arc::new(MockTransport::with_body("payload"));
        let interceptor = engine(Arc::clone(&transport));

        interceptor
            .get(
                "http://127.0.0.1/test",
                RouteHandlers::new().on_response(|_res| {}),
            )
            .unwrap();

        interceptor
            .on_request_paused(response_event(
                "r1",
                "GET",
                "http://127.0.0.1/test",
                200,
                "OK",
                &[("content-type", "text/html")],
            ))
            .await
            .unwrap();

        assert_eq!(
            transport.commands(),
            vec![IssuedCommand::ContinueResponse(
                ContinueResponseParams::passthrough("r1")
            )]
        );
    }

    #[tokio::test]
    async fn test_redirect_skips_body_fetch() {
        let transport = Arc::new(MockTransport::with_body("unreachable"));
        let interceptor = engine(Arc::clone(&transport));

        let observed = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&observed);
        interceptor
            .get(
                "http://127.0.0.1/test",
                RouteHandlers::new().on_response(move |res| {
                    *sink.lock() = Some(res.body.len());
                }),
            )
            .unwrap();

        interceptor
            .on_request_paused(response_event(
                "r1",
                "GET",
                "http://127.0.0.1/test",
                302,
                "Found",
                &[("location", "http://127.0.0.1/moved")],
            ))
            .await
            .unwrap();

        assert_eq!(transport.body_calls.load(Ordering::SeqCst), 0);
        assert_eq!(*observed.lock(), Some(0));
        assert_eq!(
            transport.commands(),
            vec![IssuedCommand::ContinueResponse(
                ContinueResponseParams::passthrough("r1")
            )]
        );
    }

    #[tokio::test]
    async fn test_pending_record_lifecycle() {
        let transport = Arc::new(MockTransport::default());
        let interceptor = engine(Arc::clone(&transport));

        interceptor
            .get(
                "http://127.0.0.1/test",
                RouteHandlers::new().on_request(|_req| {}),
            )
            .unwrap();

        interceptor
            .on_request_paused(request_event("r1", "GET", "http://127.0.0.1/test"))
            .await
            .unwrap();

        let pending = interceptor.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].request_id, "r1");
        assert_eq!(pending[0].method, Method::Get);
        assert_eq!(pending[0].url, "http://127.0.0.1/test");

        interceptor
            .on_request_paused(response_event(
                "r1",
                "GET",
                "http://127.0.0.1/test",
                200,
                "OK",
                &[],
            ))
            .await
            .unwrap();
        assert!(interceptor.pending().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_hook_resumes_unmodified() {
        let transport = Arc::new(MockTransport::default());
        let interceptor = engine(Arc::clone(&transport));

        interceptor
            .get(
                "http://127.0.0.1/test",
                RouteHandlers::new().on_request(|_req| panic!("handler bug")),
            )
            .unwrap();

        interceptor
            .on_request_paused(request_event("r1", "GET", "http://127.0.0.1/test"))
            .await
            .unwrap();

        assert_eq!(
            transport.commands(),
            vec![IssuedCommand::ContinueRequest(
                ContinueRequestParams::observe_response("r1")
            )]
        );
    }

    #[tokio::test]
    async fn test_request_form_change_reencodes_post_data() {
        let transport = Arc::new(MockTransport::default());
        let interceptor = engine(Arc::clone(&transport));

        interceptor
            .post(
                "http://127.0.0.1/submit",
                RouteHandlers::new().on_request(|req| {
                    assert_eq!(req.form.get("a"), Some("1"));
                    req.form.set("a", "2");
                }),
            )
            .unwrap();

        let mut event = request_event("r1", "POST", "http://127.0.0.1/submit");
        event
            .request
            .headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        event.request.post_data = Some(r#"{"a":"1"}"#.to_string());
        event.request.has_post_data = Some(true);

        interceptor.on_request_paused(event).await.unwrap();

        let commands = transport.commands();
        let IssuedCommand::ContinueRequest(params) = &commands[0] else {
            panic!("expected a continue command, got {:?}", commands);
        };
        assert_eq!(
            params.post_data.as_deref(),
            Some(encode_body(br#"{"a":"2"}"#).as_str())
        );
        // Header keys were folded to lowercase on input.
        let headers = params.headers.as_ref().unwrap();
        assert!(headers.contains(&HeaderEntry {
            name: "content-type".to_string(),
            value: "application/json".to_string(),
        }));
    }

    #[tokio::test]
    async fn test_raw_body_mutation_wins_without_form_change() {
        let transport = Arc::new(MockTransport::default());
        let interceptor = engine(Arc::clone(&transport));

        interceptor
            .post(
                "http://127.0.0.1/submit",
                RouteHandlers::new().on_request(|req| {
                    req.body = Bytes::from_static(b"raw override");
                }),
            )
            .unwrap();

        let mut event = request_event("r1", "POST", "http://127.0.0.1/submit");
        event.request.post_data = Some("original".to_string());

        interceptor.on_request_paused(event).await.unwrap();

        let commands = transport.commands();
        let IssuedCommand::ContinueRequest(params) = &commands[0] else {
            panic!("expected a continue command, got {:?}", commands);
        };
        assert_eq!(
            params.post_data.as_deref(),
            Some(encode_body(b"raw override").as_str())
        );
    }

    #[tokio::test]
    async fn test_enable_subscribes_and_drains_events() -> anyhow::Result<()> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("cdp_intercept=debug")
            .try_init();

        let (tx, rx) = mpsc::channel(16);
        let transport = Arc::new(MockTransport::default());
        *transport.events.lock() = Some(rx);

        let interceptor = Arc::new(engine(Arc::clone(&transport)));
        interceptor.enable().await?;

        tx.send(request_event("r1", "GET", "http://127.0.0.1/x"))
            .await?;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let commands = transport.commands();
        assert_eq!(
            commands[0],
            IssuedCommand::Enable(EnableInterceptionParams::with_url_pattern("*"))
        );
        assert!(commands.contains(&IssuedCommand::ContinueRequest(
            ContinueRequestParams::passthrough("r1")
        )));
        Ok(())
    }

    #[tokio::test]
    async fn test_any_registers_every_method() {
        let transport = Arc::new(MockTransport::default());
        let interceptor = engine(Arc::clone(&transport));

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        interceptor
            .any(
                "http://127.0.0.1/all",
                RouteHandlers::new().on_request(move |_req| {
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        for method in ["GET", "POST", "PATCH", "DELETE"] {
            interceptor
                .on_request_paused(request_event("r1", method, "http://127.0.0.1/all"))
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
