// src/interception/codec.rs
//! Body codecs
//!
//! A codec projects a raw body into a structured key/value form and back,
//! keyed by MIME type. The engine resolves codecs from Content-Type
//! headers; an unresolvable content type leaves the body opaque and the
//! form empty.

use crate::interception::context::FieldMap;
use bytes::Bytes;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A stateless parse/encode pair for one MIME type.
pub trait BodyCodec: Send + Sync {
    /// The `type/subtype` MIME identifier this codec handles.
    fn name(&self) -> &str;

    /// Parse raw bytes into a key/value map. Malformed input degrades to
    /// an empty map, never an error.
    fn parse(&self, body: &[u8]) -> FieldMap;

    /// Encode a key/value map back into raw bytes.
    fn encode(&self, form: &FieldMap) -> Bytes;
}

/// JSON object bodies (`application/json`).
///
/// Non-string member values are kept as their JSON serialization, so a
/// round trip through an untouched form preserves them textually.
#[derive(Debug, Default)]
pub struct JsonCodec;

impl BodyCodec for JsonCodec {
    fn name(&self) -> &str {
        "application/json"
    }

    fn parse(&self, body: &[u8]) -> FieldMap {
        let mut form = FieldMap::new();
        match serde_json::from_slice::<Map<String, Value>>(body) {
            Ok(object) => {
                for (key, value) in object {
                    match value {
                        Value::String(text) => form.append(key, text),
                        other => form.append(key, other.to_string()),
                    }
                }
            }
            Err(err) => debug!("discarding unparsable JSON body: {}", err),
        }
        form
    }

    fn encode(&self, form: &FieldMap) -> Bytes {
        let mut object = Map::new();
        for (key, value) in form.iter() {
            object.insert(key.to_string(), Value::String(value.to_string()));
        }
        Bytes::from(serde_json::to_vec(&Value::Object(object)).unwrap_or_default())
    }
}

/// URL-encoded form bodies (`application/x-www-form-urlencoded`).
#[derive(Debug, Default)]
pub struct UrlEncodedCodec;

impl BodyCodec for UrlEncodedCodec {
    fn name(&self) -> &str {
        "application/x-www-form-urlencoded"
    }

    fn parse(&self, body: &[u8]) -> FieldMap {
        let mut form = FieldMap::new();
        for (key, value) in url::form_urlencoded::parse(body) {
            form.append(key.into_owned(), value.into_owned());
        }
        form
    }

    fn encode(&self, form: &FieldMap) -> Bytes {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in form.iter() {
            serializer.append_pair(key, value);
        }
        Bytes::from(serializer.finish())
    }
}

/// Registry of body codecs keyed by MIME type.
#[derive(Default)]
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn BodyCodec>>,
}

impl CodecRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with the built-in JSON and URL-encoded codecs.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(JsonCodec));
        registry.register(Arc::new(UrlEncodedCodec));
        registry
    }

    /// Register a codec. A later codec with the same name shadows the
    /// earlier one.
    pub fn register(&mut self, codec: Arc<dyn BodyCodec>) {
        debug!("registering body codec for {}", codec.name());
        self.codecs.insert(codec.name().to_ascii_lowercase(), codec);
    }

    /// Resolve a codec from a Content-Type header value. Parameters such
    /// as `charset` are stripped before the lookup.
    pub fn resolve(&self, content_type: &str) -> Option<Arc<dyn BodyCodec>> {
        let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
        self.codecs.get(&essence).cloned()
    }
}
