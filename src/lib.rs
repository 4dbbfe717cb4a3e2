// src/lib.rs
//! cdp-intercept
//!
//! Programmatic HTTP(S) request/response interception over a
//! browser-automation protocol's network-interception channel, for
//! automation and instrumentation tooling that needs pattern-matched
//! request/response tampering (debugging, testing, content injection).
//!
//! # Architecture
//!
//! The crate is structured into three modules:
//!
//! - **interception**: route table, body codecs, mutable invocation
//!   contexts, and the dispatching engine
//! - **transport**: the abstract Fetch-domain transport the engine drives,
//!   plus its wire types
//! - **utils**: common error types
//!
//! Registration happens through the engine facade: `get`/`post`/`any`
//! (or `handle` for any supported method) bind an optional request hook
//! and an optional response hook to a `scheme://origin/path-template`
//! pattern. `enable` subscribes the dispatcher to the transport's pause
//! stream and starts intercepting. Hooks receive a mutable view of the
//! paused request or response; whatever they change is diffed against the
//! original snapshot and written back through the protocol.

// Public module exports
pub mod interception;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use interception::codec::{BodyCodec, CodecRegistry, JsonCodec, UrlEncodedCodec};
pub use interception::context::{FieldMap, HeaderMap, InterceptedRequest, InterceptedResponse};
pub use interception::engine::{FetchInterceptor, InterceptorConfig, PendingIntercept};
pub use interception::routes::{Method, RouteHandlers};
pub use transport::fetch::{FetchTransport, RequestPausedEvent};
pub use utils::errors::{InterceptError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
