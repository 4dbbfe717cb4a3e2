// src/interception/mod.rs
//! Request/response interception layer
//!
//! This module contains the interception core:
//!
//! - **Engine**: dispatches pause events, runs hooks, diffs snapshots,
//!   and issues continue/fulfill commands
//! - **Routes**: (method, origin)-keyed table of path patterns and hooks
//! - **Context**: the mutable request/response views handlers operate on
//! - **Codec**: content-type-aware body (de)serialization
//! - **Pattern**: `:name` path template compiler
//! - **Status**: default reason phrases for status codes
//!
//! # Architecture
//!
//! ```text
//! Transport pause event
//!     │
//!     ├─ classify phase (request / response)
//!     ├─ resolve route (method, origin, path pattern)
//!     ├─ decode body → parse form → build mutable snapshot
//!     ├─ run user hook on a deep copy
//!     └─ diff → minimal resume, or fully-specified continue/fulfill
//! ```

pub mod codec;
pub mod context;
pub mod engine;
pub mod pattern;
pub mod routes;
pub mod status;

// Re-export commonly used types
pub use codec::{BodyCodec, CodecRegistry, JsonCodec, UrlEncodedCodec};
pub use context::{
    FieldMap, HeaderMap, InterceptedRequest, InterceptedResponse, RequestDiff, ResponseDiff,
};
pub use engine::{FetchInterceptor, InterceptorConfig, PendingIntercept};
pub use pattern::PathPattern;
pub use routes::{Method, RequestHandler, ResponseHandler, RouteHandlers, RouteTable};
pub use status::reason_phrase;
