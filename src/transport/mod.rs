// src/transport/mod.rs
//! Transport boundary toward the browser-automation protocol
//!
//! The engine never talks to a browser directly; it drives an abstract
//! `FetchTransport` that delivers pause events and accepts
//! continue/fulfill commands. Wire types live here so transport
//! implementations and tests share one vocabulary.

pub mod fetch;

// Re-export commonly used types
pub use fetch::{
    ContinueRequestParams, ContinueResponseParams, EnableInterceptionParams, FetchTransport,
    FulfillRequestParams, HeaderEntry, PausedRequest, RequestPausedEvent, RequestPattern,
    RequestStage, ResponseBodyPayload,
};
