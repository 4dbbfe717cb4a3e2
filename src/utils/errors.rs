// src/utils/errors.rs
//! Error types for registration, dispatch, and transport calls.

use thiserror::Error;

/// Errors surfaced by the interception engine.
///
/// Registration problems (`UnsupportedMethod`, `InvalidPattern`,
/// `InvalidUrl`) fail synchronously at setup time. `Transport` and
/// `BodyDecode` are runtime failures surfaced to whatever awaits a
/// dispatch; they are never retried internally.
#[derive(Debug, Error)]
pub enum InterceptError {
    /// A registration named an HTTP method outside the supported set.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// A path template failed to compile.
    #[error("invalid route pattern: {0}")]
    InvalidPattern(String),

    /// A registration pattern or URL could not be parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The transport rejected a continue/fulfill/body-fetch command.
    #[error("transport command failed: {0}")]
    Transport(String),

    /// A transport payload could not be decoded.
    #[error("body decode failed: {0}")]
    BodyDecode(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, InterceptError>;
