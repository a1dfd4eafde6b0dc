//! Transport layer abstraction for the support chat backend.
//!
//! Defines the [`ChatTransport`] trait the engine consumes. Concrete
//! implementations include:
//! - [`http::HttpTransport`]: REST client for the real backend
//! - [`memory::MemoryTransport`]: in-process backend for tests and offline mode

pub mod http;
pub mod memory;

use std::fmt;

use deskchat_proto::codec::CodecError;
use deskchat_proto::message::{RawMessage, SendRequest};

/// Describes which kind of transport is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    /// REST backend over HTTP(S).
    Http,
    /// In-process simulated backend.
    Memory,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => write!(f, "HTTP"),
            Self::Memory => write!(f, "Memory"),
        }
    }
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The HTTP request could not be completed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("backend returned status {0}")]
    Status(u16),

    /// The configured backend URL is invalid.
    #[error("invalid backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The response body could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The backend is unreachable or refused the call.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Async client for the three support-chat endpoints.
///
/// Implementations own network access, auth and response parsing. They
/// report failures as [`TransportError`]; the engine decides which of
/// those reach the user.
pub trait ChatTransport: Send + Sync {
    /// Fetch the full conversation history.
    ///
    /// A response whose shape is not recognised yields an empty list rather
    /// than an error.
    fn fetch_history(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<RawMessage>, TransportError>> + Send;

    /// Send a message and return the backend's canonical record of it.
    fn send(
        &self,
        request: &SendRequest,
    ) -> impl std::future::Future<Output = Result<RawMessage, TransportError>> + Send;

    /// Mark every counterpart message as read.
    fn mark_all_read(&self) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Return the type of this transport.
    fn transport_type(&self) -> TransportType;
}
