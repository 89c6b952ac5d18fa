//! Boundary with the external HTTP engine.
//!
//! The engine owns connections, TLS, HTTP/2 and caching. This layer only
//! needs to hand it a [`WireRequest`] together with a callback sink and an
//! executor, then react to the callbacks:
//!
//! ```text
//! start ─► on_redirect_received* ─► on_response_started ─► on_read_completed* ─► on_succeeded
//!                                                    └──────────────────────────► on_failed
//! ```
//!
//! Body chunks are pulled: the engine delivers the next chunk only after the
//! sink calls [`UrlRequest::read`]. All callbacks run on the executor passed to
//! [`Engine::start`].

use bytes::Bytes;
use http::{HeaderMap, Method};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;

/// Error reported by an engine, either at start or through `on_failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineError {
    message: String,
    status: Option<u16>,
}

impl EngineError {
    /// Create an error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    /// Create an error caused by an HTTP status.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The HTTP status, if the failure was status-driven.
    pub fn status_code(&self) -> Option<u16> {
        self.status
    }
}

/// A request as it goes on the wire.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl WireRequest {
    /// Header value as text, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Response metadata passed to every callback after headers arrive.
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    pub url: String,
    pub status: u16,
    pub headers: HeaderMap,
}

impl ResponseInfo {
    /// Create response metadata without headers.
    pub fn new(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status,
            headers: HeaderMap::new(),
        }
    }
}

/// Handle to a transfer started by an [`Engine`].
pub trait UrlRequest: Send + Sync {
    /// Ask for the next body chunk.
    fn read(&self);

    /// Continue after `on_redirect_received`.
    fn follow_redirect(&self);

    /// Abort the transfer. No further callbacks except `on_canceled`.
    fn cancel(&self);
}

/// Callback sink driven by an [`Engine`].
pub trait UrlRequestCallback: Send + Sync {
    /// A redirect was received; call `follow_redirect` to continue.
    fn on_redirect_received(&self, request: &dyn UrlRequest, info: &ResponseInfo, location: &str);

    /// Headers arrived; call `read` to start receiving the body.
    fn on_response_started(&self, request: &dyn UrlRequest, info: &ResponseInfo);

    /// One body chunk arrived; call `read` for the next one.
    fn on_read_completed(&self, request: &dyn UrlRequest, info: &ResponseInfo, chunk: Bytes);

    /// The whole body was delivered.
    fn on_succeeded(&self, request: &dyn UrlRequest, info: &ResponseInfo);

    /// The transfer failed.
    fn on_failed(
        &self,
        request: &dyn UrlRequest,
        info: Option<&ResponseInfo>,
        error: Option<EngineError>,
    );

    /// The transfer was cancelled.
    fn on_canceled(&self, _request: &dyn UrlRequest, _info: Option<&ResponseInfo>) {}
}

/// An HTTP engine that runs transfers and reports through callbacks.
pub trait Engine: Send + Sync {
    /// Start a transfer. Callbacks run on `executor`.
    fn start(
        &self,
        request: WireRequest,
        callback: Arc<dyn UrlRequestCallback>,
        executor: &Handle,
    ) -> Result<Arc<dyn UrlRequest>, EngineError>;
}

/// An engine together with the executor its callbacks run on.
pub trait Network: Send + Sync {
    /// The engine used to submit requests.
    fn engine(&self) -> &dyn Engine;

    /// The executor callbacks run on.
    fn executor(&self) -> &Handle;
}
