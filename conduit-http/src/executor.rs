//! Request execution engine.
//!
//! [`RequestExecutor`] turns the engine's callback protocol into a single
//! awaitable call. Each execution goes through:
//!
//! 1. the attempt-limit check ([`MAX_REQUEST_ATTEMPTS`](crate::MAX_REQUEST_ATTEMPTS)),
//! 2. the in-flight check against the [`InFlightRegistry`],
//! 3. submission and streaming into a buffer,
//! 4. error-envelope detection, then the request's parse function.
//!
//! The registry entry is removed on every terminal path, including
//! cancellation and dropping the future.

use crate::engine::{EngineError, Network, ResponseInfo, UrlRequest, UrlRequestCallback};
use crate::error::UNKNOWN_ERROR;
use crate::{
    ExecutorConfig, InFlightRegistry, Request, RequestError, Result, ServerError, locale,
};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

/// Terminal outcome of an execution that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The response was parsed.
    Completed(T),
    /// The request had already used all its attempts; nothing was sent.
    Exhausted,
    /// An identical request was in flight; this call waited for it to finish.
    Duplicate,
    /// The caller cancelled before completion.
    Cancelled,
}

impl<T> Outcome<T> {
    /// Check if a value was produced.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// The produced value, if any.
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }

    /// Borrow the produced value, if any.
    pub fn as_completed(&self) -> Option<&T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }

    /// Map the produced value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Completed(value) => Outcome::Completed(f(value)),
            Self::Exhausted => Outcome::Exhausted,
            Self::Duplicate => Outcome::Duplicate,
            Self::Cancelled => Outcome::Cancelled,
        }
    }
}

/// Executes [`Request`]s against a [`Network`].
#[derive(Clone)]
pub struct RequestExecutor {
    network: Arc<dyn Network>,
    registry: Arc<InFlightRegistry>,
    config: Arc<ExecutorConfig>,
    accept_language: String,
}

impl RequestExecutor {
    /// Create an executor with default configuration and the global registry.
    pub fn new(network: Arc<dyn Network>) -> Self {
        Self::with_config(network, ExecutorConfig::default())
    }

    /// Create an executor with the given configuration and the global registry.
    pub fn with_config(network: Arc<dyn Network>, config: ExecutorConfig) -> Self {
        let accept_language = config
            .accept_language
            .clone()
            .unwrap_or_else(locale::current_language_tag);

        Self {
            network,
            registry: InFlightRegistry::global(),
            config: Arc::new(config),
            accept_language,
        }
    }

    /// Use a separate registry instead of the global one.
    pub fn with_registry(mut self, registry: Arc<InFlightRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// The registry this executor deduplicates against.
    pub fn registry(&self) -> &Arc<InFlightRegistry> {
        &self.registry
    }

    /// The executor configuration.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// The `Accept-Language` value sent with every request.
    pub fn accept_language(&self) -> &str {
        &self.accept_language
    }

    /// Execute a request until it reaches a terminal outcome.
    ///
    /// Dropping the returned future aborts the transfer and unregisters it.
    pub async fn execute<T>(&self, request: &Request<T>) -> Result<Outcome<T>> {
        self.execute_until(request, std::future::pending::<()>())
            .await
    }

    /// Execute a request, failing with [`RequestError::Timeout`] after `timeout`.
    pub async fn execute_with_timeout<T>(
        &self,
        request: &Request<T>,
        timeout: Duration,
    ) -> Result<Outcome<T>> {
        match self
            .execute_until(request, tokio::time::sleep(timeout))
            .await?
        {
            Outcome::Cancelled => Err(RequestError::Timeout(timeout)),
            outcome => Ok(outcome),
        }
    }

    /// Execute a request, cancelling it when `cancel` resolves first.
    pub async fn execute_until<T, C>(&self, request: &Request<T>, cancel: C) -> Result<Outcome<T>>
    where
        C: Future<Output = ()>,
    {
        let request_id = request.id();

        if request.is_exhausted() {
            warn!(
                request_id,
                url = request.url(),
                attempts = request.attempts(),
                "Max attempts reached, request skipped"
            );
            return Ok(Outcome::Exhausted);
        }

        let fingerprint = request.fingerprint();
        let registration = match self.registry.try_register(fingerprint) {
            Ok(registration) => registration,
            Err(in_flight) => {
                debug!(request_id, %fingerprint, "Identical request in flight, waiting");
                return tokio::select! {
                    _ = in_flight.wait() => Ok(Outcome::Duplicate),
                    _ = cancel => Ok(Outcome::Cancelled),
                };
            }
        };

        let attempt = request.begin_attempt();
        let wire = request.to_wire(&self.accept_language);
        info!(
            request_id,
            attempt,
            method = %request.method(),
            url = %wire.url,
            params = %request.params(),
            body = %request.body_params(),
            "Sending request"
        );

        let (sink, delivery) = ResponseSink::channel(request_id);
        let handle = self
            .network
            .engine()
            .start(wire, sink, self.network.executor())
            .map_err(|error| RequestError::Engine(error.to_string()))?;
        let mut transfer = Transfer::new(handle);

        tokio::select! {
            completion = delivery => {
                transfer.finish();
                registration.release();
                self.complete(request, completion.ok())
            }
            _ = cancel => {
                debug!(request_id, "Request cancelled");
                transfer.abort();
                registration.release();
                Ok(Outcome::Cancelled)
            }
        }
    }

    fn complete<T>(&self, request: &Request<T>, completion: Option<Completion>) -> Result<Outcome<T>> {
        match completion {
            Some(Completion::Succeeded { status, body }) => {
                let text = String::from_utf8_lossy(&body);
                if self.config.log_bodies {
                    debug!(request_id = request.id(), status, body = %text, "Response received");
                }

                if let Some(error) = ServerError::from_envelope(&body) {
                    debug!(request_id = request.id(), %error, "Server reported an error");
                    return Err(RequestError::Server(error));
                }
                request.parse(&text).map(Outcome::Completed)
            }
            Some(Completion::Failed(error)) => {
                let error = match error {
                    Some(error) => RequestError::Network {
                        message: error.message().to_string(),
                        status: error.status_code(),
                    },
                    None => RequestError::network(UNKNOWN_ERROR),
                };
                debug!(request_id = request.id(), %error, "Request failed");
                Err(error)
            }
            // The engine dropped the sink without reporting.
            None => Err(RequestError::network(UNKNOWN_ERROR)),
        }
    }
}

enum Completion {
    Succeeded { status: u16, body: Bytes },
    Failed(Option<EngineError>),
}

/// Callback sink that buffers the body and resolves exactly once.
struct ResponseSink {
    request_id: u64,
    buffer: Mutex<BytesMut>,
    sender: Mutex<Option<oneshot::Sender<Completion>>>,
}

impl ResponseSink {
    fn channel(request_id: u64) -> (Arc<Self>, oneshot::Receiver<Completion>) {
        let (sender, receiver) = oneshot::channel();
        let sink = Arc::new(Self {
            request_id,
            buffer: Mutex::new(BytesMut::new()),
            sender: Mutex::new(Some(sender)),
        });
        (sink, receiver)
    }

    fn resolve(&self, completion: Completion) {
        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(completion);
        }
    }
}

impl UrlRequestCallback for ResponseSink {
    fn on_redirect_received(&self, request: &dyn UrlRequest, _info: &ResponseInfo, location: &str) {
        debug!(request_id = self.request_id, location, "Following redirect");
        request.follow_redirect();
    }

    fn on_response_started(&self, request: &dyn UrlRequest, info: &ResponseInfo) {
        trace!(request_id = self.request_id, status = info.status, "Response started");
        request.read();
    }

    fn on_read_completed(&self, request: &dyn UrlRequest, _info: &ResponseInfo, chunk: Bytes) {
        self.buffer.lock().extend_from_slice(&chunk);
        request.read();
    }

    fn on_succeeded(&self, _request: &dyn UrlRequest, info: &ResponseInfo) {
        let body = std::mem::take(&mut *self.buffer.lock()).freeze();
        self.resolve(Completion::Succeeded {
            status: info.status,
            body,
        });
    }

    fn on_failed(
        &self,
        _request: &dyn UrlRequest,
        _info: Option<&ResponseInfo>,
        error: Option<EngineError>,
    ) {
        self.resolve(Completion::Failed(error));
    }

    fn on_canceled(&self, _request: &dyn UrlRequest, _info: Option<&ResponseInfo>) {
        trace!(request_id = self.request_id, "Transfer cancelled by engine");
    }
}

/// Live engine transfer. Aborted on drop unless it finished.
struct Transfer {
    handle: Option<Arc<dyn UrlRequest>>,
}

impl Transfer {
    fn new(handle: Arc<dyn UrlRequest>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    fn finish(&mut self) {
        self.handle = None;
    }

    fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }
}

impl Drop for Transfer {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRequest {
        reads: AtomicUsize,
        redirects: AtomicUsize,
        cancels: AtomicUsize,
    }

    impl UrlRequest for CountingRequest {
        fn read(&self) {
            self.reads.fetch_add(1, Ordering::SeqCst);
        }

        fn follow_redirect(&self) {
            self.redirects.fetch_add(1, Ordering::SeqCst);
        }

        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_sink_buffers_chunks_in_order() {
        let (sink, mut receiver) = ResponseSink::channel(1);
        let request = CountingRequest::default();
        let info = ResponseInfo::new("https://api.example.com", 200);

        sink.on_redirect_received(&request, &info, "https://api.example.com/next");
        sink.on_response_started(&request, &info);
        sink.on_read_completed(&request, &info, Bytes::from_static(b"{\"result\":"));
        sink.on_read_completed(&request, &info, Bytes::from_static(b"\"ok\"}"));
        sink.on_succeeded(&request, &info);

        assert_eq!(request.redirects.load(Ordering::SeqCst), 1);
        assert_eq!(request.reads.load(Ordering::SeqCst), 3);
        match receiver.try_recv() {
            Ok(Completion::Succeeded { status, body }) => {
                assert_eq!(status, 200);
                assert_eq!(&body[..], br#"{"result":"ok"}"#);
            }
            _ => panic!("expected a successful completion"),
        }
    }

    #[test]
    fn test_sink_resolves_once() {
        let (sink, mut receiver) = ResponseSink::channel(1);
        let request = CountingRequest::default();
        let info = ResponseInfo::new("https://api.example.com", 200);

        sink.on_failed(&request, None, Some(EngineError::new("reset")));
        sink.on_succeeded(&request, &info);

        assert!(matches!(receiver.try_recv(), Ok(Completion::Failed(Some(_)))));
    }

    #[test]
    fn test_transfer_aborts_once() {
        let handle = Arc::new(CountingRequest::default());
        let mut transfer = Transfer::new(handle.clone());
        transfer.abort();
        transfer.abort();
        drop(transfer);
        assert_eq!(handle.cancels.load(Ordering::SeqCst), 1);

        let transfer = {
            let mut transfer = Transfer::new(handle.clone());
            transfer.finish();
            transfer
        };
        drop(transfer);
        assert_eq!(handle.cancels.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_outcome_helpers() {
        let outcome = Outcome::Completed(2).map(|n| n * 21);
        assert_eq!(outcome.as_completed(), Some(&42));
        assert!(outcome.is_completed());
        assert_eq!(outcome.into_option(), Some(42));

        assert_eq!(Outcome::<u8>::Duplicate.into_option(), None);
        assert!(!Outcome::<u8>::Exhausted.is_completed());
    }
}
