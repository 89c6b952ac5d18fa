//! Scripted engine for driving the executor without sockets.

#![allow(dead_code)]

use conduit_http::engine::{
    Engine, EngineError, Network, ResponseInfo, UrlRequest, UrlRequestCallback, WireRequest,
};
use conduit_http::{Bytes, InFlightRegistry, RequestExecutor, ExecutorConfig};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore, watch};
use tokio::task::AbortHandle;

/// What the engine does with the next submitted transfer.
#[derive(Clone)]
pub enum Script {
    /// Deliver headers with `status`, then the chunks one read at a time.
    Respond { status: u16, chunks: Vec<Bytes> },
    /// Report a redirect, then run `then` once it is followed.
    Redirect { location: String, then: Box<Script> },
    /// Deliver `chunks`, then never finish.
    Stall { chunks: Vec<Bytes> },
    /// Wait for `gate`, then run `then`.
    Gated { gate: Arc<Notify>, then: Box<Script> },
    /// Fail with an optional message.
    Fail(Option<String>),
    /// Never call back.
    Hang,
    /// Refuse to start.
    Reject(String),
}

impl Script {
    /// 200 with the whole body in one chunk.
    pub fn ok(body: &str) -> Self {
        Self::chunks(200, &[body])
    }

    /// Response split into several chunks.
    pub fn chunks(status: u16, chunks: &[&str]) -> Self {
        Self::Respond {
            status,
            chunks: chunks
                .iter()
                .map(|chunk| Bytes::copy_from_slice(chunk.as_bytes()))
                .collect(),
        }
    }

    /// Transport failure with a message.
    pub fn fail(message: &str) -> Self {
        Self::Fail(Some(message.to_string()))
    }

    /// Hold `then` until `gate` is notified.
    pub fn gated(gate: &Arc<Notify>, then: Script) -> Self {
        Self::Gated {
            gate: Arc::clone(gate),
            then: Box::new(then),
        }
    }
}

#[derive(Default)]
struct Counters {
    cancels: AtomicUsize,
    redirects_followed: AtomicUsize,
}

/// Engine that plays back scripts in submission order.
pub struct ScriptedEngine {
    scripts: Mutex<VecDeque<Script>>,
    fallback: Script,
    requests: Mutex<Vec<WireRequest>>,
    submitted: watch::Sender<usize>,
    counters: Arc<Counters>,
}

impl ScriptedEngine {
    fn new(fallback: Script) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            fallback,
            requests: Mutex::new(Vec::new()),
            submitted: watch::channel(0).0,
            counters: Arc::new(Counters::default()),
        }
    }
}

impl Engine for ScriptedEngine {
    fn start(
        &self,
        request: WireRequest,
        callback: Arc<dyn UrlRequestCallback>,
        executor: &Handle,
    ) -> Result<Arc<dyn UrlRequest>, EngineError> {
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        let url = request.url.clone();
        self.requests.lock().push(request);
        self.submitted.send_modify(|count| *count += 1);

        if let Script::Reject(message) = script {
            return Err(EngineError::new(message));
        }

        let transfer = Arc::new(ScriptedTransfer {
            reads: Semaphore::new(0),
            redirects: Semaphore::new(0),
            abort: Mutex::new(None),
            callback: Arc::clone(&callback),
            counters: Arc::clone(&self.counters),
        });
        let task = executor.spawn(play(script, url, callback, Arc::clone(&transfer)));
        *transfer.abort.lock() = Some(task.abort_handle());
        Ok(transfer)
    }
}

struct ScriptedTransfer {
    reads: Semaphore,
    redirects: Semaphore,
    abort: Mutex<Option<AbortHandle>>,
    callback: Arc<dyn UrlRequestCallback>,
    counters: Arc<Counters>,
}

impl UrlRequest for ScriptedTransfer {
    fn read(&self) {
        self.reads.add_permits(1);
    }

    fn follow_redirect(&self) {
        self.counters.redirects_followed.fetch_add(1, Ordering::SeqCst);
        self.redirects.add_permits(1);
    }

    fn cancel(&self) {
        self.counters.cancels.fetch_add(1, Ordering::SeqCst);
        if let Some(abort) = self.abort.lock().take() {
            abort.abort();
        }
        self.callback.on_canceled(self, None);
    }
}

async fn play(
    script: Script,
    url: String,
    callback: Arc<dyn UrlRequestCallback>,
    transfer: Arc<ScriptedTransfer>,
) {
    let mut script = script;
    let mut url = url;
    loop {
        let handle: &dyn UrlRequest = transfer.as_ref();
        match script {
            Script::Respond { status, chunks } => {
                let info = ResponseInfo::new(url, status);
                callback.on_response_started(handle, &info);
                for chunk in chunks {
                    pull(&transfer.reads).await;
                    callback.on_read_completed(handle, &info, chunk);
                }
                pull(&transfer.reads).await;
                callback.on_succeeded(handle, &info);
                return;
            }
            Script::Redirect { location, then } => {
                let info = ResponseInfo::new(url, 302);
                callback.on_redirect_received(handle, &info, &location);
                pull(&transfer.redirects).await;
                url = location;
                script = *then;
            }
            Script::Stall { chunks } => {
                let info = ResponseInfo::new(url, 200);
                callback.on_response_started(handle, &info);
                for chunk in chunks {
                    pull(&transfer.reads).await;
                    callback.on_read_completed(handle, &info, chunk);
                }
                std::future::pending::<()>().await;
                return;
            }
            Script::Gated { gate, then } => {
                gate.notified().await;
                script = *then;
            }
            Script::Fail(message) => {
                callback.on_failed(handle, None, message.map(EngineError::new));
                return;
            }
            Script::Hang | Script::Reject(_) => {
                std::future::pending::<()>().await;
                return;
            }
        }
    }
}

async fn pull(permits: &Semaphore) {
    if let Ok(permit) = permits.acquire().await {
        permit.forget();
    }
}

/// Network over a [`ScriptedEngine`] running on the current runtime.
pub struct ScriptedNetwork {
    engine: ScriptedEngine,
    executor: Handle,
}

impl ScriptedNetwork {
    /// Network answering `{"ok":true}` unless scripted otherwise.
    pub fn new() -> Arc<Self> {
        Self::with_fallback(Script::ok(r#"{"ok":true}"#))
    }

    pub fn with_fallback(fallback: Script) -> Arc<Self> {
        Arc::new(Self {
            engine: ScriptedEngine::new(fallback),
            executor: Handle::current(),
        })
    }

    /// Queue scripts for the next submissions.
    pub fn script(&self, scripts: impl IntoIterator<Item = Script>) {
        self.engine.scripts.lock().extend(scripts);
    }

    /// Wire requests seen so far.
    pub fn requests(&self) -> Vec<WireRequest> {
        self.engine.requests.lock().clone()
    }

    pub fn submissions(&self) -> usize {
        *self.engine.submitted.borrow()
    }

    /// Resolve once at least `count` transfers were submitted.
    pub async fn submitted(&self, count: usize) {
        let mut receiver = self.engine.submitted.subscribe();
        let _ = receiver.wait_for(|submitted| *submitted >= count).await;
    }

    pub fn cancels(&self) -> usize {
        self.engine.counters.cancels.load(Ordering::SeqCst)
    }

    pub fn redirects_followed(&self) -> usize {
        self.engine.counters.redirects_followed.load(Ordering::SeqCst)
    }
}

impl Network for ScriptedNetwork {
    fn engine(&self) -> &dyn Engine {
        &self.engine
    }

    fn executor(&self) -> &Handle {
        &self.executor
    }
}

/// Executor over `network` with a private registry and a fixed language.
pub fn executor(network: &Arc<ScriptedNetwork>) -> RequestExecutor {
    let config = ExecutorConfig::builder().accept_language("en-US").build();
    RequestExecutor::with_config(network.clone(), config)
        .with_registry(Arc::new(InFlightRegistry::new()))
}
