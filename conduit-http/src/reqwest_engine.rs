//! Reference engine over `reqwest`.
//!
//! Connection pooling, TLS, HTTP/2 and redirects are left to `reqwest`. This
//! module only adapts its response stream to the pull-based callback protocol
//! in [`engine`](crate::engine).

use crate::engine::{
    Engine, EngineError, Network, ResponseInfo, UrlRequest, UrlRequestCallback, WireRequest,
};
use crate::NetworkConfig;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::debug;

impl From<reqwest::Error> for EngineError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => EngineError::status(status.as_u16(), error.to_string()),
            None => EngineError::new(error.to_string()),
        }
    }
}

fn build_client(config: &NetworkConfig) -> Result<reqwest::Client, EngineError> {
    reqwest::Client::builder()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(&config.user_agent)
        .gzip(config.gzip)
        .brotli(config.brotli)
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .build()
        .map_err(EngineError::from)
}

struct EngineState {
    client: reqwest::Client,
    config: NetworkConfig,
}

/// [`Engine`] backed by a `reqwest::Client`.
pub struct ReqwestEngine {
    state: RwLock<EngineState>,
}

impl ReqwestEngine {
    /// Build an engine from configuration.
    pub fn new(config: NetworkConfig) -> Result<Self, EngineError> {
        let client = build_client(&config)?;
        Ok(Self {
            state: RwLock::new(EngineState { client, config }),
        })
    }

    /// Current configuration.
    pub fn config(&self) -> NetworkConfig {
        self.state.read().config.clone()
    }

    /// Rebuild the client with a new user agent.
    ///
    /// Transfers already started keep the previous client.
    pub fn set_user_agent(&self, user_agent: impl Into<String>) -> Result<(), EngineError> {
        let mut config = self.config();
        config.user_agent = user_agent.into();
        let client = build_client(&config)?;

        let mut state = self.state.write();
        state.client = client;
        state.config = config;
        Ok(())
    }
}

impl Engine for ReqwestEngine {
    fn start(
        &self,
        request: WireRequest,
        callback: Arc<dyn UrlRequestCallback>,
        executor: &Handle,
    ) -> Result<Arc<dyn UrlRequest>, EngineError> {
        let (client, fail_on_error_status) = {
            let state = self.state.read();
            (state.client.clone(), state.config.fail_on_error_status)
        };

        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| EngineError::new(format!("Invalid URL {}: {e}", request.url)))?;
        let mut builder = client.request(request.method, url).headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let outgoing = builder.build()?;

        let transfer = ReqwestTransfer::new(Arc::clone(&callback), executor.clone());
        let task = executor.spawn(drive(
            client,
            outgoing,
            callback,
            Arc::clone(&transfer),
            fail_on_error_status,
        ));
        transfer.attach(task.abort_handle());

        Ok(transfer)
    }
}

#[derive(Default)]
struct TransferState {
    abort: Option<AbortHandle>,
    cancelled: bool,
}

/// Handle of one running transfer.
struct ReqwestTransfer {
    reads: Semaphore,
    state: Mutex<TransferState>,
    callback: Arc<dyn UrlRequestCallback>,
    executor: Handle,
    this: Weak<ReqwestTransfer>,
}

impl ReqwestTransfer {
    fn new(callback: Arc<dyn UrlRequestCallback>, executor: Handle) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            reads: Semaphore::new(0),
            state: Mutex::new(TransferState::default()),
            callback,
            executor,
            this: this.clone(),
        })
    }

    fn attach(&self, abort: AbortHandle) {
        let mut state = self.state.lock();
        if state.cancelled {
            abort.abort();
        } else {
            state.abort = Some(abort);
        }
    }
}

impl UrlRequest for ReqwestTransfer {
    fn read(&self) {
        self.reads.add_permits(1);
    }

    fn follow_redirect(&self) {
        // reqwest follows redirects internally.
    }

    fn cancel(&self) {
        {
            let mut state = self.state.lock();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            if let Some(abort) = state.abort.take() {
                abort.abort();
            }
        }
        self.reads.close();

        // Report on the executor, like every other callback.
        if let Some(this) = self.this.upgrade() {
            self.executor.spawn(async move {
                this.callback.on_canceled(this.as_ref(), None);
            });
        }
    }
}

async fn drive(
    client: reqwest::Client,
    outgoing: reqwest::Request,
    callback: Arc<dyn UrlRequestCallback>,
    transfer: Arc<ReqwestTransfer>,
    fail_on_error_status: bool,
) {
    let handle: &dyn UrlRequest = transfer.as_ref();

    let response = match client.execute(outgoing).await {
        Ok(response) => response,
        Err(error) => {
            callback.on_failed(handle, None, Some(error.into()));
            return;
        }
    };

    let info = ResponseInfo {
        url: response.url().to_string(),
        status: response.status().as_u16(),
        headers: response.headers().clone(),
    };

    if fail_on_error_status && !response.status().is_success() {
        let reason = response
            .status()
            .canonical_reason()
            .unwrap_or("HTTP error");
        callback.on_failed(
            handle,
            Some(&info),
            Some(EngineError::status(info.status, format!("HTTP {}: {reason}", info.status))),
        );
        return;
    }

    callback.on_response_started(handle, &info);

    let mut body = response.bytes_stream();
    loop {
        match transfer.reads.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => {
                debug!(url = %info.url, "Transfer closed before body was read");
                return;
            }
        }

        match body.next().await {
            Some(Ok(chunk)) => callback.on_read_completed(handle, &info, chunk),
            Some(Err(error)) => {
                callback.on_failed(handle, Some(&info), Some(error.into()));
                return;
            }
            None => {
                callback.on_succeeded(handle, &info);
                return;
            }
        }
    }
}

/// [`Network`] pairing a [`ReqwestEngine`] with a callback executor.
pub struct ReqwestNetwork {
    engine: ReqwestEngine,
    executor: Handle,
}

impl ReqwestNetwork {
    /// Create a network whose callbacks run on `executor`.
    pub fn new(config: NetworkConfig, executor: Handle) -> Result<Self, EngineError> {
        Ok(Self {
            engine: ReqwestEngine::new(config)?,
            executor,
        })
    }

    /// Create a network on the current Tokio runtime.
    pub fn from_current(config: NetworkConfig) -> Result<Self, EngineError> {
        let executor = Handle::try_current().map_err(|e| EngineError::new(e.to_string()))?;
        Self::new(config, executor)
    }

    /// The underlying engine.
    pub fn reqwest_engine(&self) -> &ReqwestEngine {
        &self.engine
    }

    /// Rebuild the engine with a new user agent.
    pub fn set_user_agent(&self, user_agent: impl Into<String>) -> Result<(), EngineError> {
        self.engine.set_user_agent(user_agent)
    }
}

impl Network for ReqwestNetwork {
    fn engine(&self) -> &dyn Engine {
        &self.engine
    }

    fn executor(&self) -> &Handle {
        &self.executor
    }
}
