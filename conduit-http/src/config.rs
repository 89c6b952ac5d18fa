//! Executor and network configuration.

use std::time::Duration;

/// Request executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// `Accept-Language` value. Detected from the process locale when unset.
    pub accept_language: Option<String>,
    /// Log response bodies at debug level.
    pub log_bodies: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            accept_language: None,
            log_bodies: true,
        }
    }
}

impl ExecutorConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ExecutorConfigBuilder {
        ExecutorConfigBuilder::default()
    }
}

/// Builder for executor configuration.
#[derive(Debug, Default)]
pub struct ExecutorConfigBuilder {
    config: ExecutorConfig,
}

impl ExecutorConfigBuilder {
    /// Override the detected `Accept-Language` tag.
    pub fn accept_language(mut self, tag: impl Into<String>) -> Self {
        self.config.accept_language = Some(tag.into());
        self
    }

    /// Enable or disable response body logging.
    pub fn log_bodies(mut self, enable: bool) -> Self {
        self.config.log_bodies = enable;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ExecutorConfig {
        self.config
    }
}

/// Configuration of the reference network engine.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Overall transfer timeout.
    pub timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// How long idle pooled connections are kept.
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host.
    pub pool_max_idle_per_host: usize,
    /// User agent string.
    pub user_agent: String,
    /// Enable gzip decompression.
    pub gzip: bool,
    /// Enable brotli decompression.
    pub brotli: bool,
    /// Maximum redirects followed before failing.
    pub max_redirects: usize,
    /// Worker threads of a dedicated callback executor.
    pub callback_workers: usize,
    /// Report non-2xx responses through `on_failed` instead of delivering the body.
    pub fail_on_error_status: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 32,
            user_agent: format!("conduit/{}", env!("CARGO_PKG_VERSION")),
            gzip: true,
            brotli: true,
            max_redirects: 10,
            callback_workers: 3,
            fail_on_error_status: false,
        }
    }
}

impl NetworkConfig {
    /// Create a new configuration builder.
    pub fn builder() -> NetworkConfigBuilder {
        NetworkConfigBuilder::default()
    }

    /// Build a dedicated multi-threaded runtime for engine callbacks.
    pub fn build_executor(&self) -> std::io::Result<tokio::runtime::Runtime> {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.callback_workers.max(1))
            .thread_name("conduit-callback")
            .enable_all()
            .build()
    }
}

/// Builder for network configuration.
#[derive(Debug, Default)]
pub struct NetworkConfigBuilder {
    config: NetworkConfig,
}

impl NetworkConfigBuilder {
    /// Set the overall transfer timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the connection pool idle timeout.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set the maximum idle connections per host.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Enable or disable gzip decompression.
    pub fn gzip(mut self, enable: bool) -> Self {
        self.config.gzip = enable;
        self
    }

    /// Enable or disable brotli decompression.
    pub fn brotli(mut self, enable: bool) -> Self {
        self.config.brotli = enable;
        self
    }

    /// Set the maximum number of redirects to follow.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Set the number of callback worker threads.
    pub fn callback_workers(mut self, workers: usize) -> Self {
        self.config.callback_workers = workers;
        self
    }

    /// Report non-2xx responses as transport failures.
    pub fn fail_on_error_status(mut self, enable: bool) -> Self {
        self.config.fail_on_error_status = enable;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> NetworkConfig {
        self.config
    }
}
