//! # Conduit HTTP
//!
//! Request execution layer on top of a callback-driven HTTP engine.
//!
//! ## Features
//!
//! - **Single-flight**: identical requests (same URL and parameters) never run
//!   concurrently; late callers wait for the running one
//! - **Bounded attempts**: each [`Request`] is submitted at most
//!   [`MAX_REQUEST_ATTEMPTS`] times
//! - **Error envelopes**: `{"error": ...}` bodies are decoded into
//!   [`ServerError`] regardless of HTTP status
//! - **Cancellation**: dropping, cancelling or timing out an execution aborts
//!   the transfer and releases its in-flight entry
//! - **Pluggable engine**: any [`Engine`] can be used; a `reqwest` adapter is
//!   included behind the `reqwest` feature
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use conduit_http::{NetworkConfig, Outcome, Request, RequestExecutor, ReqwestNetwork};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let network = ReqwestNetwork::from_current(NetworkConfig::default())?;
//!     let executor = RequestExecutor::new(Arc::new(network));
//!
//!     let request = Request::<serde_json::Value>::json(
//!         conduit_http::Method::Get,
//!         "https://api.example.com/users",
//!     )
//!     .with_param("page", 2);
//!
//!     match executor.execute(&request).await? {
//!         Outcome::Completed(users) => println!("{users}"),
//!         other => println!("No result: {other:?}"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Custom parsing
//!
//! ```rust
//! use conduit_http::{Request, RequestError};
//!
//! let request = Request::post("https://api.example.com/echo", |body| {
//!     body.parse::<u32>().map_err(|e| RequestError::parse(e.to_string()))
//! })
//! .with_param("value", 7);
//!
//! assert_eq!(request.parse("42").ok(), Some(42));
//! ```

mod config;
pub mod engine;
mod error;
mod executor;
pub mod locale;
mod params;
mod registry;
mod request;
#[cfg(feature = "reqwest")]
mod reqwest_engine;
mod server_error;

pub use config::{ExecutorConfig, ExecutorConfigBuilder, NetworkConfig, NetworkConfigBuilder};
pub use engine::{
    Engine, EngineError, Network, ResponseInfo, UrlRequest, UrlRequestCallback, WireRequest,
};
pub use error::{RequestError, Result, UNKNOWN_ERROR};
pub use executor::{Outcome, RequestExecutor};
pub use params::ParamSet;
pub use registry::{Fingerprint, InFlight, InFlightRegistry, Registration};
pub use request::{MAX_REQUEST_ATTEMPTS, Method, Request};
#[cfg(feature = "reqwest")]
pub use reqwest_engine::{ReqwestEngine, ReqwestNetwork};
pub use server_error::{LocalizedMessage, ServerError, UNKNOWN_ERROR_NAME};

// Re-export common types
pub use bytes::Bytes;
pub use serde_json::Value;

/// Prelude for common imports.
///
/// ```
/// use conduit_http::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ExecutorConfig, NetworkConfig};
    pub use crate::engine::{Engine, Network};
    pub use crate::error::{RequestError, Result};
    pub use crate::executor::{Outcome, RequestExecutor};
    pub use crate::params::ParamSet;
    pub use crate::request::{Method, Request};
    #[cfg(feature = "reqwest")]
    pub use crate::reqwest_engine::ReqwestNetwork;
    pub use crate::server_error::ServerError;
}
