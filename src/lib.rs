// Conduit - request execution for callback-driven HTTP engines
//
// This library layers single-flight deduplication, bounded attempts,
// structured server errors and cancellation on top of a pluggable engine.

// Re-export core functionality
pub use conduit_http::*;

// Re-export optional crates
#[cfg(feature = "log")]
pub use conduit_log;

// Prelude for common imports
pub mod prelude {
    pub use conduit_http::prelude::*;
    pub use conduit_http::{InFlightRegistry, MAX_REQUEST_ATTEMPTS};

    #[cfg(feature = "log")]
    pub use conduit_log::{LogConfig, init as init_logging};
}
