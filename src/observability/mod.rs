//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher, directory, config reload produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every log line of an exchange
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
