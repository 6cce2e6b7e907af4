//! Observability Module
//!
//! Structured logging, Prometheus metrics and the diagnostic HTTP endpoint.

pub mod diagnostics;
pub mod logging;
pub mod metrics;

pub use diagnostics::{
    bind_diagnostics, diagnostics_router, serve_diagnostics, DiagnosticsState, StatusReport,
};
pub use logging::{init_tracing, TracingConfig};
pub use metrics::ProviderMetrics;
