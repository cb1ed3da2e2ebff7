//! Metrics and observability module
//!
//! Provides Prometheus-compatible metrics for monitoring sync sessions.
//!
//! Key metrics exposed:
//! - Sessions started, failed and currently active
//! - Delta composition (copy operations, literal bytes)
//! - Delta computation and session durations

pub mod exporter;
pub mod recorder;

pub use exporter::{render_metrics, start_metrics_server, MetricsConfig, MetricsError};
pub use recorder::{
    init_metrics, record_delta_computed, record_session_failed, SessionMetrics,
};
