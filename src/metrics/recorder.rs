//! Metrics recorder for sync sessions and delta computation
//!
//! Without an installed recorder every macro here is a no-op, so the
//! library can call these unconditionally.

use crate::protocol::Command;
use crate::sync::DeltaStats;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return; // Already initialized
    }

    // Session counters
    describe_counter!(
        "deltasync_sessions_total",
        "Total number of sessions started, by command"
    );
    describe_counter!(
        "deltasync_sessions_failed_total",
        "Total number of sessions that ended in failure"
    );
    describe_gauge!(
        "deltasync_sessions_active",
        "Number of sessions currently being served"
    );
    describe_histogram!(
        "deltasync_session_duration_seconds",
        "Wall time of a completed session"
    );

    // Delta computation
    describe_counter!(
        "deltasync_delta_copy_ops_total",
        "Copy instructions emitted by delta computation"
    );
    describe_counter!(
        "deltasync_delta_literal_bytes_total",
        "Literal bytes emitted by delta computation"
    );
    describe_histogram!(
        "deltasync_delta_duration_seconds",
        "Time to compute one delta"
    );
}

// ============== Delta Operations ==============

/// Record one finished delta computation
pub fn record_delta_computed(stats: &DeltaStats, duration: Duration) {
    counter!("deltasync_delta_copy_ops_total").increment(stats.copy_operations as u64);
    counter!("deltasync_delta_literal_bytes_total").increment(stats.literal_bytes);
    histogram!("deltasync_delta_duration_seconds").record(duration.as_secs_f64());
}

// ============== Session Operations ==============

/// Record a session starting
pub fn record_session_started(command: Command) {
    counter!("deltasync_sessions_total", "command" => command.name()).increment(1);
    gauge!("deltasync_sessions_active").increment(1.0);
}

/// Record a session completing successfully
pub fn record_session_finished(command: Command, duration: Duration) {
    gauge!("deltasync_sessions_active").decrement(1.0);
    histogram!("deltasync_session_duration_seconds", "command" => command.name())
        .record(duration.as_secs_f64());
}

/// Record a session failing
pub fn record_session_failed(command: Option<Command>) {
    let command = command.map(|c| c.name()).unwrap_or("unknown");
    counter!("deltasync_sessions_failed_total", "command" => command).increment(1);
}

/// Tracks one server session from accepted command to close
///
/// Dropping the guard without calling [`SessionMetrics::complete`] counts
/// the session as failed.
pub struct SessionMetrics {
    command: Command,
    start_time: Instant,
    finished: bool,
}

impl SessionMetrics {
    pub fn start(command: Command) -> Self {
        record_session_started(command);

        Self {
            command,
            start_time: Instant::now(),
            finished: false,
        }
    }

    /// Mark session as complete
    pub fn complete(mut self) {
        self.finished = true;
        record_session_finished(self.command, self.start_time.elapsed());
    }

    /// Get current duration
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Drop for SessionMetrics {
    fn drop(&mut self) {
        if !self.finished {
            gauge!("deltasync_sessions_active").decrement(1.0);
            record_session_failed(Some(self.command));
        }
    }
}
