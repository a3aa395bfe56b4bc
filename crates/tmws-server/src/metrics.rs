//! Prometheus-compatible counters for the TMWS server.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    tool_calls_total: AtomicU64,
    tool_errors_total: AtomicU64,
    rate_limit_rejections_total: AtomicU64,
    timeouts_total: AtomicU64,
    started_at: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                tool_calls_total: AtomicU64::new(0),
                tool_errors_total: AtomicU64::new(0),
                rate_limit_rejections_total: AtomicU64::new(0),
                timeouts_total: AtomicU64::new(0),
                started_at: Instant::now(),
            }),
        }
    }

    pub fn inc_tool_calls(&self) {
        self.inner.tool_calls_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tool_errors(&self) {
        self.inner.tool_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rate_limit_rejections(&self) {
        self.inner
            .rate_limit_rejections_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_timeouts(&self) {
        self.inner.timeouts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }

    /// Render in Prometheus text exposition format.
    pub fn render(&self, open_sessions: usize) -> String {
        let i = &self.inner;
        format!(
            "# TYPE tmws_tool_calls_total counter\n\
             tmws_tool_calls_total {}\n\
             # TYPE tmws_tool_errors_total counter\n\
             tmws_tool_errors_total {}\n\
             # TYPE tmws_rate_limit_rejections_total counter\n\
             tmws_rate_limit_rejections_total {}\n\
             # TYPE tmws_timeouts_total counter\n\
             tmws_timeouts_total {}\n\
             # TYPE tmws_open_sessions gauge\n\
             tmws_open_sessions {}\n\
             # TYPE tmws_uptime_seconds gauge\n\
             tmws_uptime_seconds {}\n",
            i.tool_calls_total.load(Ordering::Relaxed),
            i.tool_errors_total.load(Ordering::Relaxed),
            i.rate_limit_rejections_total.load(Ordering::Relaxed),
            i.timeouts_total.load(Ordering::Relaxed),
            open_sessions,
            self.uptime_secs(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_counters() {
        let metrics = Metrics::new();
        metrics.inc_tool_calls();
        metrics.inc_tool_calls();
        metrics.inc_tool_errors();
        let text = metrics.render(3);
        assert!(text.contains("tmws_tool_calls_total 2"));
        assert!(text.contains("tmws_tool_errors_total 1"));
        assert!(text.contains("tmws_open_sessions 3"));
    }
}
