use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for stream sessions and frame handling
///
/// Thread-safe atomic counters shared by all sessions of a client.
#[derive(Default)]
pub struct StreamMetrics {
    pub sessions_started: AtomicU64,
    pub sessions_completed: AtomicU64,
    pub sessions_failed: AtomicU64,
    pub sessions_cancelled: AtomicU64,

    /// Frames decoded from a structured payload
    pub frames_decoded: AtomicU64,

    /// Frames that fell back to plain text
    pub frames_degraded: AtomicU64,

    /// Empty, comment-only or field-only frames
    pub frames_skipped: AtomicU64,

    pub bytes_received: AtomicU64,
    pub heartbeats: AtomicU64,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.sessions_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.sessions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.sessions_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a finished session's decoder counts into the totals
    pub fn record_frames(&self, decoded: u64, degraded: u64, skipped: u64) {
        self.frames_decoded.fetch_add(decoded, Ordering::Relaxed);
        self.frames_degraded.fetch_add(degraded, Ordering::Relaxed);
        self.frames_skipped.fetch_add(skipped, Ordering::Relaxed);
    }

    pub fn record_bytes(&self, len: usize) {
        self.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn record_heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
    }

    /// Share of finished frames that needed the plain-text fallback, as percentage
    pub fn degraded_rate(&self) -> f64 {
        let degraded = self.frames_degraded.load(Ordering::Relaxed);
        let total = degraded + self.frames_decoded.load(Ordering::Relaxed);
        if total > 0 {
            (degraded as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Get snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
            sessions_failed: self.sessions_failed.load(Ordering::Relaxed),
            sessions_cancelled: self.sessions_cancelled.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_degraded: self.frames_degraded.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            degraded_rate: self.degraded_rate(),
        }
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.sessions_started,
            &self.sessions_completed,
            &self.sessions_failed,
            &self.sessions_cancelled,
            &self.frames_decoded,
            &self.frames_degraded,
            &self.frames_skipped,
            &self.bytes_received,
            &self.heartbeats,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Immutable snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub sessions_started: u64,
    pub sessions_completed: u64,
    pub sessions_failed: u64,
    pub sessions_cancelled: u64,
    pub frames_decoded: u64,
    pub frames_degraded: u64,
    pub frames_skipped: u64,
    pub bytes_received: u64,
    pub heartbeats: u64,
    pub degraded_rate: f64,
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Stream Metrics: {} sessions ({} completed, {} failed, {} cancelled), {} frames ({:.1}% degraded), {} bytes",
            self.sessions_started,
            self.sessions_completed,
            self.sessions_failed,
            self.sessions_cancelled,
            self.frames_decoded + self.frames_degraded,
            self.degraded_rate,
            self.bytes_received
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_session_outcomes() {
        let metrics = StreamMetrics::new();

        metrics.record_started();
        metrics.record_started();
        metrics.record_started();
        metrics.record_completed();
        metrics.record_failed();
        metrics.record_cancelled();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sessions_started, 3);
        assert_eq!(snapshot.sessions_completed, 1);
        assert_eq!(snapshot.sessions_failed, 1);
        assert_eq!(snapshot.sessions_cancelled, 1);
    }

    #[test]
    fn test_degraded_rate() {
        let metrics = StreamMetrics::new();
        assert_eq!(metrics.degraded_rate(), 0.0);

        metrics.record_frames(3, 1, 7);
        assert_eq!(metrics.degraded_rate(), 25.0);
        assert_eq!(metrics.frames_skipped.load(Ordering::Relaxed), 7);
    }

    #[test]
    fn test_reset() {
        let metrics = StreamMetrics::new();
        metrics.record_bytes(128);
        metrics.record_heartbeat();

        metrics.reset();
        assert_eq!(metrics.bytes_received.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.heartbeats.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_thread_safety() {
        let metrics = Arc::new(StreamMetrics::new());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let m = Arc::clone(&metrics);
                thread::spawn(move || {
                    m.record_bytes(10);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.bytes_received.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn test_display_format() {
        let metrics = StreamMetrics::new();
        metrics.record_started();
        metrics.record_completed();
        metrics.record_frames(9, 1, 0);
        metrics.record_bytes(2048);

        let output = format!("{}", metrics.snapshot());
        assert!(output.contains("1 sessions"));
        assert!(output.contains("10 frames"));
        assert!(output.contains("10.0% degraded"));
        assert!(output.contains("2048 bytes"));
    }
}
