use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Request-level metrics for the OCR service.
///
/// Thread-safe and cheap to clone; shared through AppState.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    requests_total: AtomicUsize,
    requests_success: AtomicUsize,
    requests_failed: AtomicUsize,
    boxes_detected: AtomicUsize,
    regions_skipped: AtomicUsize,
    request_latency_ms: RwLock<Vec<u64>>,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                requests_total: AtomicUsize::new(0),
                requests_success: AtomicUsize::new(0),
                requests_failed: AtomicUsize::new(0),
                boxes_detected: AtomicUsize::new(0),
                regions_skipped: AtomicUsize::new(0),
                request_latency_ms: RwLock::new(Vec::new()),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn record_request(&self, success: bool, duration: Duration, boxes: usize, skipped: usize) {
        self.inner.requests_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.inner.requests_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.boxes_detected.fetch_add(boxes, Ordering::Relaxed);
        self.inner.regions_skipped.fetch_add(skipped, Ordering::Relaxed);
        self.inner
            .request_latency_ms
            .write()
            .push(duration.as_millis() as u64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = self.inner.request_latency_ms.read();
        let latency_avg = avg(&latency);
        let latency_p50 = percentile(&latency, 0.5);
        let latency_p95 = percentile(&latency, 0.95);
        drop(latency);

        MetricsSnapshot {
            requests_total: self.inner.requests_total.load(Ordering::Relaxed),
            requests_success: self.inner.requests_success.load(Ordering::Relaxed),
            requests_failed: self.inner.requests_failed.load(Ordering::Relaxed),
            boxes_detected_total: self.inner.boxes_detected.load(Ordering::Relaxed),
            regions_skipped_total: self.inner.regions_skipped.load(Ordering::Relaxed),
            request_latency_avg_ms: latency_avg,
            request_latency_p50_ms: latency_p50,
            request_latency_p95_ms: latency_p95,
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP ocr_requests_total Total number of OCR requests
# TYPE ocr_requests_total counter
ocr_requests_total {{}} {}

# HELP ocr_requests_success Number of successful OCR requests
# TYPE ocr_requests_success counter
ocr_requests_success {{}} {}

# HELP ocr_requests_failed Number of failed OCR requests
# TYPE ocr_requests_failed counter
ocr_requests_failed {{}} {}

# HELP ocr_boxes_detected_total Total text boxes returned to clients
# TYPE ocr_boxes_detected_total counter
ocr_boxes_detected_total {{}} {}

# HELP ocr_regions_skipped_total Regions dropped as degenerate or unrecognizable
# TYPE ocr_regions_skipped_total counter
ocr_regions_skipped_total {{}} {}

# HELP ocr_request_latency_avg_ms Average request latency in milliseconds
# TYPE ocr_request_latency_avg_ms gauge
ocr_request_latency_avg_ms {{}} {}

# HELP uptime_seconds Application uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {{}} {}
"#,
            snapshot.requests_total,
            snapshot.requests_success,
            snapshot.requests_failed,
            snapshot.boxes_detected_total,
            snapshot.regions_skipped_total,
            snapshot.request_latency_avg_ms,
            snapshot.uptime_seconds,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: usize,
    pub requests_success: usize,
    pub requests_failed: usize,
    pub boxes_detected_total: usize,
    pub regions_skipped_total: usize,
    pub request_latency_avg_ms: u64,
    pub request_latency_p50_ms: u64,
    pub request_latency_p95_ms: u64,
    pub uptime_seconds: u64,
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        0
    } else {
        values.iter().sum::<u64>() / values.len() as u64
    }
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let rank = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[rank]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_accumulate() {
        let metrics = Metrics::new();
        metrics.record_request(true, Duration::from_millis(120), 3, 1);
        metrics.record_request(false, Duration::from_millis(40), 0, 0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 2);
        assert_eq!(snapshot.requests_success, 1);
        assert_eq!(snapshot.requests_failed, 1);
        assert_eq!(snapshot.boxes_detected_total, 3);
        assert_eq!(snapshot.regions_skipped_total, 1);
        assert_eq!(snapshot.request_latency_avg_ms, 80);
    }

    #[test]
    fn prometheus_output_names_counters() {
        let metrics = Metrics::new();
        metrics.record_request(true, Duration::from_millis(10), 2, 0);

        let text = metrics.to_prometheus();
        assert!(text.contains("ocr_requests_total {} 1"));
        assert!(text.contains("ocr_boxes_detected_total {} 2"));
    }

    #[test]
    fn percentile_of_empty_is_zero() {
        assert_eq!(percentile(&[], 0.95), 0);
        assert_eq!(avg(&[]), 0);
    }
}
