// Prometheus metrics definitions for the ladder backend.

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Counters ─────────────────────────────────────────────────────

    /// Results committed, by kind (1v1, ffa).
    pub static ref MATCHES_RECORDED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ladder_matches_recorded_total", "Match results committed"),
        &["kind"],
    )
    .unwrap();

    /// Submissions rejected before or during commit, by reason.
    pub static ref SUBMISSIONS_REJECTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ladder_submissions_rejected_total", "Rejected match submissions"),
        &["reason"],
    )
    .unwrap();

    /// Compensating writes run after a partial failure, by outcome (applied, failed).
    pub static ref COMPENSATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ladder_compensations_total", "Compensating writes after partial failures"),
        &["outcome"],
    )
    .unwrap();

    pub static ref REPLAYS_TOTAL: IntCounter =
        IntCounter::new("ladder_replays_total", "Tournament history replays").unwrap();

    /// Total API requests, by method/endpoint/status.
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ladder_api_requests_total", "Total API requests"),
        &["method", "endpoint", "status"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Wall time of a full replay in seconds.
    pub static ref REPLAY_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("ladder_replay_duration_seconds", "Tournament replay duration in seconds")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(MATCHES_RECORDED_TOTAL.clone()),
        Box::new(SUBMISSIONS_REJECTED_TOTAL.clone()),
        Box::new(COMPENSATIONS_TOTAL.clone()),
        Box::new(REPLAYS_TOTAL.clone()),
        Box::new(API_REQUESTS_TOTAL.clone()),
        Box::new(REPLAY_DURATION_SECONDS.clone()),
    ];

    for c in collectors {
        // Tests build several routers in one process
        if let Err(e) = REGISTRY.register(c) {
            if !matches!(e, prometheus::Error::AlreadyReg) {
                panic!("failed to register metric: {e}");
            }
        }
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Normalize a URL path for metric labels: replace numeric path segments with `:id`
/// to prevent cardinality explosion.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.parse::<i64>().is_ok() {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
