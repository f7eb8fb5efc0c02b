//! Metrics and observability utilities
//!
//! Describes the engine's instrument set and provides small record helpers
//! for the store and retriever hot paths. Exporter installation is left to
//! the embedding application.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// Metrics prefix for all forage metrics
pub const METRICS_PREFIX: &str = "forage";

/// Histogram buckets for search latency (in seconds)
pub const SEARCH_BUCKETS: &[f64] = &[
    0.001, // 1ms
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
];

/// Buckets for embedding latency (typically slower)
pub const EMBEDDING_BUCKETS: &[f64] = &[
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.000, // 2s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Search metrics
    describe_counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of search queries"
    );

    describe_histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Search query latency in seconds"
    );

    describe_gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of results returned from search"
    );

    // Ingestion metrics
    describe_counter!(
        format!("{}_documents_ingested_total", METRICS_PREFIX),
        Unit::Count,
        "Total documents written to stores"
    );

    describe_counter!(
        format!("{}_documents_failed_total", METRICS_PREFIX),
        Unit::Count,
        "Total documents rejected during bulk writes"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API errors"
    );

    // Fan-out metrics
    describe_counter!(
        format!("{}_fanout_timeouts_total", METRICS_PREFIX),
        Unit::Count,
        "Multi-path retrievals aborted by the fan-out timeout"
    );

    // Full-text index metrics
    describe_counter!(
        format!("{}_fulltext_builds_total", METRICS_PREFIX),
        Unit::Count,
        "Full-text index build operations"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record search metrics
pub fn record_search(duration_secs: f64, mode: &str, result_count: usize) {
    counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .set(result_count as f64);
}

/// Helper to record bulk-write outcomes
pub fn record_ingestion(table: &str, stored: u64, failed: usize) {
    counter!(
        format!("{}_documents_ingested_total", METRICS_PREFIX),
        "table" => table.to_string()
    )
    .increment(stored);

    if failed > 0 {
        counter!(
            format!("{}_documents_failed_total", METRICS_PREFIX),
            "table" => table.to_string()
        )
        .increment(failed as u64);
    }
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Helper to record a fan-out timeout
pub fn record_fanout_timeout() {
    counter!(format!("{}_fanout_timeouts_total", METRICS_PREFIX)).increment(1);
}

/// Helper to record a full-text index build
pub fn record_fulltext_build(table: &str) {
    counter!(
        format!("{}_fulltext_builds_total", METRICS_PREFIX),
        "table" => table.to_string()
    )
    .increment(1);
}
