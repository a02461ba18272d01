//! Metrics and observability utilities
//!
//! Provides Prometheus metrics for each pipeline stage
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all qaforge metrics
pub const METRICS_PREFIX: &str = "qaforge";

/// Histogram buckets for generative model latency (in seconds)
pub const LLM_LATENCY_BUCKETS: &[f64] = &[
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 60s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Generative model metrics
    describe_counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total generative model calls"
    );

    describe_histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Generative model call latency in seconds"
    );

    describe_counter!(
        format!("{}_llm_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total failed generative model calls"
    );

    // Chunk metrics
    describe_counter!(
        format!("{}_chunks_evaluated_total", METRICS_PREFIX),
        Unit::Count,
        "Chunks scored by the quality evaluator"
    );

    describe_counter!(
        format!("{}_sampler_shortfall_total", METRICS_PREFIX),
        Unit::Count,
        "Sampling runs that exhausted the pool before reaching the target"
    );

    // Context metrics
    describe_counter!(
        format!("{}_contexts_total", METRICS_PREFIX),
        Unit::Count,
        "Contexts built or discarded by the context builder"
    );

    // Query metrics
    describe_counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Queries produced per pipeline stage"
    );

    describe_histogram!(
        format!("{}_stage_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Pipeline stage latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Helper to time a pipeline stage
pub struct StageTimer {
    start: Instant,
    stage: &'static str,
}

impl StageTimer {
    /// Start tracking a stage
    pub fn start(stage: &'static str) -> Self {
        Self {
            start: Instant::now(),
            stage,
        }
    }

    /// Record stage completion, returning the elapsed seconds
    pub fn finish(self) -> f64 {
        let duration = self.start.elapsed().as_secs_f64();
        histogram!(
            format!("{}_stage_duration_seconds", METRICS_PREFIX),
            "stage" => self.stage
        )
        .record(duration);
        duration
    }
}

/// Helper to record generative model metrics
pub fn record_llm_call(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_llm_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_llm_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Helper to record a chunk quality verdict
pub fn record_chunk_evaluation(accepted: bool) {
    let verdict = if accepted { "accepted" } else { "rejected" };
    counter!(
        format!("{}_chunks_evaluated_total", METRICS_PREFIX),
        "verdict" => verdict
    )
    .increment(1);
}

/// Helper to record a sampler that ran out of candidates
pub fn record_sampler_shortfall(missing: usize) {
    counter!(format!("{}_sampler_shortfall_total", METRICS_PREFIX)).increment(1);
    tracing::debug!(missing, "Sampler shortfall recorded");
}

/// Helper to record a context outcome
pub fn record_context(kept: bool) {
    let outcome = if kept { "kept" } else { "discarded" };
    counter!(
        format!("{}_contexts_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

/// Helper to record queries emitted by a stage
pub fn record_queries(stage: &'static str, count: usize) {
    counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        "stage" => stage
    )
    .increment(count as u64);
}
