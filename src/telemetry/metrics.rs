//! Metric instrument factories.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without an exporter installed these are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("workq")
}

/// Counter: work items created.
pub fn items_created() -> Counter<u64> {
    meter()
        .u64_counter("workq.items.created")
        .with_description("Number of work items created")
        .build()
}

/// Counter: committed status writes.
/// Labels: `action`, `to`.
pub fn state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("workq.state_transitions")
        .with_description("Number of committed work item status writes")
        .build()
}

/// Counter: claim attempts through the next-available path.
/// Labels: `result` ("ok" | "empty").
pub fn claims() -> Counter<u64> {
    meter()
        .u64_counter("workq.claims")
        .with_description("Claims of the next available work item")
        .build()
}

/// Counter: operations retried because the store was busy.
/// Labels: `operation`.
pub fn conflicts_retried() -> Counter<u64> {
    meter()
        .u64_counter("workq.conflicts.retried")
        .with_description("Queue operations retried after store contention")
        .build()
}

/// Histogram: operation duration in milliseconds, retries included.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("workq.operation.duration_ms")
        .with_description("Queue operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
