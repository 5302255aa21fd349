//! Queue operation span helpers.

use tracing::Span;

/// Start a span for one queue operation.
///
/// `work.id` and `work.status` are declared empty; fill them via
/// [`record_outcome`] once the affected item is known.
pub fn start_queue_span(operation: &'static str, actor: &str) -> Span {
    tracing::info_span!(
        "work_queue",
        "work.operation" = operation,
        "work.actor" = actor,
        "work.id" = tracing::field::Empty,
        "work.status" = tracing::field::Empty,
    )
}

/// Record the affected item on the span and emit a transition event in it.
pub fn record_outcome(span: &Span, id: i64, status: &str) {
    span.record("work.id", id);
    span.record("work.status", status);
    span.in_scope(|| {
        tracing::info!(id, status, "state_transition");
    });
}
