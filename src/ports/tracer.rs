use crate::core::telemetry::{Span, Trace};

/// Receives trace and span lifecycle notifications from a
/// [`TracingManager`](crate::core::telemetry::TracingManager).
///
/// Every method defaults to a no-op so exporters only implement what they need.
pub trait Tracer: Send + Sync {
    fn trace_started(&self, _trace: &Trace) {}

    fn span_started(&self, _span: &Span) {}

    fn span_ended(&self, _span: &Span) {}

    fn trace_ended(&self, _trace: &Trace) {}
}
