use crate::{
    core::telemetry::{Span, Trace},
    ports::tracer::Tracer,
};

/// Writes kernel trace and span lifecycle events to the `tracing` subscriber at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn trace_started(&self, trace: &Trace) {
        tracing::debug!(trace.id = %trace.id, trace.keyname = %trace.keyname, "Trace started");
    }

    fn span_started(&self, span: &Span) {
        tracing::debug!(
            trace.id = %span.trace_id,
            span.id = %span.id,
            span.keyname = %span.keyname,
            "Span started"
        );
    }

    fn span_ended(&self, span: &Span) {
        tracing::debug!(
            trace.id = %span.trace_id,
            span.id = %span.id,
            span.keyname = %span.keyname,
            duration_ms = span.duration_ms().unwrap_or_default(),
            "Span ended"
        );
    }

    fn trace_ended(&self, trace: &Trace) {
        tracing::debug!(
            trace.id = %trace.id,
            trace.keyname = %trace.keyname,
            spans = trace.spans.len(),
            "Trace ended"
        );
    }
}
