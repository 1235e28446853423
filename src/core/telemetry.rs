//! Kernel-level traces and spans.
//!
//! A [`Trace`] groups the [`Span`]s of one unit of work (initialization, one request, one
//! event). Spans close exactly once: ending an already-ended span is a no-op, and ending a
//! trace closes whatever spans are still open before notifying tracers.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::ports::tracer::Tracer;

pub const KERNEL_INITIALIZATION_SPAN: &str = "kernel.initialization";
pub const REQUEST_EXECUTION_SPAN: &str = "request.execution";
pub const EVENT_EXECUTION_SPAN: &str = "event.execution";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Span {
    pub id: Uuid,
    pub keyname: String,
    pub trace_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Span {
    pub fn new(keyname: impl Into<String>, trace_id: Uuid, parent_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            keyname: keyname.into(),
            trace_id,
            parent_id,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Stamp the end time. Returns `false` if the span had already ended.
    pub fn end(&mut self) -> bool {
        if self.ended_at.is_some() {
            return false;
        }
        self.ended_at = Some(Utc::now());
        true
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.ended_at
            .map(|ended_at| (ended_at - self.started_at).num_milliseconds())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    pub id: Uuid,
    pub keyname: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub spans: Vec<Span>,
}

impl Trace {
    pub fn new(keyname: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            keyname: keyname.into(),
            started_at: Utc::now(),
            ended_at: None,
            spans: Vec::new(),
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    pub fn span(&self, id: Uuid) -> Option<&Span> {
        self.spans.iter().find(|span| span.id == id)
    }

    pub fn open_spans(&self) -> impl Iterator<Item = &Span> {
        self.spans.iter().filter(|span| !span.is_ended())
    }
}

/// Owns one trace and forwards its lifecycle to the registered tracers.
pub struct TracingManager {
    tracers: Vec<Arc<dyn Tracer>>,
    trace: Option<Trace>,
}

impl TracingManager {
    pub fn new(tracers: Vec<Arc<dyn Tracer>>) -> Self {
        Self {
            tracers,
            trace: None,
        }
    }

    pub fn trace(&self) -> Option<&Trace> {
        self.trace.as_ref()
    }

    /// Start a new trace, replacing any previous one.
    pub fn start_tracing(&mut self, keyname: impl Into<String>) -> Uuid {
        let trace = Trace::new(keyname);
        let id = trace.id;
        for tracer in &self.tracers {
            tracer.trace_started(&trace);
        }
        self.trace = Some(trace);
        id
    }

    /// Open a span under the current trace. Starts an implicit trace named after the span
    /// when none is active.
    pub fn start_span(&mut self, keyname: impl Into<String>, parent_id: Option<Uuid>) -> Uuid {
        self.add_span(Span::new(keyname, Uuid::nil(), parent_id))
    }

    /// Attach a span built elsewhere (for instance during kernel initialization). The span
    /// is rebased onto the current trace.
    pub fn add_span(&mut self, mut span: Span) -> Uuid {
        if self.trace.is_none() {
            self.start_tracing(span.keyname.clone());
        }

        let id = span.id;
        let Some(trace) = self.trace.as_mut() else {
            return id;
        };
        span.trace_id = trace.id;
        for tracer in &self.tracers {
            tracer.span_started(&span);
        }
        trace.spans.push(span);
        id
    }

    /// End a span. Returns `false` if it was unknown or already ended.
    pub fn end_span(&mut self, id: Uuid) -> bool {
        let Some(span) = self
            .trace
            .as_mut()
            .and_then(|trace| trace.spans.iter_mut().find(|span| span.id == id))
        else {
            return false;
        };

        if !span.end() {
            return false;
        }
        for tracer in &self.tracers {
            tracer.span_ended(span);
        }
        true
    }

    /// End the trace, closing every span still open first. Idempotent.
    pub fn end_trace(&mut self) -> Option<Trace> {
        let trace = self.trace.as_mut()?;
        if trace.is_ended() {
            return None;
        }

        for span in trace.spans.iter_mut() {
            if span.end() {
                for tracer in &self.tracers {
                    tracer.span_ended(span);
                }
            }
        }

        trace.ended_at = Some(Utc::now());
        for tracer in &self.tracers {
            tracer.trace_ended(trace);
        }
        Some(trace.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingTracer {
        events: Mutex<Vec<String>>,
    }

    impl Tracer for RecordingTracer {
        fn trace_started(&self, trace: &Trace) {
            self.events
                .lock()
                .unwrap()
                .push(format!("trace_started:{}", trace.keyname));
        }

        fn span_started(&self, span: &Span) {
            self.events
                .lock()
                .unwrap()
                .push(format!("span_started:{}", span.keyname));
        }

        fn span_ended(&self, span: &Span) {
            self.events
                .lock()
                .unwrap()
                .push(format!("span_ended:{}", span.keyname));
        }

        fn trace_ended(&self, trace: &Trace) {
            self.events
                .lock()
                .unwrap()
                .push(format!("trace_ended:{}", trace.keyname));
        }
    }

    #[test]
    fn test_span_end_is_idempotent() {
        let mut span = Span::new(REQUEST_EXECUTION_SPAN, Uuid::new_v4(), None);
        assert!(span.end());
        let ended_at = span.ended_at;
        assert!(!span.end());
        assert_eq!(span.ended_at, ended_at);
        assert!(span.duration_ms().is_some());
    }

    #[test]
    fn test_end_trace_closes_open_spans_exactly_once() {
        let tracer = Arc::new(RecordingTracer::default());
        let mut manager = TracingManager::new(vec![tracer.clone() as Arc<dyn Tracer>]);

        manager.start_tracing("request");
        let closed = manager.start_span("closed", None);
        let open = manager.start_span("open", Some(closed));
        assert!(manager.end_span(closed));
        assert!(!manager.end_span(closed));

        let trace = manager.end_trace().unwrap();
        assert!(trace.is_ended());
        assert!(trace.span(open).unwrap().is_ended());
        assert_eq!(trace.open_spans().count(), 0);
        assert!(manager.end_trace().is_none());

        let events = tracer.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "trace_started:request",
                "span_started:closed",
                "span_started:open",
                "span_ended:closed",
                "span_ended:open",
                "trace_ended:request",
            ]
        );
    }

    #[test]
    fn test_start_span_without_trace_starts_one() {
        let mut manager = TracingManager::new(Vec::new());
        let id = manager.start_span(EVENT_EXECUTION_SPAN, None);

        let trace = manager.trace().unwrap();
        assert_eq!(trace.keyname, EVENT_EXECUTION_SPAN);
        assert_eq!(trace.span(id).unwrap().trace_id, trace.id);
    }

    #[test]
    fn test_added_span_is_rebased_onto_current_trace() {
        let mut manager = TracingManager::new(Vec::new());
        let trace_id = manager.start_tracing("kernel");

        let span = Span::new(KERNEL_INITIALIZATION_SPAN, Uuid::new_v4(), None);
        let id = manager.add_span(span);

        assert_eq!(manager.trace().unwrap().span(id).unwrap().trace_id, trace_id);
    }
}
