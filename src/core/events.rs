//! Typed events and the default transformer/dispatcher collaborators.
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    core::{
        container::Scope,
        error::{KernelError, KernelResult},
    },
    ports::events::{EventDispatcher, EventListener, EventParser, EventTransformer},
};

/// One typed event produced from a raw input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub event_type: String,
    pub payload: Value,
}

impl Event {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            payload,
        }
    }
}

/// Hands the raw event to the first parser that recognizes it.
#[derive(Default, Clone)]
pub struct ParserEventTransformer {
    parsers: Vec<Arc<dyn EventParser>>,
}

impl ParserEventTransformer {
    pub fn new(parsers: Vec<Arc<dyn EventParser>>) -> Self {
        Self { parsers }
    }

    pub fn parsers(&self) -> &[Arc<dyn EventParser>] {
        &self.parsers
    }
}

impl EventTransformer for ParserEventTransformer {
    fn is_supported(&self, raw_event: &Value) -> bool {
        self.parsers.iter().any(|parser| parser.supports(raw_event))
    }

    fn transform(&self, raw_event: Value) -> KernelResult<Vec<Event>> {
        self.parsers
            .iter()
            .find(|parser| parser.supports(&raw_event))
            .ok_or(KernelError::EventNotSupported)?
            .parse(&raw_event)
    }
}

/// Delivers each event to every listener that supports it, in registration order.
///
/// One failing listener does not stop the others; the first failure is reported once every
/// listener has run.
#[derive(Default, Clone)]
pub struct ListenerEventDispatcher {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl ListenerEventDispatcher {
    pub fn new(listeners: Vec<Arc<dyn EventListener>>) -> Self {
        Self { listeners }
    }
}

#[async_trait]
impl EventDispatcher for ListenerEventDispatcher {
    async fn dispatch(&self, event: &Event, scope: &Scope) -> KernelResult<()> {
        let mut first_error = None;
        let mut delivered = 0usize;

        for listener in self.listeners.iter().filter(|l| l.supports(event)) {
            delivered += 1;
            if let Err(e) = listener.handle(event, scope).await {
                tracing::error!(
                    event.id = %event.id,
                    event.kind = %event.event_type,
                    "Event listener failed: {}",
                    e
                );
                first_error.get_or_insert(e);
            }
        }

        if delivered == 0 {
            tracing::debug!(
                event.id = %event.id,
                "No listener supports event of type '{}'",
                event.event_type
            );
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Result of one event's sub-pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventOutcome {
    pub event_id: Uuid,
    pub event_type: String,
    /// Error message when the event failed.
    pub error: Option<String>,
}

impl EventOutcome {
    pub fn succeeded(event: &Event) -> Self {
        Self {
            event_id: event.id,
            event_type: event.event_type.clone(),
            error: None,
        }
    }

    pub fn failed(event: &Event, error: &KernelError) -> Self {
        Self {
            event_id: event.id,
            event_type: event.event_type.clone(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregated completion of one raw event, in transformation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventBatchReport {
    pub outcomes: Vec<EventOutcome>,
}

impl EventBatchReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::core::container::Container;

    struct TypeParser;

    impl EventParser for TypeParser {
        fn supports(&self, raw_event: &Value) -> bool {
            raw_event.get("records").is_some()
        }

        fn parse(&self, raw_event: &Value) -> KernelResult<Vec<Event>> {
            Ok(raw_event["records"]
                .as_array()
                .map(|records| {
                    records
                        .iter()
                        .map(|record| Event::new("record", record.clone()))
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    struct Recorder {
        accepts: &'static str,
        fails: bool,
        seen: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl EventListener for Recorder {
        fn supports(&self, event: &Event) -> bool {
            event.event_type == self.accepts
        }

        async fn handle(&self, event: &Event, _scope: &Scope) -> KernelResult<()> {
            self.seen.lock().unwrap().push(event.payload.clone());
            if self.fails {
                return Err(eyre::eyre!("listener failure").into());
            }
            Ok(())
        }
    }

    #[test]
    fn test_parser_transformer_picks_supporting_parser() {
        let transformer = ParserEventTransformer::new(vec![Arc::new(TypeParser)]);
        let raw = json!({"records": [{"n": 1}, {"n": 2}]});

        assert!(transformer.is_supported(&raw));
        let events = transformer.transform(raw).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].payload, json!({"n": 2}));

        let unsupported = json!({"other": true});
        assert!(!transformer.is_supported(&unsupported));
        assert!(matches!(
            transformer.transform(unsupported),
            Err(KernelError::EventNotSupported)
        ));
    }

    #[tokio::test]
    async fn test_dispatcher_runs_every_listener_and_reports_first_failure() {
        let failing = Arc::new(Recorder {
            accepts: "record",
            fails: true,
            seen: Mutex::new(Vec::new()),
        });
        let healthy = Arc::new(Recorder {
            accepts: "record",
            fails: false,
            seen: Mutex::new(Vec::new()),
        });
        let unrelated = Arc::new(Recorder {
            accepts: "other",
            fails: false,
            seen: Mutex::new(Vec::new()),
        });
        let dispatcher = ListenerEventDispatcher::new(vec![
            failing.clone() as Arc<dyn EventListener>,
            healthy.clone() as Arc<dyn EventListener>,
            unrelated.clone() as Arc<dyn EventListener>,
        ]);

        let scope = Arc::new(Container::new()).create_scope();
        let result = dispatcher
            .dispatch(&Event::new("record", json!(1)), &scope)
            .await;

        assert!(result.is_err());
        assert_eq!(failing.seen.lock().unwrap().len(), 1);
        assert_eq!(healthy.seen.lock().unwrap().len(), 1);
        assert!(unrelated.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_batch_report_counts() {
        let ok = Event::new("a", Value::Null);
        let ko = Event::new("b", Value::Null);
        let report = EventBatchReport {
            outcomes: vec![
                EventOutcome::succeeded(&ok),
                EventOutcome::failed(&ko, &KernelError::EventNotSupported),
            ],
        };

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert!(!report.all_succeeded());
    }
}
