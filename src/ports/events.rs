use async_trait::async_trait;
use serde_json::Value;

use crate::core::{container::Scope, error::KernelResult, events::Event};

/// Turns one raw input into zero or more typed events.
pub trait EventTransformer: Send + Sync {
    fn is_supported(&self, raw_event: &Value) -> bool;

    fn transform(&self, raw_event: Value) -> KernelResult<Vec<Event>>;
}

/// Fans an event out to its listeners.
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    async fn dispatch(&self, event: &Event, scope: &Scope) -> KernelResult<()>;
}

/// Recognizes one raw event shape (a queue batch, a notification envelope...).
pub trait EventParser: Send + Sync {
    fn supports(&self, raw_event: &Value) -> bool;

    fn parse(&self, raw_event: &Value) -> KernelResult<Vec<Event>>;
}

#[async_trait]
pub trait EventListener: Send + Sync {
    fn supports(&self, event: &Event) -> bool;

    async fn handle(&self, event: &Event, scope: &Scope) -> KernelResult<()>;
}
