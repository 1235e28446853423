//! Closure-backed controllers.
use std::{collections::HashMap, future::Future, sync::Arc};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::{
    core::{
        error::{KernelError, KernelResult},
        http::Outcome,
    },
    ports::controller::Controller,
};

type Handler = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, KernelResult<Outcome>> + Send + Sync>;

/// A controller whose members are async closures keyed by name.
///
/// ```
/// use keel::adapters::HandlerController;
///
/// let controller = HandlerController::new()
///     .handler("greet", |arguments| async move {
///         let name = arguments.first().and_then(|v| v.as_str()).unwrap_or("world");
///         Ok(format!("hello {name}").into())
///     });
/// assert!(controller.has_handler("greet"));
/// ```
#[derive(Clone, Default)]
pub struct HandlerController {
    handlers: HashMap<String, Handler>,
}

impl HandlerController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `member` to `handler`, replacing any previous binding.
    pub fn handler<F, Fut>(mut self, member: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = KernelResult<Outcome>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |arguments| Box::pin(handler(arguments)));
        self.handlers.insert(member.into(), handler);
        self
    }

    pub fn has_handler(&self, member: &str) -> bool {
        self.handlers.contains_key(member)
    }
}

#[async_trait]
impl Controller for HandlerController {
    async fn invoke(&self, member: &str, arguments: Vec<Value>) -> KernelResult<Outcome> {
        let handler = self
            .handlers
            .get(member)
            .ok_or_else(|| KernelError::UnknownHandler(member.to_string()))?;
        handler(arguments).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_invokes_handler_with_arguments() {
        let controller = HandlerController::new().handler("sum", |arguments| async move {
            let total: i64 = arguments.iter().filter_map(Value::as_i64).sum();
            Ok(json!({ "total": total }).into())
        });

        let outcome = controller
            .invoke("sum", vec![json!(2), json!(3)])
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Value(json!({ "total": 5 })));
    }

    #[tokio::test]
    async fn test_unknown_member_is_reported() {
        let controller = HandlerController::new();
        let error = controller.invoke("missing", Vec::new()).await.unwrap_err();
        assert!(matches!(error, KernelError::UnknownHandler(member) if member == "missing"));
    }
}
