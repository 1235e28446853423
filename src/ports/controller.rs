use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{container::Scope, error::KernelResult, http::Outcome};

/// A controller instance: the target a [`Route`](crate::core::route::Route) is bound to.
#[async_trait]
pub trait Controller: Send + Sync {
    /// Invoke the handler named `member` with arguments already resolved in declaration order.
    ///
    /// An unknown member should fail with
    /// [`KernelError::UnknownHandler`](crate::core::error::KernelError::UnknownHandler).
    async fn invoke(&self, member: &str, arguments: Vec<Value>) -> KernelResult<Outcome>;
}

/// Builds a controller instance for one resolution scope.
pub type ControllerFactory = Arc<dyn Fn(&Scope) -> Arc<dyn Controller> + Send + Sync>;
