use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::{
    config::manager::ConfigurationDefinition,
    core::{
        Container, ControllerDefinition, KernelError, KernelResult, Module, Outcome, Provider,
        RouteDefinition,
    },
    modules::CoreModule,
    ports::controller::Controller,
};

pub const SYSTEM_MODULE_KEYNAME: &str = "keel.system";

/// Name reported by `GET /status`.
pub const SERVICE_NAME_PARAMETER: &str = "service_name";

const SYSTEM_CONTROLLER: &str = "keel.system.controller";
const DEFAULT_SERVICE_NAME: &str = "keel";

/// Liveness and status endpoints for the `keel` binary.
pub struct SystemModule {
    started_at: DateTime<Utc>,
}

impl SystemModule {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
        }
    }
}

impl Default for SystemModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Module for SystemModule {
    fn keyname(&self) -> &str {
        SYSTEM_MODULE_KEYNAME
    }

    fn imports(&self) -> Vec<Arc<dyn Module>> {
        vec![Arc::new(CoreModule)]
    }

    fn providers(&self) -> Vec<Provider> {
        let started_at = self.started_at;
        vec![Provider::controller(SYSTEM_CONTROLLER, move |scope| {
            let service_name = scope
                .container()
                .configuration()
                .get_or(SERVICE_NAME_PARAMETER, DEFAULT_SERVICE_NAME.to_string())
                .unwrap_or_else(|e| {
                    tracing::warn!("Falling back to default service name: {}", e);
                    DEFAULT_SERVICE_NAME.to_string()
                });
            Arc::new(SystemController {
                service_name,
                started_at,
            }) as Arc<dyn Controller>
        })]
    }

    fn configuration_definitions(&self) -> Vec<ConfigurationDefinition> {
        vec![
            ConfigurationDefinition::new(SERVICE_NAME_PARAMETER)
                .with_default(DEFAULT_SERVICE_NAME)
                .from_env("KEEL_SERVICE_NAME"),
        ]
    }

    fn controllers(&self) -> Vec<ControllerDefinition> {
        vec![
            ControllerDefinition::new(SYSTEM_CONTROLLER, "/")
                .route(RouteDefinition::get("/health", "health"))
                .route(RouteDefinition::get("/status", "status")),
        ]
    }

    async fn after_init(&self, container: &Container) -> KernelResult<()> {
        let service_name: String = container.configuration().get(SERVICE_NAME_PARAMETER)?;
        tracing::info!("System endpoints ready for service '{}'", service_name);
        Ok(())
    }
}

struct SystemController {
    service_name: String,
    started_at: DateTime<Utc>,
}

impl SystemController {
    fn status(&self) -> Value {
        let now = Utc::now();
        json!({
            "service": self.service_name,
            "version": env!("CARGO_PKG_VERSION"),
            "status": "running",
            "started_at": self.started_at.to_rfc3339(),
            "uptime_secs": (now - self.started_at).num_seconds(),
            "timestamp": now.to_rfc3339(),
        })
    }
}

#[async_trait]
impl Controller for SystemController {
    async fn invoke(&self, member: &str, _arguments: Vec<Value>) -> KernelResult<Outcome> {
        match member {
            "health" => Ok(json!({ "status": "healthy" }).into()),
            "status" => Ok(self.status().into()),
            other => Err(KernelError::UnknownHandler(other.to_string())),
        }
    }
}
