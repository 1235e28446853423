//! Route bindings and the declarative handler metadata they are built from.
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::url::join_route_path;

/// Arbitrary route-scoped metadata (guards, custom flags).
pub type RouteMetadata = serde_json::Map<String, Value>;

/// Metadata key holding the guard list read by the guard authorizer.
pub const GUARDS_METADATA_KEY: &str = "guards";

/// One declared handler argument. Each kind is claimed by exactly one parameter resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ArgumentDescriptor {
    /// A value captured by a `:name` path segment.
    RouteParameter { name: String },
    /// A single query parameter.
    QueryParameter { name: String },
    /// The full query-parameter map.
    QueryParameters,
    Body,
    Identity,
    /// Extension point for application resolvers.
    Custom {
        kind: String,
        #[serde(default)]
        options: Value,
    },
}

impl ArgumentDescriptor {
    pub fn route_parameter(name: impl Into<String>) -> Self {
        ArgumentDescriptor::RouteParameter { name: name.into() }
    }

    pub fn query_parameter(name: impl Into<String>) -> Self {
        ArgumentDescriptor::QueryParameter { name: name.into() }
    }

    pub fn custom(kind: impl Into<String>, options: Value) -> Self {
        ArgumentDescriptor::Custom {
            kind: kind.into(),
            options,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            ArgumentDescriptor::RouteParameter { .. } => "routeParameter",
            ArgumentDescriptor::QueryParameter { .. } => "queryParameter",
            ArgumentDescriptor::QueryParameters => "queryParameters",
            ArgumentDescriptor::Body => "body",
            ArgumentDescriptor::Identity => "identity",
            ArgumentDescriptor::Custom { kind, .. } => kind,
        }
    }
}

/// A handler binding: how to obtain the controller, which member to call, and with what.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// Token the scope resolves the controller instance from.
    pub controller: String,
    /// Handler name passed to [`Controller::invoke`](crate::ports::controller::Controller::invoke).
    pub member: String,
    pub arguments: Vec<ArgumentDescriptor>,
    pub metadata: RouteMetadata,
}

impl Route {
    pub fn new(controller: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            member: member.into(),
            arguments: Vec::new(),
            metadata: RouteMetadata::new(),
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<ArgumentDescriptor>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_metadata(mut self, metadata: RouteMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// `controller::member`, used in logs and errors.
    pub fn describe(&self) -> String {
        format!("{}::{}", self.controller, self.member)
    }
}

/// Declarative metadata for one handler method.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDefinition {
    pub method: Method,
    pub path: String,
    pub member: String,
    pub arguments: Vec<ArgumentDescriptor>,
    pub metadata: RouteMetadata,
}

impl RouteDefinition {
    pub fn new(method: Method, path: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            member: member.into(),
            arguments: Vec::new(),
            metadata: RouteMetadata::new(),
        }
    }

    pub fn get(path: impl Into<String>, member: impl Into<String>) -> Self {
        Self::new(Method::GET, path, member)
    }

    pub fn post(path: impl Into<String>, member: impl Into<String>) -> Self {
        Self::new(Method::POST, path, member)
    }

    pub fn put(path: impl Into<String>, member: impl Into<String>) -> Self {
        Self::new(Method::PUT, path, member)
    }

    pub fn patch(path: impl Into<String>, member: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path, member)
    }

    pub fn delete(path: impl Into<String>, member: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path, member)
    }

    pub fn argument(mut self, argument: ArgumentDescriptor) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Append a guard entry to the `guards` metadata list.
    pub fn guard(mut self, keyname: impl Into<String>, options: Value) -> Self {
        push_guard(&mut self.metadata, keyname.into(), options);
        self
    }
}

/// Declarative metadata for a controller: base path, controller-wide metadata and handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerDefinition {
    pub token: String,
    pub base_path: String,
    pub metadata: RouteMetadata,
    pub routes: Vec<RouteDefinition>,
}

impl ControllerDefinition {
    pub fn new(token: impl Into<String>, base_path: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_path: base_path.into(),
            metadata: RouteMetadata::new(),
            routes: Vec::new(),
        }
    }

    pub fn route(mut self, route: RouteDefinition) -> Self {
        self.routes.push(route);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn guard(mut self, keyname: impl Into<String>, options: Value) -> Self {
        push_guard(&mut self.metadata, keyname.into(), options);
        self
    }

    /// Expand into `(path, method, route)` triples ready for registration.
    pub fn build_routes(&self) -> Vec<(String, Method, Route)> {
        self.routes
            .iter()
            .map(|definition| {
                let route = Route::new(self.token.clone(), definition.member.clone())
                    .with_arguments(definition.arguments.clone())
                    .with_metadata(merge_metadata(&self.metadata, &definition.metadata));

                (
                    join_route_path(&self.base_path, &definition.path),
                    definition.method.clone(),
                    route,
                )
            })
            .collect()
    }
}

fn push_guard(metadata: &mut RouteMetadata, keyname: String, options: Value) {
    let entry = serde_json::json!({ "keyname": keyname, "options": options });
    match metadata.get_mut(GUARDS_METADATA_KEY) {
        Some(Value::Array(guards)) => guards.push(entry),
        _ => {
            metadata.insert(GUARDS_METADATA_KEY.to_string(), Value::Array(vec![entry]));
        }
    }
}

/// Deep-merge handler metadata over controller metadata.
///
/// Objects merge recursively, arrays concatenate (controller entries first) and any
/// other overlay value replaces the base value.
pub fn merge_metadata(base: &RouteMetadata, overlay: &RouteMetadata) -> RouteMetadata {
    let mut merged = base.clone();
    for (key, value) in overlay {
        let combined = match (merged.remove(key), value) {
            (Some(Value::Object(base_object)), Value::Object(overlay_object)) => {
                Value::Object(merge_metadata(&base_object, overlay_object))
            }
            (Some(Value::Array(mut base_items)), Value::Array(overlay_items)) => {
                base_items.extend(overlay_items.iter().cloned());
                Value::Array(base_items)
            }
            (_, value) => value.clone(),
        };
        merged.insert(key.clone(), combined);
    }
    merged
}
