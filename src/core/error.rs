//! Error kinds raised while routing and handling requests and events.
//!
//! Every failure that can reach the kernel is a [`KernelError`]. The kernel never lets one
//! escape `handle_request`: the error-response interceptor chain turns it into a
//! [`Response`](crate::core::http::Response) whose status comes from [`KernelError::status`].
use std::{fmt, time::Duration};

use http::StatusCode;
use serde_json::{Value, json};
use thiserror::Error;

use crate::{config::manager::ConfigurationError, core::http::Response};

/// An error that carries an explicit HTTP status and optional structured sub-errors.
///
/// Handlers, authenticators and guards return this when they want a specific status
/// instead of the default 500.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct HttpError {
    pub status: StatusCode,
    pub message: String,
    pub errors: Vec<Value>,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// Attach structured sub-errors (validation failures and the like).
    pub fn with_errors(mut self, errors: Vec<Value>) -> Self {
        self.errors = errors;
        self
    }
}

/// Which interceptor chain an interception failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterceptionStage {
    Request,
    Response,
    ErrorResponse,
    RawEvent,
    Event,
}

impl fmt::Display for InterceptionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InterceptionStage::Request => "request",
            InterceptionStage::Response => "response",
            InterceptionStage::ErrorResponse => "error response",
            InterceptionStage::RawEvent => "raw event",
            InterceptionStage::Event => "event",
        };
        f.write_str(name)
    }
}

/// An interceptor failed. Always fatal to the pipeline it ran in.
#[derive(Error, Debug)]
#[error("The {stage} interceptor '{interceptor}' failed while intercepting {subject}: {source}")]
pub struct InterceptionExecutionError {
    pub stage: InterceptionStage,
    pub interceptor: String,
    pub subject: String,
    #[source]
    pub source: Box<KernelError>,
}

impl InterceptionExecutionError {
    pub fn new(
        stage: InterceptionStage,
        interceptor: impl Into<String>,
        subject: impl Into<String>,
        source: KernelError,
    ) -> Self {
        Self {
            stage,
            interceptor: interceptor.into(),
            subject: subject.into(),
            source: Box::new(source),
        }
    }
}

/// Result alias used throughout the kernel.
pub type KernelResult<T> = Result<T, KernelError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum KernelError {
    /// No trie match for the path and method.
    #[error("No route found for path: '{path}'.")]
    NotFound { method: http::Method, path: String },

    /// The authorization collaborator refused the request.
    #[error("You are not allowed to access this.")]
    Forbidden,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Interception(#[from] InterceptionExecutionError),

    /// A provider registration could not be installed into the container.
    #[error("Failed to register provider '{provider}': {reason}")]
    ProviderRegistration { provider: String, reason: String },

    #[error("Kernel initialization failed: {0}")]
    KernelInitialization(String),

    /// No parameter resolver claims the declared argument kind.
    #[error("No parameter resolver supports argument kind '{kind}' declared on '{route}'")]
    UnsupportedArgument { route: String, kind: String },

    #[error("Route conflict: {0}")]
    RouteConflict(String),

    #[error("Controller has no handler named '{0}'")]
    UnknownHandler(String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("No event parser supports the raw event")]
    EventNotSupported,

    #[error("Request handling exceeded the deadline of {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Other(#[from] eyre::Report),
}

impl KernelError {
    /// Short, stable name of the error kind. Used as the `name` field of error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            KernelError::NotFound { .. } => "NotFoundError",
            KernelError::Forbidden => "ForbiddenError",
            KernelError::Unauthorized(_) => "UnauthorizedError",
            KernelError::Http(_) => "HttpError",
            KernelError::Interception(_) => "InterceptionExecutionError",
            KernelError::ProviderRegistration { .. } => "ProviderRegistrationError",
            KernelError::KernelInitialization(_) => "KernelInitializationError",
            KernelError::UnsupportedArgument { .. } => "UnsupportedArgumentError",
            KernelError::RouteConflict(_) => "RouteConflictError",
            KernelError::UnknownHandler(_) => "UnknownHandlerError",
            KernelError::Configuration(_) => "ConfigurationError",
            KernelError::EventNotSupported => "EventNotSupportedError",
            KernelError::Timeout(_) => "TimeoutError",
            KernelError::Other(report) => match report.downcast_ref::<HttpError>() {
                Some(_) => "HttpError",
                None => "Error",
            },
        }
    }

    /// HTTP status this error converts to. Anything without an explicit status is a 500.
    pub fn status(&self) -> StatusCode {
        match self {
            KernelError::NotFound { .. } => StatusCode::NOT_FOUND,
            KernelError::Forbidden => StatusCode::FORBIDDEN,
            KernelError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            KernelError::Http(error) => error.status,
            KernelError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            KernelError::Other(report) => report
                .downcast_ref::<HttpError>()
                .map(|error| error.status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Structured sub-errors carried by an [`HttpError`], if any.
    pub fn sub_errors(&self) -> &[Value] {
        match self {
            KernelError::Http(error) => &error.errors,
            KernelError::Other(report) => report
                .downcast_ref::<HttpError>()
                .map(|error| error.errors.as_slice())
                .unwrap_or(&[]),
            _ => &[],
        }
    }

    /// Build the default response for this error, before any error-response interceptor runs.
    pub fn to_response(&self) -> Response {
        let mut body = json!({
            "name": self.kind(),
            "message": self.to_string(),
        });

        let errors = self.sub_errors();
        if !errors.is_empty() {
            body["errors"] = Value::Array(errors.to_vec());
        }

        Response::new(self.status()).with_body(body)
    }
}
