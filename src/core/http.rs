//! Request, response and identity models flowing through the kernel.
//!
//! Requests are never mutated destructively by the pipeline: every request interceptor
//! receives a [`Request`] by value and hands back the one it wants downstream.
use std::collections::{BTreeMap, HashMap};

use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::{Url, form_urlencoded};

/// An inbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Full URL (scheme, host, path, query and fragment) or an origin-form path.
    pub url: String,
    pub headers: HeaderMap,
    pub body: Value,
    pub cookies: HashMap<String, String>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Value::Null,
            cookies: HashMap::new(),
        }
    }

    /// Add a header. Invalid names or values are skipped with a warning.
    ///
    /// Setting `Cookie` refreshes [`Request::cookies`].
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(header_name), Ok(header_value)) => {
                self.headers.append(header_name, header_value);
                if name.eq_ignore_ascii_case(header::COOKIE.as_str()) {
                    self.cookies = parse_cookies(&self.headers);
                }
            }
            _ => tracing::warn!("Invalid request header: {} = {}", name, value),
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = body.into();
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Split the URL into its pathname and raw query string.
    ///
    /// Only a URL carrying a scheme goes through [`Url`]; an origin-form target is split
    /// by hand so a leading `//` stays part of the path instead of becoming a host.
    fn url_parts(&self) -> (String, Option<String>) {
        match Url::parse(&self.url) {
            Ok(url) => (url.path().to_string(), url.query().map(str::to_string)),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let target = self.url.split('#').next().unwrap_or_default();
                match target.split_once('?') {
                    Some((path, query)) => (path.to_string(), Some(query.to_string())),
                    None => (target.to_string(), None),
                }
            }
            Err(e) => {
                tracing::debug!("Unparseable request URL '{}': {}", self.url, e);
                let end = self.url.find(['?', '#']).unwrap_or(self.url.len());
                (self.url[..end].to_string(), None)
            }
        }
    }

    /// The pathname, stripped of scheme, host, query and fragment.
    pub fn path(&self) -> String {
        self.url_parts().0
    }

    /// Every query parameter. A key repeated in the query keeps its last value.
    pub fn query_parameters(&self) -> BTreeMap<String, String> {
        match self.url_parts().1 {
            Some(query) => form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
            None => BTreeMap::new(),
        }
    }

    pub fn query_parameter(&self, name: &str) -> Option<String> {
        self.query_parameters().remove(name)
    }
}

/// Parse every `Cookie` header into a name/value map.
pub fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// An outbound response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// `Value::String` for text bodies, any other JSON value for structured ones.
    pub body: Value,
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Value::Null,
        }
    }

    /// A 200 response carrying `body`.
    pub fn ok(body: impl Into<Value>) -> Self {
        Self::new(StatusCode::OK).with_body(body)
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a header, replacing any previous value. Invalid pairs are skipped with a warning.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(header_name), Ok(header_value)) => {
                self.headers.insert(header_name, header_value);
            }
            _ => tracing::warn!("Invalid response header: {} = {}", name, value),
        }
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// What a handler hands back to the router.
///
/// A [`Response`] passes through untouched; any other value becomes the body of a 200.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Response(Response),
    Value(Value),
}

impl Outcome {
    pub fn into_response(self) -> Response {
        match self {
            Outcome::Response(response) => response,
            Outcome::Value(value) => Response::ok(value),
        }
    }
}

impl From<Response> for Outcome {
    fn from(response: Response) -> Self {
        Outcome::Response(response)
    }
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        Outcome::Value(value)
    }
}

impl From<String> for Outcome {
    fn from(value: String) -> Self {
        Outcome::Value(Value::String(value))
    }
}

impl From<&str> for Outcome {
    fn from(value: &str) -> Self {
        Outcome::Value(Value::String(value.to_string()))
    }
}

/// The authenticated caller, as produced by the authentication collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub claims: serde_json::Map<String, Value>,
}

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            claims: serde_json::Map::new(),
        }
    }

    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_path_ignores_scheme_host_query_and_fragment() {
        let request = Request::new(
            Method::PUT,
            "https://www.subdomain.example.com:8443/api/1.0/dogs/caniche-royal?query=searchTerm#anchor",
        );
        assert_eq!(request.path(), "/api/1.0/dogs/caniche-royal");
    }

    #[test]
    fn test_relative_url_is_resolved() {
        let request = Request::new(Method::GET, "/api/dogs?sort=ASC");
        assert_eq!(request.path(), "/api/dogs");
        assert_eq!(request.query_parameter("sort").as_deref(), Some("ASC"));
    }

    #[test]
    fn test_leading_double_slash_stays_in_path() {
        let request = Request::new(Method::GET, "//api/dogs/rex?sort=ASC#top");
        assert_eq!(request.path(), "//api/dogs/rex");
        assert_eq!(request.query_parameter("sort").as_deref(), Some("ASC"));

        let request = Request::new(Method::GET, "/api/dogs/rex#top");
        assert_eq!(request.path(), "/api/dogs/rex");
        assert!(request.query_parameters().is_empty());
    }

    #[test]
    fn test_query_parameters_decode_values() {
        let request = Request::new(Method::GET, "http://example.com/search?q=hello%20world&page=2");
        let parameters = request.query_parameters();

        assert_eq!(parameters.get("q").map(String::as_str), Some("hello world"));
        assert_eq!(parameters.get("page").map(String::as_str), Some("2"));
        assert_eq!(request.query_parameter("missing"), None);
    }

    #[test]
    fn test_headers_are_case_insensitive_and_cookies_parsed() {
        let request = Request::new(Method::GET, "/")
            .with_header("X-Tenant", "acme")
            .with_header("Cookie", "session=abc123; theme=dark");

        assert_eq!(request.header("x-tenant"), Some("acme"));
        assert_eq!(request.cookie("session"), Some("abc123"));
        assert_eq!(request.cookie("theme"), Some("dark"));
    }

    #[test]
    fn test_outcome_normalization() {
        let passthrough = Response::new(StatusCode::CREATED).with_body(json!({"id": 1}));
        assert_eq!(
            Outcome::from(passthrough.clone()).into_response(),
            passthrough
        );

        let wrapped = Outcome::from(json!({"name": "Rex"})).into_response();
        assert_eq!(wrapped.status, StatusCode::OK);
        assert_eq!(wrapped.body, json!({"name": "Rex"}));
    }
}
