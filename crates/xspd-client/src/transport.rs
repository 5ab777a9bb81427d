//! Transport capability for the variable protocol.
//!
//! [`Transport`] is the injectable seam between the protocol layer and the
//! network: production uses [`HttpTransport`] (reqwest), tests use
//! [`MockTransport`] with scripted responses. Both return parsed JSON so
//! the protocol layer never touches raw bodies.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use xspd_core::XspdError;

/// HTTP verb for a variable-protocol request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Get,
    Put,
}

impl RequestKind {
    fn verb(&self) -> &'static str {
        match self {
            RequestKind::Get => "get data from",
            RequestKind::Put => "put data to",
        }
    }
}

/// Capability to submit one request and return the parsed JSON body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn submit(&self, uri: &str, kind: RequestKind) -> Result<Value, XspdError>;
}

/// Production transport over HTTP.
///
/// The XSPD control service speaks plain HTTP; bodies are always JSON.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(&self, uri: &str, kind: RequestKind) -> Result<Value, XspdError> {
        let request = match kind {
            RequestKind::Get => self.client.get(uri),
            RequestKind::Put => self.client.put(uri),
        };

        let response = request.send().await.map_err(|e| XspdError::Transport {
            uri: uri.to_string(),
            message: format!("Failed to {} {}: {}", kind.verb(), uri, e),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(XspdError::Transport {
                uri: uri.to_string(),
                message: format!("Failed to {} {}: HTTP {}", kind.verb(), uri, status),
            });
        }

        let body = response.text().await.map_err(|e| XspdError::Transport {
            uri: uri.to_string(),
            message: format!("Failed to read response body: {e}"),
        })?;

        let parsed: Value = serde_json::from_str(&body).map_err(|e| XspdError::Transport {
            uri: uri.to_string(),
            message: format!("Failed to parse JSON response: {e}"),
        })?;

        if is_empty_body(&parsed) {
            return Err(XspdError::EmptyResponse(uri.to_string()));
        }

        Ok(parsed)
    }
}

/// The device signals failure with empty/null bodies rather than error
/// objects; treat those as an empty response.
pub(crate) fn is_empty_body(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Scripted transport for tests.
///
/// Responses are queued per URI and consumed in order; a URI with no
/// queued response yields a transport error, which makes missing
/// expectations loud. Plays the role the gmock `SubmitRequest` override
/// plays in the original driver's test suite.
pub struct MockTransport {
    responses: Mutex<HashMap<String, VecDeque<Value>>>,
    requests: Mutex<Vec<(String, RequestKind)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue one response for a URI. Multiple calls queue in FIFO order.
    pub fn expect(&self, uri: impl Into<String>, response: Value) {
        self.responses
            .lock()
            .expect("lock poisoned")
            .entry(uri.into())
            .or_default()
            .push_back(response);
    }

    /// URIs and verbs seen so far, in order.
    pub fn requests(&self) -> Vec<(String, RequestKind)> {
        self.requests.lock().expect("lock poisoned").clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn submit(&self, uri: &str, kind: RequestKind) -> Result<Value, XspdError> {
        self.requests
            .lock()
            .expect("lock poisoned")
            .push((uri.to_string(), kind));

        let response = self
            .responses
            .lock()
            .expect("lock poisoned")
            .get_mut(uri)
            .and_then(VecDeque::pop_front);

        match response {
            Some(value) if is_empty_body(&value) => Err(XspdError::EmptyResponse(uri.to_string())),
            Some(value) => Ok(value),
            None => Err(XspdError::Transport {
                uri: uri.to_string(),
                message: "no mocked response for URI".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn mock_returns_queued_responses_in_order() {
        let mock = MockTransport::new();
        mock.expect("uri", json!({"value": 1}));
        mock.expect("uri", json!({"value": 2}));

        let first = mock.submit("uri", RequestKind::Get).await.unwrap();
        let second = mock.submit("uri", RequestKind::Get).await.unwrap();
        assert_eq!(first["value"], 1);
        assert_eq!(second["value"], 2);
    }

    #[tokio::test]
    async fn mock_unmocked_uri_is_transport_error() {
        let mock = MockTransport::new();
        let err = mock.submit("missing", RequestKind::Get).await.unwrap_err();
        assert!(matches!(err, XspdError::Transport { .. }));
    }

    #[tokio::test]
    async fn mock_empty_body_is_empty_response() {
        let mock = MockTransport::new();
        mock.expect("uri", Value::Null);
        let err = mock.submit("uri", RequestKind::Get).await.unwrap_err();
        assert!(matches!(err, XspdError::EmptyResponse(_)));
    }

    #[test]
    fn empty_body_detection() {
        assert!(is_empty_body(&Value::Null));
        assert!(is_empty_body(&json!({})));
        assert!(is_empty_body(&json!([])));
        assert!(!is_empty_body(&json!({"value": 0})));
        assert!(!is_empty_body(&json!(0)));
    }
}
