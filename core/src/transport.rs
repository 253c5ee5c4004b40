use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
    /// Set on the first request after an intercept action. An interception
    /// layer should hold this request for inspection before it goes out.
    #[serde(default)]
    pub break_requested: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HttpResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
    pub elapsed_ms: u64,
}

impl HttpResponse {
    /// Status line plus headers, one per line.
    pub fn head(&self) -> String {
        let mut head = format!("HTTP/1.1 {}\r\n", self.status);
        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head
    }
}

/// A request paired with the response it produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Exchange {
    pub request: HttpRequest,
    pub response: HttpResponse,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request does not contain a request-uri")]
    MissingUrl,
    #[error("failed to send {method} {url}: {reason}")]
    Io {
        method: String,
        url: String,
        reason: String,
    },
}

/// Sends requests on behalf of the runner. Implementations apply their own timeouts.
pub trait Transport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}
