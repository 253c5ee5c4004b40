use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use reqwest::{Method, Proxy};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use vigil_core::{HttpRequest, HttpResponse, Transport, TransportError};

/// Blocking HTTP transport. Redirects are not followed so every hop is a
/// request statement of its own.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(proxy: Option<&str>, timeout: Duration) -> anyhow::Result<Self> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .user_agent(concat!("vigil/", env!("CARGO_PKG_VERSION")));
        if let Some(proxy) = proxy {
            let proxy = if proxy.contains("://") {
                proxy.to_string()
            } else {
                format!("http://{proxy}")
            };
            builder = builder.proxy(Proxy::all(proxy)?);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

fn io_error(request: &HttpRequest, reason: impl ToString) -> TransportError {
    TransportError::Io {
        method: request.method.clone(),
        url: request.url.clone(),
        reason: reason.to_string(),
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|err| io_error(request, err))?;

        if request.break_requested {
            // nothing here can hold a request, so the break only shows in the log
            info!(method = %request.method, url = %request.url, "break requested, sending anyway");
        }

        let mut builder = self.client.request(method, request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let started = Instant::now();
        let response = builder.send().map_err(|err| io_error(request, err))?;
        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.text().map_err(|err| io_error(request, err))?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        debug!(method = %request.method, url = %request.url, status, elapsed_ms, "exchange complete");
        Ok(HttpResponse {
            status,
            headers,
            body,
            elapsed_ms,
        })
    }
}
