//! Hand-written collaborators for unit tests.

use crate::client::{BrowserFactory, BrowserId, Session};
use crate::config::ProxyEndpoint;
use crate::observer::Observer;
use crate::report::{Finding, ScriptResult};
use crate::scan::{ScanError, ScanListener, ScanTarget, Scanner};
use crate::transport::{Exchange, HttpRequest, HttpResponse, Transport, TransportError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub fn sample_exchange(url: &str, status: u16, body: &str) -> Exchange {
    Exchange {
        request: HttpRequest {
            method: "GET".to_string(),
            url: url.to_string(),
            headers: BTreeMap::new(),
            body: String::new(),
            break_requested: false,
        },
        response: HttpResponse {
            status,
            headers: BTreeMap::new(),
            body: body.to_string(),
            elapsed_ms: 3,
        },
    }
}

type ResultHook = Box<dyn Fn(&ScriptResult) + Send + Sync>;

#[derive(Default)]
pub struct RecordingObserver {
    results: Mutex<Vec<ScriptResult>>,
    updated: Mutex<Vec<ScriptResult>>,
    alerts: Mutex<Vec<Finding>>,
    action_failures: Mutex<Vec<Finding>>,
    assign_failures: Mutex<Vec<String>>,
    on_result_hook: Mutex<Option<ResultHook>>,
}

impl RecordingObserver {
    /// Runs `hook` after every recorded result, on the reporting thread.
    pub fn with_hook(hook: impl Fn(&ScriptResult) + Send + Sync + 'static) -> Self {
        let observer = Self::default();
        *observer.on_result_hook.lock() = Some(Box::new(hook));
        observer
    }

    pub fn results(&self) -> Vec<ScriptResult> {
        self.results.lock().clone()
    }

    pub fn updated(&self) -> Vec<ScriptResult> {
        self.updated.lock().clone()
    }

    pub fn alerts(&self) -> Vec<Finding> {
        self.alerts.lock().clone()
    }

    pub fn action_failures(&self) -> Vec<Finding> {
        self.action_failures.lock().clone()
    }

    pub fn assign_failures(&self) -> Vec<String> {
        self.assign_failures.lock().clone()
    }

    pub fn notifications(&self) -> usize {
        self.results.lock().len()
            + self.updated.lock().len()
            + self.alerts.lock().len()
            + self.action_failures.lock().len()
            + self.assign_failures.lock().len()
    }
}

impl Observer for RecordingObserver {
    fn on_result(&self, result: &ScriptResult) {
        self.results.lock().push(result.clone());
        if let Some(hook) = self.on_result_hook.lock().as_ref() {
            hook(result);
        }
    }

    fn on_action_failed(&self, finding: &Finding) {
        self.action_failures.lock().push(finding.clone());
    }

    fn on_assign_failed(&self, message: &str) {
        self.assign_failures.lock().push(message.to_string());
    }

    fn on_result_updated(&self, result: &ScriptResult) {
        self.updated.lock().push(result.clone());
    }

    fn on_alert(&self, finding: &Finding) {
        self.alerts.lock().push(finding.clone());
    }
}

/// Answers every request with `200 ok` unless a response was scripted for its url.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<BTreeMap<String, HttpResponse>>,
    failing: Mutex<Vec<String>>,
    sent: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn respond(self, url: &str, status: u16, body: &str) -> Self {
        self.responses.lock().insert(
            url.to_string(),
            HttpResponse {
                status,
                headers: BTreeMap::new(),
                body: body.to_string(),
                elapsed_ms: 2,
            },
        );
        self
    }

    pub fn fail_on(self, url: &str) -> Self {
        self.failing.lock().push(url.to_string());
        self
    }

    pub fn sent(&self) -> Vec<HttpRequest> {
        self.sent.lock().clone()
    }

    pub fn sent_urls(&self) -> Vec<String> {
        self.sent.lock().iter().map(|req| req.url.clone()).collect()
    }
}

impl Transport for FakeTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.sent.lock().push(request.clone());
        if self.failing.lock().contains(&request.url) {
            return Err(TransportError::Io {
                method: request.method.clone(),
                url: request.url.clone(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(self
            .responses
            .lock()
            .get(&request.url)
            .cloned()
            .unwrap_or(HttpResponse {
                status: 200,
                headers: BTreeMap::new(),
                body: "ok".to_string(),
                elapsed_ms: 1,
            }))
    }
}

/// Completes every scan on a background thread, raising the configured findings.
pub struct FakeScanner {
    findings: Vec<Finding>,
    completes: bool,
    delay: Option<Duration>,
    next_id: AtomicU32,
    targets: Mutex<Vec<ScanTarget>>,
}

impl FakeScanner {
    pub fn with_findings(findings: Vec<Finding>) -> Self {
        Self {
            findings,
            completes: true,
            delay: None,
            next_id: AtomicU32::new(1),
            targets: Mutex::new(Vec::new()),
        }
    }

    pub fn never_completes() -> Self {
        Self {
            completes: false,
            ..Self::with_findings(Vec::new())
        }
    }

    /// Reports back on its own thread only after `delay` has passed.
    pub fn completes_after(delay: Duration, findings: Vec<Finding>) -> Self {
        Self {
            delay: Some(delay),
            ..Self::with_findings(findings)
        }
    }

    pub fn targets(&self) -> Vec<ScanTarget> {
        self.targets.lock().clone()
    }
}

impl Scanner for FakeScanner {
    fn start(&self, target: ScanTarget, listener: Arc<dyn ScanListener>) -> Result<u32, ScanError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().push(target.clone());
        if !self.completes {
            return Ok(id);
        }

        let findings = self.findings.clone();
        let delay = self.delay;
        thread::spawn(move || {
            if let Some(delay) = delay {
                thread::sleep(delay);
            }
            let mut attack = target.exchange.clone();
            attack.request.url.push_str("'");
            listener.on_message_sent(&attack);
            for mut finding in findings {
                finding.source = Some(target.source.clone());
                listener.on_alert_found(finding);
            }
            listener.on_host_complete(id, "target");
            listener.on_scan_complete(id);
        });
        Ok(id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    pub browser: BrowserId,
    pub proxy: Option<ProxyEndpoint>,
    pub url: Option<String>,
}

#[derive(Default)]
pub struct FakeBrowserFactory {
    unavailable: bool,
    requests: Mutex<Vec<SessionRequest>>,
    log: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicUsize>,
}

impl FakeBrowserFactory {
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<SessionRequest> {
        self.requests.lock().clone()
    }

    /// Urls navigated to after launch, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter_map(|entry| entry.strip_prefix("navigate ").map(str::to_string))
            .collect()
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn session(&self) -> Box<dyn Session> {
        Box::new(FakeSession {
            log: self.log.clone(),
            closed: self.closed.clone(),
        })
    }
}

impl BrowserFactory for FakeBrowserFactory {
    fn get_session(
        &self,
        browser: BrowserId,
        proxy: Option<&ProxyEndpoint>,
        url: Option<&str>,
    ) -> Option<Box<dyn Session>> {
        self.requests.lock().push(SessionRequest {
            browser,
            proxy: proxy.cloned(),
            url: url.map(str::to_string),
        });
        (!self.unavailable).then(|| self.session())
    }
}

struct FakeSession {
    log: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicUsize>,
}

impl Session for FakeSession {
    fn navigate(&mut self, url: &str) -> Result<(), String> {
        self.log.lock().push(format!("navigate {url}"));
        Ok(())
    }

    fn click(&mut self, selector: &str) -> Result<(), String> {
        if selector.is_empty() {
            return Err("empty selector".to_string());
        }
        self.log.lock().push(format!("click {selector}"));
        Ok(())
    }

    fn send_keys(&mut self, selector: &str, value: &str) -> Result<(), String> {
        self.log.lock().push(format!("keys {selector}={value}"));
        Ok(())
    }

    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
