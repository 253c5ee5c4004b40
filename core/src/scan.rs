use crate::failure::StepError;
use crate::recorder::ResultRecorder;
use crate::report::{Finding, ResultRef, ResultType, ScriptResult, SCANNER_SEQUENCE_INDEX};
use crate::transport::Exchange;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// What a scan action hands to the scanner: the last recorded exchange only,
/// never its children.
#[derive(Debug, Clone)]
pub struct ScanTarget {
    pub source: ResultRef,
    pub exchange: Exchange,
    pub scan_children: bool,
}

/// Callbacks a scanner makes while it runs. They may arrive on any thread.
pub trait ScanListener: Send + Sync {
    fn on_host_complete(&self, scan_id: u32, host: &str);
    fn on_scan_complete(&self, scan_id: u32);
    fn on_alert_found(&self, finding: Finding);
    /// The scanner sent a request of its own.
    fn on_message_sent(&self, exchange: &Exchange);
}

/// Asynchronous vulnerability scanner. `start` returns as soon as the scan is
/// under way; completion is signalled through the listener.
pub trait Scanner: Send + Sync {
    fn start(&self, target: ScanTarget, listener: Arc<dyn ScanListener>) -> Result<u32, ScanError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("scanner failed to start: {0}")]
    Start(String),
}

/// Makes an asynchronous scan look synchronous to the statement that asked for it.
pub struct ScanBridge {
    scanner: Arc<dyn Scanner>,
    recorder: ResultRecorder,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl ScanBridge {
    pub fn new(
        scanner: Arc<dyn Scanner>,
        recorder: ResultRecorder,
        poll_interval: Duration,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            scanner,
            recorder,
            poll_interval,
            timeout,
        }
    }

    /// Scans the exchange behind `last` and blocks until the scanner reports
    /// completion. Returns the number of findings raised. When there were any,
    /// `last` is marked failed with the first finding's name.
    pub fn invoke_scan(
        &self,
        last: Option<(&mut ScriptResult, &Exchange)>,
    ) -> Result<usize, StepError> {
        let Some((result, exchange)) = last else {
            debug!("scan requested before any request was recorded");
            return Ok(0);
        };

        let listener = Arc::new(ScanProgress::new(self.recorder.clone()));
        listener.scanning.store(true, Ordering::SeqCst);

        let target = ScanTarget {
            source: result.reference(),
            exchange: exchange.clone(),
            scan_children: false,
        };
        let scan_id = self
            .scanner
            .start(target, listener.clone())
            .map_err(|err| StepError::action(err.to_string()))?;
        info!(scan_id, url = %result.url, "scan started");

        let started = Instant::now();
        while listener.scanning.load(Ordering::SeqCst) {
            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    warn!(scan_id, "scan did not complete in time");
                    listener.abandoned.store(true, Ordering::SeqCst);
                    return Err(StepError::action(format!(
                        "scan {scan_id} did not complete within {}ms",
                        limit.as_millis()
                    )));
                }
            }
            thread::sleep(self.poll_interval);
        }

        let findings = listener.take_findings();
        info!(scan_id, findings = findings.len(), "scan complete");
        if let Some(first) = findings.first() {
            result.fail(first.name.clone());
            self.recorder.observer().on_result_updated(result);
        }
        Ok(findings.len())
    }
}

struct ScanProgress {
    scanning: AtomicBool,
    /// Set once the bridge has stopped waiting. Callbacks after that belong
    /// to no statement and are dropped.
    abandoned: AtomicBool,
    findings: Mutex<Vec<Finding>>,
    recorder: ResultRecorder,
}

impl ScanProgress {
    fn new(recorder: ResultRecorder) -> Self {
        Self {
            scanning: AtomicBool::new(false),
            abandoned: AtomicBool::new(false),
            findings: Mutex::new(Vec::new()),
            recorder,
        }
    }

    fn take_findings(&self) -> Vec<Finding> {
        std::mem::take(&mut *self.findings.lock())
    }

    fn is_abandoned(&self, callback: &str) -> bool {
        let abandoned = self.abandoned.load(Ordering::SeqCst);
        if abandoned {
            debug!(callback, "dropping callback from an abandoned scan");
        }
        abandoned
    }
}

impl ScanListener for ScanProgress {
    fn on_host_complete(&self, scan_id: u32, host: &str) {
        debug!(scan_id, host, "host complete");
    }

    fn on_scan_complete(&self, scan_id: u32) {
        if self.is_abandoned("scan complete") {
            return;
        }
        debug!(scan_id, "scanner reported completion");
        self.scanning.store(false, Ordering::SeqCst);
    }

    fn on_alert_found(&self, finding: Finding) {
        if self.is_abandoned("alert found") {
            return;
        }
        self.recorder.observer().on_alert(&finding);
        self.findings.lock().push(finding);
    }

    fn on_message_sent(&self, exchange: &Exchange) {
        if self.is_abandoned("message sent") {
            return;
        }
        if let Err(err) =
            self.recorder
                .record(SCANNER_SEQUENCE_INDEX, ResultType::ScanAction, exchange, &[])
        {
            error!(error = %err, "failed to record scanner message");
        }
    }
}
