use comfy_table::{presets::ASCII_FULL, Table};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};
use vigil_core::{Finding, Observer, ScriptResult};

/// Collects everything a run reports and echoes it to the log as it happens.
#[derive(Default)]
pub struct ConsoleObserver {
    results: Mutex<Vec<ScriptResult>>,
    findings: Mutex<Vec<Finding>>,
    assign_failures: Mutex<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub results: Vec<ScriptResult>,
    pub findings: Vec<Finding>,
    pub assign_failures: Vec<String>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        !self.findings.is_empty()
            || !self.assign_failures.is_empty()
            || self.results.iter().any(|result| !result.passed)
    }
}

impl ConsoleObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            results: self.results.lock().clone(),
            findings: self.findings.lock().clone(),
            assign_failures: self.assign_failures.lock().clone(),
        }
    }
}

impl Observer for ConsoleObserver {
    fn on_result(&self, result: &ScriptResult) {
        info!(
            index = result.index,
            method = %result.method,
            url = %result.url,
            status = result.status_code,
            passed = result.passed,
            "result"
        );
        self.results.lock().push(result.clone());
    }

    fn on_action_failed(&self, finding: &Finding) {
        warn!(risk = %finding.risk, name = %finding.name, "action failed");
        self.findings.lock().push(finding.clone());
    }

    fn on_assign_failed(&self, message: &str) {
        warn!(error = message, "assignment failed");
        self.assign_failures.lock().push(message.to_string());
    }

    fn on_result_updated(&self, result: &ScriptResult) {
        let mut results = self.results.lock();
        match results
            .iter_mut()
            .rev()
            .find(|existing| existing.index == result.index && existing.url == result.url)
        {
            Some(existing) => *existing = result.clone(),
            None => results.push(result.clone()),
        }
    }

    fn on_alert(&self, finding: &Finding) {
        warn!(risk = %finding.risk, name = %finding.name, "scanner raised an alert");
        self.findings.lock().push(finding.clone());
    }
}

impl RunReport {
    pub fn results_table(&self) -> String {
        let mut display = Table::new();
        display.load_preset(ASCII_FULL);
        display.set_header(vec!["#", "Method", "URL", "Status", "Result", "Message"]);

        for result in &self.results {
            let index = if result.index < 0 {
                "scan".to_string()
            } else {
                result.index.to_string()
            };
            display.add_row(vec![
                index,
                result.method.clone(),
                result.url.clone(),
                result.status_code.to_string(),
                if result.passed { "pass" } else { "FAIL" }.to_string(),
                result.message.clone().unwrap_or_default(),
            ]);
        }

        display.to_string()
    }

    pub fn findings_table(&self) -> String {
        let mut display = Table::new();
        display.load_preset(ASCII_FULL);
        display.set_header(vec!["Plugin", "Risk", "Confidence", "Name", "Source"]);

        for finding in &self.findings {
            display.add_row(vec![
                finding.plugin_id.to_string(),
                finding.risk.to_string(),
                finding.confidence.to_string(),
                finding.name.clone(),
                finding
                    .source
                    .as_ref()
                    .map(|source| format!("#{} {}", source.index, source.url))
                    .unwrap_or_default(),
            ]);
        }

        display.to_string()
    }
}
