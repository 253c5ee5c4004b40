use regex::Regex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};
use vigil_core::{
    Confidence, Exchange, Finding, HttpRequest, Risk, ScanError, ScanListener, ScanTarget,
    Scanner, Transport,
};

const DIRECTORY_BROWSING_PLUGIN_ID: u32 = 10033;

/// Requests the directory containing the scanned url and reports a finding when
/// the server answers with an index page.
pub struct DirectoryListingScanner {
    transport: Arc<dyn Transport>,
    signatures: Arc<Vec<(Regex, &'static str)>>,
    next_id: AtomicU32,
}

impl DirectoryListingScanner {
    pub fn new(transport: Arc<dyn Transport>) -> Result<Self, regex::Error> {
        let signatures = vec![
            (Regex::new(r"(?ms)<title>Index of /[^<]+?</title>")?, "Apache 2"),
            (
                Regex::new(
                    r#"(?ms)<pre><A\s+HREF\s*=\s*"/[^>]*">\[To Parent Directory\]</A><br><br>"#,
                )?,
                "Microsoft IIS",
            ),
        ];
        Ok(Self {
            transport,
            signatures: Arc::new(signatures),
            next_id: AtomicU32::new(1),
        })
    }
}

impl Scanner for DirectoryListingScanner {
    fn start(&self, target: ScanTarget, listener: Arc<dyn ScanListener>) -> Result<u32, ScanError> {
        let scan_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let transport = self.transport.clone();
        let signatures = self.signatures.clone();

        thread::Builder::new()
            .name(format!("vigil-scan-{scan_id}"))
            .spawn(move || {
                let url = directory_url(&target.exchange.request.url);
                let listing_request = HttpRequest {
                    method: "GET".to_string(),
                    url: url.clone(),
                    headers: BTreeMap::new(),
                    body: String::new(),
                    break_requested: false,
                };
                debug!(scan_id, url = %url, "requesting parent directory");

                match transport.send(&listing_request) {
                    Ok(response) => {
                        let exchange = Exchange {
                            request: listing_request,
                            response,
                        };
                        listener.on_message_sent(&exchange);
                        if let Some((server, evidence)) =
                            detect_listing(&signatures, &exchange.response.body)
                        {
                            listener.on_alert_found(Finding {
                                plugin_id: DIRECTORY_BROWSING_PLUGIN_ID,
                                risk: Risk::Medium,
                                confidence: Confidence::Medium,
                                name: format!("Directory Browsing ({server})"),
                                evidence: Some(evidence),
                                source: Some(target.source.clone()),
                            });
                        }
                    }
                    Err(err) => warn!(scan_id, error = %err, "directory request failed"),
                }

                listener.on_host_complete(scan_id, host_of(&url));
                listener.on_scan_complete(scan_id);
            })
            .map_err(|err| ScanError::Start(err.to_string()))?;

        Ok(scan_id)
    }
}

/// First signature that matches wins.
fn detect_listing(
    signatures: &[(Regex, &'static str)],
    body: &str,
) -> Option<(&'static str, String)> {
    signatures.iter().find_map(|(pattern, server)| {
        pattern
            .find(body)
            .map(|found| (*server, found.as_str().to_string()))
    })
}

fn directory_url(url: &str) -> String {
    let base = url.split(|c: char| c == '?' || c == '#').next().unwrap_or(url);
    let path_start = base.find("://").map(|idx| idx + 3).unwrap_or(0);
    match base[path_start..].rfind('/') {
        Some(pos) => base[..path_start + pos + 1].to_string(),
        None => format!("{base}/"),
    }
}

fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    rest.split('/').next().unwrap_or(rest)
}
