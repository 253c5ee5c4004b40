use crate::failure::StepError;
use crate::observer::Observer;
use crate::report::{ResultType, ScriptResult};
use crate::script::{Assertion, Location};
use crate::transport::{Exchange, HttpResponse};
use regex::Regex;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;

/// Builds a [`ScriptResult`] for every completed exchange and hands it to the observer.
#[derive(Clone)]
pub struct ResultRecorder {
    observer: Arc<dyn Observer>,
}

impl ResultRecorder {
    pub fn new(observer: Arc<dyn Observer>) -> Self {
        Self { observer }
    }

    /// Evaluates `assertions` in order and stops at the first one that fails.
    /// An assertion that cannot be evaluated at all is returned as an error and
    /// nothing is reported.
    pub fn record(
        &self,
        index: i64,
        kind: ResultType,
        exchange: &Exchange,
        assertions: &[Assertion],
    ) -> Result<ScriptResult, StepError> {
        let mut result = ScriptResult {
            url: exchange.request.url.clone(),
            method: exchange.request.method.clone(),
            status_code: exchange.response.status,
            passed: true,
            message: None,
            index,
            kind,
            recorded_at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_else(|_| "unknown".to_string()),
            elapsed_ms: exchange.response.elapsed_ms,
        };

        for assertion in assertions {
            if let Some(failure) = evaluate(assertion, &exchange.response)? {
                result.fail(failure);
                break;
            }
        }

        debug!(
            url = %result.url,
            passed = result.passed,
            code = result.status_code,
            "recorded result"
        );
        self.observer.on_result(&result);
        Ok(result)
    }

    pub fn observer(&self) -> &Arc<dyn Observer> {
        &self.observer
    }
}

/// Returns `Ok(None)` when the assertion holds and `Ok(Some(reason))` when it does not.
pub fn evaluate(
    assertion: &Assertion,
    response: &HttpResponse,
) -> Result<Option<String>, StepError> {
    match assertion {
        Assertion::StatusCode { code } => Ok((response.status != *code).then(|| {
            format!(
                "Status code: expected {} but was {}",
                code, response.status
            )
        })),
        Assertion::Length {
            length,
            approx_percent,
        } => {
            let actual = response.body.len();
            let tolerance = length.saturating_mul(*approx_percent as usize) / 100;
            let delta = actual.abs_diff(*length);
            Ok((delta > tolerance).then(|| {
                format!(
                    "Length: expected {} (+/- {}%) but was {}",
                    length, approx_percent, actual
                )
            }))
        }
        Assertion::Regex {
            pattern,
            location,
            inverse,
        } => {
            let regex = Regex::new(pattern).map_err(|err| {
                StepError::Assertion(format!("invalid regex '{pattern}': {err}"))
            })?;
            let haystack = match location {
                Location::Body => response.body.clone(),
                Location::Head => response.head(),
            };
            let found = regex.is_match(&haystack);
            Ok((found == *inverse).then(|| {
                if *inverse {
                    format!("Regex: '{}' unexpectedly present in {:?}", pattern, location)
                } else {
                    format!("Regex: '{}' not found in {:?}", pattern, location)
                }
            }))
        }
        Assertion::ResponseTime { less_than_ms } => {
            Ok((response.elapsed_ms >= *less_than_ms).then(|| {
                format!(
                    "Response time: expected < {}ms but was {}ms",
                    less_than_ms, response.elapsed_ms
                )
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingObserver;
    use crate::transport::HttpRequest;
    use std::collections::BTreeMap;

    fn exchange(status: u16, body: &str) -> Exchange {
        let mut headers = BTreeMap::new();
        headers.insert("Server".to_string(), "nginx".to_string());
        Exchange {
            request: HttpRequest {
                method: "GET".to_string(),
                url: "http://target/login".to_string(),
                headers: BTreeMap::new(),
                body: String::new(),
                break_requested: false,
            },
            response: HttpResponse {
                status,
                headers,
                body: body.to_string(),
                elapsed_ms: 40,
            },
        }
    }

    #[test]
    fn result_without_assertions_passes() {
        let observer = Arc::new(RecordingObserver::default());
        let recorder = ResultRecorder::new(observer.clone());

        let result = recorder
            .record(1, ResultType::Ordinary, &exchange(500, ""), &[])
            .expect("recording succeeds");

        assert!(result.passed);
        assert_eq!(result.status_code, 500);
        assert_eq!(observer.results().len(), 1);
    }

    #[test]
    fn first_failing_assertion_wins() {
        let observer = Arc::new(RecordingObserver::default());
        let recorder = ResultRecorder::new(observer.clone());
        let assertions = vec![
            Assertion::StatusCode { code: 200 },
            Assertion::Regex {
                pattern: "welcome".to_string(),
                location: Location::Body,
                inverse: false,
            },
            Assertion::ResponseTime { less_than_ms: 10 },
        ];

        let result = recorder
            .record(2, ResultType::Ordinary, &exchange(200, "denied"), &assertions)
            .expect("recording succeeds");

        assert!(!result.passed);
        assert_eq!(
            result.message.as_deref(),
            Some("Regex: 'welcome' not found in Body")
        );
        assert_eq!(observer.results()[0], result);
    }

    #[test]
    fn invalid_regex_is_an_evaluation_error() {
        let observer = Arc::new(RecordingObserver::default());
        let recorder = ResultRecorder::new(observer.clone());
        let assertions = vec![Assertion::Regex {
            pattern: "(unclosed".to_string(),
            location: Location::Body,
            inverse: false,
        }];

        let err = recorder
            .record(3, ResultType::Ordinary, &exchange(200, ""), &assertions)
            .expect_err("evaluation must fail");

        assert!(matches!(err, StepError::Assertion(_)));
        assert!(observer.results().is_empty());
    }

    #[test]
    fn length_and_head_checks() {
        let response = exchange(200, "0123456789").response;
        let within = Assertion::Length {
            length: 11,
            approx_percent: 10,
        };
        assert_eq!(evaluate(&within, &response).expect("evaluates"), None);

        let outside = Assertion::Length {
            length: 20,
            approx_percent: 10,
        };
        assert!(evaluate(&outside, &response).expect("evaluates").is_some());

        let no_nginx = Assertion::Regex {
            pattern: "Server: nginx".to_string(),
            location: Location::Head,
            inverse: true,
        };
        assert!(evaluate(&no_nginx, &response).expect("evaluates").is_some());
    }
}
