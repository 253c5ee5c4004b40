use crate::failure::StepError;
use crate::script::{AssignKind, Location};
use crate::transport::HttpResponse;
use crate::variables::Variables;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;

/// Computes the value an assignment statement stores. Every failure here is an
/// assignment failure, which the runner reports and then moves past.
pub fn evaluate_assignment(
    kind: &AssignKind,
    last_response: Option<&HttpResponse>,
    vars: &Variables,
) -> Result<String, StepError> {
    match kind {
        AssignKind::Literal { value } => Ok(vars.substitute(value)),
        AssignKind::Delimiters {
            prefix,
            postfix,
            location,
        } => {
            let haystack = located(require_response(last_response)?, *location);
            let prefix = vars.substitute(prefix);
            let postfix = vars.substitute(postfix);
            let start = haystack.find(&prefix).ok_or_else(|| {
                StepError::Assignment(format!("failed to find prefix '{prefix}'"))
            })? + prefix.len();
            let len = haystack[start..].find(&postfix).ok_or_else(|| {
                StepError::Assignment(format!("failed to find postfix '{postfix}'"))
            })?;
            Ok(haystack[start..start + len].to_string())
        }
        AssignKind::Regex {
            pattern,
            group,
            location,
        } => {
            let haystack = located(require_response(last_response)?, *location);
            let regex = Regex::new(pattern).map_err(|err| {
                StepError::Assignment(format!("invalid regex '{pattern}': {err}"))
            })?;
            regex
                .captures(&haystack)
                .and_then(|caps| caps.get(*group))
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| {
                    StepError::Assignment(format!("regex '{pattern}' group {group} did not match"))
                })
        }
        AssignKind::XmlElement { tag } => {
            let response = require_response(last_response)?;
            first_element_text(&response.body, tag)?
                .ok_or_else(|| StepError::Assignment(format!("element <{tag}> not found")))
        }
        AssignKind::Replace {
            source,
            find,
            replacement,
        } => {
            let current = vars.lookup(source).ok_or_else(|| {
                StepError::Assignment(format!("variable '{source}' is not set"))
            })?;
            Ok(current.replace(&vars.substitute(find), &vars.substitute(replacement)))
        }
    }
}

fn require_response(last_response: Option<&HttpResponse>) -> Result<&HttpResponse, StepError> {
    last_response.ok_or_else(|| StepError::Assignment("no response to assign from".to_string()))
}

fn located(response: &HttpResponse, location: Location) -> String {
    match location {
        Location::Body => response.body.clone(),
        Location::Head => response.head(),
    }
}

fn first_element_text(body: &str, tag: &str) -> Result<Option<String>, StepError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut depth = 0usize;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                if depth > 0 {
                    depth += 1;
                } else if element.local_name().as_ref() == tag.as_bytes() {
                    depth = 1;
                }
            }
            Ok(Event::Empty(element)) => {
                if depth == 0 && element.local_name().as_ref() == tag.as_bytes() {
                    return Ok(Some(String::new()));
                }
            }
            Ok(Event::Text(content)) if depth > 0 => {
                let unescaped = content.unescape().map_err(|err| {
                    StepError::Assignment(format!("invalid text in <{tag}>: {err}"))
                })?;
                text.push_str(&unescaped);
            }
            Ok(Event::CData(content)) if depth > 0 => {
                text.push_str(&String::from_utf8_lossy(&content));
            }
            Ok(Event::End(_)) if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return Ok(Some(text));
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Ok(_) => {}
            Err(err) => {
                return Err(StepError::Assignment(format!(
                    "failed to parse response as xml at {}: {err}",
                    reader.buffer_position()
                )))
            }
        }
    }
}
