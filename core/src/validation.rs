use crate::script::{ActionKind, Assertion, AssignKind, ClientKind, Script, Statement};
use crate::variables::BREAK_VARIABLE_NAME;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub location: Option<String>,
    pub message: String,
}

impl Diagnostic {
    fn error(location: Option<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            location,
            message: message.into(),
        }
    }

    fn warning(location: Option<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            location,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.level, DiagnosticLevel::Error)
    }
}

/// Static checks over a script. Nothing here touches the network.
pub fn validate_script(script: &Script) -> Vec<Diagnostic> {
    let mut ctx = ValidationContext::new();

    ctx.push("parameters".to_string());
    for (name, _) in script.parameters.iter() {
        if name.trim().is_empty() {
            ctx.error("parameter name cannot be empty");
        }
    }
    ctx.pop();

    validate_statements(&script.statements, &mut ctx);
    ctx.finish()
}

struct ValidationContext {
    stack: Vec<String>,
    diagnostics: Vec<Diagnostic>,
    open_windows: HashSet<String>,
}

impl ValidationContext {
    fn new() -> Self {
        Self {
            stack: Vec::new(),
            diagnostics: Vec::new(),
            open_windows: HashSet::new(),
        }
    }

    fn push(&mut self, label: String) {
        self.stack.push(label);
    }

    fn pop(&mut self) {
        self.stack.pop();
    }

    fn location(&self) -> Option<String> {
        if self.stack.is_empty() {
            None
        } else {
            Some(self.stack.join(" > "))
        }
    }

    fn error(&mut self, message: impl Into<String>) {
        let diag = Diagnostic::error(self.location(), message);
        self.diagnostics.push(diag);
    }

    fn warning(&mut self, message: impl Into<String>) {
        let diag = Diagnostic::warning(self.location(), message);
        self.diagnostics.push(diag);
    }

    fn finish(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

fn validate_statements(statements: &[Statement], ctx: &mut ValidationContext) {
    for statement in statements {
        ctx.push(format!("{} #{}", statement.kind(), statement.index()));
        match statement {
            Statement::Request(request) => {
                if request.url.trim().is_empty() {
                    ctx.error("request url cannot be empty");
                }
                for assertion in &request.assertions {
                    validate_assertion(assertion, ctx);
                }
            }
            Statement::Action(action) => {
                if let ActionKind::Invoke { script, .. } = &action.kind {
                    if script.trim().is_empty() {
                        ctx.error("invoke action requires a script path");
                    }
                }
            }
            Statement::Assertion(statement) => validate_assertion(&statement.assertion, ctx),
            Statement::Assignment(assign) => {
                if assign.variable == BREAK_VARIABLE_NAME {
                    ctx.warning(format!(
                        "'{}' is reserved for intercept actions; assigning it forces a break",
                        BREAK_VARIABLE_NAME
                    ));
                }
                if let AssignKind::Regex { pattern, .. } = &assign.kind {
                    check_regex(pattern, ctx);
                }
            }
            Statement::Client(client) => validate_client(&client.kind, ctx),
        }
        ctx.pop();
    }
}

fn validate_assertion(assertion: &Assertion, ctx: &mut ValidationContext) {
    if let Assertion::Regex { pattern, .. } = assertion {
        check_regex(pattern, ctx);
    }
}

fn check_regex(pattern: &str, ctx: &mut ValidationContext) {
    if let Err(err) = Regex::new(pattern) {
        ctx.error(format!("invalid regex '{}': {}", pattern, err));
    }
}

fn validate_client(kind: &ClientKind, ctx: &mut ValidationContext) {
    let handle = kind.window_handle().to_string();
    match kind {
        ClientKind::Launch { .. } => {
            if handle.trim().is_empty() {
                ctx.error("window handle cannot be empty");
            }
            if !ctx.open_windows.insert(handle.clone()) {
                ctx.warning(format!(
                    "window '{}' is already open; launching again replaces it",
                    handle
                ));
            }
        }
        ClientKind::Close { .. } => {
            if !ctx.open_windows.remove(&handle) {
                ctx.error(format!("window '{}' is not open", handle));
            }
        }
        _ => {
            if !ctx.open_windows.contains(&handle) {
                ctx.error(format!("window '{}' is not open", handle));
            }
        }
    }
}
