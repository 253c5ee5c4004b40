use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Script {
    pub title: String,
    #[serde(default)]
    pub kind: ScriptKind,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default)]
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    #[default]
    Standalone,
    /// Passive scripts never issue requests of their own.
    Passive,
}

/// Ordered `(name, default)` pairs declared by a script.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct Parameters(pub Vec<(String, String)>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, default: impl Into<String>) -> Self {
        self.0.push((name.into(), default.into()));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(name, default)| (name.as_str(), default.as_str()))
    }

    /// Names whose default is empty and for which the caller supplied nothing.
    pub fn missing<'a>(&'a self, supplied: &BTreeMap<String, String>) -> Vec<&'a str> {
        self.iter()
            .filter(|(name, default)| default.is_empty() && !supplied.contains_key(*name))
            .map(|(name, _)| name)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Statement {
    Request(RequestStatement),
    Action(ActionStatement),
    Assertion(AssertionStatement),
    Assignment(AssignmentStatement),
    Client(ClientStatement),
}

impl Statement {
    pub fn index(&self) -> usize {
        match self {
            Statement::Request(stmt) => stmt.index,
            Statement::Action(stmt) => stmt.index,
            Statement::Assertion(stmt) => stmt.index,
            Statement::Assignment(stmt) => stmt.index,
            Statement::Client(stmt) => stmt.index,
        }
    }

    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::Request(_) => StatementKind::Request,
            Statement::Action(_) => StatementKind::Action,
            Statement::Assertion(_) => StatementKind::Assertion,
            Statement::Assignment(_) => StatementKind::Assignment,
            Statement::Client(_) => StatementKind::Client,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Request,
    Action,
    Assertion,
    Assignment,
    Client,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StatementKind::Request => "request",
            StatementKind::Action => "action",
            StatementKind::Assertion => "assertion",
            StatementKind::Assignment => "assignment",
            StatementKind::Client => "client",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestStatement {
    pub index: usize,
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionStatement {
    pub index: usize,
    #[serde(flatten)]
    pub kind: ActionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionKind {
    /// Actively scan the last recorded exchange.
    Scan,
    /// Ask the intercepting transport to break before the next request.
    Intercept,
    Fail {
        message: String,
        #[serde(default)]
        priority: Priority,
    },
    Print {
        message: String,
    },
    Sleep {
        millis: u64,
    },
    Invoke {
        script: String,
        #[serde(default)]
        variable: Option<String>,
        #[serde(default)]
        parameters: BTreeMap<String, String>,
    },
    SetGlobal {
        name: String,
        value: String,
    },
    RemoveGlobal {
        name: String,
    },
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Scan => "scan",
            ActionKind::Intercept => "intercept",
            ActionKind::Fail { .. } => "fail",
            ActionKind::Print { .. } => "print",
            ActionKind::Sleep { .. } => "sleep",
            ActionKind::Invoke { .. } => "invoke",
            ActionKind::SetGlobal { .. } => "set_global",
            ActionKind::RemoveGlobal { .. } => "remove_global",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Info,
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionStatement {
    pub index: usize,
    pub assertion: Assertion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Assertion {
    StatusCode {
        code: u16,
    },
    Length {
        length: usize,
        #[serde(default)]
        approx_percent: u32,
    },
    Regex {
        pattern: String,
        #[serde(default)]
        location: Location,
        #[serde(default)]
        inverse: bool,
    },
    ResponseTime {
        less_than_ms: u64,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    #[default]
    Body,
    Head,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentStatement {
    pub index: usize,
    pub variable: String,
    #[serde(flatten)]
    pub kind: AssignKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "assign", rename_all = "snake_case")]
pub enum AssignKind {
    Literal {
        value: String,
    },
    Delimiters {
        prefix: String,
        postfix: String,
        #[serde(default)]
        location: Location,
    },
    Regex {
        pattern: String,
        #[serde(default = "default_group")]
        group: usize,
        #[serde(default)]
        location: Location,
    },
    XmlElement {
        tag: String,
    },
    Replace {
        source: String,
        find: String,
        replacement: String,
    },
}

fn default_group() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientStatement {
    pub index: usize,
    #[serde(flatten)]
    pub kind: ClientKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "client", rename_all = "snake_case")]
pub enum ClientKind {
    Launch {
        window_handle: String,
        browser_type: String,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        headless: bool,
    },
    Navigate {
        window_handle: String,
        url: String,
    },
    Click {
        window_handle: String,
        selector: String,
    },
    SendKeys {
        window_handle: String,
        selector: String,
        value: String,
    },
    Close {
        window_handle: String,
    },
}

impl ClientKind {
    pub fn window_handle(&self) -> &str {
        match self {
            ClientKind::Launch { window_handle, .. }
            | ClientKind::Navigate { window_handle, .. }
            | ClientKind::Click { window_handle, .. }
            | ClientKind::SendKeys { window_handle, .. }
            | ClientKind::Close { window_handle } => window_handle,
        }
    }
}

impl Script {
    pub fn summary(&self) -> ScriptSummary {
        let mut summary = ScriptSummary {
            title: self.title.clone(),
            kind: self.kind,
            parameters: self
                .parameters
                .iter()
                .map(|(name, default)| ParameterSummary {
                    name: name.to_string(),
                    default: (!default.is_empty()).then(|| default.to_string()),
                })
                .collect(),
            requests: Vec::new(),
            actions: Vec::new(),
            assertions: 0,
            assignments: Vec::new(),
            clients: Vec::new(),
        };

        let mut seen_windows = HashSet::new();
        for statement in &self.statements {
            match statement {
                Statement::Request(request) => summary.requests.push(RequestSummary {
                    index: request.index,
                    method: request.method.clone(),
                    url: request.url.clone(),
                    assertions: request.assertions.len(),
                }),
                Statement::Action(action) => summary
                    .actions
                    .push(format!("#{} {}", action.index, action.kind.label())),
                Statement::Assertion(_) => summary.assertions += 1,
                Statement::Assignment(assign) => summary.assignments.push(assign.variable.clone()),
                Statement::Client(client) => {
                    let handle = client.kind.window_handle();
                    if seen_windows.insert(handle) {
                        summary.clients.push(handle.to_string());
                    }
                }
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptSummary {
    pub title: String,
    pub kind: ScriptKind,
    pub parameters: Vec<ParameterSummary>,
    pub requests: Vec<RequestSummary>,
    pub actions: Vec<String>,
    pub assertions: usize,
    pub assignments: Vec<String>,
    pub clients: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSummary {
    pub name: String,
    pub default: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSummary {
    pub index: usize,
    pub method: String,
    pub url: String,
    pub assertions: usize,
}

impl fmt::Display for ScriptSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Script: {} ({:?})", self.title, self.kind)?;

        if !self.parameters.is_empty() {
            writeln!(f, "Parameters:")?;
            for param in &self.parameters {
                match &param.default {
                    Some(default) => writeln!(f, "  - {} = {}", param.name, default)?,
                    None => writeln!(f, "  - {} (required)", param.name)?,
                }
            }
        }

        if self.requests.is_empty() {
            writeln!(f, "Requests: none")?;
        } else {
            writeln!(f, "Requests:")?;
            for request in &self.requests {
                writeln!(
                    f,
                    "  - #{} {} {} ({} assertion(s))",
                    request.index, request.method, request.url, request.assertions
                )?;
            }
        }

        if !self.actions.is_empty() {
            writeln!(f, "Actions: {}", self.actions.join(", "))?;
        }
        if self.assertions > 0 {
            writeln!(f, "Standalone assertions: {}", self.assertions)?;
        }
        if !self.assignments.is_empty() {
            writeln!(f, "Assigns: {}", self.assignments.join(", "))?;
        }
        if !self.clients.is_empty() {
            writeln!(f, "Client windows: {}", self.clients.join(", "))?;
        }
        Ok(())
    }
}
