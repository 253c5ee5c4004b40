pub mod assign;
pub mod client;
pub mod config;
pub mod engine;
pub mod failure;
pub mod observer;
pub mod recorder;
pub mod report;
pub mod runtime;
pub mod scan;
pub mod script;
pub mod transport;
pub mod validation;
pub mod variables;

#[cfg(test)]
mod testing;

pub use client::{
    BrowserFactory, BrowserId, ClientError, ClientLauncher, Session, SessionRegistry,
};
pub use config::{ProxyEndpoint, RunnerConfig};
pub use engine::{EngineError, ScriptEngine, ScriptEngineRegistry, ShellEngine};
pub use failure::{FailureKind, FailureTranslator, RunError, StepError, FAIL_ACTION_PLUGIN_ID};
pub use observer::{NullObserver, Observer};
pub use recorder::ResultRecorder;
pub use report::{
    Confidence, Finding, ResultRef, ResultType, Risk, ScriptResult, SCANNER_SEQUENCE_INDEX,
};
pub use runtime::{RunHandle, RunOutcome, RunState, Runner, RunnerBuilder};
pub use scan::{ScanBridge, ScanError, ScanListener, ScanTarget, Scanner};
pub use script::{
    ActionKind, ActionStatement, Assertion, AssertionStatement, AssignKind, AssignmentStatement,
    ClientKind, ClientStatement, Location, Parameters, Priority, RequestStatement, Script,
    ScriptKind, ScriptSummary, Statement, StatementKind,
};
pub use transport::{Exchange, HttpRequest, HttpResponse, Transport, TransportError};
pub use validation::{validate_script, Diagnostic, DiagnosticLevel};
pub use variables::{
    GlobalVariableStore, InMemoryGlobalStore, Variables, BREAK_VARIABLE_NAME,
    BREAK_VARIABLE_VALUE,
};
