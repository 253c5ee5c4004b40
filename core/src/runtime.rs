use crate::assign::evaluate_assignment;
use crate::client::{BrowserFactory, ClientError, ClientLauncher, SessionRegistry};
use crate::config::RunnerConfig;
use crate::engine::ScriptEngineRegistry;
use crate::failure::{FailureTranslator, RunError, StepError};
use crate::observer::Observer;
use crate::recorder::{self, ResultRecorder};
use crate::report::{ResultType, ScriptResult};
use crate::scan::{ScanBridge, Scanner};
use crate::script::{
    ActionKind, ActionStatement, AssertionStatement, AssignmentStatement, ClientKind,
    ClientStatement, RequestStatement, Script, ScriptKind, Statement,
};
use crate::transport::{Exchange, HttpRequest, Transport, TransportError};
use crate::variables::{
    GlobalVariableStore, InMemoryGlobalStore, Variables, BREAK_VARIABLE_NAME,
    BREAK_VARIABLE_VALUE,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Running,
    Paused,
    Completed,
    Stopped,
}

/// How a run ended when it did not end in a fatal error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Required parameters were missing; nothing ran. Call again with values for them.
    NeedsParameters { missing: Vec<String> },
    Completed { output: String },
    Stopped,
}

impl RunOutcome {
    /// Empty for a parameter request, `None` for a stopped run.
    pub fn output(&self) -> Option<&str> {
        match self {
            RunOutcome::NeedsParameters { .. } => Some(""),
            RunOutcome::Completed { output } => Some(output),
            RunOutcome::Stopped => None,
        }
    }
}

#[derive(Debug)]
struct RunControl {
    paused: AtomicBool,
    stopped: AtomicBool,
    state: Mutex<RunState>,
}

/// Pause/resume/stop controls for a runner, usable from any thread.
#[derive(Debug, Clone)]
pub struct RunHandle {
    control: Arc<RunControl>,
}

impl Default for RunHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl RunHandle {
    pub fn new() -> Self {
        Self {
            control: Arc::new(RunControl {
                paused: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                state: Mutex::new(RunState::Idle),
            }),
        }
    }

    pub fn pause(&self) {
        self.control.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.control.paused.store(false, Ordering::SeqCst);
    }

    /// Stops the run at the next statement boundary. Requests and scans already
    /// in flight finish on their own. A stopped runner stays stopped.
    pub fn stop(&self) {
        self.control.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.control.paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.control.stopped.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> RunState {
        *self.control.state.lock()
    }

    fn set_state(&self, state: RunState) {
        *self.control.state.lock() = state;
    }
}

pub struct Runner {
    config: RunnerConfig,
    transport: Arc<dyn Transport>,
    observer: Arc<dyn Observer>,
    globals: Arc<dyn GlobalVariableStore>,
    scanner: Option<Arc<dyn Scanner>>,
    browsers: Option<Arc<dyn BrowserFactory>>,
    engines: ScriptEngineRegistry,
    handle: RunHandle,
    output_writer: Mutex<Option<Box<dyn Write + Send>>>,
    translator: FailureTranslator,
}

pub struct RunnerBuilder {
    config: RunnerConfig,
    transport: Arc<dyn Transport>,
    observer: Arc<dyn Observer>,
    globals: Option<Arc<dyn GlobalVariableStore>>,
    scanner: Option<Arc<dyn Scanner>>,
    browsers: Option<Arc<dyn BrowserFactory>>,
    engines: Option<ScriptEngineRegistry>,
    handle: Option<RunHandle>,
    output_writer: Option<Box<dyn Write + Send>>,
}

impl RunnerBuilder {
    pub fn config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn globals(mut self, globals: Arc<dyn GlobalVariableStore>) -> Self {
        self.globals = Some(globals);
        self
    }

    pub fn scanner(mut self, scanner: Arc<dyn Scanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    pub fn browsers(mut self, browsers: Arc<dyn BrowserFactory>) -> Self {
        self.browsers = Some(browsers);
        self
    }

    pub fn engines(mut self, engines: ScriptEngineRegistry) -> Self {
        self.engines = Some(engines);
        self
    }

    /// Shares controls created before the runner, e.g. by a UI.
    pub fn with_handle(mut self, handle: RunHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn output_writer(mut self, writer: Box<dyn Write + Send>) -> Self {
        self.output_writer = Some(writer);
        self
    }

    pub fn build(self) -> Runner {
        Runner {
            config: self.config,
            transport: self.transport,
            observer: self.observer,
            globals: self.globals.unwrap_or_else(InMemoryGlobalStore::shared),
            scanner: self.scanner,
            browsers: self.browsers,
            engines: self
                .engines
                .unwrap_or_else(ScriptEngineRegistry::with_defaults),
            handle: self.handle.unwrap_or_default(),
            output_writer: Mutex::new(self.output_writer),
            translator: FailureTranslator,
        }
    }
}

/// The last exchange a request statement produced, with its result.
struct LastExchange {
    result: ScriptResult,
    exchange: Exchange,
}

/// Everything that lives exactly as long as one run.
struct RunContext {
    kind: ScriptKind,
    vars: Variables,
    recorder: ResultRecorder,
    launcher: Option<ClientLauncher>,
    sessions: SessionRegistry,
    last: Option<LastExchange>,
    output: String,
}

impl Runner {
    pub fn builder(transport: Arc<dyn Transport>, observer: Arc<dyn Observer>) -> RunnerBuilder {
        RunnerBuilder {
            config: RunnerConfig::default(),
            transport,
            observer,
            globals: None,
            scanner: None,
            browsers: None,
            engines: None,
            handle: None,
            output_writer: None,
        }
    }

    pub fn handle(&self) -> RunHandle {
        self.handle.clone()
    }

    pub fn pause(&self) {
        self.handle.pause();
    }

    pub fn resume(&self) {
        self.handle.resume();
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn is_paused(&self) -> bool {
        self.handle.is_paused()
    }

    pub fn is_stopped(&self) -> bool {
        self.handle.is_stopped()
    }

    pub fn state(&self) -> RunState {
        self.handle.state()
    }

    pub fn set_output_writer(&self, writer: Box<dyn Write + Send>) {
        *self.output_writer.lock() = Some(writer);
    }

    pub fn has_output_writer(&self) -> bool {
        self.output_writer.lock().is_some()
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Runs `script` to completion, to a stop request, or to its first fatal failure.
    pub fn run(
        &self,
        script: &Script,
        params: &BTreeMap<String, String>,
    ) -> Result<RunOutcome, RunError> {
        info!(title = %script.title, "running script");

        let missing = script.parameters.missing(params);
        if !missing.is_empty() {
            info!(missing = ?missing, "script needs parameters");
            return Ok(RunOutcome::NeedsParameters {
                missing: missing.into_iter().map(str::to_string).collect(),
            });
        }

        let mut ctx = self.new_context(script, params);
        self.handle.set_state(RunState::Running);

        let outcome = self.execute_statements(&script.statements, &mut ctx);
        ctx.sessions.close_all();

        self.handle.set_state(match outcome {
            Ok(RunOutcome::Stopped) => RunState::Stopped,
            _ => RunState::Completed,
        });
        match &outcome {
            Ok(RunOutcome::Stopped) => info!(title = %script.title, "script stopped"),
            Ok(_) => info!(title = %script.title, "script completed"),
            Err(err) => warn!(title = %script.title, error = %err, "script aborted"),
        }
        outcome
    }

    fn new_context(&self, script: &Script, params: &BTreeMap<String, String>) -> RunContext {
        let mut vars = Variables::new(self.globals.clone());
        for (name, default) in script.parameters.iter() {
            let value = params.get(name).map(String::as_str).unwrap_or(default);
            vars.set_local(name, value);
        }
        for (name, value) in params {
            if vars.get_local(name).is_none() {
                vars.set_local(name.clone(), value.clone());
            }
        }

        RunContext {
            kind: script.kind,
            vars,
            recorder: ResultRecorder::new(self.observer.clone()),
            launcher: self
                .browsers
                .as_ref()
                .map(|factory| ClientLauncher::new(factory.clone(), self.config.proxy_endpoint())),
            sessions: SessionRegistry::new(),
            last: None,
            output: String::new(),
        }
    }

    fn execute_statements(
        &self,
        statements: &[Statement],
        ctx: &mut RunContext,
    ) -> Result<RunOutcome, RunError> {
        for statement in statements {
            if !self.wait_at_boundary() {
                return Ok(RunOutcome::Stopped);
            }

            if self.config.debug {
                info!(index = statement.index(), kind = %statement.kind(), "run statement");
            } else {
                debug!(index = statement.index(), kind = %statement.kind(), "run statement");
            }

            let result = self.run_statement(statement, ctx).or_else(|err| {
                if err.kind().is_recoverable() {
                    self.report_recoverable(ctx, err)
                } else {
                    Err(err)
                }
            });
            if let Err(err) = result {
                return Err(RunError {
                    index: statement.index(),
                    statement: statement.kind(),
                    source: err,
                });
            }
        }

        Ok(RunOutcome::Completed {
            output: std::mem::take(&mut ctx.output),
        })
    }

    /// Returns `false` once the run has been stopped. Blocks while paused.
    fn wait_at_boundary(&self) -> bool {
        let mut waited = false;
        loop {
            if self.handle.is_stopped() {
                return false;
            }
            if !self.handle.is_paused() {
                if waited {
                    debug!("run resumed");
                    self.handle.set_state(RunState::Running);
                }
                return true;
            }
            if !waited {
                debug!("run paused");
                self.handle.set_state(RunState::Paused);
                waited = true;
            }
            thread::sleep(self.config.pause_poll_interval());
        }
    }

    fn run_statement(&self, statement: &Statement, ctx: &mut RunContext) -> Result<(), StepError> {
        match statement {
            Statement::Request(request) => self.handle_request(request, ctx),
            Statement::Action(action) => self.handle_action(action, ctx),
            Statement::Assertion(assertion) => self.handle_assertion(assertion, ctx),
            Statement::Assignment(assign) => self.handle_assignment(assign, ctx),
            Statement::Client(client) => self.handle_client(client, ctx),
        }
    }

    /// Reports an action or assignment failure. Any other error is handed back
    /// untouched so the caller ends the run with it.
    fn report_recoverable(&self, ctx: &mut RunContext, err: StepError) -> Result<(), StepError> {
        let message = err.to_string();
        match err {
            StepError::Action { priority, .. } => {
                debug!(error = %message, "action failed");
                let source = ctx.last.as_ref().map(|last| last.result.reference());
                let finding = self.translator.action_finding(&message, priority, source);
                self.observer.on_action_failed(&finding);
            }
            StepError::Assignment(_) => {
                debug!(error = %message, "assignment failed");
                self.observer.on_assign_failed(&message);
            }
            fatal @ (StepError::Assertion(_) | StepError::Client(_) | StepError::Transport(_)) => {
                return Err(fatal)
            }
        }

        // Passive scripts make no requests, so their last result is not theirs to fail.
        if ctx.kind != ScriptKind::Passive {
            if let Some(last) = ctx.last.as_mut() {
                last.result.fail(message);
                self.observer.on_result_updated(&last.result);
            }
        }
        Ok(())
    }

    fn handle_request(
        &self,
        request: &RequestStatement,
        ctx: &mut RunContext,
    ) -> Result<(), StepError> {
        let outgoing = HttpRequest {
            method: request.method.clone(),
            url: ctx.vars.substitute(&request.url),
            headers: request
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), ctx.vars.substitute(value)))
                .collect(),
            body: ctx.vars.substitute(&request.body),
            break_requested: ctx.vars.take_local(BREAK_VARIABLE_NAME).as_deref()
                == Some(BREAK_VARIABLE_VALUE),
        };
        if outgoing.break_requested {
            debug!(url = %outgoing.url, "break requested for this request");
        }
        if outgoing.url.trim().is_empty() {
            return Err(TransportError::MissingUrl.into());
        }

        let response = self.transport.send(&outgoing)?;
        let exchange = Exchange {
            request: outgoing,
            response,
        };
        let result = ctx.recorder.record(
            request.index as i64,
            ResultType::Ordinary,
            &exchange,
            &request.assertions,
        )?;
        ctx.last = Some(LastExchange { result, exchange });
        Ok(())
    }

    fn handle_action(
        &self,
        action: &ActionStatement,
        ctx: &mut RunContext,
    ) -> Result<(), StepError> {
        debug!(index = action.index, action = action.kind.label(), "handle action");
        match &action.kind {
            ActionKind::Scan => {
                let scanner = self
                    .scanner
                    .clone()
                    .ok_or_else(|| StepError::action("no scanner is configured"))?;
                let bridge = ScanBridge::new(
                    scanner,
                    ctx.recorder.clone(),
                    self.config.scan_poll_interval(),
                    self.config.scan_timeout(),
                );
                let last = ctx
                    .last
                    .as_mut()
                    .map(|last| (&mut last.result, &last.exchange));
                bridge.invoke_scan(last)?;
            }
            ActionKind::Intercept => {
                ctx.vars.set_local(BREAK_VARIABLE_NAME, BREAK_VARIABLE_VALUE);
            }
            ActionKind::Fail { message, priority } => {
                return Err(StepError::Action {
                    message: ctx.vars.substitute(message),
                    priority: Some(*priority),
                });
            }
            ActionKind::Print { message } => {
                let line = ctx.vars.substitute(message);
                if let Some(writer) = self.output_writer.lock().as_mut() {
                    if let Err(err) = writeln!(writer, "{line}") {
                        warn!(error = %err, "failed to write script output");
                    }
                }
                ctx.output.push_str(&line);
                ctx.output.push('\n');
            }
            ActionKind::Sleep { millis } => thread::sleep(Duration::from_millis(*millis)),
            ActionKind::Invoke {
                script,
                variable,
                parameters,
            } => {
                let path = ctx.vars.substitute(script);
                let engine = self
                    .engines
                    .engine_for_script(Path::new(&path))
                    .map_err(|err| StepError::action(err.to_string()))?;
                let params: BTreeMap<String, String> = parameters
                    .iter()
                    .map(|(name, value)| (name.clone(), ctx.vars.substitute(value)))
                    .collect();
                let output = engine
                    .eval(Path::new(&path), &params)
                    .map_err(|err| StepError::action(err.to_string()))?;
                if let Some(variable) = variable {
                    ctx.vars.set_local(variable.clone(), output);
                }
            }
            ActionKind::SetGlobal { name, value } => {
                let value = ctx.vars.substitute(value);
                ctx.vars.set_global(name, &value);
            }
            ActionKind::RemoveGlobal { name } => ctx.vars.remove_global(name),
        }
        Ok(())
    }

    fn handle_assertion(
        &self,
        statement: &AssertionStatement,
        ctx: &mut RunContext,
    ) -> Result<(), StepError> {
        let response = ctx
            .last
            .as_ref()
            .map(|last| &last.exchange.response)
            .ok_or_else(|| StepError::Assertion("no response to assert on".to_string()))?;
        match recorder::evaluate(&statement.assertion, response)? {
            Some(failure) => Err(StepError::Assertion(failure)),
            None => Ok(()),
        }
    }

    fn handle_assignment(
        &self,
        assign: &AssignmentStatement,
        ctx: &mut RunContext,
    ) -> Result<(), StepError> {
        let response = ctx.last.as_ref().map(|last| &last.exchange.response);
        let value = evaluate_assignment(&assign.kind, response, &ctx.vars)?;
        ctx.vars.set_local(assign.variable.clone(), value);
        Ok(())
    }

    fn handle_client(
        &self,
        client: &ClientStatement,
        ctx: &mut RunContext,
    ) -> Result<(), StepError> {
        let launcher = ctx.launcher.as_ref().ok_or_else(|| {
            ClientError::Unavailable("no browser factory is configured".to_string())
        })?;

        if let ClientKind::Launch {
            window_handle,
            browser_type,
            url,
            headless,
        } = &client.kind
        {
            let launched = launcher.launch_client(
                window_handle,
                browser_type,
                url.as_deref(),
                *headless,
                &ctx.vars,
                &mut ctx.sessions,
            )?;
            if launched.is_some() {
                return Ok(());
            }
        }

        launcher.handle(&client.kind, &ctx.vars, &mut ctx.sessions)?;
        Ok(())
    }
}
