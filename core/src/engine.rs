use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no script engine registered for '{0}'")]
    NotFound(String),
    #[error("invalid interpreter command '{command}': {reason}")]
    InvalidCommand { command: String, reason: String },
    #[error("failed to execute '{script}': {reason}")]
    Spawn { script: String, reason: String },
    #[error("'{script}' exited with code {code:?}: {stderr}")]
    Exit {
        script: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Runs an embedded sub-script and returns what it printed.
pub trait ScriptEngine: Send + Sync {
    fn name(&self) -> &str;
    fn eval(&self, script: &Path, params: &BTreeMap<String, String>) -> Result<String, EngineError>;
}

#[derive(Default, Clone)]
pub struct ScriptEngineRegistry {
    engines: HashMap<String, Arc<dyn ScriptEngine>>,
    extensions: HashMap<String, String>,
}

impl ScriptEngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a `sh` engine bound to `.sh` files.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ShellEngine::new("sh", "sh")), &["sh"]);
        registry
    }

    pub fn register(&mut self, engine: Arc<dyn ScriptEngine>, extensions: &[&str]) {
        let name = engine.name().to_string();
        for ext in extensions {
            self.extensions
                .insert(ext.trim_start_matches('.').to_ascii_lowercase(), name.clone());
        }
        self.engines.insert(name, engine);
    }

    pub fn get_engine(&self, name: &str) -> Option<Arc<dyn ScriptEngine>> {
        self.engines.get(name).cloned()
    }

    pub fn engine_for_extension(&self, ext: &str) -> Option<Arc<dyn ScriptEngine>> {
        self.extensions
            .get(&ext.trim_start_matches('.').to_ascii_lowercase())
            .and_then(|name| self.get_engine(name))
    }

    /// Picks the engine for `script` from its file extension.
    pub fn engine_for_script(&self, script: &Path) -> Result<Arc<dyn ScriptEngine>, EngineError> {
        script
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.engine_for_extension(ext))
            .ok_or_else(|| EngineError::NotFound(script.display().to_string()))
    }
}

/// Hands the script file to an interpreter command line. Parameters are
/// exported as environment variables.
#[derive(Debug, Clone)]
pub struct ShellEngine {
    name: String,
    interpreter: String,
}

impl ShellEngine {
    pub fn new(name: impl Into<String>, interpreter: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interpreter: interpreter.into(),
        }
    }
}

impl ScriptEngine for ShellEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn eval(&self, script: &Path, params: &BTreeMap<String, String>) -> Result<String, EngineError> {
        let mut words =
            shell_words::split(&self.interpreter).map_err(|err| EngineError::InvalidCommand {
                command: self.interpreter.clone(),
                reason: err.to_string(),
            })?;
        if words.is_empty() {
            return Err(EngineError::InvalidCommand {
                command: self.interpreter.clone(),
                reason: "interpreter produced no executable".to_string(),
            });
        }

        let program = words.remove(0);
        let mut cmd = Command::new(&program);
        cmd.args(&words).arg(script).envs(params);

        debug!(engine = %self.name, script = %script.display(), "invoking script");
        let output = cmd.output().map_err(|err| EngineError::Spawn {
            script: script.display().to_string(),
            reason: err.to_string(),
        })?;

        if !output.status.success() {
            return Err(EngineError::Exit {
                script: script.display().to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
