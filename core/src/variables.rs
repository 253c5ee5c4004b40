use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Run-local variable name the intercepting transport checks before each request.
pub const BREAK_VARIABLE_NAME: &str = "vigil.break";
pub const BREAK_VARIABLE_VALUE: &str = "set";

const LOGGED_VALUE_LIMIT: usize = 100;

/// Process-wide variables shared by every run. Only single-key reads and
/// writes are atomic; last write wins.
pub trait GlobalVariableStore: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&self, name: &str, value: &str);
    fn remove(&self, name: &str);
}

#[derive(Debug, Default)]
pub struct InMemoryGlobalStore {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryGlobalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<dyn GlobalVariableStore> {
        Arc::new(Self::new())
    }
}

impl GlobalVariableStore for InMemoryGlobalStore {
    fn get(&self, name: &str) -> Option<String> {
        self.values.read().get(name).cloned()
    }

    fn set(&self, name: &str, value: &str) {
        self.values
            .write()
            .insert(name.to_string(), value.to_string());
    }

    fn remove(&self, name: &str) {
        self.values.write().remove(name);
    }
}

/// Variables visible to one run: its own scope layered over the global store.
pub struct Variables {
    local: HashMap<String, String>,
    global: Arc<dyn GlobalVariableStore>,
}

impl Variables {
    pub fn new(global: Arc<dyn GlobalVariableStore>) -> Self {
        Self {
            local: HashMap::new(),
            global,
        }
    }

    pub fn get_local(&self, name: &str) -> Option<&str> {
        let value = self.local.get(name).map(String::as_str);
        debug!(name, value = %loggable(value), "get variable");
        value
    }

    pub fn set_local(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        debug!(name = %name, value = %loggable(Some(&value)), "set variable");
        self.local.insert(name, value);
    }

    /// Removes a run-local variable and hands back its value.
    pub fn take_local(&mut self, name: &str) -> Option<String> {
        let value = self.local.remove(name);
        if value.is_some() {
            debug!(name, "cleared variable");
        }
        value
    }

    pub fn get_global(&self, name: &str) -> Option<String> {
        self.global.get(name)
    }

    pub fn set_global(&self, name: &str, value: &str) {
        debug!(name, value = %loggable(Some(value)), "set global variable");
        self.global.set(name, value);
    }

    pub fn remove_global(&self, name: &str) {
        self.global.remove(name);
    }

    /// Local scope first, then the global store.
    pub fn lookup(&self, name: &str) -> Option<String> {
        match self.local.get(name) {
            Some(value) => Some(value.clone()),
            None => self.global.get(name),
        }
    }

    /// Replaces `{{name}}` placeholders. Unknown names are left untouched so a
    /// later layer can still resolve them.
    pub fn substitute(&self, value: &str) -> String {
        let mut result = String::with_capacity(value.len());
        let mut cursor = 0;

        while let Some(start_offset) = value[cursor..].find("{{") {
            let start_idx = cursor + start_offset;
            result.push_str(&value[cursor..start_idx]);

            let remainder = &value[start_idx + 2..];
            let Some(end_offset) = remainder.find("}}") else {
                result.push_str(&value[start_idx..]);
                return result;
            };
            let token = &remainder[..end_offset];
            let end_idx = start_idx + 2 + end_offset + 2;

            match self.lookup(token.trim()) {
                Some(replacement) => result.push_str(&replacement),
                None => result.push_str(&value[start_idx..end_idx]),
            }
            cursor = end_idx;
        }

        result.push_str(&value[cursor..]);
        result
    }
}

fn loggable(value: Option<&str>) -> String {
    match value {
        None => "<unset>".to_string(),
        Some(value) => {
            let flat = value.replace('\n', " ");
            if flat.chars().count() > LOGGED_VALUE_LIMIT {
                let head: String = flat.chars().take(LOGGED_VALUE_LIMIT).collect();
                format!("{head}...")
            } else {
                flat
            }
        }
    }
}
