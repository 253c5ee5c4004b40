use crate::report::{Finding, ScriptResult};

/// Sink for everything a run reports. Calls are synchronous and may arrive on
/// scanner threads, hence the `Send + Sync` bound.
pub trait Observer: Send + Sync {
    fn on_result(&self, result: &ScriptResult);

    fn on_action_failed(&self, finding: &Finding);

    fn on_assign_failed(&self, message: &str);

    /// A previously reported result changed, e.g. after a scan raised findings.
    fn on_result_updated(&self, _result: &ScriptResult) {}

    /// A finding raised by the scanner during a scan action.
    fn on_alert(&self, _finding: &Finding) {}
}

/// Observer that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn on_result(&self, _result: &ScriptResult) {}

    fn on_action_failed(&self, _finding: &Finding) {}

    fn on_assign_failed(&self, _message: &str) {}
}
