use crate::config::ProxyEndpoint;
use crate::script::ClientKind;
use crate::variables::Variables;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Browsers the runner launches and manages itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrowserId {
    Firefox,
    FirefoxHeadless,
    Chrome,
    ChromeHeadless,
}

impl BrowserId {
    /// Case-insensitive lookup; `None` for browsers the runner does not manage.
    pub fn resolve(browser_type: &str, headless: bool) -> Option<Self> {
        if browser_type.eq_ignore_ascii_case("firefox") {
            Some(if headless {
                BrowserId::FirefoxHeadless
            } else {
                BrowserId::Firefox
            })
        } else if browser_type.eq_ignore_ascii_case("chrome") {
            Some(if headless {
                BrowserId::ChromeHeadless
            } else {
                BrowserId::Chrome
            })
        } else {
            None
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            BrowserId::Firefox => "firefox",
            BrowserId::FirefoxHeadless => "firefox-headless",
            BrowserId::Chrome => "chrome",
            BrowserId::ChromeHeadless => "chrome-headless",
        }
    }
}

impl fmt::Display for BrowserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("no browser session could be obtained for '{0}'")]
    Unavailable(String),
    #[error("no client session registered for window '{0}'")]
    UnknownWindow(String),
    #[error("client window '{handle}' failed: {reason}")]
    Session { handle: String, reason: String },
}

/// A live browser session driven by client statements.
pub trait Session: Send {
    fn navigate(&mut self, url: &str) -> Result<(), String>;
    fn click(&mut self, selector: &str) -> Result<(), String>;
    fn send_keys(&mut self, selector: &str, value: &str) -> Result<(), String>;
    fn close(&mut self);
}

pub trait BrowserFactory: Send + Sync {
    /// Returns a session bound to `proxy` when given, otherwise to the active
    /// intercepting transport. `url` is opened straight away when present.
    fn get_session(
        &self,
        browser: BrowserId,
        proxy: Option<&ProxyEndpoint>,
        url: Option<&str>,
    ) -> Option<Box<dyn Session>>;

    /// Fallback for browser types the runner does not manage.
    fn launch_unmanaged(
        &self,
        _browser_type: &str,
        _headless: bool,
        _url: Option<&str>,
    ) -> Option<Box<dyn Session>> {
        None
    }
}

/// Open sessions keyed by window handle, at most one per handle.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Box<dyn Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handle: &str, session: Box<dyn Session>) {
        if let Some(mut previous) = self.sessions.insert(handle.to_string(), session) {
            debug!(handle, "replacing existing client session");
            previous.close();
        }
    }

    pub fn get_mut(&mut self, handle: &str) -> Result<&mut Box<dyn Session>, ClientError> {
        self.sessions
            .get_mut(handle)
            .ok_or_else(|| ClientError::UnknownWindow(handle.to_string()))
    }

    pub fn close(&mut self, handle: &str) -> Result<(), ClientError> {
        let mut session = self
            .sessions
            .remove(handle)
            .ok_or_else(|| ClientError::UnknownWindow(handle.to_string()))?;
        session.close();
        Ok(())
    }

    pub fn close_all(&mut self) {
        for (handle, mut session) in self.sessions.drain() {
            debug!(handle = %handle, "closing client session");
            session.close();
        }
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.sessions.contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}

pub struct ClientLauncher {
    factory: Arc<dyn BrowserFactory>,
    proxy: Option<ProxyEndpoint>,
}

impl ClientLauncher {
    pub fn new(factory: Arc<dyn BrowserFactory>, proxy: Option<ProxyEndpoint>) -> Self {
        Self { factory, proxy }
    }

    /// Launches a managed browser. `Ok(None)` means the browser type is not one
    /// the runner manages and the caller should fall back to [`Self::handle`].
    pub fn launch_client(
        &self,
        window_handle: &str,
        browser_type: &str,
        url: Option<&str>,
        headless: bool,
        vars: &Variables,
        sessions: &mut SessionRegistry,
    ) -> Result<Option<String>, ClientError> {
        let Some(browser) = BrowserId::resolve(browser_type, headless) else {
            debug!(browser_type, "browser not managed by the runner");
            return Ok(None);
        };

        let url = url
            .filter(|url| !url.is_empty())
            .map(|url| vars.substitute(url));

        let session = match &self.proxy {
            Some(proxy) => {
                let mut session = self
                    .factory
                    .get_session(browser, Some(proxy), None)
                    .ok_or_else(|| ClientError::Unavailable(browser.to_string()))?;
                if let Some(url) = url.as_deref() {
                    session
                        .navigate(url)
                        .map_err(|reason| ClientError::Session {
                            handle: window_handle.to_string(),
                            reason,
                        })?;
                }
                session
            }
            None => self
                .factory
                .get_session(browser, None, url.as_deref())
                .ok_or_else(|| ClientError::Unavailable(browser.to_string()))?,
        };

        sessions.register(window_handle, session);
        info!(browser = %browser, window_handle, "browser launched");
        Ok(Some(window_handle.to_string()))
    }

    /// Default handling for every client statement the managed path did not take.
    pub fn handle(
        &self,
        kind: &ClientKind,
        vars: &Variables,
        sessions: &mut SessionRegistry,
    ) -> Result<String, ClientError> {
        let session_err = |handle: &str| {
            let handle = handle.to_string();
            move |reason: String| ClientError::Session { handle, reason }
        };

        match kind {
            ClientKind::Launch {
                window_handle,
                browser_type,
                url,
                headless,
            } => {
                let url = url.as_deref().map(|url| vars.substitute(url));
                let session = self
                    .factory
                    .launch_unmanaged(browser_type, *headless, url.as_deref())
                    .ok_or_else(|| ClientError::Unavailable(browser_type.clone()))?;
                sessions.register(window_handle, session);
                Ok(window_handle.clone())
            }
            ClientKind::Navigate { window_handle, url } => {
                let url = vars.substitute(url);
                sessions
                    .get_mut(window_handle)?
                    .navigate(&url)
                    .map_err(session_err(window_handle))?;
                Ok(window_handle.clone())
            }
            ClientKind::Click {
                window_handle,
                selector,
            } => {
                sessions
                    .get_mut(window_handle)?
                    .click(&vars.substitute(selector))
                    .map_err(session_err(window_handle))?;
                Ok(window_handle.clone())
            }
            ClientKind::SendKeys {
                window_handle,
                selector,
                value,
            } => {
                sessions
                    .get_mut(window_handle)?
                    .send_keys(&vars.substitute(selector), &vars.substitute(value))
                    .map_err(session_err(window_handle))?;
                Ok(window_handle.clone())
            }
            ClientKind::Close { window_handle } => {
                sessions.close(window_handle)?;
                Ok(window_handle.clone())
            }
        }
    }
}
