//! Browser automation seams.
//!
//! A [`Backend`] launches a [`BrowsingContext`], the exclusive handle to one
//! live browser. Two backends exist:
//! - `CdpBackend`: Chromium driven directly over CDP with stealth patches
//! - `WebDriverBackend`: Chromium driven by chromedriver (feature `webdriver`)

pub mod cdp;
pub mod stealth;
#[cfg(feature = "webdriver")]
pub mod webdriver;

#[cfg(test)]
pub(crate) mod fake;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::{sleep, Instant};

use crate::config::RunConfig;
use crate::error::{Result, ScrapeError};
use crate::session::SessionCookie;

/// How an element is located in the rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locator {
    Css(String),
    Xpath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::Xpath(expr.into())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css={}", s),
            Self::Xpath(s) => write!(f, "xpath={}", s),
        }
    }
}

/// Which automation driver a backend uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Chromium over CDP with stealth patches, tried first
    Stealth,
    /// Chromium over WebDriver (chromedriver)
    Standard,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stealth => f.write_str("stealth"),
            Self::Standard => f.write_str("standard"),
        }
    }
}

/// One live browser session. Only one exists at a time; callers must `quit`
/// it on every exit path.
#[async_trait]
pub trait BrowsingContext: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;

    async fn refresh(&mut self) -> Result<()>;

    /// Evaluate a JavaScript expression and return its JSON value.
    async fn evaluate(&mut self, expression: &str) -> Result<Value>;

    async fn get_cookies(&mut self) -> Result<Vec<SessionCookie>>;
    async fn add_cookie(&mut self, cookie: &SessionCookie) -> Result<()>;
    async fn delete_all_cookies(&mut self) -> Result<()>;

    /// Fails with [`ScrapeError::ElementNotFound`] when nothing matches.
    async fn find_element(&mut self, locator: &Locator) -> Result<()>;
    async fn click(&mut self, locator: &Locator) -> Result<()>;
    /// Clear the field and type `text` into it.
    async fn fill(&mut self, locator: &Locator, text: &str) -> Result<()>;

    async fn page_source(&mut self) -> Result<String>;
    async fn title(&mut self) -> Result<String>;

    /// Terminate the browser session and any driver process behind it.
    async fn quit(&mut self) -> Result<()>;
}

/// A way of launching a configured browsing context.
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn launch(&self, config: &RunConfig) -> Result<Box<dyn BrowsingContext>>;
}

/// The fixed preference order: stealth first, standard second.
pub fn default_backends() -> Vec<Box<dyn Backend>> {
    let mut backends: Vec<Box<dyn Backend>> = vec![Box::new(cdp::CdpBackend)];
    #[cfg(feature = "webdriver")]
    backends.push(Box::new(webdriver::WebDriverBackend));
    backends
}

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Poll until `locator` is present or `timeout` elapses.
pub async fn wait_for_element(
    ctx: &mut dyn BrowsingContext,
    locator: &Locator,
    timeout: Duration,
) -> Result<()> {
    let started = Instant::now();
    loop {
        match ctx.find_element(locator).await {
            Ok(()) => return Ok(()),
            Err(ScrapeError::ElementNotFound(_)) => {}
            Err(e) => tracing::debug!("probe for {} failed: {}", locator, e),
        }
        if started.elapsed() >= timeout {
            return Err(ScrapeError::timeout(locator.to_string(), timeout));
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Poll until the document reports `readyState == "complete"` and has a body.
pub async fn wait_for_ready(
    ctx: &mut dyn BrowsingContext,
    timeout: Duration,
    poll: Duration,
) -> Result<()> {
    let body = Locator::css("body");
    let started = Instant::now();
    loop {
        let ready = matches!(
            ctx.evaluate("document.readyState").await,
            Ok(Value::String(ref state)) if state == "complete"
        );
        if ready && ctx.find_element(&body).await.is_ok() {
            return Ok(());
        }
        if started.elapsed() >= timeout {
            return Err(ScrapeError::timeout("document ready", timeout));
        }
        sleep(poll).await;
    }
}
