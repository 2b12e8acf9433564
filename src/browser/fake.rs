//! Scripted in-memory browsing context for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{Backend, BackendKind, BrowsingContext, Locator};
use crate::config::RunConfig;
use crate::error::{Result, ScrapeError};
use crate::session::SessionCookie;

pub(crate) struct FakeContext {
    pub present: HashSet<Locator>,
    pub ready_state: String,
    pub title: String,
    pub source: String,
    /// (title, html) served on successive navigations; the last one sticks.
    pub pages: VecDeque<(String, String)>,
    pub cookies: Vec<SessionCookie>,
    pub added_cookies: Vec<SessionCookie>,
    pub rejected_cookies: HashSet<String>,
    pub navigations: Vec<String>,
    pub clicks: Vec<Locator>,
    pub fills: Vec<(Locator, String)>,
    pub refreshes: u32,
    pub cleared_cookies: u32,
    pub quit_calls: u32,
    /// Appear after a refresh once at least one cookie was attached.
    pub on_refresh: Vec<Locator>,
    /// Clicking the key makes the listed locators present.
    pub on_click: HashMap<Locator, Vec<Locator>>,
    pub fail_navigation: bool,
}

impl FakeContext {
    pub fn new() -> Self {
        let mut present = HashSet::new();
        present.insert(Locator::css("body"));
        Self {
            present,
            ready_state: "complete".to_string(),
            title: String::new(),
            source: String::new(),
            pages: VecDeque::new(),
            cookies: Vec::new(),
            added_cookies: Vec::new(),
            rejected_cookies: HashSet::new(),
            navigations: Vec::new(),
            clicks: Vec::new(),
            fills: Vec::new(),
            refreshes: 0,
            cleared_cookies: 0,
            quit_calls: 0,
            on_refresh: Vec::new(),
            on_click: HashMap::new(),
            fail_navigation: false,
        }
    }

    pub fn with_present(mut self, locator: Locator) -> Self {
        self.present.insert(locator);
        self
    }

    pub fn with_page(mut self, title: &str, html: &str) -> Self {
        self.pages.push_back((title.to_string(), html.to_string()));
        self
    }

    pub fn revealing(mut self, clicked: Locator, revealed: Vec<Locator>) -> Self {
        self.on_click.insert(clicked, revealed);
        self
    }
}

#[async_trait]
impl BrowsingContext for FakeContext {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.navigations.push(url.to_string());
        if self.fail_navigation {
            return Err(ScrapeError::Driver(format!("navigation to {} refused", url)));
        }
        let next = if self.pages.len() > 1 {
            self.pages.pop_front()
        } else {
            self.pages.front().cloned()
        };
        if let Some((title, html)) = next {
            self.title = title;
            self.source = html;
        }
        Ok(())
    }

    async fn refresh(&mut self) -> Result<()> {
        self.refreshes += 1;
        if !self.added_cookies.is_empty() {
            let revealed: Vec<Locator> = self.on_refresh.clone();
            self.present.extend(revealed);
        }
        Ok(())
    }

    async fn evaluate(&mut self, expression: &str) -> Result<Value> {
        if expression == "document.readyState" {
            return Ok(Value::String(self.ready_state.clone()));
        }
        Ok(Value::Null)
    }

    async fn get_cookies(&mut self) -> Result<Vec<SessionCookie>> {
        Ok(self.cookies.clone())
    }

    async fn add_cookie(&mut self, cookie: &SessionCookie) -> Result<()> {
        if self.rejected_cookies.contains(&cookie.name) {
            return Err(ScrapeError::Driver(format!("invalid cookie {}", cookie.name)));
        }
        self.added_cookies.push(cookie.clone());
        self.cookies.push(cookie.clone());
        Ok(())
    }

    async fn delete_all_cookies(&mut self) -> Result<()> {
        self.cleared_cookies += 1;
        self.cookies.clear();
        Ok(())
    }

    async fn find_element(&mut self, locator: &Locator) -> Result<()> {
        if self.present.contains(locator) {
            Ok(())
        } else {
            Err(ScrapeError::ElementNotFound(locator.to_string()))
        }
    }

    async fn click(&mut self, locator: &Locator) -> Result<()> {
        self.find_element(locator).await?;
        self.clicks.push(locator.clone());
        if let Some(revealed) = self.on_click.get(locator).cloned() {
            self.present.extend(revealed);
        }
        Ok(())
    }

    async fn fill(&mut self, locator: &Locator, text: &str) -> Result<()> {
        self.find_element(locator).await?;
        self.fills.push((locator.clone(), text.to_string()));
        Ok(())
    }

    async fn page_source(&mut self) -> Result<String> {
        Ok(self.source.clone())
    }

    async fn title(&mut self) -> Result<String> {
        Ok(self.title.clone())
    }

    async fn quit(&mut self) -> Result<()> {
        self.quit_calls += 1;
        Ok(())
    }
}

/// Hands out one shared [`FakeContext`] so tests can inspect it after the
/// orchestrator has released it.
pub(crate) struct FakeBackend {
    kind: BackendKind,
    pub context: Arc<Mutex<FakeContext>>,
    pub fail_launch: bool,
}

impl FakeBackend {
    pub fn new(kind: BackendKind, context: FakeContext) -> Self {
        Self {
            kind,
            context: Arc::new(Mutex::new(context)),
            fail_launch: false,
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn launch(&self, _config: &RunConfig) -> Result<Box<dyn BrowsingContext>> {
        if self.fail_launch {
            return Err(ScrapeError::Driver(format!("{} browser not installed", self.kind)));
        }
        Ok(Box::new(SharedContext(Arc::clone(&self.context))))
    }
}

struct SharedContext(Arc<Mutex<FakeContext>>);

#[async_trait]
impl BrowsingContext for SharedContext {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.0.lock().await.navigate(url).await
    }

    async fn refresh(&mut self) -> Result<()> {
        self.0.lock().await.refresh().await
    }

    async fn evaluate(&mut self, expression: &str) -> Result<Value> {
        self.0.lock().await.evaluate(expression).await
    }

    async fn get_cookies(&mut self) -> Result<Vec<SessionCookie>> {
        self.0.lock().await.get_cookies().await
    }

    async fn add_cookie(&mut self, cookie: &SessionCookie) -> Result<()> {
        self.0.lock().await.add_cookie(cookie).await
    }

    async fn delete_all_cookies(&mut self) -> Result<()> {
        self.0.lock().await.delete_all_cookies().await
    }

    async fn find_element(&mut self, locator: &Locator) -> Result<()> {
        self.0.lock().await.find_element(locator).await
    }

    async fn click(&mut self, locator: &Locator) -> Result<()> {
        self.0.lock().await.click(locator).await
    }

    async fn fill(&mut self, locator: &Locator, text: &str) -> Result<()> {
        self.0.lock().await.fill(locator, text).await
    }

    async fn page_source(&mut self) -> Result<String> {
        self.0.lock().await.page_source().await
    }

    async fn title(&mut self) -> Result<String> {
        self.0.lock().await.title().await
    }

    async fn quit(&mut self) -> Result<()> {
        self.0.lock().await.quit().await
    }
}
