//! Stealth backend: Chromium driven directly over CDP with chromiumoxide.
//!
//! No WebDriver layer is involved, so the automation switches chromedriver
//! adds are never present. On top of the shared launch profile the page gets
//! chromiumoxide's stealth patches and the navigator spoof script before any
//! document loads.

use std::path::PathBuf;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    ClearBrowserCookiesParams, Cookie, CookieParam, TimeSinceEpoch,
};
use chromiumoxide::element::Element;
use chromiumoxide::handler::viewport::Viewport as CdpViewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::stealth::{self, NAVIGATOR_SPOOF_SCRIPT};
use super::{Backend, BackendKind, BrowsingContext, Locator};
use crate::config::RunConfig;
use crate::error::{Result, ScrapeError};
use crate::session::SessionCookie;

fn driver_err(action: &str, e: impl std::fmt::Display) -> ScrapeError {
    ScrapeError::Driver(format!("{}: {}", action, e))
}

/// Locate a Chromium binary on PATH.
pub fn find_chromium() -> Option<PathBuf> {
    ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"]
        .iter()
        .find_map(|name| which::which(name).ok())
}

pub struct CdpBackend;

#[async_trait]
impl Backend for CdpBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Stealth
    }

    async fn launch(&self, config: &RunConfig) -> Result<Box<dyn BrowsingContext>> {
        let mut builder = BrowserConfig::builder()
            .disable_default_args()
            .args(stealth::chromium_args(config, false))
            .window_size(config.viewport.width, config.viewport.height)
            .viewport(CdpViewport {
                width: config.viewport.width,
                height: config.viewport.height,
                ..Default::default()
            });

        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = config.chrome_binary_path.clone().or_else(find_chromium) {
            debug!("Using browser binary {}", path.display());
            builder = builder.chrome_executable(path);
        }

        let browser_config = builder
            .build()
            .map_err(|e| driver_err("invalid browser config", e))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| driver_err("failed to launch Chromium", e))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler event error: {}", e);
                }
            }
        });

        let mut ctx = CdpContext {
            browser,
            page: None,
            handler_task,
        };
        // A context that fails to prepare still owns a running browser.
        if let Err(e) = ctx.prepare_page(config).await {
            let _ = ctx.quit().await;
            return Err(e);
        }

        info!(viewport = %config.viewport, "Launched Chromium over CDP");
        Ok(Box::new(ctx))
    }
}

pub struct CdpContext {
    browser: Browser,
    page: Option<Page>,
    handler_task: JoinHandle<()>,
}

impl CdpContext {
    async fn prepare_page(&mut self, config: &RunConfig) -> Result<()> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| driver_err("failed to open page", e))?;

        page.enable_stealth_mode_with_agent(&config.user_agent)
            .await
            .map_err(|e| driver_err("failed to apply stealth patches", e))?;
        page.evaluate_on_new_document(NAVIGATOR_SPOOF_SCRIPT)
            .await
            .map_err(|e| driver_err("failed to install navigator script", e))?;

        self.page = Some(page);
        Ok(())
    }

    fn page(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| ScrapeError::Driver("browser already closed".to_string()))
    }

    async fn element(&self, locator: &Locator) -> Result<Element> {
        let page = self.page()?;
        let found = match locator {
            Locator::Css(selector) => page.find_element(selector.as_str()).await,
            Locator::Xpath(expr) => page.find_xpath(expr.as_str()).await,
        };
        found.map_err(|_| ScrapeError::ElementNotFound(locator.to_string()))
    }
}

fn to_session_cookie(cookie: Cookie) -> SessionCookie {
    SessionCookie {
        domain: Some(cookie.domain),
        path: Some(cookie.path),
        expiry: (!cookie.session).then(|| cookie.expires as i64),
        secure: Some(cookie.secure),
        http_only: Some(cookie.http_only),
        same_site: cookie
            .same_site
            .and_then(|s| serde_json::to_value(s).ok())
            .and_then(|v| v.as_str().map(str::to_string)),
        ..SessionCookie::new(cookie.name, cookie.value)
    }
}

#[async_trait]
impl BrowsingContext for CdpContext {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        let page = self.page()?;
        page.goto(url)
            .await
            .map_err(|e| driver_err(&format!("navigation to {} failed", url), e))?;
        Ok(())
    }

    async fn refresh(&mut self) -> Result<()> {
        self.page()?
            .reload()
            .await
            .map_err(|e| driver_err("reload failed", e))?;
        Ok(())
    }

    async fn evaluate(&mut self, expression: &str) -> Result<Value> {
        let result = self
            .page()?
            .evaluate(expression)
            .await
            .map_err(|e| driver_err("script evaluation failed", e))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn get_cookies(&mut self) -> Result<Vec<SessionCookie>> {
        let cookies = self
            .page()?
            .get_cookies()
            .await
            .map_err(|e| driver_err("failed to read cookies", e))?;
        Ok(cookies.into_iter().map(to_session_cookie).collect())
    }

    async fn add_cookie(&mut self, cookie: &SessionCookie) -> Result<()> {
        let page = self.page()?;
        let mut builder = CookieParam::builder()
            .name(cookie.name.clone())
            .value(cookie.value.clone());

        match &cookie.domain {
            Some(domain) => builder = builder.domain(domain.clone()),
            None => {
                let url = page
                    .url()
                    .await
                    .map_err(|e| driver_err("failed to read page url", e))?
                    .unwrap_or_default();
                builder = builder.url(url);
            }
        }
        if let Some(path) = &cookie.path {
            builder = builder.path(path.clone());
        }
        if let Some(secure) = cookie.secure {
            builder = builder.secure(secure);
        }
        if let Some(http_only) = cookie.http_only {
            builder = builder.http_only(http_only);
        }
        if let Some(expiry) = cookie.expiry {
            builder = builder.expires(TimeSinceEpoch::new(expiry as f64));
        }

        let param = builder
            .build()
            .map_err(|e| driver_err(&format!("invalid cookie {}", cookie.name), e))?;
        page.set_cookie(param)
            .await
            .map_err(|e| driver_err(&format!("cookie {} rejected", cookie.name), e))?;
        Ok(())
    }

    async fn delete_all_cookies(&mut self) -> Result<()> {
        self.page()?
            .execute(ClearBrowserCookiesParams::default())
            .await
            .map_err(|e| driver_err("failed to clear cookies", e))?;
        Ok(())
    }

    async fn find_element(&mut self, locator: &Locator) -> Result<()> {
        self.element(locator).await.map(|_| ())
    }

    async fn click(&mut self, locator: &Locator) -> Result<()> {
        let element = self.element(locator).await?;
        element
            .click()
            .await
            .map_err(|e| driver_err(&format!("click on {} failed", locator), e))?;
        Ok(())
    }

    async fn fill(&mut self, locator: &Locator, text: &str) -> Result<()> {
        let element = self.element(locator).await?;
        element
            .call_js_fn("function() { this.value = ''; }", false)
            .await
            .map_err(|e| driver_err(&format!("clearing {} failed", locator), e))?;
        element
            .click()
            .await
            .map_err(|e| driver_err(&format!("focus on {} failed", locator), e))?
            .type_str(text)
            .await
            .map_err(|e| driver_err(&format!("typing into {} failed", locator), e))?;
        Ok(())
    }

    async fn page_source(&mut self) -> Result<String> {
        self.page()?
            .content()
            .await
            .map_err(|e| driver_err("failed to read page content", e))
    }

    async fn title(&mut self) -> Result<String> {
        let title = self
            .page()?
            .get_title()
            .await
            .map_err(|e| driver_err("failed to read title", e))?;
        Ok(title.unwrap_or_default())
    }

    async fn quit(&mut self) -> Result<()> {
        self.page = None;
        let closed = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            warn!("Chromium did not exit cleanly: {}", e);
        }
        self.handler_task.abort();
        closed.map_err(|e| driver_err("failed to close browser", e))?;
        info!("Chromium closed");
        Ok(())
    }
}

impl Drop for CdpContext {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}
