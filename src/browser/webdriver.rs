//! Standard backend: Chromium driven by a spawned chromedriver over WebDriver.

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thirtyfour::extensions::cdp::ChromeDevTools;
use thirtyfour::prelude::*;
use thirtyfour::{ChromeCapabilities, ChromiumLikeCapabilities, Cookie};
use tokio::process::{Child, Command};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::stealth::{self, NAVIGATOR_SPOOF_SCRIPT};
use super::{Backend, BackendKind, BrowsingContext, Locator};
use crate::config::RunConfig;
use crate::error::{Result, ScrapeError};
use crate::session::SessionCookie;

fn driver_err(action: &str, e: impl std::fmt::Display) -> ScrapeError {
    ScrapeError::Driver(format!("{}: {}", action, e))
}

fn chromedriver_path(config: &RunConfig) -> Result<PathBuf> {
    if let Some(path) = &config.chrome_driver_path {
        return Ok(path.clone());
    }
    which::which("chromedriver").map_err(|_| {
        ScrapeError::Driver(
            "chromedriver not found. Set CHROME_DRIVER_PATH or add it to PATH".to_string(),
        )
    })
}

fn free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Poll chromedriver's `/status` endpoint until it accepts sessions.
async fn wait_for_driver(base_url: &str, timeout: Duration) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .map_err(|e| driver_err("failed to build HTTP client", e))?;
    let status_url = format!("{}/status", base_url);
    let started = Instant::now();

    loop {
        match client.get(&status_url).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) => debug!("chromedriver status {}", resp.status()),
            Err(e) => debug!("chromedriver not ready: {}", e),
        }
        if started.elapsed() >= timeout {
            return Err(ScrapeError::timeout("chromedriver to start", timeout));
        }
        sleep(Duration::from_millis(250)).await;
    }
}

fn capabilities(config: &RunConfig) -> Result<ChromeCapabilities> {
    let caps_err = |e: WebDriverError| driver_err("invalid capabilities", e);
    let mut caps = DesiredCapabilities::chrome();
    for arg in stealth::chromium_args(config, true) {
        caps.add_arg(&arg).map_err(caps_err)?;
    }
    caps.add_exclude_switch("enable-automation").map_err(caps_err)?;
    caps.add_experimental_option("useAutomationExtension", false)
        .map_err(caps_err)?;
    if let Some(binary) = &config.chrome_binary_path {
        caps.set_binary(&binary.to_string_lossy()).map_err(caps_err)?;
    }
    Ok(caps)
}

pub struct WebDriverBackend;

#[async_trait]
impl Backend for WebDriverBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Standard
    }

    async fn launch(&self, config: &RunConfig) -> Result<Box<dyn BrowsingContext>> {
        let driver_path = chromedriver_path(config)?;
        let port = free_port()?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut child = Command::new(&driver_path)
            .arg(format!("--port={}", port))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| driver_err(&format!("failed to start {}", driver_path.display()), e))?;
        debug!("chromedriver started on port {}", port);

        if let Err(e) = wait_for_driver(&base_url, config.wait_timeout).await {
            let _ = child.kill().await;
            return Err(e);
        }

        let driver = match WebDriver::new(&base_url, capabilities(config)?).await {
            Ok(driver) => driver,
            Err(e) => {
                let _ = child.kill().await;
                return Err(driver_err("failed to create WebDriver session", e));
            }
        };

        // Prefer installing the spoof before any document; fall back to
        // running it after each navigation.
        let devtools = ChromeDevTools::new(driver.handle.clone());
        let spoof_after_navigation = match devtools
            .execute_cdp_with_params(
                "Page.addScriptToEvaluateOnNewDocument",
                json!({ "source": NAVIGATOR_SPOOF_SCRIPT }),
            )
            .await
        {
            Ok(_) => false,
            Err(e) => {
                warn!("Could not install navigator script via CDP: {}", e);
                true
            }
        };

        info!(viewport = %config.viewport, "Launched Chromium via chromedriver");
        Ok(Box::new(WebDriverContext {
            driver: Some(driver),
            child: Some(child),
            spoof_after_navigation,
        }))
    }
}

pub struct WebDriverContext {
    driver: Option<WebDriver>,
    /// Killed on drop if `quit` never ran.
    child: Option<Child>,
    spoof_after_navigation: bool,
}

impl WebDriverContext {
    fn driver(&self) -> Result<&WebDriver> {
        self.driver
            .as_ref()
            .ok_or_else(|| ScrapeError::Driver("session already closed".to_string()))
    }

    async fn element(&self, locator: &Locator) -> Result<WebElement> {
        let by = match locator {
            Locator::Css(selector) => By::Css(selector.as_str()),
            Locator::Xpath(expr) => By::XPath(expr.as_str()),
        };
        self.driver()?
            .find(by)
            .await
            .map_err(|_| ScrapeError::ElementNotFound(locator.to_string()))
    }

    async fn spoof(&self) {
        if !self.spoof_after_navigation {
            return;
        }
        if let Ok(driver) = self.driver() {
            if let Err(e) = driver.execute(NAVIGATOR_SPOOF_SCRIPT, Vec::new()).await {
                debug!("navigator spoof failed: {}", e);
            }
        }
    }
}

#[async_trait]
impl BrowsingContext for WebDriverContext {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.driver()?
            .goto(url)
            .await
            .map_err(|e| driver_err(&format!("navigation to {} failed", url), e))?;
        self.spoof().await;
        Ok(())
    }

    async fn refresh(&mut self) -> Result<()> {
        self.driver()?
            .refresh()
            .await
            .map_err(|e| driver_err("refresh failed", e))?;
        self.spoof().await;
        Ok(())
    }

    async fn evaluate(&mut self, expression: &str) -> Result<Value> {
        let script = format!("return {};", expression);
        let ret = self
            .driver()?
            .execute(&script, Vec::new())
            .await
            .map_err(|e| driver_err("script evaluation failed", e))?;
        Ok(ret.json().clone())
    }

    async fn get_cookies(&mut self) -> Result<Vec<SessionCookie>> {
        let cookies = self
            .driver()?
            .get_all_cookies()
            .await
            .map_err(|e| driver_err("failed to read cookies", e))?;
        // Both sides use the WebDriver cookie shape.
        let raw = serde_json::to_value(&cookies)?;
        Ok(serde_json::from_value(raw)?)
    }

    async fn add_cookie(&mut self, cookie: &SessionCookie) -> Result<()> {
        let wire: Cookie = serde_json::from_value(serde_json::to_value(cookie)?)
            .map_err(|e| driver_err(&format!("invalid cookie {}", cookie.name), e))?;
        self.driver()?
            .add_cookie(wire)
            .await
            .map_err(|e| driver_err(&format!("cookie {} rejected", cookie.name), e))
    }

    async fn delete_all_cookies(&mut self) -> Result<()> {
        self.driver()?
            .delete_all_cookies()
            .await
            .map_err(|e| driver_err("failed to clear cookies", e))
    }

    async fn find_element(&mut self, locator: &Locator) -> Result<()> {
        self.element(locator).await.map(|_| ())
    }

    async fn click(&mut self, locator: &Locator) -> Result<()> {
        self.element(locator)
            .await?
            .click()
            .await
            .map_err(|e| driver_err(&format!("click on {} failed", locator), e))
    }

    async fn fill(&mut self, locator: &Locator, text: &str) -> Result<()> {
        let element = self.element(locator).await?;
        element
            .clear()
            .await
            .map_err(|e| driver_err(&format!("clearing {} failed", locator), e))?;
        element
            .send_keys(text)
            .await
            .map_err(|e| driver_err(&format!("typing into {} failed", locator), e))
    }

    async fn page_source(&mut self) -> Result<String> {
        self.driver()?
            .source()
            .await
            .map_err(|e| driver_err("failed to read page source", e))
    }

    async fn title(&mut self) -> Result<String> {
        self.driver()?
            .title()
            .await
            .map_err(|e| driver_err("failed to read title", e))
    }

    async fn quit(&mut self) -> Result<()> {
        let quit = match self.driver.take() {
            Some(driver) => driver.quit().await.map_err(|e| driver_err("failed to quit session", e)),
            None => Ok(()),
        };
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!("Could not stop chromedriver: {}", e);
            }
        }
        quit?;
        info!("chromedriver session closed");
        Ok(())
    }
}
