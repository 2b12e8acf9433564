//! Login state machine.
//!
//! ```text
//! Start ──use_cookies──▶ TryCookies ──probe ok──▶ Authenticated
//!   │                        │
//!   └────────────────▶ TryCredentials ──marker──▶ Authenticated (+ save cookies)
//!                            │
//!                            └──missing input / timeout──▶ Failed
//! ```
//!
//! Every failure is absorbed: the machine always ends in `Authenticated` or
//! `Failed`, and a `Failed` login still lets acquisition continue anonymously.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::cookies::CookieJar;
use crate::browser::{wait_for_element, BrowsingContext, Locator};
use crate::config::SessionCredentials;
use crate::error::{Result, ScrapeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStep {
    Start,
    TryCookies,
    TryCredentials,
    Authenticated,
    Failed,
}

impl LoginStep {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Authenticated | Self::Failed)
    }
}

/// Result of probing the live context. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Unknown,
    Authenticated,
    Unauthenticated,
}

/// Elements the login flow interacts with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginLocators {
    pub login_button: Locator,
    pub username: Locator,
    pub continue_button: Locator,
    pub password: Locator,
    pub submit: Locator,
    /// Present only for an authenticated user.
    pub user_marker: Locator,
    /// Present only when logged out.
    pub login_prompt: Locator,
}

impl Default for LoginLocators {
    fn default() -> Self {
        let login_button = Locator::xpath("//button[contains(text(), 'Log in')]");
        Self {
            login_prompt: login_button.clone(),
            login_button,
            username: Locator::css("#username"),
            continue_button: Locator::xpath("//button[contains(text(), 'Continue')]"),
            password: Locator::css("#password"),
            submit: Locator::xpath("//button[@type='submit']"),
            user_marker: Locator::xpath(
                "//div[contains(@class, 'user-menu') or contains(@aria-label, 'User menu')]",
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    /// `Authenticated` or `Failed`.
    pub terminal: LoginStep,
    /// Every step visited, starting with `Start`.
    pub trail: Vec<LoginStep>,
}

impl LoginOutcome {
    pub fn is_authenticated(&self) -> bool {
        self.terminal == LoginStep::Authenticated
    }

    pub fn state(&self) -> LoginState {
        match self.terminal {
            LoginStep::Authenticated => LoginState::Authenticated,
            LoginStep::Failed => LoginState::Unauthenticated,
            _ => LoginState::Unknown,
        }
    }
}

/// Drives a browsing context to the cheapest available authenticated state.
pub struct SessionManager<'a> {
    credentials: &'a SessionCredentials,
}

impl<'a> SessionManager<'a> {
    pub fn new(credentials: &'a SessionCredentials) -> Self {
        Self { credentials }
    }

    /// Run the state machine from `Start` to a terminal step.
    pub async fn establish(&self, ctx: &mut dyn BrowsingContext) -> LoginOutcome {
        let mut step = LoginStep::Start;
        let mut trail = vec![step];
        while !step.is_terminal() {
            step = self.advance(ctx, step).await;
            trail.push(step);
        }
        info!(outcome = ?step, "Login flow finished");
        LoginOutcome {
            terminal: step,
            trail,
        }
    }

    /// One transition of the machine. Terminal steps map to themselves.
    pub async fn advance(&self, ctx: &mut dyn BrowsingContext, step: LoginStep) -> LoginStep {
        match step {
            LoginStep::Start => {
                if self.credentials.use_cookies {
                    LoginStep::TryCookies
                } else {
                    LoginStep::TryCredentials
                }
            }
            LoginStep::TryCookies => {
                info!("Attempting login with cookies");
                match self.login_with_cookies(ctx).await {
                    Ok(LoginState::Authenticated) => {
                        info!("Successfully logged in with cookies");
                        LoginStep::Authenticated
                    }
                    Ok(state) => {
                        info!(?state, "Cookies did not authenticate the session");
                        LoginStep::TryCredentials
                    }
                    Err(e) => {
                        warn!("Cookie login unavailable: {}", e);
                        LoginStep::TryCredentials
                    }
                }
            }
            LoginStep::TryCredentials => {
                if !self.credentials.has_credentials() {
                    warn!("Username or password not provided");
                    return LoginStep::Failed;
                }
                info!("Attempting login with credentials");
                match self.login_with_credentials(ctx).await {
                    Ok(()) => {
                        self.persist_cookies(ctx).await;
                        LoginStep::Authenticated
                    }
                    Err(e) => {
                        warn!("Credential login failed: {}", e);
                        LoginStep::Failed
                    }
                }
            }
            LoginStep::Authenticated | LoginStep::Failed => step,
        }
    }

    /// Authenticated requires no login prompt and a user marker within the
    /// probe timeout.
    pub async fn probe(&self, ctx: &mut dyn BrowsingContext) -> LoginState {
        let locators = &self.credentials.locators;

        match ctx.find_element(&locators.login_prompt).await {
            Ok(()) => {
                info!("Not logged in - login prompt detected");
                return LoginState::Unauthenticated;
            }
            Err(ScrapeError::ElementNotFound(_)) => {}
            Err(e) => {
                warn!("Login probe failed: {}", e);
                return LoginState::Unknown;
            }
        }

        match wait_for_element(ctx, &locators.user_marker, self.credentials.probe_timeout).await {
            Ok(()) => LoginState::Authenticated,
            Err(ScrapeError::Timeout { .. }) => {
                info!("No user marker found, treating session as logged out");
                LoginState::Unauthenticated
            }
            Err(e) => {
                warn!("Login probe failed: {}", e);
                LoginState::Unknown
            }
        }
    }

    async fn login_with_cookies(&self, ctx: &mut dyn BrowsingContext) -> Result<LoginState> {
        let creds = self.credentials;
        let mut jar = CookieJar::load(&creds.cookies_path)?;

        // Cookies can only be attached once a same-domain page is loaded.
        ctx.navigate(&creds.base_url).await?;
        wait_for_element(ctx, &Locator::css("body"), creds.step_timeout).await?;

        let dropped = jar.retain_unexpired(Utc::now().timestamp());
        if dropped > 0 {
            debug!("Dropped {} expired cookies", dropped);
        }

        let mut attached = 0usize;
        for cookie in jar.cookies() {
            match ctx.add_cookie(cookie).await {
                Ok(()) => attached += 1,
                Err(e) => warn!("Skipping cookie {}: {}", cookie.name, e),
            }
        }
        if attached == 0 {
            return Err(ScrapeError::Login("no usable cookies in store".to_string()));
        }
        info!("Cookies loaded from {}", creds.cookies_path.display());

        ctx.refresh().await?;
        wait_for_element(ctx, &Locator::css("body"), creds.step_timeout).await?;
        Ok(self.probe(ctx).await)
    }

    async fn login_with_credentials(&self, ctx: &mut dyn BrowsingContext) -> Result<()> {
        let creds = self.credentials;
        let locators = &creds.locators;
        let (Some(username), Some(password)) = (&creds.username, &creds.password) else {
            return Err(ScrapeError::Login("missing credentials".to_string()));
        };
        let timeout = creds.step_timeout;

        ctx.navigate(&creds.login_url).await?;

        wait_for_element(ctx, &locators.login_button, timeout).await?;
        ctx.click(&locators.login_button).await?;

        wait_for_element(ctx, &locators.username, timeout).await?;
        ctx.fill(&locators.username, username).await?;
        ctx.click(&locators.continue_button).await?;

        wait_for_element(ctx, &locators.password, timeout).await?;
        ctx.fill(&locators.password, password).await?;
        ctx.click(&locators.submit).await?;

        wait_for_element(ctx, &locators.user_marker, timeout)
            .await
            .map_err(|e| ScrapeError::Login(format!("no authenticated marker after submit ({})", e)))?;

        info!("Credential login complete");
        Ok(())
    }

    /// Best-effort: a failure is logged and otherwise ignored.
    async fn persist_cookies(&self, ctx: &mut dyn BrowsingContext) -> bool {
        let path = &self.credentials.cookies_path;
        let saved = match ctx.get_cookies().await {
            Ok(cookies) => CookieJar::new(cookies).save(path),
            Err(e) => Err(e),
        };
        match saved {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not persist cookies: {}", e);
                false
            }
        }
    }
}
