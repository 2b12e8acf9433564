use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use super::AcquisitionPolicy;
use crate::browser::{self, wait_for_ready, Backend, BackendKind, BrowsingContext};
use crate::config::{RunConfig, SessionCredentials};
use crate::error::{Result, ScrapeError};
use crate::session::SessionManager;
use crate::snapshot::PageSnapshot;

/// Tries each backend in order until one yields qualifying content.
pub struct Orchestrator<'a> {
    backends: Vec<Box<dyn Backend>>,
    config: &'a RunConfig,
    credentials: &'a SessionCredentials,
}

impl<'a> Orchestrator<'a> {
    /// Stealth backend first, standard second.
    pub fn new(config: &'a RunConfig, credentials: &'a SessionCredentials) -> Self {
        Self::with_backends(browser::default_backends(), config, credentials)
    }

    pub fn with_backends(
        backends: Vec<Box<dyn Backend>>,
        config: &'a RunConfig,
        credentials: &'a SessionCredentials,
    ) -> Self {
        Self {
            backends,
            config,
            credentials,
        }
    }

    fn policy(&self) -> &AcquisitionPolicy {
        &self.config.policy
    }

    /// Acquire the target page. The first qualifying content wins.
    pub async fn acquire(&self) -> Result<PageSnapshot> {
        let mut attempts = 0;
        for backend in &self.backends {
            let kind = backend.kind();
            info!(backend = %kind, "Trying backend");
            match self.run_backend(backend.as_ref()).await {
                Ok(snapshot) => {
                    info!(backend = %kind, "Acquired {} chars", snapshot.html.chars().count());
                    return Ok(snapshot);
                }
                Err(ScrapeError::ChallengeUnresolved { attempts: n, .. }) => {
                    attempts += n;
                    warn!(backend = %kind, "Challenge unresolved after {} attempts", n);
                }
                Err(e) => {
                    attempts += 1;
                    warn!(backend = %kind, "Backend failed: {}", e);
                }
            }
        }
        Err(ScrapeError::AllBackendsExhausted { attempts })
    }

    /// Launch, drive and always release one backend's context.
    async fn run_backend(&self, backend: &dyn Backend) -> Result<PageSnapshot> {
        let mut ctx = backend.launch(self.config).await?;
        let result = self.drive(ctx.as_mut(), backend.kind()).await;
        if let Err(e) = ctx.quit().await {
            warn!(backend = %backend.kind(), "Failed to release browser: {}", e);
        }
        result
    }

    async fn drive(&self, ctx: &mut dyn BrowsingContext, kind: BackendKind) -> Result<PageSnapshot> {
        // Once per context, before login; attempts keep the session.
        if let Err(e) = ctx.delete_all_cookies().await {
            warn!(backend = %kind, "Could not clear cookies: {}", e);
        }

        let login = SessionManager::new(self.credentials).establish(ctx).await;
        if !login.is_authenticated() {
            warn!(backend = %kind, "Continuing without an authenticated session");
        }

        let policy = self.policy();
        let attempts = policy.attempts();
        for attempt in 1..=attempts {
            info!(backend = %kind, attempt, "Loading {}", self.config.website_url);
            match self.attempt(ctx).await {
                Ok(html) => return Ok(PageSnapshot::new(html, &self.config.website_url, kind)),
                Err(e) => warn!(backend = %kind, attempt, "Attempt failed: {}", e),
            }
            if attempt < attempts {
                info!("Retrying in {}s", policy.retry_delay_secs);
                sleep(policy.retry_delay()).await;
            }
        }

        Err(ScrapeError::ChallengeUnresolved {
            backend: kind.to_string(),
            attempts,
        })
    }

    /// One navigation: settle, wait out the challenge, wait for the document,
    /// let the client render, then read and qualify the content.
    async fn attempt(&self, ctx: &mut dyn BrowsingContext) -> Result<String> {
        let policy = self.policy();
        let timeout = self.config.wait_timeout;

        ctx.navigate(&self.config.website_url).await?;
        sleep(policy.challenge_settle()).await;

        if let Err(e) = self.wait_out_challenge(ctx).await {
            warn!("{}, continuing anyway", e);
        }
        if let Err(e) = wait_for_ready(ctx, timeout, policy.poll_interval()).await {
            warn!("{}, continuing anyway", e);
        }

        sleep(policy.render_settle()).await;

        let html = ctx.page_source().await?;
        match policy.rejection(&html) {
            None => Ok(html),
            Some(reason) => Err(ScrapeError::ContentRejected(reason)),
        }
    }

    /// Poll the title until no challenge marker is left.
    async fn wait_out_challenge(&self, ctx: &mut dyn BrowsingContext) -> Result<()> {
        let policy = self.policy();
        let timeout = self.config.wait_timeout;
        let started = Instant::now();
        loop {
            match ctx.title().await {
                Ok(title) if !policy.is_challenge(&title) => return Ok(()),
                Ok(title) => info!("Challenge page detected: {:?}", title),
                Err(e) => warn!("Could not read title: {}", e),
            }
            if started.elapsed() >= timeout {
                return Err(ScrapeError::timeout("challenge to clear", timeout));
            }
            sleep(policy.poll_interval()).await;
        }
    }
}
