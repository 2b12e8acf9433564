//! Backend fallback through the public API, with scripted in-memory backends.
//!
//! Run with: cargo test --test acquire_fallback

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pagewatch::{
    Backend, BackendKind, BrowsingContext, Locator, Orchestrator, RunConfig, ScrapeError,
    SessionCookie, SessionCredentials,
};
use serde_json::Value;

const TARGET: &str = "https://chat.example.com";

#[derive(Default)]
struct Counters {
    launches: AtomicU32,
    navigations: AtomicU32,
    quits: AtomicU32,
}

/// Always serves the same page.
struct ScriptedBackend {
    kind: BackendKind,
    title: &'static str,
    html: String,
    counters: Arc<Counters>,
}

struct ScriptedContext {
    title: &'static str,
    html: String,
    counters: Arc<Counters>,
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn launch(&self, _config: &RunConfig) -> pagewatch::Result<Box<dyn BrowsingContext>> {
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedContext {
            title: self.title,
            html: self.html.clone(),
            counters: Arc::clone(&self.counters),
        }))
    }
}

#[async_trait]
impl BrowsingContext for ScriptedContext {
    async fn navigate(&mut self, _url: &str) -> pagewatch::Result<()> {
        self.counters.navigations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn refresh(&mut self) -> pagewatch::Result<()> {
        Ok(())
    }

    async fn evaluate(&mut self, expression: &str) -> pagewatch::Result<Value> {
        Ok(match expression {
            "document.readyState" => Value::String("complete".to_string()),
            _ => Value::Null,
        })
    }

    async fn get_cookies(&mut self) -> pagewatch::Result<Vec<SessionCookie>> {
        Ok(Vec::new())
    }

    async fn add_cookie(&mut self, _cookie: &SessionCookie) -> pagewatch::Result<()> {
        Ok(())
    }

    async fn delete_all_cookies(&mut self) -> pagewatch::Result<()> {
        Ok(())
    }

    async fn find_element(&mut self, locator: &Locator) -> pagewatch::Result<()> {
        match locator {
            Locator::Css(s) if s == "body" => Ok(()),
            other => Err(ScrapeError::ElementNotFound(other.to_string())),
        }
    }

    async fn click(&mut self, locator: &Locator) -> pagewatch::Result<()> {
        self.find_element(locator).await
    }

    async fn fill(&mut self, locator: &Locator, _text: &str) -> pagewatch::Result<()> {
        self.find_element(locator).await
    }

    async fn page_source(&mut self) -> pagewatch::Result<String> {
        Ok(self.html.clone())
    }

    async fn title(&mut self) -> pagewatch::Result<String> {
        Ok(self.title.to_string())
    }

    async fn quit(&mut self) -> pagewatch::Result<()> {
        self.counters.quits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn setup() -> (RunConfig, SessionCredentials) {
    let config = RunConfig::new(TARGET);
    let mut creds = SessionCredentials::new(TARGET);
    creds.use_cookies = false;
    (config, creds)
}

fn scripted(kind: BackendKind, title: &'static str, html: String) -> (ScriptedBackend, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let backend = ScriptedBackend {
        kind,
        title,
        html,
        counters: Arc::clone(&counters),
    };
    (backend, counters)
}

#[tokio::test(start_paused = true)]
async fn challenged_stealth_falls_back_to_standard() {
    let (config, creds) = setup();
    let clean = "x".repeat(1000);
    let (stealth, stealth_counters) = scripted(
        BackendKind::Stealth,
        "Just a moment...",
        "<html><body>Just a moment...</body></html>".to_string(),
    );
    let (standard, standard_counters) = scripted(BackendKind::Standard, "Chat", clean.clone());

    let backends: Vec<Box<dyn Backend>> = vec![Box::new(stealth), Box::new(standard)];
    let snapshot = Orchestrator::with_backends(backends, &config, &creds)
        .acquire()
        .await
        .expect("second backend should succeed");

    assert_eq!(snapshot.html, clean);
    assert_eq!(snapshot.backend, BackendKind::Standard);
    assert!(stealth_counters.navigations.load(Ordering::SeqCst) <= 3);
    assert_eq!(stealth_counters.quits.load(Ordering::SeqCst), 1);
    assert_eq!(standard_counters.navigations.load(Ordering::SeqCst), 1);
    assert_eq!(standard_counters.quits.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn clean_stealth_never_launches_standard() {
    let (config, creds) = setup();
    let (stealth, _) = scripted(BackendKind::Stealth, "Chat", "y".repeat(800));
    let (standard, standard_counters) = scripted(BackendKind::Standard, "Chat", "z".repeat(800));

    let backends: Vec<Box<dyn Backend>> = vec![Box::new(stealth), Box::new(standard)];
    let snapshot = Orchestrator::with_backends(backends, &config, &creds)
        .acquire()
        .await
        .unwrap();

    assert_eq!(snapshot.backend, BackendKind::Stealth);
    assert_eq!(standard_counters.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn exhausted_backends_report_total_attempts() {
    let (config, creds) = setup();
    let (stealth, _) = scripted(BackendKind::Stealth, "Chat", "short".to_string());
    let (standard, _) = scripted(BackendKind::Standard, "Attention Required!", "short".to_string());

    let backends: Vec<Box<dyn Backend>> = vec![Box::new(stealth), Box::new(standard)];
    let err = Orchestrator::with_backends(backends, &config, &creds)
        .acquire()
        .await
        .unwrap_err();

    assert!(matches!(err, ScrapeError::AllBackendsExhausted { attempts: 6 }));
}
