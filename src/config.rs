//! Run configuration.
//!
//! Settings are layered with figment: built-in defaults, then an optional TOML
//! file, then the environment (a `.env` file is loaded first). The result is
//! split into an immutable [`RunConfig`] and the [`SessionCredentials`] used by
//! the login flow. Both are built once at startup and passed down.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use std::collections::BTreeMap;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use rand::Rng;
use serde::Deserialize;

use crate::acquire::AcquisitionPolicy;
use crate::browser::stealth::{self, Viewport};
use crate::error::{Result, ScrapeError};
use crate::session::LoginLocators;

pub const DEFAULT_WEBSITE_URL: &str = "https://chat.openai.com";

/// Environment keys parsed into typed values (numbers, flags).
const TYPED_ENV_KEYS: &[&str] = &[
    "WAIT_TIMEOUT",
    "STEP_TIMEOUT",
    "PROBE_TIMEOUT",
    "HEADLESS",
    "USE_COOKIES",
    "SNAPSHOT_RETENTION_DAYS",
];

/// Environment keys taken verbatim. Passwords and paths must not go through
/// figment's value inference, which would turn `0123` into `123`.
const TEXT_ENV_KEYS: &[&str] = &[
    "WEBSITE_URL",
    "REPO_PATH",
    "COMPARISON_OUTPUT",
    "CHROME_DRIVER_PATH",
    "CHROME_BINARY_PATH",
    "COOKIES_PATH",
    "OPENAI_USERNAME",
    "OPENAI_PASSWORD",
    "LOGIN_URL",
    "USER_AGENT",
    "VIEWPORT",
];

/// Immutable configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub website_url: String,
    /// Upper bound for every individual wait.
    pub wait_timeout: Duration,
    pub repo_path: PathBuf,
    pub comparison_output: PathBuf,
    pub chrome_driver_path: Option<PathBuf>,
    pub chrome_binary_path: Option<PathBuf>,
    pub headless: bool,
    pub user_agent: String,
    pub viewport: Viewport,
    pub policy: AcquisitionPolicy,
    pub snapshot_retention_days: Option<u64>,
}

impl RunConfig {
    /// Defaults for `website_url` with the first user agent and viewport of
    /// the stealth pool.
    pub fn new(website_url: impl Into<String>) -> Self {
        Self {
            website_url: website_url.into(),
            wait_timeout: Duration::from_secs(20),
            repo_path: PathBuf::from("."),
            comparison_output: PathBuf::from("changes.json"),
            chrome_driver_path: None,
            chrome_binary_path: None,
            headless: true,
            user_agent: stealth::USER_AGENTS[0].to_string(),
            viewport: Viewport::default(),
            policy: AcquisitionPolicy::default(),
            snapshot_retention_days: None,
        }
    }

    /// Directory holding the timestamped snapshot artifacts.
    pub fn snapshot_dir(&self) -> PathBuf {
        self.repo_path.join("scraped_pages")
    }
}

/// Login inputs. Loaded once per run and never mutated.
#[derive(Clone)]
pub struct SessionCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub cookies_path: PathBuf,
    pub use_cookies: bool,
    /// Page loaded before cookies are attached.
    pub base_url: String,
    /// Entry point of the credential flow.
    pub login_url: String,
    pub step_timeout: Duration,
    pub probe_timeout: Duration,
    pub locators: LoginLocators,
}

impl SessionCredentials {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            username: None,
            password: None,
            cookies_path: PathBuf::from("cookies.json"),
            use_cookies: true,
            login_url: default_login_url(&base_url),
            base_url,
            step_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(10),
            locators: LoginLocators::default(),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
            && self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("cookies_path", &self.cookies_path)
            .field("use_cookies", &self.use_cookies)
            .field("base_url", &self.base_url)
            .field("login_url", &self.login_url)
            .finish()
    }
}

fn default_login_url(base_url: &str) -> String {
    format!("{}/auth/login", base_url.trim_end_matches('/'))
}

/// A boolean-ish setting. Environment values arrive as booleans, numbers or
/// free text depending on how figment parses them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Flag {
    fn is_set(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Text(s) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "y" | "on"
            ),
        }
    }
}

/// Raw layered settings, keyed by the lowercased environment names.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct Settings {
    website_url: String,
    wait_timeout: u64,
    /// Login step timeout; `max(wait_timeout, 30)` when unset.
    step_timeout: Option<u64>,
    probe_timeout: u64,
    repo_path: String,
    comparison_output: String,
    chrome_driver_path: Option<String>,
    chrome_binary_path: Option<String>,
    headless: Flag,
    use_cookies: Flag,
    cookies_path: String,
    openai_username: Option<String>,
    openai_password: Option<String>,
    login_url: Option<String>,
    user_agent: Option<String>,
    viewport: Option<String>,
    snapshot_retention_days: Option<u64>,
    policy: AcquisitionPolicy,
    login: LoginLocators,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            website_url: DEFAULT_WEBSITE_URL.to_string(),
            wait_timeout: 20,
            step_timeout: None,
            probe_timeout: 10,
            repo_path: ".".to_string(),
            comparison_output: "changes.json".to_string(),
            chrome_driver_path: None,
            chrome_binary_path: None,
            headless: Flag::Bool(true),
            use_cookies: Flag::Bool(true),
            cookies_path: "cookies.json".to_string(),
            openai_username: None,
            openai_password: None,
            login_url: None,
            user_agent: None,
            viewport: None,
            snapshot_retention_days: None,
            policy: AcquisitionPolicy::default(),
            login: LoginLocators::default(),
        }
    }
}

/// Build the figment: optional TOML file, then the environment.
pub fn figment(config_file: Option<&Path>) -> Figment {
    let mut figment = Figment::new();
    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }
    figment
        .merge(Env::raw().only(TYPED_ENV_KEYS))
        .merge(Serialized::defaults(text_env()))
}

fn text_env() -> BTreeMap<String, String> {
    Env::raw()
        .only(TEXT_ENV_KEYS)
        .iter()
        .map(|(key, value)| (key.as_str().to_string(), value))
        .collect()
}

/// Load `.env`, layer the sources and build the run configuration.
pub fn load(config_file: Option<&Path>) -> Result<(RunConfig, SessionCredentials)> {
    dotenvy::dotenv().ok();
    from_figment(&figment(config_file), &mut rand::thread_rng())
}

/// Extract settings from `figment`; `rng` picks the user agent and viewport
/// when they are not set explicitly.
pub fn from_figment<R: Rng + ?Sized>(
    figment: &Figment,
    rng: &mut R,
) -> Result<(RunConfig, SessionCredentials)> {
    let settings: Settings = figment.extract()?;

    let website_url = settings.website_url.trim().to_string();
    url::Url::parse(&website_url)
        .map_err(|e| ScrapeError::Config(format!("Invalid WEBSITE_URL '{}': {}", website_url, e)))?;

    if settings.wait_timeout == 0 {
        return Err(ScrapeError::Config("WAIT_TIMEOUT must be positive".to_string()));
    }
    let step_timeout = settings.step_timeout.unwrap_or(settings.wait_timeout.max(30));
    if step_timeout == 0 || settings.probe_timeout == 0 {
        return Err(ScrapeError::Config(
            "STEP_TIMEOUT and PROBE_TIMEOUT must be positive".to_string(),
        ));
    }

    let user_agent = non_empty(settings.user_agent).unwrap_or_else(|| stealth::pick_user_agent(rng));
    let viewport = match non_empty(settings.viewport) {
        Some(raw) => raw.parse::<Viewport>()?,
        None => stealth::pick_viewport(rng),
    };

    let run = RunConfig {
        website_url: website_url.clone(),
        wait_timeout: Duration::from_secs(settings.wait_timeout),
        repo_path: expand_path(&settings.repo_path)?,
        comparison_output: expand_path(&settings.comparison_output)?,
        chrome_driver_path: non_empty(settings.chrome_driver_path)
            .map(|p| expand_path(&p))
            .transpose()?,
        chrome_binary_path: non_empty(settings.chrome_binary_path)
            .map(|p| expand_path(&p))
            .transpose()?,
        headless: settings.headless.is_set(),
        user_agent,
        viewport,
        policy: settings.policy,
        snapshot_retention_days: settings.snapshot_retention_days,
    };

    let credentials = SessionCredentials {
        username: non_empty(settings.openai_username),
        password: non_empty(settings.openai_password),
        cookies_path: expand_path(&settings.cookies_path)?,
        use_cookies: settings.use_cookies.is_set(),
        login_url: non_empty(settings.login_url).unwrap_or_else(|| default_login_url(&website_url)),
        base_url: website_url,
        step_timeout: Duration::from_secs(step_timeout),
        probe_timeout: Duration::from_secs(settings.probe_timeout),
        locators: settings.login,
    };

    Ok((run, credentials))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn expand_path(raw: &str) -> Result<PathBuf> {
    shellexpand::full(raw)
        .map(|expanded| PathBuf::from(expanded.as_ref()))
        .map_err(|e| ScrapeError::Config(format!("Cannot expand path '{}': {}", raw, e)))
}
