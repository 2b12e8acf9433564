//! Anti-detection profile shared by every backend.
//!
//! Both backends launch Chromium with the same fingerprint: automation
//! switches off, `navigator.webdriver` hidden, a realistic user agent and a
//! fixed viewport. The user agent and viewport are picked once per run when
//! the [`RunConfig`](crate::config::RunConfig) is built.

use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::error::ScrapeError;

pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.0.0",
];

pub const VIEWPORTS: &[Viewport] = &[
    Viewport { width: 1920, height: 1080 },
    Viewport { width: 1536, height: 864 },
    Viewport { width: 1440, height: 900 },
    Viewport { width: 1366, height: 768 },
];

/// Hides the WebDriver flag before any page script runs.
pub const NAVIGATOR_SPOOF_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        VIEWPORTS[0]
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Viewport {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ScrapeError::Config(format!("Invalid viewport '{}', expected WIDTHxHEIGHT", s));
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width = w.trim().parse::<u32>().map_err(|_| invalid())?;
        let height = h.trim().parse::<u32>().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

pub fn pick_user_agent<R: Rng + ?Sized>(rng: &mut R) -> String {
    USER_AGENTS
        .choose(rng)
        .copied()
        .unwrap_or(USER_AGENTS[0])
        .to_string()
}

pub fn pick_viewport<R: Rng + ?Sized>(rng: &mut R) -> Viewport {
    VIEWPORTS.choose(rng).copied().unwrap_or_default()
}

/// Chromium command-line switches for the anti-detection profile.
///
/// `headless_switch` is needed when the driver does not manage headless mode
/// itself (chromedriver); chromiumoxide adds its own.
pub fn chromium_args(config: &RunConfig, headless_switch: bool) -> Vec<String> {
    let mut args = vec![
        "--disable-blink-features=AutomationControlled".to_string(),
        "--disable-gpu".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        format!("--user-agent={}", config.user_agent),
        format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        ),
    ];
    if headless_switch && config.headless {
        args.insert(0, "--headless=new".to_string());
    }
    args
}
