//! Persisted session cookies.
//!
//! The store is a JSON array of cookie objects in the WebDriver cookie shape
//! (`name`, `value`, `domain`, `path`, `expiry`, `secure`, `httpOnly`,
//! `sameSite`), so a jar written by one backend loads into the other.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, ScrapeError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Seconds since the Unix epoch; `None` for session cookies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            expiry: None,
            secure: None,
            http_only: None,
            same_site: None,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }
}

/// An ordered set of cookies as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CookieJar {
    cookies: Vec<SessionCookie>,
}

impl CookieJar {
    pub fn new(cookies: Vec<SessionCookie>) -> Self {
        Self { cookies }
    }

    pub fn cookies(&self) -> &[SessionCookie] {
        &self.cookies
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Read a jar from `path`. A missing, unreadable, malformed or empty store
    /// is a [`ScrapeError::CookieLoad`].
    pub fn load(path: &Path) -> Result<Self> {
        let load_err = |reason: String| ScrapeError::CookieLoad {
            path: path.to_path_buf(),
            reason,
        };

        if !path.exists() {
            return Err(load_err("store does not exist".to_string()));
        }
        let raw = fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let jar: CookieJar = serde_json::from_str(&raw).map_err(|e| load_err(e.to_string()))?;
        if jar.is_empty() {
            return Err(load_err("store holds no cookies".to_string()));
        }

        debug!("Loaded {} cookies from {}", jar.len(), path.display());
        Ok(jar)
    }

    /// Write the jar to `path`, creating parent directories. An empty jar is
    /// refused so a failed session never overwrites a good store.
    pub fn save(&self, path: &Path) -> Result<()> {
        let store_err = |reason: String| ScrapeError::CookieStore {
            path: path.to_path_buf(),
            reason,
        };

        if self.is_empty() {
            return Err(store_err("no cookies to save".to_string()));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| store_err(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| store_err(e.to_string()))?;
        fs::write(path, json).map_err(|e| store_err(e.to_string()))?;

        info!("Cookies saved to {}", path.display());
        Ok(())
    }

    /// Drop every cookie whose expiry is at or before `now`. Returns how many
    /// were dropped.
    pub fn retain_unexpired(&mut self, now: i64) -> usize {
        let before = self.cookies.len();
        self.cookies.retain(|c| !c.is_expired(now));
        before - self.cookies.len()
    }
}

impl IntoIterator for CookieJar {
    type Item = SessionCookie;
    type IntoIter = std::vec::IntoIter<SessionCookie>;

    fn into_iter(self) -> Self::IntoIter {
        self.cookies.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cookie(name: &str, expiry: Option<i64>) -> SessionCookie {
        SessionCookie {
            domain: Some(".example.com".to_string()),
            path: Some("/".to_string()),
            expiry,
            ..SessionCookie::new(name, "v")
        }
    }

    #[test]
    fn test_load_missing_store() {
        let dir = TempDir::new().unwrap();
        let err = CookieJar::load(&dir.path().join("cookies.json")).unwrap_err();
        assert!(matches!(err, ScrapeError::CookieLoad { .. }));
    }

    #[test]
    fn test_load_empty_and_malformed_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cookies.json");

        fs::write(&path, "[]").unwrap();
        assert!(matches!(CookieJar::load(&path), Err(ScrapeError::CookieLoad { .. })));

        fs::write(&path, "{not json").unwrap();
        assert!(matches!(CookieJar::load(&path), Err(ScrapeError::CookieLoad { .. })));
    }

    #[test]
    fn test_save_then_load_keeps_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cookies.json");
        let jar = CookieJar::new(vec![cookie("b", None), cookie("a", Some(4_000_000_000))]);

        jar.save(&path).unwrap();
        let loaded = CookieJar::load(&path).unwrap();
        let names: Vec<&str> = loaded.cookies().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_save_refuses_empty_jar() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cookies.json");
        let err = CookieJar::default().save(&path).unwrap_err();
        assert!(matches!(err, ScrapeError::CookieStore { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_webdriver_shape() {
        let raw = r#"[{"name":"__session","value":"abc","domain":".openai.com","path":"/",
                      "expiry":1700000000,"secure":true,"httpOnly":true,"sameSite":"Lax"}]"#;
        let jar: CookieJar = serde_json::from_str(raw).unwrap();
        let c = &jar.cookies()[0];
        assert_eq!(c.http_only, Some(true));
        assert_eq!(c.same_site.as_deref(), Some("Lax"));
        assert_eq!(c.expiry, Some(1_700_000_000));

        let json = serde_json::to_value(&jar).unwrap();
        assert_eq!(json[0]["httpOnly"], true);
    }

    #[test]
    fn test_retain_unexpired() {
        let now = 1_700_000_000;
        let mut jar = CookieJar::new(vec![
            cookie("stale", Some(now - 1)),
            cookie("session", None),
            cookie("edge", Some(now)),
            cookie("fresh", Some(now + 3600)),
        ]);
        assert_eq!(jar.retain_unexpired(now), 2);
        let names: Vec<&str> = jar.cookies().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["session", "fresh"]);
    }
}
