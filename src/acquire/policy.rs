use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Thresholds and heuristics for one acquisition run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionPolicy {
    /// Attempts per backend.
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    /// Fixed wait after navigation before the challenge poll starts.
    pub challenge_settle_secs: u64,
    /// Fixed wait after the document is ready, for client-side rendering.
    pub render_settle_secs: u64,
    pub poll_interval_ms: u64,
    /// Shorter content is treated as an interstitial, not the real page.
    pub min_content_len: usize,
    /// Matched case-insensitively against titles and content.
    pub challenge_markers: Vec<String>,
}

impl Default for AcquisitionPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_secs: 10,
            challenge_settle_secs: 5,
            render_settle_secs: 5,
            poll_interval_ms: 500,
            min_content_len: 500,
            challenge_markers: [
                "just a moment",
                "cloudflare",
                "attention required",
                "checking your browser",
            ]
            .iter()
            .map(|m| m.to_string())
            .collect(),
        }
    }
}

impl AcquisitionPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn challenge_settle(&self) -> Duration {
        Duration::from_secs(self.challenge_settle_secs)
    }

    pub fn render_settle(&self) -> Duration {
        Duration::from_secs(self.render_settle_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn is_challenge(&self, text: &str) -> bool {
        let haystack = text.to_lowercase();
        self.challenge_markers
            .iter()
            .any(|marker| !marker.is_empty() && haystack.contains(&marker.to_lowercase()))
    }

    /// Why `content` is not a real render, or `None` when it qualifies.
    pub fn rejection(&self, content: &str) -> Option<String> {
        let len = content.chars().count();
        if len < self.min_content_len {
            return Some(format!(
                "content too short ({} < {} chars)",
                len, self.min_content_len
            ));
        }
        if self.is_challenge(content) {
            return Some("challenge marker in content".to_string());
        }
        None
    }

    pub fn qualifies(&self, content: &str) -> bool {
        self.rejection(content).is_none()
    }
}
