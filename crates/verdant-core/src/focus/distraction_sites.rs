//! User-editable list of sites that cost focus points on arrival.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::storage::{Document, DocumentKey};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistractionSite {
    pub domain: String,
    pub enabled: bool,
    /// Fraction of the focus score removed, in `[0, 1]`.
    pub penalty: f64,
}

impl DistractionSite {
    pub fn new(domain: impl Into<String>, penalty: f64) -> Self {
        Self {
            domain: domain.into(),
            enabled: true,
            penalty: penalty.clamp(0.0, 1.0),
        }
    }
}

/// The `distractionSites` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistractionSites(pub Vec<DistractionSite>);

impl Default for DistractionSites {
    fn default() -> Self {
        Self(
            [
                ("youtube.com", 0.15),
                ("facebook.com", 0.12),
                ("instagram.com", 0.12),
                ("twitter.com", 0.10),
                ("x.com", 0.10),
                ("reddit.com", 0.08),
                ("tiktok.com", 0.15),
                ("netflix.com", 0.20),
                ("twitch.tv", 0.12),
                ("discord.com", 0.08),
            ]
            .into_iter()
            .map(|(domain, penalty)| DistractionSite::new(domain, penalty))
            .collect(),
        )
    }
}

impl Document for DistractionSites {
    const KEY: DocumentKey = DocumentKey::DistractionSites;
}

impl DistractionSites {
    /// Penalty of the first enabled site matching the URL's host or one of
    /// its parent domains. Unparsable URLs never match.
    pub fn penalty_for(&self, url: &str) -> Option<f64> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        self.0
            .iter()
            .find(|s| s.enabled && host_matches(host, &s.domain))
            .map(|s| s.penalty)
    }

    /// Add a site unless it's already listed. Returns whether it was added.
    pub fn add(&mut self, domain: &str, penalty: f64) -> bool {
        if self.0.iter().any(|s| s.domain == domain) {
            return false;
        }
        self.0.push(DistractionSite::new(domain, penalty));
        true
    }

    pub fn remove(&mut self, domain: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|s| s.domain != domain);
        self.0.len() != before
    }

    pub fn set_enabled(&mut self, domain: &str, enabled: bool) -> bool {
        match self.0.iter_mut().find(|s| s.domain == domain) {
            Some(site) => {
                site.enabled = enabled;
                true
            }
            None => false,
        }
    }
}

/// `sub.example.com` matches `example.com`; `netflix.com` does not match `x.com`.
fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
