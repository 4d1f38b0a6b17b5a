//! URL classification: productive, neutral or distracting.
//!
//! A static rule table is always available. When an external provider is
//! configured its verdicts are preferred and cached per domain for seven
//! days in the `websiteClassifications` document. Classification never
//! fails; every problem degrades to the rule table.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use super::llm::ChatClient;
use crate::error::{ScoringError, StoreError};
use crate::storage::{Document, DocumentKey, SharedStateStore};

const CACHE_TTL_DAYS: i64 = 7;

const PRODUCTIVE_PATTERNS: &[&str] = &[
    "github.com",
    "gitlab.com",
    "stackoverflow.com",
    "stackexchange.com",
    "docs.",
    "developer.",
    "learn.",
    "education",
    "coursera",
    "udemy",
    "notion.so",
    "trello.com",
    "asana.com",
    "monday.com",
    "google.com/docs",
    "google.com/sheets",
    "google.com/slides",
    "overleaf.com",
    "latex",
    "jupyter",
    "colab.research.google",
    "medium.com",
    "dev.to",
    "hackernoon",
    "freecodecamp",
];

const DISTRACTING_PATTERNS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "facebook.com",
    "fb.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "tiktok.com",
    "reddit.com",
    "twitch.tv",
    "netflix.com",
    "hulu.com",
    "discord.com",
    "snapchat.com",
    "pinterest.com",
    "buzzfeed",
    "dailymail",
    "tmz.com",
    "espn.com",
];

const NEUTRAL_PATTERNS: &[&str] = &[
    "gmail.com",
    "outlook.com",
    "mail.",
    "calendar.",
    "zoom.us",
    "meet.google",
    "teams.microsoft",
    "slack.com",
    "amazon.com",
    "google.com/search",
];

const SYSTEM_PROMPT: &str = "You are a productivity analyzer. Classify websites as productive, \
neutral, or distracting for work/study.

Return JSON with:
- category: \"productive\", \"neutral\", or \"distracting\"
- score: 0-100 (0=very distracting, 50=neutral, 100=very productive)
- reasoning: Brief explanation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Productive,
    Neutral,
    Distracting,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Productive => "productive",
            Category::Neutral => "neutral",
            Category::Distracting => "distracting",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub url: String,
    pub domain: String,
    pub category: Category,
    pub score: f64,
    pub reasoning: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl Classification {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.timestamp < Duration::days(CACHE_TTL_DAYS)
    }
}

/// The `websiteClassifications` document, keyed by domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassificationCache(pub BTreeMap<String, Classification>);

impl Document for ClassificationCache {
    const KEY: DocumentKey = DocumentKey::WebsiteClassifications;
}

/// Host without a leading `www.`, or `None` if `url` doesn't parse.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

/// Reply shape expected from the external classifier.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct ExternalVerdict {
    category: Category,
    score: f64,
    reasoning: String,
}

impl Default for ExternalVerdict {
    fn default() -> Self {
        Self {
            category: Category::Neutral,
            score: 50.0,
            reasoning: "Classification complete".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DistractionClassifier {
    store: SharedStateStore,
    client: Option<ChatClient>,
    use_cache: bool,
}

impl DistractionClassifier {
    /// Rule table only.
    pub fn heuristic(store: SharedStateStore) -> Self {
        Self {
            store,
            client: None,
            use_cache: true,
        }
    }

    pub fn external(store: SharedStateStore, client: ChatClient, use_cache: bool) -> Self {
        Self {
            store,
            client: Some(client),
            use_cache,
        }
    }

    pub fn is_external(&self) -> bool {
        self.client.is_some()
    }

    pub async fn classify(&self, url: &str, now: DateTime<Utc>) -> Classification {
        let domain = domain_of(url).unwrap_or_else(|| url.to_string());

        if self.use_cache {
            if let Some(hit) = self.cached(&domain, now) {
                debug!(%domain, "classification cache hit");
                return hit;
            }
        }

        let Some(client) = &self.client else {
            return classify_by_rules(url, &domain, now);
        };

        match self.classify_external(client, url, &domain, now).await {
            Ok(classification) => {
                if self.use_cache {
                    self.store_in_cache(&classification);
                }
                classification
            }
            Err(e) => {
                warn!(%domain, error = %e, "external classification failed, using rules");
                classify_by_rules(url, &domain, now)
            }
        }
    }

    /// Fresh cache entry for `domain`. Store failures read as a miss.
    pub fn cached(&self, domain: &str, now: DateTime<Utc>) -> Option<Classification> {
        match self.store.get::<ClassificationCache>() {
            Ok(cache) => cache.0.get(domain).filter(|c| c.is_fresh(now)).cloned(),
            Err(e) => {
                warn!(%domain, error = %e, "classification cache unreadable");
                None
            }
        }
    }

    pub fn clear_cache(&self) -> Result<(), StoreError> {
        self.store.reset::<ClassificationCache>()
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn prune_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        self.store.update(|cache: &mut ClassificationCache| {
            let before = cache.0.len();
            cache.0.retain(|_, c| c.is_fresh(now));
            before - cache.0.len()
        })
    }

    async fn classify_external(
        &self,
        client: &ChatClient,
        url: &str,
        domain: &str,
        now: DateTime<Utc>,
    ) -> Result<Classification, ScoringError> {
        let prompt = format!(
            "Classify this website for productivity:\n\nDomain: {domain}\nFull URL: {url}\n\n\
             Is this website productive, neutral, or distracting for work/study?"
        );
        let verdict: ExternalVerdict = client.complete_json(SYSTEM_PROMPT, &prompt, 0.3, 150).await?;
        Ok(Classification {
            url: url.to_string(),
            domain: domain.to_string(),
            category: verdict.category,
            score: verdict.score.clamp(0.0, 100.0),
            reasoning: verdict.reasoning,
            timestamp: now,
        })
    }

    fn store_in_cache(&self, classification: &Classification) {
        let result = self.store.update(|cache: &mut ClassificationCache| {
            cache
                .0
                .insert(classification.domain.clone(), classification.clone());
        });
        if let Err(e) = result {
            warn!(domain = %classification.domain, error = %e, "failed to cache classification");
        }
    }
}

/// Static rule table: productive, then distracting, then neutral patterns,
/// first match wins.
pub fn classify_by_rules(url: &str, domain: &str, now: DateTime<Utc>) -> Classification {
    let lower_url = url.to_lowercase();
    let lower_domain = domain.to_lowercase();
    let matches = |patterns: &[&str]| {
        patterns
            .iter()
            .any(|p| lower_url.contains(p) || lower_domain.contains(p))
    };

    let (category, score, reasoning) = if matches(PRODUCTIVE_PATTERNS) {
        (
            Category::Productive,
            85.0,
            "Identified as a productive/educational website",
        )
    } else if matches(DISTRACTING_PATTERNS) {
        (
            Category::Distracting,
            20.0,
            "Identified as an entertainment/social media website",
        )
    } else if matches(NEUTRAL_PATTERNS) {
        (
            Category::Neutral,
            50.0,
            "Identified as a necessary communication/utility tool",
        )
    } else {
        (
            Category::Neutral,
            55.0,
            "Unknown website, classified as neutral",
        )
    };

    Classification {
        url: url.to_string(),
        domain: domain.to_string(),
        category,
        score,
        reasoning: reasoning.to_string(),
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn rules(url: &str) -> Classification {
        let domain = domain_of(url).unwrap_or_else(|| url.to_string());
        classify_by_rules(url, &domain, Utc::now())
    }

    #[test]
    fn domain_strips_www() {
        assert_eq!(domain_of("https://www.github.com/a/b").as_deref(), Some("github.com"));
        assert_eq!(domain_of("not a url"), None);
    }

    #[test]
    fn rule_table_order_and_defaults() {
        assert_eq!(rules("https://github.com/rust-lang").category, Category::Productive);
        assert_eq!(rules("https://github.com/rust-lang").score, 85.0);
        assert_eq!(rules("https://www.youtube.com/watch?v=1").score, 20.0);
        assert_eq!(rules("https://mail.example.org").score, 50.0);
        let unknown = rules("https://example.org");
        assert_eq!((unknown.category, unknown.score), (Category::Neutral, 55.0));
    }

    #[test]
    fn productive_patterns_win_over_distracting() {
        // "docs." matches before "youtube.com" would.
        let c = rules("https://docs.youtube.com/api");
        assert_eq!(c.category, Category::Productive);
    }

    #[test]
    fn unparsable_input_is_used_verbatim() {
        let c = rules("reddit.com/r/rust");
        assert_eq!(c.domain, "reddit.com/r/rust");
        assert_eq!(c.category, Category::Distracting);
    }

    #[tokio::test]
    async fn heuristic_classifier_ignores_cache_misses() {
        let store = SharedStateStore::in_memory();
        let classifier = DistractionClassifier::heuristic(store.clone());
        let c = classifier.classify("https://github.com", Utc::now()).await;
        assert_eq!(c.category, Category::Productive);
        // Rule-table results are not cached.
        assert!(store.get::<ClassificationCache>().unwrap().0.is_empty());
    }

    #[tokio::test]
    async fn external_result_is_cached_and_reused() {
        let mut server = mockito::Server::new_async().await;
        let content = r#"{"category":"distracting","score":12,"reasoning":"memes"}"#;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(
                serde_json::json!({ "choices": [{ "message": { "content": content } }] })
                    .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let store = SharedStateStore::in_memory();
        let client =
            ChatClient::new("sk", Some(&server.url()), StdDuration::from_secs(5)).unwrap();
        let classifier = DistractionClassifier::external(store.clone(), client, true);

        let first = classifier.classify("https://example.org/page", Utc::now()).await;
        assert_eq!(first.category, Category::Distracting);
        assert_eq!(first.score, 12.0);
        let second = classifier.classify("https://example.org/other", Utc::now()).await;
        assert_eq!(second.reasoning, "memes");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn external_failure_falls_back_to_rules() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .create_async()
            .await;

        let store = SharedStateStore::in_memory();
        let client =
            ChatClient::new("sk", Some(&server.url()), StdDuration::from_secs(5)).unwrap();
        let classifier = DistractionClassifier::external(store.clone(), client, true);
        let c = classifier.classify("https://stackoverflow.com/q/1", Utc::now()).await;
        assert_eq!(c.category, Category::Productive);
        assert!(store.get::<ClassificationCache>().unwrap().0.is_empty());
    }

    #[test]
    fn expired_entries_are_ignored_and_pruned() {
        let store = SharedStateStore::in_memory();
        let now = Utc::now();
        let mut stale = classify_by_rules("https://old.example", "old.example", now);
        stale.timestamp = now - Duration::days(8);
        let fresh = classify_by_rules("https://new.example", "new.example", now);
        store
            .set(&ClassificationCache(BTreeMap::from([
                ("old.example".to_string(), stale),
                ("new.example".to_string(), fresh),
            ])))
            .unwrap();

        let classifier = DistractionClassifier::heuristic(store.clone());
        assert!(classifier.cached("old.example", now).is_none());
        assert!(classifier.cached("new.example", now).is_some());
        assert_eq!(classifier.prune_expired(now).unwrap(), 1);
        classifier.clear_cache().unwrap();
        assert!(classifier.cached("new.example", now).is_none());
    }
}
