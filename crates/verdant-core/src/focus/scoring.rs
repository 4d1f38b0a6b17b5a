//! Focus scoring strategies.
//!
//! Both strategies share one contract: [`ScoringInput`] in, [`FocusAnalysis`]
//! out. The external analyzer falls back to the heuristic on any failure, so
//! [`FocusScorer::score`] is infallible.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::classifier::{Category, Classification, DistractionClassifier};
use super::llm::{ApiConfig, ChatClient};
use crate::error::ScoringError;
use crate::storage::SharedStateStore;

const SITE_WEIGHT: f64 = 0.40;
const DWELL_WEIGHT: f64 = 0.25;
const SWITCH_WEIGHT: f64 = 0.20;
const SESSION_WEIGHT: f64 = 0.15;

const SYSTEM_PROMPT: &str = "You are a focus and productivity analyzer. Calculate an adaptive \
focus score (0-100) based on multiple factors.

Return JSON with:
- focusScore (0-100): Adaptive score considering ALL factors
- reasoning: Brief explanation of score calculation
- suggestions: Array of 2-3 actionable tips
- distractionLevel: 'low', 'medium', or 'high'

Scoring factors (weighted):
1. Website type (40%): Productive tools/docs = high, entertainment/social = low
2. Time on site (25%): Longer focused time = higher score
3. Tab switching (20%): Frequent switching = lower score
4. Session context (15%): Overall session behavior";

/// Signals gathered for one scoring tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringInput {
    pub current_url: String,
    pub tab_switch_count: u32,
    pub time_on_site: Duration,
    pub session_duration: Duration,
    pub distraction_site_visits: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistractionLevel {
    Low,
    Medium,
    High,
}

impl DistractionLevel {
    pub fn from_score(score: f64) -> Self {
        if score > 70.0 {
            DistractionLevel::Low
        } else if score > 40.0 {
            DistractionLevel::Medium
        } else {
            DistractionLevel::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusAnalysis {
    pub focus_score: f64,
    pub distraction_level: DistractionLevel,
    pub reasoning: String,
    pub suggestions: Vec<String>,
}

/// Reply shape expected from the external analyzer.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ExternalAnalysis {
    focus_score: f64,
    reasoning: String,
    suggestions: Vec<String>,
    distraction_level: DistractionLevel,
}

impl Default for ExternalAnalysis {
    fn default() -> Self {
        Self {
            focus_score: 50.0,
            reasoning: "Analysis complete".to_string(),
            suggestions: Vec::new(),
            distraction_level: DistractionLevel::Medium,
        }
    }
}

/// Scoring strategy, chosen once from the `apiConfig` document.
#[derive(Debug, Clone)]
pub enum FocusScorer {
    Heuristic {
        classifier: DistractionClassifier,
    },
    External {
        classifier: DistractionClassifier,
        client: ChatClient,
    },
}

impl FocusScorer {
    pub fn heuristic(store: SharedStateStore) -> Self {
        FocusScorer::Heuristic {
            classifier: DistractionClassifier::heuristic(store),
        }
    }

    /// Build the strategy the stored configuration asks for. A provider
    /// without a usable credential degrades to the heuristic.
    pub fn from_config(store: SharedStateStore, api: &ApiConfig, timeout: StdDuration) -> Self {
        match ChatClient::from_config(api, timeout) {
            Ok(Some(client)) => FocusScorer::External {
                classifier: DistractionClassifier::external(store, client.clone(), api.use_cache),
                client,
            },
            Ok(None) => Self::heuristic(store),
            Err(e @ ScoringError::MissingCredential { .. }) => {
                debug!(error = %e, "using heuristic scorer");
                Self::heuristic(store)
            }
            Err(e) => {
                warn!(error = %e, "external scorer unavailable, using heuristic");
                Self::heuristic(store)
            }
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, FocusScorer::External { .. })
    }

    pub fn classifier(&self) -> &DistractionClassifier {
        match self {
            FocusScorer::Heuristic { classifier } | FocusScorer::External { classifier, .. } => {
                classifier
            }
        }
    }

    pub async fn score(&self, input: &ScoringInput, now: DateTime<Utc>) -> FocusAnalysis {
        if let FocusScorer::External { client, .. } = self {
            match analyze_external(client, input).await {
                Ok(analysis) => return analysis,
                Err(e) => warn!(error = %e, "external focus analysis failed, using heuristic"),
            }
        }
        let classification = self.classifier().classify(&input.current_url, now).await;
        heuristic_analysis(input, &classification)
    }
}

async fn analyze_external(
    client: &ChatClient,
    input: &ScoringInput,
) -> Result<FocusAnalysis, ScoringError> {
    let on_site = input.time_on_site.num_seconds().max(0);
    let prompt = format!(
        "Calculate adaptive focus score:\n\n\
         Current URL: {url}\n\
         Time on current site: {m}m {s}s\n\
         Tab switches in last window: {switches}\n\
         Total session duration: {session} minutes\n\
         Historical distraction visits: {visits}\n\n\
         Calculate a nuanced score that reflects BOTH the site type AND the user's behavior.",
        url = input.current_url,
        m = on_site / 60,
        s = on_site % 60,
        switches = input.tab_switch_count,
        session = input.session_duration.num_minutes().max(0),
        visits = input.distraction_site_visits,
    );
    let reply: ExternalAnalysis = client.complete_json(SYSTEM_PROMPT, &prompt, 0.7, 300).await?;
    let mut suggestions = reply.suggestions;
    suggestions.truncate(3);
    Ok(FocusAnalysis {
        focus_score: reply.focus_score.clamp(0.0, 100.0),
        distraction_level: reply.distraction_level,
        reasoning: reply.reasoning,
        suggestions,
    })
}

fn dwell_score(minutes: f64) -> f64 {
    if minutes > 15.0 {
        95.0
    } else if minutes > 10.0 {
        85.0
    } else if minutes > 5.0 {
        75.0
    } else if minutes > 2.0 {
        60.0
    } else if minutes > 0.5 {
        45.0
    } else {
        30.0
    }
}

fn switch_score(switches: u32) -> f64 {
    match switches {
        n if n > 30 => 30.0,
        n if n > 20 => 50.0,
        n if n > 15 => 65.0,
        n if n > 10 => 75.0,
        _ => 90.0,
    }
}

fn session_score(session_minutes: f64, distraction_visits: u32) -> f64 {
    if session_minutes > 30.0 && distraction_visits < 3 {
        90.0
    } else if distraction_visits > 5 {
        40.0
    } else {
        70.0
    }
}

/// Weighted four-factor score with contextual suggestions.
pub fn heuristic_analysis(input: &ScoringInput, site: &Classification) -> FocusAnalysis {
    let minutes_on_site = input.time_on_site.num_milliseconds().max(0) as f64 / 60_000.0;
    let session_minutes = input.session_duration.num_milliseconds().max(0) as f64 / 60_000.0;

    let dwell = dwell_score(minutes_on_site);
    let switches = switch_score(input.tab_switch_count);
    let session = session_score(session_minutes, input.distraction_site_visits);

    let score = (site.score * SITE_WEIGHT
        + dwell * DWELL_WEIGHT
        + switches * SWITCH_WEIGHT
        + session * SESSION_WEIGHT)
        .round()
        .clamp(0.0, 100.0);

    let mut suggestions = Vec::new();
    if site.category == Category::Productive {
        if minutes_on_site < 2.0 {
            suggestions.push(
                "Good site choice! Try to stay focused here for at least 5 minutes.".to_string(),
            );
        } else if minutes_on_site > 10.0 {
            suggestions.push("Excellent deep focus! You're in the zone.".to_string());
        }
    }
    match input.tab_switch_count {
        n if n > 20 => suggestions.push(format!(
            "{n} tab switches is quite high. Try to focus on fewer tasks."
        )),
        n if n > 15 => suggestions.push(
            "Moderate tab switching detected. Consider focusing on one task at a time.".to_string(),
        ),
        n if n < 5 => {
            suggestions.push("Great focus stability with minimal tab switching!".to_string())
        }
        _ => {}
    }
    if site.category == Category::Distracting && minutes_on_site > 5.0 {
        suggestions.push(format!(
            "You've been on {} for {} minutes. Consider refocusing.",
            site.domain,
            minutes_on_site.floor()
        ));
    }
    if suggestions.is_empty() {
        suggestions.push("Maintain your current focus level.".to_string());
    }
    suggestions.truncate(3);

    let reasoning = format!(
        "Site: {} ({}/100). Time: {}m ({}/100). Switches: {} ({}/100). Overall: {}/100",
        site.category,
        site.score,
        minutes_on_site.floor(),
        dwell,
        input.tab_switch_count,
        switches,
        score
    );

    FocusAnalysis {
        focus_score: score,
        distraction_level: DistractionLevel::from_score(score),
        reasoning,
        suggestions,
    }
}
