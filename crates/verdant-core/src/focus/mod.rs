//! Attention signals and scoring.

mod activity;
mod classifier;
mod distraction_sites;
mod llm;
mod metrics;
mod scoring;

pub use activity::{ActivityEvent, ActivityKind, ActivityMonitor, TabChange};
pub use classifier::{
    classify_by_rules, domain_of, Category, Classification, ClassificationCache,
    DistractionClassifier,
};
pub use distraction_sites::{DistractionSite, DistractionSites};
pub use llm::{ApiConfig, ChatClient, Provider, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use metrics::FocusMetrics;
pub use scoring::{heuristic_analysis, DistractionLevel, FocusAnalysis, FocusScorer, ScoringInput};
