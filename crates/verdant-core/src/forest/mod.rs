//! Forest document: trees, animals and the wildfire block.
//!
//! Tree lifecycle:
//!
//! ```text
//! Healthy -> Burning -> Burnt
//!    ^          |
//!    |          v
//!    +----- Recovering
//! ```

mod growth;
mod wildfire;

pub use growth::{ForestGrowthEngine, GrowthParams};
pub use wildfire::{
    spread_probability, FireSignal, LowFocusTracker, WildfireEngine, WildfireParams, WildfireUpdate,
};

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{Document, DocumentKey};

/// Visual variants a tree can be rendered with.
pub const TREE_TYPES: &[&str] = &[
    "row-1-column-1",
    "row-1-column-2",
    "row-1-column-3",
    "row-1-column-4",
    "row-1-column-5",
    "row-1-column-6",
    "row-1-column-7",
    "row-3-column-2",
    "row-3-column-3",
    "row-4-column-1",
];

pub const ANIMAL_TYPES: &[&str] = &["deer", "rabbit", "bird", "squirrel", "fox"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeStatus {
    Healthy,
    Burning,
    Burnt,
    Recovering,
}

impl TreeStatus {
    /// Transition table for a single tree.
    pub fn can_become(self, to: TreeStatus) -> bool {
        use TreeStatus::*;
        matches!(
            (self, to),
            (Healthy, Burning) | (Burning, Burnt) | (Burning, Recovering) | (Recovering, Healthy)
        )
    }

    /// Trees that keep growing on focused ticks.
    pub fn grows(self) -> bool {
        matches!(self, TreeStatus::Healthy | TreeStatus::Recovering)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrowthStage {
    Sapling,
    Young,
    Mature,
    Full,
}

impl GrowthStage {
    pub fn from_height(height: f64) -> Self {
        if height < 30.0 {
            GrowthStage::Sapling
        } else if height < 50.0 {
            GrowthStage::Young
        } else if height < 75.0 {
            GrowthStage::Mature
        } else {
            GrowthStage::Full
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tree {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub height: f64,
    pub age: u32,
    pub growth_stage: GrowthStage,
    pub status: TreeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burn_intensity: Option<f64>,
    /// Fraction of the canopy restored, present while recovering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<f64>,
    pub x: f64,
    pub y: f64,
}

impl Tree {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, height: f64, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            height,
            age: 0,
            growth_stage: GrowthStage::from_height(height),
            status: TreeStatus::Healthy,
            burn_intensity: None,
            recovery: None,
            x,
            y,
        }
    }

    /// Move to `to` if the transition table allows it, keeping
    /// `burn_intensity` and `recovery` consistent with the new status.
    pub fn transition(&mut self, to: TreeStatus) -> bool {
        if !self.status.can_become(to) {
            return false;
        }
        match to {
            TreeStatus::Burning => {
                self.burn_intensity = Some(0.1);
                self.recovery = None;
            }
            TreeStatus::Burnt => {
                self.burn_intensity = None;
                self.recovery = None;
            }
            TreeStatus::Recovering => {
                let intensity = self.burn_intensity.take().unwrap_or(0.0);
                self.recovery = Some((1.0 - intensity).clamp(0.0, 1.0));
            }
            TreeStatus::Healthy => {
                self.burn_intensity = None;
                self.recovery = None;
            }
        }
        self.status = to;
        true
    }

    pub fn distance_to(&self, other: &Tree) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimalStatus {
    Visible,
    Hidden,
    Fleeing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Animal {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub x: f64,
    pub y: f64,
    pub status: AnimalStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WildfireState {
    pub active: bool,
    pub level: f64,
    pub affected_tree_ids: BTreeSet<String>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub start_time: Option<DateTime<Utc>>,
    pub spreading_rate: f64,
}

impl Default for WildfireState {
    fn default() -> Self {
        Self {
            active: false,
            level: 0.0,
            affected_tree_ids: BTreeSet::new(),
            start_time: None,
            spreading_rate: wildfire::BASE_SPREAD_RATE,
        }
    }
}

/// The `forestState` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForestState {
    pub trees: Vec<Tree>,
    pub animals: Vec<Animal>,
    pub wildfire: WildfireState,
    pub session_active: bool,
    pub session_id: String,
    pub focus_minutes: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_update: DateTime<Utc>,
}

impl Default for ForestState {
    fn default() -> Self {
        Self {
            trees: Vec::new(),
            animals: Vec::new(),
            wildfire: WildfireState::default(),
            session_active: false,
            session_id: String::new(),
            focus_minutes: 0,
            last_update: Utc::now(),
        }
    }
}

impl Document for ForestState {
    const KEY: DocumentKey = DocumentKey::ForestState;
}

/// Tree counts per status, as shown by the CLI and popup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForestSummary {
    pub total: usize,
    pub healthy: usize,
    pub burning: usize,
    pub burnt: usize,
    pub recovering: usize,
    pub animals: usize,
}

impl ForestState {
    /// Fresh forest bound to a session.
    pub fn for_session(session_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_active: true,
            session_id: session_id.into(),
            last_update: now,
            ..Self::default()
        }
    }

    /// Writes from timers must only land on the forest of the live session.
    pub fn accepts_writes_for(&self, session_id: &str) -> bool {
        self.session_active && !session_id.is_empty() && self.session_id == session_id
    }

    pub fn tree(&self, id: &str) -> Option<&Tree> {
        self.trees.iter().find(|t| t.id == id)
    }

    pub fn count(&self, status: TreeStatus) -> usize {
        self.trees.iter().filter(|t| t.status == status).count()
    }

    pub fn summary(&self) -> ForestSummary {
        ForestSummary {
            total: self.trees.len(),
            healthy: self.count(TreeStatus::Healthy),
            burning: self.count(TreeStatus::Burning),
            burnt: self.count(TreeStatus::Burnt),
            recovering: self.count(TreeStatus::Recovering),
            animals: self.animals.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_bands() {
        assert_eq!(GrowthStage::from_height(29.9), GrowthStage::Sapling);
        assert_eq!(GrowthStage::from_height(30.0), GrowthStage::Young);
        assert_eq!(GrowthStage::from_height(74.0), GrowthStage::Mature);
        assert_eq!(GrowthStage::from_height(75.0), GrowthStage::Full);
    }

    #[test]
    fn tree_transitions_follow_table() {
        let mut t = Tree::new("a", "row-1-column-1", 40.0, 0.0, 0.0);
        assert!(!t.transition(TreeStatus::Recovering));
        assert!(!t.transition(TreeStatus::Burnt));
        assert!(t.transition(TreeStatus::Burning));
        assert_eq!(t.burn_intensity, Some(0.1));
        assert!(t.transition(TreeStatus::Recovering));
        assert_eq!(t.burn_intensity, None);
        assert!((t.recovery.unwrap() - 0.9).abs() < 1e-9);
        assert!(!t.transition(TreeStatus::Burning));
        assert!(t.transition(TreeStatus::Healthy));
        assert_eq!(t.recovery, None);
    }

    #[test]
    fn burnt_is_terminal() {
        let mut t = Tree::new("a", "x", 40.0, 0.0, 0.0);
        t.transition(TreeStatus::Burning);
        t.transition(TreeStatus::Burnt);
        for to in [
            TreeStatus::Healthy,
            TreeStatus::Burning,
            TreeStatus::Recovering,
        ] {
            assert!(!t.transition(to));
        }
    }

    #[test]
    fn forest_json_shape() {
        let mut forest = ForestState::for_session("s1", Utc::now());
        forest.trees.push(Tree::new("t1", "row-1-column-1", 25.0, 10.0, 200.0));
        let json = serde_json::to_value(&forest).unwrap();
        assert_eq!(json["sessionActive"], true);
        assert_eq!(json["trees"][0]["type"], "row-1-column-1");
        assert_eq!(json["trees"][0]["growthStage"], "sapling");
        assert!(json["trees"][0].get("burnIntensity").is_none());
        assert_eq!(json["wildfire"]["affectedTreeIds"], serde_json::json!([]));
        assert_eq!(json["wildfire"]["spreadingRate"], 0.1);
    }

    #[test]
    fn writes_are_scoped_to_live_session() {
        let mut forest = ForestState::for_session("s1", Utc::now());
        assert!(forest.accepts_writes_for("s1"));
        assert!(!forest.accepts_writes_for("s2"));
        forest.session_active = false;
        assert!(!forest.accepts_writes_for("s1"));
    }
}
