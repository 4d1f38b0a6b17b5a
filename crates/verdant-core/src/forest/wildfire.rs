//! Wildfire ignition, escalation, spread and recovery.
//!
//! A fire is either dormant (`active == false`, level 0, no affected trees)
//! or active and escalating. It leaves the active state by being
//! extinguished ([`WildfireEngine::stop`]) or by burning out once no tree is
//! left burning.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use super::{AnimalStatus, ForestState, TreeStatus};

pub(crate) const BASE_SPREAD_RATE: f64 = 0.1;

/// Slack for accumulated floating point steps in recovery.
const EPSILON: f64 = 1e-9;

/// Tunables for [`WildfireEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct WildfireParams {
    pub base_spread_rate: f64,
    pub spread_radius: f64,
    pub escalation_factor: f64,
    pub escalation_window_secs: f64,
    pub base_level_step: f64,
    pub burn_rate: f64,
    /// Candidates per burning tree are capped at `ceil(spreading_rate * K)`.
    pub candidates_per_rate: f64,
    pub max_spreading_rate: f64,
    pub ignition_intensity: f64,
    /// Burning trees below this intensity survive an extinguish.
    pub salvage_below: f64,
    pub recovery_step: f64,
    pub recovered_at: f64,
}

impl Default for WildfireParams {
    fn default() -> Self {
        Self {
            base_spread_rate: BASE_SPREAD_RATE,
            spread_radius: 50.0,
            escalation_factor: 1.5,
            escalation_window_secs: 60.0,
            base_level_step: 0.01,
            burn_rate: 0.05,
            candidates_per_rate: 10.0,
            max_spreading_rate: 10.0,
            ignition_intensity: 0.1,
            salvage_below: 0.7,
            recovery_step: 0.1,
            recovered_at: 0.9,
        }
    }
}

/// Ignition chance for a healthy tree `distance` away from a burning one.
/// Zero outside `radius`; otherwise non-increasing in `distance`.
pub fn spread_probability(distance: f64, radius: f64, spreading_rate: f64) -> f64 {
    if !(0.0..=radius).contains(&distance) || radius <= 0.0 {
        return 0.0;
    }
    let distance_factor = (radius - distance) / radius;
    (0.5 + distance_factor * spreading_rate).min(0.95)
}

/// What one escalation tick did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WildfireUpdate {
    pub ignited: Vec<String>,
    pub burnt: Vec<String>,
    pub burned_out: bool,
}

#[derive(Debug, Clone, Default)]
pub struct WildfireEngine {
    params: WildfireParams,
}

impl WildfireEngine {
    pub fn new(params: WildfireParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &WildfireParams {
        &self.params
    }

    /// `factor ^ (elapsed / window)`.
    pub fn escalation_multiplier(&self, elapsed_secs: f64) -> f64 {
        self.params
            .escalation_factor
            .powf(elapsed_secs.max(0.0) / self.params.escalation_window_secs)
    }

    /// Ignite a random healthy tree. Returns its id, or `None` if a fire is
    /// already burning or nothing healthy is left.
    pub fn start<R: Rng + ?Sized>(
        &self,
        forest: &mut ForestState,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Option<String> {
        if forest.wildfire.active {
            return None;
        }
        let healthy: Vec<usize> = forest
            .trees
            .iter()
            .enumerate()
            .filter(|(_, t)| t.status == TreeStatus::Healthy)
            .map(|(i, _)| i)
            .collect();
        let &index = healthy.choose(rng)?;

        let tree = &mut forest.trees[index];
        tree.transition(TreeStatus::Burning);
        tree.burn_intensity = Some(self.params.ignition_intensity);
        let id = tree.id.clone();

        let fire = &mut forest.wildfire;
        fire.active = true;
        fire.level = 0.1;
        fire.affected_tree_ids = BTreeSet::from([id.clone()]);
        fire.start_time = Some(now);
        fire.spreading_rate = self.params.base_spread_rate;
        set_animals(forest, AnimalStatus::Fleeing);
        forest.last_update = now;

        info!(tree_id = %id, "wildfire ignited");
        Some(id)
    }

    /// One escalation tick. No-op while dormant.
    pub fn update<R: Rng + ?Sized>(
        &self,
        forest: &mut ForestState,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> WildfireUpdate {
        let mut outcome = WildfireUpdate::default();
        if !forest.wildfire.active {
            return outcome;
        }

        let started = forest.wildfire.start_time.unwrap_or(now);
        let elapsed = (now - started).num_milliseconds() as f64 / 1000.0;
        let multiplier = self.escalation_multiplier(elapsed);

        let fire = &mut forest.wildfire;
        fire.level = (fire.level + self.params.base_level_step * multiplier).min(1.0);
        fire.spreading_rate = (fire.spreading_rate * multiplier).min(self.params.max_spreading_rate);
        let rate = fire.spreading_rate;

        let burning: Vec<usize> = forest
            .trees
            .iter()
            .enumerate()
            .filter(|(_, t)| t.status == TreeStatus::Burning)
            .map(|(i, _)| i)
            .collect();

        // Spread only from trees that were burning when the tick began.
        let max_candidates = (rate * self.params.candidates_per_rate).ceil().max(0.0) as usize;
        let mut ignite: BTreeSet<usize> = BTreeSet::new();
        for &source in &burning {
            let mut candidates: Vec<(usize, f64)> = forest
                .trees
                .iter()
                .enumerate()
                .filter(|(i, t)| t.status == TreeStatus::Healthy && !ignite.contains(i))
                .map(|(i, t)| (i, forest.trees[source].distance_to(t)))
                .filter(|&(_, d)| d <= self.params.spread_radius)
                .collect();
            candidates.sort_by(|a, b| a.1.total_cmp(&b.1));

            for (index, distance) in candidates.into_iter().take(max_candidates) {
                let p = spread_probability(distance, self.params.spread_radius, rate);
                if rng.gen::<f64>() < p {
                    ignite.insert(index);
                }
            }
        }

        for &index in &burning {
            let tree = &mut forest.trees[index];
            let intensity = tree.burn_intensity.unwrap_or(self.params.ignition_intensity)
                + self.params.burn_rate * multiplier;
            if intensity >= 1.0 {
                tree.transition(TreeStatus::Burnt);
                outcome.burnt.push(tree.id.clone());
            } else {
                tree.burn_intensity = Some(intensity);
            }
        }

        for index in ignite {
            let tree = &mut forest.trees[index];
            tree.transition(TreeStatus::Burning);
            tree.burn_intensity = Some(self.params.ignition_intensity);
            outcome.ignited.push(tree.id.clone());
        }
        forest
            .wildfire
            .affected_tree_ids
            .extend(outcome.ignited.iter().cloned());
        forest.last_update = now;

        if forest.count(TreeStatus::Burning) == 0 {
            self.go_dormant(forest);
            outcome.burned_out = true;
            info!(burnt = forest.count(TreeStatus::Burnt), "wildfire burned out");
        } else if !outcome.ignited.is_empty() {
            debug!(ignited = outcome.ignited.len(), level = forest.wildfire.level, "wildfire spread");
        }
        outcome
    }

    /// Extinguish the fire. Lightly burnt trees start recovering, the rest
    /// are lost. Returns `false` if no fire was active; the dormant state is
    /// enforced either way.
    pub fn stop(&self, forest: &mut ForestState, now: DateTime<Utc>) -> bool {
        let was_active = forest.wildfire.active;
        for tree in forest
            .trees
            .iter_mut()
            .filter(|t| t.status == TreeStatus::Burning)
        {
            let intensity = tree.burn_intensity.unwrap_or(0.0);
            if intensity < self.params.salvage_below {
                tree.transition(TreeStatus::Recovering);
            } else {
                tree.transition(TreeStatus::Burnt);
            }
        }
        self.go_dormant(forest);
        forest.last_update = now;
        if was_active {
            info!(recovering = forest.count(TreeStatus::Recovering), "wildfire extinguished");
        }
        was_active
    }

    /// One recovery tick. Returns the ids of trees that became healthy.
    pub fn recover_trees(&self, forest: &mut ForestState) -> Vec<String> {
        let mut healed = Vec::new();
        for tree in forest
            .trees
            .iter_mut()
            .filter(|t| t.status == TreeStatus::Recovering)
        {
            let recovery = (tree.recovery.unwrap_or(0.0) + self.params.recovery_step).min(1.0);
            if recovery + EPSILON >= self.params.recovered_at {
                tree.transition(TreeStatus::Healthy);
                healed.push(tree.id.clone());
            } else {
                tree.recovery = Some(recovery);
            }
        }
        healed
    }

    fn go_dormant(&self, forest: &mut ForestState) {
        let fire = &mut forest.wildfire;
        fire.active = false;
        fire.level = 0.0;
        fire.affected_tree_ids.clear();
        fire.start_time = None;
        fire.spreading_rate = self.params.base_spread_rate;
        set_animals(forest, AnimalStatus::Visible);
    }
}

fn set_animals(forest: &mut ForestState, status: AnimalStatus) {
    for animal in forest
        .animals
        .iter_mut()
        .filter(|a| a.status != AnimalStatus::Hidden)
    {
        animal.status = status;
    }
}

/// Decides when sustained low focus should light a fire and when recovered
/// focus should put it out. The streak start is kept by the caller so it
/// survives across processes.
#[derive(Debug, Clone, PartialEq)]
pub struct LowFocusTracker {
    pub ignite_below: f64,
    pub ignite_after: Duration,
    pub extinguish_above: f64,
}

/// Verdict of [`LowFocusTracker::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireSignal {
    Ignite,
    Extinguish,
    Hold,
}

impl Default for LowFocusTracker {
    fn default() -> Self {
        Self {
            ignite_below: 30.0,
            ignite_after: Duration::seconds(60),
            extinguish_above: 70.0,
        }
    }
}

impl LowFocusTracker {
    pub fn observe(
        &self,
        low_since: &mut Option<DateTime<Utc>>,
        score: f64,
        now: DateTime<Utc>,
    ) -> FireSignal {
        if score < self.ignite_below {
            let since = *low_since.get_or_insert(now);
            if now - since >= self.ignite_after {
                return FireSignal::Ignite;
            }
            return FireSignal::Hold;
        }
        *low_since = None;
        if score > self.extinguish_above {
            FireSignal::Extinguish
        } else {
            FireSignal::Hold
        }
    }
}
