//! Tree growth and planting.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;
use uuid::{Builder, Uuid};

use super::{Animal, AnimalStatus, ForestState, GrowthStage, Tree, ANIMAL_TYPES, TREE_TYPES};
use crate::session::Session;

/// Tunables for [`ForestGrowthEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct GrowthParams {
    pub max_height: f64,
    pub growth_rate: f64,
    /// Starter height band for new saplings, `[min, max)`.
    pub sapling_height: (f64, f64),
    pub center_x: f64,
    pub spread: f64,
    pub ground_y: f64,
    pub initial_trees: usize,
    /// One animal joins the forest every `animal_every` focused ticks.
    pub animal_every: u32,
}

impl Default for GrowthParams {
    fn default() -> Self {
        Self {
            max_height: 200.0,
            growth_rate: 5.0,
            sapling_height: (20.0, 40.0),
            center_x: 960.0,
            spread: 600.0,
            ground_y: 200.0,
            initial_trees: 5,
            animal_every: 5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ForestGrowthEngine {
    params: GrowthParams,
}

impl ForestGrowthEngine {
    pub fn new(params: GrowthParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &GrowthParams {
        &self.params
    }

    /// One focused tick: grow every living tree, then plant one sapling.
    ///
    /// Does nothing unless `session` is running and owns `forest`. Returns
    /// the planted sapling.
    pub fn tick<R: Rng + ?Sized>(
        &self,
        session: &Session,
        forest: &mut ForestState,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Option<Tree> {
        if !session.is_running() || !forest.accepts_writes_for(&session.session_id) {
            debug!(session_id = %session.session_id, "growth tick skipped");
            return None;
        }

        self.grow_existing(forest);
        let sapling = self.plant_sapling(forest, rng);
        forest.focus_minutes += 1;
        forest.last_update = now;
        Some(sapling)
    }

    fn grow_existing(&self, forest: &mut ForestState) {
        for tree in forest.trees.iter_mut().filter(|t| t.status.grows()) {
            tree.height = (tree.height + self.params.growth_rate).min(self.params.max_height);
            tree.age += 1;
            tree.growth_stage = GrowthStage::from_height(tree.height);
        }
    }

    /// Append one sapling at a random spot around the forest centre.
    pub fn plant_sapling<R: Rng + ?Sized>(&self, forest: &mut ForestState, rng: &mut R) -> Tree {
        let (lo, hi) = self.params.sapling_height;
        let kind = TREE_TYPES.choose(rng).copied().unwrap_or(TREE_TYPES[0]);
        let tree = Tree::new(
            random_id(rng),
            kind,
            rng.gen_range(lo..hi),
            self.random_x(rng),
            self.params.ground_y,
        );
        forest.trees.push(tree.clone());
        tree
    }

    /// Starter saplings for a brand new session.
    pub fn plant_initial_forest<R: Rng + ?Sized>(&self, forest: &mut ForestState, rng: &mut R) {
        for _ in 0..self.params.initial_trees {
            self.plant_sapling(forest, rng);
        }
    }

    /// Whether the focused tick that just completed earns an animal.
    pub fn animal_due(&self, focused_ticks: u32) -> bool {
        self.params.animal_every > 0 && focused_ticks > 0 && focused_ticks % self.params.animal_every == 0
    }

    pub fn spawn_animal<R: Rng + ?Sized>(&self, forest: &mut ForestState, rng: &mut R) -> Animal {
        let kind = ANIMAL_TYPES.choose(rng).copied().unwrap_or(ANIMAL_TYPES[0]);
        let status = if forest.wildfire.active {
            AnimalStatus::Fleeing
        } else {
            AnimalStatus::Visible
        };
        let animal = Animal {
            id: random_id(rng),
            kind: kind.to_string(),
            x: self.random_x(rng),
            y: self.params.ground_y - 10.0,
            status,
        };
        forest.animals.push(animal.clone());
        animal
    }

    fn random_x<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.params.center_x - self.params.spread / 2.0 + rng.gen_range(0.0..self.params.spread)
    }
}

/// UUID v4 drawn from `rng`, so seeded runs plant identical forests.
pub(crate) fn random_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    let bytes: [u8; 16] = rng.gen();
    let id: Uuid = Builder::from_random_bytes(bytes).into_uuid();
    id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::TreeStatus;
    use crate::session::SessionManager;
    use rand::SeedableRng;
    use rand_pcg::Mcg128Xsl64;

    fn running() -> (Session, ForestState) {
        let mut session = Session::default();
        SessionManager::default().start(&mut session, Utc::now());
        let forest = ForestState::for_session(session.session_id.clone(), Utc::now());
        (session, forest)
    }

    #[test]
    fn tick_grows_and_plants() {
        let engine = ForestGrowthEngine::default();
        let mut rng = Mcg128Xsl64::seed_from_u64(7);
        let (session, mut forest) = running();
        engine.plant_initial_forest(&mut forest, &mut rng);
        assert_eq!(forest.trees.len(), 5);
        let before: Vec<f64> = forest.trees.iter().map(|t| t.height).collect();

        let sapling = engine.tick(&session, &mut forest, &mut rng, Utc::now()).unwrap();
        assert_eq!(forest.trees.len(), 6);
        assert!((20.0..40.0).contains(&sapling.height));
        assert!((660.0..1260.0).contains(&sapling.x));
        assert_eq!(sapling.y, 200.0);
        for (tree, h) in forest.trees.iter().zip(before) {
            assert_eq!(tree.height, h + 5.0);
            assert_eq!(tree.age, 1);
        }
        assert_eq!(forest.focus_minutes, 1);
    }

    #[test]
    fn height_is_capped() {
        let engine = ForestGrowthEngine::default();
        let mut rng = Mcg128Xsl64::seed_from_u64(1);
        let (session, mut forest) = running();
        forest.trees.push(Tree::new("old", "x", 198.0, 0.0, 0.0));
        engine.tick(&session, &mut forest, &mut rng, Utc::now());
        assert_eq!(forest.tree("old").unwrap().height, 200.0);
        assert_eq!(forest.tree("old").unwrap().growth_stage, GrowthStage::Full);
    }

    #[test]
    fn burning_and_burnt_trees_do_not_grow() {
        let engine = ForestGrowthEngine::default();
        let mut rng = Mcg128Xsl64::seed_from_u64(2);
        let (session, mut forest) = running();
        let mut burning = Tree::new("b", "x", 50.0, 0.0, 0.0);
        burning.transition(TreeStatus::Burning);
        forest.trees.push(burning);
        engine.tick(&session, &mut forest, &mut rng, Utc::now());
        let b = forest.tree("b").unwrap();
        assert_eq!((b.height, b.age), (50.0, 0));
    }

    #[test]
    fn paused_tick_changes_nothing() {
        let engine = ForestGrowthEngine::default();
        let mut rng = Mcg128Xsl64::seed_from_u64(3);
        let (mut session, mut forest) = running();
        engine.plant_initial_forest(&mut forest, &mut rng);
        session.paused = true;
        let snapshot = forest.clone();
        for _ in 0..5 {
            assert!(engine.tick(&session, &mut forest, &mut rng, Utc::now()).is_none());
        }
        assert_eq!(forest, snapshot);
    }

    #[test]
    fn stale_session_cannot_grow_forest() {
        let engine = ForestGrowthEngine::default();
        let mut rng = Mcg128Xsl64::seed_from_u64(4);
        let (mut session, mut forest) = running();
        session.session_id = "someone-else".into();
        assert!(engine.tick(&session, &mut forest, &mut rng, Utc::now()).is_none());
        assert!(forest.trees.is_empty());
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        let engine = ForestGrowthEngine::default();
        let mut a = ForestState::default();
        let mut b = ForestState::default();
        engine.plant_initial_forest(&mut a, &mut Mcg128Xsl64::seed_from_u64(9));
        engine.plant_initial_forest(&mut b, &mut Mcg128Xsl64::seed_from_u64(9));
        assert_eq!(a.trees, b.trees);
    }

    #[test]
    fn animals_every_fifth_tick_and_flee_fire() {
        let engine = ForestGrowthEngine::default();
        assert!(!engine.animal_due(0));
        assert!(!engine.animal_due(4));
        assert!(engine.animal_due(5));
        assert!(engine.animal_due(10));

        let mut rng = Mcg128Xsl64::seed_from_u64(5);
        let mut forest = ForestState::default();
        assert_eq!(engine.spawn_animal(&mut forest, &mut rng).status, AnimalStatus::Visible);
        forest.wildfire.active = true;
        let animal = engine.spawn_animal(&mut forest, &mut rng);
        assert_eq!(animal.status, AnimalStatus::Fleeing);
        assert!(ANIMAL_TYPES.contains(&animal.kind.as_str()));
        assert_eq!(animal.y, 190.0);
    }
}
