//! Core simulation engine for kin-structured household foraging.
//!
//! A [`World`] owns a depleting/regrowing resource grid over a torus, arenas
//! of [`Household`]s and [`Forager`]s, and the tick loop that advances them.
//! Households consume, relocate, forage, ask neighbors for help under the
//! configured sharing institutions, and reproduce; foragers age, marry, and
//! fission into new households. Everything is deterministic for a fixed
//! [`ForageConfig::rng_seed`].

use std::collections::{HashMap, HashSet};

use foragenet_index::{Cell, IndexError, OccupancyGrid, Torus};
use ordered_float::OrderedFloat;
use rand::{Rng, SeedableRng, rngs::SmallRng, seq::SliceRandom};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap, new_key_type};
use thiserror::Error;
use tracing::{debug, trace};

new_key_type! {
    /// Stable handle for households backed by a generational slot map.
    pub struct HouseholdId;
}

new_key_type! {
    /// Stable handle for individual foragers.
    pub struct ForagerId;
}

/// Age until which a forager contributes nothing to foraging.
pub const AGE_OF_JUVENILE: u32 = 5;
/// Age at which a forager becomes a self-sufficient adult.
pub const AGE_OF_ADULT: u32 = 15;
/// Age past which a forager no longer reproduces.
pub const AGE_OF_SENIOR: u32 = 45;
/// Maximum attainable age.
pub const OLDEST_AGE: u32 = 75;

/// Resource floor: cells never reach zero or multiplicative regrowth stalls.
pub const RESOURCE_ZERO: f64 = 0.1;

const NEIGHBORHOOD_RADIUS: i64 = 1;

/// Errors emitted while building or configuring a world.
#[derive(Debug, Error)]
pub enum WorldError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Errors bubbled up from the spatial index.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Accounting attribution for a food transfer between households.
///
/// The three sharing institutions keep disjoint books: bilateral transfers
/// are ledgered symmetrically and counted in the bilateral series, while
/// kin and communal transfers only bump their respective counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    /// Reciprocal aid recorded as signed debt in both ledgers.
    Bilateral,
    /// Unledgered aid between kin households.
    Kin,
    /// Unledgered per-capita pooling across a neighborhood.
    Communal,
}

/// Terminal run states reported through the stop predicate, never as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// Tick limit reached without extinction or explosion.
    Completed,
    /// Population reached zero.
    Extinct,
    /// Population exceeded an explosion threshold.
    Exploded,
}

/// Static configuration for a foraging world.
///
/// Constructed once, validated at [`World::new`] time, and treated as
/// immutable afterwards. The `set_*` methods validate and coerce individual
/// values for external sweep harnesses and return the stored value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForageConfig {
    /// Side length of the toroidal grid in cells.
    pub width: u32,
    /// Landscape mode selector: positive G places a G x G locus lattice,
    /// a value in (-1, 0) is a fractional random-locus density, other
    /// negatives an absolute random-locus count, and zero a uniform field.
    pub grid_density: f64,
    /// Weight multiplier applied to locus influence during relaxation.
    pub loci_weight: f64,
    /// Smallest locus capacity assigned on the unit scale.
    pub cmin: f64,
    /// Resource capacity mapped onto the smallest landscape value.
    pub min_resource: f64,
    /// Resource capacity mapped onto the largest landscape value.
    pub max_resource: f64,
    /// Ticks for a depleted cell to regrow to capacity.
    pub regrowth_steps: f64,
    /// Number of founding households created at initialization.
    pub starting_households: u32,
    /// Population mean of innate foraging expertise.
    pub expertise_mean: f64,
    /// Standard deviation of expertise inheritance noise; zero makes the
    /// population homogeneous.
    pub expertise_sd: f64,
    /// Per-tick probability that an eligible couple conceives.
    pub birth_rate: f64,
    /// Scale of the per-head relocation cost.
    pub move_cost: f64,
    /// Multiplier on the unit move cost when judging starvation.
    pub subsistence_threshold: f64,
    /// Pool surplus per-capita across the whole neighborhood.
    pub communal_sharing: bool,
    /// Share deficits and surplus with kin households, unledgered.
    pub kin_help: bool,
    /// Ask non-kin neighbors for ledgered reciprocal aid.
    pub bilateral_help: bool,
    /// Kinship span assigned to the first founding lineage.
    pub min_kinship_span: f64,
    /// Kinship span assigned to the last founding lineage.
    pub max_kinship_span: f64,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    /// Hard population cap; exceeding it is an explosion outcome.
    pub explosion_population: usize,
    /// Softer cap applied after the warm-up period.
    pub explosion_soft_population: usize,
    /// Cap on the 100-tick average population after warm-up.
    pub explosion_avg_population: f64,
    /// Ticks before the soft explosion checks apply.
    pub explosion_warmup_ticks: u64,
}

impl Default for ForageConfig {
    fn default() -> Self {
        Self {
            width: 50,
            grid_density: 2.0,
            loci_weight: 10.0,
            cmin: 0.1,
            min_resource: 2.0,
            max_resource: 8.0,
            regrowth_steps: 8.0,
            starting_households: 256,
            expertise_mean: 1.3,
            expertise_sd: 0.1,
            birth_rate: 1.0,
            move_cost: 1.0,
            subsistence_threshold: 1.0,
            communal_sharing: false,
            kin_help: false,
            bilateral_help: false,
            min_kinship_span: 2.0,
            max_kinship_span: 6.0,
            rng_seed: None,
            explosion_population: 5_000,
            explosion_soft_population: 3_000,
            explosion_avg_population: 1_500.0,
            explosion_warmup_ticks: 200,
        }
    }
}

fn require_finite(value: f64, message: &'static str) -> Result<f64, WorldError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(WorldError::InvalidConfig(message))
    }
}

impl ForageConfig {
    /// Validates the whole configuration; called by [`World::new`].
    fn validate(&self) -> Result<(), WorldError> {
        if self.width == 0 {
            return Err(WorldError::InvalidConfig("width must be non-zero"));
        }
        if !self.grid_density.is_finite() {
            return Err(WorldError::InvalidConfig("grid_density must be finite"));
        }
        if self.grid_density > 0.0 && self.grid_density < 1.0 {
            return Err(WorldError::InvalidConfig(
                "a positive grid_density must be at least 1",
            ));
        }
        if !(self.cmin > 0.0 && self.cmin <= 1.0) {
            return Err(WorldError::InvalidConfig("cmin must lie in (0, 1]"));
        }
        if self.loci_weight <= 0.0 || !self.loci_weight.is_finite() {
            return Err(WorldError::InvalidConfig("loci_weight must be positive"));
        }
        if self.min_resource <= 0.0 || !self.min_resource.is_finite() {
            return Err(WorldError::InvalidConfig("min_resource must be positive"));
        }
        if self.max_resource < self.min_resource || !self.max_resource.is_finite() {
            return Err(WorldError::InvalidConfig(
                "max_resource must be at least min_resource",
            ));
        }
        if self.regrowth_steps <= 0.0 || !self.regrowth_steps.is_finite() {
            return Err(WorldError::InvalidConfig("regrowth_steps must be positive"));
        }
        if self.expertise_mean <= 0.0 || !self.expertise_mean.is_finite() {
            return Err(WorldError::InvalidConfig("expertise_mean must be positive"));
        }
        if self.expertise_sd < 0.0 || !self.expertise_sd.is_finite() {
            return Err(WorldError::InvalidConfig(
                "expertise_sd must be non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.birth_rate) {
            return Err(WorldError::InvalidConfig("birth_rate must lie in [0, 1]"));
        }
        if self.move_cost < 0.0 || !self.move_cost.is_finite() {
            return Err(WorldError::InvalidConfig("move_cost must be non-negative"));
        }
        if self.subsistence_threshold < 0.0 || !self.subsistence_threshold.is_finite() {
            return Err(WorldError::InvalidConfig(
                "subsistence_threshold must be non-negative",
            ));
        }
        if self.min_kinship_span < 0.0 || !self.min_kinship_span.is_finite() {
            return Err(WorldError::InvalidConfig(
                "min_kinship_span must be non-negative",
            ));
        }
        if self.max_kinship_span < self.min_kinship_span || !self.max_kinship_span.is_finite() {
            return Err(WorldError::InvalidConfig(
                "max_kinship_span must be at least min_kinship_span",
            ));
        }
        if self.explosion_population == 0 || self.explosion_soft_population == 0 {
            return Err(WorldError::InvalidConfig(
                "explosion thresholds must be positive",
            ));
        }
        Ok(())
    }

    /// Returns the configured RNG, seeding from entropy if no seed is set.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::seed_from_u64(rand::random()),
        }
    }

    pub fn set_grid_density(&mut self, value: f64) -> Result<f64, WorldError> {
        self.grid_density = require_finite(value, "grid_density must be finite")?;
        Ok(self.grid_density)
    }

    pub fn set_min_resource(&mut self, value: f64) -> Result<f64, WorldError> {
        let value = require_finite(value, "min_resource must be finite")?;
        if value <= 0.0 {
            return Err(WorldError::InvalidConfig("min_resource must be positive"));
        }
        self.min_resource = value;
        Ok(value)
    }

    pub fn set_max_resource(&mut self, value: f64) -> Result<f64, WorldError> {
        let value = require_finite(value, "max_resource must be finite")?;
        if value <= 0.0 {
            return Err(WorldError::InvalidConfig("max_resource must be positive"));
        }
        self.max_resource = value;
        Ok(value)
    }

    pub fn set_regrowth_steps(&mut self, value: f64) -> Result<f64, WorldError> {
        let value = require_finite(value, "regrowth_steps must be finite")?;
        if value <= 0.0 {
            return Err(WorldError::InvalidConfig("regrowth_steps must be positive"));
        }
        self.regrowth_steps = value;
        Ok(value)
    }

    pub fn set_starting_households(&mut self, value: u32) -> u32 {
        self.starting_households = value;
        value
    }

    pub fn set_expertise_mean(&mut self, value: f64) -> Result<f64, WorldError> {
        let value = require_finite(value, "expertise_mean must be finite")?;
        if value <= 0.0 {
            return Err(WorldError::InvalidConfig("expertise_mean must be positive"));
        }
        self.expertise_mean = value;
        Ok(value)
    }

    pub fn set_expertise_sd(&mut self, value: f64) -> Result<f64, WorldError> {
        let value = require_finite(value, "expertise_sd must be finite")?;
        if value < 0.0 {
            return Err(WorldError::InvalidConfig(
                "expertise_sd must be non-negative",
            ));
        }
        self.expertise_sd = value;
        Ok(value)
    }

    pub fn set_birth_rate(&mut self, value: f64) -> Result<f64, WorldError> {
        let value = require_finite(value, "birth_rate must be finite")?;
        if !(0.0..=1.0).contains(&value) {
            return Err(WorldError::InvalidConfig("birth_rate must lie in [0, 1]"));
        }
        self.birth_rate = value;
        Ok(value)
    }

    pub fn set_move_cost(&mut self, value: f64) -> Result<f64, WorldError> {
        let value = require_finite(value, "move_cost must be finite")?;
        if value < 0.0 {
            return Err(WorldError::InvalidConfig("move_cost must be non-negative"));
        }
        self.move_cost = value;
        Ok(value)
    }

    pub fn set_subsistence_threshold(&mut self, value: f64) -> Result<f64, WorldError> {
        let value = require_finite(value, "subsistence_threshold must be finite")?;
        if value < 0.0 {
            return Err(WorldError::InvalidConfig(
                "subsistence_threshold must be non-negative",
            ));
        }
        self.subsistence_threshold = value;
        Ok(value)
    }

    pub fn set_communal_sharing(&mut self, value: bool) -> bool {
        self.communal_sharing = value;
        value
    }

    pub fn set_kin_help(&mut self, value: bool) -> bool {
        self.kin_help = value;
        value
    }

    pub fn set_bilateral_help(&mut self, value: bool) -> bool {
        self.bilateral_help = value;
        value
    }

    pub fn set_min_kinship_span(&mut self, value: f64) -> Result<f64, WorldError> {
        let value = require_finite(value, "min_kinship_span must be finite")?;
        if value < 0.0 {
            return Err(WorldError::InvalidConfig(
                "min_kinship_span must be non-negative",
            ));
        }
        self.min_kinship_span = value;
        Ok(value)
    }

    pub fn set_max_kinship_span(&mut self, value: f64) -> Result<f64, WorldError> {
        let value = require_finite(value, "max_kinship_span must be finite")?;
        if value < 0.0 {
            return Err(WorldError::InvalidConfig(
                "max_kinship_span must be non-negative",
            ));
        }
        self.max_kinship_span = value;
        Ok(value)
    }

    /// Pins both founder kinship spans to a single value.
    pub fn set_kinship_span(&mut self, value: f64) -> Result<f64, WorldError> {
        let value = require_finite(value, "kinship_span must be finite")?;
        if value < 0.0 {
            return Err(WorldError::InvalidConfig(
                "kinship_span must be non-negative",
            ));
        }
        self.min_kinship_span = value;
        self.max_kinship_span = value;
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn variance(values: &[f64]) -> f64 {
    let mu = mean(values);
    let squares: Vec<f64> = values.iter().map(|v| (v - mu) * (v - mu)).collect();
    mean(&squares)
}

fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Upper-middle element of the sorted values; zero for an empty slice.
fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<OrderedFloat<f64>> = values.iter().copied().map(OrderedFloat).collect();
    sorted.sort_unstable();
    sorted[sorted.len() / 2].into_inner()
}

/// Hoover index: the share of total wealth held above the mean that would
/// have to move for perfect equality. Zero for empty or zero-sum inputs.
fn hoover_index(values: &[f64]) -> f64 {
    let total: f64 = values.iter().sum();
    if total == 0.0 {
        return 0.0;
    }
    let avg = total / values.len() as f64;
    let above: f64 = values.iter().filter(|v| **v > avg).map(|v| v - avg).sum();
    above / total
}

fn mean_of_ages(ages: &[u32]) -> f64 {
    if ages.is_empty() {
        0.0
    } else {
        ages.iter().map(|a| f64::from(*a)).sum::<f64>() / ages.len() as f64
    }
}

/// Normal draw rejected until it lands inside `[lower, upper]`.
fn bounded_normal(rng: &mut SmallRng, mean: f64, sd: f64, lower: f64, upper: f64) -> f64 {
    if sd <= 0.0 {
        return mean.clamp(lower, upper);
    }
    let Ok(dist) = Normal::new(mean, sd) else {
        return mean.clamp(lower, upper);
    };
    loop {
        let value = dist.sample(rng);
        if (lower..=upper).contains(&value) {
            return value;
        }
    }
}

// ---------------------------------------------------------------------------
// Landscape
// ---------------------------------------------------------------------------

/// Static base resource-capacity field on the unit scale, generated from
/// seed loci and iterative relaxation, or uniformly.
#[derive(Debug, Clone)]
pub struct Landscape {
    torus: Torus,
    values: Vec<f64>,
    loci: Vec<(Cell, f64)>,
    locus_cells: HashSet<usize>,
}

impl Landscape {
    /// Generate a capacity field according to `config.grid_density`.
    pub fn generate(config: &ForageConfig, rng: &mut SmallRng) -> Result<Self, WorldError> {
        let torus = Torus::new(config.width)?;
        let width = config.width;
        let mut landscape = Self {
            torus,
            values: vec![0.0; torus.cell_count()],
            loci: Vec::new(),
            locus_cells: HashSet::new(),
        };

        let density = config.grid_density;
        if density > 0.0 {
            let count = density as u32;
            if count == 0 {
                return Err(WorldError::InvalidConfig(
                    "grid_density produced no loci",
                ));
            }
            let f = 1.0 / density;
            for i in 0..count {
                for j in 0..count {
                    let line_i = f * f64::from(i) + f / 2.0;
                    let line_j = f * f64::from(j) + f / 2.0;
                    let x = (line_i * f64::from(width)) as u32;
                    let y = (line_j * f64::from(width)) as u32;
                    let mut capacity = f * f64::from(i) + f * f64::from(j);
                    if capacity == 0.0 {
                        capacity = config.cmin;
                    }
                    if density == 1.0 {
                        capacity = 1.0;
                    }
                    landscape.place_locus((x, y), capacity);
                }
            }
            landscape.relax(config.loci_weight, rng);
        } else if density < 0.0 {
            let count = if density > -1.0 {
                (-density * f64::from(width) * f64::from(width)) as u32
            } else {
                (-density) as u32
            };
            if count == 0 {
                return Err(WorldError::InvalidConfig(
                    "grid_density produced no loci",
                ));
            }
            for _ in 0..count {
                let x = rng.random_range(0..width);
                let y = rng.random_range(0..width);
                let capacity = rng.random::<f64>() * (1.0 - config.cmin) + config.cmin;
                landscape.place_locus((x, y), capacity);
            }
            landscape.relax(config.loci_weight, rng);
        } else {
            landscape.values.fill(1.0);
        }
        Ok(landscape)
    }

    fn place_locus(&mut self, cell: Cell, capacity: f64) {
        let idx = self.torus.index(cell);
        self.values[idx] = capacity;
        self.loci.push((cell, capacity));
        self.locus_cells.insert(idx);
    }

    /// Iterative relaxation: already-set cells push a blended value into a
    /// random neighbor until every cell is set. Loci keep their seeded
    /// values; other cells may be recomputed by later sweeps.
    fn relax(&mut self, loci_weight: f64, rng: &mut SmallRng) {
        let width = self.torus.width();
        let mut unresolved = true;
        while unresolved {
            unresolved = false;
            let mut next = self.values.clone();
            for x in 0..width {
                for y in 0..width {
                    if self.values[self.torus.index((x, y))] <= 0.0 {
                        unresolved = true;
                        continue;
                    }
                    let dx = rng.random_range(-1..=1);
                    let dy = rng.random_range(-1..=1);
                    let target = self.torus.offset((x, y), dx, dy);
                    let target_idx = self.torus.index(target);
                    if self.locus_cells.contains(&target_idx) {
                        continue;
                    }
                    let mut blend = 0.0;
                    let mut weight_sum = 0.0;
                    for ddx in -1..=1 {
                        for ddy in -1..=1 {
                            let neighbor = self.torus.offset(target, ddx, ddy);
                            let neighbor_idx = self.torus.index(neighbor);
                            if !self.locus_cells.contains(&neighbor_idx) {
                                blend += self.values[neighbor_idx];
                                weight_sum += 1.0;
                            }
                        }
                    }
                    for (locus, capacity) in &self.loci {
                        let weight =
                            loci_weight / self.torus.distance_squared(target, *locus);
                        blend += capacity * weight;
                        weight_sum += weight;
                    }
                    next[target_idx] = blend / weight_sum;
                }
            }
            self.values = next;
        }
    }

    /// Affine map of the unit-scale field into `[min_v, max_v]`.
    #[must_use]
    pub fn normalize_to(&self, max_v: f64, min_v: f64) -> Vec<f64> {
        self.values
            .iter()
            .map(|v| v * (max_v - min_v) + min_v)
            .collect()
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.torus.width()
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Seed loci and their unit-scale capacities, in placement order.
    #[must_use]
    pub fn loci(&self) -> &[(Cell, f64)] {
        &self.loci
    }
}

// ---------------------------------------------------------------------------
// Ancestry
// ---------------------------------------------------------------------------

/// Bounded-depth genealogy: one vector of ancestor IDs per generation,
/// built iteratively at birth and immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct AncestryTracker {
    generations: Vec<Vec<ForagerId>>,
}

impl AncestryTracker {
    /// Build the tracker for a newborn from its parents' trackers,
    /// truncated at `ceil(kinship_span)` generations.
    fn from_parents(
        parents: &[ForagerId],
        foragers: &SlotMap<ForagerId, Forager>,
        kinship_span: f64,
    ) -> Self {
        let depth = kinship_span.max(0.0).ceil() as usize;
        let mut generations: Vec<Vec<ForagerId>> = Vec::new();
        if depth == 0 || parents.is_empty() {
            return Self { generations };
        }
        generations.push(parents.to_vec());
        for level in 1..depth {
            let mut generation: Vec<ForagerId> = Vec::new();
            for parent in parents {
                if let Some(forager) = foragers.get(*parent)
                    && let Some(older) = forager.ancestry.generations.get(level - 1)
                {
                    generation.extend(older.iter().copied());
                }
            }
            if generation.is_empty() {
                break;
            }
            generations.push(generation);
        }
        Self { generations }
    }

    /// All tracked ancestor IDs, nearest generation first.
    pub fn ancestors(&self) -> impl Iterator<Item = ForagerId> + '_ {
        self.generations.iter().flatten().copied()
    }

    #[must_use]
    pub fn contains(&self, id: ForagerId) -> bool {
        self.ancestors().any(|ancestor| ancestor == id)
    }

    /// Number of tracked generations.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.generations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Forager
// ---------------------------------------------------------------------------

fn base_food_need_for(age: u32) -> f64 {
    let adult = f64::from(AGE_OF_ADULT);
    if age < AGE_OF_ADULT {
        (f64::from(age) / adult).max(1.0 / adult)
    } else {
        1.0
    }
}

/// An individual biological agent.
#[derive(Debug, Clone)]
pub struct Forager {
    /// Age in ticks.
    pub age: u32,
    /// Cleared when the death conditions trigger.
    pub alive: bool,
    /// Up to two parents, recorded at birth.
    pub parents: Vec<ForagerId>,
    /// Mutual mate reference.
    pub mate: Option<ForagerId>,
    /// Current household membership.
    pub household: Option<HouseholdId>,
    /// Lineage tag propagated from the founding household.
    pub lineage: Option<u32>,
    /// Innate foraging expertise.
    pub expertise: f64,
    /// Generations considered when testing kinship.
    pub kinship_span: f64,
    /// Food needed this tick, including carried-over deficit.
    pub food_need: f64,
    /// Food received so far this tick.
    pub amount_fed: f64,
    /// Bounded-depth genealogy used for kinship queries.
    pub ancestry: AncestryTracker,
}

impl Forager {
    /// Base subsistence need for the current age.
    #[must_use]
    pub fn base_food_need(&self) -> f64 {
        base_food_need_for(self.age)
    }

    /// Fraction of this tick's need already met.
    #[must_use]
    pub fn health(&self) -> f64 {
        self.amount_fed / self.food_need
    }

    /// Outstanding need for the current tick.
    #[must_use]
    pub fn food_required(&self) -> f64 {
        self.food_need - self.amount_fed
    }

    /// Age-scaled foraging contribution: zero before the juvenile
    /// threshold, ramping linearly to full expertise at adulthood.
    #[must_use]
    pub fn foraging_expertise(&self) -> f64 {
        if self.age < AGE_OF_JUVENILE {
            0.0
        } else if self.age < AGE_OF_ADULT {
            self.expertise * f64::from(self.age - AGE_OF_JUVENILE)
                / f64::from(AGE_OF_ADULT - AGE_OF_JUVENILE)
        } else {
            self.expertise
        }
    }

    #[must_use]
    pub fn is_adult(&self) -> bool {
        self.age >= AGE_OF_ADULT
    }

    #[must_use]
    pub fn is_senior(&self) -> bool {
        self.age > AGE_OF_SENIOR
    }

    /// An unmarried adult.
    #[must_use]
    pub fn is_bachelor(&self) -> bool {
        self.is_adult() && self.mate.is_none()
    }

    /// Applies the death conditions and reports whether the forager is dead.
    fn check_death(&mut self) -> bool {
        if self.age >= OLDEST_AGE || self.health() < 0.0 {
            self.alive = false;
        }
        !self.alive
    }
}

// ---------------------------------------------------------------------------
// Household
// ---------------------------------------------------------------------------

/// An economic unit of co-resident foragers sharing one stockpile, one
/// location, and one debt ledger.
#[derive(Debug, Clone)]
pub struct Household {
    /// Monotonic creation index within the owning world.
    pub serial: u32,
    /// Lineage tag inherited from the founding ancestor.
    pub lineage: u32,
    /// Age of the household in ticks.
    pub age: u32,
    /// Shared food stockpile, kept non-negative at tick boundaries.
    pub food_storage: f64,
    /// Adult heads of the household.
    pub parents: Vec<ForagerId>,
    /// Offspring raised in the household.
    pub children: Vec<ForagerId>,
    /// Members absorbed from outside the nuclear family.
    pub adoptees: Vec<ForagerId>,
    /// Signed bilateral debt per counterparty; positive means this
    /// household owes the other.
    pub commitments: HashMap<HouseholdId, f64>,
    /// Offspring conceived this tick, joining next tick.
    pub next_baby: Option<ForagerId>,
}

impl Household {
    fn new(serial: u32, lineage: u32) -> Self {
        Self {
            serial,
            lineage,
            age: 0,
            food_storage: 0.0,
            parents: Vec::new(),
            children: Vec::new(),
            adoptees: Vec::new(),
            commitments: HashMap::new(),
            next_baby: None,
        }
    }

    /// All member IDs: parents, then children, then adoptees.
    pub fn members(&self) -> impl Iterator<Item = ForagerId> + '_ {
        self.parents
            .iter()
            .chain(self.children.iter())
            .chain(self.adoptees.iter())
            .copied()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.parents.len() + self.children.len() + self.adoptees.len()
    }

    /// Signed amount this household owes `other`.
    #[must_use]
    pub fn debt_to(&self, other: HouseholdId) -> f64 {
        self.commitments.get(&other).copied().unwrap_or(0.0)
    }

    /// Net amount owed *to* this household.
    #[must_use]
    pub fn prestige(&self) -> f64 {
        -self.commitments.values().sum::<f64>()
    }

    fn remove_member(&mut self, member: ForagerId) {
        if let Some(pos) = self.parents.iter().position(|m| *m == member) {
            self.parents.remove(pos);
        } else if let Some(pos) = self.children.iter().position(|m| *m == member) {
            self.children.remove(pos);
        } else if let Some(pos) = self.adoptees.iter().position(|m| *m == member) {
            self.adoptees.remove(pos);
        }
    }
}

/// Non-mutating per-household view for visualization layers.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct HouseholdSite {
    /// Monotonic creation index of the household.
    pub serial: u32,
    /// Lineage tag for grouping.
    pub lineage: u32,
    /// Current grid cell.
    pub cell: Cell,
    /// Member count.
    pub size: usize,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Growing per-tick metric series; one entry is appended per [`World::step`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct Metrics {
    populations: Vec<usize>,
    avg_population: Vec<f64>,
    avg_population_100: Vec<f64>,
    avg_household_size: Vec<f64>,
    avg_dead_household_age: Vec<f64>,
    food_shared: Vec<f64>,
    food_shared_total: f64,
    food_shared_totals: Vec<f64>,
    communal_shared: Vec<f64>,
    kin_shared: Vec<f64>,
    bilateral_shared: Vec<f64>,
    ages_at_death: Vec<u32>,
    adult_ages_at_death: Vec<u32>,
    avg_age_at_death: Vec<f64>,
    avg_adult_age_at_death: Vec<f64>,
    median_storage: Vec<f64>,
    mean_storage: Vec<f64>,
    stddev_storage: Vec<f64>,
    max_hoover: Vec<f64>,
    mean_hoover: Vec<f64>,
    max_prestige: Vec<f64>,
    mean_prestige: Vec<f64>,
}

impl Metrics {
    fn bootstrap(&mut self, population: usize) {
        self.populations.push(population);
        self.avg_population.push(population as f64);
        self.avg_population_100.push(population as f64);
        self.avg_household_size.push(2.0);
        self.avg_dead_household_age.push(0.0);
        self.food_shared.push(0.0);
        self.food_shared_totals.push(0.0);
        self.median_storage.push(0.0);
    }

    /// Population after each tick (index 0 is the initial population).
    #[must_use]
    pub fn populations(&self) -> &[usize] {
        &self.populations
    }

    /// All-time average population per tick.
    #[must_use]
    pub fn avg_population(&self) -> &[f64] {
        &self.avg_population
    }

    /// Average population over the trailing 100 ticks.
    #[must_use]
    pub fn avg_population_100(&self) -> &[f64] {
        &self.avg_population_100
    }

    #[must_use]
    pub fn avg_household_size(&self) -> &[f64] {
        &self.avg_household_size
    }

    /// Running average age of households at removal.
    #[must_use]
    pub fn avg_dead_household_age(&self) -> &[f64] {
        &self.avg_dead_household_age
    }

    /// Food transferred between households each tick, all policies.
    #[must_use]
    pub fn food_shared(&self) -> &[f64] {
        &self.food_shared
    }

    /// Cumulative food shared up to each tick.
    #[must_use]
    pub fn food_shared_totals(&self) -> &[f64] {
        &self.food_shared_totals
    }

    /// Per-tick communal pooling volume.
    #[must_use]
    pub fn communal_shared(&self) -> &[f64] {
        &self.communal_shared
    }

    /// Per-tick kin-network sharing volume.
    #[must_use]
    pub fn kin_shared(&self) -> &[f64] {
        &self.kin_shared
    }

    /// Per-tick bilateral (ledgered) sharing volume.
    #[must_use]
    pub fn bilateral_shared(&self) -> &[f64] {
        &self.bilateral_shared
    }

    /// Ages at death of every forager so far.
    #[must_use]
    pub fn ages_at_death(&self) -> &[u32] {
        &self.ages_at_death
    }

    /// Ages at death restricted to adults.
    #[must_use]
    pub fn adult_ages_at_death(&self) -> &[u32] {
        &self.adult_ages_at_death
    }

    #[must_use]
    pub fn avg_age_at_death(&self) -> &[f64] {
        &self.avg_age_at_death
    }

    #[must_use]
    pub fn avg_adult_age_at_death(&self) -> &[f64] {
        &self.avg_adult_age_at_death
    }

    #[must_use]
    pub fn median_storage(&self) -> &[f64] {
        &self.median_storage
    }

    #[must_use]
    pub fn mean_storage(&self) -> &[f64] {
        &self.mean_storage
    }

    #[must_use]
    pub fn stddev_storage(&self) -> &[f64] {
        &self.stddev_storage
    }

    /// Largest local Hoover index observed each tick.
    #[must_use]
    pub fn max_hoover(&self) -> &[f64] {
        &self.max_hoover
    }

    /// Mean local Hoover index over all cells each tick.
    #[must_use]
    pub fn mean_hoover(&self) -> &[f64] {
        &self.mean_hoover
    }

    #[must_use]
    pub fn max_prestige(&self) -> &[f64] {
        &self.max_prestige
    }

    #[must_use]
    pub fn mean_prestige(&self) -> &[f64] {
        &self.mean_prestige
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// Aggregate simulation state: resource grid, household and forager arenas,
/// spatial index, and metric series.
pub struct World {
    config: ForageConfig,
    rng: SmallRng,
    torus: Torus,
    capacity: Vec<f64>,
    resources: Vec<f64>,
    regrowth: Vec<f64>,
    households: SlotMap<HouseholdId, Household>,
    foragers: SlotMap<ForagerId, Forager>,
    locations: SecondaryMap<HouseholdId, Cell>,
    occupancy: OccupancyGrid<HouseholdId>,
    next_serial: u32,
    tick: u64,
    population: usize,
    shared_step: f64,
    dead_household_age_total: f64,
    dead_households: u32,
    metrics: Metrics,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("tick", &self.tick)
            .field("population", &self.population)
            .field("households", &self.households.len())
            .finish()
    }
}

impl World {
    /// Build a world from configuration, generating its landscape.
    pub fn new(config: ForageConfig) -> Result<Self, WorldError> {
        config.validate()?;
        let mut rng = config.seeded_rng();
        let landscape = Landscape::generate(&config, &mut rng)?;
        Self::from_parts(config, &landscape, rng)
    }

    /// Build a world over a pre-generated landscape, as sweep harnesses do
    /// when reusing one field across repetitions.
    pub fn with_landscape(config: ForageConfig, landscape: &Landscape) -> Result<Self, WorldError> {
        config.validate()?;
        if landscape.width() != config.width {
            return Err(WorldError::InvalidConfig(
                "landscape width must match configuration",
            ));
        }
        let rng = config.seeded_rng();
        Self::from_parts(config, landscape, rng)
    }

    fn from_parts(
        config: ForageConfig,
        landscape: &Landscape,
        rng: SmallRng,
    ) -> Result<Self, WorldError> {
        let torus = Torus::new(config.width)?;
        let capacity = landscape.normalize_to(config.max_resource, config.min_resource);
        let resources = capacity.clone();
        let regrowth: Vec<f64> = capacity
            .iter()
            .map(|cap| ((cap.ln() - RESOURCE_ZERO.ln()) / config.regrowth_steps).exp())
            .collect();

        let mut world = Self {
            config,
            rng,
            torus,
            capacity,
            resources,
            regrowth,
            households: SlotMap::with_key(),
            foragers: SlotMap::with_key(),
            locations: SecondaryMap::new(),
            occupancy: OccupancyGrid::new(torus),
            next_serial: 0,
            tick: 0,
            population: 0,
            shared_step: 0.0,
            dead_household_age_total: 0.0,
            dead_households: 1,
            metrics: Metrics::default(),
        };

        let founders = world.config.starting_households;
        let span_interval = if founders == 0 {
            0.0
        } else {
            (world.config.max_kinship_span - world.config.min_kinship_span) / f64::from(founders)
        };
        for index in 0..founders {
            let width = world.config.width;
            let cell = (
                world.rng.random_range(0..width),
                world.rng.random_range(0..width),
            );
            let age = world.rng.random_range(AGE_OF_ADULT..AGE_OF_SENIOR);
            let span = world.config.min_kinship_span + span_interval * f64::from(index);
            world.spawn_founder_household(cell, age, span);
        }
        world.population = world.households.values().map(Household::size).sum();
        world.metrics.bootstrap(world.population);
        Ok(world)
    }

    /// Found a household of two married adults of the given age at `cell`.
    pub fn spawn_founder_household(
        &mut self,
        cell: Cell,
        age: u32,
        kinship_span: f64,
    ) -> HouseholdId {
        let id = self.insert_household(cell, None);
        let founder = self.create_forager(age, &[], Some(kinship_span));
        self.add_parent(id, founder);
        let spouse = self.create_forager(age, &[], Some(kinship_span));
        self.foragers[founder].mate = Some(spouse);
        self.foragers[spouse].mate = Some(founder);
        self.add_parent(id, spouse);
        id
    }

    // -- accessors ---------------------------------------------------------

    /// Returns an immutable reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &ForageConfig {
        &self.config
    }

    /// Ticks completed so far.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Living foragers counted at the end of the last tick.
    #[must_use]
    pub const fn population(&self) -> usize {
        self.population
    }

    #[must_use]
    pub const fn torus(&self) -> Torus {
        self.torus
    }

    /// Current resource level per cell, row-major.
    #[must_use]
    pub fn resources(&self) -> &[f64] {
        &self.resources
    }

    /// Mutable resource levels, for scenario setup and tooling.
    #[must_use]
    pub fn resources_mut(&mut self) -> &mut [f64] {
        &mut self.resources
    }

    /// Immutable per-cell resource capacities.
    #[must_use]
    pub fn capacity(&self) -> &[f64] {
        &self.capacity
    }

    #[must_use]
    pub fn resources_at(&self, cell: Cell) -> f64 {
        self.resources[self.torus.index(cell)]
    }

    /// Accumulated metric series.
    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    #[must_use]
    pub fn household_count(&self) -> usize {
        self.households.len()
    }

    #[must_use]
    pub fn household(&self, id: HouseholdId) -> Option<&Household> {
        self.households.get(id)
    }

    /// Mutable household access, for scenario setup and tooling.
    #[must_use]
    pub fn household_mut(&mut self, id: HouseholdId) -> Option<&mut Household> {
        self.households.get_mut(id)
    }

    pub fn households(&self) -> impl Iterator<Item = (HouseholdId, &Household)> {
        self.households.iter()
    }

    #[must_use]
    pub fn forager(&self, id: ForagerId) -> Option<&Forager> {
        self.foragers.get(id)
    }

    pub fn foragers(&self) -> impl Iterator<Item = (ForagerId, &Forager)> {
        self.foragers.iter()
    }

    /// Mutable forager access, for scenario setup and tooling.
    #[must_use]
    pub fn forager_mut(&mut self, id: ForagerId) -> Option<&mut Forager> {
        self.foragers.get_mut(id)
    }

    #[must_use]
    pub fn location_of(&self, id: HouseholdId) -> Option<Cell> {
        self.locations.get(id).copied()
    }

    /// Per-household location, size, and lineage for visualization layers.
    #[must_use]
    pub fn household_sites(&self) -> Vec<HouseholdSite> {
        self.households
            .iter()
            .map(|(id, hh)| HouseholdSite {
                serial: hh.serial,
                lineage: hh.lineage,
                cell: self.locations.get(id).copied().unwrap_or((0, 0)),
                size: hh.size(),
            })
            .collect()
    }

    /// Terminal state of the run, if one has been reached.
    #[must_use]
    pub fn run_outcome(&self) -> Option<RunOutcome> {
        if self.population == 0 {
            return Some(RunOutcome::Extinct);
        }
        if self.population > self.config.explosion_population {
            return Some(RunOutcome::Exploded);
        }
        if self.tick > self.config.explosion_warmup_ticks {
            let windowed = self
                .metrics
                .avg_population_100
                .last()
                .copied()
                .unwrap_or(0.0);
            if self.population > self.config.explosion_soft_population
                || windowed > self.config.explosion_avg_population
            {
                return Some(RunOutcome::Exploded);
            }
        }
        None
    }

    /// Outcome of a run bounded by `tick_limit`: the terminal state if one
    /// has been reached, or [`RunOutcome::Completed`] once the limit is.
    /// External drivers poll this as their stop predicate after each step.
    #[must_use]
    pub fn outcome_after(&self, tick_limit: u64) -> Option<RunOutcome> {
        self.run_outcome()
            .or_else(|| (self.tick >= tick_limit).then_some(RunOutcome::Completed))
    }

    // -- spatial queries ---------------------------------------------------

    /// All *other* households within the circular toroidal radius of `id`,
    /// shuffled to remove order bias.
    pub fn neighborhood_of(&mut self, id: HouseholdId, radius: i64) -> Vec<HouseholdId> {
        let Some(&cell) = self.locations.get(id) else {
            return Vec::new();
        };
        let mut neighborhood = Vec::new();
        self.occupancy
            .visit_within(cell, radius, &mut |hh| neighborhood.push(hh));
        if let Some(pos) = neighborhood.iter().position(|hh| *hh == id) {
            neighborhood.remove(pos);
        }
        neighborhood.shuffle(&mut self.rng);
        neighborhood
    }

    /// Every household resident within the radius of `cell`, self included,
    /// in cell scan order.
    #[must_use]
    pub fn households_around(&self, cell: Cell, radius: i64) -> Vec<HouseholdId> {
        let mut residents = Vec::new();
        self.occupancy
            .visit_within(cell, radius, &mut |hh| residents.push(hh));
        residents
    }

    /// Scans the 3x3 block around `origin` in shuffled order and returns the
    /// cell holding the most resource, with its level. Falls back to cell
    /// (0, 0) at level zero when the whole block is depleted.
    pub fn best_cell(&mut self, origin: Cell) -> (Cell, f64) {
        let mut offsets_a: [i64; 3] = [-1, 0, 1];
        let mut offsets_b: [i64; 3] = [-1, 0, 1];
        offsets_a.shuffle(&mut self.rng);
        offsets_b.shuffle(&mut self.rng);
        let mut best_cell = (0, 0);
        let mut best_level = 0.0;
        for a in offsets_a {
            for b in offsets_b {
                let cell = self.torus.offset(origin, a, b);
                let level = self.resources_at(cell);
                if level > best_level {
                    best_level = level;
                    best_cell = cell;
                }
            }
        }
        (best_cell, best_level)
    }

    /// Withdraw up to `amount` from the household's cell, returning the
    /// amount actually removed.
    pub fn forage(&mut self, id: HouseholdId, amount: f64) -> f64 {
        let Some(&cell) = self.locations.get(id) else {
            return 0.0;
        };
        let idx = self.torus.index(cell);
        let available = self.resources[idx];
        let gathered = if available <= 0.0 {
            0.0
        } else {
            amount.min(available)
        };
        self.resources[idx] -= gathered;
        gathered
    }

    // -- kinship -----------------------------------------------------------

    /// Whether two foragers share an ancestor (or one is the other's
    /// ancestor) within their tracked spans. Symmetric.
    #[must_use]
    pub fn foragers_are_kin(&self, a: ForagerId, b: ForagerId) -> bool {
        if a == b {
            return true;
        }
        let (Some(fa), Some(fb)) = (self.foragers.get(a), self.foragers.get(b)) else {
            return false;
        };
        if fa.ancestry.contains(b) || fb.ancestry.contains(a) {
            return true;
        }
        fa.ancestry
            .ancestors()
            .any(|ancestor| fb.ancestry.contains(ancestor))
    }

    /// Whether any member of `a` shares a tracked ancestor with any member
    /// of `b`. A household with ancestry on record is kin to itself.
    #[must_use]
    pub fn households_are_kin(&self, a: HouseholdId, b: HouseholdId) -> bool {
        let (Some(hh_a), Some(hh_b)) = (self.households.get(a), self.households.get(b)) else {
            return false;
        };
        let mut ancestors_a: HashSet<ForagerId> = HashSet::new();
        for member in hh_a.members() {
            if let Some(forager) = self.foragers.get(member) {
                ancestors_a.extend(forager.ancestry.ancestors());
            }
        }
        if ancestors_a.is_empty() {
            return false;
        }
        hh_b.members().any(|member| {
            self.foragers
                .get(member)
                .is_some_and(|f| f.ancestry.ancestors().any(|anc| ancestors_a.contains(&anc)))
        })
    }

    // -- tick loop ---------------------------------------------------------

    /// Advance the world by exactly one tick.
    pub fn step(&mut self) {
        self.tick += 1;
        self.shared_step = 0.0;
        self.metrics.communal_shared.push(0.0);
        self.metrics.kin_shared.push(0.0);
        self.metrics.bilateral_shared.push(0.0);

        let order = self.activation_order();

        self.population = 0;
        let mut emptied: Vec<HouseholdId> = Vec::new();
        let mut storages: Vec<f64> = Vec::new();
        let mut prestiges: Vec<f64> = Vec::new();
        for id in order {
            if !self.households.contains_key(id) {
                continue;
            }
            self.step_household(id);
            if !self.households.contains_key(id) {
                continue;
            }
            if self.sweep_deaths(id) {
                self.dead_household_age_total += f64::from(self.households[id].age);
                self.dead_households += 1;
                emptied.push(id);
            } else {
                let household = &self.households[id];
                self.population += household.size();
                storages.push(household.food_storage);
                prestiges.push(household.prestige());
            }
        }
        for id in emptied {
            self.remove_household(id);
        }
        self.regrow_and_measure();
        self.append_metrics(&storages, &prestiges);
        if self.population == 0 {
            debug!(tick = self.tick, "population extinct");
        }
    }

    /// Per-tick activation order: a plain shuffle for homogeneous
    /// populations, otherwise descending by noise-perturbed foraging
    /// ability so stronger households tend to act first.
    fn activation_order(&mut self) -> Vec<HouseholdId> {
        let mut order: Vec<HouseholdId> = self.households.keys().collect();
        if self.config.expertise_sd == 0.0 {
            order.shuffle(&mut self.rng);
            return order;
        }
        let abilities: Vec<f64> = order.iter().map(|id| self.household_ability(*id)).collect();
        let mut keyed: Vec<(OrderedFloat<f64>, HouseholdId)> = order
            .iter()
            .zip(&abilities)
            .map(|(id, ability)| {
                let noise = bounded_normal(&mut self.rng, 1.0, 0.2, 0.5, 1.5);
                (OrderedFloat(ability * noise), *id)
            })
            .collect();
        keyed.sort_by(|a, b| b.0.cmp(&a.0));
        keyed.into_iter().map(|(_, id)| id).collect()
    }

    // -- household protocol ------------------------------------------------

    fn step_household(&mut self, id: HouseholdId) {
        self.households[id].age += 1;

        // may have received food shared by earlier-acting households
        self.household_eat(id);
        self.evaluate_and_move(id);
        if self.household_is_hungry(id) {
            self.forage_into_storage(id);
            self.household_eat(id);
        }
        if self.household_is_hungry(id) {
            self.ask_neighbors_for_help(id);
        }

        if !self.sweep_deaths(id) {
            self.disposition_excess(id);
            self.make_a_baby(id);
            let members: Vec<ForagerId> = self.households[id].members().collect();
            for member in members {
                if self.foragers.contains_key(member) {
                    self.step_forager(member);
                }
            }
        }

        // floating-point drift from the transfers above
        let household = &mut self.households[id];
        if household.food_storage < 0.0 {
            household.food_storage = 0.0;
        }
    }

    /// Total outstanding need across members.
    fn household_needs(&self, id: HouseholdId) -> f64 {
        self.households[id]
            .members()
            .map(|m| self.foragers[m].food_required())
            .sum()
    }

    /// Summed age-scaled foraging contributions of all members.
    #[must_use]
    pub fn household_ability(&self, id: HouseholdId) -> f64 {
        self.households[id]
            .members()
            .map(|m| self.foragers[m].foraging_expertise())
            .sum()
    }

    fn household_is_hungry(&self, id: HouseholdId) -> bool {
        self.households[id]
            .members()
            .any(|m| self.foragers[m].health() < 1.0)
    }

    /// Deficit persists even counting the stockpile, the local cell, and
    /// the cost of a unit move to reach a better one.
    fn is_starving(&self, id: HouseholdId) -> bool {
        if !self.household_is_hungry(id) {
            return false;
        }
        let cell = self.locations[id];
        let cost_to_forage = self.config.subsistence_threshold * self.cost_to_move_unit(id);
        let reachable = self.households[id].food_storage + self.resources_at(cell);
        reachable < self.household_needs(id) + cost_to_forage
    }

    /// Ration storage proportionally across members' outstanding needs.
    fn household_eat(&mut self, id: HouseholdId) {
        let members: Vec<ForagerId> = self.households[id].members().collect();
        let needs: f64 = members
            .iter()
            .map(|m| self.foragers[*m].food_required())
            .sum();
        if needs <= 0.0 {
            return;
        }
        let mut storage = self.households[id].food_storage;
        let fraction = (storage / needs).min(1.0);
        for member in members {
            let amount = fraction * self.foragers[member].food_required();
            self.foragers[member].amount_fed += amount;
            storage -= amount;
        }
        self.households[id].food_storage = storage;
    }

    fn forage_into_storage(&mut self, id: HouseholdId) {
        let ability = self.household_ability(id);
        let gathered = self.forage(id, ability);
        self.households[id].food_storage += gathered;
    }

    // -- relocation --------------------------------------------------------

    fn cost_of_move_between(&self, id: HouseholdId, from: Cell, to: Cell) -> f64 {
        self.households[id].size() as f64 * (1.0 + self.torus.distance(from, to))
            * self.config.move_cost
            / f64::from(self.config.width)
    }

    /// Cost of a single diagonal step, used as the starvation yardstick.
    fn cost_to_move_unit(&self, id: HouseholdId) -> f64 {
        self.households[id].size() as f64 * (1.0 + std::f64::consts::SQRT_2)
            * self.config.move_cost
            / f64::from(self.config.width)
    }

    /// Net gain of relocating to `alternate` versus staying put. With kin
    /// help enabled, kin-held storage reachable from either cell counts
    /// toward that cell's value.
    fn evaluate_location_against(&self, id: HouseholdId, alternate: Cell) -> f64 {
        let current = self.locations[id];
        let cost_to_relocate = self.cost_of_move_between(id, current, alternate);
        let cost_to_stay = self.cost_of_move_between(id, current, current);
        let mut resources_here = self.resources_at(current);
        let mut resources_there = self.resources_at(alternate);
        if self.config.kin_help {
            resources_here += self.kin_storage_around(id, current);
            resources_there +=
                self.kin_storage_around(id, alternate) - self.households[id].food_storage;
        }
        (resources_there - cost_to_relocate) - (resources_here - cost_to_stay)
    }

    fn kin_storage_around(&self, id: HouseholdId, cell: Cell) -> f64 {
        self.households_around(cell, NEIGHBORHOOD_RADIUS)
            .iter()
            .filter(|hh| self.households_are_kin(id, **hh))
            .map(|hh| self.households[*hh].food_storage)
            .sum()
    }

    fn evaluate_and_move(&mut self, id: HouseholdId) {
        let current = self.locations[id];
        let (best, _level) = self.best_cell(current);
        let mut destination = current;
        if best != current && self.evaluate_location_against(id, best) > 0.0 {
            destination = best;
        }
        self.move_to(id, destination);
    }

    /// Relocate (or stay). A real move updates the spatial index, disperses
    /// surplus into the new neighborhood, and abandons remaining storage;
    /// either way each member is charged their share of the move cost.
    fn move_to(&mut self, id: HouseholdId, destination: Cell) {
        let current = self.locations[id];
        let cost = self.cost_of_move_between(id, current, destination);
        if destination != current {
            self.occupancy.relocate(current, destination, id);
            self.locations.insert(id, destination);
            self.disposition_excess(id);
            self.households[id].food_storage = 0.0;
        }
        let size = self.households[id].size();
        if size > 0 {
            let per_head = cost / size as f64;
            let members: Vec<ForagerId> = self.households[id].members().collect();
            for member in members {
                self.foragers[member].amount_fed -= per_head;
            }
        }
    }

    fn move_to_random_cell(&mut self, id: HouseholdId) {
        let width = self.config.width;
        let cell = (
            self.rng.random_range(0..width),
            self.rng.random_range(0..width),
        );
        self.move_to(id, cell);
    }

    // -- sharing -----------------------------------------------------------

    /// Transfer up to `amount` (clamped by the giver's storage) and account
    /// for it under `kind`. Returns the amount actually moved.
    fn give_food(
        &mut self,
        giver: HouseholdId,
        receiver: HouseholdId,
        amount: f64,
        kind: TransferKind,
    ) -> f64 {
        let amount = amount.min(self.households[giver].food_storage);
        self.households[receiver].food_storage += amount;
        self.households[giver].food_storage -= amount;
        if giver != receiver {
            if kind == TransferKind::Bilateral {
                *self.households[receiver]
                    .commitments
                    .entry(giver)
                    .or_insert(0.0) += amount;
                *self.households[giver]
                    .commitments
                    .entry(receiver)
                    .or_insert(0.0) -= amount;
                debug_assert!(
                    (self.households[receiver].debt_to(giver)
                        + self.households[giver].debt_to(receiver))
                    .abs()
                        < 1e-9
                );
            }
            self.record_share(kind, amount);
        }
        amount
    }

    fn record_share(&mut self, kind: TransferKind, amount: f64) {
        let series = match kind {
            TransferKind::Bilateral => &mut self.metrics.bilateral_shared,
            TransferKind::Kin => &mut self.metrics.kin_shared,
            TransferKind::Communal => &mut self.metrics.communal_shared,
        };
        if let Some(last) = series.last_mut() {
            *last += amount;
        }
        self.shared_step += amount;
    }

    /// Still-hungry escape hatch: with no neighbors at all, relocate at
    /// random; otherwise solicit kin aid and, when starving, ledgered
    /// bilateral aid from non-kin.
    fn ask_neighbors_for_help(&mut self, id: HouseholdId) {
        let neighborhood = self.neighborhood_of(id, NEIGHBORHOOD_RADIUS);
        if neighborhood.is_empty() {
            self.move_to_random_cell(id);
            self.forage_into_storage(id);
            self.household_eat(id);
            return;
        }
        if !(self.config.kin_help || self.config.bilateral_help) {
            return;
        }
        if self.config.kin_help {
            let kin: Vec<HouseholdId> = neighborhood
                .iter()
                .copied()
                .filter(|hh| self.households_are_kin(id, *hh))
                .collect();
            let total_kin_storage: f64 = kin
                .iter()
                .map(|hh| self.households[*hh].food_storage)
                .sum();
            let deficit = self.household_needs(id) - self.households[id].food_storage;
            if total_kin_storage > 0.0 && deficit > 0.0 {
                for kin_hh in kin {
                    // kin share the burden in proportion to their stores
                    let share =
                        deficit * self.households[kin_hh].food_storage / total_kin_storage;
                    self.give_food(kin_hh, id, share, TransferKind::Kin);
                    self.household_eat(id);
                }
            }
        }
        if self.config.bilateral_help && self.is_starving(id) {
            let mut lenders: Vec<HouseholdId> = neighborhood
                .iter()
                .copied()
                .filter(|hh| !self.households_are_kin(id, *hh))
                .collect();
            // largest debtors to us are asked last
            lenders.sort_by_key(|hh| OrderedFloat(self.households[*hh].debt_to(id)));
            for lender in lenders {
                let deficit = self.household_needs(id) - self.households[id].food_storage;
                if deficit <= 0.0 {
                    break;
                }
                self.give_food(lender, id, deficit, TransferKind::Bilateral);
                self.household_eat(id);
            }
        }
    }

    /// Storage earmarked for reclamation: what neighbors owe us, capped by
    /// what we actually hold.
    fn amount_to_set_aside(&mut self, id: HouseholdId) -> f64 {
        let neighborhood = self.neighborhood_of(id, NEIGHBORHOOD_RADIUS);
        let owed: f64 = neighborhood
            .iter()
            .map(|hh| self.households[*hh].debt_to(id))
            .sum();
        owed.min(self.households[id].food_storage)
    }

    /// Disperse surplus beyond the set-aside: repay bilateral debts first
    /// (smallest obligation first), then pool the remainder communally or
    /// among kin. Communal and kin pooling are mutually exclusive;
    /// repayment combines with either.
    fn disposition_excess(&mut self, id: HouseholdId) {
        let mut neighborhood = self.neighborhood_of(id, NEIGHBORHOOD_RADIUS);
        let mut surplus = self.households[id].food_storage - self.amount_to_set_aside(id);
        if neighborhood.is_empty() {
            return;
        }
        neighborhood.sort_by_key(|hh| OrderedFloat(self.households[*hh].debt_to(id)));

        if self.config.bilateral_help {
            let mut debtees: Vec<HouseholdId> = neighborhood
                .iter()
                .copied()
                .filter(|hh| self.households[id].debt_to(*hh) > 0.0)
                .collect();
            debtees.sort_by_key(|hh| OrderedFloat(self.households[id].debt_to(*hh)));
            for debtee in debtees {
                if surplus <= 0.0 {
                    break;
                }
                let owed = self.households[id].debt_to(debtee);
                let repaid = self.give_food(id, debtee, owed, TransferKind::Bilateral);
                surplus -= repaid;
            }
        }

        if self.config.communal_sharing {
            let mut pool: Vec<HouseholdId> = neighborhood
                .iter()
                .copied()
                .filter(|hh| self.households[*hh].debt_to(id) >= 0.0)
                .collect();
            pool.push(id); // we get to participate in the feast
            self.share_per_capita(id, &pool, surplus, TransferKind::Communal);
        } else if self.config.kin_help {
            let mut pool: Vec<HouseholdId> = neighborhood
                .iter()
                .copied()
                .filter(|hh| self.households_are_kin(id, *hh))
                .collect();
            pool.push(id);
            self.share_per_capita(id, &pool, surplus, TransferKind::Kin);
        }
    }

    fn share_per_capita(
        &mut self,
        giver: HouseholdId,
        pool: &[HouseholdId],
        surplus: f64,
        kind: TransferKind,
    ) {
        let head_count: usize = pool.iter().map(|hh| self.households[*hh].size()).sum();
        if surplus <= 0.0 || head_count == 0 {
            return;
        }
        let portion = surplus / head_count as f64;
        for member_hh in pool {
            let share = portion * self.households[*member_hh].size() as f64;
            self.give_food(giver, *member_hh, share, kind);
        }
    }

    // -- reproduction ------------------------------------------------------

    fn can_make_baby(&self, id: HouseholdId) -> bool {
        let household = &self.households[id];
        household.parents.len() == 2
            && !self.foragers[household.parents[0]].is_senior()
            && !self.foragers[household.parents[1]].is_senior()
    }

    /// Commit last tick's baby into the household, then possibly conceive
    /// the next one.
    fn make_a_baby(&mut self, id: HouseholdId) {
        if let Some(baby) = self.households[id].next_baby.take() {
            self.add_child(id, baby);
        }
        if self.can_make_baby(id) && self.rng.random::<f64>() < self.config.birth_rate {
            let parents = self.households[id].parents.clone();
            let baby = self.create_forager(0, &parents, None);
            self.households[id].next_baby = Some(baby);
        }
    }

    // -- forager lifecycle -------------------------------------------------

    fn sample_expertise(&mut self, parents: &[ForagerId]) -> f64 {
        let mean = self.config.expertise_mean;
        let sd = self.config.expertise_sd;
        if sd == 0.0 {
            return mean;
        }
        let base = if parents.len() == 2 {
            let w = self.rng.random::<f64>() * 0.5 + 0.25;
            w * self.foragers[parents[0]].foraging_expertise()
                + (1.0 - w) * self.foragers[parents[1]].foraging_expertise()
        } else {
            mean
        };
        let birth_factor = 1.0 + bounded_normal(&mut self.rng, 0.0, sd, -6.0 * sd, 6.0 * sd);
        (base * birth_factor).clamp(0.0, 2.0 * mean)
    }

    /// Create a forager in the arena. Founders pass their interpolated
    /// span; births inherit one parent's span on a coin flip.
    fn create_forager(
        &mut self,
        age: u32,
        parents: &[ForagerId],
        founder_span: Option<f64>,
    ) -> ForagerId {
        let kinship_span = if let Some(span) = founder_span {
            span
        } else if parents.len() == 2 {
            let pick = if self.rng.random::<f64>() < 0.5 {
                parents[0]
            } else {
                parents[1]
            };
            self.foragers[pick].kinship_span
        } else {
            self.config.min_kinship_span
        };
        let lineage = parents.iter().rev().find_map(|p| {
            self.foragers[*p]
                .household
                .and_then(|hh| self.households.get(hh))
                .map(|hh| hh.lineage)
        });
        let expertise = self.sample_expertise(parents);
        let ancestry = AncestryTracker::from_parents(parents, &self.foragers, kinship_span);
        let base_need = base_food_need_for(age);
        self.foragers.insert(Forager {
            age,
            alive: true,
            parents: parents.to_vec(),
            mate: None,
            household: None,
            lineage,
            expertise,
            kinship_span,
            food_need: base_need,
            amount_fed: base_need,
            ancestry,
        })
    }

    fn step_forager(&mut self, id: ForagerId) {
        self.foragers[id].age += 1;
        if !self.foragers[id].check_death() {
            if self.foragers[id].age == AGE_OF_ADULT {
                self.spawn_household_from(id);
            }
            if self.foragers[id].is_bachelor() {
                self.find_a_mate(id);
            }
        }
        let forager = &mut self.foragers[id];
        forager.food_need = forager.base_food_need() + (forager.food_need - forager.amount_fed);
        forager.amount_fed = 0.0;
    }

    /// A newly adult forager moves out into a household of their own at the
    /// parental cell.
    fn spawn_household_from(&mut self, founder: ForagerId) {
        let Some(old_household) = self.foragers[founder].household else {
            return;
        };
        let Some(&cell) = self.locations.get(old_household) else {
            return;
        };
        let lineage = self.foragers[founder].lineage;
        let new_household = self.insert_household(cell, lineage);
        self.add_parent(new_household, founder);
        debug!(serial = self.households[new_household].serial, "household fission");
    }

    fn find_a_mate(&mut self, suitor: ForagerId) {
        let Some(home) = self.foragers[suitor].household else {
            return;
        };
        let neighbors = self.neighborhood_of(home, NEIGHBORHOOD_RADIUS);
        let mut bachelors: Vec<ForagerId> = Vec::new();
        for neighbor in neighbors {
            for member in self.households[neighbor].members() {
                if self.foragers[member].is_bachelor() {
                    bachelors.push(member);
                }
            }
        }
        bachelors.shuffle(&mut self.rng);
        for candidate in bachelors {
            if !self.foragers_are_kin(suitor, candidate) {
                self.marry(suitor, candidate);
                break;
            }
        }
    }

    fn is_household_parent(&self, forager: ForagerId) -> bool {
        self.foragers[forager]
            .household
            .and_then(|hh| self.households.get(hh))
            .is_some_and(|hh| hh.parents.contains(&forager))
    }

    /// Marry `mate` into the suitor's household. A mate who heads their own
    /// household brings its children and storage along; that household is
    /// dissolved.
    fn marry(&mut self, suitor: ForagerId, mate: ForagerId) {
        let Some(home) = self.foragers[suitor].household else {
            return;
        };
        if self.is_household_parent(mate)
            && let Some(other) = self.foragers[mate].household
        {
            self.absorb_household(home, other);
        }
        self.foragers[suitor].mate = Some(mate);
        self.foragers[mate].mate = Some(suitor);
        self.add_parent(home, mate);
        trace!("marriage joined two households");
    }

    fn absorb_household(&mut self, into: HouseholdId, other: HouseholdId) {
        if into == other {
            return;
        }
        let children: Vec<ForagerId> = self.households[other].children.clone();
        for child in children {
            self.add_child(into, child);
        }
        let adoptees: Vec<ForagerId> = self.households[other].adoptees.clone();
        for adoptee in adoptees {
            self.add_adoptee(into, adoptee);
        }
        self.households[into].food_storage += self.households[other].food_storage;
        debug!(absorbed = self.households[other].serial, "household merge");
        self.remove_household(other);
    }

    // -- membership --------------------------------------------------------

    fn insert_household(&mut self, cell: Cell, lineage: Option<u32>) -> HouseholdId {
        let serial = self.next_serial;
        self.next_serial += 1;
        let lineage = lineage.unwrap_or(serial);
        let id = self.households.insert(Household::new(serial, lineage));
        self.locations.insert(id, cell);
        self.occupancy.insert(cell, id);
        id
    }

    fn add_parent(&mut self, household: HouseholdId, forager: ForagerId) {
        self.households[household].parents.push(forager);
        self.join_household(forager, household);
    }

    fn add_child(&mut self, household: HouseholdId, forager: ForagerId) {
        self.households[household].children.push(forager);
        self.join_household(forager, household);
    }

    fn add_adoptee(&mut self, household: HouseholdId, forager: ForagerId) {
        self.households[household].adoptees.push(forager);
        self.join_household(forager, household);
    }

    fn join_household(&mut self, forager: ForagerId, household: HouseholdId) {
        if let Some(old) = self.foragers[forager].household
            && old != household
            && let Some(old_household) = self.households.get_mut(old)
        {
            old_household.remove_member(forager);
        }
        self.foragers[forager].household = Some(household);
        if self.foragers[forager].lineage.is_none() {
            let lineage = self.households[household].lineage;
            self.foragers[forager].lineage = Some(lineage);
        }
    }

    /// Remove dead members, clearing mate links and recording ages at
    /// death. Returns whether the household is now empty.
    fn sweep_deaths(&mut self, id: HouseholdId) -> bool {
        let members: Vec<ForagerId> = self.households[id].members().collect();
        let mut dead: Vec<ForagerId> = Vec::new();
        for member in members {
            if self.foragers[member].check_death() {
                dead.push(member);
            }
        }
        for member in dead {
            let (age, mate) = {
                let forager = &self.foragers[member];
                (forager.age, forager.mate)
            };
            self.metrics.ages_at_death.push(age);
            if age >= AGE_OF_ADULT {
                self.metrics.adult_ages_at_death.push(age);
            }
            if let Some(mate_id) = mate
                && let Some(mate_forager) = self.foragers.get_mut(mate_id)
            {
                mate_forager.mate = None;
            }
            self.households[id].remove_member(member);
            self.foragers.remove(member);
            trace!(age, "forager died");
        }
        self.households[id].size() == 0
    }

    fn remove_household(&mut self, id: HouseholdId) {
        if let Some(household) = self.households.remove(id) {
            if let Some(cell) = self.locations.remove(id) {
                self.occupancy.remove(cell, id);
            }
            // drop stale counterparty entries so no half-pairs linger
            for other in household.commitments.keys() {
                if let Some(counterparty) = self.households.get_mut(*other) {
                    counterparty.commitments.remove(&id);
                }
            }
            debug!(serial = household.serial, age = household.age, "household removed");
        }
    }

    // -- regrowth & metrics ------------------------------------------------

    /// Multiplicative regrowth toward capacity plus, in the same sweep, the
    /// per-cell local wealth-inequality measurement.
    fn regrow_and_measure(&mut self) {
        let width = self.config.width;
        let mut max_hoover = f64::MIN;
        let mut hoover_sum = 0.0;
        let mut storages: Vec<f64> = Vec::new();
        for x in 0..width {
            for y in 0..width {
                let idx = self.torus.index((x, y));
                if self.resources[idx] <= 0.0 {
                    self.resources[idx] = RESOURCE_ZERO;
                }
                self.resources[idx] *= self.regrowth[idx];
                if self.resources[idx] > self.capacity[idx] {
                    self.resources[idx] = self.capacity[idx];
                }

                storages.clear();
                let households = &self.households;
                self.occupancy.visit_within((x, y), 1, &mut |hh| {
                    if let Some(household) = households.get(hh) {
                        storages.push(household.food_storage);
                    }
                });
                let local = hoover_index(&storages);
                if local > max_hoover {
                    max_hoover = local;
                }
                hoover_sum += local;
            }
        }
        self.metrics.max_hoover.push(max_hoover);
        self.metrics
            .mean_hoover
            .push(hoover_sum / self.torus.cell_count() as f64);
    }

    fn append_metrics(&mut self, storages: &[f64], prestiges: &[f64]) {
        let dead_avg = self.dead_household_age_total / f64::from(self.dead_households);
        let household_count = self.households.len();
        let population = self.population;
        let shared_step = self.shared_step;

        let metrics = &mut self.metrics;
        metrics.avg_dead_household_age.push(dead_avg);
        if household_count == 0 {
            metrics.avg_household_size.push(0.0);
        } else {
            metrics
                .avg_household_size
                .push(population as f64 / household_count as f64);
        }
        metrics.food_shared.push(shared_step);
        metrics.food_shared_total += shared_step;
        metrics.food_shared_totals.push(metrics.food_shared_total);

        metrics.populations.push(population);
        let pop_mean = metrics.populations.iter().map(|p| *p as f64).sum::<f64>()
            / metrics.populations.len() as f64;
        metrics.avg_population.push(pop_mean);
        if metrics.populations.len() < 100 {
            metrics.avg_population_100.push(pop_mean);
        } else {
            let tail = &metrics.populations[metrics.populations.len() - 100..];
            metrics
                .avg_population_100
                .push(tail.iter().map(|p| *p as f64).sum::<f64>() / 100.0);
        }

        let avg_age = mean_of_ages(&metrics.ages_at_death);
        metrics.avg_age_at_death.push(avg_age);
        let avg_adult_age = mean_of_ages(&metrics.adult_ages_at_death);
        metrics.avg_adult_age_at_death.push(avg_adult_age);

        metrics.median_storage.push(median(storages));
        metrics.mean_storage.push(mean(storages));
        metrics.stddev_storage.push(std_dev(storages));

        if prestiges.is_empty() {
            metrics.max_prestige.push(0.0);
        } else {
            let top = prestiges.iter().copied().fold(f64::MIN, f64::max);
            metrics.max_prestige.push(top);
        }
        metrics.mean_prestige.push(mean(prestiges));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> ForageConfig {
        ForageConfig {
            grid_density: 0.0,
            min_resource: 1.0,
            max_resource: 1.0,
            starting_households: 0,
            expertise_sd: 0.0,
            birth_rate: 0.0,
            move_cost: 0.0,
            rng_seed: Some(7),
            ..ForageConfig::default()
        }
    }

    fn empty_world() -> World {
        World::new(quiet_config()).expect("world")
    }

    /// A household of `size` adults at `cell` built member by member.
    fn adult_household(world: &mut World, cell: Cell, size: usize) -> HouseholdId {
        let id = world.insert_household(cell, None);
        for _ in 0..size {
            let forager = world.create_forager(20, &[], Some(2.0));
            world.add_parent(id, forager);
        }
        id
    }

    #[test]
    fn config_validation_rejects_bad_values() {
        let mut config = ForageConfig::default();
        config.max_resource = 1.0; // below min_resource
        assert!(World::new(config).is_err());

        let mut config = ForageConfig::default();
        config.regrowth_steps = 0.0;
        assert!(World::new(config).is_err());

        let mut config = ForageConfig::default();
        config.birth_rate = 1.5;
        assert!(World::new(config).is_err());

        let mut config = ForageConfig::default();
        config.grid_density = 0.5;
        assert!(World::new(config).is_err());
    }

    #[test]
    fn setters_coerce_and_fail_fast() {
        let mut config = ForageConfig::default();
        assert_eq!(config.set_birth_rate(0.25).expect("valid"), 0.25);
        assert!(config.set_birth_rate(1.5).is_err());
        assert!(config.set_birth_rate(f64::NAN).is_err());
        assert!(config.set_max_resource(-1.0).is_err());
        assert_eq!(config.birth_rate, 0.25);

        assert_eq!(config.set_kinship_span(3.0).expect("valid"), 3.0);
        assert_eq!(config.min_kinship_span, 3.0);
        assert_eq!(config.max_kinship_span, 3.0);
        assert!(config.set_communal_sharing(true));
    }

    #[test]
    fn zero_density_landscape_is_uniform() {
        let config = quiet_config();
        let mut rng = SmallRng::seed_from_u64(1);
        let landscape = Landscape::generate(&config, &mut rng).expect("landscape");
        assert!(landscape.values().iter().all(|v| *v == 1.0));
        assert!(landscape.loci().is_empty());

        let scaled = landscape.normalize_to(8.0, 2.0);
        assert!(scaled.iter().all(|v| (*v - 8.0).abs() < 1e-12));
    }

    #[test]
    fn grid_density_landscape_sets_every_cell() {
        let config = ForageConfig {
            width: 20,
            grid_density: 2.0,
            rng_seed: Some(3),
            ..ForageConfig::default()
        };
        let mut rng = SmallRng::seed_from_u64(3);
        let landscape = Landscape::generate(&config, &mut rng).expect("landscape");
        assert_eq!(landscape.loci().len(), 4);
        assert!(landscape.values().iter().all(|v| *v > 0.0));
        // the (0, 0)-lattice locus carries the floor capacity
        let floor_locus = landscape
            .loci()
            .iter()
            .find(|(_, c)| (*c - config.cmin).abs() < 1e-12);
        assert!(floor_locus.is_some());
    }

    #[test]
    fn random_loci_landscape_respects_count_and_range() {
        let config = ForageConfig {
            width: 16,
            grid_density: -6.0,
            rng_seed: Some(11),
            ..ForageConfig::default()
        };
        let mut rng = SmallRng::seed_from_u64(11);
        let landscape = Landscape::generate(&config, &mut rng).expect("landscape");
        assert_eq!(landscape.loci().len(), 6);
        for (_, capacity) in landscape.loci() {
            assert!(*capacity >= config.cmin && *capacity <= 1.0);
        }
        assert!(landscape.values().iter().all(|v| *v > 0.0));
    }

    #[test]
    fn stats_helpers_match_definitions() {
        assert_eq!(mean(&[]), 0.0);
        assert!((mean(&[1.0, 3.0]) - 2.0).abs() < 1e-12);
        assert!((std_dev(&[2.0, 2.0, 2.0]) - 0.0).abs() < 1e-12);
        // upper-middle median for even-length input
        assert!((median(&[4.0, 1.0, 3.0, 2.0]) - 3.0).abs() < 1e-12);

        assert_eq!(hoover_index(&[]), 0.0);
        assert_eq!(hoover_index(&[0.0, 0.0]), 0.0);
        assert!((hoover_index(&[1.0, 1.0, 1.0, 1.0]) - 0.0).abs() < 1e-12);
        // mean 1, above-mean excess 3, total 4
        assert!((hoover_index(&[0.0, 0.0, 0.0, 4.0]) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn bounded_normal_stays_in_bounds() {
        let mut rng = SmallRng::seed_from_u64(5);
        for _ in 0..200 {
            let v = bounded_normal(&mut rng, 1.0, 0.2, 0.5, 1.5);
            assert!((0.5..=1.5).contains(&v));
        }
        assert_eq!(bounded_normal(&mut rng, 3.0, 0.0, 0.0, 1.0), 1.0);
    }

    #[test]
    fn base_need_ramps_with_age() {
        assert!((base_food_need_for(0) - 1.0 / 15.0).abs() < 1e-12);
        assert!((base_food_need_for(6) - 6.0 / 15.0).abs() < 1e-12);
        assert!((base_food_need_for(15) - 1.0).abs() < 1e-12);
        assert!((base_food_need_for(60) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn foraging_expertise_ramps_between_thresholds() {
        let mut world = empty_world();
        let id = world.create_forager(20, &[], Some(2.0));
        {
            let forager = world.forager_mut(id).expect("forager");
            forager.expertise = 2.0;
            forager.age = 3;
        }
        assert_eq!(world.forager(id).expect("forager").foraging_expertise(), 0.0);
        world.forager_mut(id).expect("forager").age = 10;
        let mid = world.forager(id).expect("forager").foraging_expertise();
        assert!((mid - 1.0).abs() < 1e-12);
        world.forager_mut(id).expect("forager").age = 15;
        let full = world.forager(id).expect("forager").foraging_expertise();
        assert!((full - 2.0).abs() < 1e-12);
    }

    #[test]
    fn expertise_sampling_respects_variance_switch() {
        let mut world = empty_world();
        // quiet_config has sd == 0: everyone gets the mean
        let id = world.create_forager(0, &[], Some(2.0));
        assert_eq!(
            world.forager(id).expect("forager").expertise,
            world.config().expertise_mean
        );

        let mut config = quiet_config();
        config.expertise_sd = 0.3;
        let mut noisy = World::new(config).expect("world");
        let mean = noisy.config().expertise_mean;
        for _ in 0..50 {
            let id = noisy.create_forager(0, &[], Some(2.0));
            let expertise = noisy.forager(id).expect("forager").expertise;
            assert!((0.0..=2.0 * mean).contains(&expertise));
        }
    }

    #[test]
    fn eat_rations_storage_proportionally() {
        let mut world = empty_world();
        let id = adult_household(&mut world, (4, 4), 2);
        let members: Vec<ForagerId> = world.household(id).expect("household").members().collect();
        // zero out what the founders start with
        for member in &members {
            let forager = world.forager_mut(*member).expect("forager");
            forager.amount_fed = 0.0;
            forager.food_need = 1.0;
        }
        world.household_mut(id).expect("household").food_storage = 1.0;
        world.household_eat(id);
        // storage covers half of the total need of 2.0
        for member in &members {
            let forager = world.forager(*member).expect("forager");
            assert!((forager.amount_fed - 0.5).abs() < 1e-12);
        }
        let storage = world.household(id).expect("household").food_storage;
        assert!(storage.abs() < 1e-12);
    }

    #[test]
    fn forage_conserves_food() {
        let mut world = empty_world();
        let id = adult_household(&mut world, (2, 2), 2);
        let idx = world.torus().index((2, 2));
        world.resources_mut()[idx] = 0.4;
        let gathered = world.forage(id, 1.0);
        assert!((gathered - 0.4).abs() < 1e-12);
        assert!(world.resources_at((2, 2)).abs() < 1e-12);
        // a depleted cell yields nothing
        assert_eq!(world.forage(id, 1.0), 0.0);
    }

    #[test]
    fn bilateral_transfer_keeps_ledger_symmetric() {
        let mut world = World::new(ForageConfig {
            bilateral_help: true,
            ..quiet_config()
        })
        .expect("world");
        let a = adult_household(&mut world, (5, 5), 2);
        let b = adult_household(&mut world, (5, 6), 2);
        world.household_mut(a).expect("household").food_storage = 4.0;
        let moved = world.give_food(a, b, 1.5, TransferKind::Bilateral);
        assert!((moved - 1.5).abs() < 1e-12);
        assert!((world.household(b).expect("household").debt_to(a) - 1.5).abs() < 1e-12);
        assert!((world.household(a).expect("household").debt_to(b) + 1.5).abs() < 1e-12);
        assert!((world.household(a).expect("household").prestige() - 1.5).abs() < 1e-12);
        assert_eq!(world.metrics().bilateral_shared().len(), 0); // no tick yet
    }

    #[test]
    fn kin_transfers_do_not_touch_the_ledger() {
        let mut world = empty_world();
        let a = adult_household(&mut world, (5, 5), 2);
        let b = adult_household(&mut world, (5, 6), 2);
        world.household_mut(a).expect("household").food_storage = 2.0;
        world.give_food(a, b, 1.0, TransferKind::Kin);
        assert!(world.household(a).expect("household").commitments.is_empty());
        assert!(world.household(b).expect("household").commitments.is_empty());
        assert!((world.household(b).expect("household").food_storage - 1.0).abs() < 1e-12);
    }

    #[test]
    fn bilateral_help_records_debt_for_each_borrower() {
        let mut config = quiet_config();
        config.bilateral_help = true;
        let mut world = World::new(config).expect("world");
        let rich = adult_household(&mut world, (10, 10), 2);
        let poor: Vec<HouseholdId> = [(10_u32, 11_u32), (10, 9), (9, 10)]
            .into_iter()
            .map(|cell| adult_household(&mut world, cell, 2))
            .collect();
        world.household_mut(rich).expect("household").food_storage = 10.0;
        world.metrics.bilateral_shared.push(0.0);

        for id in &poor {
            // leave each borrower two units short
            let members: Vec<ForagerId> =
                world.household(*id).expect("household").members().collect();
            for member in members {
                let forager = world.forager_mut(member).expect("forager");
                forager.food_need = 1.0;
                forager.amount_fed = 0.0;
            }
            world.ask_neighbors_for_help(*id);
        }

        let remaining = world.household(rich).expect("household").food_storage;
        assert!((remaining - 4.0).abs() < 1e-9);
        for id in &poor {
            let debt = world.household(*id).expect("household").debt_to(rich);
            assert!((debt - 2.0).abs() < 1e-9);
            assert!((world.household(rich).expect("household").debt_to(*id) + 2.0).abs() < 1e-9);
        }
        let brn_total = world.metrics.bilateral_shared.last().copied().expect("series");
        assert!((brn_total - 6.0).abs() < 1e-9);
    }

    #[test]
    fn communal_pooling_shares_per_capita() {
        let mut config = quiet_config();
        config.communal_sharing = true;
        let mut world = World::new(config).expect("world");
        let giver = adult_household(&mut world, (8, 8), 1);
        let two = adult_household(&mut world, (8, 9), 2);
        let three = adult_household(&mut world, (8, 7), 3);
        world.household_mut(giver).expect("household").food_storage = 12.0;
        world.metrics.communal_shared.push(0.0);

        world.disposition_excess(giver);

        // 12 units over 6 heads: 2 per member
        assert!((world.household(giver).expect("household").food_storage - 2.0).abs() < 1e-9);
        assert!((world.household(two).expect("household").food_storage - 4.0).abs() < 1e-9);
        assert!((world.household(three).expect("household").food_storage - 6.0).abs() < 1e-9);
        assert!(world.household(giver).expect("household").commitments.is_empty());
    }

    #[test]
    fn repayment_prefers_smallest_obligation() {
        let mut config = quiet_config();
        config.bilateral_help = true;
        let mut world = World::new(config).expect("world");
        let debtor = adult_household(&mut world, (3, 3), 1);
        let small = adult_household(&mut world, (3, 4), 1);
        let large = adult_household(&mut world, (3, 2), 1);
        world.metrics.bilateral_shared.push(0.0);
        // owe 1 to `small` and 3 to `large`, but only 2 on hand
        world.household_mut(small).expect("household").food_storage = 1.0;
        world.give_food(small, debtor, 1.0, TransferKind::Bilateral);
        world.household_mut(large).expect("household").food_storage = 3.0;
        world.give_food(large, debtor, 3.0, TransferKind::Bilateral);
        world.household_mut(debtor).expect("household").food_storage = 2.0;

        world.disposition_excess(debtor);

        // the small debt cleared in full before the large one
        assert!(world.household(debtor).expect("household").debt_to(small).abs() < 1e-9);
        assert!(world.household(debtor).expect("household").debt_to(large) > 0.0);
    }

    #[test]
    fn set_aside_caps_at_storage() {
        let mut world = empty_world();
        let lender = adult_household(&mut world, (6, 6), 1);
        let borrower = adult_household(&mut world, (6, 7), 1);
        world.household_mut(lender).expect("household").food_storage = 5.0;
        world.give_food(lender, borrower, 5.0, TransferKind::Bilateral);
        // owed 5 but holding nothing: nothing can be set aside
        assert_eq!(world.amount_to_set_aside(lender), 0.0);
        world.household_mut(lender).expect("household").food_storage = 2.0;
        assert!((world.amount_to_set_aside(lender) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn kinship_is_symmetric_and_bounded_by_span() {
        let mut world = empty_world();
        let home = adult_household(&mut world, (1, 1), 2);
        let parents: Vec<ForagerId> =
            world.household(home).expect("household").parents.clone();
        let child = world.create_forager(0, &parents, None);
        world.add_child(home, child);
        let grandchild = world.create_forager(0, &[child, parents[0]], None);

        assert!(world.foragers_are_kin(parents[0], child));
        assert_eq!(
            world.foragers_are_kin(child, grandchild),
            world.foragers_are_kin(grandchild, child)
        );
        assert!(world.foragers_are_kin(parents[1], grandchild));

        // span 1 tracks only direct parents
        let shallow = world.create_forager(0, &[child], Some(1.0));
        let forager = world.forager(shallow).expect("forager");
        assert_eq!(forager.ancestry.depth(), 1);
        assert!(!forager.ancestry.contains(parents[0]));
    }

    #[test]
    fn households_are_kin_through_any_member() {
        let mut world = empty_world();
        let home = adult_household(&mut world, (1, 1), 2);
        let parents: Vec<ForagerId> =
            world.household(home).expect("household").parents.clone();
        // an elder sibling heads the neighboring household
        let elder = world.create_forager(20, &parents, None);
        let other = world.insert_household((1, 2), None);
        world.add_parent(other, elder);
        // founders carry no ancestry, so kinship needs a born member on
        // both sides
        assert!(!world.households_are_kin(home, other));
        let younger = world.create_forager(5, &parents, None);
        world.add_child(home, younger);

        assert!(world.households_are_kin(home, other));
        assert!(world.households_are_kin(other, home));
        // a founder-only household is not even kin to itself
        let lone = adult_household(&mut world, (30, 30), 2);
        assert!(!world.households_are_kin(lone, lone));
        // but a household holding a born member is
        assert!(world.households_are_kin(other, other));
    }

    #[test]
    fn fission_spawns_household_at_parent_cell() {
        let mut world = empty_world();
        let home = adult_household(&mut world, (9, 9), 2);
        let parents: Vec<ForagerId> =
            world.household(home).expect("household").parents.clone();
        let child = world.create_forager(AGE_OF_ADULT - 1, &parents, None);
        world.add_child(home, child);

        world.step_forager(child);

        let new_home = world.forager(child).expect("forager").household.expect("household");
        assert_ne!(new_home, home);
        assert_eq!(world.location_of(new_home), Some((9, 9)));
        assert_eq!(world.household(new_home).expect("household").parents, vec![child]);
        assert_eq!(world.household(home).expect("household").children.len(), 0);
        // lineage follows the natal household
        assert_eq!(
            world.household(new_home).expect("household").lineage,
            world.household(home).expect("household").lineage
        );
    }

    #[test]
    fn marriage_absorbs_the_mates_household() {
        let mut world = empty_world();
        let his = world.insert_household((12, 12), None);
        let groom = world.create_forager(20, &[], Some(2.0));
        world.add_parent(his, groom);

        let hers = world.insert_household((12, 13), None);
        let bride = world.create_forager(20, &[], Some(2.0));
        world.add_parent(hers, bride);
        let ward = world.create_forager(4, &[bride], None);
        world.add_child(hers, ward);
        world.household_mut(hers).expect("household").food_storage = 3.5;

        world.find_a_mate(groom);

        assert_eq!(world.forager(groom).expect("forager").mate, Some(bride));
        assert_eq!(world.forager(bride).expect("forager").mate, Some(groom));
        assert!(world.household(hers).is_none());
        let merged = world.household(his).expect("household");
        assert_eq!(merged.parents.len(), 2);
        assert_eq!(merged.children, vec![ward]);
        assert!((merged.food_storage - 3.5).abs() < 1e-12);
    }

    #[test]
    fn bachelors_do_not_marry_kin() {
        let mut world = empty_world();
        let home = adult_household(&mut world, (20, 20), 2);
        let parents: Vec<ForagerId> =
            world.household(home).expect("household").parents.clone();
        // two siblings heading adjacent households
        let sister = world.create_forager(20, &parents, None);
        let hers = world.insert_household((20, 20), None);
        world.add_parent(hers, sister);
        let brother = world.create_forager(20, &parents, None);
        let his = world.insert_household((20, 19), None);
        world.add_parent(his, brother);

        world.find_a_mate(brother);
        assert_eq!(world.forager(brother).expect("forager").mate, None);
        assert_eq!(world.forager(sister).expect("forager").mate, None);
    }

    #[test]
    fn move_charges_each_member_and_abandons_storage() {
        let mut config = quiet_config();
        config.move_cost = 5.0;
        let mut world = World::new(config).expect("world");
        let id = adult_household(&mut world, (0, 0), 2);
        world.household_mut(id).expect("household").food_storage = 3.0;

        world.move_to(id, (0, 1));

        assert_eq!(world.location_of(id), Some((0, 1)));
        assert_eq!(world.household(id).expect("household").food_storage, 0.0);
        // cost: size 2 * (1 + 1) * 5 / 50 = 0.4, split per head
        let members: Vec<ForagerId> = world.household(id).expect("household").members().collect();
        for member in members {
            let fed = world.forager(member).expect("forager").amount_fed;
            assert!((fed - (1.0 - 0.2)).abs() < 1e-12);
        }
        assert_eq!(world.households_around((0, 1), 0), vec![id]);
        assert!(world.households_around((0, 0), 0).is_empty());
    }

    #[test]
    fn best_cell_prefers_the_richest_neighbor() {
        let mut world = empty_world();
        let idx = world.torus().index((7, 8));
        for value in world.resources_mut().iter_mut() {
            *value = 0.5;
        }
        world.resources_mut()[idx] = 2.0;
        let (cell, level) = world.best_cell((7, 7));
        assert_eq!(cell, (7, 8));
        assert!((level - 2.0).abs() < 1e-12);
    }

    #[test]
    fn run_outcome_reports_terminal_states() {
        let world = empty_world();
        assert_eq!(world.run_outcome(), Some(RunOutcome::Extinct));

        let mut config = quiet_config();
        config.starting_households = 4;
        config.width = 10;
        let world = World::new(config).expect("world");
        assert_eq!(world.run_outcome(), None);
        assert_eq!(world.outcome_after(10), None);
        assert_eq!(world.outcome_after(0), Some(RunOutcome::Completed));
    }

    #[test]
    fn removal_purges_counterparty_ledgers() {
        let mut world = empty_world();
        let a = adult_household(&mut world, (2, 2), 1);
        let b = adult_household(&mut world, (2, 3), 1);
        world.household_mut(a).expect("household").food_storage = 1.0;
        world.give_food(a, b, 1.0, TransferKind::Bilateral);
        world.remove_household(b);
        assert!(world.household(a).expect("household").commitments.is_empty());
    }
}
