pub mod state;

use std::time::Instant;

use hashbrown::HashMap;
use itemrando_game::{
    AccessPointId, Area, Boss, Cost, GraphArea, Item, ItemCategory, ItemClass, LocationId, World,
    SUBAREA_BLUE_BRINSTAR,
};
use itemrando_logic::{difficulty::difficulty_to_text, DifficultyValue, GlobalState};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::helpers::{choose_index, weighted_choice};
use crate::item_pool::{apply_forbidden, get_item_pool};
use crate::settings::{ItemChoice, LocationChoice, MorphPlacement, RandomizerSettings};
use crate::super_fun::SuperFunProvider;
use crate::traverse::{
    available_locations, can_access, end_game_difficulty, is_post_available,
    post_available_difficulty, AvailableLocation, RequirementCache,
};
use state::SearchState;

// Areas that must keep room for progression while filling with non-progression items.
const ROOM_AREAS: [Area; 5] = [
    Area::Brinstar,
    Area::Norfair,
    Area::WreckedShip,
    Area::LowerNorfair,
    Area::Maridia,
];

// Least useful items first, used to fill locations that are unreachable by construction.
const RESTRICTED_FILL_PRIORITY: [(Item, ItemClass); 8] = [
    (Item::Nothing, ItemClass::Minor),
    (Item::NoEnergy, ItemClass::Major),
    (Item::XRayScope, ItemClass::Major),
    (Item::Missile, ItemClass::Minor),
    (Item::Super, ItemClass::Minor),
    (Item::PowerBomb, ItemClass::Minor),
    (Item::Reserve, ItemClass::Major),
    (Item::ETank, ItemClass::Major),
];

const MAX_ROLLBACK_CANDIDATES: usize = 3;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error(
        "stuck with no rollback point left ({} items, {} locations remaining)",
        .remaining_items.len(),
        .remaining_locations.len()
    )]
    StuckNoRollback {
        remaining_items: Vec<Item>,
        remaining_locations: Vec<String>,
    },
    #[error(
        "game cannot be finished ({} items, {} locations remaining): {diagnostics}",
        .remaining_items.len(),
        .remaining_locations.len()
    )]
    Unfinishable {
        remaining_items: Vec<Item>,
        remaining_locations: Vec<String>,
        diagnostics: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemPlacement {
    pub item: Item,
    pub location: LocationId,
    pub difficulty: DifficultyValue,
    // False for locations filled without the item being picked up (unreachable locations
    // filled with junk, or the random fill of a partial completion).
    pub collected: bool,
    // Access point the player had to be able to return to when the item was placed.
    pub return_ap: AccessPointId,
    // Taking the item is what allows returning from the location.
    pub resolves_soft_lock: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Randomization {
    pub seed: usize,
    pub placements: Vec<ItemPlacement>,
    pub progression_placements: Vec<ItemPlacement>,
    pub forbidden_items: Vec<Item>,
    pub restricted_locations: Vec<LocationId>,
    pub diagnostics: String,
    pub partial_completion: bool,
    pub relaxed_difficulty: bool,
    pub rollback_count: usize,
}

pub struct Randomizer<'a> {
    pub world: &'a World,
    pub settings: &'a RandomizerSettings,
    pub initial_item_pool: Vec<Item>,
    pub forbidden_items: Vec<Item>,
    pub restricted_locations: Vec<LocationId>,
    pub super_fun_messages: Vec<String>,
    item_choice_weights: Vec<(ItemChoice, u32)>,
    location_choice_weights: Vec<(LocationChoice, u32)>,
    progression_item_types: Vec<Item>,
    item_limit: usize,
    location_limit: Option<usize>,
    soft_lock_probability: f32,
}

// State that changes over the course of the placement search
pub struct RandomizationState {
    unused_locations: Vec<LocationId>,
    item_pool: Vec<Item>,
    current_ap: AccessPointId,
    collected_items: Vec<Item>,
    global_state: GlobalState,
    placements: Vec<ItemPlacement>,
    progression_indices: Vec<usize>, // Indices in `snapshots` that follow a progression item
    progression_placements: Vec<ItemPlacement>,
    prog_types_cache: Vec<Item>,
    non_prog_types_cache: Vec<Item>,
    cur_locs: Option<Vec<AvailableLocation>>,
    fail_items: Vec<Item>,
    difficulty_ceiling: Cost,
    relaxed_from: Option<Cost>,
    snapshots: Vec<SearchState>,
    rollback_tried: HashMap<usize, Vec<Item>>,
    rollback_count: usize,
    cache: RequirementCache,
}

pub fn seeded_rng(seed: usize) -> StdRng {
    let mut rng_seed = [0u8; 32];
    rng_seed[..8].copy_from_slice(&(seed as u64).to_le_bytes());
    StdRng::from_seed(rng_seed)
}

impl<'a> Randomizer<'a> {
    pub fn new<R: Rng>(
        world: &'a World,
        settings: &'a RandomizerSettings,
        rng: &mut R,
    ) -> Result<Randomizer<'a>, GenerationError> {
        let base_pool = get_item_pool(world, settings, rng)?;
        let mut super_fun = SuperFunProvider::new(world, settings, &base_pool);
        super_fun.get_forbidden(rng);
        if !super_fun.check_completable() {
            return Err(GenerationError::Configuration(
                "the game cannot be completed even with every item".to_string(),
            ));
        }
        let outcome = super_fun.into_outcome();
        let initial_item_pool = apply_forbidden(&base_pool, &outcome.forbidden_items);
        info!(
            "{} items in pool, {} forbidden, {} restricted locations",
            initial_item_pool.len(),
            outcome.forbidden_items.len(),
            outcome.restricted_locations.len()
        );
        let speed = settings.progression_speed;
        Ok(Randomizer {
            world,
            settings,
            initial_item_pool,
            forbidden_items: outcome.forbidden_items,
            restricted_locations: outcome.restricted_locations,
            super_fun_messages: outcome.messages,
            item_choice_weights: speed.item_choice_weights(),
            location_choice_weights: settings.progression_difficulty.location_choice_weights(),
            progression_item_types: speed.progression_item_types(),
            item_limit: speed.item_limit(),
            location_limit: speed.location_limit(),
            soft_lock_probability: speed.soft_lock_probability(),
        })
    }

    fn location_names(&self, locs: &[LocationId]) -> Vec<String> {
        locs.iter()
            .map(|&l| self.world.locations[l].name.clone())
            .collect()
    }

    fn invalidate(&self, state: &mut RandomizationState) {
        state.cur_locs = None;
        state.prog_types_cache.clear();
        state.non_prog_types_cache.clear();
    }

    // Reachable unfilled locations, optionally assuming one more item, optionally keeping only
    // locations that can also be left with the extra gate they may impose.
    fn locations_with(
        &self,
        state: &mut RandomizationState,
        extra_item: Option<Item>,
        global: Option<&GlobalState>,
        post: bool,
    ) -> Vec<AvailableLocation> {
        let mut global = global.unwrap_or(&state.global_state).clone();
        if let Some(item) = extra_item {
            global.collect(item);
        }
        let locs = available_locations(
            self.world,
            self.settings,
            &global,
            state.difficulty_ceiling,
            state.current_ap,
            &state.unused_locations,
            &mut state.cache,
        );
        if !post {
            return locs;
        }
        locs.into_iter()
            .filter(|l| {
                is_post_available(
                    self.world,
                    self.settings,
                    &global,
                    state.difficulty_ceiling,
                    l.location_id,
                    None,
                    &mut state.cache,
                )
            })
            .collect()
    }

    fn current_locations(&self, state: &mut RandomizationState) -> Vec<AvailableLocation> {
        if let Some(locs) = &state.cur_locs {
            return locs.clone();
        }
        let locs = self.locations_with(state, None, None, false);
        state.cur_locs = Some(locs.clone());
        locs
    }

    fn loc_post_available(
        &self,
        state: &mut RandomizationState,
        loc_id: LocationId,
        item: Option<Item>,
    ) -> bool {
        is_post_available(
            self.world,
            self.settings,
            &state.global_state,
            state.difficulty_ceiling,
            loc_id,
            item,
            &mut state.cache,
        )
    }

    fn is_prog_item_now(&self, state: &mut RandomizationState, item: Item) -> bool {
        if item.is_junk() {
            return false;
        }
        if state.prog_types_cache.contains(&item) {
            return true;
        }
        if state.non_prog_types_cache.contains(&item) {
            return false;
        }
        let cur = self.current_locations(state).len();
        let is_prog = cur < self.locations_with(state, Some(item), None, false).len();
        if is_prog {
            state.prog_types_cache.push(item);
        } else {
            state.non_prog_types_cache.push(item);
        }
        is_prog
    }

    fn is_prog_item(&self, state: &mut RandomizationState, item: Item) -> bool {
        if item.is_junk() {
            return false;
        }
        if self.progression_item_types.contains(&item) {
            return true;
        }
        self.is_prog_item_now(state, item)
    }

    fn is_in_blue_brinstar(&self, loc_id: LocationId) -> bool {
        self.world.locations[loc_id].is_in_subarea(SUBAREA_BLUE_BRINSTAR)
    }

    fn suits_restriction(&self, item: Item, loc_id: LocationId) -> bool {
        let loc = &self.world.locations[loc_id];
        match item {
            Item::Gravity => {
                !(loc.area == Area::Crateria || loc.area == Area::Brinstar)
                    || self.settings.restrictions.suit_exceptions.contains(&loc.name)
            }
            Item::Varia => !(loc.area == Area::Crateria || self.is_in_blue_brinstar(loc_id)),
            _ => true,
        }
    }

    // Whether the player might get stuck after picking up the item at this location.
    fn is_soft_lock_possible<R: Rng>(
        &self,
        state: &mut RandomizationState,
        item: Item,
        loc_id: LocationId,
        rng: &mut R,
    ) -> bool {
        let loc = &self.world.locations[loc_id];
        if loc.softlock_exempt {
            return false;
        }
        let loc_ap = loc.access_point;
        let come_back = can_access(
            self.world,
            self.settings,
            &state.global_state,
            loc_ap,
            state.current_ap,
            state.difficulty_ceiling,
            Some(item),
            &mut state.cache,
        );
        if !come_back {
            return true;
        }
        if self.is_prog_item_now(state, item) && rng.gen::<f32>() >= self.soft_lock_probability {
            // The item makes the location available and post-available; if it is not post
            // available without the item, the item itself prevents the soft lock.
            if !self.loc_post_available(state, loc_id, None) {
                return true;
            }
            let come_back_without = can_access(
                self.world,
                self.settings,
                &state.global_state,
                loc_ap,
                state.current_ap,
                state.difficulty_ceiling,
                None,
                &mut state.cache,
            );
            if !come_back_without {
                return true;
            }
        }
        false
    }

    fn can_place_at_location<R: Rng>(
        &self,
        state: &mut RandomizationState,
        item: Item,
        loc_id: LocationId,
        check_soft_lock: bool,
        rng: &mut R,
    ) -> bool {
        let restrictions = &self.settings.restrictions;
        let loc = &self.world.locations[loc_id];
        if restrictions.major_minor && loc.class != item.class() {
            return false;
        }
        if restrictions.suits
            && (item == Item::Varia || item == Item::Gravity)
            && !self.suits_restriction(item, loc_id)
        {
            return false;
        }
        if restrictions.morph == MorphPlacement::Early
            && (item == Item::SpeedBooster || item == Item::ScrewAttack)
            && self.is_in_blue_brinstar(loc_id)
        {
            return false;
        }
        if restrictions.morph == MorphPlacement::Late
            && item == Item::Morph
            && loc.graph_area == GraphArea::Crateria
        {
            return false;
        }
        if check_soft_lock {
            return !self.is_soft_lock_possible(state, item, loc_id, rng);
        }
        true
    }

    fn can_place_item<R: Rng>(
        &self,
        state: &mut RandomizationState,
        item: Item,
        locs: &[AvailableLocation],
        rng: &mut R,
    ) -> bool {
        locs.iter()
            .any(|l| self.can_place_at_location(state, item, l.location_id, false, rng))
    }

    // Whether the item opens up new locations (new major locations, when majors and minors
    // are kept apart).
    fn check_item<R: Rng>(
        &self,
        state: &mut RandomizationState,
        cur_locs: &[AvailableLocation],
        item: Item,
        rng: &mut R,
    ) -> bool {
        if item.is_junk() {
            return false;
        }
        if !self.can_place_item(state, item, cur_locs, rng) {
            return false;
        }
        let new_locs = self.locations_with(state, Some(item), None, false);
        let has_major = !self.settings.restrictions.major_minor
            || new_locs
                .iter()
                .any(|l| self.world.locations[l.location_id].class == ItemClass::Major);
        has_major && new_locs.len() > cur_locs.len()
    }

    // Every pool item whose type opens up new locations, shuffled.
    fn possible_items<R: Rng>(
        &self,
        state: &mut RandomizationState,
        cur_locs: &[AvailableLocation],
        pool: &[Item],
        rng: &mut R,
    ) -> Vec<Item> {
        let mut types: Vec<Item> = pool.to_vec();
        types.sort();
        types.dedup();
        let mut out: Vec<Item> = vec![];
        for t in types {
            if self.check_item(state, cur_locs, t, rng) {
                out.extend(pool.iter().filter(|&&i| i == t));
            }
        }
        out.shuffle(rng);
        out
    }

    fn choose_item_by_progression(
        &self,
        state: &mut RandomizationState,
        items: &[Item],
        fewest: bool,
    ) -> Option<Item> {
        let mut new_locs_by_type: HashMap<Item, usize> = HashMap::new();
        let mut best: Option<(Item, usize)> = None;
        for &item in items {
            if state.fail_items.contains(&item) {
                continue;
            }
            let n = match new_locs_by_type.get(&item) {
                Some(&n) => n,
                None => {
                    let n = self.locations_with(state, Some(item), None, false).len();
                    new_locs_by_type.insert(item, n);
                    n
                }
            };
            let better = match best {
                None => {
                    if fewest {
                        true
                    } else {
                        n > 0
                    }
                }
                Some((_, best_n)) => {
                    if fewest {
                        n < best_n
                    } else {
                        n > best_n
                    }
                }
            };
            if better {
                best = Some((item, n));
            }
        }
        best.map(|(item, _)| item)
    }

    fn choose_item_random<R: Rng>(
        &self,
        state: &RandomizationState,
        items: &[Item],
        rng: &mut R,
    ) -> Option<Item> {
        let candidates: Vec<Item> = items
            .iter()
            .copied()
            .filter(|i| !state.fail_items.contains(i))
            .collect();
        choose_index(candidates.len(), rng).map(|i| candidates[i])
    }

    fn choose_item<R: Rng>(
        &self,
        state: &mut RandomizationState,
        items: &mut Vec<Item>,
        rng: &mut R,
    ) -> Option<Item> {
        items.shuffle(rng);
        let chosen = match weighted_choice(&self.item_choice_weights, rng) {
            Some(ItemChoice::MinProgression) => self.choose_item_by_progression(state, items, true),
            Some(ItemChoice::MaxProgression) => {
                self.choose_item_by_progression(state, items, false)
            }
            Some(ItemChoice::Random) | None => None,
        };
        chosen.or_else(|| self.choose_item_random(state, items, rng))
    }

    fn location_difficulty(
        &self,
        state: &mut RandomizationState,
        loc: &AvailableLocation,
    ) -> DifficultyValue {
        let post = post_available_difficulty(
            self.world,
            self.settings,
            &state.global_state,
            loc.location_id,
            &mut state.cache,
        );
        loc.difficulty.and(post)
    }

    fn choose_location_by_difficulty(
        &self,
        state: &mut RandomizationState,
        locs: &[AvailableLocation],
        hardest: bool,
    ) -> Option<AvailableLocation> {
        let mut best: Option<(AvailableLocation, Cost)> = None;
        for loc in locs {
            let cost = self.location_difficulty(state, loc).cost;
            let better = match best {
                None => true,
                Some((_, best_cost)) => {
                    if hardest {
                        cost > best_cost
                    } else {
                        cost < best_cost
                    }
                }
            };
            if better {
                best = Some((*loc, cost));
            }
        }
        best.map(|(loc, _)| loc)
    }

    // Locations in the areas where the fewest major progression items were placed so far.
    fn locs_spread_progression(
        &self,
        state: &RandomizationState,
        locs: &[AvailableLocation],
    ) -> Vec<AvailableLocation> {
        let prog_areas: Vec<Area> = state
            .progression_placements
            .iter()
            .filter(|p| {
                p.item.class() == ItemClass::Major && p.item.category() != ItemCategory::Energy
            })
            .map(|p| self.world.locations[p.location].area)
            .collect();
        let distance = |loc: &AvailableLocation| -> f32 {
            let area = self.world.locations[loc.location_id].area;
            let cnt = prog_areas.iter().filter(|&&a| a == area).count();
            if cnt == 0 {
                2.0
            } else {
                1.0 / cnt as f32
            }
        };
        let max_dist = locs.iter().map(distance).fold(f32::MIN, f32::max);
        locs.iter()
            .filter(|l| distance(l) == max_dist)
            .copied()
            .collect()
    }

    fn choose_location<R: Rng>(
        &self,
        state: &mut RandomizationState,
        available: Vec<AvailableLocation>,
        item: Item,
        rng: &mut R,
    ) -> Option<AvailableLocation> {
        let is_prog = self.is_prog_item(state, item);
        let mut locs = if self.settings.restrictions.spread_items && is_prog {
            self.locs_spread_progression(state, &available)
        } else {
            available
        };
        locs.shuffle(rng);
        let choice = if is_prog {
            weighted_choice(&self.location_choice_weights, rng)
        } else {
            Some(LocationChoice::Random)
        };
        match choice {
            Some(LocationChoice::MinDifficulty) => {
                self.choose_location_by_difficulty(state, &locs, false)
            }
            Some(LocationChoice::MaxDifficulty) => {
                self.choose_location_by_difficulty(state, &locs, true)
            }
            Some(LocationChoice::Random) | None => choose_index(locs.len(), rng).map(|i| locs[i]),
        }
    }

    fn get_item_to_place<R: Rng>(
        &self,
        state: &mut RandomizationState,
        items: &[Item],
        pool: &[Item],
        rng: &mut R,
    ) -> Option<Item> {
        if items.is_empty() {
            self.choose_item_random(state, pool, rng)
        } else {
            let mut items = items.to_vec();
            self.choose_item(state, &mut items, rng)
        }
    }

    fn place_item<R: Rng>(
        &self,
        state: &mut RandomizationState,
        items: &[Item],
        pool: &[Item],
        cur_locs: &[AvailableLocation],
        rng: &mut R,
    ) -> Option<(Item, AvailableLocation)> {
        let item = self.get_item_to_place(state, items, pool, rng)?;
        let mut locations: Vec<AvailableLocation> = vec![];
        for loc in cur_locs {
            if self.loc_post_available(state, loc.location_id, Some(item)) {
                locations.push(*loc);
            }
        }
        // Reachable boss locations count as beaten, which may open up more of the game.
        let mut defeated_any = false;
        for loc in &locations {
            if let Some(boss) = self.world.locations[loc.location_id].pickup {
                if !state.global_state.is_boss_defeated(boss) {
                    debug!("pickup: {:?} defeated", boss);
                    state.global_state.defeat_boss(boss);
                    defeated_any = true;
                }
            }
        }
        if defeated_any {
            self.invalidate(state);
        }
        let mut available: Vec<AvailableLocation> = vec![];
        for loc in locations {
            if self.can_place_at_location(state, item, loc.location_id, true, rng) {
                available.push(loc);
            }
        }
        if available.is_empty() {
            if !state.fail_items.contains(&item) {
                state.fail_items.push(item);
            }
            return None;
        }
        let location = self.choose_location(state, available, item, rng)?;
        Some((item, location))
    }

    fn generate_item<R: Rng>(
        &self,
        state: &mut RandomizationState,
        cur_locs: &[AvailableLocation],
        pool: &[Item],
        rng: &mut R,
    ) -> Option<(Item, AvailableLocation)> {
        state.fail_items.clear();
        let pos_items = self.possible_items(state, cur_locs, pool, rng);
        let mut types: Vec<Item> = if pos_items.is_empty() {
            pool.to_vec()
        } else {
            pos_items.clone()
        };
        types.sort();
        types.dedup();
        let num_types = types.len();
        while state.fail_items.len() < num_types {
            let placed = self.place_item(state, &pos_items, pool, cur_locs, rng);
            if placed.is_some() {
                return placed;
            }
            if self.choose_item_random(state, pool, rng).is_none() {
                break;
            }
        }
        None
    }

    // Like `generate_item`, but only among the possible items not yet tried from snapshot `idx`.
    fn generate_untried_item<R: Rng>(
        &self,
        state: &mut RandomizationState,
        idx: usize,
        cur_locs: &[AvailableLocation],
        pool: &[Item],
        rng: &mut R,
    ) -> Option<(Item, AvailableLocation)> {
        let tried = state.rollback_tried.get(&idx).cloned().unwrap_or_default();
        let untried: Vec<Item> = self
            .possible_items(state, cur_locs, pool, rng)
            .into_iter()
            .filter(|item| !tried.contains(item))
            .collect();
        state.fail_items = tried;
        while untried.iter().any(|item| !state.fail_items.contains(item)) {
            let num_failed = state.fail_items.len();
            let placed = self.place_item(state, &untried, pool, cur_locs, rng);
            if placed.is_some() {
                return placed;
            }
            if state.fail_items.len() == num_failed {
                break;
            }
        }
        None
    }

    fn get_item(
        &self,
        state: &mut RandomizationState,
        item: Item,
        location: LocationId,
        difficulty: DifficultyValue,
        collect: bool,
    ) {
        let is_prog = self.is_prog_item_now(state, item);
        let mut cur_locs: Vec<AvailableLocation> = vec![];
        let return_ap = state.current_ap;
        let mut resolves_soft_lock = false;
        if collect {
            cur_locs = self.locations_with(state, Some(item), None, false);
            let loc_ap = self.world.locations[location].access_point;
            resolves_soft_lock = !can_access(
                self.world,
                self.settings,
                &state.global_state,
                loc_ap,
                return_ap,
                state.difficulty_ceiling,
                None,
                &mut state.cache,
            ) && can_access(
                self.world,
                self.settings,
                &state.global_state,
                loc_ap,
                return_ap,
                state.difficulty_ceiling,
                Some(item),
                &mut state.cache,
            );
            state.current_ap = loc_ap;
            state.collected_items.push(item);
            state.global_state.collect(item);
            state.prog_types_cache.clear();
            state.non_prog_types_cache.clear();
        }
        state.unused_locations.retain(|&l| l != location);
        state.cur_locs = None;
        let placement = ItemPlacement {
            item,
            location,
            difficulty,
            collected: collect,
            return_ap,
            resolves_soft_lock,
        };
        debug!(
            "{}: {:?} at {} ({})",
            state.collected_items.len(),
            item,
            self.world.locations[location].name,
            difficulty_to_text(difficulty.cost)
        );
        state.placements.push(placement.clone());
        if let Some(idx) = state.item_pool.iter().position(|&i| i == item) {
            state.item_pool.remove(idx);
        }
        if collect {
            if is_prog {
                state.progression_indices.push(state.snapshots.len());
                state.progression_placements.push(placement);
            }
            cur_locs.retain(|l| l.location_id != location);
            let snapshot = SearchState::capture(state, cur_locs);
            state.snapshots.push(snapshot);
        }
    }

    // Whether the locations left in the pool still leave room for the progression items.
    fn check_loc_pool(&self, state: &mut RandomizationState) -> bool {
        let limit = match self.location_limit {
            Some(limit) => limit,
            None => return true,
        };
        let pool = state.item_pool.clone();
        let mut prog_items: Vec<Item> = vec![];
        for item in pool {
            if self.is_prog_item(state, item) {
                prog_items.push(item);
            }
        }
        if prog_items.is_empty() {
            return true;
        }
        let is_minor_prog = prog_items.iter().any(|i| i.class() == ItemClass::Minor);
        let is_major_prog = prog_items.iter().any(|i| i.class() == ItemClass::Major);
        let major_minor = self.settings.restrictions.major_minor;
        let fits = |class: ItemClass| -> bool {
            let maj = !major_minor || class == ItemClass::Major;
            let min = !major_minor || class == ItemClass::Minor;
            (is_major_prog && maj) || (is_minor_prog && min)
        };
        let mut accessible = 0;
        for loc in self.current_locations(state) {
            if fits(self.world.locations[loc.location_id].class)
                && self.loc_post_available(state, loc.location_id, None)
            {
                accessible += 1;
            }
        }
        if accessible <= limit {
            debug!("check_loc_pool: only {accessible} accessible locations left");
            return false;
        }
        let mut room = [0usize; ROOM_AREAS.len()];
        for &loc_id in &state.unused_locations {
            let loc = &self.world.locations[loc_id];
            if let Some(i) = ROOM_AREAS.iter().position(|&a| a == loc.area) {
                if fits(loc.class) {
                    room[i] += 1;
                }
            }
        }
        !room.iter().any(|&r| r > 0 && r <= limit)
    }

    // Places a jittered number of non-progression items. Returns true if stuck.
    fn fill_non_progression_items<R: Rng>(
        &self,
        state: &mut RandomizationState,
        rng: &mut R,
    ) -> bool {
        if self.item_limit == 0 {
            return false;
        }
        let non_prog_pool = |this: &Self, state: &mut RandomizationState| -> Vec<Item> {
            let pool = state.item_pool.clone();
            pool.into_iter()
                .filter(|&i| !this.is_prog_item(state, i))
                .collect()
        };
        let mut pool = non_prog_pool(self, state);
        let pool_was_empty = pool.is_empty();
        let min_limit = self.item_limit - self.item_limit / 5;
        let max_limit = self.item_limit + self.item_limit / 5;
        let item_limit = rng.gen_range(min_limit..=max_limit);
        let mut num_items = 0;
        let mut loc_pool_ok = true;
        let mut last_placed = None;
        while !pool.is_empty() && num_items < item_limit && loc_pool_ok {
            let cur_locs = self.current_locations(state);
            last_placed = self.generate_item(state, &cur_locs, &pool, rng);
            match last_placed {
                None => break,
                Some((item, loc)) => {
                    num_items += 1;
                    self.get_item(state, item, loc.location_id, loc.difficulty, true);
                    pool = non_prog_pool(self, state);
                }
            }
            loc_pool_ok = self.check_loc_pool(state);
        }
        !pool_was_empty && last_placed.is_none()
    }

    // Returns true if stuck.
    fn get_item_from_standard_pool<R: Rng>(
        &self,
        state: &mut RandomizationState,
        rng: &mut R,
    ) -> bool {
        let cur_locs = self.current_locations(state);
        let pool = state.item_pool.clone();
        match self.generate_item(state, &cur_locs, &pool, rng) {
            Some((item, loc)) => {
                self.get_item(state, item, loc.location_id, loc.difficulty, true);
                false
            }
            None => true,
        }
    }

    // Goes back through the checkpoints to find one from which a not yet tried item can be
    // placed, scanning back past progression checkpoints when needed, and places it.
    fn rollback<R: Rng>(
        &self,
        state: &mut RandomizationState,
        rng: &mut R,
    ) -> Result<(), GenerationError> {
        let stuck_items = state.item_pool.clone();
        let stuck_locations = self.location_names(&state.unused_locations);
        let num_snapshots_at_start = state.snapshots.len();
        // The newest snapshot is the state we are stuck in.
        state.snapshots.pop();
        if state.progression_indices.last() == Some(&state.snapshots.len()) {
            state.progression_indices.pop();
        }
        let mut markers = state.progression_indices.clone();
        loop {
            if state.snapshots.is_empty() {
                break;
            }
            let max_point = state.snapshots.len() - 1;
            let min_point = markers.last().copied().unwrap_or(0).min(max_point);
            let mut candidates: Vec<(usize, Item, AvailableLocation, Vec<Boss>)> = vec![];
            for i in (min_point..=max_point).rev() {
                if candidates.len() >= MAX_ROLLBACK_CANDIDATES {
                    break;
                }
                let snapshot = state.snapshots[i].clone();
                snapshot.restore(state);
                let pool = state.item_pool.clone();
                if let Some((item, loc)) =
                    self.generate_untried_item(state, i, &snapshot.cur_locs, &pool, rng)
                {
                    // Bosses beaten while looking for a location stay beaten for the placement.
                    candidates.push((i, item, loc, state.global_state.defeated_bosses()));
                }
            }
            if let Some(c) = choose_index(candidates.len(), rng) {
                let (i, item, loc, bosses) = candidates.swap_remove(c);
                state.rollback_tried.entry(i).or_default().push(item);
                // Entries past the new head refer to abandoned snapshots.
                state.rollback_tried.retain(|&k, _| k <= i);
                let snapshot = state.snapshots[i].clone();
                snapshot.restore(state);
                state.snapshots.truncate(i + 1);
                state.global_state.set_defeated_bosses(&bosses);
                self.invalidate(state);
                state.rollback_count += 1;
                debug!(
                    "rollback: {} -> {} snapshots, retrying with {:?}",
                    num_snapshots_at_start,
                    state.snapshots.len(),
                    item
                );
                self.get_item(state, item, loc.location_id, loc.difficulty, true);
                return Ok(());
            }
            if min_point == 0 {
                break;
            }
            debug!("rollback: dropping progression checkpoint {min_point}");
            markers.pop();
        }
        Err(GenerationError::StuckNoRollback {
            remaining_items: stuck_items,
            remaining_locations: stuck_locations,
        })
    }

    // Whether beating the bosses would make every remaining location reachable.
    fn only_bosses_left(&self, state: &mut RandomizationState) -> bool {
        let prev_locs = self.locations_with(state, None, None, true);
        let mut all_bosses = state.global_state.clone();
        all_bosses.defeat_all_bosses();
        let new_locs = self.locations_with(state, None, Some(&all_bosses), true);
        let mut count = new_locs.len();
        for &loc_id in &state.unused_locations {
            if self.world.locations[loc_id].pickup.is_some()
                && !new_locs.iter().any(|l| l.location_id == loc_id)
            {
                count += 1;
            }
        }
        count > prev_locs.len() && count == state.unused_locations.len()
    }

    fn can_end_game(&self, state: &mut RandomizationState) -> bool {
        end_game_difficulty(self.world, self.settings, &state.global_state, &mut state.cache)
            .reachable
    }

    fn fill_restricted_locations(&self, state: &mut RandomizationState) {
        let major_minor = self.settings.restrictions.major_minor;
        for &loc_id in &self.restricted_locations {
            let class = self.world.locations[loc_id].class;
            let chosen = RESTRICTED_FILL_PRIORITY.iter().find(|&&(item, item_class)| {
                (!major_minor || class == item_class) && state.item_pool.contains(&item)
            });
            match chosen {
                Some(&(item, _)) => {
                    self.get_item(state, item, loc_id, DifficultyValue::UNREACHABLE, false)
                }
                None => break,
            }
        }
    }

    fn above_max_difficulty_str(&self, state: &RandomizationState, max_difficulty: Cost) -> String {
        let locs: Vec<String> = state
            .placements
            .iter()
            .filter(|p| p.difficulty.reachable && p.difficulty.cost > max_difficulty)
            .map(|p| {
                format!(
                    "{}: {}",
                    self.world.locations[p.location].name,
                    difficulty_to_text(p.difficulty.cost)
                )
            })
            .collect();
        format!("[ {} ]", locs.join(" ; "))
    }

    fn initial_state(&self) -> RandomizationState {
        RandomizationState {
            unused_locations: (0..self.world.locations.len()).collect(),
            item_pool: self.initial_item_pool.clone(),
            current_ap: self.world.start_access_point,
            collected_items: vec![],
            global_state: GlobalState::default(),
            placements: vec![],
            progression_indices: vec![],
            progression_placements: vec![],
            prog_types_cache: vec![],
            non_prog_types_cache: vec![],
            cur_locs: None,
            fail_items: vec![],
            difficulty_ceiling: self.settings.difficulty_ceiling(),
            relaxed_from: None,
            snapshots: vec![],
            rollback_tried: HashMap::new(),
            rollback_count: 0,
            cache: RequirementCache::default(),
        }
    }

    fn push_initial_snapshot(&self, state: &mut RandomizationState) {
        let cur_locs = self.current_locations(state);
        let initial = SearchState::capture(state, cur_locs);
        state.snapshots.push(initial);
    }

    pub fn randomize<R: Rng>(
        &self,
        seed: usize,
        rng: &mut R,
    ) -> Result<Randomization, GenerationError> {
        let mut state = self.initial_state();
        let mut diagnostics: Vec<String> = vec![];
        if !self.super_fun_messages.is_empty() {
            diagnostics.push(format!("Super Fun: {}", self.super_fun_messages.join(", ")));
        }

        self.fill_restricted_locations(&mut state);
        self.push_initial_snapshot(&mut state);
        info!(
            "[seed {seed}] {} items to place in {} locations",
            state.item_pool.len(),
            state.unused_locations.len()
        );

        let runtime_limit = self.settings.runtime_limit();
        let start_time = Instant::now();
        let mut is_stuck = false;
        while !state.item_pool.is_empty() && !is_stuck {
            is_stuck = self.fill_non_progression_items(&mut state, rng);
            if !state.item_pool.is_empty() {
                if !is_stuck {
                    is_stuck = self.get_item_from_standard_pool(&mut state, rng);
                }
                if is_stuck {
                    let bosses = match state.snapshots.last() {
                        Some(s) => s.bosses.clone(),
                        None => vec![],
                    };
                    let only_bosses = state.difficulty_ceiling.is_finite()
                        && self.only_bosses_left(&mut state);
                    state.global_state.set_defeated_bosses(&bosses);
                    self.invalidate(&mut state);
                    if only_bosses {
                        // Stuck by boss fights: lift the difficulty cap and report it afterwards.
                        info!(
                            "[seed {seed}] only boss locations left, lifting the maximum difficulty"
                        );
                        if state.relaxed_from.is_none() {
                            state.relaxed_from = Some(state.difficulty_ceiling);
                        }
                        state.difficulty_ceiling = f32::INFINITY;
                        is_stuck = false;
                    } else {
                        let num_cur_locs = state.snapshots.last().map_or(0, |s| s.cur_locs.len());
                        if num_cur_locs < state.unused_locations.len() {
                            self.rollback(&mut state, rng)?;
                            is_stuck = false;
                        } else {
                            is_stuck = self.get_item_from_standard_pool(&mut state, rng);
                        }
                    }
                }
            }
            if let Some(limit) = runtime_limit {
                if start_time.elapsed() > limit {
                    info!("[seed {seed}] runtime limit reached");
                    break;
                }
            }
        }

        let mut partial_completion = false;
        if !state.item_pool.is_empty() {
            if self.can_end_game(&mut state) {
                info!(
                    "[seed {seed}] placing the {} remaining items randomly",
                    state.item_pool.len()
                );
                let num_random = state.item_pool.len();
                while let Some(&item) = state.item_pool.first() {
                    let idx = match choose_index(state.unused_locations.len(), rng) {
                        Some(idx) => idx,
                        None => break,
                    };
                    let loc_id = state.unused_locations[idx];
                    self.get_item(&mut state, item, loc_id, DifficultyValue::UNREACHABLE, false);
                }
                partial_completion = true;
                diagnostics.push(format!(
                    "Could not place every item with logic: {num_random} items were placed randomly."
                ));
            } else {
                diagnostics.push(
                    "Stuck because of navigation. Retry, and disable either super fun settings/late \
                     morph ball/suits restriction if the problem happens again."
                        .to_string(),
                );
                return Err(GenerationError::Unfinishable {
                    remaining_items: state.item_pool.clone(),
                    remaining_locations: self.location_names(&state.unused_locations),
                    diagnostics: diagnostics.join(" "),
                });
            }
        }
        if let Some(prev) = state.relaxed_from {
            diagnostics.push(format!(
                "Boss fights forced us to up the maximum difficulty. Affected locations: {}",
                self.above_max_difficulty_str(&state, prev)
            ));
        }
        info!(
            "[seed {seed}] done: {} placements, {} rollbacks",
            state.placements.len(),
            state.rollback_count
        );
        debug!(
            "[seed {seed}] requirement cache: {} hits, {} misses",
            state.cache.hits, state.cache.misses
        );
        Ok(Randomization {
            seed,
            placements: state.placements,
            progression_placements: state.progression_placements,
            forbidden_items: self.forbidden_items.clone(),
            restricted_locations: self.restricted_locations.clone(),
            diagnostics: diagnostics.join(" "),
            partial_completion,
            relaxed_difficulty: state.relaxed_from.is_some(),
            rollback_count: state.rollback_count,
        })
    }
}

// Builds the item pool, runs the restriction pass and the placement search, all driven by one
// random source derived from the seed.
pub fn randomize_seed(
    world: &World,
    settings: &RandomizerSettings,
    seed: usize,
) -> Result<Randomization, GenerationError> {
    let mut rng = seeded_rng(seed);
    let randomizer = Randomizer::new(world, settings, &mut rng)?;
    randomizer.randomize(seed, &mut rng)
}
