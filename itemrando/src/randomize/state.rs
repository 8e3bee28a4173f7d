use itemrando_game::{AccessPointId, Boss, Item, LocationId};

use super::{ItemPlacement, RandomizationState};
use crate::traverse::AvailableLocation;

// Checkpoint of the search, pushed after every collected item. Restoring one brings the
// engine back to the moment right after that item was collected.
#[derive(Clone, Debug)]
pub struct SearchState {
    pub unused_locations: Vec<LocationId>,
    pub item_pool: Vec<Item>,
    pub current_ap: AccessPointId,
    pub collected_items: Vec<Item>,
    pub placements: Vec<ItemPlacement>,
    pub progression_indices: Vec<usize>,
    pub progression_placements: Vec<ItemPlacement>,
    pub bosses: Vec<Boss>,
    // Reachable unfilled locations at the time of the checkpoint.
    pub cur_locs: Vec<AvailableLocation>,
}

impl SearchState {
    pub fn capture(state: &RandomizationState, cur_locs: Vec<AvailableLocation>) -> SearchState {
        SearchState {
            unused_locations: state.unused_locations.clone(),
            item_pool: state.item_pool.clone(),
            current_ap: state.current_ap,
            collected_items: state.collected_items.clone(),
            placements: state.placements.clone(),
            progression_indices: state.progression_indices.clone(),
            progression_placements: state.progression_placements.clone(),
            bosses: state.global_state.defeated_bosses(),
            cur_locs,
        }
    }

    // The inventory is rebuilt from the collected items and the boss defeats are replayed,
    // so nothing derived from the abandoned branch survives. Memoized requirement results
    // are keyed by state and need no reset.
    pub fn restore(&self, state: &mut RandomizationState) {
        state.prog_types_cache.clear();
        state.non_prog_types_cache.clear();
        state.cur_locs = None;
        state.unused_locations = self.unused_locations.clone();
        state.item_pool = self.item_pool.clone();
        state.current_ap = self.current_ap;
        state.collected_items = self.collected_items.clone();
        state.placements = self.placements.clone();
        state.progression_indices = self.progression_indices.clone();
        state.progression_placements = self.progression_placements.clone();
        state.global_state = Default::default();
        for &item in &self.collected_items {
            state.global_state.collect(item);
        }
        state.global_state.set_defeated_bosses(&self.bosses);
    }
}
