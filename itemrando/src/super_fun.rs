use itemrando_game::{Cost, Item, LocationId, World};
use itemrando_logic::GlobalState;
use log::{debug, info};
use rand::Rng;

use crate::helpers::rand_gauss_bounds;
use crate::item_pool::apply_forbidden;
use crate::settings::{MorphPlacement, RandomizerSettings, SuperFunCategory};
use crate::traverse::{
    available_access_points, available_locations, end_game_difficulty, is_post_available,
    RequirementCache,
};

pub const SUITS: [Item; 2] = [Item::Varia, Item::Gravity];
// In order of priority:
pub const MOVEMENT_ITEMS: [Item; 6] = [
    Item::SpaceJump,
    Item::HiJump,
    Item::SpeedBooster,
    Item::Bomb,
    Item::Grapple,
    Item::SpringBall,
];
pub const COMBAT_ITEMS: [Item; 4] = [Item::ScrewAttack, Item::Plasma, Item::Wave, Item::Spazer];

#[derive(Clone, Debug, Default)]
pub struct SuperFunOutcome {
    pub forbidden_items: Vec<Item>,
    // Locations that cannot be reached once the forbidden items are gone.
    pub restricted_locations: Vec<LocationId>,
    pub messages: Vec<String>,
}

pub struct SuperFunProvider<'a> {
    world: &'a World,
    settings: &'a RandomizerSettings,
    base_pool: &'a [Item],
    ceiling: Cost,
    cache: RequirementCache,
    forbidden: Vec<Item>,
    restricted: Vec<LocationId>,
    last_restricted: Vec<LocationId>,
    messages: Vec<String>,
}

impl<'a> SuperFunProvider<'a> {
    pub fn new(
        world: &'a World,
        settings: &'a RandomizerSettings,
        base_pool: &'a [Item],
    ) -> SuperFunProvider<'a> {
        SuperFunProvider {
            world,
            settings,
            base_pool,
            ceiling: settings.difficulty_ceiling(),
            cache: RequirementCache::default(),
            forbidden: vec![],
            restricted: vec![],
            last_restricted: vec![],
            messages: vec![],
        }
    }

    // Grants every item of the pool (minus the forbidden ones), beats every boss, and checks
    // that the whole graph and every boss location can still be reached.
    pub fn check_pool(&mut self, extra_forbidden: Option<Item>) -> bool {
        let mut forbidden = self.forbidden.clone();
        forbidden.extend(extra_forbidden);
        let pool = apply_forbidden(self.base_pool, &forbidden);
        let mut global = GlobalState::default();
        for &item in &pool {
            global.collect(item);
        }
        global.defeat_all_bosses();

        let world = self.world;
        let start = world.start_access_point;
        let all_locations: Vec<LocationId> = (0..world.locations.len()).collect();
        let available: Vec<LocationId> = available_locations(
            world,
            self.settings,
            &global,
            self.ceiling,
            start,
            &all_locations,
            &mut self.cache,
        )
        .into_iter()
        .map(|l| l.location_id)
        .filter(|&loc_id| {
            is_post_available(
                world,
                self.settings,
                &global,
                self.ceiling,
                loc_id,
                None,
                &mut self.cache,
            )
        })
        .collect();
        self.last_restricted = all_locations
            .into_iter()
            .filter(|loc_id| !available.contains(loc_id))
            .collect();

        let reached = available_access_points(
            world,
            self.settings,
            &global,
            self.ceiling,
            start,
            &mut self.cache,
        );
        if reached.iter().any(|r| r.is_none()) {
            return false;
        }
        !self
            .last_restricted
            .iter()
            .any(|&loc_id| world.locations[loc_id].pickup.is_some())
    }

    // Whether the game can be finished with the whole pool once the difficulty cap is lifted, as
    // the engine does when only boss fights are left.
    pub fn check_completable(&mut self) -> bool {
        let ceiling = self.ceiling;
        self.ceiling = f32::INFINITY;
        let ok = self.check_pool(None);
        self.ceiling = ceiling;
        if !ok {
            return false;
        }
        let mut global = GlobalState::default();
        for item in apply_forbidden(self.base_pool, &self.forbidden) {
            global.collect(item);
        }
        global.defeat_all_bosses();
        end_game_difficulty(self.world, self.settings, &global, &mut self.cache).reachable
    }

    fn add_restricted(&mut self) {
        for &loc_id in &self.last_restricted {
            if !self.restricted.contains(&loc_id) {
                self.restricted.push(loc_id);
            }
        }
    }

    // Forbids the item if the pool stays completable without it.
    fn try_forbid(&mut self, item: Item) -> bool {
        if !self.check_pool(Some(item)) {
            debug!("super fun: keeping {:?}, removing it together with {:?} breaks the seed", item, self.forbidden);
            return false;
        }
        info!("super fun: removing {:?}", item);
        self.forbidden.push(item);
        self.add_restricted();
        true
    }

    // Removes a Gaussian-bounded random subset of the list (`None` entries are placeholders
    // that dampen the count). Returns the number of items removed.
    fn add_forbidden<R: Rng>(&mut self, removable: &mut Vec<Option<Item>>, rng: &mut R) -> usize {
        let n = rand_gauss_bounds(removable.len(), rng);
        let mut picked: Vec<Item> = vec![];
        for _ in 0..n {
            let idx = rng.gen_range(0..removable.len());
            if let Some(item) = removable.remove(idx) {
                picked.push(item);
            }
        }
        picked
            .into_iter()
            .filter(|&item| self.try_forbid(item))
            .count()
    }

    fn removable(&mut self, items: &[Item]) -> Vec<Item> {
        items
            .iter()
            .copied()
            .filter(|&item| self.base_pool.contains(&item) && self.check_pool(Some(item)))
            .collect()
    }

    fn forbid_suits<R: Rng>(&mut self, rng: &mut R) {
        let mut removable: Vec<Option<Item>> =
            self.removable(&SUITS).into_iter().map(Some).collect();
        if removable.is_empty() {
            self.messages.push("Could not remove any suit".to_string());
            return;
        }
        // At least one:
        if self.add_forbidden(&mut removable, rng) == 0 {
            while let Some(entry) = removable.pop() {
                if let Some(suit) = entry {
                    if self.try_forbid(suit) {
                        break;
                    }
                }
            }
        }
    }

    fn forbid_movement<R: Rng>(&mut self, rng: &mut R) {
        let removable = self.removable(&MOVEMENT_ITEMS);
        if removable.is_empty() {
            self.messages
                .push("Could not remove any movement item".to_string());
            return;
        }
        self.try_forbid(removable[0]);
        let mut rest: Vec<Option<Item>> = removable[1..].iter().copied().map(Some).collect();
        rest.push(None);
        self.add_forbidden(&mut rest, rng);
    }

    fn forbid_combat<R: Rng>(&mut self, rng: &mut R) {
        let mut removable = self.removable(&COMBAT_ITEMS);
        let mut placeholders = 2;
        if self.settings.restrictions.morph == MorphPlacement::Late {
            removable.retain(|&item| item != Item::ScrewAttack);
            placeholders -= 1;
        }
        if removable.is_empty() {
            self.messages
                .push("Could not remove any combat item".to_string());
            return;
        }
        let first = removable.remove(0);
        self.try_forbid(first);
        if removable.first() == Some(&Item::Plasma) {
            let plasma = removable.remove(0);
            self.try_forbid(plasma);
        }
        let mut rest: Vec<Option<Item>> = removable.into_iter().map(Some).collect();
        rest.extend(vec![None; placeholders]);
        self.add_forbidden(&mut rest, rng);
    }

    pub fn get_forbidden<R: Rng>(&mut self, rng: &mut R) {
        self.forbidden.clear();
        self.restricted.clear();
        self.messages.clear();
        let requested = &self.settings.super_fun;
        let (suits, movement, combat) = (
            requested.contains(&SuperFunCategory::Suits),
            requested.contains(&SuperFunCategory::Movement),
            requested.contains(&SuperFunCategory::Combat),
        );
        // Suits first, since they affect which movement items are needed.
        if suits {
            self.forbid_suits(rng);
        }
        if movement {
            self.forbid_movement(rng);
        }
        if combat {
            self.forbid_combat(rng);
        }
    }

    pub fn into_outcome(self) -> SuperFunOutcome {
        SuperFunOutcome {
            forbidden_items: self.forbidden,
            restricted_locations: self.restricted,
            messages: self.messages,
        }
    }
}
