use std::collections::VecDeque;

use hashbrown::HashMap;
use itemrando_game::{AccessPointId, Cost, Item, LinkIdx, LocationId, Requirement, World};
use itemrando_logic::{DifficultyValue, GlobalState, StateFingerprint};

use crate::settings::RandomizerSettings;

const MAX_CACHE_ENTRIES: usize = 1 << 20;

// Identifies a requirement tree stored in the world, for memoization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PredicateId {
    Link(LinkIdx),
    Location(LocationId),
    PostAvailable(LocationId),
    EndGame,
}

// Memoized requirement results. The key includes the full state fingerprint, so a change
// of inventory or boss state can never hit an entry computed for another state.
#[derive(Default)]
pub struct RequirementCache {
    entries: HashMap<(PredicateId, StateFingerprint), DifficultyValue>,
    pub hits: usize,
    pub misses: usize,
}

impl RequirementCache {
    pub fn eval(
        &mut self,
        id: PredicateId,
        req: &Requirement,
        global: &GlobalState,
        settings: &RandomizerSettings,
    ) -> DifficultyValue {
        let key = (id, global.fingerprint());
        if let Some(&v) = self.entries.get(&key) {
            self.hits += 1;
            return v;
        }
        self.misses += 1;
        if self.entries.len() >= MAX_CACHE_ENTRIES {
            self.entries.clear();
        }
        let v = eval_requirement(req, global, settings);
        self.entries.insert(key, v);
        v
    }
}

pub fn eval_requirement(
    req: &Requirement,
    global: &GlobalState,
    settings: &RandomizerSettings,
) -> DifficultyValue {
    match req {
        Requirement::Free => DifficultyValue::FREE,
        Requirement::Never => DifficultyValue::UNREACHABLE,
        Requirement::Item(item) => DifficultyValue::from_bool(global.inventory.has(*item)),
        Requirement::ItemCount(item, count) => {
            DifficultyValue::from_bool(global.inventory.count(*item) >= *count)
        }
        Requirement::EnergyReserveCount(count) => {
            DifficultyValue::from_bool(global.inventory.energy_reserve_count() >= *count)
        }
        Requirement::Tech(skill) => match settings.skill_cost(skill) {
            Some(cost) => DifficultyValue::at_cost(cost),
            None => DifficultyValue::UNREACHABLE,
        },
        Requirement::Flag(flag) => DifficultyValue::from_bool(settings.has_flag(flag)),
        Requirement::BossDefeated(boss) => {
            DifficultyValue::from_bool(global.is_boss_defeated(*boss))
        }
        Requirement::Difficulty(cost) => DifficultyValue::at_cost(*cost),
        Requirement::And(reqs) => {
            DifficultyValue::and_all(reqs.iter().map(|r| eval_requirement(r, global, settings)))
        }
        Requirement::Or(reqs) => {
            DifficultyValue::or_all(reqs.iter().map(|r| eval_requirement(r, global, settings)))
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AvailableLocation {
    pub location_id: LocationId,
    pub difficulty: DifficultyValue,
}

// Forward search over the access-point graph. Each reachable access point is tagged with
// the bottleneck difficulty of the path that first discovered it; cheaper paths found
// later are not tracked.
pub fn available_access_points(
    world: &World,
    settings: &RandomizerSettings,
    global: &GlobalState,
    ceiling: Cost,
    start_ap: AccessPointId,
    cache: &mut RequirementCache,
) -> Vec<Option<DifficultyValue>> {
    let mut reached: Vec<Option<DifficultyValue>> = vec![None; world.access_points.len()];
    let mut queue: VecDeque<AccessPointId> = VecDeque::new();
    reached[start_ap] = Some(DifficultyValue::FREE);
    queue.push_back(start_ap);
    while let Some(src) = queue.pop_front() {
        let src_difficulty = reached[src].unwrap_or(DifficultyValue::FREE);
        for &link_idx in &world.links_by_src[src] {
            let link = &world.links[link_idx];
            if reached[link.to_ap_id].is_some() {
                continue;
            }
            let d = cache.eval(
                PredicateId::Link(link_idx),
                &link.requirement,
                global,
                settings,
            );
            if d.within(ceiling) {
                reached[link.to_ap_id] = Some(src_difficulty.and(d));
                queue.push_back(link.to_ap_id);
            }
        }
    }
    reached
}

// Locations (among `locations`) that can be reached from `start_ap`, sorted by name.
pub fn available_locations(
    world: &World,
    settings: &RandomizerSettings,
    global: &GlobalState,
    ceiling: Cost,
    start_ap: AccessPointId,
    locations: &[LocationId],
    cache: &mut RequirementCache,
) -> Vec<AvailableLocation> {
    let reached = available_access_points(world, settings, global, ceiling, start_ap, cache);
    let mut out: Vec<AvailableLocation> = vec![];
    for &loc_id in locations {
        let loc = &world.locations[loc_id];
        let ap_difficulty = match reached[loc.access_point] {
            Some(d) => d,
            None => continue,
        };
        let loc_difficulty = cache.eval(
            PredicateId::Location(loc_id),
            &loc.available,
            global,
            settings,
        );
        if loc_difficulty.within(ceiling) {
            out.push(AvailableLocation {
                location_id: loc_id,
                difficulty: ap_difficulty.and(loc_difficulty),
            });
        }
    }
    out.sort_by(|a, b| {
        world.locations[a.location_id]
            .name
            .cmp(&world.locations[b.location_id].name)
    });
    out
}

// Difficulty of the extra gate a location may put on leaving it with its item.
pub fn post_available_difficulty(
    world: &World,
    settings: &RandomizerSettings,
    global: &GlobalState,
    loc_id: LocationId,
    cache: &mut RequirementCache,
) -> DifficultyValue {
    match &world.locations[loc_id].post_available {
        Some(req) => cache.eval(PredicateId::PostAvailable(loc_id), req, global, settings),
        None => DifficultyValue::FREE,
    }
}

pub fn is_post_available(
    world: &World,
    settings: &RandomizerSettings,
    global: &GlobalState,
    ceiling: Cost,
    loc_id: LocationId,
    extra_item: Option<Item>,
    cache: &mut RequirementCache,
) -> bool {
    if world.locations[loc_id].post_available.is_none() {
        return true;
    }
    match extra_item {
        Some(item) => {
            let mut with_item = global.clone();
            with_item.collect(item);
            post_available_difficulty(world, settings, &with_item, loc_id, cache).within(ceiling)
        }
        None => post_available_difficulty(world, settings, global, loc_id, cache).within(ceiling),
    }
}

pub fn can_access(
    world: &World,
    settings: &RandomizerSettings,
    global: &GlobalState,
    from_ap: AccessPointId,
    to_ap: AccessPointId,
    ceiling: Cost,
    extra_item: Option<Item>,
    cache: &mut RequirementCache,
) -> bool {
    let reached = match extra_item {
        Some(item) => {
            let mut with_item = global.clone();
            with_item.collect(item);
            available_access_points(world, settings, &with_item, ceiling, from_ap, cache)
        }
        None => available_access_points(world, settings, global, ceiling, from_ap, cache),
    };
    reached[to_ap].is_some()
}

pub fn end_game_difficulty(
    world: &World,
    settings: &RandomizerSettings,
    global: &GlobalState,
    cache: &mut RequirementCache,
) -> DifficultyValue {
    cache.eval(PredicateId::EndGame, &world.end_game, global, settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::parse_randomizer_settings;
    use itemrando_game::{Boss, WorldData};

    fn test_world() -> World {
        let data: WorldData = serde_json::from_str(
            r#"{
                "name": "traverse test",
                "start_access_point": "A",
                "access_points": [
                    {"name": "A", "graph_area": "Crateria", "links": [
                        {"to": "B", "requirement": {"Item": "Morph"}},
                        {"to": "C", "requirement": {"Or": [
                            {"Item": "SpaceJump"},
                            {"Tech": "wall_jump"}
                        ]}}
                    ]},
                    {"name": "B", "graph_area": "GreenPinkBrinstar", "links": [
                        {"to": "C", "requirement": {"Difficulty": 10.0}}
                    ]},
                    {"name": "C", "graph_area": "Norfair", "links": [
                        {"to": "A", "requirement": {"BossDefeated": "Kraid"}}
                    ]}
                ],
                "locations": [
                    {"name": "Zeta", "class": "Minor", "area": "Crateria", "access_point": "A"},
                    {"name": "Alpha", "class": "Major", "area": "Crateria", "access_point": "A",
                     "available": {"ItemCount": ["Missile", 2]}},
                    {"name": "Beta", "class": "Major", "area": "Brinstar", "access_point": "B"},
                    {"name": "Gamma", "class": "Minor", "area": "Norfair", "access_point": "C",
                     "post_available": {"Item": "HiJump"}}
                ]
            }"#,
        )
        .unwrap();
        World::new(&data).unwrap()
    }

    fn test_settings() -> RandomizerSettings {
        parse_randomizer_settings(
            r#"{"progression_speed": "medium", "progression_difficulty": "normal",
                "skills": {"wall_jump": 5.0}}"#,
        )
        .unwrap()
    }

    fn names(world: &World, locs: &[AvailableLocation]) -> Vec<String> {
        locs.iter()
            .map(|l| world.locations[l.location_id].name.clone())
            .collect()
    }

    #[test]
    fn test_eval_leaves() {
        let settings = test_settings();
        let mut global = GlobalState::default();
        let req = Requirement::make_and(vec![
            Requirement::Item(Item::Morph),
            Requirement::Tech("wall_jump".to_string()),
        ]);
        assert!(!eval_requirement(&req, &global, &settings).reachable);
        global.collect(Item::Morph);
        assert_eq!(
            eval_requirement(&req, &global, &settings),
            DifficultyValue::at_cost(5.0)
        );
        let unknown = Requirement::Tech("moonwalk".to_string());
        assert!(!eval_requirement(&unknown, &global, &settings).reachable);
        global.collect(Item::ETank);
        global.collect(Item::Reserve);
        assert!(eval_requirement(&Requirement::EnergyReserveCount(2), &global, &settings).reachable);
        assert!(!eval_requirement(&Requirement::Flag("f".to_string()), &global, &settings).reachable);
    }

    #[test]
    fn test_available_locations_sorted_and_gated() {
        let world = test_world();
        let settings = test_settings();
        let mut cache = RequirementCache::default();
        let all: Vec<LocationId> = (0..world.locations.len()).collect();
        let mut global = GlobalState::default();

        // The wall jump skill costs 5, above this ceiling:
        let locs = available_locations(&world, &settings, &global, 1.0, 0, &all, &mut cache);
        assert_eq!(names(&world, &locs), vec!["Zeta"]);

        let locs = available_locations(&world, &settings, &global, 5.0, 0, &all, &mut cache);
        assert_eq!(names(&world, &locs), vec!["Gamma", "Zeta"]);
        assert_eq!(locs[0].difficulty, DifficultyValue::at_cost(5.0));

        global.collect(Item::Morph);
        global.collect(Item::Missile);
        global.collect(Item::Missile);
        let locs = available_locations(&world, &settings, &global, 5.0, 0, &all, &mut cache);
        assert_eq!(names(&world, &locs), vec!["Alpha", "Beta", "Gamma", "Zeta"]);
    }

    #[test]
    fn test_reachability_is_monotone() {
        let world = test_world();
        let settings = test_settings();
        let mut cache = RequirementCache::default();
        let all: Vec<LocationId> = (0..world.locations.len()).collect();
        let global = GlobalState::default();
        let base = available_locations(&world, &settings, &global, 10.0, 0, &all, &mut cache);
        for item in Item::all() {
            let mut with_item = global.clone();
            with_item.collect(item);
            let more =
                available_locations(&world, &settings, &with_item, 10.0, 0, &all, &mut cache);
            for loc in &base {
                assert!(more.iter().any(|l| l.location_id == loc.location_id));
            }
        }
    }

    #[test]
    fn test_can_access_with_extra_item() {
        let world = test_world();
        let settings = test_settings();
        let mut cache = RequirementCache::default();
        let mut global = GlobalState::default();
        let (a, c) = (0, 2);
        assert!(!can_access(&world, &settings, &global, c, a, 10.0, None, &mut cache));
        global.defeat_boss(Boss::Kraid);
        assert!(can_access(&world, &settings, &global, c, a, 10.0, None, &mut cache));
        let b = world.access_point_id("B").unwrap();
        assert!(!can_access(&world, &settings, &global, a, b, 10.0, None, &mut cache));
        assert!(can_access(&world, &settings, &global, a, b, 10.0, Some(Item::Morph), &mut cache));
        // The extra item must not leak into the caller's state:
        assert!(!global.inventory.has(Item::Morph));
    }

    #[test]
    fn test_post_available() {
        let world = test_world();
        let settings = test_settings();
        let mut cache = RequirementCache::default();
        let global = GlobalState::default();
        let gamma = world.location_id("Gamma").unwrap();
        assert!(!is_post_available(&world, &settings, &global, 10.0, gamma, None, &mut cache));
        assert!(is_post_available(
            &world,
            &settings,
            &global,
            10.0,
            gamma,
            Some(Item::HiJump),
            &mut cache
        ));
    }

    #[test]
    fn test_cache_is_keyed_by_state() {
        let settings = test_settings();
        let mut cache = RequirementCache::default();
        let req = Requirement::Item(Item::Morph);
        let mut global = GlobalState::default();
        let id = PredicateId::Link(0);
        assert!(!cache.eval(id, &req, &global, &settings).reachable);
        global.collect(Item::Morph);
        assert!(cache.eval(id, &req, &global, &settings).reachable);
        assert_eq!(cache.misses, 2);
        assert!(cache.eval(id, &req, &global, &settings).reachable);
        assert_eq!(cache.hits, 1);
    }
}
