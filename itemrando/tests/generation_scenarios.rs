use std::path::Path;

use anyhow::{bail, Context, Result};
use itemrando::{
    randomize::{randomize_seed, seeded_rng, GenerationError, Randomization, Randomizer},
    settings::{parse_randomizer_settings, RandomizerSettings},
    traverse::{can_access, RequirementCache},
};
use itemrando_game::{Area, Item, World, SUBAREA_BLUE_BRINSTAR};
use itemrando_logic::GlobalState;

fn load_world(name: &str) -> Result<World> {
    let path = Path::new("tests/worlds").join(format!("{name}.json"));
    World::load(&path).with_context(|| format!("Unable to load test world {name}"))
}

fn load_settings(extra: &str) -> Result<RandomizerSettings> {
    parse_randomizer_settings(&format!(
        r#"{{"name": "test", "progression_speed": "medium", "progression_difficulty": "normal"{extra}}}"#
    ))
}

fn small_world_settings() -> Result<RandomizerSettings> {
    load_settings(
        r#", "item_pool": [
            {"item": "Morph", "count": 1},
            {"item": "Varia", "count": 1},
            {"item": "Gravity", "count": 1},
            {"item": "HiJump", "count": 1},
            {"item": "SpaceJump", "count": 1},
            {"item": "ETank", "count": 1},
            {"item": "Missile", "count": 2},
            {"item": "Super", "count": 1},
            {"item": "PowerBomb", "count": 1}
        ]"#,
    )
}

// Five majors for the five major locations, with every placement restriction on.
fn restricted_settings() -> Result<RandomizerSettings> {
    parse_randomizer_settings(
        r#"{"name": "restricted", "progression_speed": "slowest", "progression_difficulty": "normal",
            "restrictions": {"major_minor": true, "suits": true, "morph": "early", "spread_items": true},
            "item_pool": [
                {"item": "Morph", "count": 1},
                {"item": "Varia", "count": 1},
                {"item": "Gravity", "count": 1},
                {"item": "HiJump", "count": 1},
                {"item": "SpaceJump", "count": 1},
                {"item": "Missile", "count": 2},
                {"item": "Super", "count": 1},
                {"item": "PowerBomb", "count": 1}
            ]}"#,
    )
}

// Every location gets exactly one item and the items are exactly the (padded) pool.
fn check_bijection(world: &World, randomization: &Randomization, pool: &[Item]) -> Result<()> {
    let mut filled = vec![0; world.locations.len()];
    for p in &randomization.placements {
        filled[p.location] += 1;
    }
    if let Some(loc_id) = filled.iter().position(|&n| n != 1) {
        bail!(
            "location {} filled {} times",
            world.locations[loc_id].name,
            filled[loc_id]
        );
    }
    let mut placed: Vec<Item> = randomization.placements.iter().map(|p| p.item).collect();
    let mut expected = pool.to_vec();
    placed.sort();
    expected.sort();
    assert_eq!(placed, expected);
    Ok(())
}

fn padded_pool(settings: &RandomizerSettings, num_locations: usize) -> Vec<Item> {
    let mut pool: Vec<Item> = vec![];
    for x in &settings.item_pool {
        pool.extend(vec![x.item; x.count]);
    }
    pool.resize(num_locations, Item::Nothing);
    pool
}

#[test]
fn test_morph_opens_corridor() -> Result<()> {
    let world = load_world("corridor")?;
    let settings = load_settings(
        r#", "item_pool": [{"item": "Morph", "count": 1}, {"item": "Missile", "count": 1}]"#,
    )?;
    let first = randomize_seed(&world, &settings, 1)?;
    for seed in 1..10 {
        let randomization = randomize_seed(&world, &settings, seed)?;
        let placed: Vec<(Item, &str)> = randomization
            .placements
            .iter()
            .map(|p| (p.item, world.locations[p.location].name.as_str()))
            .collect();
        assert_eq!(placed, vec![(Item::Morph, "L1"), (Item::Missile, "L2")]);
        assert!(randomization.diagnostics.is_empty());
        check_bijection(&world, &randomization, &[Item::Morph, Item::Missile])?;
    }
    let again = randomize_seed(&world, &settings, 1)?;
    assert_eq!(first.placements, again.placements);
    Ok(())
}

#[test]
fn test_boss_fight_lifts_difficulty_cap() -> Result<()> {
    let world = load_world("boss_gate")?;
    let settings = load_settings(
        r#", "max_difficulty": 10.0, "item_pool": [{"item": "Missile", "count": 1}]"#,
    )?;
    let randomization = randomize_seed(&world, &settings, 0)?;
    assert!(randomization.relaxed_difficulty);
    assert!(!randomization.partial_completion);
    assert!(randomization
        .diagnostics
        .starts_with("Boss fights forced us to up the maximum difficulty."));
    assert!(randomization.diagnostics.contains("Ridley: very hard"));
    let boss = world.location_id("Ridley").context("no boss location")?;
    let boss_placement = randomization
        .placements
        .iter()
        .find(|p| p.location == boss)
        .context("boss location left empty")?;
    assert_eq!(boss_placement.difficulty.cost, 20.0);
    Ok(())
}

#[test]
fn test_required_suits_are_kept() -> Result<()> {
    let world = load_world("suit_lock")?;
    let settings = load_settings(
        r#", "super_fun": ["Suits"], "item_pool": [
            {"item": "Varia", "count": 1},
            {"item": "Gravity", "count": 1},
            {"item": "Missile", "count": 1}
        ]"#,
    )?;
    for seed in 0..5 {
        let randomization = randomize_seed(&world, &settings, seed)?;
        assert!(randomization.forbidden_items.is_empty());
        assert_eq!(
            randomization.diagnostics,
            "Super Fun: Could not remove any suit"
        );
        check_bijection(
            &world,
            &randomization,
            &[Item::Varia, Item::Gravity, Item::Missile],
        )?;
    }
    Ok(())
}

#[test]
fn test_zero_runtime_limit_runs_one_pass() -> Result<()> {
    let world = load_world("corridor")?;
    let settings = load_settings(
        r#", "runtime_limit_secs": 0.0,
            "item_pool": [{"item": "Morph", "count": 1}, {"item": "Missile", "count": 1}]"#,
    )?;
    for seed in 0..5 {
        let randomization = randomize_seed(&world, &settings, seed)?;
        assert!(randomization.placements.iter().any(|p| p.collected));
        check_bijection(&world, &randomization, &[Item::Morph, Item::Missile])?;
        if randomization.partial_completion {
            assert!(randomization
                .diagnostics
                .contains("items were placed randomly"));
        }
    }
    Ok(())
}

#[test]
fn test_unreachable_goal_is_a_configuration_error() -> Result<()> {
    let world = load_world("suit_lock")?;
    let settings = load_settings(r#", "item_pool": [{"item": "Varia", "count": 1}]"#)?;
    let mut rng = seeded_rng(0);
    match Randomizer::new(&world, &settings, &mut rng) {
        Err(GenerationError::Configuration(_)) => Ok(()),
        Err(e) => bail!("unexpected error: {e}"),
        Ok(_) => bail!("expected a configuration error"),
    }
}

#[test]
fn test_small_world_bijection_and_determinism() -> Result<()> {
    let world = load_world("small_world")?;
    let settings = small_world_settings()?;
    let pool = padded_pool(&settings, world.locations.len());
    for seed in 0..10 {
        let first = randomize_seed(&world, &settings, seed)
            .with_context(|| format!("seed {seed} failed"))?;
        let second = randomize_seed(&world, &settings, seed)?;
        assert_eq!(first.placements, second.placements);
        assert_eq!(first.rollback_count, second.rollback_count);
        check_bijection(&world, &first, &pool)?;
    }
    Ok(())
}

#[test]
fn test_restricted_small_world() -> Result<()> {
    let world = load_world("small_world")?;
    let settings = restricted_settings()?;
    let pool = padded_pool(&settings, world.locations.len());
    let mut rollbacks = 0;
    for seed in 0..20 {
        let randomization = randomize_seed(&world, &settings, seed)
            .with_context(|| format!("seed {seed} failed"))?;
        check_bijection(&world, &randomization, &pool)?;
        rollbacks += randomization.rollback_count;
        for p in randomization.placements.iter().filter(|p| p.collected) {
            let loc = &world.locations[p.location];
            assert_eq!(loc.class, p.item.class(), "{:?} at {}", p.item, loc.name);
            match p.item {
                Item::Gravity => assert!(loc.area != Area::Crateria && loc.area != Area::Brinstar),
                Item::Varia => assert!(
                    loc.area != Area::Crateria && !loc.is_in_subarea(SUBAREA_BLUE_BRINSTAR)
                ),
                _ => {}
            }
        }
        // The only path: Morph, then HiJump, then Gravity.
        let item_at = |name: &str| -> Result<Item> {
            let loc_id = world.location_id(name).context("unknown location")?;
            let p = randomization
                .placements
                .iter()
                .find(|p| p.location == loc_id)
                .context("empty location")?;
            Ok(p.item)
        };
        assert_eq!(item_at("Landing Major")?, Item::Morph);
        assert_eq!(item_at("Brinstar Major")?, Item::HiJump);
        assert_eq!(item_at("Norfair Major")?, Item::Gravity);
    }
    // Space Jump opens the fewest locations after Morph, so the slowest profile walks into
    // dead ends that only a rollback gets out of.
    assert!(rollbacks > 0);
    Ok(())
}

#[test]
fn test_no_soft_locks() -> Result<()> {
    let world = load_world("small_world")?;
    let settings = small_world_settings()?;
    let pit = world.location_id("Pit Bottom").context("no pit location")?;
    let mut cache = RequirementCache::default();
    for seed in 0..10 {
        let randomization = randomize_seed(&world, &settings, seed)?;
        let mut global = GlobalState::default();
        for p in randomization.placements.iter().filter(|p| p.collected) {
            // Nothing but Space Jump gets out of the pit.
            if p.location == pit {
                assert!(p.item == Item::SpaceJump || global.inventory.has(Item::SpaceJump));
            }
            if p.resolves_soft_lock {
                let loc_ap = world.locations[p.location].access_point;
                let ceiling = settings.difficulty_ceiling();
                assert!(!can_access(
                    &world, &settings, &global, loc_ap, p.return_ap, ceiling, None, &mut cache
                ));
                assert!(can_access(
                    &world,
                    &settings,
                    &global,
                    loc_ap,
                    p.return_ap,
                    ceiling,
                    Some(p.item),
                    &mut cache
                ));
            }
            global.collect(p.item);
        }
    }
    Ok(())
}
