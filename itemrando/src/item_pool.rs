use itemrando_game::{Item, ItemClass, World};
use log::debug;
use rand::Rng;

use crate::randomize::GenerationError;
use crate::settings::{EnergyQuantity, RandomizerSettings};

// One of each of these goes into every generated pool.
pub const UNIQUE_MAJORS: [Item; 16] = [
    Item::Morph,
    Item::Bomb,
    Item::Charge,
    Item::Ice,
    Item::HiJump,
    Item::SpeedBooster,
    Item::Wave,
    Item::Spazer,
    Item::SpringBall,
    Item::Varia,
    Item::Gravity,
    Item::XRayScope,
    Item::Plasma,
    Item::Grapple,
    Item::SpaceJump,
    Item::ScrewAttack,
];

fn energy_items<R: Rng>(energy: EnergyQuantity, rng: &mut R) -> Vec<Item> {
    let (etanks, reserves) = match energy {
        EnergyQuantity::Vanilla => (14, 4),
        EnergyQuantity::Medium => (rng.gen_range(8..=12), 2),
        EnergyQuantity::Sparse => (rng.gen_range(4..=6), 0),
    };
    let mut out = vec![Item::ETank; etanks];
    out.extend(vec![Item::Reserve; reserves]);
    out
}

// Splits `total` ammo packs by the configured ratios; power bombs take the rounding slack.
fn ammo_items(total: usize, settings: &RandomizerSettings) -> Vec<Item> {
    let ratios = &settings.quantities.ammo;
    let sum = ratios.missile + ratios.super_missile + ratios.power_bomb;
    if total == 0 || sum <= 0.0 {
        return vec![];
    }
    let missiles = ((total as f32) * ratios.missile / sum).round() as usize;
    let supers = usize::min(
        ((total as f32) * ratios.super_missile / sum).round() as usize,
        total - usize::min(missiles, total),
    );
    let missiles = usize::min(missiles, total);
    let power_bombs = total - missiles - supers;
    let mut out = vec![Item::Missile; missiles];
    out.extend(vec![Item::Super; supers]);
    out.extend(vec![Item::PowerBomb; power_bombs]);
    out
}

// Pads a pool with junk so that it fills every location, respecting major/minor
// segregation when enabled.
fn pad_pool(
    mut pool: Vec<Item>,
    world: &World,
    settings: &RandomizerSettings,
) -> Result<Vec<Item>, GenerationError> {
    let num_locations = world.locations.len();
    if pool.len() > num_locations {
        return Err(GenerationError::Configuration(format!(
            "item pool has {} items but the world only has {} locations",
            pool.len(),
            num_locations
        )));
    }
    if settings.restrictions.major_minor {
        let num_major_locations = world.count_locations(ItemClass::Major);
        let num_minor_locations = num_locations - num_major_locations;
        let num_majors = pool.iter().filter(|i| i.class() == ItemClass::Major).count();
        let num_minors = pool.len() - num_majors;
        if num_majors > num_major_locations || num_minors > num_minor_locations {
            return Err(GenerationError::Configuration(format!(
                "item pool has {num_majors} major and {num_minors} minor items, but the world has \
                 {num_major_locations} major and {num_minor_locations} minor locations"
            )));
        }
        pool.extend(vec![Item::NoEnergy; num_major_locations - num_majors]);
    }
    pool.resize(num_locations, Item::Nothing);
    Ok(pool)
}

pub fn get_item_pool<R: Rng>(
    world: &World,
    settings: &RandomizerSettings,
    rng: &mut R,
) -> Result<Vec<Item>, GenerationError> {
    if !settings.item_pool.is_empty() {
        let mut pool: Vec<Item> = vec![];
        for x in &settings.item_pool {
            pool.extend(vec![x.item; x.count]);
        }
        return pad_pool(pool, world, settings);
    }

    let num_locations = world.locations.len();
    let major_slots = if settings.restrictions.major_minor {
        world.count_locations(ItemClass::Major)
    } else {
        num_locations
    };
    let mut pool: Vec<Item> = UNIQUE_MAJORS.to_vec();
    if pool.len() > major_slots {
        return Err(GenerationError::Configuration(format!(
            "{} unique items do not fit in {} locations",
            pool.len(),
            major_slots
        )));
    }
    let mut energy = energy_items(settings.quantities.energy, rng);
    energy.truncate(major_slots - pool.len());
    pool.extend(energy);

    let minor_slots = if settings.restrictions.major_minor {
        num_locations - major_slots
    } else {
        num_locations - pool.len()
    };
    let minors_fraction = settings.quantities.minors.clamp(0.0, 100.0) / 100.0;
    let num_ammo = ((minor_slots as f32) * minors_fraction).round() as usize;
    pool.extend(ammo_items(usize::min(num_ammo, minor_slots), settings));
    debug!("generated item pool: {:?}", pool);
    pad_pool(pool, world, settings)
}

// Replaces each forbidden item by a major junk item, keeping the pool size unchanged.
pub fn apply_forbidden(pool: &[Item], forbidden: &[Item]) -> Vec<Item> {
    pool.iter()
        .map(|&item| {
            if forbidden.contains(&item) {
                Item::NoEnergy
            } else {
                item
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{parse_randomizer_settings, ItemCount};
    use itemrando_game::{Area, LocationData, WorldData};
    use rand::SeedableRng;

    fn world_with_locations(num_major: usize, num_minor: usize) -> World {
        let mut data: WorldData = serde_json::from_str(
            r#"{"name": "pool test", "start_access_point": "A",
                "access_points": [{"name": "A", "graph_area": "Crateria"}],
                "locations": []}"#,
        )
        .unwrap();
        for i in 0..(num_major + num_minor) {
            data.locations.push(LocationData {
                name: format!("Location {i}"),
                class: if i < num_major {
                    ItemClass::Major
                } else {
                    ItemClass::Minor
                },
                area: Area::Crateria,
                subarea: None,
                access_point: "A".to_string(),
                available: itemrando_game::Requirement::Free,
                post_available: None,
                pickup: None,
                softlock_exempt: false,
            });
        }
        World::new(&data).unwrap()
    }

    fn settings(extra: &str) -> RandomizerSettings {
        parse_randomizer_settings(&format!(
            r#"{{"progression_speed": "medium", "progression_difficulty": "normal"{extra}}}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_vanilla_pool_fills_every_location() {
        let world = world_with_locations(34, 66);
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let s = settings(r#", "restrictions": {"major_minor": true}"#);
        let pool = get_item_pool(&world, &s, &mut rng).unwrap();
        assert_eq!(pool.len(), 100);
        let majors = pool.iter().filter(|i| i.class() == ItemClass::Major).count();
        assert_eq!(majors, 34);
        assert_eq!(pool.iter().filter(|&&i| i == Item::ETank).count(), 14);
        assert_eq!(pool.iter().filter(|&&i| i == Item::Nothing).count(), 0);
    }

    #[test]
    fn test_sparse_minors() {
        let world = world_with_locations(30, 70);
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let s = settings(r#", "quantities": {"energy": "sparse", "minors": 50}"#);
        let pool = get_item_pool(&world, &s, &mut rng).unwrap();
        assert_eq!(pool.len(), 100);
        let etanks = pool.iter().filter(|&&i| i == Item::ETank).count();
        assert!((4..=6).contains(&etanks));
        let ammo = pool.iter().filter(|i| i.class() == ItemClass::Minor && !i.is_junk()).count();
        let minor_slots = 100 - 16 - etanks;
        assert_eq!(ammo, ((minor_slots as f32) * 0.5).round() as usize);
    }

    #[test]
    fn test_explicit_pool() {
        let world = world_with_locations(1, 2);
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let mut s = settings("");
        s.item_pool = vec![ItemCount {
            item: Item::Morph,
            count: 1,
        }];
        let pool = get_item_pool(&world, &s, &mut rng).unwrap();
        assert_eq!(pool, vec![Item::Morph, Item::Nothing, Item::Nothing]);

        s.item_pool[0].count = 4;
        assert!(matches!(
            get_item_pool(&world, &s, &mut rng),
            Err(GenerationError::Configuration(_))
        ));
    }

    #[test]
    fn test_apply_forbidden() {
        let pool = vec![Item::Varia, Item::Missile, Item::Gravity];
        assert_eq!(
            apply_forbidden(&pool, &[Item::Gravity]),
            vec![Item::Varia, Item::Missile, Item::NoEnergy]
        );
    }
}
