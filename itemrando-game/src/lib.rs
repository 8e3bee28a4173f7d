// The changes suggested by this lint usually make the code more cluttered and less clear:
#![allow(clippy::needless_range_loop)]

use anyhow::{bail, ensure, Context, Result};
use hashbrown::HashMap;
use log::info;
use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};
use std::borrow::ToOwned;
use std::hash::Hash;
use std::path::Path;
use strum_macros::{EnumString, VariantNames};

pub type Cost = f32; // Difficulty of a traversal; larger is harder
pub type AccessPointId = usize; // Index into World.access_point_isv.keys
pub type LocationId = usize; // Index into World.locations
pub type LinkIdx = usize; // Index into World.links
pub type SkillName = String; // Name of a technique the player may be assumed to know

pub const SUBAREA_BLUE_BRINSTAR: &str = "BlueBrinstar";

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    VariantNames,
    TryFromPrimitive,
    Serialize,
    Deserialize,
    PartialOrd,
    Ord,
)]
#[repr(usize)]
// Note: the ordering of these items is significant; it is used to index inventories.
pub enum Item {
    ETank,        // 0
    Missile,      // 1
    Super,        // 2
    PowerBomb,    // 3
    Bomb,         // 4
    Charge,       // 5
    Ice,          // 6
    HiJump,       // 7
    SpeedBooster, // 8
    Wave,         // 9
    Spazer,       // 10
    SpringBall,   // 11
    Varia,        // 12
    Gravity,      // 13
    XRayScope,    // 14
    Plasma,       // 15
    Grapple,      // 16
    SpaceJump,    // 17
    ScrewAttack,  // 18
    Morph,        // 19
    Reserve,      // 20
    Nothing,      // 21
    NoEnergy,     // 22
}

pub const NUM_ITEMS: usize = 23;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemCategory {
    Progression,
    Beam,
    Misc,
    Ammo,
    Energy,
    Junk,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemClass {
    Major,
    Minor,
}

impl Item {
    pub fn category(self) -> ItemCategory {
        use Item::*;
        match self {
            Bomb | Ice | HiJump | SpeedBooster | Varia | Gravity | Grapple | SpaceJump | Morph => {
                ItemCategory::Progression
            }
            Charge | Wave | Spazer | Plasma => ItemCategory::Beam,
            SpringBall | XRayScope | ScrewAttack => ItemCategory::Misc,
            Missile | Super | PowerBomb => ItemCategory::Ammo,
            ETank | Reserve => ItemCategory::Energy,
            Nothing | NoEnergy => ItemCategory::Junk,
        }
    }

    pub fn class(self) -> ItemClass {
        match self {
            Item::Missile | Item::Super | Item::PowerBomb | Item::Nothing => ItemClass::Minor,
            _ => ItemClass::Major,
        }
    }

    pub fn is_junk(self) -> bool {
        self.category() == ItemCategory::Junk
    }

    pub fn is_unique(self) -> bool {
        ![
            Item::Missile,
            Item::Super,
            Item::PowerBomb,
            Item::ETank,
            Item::Reserve,
            Item::Nothing,
            Item::NoEnergy,
        ]
        .contains(&self)
    }

    pub fn all() -> impl Iterator<Item = Item> {
        (0..NUM_ITEMS).filter_map(|i| Item::try_from(i).ok())
    }
}

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    VariantNames,
    Serialize,
    Deserialize,
    PartialOrd,
    Ord,
)]
pub enum Area {
    Crateria,
    Brinstar,
    Norfair,
    WreckedShip,
    Maridia,
    LowerNorfair,
    Tourian,
}

// Finer-grained areas used by the traversal graph (an area can span several of them).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum GraphArea {
    Crateria,
    GreenPinkBrinstar,
    RedBrinstar,
    Kraid,
    WreckedShip,
    Norfair,
    Crocomire,
    LowerNorfair,
    WestMaridia,
    EastMaridia,
    Tourian,
}

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    VariantNames,
    TryFromPrimitive,
    Serialize,
    Deserialize,
    PartialOrd,
    Ord,
)]
#[repr(usize)]
pub enum Boss {
    Kraid,
    Phantoon,
    Draygon,
    Ridley,
}

pub const NUM_BOSSES: usize = 4;

impl Boss {
    pub fn all() -> [Boss; NUM_BOSSES] {
        [Boss::Kraid, Boss::Phantoon, Boss::Draygon, Boss::Ridley]
    }
}

// Guard expressions attached to links, locations and the end-game condition.
// Evaluation happens in the randomizer crate, against an explicit inventory snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Requirement {
    Free,
    Never,
    Item(Item),
    ItemCount(Item, usize),
    EnergyReserveCount(usize),
    Tech(SkillName),
    Flag(String),
    BossDefeated(Boss),
    Difficulty(Cost),
    And(Vec<Requirement>),
    Or(Vec<Requirement>),
}

impl Requirement {
    pub fn make_and(reqs: Vec<Requirement>) -> Requirement {
        let mut out_reqs: Vec<Requirement> = vec![];
        for req in reqs {
            if let Requirement::Never = req {
                return Requirement::Never;
            } else if let Requirement::Free = req {
                continue;
            } else if let Requirement::And(and_reqs) = req {
                out_reqs.extend(and_reqs);
            } else {
                out_reqs.push(req);
            }
        }
        if out_reqs.is_empty() {
            Requirement::Free
        } else if out_reqs.len() == 1 {
            out_reqs.into_iter().next().unwrap_or(Requirement::Free)
        } else {
            Requirement::And(out_reqs)
        }
    }

    pub fn make_or(reqs: Vec<Requirement>) -> Requirement {
        let mut out_reqs: Vec<Requirement> = vec![];
        for req in reqs {
            if let Requirement::Never = req {
                continue;
            } else if let Requirement::Free = req {
                return Requirement::Free;
            } else if let Requirement::Or(or_reqs) = req {
                out_reqs.extend(or_reqs);
            } else {
                out_reqs.push(req);
            }
        }
        if out_reqs.is_empty() {
            Requirement::Never
        } else if out_reqs.len() == 1 {
            out_reqs.into_iter().next().unwrap_or(Requirement::Never)
        } else {
            Requirement::Or(out_reqs)
        }
    }

    pub fn can_use_power_bombs() -> Requirement {
        Requirement::make_and(vec![
            Requirement::Item(Item::Morph),
            Requirement::Item(Item::PowerBomb),
        ])
    }

    pub fn can_use_bombs() -> Requirement {
        Requirement::make_and(vec![
            Requirement::Item(Item::Morph),
            Requirement::Item(Item::Bomb),
        ])
    }

    pub fn can_open_red_doors() -> Requirement {
        Requirement::make_or(vec![
            Requirement::Item(Item::Missile),
            Requirement::Item(Item::Super),
        ])
    }

    pub fn all_bosses_defeated() -> Requirement {
        Requirement::make_and(
            Boss::all()
                .into_iter()
                .map(Requirement::BossDefeated)
                .collect(),
        )
    }
}

fn default_requirement() -> Requirement {
    Requirement::Free
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkData {
    pub to: String,
    #[serde(default = "default_requirement")]
    pub requirement: Requirement,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessPointData {
    pub name: String,
    pub graph_area: GraphArea,
    #[serde(default)]
    pub links: Vec<LinkData>,
}

// Door connection between two access points of different areas. The set of transitions
// is what area randomization shuffles, so it is kept apart from the intra-area links.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransitionData {
    pub from: String,
    pub to: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocationData {
    pub name: String,
    pub class: ItemClass,
    pub area: Area,
    #[serde(default)]
    pub subarea: Option<String>,
    pub access_point: String,
    #[serde(default = "default_requirement")]
    pub available: Requirement,
    #[serde(default)]
    pub post_available: Option<Requirement>,
    #[serde(default)]
    pub pickup: Option<Boss>,
    #[serde(default)]
    pub softlock_exempt: bool,
}

// World definition as stored on disk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldData {
    pub name: String,
    pub start_access_point: String,
    pub access_points: Vec<AccessPointData>,
    #[serde(default)]
    pub transitions: Vec<TransitionData>,
    #[serde(default = "default_true")]
    pub bidirectional_transitions: bool,
    pub locations: Vec<LocationData>,
    #[serde(default = "Requirement::all_bosses_defeated")]
    pub end_game: Requirement,
}

impl WorldData {
    pub fn load(path: &Path) -> Result<WorldData> {
        let world_str = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read world file at {}", path.display()))?;
        let world_data: WorldData = serde_json::from_str(&world_str)
            .with_context(|| format!("unable to parse world file at {}", path.display()))?;
        Ok(world_data)
    }
}

#[derive(Default, Clone, Debug)]
pub struct IndexedVec<T: Hash + Eq> {
    pub keys: Vec<T>,
    pub index_by_key: HashMap<T, usize>,
}

impl<T: Hash + Eq> IndexedVec<T> {
    pub fn add<U: ToOwned<Owned = T> + ?Sized>(&mut self, name: &U) -> usize {
        if !self.index_by_key.contains_key(&name.to_owned()) {
            let idx = self.keys.len();
            self.index_by_key.insert(name.to_owned(), self.keys.len());
            self.keys.push(name.to_owned());
            idx
        } else {
            self.index_by_key[&name.to_owned()]
        }
    }
}

#[derive(Clone, Debug)]
pub struct Link {
    pub from_ap_id: AccessPointId,
    pub to_ap_id: AccessPointId,
    pub requirement: Requirement,
}

#[derive(Clone, Debug)]
pub struct AccessPoint {
    pub name: String,
    pub graph_area: GraphArea,
}

#[derive(Clone, Debug)]
pub struct Location {
    pub name: String,
    pub class: ItemClass,
    pub area: Area,
    pub subarea: Option<String>,
    pub graph_area: GraphArea,
    pub access_point: AccessPointId,
    pub available: Requirement,
    pub post_available: Option<Requirement>,
    pub pickup: Option<Boss>,
    pub softlock_exempt: bool,
}

impl Location {
    pub fn is_in_subarea(&self, subarea: &str) -> bool {
        self.subarea.as_deref() == Some(subarea)
    }
}

// Read-only traversal graph and location table, indexed for the randomizer.
#[derive(Clone, Debug)]
pub struct World {
    pub name: String,
    pub access_point_isv: IndexedVec<String>,
    pub access_points: Vec<AccessPoint>,
    pub links: Vec<Link>,
    pub links_by_src: Vec<Vec<LinkIdx>>,
    pub locations: Vec<Location>,
    pub start_access_point: AccessPointId,
    pub end_game: Requirement,
}

impl World {
    pub fn load(path: &Path) -> Result<World> {
        let world_data = WorldData::load(path)?;
        World::new(&world_data)
            .with_context(|| format!("invalid world definition in {}", path.display()))
    }

    pub fn new(data: &WorldData) -> Result<World> {
        let mut access_point_isv: IndexedVec<String> = IndexedVec::default();
        let mut access_points: Vec<AccessPoint> = vec![];
        for ap in &data.access_points {
            ensure!(
                !access_point_isv.index_by_key.contains_key(&ap.name),
                "duplicate access point {}",
                ap.name
            );
            access_point_isv.add(&ap.name);
            access_points.push(AccessPoint {
                name: ap.name.clone(),
                graph_area: ap.graph_area,
            });
        }
        let get_ap_id = |name: &str| -> Result<AccessPointId> {
            match access_point_isv.index_by_key.get(name) {
                Some(&id) => Ok(id),
                None => bail!("unknown access point {}", name),
            }
        };

        let mut links: Vec<Link> = vec![];
        for ap in &data.access_points {
            let from_ap_id = get_ap_id(&ap.name)?;
            for link in &ap.links {
                links.push(Link {
                    from_ap_id,
                    to_ap_id: get_ap_id(&link.to)?,
                    requirement: link.requirement.clone(),
                });
            }
        }
        for transition in &data.transitions {
            let from_ap_id = get_ap_id(&transition.from)?;
            let to_ap_id = get_ap_id(&transition.to)?;
            links.push(Link {
                from_ap_id,
                to_ap_id,
                requirement: Requirement::Free,
            });
            if data.bidirectional_transitions {
                links.push(Link {
                    from_ap_id: to_ap_id,
                    to_ap_id: from_ap_id,
                    requirement: Requirement::Free,
                });
            }
        }
        let mut links_by_src: Vec<Vec<LinkIdx>> = vec![vec![]; access_points.len()];
        for (idx, link) in links.iter().enumerate() {
            links_by_src[link.from_ap_id].push(idx);
        }

        let mut location_names: IndexedVec<String> = IndexedVec::default();
        let mut locations: Vec<Location> = vec![];
        for loc in &data.locations {
            ensure!(
                !location_names.index_by_key.contains_key(&loc.name),
                "duplicate location {}",
                loc.name
            );
            location_names.add(&loc.name);
            let access_point = get_ap_id(&loc.access_point)
                .with_context(|| format!("location {}", loc.name))?;
            locations.push(Location {
                name: loc.name.clone(),
                class: loc.class,
                area: loc.area,
                subarea: loc.subarea.clone(),
                graph_area: access_points[access_point].graph_area,
                access_point,
                available: loc.available.clone(),
                post_available: loc.post_available.clone(),
                pickup: loc.pickup,
                softlock_exempt: loc.softlock_exempt,
            });
        }

        let start_access_point = get_ap_id(&data.start_access_point)?;
        info!(
            "World {}: {} access points, {} links, {} locations",
            data.name,
            access_points.len(),
            links.len(),
            locations.len()
        );
        Ok(World {
            name: data.name.clone(),
            access_point_isv,
            access_points,
            links,
            links_by_src,
            locations,
            start_access_point,
            end_game: data.end_game.clone(),
        })
    }

    pub fn access_point_id(&self, name: &str) -> Option<AccessPointId> {
        self.access_point_isv.index_by_key.get(name).copied()
    }

    pub fn location_id(&self, name: &str) -> Option<LocationId> {
        self.locations.iter().position(|loc| loc.name == name)
    }

    pub fn count_locations(&self, class: ItemClass) -> usize {
        self.locations.iter().filter(|loc| loc.class == class).count()
    }
}
