use std::time::Duration;

use anyhow::{Context, Result};
use hashbrown::HashMap;
use itemrando_game::{Cost, Item, ItemCategory};
use serde::{Deserialize, Serialize};
use strum_macros::{EnumString, VariantNames};

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct RandomizerSettings {
    #[serde(default)]
    pub name: Option<String>,
    // None means uncapped.
    #[serde(default)]
    pub max_difficulty: Option<Cost>,
    pub progression_speed: ProgressionSpeed,
    pub progression_difficulty: ProgressionDifficulty,
    #[serde(default)]
    pub quantities: QuantitySettings,
    #[serde(default)]
    pub restrictions: RestrictionSettings,
    #[serde(default)]
    pub super_fun: Vec<SuperFunCategory>,
    // None means unlimited.
    #[serde(default)]
    pub runtime_limit_secs: Option<f32>,
    #[serde(default)]
    pub skills: HashMap<String, Cost>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub item_pool: Vec<ItemCount>,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct ItemCount {
    pub item: Item,
    pub count: usize,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct AmmoRatios {
    pub missile: f32,
    pub super_missile: f32,
    pub power_bomb: f32,
}

impl Default for AmmoRatios {
    fn default() -> Self {
        AmmoRatios {
            missile: 2.0,
            super_missile: 1.0,
            power_bomb: 1.0,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct QuantitySettings {
    #[serde(default)]
    pub ammo: AmmoRatios,
    #[serde(default)]
    pub energy: EnergyQuantity,
    // Percentage of the minor locations that receive ammo (100 = vanilla).
    #[serde(default = "default_minors")]
    pub minors: f32,
}

fn default_minors() -> f32 {
    100.0
}

impl Default for QuantitySettings {
    fn default() -> Self {
        QuantitySettings {
            ammo: AmmoRatios::default(),
            energy: EnergyQuantity::default(),
            minors: default_minors(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnergyQuantity {
    Sparse,
    Medium,
    #[default]
    Vanilla,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct RestrictionSettings {
    #[serde(default)]
    pub major_minor: bool,
    #[serde(default)]
    pub suits: bool,
    #[serde(default)]
    pub morph: MorphPlacement,
    #[serde(default)]
    pub spread_items: bool,
    // Locations in the early areas where Gravity may still be placed.
    #[serde(default = "default_suit_exceptions")]
    pub suit_exceptions: Vec<String>,
}

fn default_suit_exceptions() -> Vec<String> {
    vec!["X-Ray Scope".to_string(), "Energy Tank, Waterway".to_string()]
}

impl Default for RestrictionSettings {
    fn default() -> Self {
        RestrictionSettings {
            major_minor: false,
            suits: false,
            morph: MorphPlacement::default(),
            spread_items: false,
            suit_exceptions: default_suit_exceptions(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum MorphPlacement {
    Early,
    Late,
    #[default]
    Random,
}

#[derive(
    Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug, EnumString, VariantNames,
)]
pub enum SuperFunCategory {
    Movement,
    Combat,
    Suits,
}

#[derive(
    Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, EnumString, VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProgressionSpeed {
    Slowest,
    Slow,
    Medium,
    Fast,
    Fastest,
    Basic,
}

#[derive(
    Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, EnumString, VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProgressionDifficulty {
    Easier,
    Normal,
    Harder,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ItemChoice {
    Random,
    MinProgression,
    MaxProgression,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LocationChoice {
    Random,
    MinDifficulty,
    MaxDifficulty,
}

impl ProgressionSpeed {
    pub fn item_choice_weights(self) -> Vec<(ItemChoice, u32)> {
        let (min, random, max) = match self {
            ProgressionSpeed::Slowest => (1, 2, 0),
            ProgressionSpeed::Slow => (25, 75, 0),
            ProgressionSpeed::Medium | ProgressionSpeed::Basic => (0, 1, 0),
            ProgressionSpeed::Fast => (0, 75, 25),
            ProgressionSpeed::Fastest => (0, 2, 1),
        };
        vec![
            (ItemChoice::MinProgression, min),
            (ItemChoice::Random, random),
            (ItemChoice::MaxProgression, max),
        ]
    }

    // Probability of accepting a possible soft lock on a progression item.
    pub fn soft_lock_probability(self) -> f32 {
        match self {
            ProgressionSpeed::Slowest => 1.0,
            ProgressionSpeed::Slow => 0.66,
            ProgressionSpeed::Medium => 0.33,
            ProgressionSpeed::Fast => 0.1,
            ProgressionSpeed::Fastest | ProgressionSpeed::Basic => 0.0,
        }
    }

    // Item types always treated as progression, whether or not they currently open anything.
    pub fn progression_item_types(self) -> Vec<Item> {
        let removed: &[Item] = match self {
            ProgressionSpeed::Slowest => &[],
            ProgressionSpeed::Slow => &[Item::HiJump, Item::Charge],
            ProgressionSpeed::Medium => &[Item::HiJump, Item::Charge, Item::Bomb, Item::Grapple],
            ProgressionSpeed::Fast => &[
                Item::HiJump,
                Item::Charge,
                Item::Bomb,
                Item::Grapple,
                Item::Ice,
                Item::SpaceJump,
            ],
            ProgressionSpeed::Fastest => &[
                Item::HiJump,
                Item::Charge,
                Item::Bomb,
                Item::Grapple,
                Item::Ice,
                Item::SpaceJump,
                Item::SpeedBooster,
            ],
            ProgressionSpeed::Basic => return vec![],
        };
        let mut types: Vec<Item> = Item::all()
            .filter(|item| item.category() == ItemCategory::Progression)
            .collect();
        types.push(Item::Charge);
        types.retain(|t| !removed.contains(t));
        types
    }

    // Nominal number of non-progression items placed per filling round.
    pub fn item_limit(self) -> usize {
        match self {
            ProgressionSpeed::Slowest => 100,
            ProgressionSpeed::Slow => 20,
            ProgressionSpeed::Medium => 11,
            ProgressionSpeed::Fast => 5,
            ProgressionSpeed::Fastest => 1,
            ProgressionSpeed::Basic => 0,
        }
    }

    // Minimum number of free locations kept for progression, per area; None disables the check.
    pub fn location_limit(self) -> Option<usize> {
        match self {
            ProgressionSpeed::Slow => Some(1),
            ProgressionSpeed::Medium => Some(2),
            ProgressionSpeed::Fast => Some(3),
            ProgressionSpeed::Fastest => Some(4),
            ProgressionSpeed::Slowest | ProgressionSpeed::Basic => None,
        }
    }
}

impl ProgressionDifficulty {
    pub fn location_choice_weights(self) -> Vec<(LocationChoice, u32)> {
        let (random, min, max) = match self {
            ProgressionDifficulty::Normal => (1, 0, 0),
            ProgressionDifficulty::Easier => (2, 1, 0),
            ProgressionDifficulty::Harder => (2, 0, 1),
        };
        vec![
            (LocationChoice::Random, random),
            (LocationChoice::MinDifficulty, min),
            (LocationChoice::MaxDifficulty, max),
        ]
    }
}

impl RandomizerSettings {
    pub fn difficulty_ceiling(&self) -> Cost {
        self.max_difficulty.unwrap_or(f32::INFINITY)
    }

    pub fn runtime_limit(&self) -> Option<Duration> {
        self.runtime_limit_secs
            .and_then(|secs| Duration::try_from_secs_f32(secs.max(0.0)).ok())
    }

    pub fn skill_cost(&self, skill: &str) -> Option<Cost> {
        self.skills.get(skill).copied()
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    // Used in logs and output file names.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }
}

pub fn parse_randomizer_settings(settings_json: &str) -> Result<RandomizerSettings> {
    let mut des = serde_json::Deserializer::from_str(settings_json);
    let settings = serde_path_to_error::deserialize(&mut des)?;
    Ok(settings)
}

pub fn load_randomizer_settings(path: &std::path::Path) -> Result<RandomizerSettings> {
    let settings_str = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read settings file at {}", path.display()))?;
    parse_randomizer_settings(&settings_str)
        .with_context(|| format!("unable to parse settings file at {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_parse_minimal_settings() {
        let settings = parse_randomizer_settings(
            r#"{"progression_speed": "medium", "progression_difficulty": "normal"}"#,
        )
        .unwrap();
        assert_eq!(settings.progression_speed, ProgressionSpeed::Medium);
        assert_eq!(settings.difficulty_ceiling(), f32::INFINITY);
        assert_eq!(settings.runtime_limit(), None);
        assert_eq!(settings.restrictions.morph, MorphPlacement::Random);
        assert_eq!(settings.quantities.minors, 100.0);
        assert_eq!(settings.restrictions.suit_exceptions.len(), 2);
        assert_eq!(settings.display_name(), "unnamed");
        let named = parse_randomizer_settings(
            r#"{"name": "Season", "progression_speed": "medium", "progression_difficulty": "normal"}"#,
        )
        .unwrap();
        assert_eq!(named.display_name(), "Season");
    }

    #[test]
    fn test_parse_error_names_field() {
        let err = parse_randomizer_settings(
            r#"{"progression_speed": "medium", "progression_difficulty": "normal",
                "restrictions": {"morph": "sometimes"}}"#,
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("restrictions.morph"));
    }

    #[test]
    fn test_progression_profiles() {
        assert_eq!(
            ProgressionSpeed::Fastest.progression_item_types(),
            vec![Item::Varia, Item::Gravity, Item::Morph]
        );
        assert!(ProgressionSpeed::Basic.progression_item_types().is_empty());
        let slowest = ProgressionSpeed::Slowest.progression_item_types();
        assert!(slowest.contains(&Item::Charge));
        assert!(slowest.contains(&Item::HiJump));
        assert!(!ProgressionSpeed::Slow
            .progression_item_types()
            .contains(&Item::HiJump));
        assert_eq!(ProgressionSpeed::Medium.location_limit(), Some(2));
        assert_eq!(ProgressionSpeed::Slowest.location_limit(), None);
        assert_eq!(ProgressionSpeed::from_str("fast").unwrap(), ProgressionSpeed::Fast);
    }
}
