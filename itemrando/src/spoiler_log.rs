use anyhow::{Context, Result};
use itemrando_game::{Item, LocationId, World};
use itemrando_logic::difficulty::difficulty_to_text;
use serde::{Deserialize, Serialize};

use crate::randomize::Randomization;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SpoilerItemLoc {
    pub item: String,
    pub location: String,
    pub area: String,
    pub access_point: String,
    // Missing for locations that were filled without logic.
    pub difficulty: Option<String>,
    pub resolves_soft_lock: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SpoilerSummary {
    pub step: usize,
    pub items: Vec<SpoilerItemLoc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SpoilerLog {
    pub world: String,
    pub seed: usize,
    pub forbidden_items: Vec<String>,
    pub restricted_locations: Vec<String>,
    pub diagnostics: String,
    pub partial_completion: bool,
    pub relaxed_difficulty: bool,
    pub rollback_count: usize,
    // Collected items, in pickup order, grouped in steps that each end with a progression item.
    pub summary: Vec<SpoilerSummary>,
    pub all_items: Vec<SpoilerItemLoc>,
}

fn item_name(item: Item) -> String {
    format!("{:?}", item)
}

pub fn get_spoiler_log(world: &World, randomization: &Randomization) -> SpoilerLog {
    let mut all_items: Vec<SpoilerItemLoc> = vec![];
    let mut summary: Vec<SpoilerSummary> = vec![];
    let mut step_items: Vec<SpoilerItemLoc> = vec![];
    let prog_locs: Vec<LocationId> = randomization
        .progression_placements
        .iter()
        .map(|p| p.location)
        .collect();
    for p in &randomization.placements {
        let loc = &world.locations[p.location];
        let entry = SpoilerItemLoc {
            item: item_name(p.item),
            location: loc.name.clone(),
            area: format!("{:?}", loc.area),
            access_point: world.access_points[loc.access_point].name.clone(),
            difficulty: if p.collected {
                Some(difficulty_to_text(p.difficulty.cost))
            } else {
                None
            },
            resolves_soft_lock: p.resolves_soft_lock,
        };
        all_items.push(entry.clone());
        if !p.collected {
            continue;
        }
        step_items.push(entry);
        if prog_locs.contains(&p.location) {
            summary.push(SpoilerSummary {
                step: summary.len() + 1,
                items: std::mem::take(&mut step_items),
            });
        }
    }
    if !step_items.is_empty() {
        summary.push(SpoilerSummary {
            step: summary.len() + 1,
            items: step_items,
        });
    }
    SpoilerLog {
        world: world.name.clone(),
        seed: randomization.seed,
        forbidden_items: randomization
            .forbidden_items
            .iter()
            .map(|&i| item_name(i))
            .collect(),
        restricted_locations: randomization
            .restricted_locations
            .iter()
            .map(|&l| world.locations[l].name.clone())
            .collect(),
        diagnostics: randomization.diagnostics.clone(),
        partial_completion: randomization.partial_completion,
        relaxed_difficulty: randomization.relaxed_difficulty,
        rollback_count: randomization.rollback_count,
        summary,
        all_items,
    }
}

pub fn write_spoiler_log(path: &std::path::Path, spoiler_log: &SpoilerLog) -> Result<()> {
    let json = serde_json::to_string_pretty(spoiler_log)?;
    std::fs::write(path, json)
        .with_context(|| format!("Unable to write spoiler log to {}", path.display()))
}
