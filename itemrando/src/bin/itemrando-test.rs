use anyhow::{Context, Result};
use clap::Parser;
use itemrando::randomize::{randomize_seed, GenerationError, Randomization};
use itemrando::settings::{load_randomizer_settings, RandomizerSettings};
use itemrando::spoiler_log::{get_spoiler_log, write_spoiler_log};
use itemrando_game::World;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
struct Args {
    #[arg(long, default_value_t = 100 as usize)]
    test_cycles: usize,

    #[arg(long)]
    attempt_num: Option<usize>,

    #[arg(long)]
    world: PathBuf,

    // One or more settings files; each cycle uses them in turn.
    #[arg(long, required = true)]
    settings: Vec<PathBuf>,

    #[arg(long)]
    output_seeds: Option<PathBuf>,
}

#[derive(Default)]
struct TestStats {
    successes: usize,
    partial: usize,
    relaxed: usize,
    stuck: usize,
    unfinishable: usize,
    configuration: usize,
    rollbacks: usize,
}

// Checks the properties every successful generation must have, independently of the engine.
fn validate(world: &World, randomization: &Randomization) -> Result<()> {
    let mut used = vec![false; world.locations.len()];
    for p in &randomization.placements {
        anyhow::ensure!(
            !used[p.location],
            "location {} filled twice",
            world.locations[p.location].name
        );
        used[p.location] = true;
    }
    anyhow::ensure!(
        used.iter().all(|&u| u),
        "{} locations left empty",
        used.iter().filter(|&&u| !u).count()
    );
    Ok(())
}

fn perform_test_cycle(
    args: &Args,
    world: &World,
    settings: &RandomizerSettings,
    seed: usize,
    stats: &mut TestStats,
) -> Result<()> {
    info!("Test cycle Start: seed={seed}, settings={}", settings.display_name());
    let start = Instant::now();
    match randomize_seed(world, settings, seed) {
        Ok(randomization) => {
            validate(world, &randomization)
                .with_context(|| format!("Invalid randomization for seed {seed}"))?;
            stats.successes += 1;
            stats.rollbacks += randomization.rollback_count;
            if randomization.partial_completion {
                stats.partial += 1;
            }
            if randomization.relaxed_difficulty {
                stats.relaxed += 1;
            }
            if let Some(dir) = &args.output_seeds {
                let spoiler_log = get_spoiler_log(world, &randomization);
                let file_name = format!("{}-{seed}-spoiler.json", settings.display_name());
                let path = Path::join(dir, file_name);
                write_spoiler_log(&path, &spoiler_log)?;
            }
            info!(
                "Test cycle End: seed={seed}, {} rollbacks, {:.3}s",
                randomization.rollback_count,
                start.elapsed().as_secs_f32()
            );
        }
        Err(e) => {
            warn!("Test cycle End: seed={seed}: {e}");
            match e {
                GenerationError::Configuration(_) => stats.configuration += 1,
                GenerationError::StuckNoRollback { .. } => stats.stuck += 1,
                GenerationError::Unfinishable { .. } => stats.unfinishable += 1,
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let world = World::load(&args.world)?;
    let settings_list = args
        .settings
        .iter()
        .map(|path| load_randomizer_settings(path))
        .collect::<Result<Vec<RandomizerSettings>>>()?;
    if let Some(dir) = &args.output_seeds {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Unable to create {}", dir.display()))?;
    }

    let mut stats = TestStats::default();
    for test_cycle in 0..args.test_cycles {
        let seed = args.attempt_num.unwrap_or(test_cycle + 1);
        let settings = &settings_list[test_cycle % settings_list.len()];
        perform_test_cycle(&args, &world, settings, seed, &mut stats)
            .with_context(|| format!("Failed during test cycle {}", test_cycle + 1))?;
        if args.attempt_num.is_some() {
            break;
        }
    }

    info!(
        "{} successes ({} partial, {} relaxed), {} stuck, {} unfinishable, {} invalid settings, {} rollbacks",
        stats.successes,
        stats.partial,
        stats.relaxed,
        stats.stuck,
        stats.unfinishable,
        stats.configuration,
        stats.rollbacks
    );
    Ok(())
}
