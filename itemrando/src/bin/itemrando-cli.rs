use anyhow::{bail, Result};
use clap::Parser;
use itemrando::randomize::{seeded_rng, Randomization, Randomizer};
use itemrando::settings::load_randomizer_settings;
use itemrando::spoiler_log::{get_spoiler_log, write_spoiler_log};
use itemrando_game::World;
use log::info;
use rand::{RngCore, SeedableRng};
use std::path::PathBuf;

#[derive(Parser)]
struct Args {
    #[arg(long)]
    world: PathBuf,

    #[arg(long)]
    settings: PathBuf,

    #[arg(long)]
    random_seed: Option<usize>,

    #[arg(long)]
    item_placement_seed: Option<usize>,

    #[arg(long)]
    max_attempts: Option<usize>,

    #[arg(long)]
    output_spoiler_log: Option<PathBuf>,
}

fn get_randomization(args: &Args, world: &World) -> Result<Randomization> {
    let settings = load_randomizer_settings(&args.settings)?;
    let root_seed = match args.random_seed {
        Some(s) => s,
        None => (rand::rngs::StdRng::from_entropy().next_u64() & 0xFFFFFFFF) as usize,
    };
    let mut rng = seeded_rng(root_seed);
    let max_attempts = if args.item_placement_seed.is_some() {
        1
    } else {
        args.max_attempts.unwrap_or(100)
    };
    for attempt_num in 1..=max_attempts {
        let item_seed = match args.item_placement_seed {
            Some(s) => s,
            None => (rng.next_u64() & 0xFFFFFFFF) as usize,
        };
        info!("Attempt {attempt_num}/{max_attempts}: item placement seed={item_seed}");
        let mut item_rng = seeded_rng(item_seed);
        let result = Randomizer::new(world, &settings, &mut item_rng)
            .and_then(|randomizer| randomizer.randomize(item_seed, &mut item_rng));
        match result {
            Ok(randomization) => return Ok(randomization),
            Err(e) => {
                info!("Attempt {attempt_num}/{max_attempts}: Randomization failed: {}", e);
            }
        }
    }
    bail!("Exhausted randomization attempts");
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let world = World::load(&args.world)?;
    let randomization = get_randomization(&args, &world)?;
    if !randomization.diagnostics.is_empty() {
        info!("{}", randomization.diagnostics);
    }

    let spoiler_log = get_spoiler_log(&world, &randomization);
    match &args.output_spoiler_log {
        Some(path) => {
            info!("Writing spoiler log to {}", path.display());
            write_spoiler_log(path, &spoiler_log)?;
        }
        None => {
            for step in &spoiler_log.summary {
                for item in &step.items {
                    println!(
                        "{:>3}  {:<14} {} ({})",
                        step.step,
                        item.item,
                        item.location,
                        item.difficulty.as_deref().unwrap_or("-")
                    );
                }
            }
        }
    }
    Ok(())
}
