use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use table_allocator::allocation::compensation::compute_delta;
use table_allocator::config::{AllocatorConfig, ScoringMode};
use table_allocator::display::{
    load_ledger, print_allocation, print_compensation, save_ledger, write_results_csv, write_results_json,
};
use table_allocator::mock::MockScenario;
use table_allocator::parser::{load_parties, load_sessions};
use table_allocator::Allocator;

#[derive(Parser, Debug)]
#[command(author, version, about = "Seat convention parties at game sessions")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Allocate one time slot from CSV snapshots
    Allocate {
        #[arg(long)]
        sessions: PathBuf,
        #[arg(long)]
        parties: PathBuf,
        /// Compensation ledger JSON; read before and rewritten after the run
        #[arg(long)]
        ledger: Option<PathBuf>,
        #[command(flatten)]
        tuning: Tuning,
        /// Result JSON path
        #[arg(long)]
        output: Option<PathBuf>,
        /// Flat `party_id,session_id,tier` table
        #[arg(long)]
        results_csv: Option<PathBuf>,
    },
    /// Generate a mock scenario and allocate it
    Simulate {
        #[arg(long, default_value_t = 20)]
        sessions: usize,
        #[arg(long, default_value_t = 80)]
        parties: usize,
        /// Seed of the generated scenario
        #[arg(long, default_value_t = 42)]
        scenario_seed: u64,
        #[command(flatten)]
        tuning: Tuning,
    },
}

/// Options shared by both subcommands. CLI flags win over the config file
/// and environment.
#[derive(clap::Args, Debug)]
struct Tuning {
    /// Allocator config JSON; missing keys take defaults
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    trials: Option<usize>,
    /// Seed of trial 0; trial i uses seed + i
    #[arg(long)]
    seed: Option<u64>,
    /// Pure greedy placement
    #[arg(long)]
    no_displacement: bool,
    #[arg(long)]
    scoring: Option<ScoringMode>,
    /// Run trials on one thread
    #[arg(long)]
    sequential: bool,
}

impl Tuning {
    fn build(&self) -> Result<AllocatorConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => AllocatorConfig::default(),
        }
        .with_env_overrides();

        if let Some(trials) = self.trials {
            config.n_trials = trials;
        }
        if let Some(seed) = self.seed {
            config.random_seed_base = seed;
        }
        if self.no_displacement {
            config.allow_displacement = false;
        }
        if let Some(scoring) = self.scoring {
            config.scoring_mode = scoring;
        }
        if self.sequential {
            config.parallel = false;
        }
        Ok(config)
    }
}

fn load_config(path: &Path) -> Result<AllocatorConfig, Box<dyn std::error::Error>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match args.command {
        Command::Allocate { sessions, parties, ledger, tuning, output, results_csv } => {
            let config = tuning.build()?;
            let mut sessions = load_sessions(&sessions)?;
            let mut parties = load_parties(&parties)?;
            info!(sessions = sessions.len(), parties = parties.len(), "Loaded snapshot");

            let mut carried = match &ledger {
                Some(path) => load_ledger(path)?,
                None => Default::default(),
            };
            carried.apply_to(&mut sessions, &mut parties);

            let penalty = config.cancelled_session_penalty;
            let allocator = Allocator::new(config)?;
            let allocation = allocator.allocate(&sessions, &parties)?;
            print_allocation(&allocation, &sessions, &parties);

            let delta = carried.update_with_penalty(&allocation, &sessions, &parties, penalty);
            print_compensation(&delta);

            if let Some(path) = &output {
                write_results_json(path, &allocation, Some(&delta))?;
                println!("Results saved to {}", path.display());
            }
            if let Some(path) = &results_csv {
                write_results_csv(path, &allocation)?;
                println!("Results table saved to {}", path.display());
            }
            if let Some(path) = &ledger {
                save_ledger(path, &carried)?;
                println!("Ledger saved to {}", path.display());
            }
        }
        Command::Simulate { sessions, parties, scenario_seed, tuning } => {
            let config = tuning.build()?;
            let scenario = MockScenario::generate(sessions, parties, scenario_seed);
            info!(sessions, parties, scenario_seed, "Generated mock scenario");

            let penalty = config.cancelled_session_penalty;
            let allocator = Allocator::new(config)?;
            let allocation = allocator.allocate(&scenario.sessions, &scenario.parties)?;
            print_allocation(&allocation, &scenario.sessions, &scenario.parties);

            let delta = compute_delta(
                &allocation,
                &scenario.sessions,
                &scenario.parties,
                penalty,
                |p| p.compensation,
                |gm| gm.compensation,
            );
            print_compensation(&delta);
        }
    }

    Ok(())
}
