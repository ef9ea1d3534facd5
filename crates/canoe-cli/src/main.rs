use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use canoe_runner::{doctor, Config, Runner, Stage, StageReport};

#[derive(Parser)]
#[command(name = "canoe", version)]
struct Cli {
    /// Config file (defaults to .canoe/canoe.toml under the current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create .canoe/ with a default config and the queue database
    Init,

    /// Check that the config (with environment overrides) can drive every stage
    Doctor,

    /// Resolve departments under the root and queue them
    Seed,

    /// Drain the departments queue into ticket messages
    Expand,

    /// Drain the tickets queue, diffing each ticket against its snapshot
    Check,

    /// Drain the updates queue into chat notifications
    Notify,

    /// Seed, then drain every stage in order
    Run,

    /// Diff a single ticket now
    CheckTicket {
        #[arg(long)]
        id: String,
    },

    /// Show queue depths and the number of stored snapshots
    Status,
}

fn print_report(stage: Stage, r: &StageReport) {
    println!(
        "{stage}: inputs={} outputs={} sends={} snapshots={}",
        r.inputs, r.outputs, r.sends, r.snapshots_written
    );
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let base_dir = std::env::current_dir()?;
    let config = cli.config.as_deref();

    match cli.cmd {
        Command::Init => {
            let path = Runner::init_dir(&base_dir, config)?;
            println!("Initialized canoe in {} (config: {})", base_dir.display(), path.display());
        }
        Command::Doctor => {
            let path = config.map(PathBuf::from).unwrap_or_else(|| Config::config_path(&base_dir));
            let mut cfg = Config::load_from(&path)?;
            cfg.apply_env()?;
            doctor(&cfg)?;
            println!("OK");
        }
        Command::Seed => {
            let r = Runner::open(base_dir, config)?;
            print_report(Stage::Seed, &r.seed()?);
        }
        Command::Expand => {
            let r = Runner::open(base_dir, config)?;
            print_report(Stage::Expand, &r.drain(Stage::Expand)?);
        }
        Command::Check => {
            let r = Runner::open(base_dir, config)?;
            print_report(Stage::Check, &r.drain(Stage::Check)?);
        }
        Command::Notify => {
            let r = Runner::open(base_dir, config)?;
            print_report(Stage::Notify, &r.drain(Stage::Notify)?);
        }
        Command::Run => {
            let r = Runner::open(base_dir, config)?;
            for (stage, report) in r.run()? {
                print_report(stage, &report);
            }
            info!("round complete");
        }
        Command::CheckTicket { id } => {
            let r = Runner::open(base_dir, config)?;
            print_report(Stage::Check, &r.check_ticket(&id)?);
        }
        Command::Status => {
            let r = Runner::open(base_dir, config)?;
            let status = r.status()?;
            for (queue, depth) in &status.queues {
                println!("Queue {queue}: {depth}");
            }
            println!("Snapshots: {}", status.snapshots);
        }
    }

    Ok(())
}
