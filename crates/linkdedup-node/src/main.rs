use std::path::PathBuf;

use clap::{Parser, Subcommand};

use linkdedup_core::SequenceKey;
use linkdedup_node::inspect;
use linkdedup_node::simulation::{self, SimulationPlan};
use linkdedup_node::{NodeConfig, NodeError};

#[derive(Parser)]
#[command(name = "linkdedup", about = "Link dedup window tooling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the persisted window state of a link
    Inspect {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Directory holding persisted link state, overriding `[storage].path`
        #[arg(short, long)]
        state_dir: Option<PathBuf>,
        /// Sequence key of the link
        key: String,
    },
    /// Replay a link between an in-process sender and peer
    Simulate {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of sequence numbers to send
        #[arg(short, long, default_value_t = 10_000)]
        messages: u64,
        /// Resend every k-th message
        #[arg(short, long)]
        duplicate_every: Option<u64>,
        /// Sequence key of the simulated link
        #[arg(short, long, default_value = "simulated")]
        key: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config_path = match &cli.command {
        Command::Inspect { config, .. } | Command::Simulate { config, .. } => config.as_ref(),
    };
    let config = match config_path {
        Some(path) => match NodeConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("failed to load config from {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => NodeConfig::default(),
    };

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        linkdedup_node::logging::init_json(&config.logging.level);
    } else {
        linkdedup_node::logging::init(&config.logging.level);
    }

    if let Err(e) = run(cli.command, config).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run(command: Command, config: NodeConfig) -> Result<(), NodeError> {
    match command {
        Command::Inspect { state_dir, key, .. } => {
            let dir = config.storage.state_dir(state_dir)?;
            let Some(state) = inspect::load_state(&dir, &SequenceKey::new(key.clone())).await?
            else {
                println!("no persisted state under {}", dir.display());
                return Ok(());
            };
            println!("{key}: {state}");
            if let (Some(head), Some(tail)) = (state.head(), state.tail()) {
                println!("  head {head}");
                println!("  tail {tail}");
                println!("  announced {}", state.is_announced());
            }
        }
        Command::Simulate {
            messages,
            duplicate_every,
            key,
            ..
        } => {
            let plan = SimulationPlan {
                key: SequenceKey::new(key),
                messages,
                duplicate_every,
            };
            let report = simulation::run(&config, &plan).await?;
            println!("forwarded     {}", report.forwarded);
            println!("duplicates    {}", report.duplicates);
            println!("announcements {}", report.announcements);
            println!("sender        {}", report.sender);
            println!("mirror        {}", report.mirror);
        }
    }
    Ok(())
}
