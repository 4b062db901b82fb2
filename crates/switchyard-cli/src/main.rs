use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use switchyard_controller::config::parse_duration;
use switchyard_controller::{Controller, ControllerConfig, ControllerError};
use switchyard_orch::SimCluster;
use switchyard_state::{Deployment, StateStore, Strategy};

#[derive(Parser)]
#[command(
    name = "switchyard",
    about = "Switchyard — progressive delivery for pooled workloads",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Directory for the state store and the local cluster backend
    #[arg(long, default_value = ".switchyard", global = true)]
    data_dir: PathBuf,
    /// Health gate deadline ("30s", "500ms", "2m")
    #[arg(long, default_value = "30s", global = true)]
    gate_timeout: String,
    /// Delay between health gate polls
    #[arg(long, default_value = "500ms", global = true)]
    poll_interval: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    BlueGreen,
    Canary,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::BlueGreen => Strategy::BlueGreen,
            StrategyArg::Canary => Strategy::Canary,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a deployment: provision the stable pool at full capacity
    /// and route all traffic to it
    Init {
        name: String,
        /// Rollout strategy for future deploys
        #[arg(short, long, value_enum)]
        strategy: StrategyArg,
        /// Image to run in the stable pool
        #[arg(short, long)]
        image: String,
        /// Total replica capacity across both pools
        #[arg(short, long)]
        capacity: u32,
    },
    /// Start a rollout: provision a candidate pool for the new image
    /// and open its initial traffic share once it passes the health gate
    Deploy {
        name: String,
        #[arg(short, long)]
        image: String,
        /// Initial traffic percentage for the candidate (canary only)
        #[arg(short, long, default_value_t = 10)]
        weight: u8,
    },
    /// Move the canary to a new traffic weight
    Shift {
        name: String,
        #[arg(short, long)]
        weight: u8,
    },
    /// Complete the rollout: candidate becomes the new stable pool
    Promote { name: String },
    /// Abort the rollout: restore stable at 100% immediately.
    ///
    /// Preempts an in-flight deploy or shift. The candidate pool stays
    /// allocated for inspection; reclaim it with cleanup.
    Rollback { name: String },
    /// Delete the non-serving candidate pool left by a rollback
    Cleanup { name: String },
    /// Show a deployment's record, pools, and transition history
    Status {
        name: String,
        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
    /// List all managed deployments
    List {
        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
    /// Delete a deployment's pools and its record
    Destroy { name: String },
    /// Converge the live cluster toward the persisted records,
    /// resolving transitions interrupted by a crash
    Reconcile,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("switchyard=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err:#}");
        let code = err
            .downcast_ref::<ControllerError>()
            .map_or(1, ControllerError::exit_code);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    std::fs::create_dir_all(&cli.data_dir)?;
    let store = StateStore::open(&cli.data_dir.join("switchyard.redb"))?;
    let cluster = SimCluster::open(&cli.data_dir.join("cluster.json"))?;
    let config = ControllerConfig {
        gate_timeout: arg_duration(&cli.gate_timeout, "--gate-timeout")?,
        gate_poll_interval: arg_duration(&cli.poll_interval, "--poll-interval")?,
        ..ControllerConfig::default()
    };
    let ctl = Controller::new(store, Arc::new(cluster), config);

    // Converge toward the persisted records before mutating anything;
    // reads and the explicit reconcile verb skip the implicit pass.
    match cli.command {
        Commands::Status { .. } | Commands::List { .. } | Commands::Reconcile => {}
        _ => {
            ctl.reconcile().await?;
        }
    }

    match cli.command {
        Commands::Init {
            name,
            strategy,
            image,
            capacity,
        } => {
            ctl.init(&name, strategy.into(), &image, capacity).await?;
            println!("initialized {name} ({image}, {capacity} replicas)");
        }
        Commands::Deploy { name, image, weight } => {
            ctl.deploy(&name, &image, weight).await?;
            println!("deployed {image} to {name}");
        }
        Commands::Shift { name, weight } => {
            ctl.shift(&name, weight).await?;
            println!("shifted {name} to {weight}%");
        }
        Commands::Promote { name } => {
            ctl.promote(&name).await?;
            println!("promoted {name}");
        }
        Commands::Rollback { name } => {
            ctl.rollback(&name).await?;
            println!("rolled back {name}");
        }
        Commands::Cleanup { name } => {
            ctl.cleanup(&name).await?;
            println!("cleaned up {name}");
        }
        Commands::Status { name, output } => {
            let d = ctl.status(&name)?;
            match output {
                OutputFormat::Text => print_status(&d),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&d)?),
            }
        }
        Commands::List { output } => {
            let deployments = ctl.list()?;
            match output {
                OutputFormat::Text => {
                    for d in &deployments {
                        let image = d.stable_pool.as_ref().map_or("-", |p| p.image.as_str());
                        println!(
                            "{}\t{}\t{}\t{}\tcandidate {}%",
                            d.name,
                            strategy_str(d.strategy),
                            d.state,
                            image,
                            d.candidate_weight
                        );
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&deployments)?),
            }
        }
        Commands::Destroy { name } => {
            ctl.destroy(&name).await?;
            println!("destroyed {name}");
        }
        Commands::Reconcile => {
            let recovered = ctl.reconcile().await?;
            println!("reconciled; {recovered} deployment(s) recovered");
        }
    }
    Ok(())
}

fn arg_duration(value: &str, flag: &str) -> anyhow::Result<Duration> {
    parse_duration(value).ok_or_else(|| anyhow::anyhow!("invalid duration for {flag}: {value}"))
}

fn strategy_str(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::BlueGreen => "blue-green",
        Strategy::Canary => "canary",
    }
}

fn print_status(d: &Deployment) {
    println!("deployment: {}", d.name);
    println!("strategy:   {}", strategy_str(d.strategy));
    println!("state:      {}", d.state);
    println!("capacity:   {}", d.total_capacity);
    if let Some(stable) = &d.stable_pool {
        println!(
            "stable:     {} ({}) {} replicas, {}% traffic",
            stable.name,
            stable.image,
            stable.replicas,
            100 - d.candidate_weight
        );
    }
    if let Some(candidate) = &d.candidate_pool {
        println!(
            "candidate:  {} ({}) {} replicas, {}% traffic",
            candidate.name, candidate.image, candidate.replicas, d.candidate_weight
        );
    }
    if !d.history.is_empty() {
        println!("history:");
        for entry in &d.history {
            let params = if entry.parameters.is_empty() {
                String::new()
            } else {
                format!(" [{}]", entry.parameters)
            };
            println!(
                "  {}  {} → {}  {}{}",
                entry.timestamp, entry.from, entry.to, entry.verb, params
            );
        }
    }
}
