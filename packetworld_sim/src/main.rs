//! Packet World Simulator CLI
//!
//! Run seeded scenarios against the synchronization kernel.

use clap::Parser;
use packetworld_sim::{ScenarioId, ScenarioResult, ScenarioRunner, SimConfig};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Packet World scenario runner
#[derive(Parser, Debug)]
#[command(name = "packetworld-sim")]
#[command(about = "Run Packet World synchronization scenarios", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of agents
    #[arg(short, long)]
    agents: Option<usize>,

    /// Scenario to run (delivery, handoff, gossip, attrition, solo, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// World ticks per run
    #[arg(short, long)]
    ticks: Option<u64>,

    /// JSON config file; command line flags override it
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

fn load_config(args: &Args) -> SimConfig {
    let mut config = match &args.config {
        Some(path) => SimConfig::from_file(path).unwrap_or_else(|e| {
            eprintln!("Error: {}: {}", path, e);
            std::process::exit(2);
        }),
        None => SimConfig::default(),
    };

    config.seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };
    if let Some(agents) = args.agents {
        config.agents = agents;
    }
    if let Some(ticks) = args.ticks {
        config.max_ticks = ticks;
    }
    config
}

fn print_summary(results: &[ScenarioResult], json: bool) {
    let total = results.len();
    let failed: Vec<&ScenarioResult> = results.iter().filter(|r| !r.passed).collect();

    if json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed.len(),
            "failed": failed.len(),
            "results": results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "ticks": r.total_ticks,
                    "packets_left": r.packets_left,
                    "deadlocked": r.deadlocked,
                    "failure_reason": r.failure_reason,
                    "metrics": r.metrics,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Error: could not encode summary: {}", e),
        }
        return;
    }

    info!("");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if failed.is_empty() {
        info!("✅ All {} scenario runs passed!", total);
    } else {
        error!("❌ {}/{} scenario runs failed!", failed.len(), total);
        for result in failed {
            error!(
                "  - {} seed={}: {}",
                result.scenario.name(),
                result.seed,
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if !args.json {
        info!("Packet World Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!("Available scenarios: delivery, handoff, gossip, attrition, solo, all");
            std::process::exit(2);
        })]
    };

    let config = load_config(&args);
    let seed = config.seed;
    let runner = ScenarioRunner::from_config(config);

    let mut results = Vec::with_capacity(scenarios.len());
    for scenario in scenarios {
        if !args.json {
            info!("▶ {}: {}", scenario.name(), scenario.description());
        }
        let result = runner.run(scenario).await;
        if !args.json {
            if result.passed {
                info!(
                    "✓ {} (seed={}) PASSED in {} ticks, {} spheres, {} merges, {} mails",
                    scenario.name(),
                    seed,
                    result.total_ticks,
                    result.metrics.spheres_completed,
                    result.metrics.merges,
                    result.metrics.mails_delivered
                );
            } else {
                error!(
                    "✗ {} (seed={}) FAILED: {}",
                    scenario.name(),
                    seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
        results.push(result);
    }

    print_summary(&results, args.json);

    // Exit with proper code for CI
    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }
}
