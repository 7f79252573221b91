/// KoruReflect CLI - replay market data through a decision loop
///
/// Usage:
///   kreflect run --config <file> --market <jsonl> --mode <train|test>
///   kreflect run --resume <checkpoint> --market <jsonl> --mode test
///   kreflect inspect <checkpoint>
///   kreflect validate --config <file>
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use koru_reflect::{
    AgentConfig, AgentSnapshot, DecisionLoop, Direction, MarketStep, NullReasoner, NullSink,
    PositionBook, ReasoningCollaborator, RunMode, TieredMemory, reasoner_from_config,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

type Agent = DecisionLoop<TieredMemory, PositionBook, Box<dyn ReasoningCollaborator>>;

/// KoruReflect - memory-reinforced trading decision loops
#[derive(Parser)]
#[command(name = "kreflect")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSONL market file, one step per line
    ///
    /// Examples:
    ///   kreflect run --config agent.json --market tsla.jsonl --mode train --save
    ///   kreflect run --resume ~/.koru-reflect/checkpoints/tsla-agent \
    ///       --market tsla-2025.jsonl --mode test
    Run {
        /// Agent configuration (JSON)
        #[arg(short, long, required_unless_present = "resume")]
        config: Option<PathBuf>,

        /// Market data, one JSON step per line
        #[arg(short, long)]
        market: PathBuf,

        /// Run mode: train or test
        #[arg(long)]
        mode: RunMode,

        /// Continue from an existing checkpoint instead of starting fresh
        #[arg(short, long, conflicts_with = "config")]
        resume: Option<PathBuf>,

        /// Directory that holds checkpoints (saved as <dir>/<agent_name>)
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Save to the default checkpoint directory when --checkpoint is not given
        #[arg(long)]
        save: bool,

        /// Replace an existing checkpoint
        #[arg(short, long)]
        force: bool,
    },

    /// Show the reflection log and access counters of a checkpoint
    Inspect {
        /// Checkpoint directory
        checkpoint: PathBuf,

        /// Number of reflections shown (most recent first)
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Load and validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Run {
            config,
            market,
            mode,
            resume,
            checkpoint,
            save,
            force,
        } => {
            let checkpoint_dir = match (checkpoint, save) {
                (Some(dir), _) => Some(dir),
                (None, true) => Some(default_checkpoint_dir()?),
                (None, false) => None,
            };
            run(config, market, mode, resume, checkpoint_dir, force).await
        }
        Commands::Inspect { checkpoint, limit } => inspect(&checkpoint, limit).await,
        Commands::Validate { config } => {
            let config = AgentConfig::load(&config)
                .await
                .with_context(|| format!("Invalid configuration: {}", config.display()))?;
            println!("{}", "OK".green().bold());
            println!("  Agent:    {}", config.agent_name().cyan());
            println!("  Symbol:   {}", config.symbol().cyan());
            println!("  Top-k:    {}", config.top_k());
            println!("  Lookback: {}", config.look_back_window_size());
            println!("  Endpoint: {} ({})", config.chat.endpoint, config.chat.model);
            Ok(())
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}

/// Default checkpoint directory (~/.koru-reflect/checkpoints)
fn default_checkpoint_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".koru-reflect").join("checkpoints"))
}

async fn build_agent(config: Option<PathBuf>, resume: Option<PathBuf>) -> Result<Agent> {
    if let Some(location) = resume {
        let snapshot = AgentSnapshot::read(&location)
            .await
            .with_context(|| format!("Failed to read checkpoint {}", location.display()))?;
        let reasoner = reasoner_from_config(&snapshot.config.chat)?;
        let agent = Agent::load_checkpoint(&location, reasoner)
            .await
            .with_context(|| format!("Failed to restore checkpoint {}", location.display()))?;
        println!(
            "{} {} ({} steps so far)",
            "Resumed".green().bold(),
            location.display(),
            agent.steps()
        );
        return Ok(agent);
    }

    let path = config.context("--config is required without --resume")?;
    let config = AgentConfig::load(&path)
        .await
        .with_context(|| format!("Invalid configuration: {}", path.display()))?;
    let reasoner = reasoner_from_config(&config.chat)?;
    let memory = Arc::new(TieredMemory::with_config(config.memory.clone()));
    let book = PositionBook::new(config.symbol(), config.look_back_window_size());
    Ok(DecisionLoop::new(config, memory, book, reasoner)?)
}

async fn read_market(path: &Path) -> Result<Vec<MarketStep>> {
    let text = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read market file {}", path.display()))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid market step", path.display(), n + 1))
        })
        .collect()
}

async fn run(
    config: Option<PathBuf>,
    market: PathBuf,
    mode: RunMode,
    resume: Option<PathBuf>,
    checkpoint_dir: Option<PathBuf>,
    force: bool,
) -> Result<()> {
    let steps = read_market(&market).await?;
    let mut agent = build_agent(config, resume).await?;

    let (mut long, mut flat, mut short, mut skipped) = (0usize, 0usize, 0usize, 0usize);
    for step in &steps {
        let action = agent
            .step(step, mode)
            .await
            .with_context(|| format!("Step {} failed", step.date))?;
        match action.map(|a| a.direction) {
            Some(Direction::Long) => long += 1,
            Some(Direction::Flat) => flat += 1,
            Some(Direction::Short) => short += 1,
            None => skipped += 1,
        }
    }

    let symbol = agent.config().symbol().to_string();
    let stats = agent.memory().stats(&symbol);
    let book = agent.portfolio();

    println!("{}", "Run Summary".bold().cyan());
    println!();
    println!("  {} {}", "Agent:".bright_white(), agent.config().agent_name());
    println!("  {} {} ({})", "Symbol:".bright_white(), symbol, mode);
    println!(
        "  {} {} processed, {} skipped",
        "Steps:".bright_white(),
        steps.len() - skipped,
        skipped
    );
    println!(
        "  {} {} long, {} flat, {} short",
        "Actions:".bright_white(),
        long.to_string().green(),
        flat,
        short.to_string().red()
    );
    println!("  {} {}", "Holding:".bright_white(), book.holding());
    println!("  {} {:.4}", "P&L:".bright_white(), book.realized_pnl());
    println!(
        "  {} {}",
        "Reflections:".bright_white(),
        agent.reflections().len()
    );
    println!(
        "  {} short {}, mid {}, long {}, reflection {} ({} evicted)",
        "Memory:".bright_white(),
        stats.short,
        stats.mid,
        stats.long,
        stats.reflection,
        stats.evicted
    );

    if let Some(dir) = checkpoint_dir {
        let location = dir.join(agent.config().agent_name());
        agent
            .save_checkpoint(&location, force)
            .await
            .with_context(|| format!("Failed to save checkpoint {}", location.display()))?;
        println!();
        println!("{} {}", "Saved".green().bold(), location.display());
    }
    Ok(())
}

async fn inspect(location: &Path, limit: usize) -> Result<()> {
    let agent = DecisionLoop::<TieredMemory, PositionBook, NullReasoner>::load_checkpoint_with_sink(
        location,
        NullReasoner,
        Arc::new(NullSink),
    )
    .await
    .with_context(|| format!("Failed to load checkpoint {}", location.display()))?;

    let config = agent.config();
    println!("{}", "Checkpoint".bold().cyan());
    println!();
    println!("  {} {}", "Agent:".bright_white(), config.agent_name());
    println!("  {} {}", "Symbol:".bright_white(), config.symbol());
    println!("  {} {}", "Steps:".bright_white(), agent.steps());
    println!("  {} {}", "Holding:".bright_white(), agent.portfolio().holding());
    println!();

    let reflections: Vec<_> = agent.reflections().current().collect();
    if reflections.is_empty() {
        println!("{}", "No reflections recorded".yellow());
    } else {
        println!("{}", format!("Reflections ({}):", reflections.len()).bold());
        for record in reflections.iter().rev().take(limit) {
            let decision = match record.decision {
                Some(d) => d.to_string().green(),
                None if record.converged => "-".normal(),
                None => "unconverged".bright_black(),
            };
            let consulted: usize = record.consulted.values().map(Vec::len).sum();
            println!(
                "  {} {} [{}] {} memories",
                record.date.to_string().cyan(),
                record.mode,
                decision,
                consulted
            );
            if let Some(rationale) = &record.rationale {
                println!("      {}", rationale.bright_black());
            }
        }
    }
    println!();

    let top = agent.access_counters().most_reinforced(limit);
    if top.is_empty() {
        println!("{}", "No reinforcements recorded".yellow());
    } else {
        println!("{}", "Most reinforced memories:".bold());
        for entry in top {
            let net = format!("{:+.1}", entry.count.net_feedback);
            let net = if entry.count.net_feedback >= 0.0 {
                net.green()
            } else {
                net.red()
            };
            println!(
                "  {} {:<10} {} x{}",
                "*".cyan(),
                entry.tier.to_string(),
                entry.id,
                entry.count.reinforcements
            );
            println!("      net feedback {}", net);
        }
    }
    Ok(())
}
