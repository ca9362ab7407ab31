//! Command-line interface for the donorflow worker binary.
//!
//! Provides the automation worker loop plus small inspection commands for
//! the pipeline, rules, and resolved configuration.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::Duration;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config;
use crate::domain::MoveFilter;
use crate::engine::{Automation, Executor, ExecutorSettings, LogDispatcher, Pipeline};
use crate::store::Store;

/// donorflow - donor pipeline and stewardship automation core
#[derive(Parser, Debug)]
#[command(name = "donorflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the automation executor loop
    Worker {
        /// Poll interval in seconds (overrides config)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Max executions claimed per tick (overrides config)
        #[arg(short, long)]
        batch: Option<usize>,
    },

    /// Show the pipeline summary (per-stage counts and value)
    Pipeline {
        /// Filter by donor type (exact match)
        #[arg(long)]
        donor_type: Option<String>,

        /// Filter by giving capacity (exact match)
        #[arg(long)]
        giving_capacity: Option<String>,
    },

    /// Manage automation rules
    Rules {
        #[command(subcommand)]
        command: RuleCommands,
    },

    /// Show resolved configuration (debug)
    Config,
}

#[derive(Subcommand, Debug)]
pub enum RuleCommands {
    /// List rules in priority order
    List,

    /// Enable or disable a rule
    Toggle {
        /// Rule ID (UUID)
        rule_id: String,
    },
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Worker { interval, batch } => run_worker(interval, batch).await,
            Commands::Pipeline {
                donor_type,
                giving_capacity,
            } => show_pipeline(donor_type, giving_capacity).await,
            Commands::Rules { command } => match command {
                RuleCommands::List => list_rules().await,
                RuleCommands::Toggle { rule_id } => toggle_rule(&rule_id).await,
            },
            Commands::Config => show_config(),
        }
    }
}

/// Open the journal-backed store at the configured path.
async fn open_store() -> Result<Arc<Store>> {
    let path = config::journal_path()?;
    let store = Store::open(&path)
        .await
        .with_context(|| format!("failed to open store journal: {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Run the executor until interrupted.
async fn run_worker(interval: Option<u64>, batch: Option<usize>) -> Result<()> {
    let defaults = &config::config()?.executor;
    let settings = ExecutorSettings {
        poll_interval: StdDuration::from_secs(interval.unwrap_or(defaults.poll_seconds)),
        batch_size: batch.unwrap_or(defaults.batch_size),
        stuck_timeout: Duration::minutes(defaults.stuck_timeout_minutes),
    };

    let store = open_store().await?;
    let automation = Arc::new(Automation::new(store));
    let executor = Executor::new(automation, Arc::new(LogDispatcher), settings);

    tokio::select! {
        _ = executor.run() => {}
        _ = tokio::signal::ctrl_c() => {
            println!("shutting down");
        }
    }

    Ok(())
}

/// Print per-stage counts and pipeline value.
async fn show_pipeline(donor_type: Option<String>, giving_capacity: Option<String>) -> Result<()> {
    let store = open_store().await?;
    let pipeline = Pipeline::new(store);

    let filter = MoveFilter {
        donor_type,
        giving_capacity,
    };
    let board = pipeline.list_by_stage(&filter).await;
    let metrics = pipeline.metrics().await;

    println!("Pipeline ({} active, ${:.2} total)", metrics.total_active, metrics.total_value);
    for (column, stage_metrics) in board.columns.iter().zip(metrics.stages.iter()) {
        println!(
            "  {:<15} {:>4} shown  {:>4} total  ${:.2}",
            column.stage.as_str(),
            column.moves.len(),
            stage_metrics.count,
            stage_metrics.value,
        );
    }

    Ok(())
}

/// List rules in priority order.
async fn list_rules() -> Result<()> {
    let store = open_store().await?;
    let automation = Automation::new(store);

    let rules = automation.list_rules().await;
    if rules.is_empty() {
        println!("No automation rules.");
        return Ok(());
    }

    for rule in rules {
        let state = if rule.is_active { "active" } else { "inactive" };
        println!(
            "{}  [{}] p{} {:?} -> {:?}  {} ({} runs)",
            rule.id, state, rule.priority, rule.trigger_type, rule.action_type, rule.name,
            rule.execution_count,
        );
    }

    Ok(())
}

/// Flip a rule's active flag.
async fn toggle_rule(rule_id: &str) -> Result<()> {
    let id = Uuid::parse_str(rule_id).context("invalid rule ID (expected UUID)")?;

    let store = open_store().await?;
    let automation = Automation::new(store);

    let rule = automation.get_rule(id).await?;
    let updated = automation.set_rule_active(id, !rule.is_active).await?;

    let state = if updated.is_active { "active" } else { "inactive" };
    println!("{} is now {}", updated.name, state);
    if !updated.is_active {
        println!("note: already-queued pending executions for this rule will still fire");
    }

    Ok(())
}

/// Print resolved configuration.
fn show_config() -> Result<()> {
    let config = config::config()?;

    println!("home:    {}", config.home.display());
    println!("journal: {}", config.journal_path.display());
    match &config.config_file {
        Some(path) => println!("config:  {}", path.display()),
        None => println!("config:  (defaults)"),
    }
    println!(
        "executor: poll {}s, batch {}, stuck timeout {}m",
        config.executor.poll_seconds,
        config.executor.batch_size,
        config.executor.stuck_timeout_minutes,
    );

    Ok(())
}
