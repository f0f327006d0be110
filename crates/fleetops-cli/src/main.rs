//! FleetOps CLI - run scripted fleet tasks through the commissioner
//!
//! Plans are TOML files describing a task type, its parameters and the groups
//! of simulated subtasks to run. Everything is kept in memory for the length
//! of one invocation.

mod plan;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use console::style;
use fleetops_core::config::ConfigManager;
use fleetops_core::{Actor, Commissioner, InMemoryStore, InMemoryTargets, TaskParams, TaskState, TaskType};
use plan::PlanFile;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "fleetops")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run and inspect fleet orchestration tasks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task plan
    Run {
        /// Plan file
        plan: PathBuf,

        /// Retry the task once if it fails and its type allows retries
        #[arg(long)]
        retry: bool,

        /// User the task is submitted on behalf of
        #[arg(long)]
        user: Option<Uuid>,
    },

    /// Show task types
    Types,

    /// Show configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path.clone())?,
        None => ConfigManager::new()?,
    };

    // Logs stay at warn by default so they don't tear the progress bar
    let filter = if cli.verbose {
        format!("{},fleetops_core=debug", config_manager.config().logging.level)
    } else {
        "warn".to_string()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run { plan, retry, user } => run_plan(&config_manager, &plan, retry, user).await?,
        Commands::Types => show_types(&config_manager),
        Commands::Config => show_config(&config_manager)?,
    }

    Ok(())
}

async fn run_plan(
    config_manager: &ConfigManager,
    plan_path: &std::path::Path,
    retry: bool,
    user: Option<Uuid>,
) -> anyhow::Result<()> {
    let plan = PlanFile::load(plan_path)?;
    let params = plan.params_json()?;
    let parsed = TaskParams::parse(plan.task_type, params.clone())?;
    tracing::debug!(
        plan = %plan_path.display(),
        task_type = %plan.task_type,
        groups = plan.groups.len(),
        "Loaded plan"
    );

    let store = Arc::new(InMemoryStore::new());
    let targets = InMemoryTargets::new().with_target(
        parsed.target_uuid(),
        parsed.universe_name(),
        plan.task_type.target_type(),
    );
    let commissioner = Commissioner::new(
        store.clone(),
        store,
        Arc::new(targets),
        plan.planner(),
    )
    .with_config(config_manager.config().commissioner.clone());

    let actor = Actor::new(Uuid::new_v4(), user.unwrap_or_else(Uuid::new_v4));

    println!(
        "{} {} on {}",
        style("Submitting").bold(),
        style(plan.task_type.friendly_name()).cyan(),
        style(parsed.universe_name()).green()
    );
    let (tx, rx) = mpsc::unbounded_channel();
    let task_id = commissioner
        .submit_with_events(&actor, plan.task_type, params, tx)
        .await?;
    println!("  Task {}", style(task_id).dim());

    let mut state = render::follow(&commissioner, task_id, rx).await?;
    render::print_outcome(&commissioner, task_id).await?;

    if retry && state == TaskState::Failure {
        if commissioner.config().is_retryable(plan.task_type) {
            println!();
            println!("{}", style("Retrying task").bold());
            let (tx, rx) = mpsc::unbounded_channel();
            let retry_id = commissioner.retry_with_events(&actor, task_id, tx).await?;
            println!("  Task {}", style(retry_id).dim());
            state = render::follow(&commissioner, retry_id, rx).await?;
            render::print_outcome(&commissioner, retry_id).await?;
        } else {
            println!(
                "{}",
                style(format!("{} tasks cannot be retried", plan.task_type.friendly_name())).yellow()
            );
        }
    }

    println!();
    render::print_history(&commissioner, actor.customer_id).await?;

    match state {
        TaskState::Success => Ok(()),
        other => bail!("task finished in state {:?}", other),
    }
}

fn show_types(config_manager: &ConfigManager) {
    println!("{}", style("Task Types:").bold());
    println!();

    let commissioner_config = &config_manager.config().commissioner;
    for task_type in TaskType::ALL {
        let retry = if commissioner_config.is_retryable(task_type) {
            style("retryable").green()
        } else {
            style("no retry").dim()
        };
        println!(
            "  {:<22} {:<22} {:<10} [{}]",
            style(task_type).cyan(),
            task_type.friendly_name(),
            task_type.target_type().to_string(),
            retry
        );
    }
}

fn show_config(config_manager: &ConfigManager) -> anyhow::Result<()> {
    println!("{}", style("Configuration:").bold());
    println!();
    println!(
        "  Config file: {}",
        style(config_manager.config_path().display()).green()
    );
    println!();
    print!("{}", toml::to_string_pretty(config_manager.config())?);
    Ok(())
}
