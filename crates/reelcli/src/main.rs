// crates/reelcli/src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reelcore::{ErrorHandling, ProgressEvent, RunStatus, StartOptions, Value, Workflow};
use reelruntime::{Orchestrator, ProcessorRegistry, RuntimeConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "reel")]
#[command(about = "Reel pipeline CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Input data as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Run one node at a time instead of fanning out
        #[arg(long)]
        sequential: bool,

        /// stop, continue or retry
        #[arg(long)]
        error_handling: Option<ErrorHandling>,

        #[arg(long)]
        max_retries: Option<u32>,

        /// Per-node timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Runs allowed to execute at once (at least 1)
        #[arg(long, default_value_t = 3)]
        max_runs: usize,

        /// Node invocations in flight per run
        #[arg(long, default_value_t = 10)]
        max_parallel: usize,

        /// Base delay of the retry backoff in milliseconds
        #[arg(long, default_value_t = 1000)]
        retry_base_ms: u64,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Write the default novel-to-anime workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,

        /// Write the seven-stage production line instead of the editor's five stages
        #[arg(long)]
        anime: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            input,
            sequential,
            error_handling,
            max_retries,
            timeout_ms,
            max_runs,
            max_parallel,
            retry_base_ms,
            verbose,
        } => {
            init_logging(verbose);

            let mut options = StartOptions::default();
            if sequential {
                options = options.sequential();
            }
            options.error_handling = error_handling;
            options.max_retries = max_retries;
            options.timeout_ms = timeout_ms;

            let config = RuntimeConfig {
                max_concurrent_runs: max_runs,
                max_parallel_nodes: max_parallel,
                retry_base_delay: Duration::from_millis(retry_base_ms),
            };

            run_workflow(file, input, options, config).await?;
        }

        Commands::Validate { file } => {
            init_logging(false);
            validate_workflow(file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output, anime } => {
            create_default_workflow(output, anime)?;
        }
    }

    Ok(())
}

fn load_workflow(file: &Path) -> Result<Workflow> {
    let workflow_json = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    Ok(Workflow::from_json(&workflow_json)?)
}

fn standard_orchestrator(config: RuntimeConfig) -> Orchestrator {
    let registry = ProcessorRegistry::new();
    reelnodes::register_all(&registry);
    Orchestrator::with_registry(Arc::new(registry), config)
}

fn print_event(event: &ProgressEvent) {
    let message = event.message.as_deref().unwrap_or_default();
    match event.status {
        RunStatus::Completed => println!("✨ [{:>3}%] {}", event.progress, message),
        RunStatus::Failed => println!(
            "💥 [{:>3}%] {} ({})",
            event.progress,
            message,
            event.error.as_deref().unwrap_or("unknown error")
        ),
        RunStatus::Cancelled => println!("🛑 [{:>3}%] {}", event.progress, message),
        RunStatus::Paused => println!("⏸️  [{:>3}%] {}", event.progress, message),
        _ => match &event.error {
            Some(error) => println!("  ❌ [{:>3}%] {}: {}", event.progress, message, error),
            None if message.starts_with("Executing") => {
                println!("  ⚡ [{:>3}%] {}", event.progress, message)
            }
            None => println!("  ✅ [{:>3}%] {}", event.progress, message),
        },
    }
}

async fn run_workflow(
    file: PathBuf,
    input: Option<String>,
    options: StartOptions,
    config: RuntimeConfig,
) -> Result<()> {
    println!("🚀 Loading workflow from: {}", file.display());

    let workflow = load_workflow(&file)?;

    println!("📋 Workflow: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Connections: {}", workflow.connections.len());
    println!();

    let data = match input {
        Some(input_str) => {
            let json: serde_json::Value = serde_json::from_str(&input_str)?;
            if !json.is_object() {
                bail!("Input must be a JSON object");
            }
            Value::from(json)
        }
        None => Value::object(),
    };

    tracing::debug!(?config, "Runtime configuration");
    let orchestrator = standard_orchestrator(config);
    let run_id = orchestrator
        .start_monitored(&workflow, data, options, |event| print_event(&event))
        .await?;
    println!("▶️  Run {} started", run_id);

    let run = orchestrator.wait(run_id).await?;
    orchestrator.stop_monitoring(run_id);

    println!();
    println!("📊 Execution Summary:");
    println!("   Run ID: {}", run.id);
    println!("   Status: {}", run.status);
    println!(
        "   Completed: {}/{} nodes",
        run.completed_nodes(),
        run.node_statuses.len()
    );
    if let Some(duration) = run.duration() {
        println!("   Duration: {}ms", duration.num_milliseconds());
    }

    if !run.context.results.is_empty() {
        println!();
        println!("📤 Results:");
        for (node_id, value) in &run.context.results {
            let json = serde_json::to_string(&serde_json::Value::from(value.clone()))?;
            println!("   {}: {}", node_id, json);
        }
    }

    if !run.context.warnings.is_empty() {
        println!();
        println!("⚠️  Warnings:");
        for warning in &run.context.warnings {
            println!("   {}", warning.message);
        }
    }

    if run.status != RunStatus::Completed {
        for error in &run.context.errors {
            println!(
                "❌ {}: {}",
                error.node_name.as_deref().unwrap_or("run"),
                error.message
            );
        }
        bail!("run {} ended as {}", run.id, run.status);
    }

    Ok(())
}

fn validate_workflow(file: PathBuf) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());

    let workflow = load_workflow(&file)?;
    let report = standard_orchestrator(RuntimeConfig::default()).validate(&workflow);

    for warning in &report.warnings {
        println!("⚠️  {}: {}", warning.code, warning.message);
    }
    for error in &report.errors {
        println!("❌ {}: {}", error.code, error.message);
    }

    if !report.is_valid() {
        bail!("workflow has {} error(s)", report.errors.len());
    }

    println!("✅ Workflow is valid:");
    println!("   Name: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Connections: {}", workflow.connections.len());

    Ok(())
}

fn list_nodes() {
    println!("📦 Available Node Types:");
    println!();

    let registry = ProcessorRegistry::new();
    reelnodes::register_all(&registry);

    for node_type in registry.list_node_types() {
        if let Some(metadata) = registry.get_metadata(&node_type) {
            println!("  • {} ({})", node_type, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  • {}", node_type);
        }
    }
}

fn create_default_workflow(output: PathBuf, anime: bool) -> Result<()> {
    let workflow = if anime {
        reelnodes::anime::pipeline()
    } else {
        reelnodes::novel_pipeline()
    };

    std::fs::write(&output, workflow.to_json()?)?;

    println!("✨ Created workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  reel run --file {} --input '{{\"title\": \"My Novel\"}}'",
        output.display()
    );

    Ok(())
}
