use anyhow::{bail, Context, Result};
use babysitter::dispatch::CommandDispatcher;
use babysitter::gate::{AutoApproveGate, ConsoleGate};
use babysitter::registry::ProcessRegistry;
use babysitter::runtime::Runner;
use babysitter_sdk::{log_file_saved, log_info, log_warning, AgentDispatcher, ApprovalGate};
use chrono::Local;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

#[derive(Parser)]
#[command(
    name = "babysitter",
    about = "Run agent process plans with schema-validated task results and approval gates"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered processes
    List,
    /// Run a process
    Run {
        /// Process id to run
        #[arg(long)]
        process: String,
        /// Inputs as a JSON literal or a path to a JSON file
        #[arg(long)]
        inputs: Option<String>,
        /// Base directory for run state (a timestamped subdirectory is created)
        #[arg(long, default_value = "./runs")]
        run_dir: String,
        /// Agent command line, e.g. "claude --print" (or BABYSITTER_AGENT_CMD)
        #[arg(long)]
        agent_cmd: Option<String>,
        /// Approve breakpoints without prompting
        #[arg(long)]
        approve: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let registry = ProcessRegistry::builtin();

    match cli.command {
        Commands::List => {
            for meta in registry.list() {
                println!("\x1b[1m{}\x1b[0m — {}", meta.id, meta.name);
                println!("  {}", meta.description);
            }
            Ok(())
        }
        Commands::Run {
            process,
            inputs,
            run_dir,
            agent_cmd,
            approve,
        } => run_process(&registry, &process, inputs, &run_dir, agent_cmd, approve).await,
    }
}

async fn run_process(
    registry: &ProcessRegistry,
    process_id: &str,
    inputs: Option<String>,
    run_base: &str,
    agent_cmd: Option<String>,
    approve: bool,
) -> Result<()> {
    let inputs = load_inputs(inputs.as_deref()).await?;
    registry.validate_inputs(process_id, &inputs)?;
    let process = registry
        .get(process_id)
        .with_context(|| format!("process '{}' is not registered", process_id))?;

    let agent_cmd = match agent_cmd.or_else(|| std::env::var("BABYSITTER_AGENT_CMD").ok()) {
        Some(cmd) => cmd,
        None => bail!("No agent command configured; pass --agent-cmd or set BABYSITTER_AGENT_CMD"),
    };
    let dispatcher: Arc<dyn AgentDispatcher> =
        Arc::new(CommandDispatcher::from_command_line(&agent_cmd)?);

    let gate: Arc<dyn ApprovalGate> = if approve {
        log_warning!("Breakpoints will be approved automatically");
        Arc::new(AutoApproveGate)
    } else {
        Arc::new(ConsoleGate)
    };

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let run_dir = PathBuf::from(run_base).join(format!("run_{}", timestamp));
    log_info!("Run directory: {}", run_dir.display());

    let runner = Runner::new(dispatcher, gate);
    let report = runner.run(process.as_ref(), inputs, &run_dir).await?;

    let report_path = run_dir.join("report.json");
    let mut json = serde_json::to_string_pretty(&report)?;
    json.push('\n');
    fs::write(&report_path, json)
        .await
        .with_context(|| format!("Failed to write {}", report_path.display()))?;
    log_file_saved!(report_path.display());

    if report.success {
        log_info!(
            "Run {} completed in {}ms with {} artifacts",
            report.run_id,
            report.duration_ms,
            report.artifacts.len()
        );
        Ok(())
    } else {
        let error = report.error.as_deref().unwrap_or("unknown failure");
        eprintln!("\x1b[31m✗ Run failed: {}\x1b[0m", error);
        std::process::exit(1);
    }
}

/// Read inputs from a JSON file if the value is a path, else parse it as a
/// JSON literal; defaults to an empty object
async fn load_inputs(raw: Option<&str>) -> Result<Value> {
    let raw = match raw {
        Some(raw) => raw,
        None => return Ok(Value::Object(Default::default())),
    };

    let text = if Path::new(raw).is_file() {
        fs::read_to_string(raw)
            .await
            .with_context(|| format!("Failed to read inputs file: {}", raw))?
    } else {
        raw.to_string()
    };

    serde_json::from_str(&text).context("Inputs must be a JSON object")
}
