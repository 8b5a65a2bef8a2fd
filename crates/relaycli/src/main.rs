// crates/relaycli/src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use relaycore::{
    NodeStatus, NoopObserver, RunEvent, RunOutcome, Workflow, WorkflowError, WorkflowNode,
};
use relaynodes::{HttpRequestDefinition, InMemoryRequestStore, ReqwestSender, HTTP_REQUEST};
use relayruntime::{FlowRuntime, NodeRegistry, RuntimeConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Relay workflow runner", long_about = None)]
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

        /// JSON array of stored requests for http_request nodes
        #[arg(short, long)]
        requests: Option<PathBuf>,

        /// Runtime configuration JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,

        /// Also check that referenced stored requests exist
        #[arg(short, long)]
        requests: Option<PathBuf>,
    },

    /// List available node types
    Nodes,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,

        /// Where to write the stored requests used by the example
        #[arg(short, long, default_value = "requests.json")]
        requests: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            requests,
            config,
            verbose,
        } => {
            init_logging(if verbose { "debug" } else { "info" });
            run_workflow(file, requests, config).await?;
        }

        Commands::Validate { file, requests } => {
            init_logging("warn");
            validate_workflow(file, requests)?;
        }

        Commands::Nodes => {
            init_logging("warn");
            list_nodes()?;
        }

        Commands::Init { output, requests } => {
            create_example_workflow(output, requests)?;
        }
    }

    Ok(())
}

/// `RUST_LOG` wins over the default level
fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_workflow(file: &Path) -> Result<Workflow> {
    let workflow_json = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let workflow: Workflow = serde_json::from_str(&workflow_json)
        .with_context(|| format!("{} is not a valid workflow", file.display()))?;
    workflow.check_structure()?;
    Ok(workflow)
}

fn load_store(requests: Option<&Path>) -> Result<InMemoryRequestStore> {
    match requests {
        Some(path) => InMemoryRequestStore::from_json_file(path)
            .with_context(|| format!("failed to load requests from {}", path.display())),
        None => Ok(InMemoryRequestStore::new()),
    }
}

fn build_registry(store: InMemoryRequestStore) -> Result<NodeRegistry> {
    let mut registry = NodeRegistry::new();
    relaynodes::register_all(&mut registry, Arc::new(store), Arc::new(ReqwestSender::new()))?;
    Ok(registry)
}

async fn run_workflow(
    file: PathBuf,
    requests: Option<PathBuf>,
    config: Option<PathBuf>,
) -> Result<()> {
    println!("🚀 Loading workflow from: {}", file.display());

    let workflow = load_workflow(&file)?;

    println!("📋 Workflow: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Connectors: {}", workflow.connectors.len());
    println!();

    let config = match config {
        Some(path) => RuntimeConfig::from_json_file(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    let registry = build_registry(load_store(requests.as_deref())?)?;
    let runtime = FlowRuntime::with_registry(Arc::new(registry), config);

    // Subscribe before running so no transition is missed
    let mut events = runtime.subscribe_events();
    let event_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(RunEvent::RunStarted { run_id, .. }) => {
                    println!("▶️  Run {} started", run_id);
                }
                Ok(RunEvent::NodeStatusChanged { change, .. }) => match change.status {
                    NodeStatus::Running => println!("  ⚡ Node {} running", change.node_id),
                    NodeStatus::Completed => println!("  ✅ Node {} completed", change.node_id),
                    NodeStatus::Failed => println!(
                        "  ❌ Node {} failed: {}",
                        change.node_id,
                        change.error.as_deref().unwrap_or("unknown error")
                    ),
                    NodeStatus::Pending => {}
                },
                Ok(RunEvent::RunFinished { .. }) => break,
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Event listener fell behind, {} events dropped", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("🛑 Interrupted, cancelling run");
            on_interrupt.cancel();
        }
    });

    let report = runtime
        .run_with_cancellation(&workflow, &NoopObserver, cancel)
        .await;
    let _ = event_task.await;

    println!();
    println!("📊 Run Summary:");
    println!("   Run ID: {}", report.run_id);
    println!("   Elapsed: {:?}", report.elapsed);
    println!(
        "   Completed: {}/{} nodes, {} failed, {} not reached",
        report.count(NodeStatus::Completed),
        report.statuses.len(),
        report.count(NodeStatus::Failed),
        report.not_reached().len()
    );

    let with_outputs: Vec<&WorkflowNode> = workflow
        .nodes
        .iter()
        .filter(|n| report.outputs.get(&n.id).is_some_and(|o| !o.is_empty()))
        .collect();
    if !with_outputs.is_empty() {
        println!();
        println!("📤 Outputs:");
        for node in with_outputs {
            println!("   Node {}:", node.id);
            for (port, value) in report.outputs[&node.id].taken() {
                println!("     {}: {}", port, value.to_json());
            }
        }
    }

    match &report.outcome {
        RunOutcome::Finished => {
            println!("✨ Run finished");
            Ok(())
        }
        RunOutcome::Cancelled => bail!("run cancelled"),
        RunOutcome::Stalled { cycles, blocked } => {
            println!("💥 Run stalled");
            for cycle in cycles {
                println!("   cycle: {}", cycle.join(" -> "));
            }
            Err(WorkflowError::Stalled(blocked.clone()).into())
        }
    }
}

fn validate_workflow(file: PathBuf, requests: Option<PathBuf>) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());

    let workflow = load_workflow(&file)?;
    let store = load_store(requests.as_deref())?;

    let mut missing_requests = Vec::new();
    if requests.is_some() {
        for node in workflow.nodes.iter().filter(|n| n.node_type == HTTP_REQUEST) {
            let request = node.parameters.get("request").and_then(|v| v.as_str());
            if !request.is_some_and(|id| store.ids().contains(&id)) {
                missing_requests.push(format!(
                    "node {} references unknown request {}",
                    node.id,
                    request.unwrap_or("(none)")
                ));
            }
        }
    }

    let registry = build_registry(store)?;
    let report = relayruntime::graph::validate(&workflow, &registry)?;

    println!("✅ Workflow is valid:");
    println!("   Name: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Connectors: {}", workflow.connectors.len());
    for warning in report.warnings.iter().chain(&missing_requests) {
        println!("   ⚠️  {}", warning);
    }

    Ok(())
}

fn list_nodes() -> Result<()> {
    println!("📦 Available Node Types:");
    println!();

    let registry = build_registry(InMemoryRequestStore::new())?;

    for spec in registry.list() {
        let ports = |defs: Vec<relaycore::PortDefinition>| {
            defs.into_iter().map(|p| p.name).collect::<Vec<_>>().join(", ")
        };
        println!("  • {}", spec.node_type());
        println!("    {}", spec.description());
        println!("    inputs: [{}]  outputs: [{}]", ports(spec.inputs()), ports(spec.outputs()));
    }

    Ok(())
}

fn create_example_workflow(output: PathBuf, requests: PathBuf) -> Result<()> {
    let mut workflow = Workflow::new("Example HTTP Workflow");
    workflow.description = Some("Sends a stored request and logs the outcome".to_string());

    let start_id = workflow.add_node(
        WorkflowNode::new("start")
            .with_name("Start")
            .with_position(100.0, 100.0),
    )?;
    let http_id = workflow.add_node(
        WorkflowNode::new(HTTP_REQUEST)
            .with_name("Fetch Zen")
            .with_parameter("request", "zen")
            .with_position(300.0, 100.0),
    )?;
    let ok_id = workflow.add_node(
        WorkflowNode::new("log")
            .with_name("Log Response")
            .with_parameter("message", "request succeeded")
            .with_position(500.0, 50.0),
    )?;
    let fail_id = workflow.add_node(
        WorkflowNode::new("log")
            .with_name("Log Failure")
            .with_parameter("message", "request failed")
            .with_position(500.0, 150.0),
    )?;

    workflow.connect(&start_id, "start", &http_id, "send")?;
    workflow.connect(&http_id, "success", &ok_id, "in")?;
    workflow.connect(&http_id, "fail", &fail_id, "in")?;

    let stored = vec![HttpRequestDefinition::new("zen", "GET", "https://api.github.com/zen")
        .with_header("user-agent", "relay")];

    std::fs::write(&output, serde_json::to_string_pretty(&workflow)?)?;
    std::fs::write(&requests, serde_json::to_string_pretty(&stored)?)?;

    println!("✨ Created example workflow: {}", output.display());
    println!("   Stored requests: {}", requests.display());
    println!();
    println!("Run it with:");
    println!(
        "  relay run --file {} --requests {}",
        output.display(),
        requests.display()
    );

    Ok(())
}
