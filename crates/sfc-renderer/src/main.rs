//! sfc-renderer entry point.
//!
//! Renders the paths of a scenario file into an in-memory flow store and
//! prints the resulting flows as JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use sfc_renderer::audit::{init_logging, AuditCategory, AuditOutcome, AuditRecord};
use sfc_renderer::audit_log;
use sfc_renderer::model::{ModelSnapshot, PathId};
use sfc_renderer::opstate::log_operational_events;
use sfc_renderer::placement::StaticPlacementConfig;
use sfc_renderer::{
    ChannelOperationalSink, InMemoryFlowSink, InMemoryModel, RenderedServicePath, RendererConfig,
    RspRenderer, StaticPlacementResolver,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

/// SFC flow renderer
#[derive(Parser, Debug)]
#[command(name = "sfc-renderer")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render every path of a scenario and print the committed flows
    Render {
        /// Scenario file (YAML) with model, placements and paths
        #[arg(short, long)]
        scenario: PathBuf,

        /// Renderer configuration file (YAML, or JSON with a .json extension)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Delete this path after rendering; may be repeated
        #[arg(long = "delete", value_name = "PATH_ID")]
        delete: Vec<PathId>,
    },
}

#[derive(Debug, Deserialize)]
struct Scenario {
    #[serde(default)]
    model: ModelSnapshot,
    #[serde(default)]
    placements: StaticPlacementConfig,
    paths: Vec<RenderedServicePath>,
}

impl Scenario {
    fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        serde_yaml::from_str(&content).with_context(|| format!("invalid scenario {}", path.display()))
    }
}

fn load_config(path: &Path) -> Result<RendererConfig> {
    let record = AuditRecord::new(AuditCategory::ConfigurationChange, "sfc-renderer", "load_config")
        .with_object_id(path.display().to_string())
        .with_object_type("config_file");
    match RendererConfig::from_file(path) {
        Ok(config) => {
            audit_log!(record
                .with_outcome(AuditOutcome::Success)
                .with_details(serde_json::json!({
                    "table_offset": config.table_offset,
                    "app_egress_table": config.app_egress_table,
                })));
            Ok(config)
        }
        Err(e) => {
            audit_log!(record.with_error(e.to_string()));
            Err(e).with_context(|| format!("failed to load configuration {}", path.display()))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level, args.json_logs);

    match run(args.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "sfc-renderer failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<()> {
    let Command::Render {
        scenario,
        config,
        delete,
    } = command;

    let config = match config {
        Some(path) => load_config(&path)?,
        None => RendererConfig::default(),
    };
    let scenario = Scenario::load(&scenario)?;
    info!(paths = scenario.paths.len(), "Loaded scenario");

    let sink = Arc::new(InMemoryFlowSink::new());
    let (opstate, events) = ChannelOperationalSink::new();
    let logger = tokio::spawn(log_operational_events(events));

    let renderer = RspRenderer::new(
        config,
        Arc::new(InMemoryModel::from(scenario.model)),
        sink.clone(),
    )
    .with_placement_resolver(Arc::new(StaticPlacementResolver::from(scenario.placements)))
    .with_operational_sink(Arc::new(opstate));

    let paths = scenario.paths;
    let failures = tokio::task::spawn_blocking(move || {
        let mut failures = 0usize;
        for rsp in &paths {
            if renderer.render(rsp).is_err() {
                failures += 1;
            }
        }
        for path_id in &delete {
            match paths.iter().find(|p| p.path_id == *path_id) {
                Some(rsp) => {
                    if renderer.delete_rendered_service_path(rsp).is_err() {
                        failures += 1;
                    }
                }
                None => warn!(path_id, "No such path in scenario, nothing to delete"),
            }
        }
        info!(stats = ?renderer.stats(), "Render run complete");
        failures
    })
    .await
    .context("render task panicked")?;

    let events = logger.await.context("operational state logger panicked")?;
    info!(events, "Drained operational state events");

    let flows = sink.flows();
    println!("{}", serde_json::to_string_pretty(&flows)?);

    if failures > 0 {
        anyhow::bail!("{failures} operation(s) failed");
    }
    Ok(())
}
