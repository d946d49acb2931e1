//! Offline connector-graph check.
//!
//! A layout file maps each component to the connectors it announces:
//!
//! ```json
//! {
//!   "stringHub#1001": ["stringHit:o", "rdoutReq:i"],
//!   "eventBuilder": ["glblTrig:i", "rdoutReq:o"]
//! }
//! ```
//!
//! The descriptor after `:` is `i`/`o` for required and `I`/`O` for
//! optional connectors.

use clap::Args;
use cnc::component::{
    ComponentName, ComponentProxy, ComponentRpc, Connection, Connector, RpcError, RpcResult,
};
use cnc::config::CncConfig;
use cnc::connection::ConnectionMap;
use cnc::logging::{init_logging, DEFAULT_LOG_FILE};
use cnc::run_config::{JsonRunConfigs, RunConfigSource};
use cnc::value::BeanValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::CliError;

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Component layout file (JSON)
    layout: PathBuf,

    /// Only check the components of this run configuration
    #[arg(long)]
    run_config: Option<String>,

    /// Directory holding run configurations (default: from the config file)
    #[arg(long)]
    run_config_dir: Option<PathBuf>,
}

/// Transport for components that are only being laid out, never called.
struct Detached;

impl ComponentRpc for Detached {
    fn configure(&self, _: Option<&str>) -> RpcResult<BeanValue> {
        Err(RpcError::Unsupported("configure"))
    }

    fn connect(&self, _: &[Connection]) -> RpcResult<BeanValue> {
        Err(RpcError::Unsupported("connect"))
    }

    fn start_run(&self, _: u32) -> RpcResult<BeanValue> {
        Err(RpcError::Unsupported("startRun"))
    }

    fn stop_run(&self) -> RpcResult<BeanValue> {
        Err(RpcError::Unsupported("stopRun"))
    }

    fn forced_stop(&self) -> RpcResult<BeanValue> {
        Err(RpcError::Unsupported("forcedStop"))
    }

    fn reset(&self) -> RpcResult<BeanValue> {
        Err(RpcError::Unsupported("reset"))
    }

    fn get_state(&self) -> RpcResult<String> {
        Err(RpcError::Unsupported("getState"))
    }

    fn get_run_data(&self, _: u32) -> RpcResult<BeanValue> {
        Err(RpcError::Unsupported("getRunData"))
    }

    fn terminate(&self) -> RpcResult<BeanValue> {
        Err(RpcError::Unsupported("terminate"))
    }
}

/// Run the check subcommand.
pub fn run(args: CheckArgs, config_path: &Path) -> Result<(), CliError> {
    let config = CncConfig::load_from(config_path)?;
    let _guard = init_logging(&config.paths.log_dir, DEFAULT_LOG_FILE)
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;

    let mut layout = read_layout(&args.layout)?;
    debug!(path = %args.layout.display(), components = layout.len(), "Loaded layout");

    if let Some(name) = &args.run_config {
        let dir = args
            .run_config_dir
            .or(config.paths.run_config_dir)
            .ok_or_else(|| CliError::Layout("no run configuration directory given".into()))?;
        let run_config = JsonRunConfigs::new(dir).load(name)?;
        let missing: Vec<String> = run_config
            .components()
            .iter()
            .filter(|c| !layout.contains_key(*c))
            .map(ComponentName::full_name)
            .collect();
        if !missing.is_empty() {
            return Err(CliError::MissingComponents(missing));
        }
        layout.retain(|name, _| run_config.has_component(name));
    }

    let rpc: Arc<dyn ComponentRpc> = Arc::new(Detached);
    let proxies: Vec<Arc<ComponentProxy>> = layout
        .into_iter()
        .map(|(name, connectors)| {
            Arc::new(ComponentProxy::new(name, Arc::clone(&rpc)).with_connectors(connectors))
        })
        .collect();

    let map = ConnectionMap::build(&proxies)?;
    info!(components = proxies.len(), edges = map.edges().len(), "Connector graph is valid");

    println!("Start order:");
    for (idx, tier) in map.start_tiers().iter().enumerate() {
        let names: Vec<String> = tier.iter().map(|c| c.full_name()).collect();
        println!("  {}: {}", idx, names.join(" "));
    }
    println!();
    println!("Connections:");
    for edge in map.edges() {
        println!("  {} -> {} ({})", edge.from, edge.to, edge.conn_type);
    }
    Ok(())
}

fn read_layout(path: &Path) -> Result<BTreeMap<ComponentName, Vec<Connector>>, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::Layout(format!("{}: {}", path.display(), e)))?;
    parse_layout(&text)
}

fn parse_layout(text: &str) -> Result<BTreeMap<ComponentName, Vec<Connector>>, CliError> {
    let raw: BTreeMap<String, Vec<String>> =
        serde_json::from_str(text).map_err(|e| CliError::Layout(e.to_string()))?;

    let mut layout = BTreeMap::new();
    for (name, descriptors) in raw {
        let name: ComponentName = name.parse().map_err(CliError::Layout)?;
        let connectors = descriptors
            .iter()
            .map(|d| parse_connector(d))
            .collect::<Result<Vec<_>, _>>()?;
        if layout.insert(name.clone(), connectors).is_some() {
            return Err(CliError::Layout(format!("{} is listed twice", name)));
        }
    }
    Ok(layout)
}

fn parse_connector(descriptor: &str) -> Result<Connector, CliError> {
    let bad = || CliError::Layout(format!("bad connector '{}'", descriptor));
    let (name, kind) = descriptor.rsplit_once(':').ok_or_else(bad)?;
    let mut chars = kind.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if !name.is_empty() => Connector::from_descriptor(name, c).ok_or_else(bad),
        _ => Err(bad()),
    }
}
