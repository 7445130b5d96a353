//! CLI Tooling
//!
//! `stitch build` resolves a root once and prints its dependency-first order;
//! `stitch watch` keeps it current until interrupted.

use crate::config::{ConfigLoader, StitchConfig, WatchBackend};
use crate::error::ApiError;
use crate::handlers::builtin_registry;
use crate::io::TokioFileReader;
use crate::live::LiveRebuildController;
use crate::tree::hasher::short_hex;
use crate::tree::path::working_dir;
use crate::tree::{DedupPolicy, Flattener, GraphBuilder, Node, NodeResolver, TreeSnapshot};
use crate::types::Descriptor;
use crate::watch::{FileNotifier, NotifyNotifier, PollingNotifier, WatchRegistry};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Stitch CLI - dependency-ordered artifact builds
#[derive(Parser, Debug)]
#[command(name = "stitch")]
#[command(about = "Resolve artifacts into dependency-first order and rebuild them on change")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve a root and print its flattened order
    Build {
        /// Root artifact, relative to the workspace
        root: String,
        /// Declared type of the root
        #[arg(long = "type", default_value = "markup")]
        kind: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        #[arg(long, value_enum, default_value_t = DedupArg::PerPath)]
        dedup: DedupArg,
    },
    /// Rebuild a root whenever one of its files changes
    Watch {
        root: String,
        #[arg(long = "type", default_value = "markup")]
        kind: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DedupArg {
    PerPath,
    Once,
}

impl From<DedupArg> for DedupPolicy {
    fn from(arg: DedupArg) -> Self {
        match arg {
            DedupArg::PerPath => DedupPolicy::PerPath,
            DedupArg::Once => DedupPolicy::Once,
        }
    }
}

/// Loaded configuration plus the runtime commands execute on.
pub struct CliContext {
    workspace_root: PathBuf,
    config: StitchConfig,
    runtime: tokio::runtime::Runtime,
}

impl CliContext {
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let workspace_root = if workspace_root.is_absolute() {
            workspace_root
        } else {
            working_dir()?.join(workspace_root)
        };
        let config = match &config_path {
            Some(path) => ConfigLoader::load_from_file(path).map_err(|e| {
                ApiError::ConfigError(format!(
                    "Failed to load config from {}: {}",
                    path.display(),
                    e
                ))
            })?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            workspace_root,
            config,
            runtime,
        })
    }

    pub fn config(&self) -> &StitchConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut StitchConfig {
        &mut self.config
    }

    pub fn workspace_root(&self) -> &PathBuf {
        &self.workspace_root
    }

    /// Execute a CLI command, returning its final output.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Build {
                root,
                kind,
                format,
                dedup,
            } => {
                let descriptor = Descriptor::named(root.as_str(), kind.as_str());
                let builder = self.graph_builder();
                let snapshot = self.runtime.block_on(builder.add_root(descriptor));
                Ok(format_snapshot(&snapshot, (*dedup).into(), *format, None))
            }
            Commands::Watch { root, kind, format } => {
                let descriptor = Descriptor::named(root.as_str(), kind.as_str());
                self.runtime.block_on(self.watch(descriptor, *format))
            }
        }
    }

    fn graph_builder(&self) -> Arc<GraphBuilder> {
        let resolver_config = &self.config.resolver;
        let handlers = builtin_registry(
            &resolver_config.directive_prefix,
            &resolver_config.directive_types,
            &resolver_config.text_types,
        );
        let resolver = NodeResolver::new(
            Arc::new(handlers),
            Arc::new(TokioFileReader),
            resolver_config.options(&self.workspace_root),
        );
        Arc::new(GraphBuilder::new(Arc::new(resolver)))
    }

    fn notifier(&self) -> Result<Arc<dyn FileNotifier>, ApiError> {
        Ok(match self.config.watch.backend {
            WatchBackend::Poll => Arc::new(PollingNotifier::with_handle(
                self.runtime.handle().clone(),
            )),
            WatchBackend::Notify => Arc::new(NotifyNotifier::new()?),
        })
    }

    async fn watch(&self, root: Descriptor, format: OutputFormat) -> Result<String, ApiError> {
        let registry = Arc::new(WatchRegistry::new(
            self.notifier()?,
            self.config.watch.interval(),
        ));
        let controller = LiveRebuildController::new(self.graph_builder(), registry)?;
        let id = controller.watch(
            root.clone(),
            move |snapshot: Arc<TreeSnapshot>, changed: Option<Arc<Node>>| {
                println!(
                    "{}",
                    format_snapshot(&snapshot, DedupPolicy::PerPath, format, changed.as_deref())
                );
            },
        )?;
        info!(root = %root.name, backend = ?self.config.watch.backend, "Watching; press Ctrl-C to stop");

        tokio::signal::ctrl_c().await?;
        controller.unwatch(&root, id);
        controller.dispose();
        Ok("Watch stopped".to_string())
    }
}

/// Render one snapshot's flattened order.
pub fn format_snapshot(
    snapshot: &TreeSnapshot,
    policy: DedupPolicy,
    format: OutputFormat,
    changed: Option<&Node>,
) -> String {
    let order = Flattener::new(policy).flatten(snapshot);
    match format {
        OutputFormat::Text => format_order_text(snapshot, &order, changed),
        OutputFormat::Json => format_order_json(snapshot, &order, changed),
    }
}

fn format_order_text(snapshot: &TreeSnapshot, order: &[Arc<Node>], changed: Option<&Node>) -> String {
    let mut lines = Vec::with_capacity(order.len() + 2);
    let header = format!(
        "{} (generation {}, {} nodes)",
        snapshot.root().label(),
        snapshot.generation(),
        order.len()
    );
    lines.push(header);
    if let Some(node) = changed {
        lines.push(format!("changed: {}", node.label()));
    }
    for (index, node) in order.iter().enumerate() {
        let status = match &node.error {
            Some(e) => format!("error: {}", e),
            None => node
                .content_hash
                .as_ref()
                .map(short_hex)
                .unwrap_or_else(|| "-".to_string()),
        };
        lines.push(format!(
            "{:>4}  {:<10} {}  {}",
            index + 1,
            node.kind,
            node.label(),
            status
        ));
    }
    lines.join("\n")
}

fn format_order_json(snapshot: &TreeSnapshot, order: &[Arc<Node>], changed: Option<&Node>) -> String {
    let nodes: Vec<_> = order
        .iter()
        .map(|node| {
            json!({
                "name": node.name,
                "kind": node.kind,
                "path": node.path.as_ref().map(|p| p.display().to_string()),
                "hash": node.content_hash.as_ref().map(hex::encode),
                "error": node.error.as_ref().map(|e| e.to_string()),
            })
        })
        .collect();
    let out = json!({
        "root": snapshot.root().label(),
        "generation": snapshot.generation(),
        "changed": changed.map(|n| n.label()),
        "errors": snapshot.errors().len(),
        "order": nodes,
    });
    serde_json::to_string_pretty(&out).unwrap_or_else(|_| out.to_string())
}
