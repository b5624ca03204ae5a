//! HomeyPro MCP Server - command line entry point
//!
//! Reads configuration from `HOMEY_*` environment variables and queries the
//! controller through the cached, paginated query facade.

use homey_mcp_rust::{
    build_query_facade,
    config::{LogFormat, ServerConfig},
    logging::init_logging,
    server::tool_registry::ToolTable,
    HomeyError, ResourceKind, Result,
};

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing::{error, info, warn};

/// HomeyPro MCP Server
#[derive(Parser, Debug)]
#[command(name = "homey-mcp-server")]
#[command(about = "Cached, paginated access to a HomeyPro controller")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Log output format (compact or json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read one page of a resource (key or homey:// URI)
    Query {
        resource: String,

        /// Cursor from a previous page's next_cursor
        #[arg(long)]
        cursor: Option<String>,

        /// Follow cursors and print every item
        #[arg(long, conflicts_with = "cursor")]
        all: bool,
    },
    /// List available resources
    Resources,
    /// List tools enabled by HOMEY_ENABLED_TOOLS / HOMEY_DISABLED_TOOLS
    Tools,
}

impl Cli {
    fn resource_key(resource: &str) -> &str {
        ResourceKind::from_uri(resource)
            .map(|kind| kind.key())
            .unwrap_or(resource)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = ServerConfig::from_env();
    let mut logging = loaded
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_default();
    if let Some(format) = cli.log_format {
        logging.format = format;
    }

    let _guard = match init_logging(&logging, cli.debug) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli, loaded).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            println!(
                "{}",
                serde_json::to_string_pretty(&e.to_api_error()).unwrap_or_else(|_| e.to_string())
            );
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, loaded: Result<ServerConfig>) -> Result<()> {
    match cli.command {
        Command::Query {
            resource,
            cursor,
            all,
        } => {
            let config = loaded?;
            info!("HomeyPro API: {}", config.homey.url);

            let facade = build_query_facade(&config)?;
            let key = Cli::resource_key(&resource);
            let page = if all {
                facade.get_all(key).await?
            } else {
                facade.get(key, cursor.as_deref()).await?
            };

            if page.stale {
                warn!("{} served from cache after a failed refresh", key);
            }
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        Command::Resources => {
            let config = config_or_default(loaded);
            let listing: Vec<_> = ResourceKind::ALL
                .iter()
                .map(|kind| {
                    serde_json::json!({
                        "key": kind.key(),
                        "uri": kind.uri(),
                        "name": kind.name(),
                        "description": kind.description(),
                        "ttl_seconds": config.cache.ttl_for(*kind).as_secs(),
                        "paginated": kind.is_collection(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Command::Tools => {
            let config = config_or_default(loaded);
            let table = ToolTable::from_config(&config.tools);
            let listing = serde_json::json!({
                "mode": table.mode(),
                "tools": table.iter().collect::<Vec<_>>(),
                "unknown": table.unknown_names(),
            });
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
    }

    Ok(())
}

/// Listing commands work without a reachable controller
fn config_or_default(loaded: Result<ServerConfig>) -> ServerConfig {
    loaded.unwrap_or_else(|e: HomeyError| {
        warn!("Using default configuration: {}", e);
        ServerConfig::default()
    })
}
