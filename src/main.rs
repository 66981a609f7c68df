//! WolfBrowse - Object Store File Browser Gateway
//!
//! Serves a directory as a browsable object store over HTTP.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfbrowse::config::WolfBrowseConfig;
use wolfbrowse::error::Result;
use wolfbrowse::gateway::GatewayServer;

/// WolfBrowse - Object Store File Browser Gateway
#[derive(Parser)]
#[command(name = "wolfbrowse")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wolfbrowse.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway
    Serve {
        /// Address to listen on (overrides server.bind_address)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolfbrowse.toml")]
        output: PathBuf,

        /// Directory to expose
        #[arg(long, default_value = "/srv/wolfbrowse")]
        root: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Print the JSON listing of a directory
    Ls {
        /// Directory path, e.g. `docs/`
        #[arg(default_value = "")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind } => {
            run_serve(cli.config, cli.log_level, bind).await
        }
        Commands::Init { output, root } => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), "compact");
            run_init(output, root)
        }
        Commands::Validate => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), "compact");
            run_validate(cli.config)
        }
        Commands::Ls { path } => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), "compact");
            run_ls(cli.config, path).await
        }
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        "compact" => registry.with(tracing_subscriber::fmt::layer().compact()).init(),
        _ => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
    }
}

/// Load and validate the configuration, logging what went wrong
fn load_config(config_path: &Path) -> Result<WolfBrowseConfig> {
    match WolfBrowseConfig::from_file(config_path) {
        Ok(c) => Ok(c),
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            Err(e)
        }
    }
}

/// Start the gateway
async fn run_serve(config_path: PathBuf, log_level: Option<String>, bind: Option<String>) -> Result<()> {
    let mut config = WolfBrowseConfig::from_file(&config_path)?;
    let level = log_level.unwrap_or_else(|| config.logging.level.clone());
    init_logging(&level, &config.logging.format);

    if let Some(bind) = bind {
        config.server.bind_address = bind;
        config.validate()?;
    }

    tracing::info!("Starting WolfBrowse gateway...");
    tracing::info!("Serving {}", config.store.root.display());
    if !config.store.root.is_dir() {
        tracing::warn!("Store root {:?} is not a directory; every listing will be empty", config.store.root);
    }
    if let Some(prefix) = config.api_prefix() {
        tracing::info!("JSON listings under /{}/", prefix);
    }

    let server = GatewayServer::from_config(&config);
    server.start().await
}

/// Initialize a new configuration file
fn run_init(output: PathBuf, root: PathBuf) -> Result<()> {
    let config_content = format!(r#"# WolfBrowse Configuration
# Generated configuration file

[server]
bind_address = "0.0.0.0:8787"
# api_prefix = "api"
cors_enabled = true

[store]
root = "{root}"

[listing]
page_limit = 500
max_pages = 1000
rate_bucket = "list"

[files]
rate_bucket = "get"
# cache_control = "public, max-age=60"

[assets]
# dir = "/usr/share/wolfbrowse"

[access]
deny_prefixes = []
# deny_prefixes = [".git/", "private/"]

[[rate_limits]]
bucket = "list"
limit = 600
period_secs = 60

[[rate_limits]]
bucket = "get"
limit = 6000
period_secs = 60

[logging]
level = "info"
format = "pretty"
"#, root = root.display());

    // Fail before writing anything unusable
    WolfBrowseConfig::from_str(&config_content)?;

    std::fs::write(&output, config_content)?;
    println!("Configuration written to {:?}", output);
    println!("Edit the file to point [store] root at the directory to serve.");

    Ok(())
}

/// Validate configuration file
fn run_validate(config_path: PathBuf) -> Result<()> {
    match WolfBrowseConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Bind Address: {}", config.server.bind_address);
            println!("  Store Root:   {}", config.store.root.display());
            println!("  API Prefix:   {}", config.api_prefix().unwrap_or("(none, ?api only)"));
            println!("  Page Limit:   {}", config.listing.page_limit);
            println!("  Rate Limits:  {}", config.rate_limits.len());
            println!("  Deny List:    {:?}", config.access.deny_prefixes);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Print the JSON listing of a directory
async fn run_ls(config_path: PathBuf, path: String) -> Result<()> {
    let config = load_config(&config_path)?;

    let mut prefix = path.trim_start_matches('/').to_string();
    if !prefix.is_empty() && !prefix.ends_with('/') {
        prefix.push('/');
    }

    let server = GatewayServer::from_config(&config);
    let state = server.state();
    let snapshot = state
        .lister()
        .list_directory(&prefix, config.listing.page_limit)
        .await?;

    let json = serde_json::to_string_pretty(&snapshot)
        .map_err(|e| wolfbrowse::Error::Upstream(format!("failed to encode listing: {}", e)))?;
    println!("{}", json);

    Ok(())
}
