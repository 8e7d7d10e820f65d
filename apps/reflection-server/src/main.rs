use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use grpc_hub::{GrpcHub, GrpcHubConfig, ReadySignal};
use mimalloc::MiMalloc;
use reflection_bootstrap::{AppConfig, CliArgs};
use server_reflection::{ServerReflectionConfig, ServerReflectionModule};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use std::path::PathBuf;
use std::sync::Arc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Reflection Server - answers gRPC server reflection queries for a fixed descriptor set
#[derive(Parser)]
#[command(name = "reflection-server")]
#[command(about = "Reflection Server - gRPC server reflection for a fixed descriptor set")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port override for the gRPC listener (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Start the server
    Run,
    /// Load every descriptor set, report what was indexed and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        port: cli.port,
        verbose: cli.verbose,
    };

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (APP__*) -> 4) CLI overrides
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.clone().unwrap_or_default();
    reflection_bootstrap::init_logging(&logging_config, config.home_dir());

    tracing::info!(home_dir = %config.home_dir().display(), "Reflection Server starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(config).await,
        Commands::Check => check_config(&config),
    }
}

fn load_module(config: &AppConfig, shutdown: CancellationToken) -> Result<ServerReflectionModule> {
    let module_cfg: ServerReflectionConfig = config.module_config("server_reflection")?;
    ServerReflectionModule::init(module_cfg, config.home_dir(), shutdown)
        .context("failed to build the descriptor index")
}

async fn run_server(config: AppConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    let module = load_module(&config, cancel.clone())?;

    let hub_cfg: GrpcHubConfig = config.module_config("grpc_hub")?;
    let hub = Arc::new(GrpcHub::from_config(&hub_cfg, config.listen_addr()?)?);
    hub.installer_store().set(module.grpc_services())?;

    let signals = tokio::spawn(reflection_bootstrap::cancel_on_shutdown(cancel.clone()));

    let (ready_tx, ready_rx) = oneshot::channel();
    tokio::spawn(async move {
        if let Ok(addr) = ready_rx.await {
            tracing::info!(%addr, "reflection endpoint ready");
        }
    });

    let result = hub.serve(cancel.clone(), ReadySignal::from_sender(ready_tx)).await;

    // Server may stop on its own (bind failure); release the signal watcher either way.
    cancel.cancel();
    if let Ok(Err(e)) = signals.await {
        tracing::warn!(error = %e, "signal handling failed");
    }

    result
}

fn check_config(config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration…");
    let module = load_module(config, CancellationToken::new())?;
    let index = module.state().index();

    println!("Configuration is valid");
    println!(
        "Indexed {} files, {} symbols, {} services",
        index.file_count(),
        index.symbol_count(),
        index.services().len()
    );
    for service in index.services() {
        println!("  {service}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommand_and_overrides() {
        let cli = Cli::try_parse_from(["reflection-server", "-vv", "--port", "6000", "check"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.port, Some(6000));
        assert_eq!(cli.command, Some(Commands::Check));
    }

    #[test]
    fn test_check_indexes_reflection_service_by_default() {
        let config = AppConfig::default();
        let module = load_module(&config, CancellationToken::new()).unwrap();

        let services = module.state().index().services();
        assert!(services
            .iter()
            .any(|s| s == "grpc.reflection.v1.ServerReflection"));
        assert!(check_config(&config).is_ok());
    }

    #[test]
    fn test_missing_descriptor_set_fails_check() {
        let mut config = AppConfig::default();
        config.modules.insert(
            "server_reflection".to_string(),
            serde_json::json!({ "config": { "descriptor_sets": ["/nonexistent/api.binpb"] } }),
        );
        assert!(load_module(&config, CancellationToken::new()).is_err());
    }
}
