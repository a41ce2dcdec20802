use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use quiesce::{
    adapters::{AppState, build_router, command_hooks, http_server, tracking_listener},
    config::{ServerConfigValidator, loader::load_config},
    core::ShutdownCoordinator,
    tracing_setup,
    utils::signal_handler,
};
use tracing::Instrument;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Start the server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve_command(&config).await,
        None => serve_command(&args.config).await, // Default to serve with config from args
    }
}

/// Run the server until a shutdown signal arrives, then exit with the code
/// the shutdown outcome maps to.
async fn serve_command(config_path: &str) -> Result<()> {
    let config = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    ServerConfigValidator::validate(&config)
        .with_context(|| format!("Invalid configuration in {config_path}"))?;

    tracing_setup::init_from_config(&config.logging)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;
    tracing::info!("Loaded configuration from {config_path}");

    let coordinator = Arc::new(
        ShutdownCoordinator::from_config(&config.shutdown, command_hooks(&config.shutdown.hooks))
            .context("Failed to create shutdown coordinator")?,
    );

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;
    let listener = tracking_listener::bind(addr, coordinator.clone())
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    let router = build_router(AppState {
        coordinator: coordinator.clone(),
        response_delay: Duration::from_millis(config.response_delay_ms),
    });

    coordinator.set_accepting(true);
    tracing::info!(
        "Server listening on {} (grace period {}, {} shutdown hook(s))",
        addr,
        humantime::format_duration(coordinator.timeout()),
        coordinator.hook_count()
    );

    let server = tokio::spawn(async move {
        if let Err(e) = http_server::serve(listener, router).await {
            tracing::error!("Server error: {}", e);
        }
    });

    // The server keeps answering in-flight requests while the coordinator drains.
    let signal_span = tracing_setup::configure_component_tracing("signal_handler");
    let exit_code = signal_handler::run_signal_handler(coordinator.clone())
        .instrument(signal_span)
        .await?;

    server.abort();
    tracing::info!("Exiting with code {}", exit_code);
    std::process::exit(exit_code);
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match ServerConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!(
                "   • Grace Period: {}",
                humantime::format_duration(Duration::from_millis(
                    config.shutdown.timeout_ms.unsigned_abs()
                ))
            );
            println!("   • Shutdown Hooks: {}", config.shutdown.hooks.len());
            for hook in &config.shutdown.hooks {
                println!("       - {} ({})", hook.display_name(), hook.command);
            }
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Verify listen address format (e.g., '127.0.0.1:3000')");
            println!("   • Use a non-negative shutdown.timeout_ms");
            println!("   • Give every shutdown hook a command");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Quiesce server configuration

# The address to listen on
listen_addr = "127.0.0.1:8080"

# Delay before the demo handler answers (milliseconds)
response_delay_ms = 0

[shutdown]
# Grace period for open connections to drain (milliseconds)
timeout_ms = 30000

# Commands run in order once draining finishes or times out
# [[shutdown.hooks]]
# name = "flush-cache"
# command = "sync"
# args = []

[logging]
level = "info"
json = true
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'quiesce serve --config {config_path}' to start the server");
    Ok(())
}
