use std::{path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use keel::{
    Kernel, KernelBuilder,
    adapters::HttpHandler,
    config::{ServerConfig, ServerConfigValidator, loader::load_config},
    modules::SystemModule,
    tracing_setup,
    utils::graceful_shutdown::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.yaml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Start the kernel behind the HTTP adapter (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config.yaml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Serve { config }) => serve_command(&config).await,
        None => serve_command(&args.config).await,
    }
}

async fn serve_command(config_path: &str) -> Result<()> {
    let config = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    ServerConfigValidator::validate(&config).map_err(|e| eyre!("{e}"))?;

    tracing_setup::init_tracing_with_config(
        &config.logging.level,
        config.logging.json,
        config.logging.include_spans,
    )
    .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    tracing::info!("Loaded configuration from {config_path}");

    let kernel = build_kernel(&config).await?;

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        signal_handler_shutdown.run_signal_handler().await;
    });

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.listen_addr))?;

    let server_shutdown = graceful_shutdown.clone();
    let server = HttpHandler::new(Arc::new(kernel)).serve(listener, async move {
        server_shutdown.wait_for_shutdown_signal().await;
    });
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => result?,
        reason = graceful_shutdown.wait_for_shutdown_signal() => {
            tracing::info!(
                "Shutdown requested ({:?}), draining connections for up to {:?}",
                reason,
                graceful_shutdown.drain_timeout()
            );
            match tokio::time::timeout(graceful_shutdown.drain_timeout(), &mut server).await {
                Ok(result) => result?,
                Err(_) => tracing::warn!("Drain timeout elapsed, forcing shutdown"),
            }
        }
    }

    tracing::info!("Keel shut down");
    Ok(())
}

async fn build_kernel(config: &ServerConfig) -> Result<Kernel> {
    let mut builder = KernelBuilder::new();
    if let Some(timeout) = config.request_timeout()? {
        builder = builder.request_timeout(timeout);
    }

    let mut kernel = builder.build();
    kernel
        .init(Arc::new(SystemModule::new()), config.parameters.clone())
        .await
        .wrap_err("Failed to initialize kernel")?;

    tracing::info!(
        modules = ?kernel.module_keynames(),
        routes = kernel.router().map(|router| router.route_count()).unwrap_or_default(),
        "Kernel initialized"
    );
    Ok(kernel)
}

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
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    match ServerConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Log Level: {}", config.logging.level);
            println!(
                "   • Request Timeout: {}",
                config.request_timeout.as_deref().unwrap_or("none")
            );
            println!("   • Module Parameters: {}", config.parameters.len());
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
