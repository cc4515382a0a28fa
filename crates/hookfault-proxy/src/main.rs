use anyhow::Context;
use clap::{Parser, ValueEnum};
use hookfault_proxy::config::Config;
use hookfault_proxy::proxy::ProxyServer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "hookfault-proxy",
    version,
    about = "Reverse proxy that injects simulated failures into webhook traffic"
)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "HOOKFAULT_CONFIG")]
    config: Option<String>,

    /// Listen port, overrides the config file
    #[arg(short, long, env = "HOOKFAULT_PORT")]
    port: Option<u16>,

    #[arg(long, env = "HOOKFAULT_PRIMARY_BACKEND")]
    primary_backend: Option<String>,

    #[arg(long, env = "HOOKFAULT_ROUTING_BACKEND")]
    routing_backend: Option<String>,

    #[arg(long, value_enum, default_value = "text", env = "HOOKFAULT_LOG_FORMAT")]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

fn load_config(args: &Args) -> Result<Config, anyhow::Error> {
    let mut config = match args.config {
        Some(ref path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(port) = args.port {
        config.listen.port = port;
    }
    if let Some(ref primary) = args.primary_backend {
        config.backends.primary = primary.clone();
    }
    if let Some(ref routing) = args.routing_backend {
        config.backends.routing_service = routing.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = load_config(&args)?;
    match args.config {
        Some(ref path) => info!("Loaded configuration from {}", path),
        None => info!("No config file given, using defaults"),
    }

    let server = ProxyServer::new(config)?;
    server.run().await?;

    info!("hookfault-proxy stopped");
    Ok(())
}
