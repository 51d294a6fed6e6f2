use clap::Parser;
use eyre::WrapErr;
use solar_feasibility::{api, logging, AppConfig, AppContext};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(author, version, about = "Solar feasibility analysis server", long_about = None)]
struct Opt {
    /// TOML configuration file
    #[arg(long, env = "ANALYZER_CONFIG")]
    config: Option<PathBuf>,
    /// Override the configured bind address
    #[arg(long)]
    bind: Option<String>,
    /// Override the configured port
    #[arg(long)]
    port: Option<u16>,
    /// Write the effective configuration to this path and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,
}

fn main() -> eyre::Result<()> {
    // .env is optional
    let _ = dotenv::dotenv();
    let opts = Opt::parse();

    let mut config = match opts.config.as_deref() {
        Some(path) => AppConfig::load(Some(path)),
        None => AppConfig::from_env(),
    }
    .wrap_err("loading configuration")?;
    if let Some(bind) = opts.bind {
        config.server.bind_address = bind;
    }
    if let Some(port) = opts.port {
        config.server.port = port;
    }
    config.validate().wrap_err("validating configuration")?;

    if let Some(path) = opts.dump_config {
        config.to_file(&path).wrap_err("writing configuration")?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    logging::init_logging(&config.logging)?;
    tracing::info!(
        version = solar_feasibility::VERSION,
        profile = solar_feasibility::BUILD_PROFILE,
        built = solar_feasibility::BUILD_TIMESTAMP,
        "Starting solar feasibility analyzer"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.worker_threads)
        .enable_all()
        .build()
        .wrap_err("building tokio runtime")?;

    runtime.block_on(run(config))
}

async fn run(config: AppConfig) -> eyre::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.port)
        .parse()
        .wrap_err("parsing bind address")?;

    let ctx = AppContext::initialize(config).await?;
    let listener = TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("binding {addr}"))?;

    api::serve(listener, ctx, shutdown_signal()).await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
