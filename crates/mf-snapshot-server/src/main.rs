use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mf_snapshot::config::Config;
use mf_snapshot::portal::chrome::ChromeLauncher;
use mf_snapshot::portal::PortalScraper;
use mf_snapshot::sheets::SheetAppender;
use mf_snapshot_server::{router, AppState};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "mf-snapshot-server")]
#[command(about = "Serve the snapshot form and scrape API")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "mf-snapshot.toml")]
    config: PathBuf,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:3000")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "info,tower_http=debug,chromiumoxide=warn,chromiumoxide::conn=off,chromiumoxide::handler=off",
            )
        }))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .json(),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config.display()))?;

    let launcher = ChromeLauncher::new(config.browser.clone());
    let scraper = PortalScraper::new(launcher, &config.portal, config.timings.clone())?
        .with_screenshot_path(&config.browser.screenshot_path);
    let appender = SheetAppender::from_settings(&config.sheets);

    let app = router(AppState::new(Arc::new(scraper), Arc::new(appender)));

    tracing::info!(addr = %cli.bind, "mf-snapshot-server listening");
    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cli.bind))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
