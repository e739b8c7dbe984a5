use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mf_snapshot::config::Config;
use mf_snapshot::job;
use mf_snapshot::portal::chrome::ChromeLauncher;
use mf_snapshot::portal::PortalScraper;
use mf_snapshot::session::SessionCapturer;
use mf_snapshot::sheets::SheetAppender;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "mf-snapshot")]
#[command(about = "Scrape the MF Central portfolio summary into a Google Sheet")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT_HASH"), ")"))]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "mf-snapshot.toml")]
    config: PathBuf,

    /// Run the browser without a window (overrides config)
    #[arg(long)]
    headless: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape once using PAN, PASSWORD, SECURITY_QUESTIONS_JSON, SPREADSHEET_ID
    /// and SHEET_NAME from the environment, then append to the sheet
    Run,

    /// Open a browser, wait for a manual login, and save the session state
    CaptureSession {
        /// Where to write the session JSON (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "info,chromiumoxide=warn,chromiumoxide::conn=off,chromiumoxide::handler=off",
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

    match dispatch(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!(error = %format!("{err:#}"), "mf-snapshot failed");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<u8> {
    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config.display()))?;
    if cli.headless {
        config.browser.headless = true;
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_job(&config).await,
        Command::CaptureSession { output } => {
            let output = output.unwrap_or_else(|| config.session.output_path.clone());
            capture_session(&config, output).await
        }
    }
}

async fn run_job(config: &Config) -> Result<u8> {
    // Neither constructor starts a browser or touches the network, and
    // `job::run` validates the environment before using them.
    let launcher = ChromeLauncher::new(config.browser.clone());
    let scraper = PortalScraper::new(launcher, &config.portal, config.timings.clone())?
        .with_screenshot_path(&config.browser.screenshot_path);
    let appender = SheetAppender::from_settings(&config.sheets);

    Ok(job::run(
        |name| std::env::var(name).ok(),
        &config.sheets.preferred_tab,
        &scraper,
        &appender,
    )
    .await)
}

async fn capture_session(config: &Config, output: PathBuf) -> Result<u8> {
    let launcher = ChromeLauncher::new(config.browser.clone()).headed();
    let capturer =
        SessionCapturer::new(launcher, &config.portal, &config.session, &config.timings)?;

    match capturer.capture(&output).await {
        Ok(path) => {
            info!(path = %path.display(), "Session captured");
            Ok(0)
        }
        Err(err) => {
            error!(error = %err, "Session capture failed");
            Ok(1)
        }
    }
}
