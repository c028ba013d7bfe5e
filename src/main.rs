use anyhow::Context;
use checkin_analyst::{AnalystConfig, Audience, LogLevel, SubmissionContext, config, logging};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// `checkin-analyst` analyses a single wellbeing check-in
#[derive(Parser, Debug)]
#[command(
    name = "checkin-analyst",
    version,
    about = "Analyse a wellbeing check-in with an AI provider and deterministic fallback"
)]
pub struct Cli {
    /// Check-in JSON file, or `-` for stdin
    pub input: PathBuf,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Framing of the analysis; overrides the audience in the input
    #[arg(long)]
    pub audience: Option<Audience>,

    /// Logging verbosity level
    #[arg(long, default_value = "info")]
    pub log_level: LogLevel,
}

async fn read_input(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        use tokio::io::AsyncReadExt;
        let mut text = String::new();
        tokio::io::stdin().read_to_string(&mut text).await?;
        return Ok(text);
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level);

    let cfg = match &cli.config {
        Some(path) => {
            debug!("loading config from {}", path.display());
            config::load(path)
                .await
                .with_context(|| format!("loading {}", path.display()))?
        }
        None => AnalystConfig::default(),
    };

    let text = read_input(&cli.input).await?;
    let ctx: SubmissionContext =
        serde_json::from_str(&text).context("parsing check-in submission")?;
    let audience = cli.audience.or(ctx.audience).unwrap_or_default();

    let orchestrator = cfg.orchestrator();
    let analysis = orchestrator.submit(ctx, audience).await;
    info!(
        fallback = analysis.is_fallback(),
        elapsed_ms = analysis.processing_time_ms,
        "analysis ready"
    );
    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(())
}
