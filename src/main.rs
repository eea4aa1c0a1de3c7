//! attnview CLI: interactive attention explorer

use anyhow::{Context, Result};
use attnview_rs::{
    demo_tokens, runtime, synthetic_payload, AttentionPayload, JsonSurface, Session,
    SessionConfig, Speed, Surface, TextSurface, DEMO_TEXT,
};
use clap::{Parser, ValueEnum};
use std::io::{self, BufReader};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "attnview")]
#[command(about = "Explore multi-layer, multi-head attention interactively")]
#[command(version)]
struct Cli {
    /// Attention payload JSON written by the extractor
    #[arg(required_unless_present = "demo")]
    payload: Option<PathBuf>,

    /// Use a seeded synthetic payload instead of a file
    #[arg(long)]
    demo: bool,

    /// Demo text (whitespace tokenized)
    #[arg(long, default_value = DEMO_TEXT)]
    text: String,

    /// Demo layer count
    #[arg(long, default_value_t = 6)]
    layers: usize,

    /// Demo head count
    #[arg(long, default_value_t = 4)]
    heads: usize,

    /// Demo random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Playback speed: slow, normal or fast
    #[arg(short, long, default_value = "normal")]
    speed: Speed,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: Format,

    /// Disable ANSI colors in text output
    #[arg(long)]
    plain: bool,

    /// Write the loaded (or generated) payload to this path before viewing
    #[arg(long, value_name = "PATH")]
    save_payload: Option<PathBuf>,

    /// Reject payloads whose rows are not probability distributions
    #[arg(long)]
    strict: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn run_session<S: Surface>(payload: AttentionPayload, config: &SessionConfig, surface: S) -> Result<()> {
    let mut session =
        Session::from_payload(payload, config, surface).context("Failed to load attention payload")?;
    let input = runtime::spawn_line_reader(BufReader::new(io::stdin()));
    runtime::run(&mut session, input)?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries frames
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let payload = if cli.demo {
        info!(
            "Generating synthetic payload: {} layers, {} heads, seed {}",
            cli.layers, cli.heads, cli.seed
        );
        synthetic_payload(demo_tokens(&cli.text), cli.layers, cli.heads, cli.seed)?
    } else {
        let path = cli
            .payload
            .as_ref()
            .context("A payload path is required without --demo")?;
        AttentionPayload::load(path).with_context(|| format!("Failed to read {}", path.display()))?
    };

    if let Some(path) = &cli.save_payload {
        payload
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let mut config = SessionConfig {
        speed: cli.speed,
        ..Default::default()
    };
    config.load.strict = cli.strict;

    let stdout = io::stdout();
    match cli.format {
        Format::Text => run_session(payload, &config, TextSurface::new(stdout.lock(), !cli.plain)),
        Format::Json => run_session(payload, &config, JsonSurface::new(stdout.lock())),
    }
}
