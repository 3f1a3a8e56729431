use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context};
use lkflow_cli::types::{Algorithm, ProcessingConfig};
use lkflow_cli::FlowProcessor;
use lkflow_engine::RunLimits;
use tracing_subscriber::{fmt, EnvFilter};

const USAGE: &str = "usage: lkflow --algorithm <lucaskanade|lucaskanade_dense> --input <dir> \
[--output <dir>] [--config <file.yaml>] [--max-frames N]";

#[derive(Debug, Default)]
struct Args {
    algorithm: Option<String>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
    max_frames: Option<u64>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    while let Some(flag) = args.next() {
        let mut value = || {
            args.next()
                .with_context(|| format!("missing value for {flag}"))
        };
        match flag.as_str() {
            "--algorithm" => parsed.algorithm = Some(value()?),
            "--input" => parsed.input = Some(PathBuf::from(value()?)),
            "--output" => parsed.output = Some(PathBuf::from(value()?)),
            "--config" => parsed.config = Some(PathBuf::from(value()?)),
            "--max-frames" => {
                let raw = value()?;
                parsed.max_frames = Some(
                    raw.parse()
                        .with_context(|| format!("invalid --max-frames value {raw}"))?,
                );
            }
            other => bail!("unexpected argument {other}\n{USAGE}"),
        }
    }
    Ok(parsed)
}

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_timer(fmt::time::uptime())
        .with_level(true)
        .with_ansi(false)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run() {
        eprintln!("{err:#}");
        process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1))?;

    let algorithm_name = args.algorithm.context(USAGE)?;
    let algorithm: Algorithm = match algorithm_name.parse() {
        Ok(algorithm) => algorithm,
        Err(err) => {
            println!("{err}");
            return Ok(());
        }
    };
    let input = args.input.context(USAGE)?;

    let config = match &args.config {
        Some(path) => ProcessingConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ProcessingConfig::default(),
    };

    let limits = RunLimits {
        max_frames: args.max_frames,
        ..RunLimits::default()
    };
    let processor = FlowProcessor::new(config);
    let output = match &args.output {
        Some(dir) => processor.process_to_dir(algorithm, &input, dir, &limits),
        None => processor.process_session(algorithm, &input, None, &limits),
    }
    .with_context(|| format!("failed to process {}", input.display()))?;

    println!("session: {}", output.metadata.session_name);
    println!("algorithm: {}", output.metadata.algorithm);
    println!("frames: {}", output.summary.total_frames);
    println!("tracks created: {}", output.summary.tracks_created);
    println!("tracks lost: {}", output.summary.tracks_lost);
    println!(
        "average processing (ms): {:.3}",
        output.summary.average_processing_ms
    );
    Ok(())
}
