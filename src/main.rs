use anyhow::Context;
use std::env;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use speech_commands::kernel::driver::DEFAULT_TICK_MS;
use speech_commands::kernel::inference::ModelShape;
use speech_commands::kernel::time::MonotonicClock;
use speech_commands::outputs::LogResponder;
use speech_commands::sim::{ScoreScript, ScriptedEngine, SyntheticFeatures};
use speech_commands::{HostLoop, Pipeline, PipelineConfig};

/// Replay options that are not part of the pipeline configuration.
#[derive(Debug, Default)]
struct ReplayArgs {
    config: Option<PathBuf>,
    script: Option<PathBuf>,
    tick_ms: Option<u64>,
    ticks: Option<u64>,
}

impl ReplayArgs {
    fn parse<I: IntoIterator<Item = String>>(args: I) -> Self {
        let mut parsed = Self::default();
        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--config" => parsed.config = iter.next().map(PathBuf::from),
                "--script" => parsed.script = iter.next().map(PathBuf::from),
                "--tick-ms" => parsed.tick_ms = iter.next().and_then(|v| v.parse().ok()),
                "--ticks" => parsed.ticks = iter.next().and_then(|v| v.parse().ok()),
                _ => {}
            }
        }
        parsed
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let args: Vec<String> = env::args().skip(1).collect();
    let replay = ReplayArgs::parse(args.clone());

    let mut config = match &replay.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.apply_env();
    config.apply_args(args);

    let script = match &replay.script {
        Some(path) => ScoreScript::from_json_file(path)
            .with_context(|| format!("loading score script {}", path.display()))?,
        None => {
            let yes = config.categories.id_of("yes").map_or(config.categories.len() - 1, |id| id.0);
            ScoreScript::burst(config.categories.len(), yes, 25, 20)
        }
    };

    let shape = ModelShape {
        input_len: config.model.feature_element_count(),
        output_len: config.categories.len(),
    };
    let clock = MonotonicClock::new();
    let pipeline = Pipeline::setup(
        config,
        clock,
        SyntheticFeatures::new(clock),
        ScriptedEngine::new(shape, script),
    )
    .context("pipeline setup failed")?;

    tracing::info!("Replaying score script. Set RUST_LOG=info to see detections.");
    let mut host = HostLoop::new(pipeline, LogResponder);
    let ticks = replay.ticks.or(Some(200));
    host.run(replay.tick_ms.unwrap_or(DEFAULT_TICK_MS * 5), ticks)
        .await
        .context("recognition loop halted")?;

    let snapshot = host.telemetry.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
