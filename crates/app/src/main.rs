use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use reactive_show_core::{
    scene::demo, AppConfig, AudioFeatureExtractor, AudioSource, RenderGraph, ScriptedCommand, Show,
    ShowError, SignalGenerator, WavSource,
};
use tracing_subscriber::EnvFilter;

fn main() -> reactive_show_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            input,
            seconds,
            fps,
            bpm,
            seed,
            commands,
        } => run_show(RunArgs {
            config,
            input,
            seconds,
            fps,
            bpm,
            seed,
            commands,
        }),
        Commands::Analyze {
            input,
            output,
            config,
        } => run_analyze(&input, output.as_ref(), config.as_ref()),
        Commands::DefaultConfig => {
            println!("{}", AppConfig::default().to_json_pretty()?);
            Ok(())
        }
    }
}

struct RunArgs {
    config: Option<PathBuf>,
    input: Option<PathBuf>,
    seconds: f64,
    fps: f64,
    bpm: f32,
    seed: Option<u64>,
    commands: Vec<ScriptedCommand>,
}

fn run_show(args: RunArgs) -> reactive_show_core::Result<()> {
    let mut config = load_config(args.config.as_ref())?;
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    tracing::info!(seconds = args.seconds, fps = args.fps, "starting simulated show");

    let source: Box<dyn AudioSource> = match &args.input {
        Some(path) => Box::new(WavSource::open(path)?),
        None => Box::new(SignalGenerator::new(config.audio.sample_rate, args.bpm)),
    };

    let mut show = Show::from_config(
        &config,
        source,
        Box::new(RenderGraph::new()),
        demo::catalog_for,
    )?;
    show.start()?;

    let frame_interval = seconds_to_duration(1.0 / args.fps)?;
    let duration = seconds_to_duration(args.seconds)?;
    let summary = show.run_for(duration, frame_interval, &args.commands)?;
    show.shutdown();

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_analyze(
    input: &PathBuf,
    output: Option<&PathBuf>,
    config: Option<&PathBuf>,
) -> reactive_show_core::Result<()> {
    tracing::info!(?input, ?output, "analysing audio file");
    let config = load_config(config)?;
    let mut source = WavSource::open(input)?;
    let mut extractor = AudioFeatureExtractor::new(&config.analyzer);

    let mut frames = Vec::new();
    while let Some(window) = source.next_window(config.audio.block_size)? {
        frames.push(extractor.analyze(&window));
    }
    let beats = frames.iter().filter(|frame| frame.is_beat).count();
    tracing::info!(frames = frames.len(), beats, "analysis complete");

    let json = serde_json::to_string(&frames)?;
    match output {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> reactive_show_core::Result<AppConfig> {
    match path {
        Some(path) => {
            tracing::info!(?path, "loading configuration");
            AppConfig::from_path(path)
        }
        None => Ok(AppConfig::live_defaults()),
    }
}

fn seconds_to_duration(seconds: f64) -> reactive_show_core::Result<Duration> {
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| ShowError::InvalidConfig(format!("`{seconds}` is not a usable duration")))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive scene rotation engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the show in virtual time and print a summary.
    Run {
        /// JSON configuration file. Defaults are used when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// WAV file to analyse instead of the generated test signal.
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Length of the simulated show in seconds.
        #[arg(long, default_value_t = 60.0)]
        seconds: f64,
        /// Display refresh rate driving the frame loop.
        #[arg(long, default_value_t = 60.0)]
        fps: f64,
        /// Tempo of the generated test signal.
        #[arg(long, default_value_t = 120.0)]
        bpm: f32,
        /// Seed for scene picks and rotation jitter.
        #[arg(long)]
        seed: Option<u64>,
        /// Manual command to replay, as SECONDS:LAYER:COMMAND. Repeatable.
        #[arg(long = "command", value_name = "AT:LAYER:COMMAND")]
        commands: Vec<ScriptedCommand>,
    },
    /// Analyse a WAV file and emit one feature frame per window as JSON.
    Analyze {
        /// Path to the audio file that should be analysed.
        input: PathBuf,
        /// Output path for the frames. Printed to stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// JSON configuration file for analyzer settings.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the default configuration as JSON.
    DefaultConfig,
}
