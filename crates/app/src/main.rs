use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use seeing_sound_core::audio::{
    list_input_devices, CpalFrameSource, InputDevice, ToneSource, DEFAULT_FRAME_SIZE,
    FALLBACK_SAMPLE_RATE,
};
use seeing_sound_core::config::DEFAULT_CONFIG_FILE;
use seeing_sound_core::lights::{connect_lifx, LoggingLight};
use seeing_sound_core::{
    CancelToken, ColorMapper, ConfigWatcher, FrameSource, Light, Pipeline, RuntimeConfig,
    SeeingSoundError, StopReason, Worker,
};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Handle for swapping the log filter when `log_level` changes in the config.
type FilterHandle = reload::Handle<EnvFilter, Registry>;

const TONE_AMPLITUDE: i16 = 8_000;

fn main() -> seeing_sound_core::Result<()> {
    let filter = init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices => run_devices(),
        Commands::Run(args) => run_dispatch(args, filter),
        Commands::InitConfig { config, force } => run_init_config(&config, force),
    }
}

fn run_devices() -> seeing_sound_core::Result<()> {
    let devices = list_input_devices()?;
    if devices.is_empty() {
        println!("No input devices found.");
    }
    print_devices(&devices);
    Ok(())
}

fn run_dispatch(args: RunArgs, filter: Option<FilterHandle>) -> seeing_sound_core::Result<()> {
    let required_keys = if args.dry_run || !args.lights.is_empty() {
        Vec::new()
    } else {
        vec!["lights"]
    };
    let (watcher, config) = ConfigWatcher::open(&args.config, required_keys)?;
    apply_log_level(filter.as_ref(), &config);

    let profile = args.profile.as_deref().unwrap_or(&config.profile);
    let mapper = ColorMapper::from_name(profile);
    let mut lights = build_lights(&args, &config)?;

    let device = match (args.tone, args.device) {
        (Some(_), _) => None,
        (None, Some(index)) => Some(index),
        (None, None) => prompt_for_device()?,
    };
    let deadline = match args.duration {
        Some(secs) => {
            let duration = Duration::try_from_secs_f64(secs).map_err(|_| {
                SeeingSoundError::msg(format!(
                    "--duration must be a non-negative number, got {secs}"
                ))
            })?;
            Instant::now().checked_add(duration)
        }
        None => None,
    };

    let cancel = CancelToken::new();
    spawn_interrupt_handler(cancel.clone())?;

    let tone = args.tone;
    let frame_size = args.frame_size;
    let worker = Worker::spawn(cancel, move |cancel| {
        let mut source: Box<dyn FrameSource> = match tone {
            Some(frequency) => {
                tracing::info!(frequency, "using synthetic tone instead of a capture device");
                Box::new(
                    ToneSource::new(frequency, TONE_AMPLITUDE, FALLBACK_SAMPLE_RATE, frame_size)
                        .realtime(true),
                )
            }
            None => Box::new(CpalFrameSource::open(device, frame_size)?),
        };

        let mut pipeline = Pipeline::new(config, mapper)
            .with_watcher(watcher)
            .on_reload(move |config| apply_log_level(filter.as_ref(), config));
        pipeline.run(source.as_mut(), &mut lights, &cancel, deadline)
    })?;

    match worker.join()? {
        StopReason::Cancelled => tracing::info!("stopped"),
        StopReason::DeadlineReached => tracing::info!("finished"),
    }
    Ok(())
}

fn run_init_config(path: &Path, force: bool) -> seeing_sound_core::Result<()> {
    if path.exists() && !force {
        return Err(SeeingSoundError::msg(format!(
            "{} already exists, pass --force to overwrite",
            path.display()
        )));
    }
    RuntimeConfig::default().save(path)?;
    tracing::info!(path = %path.display(), "wrote default configuration");
    Ok(())
}

fn build_lights(
    args: &RunArgs,
    config: &RuntimeConfig,
) -> seeing_sound_core::Result<Vec<Box<dyn Light>>> {
    if args.dry_run {
        return Ok(vec![Box::new(LoggingLight::default())]);
    }

    let addresses = if args.lights.is_empty() {
        &config.lights
    } else {
        &args.lights
    };
    if addresses.is_empty() {
        tracing::warn!("no lights configured, logging colors instead");
        return Ok(vec![Box::new(LoggingLight::default())]);
    }
    connect_lifx(addresses)
}

fn prompt_for_device() -> seeing_sound_core::Result<Option<usize>> {
    let devices = list_input_devices()?;
    print_devices(&devices);

    print!("Select input device index (blank for default): ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;

    Ok(parse_device_choice(&line, &devices))
}

/// Invalid or blank input selects the default device.
fn parse_device_choice(input: &str, devices: &[InputDevice]) -> Option<usize> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    match input.parse::<usize>() {
        Ok(index) if devices.iter().any(|device| device.index == index) => Some(index),
        _ => {
            tracing::warn!(input, "invalid device selection, using default device");
            None
        }
    }
}

fn print_devices(devices: &[InputDevice]) {
    for device in devices {
        let rate = device
            .default_sample_rate
            .map(|rate| format!("{rate} Hz"))
            .unwrap_or_else(|| "unknown rate".to_string());
        let marker = if device.is_default { " (default)" } else { "" };
        println!("[{}] {} - {rate}{marker}", device.index, device.name);
    }
}

/// Blocks on Ctrl+C on a dedicated thread and cancels the dispatch loop.
fn spawn_interrupt_handler(cancel: CancelToken) -> seeing_sound_core::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    std::thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        tracing::info!("interrupt received, shutting down");
                        cancel.cancel();
                    }
                    Err(err) => tracing::error!(%err, "failed to listen for interrupt"),
                }
            })
        })?;
    Ok(())
}

/// `RUST_LOG` takes precedence; otherwise the filter follows `log_level` and
/// the returned handle lets reloads change it.
fn init_tracing() -> Option<FilterHandle> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init();
        return None;
    }

    let (filter, handle) = reload::Layer::new(EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
    Some(handle)
}

fn apply_log_level(handle: Option<&FilterHandle>, config: &RuntimeConfig) {
    let Some(handle) = handle else {
        return;
    };
    if let Err(err) = handle.reload(EnvFilter::new(config.log_filter())) {
        tracing::warn!(%err, "failed to apply log level");
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Drive smart lights from live audio", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List audio input devices and their indices.
    Devices,
    /// Capture audio and stream colors to the lights until interrupted.
    Run(RunArgs),
    /// Write a configuration file populated with defaults.
    InitConfig {
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Input device index as printed by `devices`. Prompts when omitted.
    #[arg(short, long)]
    device: Option<usize>,
    /// Configuration file, watched for changes while running.
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Color profile: default, warm or cold. Overrides the config file.
    #[arg(short, long)]
    profile: Option<String>,
    /// LIFX light address (`ip`, `ip:port` or hostname). Repeatable.
    #[arg(short, long = "light")]
    lights: Vec<String>,
    /// Log colors instead of sending them.
    #[arg(long)]
    dry_run: bool,
    /// Stop after this many seconds.
    #[arg(long)]
    duration: Option<f64>,
    /// Samples per analysis frame.
    #[arg(long, default_value_t = DEFAULT_FRAME_SIZE)]
    frame_size: usize,
    /// Use a sine tone at this frequency instead of a capture device.
    #[arg(long)]
    tone: Option<f64>,
}
