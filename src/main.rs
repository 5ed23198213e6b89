use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use jarvis::voice::{
    AudioCapture, AudioPlayback, EspeakSpeaker, FrameSource, Speaker, list_devices,
    select_input_device, select_output_device,
};
use jarvis::{Config, Daemon, ShutdownSignal};

/// Jarvis - wake-phrase voice control loop
#[derive(Parser)]
#[command(name = "jarvis", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/jarvis/config.toml)
    #[arg(short, long, env = "JARVIS_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List audio devices with their channel counts
    Devices,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info",
        1 => "info,jarvis=debug",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    // Audio streams are not Send; every hardware path runs on a blocking thread
    if let Some(cmd) = cli.command {
        return tokio::task::spawn_blocking(move || match cmd {
            Command::Devices => list(),
            Command::TestMic { duration } => test_mic(&config, duration),
            Command::TestTts { text } => test_tts(&config, &text),
        })
        .await?;
    }

    let shutdown = ShutdownSignal::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            signal.trigger();
        }
    });

    let daemon = Daemon::new(config);
    tokio::task::spawn_blocking(move || daemon.run(&shutdown)).await??;

    Ok(())
}

/// List audio devices
fn list() -> anyhow::Result<()> {
    let devices = list_devices()?;
    if devices.is_empty() {
        println!("No audio devices found");
        return Ok(());
    }

    println!("{:>3}  {:<48} {:>3} {:>3}", "#", "name", "in", "out");
    for dev in &devices {
        println!(
            "{:>3}  {:<48} {:>3} {:>3}",
            dev.index, dev.name, dev.max_input_channels, dev.max_output_channels
        );
    }
    Ok(())
}

/// Test microphone input
fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let devices = list_devices()?;
    let (input, channels) =
        select_input_device(&devices, &config.audio.input_device, config.audio.channels)?;

    let mut capture = AudioCapture::new(config.audio.gain, config.audio.queue_capacity);
    capture.start(&input, channels, config.audio.sample_rate)?;

    println!("Device: {} ({channels} ch @ {} Hz)", input.name, config.audio.sample_rate);
    println!("---");

    for i in 0..duration {
        let window_end = Instant::now() + Duration::from_secs(1);
        let mut samples: Vec<f32> = Vec::new();
        while let Some(remaining) = window_end.checked_duration_since(Instant::now()) {
            if let Some(frame) = capture.read(remaining) {
                samples.extend_from_slice(frame.samples());
            }
        }

        let energy = jarvis::voice::calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    let dropped = capture.dropped_frames();
    capture.stop();

    println!("\n---");
    println!("Silence threshold: {:.4}", config.endpoint.silence_threshold);
    if dropped > 0 {
        println!("Dropped frames: {dropped}");
    }
    println!("If RMS rose above the threshold while you spoke, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: jarvis devices (and set audio.input_device)");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test TTS output through espeak
fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let devices = list_devices()?;
    let output = select_output_device(&devices, &config.tts.output_device);
    match output {
        Some(dev) => println!("Output device: {}", dev.name),
        None => println!("Output device: default"),
    }

    let playback = AudioPlayback::new(output)?;
    let mut speaker = EspeakSpeaker::new(&config.tts, playback);
    speaker.speak(text)?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
