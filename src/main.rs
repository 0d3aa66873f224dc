use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use halo_agent::agent::ChatGenerator;
use halo_agent::audio::{AudioDistributor, AudioPlaybackQueue, AudioSource, samples_to_wav};
use halo_agent::synth::SpeechSynthesizer;
use halo_agent::{Config, ConversationOrchestrator};

/// Halo - voice-activated conversational agent
#[derive(Parser)]
#[command(name = "halo", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test speech synthesis output
    TestSynth {
        /// Text to speak
        #[arg(default_value = "你好！我是你的语音助手。")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,halo_agent=info",
        1 => "info,halo_agent=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestSynth { text } => test_synth(&text).await,
        };
    }

    tracing::info!("starting halo agent");

    let config = Config::load();
    config.validate()?;

    let generator = Arc::new(ChatGenerator::new(&config.llm));
    let orchestrator = ConversationOrchestrator::new(config, generator)?;

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping");
            ctrl_c_cancel.cancel();
        }
    });

    orchestrator.run(cancel).await?;
    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut source = AudioSource::new(None)?;
    let distributor = Arc::new(AudioDistributor::new());
    let frames = distributor.register("test-mic");
    source.start(Arc::clone(&distributor))?;

    println!("Device: {}", source.device_name());
    println!("Sample rate: {} Hz", source.sample_rate());
    println!("---");

    for second in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut received = 0_u32;
        let mut samples = Vec::new();
        while let Some(frame) = frames.try_recv() {
            received += 1;
            samples.extend_from_slice(&frame.samples);
        }

        let energy = calculate_rms(&samples);
        let peak = samples.iter().fold(0.0_f32, |max, s| max.max(s.abs()));

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let filled = (energy * 100.0).min(40.0) as usize;
        let meter = format!("{}{}", "█".repeat(filled), " ".repeat(40 - filled));

        println!(
            "[{:2}s] frames: {received:2} | RMS: {energy:.4} | peak: {peak:.4} | [{meter}]",
            second + 1
        );
    }

    source.stop();

    println!("\n---");
    println!("Meter moved? Capture is healthy.");
    println!("Flat at zero, or frames stuck at 0? Check:");
    println!("  1. Mic plugged in and not muted?");
    println!("  2. pactl info | grep 'Default Source'");
    println!("  3. arecord -l to list capture devices");
    println!("  4. pavucontrol to inspect input levels");

    Ok(())
}

/// RMS energy over a sample window
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean_square = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    mean_square.sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlaybackQueue::new()?;

    let rate = 24_000_u32;
    let step = 440.0 * std::f32::consts::TAU / 24_000.0;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..48_000).map(|i| (i as f32 * step).sin() * 0.25).collect();

    println!("Queueing {} samples at {rate} Hz...", samples.len());

    let wav = samples_to_wav(&samples, rate)?;
    playback.play_clip(wav).await;

    println!("\n---");
    println!("Heard the tone? Playback is healthy.");
    println!("Silence? Check:");
    println!("  1. pactl info | grep 'Default Sink'");
    println!("  2. pactl list sinks short");
    println!("  3. pavucontrol to inspect output levels");

    Ok(())
}

/// Test speech synthesis output
async fn test_synth(text: &str) -> anyhow::Result<()> {
    println!("Testing synthesis with text: \"{text}\"\n");

    let config = Config::load();
    let synthesizer = SpeechSynthesizer::new(&config.synthesis)?;

    println!("Requesting synthesis from {}...", config.synthesis.endpoint);
    let audio = synthesizer.synthesize(text).await?;
    println!("Received {} bytes of audio", audio.len());

    let playback = AudioPlaybackQueue::new()?;
    playback.play_clip(audio).await;

    println!("\nDone! If you heard the sentence, synthesis is working.");
    Ok(())
}
