use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use aria_edge::session::{Hooks, Session, SessionState};
use aria_edge::voice::{
    AudioPlayback, CaptureSource, EnergyScorer, MicCapture, TranscriptSink, WakeWordScorer,
};
use aria_edge::{Config, ConnectionManager, connection, heartbeat, pump};

/// Aria Edge - edge voice client for the Aria assistant backend
#[derive(Parser)]
#[command(name = "aria-edge", version, about)]
struct Cli {
    /// Backend WebSocket endpoint (overrides ARIA_BACKEND_URL)
    #[arg(long)]
    endpoint: Option<String>,

    /// Client identifier (overrides ARIA_CLIENT_ID)
    #[arg(long)]
    client_id: Option<String>,

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
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,aria_edge=info",
        1 => "info,aria_edge=debug",
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
    if let Some(Command::TestMic { duration }) = cli.command {
        return test_mic(duration).await;
    }

    let mut config = Config::from_env()?;
    if let Some(endpoint) = cli.endpoint {
        config.backend_url = endpoint;
    }
    if let Some(client_id) = cli.client_id {
        config.client_id = client_id;
    }

    tracing::info!(
        url = %config.backend_url,
        client_id = %config.client_id,
        "starting aria edge client"
    );

    // Shared state and wiring
    let state = Arc::new(SessionState::new());
    let (queue, outbound_rx) = connection::outbound_channel();
    let (wake_tx, wake_rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    let mut scorer = EnergyScorer::new(config.wake_word.threshold);
    scorer.load()?;
    let scorer: Arc<Mutex<dyn WakeWordScorer>> = Arc::new(Mutex::new(scorer));

    let playback = Arc::new(AudioPlayback::new()?);
    let hooks = Hooks {
        output: Arc::clone(&playback) as _,
        playback,
        display: Arc::new(TranscriptLog),
    };

    let session = Arc::new(Session::new(
        Arc::clone(&state),
        queue.clone(),
        Arc::clone(&scorer),
        hooks,
        &config.session,
    ));

    let manager = ConnectionManager::new(
        &config,
        &queue,
        outbound_rx,
        Arc::clone(&session) as _,
        shutdown_rx,
    );

    let connection_handle = tokio::spawn(manager.run());
    tokio::spawn(heartbeat::run(
        Arc::clone(&state),
        queue.clone(),
        config.session.heartbeat_interval,
    ));
    tokio::spawn(Arc::clone(&session).run(wake_rx));

    MicCapture::list_devices();
    let mut capture = MicCapture::new(config.audio.frame_samples)?;
    capture.start()?;

    tracing::info!("aria edge client running, press ctrl-c to stop");

    // The pump runs on this task: cpal streams aren't Send.
    tokio::select! {
        () = pump::run(capture, scorer, state, queue, wake_tx) => {},
        _ = tokio::signal::ctrl_c() => tracing::info!("shutdown signal received"),
    }

    // Dropping the pump stopped capture; close the connection gracefully.
    let _ = shutdown_tx.send(()).await;
    let _ = tokio::time::timeout(Duration::from_secs(2), connection_handle).await;

    tracing::info!("aria edge client stopped");
    Ok(())
}

/// Logs transcript updates pushed by the backend
struct TranscriptLog;

impl TranscriptSink for TranscriptLog {
    fn transcript(&self, text: &str, is_final: bool) {
        tracing::info!(text, is_final, "transcript");
    }
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    MicCapture::list_devices();
    let mut capture = MicCapture::new(1024)?;
    capture.start()?;

    let deadline = std::time::Instant::now() + Duration::from_secs(duration);
    let mut peak_rms = 0.0f32;

    while std::time::Instant::now() < deadline {
        let frame = capture.read_frame().await?;
        let rms = calculate_rms(&frame);
        peak_rms = peak_rms.max(rms);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (rms * 500.0).min(50.0) as usize;
        println!("RMS: {:.4} | [{}]", rms, "#".repeat(meter_len));
    }

    capture.stop();

    println!("\n---");
    if peak_rms > 0.01 {
        println!("Microphone is working (peak RMS {peak_rms:.4}).");
    } else {
        println!("RMS stayed near 0 - check your input device and levels.");
    }

    Ok(())
}

/// RMS energy of a PCM16 frame, normalized to 0.0-1.0
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples
        .iter()
        .map(|&s| {
            let normalized = f32::from(s) / 32768.0;
            normalized * normalized
        })
        .sum();
    (sum_squares / samples.len() as f32).sqrt()
}
