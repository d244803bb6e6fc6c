//! Audio pump tests: chunk forwarding, sequencing, and wake events

mod common;

use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::json;
use tokio::sync::mpsc;

use aria_edge::protocol::pcm16_to_bytes;
use aria_edge::voice::WakeWordScorer;
use aria_edge::{ConnectionManager, SessionState, connection, pump};

use common::{Backend, FrameSource, RecordingHandler, ScriptedScorer, test_config, wait_until};

struct PumpRig {
    backend: Backend,
    state: Arc<SessionState>,
    queue: connection::OutboundQueue,
    _shutdown_tx: mpsc::Sender<()>,
}

async fn connect_rig() -> PumpRig {
    let mut backend = Backend::spawn().await;
    let config = test_config(&backend.url);
    let state = Arc::new(SessionState::new());
    let (queue, outbound_rx) = connection::outbound_channel();
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

    let manager = ConnectionManager::new(
        &config,
        &queue,
        outbound_rx,
        Arc::new(RecordingHandler::default()),
        shutdown_rx,
    );
    tokio::spawn(manager.run());

    backend.recv_kind("connection_ready").await;
    wait_until("connected flag", || queue.is_connected()).await;

    PumpRig {
        backend,
        state,
        queue,
        _shutdown_tx: shutdown_tx,
    }
}

fn silent_scorer(script: Vec<(bool, f32)>) -> Arc<Mutex<dyn WakeWordScorer>> {
    Arc::new(Mutex::new(ScriptedScorer::new(
        script,
        Arc::new(AtomicUsize::new(0)),
    )))
}

/// Drive the pump inline for a bounded window; it never finishes on its own.
async fn drive_pump(
    frames: Vec<Vec<i16>>,
    scorer: Arc<Mutex<dyn WakeWordScorer>>,
    rig: &PumpRig,
    wake_tx: mpsc::Sender<pump::WakeEvent>,
) {
    let capture = FrameSource::new(frames);
    let _ = tokio::time::timeout(
        Duration::from_millis(300),
        pump::run(
            capture,
            scorer,
            Arc::clone(&rig.state),
            rig.queue.clone(),
            wake_tx,
        ),
    )
    .await;
}

#[tokio::test]
async fn test_frames_forwarded_in_sequence_while_streaming() {
    let mut rig = connect_rig().await;
    assert!(rig.state.enable_streaming());

    let frames: Vec<Vec<i16>> = (0..3i16).map(|i| vec![i; 4]).collect();
    let (wake_tx, _wake_rx) = mpsc::channel(8);
    drive_pump(frames.clone(), silent_scorer(vec![]), &rig, wake_tx).await;

    for (seq, frame) in frames.iter().enumerate() {
        let chunk = rig.backend.recv_kind("audio_chunk").await;
        assert_eq!(chunk.data["seq"], json!(seq));

        let audio = chunk.data["audio"].as_str().unwrap();
        assert_eq!(BASE64.decode(audio).unwrap(), pcm16_to_bytes(frame));
    }
}

#[tokio::test]
async fn test_no_chunks_while_streaming_disabled() {
    let mut rig = connect_rig().await;

    let frames: Vec<Vec<i16>> = (0..3i16).map(|i| vec![i; 4]).collect();
    let (wake_tx, _wake_rx) = mpsc::channel(8);
    drive_pump(frames, silent_scorer(vec![]), &rig, wake_tx).await;

    let leaked = rig.backend.recv_within(Duration::from_millis(200)).await;
    assert!(leaked.is_none(), "chunk sent while disabled: {leaked:?}");
}

#[tokio::test]
async fn test_detection_emits_wake_event() {
    let rig = connect_rig().await;

    // Second frame trips the scorer.
    let script = vec![(false, 0.1), (true, 0.85)];
    let frames: Vec<Vec<i16>> = vec![vec![0; 4], vec![1; 4]];
    let (wake_tx, mut wake_rx) = mpsc::channel(8);
    drive_pump(frames, silent_scorer(script), &rig, wake_tx).await;

    let event = wake_rx.recv().await.expect("no wake event");
    assert!((event.confidence - 0.85).abs() < 1e-6);
    assert!(wake_rx.try_recv().is_err(), "more than one wake event");
}

#[tokio::test]
async fn test_frames_scored_even_while_streaming_disabled() {
    let rig = connect_rig().await;
    assert!(!rig.state.streaming());

    let script = vec![(true, 0.9)];
    let (wake_tx, mut wake_rx) = mpsc::channel(8);
    drive_pump(vec![vec![0; 4]], silent_scorer(script), &rig, wake_tx).await;

    assert!(wake_rx.recv().await.is_some(), "detection lost while idle");
}
