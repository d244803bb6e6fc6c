//! Shared fixtures for integration tests: an in-process WebSocket backend,
//! scripted audio collaborators, and a fully wired session harness.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use aria_edge::session::Hooks;
use aria_edge::voice::{
    CaptureSource, Frame, OutputControl, PlaybackSink, TranscriptSink, WakeWordScorer,
};
use aria_edge::{
    Config, ConnectionManager, Envelope, Inbound, MessageHandler, OutboundQueue, Result, Session,
    SessionState, connection,
};

const RECV_TIMEOUT: Duration = Duration::from_secs(3);

/// In-process WebSocket backend
///
/// Accepts connections in a loop so reconnecting clients land back on the
/// same endpoint. Text frames from the client surface as decoded envelopes;
/// `push` sends raw text frames to the currently connected client.
pub struct Backend {
    pub url: String,
    inbound: mpsc::Receiver<Envelope>,
    push_tx: mpsc::Sender<String>,
    close_tx: mpsc::Sender<()>,
}

impl Backend {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::from_listener(listener)
    }

    pub fn from_listener(listener: TcpListener) -> Self {
        let addr = listener.local_addr().unwrap();
        let (inbound_tx, inbound) = mpsc::channel(64);
        let (push_tx, mut push_rx) = mpsc::channel::<String>(64);
        let (close_tx, mut close_rx) = mpsc::channel::<()>(4);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let Ok(mut ws) = accept_async(stream).await else {
                    continue;
                };

                loop {
                    tokio::select! {
                        frame = ws.next() => match frame {
                            Some(Ok(Message::Text(text))) => {
                                if let Ok(envelope) = Envelope::decode(&text) {
                                    if inbound_tx.send(envelope).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                            Some(Ok(_)) => {}
                        },
                        text = push_rx.recv() => match text {
                            Some(text) => {
                                if ws.send(Message::Text(text)).await.is_err() {
                                    break;
                                }
                            }
                            None => return,
                        },
                        _ = close_rx.recv() => {
                            let _ = ws.close(None).await;
                            break;
                        }
                    }
                }
            }
        });

        Self {
            url: format!("ws://{addr}"),
            inbound,
            push_tx,
            close_tx,
        }
    }

    /// Next frame from the client, failing the test after a timeout
    pub async fn recv(&mut self) -> Envelope {
        tokio::time::timeout(RECV_TIMEOUT, self.inbound.recv())
            .await
            .expect("timed out waiting for a frame from the client")
            .expect("backend task stopped")
    }

    /// Next frame of the given kind, skipping others
    pub async fn recv_kind(&mut self, kind: &str) -> Envelope {
        loop {
            let envelope = self.recv().await;
            if envelope.kind == kind {
                return envelope;
            }
        }
    }

    /// Next frame within the window, or `None` if the client stays quiet
    pub async fn recv_within(&mut self, window: Duration) -> Option<Envelope> {
        tokio::time::timeout(window, self.inbound.recv())
            .await
            .ok()
            .flatten()
    }

    /// Send one raw text frame to the connected client
    pub async fn push(&self, text: impl Into<String>) {
        self.push_tx
            .send(text.into())
            .await
            .expect("backend task stopped");
    }

    /// Close the current connection; the accept loop keeps running
    pub async fn close_connection(&self) {
        self.close_tx.send(()).await.expect("backend task stopped");
    }
}

/// Config with short timings suited to tests
pub fn test_config(url: &str) -> Config {
    let mut config = Config::from_env().unwrap();
    config.backend_url = url.to_string();
    config.client_id = "test-client".to_string();
    config.session.reconnect_delay = Duration::from_millis(100);
    config.session.connect_timeout = Duration::from_secs(2);
    config.session.wake_cooldown = Duration::from_millis(200);
    config.session.barge_in_settle = Duration::from_millis(50);
    config.session.mute_timeout = Duration::from_millis(100);
    config
}

/// Poll a condition until it holds, failing the test after a timeout
pub async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = Instant::now() + RECV_TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Records every inbound message the connection dispatches
#[derive(Clone, Default)]
pub struct RecordingHandler {
    messages: Arc<Mutex<Vec<Inbound>>>,
}

impl RecordingHandler {
    pub fn messages(&self) -> Vec<Inbound> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, message: Inbound) {
        self.messages.lock().unwrap().push(message);
    }
}

/// Capture source replaying a fixed frame script, then pending forever
pub struct FrameSource {
    frames: VecDeque<Frame>,
}

impl FrameSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

#[async_trait(?Send)]
impl CaptureSource for FrameSource {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) {}

    async fn read_frame(&mut self) -> Result<Frame> {
        match self.frames.pop_front() {
            Some(frame) => Ok(frame),
            None => std::future::pending().await,
        }
    }
}

/// Scorer returning a fixed verdict per frame, then silence
pub struct ScriptedScorer {
    script: VecDeque<(bool, f32)>,
    resets: Arc<AtomicUsize>,
}

impl ScriptedScorer {
    pub fn new(script: Vec<(bool, f32)>, resets: Arc<AtomicUsize>) -> Self {
        Self {
            script: script.into(),
            resets,
        }
    }
}

impl WakeWordScorer for ScriptedScorer {
    fn load(&mut self) -> Result<()> {
        Ok(())
    }

    fn detect(&mut self, _frame: &[i16]) -> Result<(bool, f32)> {
        Ok(self.script.pop_front().unwrap_or((false, 0.0)))
    }

    fn reset(&mut self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

/// Records mute/unmute calls with their timing; can be made to fail or hang
#[derive(Clone, Default)]
pub struct RecordingOutput {
    events: Arc<Mutex<Vec<(&'static str, Instant)>>>,
    failing: Arc<std::sync::atomic::AtomicBool>,
    hanging: Arc<std::sync::atomic::AtomicBool>,
}

impl RecordingOutput {
    pub fn events(&self) -> Vec<(&'static str, Instant)> {
        self.events.lock().unwrap().clone()
    }

    /// Make every subsequent mute/unmute call return an error
    pub fn fail_calls(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Make every subsequent mute/unmute call block forever
    pub fn hang_calls(&self) {
        self.hanging.store(true, Ordering::SeqCst);
    }

    fn record(&self, call: &'static str) -> Result<()> {
        self.events.lock().unwrap().push((call, Instant::now()));
        if self.failing.load(Ordering::SeqCst) {
            return Err(aria_edge::Error::Audio(format!("{call} rigged to fail")));
        }
        Ok(())
    }

    async fn stall_if_rigged(&self) {
        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl OutputControl for RecordingOutput {
    async fn mute(&self) -> Result<()> {
        let result = self.record("mute");
        self.stall_if_rigged().await;
        result
    }

    async fn unmute(&self) -> Result<()> {
        let result = self.record("unmute");
        self.stall_if_rigged().await;
        result
    }
}

/// Records played clips and stop requests
#[derive(Clone, Default)]
pub struct RecordingPlayback {
    played: Arc<Mutex<Vec<(Vec<u8>, String)>>>,
    stops: Arc<AtomicUsize>,
}

impl RecordingPlayback {
    pub fn played(&self) -> Vec<(Vec<u8>, String)> {
        self.played.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaybackSink for RecordingPlayback {
    async fn play(&self, audio: &[u8], format: &str) -> Result<()> {
        self.played
            .lock()
            .unwrap()
            .push((audio.to_vec(), format.to_string()));
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Records transcript updates
#[derive(Clone, Default)]
pub struct RecordingTranscript {
    lines: Arc<Mutex<Vec<(String, bool)>>>,
}

impl RecordingTranscript {
    pub fn lines(&self) -> Vec<(String, bool)> {
        self.lines.lock().unwrap().clone()
    }
}

impl TranscriptSink for RecordingTranscript {
    fn transcript(&self, text: &str, is_final: bool) {
        self.lines
            .lock()
            .unwrap()
            .push((text.to_string(), is_final));
    }
}

/// A session wired to an in-process backend with recording collaborators
pub struct Harness {
    pub backend: Backend,
    pub session: Arc<Session>,
    pub state: Arc<SessionState>,
    pub queue: OutboundQueue,
    pub output: RecordingOutput,
    pub playback: RecordingPlayback,
    pub display: RecordingTranscript,
    pub scorer_resets: Arc<AtomicUsize>,
    // Held so the connection manager does not observe shutdown.
    shutdown_tx: mpsc::Sender<()>,
}

/// Start a full session against a fresh backend; waits for the handshake
pub async fn start_session() -> Harness {
    let mut backend = Backend::spawn().await;
    let config = test_config(&backend.url);

    let state = Arc::new(SessionState::new());
    let (queue, outbound_rx) = connection::outbound_channel();
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

    let scorer_resets = Arc::new(AtomicUsize::new(0));
    let scorer: Arc<Mutex<dyn WakeWordScorer>> = Arc::new(Mutex::new(ScriptedScorer::new(
        vec![],
        Arc::clone(&scorer_resets),
    )));

    let output = RecordingOutput::default();
    let playback = RecordingPlayback::default();
    let display = RecordingTranscript::default();
    let hooks = Hooks {
        output: Arc::new(output.clone()),
        playback: Arc::new(playback.clone()),
        display: Arc::new(display.clone()),
    };

    let session = Arc::new(Session::new(
        Arc::clone(&state),
        queue.clone(),
        scorer,
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
    tokio::spawn(manager.run());

    let ready = backend.recv().await;
    assert_eq!(ready.kind, "connection_ready");

    Harness {
        backend,
        session,
        state,
        queue,
        output,
        playback,
        display,
        scorer_resets,
        shutdown_tx,
    }
}
