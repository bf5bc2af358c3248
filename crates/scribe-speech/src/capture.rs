//! Microphone recording with concurrent streaming recognition.
//!
//! A recording drains two platform channels in parallel: raw audio buffers
//! from the [`Microphone`] and [`RecognitionSegment`]s from the
//! [`SpeechRecognizer`]. Both feed one shared `CaptureSession`. `stop`
//! asks both sides to finalize, waits for the drains up to
//! `finalize_timeout_ms`, and assembles a [`VoiceMessage`].
//!
//! The microphone is held through a lease guard and released on every exit
//! path, including when the capture itself is dropped mid-recording.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use scribe_core::config::CaptureConfig;
use scribe_core::error::{Result, ScribeError};
use scribe_core::events::{EventBus, SessionEvent};
use scribe_core::types::{AudioClip, VoiceMessage};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// =============================================================================
// Types
// =============================================================================

/// One recognition result. Interim results are superseded; only final
/// segments make it into the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionSegment {
    pub text: String,
    pub is_final: bool,
}

impl RecognitionSegment {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Whether the microphone can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureAvailability {
    /// Not yet requested.
    Unknown,
    Available,
    /// Permission was refused. Sticky for the lifetime of the capture.
    Denied,
}

// =============================================================================
// Platform traits
// =============================================================================

/// Platform microphone.
///
/// `acquire` starts pushing audio buffers into `sink`. `finalize` flushes any
/// buffered audio and drops the sink, which ends the drain. `release` gives
/// the device back and must be safe to call more than once.
pub trait Microphone: Send + Sync + 'static {
    fn acquire(
        &self,
        sink: mpsc::UnboundedSender<Vec<u8>>,
    ) -> impl Future<Output = Result<()>> + Send;

    fn finalize(&self);

    fn release(&self);
}

/// Platform streaming speech-to-text.
///
/// `start` pushes segments into `sink` until `finalize` flushes the last
/// final segment and drops the sink.
pub trait SpeechRecognizer: Send + Sync + 'static {
    fn start(
        &self,
        sink: mpsc::UnboundedSender<RecognitionSegment>,
    ) -> impl Future<Output = Result<()>> + Send;

    fn finalize(&self);
}

// =============================================================================
// Capture
// =============================================================================

#[derive(Debug, Default)]
struct CaptureSession {
    buffers: Vec<Vec<u8>>,
    segments: Vec<String>,
}

/// Releases the microphone when dropped.
struct MicrophoneLease<M: Microphone> {
    microphone: Arc<M>,
}

impl<M: Microphone> Drop for MicrophoneLease<M> {
    fn drop(&mut self) {
        self.microphone.release();
        debug!("Microphone released");
    }
}

struct ActiveRecording<M: Microphone> {
    session: Arc<Mutex<CaptureSession>>,
    audio_task: JoinHandle<()>,
    speech_task: Option<JoinHandle<()>>,
    lease: MicrophoneLease<M>,
}

impl<M: Microphone> Drop for ActiveRecording<M> {
    fn drop(&mut self) {
        self.audio_task.abort();
        if let Some(task) = &self.speech_task {
            task.abort();
        }
    }
}

/// Records one voice message at a time.
pub struct SpeechCapture<M: Microphone, R: SpeechRecognizer> {
    microphone: Arc<M>,
    recognizer: Arc<R>,
    config: CaptureConfig,
    events: Option<EventBus>,
    availability: RwLock<CaptureAvailability>,
    recording: AtomicBool,
    active: Mutex<Option<ActiveRecording<M>>>,
}

impl<M: Microphone, R: SpeechRecognizer> std::fmt::Debug for SpeechCapture<M, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechCapture")
            .field("availability", &self.availability())
            .field("recording", &self.is_recording())
            .finish()
    }
}

impl<M: Microphone, R: SpeechRecognizer> SpeechCapture<M, R> {
    pub fn new(microphone: Arc<M>, recognizer: Arc<R>, config: CaptureConfig) -> Self {
        Self {
            microphone,
            recognizer,
            config,
            events: None,
            availability: RwLock::new(CaptureAvailability::Unknown),
            recording: AtomicBool::new(false),
            active: Mutex::new(None),
        }
    }

    /// Publish `RecordingChanged` on `events`.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn availability(&self) -> CaptureAvailability {
        self.availability
            .read()
            .map(|a| *a)
            .unwrap_or(CaptureAvailability::Unknown)
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    fn set_availability(&self, availability: CaptureAvailability) {
        if let Ok(mut current) = self.availability.write() {
            *current = availability;
        }
    }

    fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::SeqCst);
        if let Some(events) = &self.events {
            events.publish(SessionEvent::RecordingChanged { recording });
        }
    }

    /// Acquire the microphone and begin recording and recognition.
    ///
    /// Fails with `ScribeError::Permission` when access is refused, now or
    /// on any earlier call.
    pub async fn start(&self) -> Result<()> {
        if self.availability() == CaptureAvailability::Denied {
            return Err(ScribeError::Permission(
                "microphone access was previously denied".to_string(),
            ));
        }

        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(ScribeError::Capture("already recording".to_string()));
        }

        let (audio_tx, mut audio_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        if let Err(e) = self.microphone.acquire(audio_tx).await {
            if matches!(e, ScribeError::Permission(_)) {
                warn!("Microphone permission denied");
                self.set_availability(CaptureAvailability::Denied);
            }
            return Err(e);
        }
        let lease = MicrophoneLease {
            microphone: self.microphone.clone(),
        };
        self.set_availability(CaptureAvailability::Available);

        let session = Arc::new(Mutex::new(CaptureSession::default()));

        let audio_session = session.clone();
        let audio_task = tokio::spawn(async move {
            while let Some(buffer) = audio_rx.recv().await {
                audio_session.lock().await.buffers.push(buffer);
            }
        });

        let (speech_tx, mut speech_rx) = mpsc::unbounded_channel::<RecognitionSegment>();
        let speech_task = match self.recognizer.start(speech_tx).await {
            Ok(()) => {
                let speech_session = session.clone();
                Some(tokio::spawn(async move {
                    while let Some(segment) = speech_rx.recv().await {
                        if segment.is_final {
                            speech_session.lock().await.segments.push(segment.text);
                        }
                    }
                }))
            }
            Err(e) => {
                warn!("Speech recognition unavailable, recording audio only: {}", e);
                None
            }
        };

        *active = Some(ActiveRecording {
            session,
            audio_task,
            speech_task,
            lease,
        });
        drop(active);

        info!("Recording started");
        self.set_recording(true);
        Ok(())
    }

    /// Finish the recording and return the captured voice message.
    ///
    /// Drains that outlive `finalize_timeout_ms` are aborted and whatever
    /// they collected so far is kept.
    pub async fn stop(&self) -> Result<VoiceMessage> {
        let mut recording = self
            .active
            .lock()
            .await
            .take()
            .ok_or_else(|| ScribeError::Capture("not recording".to_string()))?;

        self.microphone.finalize();
        if recording.speech_task.is_some() {
            self.recognizer.finalize();
        }

        let timeout = Duration::from_millis(self.config.finalize_timeout_ms);
        let drained = tokio::time::timeout(timeout, async {
            let _ = (&mut recording.audio_task).await;
            if let Some(task) = recording.speech_task.as_mut() {
                let _ = task.await;
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                timeout_ms = self.config.finalize_timeout_ms,
                "Capture did not finalize in time; keeping partial data"
            );
        }
        let session = recording.session.clone();
        // Aborts any drain still running and releases the microphone.
        drop(recording);

        let session = session.lock().await;
        let bytes: Vec<u8> = session.buffers.concat();
        let transcript = session.segments.join(" ").trim().to_string();
        drop(session);

        info!(
            audio_bytes = bytes.len(),
            transcript_chars = transcript.chars().count(),
            "Recording stopped"
        );
        self.set_recording(false);

        Ok(VoiceMessage {
            audio: AudioClip::new(bytes, self.config.mime_type.clone()),
            transcript,
        })
    }
}

// =============================================================================
// Mock implementations
// =============================================================================

/// Mock microphone for tests and headless runs.
///
/// Sends its scripted buffers on `acquire` and keeps the sink open until
/// `finalize`. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockMicrophone {
    buffers: Vec<Vec<u8>>,
    deny: bool,
    sink: Arc<StdMutex<Option<mpsc::UnboundedSender<Vec<u8>>>>>,
    acquired: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl MockMicrophone {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers delivered as soon as the microphone is acquired.
    pub fn with_buffers(buffers: Vec<Vec<u8>>) -> Self {
        Self {
            buffers,
            ..Self::default()
        }
    }

    /// A microphone whose permission prompt is always refused.
    pub fn denied() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    /// Deliver one more buffer to an active recording.
    pub fn push(&self, buffer: Vec<u8>) -> bool {
        match self.sink.lock() {
            Ok(sink) => sink.as_ref().is_some_and(|tx| tx.send(buffer).is_ok()),
            Err(_) => false,
        }
    }

    pub fn acquire_count(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl Microphone for MockMicrophone {
    async fn acquire(&self, sink: mpsc::UnboundedSender<Vec<u8>>) -> Result<()> {
        if self.deny {
            return Err(ScribeError::Permission(
                "user refused microphone access".to_string(),
            ));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        for buffer in &self.buffers {
            let _ = sink.send(buffer.clone());
        }
        if let Ok(mut slot) = self.sink.lock() {
            *slot = Some(sink);
        }
        Ok(())
    }

    fn finalize(&self) {
        if let Ok(mut slot) = self.sink.lock() {
            slot.take();
        }
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Mock recognizer that replays scripted segments.
#[derive(Debug, Clone, Default)]
pub struct MockRecognizer {
    segments: Vec<RecognitionSegment>,
    fail_start: bool,
    stall: bool,
    sink: Arc<StdMutex<Option<mpsc::UnboundedSender<RecognitionSegment>>>>,
}

impl MockRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_segments(segments: Vec<RecognitionSegment>) -> Self {
        Self {
            segments,
            ..Self::default()
        }
    }

    /// A recognizer that cannot start.
    pub fn unavailable() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    /// Never closes its sink on `finalize`.
    pub fn stalling(mut self) -> Self {
        self.stall = true;
        self
    }
}

impl SpeechRecognizer for MockRecognizer {
    async fn start(&self, sink: mpsc::UnboundedSender<RecognitionSegment>) -> Result<()> {
        if self.fail_start {
            return Err(ScribeError::Capture(
                "speech recognition not supported".to_string(),
            ));
        }
        for segment in &self.segments {
            let _ = sink.send(segment.clone());
        }
        if let Ok(mut slot) = self.sink.lock() {
            *slot = Some(sink);
        }
        Ok(())
    }

    fn finalize(&self) {
        if self.stall {
            return;
        }
        if let Ok(mut slot) = self.sink.lock() {
            slot.take();
        }
    }
}
