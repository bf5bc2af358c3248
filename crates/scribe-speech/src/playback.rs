//! Text-to-speech playback.
//!
//! Text is split into sentence-sized chunks no longer than
//! `max_chunk_chars` and handed to the platform synthesizer one at a time
//! from a background task. Starting a new stream aborts the previous one
//! first, so chunks of two streams never interleave.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex as StdMutex};
use std::time::Duration;

use regex::Regex;
use scribe_core::config::PlaybackConfig;
use scribe_core::error::{Result, ScribeError};
use scribe_core::events::{EventBus, Notice, SessionEvent};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Shown once per session when the device cannot synthesize speech.
pub const PLAYBACK_UNAVAILABLE_NOTICE: &str = "Text-to-speech unavailable on this device.";

// =============================================================================
// Types
// =============================================================================

/// A platform voice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    pub lang: String,
}

impl Voice {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
        }
    }
}

/// One synthesis request.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub voice: Option<Voice>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

/// Caller-facing playback options.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakOptions {
    /// Exact voice name to prefer.
    pub voice: Option<String>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for SpeakOptions {
    fn default() -> Self {
        Self {
            voice: None,
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

impl SpeakOptions {
    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self {
            voice: config.voice.clone(),
            rate: config.rate,
            pitch: config.pitch,
            volume: config.volume,
        }
    }
}

// =============================================================================
// Synthesizer traits
// =============================================================================

/// Platform speech synthesizer.
pub trait SpeechSynthesizer: Send + Sync {
    fn voices(&self) -> Vec<Voice>;

    /// Speak one utterance, resolving when it has finished playing.
    fn speak(&self, utterance: Utterance) -> impl Future<Output = Result<()>> + Send;

    /// Silence any utterance currently playing.
    fn stop(&self);
}

/// Object-safe version of [`SpeechSynthesizer`], implemented for every
/// synthesizer through the blanket impl below.
pub trait DynSpeechSynthesizer: Send + Sync {
    fn voices(&self) -> Vec<Voice>;

    fn speak_boxed<'a>(
        &'a self,
        utterance: Utterance,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    fn stop(&self);
}

impl<T: SpeechSynthesizer> DynSpeechSynthesizer for T {
    fn voices(&self) -> Vec<Voice> {
        SpeechSynthesizer::voices(self)
    }

    fn speak_boxed<'a>(
        &'a self,
        utterance: Utterance,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.speak(utterance))
    }

    fn stop(&self) {
        SpeechSynthesizer::stop(self)
    }
}

// =============================================================================
// Chunking and voice selection
// =============================================================================

// A run ending in terminal punctuation, or the unterminated remainder.
static SENTENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^.!?]*[.!?]+|[^.!?]+").expect("Invalid sentence regex"));

/// Split a segment longer than `max_chars` at whitespace, hard-splitting
/// words that alone exceed the budget.
fn split_long(segment: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = segment;
    while rest.chars().count() > max_chars {
        // Byte offset just past the `max_chars`-th character.
        let limit = rest
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let cut = rest[..limit]
            .char_indices()
            .filter(|(_, c)| c.is_whitespace())
            .map(|(i, c)| i + c.len_utf8())
            .last()
            .filter(|&i| i > 0)
            .unwrap_or(limit);
        let (head, tail) = rest.split_at(cut);
        pieces.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

/// Break `text` into chunks of at most `max_chars` characters.
///
/// Sentences are packed greedily. Concatenating the returned chunks yields
/// `text` back, less any chunk that was whitespace only.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    let segments = SENTENCE
        .find_iter(text)
        .flat_map(|m| split_long(m.as_str(), max_chars));

    for segment in segments {
        let len = segment.chars().count();
        if current_len + len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(segment);
        current_len += len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks.retain(|c| !c.trim().is_empty());
    chunks
}

/// Pick a voice: the exact `preferred` name, else the first voice matching
/// one of `patterns` (in pattern order), else the first voice.
pub fn select_voice(voices: &[Voice], preferred: Option<&str>, patterns: &[String]) -> Option<Voice> {
    preferred
        .and_then(|name| voices.iter().find(|v| v.name == name))
        .or_else(|| {
            patterns
                .iter()
                .find_map(|p| voices.iter().find(|v| v.name.contains(p.as_str())))
        })
        .or_else(|| voices.first())
        .cloned()
}

// =============================================================================
// Reply playback preference
// =============================================================================

/// Whether assistant replies are read aloud.
pub trait PlaybackPreference: Send + Sync {
    fn speak_replies(&self) -> bool;
    fn set_speak_replies(&self, enabled: bool);
}

#[derive(Debug, Default)]
pub struct InMemoryPreference {
    enabled: AtomicBool,
}

impl InMemoryPreference {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }
}

impl PlaybackPreference for InMemoryPreference {
    fn speak_replies(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_speak_replies(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
}

// =============================================================================
// SpeechPlayback
// =============================================================================

/// Plays text through the platform synthesizer, one stream at a time.
pub struct SpeechPlayback {
    synthesizer: Option<Arc<dyn DynSpeechSynthesizer>>,
    config: PlaybackConfig,
    events: Option<EventBus>,
    current: Mutex<Option<JoinHandle<()>>>,
    speaking: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    /// Highest stream generation that has ended, played out or cancelled.
    finished: Arc<watch::Sender<u64>>,
    unavailable_notified: AtomicBool,
}

impl std::fmt::Debug for SpeechPlayback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechPlayback")
            .field("available", &self.is_available())
            .field("speaking", &self.is_speaking())
            .finish()
    }
}

impl SpeechPlayback {
    pub fn new(synthesizer: Arc<dyn DynSpeechSynthesizer>, config: PlaybackConfig) -> Self {
        Self::build(Some(synthesizer), config)
    }

    /// Playback on a device without speech synthesis. `speak` only reports
    /// the missing capability.
    pub fn unavailable(config: PlaybackConfig) -> Self {
        Self::build(None, config)
    }

    fn build(synthesizer: Option<Arc<dyn DynSpeechSynthesizer>>, config: PlaybackConfig) -> Self {
        Self {
            synthesizer,
            config,
            events: None,
            current: Mutex::new(None),
            speaking: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            finished: Arc::new(watch::Sender::new(0)),
            unavailable_notified: AtomicBool::new(false),
        }
    }

    /// Publish `PlaybackChanged` and `Notification` events on `events`.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn is_available(&self) -> bool {
        self.synthesizer.is_some()
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Start reading `text` aloud, replacing any stream in progress.
    ///
    /// Returns once playback has been scheduled; use [`wait`](Self::wait) to
    /// await the end of the stream.
    pub async fn speak(&self, text: &str, options: SpeakOptions) -> Result<()> {
        let Some(synthesizer) = self.synthesizer.clone() else {
            self.report_unavailable();
            return Ok(());
        };

        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            if !previous.is_finished() {
                synthesizer.stop();
                previous.abort();
                debug!("Previous playback stream cancelled");
            }
            let _ = previous.await;
        }

        let chunks = chunk_text(text, self.config.max_chunk_chars);
        if chunks.is_empty() {
            mark_finished(&self.finished, self.generation.load(Ordering::SeqCst));
            self.set_speaking(false);
            return Ok(());
        }

        let voice = select_voice(
            &synthesizer.voices(),
            options.voice.as_deref(),
            &self.config.preferred_voice_patterns,
        );
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            chunks = chunks.len(),
            voice = voice.as_ref().map(|v| v.name.as_str()).unwrap_or("default"),
            "Playback started"
        );
        self.set_speaking(true);

        let speaking = self.speaking.clone();
        let current_generation = self.generation.clone();
        let events = self.events.clone();
        let finished = self.finished.clone();
        *current = Some(tokio::spawn(async move {
            for chunk in chunks {
                let utterance = Utterance {
                    text: chunk,
                    voice: voice.clone(),
                    rate: options.rate,
                    pitch: options.pitch,
                    volume: options.volume,
                };
                if let Err(e) = synthesizer.speak_boxed(utterance).await {
                    warn!("Speech synthesis failed: {}", e);
                    break;
                }
            }
            if current_generation.load(Ordering::SeqCst) == generation {
                speaking.store(false, Ordering::SeqCst);
                if let Some(events) = events {
                    events.publish(SessionEvent::PlaybackChanged { speaking: false });
                }
            }
            mark_finished(&finished, generation);
        }));
        Ok(())
    }

    /// Stop the current stream, if any.
    pub async fn cancel(&self) {
        let previous = self.current.lock().await.take();
        if let Some(previous) = previous {
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            if !previous.is_finished() {
                if let Some(synthesizer) = &self.synthesizer {
                    synthesizer.stop();
                }
                previous.abort();
                info!("Playback cancelled");
            }
            let _ = previous.await;
            mark_finished(&self.finished, generation);
        }
        self.set_speaking(false);
    }

    /// Wait until the current stream, or any stream that supersedes it, has
    /// ended.
    ///
    /// The stream stays cancellable while this is pending: a `speak` or
    /// `cancel` issued meanwhile still stops it.
    pub async fn wait(&self) {
        let target = self.generation.load(Ordering::SeqCst);
        let mut finished = self.finished.subscribe();
        let _ = finished.wait_for(|done| *done >= target).await;
    }

    fn set_speaking(&self, speaking: bool) {
        let was = self.speaking.swap(speaking, Ordering::SeqCst);
        if was != speaking {
            if let Some(events) = &self.events {
                events.publish(SessionEvent::PlaybackChanged { speaking });
            }
        }
    }

    fn report_unavailable(&self) {
        if self.unavailable_notified.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!("{}", ScribeError::PlaybackUnavailable);
        if let Some(events) = &self.events {
            events.notify(Notice::warning(PLAYBACK_UNAVAILABLE_NOTICE));
        }
    }
}

fn mark_finished(finished: &watch::Sender<u64>, generation: u64) {
    finished.send_if_modified(|done| {
        if generation > *done {
            *done = generation;
            true
        } else {
            false
        }
    });
}

impl Drop for SpeechPlayback {
    fn drop(&mut self) {
        if let Ok(mut current) = self.current.try_lock() {
            if let Some(handle) = current.take() {
                handle.abort();
            }
        }
    }
}

// =============================================================================
// Mock implementation
// =============================================================================

/// Mock synthesizer that records each utterance once it has "played".
///
/// Clones share the record.
#[derive(Debug, Clone)]
pub struct MockSynthesizer {
    voices: Vec<Voice>,
    delay: Duration,
    spoken: Arc<StdMutex<Vec<Utterance>>>,
    stops: Arc<AtomicUsize>,
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self {
            voices: vec![
                Voice::new("Default Voice", "en-US"),
                Voice::new("Google US English", "en-US"),
            ],
            delay: Duration::from_millis(10),
            spoken: Arc::new(StdMutex::new(Vec::new())),
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Time each utterance takes to play.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_voices(mut self, voices: Vec<Voice>) -> Self {
        self.voices = voices;
        self
    }

    /// Utterances that finished playing, in order.
    pub fn spoken(&self) -> Vec<Utterance> {
        self.spoken.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn spoken_texts(&self) -> Vec<String> {
        self.spoken().into_iter().map(|u| u.text).collect()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl SpeechSynthesizer for MockSynthesizer {
    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    async fn speak(&self, utterance: Utterance) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        if let Ok(mut spoken) = self.spoken.lock() {
            spoken.push(utterance);
        }
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}
