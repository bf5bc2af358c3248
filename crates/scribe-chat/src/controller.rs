//! Turn controller: the per-session conversation state machine.
//!
//! Enforces one outstanding turn at a time:
//! - Idle -> AwaitingResponse (user turn submitted)
//! - AwaitingResponse -> Idle (answer appended, or synthesis failed)
//!
//! The user turn is appended before synthesis starts. Synthesis runs on a
//! spawned task so the caller is never blocked on network latency.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use scribe_core::config::ScribeConfig;
use scribe_core::error::ScribeError;
use scribe_core::events::{EventBus, Notice, SessionEvent};
use scribe_core::types::{ConversationMode, ConversationTurn, TurnId, VoiceMessage};
use scribe_speech::{InMemoryPreference, PlaybackPreference, SpeakOptions, SpeechPlayback};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::ChatError;
use crate::prompts::welcome_message;
use crate::synthesizer::ResponseSynthesizer;

/// Notification shown when a turn could not be answered.
pub const TURN_FAILED_NOTICE: &str = "Failed to generate response. Please try again.";

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnState {
    /// Ready to accept a submission.
    Idle,
    /// A user turn is waiting for its answer.
    AwaitingResponse,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnState::Idle => write!(f, "Idle"),
            TurnState::AwaitingResponse => write!(f, "AwaitingResponse"),
        }
    }
}

impl TurnState {
    pub fn can_transition_to(&self, target: &TurnState) -> bool {
        matches!(
            (self, target),
            (TurnState::Idle, TurnState::AwaitingResponse)
                | (TurnState::AwaitingResponse, TurnState::Idle)
        )
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// PendingTurn
// =============================================================================

/// Handle to a submitted turn whose answer is still being synthesized.
#[derive(Debug)]
pub struct PendingTurn {
    user_turn: TurnId,
    handle: JoinHandle<Result<ConversationTurn, ChatError>>,
}

impl PendingTurn {
    /// Id of the user turn that was appended on submission.
    pub fn user_turn_id(&self) -> TurnId {
        self.user_turn
    }

    /// Wait for the assistant turn.
    ///
    /// The controller is back in `Idle` by the time this returns, whatever
    /// the outcome.
    pub async fn wait(self) -> Result<ConversationTurn, ChatError> {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(ChatError::Engine(ScribeError::Service(format!(
                "turn task did not complete: {}",
                e
            )))),
        }
    }
}

// =============================================================================
// TurnController
// =============================================================================

struct Inner {
    synthesizer: Arc<ResponseSynthesizer>,
    state: Mutex<TurnState>,
    transcript: Mutex<Vec<ConversationTurn>>,
    mode: RwLock<ConversationMode>,
    use_advanced: AtomicBool,
    events: EventBus,
    playback: Option<Arc<SpeechPlayback>>,
    preference: Arc<dyn PlaybackPreference>,
    speak_options: SpeakOptions,
    max_message_length: usize,
    voice_placeholder: String,
}

/// Drives one conversation session.
///
/// Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct TurnController {
    inner: Arc<Inner>,
}

impl fmt::Debug for TurnController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnController")
            .field("state", &self.state())
            .field("mode", &self.mode())
            .field("turns", &self.transcript().len())
            .finish()
    }
}

/// Assembles a [`TurnController`].
pub struct TurnControllerBuilder {
    synthesizer: Arc<ResponseSynthesizer>,
    config: ScribeConfig,
    events: EventBus,
    playback: Option<Arc<SpeechPlayback>>,
    preference: Option<Arc<dyn PlaybackPreference>>,
}

impl TurnControllerBuilder {
    /// Publish session events on `events` instead of a private bus.
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Read replies aloud through `playback` whenever `preference` says so.
    pub fn playback(
        mut self,
        playback: Arc<SpeechPlayback>,
        preference: Arc<dyn PlaybackPreference>,
    ) -> Self {
        self.playback = Some(playback);
        self.preference = Some(preference);
        self
    }

    pub fn build(self) -> TurnController {
        let conversation = &self.config.conversation;
        let preference = self.preference.unwrap_or_else(|| {
            Arc::new(InMemoryPreference::new(self.config.playback.speak_replies))
        });
        TurnController {
            inner: Arc::new(Inner {
                synthesizer: self.synthesizer,
                state: Mutex::new(TurnState::Idle),
                transcript: Mutex::new(Vec::new()),
                mode: RwLock::new(conversation.mode),
                use_advanced: AtomicBool::new(conversation.use_advanced),
                events: self.events,
                playback: self.playback,
                preference,
                speak_options: SpeakOptions::from_config(&self.config.playback),
                max_message_length: conversation.max_message_length,
                voice_placeholder: conversation.voice_placeholder.clone(),
            }),
        }
    }
}

impl TurnController {
    pub fn new(synthesizer: Arc<ResponseSynthesizer>, config: &ScribeConfig) -> Self {
        Self::builder(synthesizer, config).build()
    }

    pub fn builder(synthesizer: Arc<ResponseSynthesizer>, config: &ScribeConfig) -> TurnControllerBuilder {
        TurnControllerBuilder {
            synthesizer,
            config: config.clone(),
            events: EventBus::default(),
            playback: None,
            preference: None,
        }
    }

    pub fn state(&self) -> TurnState {
        *lock(&self.inner.state)
    }

    pub fn transcript(&self) -> Vec<ConversationTurn> {
        lock(&self.inner.transcript).clone()
    }

    pub fn mode(&self) -> ConversationMode {
        *self
            .inner
            .mode
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Switch mode, starting a new session with an empty transcript.
    ///
    /// Rejected while a turn is awaiting its answer. Selecting the current
    /// mode changes nothing.
    pub fn set_mode(&self, mode: ConversationMode) -> Result<(), ChatError> {
        {
            let state = lock(&self.inner.state);
            if *state != TurnState::Idle {
                debug!("Mode change rejected while {}", *state);
                return Err(ChatError::TurnInProgress);
            }
            let mut current = self
                .inner
                .mode
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if *current == mode {
                return Ok(());
            }
            let from = *current;
            *current = mode;
            lock(&self.inner.transcript).clear();
            info!(from = %from, to = %mode, "Conversation mode changed, new session started");
        }
        self.inner
            .events
            .publish(SessionEvent::SessionReset { mode });
        Ok(())
    }

    pub fn use_advanced(&self) -> bool {
        self.inner.use_advanced.load(Ordering::SeqCst)
    }

    pub fn set_use_advanced(&self, enabled: bool) {
        self.inner.use_advanced.store(enabled, Ordering::SeqCst);
    }

    pub fn preference(&self) -> &Arc<dyn PlaybackPreference> {
        &self.inner.preference
    }

    pub fn synthesizer(&self) -> &Arc<ResponseSynthesizer> {
        &self.inner.synthesizer
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Greeting for the current mode. Not part of the transcript.
    pub fn welcome_message(&self) -> String {
        welcome_message(self.mode(), self.inner.synthesizer.is_advanced_ready())
    }

    /// Submit a typed message. Must be called within a tokio runtime.
    pub fn submit_text(&self, text: &str) -> Result<PendingTurn, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        self.check_length(text)?;
        self.begin(ConversationTurn::user(text, None), text.to_string())
    }

    /// Submit a recorded voice message. Must be called within a tokio runtime.
    ///
    /// A blank transcript is shown as the placeholder label; the audio stays
    /// attached either way.
    pub fn submit_voice(&self, message: VoiceMessage) -> Result<PendingTurn, ChatError> {
        let transcript = message.transcript.trim().to_string();
        self.check_length(&transcript)?;
        let displayed = if transcript.is_empty() {
            self.inner.voice_placeholder.clone()
        } else {
            transcript.clone()
        };
        self.begin(ConversationTurn::user(displayed, Some(message.audio)), transcript)
    }

    /// Submit a typed message and wait for the answer.
    pub async fn ask_text(&self, text: &str) -> Result<ConversationTurn, ChatError> {
        self.submit_text(text)?.wait().await
    }

    /// Submit a voice message and wait for the answer.
    pub async fn ask_voice(&self, message: VoiceMessage) -> Result<ConversationTurn, ChatError> {
        self.submit_voice(message)?.wait().await
    }

    fn check_length(&self, text: &str) -> Result<(), ChatError> {
        if text.chars().count() > self.inner.max_message_length {
            return Err(ChatError::MessageTooLong(self.inner.max_message_length));
        }
        Ok(())
    }

    fn begin(&self, user_turn: ConversationTurn, query: String) -> Result<PendingTurn, ChatError> {
        let user_turn_id = user_turn.id;
        {
            let mut state = lock(&self.inner.state);
            if !state.can_transition_to(&TurnState::AwaitingResponse) {
                debug!("Submission rejected while {}", *state);
                return Err(ChatError::TurnInProgress);
            }
            *state = TurnState::AwaitingResponse;
            lock(&self.inner.transcript).push(user_turn.clone());
        }
        info!(turn = %user_turn_id, voice = user_turn.audio.is_some(), "User turn submitted");
        self.inner
            .events
            .publish(SessionEvent::TurnAppended { turn: user_turn });
        self.inner
            .events
            .publish(SessionEvent::AwaitingChanged { awaiting: true });

        let mode = self.mode();
        let use_advanced = self.use_advanced();
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let synthesizer = inner.synthesizer.clone();
            // Run synthesis on its own task so a panic still ends the turn.
            let synthesis =
                tokio::spawn(async move { synthesizer.answer(&query, mode, use_advanced).await });
            let outcome = match synthesis.await {
                Ok(result) => result,
                Err(e) => Err(ScribeError::Service(format!("synthesis task failed: {}", e))),
            };
            inner.finish(outcome).await
        });

        Ok(PendingTurn {
            user_turn: user_turn_id,
            handle,
        })
    }
}

impl Inner {
    async fn finish(
        &self,
        outcome: scribe_core::error::Result<crate::synthesizer::SynthesizedAnswer>,
    ) -> Result<ConversationTurn, ChatError> {
        match outcome {
            Ok(answer) => {
                let turn = ConversationTurn::assistant(answer.text);
                self.complete_turn(Some(turn.clone()));
                info!(turn = %turn.id, sources = answer.sources.len(), "Assistant turn appended");

                if self.preference.speak_replies() {
                    if let Some(playback) = &self.playback {
                        if let Err(e) = playback.speak(&turn.text, self.speak_options.clone()).await {
                            warn!("Reply playback failed: {}", e);
                        }
                    }
                }
                Ok(turn)
            }
            Err(e) => {
                error!("Turn failed: {}", e);
                self.complete_turn(None);
                self.events.notify(Notice::error(TURN_FAILED_NOTICE));
                Err(ChatError::Engine(e))
            }
        }
    }

    /// Append the assistant turn, if any, and return to Idle.
    fn complete_turn(&self, turn: Option<ConversationTurn>) {
        {
            let mut state = lock(&self.state);
            if let Some(turn) = &turn {
                lock(&self.transcript).push(turn.clone());
            }
            *state = TurnState::Idle;
        }
        if let Some(turn) = turn {
            self.events.publish(SessionEvent::TurnAppended { turn });
        }
        self.events
            .publish(SessionEvent::AwaitingChanged { awaiting: false });
    }
}
