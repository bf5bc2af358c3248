use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{ConversationMode, ConversationTurn};

/// Severity of a user-facing notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Toast-style message for the presentation layer. Always plain language.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Events emitted by a conversation session and consumed by the UI layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SessionEvent {
    /// The transcript was cleared and a new session began in `mode`.
    SessionReset { mode: ConversationMode },
    /// A turn was appended to the transcript.
    TurnAppended { turn: ConversationTurn },
    /// The session started or stopped waiting for an assistant reply.
    AwaitingChanged { awaiting: bool },
    /// The microphone started or stopped recording.
    RecordingChanged { recording: bool },
    /// Spoken playback started or finished.
    PlaybackChanged { speaking: bool },
    /// A recoverable problem worth surfacing to the user.
    Notification { notice: Notice },
}

/// Broadcast channel shared by the components of one session.
///
/// Cloning is cheap; every clone publishes to the same subscribers. Publishing
/// with no live subscriber is not an error.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Session event dropped: no subscribers");
        }
    }

    pub fn notify(&self, notice: Notice) {
        self.publish(SessionEvent::Notification { notice });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(SessionEvent::AwaitingChanged { awaiting: true });
        bus.notify(Notice::warning("heads up"));

        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::AwaitingChanged { awaiting: true }
        );
        match rx.recv().await.unwrap() {
            SessionEvent::Notification { notice } => {
                assert_eq!(notice.level, NoticeLevel::Warning);
                assert_eq!(notice.message, "heads up");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::new(4);
        bus.publish(SessionEvent::RecordingChanged { recording: true });
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = SessionEvent::PlaybackChanged { speaking: false };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "playback_changed");
        assert_eq!(json["speaking"], false);

        let reset = serde_json::to_value(SessionEvent::SessionReset {
            mode: ConversationMode::Quiz,
        })
        .unwrap();
        assert_eq!(reset["type"], "session_reset");
        assert_eq!(reset["mode"], "quiz");
    }
}
