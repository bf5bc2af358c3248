//! Scribe speech crate - microphone capture with streaming recognition, and
//! chunked speech playback.
//!
//! Platform audio, recognition and synthesis sit behind the [`Microphone`],
//! [`SpeechRecognizer`] and [`SpeechSynthesizer`] traits. Mock
//! implementations are provided for tests and headless runs.

pub mod capture;
pub mod playback;

pub use capture::{
    CaptureAvailability, Microphone, MockMicrophone, MockRecognizer, RecognitionSegment,
    SpeechCapture, SpeechRecognizer,
};
pub use playback::{
    chunk_text, select_voice, DynSpeechSynthesizer, InMemoryPreference, MockSynthesizer,
    PlaybackPreference, SpeakOptions, SpeechPlayback, SpeechSynthesizer, Utterance, Voice,
};
