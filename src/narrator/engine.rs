//! Speech engine abstraction
//!
//! A `SpeechHost` is asked for its engine on every narrator call, since the
//! capability may only become available after startup. The engine speaks one
//! utterance at a time and reports progress through the `UtteranceEvents`
//! handle it was given.

use std::sync::Arc;

use thiserror::Error;

use super::session::UtteranceEvents;
use super::voice::Voice;

/// Failure reported by the engine for an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SpeechErrorKind {
    /// Utterance removed by an explicit cancel
    #[error("speech canceled")]
    Canceled,
    /// Utterance cut off by another one
    #[error("speech interrupted")]
    Interrupted,
    #[error("audio output busy")]
    AudioBusy,
    #[error("audio hardware error")]
    AudioHardware,
    #[error("speech synthesizer unavailable")]
    SynthesisUnavailable,
    #[error("speech synthesis failed")]
    SynthesisFailed,
    #[error("language unavailable")]
    LanguageUnavailable,
    #[error("voice unavailable")]
    VoiceUnavailable,
    #[error("text too long")]
    TextTooLong,
    #[error("invalid speech argument")]
    InvalidArgument,
    #[error("speech not allowed")]
    NotAllowed,
}

impl SpeechErrorKind {
    /// Cancellation-class errors represent an intentional stop
    pub fn is_cancellation(self) -> bool {
        matches!(self, Self::Canceled | Self::Interrupted)
    }
}

/// One discrete unit of speech handed to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    /// Plain text to speak
    pub text: String,
    /// Voice override; `None` uses the engine default
    pub voice: Option<Voice>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

/// A speech synthesizer
///
/// Implementations must not call back into `UtteranceEvents` while holding
/// locks the narrator could need, but may call from any thread.
pub trait SpeechEngine: Send + Sync {
    /// Voices currently available
    fn voices(&self) -> Vec<Voice>;

    /// Starts speaking; progress is reported through `events`
    fn speak(&self, utterance: Utterance, events: UtteranceEvents);

    fn pause(&self);

    fn resume(&self);

    /// Stops and discards the current utterance
    fn cancel(&self);
}

/// Environment that may or may not offer a speech engine
pub trait SpeechHost: Send + Sync {
    fn engine(&self) -> Option<Arc<dyn SpeechEngine>>;
}

/// Host without speech support; every narrator call becomes a no-op
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSpeech;

impl SpeechHost for NoSpeech {
    fn engine(&self) -> Option<Arc<dyn SpeechEngine>> {
        None
    }
}
