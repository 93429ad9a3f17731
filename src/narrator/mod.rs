//! Read-aloud narration of practice questions
//!
//! `VoiceNarrator` wraps a speech engine with play/pause/resume/stop controls
//! and a strict one-narration-at-a-time model. Each narration gets a session
//! number; engine reports for an older session are discarded, so a replaced or
//! stopped narration can never settle a newer caller.
//!
//! Question text may contain markup, which is stripped before speaking.

mod engine;
mod question;
mod sanitize;
mod session;
mod system;
mod voice;

pub use engine::{NoSpeech, SpeechEngine, SpeechErrorKind, SpeechHost, Utterance};
pub use question::{
    explanation_script, option_script, parse_question_set, question_script, Question,
};
pub use sanitize::to_plain_text;
pub use session::{
    Callback, ErrorCallback, NarrationState, NarratorError, SpeakOptions, UtteranceEvents,
    VoiceNarrator,
};
pub use system::{ProcessEngine, SystemSpeechHost};
pub use voice::{select_voice, Voice};
