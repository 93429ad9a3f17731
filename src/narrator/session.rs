//! Single-session narration over a speech engine

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

use super::engine::{SpeechErrorKind, SpeechHost, Utterance};
use super::question::{explanation_script, option_script, question_script, Question};
use super::sanitize::to_plain_text;
use super::voice::select_voice;
use crate::config::NarratorConfig;

/// Errors delivered to the caller of a narration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NarratorError {
    /// The engine failed for a reason other than cancellation
    #[error("speech engine error: {0}")]
    Engine(SpeechErrorKind),
}

pub type Callback = Box<dyn FnOnce() + Send + 'static>;
pub type ErrorCallback = Box<dyn FnOnce(&NarratorError) + Send + 'static>;

/// Per-call speech settings; unset values use the configured defaults
#[derive(Default)]
pub struct SpeakOptions {
    pub rate: Option<f32>,
    pub pitch: Option<f32>,
    pub volume: Option<f32>,
    /// Runs when the engine starts speaking
    pub on_start: Option<Callback>,
    /// Runs when the utterance completes normally
    pub on_end: Option<Callback>,
    /// Runs on a non-cancellation engine error
    pub on_error: Option<ErrorCallback>,
}

impl SpeakOptions {
    pub fn rate(mut self, rate: f32) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn pitch(mut self, pitch: f32) -> Self {
        self.pitch = Some(pitch);
        self
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn on_start(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_start = Some(Box::new(callback));
        self
    }

    pub fn on_end(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_end = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl FnOnce(&NarratorError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }
}

/// Narration lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationState {
    Idle,
    Speaking,
    Paused,
}

enum Outcome {
    Completed,
    Canceled,
    Failed(SpeechErrorKind),
}

/// The one in-flight narration
struct Session {
    id: u64,
    /// Stays `Idle` until the engine reports that speech started
    state: NarrationState,
    done: oneshot::Sender<Result<(), NarratorError>>,
    on_start: Option<Callback>,
    on_end: Option<Callback>,
    on_error: Option<ErrorCallback>,
}

impl Session {
    /// Settles the caller's pending call; must run without the state lock held
    fn finish(self, outcome: Outcome) {
        let result = match outcome {
            Outcome::Completed => {
                if let Some(on_end) = self.on_end {
                    on_end();
                }
                Ok(())
            }
            Outcome::Canceled => Ok(()),
            Outcome::Failed(kind) => {
                let error = NarratorError::Engine(kind);
                if let Some(on_error) = self.on_error {
                    on_error(&error);
                }
                Err(error)
            }
        };
        // The caller may have stopped waiting
        let _ = self.done.send(result);
    }
}

#[derive(Default)]
struct Inner {
    last_id: u64,
    session: Option<Session>,
    focused_question: Option<String>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

/// Engine progress reports, scoped to one session
///
/// Reports for a session that has since been replaced or stopped are ignored.
#[derive(Clone)]
pub struct UtteranceEvents {
    session: u64,
    inner: Weak<Mutex<Inner>>,
}

impl UtteranceEvents {
    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn started(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let on_start = {
            let mut guard = lock(&inner);
            match guard.session.as_mut() {
                Some(session) if session.id == self.session => {
                    if session.state == NarrationState::Idle {
                        session.state = NarrationState::Speaking;
                    }
                    session.on_start.take()
                }
                _ => {
                    debug!(session = self.session, "ignoring start of stale session");
                    None
                }
            }
        };
        if let Some(on_start) = on_start {
            on_start();
        }
    }

    pub fn finished(&self) {
        if let Some(session) = self.take_session() {
            session.finish(Outcome::Completed);
        }
    }

    pub fn failed(&self, kind: SpeechErrorKind) {
        if let Some(session) = self.take_session() {
            if kind.is_cancellation() {
                session.finish(Outcome::Canceled);
            } else {
                debug!(session = self.session, error = %kind, "narration failed");
                session.finish(Outcome::Failed(kind));
            }
        }
    }

    fn take_session(&self) -> Option<Session> {
        let inner = self.inner.upgrade()?;
        let mut guard = lock(&inner);
        match &guard.session {
            Some(session) if session.id == self.session => guard.session.take(),
            _ => {
                debug!(session = self.session, "ignoring end of stale session");
                None
            }
        }
    }
}

/// Reads text aloud, one narration at a time
///
/// Starting a narration cancels the current one; its caller resolves as if
/// stopped. All operations are no-ops while the host offers no engine.
pub struct VoiceNarrator {
    host: Arc<dyn SpeechHost>,
    config: NarratorConfig,
    inner: Arc<Mutex<Inner>>,
}

impl VoiceNarrator {
    pub fn new(host: Arc<dyn SpeechHost>, config: NarratorConfig) -> Self {
        Self {
            host,
            config,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn is_available(&self) -> bool {
        self.host.engine().is_some()
    }

    pub fn state(&self) -> NarrationState {
        lock(&self.inner)
            .session
            .as_ref()
            .map_or(NarrationState::Idle, |session| session.state)
    }

    /// True while speaking or paused mid-utterance
    pub fn is_speaking(&self) -> bool {
        self.state() != NarrationState::Idle
    }

    /// Speaks `text` after stripping markup
    ///
    /// Resolves when the utterance completes or is canceled; rejects on any
    /// other engine error. Empty text resolves immediately.
    pub async fn start(&self, text: &str, options: SpeakOptions) -> Result<(), NarratorError> {
        self.speak(to_plain_text(text), options).await
    }

    pub async fn read_question(
        &self,
        question: &Question,
        options: SpeakOptions,
    ) -> Result<(), NarratorError> {
        match question_script(question) {
            Some(script) => self.speak(script, options).await,
            None => Ok(()),
        }
    }

    pub async fn read_option(
        &self,
        key: &str,
        value: &str,
        options: SpeakOptions,
    ) -> Result<(), NarratorError> {
        match option_script(key, value) {
            Some(script) => self.speak(script, options).await,
            None => Ok(()),
        }
    }

    pub async fn read_explanation(
        &self,
        text: &str,
        options: SpeakOptions,
    ) -> Result<(), NarratorError> {
        match explanation_script(text) {
            Some(script) => self.speak(script, options).await,
            None => Ok(()),
        }
    }

    /// Speaks already-plain text
    async fn speak(&self, text: String, options: SpeakOptions) -> Result<(), NarratorError> {
        let Some(engine) = self.host.engine() else {
            debug!("speech synthesis unavailable");
            return Ok(());
        };
        if text.is_empty() {
            return Ok(());
        }

        let SpeakOptions {
            rate,
            pitch,
            volume,
            on_start,
            on_end,
            on_error,
        } = options;

        let (done, pending) = oneshot::channel();
        let (id, previous) = {
            let mut inner = lock(&self.inner);
            inner.last_id += 1;
            let id = inner.last_id;
            let previous = inner.session.replace(Session {
                id,
                state: NarrationState::Idle,
                done,
                on_start,
                on_end,
                on_error,
            });
            (id, previous)
        };

        if let Some(previous) = previous {
            debug!(previous = previous.id, session = id, "replacing active narration");
            engine.cancel();
            previous.finish(Outcome::Canceled);
        }

        let voices = engine.voices();
        let utterance = Utterance {
            text,
            voice: select_voice(&voices, &self.config.preferred_regions).cloned(),
            rate: rate.unwrap_or(self.config.rate),
            pitch: pitch.unwrap_or(self.config.pitch),
            volume: volume.unwrap_or(self.config.volume),
        };
        debug!(session = id, voice = ?utterance.voice.as_ref().map(|v| &v.name), "speaking");

        engine.speak(
            utterance,
            UtteranceEvents {
                session: id,
                inner: Arc::downgrade(&self.inner),
            },
        );

        // A dropped sender means the session was discarded without a report
        pending.await.unwrap_or(Ok(()))
    }

    /// Pauses a speaking narration; no-op in any other state
    pub fn pause(&self) {
        let Some(engine) = self.host.engine() else {
            return;
        };
        if self.transition(NarrationState::Speaking, NarrationState::Paused) {
            engine.pause();
        }
    }

    /// Resumes a paused narration; no-op in any other state
    pub fn resume(&self) {
        let Some(engine) = self.host.engine() else {
            return;
        };
        if self.transition(NarrationState::Paused, NarrationState::Speaking) {
            engine.resume();
        }
    }

    fn transition(&self, from: NarrationState, to: NarrationState) -> bool {
        let mut inner = lock(&self.inner);
        match inner.session.as_mut() {
            Some(session) if session.state == from => {
                session.state = to;
                true
            }
            _ => false,
        }
    }

    /// Cancels speech and discards the session; the pending call resolves
    pub fn stop(&self) {
        let session = lock(&self.inner).session.take();
        if let Some(engine) = self.host.engine() {
            engine.cancel();
        }
        if let Some(session) = session {
            debug!(session = session.id, "narration stopped");
            session.finish(Outcome::Canceled);
        }
    }

    /// Records the question on screen; switching to another one stops narration
    pub fn focus_question(&self, key: &str) {
        let switched = {
            let mut inner = lock(&self.inner);
            let switched = inner
                .focused_question
                .as_deref()
                .is_some_and(|current| current != key);
            inner.focused_question = Some(key.to_string());
            switched
        };
        if switched {
            self.stop();
        }
    }
}
