//! Practice screen state
//!
//! Holds the loaded question set, the learner's selections and the narrator,
//! and maps keyboard input to navigation and read-aloud controls.

use std::collections::BTreeMap;
use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent};
use tokio::sync::mpsc;

use crate::narrator::{NarrationState, NarratorError, Question, SpeakOptions, VoiceNarrator};

/// Option keys reachable from the keyboard, in display order
const OPTION_KEYS: [&str; 5] = ["a", "b", "c", "d", "e"];

/// Application state enum representing the current view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppState {
    /// Questions are being fetched
    Loading,
    /// Working through the question set
    Practice,
    /// Questions could not be loaded
    Failed(String),
}

/// Results of detached narrations, sent back to the main loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NarrationMessage {
    Finished,
    Failed(String),
}

/// Main application struct managing state and data
pub struct App {
    /// Current application state/view
    pub state: AppState,
    /// Title shown in the header (subject or file name)
    pub title: String,
    pub questions: Vec<Question>,
    /// Index of the question on screen
    pub current: usize,
    /// Option chosen per question index
    pub selections: BTreeMap<usize, String>,
    /// Whether the correct answer and explanation are shown
    pub reveal: bool,
    /// Flag to show help overlay
    pub show_help: bool,
    /// Flag indicating the application should quit
    pub should_quit: bool,
    /// Last narration problem, shown in the status bar
    pub status: Option<String>,
    narrator: Arc<VoiceNarrator>,
    messages_tx: mpsc::UnboundedSender<NarrationMessage>,
    messages_rx: mpsc::UnboundedReceiver<NarrationMessage>,
}

impl App {
    pub fn new(title: impl Into<String>, narrator: Arc<VoiceNarrator>) -> Self {
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        Self {
            state: AppState::Loading,
            title: title.into(),
            questions: Vec::new(),
            current: 0,
            selections: BTreeMap::new(),
            reveal: false,
            show_help: false,
            should_quit: false,
            status: None,
            narrator,
            messages_tx,
            messages_rx,
        }
    }

    /// Installs the loaded questions and shows the first one
    pub fn load_questions(&mut self, questions: Vec<Question>) {
        if questions.is_empty() {
            self.state = AppState::Failed("The question set is empty".to_string());
            return;
        }
        self.questions = questions;
        self.current = 0;
        self.state = AppState::Practice;
        self.narrator.focus_question(&self.question_key());
    }

    pub fn load_failed(&mut self, reason: impl Into<String>) {
        self.state = AppState::Failed(reason.into());
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    pub fn narration_state(&self) -> NarrationState {
        self.narrator.state()
    }

    pub fn narration_available(&self) -> bool {
        self.narrator.is_available()
    }

    /// Identity of the question on screen, used to stop stale narration
    fn question_key(&self) -> String {
        match self.current_question().and_then(|q| q.id) {
            Some(id) => format!("id:{}", id),
            None => format!("index:{}", self.current),
        }
    }

    /// Number of questions with a selected option
    pub fn answered_count(&self) -> usize {
        self.selections.len()
    }

    /// Handles keyboard input and updates state accordingly
    ///
    /// # Key Bindings
    /// - `q`/`Esc`: Quit (Esc closes help first)
    /// - `←`/`h`, `→`/`l`: Previous / next question
    /// - `a`-`e`: Select an option
    /// - `Space`/`r`: Read the question and its options
    /// - `1`-`5`: Read a single option
    /// - `t`: Read the explanation
    /// - `x`: Toggle the answer
    /// - `p`: Pause or resume, `s`: Stop
    /// - `?`: Toggle help
    pub fn handle_key(&mut self, key_event: KeyEvent) {
        if self.show_help {
            match key_event.code {
                KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q') => {
                    self.show_help = false;
                }
                _ => {}
            }
            return;
        }

        if self.state != AppState::Practice {
            if matches!(key_event.code, KeyCode::Char('q') | KeyCode::Esc) {
                self.should_quit = true;
            }
            return;
        }

        match key_event.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.narrator.stop();
                self.should_quit = true;
            }
            KeyCode::Left | KeyCode::Char('h') => self.move_to(self.current.checked_sub(1)),
            KeyCode::Right | KeyCode::Char('l') => self.move_to(Some(self.current + 1)),
            KeyCode::Char(c @ 'a'..='e') => self.select_option(c),
            KeyCode::Char(' ') | KeyCode::Char('r') => self.read_question(),
            KeyCode::Char(c @ '1'..='5') => self.read_option(c as usize - '1' as usize),
            KeyCode::Char('t') => self.read_explanation(),
            KeyCode::Char('x') => self.reveal = !self.reveal,
            KeyCode::Char('p') => match self.narrator.state() {
                NarrationState::Speaking => self.narrator.pause(),
                NarrationState::Paused => self.narrator.resume(),
                NarrationState::Idle => {}
            },
            KeyCode::Char('s') => self.narrator.stop(),
            KeyCode::Char('?') => self.show_help = true,
            _ => {}
        }
    }

    fn move_to(&mut self, index: Option<usize>) {
        let Some(index) = index.filter(|i| *i < self.questions.len()) else {
            return;
        };
        if index != self.current {
            self.current = index;
            self.reveal = false;
            self.narrator.focus_question(&self.question_key());
        }
    }

    fn select_option(&mut self, key: char) {
        let key = key.to_string();
        let offered = self
            .current_question()
            .is_some_and(|q| q.options.contains_key(&key));
        if offered {
            self.selections.insert(self.current, key);
        }
    }

    fn read_question(&mut self) {
        let Some(question) = self.current_question().cloned() else {
            return;
        };
        self.spawn_narration(move |narrator, options| async move {
            narrator.read_question(&question, options).await
        });
    }

    fn read_option(&mut self, position: usize) {
        let Some(question) = self.current_question() else {
            return;
        };
        let Some(key) = OPTION_KEYS.get(position) else {
            return;
        };
        let Some(value) = question.options.get(*key).cloned() else {
            return;
        };
        let key = key.to_string();
        self.spawn_narration(move |narrator, options| async move {
            narrator.read_option(&key, &value, options).await
        });
    }

    fn read_explanation(&mut self) {
        let Some(text) = self.current_question().and_then(|q| q.explanation.clone()) else {
            self.status = Some("No explanation for this question".to_string());
            return;
        };
        self.spawn_narration(move |narrator, options| async move {
            narrator.read_explanation(&text, options).await
        });
    }

    /// Runs a narration detached from the input loop, reporting its outcome
    fn spawn_narration<F, Fut>(&mut self, narrate: F)
    where
        F: FnOnce(Arc<VoiceNarrator>, SpeakOptions) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), NarratorError>> + Send + 'static,
    {
        if !self.narrator.is_available() {
            self.status = Some("Read-aloud is unavailable on this system".to_string());
            return;
        }
        self.status = None;

        let narrator = Arc::clone(&self.narrator);
        let tx = self.messages_tx.clone();
        tokio::spawn(async move {
            let message = match narrate(narrator, SpeakOptions::default()).await {
                Ok(()) => NarrationMessage::Finished,
                Err(e) => NarrationMessage::Failed(e.to_string()),
            };
            let _ = tx.send(message);
        });
    }

    /// Applies narration outcomes received since the last call
    pub fn drain_narration_messages(&mut self) {
        while let Ok(message) = self.messages_rx.try_recv() {
            if let NarrationMessage::Failed(reason) = message {
                self.status = Some(format!("Read-aloud failed: {}", reason));
            }
        }
    }
}
