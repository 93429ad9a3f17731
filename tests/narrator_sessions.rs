//! Integration tests for narration sessions
//!
//! A scripted engine records utterances and lets each test decide when speech
//! starts, ends or fails.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use cbtkit::config::NarratorConfig;
use cbtkit::narrator::{
    NarrationState, NarratorError, NoSpeech, Question, SpeakOptions, SpeechEngine,
    SpeechErrorKind, SpeechHost, Utterance, UtteranceEvents, Voice, VoiceNarrator,
};

/// Engine that only reports progress when told to
#[derive(Default)]
struct FakeEngine {
    voices: Vec<Voice>,
    spoken: Mutex<Vec<Utterance>>,
    events: Mutex<Vec<UtteranceEvents>>,
    current: Mutex<Option<UtteranceEvents>>,
    commands: Mutex<Vec<&'static str>>,
}

impl FakeEngine {
    fn with_voices(voices: Vec<Voice>) -> Self {
        Self {
            voices,
            ..Self::default()
        }
    }

    fn spoken(&self) -> Vec<Utterance> {
        self.spoken.lock().unwrap().clone()
    }

    fn commands(&self) -> Vec<&'static str> {
        self.commands.lock().unwrap().clone()
    }

    /// Events handed over with the n-th utterance (0-based)
    fn events_for(&self, n: usize) -> UtteranceEvents {
        self.events.lock().unwrap()[n].clone()
    }

    fn current(&self) -> UtteranceEvents {
        self.current
            .lock()
            .unwrap()
            .clone()
            .expect("no utterance in progress")
    }

    fn begin(&self) {
        self.current().started();
    }

    fn complete(&self) {
        let events = self.current.lock().unwrap().take().expect("no utterance in progress");
        events.finished();
    }

    fn fail(&self, kind: SpeechErrorKind) {
        let events = self.current.lock().unwrap().take().expect("no utterance in progress");
        events.failed(kind);
    }
}

impl SpeechEngine for FakeEngine {
    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn speak(&self, utterance: Utterance, events: UtteranceEvents) {
        self.spoken.lock().unwrap().push(utterance);
        self.events.lock().unwrap().push(events.clone());
        *self.current.lock().unwrap() = Some(events);
    }

    fn pause(&self) {
        self.commands.lock().unwrap().push("pause");
    }

    fn resume(&self) {
        self.commands.lock().unwrap().push("resume");
    }

    /// Like a real engine, reports the dropped utterance as canceled
    fn cancel(&self) {
        self.commands.lock().unwrap().push("cancel");
        let dropped = self.current.lock().unwrap().take();
        if let Some(events) = dropped {
            events.failed(SpeechErrorKind::Canceled);
        }
    }
}

struct FakeHost(Arc<FakeEngine>);

impl SpeechHost for FakeHost {
    fn engine(&self) -> Option<Arc<dyn SpeechEngine>> {
        let engine: Arc<dyn SpeechEngine> = self.0.clone();
        Some(engine)
    }
}

/// Host whose engine can attach or go away while the narrator is running
#[derive(Default)]
struct LateHost(Mutex<Option<Arc<FakeEngine>>>);

impl LateHost {
    fn attach(&self, engine: Arc<FakeEngine>) {
        *self.0.lock().unwrap() = Some(engine);
    }

    fn detach(&self) {
        *self.0.lock().unwrap() = None;
    }
}

impl SpeechHost for LateHost {
    fn engine(&self) -> Option<Arc<dyn SpeechEngine>> {
        let engine = self.0.lock().unwrap().clone()?;
        let engine: Arc<dyn SpeechEngine> = engine;
        Some(engine)
    }
}

fn narrator_with(engine: FakeEngine) -> (Arc<VoiceNarrator>, Arc<FakeEngine>) {
    let engine = Arc::new(engine);
    let narrator = VoiceNarrator::new(
        Arc::new(FakeHost(engine.clone())),
        NarratorConfig::default(),
    );
    (Arc::new(narrator), engine)
}

fn narrator() -> (Arc<VoiceNarrator>, Arc<FakeEngine>) {
    narrator_with(FakeEngine::default())
}

fn spawn_start(
    narrator: &Arc<VoiceNarrator>,
    text: &str,
    options: SpeakOptions,
) -> JoinHandle<Result<(), NarratorError>> {
    let narrator = narrator.clone();
    let text = text.to_string();
    tokio::spawn(async move { narrator.start(&text, options).await })
}

/// Lets spawned narrations run until the engine has seen `count` utterances
async fn wait_for_utterances(engine: &FakeEngine, count: usize) {
    for _ in 0..1000 {
        if engine.spoken.lock().unwrap().len() >= count {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("engine never received utterance {}", count);
}

fn flag() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

#[tokio::test]
async fn test_completed_narration_runs_callbacks_and_resolves() {
    let (narrator, engine) = narrator();
    let started = flag();
    let ended = flag();

    let options = SpeakOptions::default()
        .on_start({
            let started = started.clone();
            move || started.store(true, Ordering::SeqCst)
        })
        .on_end({
            let ended = ended.clone();
            move || ended.store(true, Ordering::SeqCst)
        });
    let pending = spawn_start(&narrator, "<p>Hello &amp; welcome</p>", options);
    wait_for_utterances(&engine, 1).await;

    assert_eq!(engine.spoken()[0].text, "Hello & welcome");
    assert_eq!(narrator.state(), NarrationState::Idle, "Idle until the engine starts");

    engine.begin();
    assert!(started.load(Ordering::SeqCst));
    assert_eq!(narrator.state(), NarrationState::Speaking);
    assert!(narrator.is_speaking());

    engine.complete();
    assert_eq!(pending.await.unwrap(), Ok(()));
    assert!(ended.load(Ordering::SeqCst));
    assert_eq!(narrator.state(), NarrationState::Idle);
}

#[tokio::test]
async fn test_second_start_cancels_the_first() {
    let (narrator, engine) = narrator();
    let first_ended = flag();

    let first = spawn_start(
        &narrator,
        "first",
        SpeakOptions::default().on_end({
            let first_ended = first_ended.clone();
            move || first_ended.store(true, Ordering::SeqCst)
        }),
    );
    wait_for_utterances(&engine, 1).await;
    engine.begin();

    let second = spawn_start(&narrator, "second", SpeakOptions::default());
    wait_for_utterances(&engine, 2).await;

    assert_eq!(first.await.unwrap(), Ok(()), "Replaced narration resolves");
    assert!(!first_ended.load(Ordering::SeqCst), "No end callback when canceled");
    assert!(engine.commands().contains(&"cancel"));

    engine.begin();
    assert_eq!(narrator.state(), NarrationState::Speaking);
    engine.complete();
    assert_eq!(second.await.unwrap(), Ok(()));
}

#[tokio::test]
async fn test_reports_for_replaced_session_are_ignored() {
    let (narrator, engine) = narrator();

    let first = spawn_start(&narrator, "first", SpeakOptions::default());
    wait_for_utterances(&engine, 1).await;
    let second = spawn_start(&narrator, "second", SpeakOptions::default());
    wait_for_utterances(&engine, 2).await;
    first.await.unwrap().unwrap();

    let stale = engine.events_for(0);
    stale.started();
    stale.finished();
    stale.failed(SpeechErrorKind::SynthesisFailed);
    assert_eq!(narrator.state(), NarrationState::Idle);
    assert!(!second.is_finished());

    engine.begin();
    engine.complete();
    assert_eq!(second.await.unwrap(), Ok(()));
}

#[tokio::test]
async fn test_stop_when_idle_is_harmless() {
    let (narrator, _engine) = narrator();
    narrator.stop();
    narrator.stop();
    assert_eq!(narrator.state(), NarrationState::Idle);
}

#[tokio::test]
async fn test_stop_resolves_pending_narration() {
    let (narrator, engine) = narrator();
    let ended = flag();

    let pending = spawn_start(
        &narrator,
        "long passage",
        SpeakOptions::default().on_end({
            let ended = ended.clone();
            move || ended.store(true, Ordering::SeqCst)
        }),
    );
    wait_for_utterances(&engine, 1).await;
    engine.begin();

    narrator.stop();
    assert_eq!(narrator.state(), NarrationState::Idle);
    assert_eq!(pending.await.unwrap(), Ok(()));
    assert!(!ended.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_pause_and_resume_follow_state() {
    let (narrator, engine) = narrator();
    let pending = spawn_start(&narrator, "passage", SpeakOptions::default());
    wait_for_utterances(&engine, 1).await;

    narrator.pause();
    assert!(engine.commands().is_empty(), "Nothing to pause before speech starts");

    engine.begin();
    narrator.resume();
    assert!(engine.commands().is_empty(), "Resume while speaking is a no-op");

    narrator.pause();
    assert_eq!(narrator.state(), NarrationState::Paused);
    assert!(narrator.is_speaking());
    narrator.pause();

    narrator.resume();
    assert_eq!(narrator.state(), NarrationState::Speaking);
    assert_eq!(engine.commands(), vec!["pause", "resume"]);

    engine.complete();
    pending.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_engine_error_rejects_and_resets() {
    let (narrator, engine) = narrator();
    let reported = Arc::new(Mutex::new(None));

    let pending = spawn_start(
        &narrator,
        "passage",
        SpeakOptions::default().on_error({
            let reported = reported.clone();
            move |e: &NarratorError| *reported.lock().unwrap() = Some(*e)
        }),
    );
    wait_for_utterances(&engine, 1).await;
    engine.begin();
    engine.fail(SpeechErrorKind::AudioBusy);

    let expected = NarratorError::Engine(SpeechErrorKind::AudioBusy);
    assert_eq!(pending.await.unwrap(), Err(expected));
    assert_eq!(*reported.lock().unwrap(), Some(expected));
    assert_eq!(narrator.state(), NarrationState::Idle);
}

#[tokio::test]
async fn test_interruption_is_not_an_error() {
    let (narrator, engine) = narrator();
    let errored = flag();

    let pending = spawn_start(
        &narrator,
        "passage",
        SpeakOptions::default().on_error({
            let errored = errored.clone();
            move |_: &NarratorError| errored.store(true, Ordering::SeqCst)
        }),
    );
    wait_for_utterances(&engine, 1).await;
    engine.fail(SpeechErrorKind::Interrupted);

    assert_eq!(pending.await.unwrap(), Ok(()));
    assert!(!errored.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_unavailable_host_is_a_no_op() {
    let narrator = VoiceNarrator::new(Arc::new(NoSpeech), NarratorConfig::default());
    assert!(!narrator.is_available());

    assert_eq!(narrator.start("anything", SpeakOptions::default()).await, Ok(()));
    narrator.pause();
    narrator.resume();
    narrator.stop();
    assert_eq!(narrator.state(), NarrationState::Idle);
}

#[tokio::test]
async fn test_empty_text_is_not_spoken() {
    let (narrator, engine) = narrator();
    assert_eq!(
        narrator.start("<p> &nbsp; </p>", SpeakOptions::default()).await,
        Ok(())
    );
    assert!(engine.spoken().is_empty());
}

#[tokio::test]
async fn test_voice_and_settings_reach_the_engine() {
    let (narrator, engine) = narrator_with(FakeEngine::with_voices(vec![
        Voice::new("en-us", "English (America)", "en-US"),
        Voice::new("en-gb", "English (Great Britain)", "en-GB"),
    ]));

    let pending = spawn_start(&narrator, "text", SpeakOptions::default().rate(1.2));
    wait_for_utterances(&engine, 1).await;
    engine.complete();
    pending.await.unwrap().unwrap();

    let utterance = &engine.spoken()[0];
    assert_eq!(utterance.voice.as_ref().map(|v| v.id.as_str()), Some("en-gb"));
    assert_eq!(utterance.rate, 1.2);
    assert_eq!(utterance.pitch, 1.0);
    assert_eq!(utterance.volume, 1.0);
}

#[tokio::test]
async fn test_default_rate_comes_from_config() {
    let (narrator, engine) = narrator();
    let pending = spawn_start(&narrator, "text", SpeakOptions::default());
    wait_for_utterances(&engine, 1).await;
    engine.complete();
    pending.await.unwrap().unwrap();

    assert_eq!(engine.spoken()[0].rate, 0.9);
    assert!(engine.spoken()[0].voice.is_none());
}

#[tokio::test]
async fn test_read_question_speaks_composed_script() {
    let (narrator, engine) = narrator();
    let question = Question {
        id: Some(7),
        question: "<p>2+2=?</p>".to_string(),
        options: [("a", "3"), ("b", "4"), ("c", "")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        explanation: None,
        answer: Some("b".to_string()),
    };

    let task = {
        let narrator = narrator.clone();
        tokio::spawn(async move { narrator.read_question(&question, SpeakOptions::default()).await })
    };
    wait_for_utterances(&engine, 1).await;
    engine.complete();
    task.await.unwrap().unwrap();

    assert_eq!(engine.spoken()[0].text, "Question: 2+2=?. Option A: 3. Option B: 4");
}

#[tokio::test]
async fn test_switching_question_stops_narration() {
    let (narrator, engine) = narrator();
    narrator.focus_question("id:1");

    let pending = spawn_start(&narrator, "question one", SpeakOptions::default());
    wait_for_utterances(&engine, 1).await;
    engine.begin();

    narrator.focus_question("id:1");
    assert_eq!(narrator.state(), NarrationState::Speaking, "Same question keeps speaking");

    narrator.focus_question("id:2");
    assert_eq!(narrator.state(), NarrationState::Idle);
    assert_eq!(pending.await.unwrap(), Ok(()));
}

#[tokio::test]
async fn test_engine_attached_after_startup_is_used() {
    let host = Arc::new(LateHost::default());
    let narrator = Arc::new(VoiceNarrator::new(host.clone(), NarratorConfig::default()));
    assert!(!narrator.is_available());

    let engine = Arc::new(FakeEngine::default());
    host.attach(engine.clone());
    assert!(narrator.is_available());

    let pending = spawn_start(&narrator, "now audible", SpeakOptions::default());
    wait_for_utterances(&engine, 1).await;
    assert_eq!(engine.spoken()[0].text, "now audible");

    engine.complete();
    assert_eq!(pending.await.unwrap(), Ok(()));
}

#[tokio::test]
async fn test_stop_after_engine_vanishes_resets_state() {
    let host = Arc::new(LateHost::default());
    let engine = Arc::new(FakeEngine::default());
    host.attach(engine.clone());
    let narrator = Arc::new(VoiceNarrator::new(host.clone(), NarratorConfig::default()));

    let pending = spawn_start(&narrator, "passage", SpeakOptions::default());
    wait_for_utterances(&engine, 1).await;
    engine.begin();
    assert_eq!(narrator.state(), NarrationState::Speaking);

    host.detach();
    narrator.stop();

    assert_eq!(narrator.state(), NarrationState::Idle);
    assert_eq!(pending.await.unwrap(), Ok(()));
    assert!(!engine.commands().contains(&"cancel"));
}
