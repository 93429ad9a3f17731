//! Speech through an on-device synthesizer process (`espeak-ng` by default)
//!
//! Each utterance runs one synthesizer process fed through stdin. Pause and
//! resume stop and continue the process on unix.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, OnceLock};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::engine::{SpeechEngine, SpeechErrorKind, SpeechHost, Utterance};
use super::session::UtteranceEvents;
use super::voice::Voice;

/// Words per minute the synthesizer uses at rate 1.0
const BASE_WORDS_PER_MINUTE: f32 = 175.0;

/// Host that looks for the synthesizer on `PATH` until it is found
#[derive(Debug)]
pub struct SystemSpeechHost {
    program: String,
    engine: OnceLock<Arc<ProcessEngine>>,
}

impl SystemSpeechHost {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            engine: OnceLock::new(),
        }
    }
}

impl SpeechHost for SystemSpeechHost {
    fn engine(&self) -> Option<Arc<dyn SpeechEngine>> {
        if let Some(engine) = self.engine.get() {
            return Some(engine.clone());
        }
        let path = which::which(&self.program).ok()?;
        debug!(program = %path.display(), "speech synthesizer found");
        let engine = self.engine.get_or_init(|| {
            let engine = Arc::new(ProcessEngine::new(path));
            engine.prefetch_voices();
            engine
        });
        Some(engine.clone())
    }
}

struct Running {
    generation: u64,
    pid: Option<u32>,
    cancel: oneshot::Sender<()>,
}

#[derive(Default)]
struct Current {
    generation: u64,
    running: Option<Running>,
}

/// Runs one synthesizer process per utterance
///
/// The voice list is read once in the background; until it arrives the
/// synthesizer's default voice is used.
#[derive(Debug)]
pub struct ProcessEngine {
    program: PathBuf,
    current: Arc<Mutex<Current>>,
    voices: Arc<OnceLock<Vec<Voice>>>,
}

impl std::fmt::Debug for Current {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Current")
            .field("generation", &self.generation)
            .field("pid", &self.running.as_ref().and_then(|r| r.pid))
            .finish()
    }
}

impl ProcessEngine {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            current: Arc::new(Mutex::new(Current::default())),
            voices: Arc::new(OnceLock::new()),
        }
    }

    /// Starts reading the voice list off the async workers
    pub fn prefetch_voices(&self) {
        if self.voices.get().is_some() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime, voice list not loaded");
            return;
        };
        let program = self.program.clone();
        let voices = Arc::clone(&self.voices);
        runtime.spawn_blocking(move || {
            let _ = voices.set(list_voices(&program));
        });
    }

    /// Command-line arguments for the utterance; the text goes to stdin
    fn args(utterance: &Utterance) -> Vec<String> {
        let words_per_minute = (BASE_WORDS_PER_MINUTE * utterance.rate).round().clamp(80.0, 450.0);
        let pitch = (utterance.pitch / 2.0 * 99.0).round().clamp(0.0, 99.0);
        let amplitude = (utterance.volume * 100.0).round().clamp(0.0, 200.0);

        let mut args = vec![
            "--stdin".to_string(),
            "-s".to_string(),
            format!("{}", words_per_minute as u32),
            "-p".to_string(),
            format!("{}", pitch as u32),
            "-a".to_string(),
            format!("{}", amplitude as u32),
        ];
        if let Some(voice) = &utterance.voice {
            args.push("-v".to_string());
            args.push(voice.id.clone());
        }
        args
    }

    fn signal(&self, signal: Signal) {
        let pid = self
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .running
            .as_ref()
            .and_then(|r| r.pid);
        if let Some(pid) = pid {
            send_signal(pid, signal);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Stop,
    Continue,
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: Signal) {
    let signal = match signal {
        Signal::Stop => libc::SIGSTOP,
        Signal::Continue => libc::SIGCONT,
    };
    // SAFETY: kill(2) has no memory-safety preconditions
    let result = unsafe { libc::kill(pid as libc::pid_t, signal) };
    if result != 0 {
        warn!(pid, error = %std::io::Error::last_os_error(), "failed to signal synthesizer");
    }
}

#[cfg(not(unix))]
fn send_signal(pid: u32, signal: Signal) {
    warn!(pid, ?signal, "pause and resume are not supported on this platform");
}

/// Parses `--voices` output: `Pty Language Age/Gender VoiceName File ...`
fn parse_voice_list(output: &str) -> Vec<Voice> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            match columns.as_slice() {
                [_, lang, _, name, ..] => Some(Voice::new(*lang, name.replace('_', " "), *lang)),
                _ => None,
            }
        })
        .collect()
}

/// Runs `--voices`; blocks until the synthesizer exits
fn list_voices(program: &Path) -> Vec<Voice> {
    match std::process::Command::new(program).arg("--voices").output() {
        Ok(output) if output.status.success() => {
            parse_voice_list(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(output) => {
            warn!(status = %output.status, "listing voices failed");
            Vec::new()
        }
        Err(e) => {
            warn!(error = %e, "listing voices failed");
            Vec::new()
        }
    }
}

impl SpeechEngine for ProcessEngine {
    fn voices(&self) -> Vec<Voice> {
        match self.voices.get() {
            Some(voices) => voices.clone(),
            None => {
                self.prefetch_voices();
                Vec::new()
            }
        }
    }

    fn speak(&self, utterance: Utterance, events: UtteranceEvents) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("speech requires a tokio runtime");
            events.failed(SpeechErrorKind::SynthesisUnavailable);
            return;
        };
        let _entered = runtime.enter();

        let mut child = match Command::new(&self.program)
            .args(Self::args(&utterance))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %self.program.display(), error = %e, "failed to start synthesizer");
                events.failed(SpeechErrorKind::SynthesisUnavailable);
                return;
            }
        };

        let (cancel, canceled) = oneshot::channel();
        let generation = {
            let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
            current.generation += 1;
            // Replacing the sender wakes any previous utterance as canceled
            current.running = Some(Running {
                generation: current.generation,
                pid: child.id(),
                cancel,
            });
            current.generation
        };

        let stdin = child.stdin.take();
        let current = Arc::clone(&self.current);
        runtime.spawn(async move {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(utterance.text.as_bytes()).await {
                    debug!(error = %e, "synthesizer closed stdin early");
                }
                // Dropping stdin signals end of text
            }
            events.started();

            let exit = tokio::select! {
                status = child.wait() => Some(status),
                _ = canceled => None,
            };

            {
                let mut current = current.lock().unwrap_or_else(|e| e.into_inner());
                if current.running.as_ref().map(|r| r.generation) == Some(generation) {
                    current.running = None;
                }
            }

            match exit {
                Some(Ok(status)) if status.success() => events.finished(),
                Some(Ok(status)) => {
                    debug!(%status, "synthesizer exited with failure");
                    events.failed(SpeechErrorKind::SynthesisFailed);
                }
                Some(Err(e)) => {
                    warn!(error = %e, "waiting for synthesizer failed");
                    events.failed(SpeechErrorKind::SynthesisFailed);
                }
                None => {
                    let _ = child.kill().await;
                    events.failed(SpeechErrorKind::Canceled);
                }
            }
        });
    }

    fn pause(&self) {
        self.signal(Signal::Stop);
    }

    fn resume(&self) {
        self.signal(Signal::Continue);
    }

    fn cancel(&self) {
        let running = self
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .running
            .take();
        if let Some(running) = running {
            // A stopped process cannot act on SIGKILL until continued
            if let Some(pid) = running.pid {
                send_signal(pid, Signal::Continue);
            }
            let _ = running.cancel.send(());
        }
    }
}
