//! cbtkit - offline question cache and read-aloud narration
//!
//! Command-line front end for the caching proxy and a terminal practice
//! screen that reads questions aloud.

use std::io::{self, Write};
use std::panic;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{info, warn};

use cbtkit::app::App;
use cbtkit::cache::{CacheStorage, DiskStorage};
use cbtkit::cli::{parse_subject_arg, parse_url_arg, Cli, Command, PracticeSource};
use cbtkit::config::AppConfig;
use cbtkit::http::Request;
use cbtkit::logging::init_logger;
use cbtkit::narrator::{parse_question_set, Question, SpeakOptions, SystemSpeechHost, VoiceNarrator};
use cbtkit::proxy::{
    CacheProxy, ControlMessage, HttpFetcher, MessageOutcome, PrewarmReport, SystemClock,
};
use cbtkit::ui;

type BoxError = Box<dyn std::error::Error>;

/// Sets up a panic hook that restores the terminal before printing the panic message.
/// This ensures the terminal is usable even if the application panics.
fn setup_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        // Attempt to restore the terminal
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        // Call the original panic hook
        original_hook(panic_info);
    }));
}

fn print_report(report: &PrewarmReport) {
    for subject in &report.cached {
        println!("cached  {}", subject);
    }
    for (subject, reason) in &report.failed {
        eprintln!("failed  {}: {}", subject, reason);
    }
}

/// Loads the practice question set from a file or through the proxy
async fn load_questions(source: &PracticeSource, proxy: &CacheProxy) -> Result<Vec<Question>, BoxError> {
    let body = match source {
        PracticeSource::File(path) => tokio::fs::read(path).await?,
        PracticeSource::Subject(subject) => {
            let response = proxy.handle_fetch(proxy.question_request(subject)?).await?;
            if !response.is_success() {
                return Err(format!(
                    "question provider answered {} {}",
                    response.status, response.status_text
                )
                .into());
            }
            response.body
        }
    };
    Ok(parse_question_set(&body)?)
}

/// Runs the practice screen until the user quits
async fn run_practice(
    source: PracticeSource,
    proxy: &CacheProxy,
    narrator: Arc<VoiceNarrator>,
) -> Result<(), BoxError> {
    let title = match &source {
        PracticeSource::File(path) => path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "practice".to_string()),
        PracticeSource::Subject(subject) => subject.clone(),
    };

    setup_panic_hook();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(title, Arc::clone(&narrator));
    terminal.draw(|f| ui::render_practice(f, &app))?;

    match load_questions(&source, proxy).await {
        Ok(questions) => app.load_questions(questions),
        Err(e) => app.load_failed(format!("Could not load questions: {}", e)),
    }

    loop {
        app.drain_narration_messages();
        terminal.draw(|f| {
            ui::render_practice(f, &app);
            if app.show_help {
                ui::render_help_overlay(f);
            }
        })?;

        // Poll for keyboard events with 100ms timeout
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                app.handle_key(key);
            }
        }

        if app.should_quit {
            break;
        }
    }

    narrator.stop();
    proxy.flush().await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    Ok(())
}

fn write_body(body: &[u8], output: Option<PathBuf>) -> io::Result<()> {
    match output {
        Some(path) => std::fs::write(path, body),
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(body)?;
            stdout.flush()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "debug"
    } else if matches!(cli.command, Command::Practice(_)) {
        // Log lines would tear the full-screen UI
        "warn"
    } else {
        "info"
    };
    init_logger(default_level);

    let config = AppConfig::load(cli.config.as_deref())?;

    let storage: Arc<dyn CacheStorage> = Arc::new(match &cli.cache_dir {
        Some(dir) => DiskStorage::with_dir(dir.clone()),
        None => DiskStorage::new().ok_or("could not determine a cache directory")?,
    });
    let proxy = CacheProxy::new(
        config.proxy.clone(),
        Arc::clone(&storage),
        Arc::new(HttpFetcher::new()),
        Arc::new(SystemClock),
    )?;
    let narrator = Arc::new(VoiceNarrator::new(
        Arc::new(SystemSpeechHost::new(config.narrator.program.clone())),
        config.narrator.clone(),
    ));

    match cli.command {
        Command::Install => {
            proxy.install().await?;
            println!("Precached application shell into {}", proxy.shell_store());
        }
        Command::Activate => {
            let deleted = proxy.activate().await?;
            if deleted.is_empty() {
                println!("No outdated cache stores");
            }
            for name in deleted {
                println!("deleted {}", name);
            }
        }
        Command::Fetch(args) => {
            let url = parse_url_arg(&args.url)?;
            let request = if args.navigate {
                Request::navigate(url)
            } else {
                Request::get(url)
            };
            let response = proxy.handle_fetch(request).await?;
            eprintln!("{} {}", response.status, response.status_text);
            write_body(&response.body, args.output)?;
            proxy.flush().await;
        }
        Command::Message { json } => match proxy.handle_message(ControlMessage::parse(&json)?).await {
            MessageOutcome::SkipWaiting => println!("Skip waiting requested"),
            MessageOutcome::Prewarmed(report) => print_report(&report),
        },
        Command::Prewarm { subjects } => {
            let subjects = subjects
                .iter()
                .map(|s| parse_subject_arg(s))
                .collect::<Result<Vec<_>, _>>()?;
            let report = proxy.prewarm(&subjects).await;
            print_report(&report);
            if report.cached.is_empty() {
                return Err("no subjects could be cached".into());
            }
        }
        Command::Purge => {
            let removed = proxy.purge_expired()?;
            println!("Removed {} expired entries from {}", removed, proxy.api_store());
        }
        Command::Stores => {
            for name in storage.store_names()? {
                let current = name == proxy.shell_store() || name == proxy.api_store();
                println!(
                    "{:<24} {:>6} entries{}",
                    name,
                    storage.keys(&name)?.len(),
                    if current { "" } else { "  (outdated)" }
                );
            }
        }
        Command::Say { text } => {
            if !narrator.is_available() {
                return Err(format!(
                    "speech synthesizer '{}' not found on PATH",
                    config.narrator.program
                )
                .into());
            }
            tokio::select! {
                result = narrator.start(&text, SpeakOptions::default()) => result?,
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted");
                    narrator.stop();
                }
            }
        }
        Command::Practice(args) => {
            let source = PracticeSource::from_args(&args)?;
            if !narrator.is_available() {
                warn!(program = %config.narrator.program, "read-aloud unavailable");
            }
            run_practice(source, &proxy, narrator).await?;
        }
    }

    Ok(())
}
