//! Command-line interface parsing for cbtkit
//!
//! Subcommands drive the offline cache (install, activate, fetch, prewarm,
//! purge) and read-aloud narration (say, practice).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;

/// Subjects offered by the question provider
pub const SUBJECTS: &[&str] = &[
    "english",
    "mathematics",
    "commerce",
    "accounting",
    "biology",
    "physics",
    "chemistry",
    "englishlit",
    "government",
    "crk",
    "geography",
    "economics",
    "irk",
    "civiledu",
    "insurance",
    "currentaffairs",
    "history",
];

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified subject is not offered by the question provider
    #[error("Invalid subject: '{0}'. Valid subjects: {}", SUBJECTS.join(", "))]
    InvalidSubject(String),

    /// A URL argument could not be parsed
    #[error("Invalid URL '{0}': {1}")]
    InvalidUrl(String, url::ParseError),
}

/// cbtkit - offline question cache and read-aloud for CBT practice
#[derive(Parser, Debug)]
#[command(name = "cbtkit")]
#[command(about = "Offline question cache and read-aloud narration for CBT practice")]
#[command(version)]
pub struct Cli {
    /// Config file (JSON); defaults to the user config directory
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding the cache stores
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Precache the application shell
    Install,
    /// Delete cache stores left behind by older versions
    Activate,
    /// Fetch a URL through the caching proxy
    Fetch(FetchArgs),
    /// Deliver a JSON control message, e.g. '{"type":"SKIP_WAITING"}'
    Message {
        /// The message body
        json: String,
    },
    /// Cache question batches for offline practice
    Prewarm {
        /// Subjects to cache
        #[arg(required = true)]
        subjects: Vec<String>,
    },
    /// Remove expired API entries
    Purge,
    /// List cache stores and their entry counts
    Stores,
    /// Read text aloud
    Say {
        /// Text to speak; markup is stripped
        text: String,
    },
    /// Practice questions with read-aloud controls
    Practice(PracticeArgs),
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Absolute URL to request
    pub url: String,

    /// Treat the request as a top-level page load
    #[arg(long)]
    pub navigate: bool,

    /// Write the body here instead of stdout
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct PracticeArgs {
    /// Question set file (JSON array or provider envelope)
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Load the subject through the cache (works offline once prewarmed)
    #[arg(long, value_name = "SUBJECT")]
    pub subject: Option<String>,
}

/// Where the practice screen gets its questions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PracticeSource {
    File(PathBuf),
    Subject(String),
}

/// Parses a subject argument, accepting any letter case.
///
/// # Returns
/// * `Ok(String)` with the canonical lower-case subject
/// * `Err(CliError::InvalidSubject)` if the provider does not offer it
pub fn parse_subject_arg(s: &str) -> Result<String, CliError> {
    let subject = s.trim().to_ascii_lowercase();
    if SUBJECTS.contains(&subject.as_str()) {
        Ok(subject)
    } else {
        Err(CliError::InvalidSubject(s.to_string()))
    }
}

/// Parses an absolute URL argument
pub fn parse_url_arg(s: &str) -> Result<url::Url, CliError> {
    url::Url::parse(s).map_err(|e| CliError::InvalidUrl(s.to_string(), e))
}

impl PracticeSource {
    /// Creates a PracticeSource from parsed practice arguments.
    pub fn from_args(args: &PracticeArgs) -> Result<Self, CliError> {
        match (&args.file, &args.subject) {
            (Some(path), _) => Ok(PracticeSource::File(path.clone())),
            (None, Some(subject)) => Ok(PracticeSource::Subject(parse_subject_arg(subject)?)),
            // clap's argument group guarantees one of the two
            (None, None) => Err(CliError::InvalidSubject(String::new())),
        }
    }
}
