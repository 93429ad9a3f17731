//! Control messages posted to the proxy by the page

use serde::{Deserialize, Serialize};

/// Externally triggered proxy commands
///
/// Wire shapes: `{"type":"SKIP_WAITING"}` and
/// `{"type":"CACHE_QUESTIONS","subjects":["english", ...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Take over immediately instead of waiting for old sessions to close
    SkipWaiting,
    /// Fetch and cache one question batch per subject
    CacheQuestions {
        #[serde(default)]
        subjects: Vec<String>,
    },
}

impl ControlMessage {
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Outcome of a prewarm run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrewarmReport {
    /// Subjects whose batch was stored
    pub cached: Vec<String>,
    /// Subjects that failed, with the reason
    pub failed: Vec<(String, String)>,
}
