//! Question content and the spoken scripts composed from it

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::sanitize::to_plain_text;

/// A practice question as delivered by the question provider
///
/// Text fields may carry markup. Options are keyed by letter and kept in key
/// order. Both `options`/`explanation` and the provider's `option`/`solution`
/// field names are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    #[serde(default)]
    pub id: Option<u64>,
    pub question: String,
    #[serde(default, alias = "option", deserialize_with = "options_without_nulls")]
    pub options: BTreeMap<String, String>,
    #[serde(default, alias = "solution")]
    pub explanation: Option<String>,
    /// Key of the correct option, when known
    #[serde(default)]
    pub answer: Option<String>,
}

/// The provider sends `null` for unused option slots
fn options_without_nulls<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Option<String>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
        .collect())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuestionSet {
    List(Vec<Question>),
    Envelope { data: Vec<Question> },
}

/// Parses a JSON array of questions or a `{ "data": [...] }` envelope
pub fn parse_question_set(json: &[u8]) -> Result<Vec<Question>, serde_json::Error> {
    Ok(match serde_json::from_slice(json)? {
        QuestionSet::List(questions) => questions,
        QuestionSet::Envelope { data } => data,
    })
}

/// `"Question: {text}. Option A: {a}. ..."`, or `None` when the question text is empty
///
/// Options whose text is empty after sanitization are skipped.
pub fn question_script(question: &Question) -> Option<String> {
    let text = to_plain_text(&question.question);
    if text.is_empty() {
        return None;
    }

    let mut parts = vec![text];
    parts.extend(
        question
            .options
            .iter()
            .filter_map(|(key, value)| option_script(key, value)),
    );
    Some(format!("Question: {}", parts.join(". ")))
}

/// `"Option {KEY}: {value}"`, or `None` when the value is empty
pub fn option_script(key: &str, value: &str) -> Option<String> {
    let text = to_plain_text(value);
    if text.is_empty() {
        return None;
    }
    Some(format!("Option {}: {}", key.to_uppercase(), text))
}

/// `"Explanation: {text}"`, or `None` when the text is empty
pub fn explanation_script(text: &str) -> Option<String> {
    let text = to_plain_text(text);
    if text.is_empty() {
        return None;
    }
    Some(format!("Explanation: {}", text))
}
