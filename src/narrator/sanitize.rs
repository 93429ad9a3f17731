//! Markup-to-speech text conversion

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// `<script>` and `<style>` elements with their contents
static HIDDEN_ELEMENTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").expect("valid regex")
});

/// Tags that separate words when rendered
static BREAKING_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</?(br|p|div|li|ul|ol|tr|td|th|table|h[1-6]|blockquote|section)\b[^>]*>")
        .expect("valid regex")
});

/// A tag opens with a letter, `/` or `!`; a bare `<` such as `x < 3` is text
static ANY_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<[A-Za-z/!][^>]*>").expect("valid regex"));

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));

static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("valid regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Renders possibly-marked-up text to the plain text a reader would see
///
/// Tags and comments are removed, entities decoded, and whitespace collapsed.
pub fn to_plain_text(input: &str) -> String {
    if !input.contains('<') && !input.contains('&') {
        return collapse_whitespace(input);
    }

    let text = COMMENT.replace_all(input, "");
    let text = HIDDEN_ELEMENTS.replace_all(&text, " ");
    let text = BREAKING_TAGS.replace_all(&text, " ");
    let text = ANY_TAG.replace_all(&text, "");
    let text = ENTITY.replace_all(&text, |caps: &Captures| decode_entity(&caps[0], &caps[1]));

    collapse_whitespace(&text)
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Decodes one entity body; unknown entities are left as written
fn decode_entity(raw: &str, body: &str) -> String {
    let decoded = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
    } else if let Some(dec) = body.strip_prefix('#') {
        dec.parse::<u32>().ok().and_then(char::from_u32)
    } else {
        match body {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            "ndash" => Some('\u{2013}'),
            "mdash" => Some('\u{2014}'),
            "hellip" => Some('\u{2026}'),
            "deg" => Some('\u{00B0}'),
            "times" => Some('\u{00D7}'),
            "divide" => Some('\u{00F7}'),
            "sup2" => Some('\u{00B2}'),
            "sup3" => Some('\u{00B3}'),
            _ => None,
        }
    };
    decoded.map_or_else(|| raw.to_string(), String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_inline_markup() {
        assert_eq!(to_plain_text("<b>What is 2+2?</b>"), "What is 2+2?");
    }

    #[test]
    fn test_plain_text_is_unchanged_apart_from_whitespace() {
        assert_eq!(to_plain_text("  Choose the   odd one out \n"), "Choose the odd one out");
    }

    #[test]
    fn test_block_tags_separate_words() {
        assert_eq!(
            to_plain_text("<p>Read the passage.</p><p>Answer below.</p>"),
            "Read the passage. Answer below."
        );
        assert_eq!(to_plain_text("line one<br/>line two"), "line one line two");
    }

    #[test]
    fn test_decodes_entities() {
        assert_eq!(to_plain_text("5 &lt; 6 &amp;&amp; 7 &gt; 3"), "5 < 6 && 7 > 3");
        assert_eq!(to_plain_text("x&sup2; &#43; y&#x00B2;"), "x\u{00B2} + y\u{00B2}");
        assert_eq!(to_plain_text("&quot;quoted&quot;"), "\"quoted\"");
    }

    #[test]
    fn test_unknown_entity_is_kept() {
        assert_eq!(to_plain_text("a &bogus; b"), "a &bogus; b");
    }

    #[test]
    fn test_decoded_angle_brackets_are_not_treated_as_tags() {
        assert_eq!(to_plain_text("&lt;b&gt;bold&lt;/b&gt;"), "<b>bold</b>");
    }

    #[test]
    fn test_hidden_elements_and_comments_are_dropped() {
        assert_eq!(
            to_plain_text("<style>p{color:red}</style>Visible<!-- note --><script>alert(1)</script>"),
            "Visible"
        );
    }

    #[test]
    fn test_comparison_operators_are_visible_text() {
        assert_eq!(
            to_plain_text("If x < 3 and y > 2, find x"),
            "If x < 3 and y > 2, find x"
        );
        assert_eq!(to_plain_text("<p>Solve 2x<8 and x>1</p>"), "Solve 2x<8 and x>1");
        assert_eq!(to_plain_text("<b>a</b> < <i>b</i>"), "a < b");
    }

    #[test]
    fn test_markup_only_input_is_empty() {
        assert_eq!(to_plain_text("<img src=\"diagram.png\"/>"), "");
        assert_eq!(to_plain_text(""), "");
    }
}
