//! Voice descriptions and the preference ladder used to pick one

/// A voice offered by the speech engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// Engine-specific identifier passed back when speaking
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Language tag such as `en-NG` or `en_GB`
    pub lang: String,
}

impl Voice {
    pub fn new(id: impl Into<String>, name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lang: lang.into(),
        }
    }

    fn lang_parts(&self) -> (String, Option<String>) {
        let mut parts = self.lang.split(['-', '_']);
        let language = parts.next().unwrap_or_default().to_ascii_lowercase();
        let region = parts.next().map(str::to_ascii_uppercase);
        (language, region)
    }

    pub fn is_english(&self) -> bool {
        self.lang_parts().0 == "en"
    }

    /// English voice tagged with the given region (case-insensitive)
    pub fn is_english_in(&self, region: &str) -> bool {
        let (language, voice_region) = self.lang_parts();
        language == "en" && voice_region.as_deref() == Some(region.to_ascii_uppercase().as_str())
    }
}

/// Picks a voice: English in each preferred region in order, then any
/// English voice, then the first voice. `None` leaves the engine default.
pub fn select_voice<'a>(voices: &'a [Voice], preferred_regions: &[String]) -> Option<&'a Voice> {
    preferred_regions
        .iter()
        .find_map(|region| voices.iter().find(|v| v.is_english_in(region)))
        .or_else(|| voices.iter().find(|v| v.is_english()))
        .or_else(|| voices.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regions() -> Vec<String> {
        vec!["NG".to_string(), "GB".to_string()]
    }

    fn voice(lang: &str) -> Voice {
        Voice::new(lang, format!("voice {}", lang), lang)
    }

    #[test]
    fn test_prefers_first_region() {
        let voices = [voice("en-US"), voice("en-GB"), voice("en-NG")];
        assert_eq!(select_voice(&voices, &regions()).unwrap().lang, "en-NG");
    }

    #[test]
    fn test_falls_back_to_second_region() {
        let voices = [voice("fr-FR"), voice("en-US"), voice("en_gb")];
        assert_eq!(select_voice(&voices, &regions()).unwrap().lang, "en_gb");
    }

    #[test]
    fn test_falls_back_to_any_english() {
        let voices = [voice("de-DE"), voice("en-US"), voice("en-AU")];
        assert_eq!(select_voice(&voices, &regions()).unwrap().lang, "en-US");
    }

    #[test]
    fn test_bare_en_tag_counts_as_english() {
        let voices = [voice("yo"), voice("en")];
        assert_eq!(select_voice(&voices, &regions()).unwrap().lang, "en");
    }

    #[test]
    fn test_falls_back_to_first_voice() {
        let voices = [voice("yo-NG"), voice("ha-NG")];
        assert_eq!(select_voice(&voices, &regions()).unwrap().lang, "yo-NG");
    }

    #[test]
    fn test_no_voices_means_engine_default() {
        assert!(select_voice(&[], &regions()).is_none());
    }

    #[test]
    fn test_language_prefix_must_match_exactly() {
        // "eng" is not an "en" tag
        let voices = [voice("eng-NG"), voice("en-GB")];
        assert_eq!(select_voice(&voices, &regions()).unwrap().lang, "en-GB");
    }
}
