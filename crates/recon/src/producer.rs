//! Producer-name keys.
//!
//! Producer names differ between retailers in accents, punctuation, legal
//! forms and family suffixes ("Domaine Lafage" vs "Lafage"). The key strips
//! all of these so the names compare equal.

use regex::Regex;

use crate::config::ProducerVocabulary;
use crate::error::ReconError;
use crate::normalize::fold_text;

const PUNCTUATION: &str = r#"[-/,;.:"'’()`*&]"#;

#[derive(Debug, Clone)]
pub struct ProducerNormalizer {
    punctuation: Regex,
    suffixes: Option<Regex>,
    exclusions: Option<Regex>,
}

impl ProducerNormalizer {
    pub fn new(vocabulary: &ProducerVocabulary) -> Result<Self, ReconError> {
        let punctuation = Regex::new(PUNCTUATION)
            .map_err(|e| ReconError::ConfigValidation(format!("producer punctuation: {e}")))?;
        let suffixes = phrase_regex(&punctuation, &vocabulary.suffixes)?;
        let exclusions = phrase_regex(&punctuation, &vocabulary.exclusions)?;
        Ok(Self {
            punctuation,
            suffixes,
            exclusions,
        })
    }

    /// Normalized producer key. Blank input gives `""`.
    pub fn normalize(&self, raw: &str) -> String {
        let folded = fold_text(raw);
        let mut key = collapse_whitespace(&self.punctuation.replace_all(&folded, " "));

        // Removing one phrase can expose another; run to a fixpoint.
        loop {
            let mut next = key.clone();
            if let Some(re) = &self.suffixes {
                next = re.replace_all(&next, " ").into_owned();
            }
            if let Some(re) = &self.exclusions {
                next = re.replace_all(&next, " ").into_owned();
            }
            let next = collapse_whitespace(&next);
            if next == key {
                return key;
            }
            key = next;
        }
    }

    /// Key of an optional cell; `None` when the key is empty.
    pub fn key(&self, raw: Option<&str>) -> Option<String> {
        let key = self.normalize(raw?);
        (!key.is_empty()).then_some(key)
    }
}

/// `\b(?:a|b|...)\b`, case-insensitive, longest phrase first. Phrases are
/// folded the same way as the names they are matched against.
fn phrase_regex(punctuation: &Regex, phrases: &[String]) -> Result<Option<Regex>, ReconError> {
    let mut folded: Vec<String> = phrases
        .iter()
        .map(|p| collapse_whitespace(&punctuation.replace_all(&fold_text(p), " ")))
        .filter(|p| !p.is_empty())
        .collect();
    if folded.is_empty() {
        return Ok(None);
    }
    folded.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then_with(|| a.cmp(b)));
    folded.dedup();

    let alternation = folded
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))
        .map(Some)
        .map_err(|e| ReconError::ConfigValidation(format!("producer vocabulary: {e}")))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
