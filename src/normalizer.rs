//! Turns HTML or raw text into lemma occurrence counts.

use crate::html;
use crate::morphology::{is_word_letter, Morphology, WordAnalysis};
use std::collections::HashMap;
use std::sync::Arc;

/// Lemma text mapped to its occurrence count.
pub type LemmaCounts = HashMap<String, u32>;

/// Tokenizes text and folds each token to its lemma.
#[derive(Clone)]
pub struct TextNormalizer {
    morphology: Arc<dyn Morphology>,
}

impl TextNormalizer {
    /// Builds a normalizer over the given analyzer.
    pub fn new(morphology: Arc<dyn Morphology>) -> Self {
        Self { morphology }
    }

    /// Lemma counts of the visible text of an HTML document (or of plain text).
    pub fn lemmatize(&self, html: &str) -> LemmaCounts {
        self.lemmatize_text(&html::plain_text(html))
    }

    /// Lemma counts of already extracted text.
    pub fn lemmatize_text(&self, text: &str) -> LemmaCounts {
        let mut counts = LemmaCounts::new();
        let lowered: String = text
            .to_lowercase()
            .chars()
            .map(|ch| if is_word_letter(ch) { ch } else { ' ' })
            .collect();

        for token in lowered.split_whitespace() {
            if let Some(lemma) = self.normal_form(token) {
                *counts.entry(lemma).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Lemma of a single surface token, or an empty string when it has none.
    ///
    /// Characters outside the word alphabet are dropped before analysis.
    pub fn lemma_of(&self, word: &str) -> String {
        let prepared: String = word
            .to_lowercase()
            .chars()
            .filter(|ch| is_word_letter(*ch))
            .collect();
        if prepared.is_empty() {
            return String::new();
        }
        self.normal_form(&prepared).unwrap_or_default()
    }

    fn normal_form(&self, token: &str) -> Option<String> {
        let readings = match self.morphology.analyze(token) {
            Ok(readings) => readings,
            Err(err) => {
                tracing::debug!(token, error = %err, "skipping token");
                return None;
            }
        };
        if readings.iter().any(WordAnalysis::is_function_word) {
            return None;
        }
        readings.into_iter().next().map(|reading| reading.normal_form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morphology::DictionaryMorphology;
    use crate::testing::normalizer;
    use pretty_assertions::assert_eq;

    fn counts(pairs: &[(&str, u32)]) -> LemmaCounts {
        pairs
            .iter()
            .map(|(lemma, count)| ((*lemma).to_string(), *count))
            .collect()
    }

    #[test]
    fn counts_lemmas_and_drops_function_words() {
        let lemmas = normalizer().lemmatize("<p>Коты и кот сидят на окне, кот!</p>");
        assert_eq!(
            lemmas,
            counts(&[("кот", 3), ("сидеть", 1), ("окно", 1)])
        );
    }

    #[test]
    fn blank_input_is_empty() {
        assert!(normalizer().lemmatize("").is_empty());
        assert!(normalizer().lemmatize("   \n").is_empty());
        assert!(normalizer().lemmatize("<script>кот</script>").is_empty());
    }

    #[test]
    fn latin_and_digits_are_separators() {
        let lemmas = normalizer().lemmatize_text("кот2кота catкот");
        assert_eq!(lemmas, counts(&[("кот", 3)]));
    }

    #[test]
    fn lemma_of_strips_punctuation() {
        let normalizer = normalizer();
        assert_eq!(normalizer.lemma_of("«Котами»,"), "кот");
        assert_eq!(normalizer.lemma_of("42"), "");
        assert_eq!(normalizer.lemma_of("и"), "");
    }

    #[test]
    fn stems_inflections_without_a_dictionary() {
        let normalizer = TextNormalizer::new(Arc::new(DictionaryMorphology::builtin()));
        let lemmas = normalizer.lemmatize_text("Коты, кота и кот");
        assert_eq!(lemmas.len(), 1);
        assert_eq!(lemmas.values().copied().sum::<u32>(), 3);
        assert_eq!(normalizer.lemma_of("Котами"), normalizer.lemma_of("кот"));
    }
}
