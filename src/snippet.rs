//! Highlighted snippets built from a page's text fragments.

use std::collections::HashSet;

const OPEN: &str = "<b>";
const CLOSE: &str = "</b>";
const SEPARATOR: &str = "...";

/// Marks query words in each fragment and joins the fragments that matched.
///
/// `lemma_of` maps a surface word to its lemma (or an empty string). Fragments
/// with no word whose lemma is in `query_lemmas` are dropped.
pub fn build_snippet<F>(fragments: &[String], query_lemmas: &HashSet<String>, lemma_of: F) -> String
where
    F: Fn(&str) -> String,
{
    let mut kept = Vec::new();
    for fragment in fragments {
        let mut marked = fragment.clone();
        let mut matches = 0usize;
        for raw in fragment.split_whitespace() {
            let word = raw.trim_matches(|ch: char| !ch.is_alphanumeric());
            if word.is_empty() {
                continue;
            }
            let lemma = lemma_of(word);
            if !lemma.is_empty() && query_lemmas.contains(&lemma) {
                mark_word(&mut marked, word);
                matches += 1;
            }
        }
        if matches > 0 {
            kept.push(marked);
        }
    }
    kept.join(SEPARATOR)
}

/// Wraps the first unmarked whole-word occurrence of `word` in `<b>…</b>`.
pub fn mark_word(text: &mut String, word: &str) {
    if word.is_empty() {
        return;
    }
    let mut from = 0;
    while let Some(found) = text[from..].find(word) {
        let start = from + found;
        let end = start + word.len();
        let already_marked = text[..start].ends_with(OPEN);
        let inside_word = text[..start]
            .chars()
            .next_back()
            .is_some_and(char::is_alphanumeric)
            || text[end..].chars().next().is_some_and(char::is_alphanumeric);
        if already_marked || inside_word {
            from = end;
            continue;
        }
        text.insert_str(end, CLOSE);
        text.insert_str(start, OPEN);
        return;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::normalizer;
    use pretty_assertions::assert_eq;

    fn query(lemmas: &[&str]) -> HashSet<String> {
        lemmas.iter().map(|lemma| (*lemma).to_string()).collect()
    }

    fn fragments(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|text| (*text).to_string()).collect()
    }

    #[test]
    fn marks_matching_words_and_drops_other_fragments() {
        let normalizer = normalizer();
        let snippet = build_snippet(
            &fragments(&["Кот сидит на окне.", "Собака спит.", "Коты, и кот!"]),
            &query(&["кот"]),
            |word| normalizer.lemma_of(word),
        );
        assert_eq!(snippet, "<b>Кот</b> сидит на окне....<b>Коты</b>, и <b>кот</b>!");
    }

    #[test]
    fn repeated_words_mark_successive_occurrences() {
        let mut text = "кот и кот".to_string();
        mark_word(&mut text, "кот");
        mark_word(&mut text, "кот");
        assert_eq!(text, "<b>кот</b> и <b>кот</b>");
    }

    #[test]
    fn skips_occurrences_inside_longer_words() {
        let mut text = "котами кот".to_string();
        mark_word(&mut text, "кот");
        assert_eq!(text, "котами <b>кот</b>");
    }

    #[test]
    fn no_match_yields_empty_snippet() {
        let normalizer = normalizer();
        let snippet = build_snippet(&fragments(&["Собака."]), &query(&["кот"]), |word| {
            normalizer.lemma_of(word)
        });
        assert_eq!(snippet, "");
    }
}
