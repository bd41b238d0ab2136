//! Dictionary-backed morphological analysis for Russian word forms.
//!
//! The dictionary is a tab-separated file with one reading per line:
//! `form<TAB>normal_form<TAB>tag`. A form may appear on several lines, one per
//! reading; readings keep file order. Forms missing from the dictionary fall back
//! to the Russian Snowball stemmer, so inflections still fold together.

use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Tag given to in-alphabet words the dictionary does not know (stemmed readings).
pub const UNKNOWN_TAG: &str = "НЕИЗВ";

const FUNCTION_WORDS: &[(&str, &str)] = &[
    ("без", "ПРЕДЛ"),
    ("в", "ПРЕДЛ"),
    ("во", "ПРЕДЛ"),
    ("для", "ПРЕДЛ"),
    ("до", "ПРЕДЛ"),
    ("за", "ПРЕДЛ"),
    ("из", "ПРЕДЛ"),
    ("изо", "ПРЕДЛ"),
    ("к", "ПРЕДЛ"),
    ("ко", "ПРЕДЛ"),
    ("между", "ПРЕДЛ"),
    ("на", "ПРЕДЛ"),
    ("над", "ПРЕДЛ"),
    ("о", "ПРЕДЛ"),
    ("об", "ПРЕДЛ"),
    ("обо", "ПРЕДЛ"),
    ("около", "ПРЕДЛ"),
    ("от", "ПРЕДЛ"),
    ("перед", "ПРЕДЛ"),
    ("по", "ПРЕДЛ"),
    ("под", "ПРЕДЛ"),
    ("при", "ПРЕДЛ"),
    ("про", "ПРЕДЛ"),
    ("с", "ПРЕДЛ"),
    ("со", "ПРЕДЛ"),
    ("у", "ПРЕДЛ"),
    ("через", "ПРЕДЛ"),
    ("а", "СОЮЗ"),
    ("да", "СОЮЗ"),
    ("если", "СОЮЗ"),
    ("зато", "СОЮЗ"),
    ("и", "СОЮЗ"),
    ("или", "СОЮЗ"),
    ("либо", "СОЮЗ"),
    ("но", "СОЮЗ"),
    ("однако", "СОЮЗ"),
    ("что", "СОЮЗ"),
    ("чтобы", "СОЮЗ"),
    ("хотя", "СОЮЗ"),
    ("ах", "МЕЖД"),
    ("ой", "МЕЖД"),
    ("ох", "МЕЖД"),
    ("увы", "МЕЖД"),
    ("ура", "МЕЖД"),
    ("ух", "МЕЖД"),
    ("эх", "МЕЖД"),
];

/// True for the lower-case letters words are built from (`а..я` and `ё`).
pub fn is_word_letter(ch: char) -> bool {
    matches!(ch, 'а'..='я' | 'ё')
}

/// One morphological reading of a word form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordAnalysis {
    /// Dictionary (normal) form.
    pub normal_form: String,
    /// Grammatical tag, e.g. `С мр,ед,им` or `ПРЕДЛ`.
    pub tag: String,
}

impl WordAnalysis {
    fn new(normal_form: &str, tag: &str) -> Self {
        Self {
            normal_form: normal_form.to_string(),
            tag: tag.to_string(),
        }
    }

    /// Readings that mark prepositions, conjunctions, interjections, or carry a
    /// single-character tag.
    pub fn is_function_word(&self) -> bool {
        self.tag.contains("ПРЕДЛ")
            || self.tag.contains("СОЮЗ")
            || self.tag.contains("МЕЖД")
            || self.tag.chars().count() == 1
    }
}

/// Word-form analysis capability consumed by the text normalizer.
pub trait Morphology: Send + Sync {
    /// Returns every reading of `word`, most likely first.
    fn analyze(&self, word: &str) -> Result<Vec<WordAnalysis>, MorphologyError>;
}

/// Errors raised while loading a dictionary or analyzing a token.
#[derive(Debug, thiserror::Error)]
pub enum MorphologyError {
    /// The token is empty or contains characters outside the word alphabet.
    #[error("unsupported token {0:?}")]
    UnsupportedToken(String),
    /// A dictionary line did not have three tab-separated fields.
    #[error("malformed dictionary line {line}: {content:?}")]
    Malformed {
        /// 1-based line number.
        line: usize,
        /// Offending line.
        content: String,
    },
    /// The dictionary file could not be read.
    #[error("failed to read dictionary {path}: {source}")]
    Io {
        /// Dictionary location.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Morphology backed by an in-memory form table plus a built-in function-word list.
#[derive(Debug, Clone)]
pub struct DictionaryMorphology {
    forms: HashMap<String, Vec<WordAnalysis>>,
}

impl Default for DictionaryMorphology {
    fn default() -> Self {
        let mut forms: HashMap<String, Vec<WordAnalysis>> = HashMap::new();
        for (word, tag) in FUNCTION_WORDS {
            forms
                .entry((*word).to_string())
                .or_default()
                .push(WordAnalysis::new(word, tag));
        }
        Self { forms }
    }
}

impl DictionaryMorphology {
    /// Analyzer that only knows the built-in function words.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Parses dictionary text on top of the built-in function words.
    pub fn parse(source: &str) -> Result<Self, MorphologyError> {
        let mut morphology = Self::default();
        for (idx, raw) in source.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split('\t').map(str::trim);
            let (Some(form), Some(normal), Some(tag), None) =
                (fields.next(), fields.next(), fields.next(), fields.next())
            else {
                return Err(MorphologyError::Malformed {
                    line: idx + 1,
                    content: raw.to_string(),
                });
            };
            if form.is_empty() || normal.is_empty() || tag.is_empty() {
                return Err(MorphologyError::Malformed {
                    line: idx + 1,
                    content: raw.to_string(),
                });
            }
            let readings = morphology.forms.entry(form.to_lowercase()).or_default();
            let reading = WordAnalysis::new(&normal.to_lowercase(), tag);
            if !readings.contains(&reading) {
                readings.push(reading);
            }
        }
        Ok(morphology)
    }

    /// Reads and parses a dictionary file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MorphologyError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| MorphologyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&source)
    }

    /// Number of distinct word forms known, built-ins included.
    pub fn len(&self) -> usize {
        self.forms.len()
    }

    /// True when no forms are known at all.
    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

impl Morphology for DictionaryMorphology {
    fn analyze(&self, word: &str) -> Result<Vec<WordAnalysis>, MorphologyError> {
        if word.is_empty() || !word.chars().all(is_word_letter) {
            return Err(MorphologyError::UnsupportedToken(word.to_string()));
        }
        match self.forms.get(word) {
            Some(readings) => Ok(readings.clone()),
            None => {
                let stem = Stemmer::create(Algorithm::Russian).stem(word).into_owned();
                let normal_form = if stem.is_empty() { word.to_string() } else { stem };
                Ok(vec![WordAnalysis::new(&normal_form, UNKNOWN_TAG)])
            }
        }
    }
}
