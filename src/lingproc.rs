//! Linguistic processor interface: word breaking and lemma enumeration.
//!
//! The pipeline only depends on this narrow contract, so the morphology
//! backend can be swapped without touching any stage.

use std::borrow::Cow;

use rust_stemmers::{Algorithm, Stemmer};
use unicode_segmentation::UnicodeSegmentation;

/// One segment of a document as produced by word breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub punct: bool,
}

/// Word breaking plus canonical-form enumeration.
///
/// Contract for `lemma_forms`: the result has exactly one entry per input
/// word, every entry is non-empty, and the forms within an entry are
/// distinct. Words ambiguous between several lemmas return them all;
/// downstream scoring divides by the set size.
pub trait LinguisticProcessor {
    fn word_break<'a>(&self, text: &'a str) -> Vec<Token<'a>>;
    fn lemma_forms(&self, words: &[String]) -> Vec<Vec<String>>;
}

/// Snowball-backed processor for Russian text. Produces a single canonical
/// form per word (the stem, or the word itself when the stem comes out
/// empty), so it never reports homonyms.
pub struct SnowballProcessor {
    stemmer: Stemmer,
}

impl SnowballProcessor {
    pub fn new() -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::Russian),
        }
    }
}

impl Default for SnowballProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl LinguisticProcessor for SnowballProcessor {
    fn word_break<'a>(&self, text: &'a str) -> Vec<Token<'a>> {
        text.split_word_bounds()
            .filter(|seg| !seg.chars().all(char::is_whitespace))
            .map(|seg| Token {
                text: seg,
                punct: !seg.chars().any(char::is_alphabetic),
            })
            .collect()
    }

    fn lemma_forms(&self, words: &[String]) -> Vec<Vec<String>> {
        words
            .iter()
            .map(|w| {
                let form = match self.stemmer.stem(w) {
                    Cow::Borrowed(s) if s.is_empty() => w.clone(),
                    Cow::Borrowed(s) => s.to_string(),
                    Cow::Owned(s) if s.is_empty() => w.clone(),
                    Cow::Owned(s) => s,
                };
                vec![form]
            })
            .collect()
    }
}
