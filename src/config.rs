//! Pipeline parameters, loadable from a JSON file.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// All tunables of a pipeline run. Defaults reproduce the standard
/// extraction profile.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Params {
    /// Archive files must end with this suffix.
    pub suffix: String,
    /// Number of matching archive files to skip.
    pub from: usize,
    /// Number of matching archive files to process, 0 = unlimited.
    pub limit: usize,

    /// Accepted tokens have at most this many code points.
    pub max_word_len: usize,
    /// Inclusive code-point range every character of an accepted token must
    /// fall into. The default covers the Cyrillic range U+0400..=U+0451.
    pub alphabet_first: u32,
    pub alphabet_last: u32,

    /// Joint-frequency threshold subtracted in the bigram group score.
    pub bi_threshold: f64,
    /// Keep a bigram group only if it occurs in more than this many documents.
    pub bi_doc_count: u32,
    /// ...and its score exceeds this.
    pub bi_weight: f64,

    pub tri_threshold: f64,
    pub tri_doc_count: u32,
    pub tri_weight: f64,

    /// Version tag stamped into the final map and its file name.
    pub version: String,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            suffix: ".zip".to_string(),
            from: 0,
            limit: 0,
            max_word_len: 50,
            alphabet_first: 0x400,
            alphabet_last: 0x451,
            bi_threshold: 1_000.0,
            bi_doc_count: 1_000,
            bi_weight: 0.01,
            tri_threshold: 1_000.0,
            tri_doc_count: 1_000,
            tri_weight: 0.003,
            version: "v1.10".to_string(),
        }
    }
}

impl Params {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("could not open {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("{}: could not parse parameters", path.display()))
    }

    /// True iff every code point of `word` lies in the allowed range.
    pub fn in_alphabet(&self, word: &str) -> bool {
        word.chars()
            .all(|c| (self.alphabet_first..=self.alphabet_last).contains(&(c as u32)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_cover_cyrillic() {
        let p = Params::default();
        assert!(p.in_alphabet("привет"));
        assert!(p.in_alphabet("ёжик"));
        assert!(!p.in_alphabet("latin"));
        assert!(!p.in_alphabet("при1вет"));
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        let mut f = File::create(&path).unwrap();
        f.write_all(br#"{"bi_doc_count": 5, "version": "vtest"}"#)
            .unwrap();

        let p = Params::load(&path).unwrap();
        assert_eq!(p.bi_doc_count, 5);
        assert_eq!(p.version, "vtest");
        assert_eq!(p.suffix, ".zip");
        assert_eq!(p.tri_weight, 0.003);
    }
}
