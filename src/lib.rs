//! Collocation statistics over a document corpus.
//!
//! A batch pipeline that turns archived documents into a keyed map of
//! statistically significant word pairs and triples. Documents are tokenized
//! into a word-id corpus, words are lemmatized (keeping homonyms as sets),
//! and surface n-gram counts are collapsed into scored lemma-level groups
//! through disk-backed sorting and merging, verified against per-document
//! frequencies and filtered by thresholds.

pub mod archive;
pub mod bigrams;
pub mod config;
pub mod convert;
pub mod corpus;
pub mod emit;
pub mod lemma;
pub mod lingproc;
pub mod records;
pub mod sort;
pub mod stream;
pub mod trigrams;
pub mod zmap;
