//! Typed records stored in the on-disk tables.
//!
//! Every table starts with a [`Header`] naming the record type it holds;
//! opening a table as the wrong type is an error (see `stream.rs`).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A record type that can live in a table file. `MSG_TYPE` is the tag
/// written into the table header.
pub trait Record: Serialize + DeserializeOwned {
    const MSG_TYPE: &'static str;
}

/// Table file header: record type tag plus an informational record count
/// (0 when unknown in advance).
#[derive(Serialize, Deserialize, Debug)]
pub struct Header {
    pub msg_type: String,
    pub total: u64,
}

/// Dictionary entry: surface form, its dense id and corpus frequency.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Unigram {
    pub text: String,
    pub id: u32,
    pub count: u32,
}

/// Surface-bigram count, keyed by `(id1, id2)`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bigram {
    pub id1: u32,
    pub id2: u32,
    pub count: u32,
}

/// Surface-trigram count, keyed by `(id1, id2, id3)`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Trigram {
    pub id1: u32,
    pub id2: u32,
    pub id3: u32,
    pub count: u32,
}

/// Lemma dictionary entry.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LemId {
    pub text: String,
    pub id: u32,
}

/// Lemma with its document frequency.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LemFreq {
    pub text: String,
    pub id: u32,
    pub count: u32,
}

/// An id sequence. Used for the per-word lemma sets in `lems.bin`
/// (record i holds the lemma ids of word id i+1).
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Phrase {
    pub ids: Vec<u32>,
}

/// A surface bigram exploded to one of its lemma-pair readings. Produced by
/// the transformer in GroupLem2, consumed by the external sorter.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Lem2Words {
    pub lid1: u32,
    pub lid2: u32,
    pub wid1: u32,
    pub wid2: u32,
    pub count: u32,
}

/// Trigram analogue of [`Lem2Words`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Lem3Words {
    pub lid1: u32,
    pub lid2: u32,
    pub lid3: u32,
    pub wid1: u32,
    pub wid2: u32,
    pub wid3: u32,
    pub count: u32,
}

/// A surface witness inside a lemma-pair group.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Case2 {
    pub wid1: u32,
    pub wid2: u32,
    pub count: u32,
}

/// A surface witness inside a lemma-triple group.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Case3 {
    pub wid1: u32,
    pub wid2: u32,
    pub wid3: u32,
    pub count: u32,
}

/// Scored lemma-pair group with its surface witnesses.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Lem2Group {
    pub lid1: u32,
    pub lid2: u32,
    pub weight: f64,
    pub cases: Vec<Case2>,
}

/// Scored lemma-triple group with its surface witnesses.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Lem3Group {
    pub lid1: u32,
    pub lid2: u32,
    pub lid3: u32,
    pub weight: f64,
    pub cases: Vec<Case3>,
}

impl Record for Unigram {
    const MSG_TYPE: &'static str = "Unigram";
}
impl Record for Bigram {
    const MSG_TYPE: &'static str = "Bigram";
}
impl Record for Trigram {
    const MSG_TYPE: &'static str = "Trigram";
}
impl Record for LemId {
    const MSG_TYPE: &'static str = "LemId";
}
impl Record for LemFreq {
    const MSG_TYPE: &'static str = "LemFreq";
}
impl Record for Phrase {
    const MSG_TYPE: &'static str = "Phrase";
}
impl Record for Lem2Words {
    const MSG_TYPE: &'static str = "Lem2Words";
}
impl Record for Lem3Words {
    const MSG_TYPE: &'static str = "Lem3Words";
}
impl Record for Lem2Group {
    const MSG_TYPE: &'static str = "Lem2Group";
}
impl Record for Lem3Group {
    const MSG_TYPE: &'static str = "Lem3Group";
}

/// Records whose equal-keyed runs are collapsed by summing counts.
pub trait Counted {
    fn count(&self) -> u32;
    fn add_count(&mut self, more: u32);
}

impl Counted for Bigram {
    fn count(&self) -> u32 {
        self.count
    }
    fn add_count(&mut self, more: u32) {
        self.count += more;
    }
}

impl Counted for Trigram {
    fn count(&self) -> u32 {
        self.count
    }
    fn add_count(&mut self, more: u32) {
        self.count += more;
    }
}
