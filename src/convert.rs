//! Convert stage: builds the word dictionary and the token-id corpus.

use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use unicode_normalization::UnicodeNormalization;

use crate::archive::{corpus_files, read_archive};
use crate::config::Params;
use crate::corpus::CorpusWriter;
use crate::lingproc::{LinguisticProcessor, Token};
use crate::records::Unigram;
use crate::stream::Writer;

/// Word dictionary: surface form → dense id (assigned on first observation)
/// plus corpus frequency.
#[derive(Default)]
pub struct Dictionary {
    map: HashMap<String, (u32, u32)>,
}

impl Dictionary {
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the word's id, assigning the next free one on first sight,
    /// and bumps its count.
    pub fn intern(&mut self, word: String) -> u32 {
        let next = self.map.len() as u32 + 1;
        let entry = self.map.entry(word).or_insert((next, 0));
        entry.1 += 1;
        entry.0
    }

    /// Writes `uni.bin`, sorted by id so output bytes are stable.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut entries: Vec<(&String, &(u32, u32))> = self.map.iter().collect();
        entries.sort_unstable_by_key(|(_, (id, _))| *id);

        let mut writer = Writer::<Unigram>::create(path, entries.len() as u64)?;
        for (text, &(id, count)) in entries {
            writer.write(&Unigram {
                text: text.clone(),
                id,
                count,
            })?;
        }
        writer.finish()
    }
}

fn accept(params: &Params, token: &Token) -> bool {
    !token.punct
        && token.text.chars().count() <= params.max_word_len
        && params.in_alphabet(token.text)
}

/// Walks the corpus directory, tokenizes every archived document and writes
/// `corpus.bin`, `uni.bin` and `total_count.txt` under `dsave`.
pub fn convert<P: LinguisticProcessor>(
    proc: &P,
    params: &Params,
    dcorpus: &Path,
    dsave: &Path,
) -> Result<()> {
    fs::create_dir_all(dsave)
        .with_context(|| format!("could not create {}", dsave.display()))?;

    let files = corpus_files(dcorpus, &params.suffix, params.from, params.limit)?;
    log::info!("convert: {} archives under {}", files.len(), dcorpus.display());

    let mut dict = Dictionary::default();
    let mut writer = CorpusWriter::create(dsave.join("corpus.bin"))?;
    let mut ids: Vec<u32> = Vec::new();
    let mut docid = 0u64;
    let mut total_count = 0u64;

    for file in &files {
        for doc in read_archive(file)? {
            let text: String = doc.nfc().collect();
            let mut empty = true;
            for token in proc.word_break(&text) {
                if !accept(params, &token) {
                    if !ids.is_empty() {
                        writer.write_phrase(&ids)?;
                        ids.clear();
                    }
                    continue;
                }
                let word: String = token.text.chars().flat_map(char::to_lowercase).collect();
                ids.push(dict.intern(word));
                empty = false;
            }
            if !ids.is_empty() {
                writer.write_phrase(&ids)?;
                ids.clear();
            }
            if !empty {
                writer.write_boundary()?;
                total_count += 1;
            }

            if docid % 100 == 0 {
                print!("\r{}: {}", docid, dict.len());
                std::io::stdout().flush()?;
            }
            docid += 1;
        }
    }
    writer.finish()?;

    dict.save(&dsave.join("uni.bin"))?;

    println!("\ntotal_count: {total_count}");
    let total_path = dsave.join("total_count.txt");
    fs::write(&total_path, total_count.to_string())
        .with_context(|| format!("unable to write to {}", total_path.display()))?;
    Ok(())
}

/// Reads back the document total written by [`convert`].
pub fn read_total_count(dsave: &Path) -> Result<u64> {
    let path = dsave.join("total_count.txt");
    let text =
        fs::read_to_string(&path).with_context(|| format!("could not open {}", path.display()))?;
    text.trim()
        .parse()
        .with_context(|| format!("{}: bad document count", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::for_each_phrase;
    use crate::lingproc::SnowballProcessor;
    use crate::stream::read_apply;
    use std::fs::File;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn make_zip(path: &Path, members: &[(&str, &str)]) {
        let mut zw = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, body) in members {
            zw.start_file(*name, SimpleFileOptions::default()).unwrap();
            zw.write_all(body.as_bytes()).unwrap();
        }
        zw.finish().unwrap();
    }

    #[test]
    fn rejects_split_phrases_and_boundaries_end_documents() {
        let corpus = tempfile::tempdir().unwrap();
        let dsave = tempfile::tempdir().unwrap();
        make_zip(
            &corpus.path().join("docs.zip"),
            &[
                // "x" is rejected (Latin), splitting the document into two
                // phrases; the trailing empty doc emits nothing
                ("1.txt", "мама мыла x раму"),
                ("2.txt", "... !!!"),
            ],
        );

        let proc = SnowballProcessor::new();
        convert(&proc, &Params::default(), corpus.path(), dsave.path()).unwrap();

        let mut phrases = Vec::new();
        for_each_phrase(dsave.path().join("corpus.bin"), |ids| {
            phrases.push(ids.to_vec());
            Ok(())
        })
        .unwrap();
        assert_eq!(phrases, vec![vec![1, 2], vec![3], vec![]]);

        let mut words = Vec::new();
        read_apply::<Unigram>(dsave.path().join("uni.bin"), |u| {
            words.push((u.text, u.id, u.count));
            Ok(())
        })
        .unwrap();
        assert_eq!(
            words,
            vec![
                ("мама".to_string(), 1, 1),
                ("мыла".to_string(), 2, 1),
                ("раму".to_string(), 3, 1),
            ]
        );

        assert_eq!(read_total_count(dsave.path()).unwrap(), 1);
    }

    #[test]
    fn interning_reuses_ids_and_counts() {
        let mut dict = Dictionary::default();
        assert_eq!(dict.intern("из".to_string()), 1);
        assert_eq!(dict.intern("за".to_string()), 2);
        assert_eq!(dict.intern("из".to_string()), 1);
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn uppercase_is_folded_before_interning() {
        let corpus = tempfile::tempdir().unwrap();
        let dsave = tempfile::tempdir().unwrap();
        make_zip(&corpus.path().join("docs.zip"), &[("1.txt", "Мама мама")]);

        let proc = SnowballProcessor::new();
        convert(&proc, &Params::default(), corpus.path(), dsave.path()).unwrap();

        let mut words = Vec::new();
        read_apply::<Unigram>(dsave.path().join("uni.bin"), |u| {
            words.push((u.text, u.count));
            Ok(())
        })
        .unwrap();
        assert_eq!(words, vec![("мама".to_string(), 2)]);
    }
}
