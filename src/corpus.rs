//! The tokenized corpus stream (`corpus.bin`).
//!
//! Unlike the record tables this is a bare packed format: each phrase is a
//! `u32` little-endian id count followed by that many `u32` ids. An empty
//! phrase marks a document boundary.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub struct CorpusWriter {
    out: BufWriter<File>,
    path: PathBuf,
}

impl CorpusWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .with_context(|| format!("could not create {}", path.display()))?;
        Ok(Self {
            out: BufWriter::new(file),
            path,
        })
    }

    pub fn write_phrase(&mut self, ids: &[u32]) -> Result<()> {
        self.out.write_all(&(ids.len() as u32).to_le_bytes())?;
        for id in ids {
            self.out.write_all(&id.to_le_bytes())?;
        }
        Ok(())
    }

    /// The empty phrase that separates documents.
    pub fn write_boundary(&mut self) -> Result<()> {
        self.write_phrase(&[])
    }

    pub fn finish(mut self) -> Result<()> {
        self.out
            .flush()
            .with_context(|| format!("{}: flush failed", self.path.display()))
    }
}

pub struct CorpusReader {
    inp: BufReader<File>,
    path: PathBuf,
}

impl CorpusReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file =
            File::open(&path).with_context(|| format!("could not open {}", path.display()))?;
        Ok(Self {
            inp: BufReader::new(file),
            path,
        })
    }

    /// Fills `ids` with the next phrase, reusing its allocation.
    /// Returns `false` at end of stream.
    pub fn read_phrase(&mut self, ids: &mut Vec<u32>) -> Result<bool> {
        ids.clear();
        let mut word = [0u8; 4];
        match self.inp.read_exact(&mut word) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(false),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("{}: read failed", self.path.display()))
            }
        }
        let len = u32::from_le_bytes(word) as usize;
        ids.reserve(len);
        for _ in 0..len {
            self.inp
                .read_exact(&mut word)
                .with_context(|| format!("{}: truncated phrase", self.path.display()))?;
            ids.push(u32::from_le_bytes(word));
        }
        Ok(true)
    }
}

/// Applies `f` to every phrase of the corpus in order, boundaries included.
pub fn for_each_phrase(
    path: impl AsRef<Path>,
    mut f: impl FnMut(&[u32]) -> Result<()>,
) -> Result<()> {
    let mut reader = CorpusReader::open(path)?;
    let mut ids = Vec::new();
    while reader.read_phrase(&mut ids)? {
        f(&ids)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phrases_and_boundaries_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.bin");

        let mut w = CorpusWriter::create(&path).unwrap();
        w.write_phrase(&[1, 2, 3]).unwrap();
        w.write_phrase(&[4]).unwrap();
        w.write_boundary().unwrap();
        w.write_phrase(&[5, 6]).unwrap();
        w.write_boundary().unwrap();
        w.finish().unwrap();

        let mut got = Vec::new();
        for_each_phrase(&path, |ids| {
            got.push(ids.to_vec());
            Ok(())
        })
        .unwrap();
        assert_eq!(
            got,
            vec![vec![1, 2, 3], vec![4], vec![], vec![5, 6], vec![]]
        );
    }
}
