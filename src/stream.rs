//! Streaming record I/O for the table files.
//!
//! A table is a [`Header`] followed by length-delimited bincode records, all
//! behind a `u32` little-endian length prefix. [`Reader`] refuses a file
//! whose header names a different record type.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::records::{Header, Record};

fn write_frame(out: &mut impl Write, bytes: &[u8]) -> Result<()> {
    out.write_all(&(bytes.len() as u32).to_le_bytes())?;
    out.write_all(bytes)?;
    Ok(())
}

/// Reads one length-prefixed frame. `None` on a clean end of file.
fn read_frame(inp: &mut impl Read, buf: &mut Vec<u8>) -> Result<Option<()>> {
    let mut len = [0u8; 4];
    match inp.read_exact(&mut len) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    buf.resize(u32::from_le_bytes(len) as usize, 0);
    inp.read_exact(buf)?;
    Ok(Some(()))
}

/// Anything that can hand out records one at a time: plain file readers and
/// the explode transformer both implement this, so the external sorter can
/// consume either.
pub trait RecordSource {
    type Item;
    fn next_rec(&mut self) -> Result<Option<Self::Item>>;
}

pub struct Writer<T: Record> {
    out: BufWriter<File>,
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: Record> Writer<T> {
    pub fn create(path: impl AsRef<Path>, total: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .with_context(|| format!("could not create {}", path.display()))?;
        let mut out = BufWriter::new(file);
        let header = Header {
            msg_type: T::MSG_TYPE.to_string(),
            total,
        };
        let bytes = bincode::serialize(&header)?;
        write_frame(&mut out, &bytes)
            .with_context(|| format!("{}: header writing failed", path.display()))?;
        Ok(Self {
            out,
            path,
            _marker: PhantomData,
        })
    }

    pub fn write(&mut self, rec: &T) -> Result<()> {
        let bytes = bincode::serialize(rec)?;
        write_frame(&mut self.out, &bytes)
            .with_context(|| format!("{}: writing failed", self.path.display()))
    }

    pub fn finish(mut self) -> Result<()> {
        self.out
            .flush()
            .with_context(|| format!("{}: flush failed", self.path.display()))
    }
}

#[derive(Debug)]
pub struct Reader<T: Record> {
    inp: BufReader<File>,
    path: PathBuf,
    total: u64,
    buf: Vec<u8>,
    _marker: PhantomData<T>,
}

impl<T: Record> Reader<T> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file =
            File::open(&path).with_context(|| format!("could not open {}", path.display()))?;
        let mut inp = BufReader::new(file);
        let mut buf = Vec::new();
        let header = match read_frame(&mut inp, &mut buf)? {
            Some(()) => bincode::deserialize::<Header>(&buf)
                .with_context(|| format!("{}: could not read file header", path.display()))?,
            None => bail!("{}: could not read file header", path.display()),
        };
        if header.msg_type != T::MSG_TYPE {
            bail!(
                "{}: file type {} does not match {}",
                path.display(),
                header.msg_type,
                T::MSG_TYPE
            );
        }
        Ok(Self {
            inp,
            path,
            total: header.total,
            buf,
            _marker: PhantomData,
        })
    }

    /// The header's informational record count.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn read(&mut self) -> Result<Option<T>> {
        match read_frame(&mut self.inp, &mut self.buf)
            .with_context(|| format!("{}: read failed", self.path.display()))?
        {
            Some(()) => Ok(Some(bincode::deserialize(&self.buf).with_context(
                || format!("{}: record decoding failed", self.path.display()),
            )?)),
            None => Ok(None),
        }
    }
}

impl<T: Record> RecordSource for Reader<T> {
    type Item = T;
    fn next_rec(&mut self) -> Result<Option<T>> {
        self.read()
    }
}

/// Reads only the header of a table and returns it. Used for type
/// auto-detection and `total` queries.
pub fn read_header(path: impl AsRef<Path>) -> Result<Header> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("could not open {}", path.display()))?;
    let mut inp = BufReader::new(file);
    let mut buf = Vec::new();
    match read_frame(&mut inp, &mut buf)? {
        Some(()) => bincode::deserialize(&buf)
            .with_context(|| format!("{}: could not read file header", path.display())),
        None => bail!("{}: could not read file header", path.display()),
    }
}

pub fn read_total<T: Record>(path: impl AsRef<Path>) -> Result<u64> {
    Ok(Reader::<T>::open(path)?.total())
}

/// Opens a table and applies `fn` to every record.
pub fn read_apply<T: Record>(
    path: impl AsRef<Path>,
    mut f: impl FnMut(T) -> Result<()>,
) -> Result<()> {
    let mut reader = Reader::<T>::open(path)?;
    while let Some(rec) = reader.read()? {
        f(rec)?;
    }
    Ok(())
}

/// Adapts a record source into another one, fanning each input record out to
/// zero or more derived records. The queue is drained before the next input
/// record is pulled, so the upstream is never materialized.
pub struct Transformer<S, T, F> {
    src: S,
    f: F,
    queue: VecDeque<T>,
    done: bool,
}

impl<S, T, F> Transformer<S, T, F>
where
    S: RecordSource,
    F: FnMut(S::Item, &mut VecDeque<T>),
{
    pub fn new(src: S, f: F) -> Self {
        Self {
            src,
            f,
            queue: VecDeque::new(),
            done: false,
        }
    }
}

impl<S, T, F> RecordSource for Transformer<S, T, F>
where
    S: RecordSource,
    F: FnMut(S::Item, &mut VecDeque<T>),
{
    type Item = T;

    fn next_rec(&mut self) -> Result<Option<T>> {
        while self.queue.is_empty() && !self.done {
            match self.src.next_rec()? {
                Some(rec) => (self.f)(rec, &mut self.queue),
                None => self.done = true,
            }
        }
        Ok(self.queue.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Bigram, Trigram};

    #[test]
    fn roundtrip_preserves_records_and_total() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bi.bin");

        let recs = vec![
            Bigram {
                id1: 1,
                id2: 2,
                count: 3,
            },
            Bigram {
                id1: 4,
                id2: 5,
                count: 6,
            },
        ];
        let mut w = Writer::<Bigram>::create(&path, recs.len() as u64).unwrap();
        for r in &recs {
            w.write(r).unwrap();
        }
        w.finish().unwrap();

        let mut r = Reader::<Bigram>::open(&path).unwrap();
        assert_eq!(r.total(), 2);
        let mut got = Vec::new();
        while let Some(rec) = r.read().unwrap() {
            got.push(rec);
        }
        assert_eq!(got, recs);
    }

    #[test]
    fn wrong_type_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tri.bin");

        let mut w = Writer::<Trigram>::create(&path, 1).unwrap();
        w.write(&Trigram {
            id1: 1,
            id2: 2,
            id3: 3,
            count: 1,
        })
        .unwrap();
        w.finish().unwrap();

        let err = Reader::<Bigram>::open(&path).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Trigram"), "{msg}");
        assert!(msg.contains("does not match"), "{msg}");

        assert_eq!(read_header(&path).unwrap().msg_type, "Trigram");
    }

    #[test]
    fn transformer_fans_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bi.bin");

        let mut w = Writer::<Bigram>::create(&path, 0).unwrap();
        for id1 in [1u32, 2] {
            w.write(&Bigram {
                id1,
                id2: 9,
                count: id1,
            })
            .unwrap();
        }
        w.finish().unwrap();

        // one input record becomes two output records
        let src = Reader::<Bigram>::open(&path).unwrap();
        let mut tr = Transformer::new(src, |b: Bigram, q: &mut VecDeque<u32>| {
            q.push_back(b.id1);
            q.push_back(b.id1 + 100);
        });

        let mut got = Vec::new();
        while let Some(x) = tr.next_rec().unwrap() {
            got.push(x);
        }
        assert_eq!(got, vec![1, 101, 2, 102]);
    }
}
