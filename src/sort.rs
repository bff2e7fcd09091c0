//! External sort and k-way merge over record tables.
//!
//! [`ExternalSorter`] spills fixed-size sorted chunks to disk, then
//! [`MergeCursor`] replays them in total order through a binary heap holding
//! one record per chunk. [`merge_counts`] is the grouped reduction used to
//! collapse per-chunk n-gram counts into one record per key.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::records::{Bigram, Counted, Lem2Group, Lem2Words, Lem3Group, Lem3Words, Record, Trigram};
use crate::stream::{Reader, RecordSource, Writer};

/// A fixed ordering over records of type `T`. The merged output comes out in
/// exactly this order (the element `cmp` places first is yielded first).
pub trait SortOrder<T> {
    fn cmp(a: &T, b: &T) -> Ordering;

    fn eq(a: &T, b: &T) -> bool {
        Self::cmp(a, b) == Ordering::Equal
    }
}

/// Ascending `(id1, id2)`, the order of `bi.bin`.
pub struct BigramAsc;

impl SortOrder<Bigram> for BigramAsc {
    fn cmp(a: &Bigram, b: &Bigram) -> Ordering {
        (a.id1, a.id2).cmp(&(b.id1, b.id2))
    }
}

/// Ascending `(id1, id2, id3)`, the order of `tri.bin`.
pub struct TrigramAsc;

impl SortOrder<Trigram> for TrigramAsc {
    fn cmp(a: &Trigram, b: &Trigram) -> Ordering {
        (a.id1, a.id2, a.id3).cmp(&(b.id1, b.id2, b.id3))
    }
}

/// Descending `(lid1, lid2)`; clusters equal lemma pairs for grouping.
pub struct Lem2WordsDesc;

impl SortOrder<Lem2Words> for Lem2WordsDesc {
    fn cmp(a: &Lem2Words, b: &Lem2Words) -> Ordering {
        (b.lid1, b.lid2).cmp(&(a.lid1, a.lid2))
    }
}

/// Descending `(lid1, lid2, lid3)`.
pub struct Lem3WordsDesc;

impl SortOrder<Lem3Words> for Lem3WordsDesc {
    fn cmp(a: &Lem3Words, b: &Lem3Words) -> Ordering {
        (b.lid1, b.lid2, b.lid3).cmp(&(a.lid1, a.lid2, a.lid3))
    }
}

/// Ascending group weight, lowest scores first.
pub struct Lem2WeightAsc;

impl SortOrder<Lem2Group> for Lem2WeightAsc {
    fn cmp(a: &Lem2Group, b: &Lem2Group) -> Ordering {
        a.weight.total_cmp(&b.weight)
    }
}

/// Ascending group weight for trigram groups.
pub struct Lem3WeightAsc;

impl SortOrder<Lem3Group> for Lem3WeightAsc {
    fn cmp(a: &Lem3Group, b: &Lem3Group) -> Ordering {
        a.weight.total_cmp(&b.weight)
    }
}

struct Entry<T, O> {
    rec: T,
    src: usize,
    _order: PhantomData<O>,
}

impl<T, O: SortOrder<T>> PartialEq for Entry<T, O> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T, O: SortOrder<T>> Eq for Entry<T, O> {}

impl<T, O: SortOrder<T>> PartialOrd for Entry<T, O> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, O: SortOrder<T>> Ord for Entry<T, O> {
    // BinaryHeap pops its greatest element; invert so the record the order
    // places first is on top. Source index breaks ties to keep a total order.
    fn cmp(&self, other: &Self) -> Ordering {
        O::cmp(&other.rec, &self.rec).then(other.src.cmp(&self.src))
    }
}

/// Lazy, forward-only cursor over the merged record sequence of several
/// sorted part files. Holds one record per part plus the heap.
pub struct MergeCursor<T: Record, O: SortOrder<T>> {
    readers: Vec<Reader<T>>,
    heap: BinaryHeap<Entry<T, O>>,
}

impl<T: Record, O: SortOrder<T>> MergeCursor<T, O> {
    pub fn new(paths: &[PathBuf]) -> Result<Self> {
        let mut readers = Vec::with_capacity(paths.len());
        for path in paths {
            readers.push(Reader::<T>::open(path)?);
        }
        let mut heap = BinaryHeap::with_capacity(readers.len());
        for (src, reader) in readers.iter_mut().enumerate() {
            if let Some(rec) = reader.read()? {
                heap.push(Entry {
                    rec,
                    src,
                    _order: PhantomData,
                });
            }
        }
        Ok(Self { readers, heap })
    }

    pub fn next(&mut self) -> Result<Option<T>> {
        let Some(entry) = self.heap.pop() else {
            return Ok(None);
        };
        if let Some(rec) = self.readers[entry.src].read()? {
            self.heap.push(Entry {
                rec,
                src: entry.src,
                _order: PhantomData,
            });
        }
        Ok(Some(entry.rec))
    }
}

/// Sorts an arbitrarily large record stream by spilling sorted chunks of at
/// most `max_elems` records into `save_dir`, which is wiped on construction
/// so re-runs are deterministic.
pub struct ExternalSorter {
    save_dir: PathBuf,
    max_elems: usize,
}

impl ExternalSorter {
    pub fn new(save_dir: impl AsRef<Path>, max_elems: usize) -> Result<Self> {
        let save_dir = save_dir.as_ref().to_path_buf();
        if save_dir.exists() {
            fs::remove_dir_all(&save_dir)
                .with_context(|| format!("could not clear {}", save_dir.display()))?;
        }
        fs::create_dir_all(&save_dir)
            .with_context(|| format!("could not create {}", save_dir.display()))?;
        Ok(Self {
            save_dir,
            max_elems,
        })
    }

    /// Drains `src`, writes sorted chunks and returns a cursor over their
    /// merge. The chunk-internal sort is unstable; records with equal keys
    /// come back in unspecified relative order.
    pub fn sort_unstable<S, O>(&self, mut src: S) -> Result<MergeCursor<S::Item, O>>
    where
        S: RecordSource,
        S::Item: Record,
        O: SortOrder<S::Item>,
    {
        let mut paths = Vec::new();
        let mut buf: Vec<S::Item> = Vec::new();

        let spill = |buf: &mut Vec<S::Item>, paths: &mut Vec<PathBuf>| -> Result<()> {
            buf.sort_unstable_by(O::cmp);
            let path = self.save_dir.join(format!("{}.bin", paths.len()));
            let mut writer = Writer::<S::Item>::create(&path, buf.len() as u64)?;
            for rec in buf.drain(..) {
                writer.write(&rec)?;
            }
            writer.finish()?;
            paths.push(path);
            Ok(())
        };

        while let Some(rec) = src.next_rec()? {
            buf.push(rec);
            if buf.len() == self.max_elems {
                spill(&mut buf, &mut paths)?;
            }
        }
        if !buf.is_empty() {
            spill(&mut buf, &mut paths)?;
        }

        MergeCursor::new(&paths)
    }
}

/// Collapses consecutive equal-keyed records of a cursor by summing their
/// counts, writing one record per group.
pub fn groupby_save<T, O>(mut cursor: MergeCursor<T, O>, fout: impl AsRef<Path>) -> Result<()>
where
    T: Record + Counted,
    O: SortOrder<T>,
{
    let mut writer = Writer::<T>::create(fout, 0)?;
    let mut prev: Option<T> = None;
    while let Some(rec) = cursor.next()? {
        match prev {
            Some(ref mut p) if O::eq(p, &rec) => p.add_count(rec.count()),
            Some(p) => {
                writer.write(&p)?;
                prev = Some(rec);
            }
            None => prev = Some(rec),
        }
    }
    if let Some(p) = prev {
        writer.write(&p)?;
    }
    writer.finish()
}

/// Merges sorted count chunks into one table with unique keys.
pub fn merge_counts<T, O>(paths: &[PathBuf], fout: impl AsRef<Path>) -> Result<()>
where
    T: Record + Counted,
    O: SortOrder<T>,
{
    groupby_save::<T, O>(MergeCursor::<T, O>::new(paths)?, fout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::read_apply;

    /// Greater `(id1, id2)` first.
    struct BigramDesc;

    impl SortOrder<Bigram> for BigramDesc {
        fn cmp(a: &Bigram, b: &Bigram) -> Ordering {
            (b.id1, b.id2).cmp(&(a.id1, a.id2))
        }
    }

    fn bigram(id1: u32, id2: u32, count: u32) -> Bigram {
        Bigram { id1, id2, count }
    }

    #[test]
    fn sorter_merges_chunks_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let fin = dir.path().join("grams_to_sort.bin");

        let recs = vec![
            bigram(8, 9, 3235),
            bigram(4, 12, 235),
            bigram(1, 2, 444235),
            bigram(8, 8, 9985),
        ];
        let mut w = Writer::<Bigram>::create(&fin, recs.len() as u64).unwrap();
        for r in &recs {
            w.write(r).unwrap();
        }
        w.finish().unwrap();

        // two records per chunk forces a real multi-part merge
        let sorter = ExternalSorter::new(dir.path().join("parts"), 2).unwrap();
        let mut merger = sorter
            .sort_unstable::<_, BigramDesc>(Reader::<Bigram>::open(&fin).unwrap())
            .unwrap();

        let mut keys = Vec::new();
        while let Some(rec) = merger.next().unwrap() {
            keys.push((rec.id1, rec.id2));
        }
        assert_eq!(keys, vec![(8, 9), (8, 8), (4, 12), (1, 2)]);
    }

    #[test]
    fn sorter_wipes_stale_parts() {
        let dir = tempfile::tempdir().unwrap();
        let parts = dir.path().join("parts");
        std::fs::create_dir_all(&parts).unwrap();
        std::fs::write(parts.join("99.bin"), b"stale").unwrap();

        ExternalSorter::new(&parts, 2).unwrap();
        assert!(!parts.join("99.bin").exists());
    }

    #[test]
    fn merge_counts_sums_groups() {
        let dir = tempfile::tempdir().unwrap();

        // each part is sorted ascending within itself
        let part = |name: &str, recs: &[Bigram]| -> PathBuf {
            let path = dir.path().join(name);
            let mut w = Writer::<Bigram>::create(&path, recs.len() as u64).unwrap();
            for r in recs {
                w.write(r).unwrap();
            }
            w.finish().unwrap();
            path
        };
        let paths = vec![
            part("1_bi.bin", &[bigram(1, 2, 5), bigram(3, 4, 1)]),
            part("2_bi.bin", &[bigram(1, 2, 7), bigram(5, 6, 2)]),
        ];

        let fout = dir.path().join("bi.bin");
        merge_counts::<Bigram, BigramAsc>(&paths, &fout).unwrap();

        let mut got = Vec::new();
        read_apply::<Bigram>(&fout, |r| {
            got.push(r);
            Ok(())
        })
        .unwrap();
        assert_eq!(
            got,
            vec![bigram(1, 2, 12), bigram(3, 4, 1), bigram(5, 6, 2)]
        );
    }
}
