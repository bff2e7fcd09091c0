//! The bigram half of the pipeline: surface counts, lemma-level grouping and
//! scoring, document-frequency verification, and the final filter.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::corpus::for_each_phrase;
use crate::lemma::{lem_weights, load_lems};
use crate::records::{Bigram, Case2, LemFreq, LemId, Lem2Group, Lem2Words};
use crate::sort::{merge_counts, BigramAsc, ExternalSorter, Lem2WeightAsc, Lem2WordsDesc};
use crate::stream::{read_apply, read_total, Reader, Transformer, Writer};

/// Documents between progress heartbeats.
pub(crate) const PROGRESS_EVERY: u64 = 100;
/// Documents between chunk spills in the counting scans.
pub(crate) const FLUSH_EVERY: u64 = 40_000;
/// Buffered records in the exploded lemma n-gram sorts.
pub(crate) const EXPLODE_BUF: usize = 80_000_000;
/// Buffered records in the filter sort.
const FILTER_BUF: usize = 20_000_000;

pub(crate) fn progress(docid: u64, size: usize) -> Result<()> {
    print!("\r{docid}: {size}");
    std::io::stdout().flush()?;
    Ok(())
}

/// Clears `dir` and recreates it; counting scans own their part directory.
pub(crate) fn fresh_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).with_context(|| format!("could not clear {}", dir.display()))?;
    }
    fs::create_dir_all(dir).with_context(|| format!("could not create {}", dir.display()))
}

/// Drains a count map into a table sorted ascending by key.
fn save_bi(bis: &mut HashMap<(u32, u32), u32>, fout: &Path) -> Result<()> {
    let mut v: Vec<((u32, u32), u32)> = bis.drain().collect();
    v.sort_unstable_by_key(|&(key, _)| key);
    let mut writer = Writer::<Bigram>::create(fout, v.len() as u64)?;
    for ((id1, id2), count) in v {
        writer.write(&Bigram { id1, id2, count })?;
    }
    writer.finish()
}

/// Counts adjacent word-id pairs within phrases, spilling sorted chunks
/// every [`FLUSH_EVERY`] documents, then merges them into `bi.bin`.
pub fn bigram_stat(dsave: &Path) -> Result<()> {
    let dout = dsave.join("bi_parts");
    fresh_dir(&dout)?;

    let mut bis: HashMap<(u32, u32), u32> = HashMap::new();
    let mut paths: Vec<PathBuf> = Vec::new();
    let mut docid = 1u64;

    for_each_phrase(dsave.join("corpus.bin"), |ids| {
        if ids.is_empty() {
            if docid % PROGRESS_EVERY == 0 {
                progress(docid, bis.len())?;
            }
            if docid % FLUSH_EVERY == 0 {
                let fout = dout.join(format!("{}_bi.bin", paths.len() + 1));
                save_bi(&mut bis, &fout)?;
                paths.push(fout);
            }
            docid += 1;
        }
        for pair in ids.windows(2) {
            *bis.entry((pair[0], pair[1])).or_insert(0) += 1;
        }
        Ok(())
    })?;

    let fout = dout.join(format!("{}_bi.bin", paths.len() + 1));
    save_bi(&mut bis, &fout)?;
    paths.push(fout);

    merge_counts::<Bigram, BigramAsc>(&paths, dsave.join("bi.bin"))?;
    log::info!("bigram_stat: {} documents, {} chunks", docid - 1, paths.len());
    Ok(())
}

/// Explodes surface bigrams into lemma-pair readings, externally sorts them
/// so equal pairs cluster, and scores one group per distinct `(lid1, lid2)`:
///
/// ```text
/// score = max(0, N * (weight - threshold) / (W1 * W2))
/// ```
///
/// where `weight` accumulates `count / (|lems(w1)| * |lems(w2)|)` over the
/// group's cases, `N` is the lemma dictionary size and `Wi` the distributed
/// lemma weights. Only groups with positive score reach `extended2.bin`.
pub fn group_lem2(dsave: &Path, threshold: f64) -> Result<()> {
    let lems = load_lems(dsave.join("lems.bin"))?;
    let lid_w = lem_weights(&dsave.join("uni.bin"), &lems)?;

    let explode = |bi: Bigram, q: &mut VecDeque<Lem2Words>| {
        let prev = &lems[bi.id1 as usize - 1];
        let cur = &lems[bi.id2 as usize - 1];
        for &lid1 in prev {
            for &lid2 in cur {
                q.push_back(Lem2Words {
                    lid1,
                    lid2,
                    wid1: bi.id1,
                    wid2: bi.id2,
                    count: bi.count,
                });
            }
        }
    };
    let exploded = Transformer::new(Reader::<Bigram>::open(dsave.join("bi.bin"))?, explode);

    let sorter = ExternalSorter::new(dsave.join("extended2_parts"), EXPLODE_BUF)?;
    let mut merger = sorter.sort_unstable::<_, Lem2WordsDesc>(exploded)?;

    let mut writer = Writer::<Lem2Group>::create(dsave.join("extended2.bin"), 0)?;
    let n = lid_w.len() as f64;

    let mut group: Option<Lem2Group> = None;
    let write_one = |group: Lem2Group, writer: &mut Writer<Lem2Group>| -> Result<()> {
        let w1 = lid_w.get(&group.lid1).copied().unwrap_or(0.0);
        let w2 = lid_w.get(&group.lid2).copied().unwrap_or(0.0);
        let score = if w1 == 0.0 || w2 == 0.0 {
            0.0
        } else {
            (n * (group.weight - threshold) / w1 / w2).max(0.0)
        };
        if score > 0.0 {
            writer.write(&Lem2Group { weight: score, ..group })?;
        }
        Ok(())
    };

    while let Some(rec) = merger.next()? {
        match group {
            Some(ref g) if g.lid1 == rec.lid1 && g.lid2 == rec.lid2 => {}
            Some(g) => {
                write_one(g, &mut writer)?;
                group = None;
            }
            None => {}
        }
        let g = group.get_or_insert_with(|| Lem2Group {
            lid1: rec.lid1,
            lid2: rec.lid2,
            weight: 0.0,
            cases: Vec::new(),
        });
        g.cases.push(Case2 {
            wid1: rec.wid1,
            wid2: rec.wid2,
            count: rec.count,
        });
        let times = lems[rec.wid1 as usize - 1].len() * lems[rec.wid2 as usize - 1].len();
        g.weight += f64::from(rec.count) / times as f64;
    }
    if let Some(g) = group {
        write_one(g, &mut writer)?;
    }
    writer.finish()
}

fn merge_unifreq(uni: &HashMap<u32, u32>, dsave: &Path) -> Result<()> {
    let flemid = dsave.join("lemid.bin");
    if uni.len() as u64 != read_total::<LemId>(&flemid)? {
        bail!("uni size does not match lemid size");
    }

    let mut writer = Writer::<LemFreq>::create(dsave.join("lemfreq.bin"), uni.len() as u64)?;
    read_apply::<LemId>(&flemid, |m| {
        let count = match uni.get(&m.id) {
            Some(&count) => count,
            None => bail!("lemma {} missing from the frequency pass", m.id),
        };
        writer.write(&LemFreq {
            text: m.text,
            id: m.id,
            count,
        })
    })?;
    writer.finish()
}

/// Re-scans the corpus counting, per document, every lemma and every lemma
/// pair that survived grouping. Each key counts once per document. A seeded
/// pair that never occurs again is an inconsistency and aborts the run.
///
/// Writes `bifreq.bin` (pair doc counts) and `lemfreq.bin` (lemma doc
/// counts).
pub fn bifreq_stat(dsave: &Path) -> Result<()> {
    let lems = load_lems(dsave.join("lems.bin"))?;

    let mut bi: HashMap<(u32, u32), u32> = HashMap::new();
    read_apply::<Lem2Group>(dsave.join("extended2.bin"), |g| {
        bi.insert((g.lid1, g.lid2), 0);
        Ok(())
    })?;

    let mut uni: HashMap<u32, u32> = HashMap::new();
    let mut uniset: HashSet<u32> = HashSet::new();
    let mut biset: HashSet<(u32, u32)> = HashSet::new();
    let mut docid = 1u64;

    for_each_phrase(dsave.join("corpus.bin"), |ids| {
        if ids.is_empty() {
            for lid in uniset.drain() {
                *uni.entry(lid).or_insert(0) += 1;
            }
            for pair in biset.drain() {
                if let Some(count) = bi.get_mut(&pair) {
                    *count += 1;
                }
            }
            if docid % PROGRESS_EVERY == 0 {
                progress(docid, uni.len() + bi.len())?;
            }
            docid += 1;
        }
        for (i, &wid) in ids.iter().enumerate() {
            for &rid in &lems[wid as usize - 1] {
                uniset.insert(rid);
                if i == 0 {
                    continue;
                }
                for &lid in &lems[ids[i - 1] as usize - 1] {
                    let pair = (lid, rid);
                    if bi.contains_key(&pair) {
                        biset.insert(pair);
                    }
                }
            }
        }
        Ok(())
    })?;

    if bi.values().any(|&count| count == 0) {
        bail!("bi: doc count is zero");
    }

    save_bi(&mut bi, &dsave.join("bifreq.bin"))?;
    merge_unifreq(&uni, dsave)
}

/// Keeps the groups seen in more than `th1` documents with score above
/// `th2`, emitting them in ascending score order.
pub fn filter_bilems(dsave: &Path, th1: u32, th2: f64) -> Result<()> {
    let mut freqs: HashMap<(u32, u32), u32> = HashMap::new();
    read_apply::<Bigram>(dsave.join("bifreq.bin"), |m| {
        freqs.insert((m.id1, m.id2), m.count);
        Ok(())
    })?;

    let sorter = ExternalSorter::new(dsave.join("bifiltered_parts"), FILTER_BUF)?;
    let mut merger = sorter
        .sort_unstable::<_, Lem2WeightAsc>(Reader::<Lem2Group>::open(dsave.join("extended2.bin"))?)?;

    let mut kept = 0u64;
    let mut writer = Writer::<Lem2Group>::create(dsave.join("bifiltered.bin"), 0)?;
    while let Some(g) = merger.next()? {
        let count = match freqs.get(&(g.lid1, g.lid2)) {
            Some(&count) => count,
            None => bail!("pair ({}, {}) missing from bifreq", g.lid1, g.lid2),
        };
        if count > th1 && g.weight > th2 {
            writer.write(&g)?;
            kept += 1;
        }
    }
    writer.finish()?;
    log::info!("filter_bilems: kept {kept}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::CorpusWriter;
    use crate::records::{Phrase, Unigram};

    pub(crate) fn write_corpus(dsave: &Path, docs: &[Vec<Vec<u32>>]) {
        let mut w = CorpusWriter::create(dsave.join("corpus.bin")).unwrap();
        for doc in docs {
            for phrase in doc {
                w.write_phrase(phrase).unwrap();
            }
            w.write_boundary().unwrap();
        }
        w.finish().unwrap();
    }

    pub(crate) fn write_uni(dsave: &Path, words: &[(&str, u32, u32)]) {
        let path = dsave.join("uni.bin");
        let mut w = Writer::<Unigram>::create(&path, words.len() as u64).unwrap();
        for &(text, id, count) in words {
            w.write(&Unigram {
                text: text.to_string(),
                id,
                count,
            })
            .unwrap();
        }
        w.finish().unwrap();
    }

    pub(crate) fn write_lems(dsave: &Path, lems: &[&[u32]]) {
        let path = dsave.join("lems.bin");
        let mut w = Writer::<Phrase>::create(&path, lems.len() as u64).unwrap();
        for ids in lems {
            w.write(&Phrase { ids: ids.to_vec() }).unwrap();
        }
        w.finish().unwrap();
    }

    pub(crate) fn write_lemid(dsave: &Path, lemmas: &[(&str, u32)]) {
        let path = dsave.join("lemid.bin");
        let mut w = Writer::<LemId>::create(&path, lemmas.len() as u64).unwrap();
        for &(text, id) in lemmas {
            w.write(&LemId {
                text: text.to_string(),
                id,
            })
            .unwrap();
        }
        w.finish().unwrap();
    }

    fn read_bigrams(path: &Path) -> Vec<(u32, u32, u32)> {
        let mut got = Vec::new();
        read_apply::<Bigram>(path, |b| {
            got.push((b.id1, b.id2, b.count));
            Ok(())
        })
        .unwrap();
        got
    }

    #[test]
    fn pairs_stop_at_phrase_and_document_edges() {
        let dsave = tempfile::tempdir().unwrap();
        // one document, phrases [1 2] and [3]: the only pair is (1, 2)
        write_corpus(dsave.path(), &[vec![vec![1, 2], vec![3]]]);

        bigram_stat(dsave.path()).unwrap();

        assert_eq!(
            read_bigrams(&dsave.path().join("bi.bin")),
            vec![(1, 2, 1)]
        );
    }

    #[test]
    fn counts_accumulate_across_documents() {
        let dsave = tempfile::tempdir().unwrap();
        write_corpus(
            dsave.path(),
            &[
                vec![vec![1, 2, 3]],
                vec![vec![1, 2]],
                vec![vec![2, 3]],
            ],
        );

        bigram_stat(dsave.path()).unwrap();

        assert_eq!(
            read_bigrams(&dsave.path().join("bi.bin")),
            vec![(1, 2, 2), (2, 3, 2)]
        );
    }

    #[test]
    fn homonyms_split_group_weight() {
        let dsave = tempfile::tempdir().unwrap();
        // word 1 reads as lemma 1 or 2, word 2 only as lemma 3
        write_uni(dsave.path(), &[("аа", 1, 1), ("бб", 2, 2)]);
        write_lems(dsave.path(), &[&[1, 2], &[3]]);
        let mut w = Writer::<Bigram>::create(dsave.path().join("bi.bin"), 1).unwrap();
        w.write(&Bigram {
            id1: 1,
            id2: 2,
            count: 2,
        })
        .unwrap();
        w.finish().unwrap();

        group_lem2(dsave.path(), 0.0).unwrap();

        // W(1) = W(2) = 0.5, W(3) = 2, N = 3; each group's weight is
        // 2 / (2 * 1) = 1, so score = 3 * 1 / (0.5 * 2) = 3
        let mut got = Vec::new();
        read_apply::<Lem2Group>(dsave.path().join("extended2.bin"), |g| {
            got.push(g);
            Ok(())
        })
        .unwrap();

        // merged descending by (lid1, lid2)
        assert_eq!(got.len(), 2);
        assert_eq!((got[0].lid1, got[0].lid2), (2, 3));
        assert_eq!((got[1].lid1, got[1].lid2), (1, 3));
        for g in &got {
            assert!((g.weight - 3.0).abs() < 1e-12, "score {}", g.weight);
            assert_eq!(
                g.cases,
                vec![Case2 {
                    wid1: 1,
                    wid2: 2,
                    count: 2,
                }]
            );
        }
    }

    #[test]
    fn threshold_suppresses_weak_groups() {
        let dsave = tempfile::tempdir().unwrap();
        write_uni(dsave.path(), &[("аа", 1, 1), ("бб", 2, 2)]);
        write_lems(dsave.path(), &[&[1, 2], &[3]]);
        let mut w = Writer::<Bigram>::create(dsave.path().join("bi.bin"), 1).unwrap();
        w.write(&Bigram {
            id1: 1,
            id2: 2,
            count: 2,
        })
        .unwrap();
        w.finish().unwrap();

        // weight per group is 1, so a threshold of 1 floors every score at 0
        group_lem2(dsave.path(), 1.0).unwrap();

        let mut total = 0;
        read_apply::<Lem2Group>(dsave.path().join("extended2.bin"), |_| {
            total += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(total, 0);
    }

    #[test]
    fn doc_counts_are_per_document_not_per_occurrence() {
        let dsave = tempfile::tempdir().unwrap();
        write_lems(dsave.path(), &[&[1], &[2]]);
        write_lemid(dsave.path(), &[("а", 1), ("б", 2)]);
        // pair (1, 2) occurs twice in the first document, once in the second
        write_corpus(
            dsave.path(),
            &[vec![vec![1, 2, 1, 2]], vec![vec![1, 2]]],
        );
        let mut w = Writer::<Lem2Group>::create(dsave.path().join("extended2.bin"), 1).unwrap();
        w.write(&Lem2Group {
            lid1: 1,
            lid2: 2,
            weight: 1.0,
            cases: vec![Case2 {
                wid1: 1,
                wid2: 2,
                count: 3,
            }],
        })
        .unwrap();
        w.finish().unwrap();

        bifreq_stat(dsave.path()).unwrap();

        assert_eq!(
            read_bigrams(&dsave.path().join("bifreq.bin")),
            vec![(1, 2, 2)]
        );

        let mut freqs = Vec::new();
        read_apply::<LemFreq>(dsave.path().join("lemfreq.bin"), |m| {
            freqs.push((m.text, m.id, m.count));
            Ok(())
        })
        .unwrap();
        assert_eq!(
            freqs,
            vec![("а".to_string(), 1, 2), ("б".to_string(), 2, 2)]
        );
    }

    #[test]
    fn seeded_pair_without_occurrences_is_fatal() {
        let dsave = tempfile::tempdir().unwrap();
        write_lems(dsave.path(), &[&[1], &[2]]);
        write_lemid(dsave.path(), &[("а", 1), ("б", 2)]);
        write_corpus(dsave.path(), &[vec![vec![1, 2]]]);
        // pair (2, 1) never occurs in the corpus
        let mut w = Writer::<Lem2Group>::create(dsave.path().join("extended2.bin"), 1).unwrap();
        w.write(&Lem2Group {
            lid1: 2,
            lid2: 1,
            weight: 1.0,
            cases: vec![Case2 {
                wid1: 2,
                wid2: 1,
                count: 1,
            }],
        })
        .unwrap();
        w.finish().unwrap();

        let err = bifreq_stat(dsave.path()).unwrap_err();
        assert!(err.to_string().contains("doc count is zero"), "{err}");
    }

    #[test]
    fn filter_requires_both_gates() {
        let dsave = tempfile::tempdir().unwrap();

        let groups = [
            (1u32, 2u32, 0.011f64, 1001u32), // passes both
            (1, 3, 0.011, 1000),             // doc count not above th1
            (1, 4, 0.010, 2000),             // weight not above th2
        ];
        let mut w = Writer::<Lem2Group>::create(
            dsave.path().join("extended2.bin"),
            groups.len() as u64,
        )
        .unwrap();
        let mut f =
            Writer::<Bigram>::create(dsave.path().join("bifreq.bin"), groups.len() as u64)
                .unwrap();
        for &(lid1, lid2, weight, dc) in &groups {
            w.write(&Lem2Group {
                lid1,
                lid2,
                weight,
                cases: vec![Case2 {
                    wid1: 1,
                    wid2: 2,
                    count: 1,
                }],
            })
            .unwrap();
            f.write(&Bigram {
                id1: lid1,
                id2: lid2,
                count: dc,
            })
            .unwrap();
        }
        w.finish().unwrap();
        f.finish().unwrap();

        filter_bilems(dsave.path(), 1_000, 0.01).unwrap();

        let mut kept = Vec::new();
        read_apply::<Lem2Group>(dsave.path().join("bifiltered.bin"), |g| {
            kept.push((g.lid1, g.lid2));
            Ok(())
        })
        .unwrap();
        assert_eq!(kept, vec![(1, 2)]);
    }
}
