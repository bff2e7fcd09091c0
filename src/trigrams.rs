//! The trigram half of the pipeline. Mirrors `bigrams.rs`, except that the
//! corpus scan only grows triples around bigrams that survived filtering,
//! and the final filter sorts in memory (the survivor file is small).

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::bigrams::{fresh_dir, progress, EXPLODE_BUF, FLUSH_EVERY, PROGRESS_EVERY};
use crate::corpus::for_each_phrase;
use crate::lemma::{lem_weights, load_lems};
use crate::records::{Case3, Lem2Group, Lem3Group, Lem3Words, Trigram};
use crate::sort::{merge_counts, ExternalSorter, Lem3WeightAsc, Lem3WordsDesc, SortOrder, TrigramAsc};
use crate::stream::{read_apply, Reader, Transformer, Writer};

fn save_tri(tris: &mut HashMap<(u32, u32, u32), u32>, fout: &Path) -> Result<()> {
    let mut v: Vec<((u32, u32, u32), u32)> = tris.drain().collect();
    v.sort_unstable_by_key(|&(key, _)| key);
    let mut writer = Writer::<Trigram>::create(fout, v.len() as u64)?;
    for ((id1, id2, id3), count) in v {
        writer.write(&Trigram {
            id1,
            id2,
            id3,
            count,
        })?;
    }
    writer.finish()
}

/// Every surface pair appearing as a case of a filtered bigram group; these
/// anchor the trigram scan.
fn load_filtered_bigrams(dsave: &Path) -> Result<HashSet<(u32, u32)>> {
    let mut biwids = HashSet::new();
    read_apply::<Lem2Group>(dsave.join("bifiltered.bin"), |g| {
        for case in &g.cases {
            biwids.insert((case.wid1, case.wid2));
        }
        Ok(())
    })?;
    Ok(biwids)
}

/// Counts word-id triples around anchor pairs. For each adjacent pair
/// `(a, b)` of a phrase that is an anchor, the right extension `(a, b, next)`
/// always counts; the left extension `(prev, a, b)` counts only on the first
/// anchor of a contiguous anchor run, so overlapping anchors do not recount
/// their shared context.
pub fn trigram_stat(dsave: &Path) -> Result<()> {
    let biwids = load_filtered_bigrams(dsave)?;
    let dout = dsave.join("tri_parts");
    fresh_dir(&dout)?;

    let mut triples: HashMap<(u32, u32, u32), u32> = HashMap::new();
    let mut paths: Vec<PathBuf> = Vec::new();
    let mut docid = 1u64;

    for_each_phrase(dsave.join("corpus.bin"), |ids| {
        if ids.is_empty() {
            if docid % PROGRESS_EVERY == 0 {
                progress(docid, triples.len())?;
            }
            if docid % FLUSH_EVERY == 0 {
                let fout = dout.join(format!("{}_tri.bin", paths.len() + 1));
                save_tri(&mut triples, &fout)?;
                paths.push(fout);
            }
            docid += 1;
        }

        let mut found = false;
        for i in 0..ids.len().saturating_sub(1) {
            let (a, b) = (ids[i], ids[i + 1]);
            if !biwids.contains(&(a, b)) {
                found = false;
                continue;
            }
            if !found && i > 0 {
                *triples.entry((ids[i - 1], a, b)).or_insert(0) += 1;
            }
            if i + 2 < ids.len() {
                *triples.entry((a, b, ids[i + 2])).or_insert(0) += 1;
            }
            found = true;
        }
        Ok(())
    })?;

    let fout = dout.join(format!("{}_tri.bin", paths.len() + 1));
    save_tri(&mut triples, &fout)?;
    paths.push(fout);

    merge_counts::<Trigram, TrigramAsc>(&paths, dsave.join("tri.bin"))?;
    log::info!("trigram_stat: {} documents, {} chunks", docid - 1, paths.len());
    Ok(())
}

/// Lemma-triple grouping and scoring:
///
/// ```text
/// score = max(0, N * ((N * (weight - threshold)) / (W1 * W2)) / W3)
/// ```
///
/// The extra factor of `N` relative to the bigram score is intentional; the
/// two normalizations are not the same formula.
pub fn group_lem3(dsave: &Path, threshold: f64) -> Result<()> {
    let lems = load_lems(dsave.join("lems.bin"))?;
    let lid_w = lem_weights(&dsave.join("uni.bin"), &lems)?;

    let explode = |tri: Trigram, q: &mut VecDeque<Lem3Words>| {
        let prev = &lems[tri.id1 as usize - 1];
        let cur = &lems[tri.id2 as usize - 1];
        let next = &lems[tri.id3 as usize - 1];
        for &lid1 in prev {
            for &lid2 in cur {
                for &lid3 in next {
                    q.push_back(Lem3Words {
                        lid1,
                        lid2,
                        lid3,
                        wid1: tri.id1,
                        wid2: tri.id2,
                        wid3: tri.id3,
                        count: tri.count,
                    });
                }
            }
        }
    };
    let exploded = Transformer::new(Reader::<Trigram>::open(dsave.join("tri.bin"))?, explode);

    let sorter = ExternalSorter::new(dsave.join("extended3_parts"), EXPLODE_BUF)?;
    let mut merger = sorter.sort_unstable::<_, Lem3WordsDesc>(exploded)?;

    let mut writer = Writer::<Lem3Group>::create(dsave.join("extended3.bin"), 0)?;
    let n = lid_w.len() as f64;

    let mut group: Option<Lem3Group> = None;
    let write_one = |group: Lem3Group, writer: &mut Writer<Lem3Group>| -> Result<()> {
        let w1 = lid_w.get(&group.lid1).copied().unwrap_or(0.0);
        let w2 = lid_w.get(&group.lid2).copied().unwrap_or(0.0);
        let w3 = lid_w.get(&group.lid3).copied().unwrap_or(0.0);
        let score = if w1 == 0.0 || w2 == 0.0 || w3 == 0.0 {
            0.0
        } else {
            (n * (n * (group.weight - threshold) / w1 / w2) / w3).max(0.0)
        };
        if score > 0.0 {
            writer.write(&Lem3Group { weight: score, ..group })?;
        }
        Ok(())
    };

    while let Some(rec) = merger.next()? {
        match group {
            Some(ref g) if g.lid1 == rec.lid1 && g.lid2 == rec.lid2 && g.lid3 == rec.lid3 => {}
            Some(g) => {
                write_one(g, &mut writer)?;
                group = None;
            }
            None => {}
        }
        let g = group.get_or_insert_with(|| Lem3Group {
            lid1: rec.lid1,
            lid2: rec.lid2,
            lid3: rec.lid3,
            weight: 0.0,
            cases: Vec::new(),
        });
        g.cases.push(Case3 {
            wid1: rec.wid1,
            wid2: rec.wid2,
            wid3: rec.wid3,
            count: rec.count,
        });
        let times = lems[rec.wid1 as usize - 1].len()
            * lems[rec.wid2 as usize - 1].len()
            * lems[rec.wid3 as usize - 1].len();
        g.weight += f64::from(rec.count) / times as f64;
    }
    if let Some(g) = group {
        write_one(g, &mut writer)?;
    }
    writer.finish()
}

/// Document-frequency pass over the lemma triples of `extended3.bin`,
/// mirroring the bigram pass.
pub fn trifreq_stat(dsave: &Path) -> Result<()> {
    let lems = load_lems(dsave.join("lems.bin"))?;

    let mut tri: HashMap<(u32, u32, u32), u32> = HashMap::new();
    read_apply::<Lem3Group>(dsave.join("extended3.bin"), |g| {
        tri.insert((g.lid1, g.lid2, g.lid3), 0);
        Ok(())
    })?;

    let mut triset: HashSet<(u32, u32, u32)> = HashSet::new();
    let mut docid = 1u64;

    for_each_phrase(dsave.join("corpus.bin"), |ids| {
        if ids.is_empty() {
            for triple in triset.drain() {
                if let Some(count) = tri.get_mut(&triple) {
                    *count += 1;
                }
            }
            if docid % PROGRESS_EVERY == 0 {
                progress(docid, tri.len())?;
            }
            docid += 1;
        }
        for window in ids.windows(3) {
            for &lid in &lems[window[0] as usize - 1] {
                for &cid in &lems[window[1] as usize - 1] {
                    for &rid in &lems[window[2] as usize - 1] {
                        let triple = (lid, cid, rid);
                        if tri.contains_key(&triple) {
                            triset.insert(triple);
                        }
                    }
                }
            }
        }
        Ok(())
    })?;
    println!();

    if tri.values().any(|&count| count == 0) {
        bail!("tri: doc count is zero");
    }

    save_tri(&mut tri, &dsave.join("trifreq.bin"))
}

/// Filters trigram groups by document count and score. The survivor set is
/// small enough to sort in memory, ascending by score.
pub fn filter_trilems(dsave: &Path, th1: u32, th2: f64) -> Result<()> {
    let mut freqs: HashMap<(u32, u32, u32), u32> = HashMap::new();
    read_apply::<Trigram>(dsave.join("trifreq.bin"), |m| {
        freqs.insert((m.id1, m.id2, m.id3), m.count);
        Ok(())
    })?;

    let mut kept: Vec<Lem3Group> = Vec::new();
    read_apply::<Lem3Group>(dsave.join("extended3.bin"), |g| {
        let count = match freqs.get(&(g.lid1, g.lid2, g.lid3)) {
            Some(&count) => count,
            None => bail!(
                "triple ({}, {}, {}) missing from trifreq",
                g.lid1,
                g.lid2,
                g.lid3
            ),
        };
        if count > th1 && g.weight > th2 {
            kept.push(g);
        }
        Ok(())
    })?;

    kept.sort_by(Lem3WeightAsc::cmp);

    let mut writer = Writer::<Lem3Group>::create(dsave.join("trifiltered.bin"), kept.len() as u64)?;
    for g in &kept {
        writer.write(g)?;
    }
    writer.finish()
}
