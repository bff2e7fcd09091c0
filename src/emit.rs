//! Final stage: assembles the serving map from the filtered tables.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::convert::read_total_count;
use crate::records::{Bigram, Case2, Case3, LemFreq, LemId, Lem2Group, Lem3Group, Trigram, Unigram};
use crate::stream::read_apply;
use crate::zmap::{ZMap, BANNER};

/// First case with the maximum count represents the group.
fn best_case2(cases: &[Case2]) -> Option<&Case2> {
    let mut best: Option<&Case2> = None;
    for case in cases {
        if best.map_or(true, |b| case.count > b.count) {
            best = Some(case);
        }
    }
    best
}

fn best_case3(cases: &[Case3]) -> Option<&Case3> {
    let mut best: Option<&Case3> = None;
    for case in cases {
        if best.map_or(true, |b| case.count > b.count) {
            best = Some(case);
        }
    }
    best
}

/// Builds `stat_<version>.map`: every surviving lemma bigram and trigram
/// keyed by its concatenated lemma strings, with the document count and the
/// most frequent surface rendering, plus per-lemma document counts and the
/// run metadata. Prints the `uni: .. bi: .. tri: ..` summary line.
pub fn to_zmap(dsave: &Path, version: &str) -> Result<()> {
    // surface and lemma strings are resolved lazily: register the ids first,
    // then fill the strings in one pass over each dictionary
    let mut uni: HashMap<u32, String> = HashMap::new();
    let mut unilem: HashMap<u32, String> = HashMap::new();

    let mut bicnt: HashMap<(u32, u32), u32> = HashMap::new();
    read_apply::<Bigram>(dsave.join("bifreq.bin"), |m| {
        bicnt.insert((m.id1, m.id2), m.count);
        Ok(())
    })?;

    // (lid1, lid2) -> (doc count, representative surface pair)
    let mut bifreqs: HashMap<(u32, u32), (u32, (u32, u32))> = HashMap::new();
    read_apply::<Lem2Group>(dsave.join("bifiltered.bin"), |g| {
        unilem.entry(g.lid1).or_default();
        unilem.entry(g.lid2).or_default();
        let best = match best_case2(&g.cases) {
            Some(best) => *best,
            None => bail!("bigram group ({}, {}) has no cases", g.lid1, g.lid2),
        };
        uni.entry(best.wid1).or_default();
        uni.entry(best.wid2).or_default();
        let count = match bicnt.get(&(g.lid1, g.lid2)) {
            Some(&count) => count,
            None => bail!("pair ({}, {}) missing from bifreq", g.lid1, g.lid2),
        };
        bifreqs.insert((g.lid1, g.lid2), (count, (best.wid1, best.wid2)));
        Ok(())
    })?;

    let mut tricnt: HashMap<(u32, u32, u32), u32> = HashMap::new();
    read_apply::<Trigram>(dsave.join("trifreq.bin"), |m| {
        tricnt.insert((m.id1, m.id2, m.id3), m.count);
        Ok(())
    })?;

    let mut trifreqs: HashMap<(u32, u32, u32), (u32, (u32, u32, u32))> = HashMap::new();
    read_apply::<Lem3Group>(dsave.join("trifiltered.bin"), |g| {
        unilem.entry(g.lid1).or_default();
        unilem.entry(g.lid2).or_default();
        unilem.entry(g.lid3).or_default();
        let best = match best_case3(&g.cases) {
            Some(best) => *best,
            None => bail!(
                "trigram group ({}, {}, {}) has no cases",
                g.lid1,
                g.lid2,
                g.lid3
            ),
        };
        uni.entry(best.wid1).or_default();
        uni.entry(best.wid2).or_default();
        uni.entry(best.wid3).or_default();
        let triple = (g.lid1, g.lid2, g.lid3);
        let count = match tricnt.get(&triple) {
            Some(&count) => count,
            None => bail!(
                "triple ({}, {}, {}) missing from trifreq",
                g.lid1,
                g.lid2,
                g.lid3
            ),
        };
        trifreqs.insert(triple, (count, (best.wid1, best.wid2, best.wid3)));
        Ok(())
    })?;

    read_apply::<Unigram>(dsave.join("uni.bin"), |m| {
        if let Some(slot) = uni.get_mut(&m.id) {
            *slot = m.text;
        }
        Ok(())
    })?;
    read_apply::<LemId>(dsave.join("lemid.bin"), |m| {
        if let Some(slot) = unilem.get_mut(&m.id) {
            *slot = m.text;
        }
        Ok(())
    })?;

    let mut termstat = ZMap::new();
    let mut nuni = 0u32;
    let mut nbi = 0u32;

    read_apply::<LemFreq>(dsave.join("lemfreq.bin"), |m| {
        if m.count > 2 {
            let mut val = ZMap::new();
            val.set_word32("dc", m.count);
            termstat.set_zmap(m.text, val);
            nuni += 1;
        }
        Ok(())
    })?;

    for (&(lid1, lid2), &(count, (wid1, wid2))) in &bifreqs {
        let l1 = &unilem[&lid1];
        let l2 = &unilem[&lid2];
        let s1 = &uni[&wid1];
        let s2 = &uni[&wid2];

        // representative words this short make useless suggestions
        if s1.chars().count() < 3 || s2.chars().count() < 3 {
            continue;
        }
        if l1.is_empty() || l2.is_empty() || s1.is_empty() || s2.is_empty() || count == 0 {
            bail!("bi: wrong data values");
        }

        let mut val = ZMap::new();
        val.set_word32("dc", count);
        val.set_charstr("txt", format!("{s1} {s2}"));
        termstat.set_zmap(format!("{l1}{l2}"), val);
        nbi += 1;
    }

    for (&(lid1, lid2, lid3), &(count, (wid1, wid2, wid3))) in &trifreqs {
        let l1 = &unilem[&lid1];
        let l2 = &unilem[&lid2];
        let l3 = &unilem[&lid3];
        let s1 = &uni[&wid1];
        let s2 = &uni[&wid2];
        let s3 = &uni[&wid3];

        if l1.is_empty()
            || l2.is_empty()
            || l3.is_empty()
            || s1.is_empty()
            || s2.is_empty()
            || s3.is_empty()
            || count == 0
        {
            bail!("tri: wrong data values");
        }

        let mut val = ZMap::new();
        val.set_word32("dc", count);
        val.set_charstr("txt", format!("{s1} {s2} {s3}"));
        termstat.set_zmap(format!("{l1}{l2}{l3}"), val);
    }

    let total_count = read_total_count(dsave)?;
    termstat.set_charstr("version", version);
    termstat.set_int64("total_count", total_count as i64);

    let path = dsave.join(format!("stat_{version}.map"));
    let file =
        File::create(&path).with_context(|| format!("could not create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    out.write_all(BANNER)?;
    termstat.serialize(&mut out)?;
    out.flush()
        .with_context(|| format!("{}: flush failed", path.display()))?;

    println!("uni: {} bi: {} tri: {}", nuni, nbi, trifreqs.len());
    Ok(())
}

/// Reads a serving map back, checking the banner.
pub fn read_stat_map(path: &Path) -> Result<ZMap> {
    let file = File::open(path).with_context(|| format!("could not open {}", path.display()))?;
    let mut inp = BufReader::new(file);
    let mut banner = [0u8; 30];
    inp.read_exact(&mut banner)
        .with_context(|| format!("{}: truncated banner", path.display()))?;
    if &banner != BANNER {
        bail!("{}: not a term statistics map", path.display());
    }
    ZMap::parse(&mut inp).with_context(|| format!("{}: could not parse map", path.display()))
}
