//! Lemmatize stage: canonical-form interning and per-word lemma sets.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Result};

use crate::lingproc::LinguisticProcessor;
use crate::records::{LemId, Phrase};
use crate::stream::{read_apply, Reader, Writer};

/// Words are batched before being handed to the processor, so a morphology
/// backend that shells out or loads lazily is amortized.
const CHUNK: usize = 10_000;

struct Interner {
    ids: HashMap<String, u32>,
    forms: Vec<String>,
}

impl Interner {
    fn new() -> Self {
        Self {
            ids: HashMap::new(),
            forms: Vec::new(),
        }
    }

    fn intern(&mut self, form: &str) -> u32 {
        if let Some(&lid) = self.ids.get(form) {
            return lid;
        }
        self.forms.push(form.to_string());
        let lid = self.forms.len() as u32;
        self.ids.insert(form.to_string(), lid);
        lid
    }
}

/// Enumerates lemma forms for every dictionary word and writes `lemid.bin`
/// (lemma dictionary) and `lems.bin` (record i holds the lemma ids of word
/// id i+1).
pub fn lemmatize<P: LinguisticProcessor>(proc: &P, dsave: &Path) -> Result<()> {
    let funi = dsave.join("uni.bin");
    let total = Reader::<crate::records::Unigram>::open(&funi)?.total() as usize;

    let mut interner = Interner::new();
    let mut lems: Vec<Vec<u32>> = vec![Vec::new(); total];

    let mut words: Vec<String> = Vec::with_capacity(CHUNK);
    let mut wids: Vec<u32> = Vec::with_capacity(CHUNK);

    let mut apply_chunk = |words: &mut Vec<String>, wids: &mut Vec<u32>| -> Result<()> {
        if words.is_empty() {
            return Ok(());
        }
        let forms = proc.lemma_forms(words);
        if forms.len() != words.len() {
            bail!(
                "lemmatizer returned {} entries for {} words",
                forms.len(),
                words.len()
            );
        }
        for (i, word_forms) in forms.iter().enumerate() {
            if word_forms.is_empty() {
                bail!("lemmatizer returned no forms for word {:?}", words[i]);
            }
            let lids: Vec<u32> = word_forms.iter().map(|f| interner.intern(f)).collect();
            let wid = wids[i] as usize;
            match lems.get_mut(wid - 1) {
                Some(slot) => *slot = lids,
                None => bail!("word id {} out of range (dictionary holds {})", wid, total),
            }
        }
        words.clear();
        wids.clear();
        Ok(())
    };

    read_apply::<crate::records::Unigram>(&funi, |uni| {
        words.push(uni.text);
        wids.push(uni.id);
        if words.len() == CHUNK {
            apply_chunk(&mut words, &mut wids)?;
        }
        Ok(())
    })?;
    apply_chunk(&mut words, &mut wids)?;

    let mut lemid_writer =
        Writer::<LemId>::create(dsave.join("lemid.bin"), interner.forms.len() as u64)?;
    for (i, form) in interner.forms.iter().enumerate() {
        lemid_writer.write(&LemId {
            text: form.clone(),
            id: i as u32 + 1,
        })?;
    }
    lemid_writer.finish()?;

    let mut lems_writer = Writer::<Phrase>::create(dsave.join("lems.bin"), lems.len() as u64)?;
    for (i, lids) in lems.iter().enumerate() {
        if lids.is_empty() {
            bail!("word id {} has no lemmas", i + 1);
        }
        lems_writer.write(&Phrase { ids: lids.clone() })?;
    }
    lems_writer.finish()?;

    log::info!(
        "lemmatize: {} words, {} lemmas",
        lems.len(),
        interner.forms.len()
    );
    Ok(())
}

/// Distributes every word's corpus frequency evenly over its lemmas, so a
/// word with k homonyms contributes count/k to each. The result is the
/// per-lemma weight map used by the group scorers.
pub fn lem_weights(funi: &Path, lems: &[Vec<u32>]) -> Result<HashMap<u32, f64>> {
    let mut lid_w: HashMap<u32, f64> = HashMap::new();
    read_apply::<crate::records::Unigram>(funi, |uni| {
        let terms = match lems.get(uni.id as usize - 1) {
            Some(terms) => terms,
            None => bail!("word id {} out of range ({} lemma sets)", uni.id, lems.len()),
        };
        let w = f64::from(uni.count) / terms.len() as f64;
        for &lid in terms {
            *lid_w.entry(lid).or_insert(0.0) += w;
        }
        Ok(())
    })?;
    Ok(lid_w)
}

/// Loads `lems.bin` back into memory; index i holds the lemma ids of word
/// id i+1.
pub fn load_lems(path: impl AsRef<Path>) -> Result<Vec<Vec<u32>>> {
    let mut reader = Reader::<Phrase>::open(path)?;
    let mut lems = Vec::with_capacity(reader.total() as usize);
    while let Some(phrase) = reader.read()? {
        lems.push(phrase.ids);
    }
    Ok(lems)
}
