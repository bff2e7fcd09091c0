//! Prints any table file, e.g. "gramcat uni.bin | less".
//!
//! The record type is auto-detected from the header. With a word dictionary
//! as the second argument, bigram rows are decoded to surface strings; with
//! a lemma dictionary as the third, group rows are decoded too.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::Parser;

use gramstat::records::{Bigram, LemFreq, LemId, Lem2Group, Lem3Group, Trigram, Unigram};
use gramstat::stream::{read_apply, read_header};

#[derive(Parser)]
#[command(about = "Print a statistics table in readable form")]
struct Args {
    /// Table to print.
    file: PathBuf,

    /// Word dictionary (uni.bin) for surface-id decoding.
    uni: Option<PathBuf>,

    /// Lemma dictionary (lemid.bin) for lemma-id decoding.
    lemid: Option<PathBuf>,
}

fn load_words(path: &Path) -> Result<HashMap<u32, String>> {
    let mut map = HashMap::new();
    read_apply::<Unigram>(path, |m| {
        map.insert(m.id, m.text);
        Ok(())
    })?;
    Ok(map)
}

fn load_lemmas(path: &Path) -> Result<HashMap<u32, String>> {
    let mut map = HashMap::new();
    read_apply::<LemId>(path, |m| {
        map.insert(m.id, m.text);
        Ok(())
    })?;
    Ok(map)
}

fn decode<'a>(map: &'a HashMap<u32, String>, id: u32) -> &'a str {
    map.get(&id).map(String::as_str).unwrap_or("?")
}

fn main() -> Result<()> {
    let args = Args::parse();
    let header = read_header(&args.file)?;

    match header.msg_type.as_str() {
        "Unigram" => {
            println!("{}\t{:>50}\t\t{}", "WORD", "ID", "COUNT");
            read_apply::<Unigram>(&args.file, |m| {
                println!("{}\t{:>50}\t{}", m.text, m.id, m.count);
                Ok(())
            })?;
        }
        "Bigram" => match &args.uni {
            None => {
                println!("ID1\t\tID2\t\tCOUNT");
                read_apply::<Bigram>(&args.file, |m| {
                    println!("{}\t\t{}\t\t{}", m.id1, m.id2, m.count);
                    Ok(())
                })?;
            }
            Some(funi) => {
                let uni = load_words(funi)?;
                read_apply::<Bigram>(&args.file, |m| {
                    println!(
                        "{:>50}\t{:<50}{:>16}",
                        decode(&uni, m.id1),
                        decode(&uni, m.id2),
                        m.count
                    );
                    Ok(())
                })?;
            }
        },
        "Trigram" => {
            println!("ID1\t\tID2\t\tID3\t\tCOUNT");
            read_apply::<Trigram>(&args.file, |m| {
                println!("{}\t\t{}\t\t{}\t\t{}", m.id1, m.id2, m.id3, m.count);
                Ok(())
            })?;
        }
        "LemId" => {
            println!("{}\t{:>50}", "LEM", "ID");
            read_apply::<LemId>(&args.file, |m| {
                println!("{:<50}\t{:>10}", m.text, m.id);
                Ok(())
            })?;
        }
        "LemFreq" => {
            println!("{}\t{:>50}\t{}", "LEM", "ID", "COUNT");
            read_apply::<LemFreq>(&args.file, |m| {
                println!("{:<50}\t{:>10}\t{}", m.text, m.id, m.count);
                Ok(())
            })?;
        }
        "Lem2Group" => match (&args.uni, &args.lemid) {
            (None, None) => {
                read_apply::<Lem2Group>(&args.file, |m| {
                    println!("{}{:>16}{:>16.9}", m.lid1, m.lid2, m.weight);
                    for c in &m.cases {
                        println!("\t\t{}{:>16}{:>16}", c.wid1, c.wid2, c.count);
                    }
                    Ok(())
                })?;
            }
            (Some(funi), Some(flemid)) => {
                let uni = load_words(funi)?;
                let lem = load_lemmas(flemid)?;
                read_apply::<Lem2Group>(&args.file, |m| {
                    println!(
                        "{:<30}{:<30}{:>16.9}",
                        decode(&lem, m.lid1),
                        decode(&lem, m.lid2),
                        m.weight
                    );
                    for c in &m.cases {
                        println!(
                            "{:>50}\t{:<50}{:>16}",
                            decode(&uni, c.wid1),
                            decode(&uni, c.wid2),
                            c.count
                        );
                    }
                    Ok(())
                })?;
            }
            _ => bail!("{}: wrong number of arguments", header.msg_type),
        },
        "Lem3Group" => match (&args.uni, &args.lemid) {
            (None, None) => {
                read_apply::<Lem3Group>(&args.file, |m| {
                    println!("{}{:>20}{:>20}{:>20.9}", m.lid1, m.lid2, m.lid3, m.weight);
                    for c in &m.cases {
                        println!("\t{:>20}{:>20}{:>20}{:>20}", c.wid1, c.wid2, c.wid3, c.count);
                    }
                    Ok(())
                })?;
            }
            (Some(funi), Some(flemid)) => {
                let uni = load_words(funi)?;
                let lem = load_lemmas(flemid)?;
                read_apply::<Lem3Group>(&args.file, |m| {
                    println!(
                        "{:<30}{:<30}{:<30}{:>16.9}",
                        decode(&lem, m.lid1),
                        decode(&lem, m.lid2),
                        decode(&lem, m.lid3),
                        m.weight
                    );
                    for c in &m.cases {
                        println!(
                            "{:>50}\t{:<50}{:<50}{:>16}",
                            decode(&uni, c.wid1),
                            decode(&uni, c.wid2),
                            decode(&uni, c.wid3),
                            c.count
                        );
                    }
                    Ok(())
                })?;
            }
            _ => bail!("{}: wrong number of arguments", header.msg_type),
        },
        other => bail!("data type {other} not implemented"),
    }

    Ok(())
}
