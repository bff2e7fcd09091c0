//! Runs the full collocation pipeline over a corpus directory.
//!
//! Usage: extract <corpus_dir> <out_dir> [--config params.json]

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use gramstat::bigrams::{bifreq_stat, bigram_stat, filter_bilems, group_lem2};
use gramstat::config::Params;
use gramstat::convert::convert;
use gramstat::emit::to_zmap;
use gramstat::lemma::lemmatize;
use gramstat::lingproc::SnowballProcessor;
use gramstat::trigrams::{filter_trilems, group_lem3, trifreq_stat, trigram_stat};

#[derive(Parser)]
#[command(about = "Mine collocation statistics from an archived corpus")]
struct Args {
    /// Directory holding the corpus archives.
    corpus_dir: PathBuf,

    /// Directory for all pipeline outputs.
    out_dir: PathBuf,

    /// JSON file overriding the default parameters.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip this many archive files.
    #[arg(long)]
    from: Option<usize>,

    /// Process at most this many archive files (0 = unlimited).
    #[arg(long)]
    limit: Option<usize>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut params = match &args.config {
        Some(path) => Params::load(path)?,
        None => Params::default(),
    };
    if let Some(from) = args.from {
        params.from = from;
    }
    if let Some(limit) = args.limit {
        params.limit = limit;
    }

    let proc = SnowballProcessor::new();
    let dsave = &args.out_dir;

    convert(&proc, &params, &args.corpus_dir, dsave)?;
    lemmatize(&proc, dsave)?;

    bigram_stat(dsave)?;
    group_lem2(dsave, params.bi_threshold)?;
    bifreq_stat(dsave)?;
    filter_bilems(dsave, params.bi_doc_count, params.bi_weight)?;

    trigram_stat(dsave)?;
    group_lem3(dsave, params.tri_threshold)?;
    trifreq_stat(dsave)?;
    filter_trilems(dsave, params.tri_doc_count, params.tri_weight)?;

    to_zmap(dsave, &params.version)
}
