//! Prints the record count a table's header claims, e.g.
//! `find tri_parts/ -name "*.bin" -exec read_total '{}' \;`

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use gramstat::stream::read_header;

#[derive(Parser)]
#[command(about = "Print a table header's total")]
struct Args {
    /// Table file to inspect.
    file: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    println!("{}", read_header(&args.file)?.total);
    Ok(())
}
