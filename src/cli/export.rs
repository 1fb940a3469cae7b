use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use altscribe::export::{filenames_path_for, write_filename_table, write_url_table};
use altscribe::RowStore;

#[derive(Args)]
pub struct ExportArgs {
    /// Processed crawler export
    pub csv: PathBuf,

    /// Simplified table to write; the filename table goes beside it
    #[arg(short, long)]
    pub output: PathBuf,
}

pub fn execute(args: ExportArgs) -> anyhow::Result<()> {
    let store = RowStore::load(&args.csv)
        .with_context(|| format!("Failed to load {}", args.csv.display()))?;

    let urls = write_url_table(&store, &args.output)?;
    let filenames_path = filenames_path_for(&args.output);
    let filenames = write_filename_table(&store, &filenames_path)?;

    println!("Wrote {} row(s) to {}", urls, args.output.display());
    println!("Wrote {} row(s) to {}", filenames, filenames_path.display());
    Ok(())
}
