use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use openfret::{load_csv_traces, write_data};

/// Convert a folder of labeled CSV traces into one openFRET JSON document
#[derive(Parser)]
#[command(name = "openfret")]
#[command(author, version)]
struct Args {
    /// Root folder; each subfolder is a label holding CSV traces
    root: PathBuf,

    /// Output JSON document
    output: PathBuf,

    /// Dataset title (defaults to the root folder's name)
    #[arg(long)]
    title: Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let mut dataset = load_csv_traces(&args.root)
        .with_context(|| format!("loading CSV traces from {}", args.root.display()))?;
    if let Some(title) = args.title {
        dataset.title = title;
    }

    write_data(&dataset, &args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;

    let channels: usize = dataset.traces().iter().map(|t| t.len()).sum();
    println!(
        "Wrote '{}': {} traces, {} channels to {}",
        dataset.title,
        dataset.len(),
        channels,
        args.output.display()
    );
    Ok(())
}
