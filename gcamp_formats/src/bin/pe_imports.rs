use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use gcamp_formats::Image;

#[derive(Parser, Debug)]
#[command(about = "Print the import table of a PE executable or DLL", version)]
struct Args {
    /// Image to inspect
    image: PathBuf,

    /// List the symbols imported from each library
    #[arg(long)]
    symbols: bool,

    /// Emit the parsed image as JSON instead of the text listing
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let image = Image::open(&args.image)?;

    if args.json {
        serde_json::to_writer_pretty(io::stdout().lock(), &image)
            .context("writing JSON to stdout")?;
        println!();
        return Ok(());
    }

    println!(
        "{} ({}, {:?}) imports {} libraries",
        args.image.display(),
        image.machine(),
        image.format(),
        image.imports().len()
    );
    for library in image.imports() {
        println!("{name:<32} {count:>5}", name = library.name, count = library.symbols.len());
        if args.symbols {
            for symbol in &library.symbols {
                println!("    {symbol}");
            }
        }
    }
    Ok(())
}
