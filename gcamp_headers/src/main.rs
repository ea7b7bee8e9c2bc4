use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use gcamp_headers::{DEFAULT_MARKER, HeaderScanner, bundle, collect_sources, locate_library_root};

#[derive(Parser, Debug)]
#[command(about = "Copy the Boost headers used by the sources into a vendor tree", version)]
struct Args {
    /// Source directory to scan for .cpp files
    sources: PathBuf,

    /// Directory receiving the headers (its libs/ subdirectory is scanned too)
    output: PathBuf,

    /// Boost include root (default: first INCLUDE entry containing boost/version.hpp)
    #[arg(long, value_name = "DIR")]
    library_root: Option<PathBuf>,

    /// List the headers without copying them
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::init();

    let library_root = match args.library_root.clone() {
        Some(root) => root,
        None => match locate_library_root(
            env::var_os("INCLUDE").as_deref(),
            Path::new(DEFAULT_MARKER),
        ) {
            Some(root) => root,
            None => bail!("Boost not found; pass --library-root or set INCLUDE"),
        },
    };

    let scanner = HeaderScanner::new(&library_root)?;
    let sources = collect_sources(&args.sources, &args.output);
    println!(
        "*** Searching {} sources against {}",
        sources.len(),
        scanner.library_root().display()
    );
    let closure = scanner.scan(sources);

    println!("*** Boost headers");
    for header in closure.relative_headers() {
        println!("\t{}", header.display());
    }

    if !closure.unreadable().is_empty() {
        println!("*** {} files could not be read", closure.unreadable().len());
    }

    if !args.dry_run {
        let written = bundle(&closure, &args.output)
            .with_context(|| format!("bundling headers into {}", args.output.display()))?;
        println!(
            "Copied {} headers into {}",
            written.len(),
            args.output.display()
        );
    }

    Ok(())
}
