use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use clap::Parser;
use gcamp_deps::{
    Catalog, Redists, SearchPath, build_report, classify, materialize, render_summary,
};
use log::debug;

#[derive(Parser, Debug)]
#[command(
    about = "Find the DLLs a Windows build needs and copy the non-system ones next to it",
    version
)]
struct Args {
    /// Executable to analyse
    image: PathBuf,

    /// Directory to copy bundled DLLs into (default: the executable's directory)
    #[arg(long, value_name = "DIR")]
    dest: Option<PathBuf>,

    /// Only print the report; copy nothing
    #[arg(long)]
    no_copy: bool,

    /// JSON file replacing the built-in system/runtime DLL tables
    #[arg(long, value_name = "FILE")]
    catalog: Option<PathBuf>,

    /// Directory holding dbghelp-x86.dll and dbghelp-x64.dll
    #[arg(long, value_name = "DIR", default_value = "installer/redists")]
    redist_dir: PathBuf,

    /// Directory searched before PATH (may repeat)
    #[arg(long = "search-dir", value_name = "DIR")]
    search_dirs: Vec<PathBuf>,

    /// Do not search PATH or the Windows system directories
    #[arg(long)]
    no_env_search: bool,

    /// Optional path to write the report as JSON
    #[arg(long, value_name = "FILE")]
    json_report: Option<PathBuf>,

    /// Fail on unresolved DLLs, copy errors or mixed C runtimes
    #[arg(long)]
    strict: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::init();

    let catalog = Catalog::from_json_file(args.catalog.as_deref())?;
    let env_search = if args.no_env_search {
        SearchPath::default()
    } else {
        SearchPath::from_env()
    };
    let search_path = env_search.with_leading(args.search_dirs.iter().cloned());

    let closure = classify(&args.image, &catalog, &search_path)?;

    let materialized = if args.no_copy {
        None
    } else {
        let dest = args
            .dest
            .clone()
            .unwrap_or_else(|| default_destination(&args.image));
        let redists = Redists::new(args.redist_dir.clone());
        debug!("taking redistributables from {}", redists.dir().display());
        Some(materialize(&closure, &dest, &redists))
    };

    println!("{}", render_summary(&closure, materialized.as_ref()));

    if let Some(path) = args.json_report.as_deref() {
        let report = build_report(&closure, materialized.as_ref());
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(file, &report)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("[gather_dlls] wrote JSON report to {}", path.display());
    }

    if args.strict {
        let unresolved = closure.unresolved().count();
        let copy_errors = materialized.as_ref().map_or(0, |report| report.errors.len());
        ensure!(
            !closure.has_conflicting_runtimes(),
            "multiple C runtimes are linked into {}",
            args.image.display()
        );
        ensure!(unresolved == 0, "{unresolved} DLLs could not be resolved");
        ensure!(copy_errors == 0, "{copy_errors} files could not be copied");
    }

    Ok(())
}

fn default_destination(image: &Path) -> PathBuf {
    match image.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
