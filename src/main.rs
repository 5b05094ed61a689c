//! rbbind: generate Ruby extension glue from exported C++ API declarations.
//!
//! Two modes:
//!
//! - **stdin mode**: `rbbind < api.json` prints the dispatch routines.
//! - **file mode**: `rbbind -o gen/ decls/*.json` writes every generated
//!   header plus a support-status report.

use anyhow::{Context, Result};
use clap::Parser;
use rbbind::config::{parse_typedef, Config, UnresolvedPolicy};
use rbbind::decl::{parse_document, DeclSet};
use rbbind::report;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "rbbind",
    about = "Generate Ruby extension glue from exported C++ API declarations"
)]
struct Cli {
    /// Declaration files (glob patterns supported). If omitted, reads one
    /// document from stdin.
    files: Vec<String>,

    /// Output directory (required when files are given)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Top-level namespace of the wrapped library
    #[arg(long, default_value = "cv")]
    root: String,

    /// Prefix of generated symbols and file names
    #[arg(long, default_value = "rbbind")]
    prefix: String,

    /// Support-status report format: csv (default), json
    #[arg(long, default_value = "csv")]
    report: String,

    /// Reject variants with unresolvable types instead of aborting
    #[arg(long)]
    allow_unresolved: bool,

    /// Extra type alias, ALIAS=TARGET. Can be given multiple times.
    #[arg(long, value_parser = parse_typedef)]
    typedef: Vec<(String, String)>,

    /// Highest accepted number of mandatory arguments
    #[arg(long, default_value_t = 10)]
    max_mandatory: usize,

    /// Highest accepted number of optional arguments
    #[arg(long, default_value_t = 10)]
    max_optional: usize,

    /// More logging (-v info, -vv debug). RBBIND_LOG overrides.
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = build_config(&cli);
    if cli.files.is_empty() {
        return stdin_mode(&config);
    }
    file_mode(&cli, &config)
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RBBIND_LOG").unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn build_config(cli: &Cli) -> Config {
    let mut config = Config {
        prefix: cli.prefix.clone(),
        max_mandatory_args: cli.max_mandatory,
        max_optional_args: cli.max_optional,
        ..Config::for_root(&cli.root)
    };
    if cli.allow_unresolved {
        config.unresolved = UnresolvedPolicy::Lenient;
    }
    config.typedefs.extend(cli.typedef.iter().cloned());
    config
}

/// stdin mode: one document in, dispatch routines out.
fn stdin_mode(config: &Config) -> Result<()> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("failed to read stdin")?;

    let set = parse_document(&input, "<stdin>").context("failed to parse declarations")?;
    let generated = rbbind::generate(&set, config)?;
    print!("{}", generated.output.funcs);
    Ok(())
}

/// file mode: merge every input, write the headers and the report.
fn file_mode(cli: &Cli, config: &Config) -> Result<()> {
    let output_dir = cli
        .output
        .as_deref()
        .context("--output is required when files are given")?;
    // Fail on a bad format before doing any work.
    let renderer = report::create_report(&cli.report)?;

    let input_files = expand_globs(&cli.files)?;
    if input_files.is_empty() {
        anyhow::bail!("no declaration files found");
    }

    let mut set = DeclSet::default();
    for path in &input_files {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let doc = parse_document(&content, &path.to_string_lossy())
            .with_context(|| format!("failed to parse {}", path.display()))?;
        info!("{}: {} declarations", path.display(), doc.decls.len());
        set.extend(doc);
    }

    let generated = rbbind::generate(&set, config)?;

    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output directory: {}", output_dir.display()))?;
    for (name, content) in generated.output.files(&config.prefix) {
        let out_path = output_dir.join(&name);
        fs::write(&out_path, content)
            .with_context(|| format!("failed to write {}", out_path.display()))?;
    }

    let report_path = output_dir.join(format!("support-status.{}", renderer.file_extension()));
    fs::write(&report_path, renderer.render(&generated.report))
        .with_context(|| format!("failed to write {}", report_path.display()))?;

    info!(
        "wrote {} of {} functions to {}",
        generated.emitted,
        generated.functions,
        output_dir.display()
    );
    Ok(())
}

/// Expand glob patterns into a sorted list of real file paths. A directory
/// contributes its `.json` files.
fn expand_globs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let path = Path::new(pattern);
        if path.is_file() {
            files.push(path.to_path_buf());
            continue;
        }
        if path.is_dir() {
            let entries = fs::read_dir(path)
                .with_context(|| format!("failed to read directory: {}", path.display()))?;
            for entry in entries.flatten() {
                let p = entry.path();
                if p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("json") {
                    files.push(p);
                }
            }
            continue;
        }
        let matches: Vec<_> = glob::glob(pattern)
            .with_context(|| format!("invalid glob pattern: {}", pattern))?
            .filter_map(|r| r.ok())
            .filter(|p| p.is_file())
            .collect();
        if matches.is_empty() {
            warn!("no files matched: {}", pattern);
        }
        files.extend(matches);
    }
    // Sorted so merged declaration order does not depend on the shell.
    files.sort();
    files.dedup();
    Ok(files)
}
