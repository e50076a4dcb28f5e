use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use sitemedia_core::tagging::ranker::CommandRanker;
use sitemedia_core::{Capabilities, ProcessOptions, TargetFormat};

#[derive(Parser)]
#[command(name = "sitemedia", version, about = "Sort construction-site photos and videos into dated, descriptively named folders")]
struct Cli {
    /// Batch root to organize in place
    root: PathBuf,

    /// Output format for still images
    #[arg(long, value_enum, default_value_t = TargetFormat::Auto)]
    target_format: TargetFormat,

    /// Candidate label for the classifier (repeatable; default: built-in construction labels)
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// JSON file holding an array of candidate labels
    #[arg(long)]
    tags_file: Option<PathBuf>,

    /// Show what would happen without touching any file
    #[arg(long)]
    dry_run: bool,

    /// Only organize media directly inside this folder of the root
    #[arg(long, conflicts_with = "files")]
    folder: Option<String>,

    /// Only organize these files (repeatable)
    #[arg(long = "file")]
    files: Vec<PathBuf>,

    /// Build the dated folders here by copying, leaving the batch root untouched
    #[arg(long)]
    output: Option<PathBuf>,

    /// Stop after this many files
    #[arg(long)]
    max_files: Option<usize>,

    /// Audit CSV path (default: sitemedia_audit.csv in the output or batch root)
    #[arg(long)]
    audit_log: Option<PathBuf>,

    /// External zero-shot classifier program
    #[arg(long)]
    classifier: Option<PathBuf>,

    /// Extra argument for the classifier program (repeatable)
    #[arg(long = "classifier-arg", requires = "classifier", allow_hyphen_values = true)]
    classifier_args: Vec<String>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    // RUST_LOG wins over -v
    builder.parse_default_env();
    builder.init();
}

fn load_tags(cli: &Cli) -> anyhow::Result<Vec<String>> {
    let mut tags = Vec::new();
    if let Some(path) = &cli.tags_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let from_file: Vec<String> = serde_json::from_str(&text)
            .with_context(|| format!("{} is not a JSON array of strings", path.display()))?;
        tags.extend(from_file);
    }
    tags.extend(cli.tags.iter().cloned());
    Ok(tags)
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    let t_total = std::time::Instant::now();

    let options = ProcessOptions {
        root: cli.root.clone(),
        target_format: cli.target_format,
        tags: load_tags(&cli)?,
        dry_run: cli.dry_run,
        folder: cli.folder.clone(),
        files: (!cli.files.is_empty()).then(|| cli.files.clone()),
        audit_log: cli.audit_log.clone(),
        output: cli.output.clone(),
        max_files: cli.max_files,
    };

    let mut capabilities = Capabilities::default();
    if let Some(program) = &cli.classifier {
        capabilities = capabilities.with_ranker(CommandRanker::new(program).with_args(cli.classifier_args.clone()));
    }

    let pb = ProgressBar::new(0);
    pb.set_style(ProgressStyle::default_bar().template("{prefix:>11} [{bar:40}] {pos}/{len} {msg}")?);

    let summary = sitemedia_core::process(&options, &capabilities, &|stage, current, total, message| {
        pb.set_prefix(stage.to_string());
        pb.set_length(total);
        pb.set_position(current);
        pb.set_message(message.to_string());
    })?;
    pb.finish_and_clear();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    eprintln!(
        "{}{} processed: {} succeeded ({} unchanged, {} converted), {} failed, {} skipped; {} consolidated, {} folders removed ({:.2}s)",
        if options.dry_run { "[dry run] " } else { "" },
        summary.processed,
        summary.succeeded,
        summary.unchanged,
        summary.converted,
        summary.failed,
        summary.skipped,
        summary.consolidated,
        summary.folders_removed,
        t_total.elapsed().as_secs_f64()
    );
    eprintln!("Audit log: {}", options.audit_log_path().display());

    Ok(if summary.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
