use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use rollcall_core::{load_gallery, FrameProcessor, Gallery, Metric, NearestMatcher};
use rollcall_ledger::{BatchStamp, LedgerStore};
use rollcall_vision::OnnxEmbedder;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod source;

use config::Config;
use source::SourceError;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance")]
struct Cli {
    /// TOML configuration file (default: $ROLLCALL_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Reference photos directory, one sub-directory per group
    #[arg(long, global = true)]
    dataset: Option<PathBuf>,
    /// Directory holding attendance_<date>.csv files
    #[arg(long, global = true)]
    ledger_dir: Option<PathBuf>,
    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long, global = true)]
    models: Option<PathBuf>,
    /// Distance metric (cosine or euclidean)
    #[arg(long, global = true)]
    metric: Option<Metric>,
    /// Maximum match distance
    #[arg(long, global = true)]
    threshold: Option<f32>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recognize faces in images and record attendance
    Mark {
        /// Images to process; prompts interactively when omitted
        images: Vec<PathBuf>,
        /// Record under this date instead of today (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List identities in the reference gallery
    Gallery {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print the attendance ledger for a date
    Show {
        /// Date to show (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.dataset {
        config.dataset_dir = dir;
    }
    if let Some(dir) = cli.ledger_dir {
        config.ledger_dir = dir;
    }
    if let Some(dir) = cli.models {
        config.model_dir = dir;
    }
    if let Some(metric) = cli.metric {
        config.metric = metric;
    }
    if let Some(threshold) = cli.threshold {
        config.threshold = threshold;
    }
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Mark { images, date } => mark(&config, images, date),
        Commands::Gallery { json } => list_gallery(&config, json),
        Commands::Show { date } => show(&config, date),
    }
}

fn build_gallery(config: &Config) -> Result<(Gallery, OnnxEmbedder)> {
    let mut embedder = OnnxEmbedder::load(&config.model_dir)
        .with_context(|| format!("loading face models from {}", config.model_dir.display()))?;
    let gallery = load_gallery(&config.dataset_dir, &mut embedder)
        .with_context(|| format!("building gallery from {}", config.dataset_dir.display()))?;
    if gallery.is_empty() {
        tracing::warn!(dataset = %config.dataset_dir.display(), "gallery is empty; nobody can be recognized");
    }
    Ok((gallery, embedder))
}

fn mark(config: &Config, images: Vec<PathBuf>, date: Option<NaiveDate>) -> Result<()> {
    let matcher = NearestMatcher::new(config.metric, config.threshold)?;

    let paths = if images.is_empty() {
        let stdin = io::stdin();
        match source::prompt_source(&mut stdin.lock(), &mut io::stdout()) {
            Ok(paths) => paths,
            Err(SourceError::InvalidSelection(choice)) => {
                println!("Invalid choice '{choice}'. Exiting.");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    } else {
        images
    };

    if paths.is_empty() {
        println!("No images to process.");
        return Ok(());
    }

    let (gallery, embedder) = build_gallery(config)?;
    let mut processor = FrameProcessor::new(&gallery, matcher, embedder);
    let outcome = processor.recognize_batch(&paths)?;

    tracing::info!(
        processed = outcome.processed,
        skipped = outcome.skipped.len(),
        no_face = outcome.no_face,
        recognized = outcome.recognized.len(),
        "batch complete"
    );

    if outcome.recognized.is_empty() {
        println!("No faces recognized in the supplied images.");
        return Ok(());
    }

    let now = BatchStamp::now();
    let stamp = match date {
        Some(d) => BatchStamp::new(d, now.time),
        None => now,
    };

    let store = LedgerStore::new(&config.ledger_dir);
    let summary = store
        .merge(&outcome.recognized, stamp)
        .with_context(|| format!("updating {}", store.path_for(stamp.date).display()))?;

    for name in &summary.added {
        println!("Marked present: {name}");
    }
    for name in &summary.already_present {
        println!("Already marked: {name}");
    }
    println!(
        "{} attendance for {} ({} total).",
        if summary.written { "Saved" } else { "Unchanged" },
        stamp.date,
        summary.total
    );
    println!("{}", summary.path.display());

    Ok(())
}

fn list_gallery(config: &Config, json: bool) -> Result<()> {
    let (gallery, _) = build_gallery(config)?;

    // One row per identity; the group is taken from its first reference photo.
    let mut rows: Vec<(&str, &str, usize)> = Vec::new();
    for record in gallery.records() {
        match rows.iter_mut().find(|(name, _, _)| *name == record.name) {
            Some(row) => row.2 += 1,
            None => rows.push((&record.name, &record.group, 1)),
        }
    }

    if json {
        let value: Vec<serde_json::Value> = rows
            .iter()
            .map(|(name, group, photos)| {
                serde_json::json!({ "name": name, "group": group, "photos": photos })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else if rows.is_empty() {
        println!("No identities in {}", config.dataset_dir.display());
    } else {
        for (name, group, photos) in rows {
            println!("{name:<24} {group:<16} {photos} photo(s)");
        }
    }

    Ok(())
}

fn show(config: &Config, date: Option<NaiveDate>) -> Result<()> {
    let date = date.unwrap_or_else(|| Local::now().date_naive());
    let store = LedgerStore::new(&config.ledger_dir);

    match store.load(date)? {
        None => println!("No attendance recorded for {date}."),
        Some(ledger) if ledger.is_empty() => println!("No attendance recorded for {date}."),
        Some(ledger) => {
            for entry in ledger.entries() {
                println!("{:<24} {:<16} {} {}", entry.name, entry.group, entry.date, entry.time);
            }
            println!("{} present on {date}.", ledger.len());
        }
    }

    Ok(())
}
