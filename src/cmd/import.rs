//! Import command CLI handler.

use crate::importer::{self, FileStatus, ImportConfig, ImportMode};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;

/// JSON output for the import command
#[derive(Serialize)]
struct ImportJsonOutput {
    database: String,
    mode: String,
    total: usize,
    passed: usize,
    skipped_empty: usize,
    failed: usize,
    results: Vec<ImportFileResult>,
}

#[derive(Serialize)]
struct ImportFileResult {
    file: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug_dump: Option<String>,
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    file: PathBuf,
    db: PathBuf,
    debug_dir: Option<PathBuf>,
    append: bool,
    no_order: bool,
    progress: bool,
    json: bool,
) -> anyhow::Result<()> {
    let mut files = super::expand_pattern(&file)?;
    if !no_order {
        importer::order_for_import(&mut files);
    }

    let mode = if append {
        ImportMode::Append
    } else {
        ImportMode::Overwrite
    };
    let config = ImportConfig {
        files,
        db_path: db.clone(),
        mode,
        debug_dir,
    };

    let bar = if progress && !json {
        let pb = ProgressBar::new(config.files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );
        Some(pb)
    } else {
        None
    };

    let summary = importer::run(&config, |msg| {
        if let Some(ref pb) = bar {
            if msg.starts_with("Processing") {
                pb.inc(1);
                pb.set_message(msg.to_string());
            } else {
                pb.println(msg);
            }
        } else if !json {
            eprintln!("{msg}");
        }
    })?;
    if let Some(pb) = bar {
        pb.finish_with_message("Import complete");
    }

    if json {
        let output = ImportJsonOutput {
            database: db.display().to_string(),
            mode: match mode {
                ImportMode::Overwrite => "overwrite".to_string(),
                ImportMode::Append => "append".to_string(),
            },
            total: summary.total,
            passed: summary.passed,
            skipped_empty: summary.skipped_empty,
            failed: summary.failed,
            results: summary
                .outcomes
                .iter()
                .map(|outcome| ImportFileResult {
                    file: outcome.file.display().to_string(),
                    status: match outcome.status {
                        FileStatus::Passed => "passed".to_string(),
                        FileStatus::SkippedEmpty => "skipped_empty".to_string(),
                        FileStatus::Failed => "failed".to_string(),
                    },
                    error: outcome.error.clone(),
                    debug_dump: outcome.debug_dump.as_ref().map(|p| p.display().to_string()),
                })
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    if summary.failed > 0 {
        anyhow::bail!("{} of {} files failed to import", summary.failed, summary.total);
    }
    Ok(())
}
