//! Batch importer that executes sanitized dumps against SQLite.
//!
//! Each input file is sanitized, dumped to a debug artifact, and executed
//! inside its own transaction. A failing file rolls back and the run
//! continues; only environment errors (unopenable database, unwritable debug
//! directory) abort the whole job.

use crate::input;
use crate::sanitizer;
use anyhow::{Context, Result};
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// What to do with an existing database file at the target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Delete any existing database first for a clean start.
    #[default]
    Overwrite,
    /// Keep the existing database and load on top of it.
    Append,
}

/// Per-file classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// Script executed to completion and committed.
    Passed,
    /// Sanitizer reduced the file to whitespace (procedural-only source).
    SkippedEmpty,
    /// SQLite rejected the script; the transaction was rolled back.
    Failed,
}

#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub file: PathBuf,
    pub status: FileStatus,
    pub error: Option<String>,
    pub debug_dump: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub total: usize,
    pub passed: usize,
    pub skipped_empty: usize,
    pub failed: usize,
    pub outcomes: Vec<FileOutcome>,
}

/// Configuration for one import job.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Files in execution order (callers sort schema before data).
    pub files: Vec<PathBuf>,
    /// Target SQLite database path.
    pub db_path: PathBuf,
    pub mode: ImportMode,
    /// Directory for `debug_<idx>_<name>.sql` artifacts; defaults to the
    /// database's parent directory.
    pub debug_dir: Option<PathBuf>,
}

/// Run an import job on the current thread, reporting progress through the
/// log callback in file order.
pub fn run(config: &ImportConfig, mut log: impl FnMut(&str)) -> Result<ImportSummary> {
    let cancel = AtomicBool::new(false);
    run_inner(config, &cancel, &mut log)
}

/// Handle to a background import worker.
pub struct ImportHandle {
    cancel: Arc<AtomicBool>,
    thread: JoinHandle<Result<ImportSummary>>,
}

impl ImportHandle {
    /// Request cancellation; the worker stops before the next file. An
    /// in-flight script execution is not interrupted.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn join(self) -> Result<ImportSummary> {
        self.thread
            .join()
            .map_err(|_| anyhow::anyhow!("import worker panicked"))?
    }
}

/// Run an import job on a background thread so interactive callers stay
/// responsive. The callback is invoked from the worker thread; callers are
/// responsible for marshalling to their UI thread.
pub fn spawn(config: ImportConfig, mut log: impl FnMut(&str) + Send + 'static) -> ImportHandle {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    let thread = std::thread::spawn(move || run_inner(&config, &flag, &mut log));
    ImportHandle { cancel, thread }
}

fn run_inner(
    config: &ImportConfig,
    cancel: &AtomicBool,
    log: &mut dyn FnMut(&str),
) -> Result<ImportSummary> {
    if config.mode == ImportMode::Overwrite && config.db_path.exists() {
        std::fs::remove_file(&config.db_path)
            .with_context(|| format!("failed to remove {}", config.db_path.display()))?;
    }

    let conn = Connection::open(&config.db_path)
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;
    conn.execute_batch("PRAGMA foreign_keys = OFF;")
        .context("failed to disable foreign key enforcement")?;
    register_regexp(&conn)?;

    let debug_dir = config.debug_dir.clone().unwrap_or_else(|| {
        config
            .db_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    });
    std::fs::create_dir_all(&debug_dir)
        .with_context(|| format!("failed to create debug directory {}", debug_dir.display()))?;

    let total = config.files.len();
    let mut summary = ImportSummary {
        total,
        ..Default::default()
    };

    for (idx, file) in config.files.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        log(&format!("Processing {}/{}: {}", idx + 1, total, file.display()));

        let raw = match input::read_sql_file(file) {
            Ok(text) => text,
            Err(err) => {
                log(&format!("Error reading {}: {err}", file.display()));
                summary.failed += 1;
                summary.outcomes.push(FileOutcome {
                    file: file.clone(),
                    status: FileStatus::Failed,
                    error: Some(err.to_string()),
                    debug_dump: None,
                });
                continue;
            }
        };

        let script = sanitizer::sanitize(&raw);

        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("file{idx}"));
        let dump_path = debug_dir.join(format!("debug_{idx}_{name}.sql"));
        // Best effort: a failed debug dump never blocks the import.
        let debug_dump = std::fs::write(&dump_path, &script)
            .is_ok()
            .then(|| dump_path.clone());

        if script.trim().is_empty() {
            summary.skipped_empty += 1;
            summary.outcomes.push(FileOutcome {
                file: file.clone(),
                status: FileStatus::SkippedEmpty,
                error: None,
                debug_dump,
            });
            continue;
        }

        conn.execute_batch("BEGIN TRANSACTION;")
            .context("failed to begin transaction")?;
        let result = conn
            .execute_batch(&script)
            .and_then(|()| conn.execute_batch("COMMIT;"));
        match result {
            Ok(()) => {
                summary.passed += 1;
                summary.outcomes.push(FileOutcome {
                    file: file.clone(),
                    status: FileStatus::Passed,
                    error: None,
                    debug_dump,
                });
            }
            Err(err) => {
                let _ = conn.execute_batch("ROLLBACK;");
                log(&format!("Error executing {}: {err}", file.display()));
                summary.failed += 1;
                summary.outcomes.push(FileOutcome {
                    file: file.clone(),
                    status: FileStatus::Failed,
                    error: Some(err.to_string()),
                    debug_dump,
                });
            }
        }
    }

    log(&format!(
        "Total: {} | Passed: {} | Skipped (sanitized to empty): {} | Failed: {}",
        summary.total, summary.passed, summary.skipped_empty, summary.failed
    ));
    if summary.failed == 0 {
        let db_name = config
            .db_path
            .file_stem()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| config.db_path.display().to_string());
        log(&format!("成功匯入資料庫: {db_name}"));
    }

    Ok(summary)
}

/// Register a `REGEXP(pattern, text)` scalar backed by the host regex
/// engine, so sanitized scripts that reference REGEXP still parse and run.
/// The compiled pattern is cached as sqlite aux data per call site.
fn register_regexp(conn: &Connection) -> Result<()> {
    type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        move |ctx| {
            let pattern: Arc<Regex> = ctx.get_or_create_aux(0, |vr| -> Result<_, BoxError> {
                Ok(Regex::new(vr.as_str()?)?)
            })?;
            let text = ctx
                .get_raw(1)
                .as_str()
                .map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;
            Ok(pattern.is_match(text))
        },
    )
    .context("failed to register REGEXP function")
}

/// Stable sort that loads `*_schema.sql` files before `*_data.sql` files so
/// table definitions exist by the time their rows arrive. Everything else
/// keeps its relative (lexicographic) position between the two groups.
pub fn order_for_import(files: &mut [PathBuf]) {
    files.sort_by_key(|path| {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let rank = if name.contains("_schema.") {
            0u8
        } else if name.contains("_data.") {
            2
        } else {
            1
        };
        (rank, name)
    });
}
