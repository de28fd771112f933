mod import;
mod sanitize;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::{generate, Shell};
use std::io;
use std::path::{Path, PathBuf};

const AFTER_HELP: &str = "\x1b[1mCommon workflows:\x1b[0m
  Sanitize a SQL Server dump for SQLite:
    sql-sanitizer sanitize dump.sql -o clean.sql

  Import a directory of dumps into one database:
    sql-sanitizer import \"dumps/*.sql\" --db imported.db

  Keep debug artifacts of a failing import somewhere inspectable:
    sql-sanitizer import \"dumps/*.sql\" --db imported.db --debug-dir /tmp/debug

\x1b[1mMore info:\x1b[0m
  Run 'sql-sanitizer <command> --help' for command-specific options.
  Enable completions: sql-sanitizer completions <shell>";

#[derive(Parser)]
#[command(name = "sql-sanitizer")]
#[command(version)]
#[command(
    about = "Rewrites T-SQL and MySQL dump files into SQLite-executable scripts and imports them"
)]
#[command(after_help = AFTER_HELP)]
#[command(arg_required_else_help = true)]
#[command(max_term_width = 100)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

// Help heading constants for consistency
const INPUT_OUTPUT: &str = "Input/Output";
const BEHAVIOR: &str = "Behavior";
const OUTPUT_FORMAT: &str = "Output";

#[derive(Subcommand)]
pub enum Commands {
    /// Rewrite SQL dumps into the reduced dialect SQLite accepts
    #[command(visible_alias = "sa")]
    #[command(after_help = "\x1b[1mExamples:\x1b[0m
  sql-sanitizer sanitize dump.sql
  sql-sanitizer sanitize dump.sql -o clean.sql
  sql-sanitizer sanitize \"dumps/*.sql\" -o clean/")]
    Sanitize {
        /// Input SQL file or glob pattern (plain or .gz/.bz2/.xz/.zst)
        #[arg(value_hint = ValueHint::FilePath, help_heading = INPUT_OUTPUT)]
        file: PathBuf,

        /// Output file (single input) or directory (glob); stdout if omitted
        #[arg(short, long, value_hint = ValueHint::AnyPath, help_heading = INPUT_OUTPUT)]
        output: Option<PathBuf>,
    },

    /// Sanitize dumps and load them into a SQLite database
    #[command(visible_alias = "im")]
    #[command(after_help = "\x1b[1mExamples:\x1b[0m
  sql-sanitizer import dump.sql --db imported.db
  sql-sanitizer import \"dumps/**/*.sql\" --db imported.db --progress
  sql-sanitizer import \"dumps/*.sql\" --db imported.db --append --json")]
    Import {
        /// Input SQL file or glob pattern
        #[arg(value_hint = ValueHint::FilePath, help_heading = INPUT_OUTPUT)]
        file: PathBuf,

        /// Output SQLite database path
        #[arg(long, value_hint = ValueHint::FilePath, help_heading = INPUT_OUTPUT)]
        db: PathBuf,

        /// Directory for sanitized debug dumps (default: next to the database)
        #[arg(long, value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        debug_dir: Option<PathBuf>,

        /// Append to an existing database instead of replacing it
        #[arg(long, help_heading = BEHAVIOR)]
        append: bool,

        /// Keep the given file order (skip the schema-before-data sort)
        #[arg(long, help_heading = BEHAVIOR)]
        no_order: bool,

        /// Show progress bar
        #[arg(short, long, help_heading = OUTPUT_FORMAT)]
        progress: bool,

        /// Output results as JSON
        #[arg(long, help_heading = OUTPUT_FORMAT)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Sanitize { file, output } => sanitize::run(file, output),
        Commands::Import {
            file,
            db,
            debug_dir,
            append,
            no_order,
            progress,
            json,
        } => import::run(file, db, debug_dir, append, no_order, progress, json),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
    }
}

/// Expand a literal path or glob pattern into a sorted file list.
fn expand_pattern(pattern: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let pattern_str = pattern.to_string_lossy();

    let is_glob =
        pattern_str.contains('*') || pattern_str.contains('?') || pattern_str.contains('[');
    if !is_glob {
        anyhow::ensure!(pattern.exists(), "file does not exist: {}", pattern.display());
        return Ok(vec![pattern.to_path_buf()]);
    }

    let mut files = Vec::new();
    let entries = glob::glob(&pattern_str)
        .with_context(|| format!("invalid glob pattern '{pattern_str}'"))?;
    for entry in entries {
        let path = entry.with_context(|| format!("error reading path for '{pattern_str}'"))?;
        if path.is_file() {
            files.push(path);
        }
    }
    anyhow::ensure!(!files.is_empty(), "no files match pattern: {}", pattern_str);
    files.sort();
    Ok(files)
}
