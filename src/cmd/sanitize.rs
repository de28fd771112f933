//! Sanitize command CLI handler.

use crate::input;
use crate::sanitizer;
use anyhow::Context;
use std::path::PathBuf;

pub fn run(file: PathBuf, output: Option<PathBuf>) -> anyhow::Result<()> {
    let files = super::expand_pattern(&file)?;

    if files.len() == 1 && output.as_ref().map_or(true, |o| !o.is_dir()) {
        let sql = input::read_sql_file(&files[0])?;
        let clean = sanitizer::sanitize(&sql);
        match output {
            Some(path) => std::fs::write(&path, clean)
                .with_context(|| format!("failed to write {}", path.display()))?,
            None => print!("{clean}"),
        }
        return Ok(());
    }

    let out_dir = output.ok_or_else(|| {
        anyhow::anyhow!("output directory required for glob patterns; use --output <dir>")
    })?;
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let total = files.len();
    for (idx, file) in files.iter().enumerate() {
        let sql = input::read_sql_file(file)?;
        let clean = sanitizer::sanitize(&sql);
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("output_{idx}.sql"));
        let target = out_dir.join(name);
        std::fs::write(&target, clean)
            .with_context(|| format!("failed to write {}", target.display()))?;
        eprintln!("[{}/{}] {} → {}", idx + 1, total, file.display(), target.display());
    }
    Ok(())
}
