//! T-SQL (Microsoft SQL Server) rule set.
//!
//! Runs in two phases:
//! - Phase A splits the script into batches on `GO` separator lines and
//!   discards every batch whose first statement is procedural (triggers,
//!   procedures, SET/DECLARE noise, backup chatter that SQLite cannot run).
//! - Phase B rewrites the surviving text inline: scalar functions, IDENTITY
//!   and CLUSTERED noise, temporal-table clauses, money literals, and the
//!   balanced-paren `CONVERT` to `CAST` transform.

use crate::balanced::{find_closing, scan_call};
use once_cell::sync::Lazy;
use regex::Regex;

/// Statement-leading keywords whose whole batch is discarded. Tokens ending
/// in a word character match on a word boundary; `IF(` and `SELECT @` are
/// literal prefixes.
const PROCEDURAL_SKIP: &[&str] = &[
    "CREATE TRIGGER",
    "CREATE PROCEDURE",
    "CREATE PROC",
    "CREATE FUNCTION",
    "CREATE VIEW",
    "CREATE SCHEMA",
    "CREATE SEQUENCE",
    "CREATE ROLE",
    "CREATE SECURITY POLICY",
    "CREATE TYPE",
    "ALTER TABLE",
    "ALTER TRIGGER",
    "ALTER PROCEDURE",
    "ALTER PROC",
    "ALTER FUNCTION",
    "ALTER DATABASE",
    "DROP DATABASE",
    "DROP PROC",
    "DROP PROCEDURE",
    "DROP TRIGGER",
    "DROP FUNCTION",
    "CREATE DATABASE",
    "IF",
    "IF(",
    "ELSE",
    "WHILE",
    "UPDATE STATISTICS",
    "GRANT",
    "REVOKE",
    "DENY",
    "SET",
    "DECLARE",
    "PRINT",
    "RAISERROR",
    "CHECKPOINT",
    "DBCC",
    "USE",
    "BACKUP",
    "RESTORE",
    "DISK",
    "SELECT @",
    "EXEC",
    "EXECUTE",
];

/// Upper bound on CONVERT rewrite passes so malformed input terminates.
const CONVERT_ITERATION_CAP: usize = 400;

/// SQLite expression producing a version-4-shaped UUID, standing in for
/// T-SQL `newid()`.
const UUID4_EXPR: &str = "(lower(hex(randomblob(4))) || '-' || \
lower(hex(randomblob(2))) || '-4' || substr(lower(hex(randomblob(2))),2) || '-' || \
substr('89ab', 1 + (abs(random()) % 4), 1) || substr(lower(hex(randomblob(2))),2) || '-' || \
lower(hex(randomblob(6))))";

/// Apply the full T-SQL rule set.
pub fn apply(script: &str) -> String {
    let script = eliminate_procedural_batches(script);
    inline_rewrites(&script)
}

// --- Phase A: batch-level elimination ---

static RE_GO_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*GO(?:\s+\d+)?\s*;?\s*$").unwrap());

fn split_batches(script: &str) -> Vec<String> {
    let mut batches = Vec::new();
    let mut current = String::new();
    for line in script.lines() {
        if RE_GO_LINE.is_match(line) {
            batches.push(std::mem::take(&mut current));
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    batches.push(current);
    batches
}

/// Skip past leading `--` and `/* */` comments so batch inspection sees the
/// first real token. The batch itself keeps its comments.
fn strip_leading_comments(batch: &str) -> &str {
    let mut rest = batch.trim_start();
    loop {
        if rest.starts_with("--") {
            match rest.find('\n') {
                Some(pos) => {
                    rest = rest[pos + 1..].trim_start();
                    continue;
                }
                None => return "",
            }
        }
        if rest.starts_with("/*") {
            match rest.find("*/") {
                Some(pos) => {
                    rest = rest[pos + 2..].trim_start();
                    continue;
                }
                None => return "",
            }
        }
        break;
    }
    rest
}

fn starts_with_skip_token(line: &str) -> bool {
    PROCEDURAL_SKIP.iter().any(|token| {
        let Some(rest) = line.strip_prefix(token) else {
            return false;
        };
        let boundary_needed = token
            .chars()
            .last()
            .map(|c| c.is_ascii_alphanumeric())
            .unwrap_or(false);
        if boundary_needed {
            rest.chars()
                .next()
                .map(|c| !c.is_ascii_alphanumeric() && c != '_')
                .unwrap_or(true)
        } else {
            true
        }
    })
}

/// Re-terminate a batch with exactly one `;`. The terminator goes on its own
/// line so a trailing line comment cannot swallow it. Keeping the operation
/// idempotent keeps the whole sanitizer idempotent.
fn terminate(batch: &str) -> String {
    let trimmed = batch.trim_end();
    if trimmed.ends_with(';') {
        trimmed.to_string()
    } else {
        format!("{trimmed}\n;")
    }
}

fn eliminate_procedural_batches(script: &str) -> String {
    let mut kept = Vec::new();
    for batch in split_batches(script) {
        if batch.trim().is_empty() {
            continue;
        }
        let body = strip_leading_comments(&batch);
        if !body.is_empty() {
            let first_line = body.lines().next().unwrap_or("");
            let inspect = first_line
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_uppercase();
            if starts_with_skip_token(&inspect) {
                continue;
            }
        }
        kept.push(terminate(&batch));
    }
    kept.join("\n")
}

// --- Phase B: inline rewrites ---

static RE_INSERT_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(INSERT\s+(?:INTO\s+)?(?:"[\w ]+"|\[[\w ]+\]|\w+)\s+)VALUE\s*\("#).unwrap()
});
static RE_ROW_WRAPPER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bROW\s*\(").unwrap());
static RE_GETDATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bgetdate\s*\(\s*\)").unwrap());
static RE_NEWID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bnewid\s*\(\s*\)").unwrap());
static RE_IDENTITY_SEED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\bIDENTITY\s*\(\s*\d+\s*,\s*\d+\s*\)").unwrap());
static RE_IDENTITY_BARE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s*\bIDENTITY\b").unwrap());
static RE_CLUSTERED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+(?:NON)?CLUSTERED\b").unwrap());
static RE_WITH_ROLLUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s*\bWITH\s+ROLLUP\b").unwrap());
static RE_PERIOD_SYSTEM_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\bPERIOD\s+FOR\s+SYSTEM_TIME\s*\([^)]*\)").unwrap());
static RE_SYSTEM_VERSIONING_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bWITH\s*\(\s*SYSTEM_VERSIONING\s*=\s*ON").unwrap());
static RE_MONEY_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)(^|[^0-9A-Za-z_])\$(\d+(?:\.\d+)?)").unwrap());
static RE_CONVERT_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bCONVERT\s*\(").unwrap());
static RE_STRAY_TOKEN_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:BEGIN|END|AS|ELSE|WITH\s+LOG|WITH\s+NOWAIT)\s*;?[ \t]*$").unwrap()
});
static RE_VARIABLE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^[ \t]*(?:@\w+|:setvar\b|DECLARE\s+@)[^\n]*$").unwrap());

fn inline_rewrites(script: &str) -> String {
    let script = RE_INSERT_VALUE.replace_all(script, "${1}VALUES (");
    let script = RE_ROW_WRAPPER.replace_all(&script, "(");
    let script = RE_GETDATE.replace_all(&script, "CURRENT_TIMESTAMP");
    let script = RE_NEWID.replace_all(&script, UUID4_EXPR);
    let script = RE_IDENTITY_SEED.replace_all(&script, "");
    let script = RE_IDENTITY_BARE.replace_all(&script, "");
    let script = RE_CLUSTERED.replace_all(&script, "");
    let script = RE_WITH_ROLLUP.replace_all(&script, "");
    let script = RE_PERIOD_SYSTEM_TIME.replace_all(&script, "");
    let script = strip_system_versioning(&script);
    let script = RE_MONEY_LITERAL.replace_all(&script, "${1}${2}");
    let script = rewrite_convert(&script);
    let script = strip_alias_assignments(&script);
    let script = RE_STRAY_TOKEN_LINE.replace_all(&script, "");
    RE_VARIABLE_LINE.replace_all(&script, "").into_owned()
}

/// `WITH (SYSTEM_VERSIONING = ON ...)` may nest parens for its HISTORY_TABLE
/// option, so the clause end comes from a balanced scan.
fn strip_system_versioning(script: &str) -> String {
    let mut script = script.to_string();
    while let Some((start, end)) = RE_SYSTEM_VERSIONING_OPEN
        .find(&script)
        .map(|m| (m.start(), m.end()))
    {
        let open = script[start..end].find('(').map(|i| start + i + 1).unwrap_or(end);
        match find_closing(&script, open) {
            Some(close) => script.replace_range(start..=close, ""),
            None => {
                script.truncate(start);
                break;
            }
        }
    }
    script
}

/// `CONVERT(Type, Expr [, style])` → `CAST(Expr AS Type)`.
///
/// Arguments are delimited with a balanced-paren scan so nested calls and
/// parameterized types survive; a third style argument is dropped. Target
/// type `xml` maps to `TEXT` since SQLite has no XML affinity.
fn rewrite_convert(script: &str) -> String {
    let mut script = script.to_string();
    let mut search_from = 0;
    for _ in 0..CONVERT_ITERATION_CAP {
        let Some((start, open)) = RE_CONVERT_OPEN
            .find_at(&script, search_from)
            .map(|m| (m.start(), m.end()))
        else {
            break;
        };
        let Some((commas, close)) = scan_call(&script, open) else {
            break;
        };
        if commas.is_empty() {
            // Single-argument CONVERT cannot be expressed as CAST; leave it.
            search_from = open;
            continue;
        }
        let target_type = script[open..commas[0]].trim().to_string();
        let expr_end = commas.get(1).copied().unwrap_or(close);
        let expr = script[commas[0] + 1..expr_end].trim().to_string();
        let target_type = if target_type.eq_ignore_ascii_case("xml") {
            "TEXT".to_string()
        } else {
            target_type
        };
        let replacement = format!("CAST({expr} AS {target_type})");
        script.replace_range(start..=close, &replacement);
        // Re-scan from the replacement start; the expression may itself hold
        // a nested CONVERT.
        search_from = start;
    }
    script
}

static RE_SELECT_KW: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bSELECT\b").unwrap());
static RE_SELECT_LIST_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bFROM\b|;").unwrap());
static RE_ALIAS_ASSIGN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(,\s*|\bSELECT\s+)([A-Za-z0-9_"\[\]\.]+)\s*=\s*"#).unwrap()
});

/// Drop T-SQL `alias = expr` assignments, but only inside SELECT column
/// lists; anchoring on the SELECT…FROM span keeps `WHERE col = val` intact.
fn strip_alias_assignments(script: &str) -> String {
    let mut result = String::with_capacity(script.len());
    let mut cursor = 0;
    while let Some(m) = RE_SELECT_KW.find(&script[cursor..]) {
        let select_start = cursor + m.start();
        let list_start = cursor + m.end();
        let list_end = match RE_SELECT_LIST_END.find(&script[list_start..]) {
            Some(e) => list_start + e.start(),
            None => script.len(),
        };
        result.push_str(&script[cursor..select_start]);
        let span = &script[select_start..list_end];
        result.push_str(&RE_ALIAS_ASSIGN.replace_all(span, "${1}"));
        cursor = list_end;
    }
    result.push_str(&script[cursor..]);
    result
}
