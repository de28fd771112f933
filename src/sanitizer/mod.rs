//! Pipeline orchestrator.
//!
//! Fixed stage order over the working text:
//!
//! 1. Text normalization (CRLF, BOM)
//! 2. T-SQL rule set (batch elimination + inline rewrites)
//! 3. Inline fix-ups (INSERT INTO repair, statement separation, hex and
//!    Unicode literals, residual IDENTITY)
//! 4. MySQL-only statement strips
//! 5. Schema rule set (CHECK elision before syntactic cleanup)
//!
//! Stage 5 must run last and its CHECK elision first: cleanup applied any
//! earlier would mistake the `[FM]` bracket class inside a CHECK body for a
//! bracketed identifier and mangle it.

use crate::normalize;
use crate::schema;
use crate::tsql;
use once_cell::sync::Lazy;
use regex::Regex;

/// Rewrite a T-SQL or MySQL dump into a script SQLite will execute.
///
/// Total and pure: never fails, same input gives same output, and a script
/// consisting only of procedural batches sanitizes to the empty string.
pub fn sanitize(sql: &str) -> String {
    let script = normalize::apply(sql);
    let script = tsql::apply(&script);
    let script = fix_inserts(&script);
    let script = rewrite_literals(&script);
    let script = strip_mysql_statements(&script);
    schema::apply(&script)
}

static RE_INSERT_TARGET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bINSERT\s+("[\w ]+"|\[[\w ]+\]|\w+)"#).unwrap());
static RE_MISSING_SEMICOLON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([^;\s])(\s*\n\s*)(INSERT\s+INTO\b)").unwrap());

/// T-SQL allows `INSERT "Table"`; SQLite requires `INSERT INTO "Table"`.
/// Also restore the `;` some dumps omit between back-to-back INSERTs.
fn fix_inserts(script: &str) -> String {
    let script = RE_INSERT_TARGET.replace_all(script, |caps: &regex::Captures| {
        let target = &caps[1];
        if target.eq_ignore_ascii_case("INTO") {
            caps[0].to_string()
        } else {
            format!("INSERT INTO {target}")
        }
    });
    RE_MISSING_SEMICOLON
        .replace_all(&script, "${1}${2}; ${3}")
        .into_owned()
}

static RE_HEX_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b0x([0-9A-Fa-f]+)\b").unwrap());
static RE_UNICODE_STRING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[^0-9A-Za-z_])N'").unwrap());
static RE_IDENTITY_SEED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\bIDENTITY\s*\(\s*\d+\s*,\s*\d+\s*\)").unwrap());
static RE_IDENTITY_BARE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s*\bIDENTITY\b").unwrap());

/// `0xDEAD` → `X'DEAD'`, `N'…'` → `'…'`, plus a second IDENTITY sweep for
/// occurrences the T-SQL pass could not see yet (e.g. produced by the
/// INSERT repair joining lines).
fn rewrite_literals(script: &str) -> String {
    let script = RE_HEX_LITERAL.replace_all(script, "X'${1}'");
    let script = RE_UNICODE_STRING.replace_all(&script, "${1}'");
    let script = RE_IDENTITY_SEED.replace_all(&script, "");
    RE_IDENTITY_BARE.replace_all(&script, "").into_owned()
}

static RE_MYSQL_DATABASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*(?:CREATE|DROP)\s+DATABASE\b[^;\n]*;").unwrap());
static RE_MYSQL_USE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?im)^\s*USE\s+[^;\n]*;").unwrap());
static RE_MYSQL_LOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*(?:LOCK|UNLOCK)\s+TABLES[^;\n]*;").unwrap());
static RE_HASH_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*#.*$").unwrap());

fn strip_mysql_statements(script: &str) -> String {
    let script = RE_MYSQL_DATABASE.replace_all(script, "");
    let script = RE_MYSQL_USE.replace_all(&script, "");
    let script = RE_MYSQL_LOCK.replace_all(&script, "");
    RE_HASH_COMMENT.replace_all(&script, "").into_owned()
}
