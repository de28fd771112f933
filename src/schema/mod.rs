//! Schema and DDL rule set.
//!
//! Rewrites the structural parts of a dump into SQLite's narrow grammar:
//! CHECK-constraint elision, bracket-identifier unquoting, type widening,
//! table-option stripping, constraint-line filtering, and CREATE INDEX /
//! DROP canonicalization.
//!
//! Order matters: CHECK elision runs before any syntactic cleanup, because
//! cleanup would otherwise mangle bracket-class literals like `'[FM]'` into
//! quoted identifiers.

use crate::balanced::find_closing;
use once_cell::sync::Lazy;
use regex::Regex;

/// Apply the full schema rule set in its fixed order.
pub fn apply(script: &str) -> String {
    let script = elide_forbidden_checks(script);
    let script = remove_computed_columns(&script);
    let script = unquote_identifiers(&script);
    let script = normalize_types(&script);
    let script = strip_table_options(&script);
    let script = filter_constraint_lines(&script);
    let script = canonicalize_create_index(&script);
    let script = canonicalize_drops(&script);
    cleanup_syntax(&script)
}

// --- Step 1: CHECK-constraint elision ---

static RE_CHECK_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bCHECK\s*\(").unwrap());
static FORBIDDEN_CHECK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"(?i)\[FM\]|"FM""#).unwrap(),
        Regex::new(r#"(?i)LIKE\s*['"].*?\[.*?\]"#).unwrap(),
    ]
});
static RE_CONSTRAINT_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)CONSTRAINT\s+[\w\[\]"'`]+\s*$"#).unwrap());

/// Remove every `CHECK(...)` block whose body matches a forbidden pattern,
/// along with a directly preceding `CONSTRAINT <name>` prefix. Occurrences
/// are walked back-to-front so earlier offsets stay valid while editing.
fn elide_forbidden_checks(script: &str) -> String {
    let mut script = script.to_string();
    let spans: Vec<(usize, usize)> = RE_CHECK_OPEN
        .find_iter(&script)
        .map(|m| (m.start(), m.end()))
        .collect();
    for (start, open) in spans.into_iter().rev() {
        let Some(close) = find_closing(&script, open) else {
            continue;
        };
        let block = &script[start..=close];
        if !FORBIDDEN_CHECK_PATTERNS.iter().any(|re| re.is_match(block)) {
            continue;
        }
        let cut_from = RE_CONSTRAINT_PREFIX
            .find(&script[..start])
            .map(|m| m.start())
            .unwrap_or(start);
        script.replace_range(cut_from..=close, "");
    }
    script
}

static RE_COMPUTED_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bAS\s*\(").unwrap());
static RE_PERSISTED_TAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s+PERSISTED\b").unwrap());

/// Computed-column clauses `AS (expression) [PERSISTED]` have no SQLite
/// counterpart; drop them wholesale.
fn remove_computed_columns(script: &str) -> String {
    let mut script = script.to_string();
    let spans: Vec<(usize, usize)> = RE_COMPUTED_OPEN
        .find_iter(&script)
        .map(|m| (m.start(), m.end()))
        .collect();
    for (start, open) in spans.into_iter().rev() {
        let Some(close) = find_closing(&script, open) else {
            continue;
        };
        let mut end = close;
        if let Some(m) = RE_PERSISTED_TAIL.find(&script[close + 1..]) {
            end = close + m.end();
        }
        script.replace_range(start..=end, "");
    }
    script
}

// --- Step 2: identifier unquoting ---

static RE_BRACKET_SCHEMA_PAIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\w+\]\.\[(\w+)\]").unwrap());
static RE_BRACKET_SCHEMA_BARE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\w+\]\.(\w+)").unwrap());
static RE_BARE_SCHEMA_BRACKET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\w+\.\[(\w+)\]").unwrap());
static RE_BRACKET_IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\w+)\]").unwrap());
static RE_QUOTED_DBO: Lazy<Regex> = Lazy::new(|| Regex::new(r#""dbo"\."(\w+)""#).unwrap());

fn unquote_identifiers(script: &str) -> String {
    let script = RE_BRACKET_SCHEMA_PAIR.replace_all(script, "[${1}]");
    let script = RE_BRACKET_SCHEMA_BARE.replace_all(&script, "\"${1}\"");
    let script = RE_BARE_SCHEMA_BRACKET.replace_all(&script, "[${1}]");
    let script = RE_BRACKET_IDENT.replace_all(&script, "\"${1}\"");
    RE_QUOTED_DBO.replace_all(&script, "\"${1}\"").into_owned()
}

// --- Step 3: type normalization ---

static RE_QUOTED_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)"(int|nvarchar|datetime|image|ntext|money|smallint|real|bit|tinyint|float|decimal|char|varchar|date|time)""#,
    )
    .unwrap()
});
static RE_GEOMETRY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bGEOMETRY\b").unwrap());
static RE_GEOGRAPHY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bGEOGRAPHY\b").unwrap());
static RE_HIERARCHYID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bHIERARCHYID\b").unwrap());
static RE_NVARCHAR_MAX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bN?VARCHAR\s*\(\s*MAX\s*\)").unwrap());
static RE_VARBINARY_MAX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bVARBINARY\s*\(\s*MAX\s*\)").unwrap());

fn normalize_types(script: &str) -> String {
    let script = RE_QUOTED_TYPE.replace_all(script, "${1}");
    let script = RE_GEOMETRY.replace_all(&script, "TEXT");
    let script = RE_GEOGRAPHY.replace_all(&script, "TEXT");
    let script = RE_HIERARCHYID.replace_all(&script, "TEXT");
    let script = RE_NVARCHAR_MAX.replace_all(&script, "TEXT");
    RE_VARBINARY_MAX.replace_all(&script, "BLOB").into_owned()
}

// --- Step 4: table-option removal ---

static RE_ENGINE_TAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\)\s*ENGINE[^;]*;").unwrap());
static RE_AUTO_INCREMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+AUTO_INCREMENT\b").unwrap());
static RE_ON_UPDATE_TS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+ON\s+UPDATE\s+CURRENT_TIMESTAMP\b").unwrap());
static RE_CHECK_CONSTRAINT_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)CHECK\s+CONSTRAINT\s+(?:\[[^\]]*\]|"[^"]*"|\w+)"#).unwrap()
});
static RE_WITH_OPTIONS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bWITH\s*\([^)]*\)").unwrap());
static RE_ON_PRIMARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\)\s*ON\s+("PRIMARY"|\[PRIMARY\]|PRIMARY\b)"#).unwrap());
static RE_GENERATED_ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\bGENERATED\s+ALWAYS\s+AS\s+ROW\s+(?:START|END)\b").unwrap());
static RE_NEXT_VALUE_FOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*DEFAULT\s*\(\s*NEXT\s+VALUE\s+FOR\s+[^)]*\)").unwrap());
static RE_INDEX_INCLUDE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\bINCLUDE\s*\([^)]*\)").unwrap());

fn strip_table_options(script: &str) -> String {
    let script = RE_ENGINE_TAIL.replace_all(script, ");");
    let script = RE_AUTO_INCREMENT.replace_all(&script, "");
    let script = RE_ON_UPDATE_TS.replace_all(&script, "");
    let script = RE_CHECK_CONSTRAINT_REF.replace_all(&script, "");
    let script = RE_WITH_OPTIONS.replace_all(&script, "");
    let script = RE_ON_PRIMARY.replace_all(&script, ")");
    let script = RE_GENERATED_ROW.replace_all(&script, "");
    let script = RE_NEXT_VALUE_FOR.replace_all(&script, "");
    RE_INDEX_INCLUDE.replace_all(&script, "").into_owned()
}

// --- Step 5: constraint-line filter ---

static RE_KEY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:UNIQUE\s+)?(?:KEY|INDEX|FULLTEXT\s+KEY|CONSTRAINT)\s+").unwrap()
});

/// Drop standalone KEY / INDEX / CONSTRAINT lines that SQLite cannot parse
/// inside a column list. PRIMARY KEY and FOREIGN KEY declarations survive.
fn filter_constraint_lines(script: &str) -> String {
    script
        .lines()
        .filter(|line| {
            if !RE_KEY_LINE.is_match(line) {
                return true;
            }
            let upper = line.to_uppercase();
            upper.contains("PRIMARY KEY") || upper.contains("FOREIGN KEY")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// --- Step 6: CREATE INDEX canonicalization ---

static RE_CREATE_INDEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)CREATE\s+(UNIQUE\s+)?(?:(?:NON)?CLUSTERED\s+)?INDEX\s+([\w"\[\]]+)\s+ON\s+([^\s(]+)\s*(\([^)]*\))"#,
    )
    .unwrap()
});
static RE_TABLE_SCHEMA_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^"?\[?\w+\]?"?\."#).unwrap());

/// Rewrite `CREATE [UNIQUE] INDEX name ON tbl (cols)` to the `IF NOT EXISTS`
/// form, and prefix the index name with the table name when it does not
/// already carry it: SQLite's index namespace is flat, so two tables with an
/// `IX_id` index would otherwise collide.
fn canonicalize_create_index(script: &str) -> String {
    RE_CREATE_INDEX
        .replace_all(script, |caps: &regex::Captures| {
            let unique = if caps.get(1).is_some() { "UNIQUE " } else { "" };
            let index_name = &caps[2];
            let table = RE_TABLE_SCHEMA_PREFIX.replace(&caps[3], "");
            let cols = &caps[4];
            let clean_index: String = index_name
                .chars()
                .filter(|c| !matches!(c, '"' | '[' | ']'))
                .collect();
            let clean_table: String = table
                .chars()
                .filter(|c| !matches!(c, '"' | '[' | ']'))
                .collect();
            let name = if clean_index
                .to_lowercase()
                .starts_with(&clean_table.to_lowercase())
            {
                index_name.to_string()
            } else {
                format!("\"{clean_table}_{clean_index}\"")
            };
            format!("CREATE {unique}INDEX IF NOT EXISTS {name} ON {table} {cols}")
        })
        .into_owned()
}

// --- Step 7: DROP canonicalization ---

static RE_DROP_INDEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?im)^[ \t]*DROP\s+INDEX\s+[\w"\[\]]+\.([\w"\[\]]+)"#).unwrap()
});
static RE_DROP_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*DROP\s+TABLE\s+(?:IF\s+EXISTS\s+)?([^;\n]+?)\s*(?:;|$)").unwrap()
});

fn canonicalize_drops(script: &str) -> String {
    let script = RE_DROP_INDEX.replace_all(script, "DROP INDEX IF EXISTS ${1}");
    RE_DROP_TABLE
        .replace_all(&script, |caps: &regex::Captures| {
            let statements: Vec<String> = caps[1]
                .split(',')
                .map(|table| {
                    let table = RE_TABLE_SCHEMA_PREFIX.replace(table.trim(), "");
                    format!("DROP TABLE IF EXISTS {table}")
                })
                .collect();
            format!("{};", statements.join("; "))
        })
        .into_owned()
}

// --- Step 8: syntactic cleanup ---

static RE_COMMA_BEFORE_PAREN: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*\))").unwrap());
static RE_COMMA_BEFORE_SEMI: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*;)").unwrap());
static RE_DOUBLE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\)\s*\n\s*\);").unwrap());

/// Repair the dangling commas and doubled closers that the removals above
/// leave behind.
fn cleanup_syntax(script: &str) -> String {
    let script = RE_COMMA_BEFORE_PAREN.replace_all(script, "${1}");
    let script = RE_COMMA_BEFORE_SEMI.replace_all(&script, "${1}");
    RE_DOUBLE_CLOSE.replace_all(&script, ");").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracket_class_check_removed_with_constraint_prefix() {
        let sql = "CREATE TABLE X (s CHAR(2), CONSTRAINT ck CHECK (s LIKE '[FM]'));";
        let out = apply(sql);
        assert!(!out.to_uppercase().contains("CHECK"));
        assert!(!out.contains("ck"));
        assert!(!out.contains(",\u{20})") && !out.contains(",)"));
    }

    #[test]
    fn test_fm_literal_check_removed() {
        let sql = "CREATE TABLE X (s CHAR(2) CHECK (s = \"FM\"));";
        let out = apply(sql);
        assert!(!out.to_uppercase().contains("CHECK"));
    }

    #[test]
    fn test_harmless_check_survives() {
        let sql = "CREATE TABLE X (n INT CHECK (n > 0));";
        let out = apply(sql);
        assert!(out.contains("CHECK (n > 0)"));
    }

    #[test]
    fn test_nested_parens_inside_check() {
        let sql = "CREATE TABLE X (s CHAR(2) CHECK (s LIKE '[AB]' AND length(trim(s)) = 2));";
        let out = apply(sql);
        assert!(!out.to_uppercase().contains("CHECK"));
        assert!(out.trim_end().ends_with(");"));
    }

    #[test]
    fn test_computed_column_removed() {
        let sql = "CREATE TABLE t (a INT, b AS (a * 2) PERSISTED, c INT);";
        let out = apply(sql);
        assert!(!out.contains("PERSISTED"));
        assert!(!out.contains("a * 2"));
        assert!(out.contains("c INT"));
    }

    #[test]
    fn test_identifier_unquoting_order() {
        assert_eq!(unquote_identifiers("[dbo].[T]"), "\"T\"");
        assert_eq!(unquote_identifiers("[dbo].T"), "\"T\"");
        assert_eq!(unquote_identifiers("t.[col]"), "\"col\"");
        assert_eq!(unquote_identifiers("[col]"), "\"col\"");
        assert_eq!(unquote_identifiers("\"dbo\".\"T\""), "\"T\"");
    }

    #[test]
    fn test_quoted_types_unwrapped() {
        let out = normalize_types("\"id\" \"int\" NOT NULL, \"note\" \"nvarchar\" (50)");
        assert!(out.contains("\"id\" int NOT NULL"));
        assert!(out.contains("\"note\" nvarchar (50)"));
    }

    #[test]
    fn test_type_widening() {
        let out = normalize_types("a NVARCHAR(MAX), b VARCHAR ( MAX ), c VARBINARY(MAX), d GEOMETRY, e HIERARCHYID");
        assert!(out.contains("a TEXT"));
        assert!(out.contains("b TEXT"));
        assert!(out.contains("c BLOB"));
        assert!(out.contains("d TEXT"));
        assert!(out.contains("e TEXT"));
    }

    #[test]
    fn test_engine_tail_and_auto_increment() {
        let sql = "CREATE TABLE t (id INT AUTO_INCREMENT) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;";
        let out = apply(sql);
        assert!(!out.contains("ENGINE"));
        assert!(!out.contains("AUTO_INCREMENT"));
        assert!(!out.contains("CHARSET"));
        assert!(out.trim_end().ends_with(");"));
    }

    #[test]
    fn test_on_primary_filegroup() {
        let out = apply("CREATE TABLE t (i INT) ON \"PRIMARY\";");
        assert!(!out.to_uppercase().contains("ON \"PRIMARY\""));
        assert!(out.contains(")"));
    }

    #[test]
    fn test_constraint_line_filter_keeps_primary_and_foreign() {
        let sql = "CREATE TABLE t (\n  id INT,\n  KEY idx_a (id),\n  UNIQUE KEY uq_a (id),\n  CONSTRAINT pk PRIMARY KEY (id),\n  CONSTRAINT fk FOREIGN KEY (id) REFERENCES o (id)\n);";
        let out = apply(sql);
        assert!(!out.contains("idx_a"));
        assert!(!out.contains("uq_a"));
        assert!(out.contains("PRIMARY KEY"));
        assert!(out.contains("FOREIGN KEY"));
    }

    #[test]
    fn test_create_index_gets_table_prefix() {
        let out = apply("CREATE INDEX IX_x ON dbo.MyTable (col);");
        assert!(
            out.contains("CREATE INDEX IF NOT EXISTS \"MyTable_IX_x\" ON MyTable (col);"),
            "got: {out}"
        );
    }

    #[test]
    fn test_create_unique_index_already_prefixed() {
        let out = apply("CREATE UNIQUE INDEX MyTable_ix ON MyTable (col);");
        assert!(out.contains("CREATE UNIQUE INDEX IF NOT EXISTS MyTable_ix ON MyTable (col);"));
    }

    #[test]
    fn test_create_index_idempotent() {
        let once = apply("CREATE INDEX IX_x ON dbo.MyTable (col);");
        assert_eq!(apply(&once), once);
    }

    #[test]
    fn test_drop_index_schema_stripped() {
        let out = apply("DROP INDEX dbo.IX_old;");
        assert!(out.contains("DROP INDEX IF EXISTS IX_old"));
    }

    #[test]
    fn test_drop_table_list_split() {
        let out = apply("DROP TABLE a, dbo.b, c;");
        assert!(out.contains("DROP TABLE IF EXISTS a; DROP TABLE IF EXISTS b; DROP TABLE IF EXISTS c;"));
    }

    #[test]
    fn test_drop_table_idempotent() {
        let once = apply("DROP TABLE a, b;");
        assert_eq!(apply(&once), once);
    }

    #[test]
    fn test_dangling_comma_cleanup() {
        let out = cleanup_syntax("CREATE TABLE t (a INT, );\nX, ;");
        assert!(out.contains("(a INT )"));
        assert!(out.contains("X ;"));
    }
}
