//! End-to-end tests: sanitize dialect samples, then execute the result
//! against an in-memory SQLite connection and inspect what was built.

use rusqlite::Connection;
use sql_sanitizer::sanitizer::sanitize;

fn execute(sql: &str) -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    let script = sanitize(sql);
    conn.execute_batch(&script)
        .unwrap_or_else(|e| panic!("sanitized script failed: {e}\n--- script ---\n{script}"));
    conn
}

fn table_info(conn: &Connection, table: &str) -> Vec<(i64, String, String, i64)> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info(\"{table}\")"))
        .unwrap();
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(5)?))
        })
        .unwrap();
    rows.map(|r| r.unwrap()).collect()
}

#[test]
fn test_mssql_identity_table_executes() {
    let conn = execute(
        "CREATE TABLE [dbo].[T] ([id] INT IDENTITY(1,1) PRIMARY KEY, [name] NVARCHAR(MAX));",
    );
    let info = table_info(&conn, "T");
    assert_eq!(info.len(), 2);
    assert_eq!(info[0].1, "id");
    assert_eq!(info[0].2.to_uppercase(), "INT");
    assert_eq!(info[0].3, 1, "id should be the primary key");
    assert_eq!(info[1].1, "name");
    assert_eq!(info[1].2.to_uppercase(), "TEXT");
    assert_eq!(info[1].3, 0);
}

#[test]
fn test_bracket_class_check_table_executes() {
    let conn = execute("CREATE TABLE X (s CHAR(2), CONSTRAINT ck CHECK (s LIKE '[FM]'));");
    conn.execute("INSERT INTO X VALUES ('ZZ')", []).unwrap();
    let n: i64 = conn
        .query_row("SELECT count(*) FROM X", [], |r| r.get(0))
        .unwrap();
    assert_eq!(n, 1);
}

#[test]
fn test_only_table_batch_survives_go_script() {
    let conn = execute("SET NOCOUNT ON\nGO\nCREATE TABLE A (i INT);\nGO\nCREATE PROCEDURE p AS SELECT 1;\nGO");
    let tables: i64 = conn
        .query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(tables, 1);
    let name: String = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(name, "A");
}

#[test]
fn test_convert_rewrites_execute() {
    let conn = execute(
        "CREATE TABLE t (d DATETIME);\nINSERT INTO t VALUES ('2024-03-01 10:00:00');",
    );
    let script = sanitize("SELECT CONVERT(VARCHAR(10), d, 120) FROM t;");
    assert!(script.contains("CAST(d AS VARCHAR(10))"), "got: {script}");
    // SQLite ignores the VARCHAR length in CAST, so the full text comes back.
    let value: String = conn
        .query_row(script.trim_end_matches(|c| c == '\n' || c == ';'), [], |r| r.get(0))
        .unwrap();
    assert_eq!(value, "2024-03-01 10:00:00");
}

#[test]
fn test_index_canonicalization_executes_after_table_exists() {
    let conn = execute(
        "CREATE TABLE [dbo].[MyTable] ([col] INT);\nGO\nCREATE NONCLUSTERED INDEX IX_x ON dbo.MyTable (col);\nGO",
    );
    let idx: String = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'index'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(idx, "MyTable_IX_x");
}

#[test]
fn test_hex_unicode_and_function_rewrites_execute() {
    let conn = execute(
        "CREATE TABLE t (b BLOB, s TEXT, ts TEXT, u TEXT);\nINSERT INTO t VALUES (0xDEAD, N'héllo', getdate(), newid());",
    );
    let (blob, s, u): (Vec<u8>, String, String) = conn
        .query_row("SELECT b, s, u FROM t", [], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?))
        })
        .unwrap();
    assert_eq!(blob, vec![0xDE, 0xAD]);
    assert_eq!(s, "héllo");
    // version-4-shaped UUID: 8-4-4-4-12 hex digits
    let parts: Vec<&str> = u.split('-').collect();
    assert_eq!(parts.len(), 5);
    assert_eq!(
        parts.iter().map(|p| p.len()).collect::<Vec<_>>(),
        vec![8, 4, 4, 4, 12]
    );
    assert!(parts[2].starts_with('4'));
}

#[test]
fn test_mysql_dump_executes_with_row_counts() {
    let sql = "# MySQL-style header\nCREATE DATABASE shop;\nUSE shop;\nDROP TABLE IF EXISTS t;\nCREATE TABLE t (\n  id INT AUTO_INCREMENT,\n  name VARCHAR(50),\n  PRIMARY KEY (id)\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;\nLOCK TABLES t WRITE;\nINSERT INTO t VALUES (1, 'a'), (2, 'b'), (3, 'c');\nUNLOCK TABLES;\n";
    let conn = execute(sql);
    let n: i64 = conn
        .query_row("SELECT count(*) FROM t", [], |r| r.get(0))
        .unwrap();
    assert_eq!(n, 3);
}

#[test]
fn test_round_trip_preserves_column_names() {
    let sql = "CREATE TABLE [dbo].[Wide] (\n  [a] INT IDENTITY(1,1),\n  [b] NVARCHAR(MAX),\n  [c] VARBINARY(MAX),\n  [d] GEOMETRY,\n  [e] MONEY\n);";
    let conn = execute(sql);
    let info = table_info(&conn, "Wide");
    let names: Vec<&str> = info.iter().map(|r| r.1.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
    let types: Vec<String> = info.iter().map(|r| r.2.to_uppercase()).collect();
    assert_eq!(types[1], "TEXT");
    assert_eq!(types[2], "BLOB");
    assert_eq!(types[3], "TEXT");
}

#[test]
fn test_temporal_table_clauses_stripped_and_executes() {
    let sql = "CREATE TABLE [dbo].[Versioned] (\n  [id] INT NOT NULL,\n  [vf] DATETIME NOT NULL,\n  [vt] DATETIME NOT NULL,\n  PERIOD FOR SYSTEM_TIME ([vf], [vt])\n) WITH (SYSTEM_VERSIONING = ON);";
    let conn = execute(sql);
    let info = table_info(&conn, "Versioned");
    let names: Vec<&str> = info.iter().map(|r| r.1.as_str()).collect();
    assert_eq!(names, vec!["id", "vf", "vt"]);
}
