//! SQL dump writer.
//!
//! Output layout:
//!
//! ```text
//! PRAGMA encoding = 'UTF-8';
//! PRAGMA foreign_keys = OFF;
//! DROP TABLE IF EXISTS "posts";
//! CREATE TABLE posts (...);
//! INSERT INTO "posts" VALUES
//! (1, 'Hello'),
//! (2, 'World');
//! CREATE INDEX ...;
//! PRAGMA foreign_keys = ON;
//! ```
//!
//! Every statement ends at a line whose last character is `;`, and no value
//! spans lines, so [`super::restore`] can replay the stream line by line.

use super::restore::SqlScanner;
use crate::error::{Error, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, params};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Rows fetched (and emitted) per `INSERT` statement.
pub const PAGE_SIZE: usize = 500;

/// Statistics from a dump.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DumpStats {
    /// Tables written in full.
    pub tables: usize,
    /// Rows written across all tables.
    pub rows: u64,
    /// Tables skipped because they could not be read.
    pub skipped_tables: Vec<String>,
}

struct TableInfo {
    name: String,
    create_sql: String,
    without_rowid: bool,
}

/// Dump every user table of `conn` to `destination`.
///
/// The dump runs inside one read transaction so all tables come from the
/// same snapshot.
///
/// # Errors
///
/// Returns `Error::DatabaseFile` if `destination` cannot be created, and an
/// I/O error if writing fails partway. Unreadable tables are skipped.
pub fn dump(conn: &Connection, destination: &Path) -> Result<DumpStats> {
    let file = File::create(destination).map_err(|e| {
        Error::DatabaseFile(format!(
            "cannot open {} for writing: {e}",
            destination.display()
        ))
    })?;
    let mut out = BufWriter::new(file);
    let mut stats = DumpStats::default();

    let tx = conn.unchecked_transaction()?;

    writeln!(out, "-- sitepack database dump")?;
    writeln!(out, "PRAGMA encoding = 'UTF-8';")?;
    writeln!(out, "PRAGMA foreign_keys = OFF;")?;
    writeln!(out)?;

    for table in list_tables(&tx)? {
        match dump_table(&tx, &table, &mut out) {
            Ok(rows) => {
                debug!(table = %table.name, rows, "Dumped table");
                stats.tables += 1;
                stats.rows += rows;
            }
            Err(Error::Io(e)) => return Err(Error::Io(e)),
            Err(e) => {
                warn!(table = %table.name, error = %e, "Skipping unreadable table");
                stats.skipped_tables.push(table.name);
            }
        }
    }

    writeln!(out, "PRAGMA foreign_keys = ON;")?;
    out.flush()?;
    drop(tx);

    info!(
        tables = stats.tables,
        rows = stats.rows,
        skipped = stats.skipped_tables.len(),
        "Database dump complete"
    );
    Ok(stats)
}

fn list_tables(conn: &Connection) -> Result<Vec<TableInfo>> {
    let mut stmt = conn.prepare(
        "SELECT name, sql FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND sql IS NOT NULL
         ORDER BY name",
    )?;

    let tables = stmt
        .query_map([], |row| {
            let name: String = row.get(0)?;
            let create_sql: String = row.get(1)?;
            Ok((name, create_sql))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(tables
        .into_iter()
        .map(|(name, create_sql)| {
            let without_rowid = is_without_rowid(&create_sql);
            TableInfo {
                name,
                create_sql,
                without_rowid,
            }
        })
        .collect())
}

// Table options follow the closing parenthesis of the column list.
fn is_without_rowid(create_sql: &str) -> bool {
    let options = create_sql.rsplit_once(')').map_or("", |(_, tail)| tail);
    options
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
        .contains("WITHOUT ROWID")
}

fn dump_table(conn: &Connection, table: &TableInfo, out: &mut impl Write) -> Result<u64> {
    let ident = quote_ident(&table.name);

    // Read everything that can fail cheaply before writing a byte.
    let expected: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {ident}"), [], |row| {
        row.get(0)
    })?;
    let indexes = table_indexes(conn, &table.name)?;
    let order = if table.without_rowid { "" } else { " ORDER BY rowid" };
    let mut stmt = conn.prepare(&format!("SELECT * FROM {ident}{order} LIMIT ? OFFSET ?"))?;
    let columns = stmt.column_count();

    writeln!(out, "DROP TABLE IF EXISTS {ident};")?;
    writeln!(out, "{};", schema_statement(&table.create_sql))?;

    let mut written: u64 = 0;
    let mut offset: usize = 0;
    loop {
        let mut rows = stmt.query(params![PAGE_SIZE as i64, offset as i64])?;
        let mut page: Vec<String> = Vec::with_capacity(PAGE_SIZE);

        while let Some(row) = rows.next()? {
            let mut tuple = String::from("(");
            for i in 0..columns {
                if i > 0 {
                    tuple.push_str(", ");
                }
                tuple.push_str(&sql_value(row.get_ref(i)?));
            }
            tuple.push(')');
            page.push(tuple);
        }

        if page.is_empty() {
            break;
        }

        writeln!(out, "INSERT INTO {ident} VALUES")?;
        writeln!(out, "{};", page.join(",\n"))?;
        written += page.len() as u64;

        if page.len() < PAGE_SIZE {
            break;
        }
        offset += PAGE_SIZE;
    }

    for index_sql in indexes {
        writeln!(out, "{};", schema_statement(&index_sql))?;
    }
    writeln!(out)?;

    if i64::try_from(written).ok() != Some(expected) {
        warn!(table = %table.name, expected, written, "Row count changed during dump");
    }

    Ok(written)
}

fn table_indexes(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT sql FROM sqlite_master
         WHERE type = 'index' AND tbl_name = ?1 AND sql IS NOT NULL
         ORDER BY name",
    )?;
    let indexes = stmt
        .query_map([table], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(indexes)
}

/// Quote an identifier with double quotes, doubling embedded quotes.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render one column value as a SQL literal.
#[must_use]
pub fn sql_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => real_literal(f),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            if is_numeric_text(&text) {
                text.into_owned()
            } else {
                quote_text(&text)
            }
        }
        ValueRef::Blob(bytes) => {
            let mut hex = String::with_capacity(bytes.len() * 2 + 3);
            hex.push_str("X'");
            for b in bytes {
                let _ = write!(hex, "{b:02X}");
            }
            hex.push('\'');
            hex
        }
    }
}

fn real_literal(f: f64) -> String {
    if f.is_nan() {
        "NULL".to_string()
    } else if f == f64::INFINITY {
        "9e999".to_string()
    } else if f == f64::NEG_INFINITY {
        "-9e999".to_string()
    } else {
        // Debug keeps a fractional part or exponent, so the value reads back as REAL.
        format!("{f:?}")
    }
}

/// Whether text may be emitted unquoted.
///
/// Only canonical base-10 integers that fit in an `i64` qualify: SQLite
/// stores those back byte-identical in a TEXT column. Leading zeros
/// (`007`), signs on zero, fractions and exponents all stay quoted.
#[must_use]
pub fn is_numeric_text(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if digits.starts_with('0') && (digits.len() > 1 || text.starts_with('-')) {
        return false;
    }
    text.parse::<i64>().is_ok()
}

/// Schema SQL as stored by SQLite, minus comments and any trailing `;`.
///
/// Without comments no line can end in a `;` that does not end the
/// statement, and the appended terminator never lands inside a `--` tail.
fn schema_statement(sql: &str) -> String {
    let mut scanner = SqlScanner::default();
    let mut lines: Vec<String> = Vec::new();
    for line in sql.lines() {
        let continues_literal = scanner.in_quote();
        let code = scanner.code(line);
        if scanner.in_quote() {
            lines.push(code);
        } else if continues_literal || !code.trim().is_empty() {
            lines.push(code.trim_end().to_string());
        }
    }
    lines.join("\n").trim_end().trim_end_matches(';').to_string()
}

/// Quote text as a single-line SQL string literal.
///
/// Embedded `'` are doubled. Line breaks are spliced in with `char(10)` and
/// `char(13)` so the literal never spans lines.
#[must_use]
pub fn quote_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for ch in text.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\n' => out.push_str("' || char(10) || '"),
            '\r' => out.push_str("' || char(13) || '"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dump_to_string(conn: &Connection) -> (String, DumpStats) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("database.sql");
        let stats = dump(conn, &path).unwrap();
        (std::fs::read_to_string(&path).unwrap(), stats)
    }

    #[test]
    fn test_framing_and_table_order() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE zeta (id INTEGER PRIMARY KEY);
             CREATE TABLE alpha (id INTEGER PRIMARY KEY);",
        )
        .unwrap();

        let (sql, stats) = dump_to_string(&conn);

        let lines: Vec<&str> = sql.lines().collect();
        assert_eq!(lines[1], "PRAGMA encoding = 'UTF-8';");
        assert_eq!(lines[2], "PRAGMA foreign_keys = OFF;");
        assert_eq!(lines.last().copied(), Some("PRAGMA foreign_keys = ON;"));
        assert!(sql.find("DROP TABLE IF EXISTS \"alpha\";").unwrap()
            < sql.find("DROP TABLE IF EXISTS \"zeta\";").unwrap());
        assert_eq!(stats.tables, 2);
        assert_eq!(stats.rows, 0);
        assert!(!sql.contains("INSERT INTO"));
    }

    #[test]
    fn test_pages_of_500_preserve_order() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (n INTEGER)").unwrap();
        for n in 0..1201 {
            conn.execute("INSERT INTO t (n) VALUES (?1)", [n]).unwrap();
        }

        let (sql, stats) = dump_to_string(&conn);

        assert_eq!(sql.matches("INSERT INTO \"t\" VALUES").count(), 3);
        assert_eq!(stats.rows, 1201);

        let values: Vec<i64> = sql
            .lines()
            .filter(|l| l.starts_with('('))
            .map(|l| {
                l.trim_start_matches('(')
                    .trim_end_matches([',', ';'])
                    .trim_end_matches(')')
                    .parse()
                    .unwrap()
            })
            .collect();
        assert_eq!(values, (0..1201).collect::<Vec<_>>());
    }

    #[test]
    fn test_value_rendering() {
        assert_eq!(sql_value(ValueRef::Null), "NULL");
        assert_eq!(sql_value(ValueRef::Integer(-42)), "-42");
        assert_eq!(sql_value(ValueRef::Real(1.5)), "1.5");
        assert_eq!(sql_value(ValueRef::Real(3.0)), "3.0");
        assert_eq!(sql_value(ValueRef::Text(b"123")), "123");
        assert_eq!(sql_value(ValueRef::Text(b"007")), "'007'");
        assert_eq!(sql_value(ValueRef::Text(b"1.50")), "'1.50'");
        assert_eq!(sql_value(ValueRef::Text(b"it's")), "'it''s'");
        assert_eq!(sql_value(ValueRef::Blob(&[0x00, 0xAB])), "X'00AB'");
    }

    #[test]
    fn test_numeric_text_rule() {
        assert!(is_numeric_text("0"));
        assert!(is_numeric_text("-17"));
        assert!(is_numeric_text("9223372036854775807"));
        assert!(!is_numeric_text("9223372036854775808"));
        assert!(!is_numeric_text("00"));
        assert!(!is_numeric_text("0123"));
        assert!(!is_numeric_text("-0"));
        assert!(!is_numeric_text("+5"));
        assert!(!is_numeric_text(" 5"));
        assert!(!is_numeric_text("1e3"));
        assert!(!is_numeric_text("0x1F"));
        assert!(!is_numeric_text(""));
    }

    #[test]
    fn test_newlines_never_split_a_line() {
        assert_eq!(quote_text("a\nb"), "'a' || char(10) || 'b'");
        assert_eq!(quote_text("x\r\n"), "'x' || char(13) || '' || char(10) || ''");
    }

    #[test]
    fn test_indexes_emitted_after_rows() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT UNIQUE);
             CREATE INDEX idx_users_email ON users (email);
             INSERT INTO users (email) VALUES ('a@example.com');",
        )
        .unwrap();

        let (sql, _) = dump_to_string(&conn);

        let insert = sql.find("INSERT INTO \"users\"").unwrap();
        let index = sql.find("CREATE INDEX idx_users_email").unwrap();
        assert!(index > insert);
        // Automatic indexes have no SQL and are recreated by CREATE TABLE.
        assert!(!sql.contains("sqlite_autoindex"));
    }

    #[test]
    fn test_schema_comments_are_stripped() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE notes (
                id INTEGER PRIMARY KEY, /* surrogate
                   key; never reused */
                body TEXT DEFAULT '-- not a comment;' -- free text;
             );
             CREATE INDEX idx_notes_body ON notes (body) -- lookup;
             ;",
        )
        .unwrap();

        let (sql, _) = dump_to_string(&conn);

        assert!(!sql.contains("surrogate"));
        assert!(!sql.contains("free text"));
        assert!(!sql.contains("lookup"));
        assert!(sql.contains("DEFAULT '-- not a comment;'"));
        assert!(sql.contains("CREATE INDEX idx_notes_body ON notes (body);"));

        let target = Connection::open_in_memory().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("database.sql");
        std::fs::write(&path, &sql).unwrap();
        let stats = crate::storage::restore::restore(&target, &path).unwrap();
        assert_eq!(stats.failed, 0);
        target.execute("INSERT INTO notes (id) VALUES (1)", []).unwrap();
        let body: String = target
            .query_row("SELECT body FROM notes", [], |r| r.get(0))
            .unwrap();
        assert_eq!(body, "-- not a comment;");
    }

    #[test]
    fn test_without_rowid_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT) WITHOUT ROWID;
             INSERT INTO kv VALUES ('b', '2'), ('a', '1');",
        )
        .unwrap();

        let (sql, stats) = dump_to_string(&conn);

        assert_eq!(stats.rows, 2);
        assert!(stats.skipped_tables.is_empty());
        assert!(sql.contains("('a', 1)"));
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn test_unwritable_destination() {
        let conn = Connection::open_in_memory().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let err = dump(&conn, &temp_dir.path().join("missing").join("db.sql")).unwrap_err();
        assert!(matches!(err, Error::DatabaseFile(_)));
    }
}
