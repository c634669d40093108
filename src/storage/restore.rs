//! SQL statement stream replay.

use crate::error::{Error, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

/// Statistics from a restore.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RestoreStats {
    /// Statements that executed successfully.
    pub executed: usize,
    /// Statements that failed and were skipped.
    pub failed: usize,
}

/// Replay the statements in `source` against `conn`.
///
/// Lines are read one at a time. `--` and `/* ... */` comments outside quoted
/// text are dropped, including block comments spanning lines, and lines left
/// blank are skipped. Other lines are buffered until one ends with `;`
/// outside any quote or comment, and the buffer is then executed as one
/// statement. A failing statement is logged and counted; the replay continues
/// and nothing is rolled back.
///
/// # Errors
///
/// Returns `Error::DatabaseFile` if `source` cannot be opened, or an I/O error
/// if reading fails partway.
pub fn restore(conn: &Connection, source: &Path) -> Result<RestoreStats> {
    let file = File::open(source).map_err(|e| {
        Error::DatabaseFile(format!("cannot open {} for reading: {e}", source.display()))
    })?;
    let reader = BufReader::new(file);

    let mut stats = RestoreStats::default();
    let mut scanner = SqlScanner::default();
    let mut buffer = String::new();

    for line in reader.lines() {
        let line = line?;
        let code = scanner.code(&line);

        if buffer.is_empty() && code.trim().is_empty() {
            continue;
        }

        buffer.push_str(&code);
        buffer.push('\n');

        if scanner.is_idle() && code.trim_end().ends_with(';') {
            execute(conn, &buffer, &mut stats);
            buffer.clear();
        }
    }

    if !buffer.trim().is_empty() {
        debug!("Executing unterminated trailing statement");
        execute(conn, &buffer, &mut stats);
    }

    info!(
        executed = stats.executed,
        failed = stats.failed,
        "Database restore complete"
    );
    Ok(stats)
}

/// Line-by-line SQL lexer state: open quote and open block comment carry
/// over from one line to the next.
#[derive(Debug, Default)]
pub(crate) struct SqlScanner {
    // Closing character of the open quote.
    quote: Option<char>,
    in_block_comment: bool,
}

impl SqlScanner {
    /// Return `line` with comments removed. Quoted text is kept verbatim.
    pub(crate) fn code(&mut self, line: &str) -> String {
        let mut out = String::with_capacity(line.len());
        let mut chars = line.chars().peekable();

        while let Some(c) = chars.next() {
            if self.in_block_comment {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    self.in_block_comment = false;
                    out.push(' ');
                }
                continue;
            }
            if let Some(close) = self.quote {
                out.push(c);
                // A doubled quote closes and reopens, which reads the same.
                if c == close {
                    self.quote = None;
                }
                continue;
            }
            match c {
                '\'' | '"' | '`' => {
                    self.quote = Some(c);
                    out.push(c);
                }
                '[' => {
                    self.quote = Some(']');
                    out.push(c);
                }
                '-' if chars.peek() == Some(&'-') => break,
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    self.in_block_comment = true;
                }
                _ => out.push(c),
            }
        }
        out
    }

    /// Whether the scan is outside any quote or block comment.
    pub(crate) fn is_idle(&self) -> bool {
        self.quote.is_none() && !self.in_block_comment
    }

    pub(crate) fn in_quote(&self) -> bool {
        self.quote.is_some()
    }
}

fn execute(conn: &Connection, statement: &str, stats: &mut RestoreStats) {
    match conn.execute_batch(statement) {
        Ok(()) => stats.executed += 1,
        Err(e) => {
            stats.failed += 1;
            warn!(
                error = %e,
                statement = %preview(statement),
                "Statement failed during restore"
            );
        }
    }
}

fn preview(statement: &str) -> String {
    let first_line = statement.lines().next().unwrap_or_default();
    if first_line.chars().count() > 120 {
        let cut: String = first_line.chars().take(120).collect();
        format!("{cut}...")
    } else {
        first_line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::dump::dump;
    use tempfile::TempDir;

    fn write_sql(dir: &TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("database.sql");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_skips_comments_and_blank_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_sql(
            &temp_dir,
            "-- header\n\n/* block */\nCREATE TABLE t (x);\nINSERT INTO t VALUES\n(1),\n(2);\n",
        );
        let conn = Connection::open_in_memory().unwrap();

        let stats = restore(&conn, &path).unwrap();

        assert_eq!(stats.executed, 2);
        assert_eq!(stats.failed, 0);
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_multi_line_block_comment_inside_statement() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_sql(
            &temp_dir,
            "CREATE TABLE notes (\n    id INTEGER PRIMARY KEY, /* surrogate\n       key; never reused */\n    body TEXT -- free text; may be empty\n);\nINSERT INTO notes (body) VALUES ('kept');\n",
        );
        let conn = Connection::open_in_memory().unwrap();

        let stats = restore(&conn, &path).unwrap();

        assert_eq!(stats.failed, 0);
        assert_eq!(stats.executed, 2);
        let body: String = conn.query_row("SELECT body FROM notes", [], |r| r.get(0)).unwrap();
        assert_eq!(body, "kept");
    }

    #[test]
    fn test_comment_markers_inside_quotes_are_text() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_sql(
            &temp_dir,
            "CREATE TABLE \"a--b\" (v TEXT);\nINSERT INTO \"a--b\" VALUES ('x -- y; /* z */');\nINSERT INTO \"a--b\" VALUES ('it''s -- fine');\n",
        );
        let conn = Connection::open_in_memory().unwrap();

        let stats = restore(&conn, &path).unwrap();

        assert_eq!(stats.failed, 0);
        let values: Vec<String> = conn
            .prepare("SELECT v FROM \"a--b\" ORDER BY rowid")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .map(std::result::Result::unwrap)
            .collect();
        assert_eq!(values, vec!["x -- y; /* z */", "it's -- fine"]);
    }

    #[test]
    fn test_scanner_carries_state_across_lines() {
        let mut scanner = SqlScanner::default();

        assert_eq!(scanner.code("a /* one"), "a ");
        assert!(!scanner.is_idle());
        assert_eq!(scanner.code("two; */ b;"), "  b;");
        assert!(scanner.is_idle());

        assert_eq!(scanner.code("x = 'multi"), "x = 'multi");
        assert!(scanner.in_quote());
        assert_eq!(scanner.code("-- line';"), "-- line';");
        assert!(scanner.is_idle());
    }

    #[test]
    fn test_failed_statement_does_not_stop_restore() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_sql(
            &temp_dir,
            "CREATE TABLE t (x);\nINSERT INTO missing VALUES (1);\nINSERT INTO t VALUES (3);\n",
        );
        let conn = Connection::open_in_memory().unwrap();

        let stats = restore(&conn, &path).unwrap();

        assert_eq!(stats.executed, 2);
        assert_eq!(stats.failed, 1);
        let x: i64 = conn.query_row("SELECT x FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(x, 3);
    }

    #[test]
    fn test_trailing_statement_without_semicolon() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_sql(&temp_dir, "CREATE TABLE t (x);\nINSERT INTO t VALUES (9)");
        let conn = Connection::open_in_memory().unwrap();

        let stats = restore(&conn, &path).unwrap();

        assert_eq!(stats.executed, 2);
        let x: i64 = conn.query_row("SELECT x FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(x, 9);
    }

    #[test]
    fn test_missing_source_is_database_file_error() {
        let temp_dir = TempDir::new().unwrap();
        let conn = Connection::open_in_memory().unwrap();
        let err = restore(&conn, &temp_dir.path().join("none.sql")).unwrap_err();
        assert!(matches!(err, Error::DatabaseFile(_)));
    }

    #[test]
    fn test_dump_restore_round_trip() {
        let source = Connection::open_in_memory().unwrap();
        source
            .execute_batch(
                "CREATE TABLE posts (
                    id INTEGER PRIMARY KEY,
                    title TEXT NOT NULL,
                    zip TEXT,
                    score REAL,
                    body TEXT,
                    thumb BLOB
                 );
                 CREATE INDEX idx_posts_title ON posts (title);
                 CREATE TABLE \"odd \"\"name\" (v TEXT);
                 INSERT INTO \"odd \"\"name\" VALUES ('x');",
            )
            .unwrap();
        source
            .execute(
                "INSERT INTO posts (title, zip, score, body, thumb) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params!["It's; done", "00501", 2.5, "line one\nline two;\r\n", vec![0u8, 1, 255]],
            )
            .unwrap();
        source
            .execute(
                "INSERT INTO posts (title, zip, score, body, thumb) VALUES ('42', NULL, NULL, '', NULL)",
                [],
            )
            .unwrap();
        let unicode = "Ünïcødé — 日本語 🚀";
        source
            .execute(
                "INSERT INTO posts (title, zip, score, body, thumb) VALUES (?1, NULL, NULL, ?2, NULL)",
                rusqlite::params![unicode, "naïve\ncafé 🚀"],
            )
            .unwrap();

        let temp_dir = TempDir::new().unwrap();
        let sql_path = temp_dir.path().join("database.sql");
        dump(&source, &sql_path).unwrap();

        let target = Connection::open_in_memory().unwrap();
        target.execute_batch("CREATE TABLE posts (stale INTEGER)").unwrap();
        let stats = restore(&target, &sql_path).unwrap();
        assert_eq!(stats.failed, 0);

        type Row = (i64, String, Option<String>, Option<f64>, String, Option<Vec<u8>>);
        let read = |conn: &Connection| -> Vec<Row> {
            let mut stmt = conn
                .prepare("SELECT id, title, zip, score, body, thumb FROM posts ORDER BY id")
                .unwrap();
            stmt.query_map([], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
            })
            .unwrap()
            .map(std::result::Result::unwrap)
            .collect()
        };
        assert_eq!(read(&source), read(&target));
        let restored: Vec<u8> = target
            .query_row("SELECT CAST(title AS BLOB) FROM posts WHERE id = 3", [], |r| r.get(0))
            .unwrap();
        assert_eq!(restored, unicode.as_bytes());

        let index: i64 = target
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_posts_title'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(index, 1);

        let odd: String = target
            .query_row("SELECT v FROM \"odd \"\"name\"", [], |r| r.get(0))
            .unwrap();
        assert_eq!(odd, "x");
    }
}
