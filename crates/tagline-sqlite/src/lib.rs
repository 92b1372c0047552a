//! SQLite implementation of the tagline backend contract.
//!
//! A local notes database where tag usage is derived from `#hashtag` tokens
//! in note bodies. Rebuild re-derives every association from current note
//! content; delete removes associations but leaves bodies alone (a later
//! rebuild re-derives the tag from any remaining tokens); rename rewrites
//! both associations and bodies.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use tagline_core::{Error, TagService};

mod migrations;

use migrations::{get_pending_migrations, SCHEMA_VERSION};

/// `#hashtag` token: `#` followed by a letter, digit or underscore, then any
/// run of those plus `/` and `-` (nested tags like `work/projects` allowed).
const HASHTAG_PATTERN: &str = r"#([\p{L}\p{N}_][\p{L}\p{N}_/-]*)";

/// SQLite-backed notes database implementing [`TagService`].
pub struct SqliteTagService {
    conn: Mutex<Connection>,
}

impl SqliteTagService {
    /// Open a database at the given path and run any pending migrations.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(db_err)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database and run migrations.
    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(db_err)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run any pending database migrations.
    pub fn run_migrations(&self) -> Result<(), Error> {
        let conn = self.conn.lock().unwrap();

        // Ensure _tagline_meta table exists
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _tagline_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .map_err(db_err)?;

        // Get current schema version
        let current_version: i64 = conn
            .query_row(
                "SELECT value FROM _tagline_meta WHERE key = 'schema_version'",
                [],
                |row| {
                    let val: String = row.get(0)?;
                    Ok(val.parse().unwrap_or(0))
                },
            )
            .unwrap_or(0);

        // Already up to date
        if current_version >= SCHEMA_VERSION {
            return Ok(());
        }

        // Run pending migrations
        for migration in get_pending_migrations(current_version) {
            for statement in migration.statements {
                // Skip _tagline_meta creation (already done above)
                if statement.contains("_tagline_meta") {
                    continue;
                }
                // ALTER TABLE doesn't support IF NOT EXISTS, so ignore errors for those
                if statement.starts_with("ALTER TABLE") {
                    let _ = conn.execute(statement, []);
                } else {
                    conn.execute(statement, []).map_err(|e| {
                        Error::BackendUnavailable(format!(
                            "migration {} failed: {}",
                            migration.name, e
                        ))
                    })?;
                }
            }
        }

        // Update schema version
        conn.execute(
            "INSERT OR REPLACE INTO _tagline_meta (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )
        .map_err(db_err)?;

        Ok(())
    }

    /// Add a note and record the tag associations derived from its body.
    /// Returns the note's ID.
    pub fn add_note(&self, body: &str) -> Result<i64, Error> {
        let conn = self.conn.lock().unwrap();

        conn.execute("INSERT INTO notes (body) VALUES (?1)", params![body])
            .map_err(db_err)?;
        let note_id = conn.last_insert_rowid();

        for tag in extract_hashtags(&hashtag_regex()?, body) {
            conn.execute(
                "INSERT OR IGNORE INTO note_tags (note_id, tag) VALUES (?1, ?2)",
                params![note_id, tag],
            )
            .map_err(db_err)?;
        }

        Ok(note_id)
    }

    /// Remove a note by ID. Associations go with it (cascade). Returns true
    /// if a note was removed.
    pub fn remove_note(&self, id: i64) -> Result<bool, Error> {
        let conn = self.conn.lock().unwrap();
        let rows = conn
            .execute("DELETE FROM notes WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(rows > 0)
    }

    /// Body of a note, if it exists.
    pub fn note_body(&self, id: i64) -> Result<Option<String>, Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT body FROM notes WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)
    }

    /// Number of notes in the collection. Feed this to the session's size
    /// signal after note mutations.
    pub fn note_count(&self) -> Result<i64, Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))
            .map_err(db_err)
    }
}

#[async_trait::async_trait]
impl TagService for SqliteTagService {
    async fn list_tags(
        &self,
        _parent: &str,
        _skip_cache: bool,
    ) -> Result<HashMap<String, i64>, Error> {
        // The local backend serves one collection and keeps no cache; both
        // parameters are accepted for contract parity.
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(
                "SELECT tag, COUNT(note_id) as count
                 FROM note_tags
                 GROUP BY tag
                 HAVING count > 0",
            )
            .map_err(db_err)?;

        let tags = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(db_err)?
            .collect::<Result<HashMap<_, _>, _>>()
            .map_err(db_err)?;

        Ok(tags)
    }

    async fn rebuild_tags(&self, _parent: &str) -> Result<(), Error> {
        let regex = hashtag_regex()?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;

        tx.execute("DELETE FROM note_tags", []).map_err(db_err)?;

        let notes: Vec<(i64, String)> = {
            let mut stmt = tx.prepare("SELECT id, body FROM notes").map_err(db_err)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;
            rows
        };

        let note_count = notes.len();
        for (note_id, body) in notes {
            for tag in extract_hashtags(&regex, &body) {
                tx.execute(
                    "INSERT OR IGNORE INTO note_tags (note_id, tag) VALUES (?1, ?2)",
                    params![note_id, tag],
                )
                .map_err(db_err)?;
            }
        }

        tx.commit().map_err(db_err)?;
        debug!(notes = note_count, "tag index rebuilt from note content");
        Ok(())
    }

    async fn delete_tag(&self, _parent: &str, tag: &str) -> Result<(), Error> {
        let conn = self.conn.lock().unwrap();
        let rows = conn
            .execute("DELETE FROM note_tags WHERE tag = ?1", params![tag])
            .map_err(db_err)?;
        if rows == 0 {
            return Err(Error::BackendRejected(format!("unknown tag \"{}\"", tag)));
        }
        debug!(tag, notes = rows, "tag associations removed");
        Ok(())
    }

    async fn rename_tag(&self, _parent: &str, old: &str, new: &str) -> Result<(), Error> {
        let regex = hashtag_regex()?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;

        let notes: Vec<(i64, String)> = {
            let mut stmt = tx
                .prepare(
                    "SELECT n.id, n.body FROM notes n
                     JOIN note_tags nt ON nt.note_id = n.id
                     WHERE nt.tag = ?1",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![old], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;
            rows
        };

        if notes.is_empty() {
            return Err(Error::BackendRejected(format!("unknown tag \"{}\"", old)));
        }

        let note_count = notes.len();
        for (note_id, body) in notes {
            let rewritten = rewrite_hashtag(&regex, &body, old, new);
            tx.execute(
                "UPDATE notes SET body = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![rewritten, note_id],
            )
            .map_err(db_err)?;
            tx.execute(
                "INSERT OR IGNORE INTO note_tags (note_id, tag) VALUES (?1, ?2)",
                params![note_id, new],
            )
            .map_err(db_err)?;
        }
        tx.execute("DELETE FROM note_tags WHERE tag = ?1", params![old])
            .map_err(db_err)?;

        tx.commit().map_err(db_err)?;
        debug!(old, new, notes = note_count, "tag renamed across notes");
        Ok(())
    }
}

fn db_err(e: rusqlite::Error) -> Error {
    Error::BackendUnavailable(e.to_string())
}

fn hashtag_regex() -> Result<Regex, Error> {
    Regex::new(HASHTAG_PATTERN)
        .map_err(|e| Error::BackendUnavailable(format!("invalid hashtag pattern: {}", e)))
}

/// Distinct hashtags in a note body, in order of first appearance.
fn extract_hashtags(regex: &Regex, body: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for caps in regex.captures_iter(body) {
        let tag = &caps[1];
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

/// Replace `#old` tokens with `#new`, leaving other text untouched.
fn rewrite_hashtag(regex: &Regex, body: &str, old: &str, new: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut last = 0;
    for caps in regex.captures_iter(body) {
        let m = caps.get(0).expect("whole match");
        if &caps[1] == old {
            out.push_str(&body[last..m.start()]);
            out.push('#');
            out.push_str(new);
            last = m.end();
        }
    }
    out.push_str(&body[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagline_core::ALL_NOTES;

    fn db() -> SqliteTagService {
        SqliteTagService::open_in_memory().unwrap()
    }

    #[test]
    fn test_extract_hashtags() {
        let regex = hashtag_regex().unwrap();
        assert_eq!(
            extract_hashtags(&regex, "plan #work then #work/projects, maybe #2026."),
            vec!["work", "work/projects", "2026"]
        );
        assert_eq!(extract_hashtags(&regex, "no tags here # or #."), Vec::<String>::new());
        assert_eq!(extract_hashtags(&regex, "#dup #dup"), vec!["dup"]);
    }

    #[test]
    fn test_rewrite_hashtag_only_touches_exact_tag() {
        let regex = hashtag_regex().unwrap();
        let body = "see #work and #work/projects and #homework";
        assert_eq!(
            rewrite_hashtag(&regex, body, "work", "job"),
            "see #job and #work/projects and #homework"
        );
    }

    #[tokio::test]
    async fn test_list_tags_counts_notes_per_tag() {
        let db = db();
        db.add_note("#a first").unwrap();
        db.add_note("#a and #b").unwrap();

        let tags = db.list_tags(ALL_NOTES, false).await.unwrap();
        assert_eq!(tags.get("a"), Some(&2));
        assert_eq!(tags.get("b"), Some(&1));
    }

    #[tokio::test]
    async fn test_duplicate_tag_in_one_note_counts_once() {
        let db = db();
        db.add_note("#a again #a").unwrap();

        let tags = db.list_tags(ALL_NOTES, false).await.unwrap();
        assert_eq!(tags.get("a"), Some(&1));
    }

    #[tokio::test]
    async fn test_removing_note_drops_its_associations() {
        let db = db();
        let id = db.add_note("#only").unwrap();
        assert!(db.remove_note(id).unwrap());

        let tags = db.list_tags(ALL_NOTES, false).await.unwrap();
        assert!(tags.is_empty());
    }

    #[tokio::test]
    async fn test_delete_tag_leaves_body_for_rebuild() {
        let db = db();
        let id = db.add_note("#keep me around").unwrap();

        db.delete_tag(ALL_NOTES, "keep").await.unwrap();
        assert!(db.list_tags(ALL_NOTES, false).await.unwrap().is_empty());

        // Body still carries the token, so a rebuild re-derives the tag.
        assert_eq!(db.note_body(id).unwrap().unwrap(), "#keep me around");
        db.rebuild_tags(ALL_NOTES).await.unwrap();
        let tags = db.list_tags(ALL_NOTES, false).await.unwrap();
        assert_eq!(tags.get("keep"), Some(&1));
    }

    #[tokio::test]
    async fn test_delete_unknown_tag_rejected() {
        let db = db();
        let err = db.delete_tag(ALL_NOTES, "ghost").await.unwrap_err();
        assert!(matches!(err, Error::BackendRejected(_)));
    }

    #[tokio::test]
    async fn test_rename_rewrites_bodies_and_associations() {
        let db = db();
        let id = db.add_note("todo #old stuff").unwrap();
        db.add_note("already #new").unwrap();

        db.rename_tag(ALL_NOTES, "old", "new").await.unwrap();

        assert_eq!(db.note_body(id).unwrap().unwrap(), "todo #new stuff");
        let tags = db.list_tags(ALL_NOTES, false).await.unwrap();
        assert_eq!(tags.get("new"), Some(&2));
        assert!(!tags.contains_key("old"));
    }

    #[tokio::test]
    async fn test_rename_unknown_tag_rejected() {
        let db = db();
        let err = db.rename_tag(ALL_NOTES, "ghost", "solid").await.unwrap_err();
        assert!(matches!(err, Error::BackendRejected(_)));
    }

    #[tokio::test]
    async fn test_rebuild_reflects_current_content() {
        let db = db();
        db.add_note("#a note").unwrap();
        let id = db.add_note("#b note").unwrap();
        db.remove_note(id).unwrap();

        db.rebuild_tags(ALL_NOTES).await.unwrap();
        let tags = db.list_tags(ALL_NOTES, false).await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags.get("a"), Some(&1));
    }

    #[test]
    fn test_note_count() {
        let db = db();
        assert_eq!(db.note_count().unwrap(), 0);
        db.add_note("one").unwrap();
        db.add_note("two").unwrap();
        assert_eq!(db.note_count().unwrap(), 2);
    }
}
