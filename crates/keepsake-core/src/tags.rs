//! Tag synchronization.
//!
//! Normalizes free-text labels into slugs, creates the tags that do not exist
//! yet, and replaces a record's tag associations in one transaction. Tags are
//! independent of the version store; they only share the [`RecordKey`] shape.

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::config::validate_identifier;
use crate::error::{KeepsakeError, KeepsakeResult};
use crate::versioning::{open_connection, RecordKey};

static NON_SLUG_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s_-]+").unwrap());
static SLUG_BREAKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_-]+").unwrap());

/// Tag table layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagConfig {
    /// Table holding tag names and slugs.
    pub tags_table: String,
    /// Table linking records to tags.
    pub relation_table: String,
    /// Joins words inside a slug.
    pub separator: String,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            tags_table: "tags".to_string(),
            relation_table: "tags_rel".to_string(),
            separator: "_".to_string(),
            busy_timeout_ms: 5_000,
        }
    }
}

impl TagConfig {
    pub fn validate(&self) -> KeepsakeResult<()> {
        validate_identifier(&self.tags_table)?;
        validate_identifier(&self.relation_table)?;
        if self.separator.is_empty() || self.separator.chars().any(|c| c.is_alphanumeric()) {
            return Err(KeepsakeError::validation_with_suggestion(
                format!("invalid tag separator '{}'", self.separator),
                "Use punctuation such as '_' or '-'",
            ));
        }
        Ok(())
    }
}

/// A stored tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

fn fold(c: char) -> Option<&'static str> {
    Some(match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' => "a",
        'æ' => "ae",
        'ç' | 'č' | 'ć' => "c",
        'ď' | 'ð' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' => "e",
        'ì' | 'í' | 'î' | 'ï' | 'ī' => "i",
        'ł' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' => "o",
        'œ' => "oe",
        'ř' => "r",
        'ß' => "ss",
        'ś' | 'š' => "s",
        'ť' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        'þ' => "th",
        '@' => " at ",
        _ => return None,
    })
}

/// Canonical slug for a label.
///
/// Lowercases, folds common Latin accents to ASCII, drops other symbols and
/// joins the remaining words with `separator`.
pub fn slugify(label: &str, separator: &str) -> String {
    let mut ascii = String::with_capacity(label.len());
    for c in label.chars().flat_map(char::to_lowercase) {
        match fold(c) {
            Some(s) => ascii.push_str(s),
            None => ascii.push(c),
        }
    }

    let cleaned = NON_SLUG_CHARS.replace_all(&ascii, "");
    let joined = SLUG_BREAKS.replace_all(cleaned.trim(), separator);
    joined.trim_matches(|c: char| separator.contains(c)).to_string()
}

/// SQLite-backed tag store
pub struct SqliteTagStore {
    conn: Mutex<Connection>,
    config: TagConfig,
}

impl SqliteTagStore {
    /// Open (or create) a store at the given path
    pub fn new(path: impl AsRef<Path>, config: TagConfig) -> KeepsakeResult<Self> {
        config.validate()?;
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        Self::with_connection(open_connection(path.as_ref(), busy_timeout)?, config)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> KeepsakeResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, TagConfig::default())
    }

    fn with_connection(conn: Connection, config: TagConfig) -> KeepsakeResult<Self> {
        config.validate()?;
        let store = Self {
            conn: Mutex::new(conn),
            config,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> KeepsakeResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| KeepsakeError::Internal("tag store connection lock poisoned".into()))
    }

    fn init_schema(&self) -> KeepsakeResult<()> {
        let conn = self.conn()?;
        let (tags, rel) = (&self.config.tags_table, &self.config.relation_table);
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {tags} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS {rel} (
                object_id INTEGER NOT NULL,
                object_table TEXT NOT NULL,
                tag_id INTEGER NOT NULL REFERENCES {tags}(id),
                PRIMARY KEY (object_id, object_table, tag_id)
            );

            CREATE INDEX IF NOT EXISTS idx_{rel}_tag ON {rel}(tag_id);
        "#
        ))?;
        Ok(())
    }

    /// Replace the record's tags with `labels`. Returns the attached tag ids.
    ///
    /// Labels that normalize to the same slug collapse into one tag, the last
    /// label naming it. Labels with an empty slug are skipped.
    pub fn save_tags<S: AsRef<str>>(&self, key: &RecordKey, labels: &[S]) -> KeepsakeResult<Vec<i64>> {
        let wanted: BTreeMap<String, &str> = labels
            .iter()
            .map(|label| (slugify(label.as_ref(), &self.config.separator), label.as_ref().trim()))
            .filter(|(slug, _)| !slug.is_empty())
            .collect();

        let (tags, rel) = (&self.config.tags_table, &self.config.relation_table);
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            &format!("DELETE FROM {rel} WHERE object_id = ?1 AND object_table = ?2"),
            params![key.object_id, key.object_type],
        )?;

        let mut ids = Vec::with_capacity(wanted.len());
        let mut created = 0usize;
        for (slug, name) in &wanted {
            created += tx.execute(
                &format!("INSERT INTO {tags} (name, slug) VALUES (?1, ?2) ON CONFLICT(slug) DO NOTHING"),
                params![name, slug],
            )?;
            let id: i64 = tx.query_row(
                &format!("SELECT id FROM {tags} WHERE slug = ?1"),
                params![slug],
                |row| row.get(0),
            )?;
            tx.execute(
                &format!("INSERT OR IGNORE INTO {rel} (object_id, object_table, tag_id) VALUES (?1, ?2, ?3)"),
                params![key.object_id, key.object_type, id],
            )?;
            ids.push(id);
        }

        tx.commit()?;
        tracing::debug!(record = %key, attached = ids.len(), created, "synchronized tags");
        Ok(ids)
    }

    /// Tags attached to a record, ordered by slug.
    pub fn tags_for(&self, key: &RecordKey) -> KeepsakeResult<Vec<Tag>> {
        let conn = self.conn()?;
        let (tags, rel) = (&self.config.tags_table, &self.config.relation_table);
        let mut stmt = conn.prepare(&format!(
            r#"SELECT t.id, t.name, t.slug
               FROM {tags} t
               JOIN {rel} r ON r.tag_id = t.id
               WHERE r.object_id = ?1 AND r.object_table = ?2
               ORDER BY t.slug"#
        ))?;

        let rows = stmt.query_map(params![key.object_id, key.object_type], |row| {
            Ok(Tag {
                id: row.get(0)?,
                name: row.get(1)?,
                slug: row.get(2)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Detach every tag from a record. Tags themselves are kept.
    pub fn detach_all(&self, key: &RecordKey) -> KeepsakeResult<usize> {
        let conn = self.conn()?;
        let count = conn.execute(
            &format!(
                "DELETE FROM {} WHERE object_id = ?1 AND object_table = ?2",
                self.config.relation_table
            ),
            params![key.object_id, key.object_type],
        )?;
        Ok(count)
    }

    /// Look up a tag by slug.
    pub fn find_by_slug(&self, slug: &str) -> KeepsakeResult<Option<Tag>> {
        use rusqlite::OptionalExtension;

        let conn = self.conn()?;
        let tag = conn
            .query_row(
                &format!("SELECT id, name, slug FROM {} WHERE slug = ?1", self.config.tags_table),
                params![slug],
                |row| {
                    Ok(Tag {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        slug: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(tag)
    }
}
