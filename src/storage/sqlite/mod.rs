//! `SQLite` row store.
//!
//! Holds the rows the graph is rebuilt from plus the latest snapshot blob.
//!
//! ```text
//! interactions(user_id, item_id, timestamp)   UNIQUE(user_id, item_id)
//! items(id, title, category)
//! user_preferences(user_id, genre_id)         PRIMARY KEY(user_id, genre_id)
//! snapshots(id, created_at, data)             latest row wins
//! ```

mod connection;

pub use connection::{acquire_lock, configure_connection};

use self::connection::{sql_error, to_sql_int};
use crate::models::{GenreId, InteractionRow, ItemId, ItemMeta, PreferenceRow, UserId, non_negative};
use crate::storage::traits::{RowSource, SnapshotStore};
use crate::{Error, Result, current_timestamp};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS interactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        item_id INTEGER NOT NULL,
        timestamp INTEGER NOT NULL,
        UNIQUE (user_id, item_id)
    );
    CREATE INDEX IF NOT EXISTS idx_interactions_item ON interactions (item_id);
    CREATE TABLE IF NOT EXISTS items (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        category TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS user_preferences (
        user_id INTEGER NOT NULL,
        genre_id INTEGER NOT NULL,
        PRIMARY KEY (user_id, genre_id)
    );
    CREATE TABLE IF NOT EXISTS snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        created_at INTEGER NOT NULL,
        data BLOB NOT NULL
    );
";

/// `SQLite`-backed row and snapshot store.
pub struct SqliteRowStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteRowStore {
    /// Opens (or creates) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory or database cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::operation("create_data_dir", e))?;
        }
        let conn = Connection::open(path).map_err(sql_error("open_database"))?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sql_error("open_database"))?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, db_path: Option<PathBuf>) -> Result<Self> {
        configure_connection(&conn);
        conn.execute_batch(SCHEMA)
            .map_err(sql_error("create_schema"))?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Database file path, `None` for in-memory stores.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Records a like. Returns `false` if the pair already existed.
    ///
    /// # Errors
    ///
    /// Returns an error if an id does not fit the column or the insert fails.
    pub fn insert_interaction(&self, row: InteractionRow) -> Result<bool> {
        Ok(self.insert_interactions(&[row])? == 1)
    }

    /// Records likes in one transaction. Returns the number of new pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if any row is out of range or the transaction fails.
    pub fn insert_interactions(&self, rows: &[InteractionRow]) -> Result<usize> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn.transaction().map_err(sql_error("begin_transaction"))?;
        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT OR IGNORE INTO interactions (user_id, item_id, timestamp)
                     VALUES (?1, ?2, ?3)",
                )
                .map_err(sql_error("insert_interaction"))?;
            for row in rows {
                inserted += stmt
                    .execute(params![
                        to_sql_int("user_id", row.user_id)?,
                        to_sql_int("item_id", row.item_id)?,
                        to_sql_int("timestamp", row.timestamp)?,
                    ])
                    .map_err(sql_error("insert_interaction"))?;
            }
        }
        tx.commit().map_err(sql_error("commit_transaction"))?;
        metrics::counter!("sqlite_rows_written_total", "table" => "interactions")
            .increment(inserted as u64);
        Ok(inserted)
    }

    /// Removes a like. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_interaction(&self, user_id: UserId, item_id: ItemId) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        let deleted = conn
            .execute(
                "DELETE FROM interactions WHERE user_id = ?1 AND item_id = ?2",
                params![to_sql_int("user_id", user_id)?, to_sql_int("item_id", item_id)?],
            )
            .map_err(sql_error("delete_interaction"))?;
        Ok(deleted > 0)
    }

    /// Inserts or replaces catalog rows in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if any id is out of range or the transaction fails.
    pub fn upsert_items(&self, items: &[ItemMeta]) -> Result<usize> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn.transaction().map_err(sql_error("begin_transaction"))?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO items (id, title, category) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET title = excluded.title, category = excluded.category",
                )
                .map_err(sql_error("upsert_item"))?;
            for item in items {
                stmt.execute(params![to_sql_int("item_id", item.id)?, item.title, item.category])
                    .map_err(sql_error("upsert_item"))?;
            }
        }
        tx.commit().map_err(sql_error("commit_transaction"))?;
        Ok(items.len())
    }

    /// Sets an item's category, creating a placeholder row if the item is new.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub fn set_item_category(&self, item_id: ItemId, category: &str) -> Result<()> {
        let placeholder = ItemMeta::unknown(item_id);
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO items (id, title, category) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET category = excluded.category",
            params![to_sql_int("item_id", item_id)?, placeholder.title, category],
        )
        .map_err(sql_error("set_item_category"))?;
        Ok(())
    }

    /// Looks up one catalog row.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn item(&self, item_id: ItemId) -> Result<Option<ItemMeta>> {
        let conn = acquire_lock(&self.conn);
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT title, category FROM items WHERE id = ?1",
                params![to_sql_int("item_id", item_id)?],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(sql_error("get_item"))?;
        Ok(row.map(|(title, category)| ItemMeta::new(item_id, title, category)))
    }

    /// Replaces a user's preferred genres. An empty set clears them.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub fn set_preferences(&self, user_id: UserId, genres: &BTreeSet<GenreId>) -> Result<()> {
        let user = to_sql_int("user_id", user_id)?;
        let mut conn = acquire_lock(&self.conn);
        let tx = conn.transaction().map_err(sql_error("begin_transaction"))?;
        tx.execute("DELETE FROM user_preferences WHERE user_id = ?1", params![user])
            .map_err(sql_error("set_preferences"))?;
        for genre_id in genres {
            tx.execute(
                "INSERT INTO user_preferences (user_id, genre_id) VALUES (?1, ?2)",
                params![user, genre_id],
            )
            .map_err(sql_error("set_preferences"))?;
        }
        tx.commit().map_err(sql_error("commit_transaction"))
    }
}

impl RowSource for SqliteRowStore {
    fn interactions(&self) -> Result<Vec<InteractionRow>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT user_id, item_id, timestamp FROM interactions ORDER BY id")
            .map_err(sql_error("list_interactions"))?;
        let raw = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
            })
            .map_err(sql_error("list_interactions"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(sql_error("list_interactions"))?;

        raw.into_iter()
            .map(|(user_id, item_id, timestamp)| {
                Ok(InteractionRow::new(
                    non_negative("user_id", user_id)?,
                    non_negative("item_id", item_id)?,
                    non_negative("timestamp", timestamp)?,
                ))
            })
            .collect()
    }

    fn catalog(&self) -> Result<Vec<ItemMeta>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT id, title, category FROM items ORDER BY id")
            .map_err(sql_error("list_items"))?;
        let raw = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })
            .map_err(sql_error("list_items"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(sql_error("list_items"))?;

        raw.into_iter()
            .map(|(id, title, category)| Ok(ItemMeta::new(non_negative("item_id", id)?, title, category)))
            .collect()
    }

    fn preferences(&self) -> Result<Vec<PreferenceRow>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT user_id, genre_id FROM user_preferences ORDER BY user_id, genre_id")
            .map_err(sql_error("list_preferences"))?;
        let raw = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))
            .map_err(sql_error("list_preferences"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(sql_error("list_preferences"))?;

        raw.into_iter()
            .map(|(user_id, genre_id)| {
                let genre_id = GenreId::try_from(non_negative("genre_id", genre_id)?)
                    .map_err(|_| Error::InvalidInput(format!("genre_id {genre_id} out of range")))?;
                Ok(PreferenceRow {
                    user_id: non_negative("user_id", user_id)?,
                    genre_id,
                })
            })
            .collect()
    }
}

impl SnapshotStore for SqliteRowStore {
    fn load_latest(&self) -> Result<Option<Vec<u8>>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT data FROM snapshots ORDER BY id DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(sql_error("load_snapshot"))
    }

    fn save(&self, bytes: &[u8]) -> Result<()> {
        let created_at = to_sql_int("created_at", current_timestamp())?;
        let mut conn = acquire_lock(&self.conn);
        let tx = conn.transaction().map_err(sql_error("begin_transaction"))?;
        tx.execute(
            "INSERT INTO snapshots (created_at, data) VALUES (?1, ?2)",
            params![created_at, bytes],
        )
        .map_err(sql_error("save_snapshot"))?;
        let latest = tx.last_insert_rowid();
        tx.execute("DELETE FROM snapshots WHERE id < ?1", params![latest])
            .map_err(sql_error("prune_snapshots"))?;
        tx.commit().map_err(sql_error("commit_transaction"))
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interactions_roundtrip_and_dedupe() {
        let store = SqliteRowStore::in_memory().unwrap();
        let rows = [
            InteractionRow::new(999, 101, 10),
            InteractionRow::new(888, 101, 11),
            InteractionRow::new(999, 101, 12),
        ];
        assert_eq!(store.insert_interactions(&rows).unwrap(), 2);
        assert!(!store.insert_interaction(InteractionRow::new(888, 101, 99)).unwrap());

        let loaded = store.interactions().unwrap();
        assert_eq!(loaded, vec![rows[0], rows[1]]);
    }

    #[test]
    fn test_delete_interaction() {
        let store = SqliteRowStore::in_memory().unwrap();
        store.insert_interaction(InteractionRow::new(1, 2, 3)).unwrap();
        assert!(store.delete_interaction(1, 2).unwrap());
        assert!(!store.delete_interaction(1, 2).unwrap());
        assert!(store.interactions().unwrap().is_empty());
    }

    #[test]
    fn test_items_upsert() {
        let store = SqliteRowStore::in_memory().unwrap();
        store
            .upsert_items(&[ItemMeta::new(5, "Alien", "Horror"), ItemMeta::new(2, "Up", "Animation")])
            .unwrap();
        store.upsert_items(&[ItemMeta::new(5, "Aliens", "Sci-Fi")]).unwrap();

        let catalog = store.catalog().unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[0].id, 2);
        assert_eq!(store.item(5).unwrap(), Some(ItemMeta::new(5, "Aliens", "Sci-Fi")));
        assert!(store.item(6).unwrap().is_none());
    }

    #[test]
    fn test_set_item_category_keeps_title() {
        let store = SqliteRowStore::in_memory().unwrap();
        store.upsert_items(&[ItemMeta::new(1, "Heat", "Drama")]).unwrap();
        store.set_item_category(1, "Crime").unwrap();
        store.set_item_category(2, "Horror").unwrap();
        assert_eq!(store.item(1).unwrap(), Some(ItemMeta::new(1, "Heat", "Crime")));
        assert_eq!(store.item(2).unwrap().map(|m| m.title), Some("Unknown 2".to_string()));
    }

    #[test]
    fn test_preferences_replace() {
        let store = SqliteRowStore::in_memory().unwrap();
        store.set_preferences(1, &BTreeSet::from([1, 7])).unwrap();
        store.set_preferences(1, &BTreeSet::from([3])).unwrap();
        store.set_preferences(2, &BTreeSet::from([5])).unwrap();
        let prefs = store.preferences().unwrap();
        assert_eq!(
            prefs,
            vec![
                PreferenceRow { user_id: 1, genre_id: 3 },
                PreferenceRow { user_id: 2, genre_id: 5 },
            ]
        );
    }

    #[test]
    fn test_snapshot_latest_wins() {
        let store = SqliteRowStore::in_memory().unwrap();
        assert!(store.load_latest().unwrap().is_none());
        store.save(b"first").unwrap();
        store.save(b"second").unwrap();
        assert_eq!(store.load_latest().unwrap(), Some(b"second".to_vec()));
    }

    #[test]
    fn test_negative_rows_are_rejected() {
        let store = SqliteRowStore::in_memory().unwrap();
        {
            let conn = acquire_lock(&store.conn);
            conn.execute(
                "INSERT INTO interactions (user_id, item_id, timestamp) VALUES (-1, 2, 3)",
                [],
            )
            .unwrap();
        }
        assert!(matches!(store.interactions(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_out_of_range_id_is_rejected() {
        let store = SqliteRowStore::in_memory().unwrap();
        let result = store.insert_interaction(InteractionRow::new(u64::MAX, 1, 1));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
