//! SQLite-backed key-value store

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;
use serde_json::Value;

use super::database::{Database, DatabaseError};
use super::kv::{KeyValueStore, StoreError};

/// Durable store over the records table.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn open_default() -> Result<Self, DatabaseError> {
        Ok(Self::new(Database::open_default()?))
    }

    fn decode(collection: &str, key: &str, raw: String) -> Result<Value, StoreError> {
        serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
            collection: collection.to_string(),
            key: key.to_string(),
            source,
        })
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn put(&self, collection: &str, key: &str, value: &Value) -> Result<(), StoreError> {
        let payload = value.to_string();
        self.db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO records (collection, key, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(collection, key) DO UPDATE SET value = ?3, updated_at = ?4",
                params![collection, key, payload, Utc::now().to_rfc3339()],
            )
        })?;
        Ok(())
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let raw: Option<String> = self.db.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT value FROM records WHERE collection = ?1 AND key = ?2")?;
            let mut rows = stmt.query(params![collection, key])?;
            match rows.next()? {
                Some(row) => Ok(Some(row.get(0)?)),
                None => Ok(None),
            }
        })?;
        raw.map(|raw| Self::decode(collection, key, raw)).transpose()
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        self.db.with_connection(|conn| {
            conn.execute(
                "DELETE FROM records WHERE collection = ?1 AND key = ?2",
                params![collection, key],
            )
        })?;
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let rows: Vec<(String, String)> = self.db.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT key, value FROM records WHERE collection = ?1")?;
            let rows = stmt.query_map(params![collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            rows.collect()
        })?;

        rows.into_iter()
            .map(|(key, raw)| {
                let value = Self::decode(collection, &key, raw)?;
                Ok((key, value))
            })
            .collect()
    }

    async fn delete_many(&self, records: &[(String, String)]) -> Result<(), StoreError> {
        self.db.with_connection(|conn| {
            // All deletes commit together or not at all.
            let tx = conn.unchecked_transaction()?;
            for (collection, key) in records {
                tx.execute(
                    "DELETE FROM records WHERE collection = ?1 AND key = ?2",
                    params![collection, key],
                )?;
            }
            tx.commit()
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn setup() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db")).unwrap();
        (dir, SqliteStore::new(db))
    }

    #[tokio::test]
    async fn put_overwrites_existing_records() {
        let (_dir, store) = setup();
        store.put("sessions", "a", &json!({ "v": 1 })).await.unwrap();
        store.put("sessions", "a", &json!({ "v": 2 })).await.unwrap();

        assert_eq!(
            store.get("sessions", "a").await.unwrap(),
            Some(json!({ "v": 2 }))
        );
    }

    #[tokio::test]
    async fn get_missing_record_is_none() {
        let (_dir, store) = setup();
        assert_eq!(store.get("sessions", "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_returns_only_the_collection() {
        let (_dir, store) = setup();
        store.put("sessions", "a", &json!(1)).await.unwrap();
        store.put("sessions", "b", &json!(2)).await.unwrap();
        store.put("events", "a", &json!([])).await.unwrap();

        let mut listed = store.list("sessions").await.unwrap();
        listed.sort_by(|(a, _), (b, _)| a.cmp(b));
        assert_eq!(
            listed,
            vec![("a".to_string(), json!(1)), ("b".to_string(), json!(2))]
        );
    }

    #[tokio::test]
    async fn delete_many_spans_collections_atomically() {
        let (_dir, store) = setup();
        store.put("sessions", "s1", &json!(1)).await.unwrap();
        store.put("events", "s1", &json!([1, 2])).await.unwrap();
        store.put("media", "s1", &json!(["x"])).await.unwrap();
        store.put("sessions", "s2", &json!(2)).await.unwrap();

        store
            .delete_many(&[
                ("sessions".to_string(), "s1".to_string()),
                ("events".to_string(), "s1".to_string()),
                ("media".to_string(), "s1".to_string()),
            ])
            .await
            .unwrap();

        assert_eq!(store.get("sessions", "s1").await.unwrap(), None);
        assert_eq!(store.get("events", "s1").await.unwrap(), None);
        assert_eq!(store.get("media", "s1").await.unwrap(), None);
        assert_eq!(store.get("sessions", "s2").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn corrupt_rows_surface_as_errors() {
        let (_dir, store) = setup();
        store
            .db
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO records (collection, key, value, updated_at)
                     VALUES ('sessions', 'bad', 'not json', '2026-01-01T00:00:00Z')",
                    [],
                )
            })
            .unwrap();

        let err = store.get("sessions", "bad").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
