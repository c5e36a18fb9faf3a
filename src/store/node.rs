//! Persistent node storage: the byte-addressed node map collaborator
//! (spec §2 "Persistent Node Store", §6 "Persisted state").
//!
//! Each node (a container's absolute name, or a volume's numeric id as
//! text) owns an ordered list of `(key, value)` byte-string pairs.
//! `append` is the hot path used by every `Set`/`SetData` call and costs
//! one row insert; `save` performs a full rewrite (the compaction counterpart
//! to `append`, used by `SyncStorage` and on container/volume destroy).

use rusqlite::Connection;

use super::{DatabaseError, DatabaseResult};

/// A single `(key, value)` pair as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: Vec<u8>,
}

/// CRUD surface over the `node_journal` table. Stateless — the connection
/// is threaded through by the caller on each call.
pub struct NodeStore;

impl NodeStore {
    pub fn new() -> Self {
        Self
    }

    /// Append-only write: one row per call, O(1) regardless of the node's
    /// current size.
    pub fn append(&self, conn: &Connection, node: &str, key: &str, value: &[u8]) -> DatabaseResult<()> {
        conn.execute(
            "INSERT INTO node_journal (node, key, value) VALUES (?1, ?2, ?3)",
            rusqlite::params![node, key, value],
        )?;
        Ok(())
    }

    /// List the node's current (key, value) pairs, in first-seen order,
    /// each key resolved to its most recently appended value.
    pub fn list(&self, conn: &Connection, node: &str) -> DatabaseResult<Vec<Entry>> {
        let mut stmt = conn.prepare(
            "SELECT key, value FROM node_journal WHERE node = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([node], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut order = Vec::new();
        let mut latest: std::collections::HashMap<String, Vec<u8>> = std::collections::HashMap::new();
        for (key, value) in rows {
            if !latest.contains_key(&key) {
                order.push(key.clone());
            }
            latest.insert(key, value);
        }

        Ok(order
            .into_iter()
            .map(|key| {
                let value = latest.remove(&key).unwrap_or_default();
                Entry { key, value }
            })
            .collect())
    }

    /// Full rewrite: replace the node's journal with exactly these pairs.
    /// This is the compaction path (`SyncStorage`) and is also used to
    /// persist an entirely new node (e.g. on Container Create).
    pub fn save(&self, conn: &Connection, node: &str, pairs: &[Entry]) -> DatabaseResult<()> {
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM node_journal WHERE node = ?1", [node])?;
        for entry in pairs {
            tx.execute(
                "INSERT INTO node_journal (node, key, value) VALUES (?1, ?2, ?3)",
                rusqlite::params![node, entry.key, entry.value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Remove a node entirely (container/volume destroyed).
    pub fn remove(&self, conn: &Connection, node: &str) -> DatabaseResult<()> {
        conn.execute("DELETE FROM node_journal WHERE node = ?1", [node])?;
        Ok(())
    }

    /// List every node name with at least one entry — used to restore the
    /// container/volume tree on daemon start.
    pub fn all_nodes(&self, conn: &Connection) -> DatabaseResult<Vec<String>> {
        let mut stmt = conn.prepare("SELECT DISTINCT node FROM node_journal")?;
        let nodes = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(nodes)
    }
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Entry {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into(), value: value.into() }
    }

    pub fn value_str(&self) -> Result<&str, DatabaseError> {
        std::str::from_utf8(&self.value)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE node_journal (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                node TEXT NOT NULL,
                key TEXT NOT NULL,
                value BLOB NOT NULL
            );
            "#,
        )
        .unwrap();
        conn
    }

    #[test]
    fn append_then_list_resolves_latest_value_per_key() {
        let conn = setup_db();
        let store = NodeStore::new();

        store.append(&conn, "/a", "command", b"/bin/true").unwrap();
        store.append(&conn, "/a", "state", b"stopped").unwrap();
        store.append(&conn, "/a", "command", b"/bin/false").unwrap();

        let entries = store.list(&conn, "/a").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "command");
        assert_eq!(entries[0].value, b"/bin/false");
        assert_eq!(entries[1].key, "state");
    }

    #[test]
    fn save_performs_full_rewrite() {
        let conn = setup_db();
        let store = NodeStore::new();

        store.append(&conn, "/a", "command", b"/bin/true").unwrap();
        store.append(&conn, "/a", "state", b"stopped").unwrap();

        store
            .save(&conn, "/a", &[Entry::new("command", b"/bin/false".to_vec())])
            .unwrap();

        let entries = store.list(&conn, "/a").unwrap();
        assert_eq!(entries, vec![Entry::new("command", b"/bin/false".to_vec())]);
    }

    #[test]
    fn remove_clears_node() {
        let conn = setup_db();
        let store = NodeStore::new();
        store.append(&conn, "/a", "command", b"/bin/true").unwrap();
        store.remove(&conn, "/a").unwrap();
        assert!(store.list(&conn, "/a").unwrap().is_empty());
    }
}
