//! Persistent node store module.
//!
//! SQLite-backed implementation of the "persistent key-value store on disk
//! (used as a byte-addressed node map)" collaborator the container and
//! volume engines persist their configuration through.

mod node;

pub use node::{Entry, NodeStore};

use std::path::Path;

use rusqlite::{Connection, Result as SqliteResult};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

/// Database errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Database wrapper owning the single sqlite connection the node store is
/// built on. Accessed only from the event loop thread (spec §5 "the
/// persistent node store is accessed only from the loop thread") — the
/// `tokio::sync::Mutex` exists to let the loop's own spawned helper tasks
/// (compaction-on-idle) share it without a second connection.
pub struct Database {
    conn: Mutex<Connection>,
    pub nodes: NodeStore,
}

impl Database {
    /// Open or create the database.
    pub fn open(path: impl AsRef<Path>) -> DatabaseResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init_tables(&conn)?;

        info!("node store opened at {:?}", path);

        Ok(Self { conn: Mutex::new(conn), nodes: NodeStore::new() })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_tables(&conn)?;
        Ok(Self { conn: Mutex::new(conn), nodes: NodeStore::new() })
    }

    fn init_tables(conn: &Connection) -> SqliteResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS node_journal (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                node TEXT NOT NULL,
                key TEXT NOT NULL,
                value BLOB NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_node_journal_node
                ON node_journal(node);
            "#,
        )?;
        Ok(())
    }

    /// Borrow the connection with the node store attached, for the
    /// duration of one logical operation.
    pub async fn nodes(&self) -> NodeStoreWithConn<'_> {
        NodeStoreWithConn { conn: self.conn.lock().await, store: &self.nodes }
    }
}

/// Node store bound to a held connection guard.
pub struct NodeStoreWithConn<'a> {
    conn: tokio::sync::MutexGuard<'a, Connection>,
    store: &'a NodeStore,
}

impl<'a> NodeStoreWithConn<'a> {
    pub fn append(&self, node: &str, key: &str, value: &[u8]) -> DatabaseResult<()> {
        self.store.append(&self.conn, node, key, value)
    }

    pub fn list(&self, node: &str) -> DatabaseResult<Vec<Entry>> {
        self.store.list(&self.conn, node)
    }

    pub fn save(&self, node: &str, pairs: &[Entry]) -> DatabaseResult<()> {
        self.store.save(&self.conn, node, pairs)
    }

    pub fn remove(&self, node: &str) -> DatabaseResult<()> {
        self.store.remove(&self.conn, node)
    }

    pub fn all_nodes(&self) -> DatabaseResult<Vec<String>> {
        self.store.all_nodes(&self.conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_round_trips_a_node() {
        let db = Database::open_in_memory().unwrap();

        {
            let nodes = db.nodes().await;
            nodes.append("/a", "command", b"/bin/true").unwrap();
            nodes.append("/a", "state", b"stopped").unwrap();
        }

        {
            let nodes = db.nodes().await;
            let entries = nodes.list("/a").unwrap();
            assert_eq!(entries.len(), 2);
        }
    }
}
