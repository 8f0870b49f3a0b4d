//! SQLite-backed document store.
//!
//! Each upload lands in its own table (`loans_<name>_<millis>`) whose rows
//! hold the identifier plus the full document as JSON text; the shared
//! `csv_metadata` table keeps each collection's ordered column list and
//! upload date. The active-collection pointer and the cached collection list
//! live on the [`Store`] itself, so a single mutex around the store guards
//! every piece of process-wide mutable state.

use std::path::Path;

use anyhow::{ensure, Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};

use crate::data::{Document, IDENTIFIER_FIELD};

/// Shared table holding one column-metadata record per collection.
pub const METADATA_TABLE: &str = "csv_metadata";

/// Active collection used before any upload has happened.
pub const DEFAULT_COLLECTION: &str = "loans";

pub struct Store {
    conn: Connection,
    active: String,
    collections: Vec<String>,
}

impl Store {
    /// Opens (or creates) the database file and initializes the active
    /// pointer from the existing collections: the last known collection
    /// wins, or the default name when the store is empty.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Opening database {}", path.display()))?;
        Self::from_connection(conn)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory().context("Opening in-memory database")?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {METADATA_TABLE} (
                     collection TEXT PRIMARY KEY,
                     columns TEXT NOT NULL,
                     upload_date TEXT NOT NULL
                 )"
            ),
            [],
        )
        .context("Creating metadata table")?;

        let collections = scan_collections(&conn)?;
        let active = collections
            .last()
            .cloned()
            .unwrap_or_else(|| DEFAULT_COLLECTION.to_string());
        debug!("Known collections: {collections:?}, active: '{active}'");
        Ok(Store {
            conn,
            active,
            collections,
        })
    }

    pub fn active(&self) -> &str {
        &self.active
    }

    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    /// Re-scans the database for collection tables, excluding internal
    /// SQLite tables and the metadata table itself.
    pub fn refresh_collections(&mut self) -> Result<()> {
        self.collections = scan_collections(&self.conn)?;
        Ok(())
    }

    /// Reassigns the active pointer if `name` exists in the store. Returns
    /// `false` (state untouched) for unknown names. Setting the current
    /// value again is a no-op that still succeeds.
    pub fn set_active(&mut self, name: &str) -> Result<bool> {
        if !self.collection_exists(name)? {
            return Ok(false);
        }
        self.active = name.to_string();
        Ok(true)
    }

    fn collection_exists(&self, name: &str) -> Result<bool> {
        if name == METADATA_TABLE {
            return Ok(false);
        }
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .context("Checking collection existence")?;
        Ok(found.is_some())
    }

    /// All documents of a collection, in insertion order. A collection that
    /// does not exist yet (the default before any upload) reads as empty.
    pub fn documents(&self, collection: &str) -> Result<Vec<Document>> {
        if !self.collection_exists(collection)? {
            return Ok(Vec::new());
        }
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT doc FROM \"{collection}\" ORDER BY id"))
            .with_context(|| format!("Reading collection '{collection}'"))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("Scanning documents")?;
        let mut documents = Vec::new();
        for raw in rows {
            let raw = raw.context("Reading document row")?;
            documents.push(
                serde_json::from_str(&raw)
                    .with_context(|| format!("Decoding document in '{collection}'"))?,
            );
        }
        Ok(documents)
    }

    /// The ordered column list recorded at ingestion time, if any.
    pub fn columns(&self, collection: &str) -> Result<Option<Vec<String>>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                &format!("SELECT columns FROM {METADATA_TABLE} WHERE collection = ?1"),
                params![collection],
                |row| row.get(0),
            )
            .optional()
            .context("Reading column metadata")?;
        match raw {
            Some(json) => Ok(Some(
                serde_json::from_str(&json).context("Decoding column metadata")?,
            )),
            None => Ok(None),
        }
    }

    /// One arbitrary document from a collection, used as a column-list
    /// fallback when no metadata record exists.
    pub fn sample_document(&self, collection: &str) -> Result<Option<Document>> {
        if !self.collection_exists(collection)? {
            return Ok(None);
        }
        let raw: Option<String> = self
            .conn
            .query_row(
                &format!("SELECT doc FROM \"{collection}\" ORDER BY id LIMIT 1"),
                [],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Sampling collection '{collection}'"))?;
        match raw {
            Some(json) => Ok(Some(
                serde_json::from_str(&json).context("Decoding sampled document")?,
            )),
            None => Ok(None),
        }
    }

    /// Writes a parsed upload into a fresh collection: the metadata upsert,
    /// table creation, and the bulk insert all run inside one transaction.
    /// Any failure rolls the whole write back and leaves the active pointer
    /// untouched. On success the new collection is promoted to active and
    /// the cached collection list is refreshed.
    pub fn ingest(
        &mut self,
        collection: &str,
        columns: &[String],
        documents: &[Document],
        uploaded_at: DateTime<Utc>,
    ) -> Result<()> {
        ensure!(
            !collection.is_empty()
                && collection
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_'),
            "Invalid collection name '{collection}'"
        );

        let tx = self.conn.transaction().context("Starting transaction")?;
        tx.execute(
            &format!(
                "INSERT INTO {METADATA_TABLE} (collection, columns, upload_date)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(collection) DO UPDATE
                 SET columns = excluded.columns, upload_date = excluded.upload_date"
            ),
            params![
                collection,
                serde_json::to_string(columns).context("Encoding column metadata")?,
                uploaded_at.to_rfc3339(),
            ],
        )
        .context("Writing column metadata")?;
        tx.execute(
            &format!(
                "CREATE TABLE \"{collection}\" (
                     id INTEGER PRIMARY KEY,
                     loan_number TEXT NOT NULL,
                     doc TEXT NOT NULL
                 )"
            ),
            [],
        )
        .with_context(|| format!("Creating collection '{collection}'"))?;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO \"{collection}\" (loan_number, doc) VALUES (?1, ?2)"
                ))
                .context("Preparing bulk insert")?;
            for document in documents {
                let loan_number = document
                    .get(IDENTIFIER_FIELD)
                    .map(|v| v.as_display())
                    .unwrap_or_default();
                stmt.execute(params![
                    loan_number,
                    serde_json::to_string(document).context("Encoding document")?,
                ])
                .context("Inserting document")?;
            }
        }
        tx.commit().context("Committing ingest transaction")?;

        self.active = collection.to_string();
        self.refresh_collections()?;
        info!(
            "Ingested {} document(s) into '{collection}'",
            documents.len()
        );
        Ok(())
    }
}

fn scan_collections(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table'
               AND name NOT LIKE 'sqlite_%'
               AND name != ?1
             ORDER BY name",
        )
        .context("Preparing collection scan")?;
    let names = stmt
        .query_map(params![METADATA_TABLE], |row| row.get::<_, String>(0))
        .context("Scanning collections")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Reading collection names")?;
    Ok(names)
}
