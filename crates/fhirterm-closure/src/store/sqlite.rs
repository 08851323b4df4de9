//! SQLite-backed edge relation and closure index.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fhirterm_types::{ConceptId, ConceptSet};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use super::{BatchWriter, ClosureIndex, ClosureReader, ClosureStore};
use crate::error::{ClosureError, ClosureResult};
use crate::record::{Direction, EncodedRecord, IsAEdge, RebuildInfo};

/// Rows per transaction when importing edges.
const EDGE_IMPORT_BATCH: usize = 10_000;

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS snomed_is_a_relationships (
    id INTEGER PRIMARY KEY,
    source_id INTEGER NOT NULL,
    destination_id INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS snomed_is_a_relationships_on_source_id_idx
    ON snomed_is_a_relationships(source_id);
CREATE INDEX IF NOT EXISTS snomed_is_a_relationships_on_destination_id_idx
    ON snomed_is_a_relationships(destination_id);
CREATE TABLE IF NOT EXISTS snomed_ancestors_descendants (
    concept_id INTEGER PRIMARY KEY,
    ancestors BLOB NOT NULL,
    descendants BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS closure_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    generation INTEGER NOT NULL,
    built_at TEXT NOT NULL,
    concept_count INTEGER NOT NULL
);
";

const CREATE_STAGING: &str = "
DROP TABLE IF EXISTS snomed_ancestors_descendants_staging;
CREATE TABLE snomed_ancestors_descendants_staging (
    concept_id INTEGER PRIMARY KEY,
    ancestors BLOB NOT NULL,
    descendants BLOB NOT NULL
);
";

const ANCESTORS_SQL: &str = "
WITH RECURSIVE t(destination_id) AS (
    SELECT destination_id FROM snomed_is_a_relationships
    WHERE source_id = ?1
    UNION
    SELECT sr.destination_id FROM snomed_is_a_relationships AS sr
    JOIN t ON t.destination_id = sr.source_id
) SELECT destination_id FROM t";

const DESCENDANTS_SQL: &str = "
WITH RECURSIVE t(source_id) AS (
    SELECT source_id FROM snomed_is_a_relationships
    WHERE destination_id = ?1
    UNION
    SELECT sr.source_id FROM snomed_is_a_relationships AS sr
    JOIN t ON t.source_id = sr.destination_id
) SELECT source_id FROM t";

/// SQLite store holding the is-a relation and the closure index.
///
/// Records are stored one row per concept in
/// `snomed_ancestors_descendants(concept_id, ancestors, descendants)`.
/// A rebuild fills a staging table which `finish_rebuild` renames over the
/// live one in a single transaction.
///
/// SQLite integers are signed, so concept ids above `i64::MAX` are rejected
/// on import. [`MemoryStore`](crate::MemoryStore) accepts the full `u64` range.
///
/// File-backed stores run in WAL mode and give every reader its own
/// connection, so readers never block a rebuild. An in-memory store has a
/// single connection; its readers hold that connection until dropped.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> ClosureResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "opened closure store");

        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Creates an in-memory store (for testing).
    pub fn open_in_memory() -> ClosureResult<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> ClosureResult<()> {
        self.conn.lock().execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Imports is-a edges, committing every 10,000 rows.
    ///
    /// # Errors
    ///
    /// Fails with [`ClosureError::Sqlite`](crate::ClosureError::Sqlite) on an id
    /// above `i64::MAX`; the rows of the failing chunk are rolled back.
    pub fn insert_edges(&self, edges: &[IsAEdge]) -> ClosureResult<()> {
        let mut conn = self.conn.lock();
        for chunk in edges.chunks(EDGE_IMPORT_BATCH) {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO snomed_is_a_relationships (source_id, destination_id) VALUES (?1, ?2)",
                )?;
                for edge in chunk {
                    stmt.execute(params![edge.source, edge.destination])?;
                }
            }
            tx.commit()?;
            debug!(rows = chunk.len(), "imported is-a edges");
        }
        Ok(())
    }

    /// Deletes every is-a edge.
    pub fn clear_edges(&self) -> ClosureResult<()> {
        self.conn
            .lock()
            .execute("DELETE FROM snomed_is_a_relationships", [])?;
        Ok(())
    }

    fn open_reader_connection(&self) -> ClosureResult<ReaderConnection<'_>> {
        match &self.path {
            Some(path) => {
                let conn = Connection::open(path)?;
                conn.busy_timeout(BUSY_TIMEOUT)?;
                Ok(ReaderConnection::Owned(conn))
            }
            None => Ok(ReaderConnection::Shared(self.conn.lock())),
        }
    }
}

impl ClosureStore for SqliteStore {
    fn concept_ids(&self) -> ClosureResult<Vec<ConceptId>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT source_id FROM snomed_is_a_relationships
             UNION
             SELECT destination_id FROM snomed_is_a_relationships
             ORDER BY 1",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<ConceptId>, _>>()?;
        Ok(ids)
    }

    fn edges(&self) -> ClosureResult<Vec<IsAEdge>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT source_id, destination_id FROM snomed_is_a_relationships")?;
        let edges = stmt
            .query_map([], |row| Ok(IsAEdge::new(row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    fn edge_count(&self) -> ClosureResult<usize> {
        let count = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM snomed_is_a_relationships",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn begin_rebuild(&self) -> ClosureResult<()> {
        self.conn.lock().execute_batch(CREATE_STAGING)?;
        Ok(())
    }

    fn write_batch(
        &self,
        f: &mut dyn FnMut(&mut dyn BatchWriter) -> ClosureResult<()>,
    ) -> ClosureResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut batch = SqliteBatch { conn: &tx };
            // Dropping `tx` on error rolls the batch back
            f(&mut batch)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn finish_rebuild(&self, concept_count: usize) -> ClosureResult<RebuildInfo> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let staged: usize = tx
            .query_row(
                "SELECT COUNT(*) FROM snomed_ancestors_descendants_staging",
                [],
                |row| row.get(0),
            )
            .map_err(|e| ClosureError::Store(format!("no rebuild in progress: {}", e)))?;
        if staged != concept_count {
            return Err(ClosureError::Store(format!(
                "staged {} records, expected {}",
                staged, concept_count
            )));
        }

        let previous: Option<u64> = tx
            .query_row("SELECT generation FROM closure_meta WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        let info = RebuildInfo {
            generation: previous.unwrap_or(0) + 1,
            built_at: Utc::now(),
            concept_count,
        };

        tx.execute_batch(
            "DROP TABLE snomed_ancestors_descendants;
             ALTER TABLE snomed_ancestors_descendants_staging RENAME TO snomed_ancestors_descendants;",
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO closure_meta (id, generation, built_at, concept_count)
             VALUES (1, ?1, ?2, ?3)",
            params![info.generation, info.built_at, info.concept_count],
        )?;
        tx.commit()?;

        Ok(info)
    }
}

impl ClosureIndex for SqliteStore {
    fn reader(&self) -> ClosureResult<Box<dyn ClosureReader + '_>> {
        let conn = self.open_reader_connection()?;
        conn.execute_batch("BEGIN DEFERRED")?;

        // The first read pins the snapshot for the rest of the transaction.
        let info = match read_info(&conn) {
            Ok(info) => info,
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(e);
            }
        };

        Ok(Box::new(SqliteReader { conn, info }))
    }
}

fn read_info(conn: &Connection) -> ClosureResult<Option<RebuildInfo>> {
    let info = conn
        .query_row(
            "SELECT generation, built_at, concept_count FROM closure_meta WHERE id = 1",
            [],
            |row| {
                Ok(RebuildInfo {
                    generation: row.get(0)?,
                    built_at: row.get::<_, DateTime<Utc>>(1)?,
                    concept_count: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(info)
}

struct SqliteBatch<'a> {
    conn: &'a Connection,
}

impl BatchWriter for SqliteBatch<'_> {
    fn reachable(&mut self, seed: ConceptId, direction: Direction) -> ClosureResult<ConceptSet> {
        let sql = match direction {
            Direction::Ancestors => ANCESTORS_SQL,
            Direction::Descendants => DESCENDANTS_SQL,
        };
        let query = || -> rusqlite::Result<ConceptSet> {
            let mut stmt = self.conn.prepare_cached(sql)?;
            let rows = stmt.query_map([seed], |row| row.get::<_, ConceptId>(0))?;
            rows.collect()
        };
        query().map_err(|e| ClosureError::traversal(seed, e.to_string()))
    }

    fn put(&mut self, record: &EncodedRecord) -> ClosureResult<()> {
        self.conn
            .prepare_cached(
                "INSERT OR REPLACE INTO snomed_ancestors_descendants_staging
                 (concept_id, ancestors, descendants) VALUES (?1, ?2, ?3)",
            )?
            .execute(params![
                record.concept_id,
                record.ancestors,
                record.descendants
            ])?;
        Ok(())
    }
}

enum ReaderConnection<'a> {
    Owned(Connection),
    Shared(MutexGuard<'a, Connection>),
}

impl Deref for ReaderConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self {
            Self::Owned(conn) => conn,
            Self::Shared(guard) => guard,
        }
    }
}

struct SqliteReader<'a> {
    conn: ReaderConnection<'a>,
    info: Option<RebuildInfo>,
}

impl ClosureReader for SqliteReader<'_> {
    fn info(&self) -> Option<&RebuildInfo> {
        self.info.as_ref()
    }

    fn encoded_record(&self, concept_id: ConceptId) -> ClosureResult<Option<EncodedRecord>> {
        let record = self
            .conn
            .prepare_cached(
                "SELECT ancestors, descendants FROM snomed_ancestors_descendants
                 WHERE concept_id = ?1",
            )?
            .query_row([concept_id], |row| {
                Ok(EncodedRecord {
                    concept_id,
                    ancestors: row.get(0)?,
                    descendants: row.get(1)?,
                })
            })
            .optional()?;
        Ok(record)
    }

    fn contains(&self, concept_id: ConceptId) -> ClosureResult<bool> {
        let found = self
            .conn
            .prepare_cached("SELECT 1 FROM snomed_ancestors_descendants WHERE concept_id = ?1")?
            .exists([concept_id])?;
        Ok(found)
    }

    fn concept_ids(&self) -> ClosureResult<Vec<ConceptId>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT concept_id FROM snomed_ancestors_descendants ORDER BY concept_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<ConceptId>, _>>()?;
        Ok(ids)
    }
}

impl Drop for SqliteReader<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.conn.execute_batch("COMMIT") {
            warn!(error = %e, "failed to end closure read transaction");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_edges(&[
                IsAEdge::new(200, 100),
                IsAEdge::new(300, 100),
                IsAEdge::new(400, 200),
            ])
            .unwrap();
        store
    }

    #[test]
    fn test_concept_ids_union_sorted() {
        let store = create_test_store();
        assert_eq!(store.concept_ids().unwrap(), vec![100, 200, 300, 400]);
        assert_eq!(store.edge_count().unwrap(), 3);
        assert_eq!(store.edges().unwrap().len(), 3);
    }

    #[test]
    fn test_ids_beyond_i64_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store
            .insert_edges(&[IsAEdge::new(10, 1), IsAEdge::new(u64::MAX, 1)])
            .unwrap_err();
        assert!(matches!(err, ClosureError::Sqlite(_)));
        assert_eq!(store.edge_count().unwrap(), 0);

        let largest = i64::MAX as u64;
        store.insert_edges(&[IsAEdge::new(largest, 1)]).unwrap();
        assert_eq!(store.concept_ids().unwrap(), vec![1, largest]);
    }

    #[test]
    fn test_recursive_reachability() {
        let store = create_test_store();
        store.begin_rebuild().unwrap();
        store
            .write_batch(&mut |w| {
                assert_eq!(
                    w.reachable(400, Direction::Ancestors)?.to_sorted_vec(),
                    vec![100, 200]
                );
                assert_eq!(
                    w.reachable(100, Direction::Descendants)?.to_sorted_vec(),
                    vec![200, 300, 400]
                );
                assert!(w.reachable(100, Direction::Ancestors)?.is_empty());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_unbuilt_index_reads_empty() {
        let store = create_test_store();
        let reader = store.reader().unwrap();
        assert!(reader.info().is_none());
        assert_eq!(reader.generation(), 0);
        assert!(reader.record(100).unwrap().is_none());
    }

    #[test]
    fn test_rolled_back_batch_not_staged() {
        let store = create_test_store();
        store.begin_rebuild().unwrap();

        let record = EncodedRecord {
            concept_id: 100,
            ancestors: Vec::new(),
            descendants: Vec::new(),
        };
        let result = store.write_batch(&mut |w| {
            w.put(&record)?;
            Err(ClosureError::traversal(200, "boom"))
        });
        assert!(result.is_err());

        // Nothing staged, so finishing with one record must fail
        assert!(store.finish_rebuild(1).is_err());
    }

    #[test]
    fn test_finish_rebuild_bumps_generation() {
        let store = create_test_store();
        for expected in 1..=2u64 {
            store.begin_rebuild().unwrap();
            store.finish_rebuild(0).unwrap();
            let reader = store.reader().unwrap();
            assert_eq!(reader.generation(), expected);
        }
    }
}
