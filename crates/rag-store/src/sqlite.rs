//! SQLite-based chunk index.

use std::sync::{Mutex, Once};

use rusqlite::{params, Connection};
use tracing::{debug, info, warn};
use ulid::Ulid;

use rag_core::{Chunk, RagError, Result, Stats};

use crate::schema::{vec_schema, SCHEMA};

static VEC_EXTENSION: Once = Once::new();

/// Register sqlite-vec for every connection opened afterwards in this process.
fn register_vec_extension() {
    VEC_EXTENSION.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
}

/// In-memory chunk index with FTS5 keyword search and sqlite-vec vector search.
///
/// Built once per session at ingestion. Nothing is written to disk, so every
/// run re-ingests its corpus.
pub struct ChunkIndex {
    /// Connection wrapped in blocking Mutex.
    conn: Mutex<Connection>,

    /// Embedding dimension of the vector table.
    dimension: usize,

    /// Whether the vec0 table could be created.
    vec_enabled: bool,
}

impl ChunkIndex {
    /// Open an empty in-memory index for embeddings of `dimension`.
    pub fn open(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::invalid_argument("embedding dimension must be positive"));
        }

        register_vec_extension();

        let conn = Connection::open_in_memory()
            .map_err(|e| RagError::database(format!("Failed to open in-memory database: {}", e)))?;

        Self::init(conn, dimension)
    }

    /// Initialize the index with a connection.
    fn init(conn: Connection, dimension: usize) -> Result<Self> {
        Self::configure_connection(&conn)?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| RagError::database(format!("Failed to initialize schema: {}", e)))?;

        let vec_enabled = Self::vec_available(&conn)
            && match conn.execute_batch(&vec_schema(dimension)) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Failed to create vec table");
                    false
                }
            };

        if vec_enabled {
            info!(dimension, "sqlite-vec extension loaded successfully");
        } else {
            warn!("sqlite-vec extension not available - vector search disabled");
        }

        Ok(Self {
            conn: Mutex::new(conn),
            dimension,
            vec_enabled,
        })
    }

    /// Configure SQLite connection for an in-memory workload.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            "#,
        )
        .map_err(|e| RagError::database(format!("Failed to configure connection: {}", e)))?;

        Ok(())
    }

    /// Check that the vec0 module answers.
    fn vec_available(conn: &Connection) -> bool {
        conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0))
            .map(|version| debug!(%version, "sqlite-vec version"))
            .is_ok()
    }

    /// Check if vector search is available.
    pub fn vec_enabled(&self) -> bool {
        self.vec_enabled
    }

    /// Embedding dimension of the vector table.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Execute a blocking operation on the connection.
    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self.conn.lock().map_err(|e| RagError::database(e.to_string()))?;
        f(&conn)
    }

    /// Insert chunks in one transaction.
    pub fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| RagError::database(e.to_string()))?;

            {
                let mut stmt = tx
                    .prepare(
                        r#"
                        INSERT INTO chunks (id, source_doc, page, chunk_index, content, metadata)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                        "#,
                    )
                    .map_err(|e| RagError::database(e.to_string()))?;

                for chunk in chunks {
                    let metadata = serde_json::to_string(chunk.metadata())?;
                    stmt.execute(params![
                        chunk.id().to_string(),
                        chunk.source_doc(),
                        chunk.page(),
                        chunk.chunk_index(),
                        chunk.text(),
                        metadata,
                    ])
                    .map_err(|e| RagError::database(format!("Failed to insert chunk: {}", e)))?;
                }
            }

            tx.commit().map_err(|e| RagError::database(e.to_string()))?;

            debug!("Inserted {} chunks", chunks.len());
            Ok(())
        })
    }

    /// Store one embedding per chunk id.
    pub fn insert_embeddings(&self, chunk_ids: &[Ulid], embeddings: &[Vec<f32>]) -> Result<()> {
        if !self.vec_enabled {
            return Err(RagError::database("sqlite-vec extension not loaded"));
        }

        if chunk_ids.len() != embeddings.len() {
            return Err(RagError::invalid_argument(
                "chunk_ids and embeddings must have same length",
            ));
        }

        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimension) {
            return Err(RagError::invalid_argument(format!(
                "embedding has dimension {}, index expects {}",
                bad.len(),
                self.dimension
            )));
        }

        self.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| RagError::database(e.to_string()))?;

            {
                let mut stmt = tx
                    .prepare("INSERT INTO vec_chunks (chunk_id, embedding) VALUES (?1, ?2)")
                    .map_err(|e| RagError::database(e.to_string()))?;

                for (chunk_id, embedding) in chunk_ids.iter().zip(embeddings.iter()) {
                    stmt.execute(params![chunk_id.to_string(), vec_to_bytes(embedding)])
                        .map_err(|e| RagError::database(format!("Failed to insert embedding: {}", e)))?;
                }
            }

            tx.commit().map_err(|e| RagError::database(e.to_string()))?;

            debug!("Inserted {} embeddings", chunk_ids.len());
            Ok(())
        })
    }

    /// Number of indexed chunks.
    pub fn chunk_count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
                .map_err(|e| RagError::database(e.to_string()))
        })
    }

    /// BM25 keyword search, best match first.
    ///
    /// Every query term is quoted and the terms are OR-joined, so punctuation
    /// in questions never reaches the FTS5 parser. A query without any word
    /// characters matches nothing.
    pub fn keyword_search(&self, query: &str, k: usize) -> Result<Vec<(Chunk, f32)>> {
        let fts_query = match build_fts5_query(query) {
            Some(q) if k > 0 => q,
            _ => return Ok(Vec::new()),
        };

        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT c.id, c.source_doc, c.page, c.chunk_index, c.content, c.metadata,
                           bm25(chunks_fts) AS score
                    FROM chunks_fts f
                    JOIN chunks c ON c.rowid = f.rowid
                    WHERE chunks_fts MATCH ?1
                    ORDER BY score, c.rowid
                    LIMIT ?2
                    "#,
                )
                .map_err(|e| RagError::database(e.to_string()))?;

            let results = stmt
                .query_map(params![fts_query, k as i64], |row| {
                    let score: f64 = row.get(6)?;
                    Ok((row_to_chunk(row)?, (-score) as f32))
                })
                .map_err(|e| RagError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| RagError::database(e.to_string()))?;

            Ok(results)
        })
    }

    /// Nearest-neighbour search by cosine distance, most similar first.
    pub fn vector_search(&self, embedding: &[f32], k: usize) -> Result<Vec<(Chunk, f32)>> {
        if !self.vec_enabled {
            return Err(RagError::database("sqlite-vec extension not loaded"));
        }

        if k == 0 {
            return Ok(Vec::new());
        }

        let embedding_bytes = vec_to_bytes(embedding);

        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    WITH knn AS (
                        SELECT chunk_id, distance
                        FROM vec_chunks
                        WHERE embedding MATCH ?1 AND k = ?2
                    )
                    SELECT c.id, c.source_doc, c.page, c.chunk_index, c.content, c.metadata,
                           knn.distance
                    FROM knn
                    JOIN chunks c ON c.id = knn.chunk_id
                    ORDER BY knn.distance
                    "#,
                )
                .map_err(|e| RagError::database(e.to_string()))?;

            let results = stmt
                .query_map(params![embedding_bytes, k as i64], |row| {
                    let distance: f64 = row.get(6)?;
                    Ok((row_to_chunk(row)?, 1.0 - distance as f32))
                })
                .map_err(|e| RagError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| RagError::database(e.to_string()))?;

            Ok(results)
        })
    }

    /// Index statistics.
    pub fn stats(&self) -> Result<Stats> {
        let vec_enabled = self.vec_enabled;

        self.with_conn(move |conn| {
            let documents: u64 = conn
                .query_row("SELECT COUNT(DISTINCT source_doc) FROM chunks", [], |row| row.get(0))
                .map_err(|e| RagError::database(e.to_string()))?;

            let chunks: u64 = conn
                .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
                .map_err(|e| RagError::database(e.to_string()))?;

            let embeddings: u64 = if vec_enabled {
                conn.query_row("SELECT COUNT(*) FROM vec_chunks", [], |row| row.get(0))
                    .unwrap_or(0)
            } else {
                0
            };

            Ok(Stats {
                documents,
                chunks,
                embeddings,
            })
        })
    }
}

/// Convert a row to a Chunk.
///
/// Expects columns in the order id, source_doc, page, chunk_index, content, metadata.
fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
    let id_str: String = row.get(0)?;
    let metadata_str: Option<String> = row.get(5)?;

    Ok(Chunk::from_parts(
        Ulid::from_string(&id_str).unwrap_or_else(|_| Ulid::nil()),
        row.get(4)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        metadata_str
            .and_then(|m| serde_json::from_str(&m).ok())
            .unwrap_or_default(),
    ))
}

/// Convert f32 vector to bytes (little-endian).
fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Build an FTS5 query matching any of the query's terms.
fn build_fts5_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .filter(|term| term.chars().any(char::is_alphanumeric))
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}
