//! Gravity indexing pipeline.
//!
//! The IndexingPipeline turns a [`Document`] into a versioned chunk tree,
//! embeds each chunk, upserts the vectors with citation metadata, and
//! retires the previous version's chunk ids.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use gravity_vector::{EmbeddingService, VectorPoint, VectorStore};

use crate::chunk::{chunk, reconstruct_leaves, version_of};
use crate::error::IngestError;
use crate::models::{Chunk, ChunkConfig, Document, Embedding};

/// Outcome of indexing one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexReport {
    pub document_id: String,
    pub version: String,
    pub chunks: usize,
    /// Embeddings computed by the model for this run.
    pub embedded: usize,
    /// Embeddings served from the `(text hash, model)` cache.
    pub reused: usize,
    /// Chunk ids of the previous version that were deleted.
    pub retired: usize,
    /// The same version was already indexed; nothing was written.
    pub unchanged: bool,
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    version: String,
    chunks: Vec<Chunk>,
}

/// Chunk, embed, and upsert documents into one vector collection.
pub struct IndexingPipeline {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingService>,
    collection: String,
    config: ChunkConfig,
    catalog: RwLock<HashMap<String, CatalogEntry>>,
    cache: Mutex<HashMap<(String, String), Vec<f32>>>,
}

impl IndexingPipeline {
    /// Create a pipeline. Rejects an invalid chunk config before any I/O.
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingService>,
        collection: impl Into<String>,
        config: ChunkConfig,
    ) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self {
            store,
            embedder,
            collection: collection.into(),
            config,
            catalog: RwLock::new(HashMap::new()),
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Index a document, replacing any previously indexed version.
    pub async fn index(&self, document: &Document) -> Result<IndexReport, IngestError> {
        let chunks = chunk(document, &self.config)?;
        let version = version_of(document, &self.config);

        let previous = self.current_entry(&document.id)?;
        if previous.as_ref().is_some_and(|p| p.version == version) {
            debug!(document_id = %document.id, version = %version, "Document unchanged, skipping");
            return Ok(IndexReport {
                document_id: document.id.clone(),
                version,
                chunks: chunks.len(),
                embedded: 0,
                reused: 0,
                retired: 0,
                unchanged: true,
            });
        }

        let mut embedded = 0;
        let mut reused = 0;
        let mut points = Vec::with_capacity(chunks.len());
        for c in &chunks {
            let (embedding, cached) = self.embed_chunk(c).await?;
            if cached {
                reused += 1;
            } else {
                embedded += 1;
            }
            points.push(VectorPoint {
                id: embedding.chunk_id,
                vector: embedding.vector,
                metadata: chunk_metadata(c),
            });
        }
        self.store.upsert(&self.collection, points).await?;

        let stale: Vec<String> = previous
            .map(|p| p.chunks.into_iter().map(|c| c.id).collect())
            .unwrap_or_default();
        let retired = if stale.is_empty() {
            0
        } else {
            self.store.delete(&self.collection, &stale).await?
        };

        self.catalog
            .write()
            .map_err(|e| IngestError::Catalog(format!("Lock poisoned: {}", e)))?
            .insert(
                document.id.clone(),
                CatalogEntry {
                    version: version.clone(),
                    chunks: chunks.clone(),
                },
            );
        if retired > 0 {
            self.prune_cache()?;
        }

        info!(
            document_id = %document.id,
            version = %version,
            chunks = chunks.len(),
            embedded,
            reused,
            retired,
            "Document indexed"
        );

        Ok(IndexReport {
            document_id: document.id.clone(),
            version,
            chunks: chunks.len(),
            embedded,
            reused,
            retired,
            unchanged: false,
        })
    }

    /// Leaf-level text of the currently indexed version.
    pub fn reconstruct(&self, document_id: &str) -> Result<String, IngestError> {
        let entry = self
            .current_entry(document_id)?
            .ok_or_else(|| IngestError::UnknownDocument(document_id.to_string()))?;
        Ok(reconstruct_leaves(&entry.chunks))
    }

    /// Chunks of the currently indexed version, root first.
    pub fn chunks(&self, document_id: &str) -> Result<Vec<Chunk>, IngestError> {
        self.current_entry(document_id)?
            .map(|e| e.chunks)
            .ok_or_else(|| IngestError::UnknownDocument(document_id.to_string()))
    }

    /// Delete every chunk of a document from the collection and catalog.
    pub async fn remove(&self, document_id: &str) -> Result<usize, IngestError> {
        let entry = self
            .catalog
            .write()
            .map_err(|e| IngestError::Catalog(format!("Lock poisoned: {}", e)))?
            .remove(document_id)
            .ok_or_else(|| IngestError::UnknownDocument(document_id.to_string()))?;
        let ids: Vec<String> = entry.chunks.into_iter().map(|c| c.id).collect();
        let removed = self.store.delete(&self.collection, &ids).await?;
        self.prune_cache()?;
        info!(document_id, removed, "Document removed");
        Ok(removed)
    }

    pub fn document_count(&self) -> usize {
        self.catalog.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Number of cached `(text hash, model)` embeddings.
    pub fn cached_embeddings(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Drop cached embeddings whose text no longer appears in any indexed
    /// chunk.
    fn prune_cache(&self) -> Result<(), IngestError> {
        let live: HashSet<String> = self
            .catalog
            .read()
            .map_err(|e| IngestError::Catalog(format!("Lock poisoned: {}", e)))?
            .values()
            .flat_map(|entry| entry.chunks.iter().map(|c| text_hash(&c.text)))
            .collect();
        let mut cache = self
            .cache
            .lock()
            .map_err(|e| IngestError::Catalog(format!("Lock poisoned: {}", e)))?;
        let before = cache.len();
        cache.retain(|(hash, _), _| live.contains(hash));
        debug!(evicted = before - cache.len(), "Embedding cache pruned");
        Ok(())
    }

    fn current_entry(&self, document_id: &str) -> Result<Option<CatalogEntry>, IngestError> {
        let catalog = self
            .catalog
            .read()
            .map_err(|e| IngestError::Catalog(format!("Lock poisoned: {}", e)))?;
        Ok(catalog.get(document_id).cloned())
    }

    /// Embed a chunk, reusing the cached vector when its text is unchanged.
    async fn embed_chunk(&self, c: &Chunk) -> Result<(Embedding, bool), IngestError> {
        let model_id = self.embedder.model_id().to_string();
        let key = (text_hash(&c.text), model_id.clone());

        let cached = self
            .cache
            .lock()
            .map_err(|e| IngestError::Catalog(format!("Lock poisoned: {}", e)))?
            .get(&key)
            .cloned();
        if let Some(vector) = cached {
            return Ok((
                Embedding {
                    chunk_id: c.id.clone(),
                    vector,
                    model_id,
                },
                true,
            ));
        }

        // Empty chunks still need a point so the hierarchy stays complete.
        let input = if c.text.trim().is_empty() {
            c.metadata.uri.as_str()
        } else {
            c.text.as_str()
        };
        let vector = self
            .embedder
            .embed(input)
            .await
            .map_err(|e| IngestError::Embedding(e.to_string()))?;

        self.cache
            .lock()
            .map_err(|e| IngestError::Catalog(format!("Lock poisoned: {}", e)))?
            .insert(key, vector.clone());

        Ok((
            Embedding {
                chunk_id: c.id.clone(),
                vector,
                model_id,
            },
            false,
        ))
    }
}

fn text_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Metadata persisted next to each vector.
fn chunk_metadata(c: &Chunk) -> serde_json::Value {
    json!({
        "source_system": c.metadata.source_system,
        "uri": c.metadata.uri,
        "section_path": c.metadata.section_path,
        "timestamp": c.metadata.timestamp.0,
        "level": c.level,
        "parent_chunk_id": c.parent_chunk_id,
        "document_id": c.document_id,
        "text": c.text,
    })
}
