//! Vector store gateway and its in-memory backend.
//!
//! [`VectorStore`] is the typed boundary over a similarity-search backend.
//! [`MemoryVectorStore`] is a brute-force implementation: every search is a
//! full scan of the collection, which is fine for moderate corpus sizes and
//! keeps deletion semantics trivially exact.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::VectorError;
use crate::filter::MetadataFilter;

/// Distance metric, fixed per collection at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
    Dot,
    Euclidean,
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Cosine => write!(f, "cosine"),
            DistanceMetric::Dot => write!(f, "dot"),
            DistanceMetric::Euclidean => write!(f, "euclidean"),
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = VectorError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(DistanceMetric::Cosine),
            "dot" => Ok(DistanceMetric::Dot),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            _ => Err(VectorError::Config(format!("Unknown distance metric: {}", s))),
        }
    }
}

impl DistanceMetric {
    /// Higher is more similar for every metric.
    fn score(&self, a: &[f32], b: &[f32]) -> f64 {
        match self {
            DistanceMetric::Cosine => cosine_similarity(a, b),
            DistanceMetric::Dot => dot(a, b),
            DistanceMetric::Euclidean => {
                let d: f64 = a
                    .iter()
                    .zip(b.iter())
                    .map(|(x, y)| ((*x as f64) - (*y as f64)).powi(2))
                    .sum::<f64>()
                    .sqrt();
                1.0 / (1.0 + d)
            }
        }
    }
}

/// A point to upsert: chunk id, vector and its metadata payload.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: Value,
}

/// A single hit returned from a vector search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk_id: String,
    pub score: f64,
    pub metadata: Value,
}

/// Summary of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub points_count: usize,
}

/// Typed interface over a similarity-search backend.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a collection. Re-creating with identical parameters is a no-op.
    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<(), VectorError>;

    /// Insert or replace points. Either every point is written or none is.
    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<usize, VectorError>;

    /// Top-`k` points satisfying `filter`, best first.
    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>, VectorError>;

    /// Remove points by id. Returns how many existed.
    async fn delete(&self, collection: &str, ids: &[String]) -> Result<usize, VectorError>;

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, VectorError>;

    /// Drop a collection. Returns `false` if it did not exist.
    async fn delete_collection(&self, name: &str) -> Result<bool, VectorError>;
}

#[derive(Debug)]
struct Collection {
    dimension: usize,
    metric: DistanceMetric,
    points: HashMap<String, (Vec<f32>, Value)>,
}

impl Collection {
    fn check_dimension(&self, actual: usize) -> Result<(), VectorError> {
        if actual != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }
}

/// In-memory vector store using brute-force similarity.
///
/// Thread-safe via interior RwLock; cloning shares the same collections.
#[derive(Debug, Clone, Default)]
pub struct MemoryVectorStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned<E: fmt::Display>(e: E) -> VectorError {
        VectorError::Storage(format!("Lock poisoned: {}", e))
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<(), VectorError> {
        if name.trim().is_empty() {
            return Err(VectorError::Config("collection name must not be empty".into()));
        }
        if dimension == 0 {
            return Err(VectorError::Config("dimension must be positive".into()));
        }

        let mut collections = self.collections.write().map_err(Self::poisoned)?;
        if let Some(existing) = collections.get(name) {
            if existing.dimension == dimension && existing.metric == metric {
                return Ok(());
            }
            return Err(VectorError::Config(format!(
                "collection {} already exists with dimension {} and metric {}",
                name, existing.dimension, existing.metric
            )));
        }

        collections.insert(
            name.to_string(),
            Collection {
                dimension,
                metric,
                points: HashMap::new(),
            },
        );
        info!(collection = name, dimension, metric = %metric, "Collection created");
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<usize, VectorError> {
        let mut collections = self.collections.write().map_err(Self::poisoned)?;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| VectorError::CollectionNotFound(collection.to_string()))?;

        for point in &points {
            coll.check_dimension(point.vector.len())?;
        }

        let count = points.len();
        for point in points {
            coll.points.insert(point.id, (point.vector, point.metadata));
        }
        debug!(collection, count, "Points upserted");
        Ok(count)
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>, VectorError> {
        let collections = self.collections.read().map_err(Self::poisoned)?;
        let coll = collections
            .get(collection)
            .ok_or_else(|| VectorError::CollectionNotFound(collection.to_string()))?;
        coll.check_dimension(query.len())?;

        let mut scored: Vec<SearchHit> = coll
            .points
            .iter()
            .filter(|(_, (_, metadata))| filter.matches(metadata))
            .map(|(id, (vector, metadata))| SearchHit {
                chunk_id: id.clone(),
                score: coll.metric.score(query, vector),
                metadata: metadata.clone(),
            })
            .collect();

        // Descending score; id breaks ties so results are deterministic.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        scored.truncate(k);

        Ok(scored)
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<usize, VectorError> {
        let mut collections = self.collections.write().map_err(Self::poisoned)?;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| VectorError::CollectionNotFound(collection.to_string()))?;
        let removed = ids.iter().filter(|id| coll.points.remove(*id).is_some()).count();
        debug!(collection, removed, "Points deleted");
        Ok(removed)
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, VectorError> {
        let collections = self.collections.read().map_err(Self::poisoned)?;
        let coll = collections
            .get(name)
            .ok_or_else(|| VectorError::CollectionNotFound(name.to_string()))?;
        Ok(CollectionInfo {
            name: name.to_string(),
            dimension: coll.dimension,
            metric: coll.metric,
            points_count: coll.points.len(),
        })
    }

    async fn delete_collection(&self, name: &str) -> Result<bool, VectorError> {
        let mut collections = self.collections.write().map_err(Self::poisoned)?;
        Ok(collections.remove(name).is_some())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum()
}

/// Cosine similarity. Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot(a, b) / (mag_a * mag_b)
}
