//! Federated retrieval: vector search plus live connector queries.
//!
//! Every source runs concurrently on a [`JoinSet`] under its own timeout.
//! A source that fails or runs out of time is dropped and reported as
//! unavailable; the request only fails when no source answered at all, or
//! when the vector store reports misuse (unknown collection, wrong dimension).

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use gravity_connector::{Connector, ConnectorError, ConnectorRegistry, EntityRef, Record, SearchScope};
use gravity_core::config::RetrievalConfig;
use gravity_core::{Clock, Timestamp};
use gravity_vector::{EmbeddingService, MetadataFilter, SearchHit, VectorError, VectorStore};

use crate::error::ChatError;
use crate::synthesizer::{Synthesizer, TemplateSynthesizer};
use crate::types::{
    AggregationScope, Answer, Citation, ResultSource, RetrievalResult, SourceFailure,
};

/// Source system recorded for indexed chunks that carry none.
const DEFAULT_VECTOR_SOURCE: &str = "knowledge";

/// Results averaged into the answer confidence.
const CONFIDENCE_TOP_N: usize = 3;

#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub retrieval_k: usize,
    pub aggregation_k: usize,
    pub source_timeout: Duration,
    pub half_life_hours: f64,
    pub max_results: usize,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for AggregatorSettings {
    fn from(c: &RetrievalConfig) -> Self {
        Self {
            retrieval_k: c.retrieval_k,
            aggregation_k: c.aggregation_k,
            source_timeout: Duration::from_millis(c.source_timeout_ms),
            half_life_hours: c.recency_half_life_hours,
            max_results: c.max_results,
        }
    }
}

enum SourceOutcome {
    Hits(Vec<RetrievalResult>),
    Unavailable(String),
    /// Vector store misuse; fails the whole request.
    Fatal(VectorError),
}

pub struct RetrievalAggregator {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingService>,
    collection: String,
    registry: Arc<ConnectorRegistry>,
    synthesizer: Arc<dyn Synthesizer>,
    clock: Arc<dyn Clock>,
    settings: AggregatorSettings,
}

impl RetrievalAggregator {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingService>,
        collection: impl Into<String>,
        registry: Arc<ConnectorRegistry>,
        clock: Arc<dyn Clock>,
        settings: AggregatorSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            collection: collection.into(),
            registry,
            synthesizer: Arc::new(TemplateSynthesizer),
            clock,
            settings,
        }
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn Synthesizer>) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Answer `query` from every relevant source.
    ///
    /// `scope` is present for aggregation requests; it widens k, applies the
    /// time window and restricts connector searches to the hinted sources.
    /// Entity-bearing requests call `fetch_status` on the connectors whose
    /// domain serves those entities.
    pub async fn retrieve(
        &self,
        query: &str,
        entities: &[EntityRef],
        scope: Option<&AggregationScope>,
    ) -> Result<Answer, ChatError> {
        let aggregate = scope.is_some();
        let k = if aggregate {
            self.settings.aggregation_k
        } else {
            self.settings.retrieval_k
        };
        let now = self.clock.now();
        let since = scope.and_then(|s| s.since);
        let timeout = self.settings.source_timeout;

        let mut tasks: JoinSet<(String, SourceOutcome)> = JoinSet::new();

        // Vector search always runs.
        {
            let store = Arc::clone(&self.store);
            let embedder = Arc::clone(&self.embedder);
            let collection = self.collection.clone();
            let query = query.to_string();
            let half_life = self.settings.half_life_hours;
            tasks.spawn(async move {
                let search = vector_search(store, embedder, collection, query, k, since, now, half_life);
                let outcome = tokio::time::timeout(timeout, search)
                    .await
                    .unwrap_or_else(|_| SourceOutcome::Unavailable(timed_out(timeout)));
                ("vector".to_string(), outcome)
            });
        }

        let search_scope = SearchScope {
            since,
            entities: entities.to_vec(),
        };
        for (connector, served, search) in self.plan(entities, scope) {
            let query = query.to_string();
            let search_scope = search_scope.clone();
            tasks.spawn(async move {
                let name = connector.name().to_string();
                let work = query_connector(&*connector, &served, search.then_some((&query, &search_scope, k)));
                let outcome = match tokio::time::timeout(timeout, work).await {
                    Ok(Ok(records)) => SourceOutcome::Hits(
                        records.into_iter().map(|r| connector_result(&name, r, now)).collect(),
                    ),
                    Ok(Err(reason)) => SourceOutcome::Unavailable(reason),
                    Err(_) => SourceOutcome::Unavailable(timed_out(timeout)),
                };
                (name, outcome)
            });
        }

        let mut results = Vec::new();
        let mut unavailable = Vec::new();
        let mut answered = 0usize;
        while let Some(joined) = tasks.join_next().await {
            let (source, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "Source task did not complete");
                    unavailable.push(SourceFailure {
                        source: "unknown".to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            match outcome {
                SourceOutcome::Hits(hits) => {
                    debug!(source = %source, hits = hits.len(), "Source answered");
                    answered += 1;
                    results.extend(hits);
                }
                SourceOutcome::Unavailable(reason) => {
                    warn!(source = %source, reason = %reason, "Source unavailable, degrading");
                    unavailable.push(SourceFailure { source, reason });
                }
                // Dropping the JoinSet aborts the remaining sources.
                SourceOutcome::Fatal(e) => return Err(ChatError::Vector(e)),
            }
        }

        unavailable.sort_by(|a, b| a.source.cmp(&b.source));
        if answered == 0 {
            return Err(ChatError::NoSourcesAvailable(
                unavailable
                    .iter()
                    .map(|f| format!("{}: {}", f.source, f.reason))
                    .collect(),
            ));
        }

        let ranked = rank(results, self.settings.max_results);
        let response_text = self
            .synthesizer
            .synthesize(query, &ranked, &unavailable)
            .await?;

        info!(
            results = ranked.len(),
            answered,
            unavailable = unavailable.len(),
            aggregate,
            "Retrieval complete"
        );

        Ok(Answer {
            response_text,
            sources: ranked.iter().map(|r| r.citation.clone()).collect(),
            confidence: confidence_of(&ranked),
            results: ranked,
            unavailable,
        })
    }

    /// Connectors to query, the entities each should fetch, and whether
    /// each should also run a recent-activity search.
    fn plan(
        &self,
        entities: &[EntityRef],
        scope: Option<&AggregationScope>,
    ) -> Vec<(Arc<dyn Connector>, Vec<EntityRef>, bool)> {
        let routed = if entities.is_empty() {
            Vec::new()
        } else {
            self.registry.route(entities)
        };
        let searched = if scope.is_some() || entities.is_empty() {
            let sources = scope.map(|s| s.sources.as_slice()).unwrap_or(&[]);
            self.registry.by_source(sources)
        } else {
            Vec::new()
        };

        let mut plan: Vec<(Arc<dyn Connector>, Vec<EntityRef>, bool)> = Vec::new();
        for connector in routed {
            let domain = connector.domain();
            let served = entities
                .iter()
                .filter(|e| domain.serves(e.kind()))
                .cloned()
                .collect();
            plan.push((connector, served, false));
        }
        for connector in searched {
            match plan.iter_mut().find(|(c, _, _)| c.name() == connector.name()) {
                Some(entry) => entry.2 = true,
                None => plan.push((connector, Vec::new(), true)),
            }
        }
        plan
    }
}

fn timed_out(timeout: Duration) -> String {
    format!("timed out after {}ms", timeout.as_millis())
}

#[allow(clippy::too_many_arguments)]
async fn vector_search(
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingService>,
    collection: String,
    query: String,
    k: usize,
    since: Option<Timestamp>,
    now: Timestamp,
    half_life_hours: f64,
) -> SourceOutcome {
    let vector = match embedder.embed(&query).await {
        Ok(v) => v,
        Err(e) => return SourceOutcome::Unavailable(e.to_string()),
    };
    let filter = match since {
        Some(ts) => MetadataFilter::new().range("timestamp", Some(ts.0 as f64), None),
        None => MetadataFilter::new(),
    };
    match store.search(&collection, &vector, k, &filter).await {
        Ok(hits) => SourceOutcome::Hits(
            hits.into_iter()
                .filter_map(|h| vector_result(h, now, half_life_hours))
                .collect(),
        ),
        Err(e @ (VectorError::CollectionNotFound(_) | VectorError::DimensionMismatch { .. })) => {
            SourceOutcome::Fatal(e)
        }
        Err(e) => SourceOutcome::Unavailable(e.to_string()),
    }
}

/// Fetch served entities, then optionally search. Returns the failure
/// reason if the connector is unavailable.
async fn query_connector(
    connector: &dyn Connector,
    served: &[EntityRef],
    search: Option<(&String, &SearchScope, usize)>,
) -> Result<Vec<Record>, String> {
    let mut records = Vec::new();
    for entity in served {
        match connector.fetch_status(entity).await {
            Ok(record) => records.push(record),
            Err(e @ ConnectorError::Unavailable { .. }) => return Err(e.to_string()),
            Err(e) => debug!(connector = connector.name(), entity = %entity, error = %e, "No status"),
        }
    }
    if let Some((query, scope, limit)) = search {
        let found = connector
            .search_recent(query, scope, limit)
            .await
            .map_err(|e| e.to_string())?;
        records.extend(found);
    }
    Ok(records)
}

fn str_field<'a>(metadata: &'a Value, key: &str) -> Option<&'a str> {
    metadata
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Similarity decayed by age: halves every `half_life_hours`.
fn vector_result(hit: SearchHit, now: Timestamp, half_life_hours: f64) -> Option<RetrievalResult> {
    if hit.score <= 0.0 {
        return None;
    }
    let m = &hit.metadata;
    let updated_at = Timestamp(m.get("timestamp").and_then(Value::as_i64).unwrap_or(now.0));
    let decay = 0.5f64.powf(updated_at.hours_until(now) / half_life_hours);
    let score = hit.score * decay;

    let uri = str_field(m, "uri").unwrap_or(hit.chunk_id.as_str()).to_string();
    let source_system = str_field(m, "source_system")
        .unwrap_or(DEFAULT_VECTOR_SOURCE)
        .to_string();
    let title = str_field(m, "section_path").unwrap_or(uri.as_str()).to_string();
    debug!(chunk_id = %hit.chunk_id, similarity = hit.score, decay, score, "Vector hit");

    Some(RetrievalResult {
        source: ResultSource::Vector,
        score,
        title,
        content: str_field(m, "text").unwrap_or_default().to_string(),
        citation: Citation { source_system, uri },
        updated_at,
    })
}

/// Live records are scored by freshness alone.
fn connector_result(name: &str, record: Record, now: Timestamp) -> RetrievalResult {
    let score = 1.0 / (1.0 + record.updated_at.hours_until(now) / 24.0);
    RetrievalResult {
        source: ResultSource::Connector(name.to_string()),
        score,
        title: record.title,
        content: record.content,
        citation: Citation {
            source_system: record.source_system,
            uri: record.uri,
        },
        updated_at: record.updated_at,
    }
}

fn outranks(a: &RetrievalResult, b: &RetrievalResult) -> bool {
    a.score > b.score || (a.score == b.score && a.source.priority() < b.source.priority())
}

/// Deduplicate on citation keeping the better entry, then order by score
/// with connectors ahead of vector hits on ties.
pub(crate) fn rank(results: Vec<RetrievalResult>, max_results: usize) -> Vec<RetrievalResult> {
    let mut best: HashMap<Citation, RetrievalResult> = HashMap::new();
    for r in results {
        match best.entry(r.citation.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(r);
            }
            Entry::Occupied(mut slot) => {
                if outranks(&r, slot.get()) {
                    slot.insert(r);
                }
            }
        }
    }

    let mut ranked: Vec<RetrievalResult> = best.into_values().collect();
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.source.priority().cmp(&b.source.priority()))
            .then_with(|| a.citation.to_string().cmp(&b.citation.to_string()))
    });
    ranked.truncate(max_results);
    ranked
}

fn confidence_of(ranked: &[RetrievalResult]) -> f32 {
    let top: Vec<f64> = ranked
        .iter()
        .take(CONFIDENCE_TOP_N)
        .map(|r| r.score.clamp(0.0, 1.0))
        .collect();
    if top.is_empty() {
        return 0.0;
    }
    (top.iter().sum::<f64>() / top.len() as f64) as f32
}
