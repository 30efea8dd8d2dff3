//! Read-only source-control connector over an in-memory commit log.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use gravity_core::{Clock, Timestamp};

use super::Faults;
use crate::connector::Connector;
use crate::error::ConnectorError;
use crate::types::{
    matched_terms, query_terms, ActionOutcome, ConnectorDomain, EntityKind, EntityRef, Record,
    SearchScope,
};

const NAME: &str = "scm";
/// Shortest SHA prefix accepted for lookups.
const MIN_SHA_PREFIX: usize = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub author: String,
    pub message: String,
    pub files: Vec<String>,
    pub committed_at: Timestamp,
}

impl Commit {
    fn short_sha(&self) -> &str {
        &self.sha[..self.sha.len().min(MIN_SHA_PREFIX)]
    }

    fn to_record(&self) -> Record {
        Record {
            source_system: NAME.to_string(),
            uri: self.short_sha().to_string(),
            title: format!("{} {}", self.short_sha(), first_line(&self.message)),
            content: format!(
                "{} by {} touching {}",
                self.message,
                self.author,
                self.files.join(", ")
            ),
            updated_at: self.committed_at,
            fields: json!({ "sha": self.sha, "author": self.author, "files": self.files }),
        }
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or_default()
}

/// In-memory commit history. Serves commits, executes nothing.
pub struct SourceControlConnector {
    commits: RwLock<Vec<Commit>>,
    faults: Faults,
}

impl SourceControlConnector {
    pub fn new() -> Self {
        Self {
            commits: RwLock::new(Vec::new()),
            faults: Faults::default(),
        }
    }

    pub fn with_demo_data(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let scm = Self::new();
        let seed = [
            ("9f2c4e1a7b3d5f60", "bob", "Raise gateway timeout for checkout (PROJ-123)", "gateway/config.rs", 4),
            ("3a7d9e2b1c4f6a80", "alice", "Add token refresh to API authentication (PROJ-3)", "auth/token.rs", 28),
            ("c81b5f0d2e9a4c37", "dave", "Pin smoke test image in deployment pipeline", "ci/deploy.yml", 7),
            ("5e0a3c9f7d1b2e46", "carol", "Responsive grid for the frontend layout", "web/layout.css", 50),
        ];
        for (sha, author, message, file, age_hours) in seed {
            scm.record(Commit {
                sha: sha.to_string(),
                author: author.to_string(),
                message: message.to_string(),
                files: vec![file.to_string()],
                committed_at: now.plus_secs(-(age_hours * 3600)),
            });
        }
        scm
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    pub fn record(&self, commit: Commit) {
        if let Ok(mut commits) = self.commits.write() {
            commits.push(commit);
        }
    }

    fn snapshot(&self) -> Result<Vec<Commit>, ConnectorError> {
        self.commits
            .read()
            .map(|c| c.clone())
            .map_err(|e| ConnectorError::unavailable(NAME, format!("Lock poisoned: {}", e)))
    }
}

impl Default for SourceControlConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for SourceControlConnector {
    fn name(&self) -> &str {
        NAME
    }

    fn domain(&self) -> ConnectorDomain {
        ConnectorDomain {
            source_system: NAME.to_string(),
            entity_kinds: vec![EntityKind::Commit],
        }
    }

    async fn ping(&self) -> Result<(), ConnectorError> {
        self.faults.gate(NAME).await
    }

    async fn fetch_status(&self, entity: &EntityRef) -> Result<Record, ConnectorError> {
        self.faults.gate(NAME).await?;
        let EntityRef::Commit(sha) = entity else {
            return Err(ConnectorError::Unsupported(format!(
                "{} does not serve {} entities",
                NAME,
                entity.kind()
            )));
        };
        let sha = sha.to_lowercase();
        if sha.len() < MIN_SHA_PREFIX {
            return Err(ConnectorError::NotFound(format!("commit {}", sha)));
        }
        let matches: Vec<Commit> = self
            .snapshot()?
            .into_iter()
            .filter(|c| c.sha.starts_with(&sha))
            .collect();
        match matches.as_slice() {
            [only] => Ok(only.to_record()),
            [] => Err(ConnectorError::NotFound(format!("commit {}", sha))),
            _ => Err(ConnectorError::NotFound(format!("ambiguous commit prefix {}", sha))),
        }
    }

    async fn search_recent(
        &self,
        query: &str,
        scope: &SearchScope,
        limit: usize,
    ) -> Result<Vec<Record>, ConnectorError> {
        self.faults.gate(NAME).await?;
        let terms = query_terms(query);
        let mut hits: Vec<(usize, Commit)> = self
            .snapshot()?
            .into_iter()
            .filter(|c| scope.admits(c.committed_at))
            .map(|c| {
                let text = format!("{} {} {}", c.message, c.author, c.files.join(" "));
                (matched_terms(&terms, &text), c)
            })
            .filter(|(matched, _)| terms.is_empty() || *matched > 0)
            .collect();

        hits.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.committed_at.cmp(&a.1.committed_at)));
        Ok(hits
            .into_iter()
            .take(limit)
            .map(|(_, c)| c.to_record())
            .collect())
    }

    async fn execute(
        &self,
        action_type: &str,
        _params: &Value,
    ) -> Result<ActionOutcome, ConnectorError> {
        Err(ConnectorError::Unsupported(format!(
            "{} is read-only and cannot execute {}",
            NAME, action_type
        )))
    }
}
