//! Startup indexing of a local directory of knowledge documents.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use gravity_core::Timestamp;
use gravity_ingest::{Document, IndexingPipeline};

const SEED_EXTENSIONS: &[&str] = &["md", "txt"];

/// Source system recorded on every seeded chunk.
pub const SEED_SOURCE: &str = "knowledge";

/// Index every `.md` / `.txt` file directly under `dir`.
///
/// Unreadable or unindexable files are logged and skipped. Returns the
/// number of documents indexed.
pub async fn index_seed_dir(pipeline: &IndexingPipeline, dir: &Path) -> std::io::Result<usize> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_seed_extension(p))
        .collect();
    paths.sort();

    let mut indexed = 0;
    for path in paths {
        let document = match read_document(&path) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable seed file");
                continue;
            }
        };
        match pipeline.index(&document).await {
            Ok(report) => {
                debug!(
                    document = %report.document_id,
                    chunks = report.chunks,
                    "Seed document indexed"
                );
                indexed += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to index seed file");
            }
        }
    }

    info!(dir = %dir.display(), documents = indexed, "Seed directory indexed");
    Ok(indexed)
}

fn has_seed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SEED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn read_document(path: &Path) -> std::io::Result<Document> {
    let raw_text = std::fs::read_to_string(path)?;
    let updated_at = std::fs::metadata(path)?
        .modified()
        .map(|t| Timestamp::from_datetime(DateTime::<Utc>::from(t)))
        .unwrap_or_else(|_| Timestamp::now());
    let id = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    Ok(Document {
        id,
        source_system: SEED_SOURCE.to_string(),
        uri: path.display().to_string(),
        raw_text,
        updated_at,
    })
}
