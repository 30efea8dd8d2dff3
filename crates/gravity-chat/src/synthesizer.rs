//! Turns ranked evidence into response text.
//!
//! Whatever the implementation, every factual line must carry at least one
//! citation, or the text must say that nothing grounded was found.

use async_trait::async_trait;

use crate::error::ChatError;
use crate::types::{RetrievalResult, SourceFailure};

/// Characters of result content quoted per line.
const SNIPPET_CHARS: usize = 220;

/// Sentence used when no source returned anything usable.
pub const NO_GROUNDING: &str =
    "I couldn't find anything grounded for that in the knowledge base or the connected systems.";

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        query: &str,
        results: &[RetrievalResult],
        unavailable: &[SourceFailure],
    ) -> Result<String, ChatError>;
}

/// Extractive synthesizer: one cited line per result.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateSynthesizer;

#[async_trait]
impl Synthesizer for TemplateSynthesizer {
    async fn synthesize(
        &self,
        _query: &str,
        results: &[RetrievalResult],
        unavailable: &[SourceFailure],
    ) -> Result<String, ChatError> {
        let mut lines = Vec::with_capacity(results.len() + 2);
        if results.is_empty() {
            lines.push(NO_GROUNDING.to_string());
        } else {
            lines.push(if results.len() == 1 {
                "Here's what I found:".to_string()
            } else {
                format!("Here's what I found across {} items:", results.len())
            });
            for r in results {
                lines.push(format!(
                    "- {}: {} [{}]",
                    r.title,
                    snippet(&r.content),
                    r.citation
                ));
            }
        }

        if !unavailable.is_empty() {
            let names: Vec<String> = unavailable
                .iter()
                .map(|f| format!("{} ({})", f.source, f.reason))
                .collect();
            lines.push(format!(
                "Note: {} unavailable, so this may be incomplete.",
                names.join(", ")
            ));
        }
        Ok(lines.join("\n"))
    }
}

/// First line of `content`, cut to a char boundary.
fn snippet(content: &str) -> String {
    let line = content.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    if line.chars().count() <= SNIPPET_CHARS {
        return line.to_string();
    }
    let cut: String = line.chars().take(SNIPPET_CHARS).collect();
    format!("{}...", cut.trim_end())
}
