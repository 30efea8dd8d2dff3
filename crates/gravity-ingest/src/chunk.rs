//! Hierarchical sliding-window chunker.
//!
//! # Algorithm
//!
//! 1. Split the text into tokens: a maximal non-whitespace run plus the
//!    whitespace that follows it. Leading whitespace belongs to the first
//!    token, so concatenating every token reproduces the text exactly.
//! 2. Slide a window of `leaf_size` tokens with stride
//!    `leaf_size - overlap` to produce leaf passages. The last window ends
//!    at the last token.
//! 3. Group consecutive siblings `fan_out` at a time into parents whose
//!    text is an extractive digest of their children, repeating until a
//!    single root remains. Once `max_depth` is reached the root absorbs all
//!    remaining nodes.
//! 4. Number levels top-down (root = 0) and mint ids of the form
//!    `{document_id}:{version}:{level}:{ordinal}`.
//!
//! A document of at most `leaf_size` tokens yields a single level-0 chunk
//! holding the full text.

use std::ops::Range;

use sha2::{Digest, Sha256};

use crate::error::IngestError;
use crate::models::{Chunk, ChunkConfig, ChunkMetadata, Document, TokenSpan};

/// Number of hex characters kept from the version fingerprint.
const VERSION_LEN: usize = 12;

/// Split a document into an ordered chunk tree, root first, then each
/// level left to right.
pub fn chunk(document: &Document, config: &ChunkConfig) -> Result<Vec<Chunk>, IngestError> {
    config.validate()?;

    let text = document.raw_text.as_str();
    let tokens = tokenize(text);
    let version = version_of(document, config);
    let headings = headings(text);

    let mut layers: Vec<Vec<Node>> = vec![leaf_nodes(text, &tokens, config)];
    while let Some(below) = layers.last().filter(|layer| layer.len() > 1) {
        let group = if layers.len() as u32 >= config.max_depth {
            below.len()
        } else {
            config.fan_out
        };
        let parents = group_nodes(below, group, config.leaf_size);
        layers.push(parents);
    }

    let depth = layers.len();
    let level_of = |layer: usize| (depth - 1 - layer) as u32;
    let id_of = |layer: usize, ordinal: usize| {
        format!("{}:{}:{}:{}", document.id, version, level_of(layer), ordinal)
    };

    // parents[layer][ordinal] = ordinal of the parent in layer + 1.
    let mut parents: Vec<Vec<Option<usize>>> = layers.iter().map(|l| vec![None; l.len()]).collect();
    for layer in 1..depth {
        for (ordinal, node) in layers[layer].iter().enumerate() {
            for child in node.children.clone() {
                parents[layer - 1][child] = Some(ordinal);
            }
        }
    }

    let mut chunks = Vec::with_capacity(layers.iter().map(Vec::len).sum());
    for layer in (0..depth).rev() {
        for (ordinal, node) in layers[layer].iter().enumerate() {
            chunks.push(Chunk {
                id: id_of(layer, ordinal),
                document_id: document.id.clone(),
                parent_chunk_id: parents[layer][ordinal].map(|p| id_of(layer + 1, p)),
                level: level_of(layer),
                ordinal,
                text: node.text.clone(),
                token_span: node.span,
                metadata: ChunkMetadata {
                    source_system: document.source_system.clone(),
                    uri: document.uri.clone(),
                    section_path: section_at(&headings, node.span.byte_start),
                    timestamp: document.updated_at,
                },
            });
        }
    }

    Ok(chunks)
}

/// Stitch the deepest level of a chunk set back into the source text,
/// dropping the bytes shared by overlapping windows.
pub fn reconstruct_leaves(chunks: &[Chunk]) -> String {
    let Some(leaf_level) = chunks.iter().map(|c| c.level).max() else {
        return String::new();
    };
    let mut leaves: Vec<&Chunk> = chunks.iter().filter(|c| c.level == leaf_level).collect();
    leaves.sort_by_key(|c| c.ordinal);

    let mut out = String::new();
    let mut covered = 0;
    for leaf in leaves {
        let span = leaf.token_span;
        if span.byte_end <= covered && !out.is_empty() {
            continue;
        }
        let skip = covered.saturating_sub(span.byte_start);
        if let Some(tail) = leaf.text.get(skip..) {
            out.push_str(tail);
        }
        covered = span.byte_end;
    }
    out
}

#[derive(Debug)]
struct Node {
    span: TokenSpan,
    text: String,
    children: Range<usize>,
}

/// Byte ranges of each token.
pub(crate) fn tokenize(text: &str) -> Vec<(usize, usize)> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut seen_word = false;
    let mut in_trailing_ws = false;

    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if seen_word {
                in_trailing_ws = true;
            }
        } else {
            if in_trailing_ws {
                tokens.push((start, i));
                start = i;
                in_trailing_ws = false;
            }
            seen_word = true;
        }
    }
    if start < text.len() {
        tokens.push((start, text.len()));
    }
    tokens
}

fn span_of(tokens: &[(usize, usize)], range: Range<usize>) -> TokenSpan {
    TokenSpan {
        start: range.start,
        end: range.end,
        byte_start: tokens[range.start].0,
        byte_end: tokens[range.end - 1].1,
    }
}

fn leaf_nodes(text: &str, tokens: &[(usize, usize)], config: &ChunkConfig) -> Vec<Node> {
    let n = tokens.len();
    if n <= config.leaf_size {
        return vec![Node {
            span: TokenSpan {
                start: 0,
                end: n,
                byte_start: 0,
                byte_end: text.len(),
            },
            text: text.to_string(),
            children: 0..0,
        }];
    }

    let stride = config.leaf_size - config.overlap;
    let mut leaves = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + config.leaf_size).min(n);
        let span = span_of(tokens, start..end);
        leaves.push(Node {
            span,
            text: text[span.byte_start..span.byte_end].to_string(),
            children: 0..0,
        });
        if end == n {
            break;
        }
        start += stride;
    }
    leaves
}

fn group_nodes(below: &[Node], group: usize, leaf_size: usize) -> Vec<Node> {
    below
        .chunks(group)
        .enumerate()
        .map(|(g, kids)| {
            let first = g * group;
            let (head, tail) = (&kids[0].span, &kids[kids.len() - 1].span);
            Node {
                span: TokenSpan {
                    start: head.start,
                    end: tail.end,
                    byte_start: head.byte_start,
                    byte_end: tail.byte_end,
                },
                text: digest(kids, leaf_size),
                children: first..first + kids.len(),
            }
        })
        .collect()
}

/// Extractive digest: the opening tokens of each child, at most
/// `leaf_size` tokens in total. When there are more children than the
/// budget allows, the later ones are left out.
fn digest(kids: &[Node], leaf_size: usize) -> String {
    let per_child = (leaf_size / kids.len()).max(1);
    let mut budget = leaf_size;
    let mut parts = Vec::new();
    for kid in kids {
        if budget == 0 {
            break;
        }
        let tokens = tokenize(&kid.text);
        let take = per_child.min(budget).min(tokens.len());
        let cut = tokens.get(take.saturating_sub(1)).map_or(0, |t| t.1);
        let part = kid.text[..cut].trim();
        if !part.is_empty() {
            budget -= take;
            parts.push(part);
        }
    }
    parts.join("\n")
}

pub(crate) fn version_of(document: &Document, config: &ChunkConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document.raw_text.as_bytes());
    hasher.update(document.updated_at.0.to_le_bytes());
    hasher.update(config.fingerprint().as_bytes());
    let mut version = hex::encode(hasher.finalize());
    version.truncate(VERSION_LEN);
    version
}

#[derive(Debug)]
struct Heading {
    offset: usize,
    depth: usize,
    title: String,
}

fn headings(text: &str) -> Vec<Heading> {
    let mut found = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end();
        let depth = trimmed.bytes().take_while(|b| *b == b'#').count();
        if (1..=6).contains(&depth) && trimmed[depth..].starts_with(' ') {
            let title = trimmed[depth..].trim();
            if !title.is_empty() {
                found.push(Heading {
                    offset,
                    depth,
                    title: title.to_string(),
                });
            }
        }
        offset += line.len();
    }
    found
}

fn section_at(headings: &[Heading], byte: usize) -> String {
    let mut stack: Vec<&Heading> = Vec::new();
    for heading in headings.iter().take_while(|h| h.offset <= byte) {
        while stack.last().is_some_and(|top| top.depth >= heading.depth) {
            stack.pop();
        }
        stack.push(heading);
    }
    stack
        .iter()
        .map(|h| h.title.as_str())
        .collect::<Vec<_>>()
        .join(" > ")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use gravity_core::Timestamp;

    use super::*;

    fn doc(text: &str) -> Document {
        Document {
            id: "runbook".to_string(),
            source_system: "wiki".to_string(),
            uri: "wiki/runbook".to_string(),
            raw_text: text.to_string(),
            updated_at: Timestamp(1_700_000_000),
        }
    }

    fn config(leaf_size: usize, overlap: usize, max_depth: u32, fan_out: usize) -> ChunkConfig {
        ChunkConfig {
            leaf_size,
            overlap,
            max_depth,
            fan_out,
        }
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_tokenize_concatenation_is_lossless() {
        let text = "  leading\tand  trailing  \n\nünïcödé 🚀 words ";
        let tokens = tokenize(text);
        let rebuilt: String = tokens.iter().map(|(a, b)| &text[*a..*b]).collect();
        assert_eq!(rebuilt, text);
        assert_eq!(tokens.len(), 6);
        assert_eq!(&text[tokens[0].0..tokens[0].1], "  leading\t");
    }

    #[test]
    fn test_tokenize_empty_and_whitespace_only() {
        assert!(tokenize("").is_empty());
        assert_eq!(tokenize("   \n"), vec![(0, 4)]);
    }

    #[test]
    fn test_round_trip_across_configs() {
        let texts = [
            String::new(),
            "   ".to_string(),
            "single".to_string(),
            words(7),
            format!("  {}\n\n", words(53)),
            "# Título\n\nDéploiement échoué 🚀 à 10h.\tRollback   effectué.\n".repeat(9),
        ];
        let configs = [
            config(1, 0, 1, 2),
            config(4, 1, 2, 2),
            config(5, 4, 3, 3),
            config(16, 3, 4, 4),
            ChunkConfig::default(),
        ];
        for text in &texts {
            for cfg in &configs {
                let chunks = chunk(&doc(text), cfg).unwrap();
                assert_eq!(
                    &reconstruct_leaves(&chunks),
                    text,
                    "round trip failed for {:?} with {:?}",
                    text,
                    cfg
                );
            }
        }
    }

    #[test]
    fn test_short_document_yields_single_root() {
        let chunks = chunk(&doc("Restart the worker pool."), &config(10, 2, 3, 4)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].level, 0);
        assert!(chunks[0].parent_chunk_id.is_none());
        assert_eq!(chunks[0].text, "Restart the worker pool.");
    }

    #[test]
    fn test_hierarchy_invariant() {
        let chunks = chunk(&doc(&words(200)), &config(8, 2, 3, 3)).unwrap();
        let by_id: HashMap<&str, &Chunk> = chunks.iter().map(|c| (c.id.as_str(), c)).collect();

        let roots: Vec<_> = chunks.iter().filter(|c| c.parent_chunk_id.is_none()).collect();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].level, 0);
        assert_eq!(chunks[0].id, roots[0].id);

        for c in chunks.iter().filter(|c| c.level > 0) {
            let parent_id = c.parent_chunk_id.as_deref().unwrap();
            let parent = by_id[parent_id];
            assert_eq!(parent.level, c.level - 1);
            assert_eq!(parent.document_id, c.document_id);
            assert!(parent.token_span.start <= c.token_span.start);
            assert!(parent.token_span.end >= c.token_span.end);
        }
    }

    #[test]
    fn test_depth_never_exceeds_max_depth() {
        let chunks = chunk(&doc(&words(40)), &config(2, 0, 2, 2)).unwrap();
        let max_level = chunks.iter().map(|c| c.level).max().unwrap();
        assert_eq!(max_level, 2);
        assert_eq!(chunks.iter().filter(|c| c.level == 2).count(), 20);
        assert_eq!(chunks.iter().filter(|c| c.level == 1).count(), 10);
        assert_eq!(chunks.iter().filter(|c| c.level == 0).count(), 1);
    }

    #[test]
    fn test_leaves_share_overlap_tokens() {
        let chunks = chunk(&doc(&words(30)), &config(6, 2, 3, 4)).unwrap();
        let max_level = chunks.iter().map(|c| c.level).max().unwrap();
        let leaves: Vec<_> = chunks.iter().filter(|c| c.level == max_level).collect();
        for pair in leaves.windows(2) {
            assert_eq!(pair[1].token_span.start, pair[0].token_span.start + 4);
            assert_eq!(pair[0].token_span.end - pair[1].token_span.start, 2);
        }
        assert_eq!(leaves.last().unwrap().token_span.end, 30);
    }

    #[test]
    fn test_digest_is_bounded() {
        let chunks = chunk(&doc(&words(100)), &config(8, 0, 3, 4)).unwrap();
        for parent in chunks.iter().filter(|c| c.level < 2) {
            assert!(tokenize(&parent.text).len() <= 8, "digest too long: {}", parent.text);
            assert!(!parent.text.is_empty());
        }
    }

    #[test]
    fn test_capped_root_digest_stays_within_leaf_size() {
        // max_depth 1 forces the root to group all 50 leaves at once.
        let chunks = chunk(&doc(&words(400)), &config(8, 0, 1, 4)).unwrap();
        let root = chunks.iter().find(|c| c.level == 0).unwrap();
        assert_eq!(chunks.iter().filter(|c| c.level == 1).count(), 50);
        assert_eq!(tokenize(&root.text).len(), 8);
        assert!(root.text.starts_with("w0"));
    }

    #[test]
    fn test_ids_are_versioned_by_config_and_text() {
        let d = doc(&words(50));
        let a = chunk(&d, &config(8, 2, 3, 4)).unwrap();
        let again = chunk(&d, &config(8, 2, 3, 4)).unwrap();
        let b = chunk(&d, &config(8, 1, 3, 4)).unwrap();
        assert_eq!(a[0].id, again[0].id);
        assert_ne!(a[0].id, b[0].id);

        let mut edited = d.clone();
        edited.raw_text.push_str(" more");
        let c = chunk(&edited, &config(8, 2, 3, 4)).unwrap();
        assert_ne!(a[0].id, c[0].id);

        let parts: Vec<&str> = a[0].id.split(':').collect();
        assert_eq!(parts[0], "runbook");
        assert_eq!(parts[1].len(), VERSION_LEN);
        assert_eq!(parts[2], "0");
        assert_eq!(parts[3], "0");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = chunk(&doc("text"), &config(4, 4, 3, 4)).unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_section_path_breadcrumb() {
        let text = "# Runbook\nintro text here\n## Rollback\nstep one step two\n## Verify\ncheck dashboards now\n";
        let chunks = chunk(&doc(text), &config(3, 0, 3, 2)).unwrap();
        let max_level = chunks.iter().map(|c| c.level).max().unwrap();
        let leaves: Vec<_> = chunks.iter().filter(|c| c.level == max_level).collect();

        assert_eq!(leaves[0].metadata.section_path, "Runbook");
        assert!(leaves
            .iter()
            .any(|c| c.metadata.section_path == "Runbook > Rollback"));
        assert_eq!(leaves.last().unwrap().metadata.section_path, "Runbook > Verify");
        assert_eq!(chunks[0].metadata.uri, "wiki/runbook");
        assert_eq!(chunks[0].metadata.timestamp, Timestamp(1_700_000_000));
    }

    #[test]
    fn test_section_path_empty_without_headings() {
        let chunks = chunk(&doc("plain text only"), &ChunkConfig::default()).unwrap();
        assert_eq!(chunks[0].metadata.section_path, "");
    }
}
