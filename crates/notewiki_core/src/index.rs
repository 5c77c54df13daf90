use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::resolve::resolve;
use crate::tree::Tree;
use crate::wikilink::{self, LinkToken, SourceSpan};

/// An outgoing link with the canonical path its label resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedLink {
    pub raw_label: String,
    pub canonical_path: String,
}

/// A recognized link paired with the absolute location its target would
/// occupy on disk, for host-side navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigableLink {
    pub raw_label: String,
    pub span: SourceSpan,
    pub canonical_path: String,
    pub target: PathBuf,
}

/// Outgoing raw-label tokens of one document, in document order. Recomputed
/// fresh on every call; nothing is cached.
pub fn outgoing_links(content: &str) -> Vec<LinkToken> {
    wikilink::extract_links(content)
}

/// Outgoing links of the document at `doc_path`, each resolved against the
/// given tree snapshot.
pub fn resolved_outgoing_links(tree: &Tree, content: &str, doc_path: &str) -> Vec<ResolvedLink> {
    outgoing_links(content)
        .into_iter()
        .map(|token| ResolvedLink {
            canonical_path: resolve(tree, &token.raw_label, doc_path),
            raw_label: token.raw_label,
        })
        .collect()
}

/// Every recognized link in `content` paired with the absolute location its
/// label resolves to, whether or not a document exists there.
pub fn navigable_links(
    tree: &Tree,
    root: &Path,
    extension: &str,
    content: &str,
    doc_path: &str,
) -> Vec<NavigableLink> {
    outgoing_links(content)
        .into_iter()
        .map(|token| {
            let canonical_path = resolve(tree, &token.raw_label, doc_path);
            let target = document_file_path(root, extension, &canonical_path);
            NavigableLink {
                raw_label: token.raw_label,
                span: token.span,
                canonical_path,
                target,
            }
        })
        .collect()
}

/// Source documents whose outgoing links resolve to `target_doc_path`.
///
/// Scans the whole corpus: one read, extraction and resolution pass per
/// document, against the single tree snapshot passed in. The cost is
/// proportional to corpus size times document size, which is why callers
/// invoke this on active-document changes rather than per keystroke.
pub async fn incoming_links(
    tree: &Tree,
    root: &Path,
    extension: &str,
    target_doc_path: &str,
) -> Result<Vec<String>> {
    let target = canonical_form(target_doc_path);
    let mut sources = Vec::new();

    for entry in tree.documents() {
        let file = document_file_path(root, extension, &entry.path);
        let content = tokio::fs::read_to_string(&file)
            .await
            .with_context(|| format!("failed to read {}", file.display()))?;
        let links_to_target = outgoing_links(&content)
            .iter()
            .any(|token| resolve(tree, &token.raw_label, &entry.path) == target);
        if links_to_target {
            sources.push(entry.path);
        }
    }

    debug!(
        target_path = %target,
        sources = sources.len(),
        "computed incoming links"
    );
    Ok(sources)
}

/// Link-target candidates: every document as a root-relative path without
/// the leading slash, sorted ascending by modification time so longer-lived
/// documents come first; ties keep tree traversal order.
pub fn completion_candidates(tree: &Tree) -> Vec<String> {
    let mut entries = tree.documents();
    entries.sort_by_key(|entry| entry.last_modified);
    entries
        .into_iter()
        .map(|entry| entry.path.trim_start_matches('/').to_string())
        .collect()
}

/// Absolute on-disk location of the document a canonical path names.
pub fn document_file_path(root: &Path, extension: &str, canonical_path: &str) -> PathBuf {
    let mut out = root.to_path_buf();
    let segments: Vec<&str> = canonical_path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    if let Some((last, parents)) = segments.split_last() {
        for parent in parents {
            out.push(parent);
        }
        out.push(format!("{last}.{extension}"));
    }
    out
}

fn canonical_form(doc_path: &str) -> String {
    if doc_path.starts_with('/') {
        doc_path.to_string()
    } else {
        format!("/{doc_path}")
    }
}
