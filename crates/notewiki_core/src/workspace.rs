use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::debug;

use crate::config::NoteConfig;
use crate::index::{self, NavigableLink, ResolvedLink};
use crate::render::{self, RenderContext, RenderedDocument};
use crate::resolve::resolve;
use crate::snapshot::TreeHandle;
use crate::tree::{self, Tree};
use crate::wikilink;

/// One row of the incoming/outgoing listing for an active document: a
/// human-facing label and the absolute location to navigate to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    pub label: String,
    pub target: PathBuf,
}

/// Link listing for the active document, both directions.
#[derive(Debug, Clone, Serialize)]
pub struct LinkListing {
    pub outgoing: Vec<ListingEntry>,
    pub incoming: Vec<ListingEntry>,
}

/// The host-facing surface over one corpus root.
///
/// The tree snapshot starts uninitialized and is populated by the first
/// [`Workspace::rebuild`]; structural change events re-run the rebuild, each
/// independently (no coalescing), and the last completion wins. Readers pin
/// whatever snapshot is current when they start and never block a rebuild.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    extension: String,
    tree: TreeHandle,
}

impl Workspace {
    /// Open the corpus rooted at `root`. The root must exist; a missing root
    /// disables the whole feature set rather than degrading.
    pub fn open(root: impl Into<PathBuf>, config: &NoteConfig) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            bail!("corpus root does not exist: {}", root.display());
        }
        Ok(Self {
            root,
            extension: config.doc_extension(),
            tree: TreeHandle::new(),
        })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    pub fn doc_extension(&self) -> &str {
        &self.extension
    }

    /// Rebuild the tree from scratch and commit it as the shared snapshot.
    /// Failures propagate and leave the previous snapshot authoritative.
    pub async fn rebuild(&self) -> Result<Arc<Tree>> {
        let tree = tree::build_tree(&self.root, &self.extension)
            .await
            .with_context(|| format!("failed to rebuild tree for {}", self.root.display()))?;
        debug!(root = %self.root.display(), "committing rebuilt tree");
        Ok(self.tree.replace(tree))
    }

    /// Latest committed snapshot, if the initial population has happened.
    pub fn tree(&self) -> Option<Arc<Tree>> {
        self.tree.load()
    }

    /// Current snapshot, populating it on first use.
    pub async fn ensure_tree(&self) -> Result<Arc<Tree>> {
        match self.tree.load() {
            Some(tree) => Ok(tree),
            None => self.rebuild().await,
        }
    }

    /// Resolve one label as if written inside the document at `doc_path`.
    pub async fn resolve_label(&self, raw_label: &str, doc_path: &str) -> Result<String> {
        let tree = self.ensure_tree().await?;
        Ok(resolve(&tree, raw_label, doc_path))
    }

    /// Outgoing links of the document at `doc_path`, resolved.
    pub async fn outgoing_links(&self, doc_path: &str) -> Result<Vec<ResolvedLink>> {
        let tree = self.ensure_tree().await?;
        let content = self.read_document(doc_path).await?;
        Ok(index::resolved_outgoing_links(&tree, &content, doc_path))
    }

    /// Source documents linking to the document at `doc_path`.
    pub async fn incoming_links(&self, doc_path: &str) -> Result<Vec<String>> {
        let tree = self.ensure_tree().await?;
        index::incoming_links(&tree, &self.root, &self.extension, doc_path).await
    }

    /// Incoming and outgoing listing for the active document, each entry
    /// carrying a label and a navigation target.
    pub async fn link_listing(&self, doc_path: &str) -> Result<LinkListing> {
        let tree = self.ensure_tree().await?;
        let content = self.read_document(doc_path).await?;

        let outgoing = index::resolved_outgoing_links(&tree, &content, doc_path)
            .into_iter()
            .map(|link| ListingEntry {
                target: index::document_file_path(&self.root, &self.extension, &link.canonical_path),
                label: link.raw_label,
            })
            .collect();

        let incoming = index::incoming_links(&tree, &self.root, &self.extension, doc_path)
            .await?
            .into_iter()
            .map(|source| ListingEntry {
                target: index::document_file_path(&self.root, &self.extension, &source),
                label: source,
            })
            .collect();

        Ok(LinkListing { outgoing, incoming })
    }

    /// (span, absolute location) pairs for every recognized link in the
    /// document at `doc_path`.
    pub async fn navigable_links(&self, doc_path: &str) -> Result<Vec<NavigableLink>> {
        let tree = self.ensure_tree().await?;
        let content = self.read_document(doc_path).await?;
        Ok(index::navigable_links(
            &tree,
            &self.root,
            &self.extension,
            &content,
            doc_path,
        ))
    }

    /// Candidate completion labels, oldest documents first, optionally
    /// filtered by the partial label of an open `[[` on the edited line.
    pub async fn completion_candidates(&self, line_prefix: Option<&str>) -> Result<Vec<String>> {
        let tree = self.ensure_tree().await?;
        let candidates = index::completion_candidates(&tree);
        match line_prefix {
            None => Ok(candidates),
            Some(line) => match wikilink::completion_prefix(line) {
                None => Ok(Vec::new()),
                Some(prefix) => Ok(candidates
                    .into_iter()
                    .filter(|candidate| candidate.starts_with(prefix))
                    .collect()),
            },
        }
    }

    /// Render the document at `doc_path` to HTML with wiki-link anchors.
    pub async fn render_document(&self, doc_path: &str) -> Result<RenderedDocument> {
        let tree = self.ensure_tree().await?;
        let content = self.read_document(doc_path).await?;
        let ctx = RenderContext {
            tree: &tree,
            doc_path,
            extension: &self.extension,
        };
        Ok(render::to_html(&content, &ctx))
    }

    /// Absolute on-disk location for a canonical document path.
    pub fn document_file_path(&self, doc_path: &str) -> PathBuf {
        index::document_file_path(&self.root, &self.extension, doc_path)
    }

    async fn read_document(&self, doc_path: &str) -> Result<String> {
        let file = self.document_file_path(doc_path);
        tokio::fs::read_to_string(&file)
            .await
            .with_context(|| format!("failed to read {}", file.display()))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use super::Workspace;
    use crate::config::NoteConfig;

    fn write_file(path: &Path, content: &str) {
        let parent = path.parent().expect("parent");
        fs::create_dir_all(parent).expect("create parent");
        fs::write(path, content).expect("write file");
    }

    fn corpus() -> (tempfile::TempDir, Workspace) {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().to_path_buf();
        write_file(&root.join("Alpha.md"), "start at [[Beta]] and [[Ghost]]");
        write_file(&root.join("Beta.md"), "back to [[Alpha]]");
        write_file(&root.join("Notes").join("Gamma.md"), "see [[/Alpha]]");
        let workspace = Workspace::open(root, &NoteConfig::default()).expect("open");
        (temp, workspace)
    }

    #[test]
    fn open_requires_an_existing_root() {
        let temp = tempdir().expect("tempdir");
        let missing = temp.path().join("absent");
        let error =
            Workspace::open(missing, &NoteConfig::default()).expect_err("must fail");
        assert!(error.to_string().contains("corpus root does not exist"));
    }

    #[tokio::test]
    async fn tree_is_unset_until_first_rebuild() {
        let (_temp, workspace) = corpus();
        assert!(workspace.tree().is_none());
        workspace.rebuild().await.expect("rebuild");
        assert!(workspace.tree().is_some());
    }

    #[tokio::test]
    async fn ensure_tree_populates_once_and_reuses_the_snapshot() {
        let (_temp, workspace) = corpus();
        let first = workspace.ensure_tree().await.expect("ensure");
        let second = workspace.ensure_tree().await.expect("ensure");
        assert!(std::sync::Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn readers_keep_their_snapshot_while_a_rebuild_commits() {
        let (temp, workspace) = corpus();
        let held = workspace.ensure_tree().await.expect("ensure");

        write_file(&temp.path().join("Delta.md"), "fresh");
        workspace.rebuild().await.expect("rebuild");

        assert!(held.get("Delta").is_none());
        let fresh = workspace.tree().expect("fresh snapshot");
        assert!(fresh.get("Delta").is_some());
    }

    #[tokio::test]
    async fn resolve_label_uses_the_corpus() {
        let (_temp, workspace) = corpus();
        assert_eq!(
            workspace.resolve_label("Beta", "/Alpha").await.expect("resolve"),
            "/Beta"
        );
        assert_eq!(
            workspace
                .resolve_label("Gamma", "/Notes/Gamma")
                .await
                .expect("resolve"),
            "/Notes/Gamma"
        );
    }

    #[tokio::test]
    async fn outgoing_and_incoming_agree() {
        let (_temp, workspace) = corpus();
        let outgoing = workspace.outgoing_links("/Alpha").await.expect("outgoing");
        let labels: Vec<&str> = outgoing
            .iter()
            .map(|link| link.canonical_path.as_str())
            .collect();
        assert_eq!(labels, vec!["/Beta", "/Ghost"]);

        let mut incoming = workspace.incoming_links("/Alpha").await.expect("incoming");
        incoming.sort();
        assert_eq!(incoming, vec!["/Beta", "/Notes/Gamma"]);
    }

    #[tokio::test]
    async fn link_listing_carries_navigation_targets() {
        let (_temp, workspace) = corpus();
        let listing = workspace.link_listing("/Alpha").await.expect("listing");

        assert_eq!(listing.outgoing.len(), 2);
        assert_eq!(listing.outgoing[0].label, "Beta");
        assert_eq!(
            listing.outgoing[0].target,
            workspace.document_file_path("/Beta")
        );
        // The dangling link still gets a navigation target.
        assert_eq!(listing.outgoing[1].label, "Ghost");
        assert!(listing.outgoing[1].target.ends_with("Ghost.md"));

        let mut incoming_labels: Vec<String> = listing
            .incoming
            .iter()
            .map(|entry| entry.label.clone())
            .collect();
        incoming_labels.sort();
        assert_eq!(incoming_labels, vec!["/Beta", "/Notes/Gamma"]);
    }

    #[tokio::test]
    async fn navigable_links_report_spans_and_targets() {
        let (_temp, workspace) = corpus();
        let links = workspace.navigable_links("/Beta").await.expect("links");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].raw_label, "Alpha");
        assert_eq!(links[0].span.line, 0);
        assert_eq!(links[0].target, workspace.document_file_path("/Alpha"));
    }

    #[tokio::test]
    async fn completion_candidates_filter_on_open_delimiter() {
        let (_temp, workspace) = corpus();

        let all = workspace.completion_candidates(None).await.expect("all");
        assert_eq!(all.len(), 3);

        let filtered = workspace
            .completion_candidates(Some("go [[Not"))
            .await
            .expect("filtered");
        assert_eq!(filtered, vec!["Notes/Gamma"]);

        let closed = workspace
            .completion_candidates(Some("done [[x]] typing"))
            .await
            .expect("closed");
        assert!(closed.is_empty());
    }

    #[tokio::test]
    async fn render_document_produces_anchors() {
        let (_temp, workspace) = corpus();
        let rendered = workspace.render_document("/Alpha").await.expect("render");
        assert!(rendered.html.contains(r#"href="/Beta.md""#));
        assert!(rendered.html.contains(r#"href="/Ghost.md""#));
        assert_eq!(rendered.links.len(), 2);
    }

    #[tokio::test]
    async fn missing_document_read_propagates() {
        let (_temp, workspace) = corpus();
        let error = workspace
            .outgoing_links("/DoesNotExist")
            .await
            .expect_err("must fail");
        assert!(error.to_string().contains("failed to read"));
    }
}
