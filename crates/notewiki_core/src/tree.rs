use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::debug;

/// One corpus entry. Documents are leaves named by their extension-stripped
/// stem; folders carry the recursively built subtree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Document {
        name: String,
        last_modified: SystemTime,
    },
    Folder {
        name: String,
        children: Tree,
    },
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Self::Document { name, .. } | Self::Folder { name, .. } => name,
        }
    }
}

/// An ordered sibling sequence in directory-listing order. Names are not
/// required to be unique across node kinds; lookups return the first match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

/// A document leaf flattened out of the tree: its canonical (root-relative,
/// extension-stripped) path and modification time.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEntry {
    pub path: String,
    pub last_modified: SystemTime,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First node with the given name, in listing order, regardless of kind.
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.name() == name)
    }

    /// Walk the label's own segments from this level. True only when every
    /// leading segment is a folder and the final segment lands on a document.
    pub fn walks_to_document(&self, segments: &[&str]) -> bool {
        let Some((last, folders)) = segments.split_last() else {
            return false;
        };
        let mut current = self;
        for segment in folders {
            match current.get(segment) {
                Some(Node::Folder { children, .. }) => current = children,
                _ => return false,
            }
        }
        matches!(current.get(last), Some(Node::Document { .. }))
    }

    /// True when the label's segments walk to a document at this level or at
    /// any folder anywhere beneath it.
    pub fn contains_document(&self, segments: &[&str]) -> bool {
        if self.walks_to_document(segments) {
            return true;
        }
        self.nodes.iter().any(|node| match node {
            Node::Folder { children, .. } => children.contains_document(segments),
            Node::Document { .. } => false,
        })
    }

    /// Every document leaf as a canonical path plus modification time, in
    /// depth-first traversal order.
    pub fn documents(&self) -> Vec<DocumentEntry> {
        let mut out = Vec::new();
        collect_documents(self, "", &mut out);
        out
    }
}

fn collect_documents(tree: &Tree, prefix: &str, out: &mut Vec<DocumentEntry>) {
    for node in &tree.nodes {
        match node {
            Node::Document {
                name,
                last_modified,
            } => out.push(DocumentEntry {
                path: format!("{prefix}/{name}"),
                last_modified: *last_modified,
            }),
            Node::Folder { name, children } => {
                collect_documents(children, &format!("{prefix}/{name}"), out);
            }
        }
    }
}

/// Build the corpus tree by recursively listing `root`.
///
/// Entries whose name starts with `.` are skipped. Files must match
/// `<stem>.<extension>` to become documents; the stem becomes the node name
/// and the file's mtime is recorded. Directories recurse into folder nodes.
/// Emission order follows the underlying listing order; nothing is sorted.
/// Listing and stat failures propagate to the caller and are not retried.
pub async fn build_tree(root: &Path, extension: &str) -> Result<Tree> {
    let tree = walk_dir(root.to_path_buf(), format!(".{extension}")).await?;
    debug!(
        root = %root.display(),
        documents = tree.documents().len(),
        "built corpus tree"
    );
    Ok(tree)
}

fn walk_dir(dir: PathBuf, dot_extension: String) -> BoxFuture<'static, Result<Tree>> {
    async move {
        let mut nodes = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("failed to list {}", dir.display()))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("failed to read an entry of {}", dir.display()))?
        {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }

            let file_type = entry
                .file_type()
                .await
                .with_context(|| format!("failed to inspect {}", entry.path().display()))?;
            if file_type.is_dir() {
                let children = walk_dir(entry.path(), dot_extension.clone()).await?;
                nodes.push(Node::Folder {
                    name: name.to_string(),
                    children,
                });
            } else if file_type.is_file()
                && let Some(stem) = name.strip_suffix(dot_extension.as_str())
                && !stem.is_empty()
            {
                let metadata = entry
                    .metadata()
                    .await
                    .with_context(|| format!("failed to stat {}", entry.path().display()))?;
                let last_modified = metadata
                    .modified()
                    .with_context(|| format!("no modification time for {}", entry.path().display()))?;
                nodes.push(Node::Document {
                    name: stem.to_string(),
                    last_modified,
                });
            }
        }

        Ok(Tree::new(nodes))
    }
    .boxed()
}
