use crate::tree::{Node, Tree};

/// Map a raw link label to a canonical document path, relative to the
/// referencing document's position in the tree.
///
/// Search order:
///
/// 1. A label starting with `/` is already absolute and passes through
///    untouched, bypassing all search.
/// 2. A referencing document sitting at the tree root resolves every label
///    to `/<label>` directly.
/// 3. A label whose own segments walk from the root to a document is an
///    exact root-relative match and wins over ancestor search.
/// 4. Otherwise the referencing document's folder chain is walked from the
///    root downward; the first descended folder whose subtree contains the
///    label anywhere beneath it decides, yielding
///    `<ancestor-path>/<label>`. The walk returns on its first hit, so the
///    shallowest containing ancestor wins, and the produced path keeps the
///    ancestor prefix even when the matching document sits deeper in that
///    subtree (see the tests for this deliberately preserved ordering).
/// 5. Anything else falls back to `/<label>`.
///
/// The function is total: an unresolvable label yields a syntactically valid
/// but dangling path, never an error.
pub fn resolve(tree: &Tree, raw_label: &str, referencing_doc_path: &str) -> String {
    if raw_label.starts_with('/') {
        return raw_label.to_string();
    }

    let referencing = referencing_doc_path
        .strip_prefix('/')
        .unwrap_or(referencing_doc_path);
    if referencing.is_empty() {
        return format!("/{raw_label}");
    }

    let label_segments: Vec<&str> = raw_label.split('/').collect();
    if tree.walks_to_document(&label_segments) {
        return format!("/{raw_label}");
    }

    let mut folders: Vec<&str> = referencing.split('/').collect();
    folders.pop(); // the document's own segment takes no part in the walk

    let mut current = tree;
    let mut ancestor_path = String::new();
    for segment in folders {
        match current.get(segment) {
            Some(Node::Folder { children, .. }) => {
                ancestor_path.push('/');
                ancestor_path.push_str(segment);
                current = children;
            }
            _ => return format!("/{raw_label}"),
        }
        if current.contains_document(&label_segments) {
            return format!("{ancestor_path}/{raw_label}");
        }
    }

    format!("/{raw_label}")
}
