use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::tree::Tree;

/// Shared corpus snapshot: unset at startup, populated by the first rebuild,
/// replaced atomically by every later one.
///
/// Readers always pull the latest committed snapshot and keep whatever `Arc`
/// they loaded across a swap, so an in-flight rebuild never blocks them.
/// Concurrent rebuilds are not coalesced; the last store wins.
#[derive(Debug)]
pub struct TreeHandle {
    current: ArcSwapOption<Tree>,
}

impl TreeHandle {
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
        }
    }

    /// Latest committed snapshot, if any rebuild has completed yet.
    pub fn load(&self) -> Option<Arc<Tree>> {
        self.current.load_full()
    }

    /// Commit a freshly built tree and hand back the shared snapshot.
    pub fn replace(&self, tree: Tree) -> Arc<Tree> {
        let tree = Arc::new(tree);
        self.current.store(Some(Arc::clone(&tree)));
        tree
    }
}

impl Default for TreeHandle {
    fn default() -> Self {
        Self::new()
    }
}
