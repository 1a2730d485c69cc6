use indextree::NodeId;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::tree::FileTree;

/// Descendant counts for every node of a subtree.
///
/// Counts exclude the node itself: a file has 0, a directory holding two
/// files has 2. The radial layout weights sectors by the same exclusive
/// convention (own footprint plus the footprints of its descendants).
pub struct SubtreeMetrics {
    descendants: HashMap<NodeId, usize>,
}

impl SubtreeMetrics {
    /// Single post-order pass over the subtree rooted at `root`.
    pub fn compute(tree: &FileTree, root: NodeId) -> Self {
        let arena = tree.get_arena();
        let preorder: Vec<NodeId> = root.descendants(arena).collect();
        let mut descendants: HashMap<NodeId, usize> = HashMap::with_capacity(preorder.len());

        // Reverse pre-order visits children before their parent
        for &id in preorder.iter().rev() {
            let count: usize = tree
                .children(id)
                .map(|child| descendants.get(&child).copied().unwrap_or(0) + 1)
                .sum();
            descendants.insert(id, count);
        }

        Self { descendants }
    }

    pub fn descendants(&self, id: NodeId) -> usize {
        self.descendants.get(&id).copied().unwrap_or(0)
    }
}

/// Number of nodes below `node`, excluding `node`.
pub fn count_descendants(tree: &FileTree, node: NodeId) -> usize {
    node.descendants(tree.get_arena()).count().saturating_sub(1)
}

/// Every directory under (and including) `root` with at least `threshold`
/// descendants, in layout pre-order.
///
/// Nested matches are all reported. Read-only.
pub fn find_large_directories(tree: &FileTree, root: NodeId, threshold: usize) -> Vec<PathBuf> {
    let metrics = SubtreeMetrics::compute(tree, root);
    let mut large = Vec::new();
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
        let Some(node) = tree.node(id) else {
            continue;
        };
        if !node.is_dir() {
            continue;
        }
        if metrics.descendants(id) >= threshold {
            large.push(node.path.clone());
        }
        stack.extend(tree.sorted_children(id).into_iter().rev());
    }

    large
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{build_tree, Entry};
    use std::path::Path;

    fn wide_tree() -> FileTree {
        let mut entries = Vec::new();
        for i in 0..150 {
            entries.push(Entry::file(format!("/repo/vendor/lib_{:03}.js", i)));
        }
        for i in 0..8 {
            entries.push(Entry::file(format!("/repo/src/mod_{}.rs", i)));
        }
        for i in 0..5 {
            entries.push(Entry::file(format!("/repo/docs/page_{}.md", i)));
        }
        entries.push(Entry::file("/repo/README.md"));
        build_tree(&entries, "/repo")
    }

    #[test]
    fn test_count_descendants_excludes_self() {
        let tree = wide_tree();
        let vendor = tree.get_node(Path::new("/repo/vendor")).unwrap();
        let readme = tree.get_node(Path::new("/repo/README.md")).unwrap();

        assert_eq!(count_descendants(&tree, vendor), 150);
        assert_eq!(count_descendants(&tree, readme), 0);
        assert_eq!(count_descendants(&tree, tree.get_root()), tree.node_count() - 1);
    }

    #[test]
    fn test_metrics_match_direct_count() {
        let tree = wide_tree();
        let metrics = SubtreeMetrics::compute(&tree, tree.get_root());

        for id in tree.get_root().descendants(tree.get_arena()) {
            assert_eq!(metrics.descendants(id), count_descendants(&tree, id));
        }
    }

    #[test]
    fn test_large_directory_detection() {
        let tree = wide_tree();
        let large = find_large_directories(&tree, tree.get_root(), 100);

        // The root qualifies through vendor; no sibling does
        assert_eq!(
            large,
            vec![PathBuf::from("/repo"), PathBuf::from("/repo/vendor")]
        );
    }

    #[test]
    fn test_nested_large_directories_all_reported() {
        let mut entries = Vec::new();
        for i in 0..12 {
            entries.push(Entry::file(format!("/r/outer/inner/f{}.txt", i)));
        }
        let tree = build_tree(&entries, "/r");
        let large = find_large_directories(&tree, tree.get_root(), 10);

        assert_eq!(
            large,
            vec![
                PathBuf::from("/r"),
                PathBuf::from("/r/outer"),
                PathBuf::from("/r/outer/inner"),
            ]
        );
    }

    #[test]
    fn test_detection_does_not_mutate() {
        let tree = wide_tree();
        let before = tree.structure();
        let _ = find_large_directories(&tree, tree.get_root(), 1);
        assert_eq!(before, tree.structure());
    }
}
