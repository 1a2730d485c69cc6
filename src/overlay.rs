use indextree::NodeId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::trace;

use crate::tree::FileTree;

/// One agent action on a path. Only the path and time matter here; any other
/// fields on the wire (tool name, event type) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub path: PathBuf,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl ActivityEvent {
    pub fn new<P: Into<PathBuf>>(path: P, timestamp: u64) -> Self {
        Self {
            path: path.into(),
            timestamp,
        }
    }
}

/// Record an access to `path` in place.
///
/// The node gets `explored`, an incremented `access_count` and
/// `last_accessed_at = timestamp`. Every ancestor is marked explored but keeps
/// its own count and timestamp. Unknown paths are ignored and yield `None`.
/// Layout positions are never touched.
pub fn apply_event(tree: &mut FileTree, path: &Path, timestamp: u64) -> Option<NodeId> {
    let Some(id) = tree.get_node(path) else {
        trace!(path = %path.display(), "event for unknown path ignored");
        return None;
    };

    if let Some(node) = tree.node_mut(id) {
        node.explored = true;
        node.access_count += 1;
        node.last_accessed_at = Some(timestamp);
    }

    let ancestors: Vec<NodeId> = id.ancestors(tree.get_arena()).skip(1).collect();
    for ancestor in ancestors {
        match tree.node_mut(ancestor) {
            // Everything above an explored node is already explored
            Some(node) if node.explored => break,
            Some(node) => node.explored = true,
            None => break,
        }
    }

    Some(id)
}

/// Apply a batch in arrival order; returns how many matched a node.
pub fn apply_events<'a, I>(tree: &mut FileTree, events: I) -> usize
where
    I: IntoIterator<Item = &'a ActivityEvent>,
{
    events
        .into_iter()
        .filter(|event| apply_event(tree, &event.path, event.timestamp).is_some())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{build_tree, AccessRecord, Entry};

    fn scenario_tree() -> FileTree {
        build_tree(
            &[
                Entry::file("/root/src/a.ts"),
                Entry::file("/root/src/b.ts"),
                Entry::file("/root/docs/guide.md"),
            ],
            "/root",
        )
    }

    #[test]
    fn test_repeated_event_counts_and_marks_ancestors() {
        let mut tree = scenario_tree();
        let file = Path::new("/root/src/a.ts");

        for _ in 0..3 {
            assert!(apply_event(&mut tree, file, 100).is_some());
        }

        let a = tree.access_record(file).unwrap();
        assert_eq!(a.access_count, 3);
        assert!(a.explored);
        assert_eq!(a.last_accessed_at, Some(100));

        for ancestor in ["/root/src", "/root"] {
            let record = tree.access_record(Path::new(ancestor)).unwrap();
            assert!(record.explored);
            assert_eq!(record.access_count, 0);
            assert_eq!(record.last_accessed_at, None);
        }

        let sibling = tree.access_record(Path::new("/root/src/b.ts")).unwrap();
        assert!(!sibling.explored);
        assert!(!tree.access_record(Path::new("/root/docs")).unwrap().explored);
    }

    #[test]
    fn test_latest_timestamp_wins() {
        let mut tree = scenario_tree();
        let file = Path::new("/root/docs/guide.md");
        apply_event(&mut tree, file, 100);
        apply_event(&mut tree, file, 250);

        assert_eq!(tree.access_record(file).unwrap().last_accessed_at, Some(250));
    }

    fn access_records(tree: &FileTree) -> Vec<(PathBuf, Option<AccessRecord>)> {
        tree.structure()
            .into_iter()
            .map(|(path, _, _)| {
                let record = tree.access_record(&path);
                (path, record)
            })
            .collect()
    }

    #[test]
    fn test_unknown_path_changes_nothing() {
        let mut tree = scenario_tree();
        apply_event(&mut tree, Path::new("/root/src/a.ts"), 50);
        let structure = tree.structure();
        let explored = tree.explored_paths();
        let records = access_records(&tree);

        assert!(apply_event(&mut tree, Path::new("/not/in/tree.ts"), 100).is_none());
        assert!(apply_event(&mut tree, Path::new("/root/src/missing.ts"), 100).is_none());

        assert_eq!(tree.structure(), structure);
        assert_eq!(tree.explored_paths(), explored);
        assert_eq!(access_records(&tree), records);
    }

    #[test]
    fn test_directory_event_counts_on_directory() {
        let mut tree = scenario_tree();
        apply_event(&mut tree, Path::new("/root/docs"), 7);

        let docs = tree.access_record(Path::new("/root/docs")).unwrap();
        assert_eq!(docs.access_count, 1);
        assert!(!tree.access_record(Path::new("/root/docs/guide.md")).unwrap().explored);
    }

    #[test]
    fn test_batch_reports_matches() {
        let mut tree = scenario_tree();
        let events = vec![
            ActivityEvent::new("/root/src/a.ts", 1),
            ActivityEvent::new("/elsewhere.ts", 2),
            ActivityEvent::new("/root/src/b.ts", 3),
        ];

        assert_eq!(apply_events(&mut tree, &events), 2);
        let explored = tree.explored_paths();
        assert_eq!(explored.len(), 4);
        assert!(explored.contains(Path::new("/root/src")));
    }

    #[test]
    fn test_event_ignores_extra_fields() {
        let event: ActivityEvent = serde_json::from_str(
            r#"{"type": "post_tool_use", "tool": "Read", "path": "/root/src/a.ts", "timestamp": 1700000000000}"#,
        )
        .unwrap();
        assert_eq!(event, ActivityEvent::new("/root/src/a.ts", 1_700_000_000_000));
    }
}
