use indextree::{Arena, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

impl NodeKind {
    pub fn is_dir(self) -> bool {
        self == NodeKind::Directory
    }
}

/// One `(path, kind)` record as produced by a filesystem scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub path: PathBuf,
    #[serde(alias = "fileType", alias = "type")]
    pub kind: NodeKind,
}

impl Entry {
    pub fn new<P: Into<PathBuf>>(path: P, kind: NodeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn file<P: Into<PathBuf>>(path: P) -> Self {
        Self::new(path, NodeKind::File)
    }

    pub fn dir<P: Into<PathBuf>>(path: P) -> Self {
        Self::new(path, NodeKind::Directory)
    }
}

/// Represents a node in the codebase tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNode {
    pub path: PathBuf,
    pub name: String,
    pub kind: NodeKind,
    /// Set once this path or a descendant has been touched.
    pub explored: bool,
    /// Timestamp (ms) of the latest event naming this exact path.
    pub last_accessed_at: Option<u64>,
    pub access_count: u64,
}

impl FileNode {
    fn new(path: PathBuf, kind: NodeKind) -> Self {
        let name = node_name(&path);
        Self {
            path,
            name,
            kind,
            explored: false,
            last_accessed_at: None,
            access_count: 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Access metadata of a single node, detached from the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRecord {
    pub explored: bool,
    pub last_accessed_at: Option<u64>,
    pub access_count: u64,
}

fn node_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// Codebase tree stored in an arena, addressable by path.
pub struct FileTree {
    arena: Arena<FileNode>,
    root: NodeId,
    path_to_node: HashMap<PathBuf, NodeId>,
}

impl FileTree {
    /// Create a new tree with a root directory node
    pub fn new<P: AsRef<Path>>(root_path: P) -> Self {
        let mut arena = Arena::new();
        let root_path_buf = root_path.as_ref().to_path_buf();
        let root = arena.new_node(FileNode::new(root_path_buf.clone(), NodeKind::Directory));
        let mut path_to_node = HashMap::new();
        path_to_node.insert(root_path_buf, root);

        Self {
            arena,
            root,
            path_to_node,
        }
    }

    /// Build a tree from a flat entry list, synthesizing missing directories.
    ///
    /// Entries outside `base_path` or containing `..` are skipped. An empty
    /// list yields a root-only tree.
    pub fn build<P: AsRef<Path>>(entries: &[Entry], base_path: P) -> Self {
        let base_path = base_path.as_ref();
        let mut tree = Self::new(base_path);

        if entries.is_empty() {
            warn!(base = %base_path.display(), "no entries, tree holds the root only");
            return tree;
        }

        // Ancestors must be registered before descendants
        let mut sorted: Vec<&Entry> = entries.iter().collect();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));

        let mut skipped = 0usize;
        for entry in sorted {
            let Ok(relative) = entry.path.strip_prefix(base_path) else {
                debug!(path = %entry.path.display(), "entry outside base path, skipped");
                skipped += 1;
                continue;
            };
            if relative.as_os_str().is_empty() {
                continue;
            }
            if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
                debug!(path = %entry.path.display(), "entry is not a normal path, skipped");
                skipped += 1;
                continue;
            }
            tree.insert_relative(relative, entry.kind);
        }

        info!(
            base = %base_path.display(),
            nodes = tree.node_count(),
            skipped,
            "tree built"
        );
        tree
    }

    fn insert_relative(&mut self, relative: &Path, kind: NodeKind) {
        let mut parent = self.root;
        let mut current = self.root_path().to_path_buf();
        let mut components = relative.components().peekable();

        while let Some(component) = components.next() {
            current.push(component);
            let is_last = components.peek().is_none();
            let wanted = if is_last { kind } else { NodeKind::Directory };
            parent = self.attach(parent, &current, wanted);
        }
    }

    /// Return the node at `path`, creating it under `parent` if absent.
    fn attach(&mut self, parent: NodeId, path: &Path, kind: NodeKind) -> NodeId {
        if let Some(&existing) = self.path_to_node.get(path) {
            // A path that gains children is a directory whatever it was listed as
            if kind.is_dir() {
                if let Some(node) = self.arena.get_mut(existing) {
                    node.get_mut().kind = NodeKind::Directory;
                }
            }
            return existing;
        }

        let node_id = self.arena.new_node(FileNode::new(path.to_path_buf(), kind));
        parent.append(node_id, &mut self.arena);
        self.path_to_node.insert(path.to_path_buf(), node_id);
        node_id
    }

    pub fn get_root(&self) -> NodeId {
        self.root
    }

    pub fn get_arena(&self) -> &Arena<FileNode> {
        &self.arena
    }

    pub fn root_path(&self) -> &Path {
        &self.arena[self.root].get().path
    }

    pub fn get_node(&self, path: &Path) -> Option<NodeId> {
        self.path_to_node.get(path).copied()
    }

    pub fn node(&self, id: NodeId) -> Option<&FileNode> {
        self.arena.get(id).map(|n| n.get())
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut FileNode> {
        self.arena.get_mut(id).map(|n| n.get_mut())
    }

    pub fn node_by_path(&self, path: &Path) -> Option<&FileNode> {
        self.get_node(path).and_then(|id| self.node(id))
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.children(&self.arena)
    }

    /// Children in layout order: directories first, then by name.
    ///
    /// The order decides angular placement, so it must be total.
    pub fn sorted_children(&self, id: NodeId) -> Vec<NodeId> {
        let mut children: Vec<(NodeId, &FileNode)> = self
            .children(id)
            .filter_map(|c| self.node(c).map(|n| (c, n)))
            .collect();
        children.sort_by(|(_, a), (_, b)| {
            b.is_dir()
                .cmp(&a.is_dir())
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.path.cmp(&b.path))
        });
        children.into_iter().map(|(c, _)| c).collect()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena.get(id).and_then(|n| n.parent())
    }

    pub fn node_count(&self) -> usize {
        self.path_to_node.len()
    }

    pub fn is_root_only(&self) -> bool {
        self.root.children(&self.arena).next().is_none()
    }

    /// Paths of every explored node.
    pub fn explored_paths(&self) -> HashSet<PathBuf> {
        self.root
            .descendants(&self.arena)
            .filter_map(|id| self.node(id))
            .filter(|n| n.explored)
            .map(|n| n.path.clone())
            .collect()
    }

    pub fn access_record(&self, path: &Path) -> Option<AccessRecord> {
        self.node_by_path(path).map(|n| AccessRecord {
            explored: n.explored,
            last_accessed_at: n.last_accessed_at,
            access_count: n.access_count,
        })
    }

    /// `(path, parent path, kind)` for every node, sorted by path.
    ///
    /// Two trees with equal shapes return equal vectors regardless of arena
    /// insertion order.
    pub fn structure(&self) -> Vec<(PathBuf, Option<PathBuf>, NodeKind)> {
        let mut rows: Vec<_> = self
            .root
            .descendants(&self.arena)
            .filter_map(|id| {
                let node = self.node(id)?;
                let parent = self.parent(id).and_then(|p| self.node(p)).map(|p| p.path.clone());
                Some((node.path.clone(), parent, node.kind))
            })
            .collect();
        rows.sort();
        rows
    }
}

/// Free-function form of [`FileTree::build`].
pub fn build_tree<P: AsRef<Path>>(entries: &[Entry], base_path: P) -> FileTree {
    FileTree::build(entries, base_path)
}
