use serde::Serialize;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::collision::resolve;
use crate::config::LayoutConfig;
use crate::metrics::find_large_directories;
use crate::overlay::{apply_event, ActivityEvent};
use crate::radial_layout::{layout, GridCell};
use crate::tree::{build_tree, Entry, FileNode, FileTree, NodeKind};

/// Tree plus resolved full layout for one scan of a base directory.
pub struct Snapshot {
    tree: FileTree,
    config: LayoutConfig,
    cells: Vec<GridCell>,
}

/// A cell joined with its node's live state, as handed to renderers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellView {
    pub path: PathBuf,
    pub name: String,
    pub kind: NodeKind,
    pub x: f32,
    pub y: f32,
    pub elevation: f32,
    pub depth: usize,
    pub explored: bool,
    pub access_count: u64,
    pub last_accessed_at: Option<u64>,
}

impl CellView {
    fn new(cell: &GridCell, node: &FileNode) -> Self {
        Self {
            path: cell.path.clone(),
            name: node.name.clone(),
            kind: cell.kind,
            x: cell.x,
            y: cell.y,
            elevation: cell.elevation,
            depth: cell.depth,
            explored: node.explored,
            access_count: node.access_count,
            last_accessed_at: node.last_accessed_at,
        }
    }
}

impl Snapshot {
    pub fn build<P: AsRef<Path>>(entries: &[Entry], base_path: P, config: LayoutConfig) -> Self {
        let tree = build_tree(entries, base_path);
        Self::from_tree(tree, config)
    }

    pub fn from_tree(tree: FileTree, config: LayoutConfig) -> Self {
        let cells = Self::layout_resolved(&tree, tree.get_root(), &config);
        info!(
            base = %tree.root_path().display(),
            nodes = tree.node_count(),
            cells = cells.len(),
            "snapshot built"
        );
        Self {
            tree,
            config,
            cells,
        }
    }

    fn layout_resolved(
        tree: &FileTree,
        root: indextree::NodeId,
        config: &LayoutConfig,
    ) -> Vec<GridCell> {
        let cells = layout(tree, root, config);
        resolve(&cells, config.max_iterations, config)
    }

    pub fn base_path(&self) -> &Path {
        self.tree.root_path()
    }

    pub fn tree(&self) -> &FileTree {
        &self.tree
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Resolved layout of the whole snapshot.
    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    /// Layout with `view_root` as a fresh origin.
    ///
    /// The base path returns the stored layout as is; an unknown path falls
    /// back to it. Coordinates of a sub-view are local to that view.
    pub fn layout_for_root(&self, view_root: &Path) -> Cow<'_, [GridCell]> {
        if view_root == self.base_path() {
            return Cow::Borrowed(&self.cells);
        }
        match self.tree.get_node(view_root) {
            Some(id) => {
                debug!(view = %view_root.display(), "computing sub-view layout");
                Cow::Owned(Self::layout_resolved(&self.tree, id, &self.config))
            }
            None => {
                debug!(view = %view_root.display(), "unknown view root, using full layout");
                Cow::Borrowed(&self.cells)
            }
        }
    }

    /// Update node state for one event; positions are untouched.
    pub fn apply_event(&mut self, event: &ActivityEvent) -> Option<&FileNode> {
        let id = apply_event(&mut self.tree, &event.path, event.timestamp)?;
        self.tree.node(id)
    }

    pub fn large_directories(&self, threshold: usize) -> Vec<PathBuf> {
        find_large_directories(&self.tree, self.tree.get_root(), threshold)
    }

    pub fn cell_views(&self, cells: &[GridCell]) -> Vec<CellView> {
        cells
            .iter()
            .filter_map(|cell| self.tree.node(cell.node).map(|node| CellView::new(cell, node)))
            .collect()
    }
}

/// The live snapshot for whatever root is currently watched.
///
/// Loading a new root discards the previous tree, layout and explored state.
/// Events that arrive while nothing is loaded are dropped.
pub struct Session {
    config: LayoutConfig,
    large_directory_threshold: usize,
    snapshot: Option<Snapshot>,
}

impl Session {
    pub fn new(config: LayoutConfig, large_directory_threshold: usize) -> Self {
        Self {
            config,
            large_directory_threshold,
            snapshot: None,
        }
    }

    pub fn load<P: AsRef<Path>>(&mut self, entries: &[Entry], base_path: P) -> &Snapshot {
        if let Some(previous) = &self.snapshot {
            info!(previous = %previous.base_path().display(), "replacing snapshot");
        }
        self.snapshot
            .insert(Snapshot::build(entries, base_path, self.config.clone()))
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn apply_event(&mut self, event: &ActivityEvent) -> Option<&FileNode> {
        self.snapshot.as_mut()?.apply_event(event)
    }

    pub fn large_directories(&self) -> Vec<PathBuf> {
        self.snapshot
            .as_ref()
            .map(|s| s.large_directories(self.large_directory_threshold))
            .unwrap_or_default()
    }
}
