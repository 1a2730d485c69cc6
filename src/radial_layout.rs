use glam::Vec2;
use indextree::NodeId;
use serde::Serialize;
use std::f32::consts::{FRAC_PI_2, TAU};
use std::path::PathBuf;
use tracing::debug;

use crate::config::LayoutConfig;
use crate::tree::{FileTree, NodeKind};

/// Angular span owned by one node's subtree, in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sector {
    pub start: f32,
    pub width: f32,
}

impl Sector {
    pub const FULL: Sector = Sector {
        start: 0.0,
        width: TAU,
    };

    pub fn center(&self) -> f32 {
        self.start + self.width * 0.5
    }

    pub fn end(&self) -> f32 {
        self.start + self.width
    }

    /// Whether `angle` (any winding) falls inside the sector, with slack `eps`.
    pub fn contains(&self, angle: f32, eps: f32) -> bool {
        let a = angle.rem_euclid(TAU);
        (a >= self.start - eps && a <= self.end() + eps)
            || (a + TAU >= self.start - eps && a + TAU <= self.end() + eps)
    }
}

/// A node projected onto the layout plane.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridCell {
    pub x: f32,
    pub y: f32,
    /// Vertical offset for the renderer, proportional to depth.
    pub elevation: f32,
    pub depth: usize,
    pub kind: NodeKind,
    pub path: PathBuf,
    pub sector: Sector,
    #[serde(skip)]
    pub node: NodeId,
}

impl GridCell {
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.x = position.x;
        self.y = position.y;
    }

    /// The layout root is pinned at the origin.
    pub fn is_root(&self) -> bool {
        self.depth == 0
    }

    pub fn radius(&self) -> f32 {
        self.position().length()
    }
}

/// Work item for the layout passes; indices refer to the pre-order list.
struct Slot {
    node: NodeId,
    kind: NodeKind,
    depth: usize,
    children: Vec<usize>,
    weight: f32,
    sector: Sector,
}

/// Visible nodes in pre-order over sorted children, without recursion.
fn collect_slots(tree: &FileTree, root: NodeId, max_depth: usize) -> Vec<Slot> {
    let mut slots: Vec<Slot> = Vec::new();
    let mut stack: Vec<(NodeId, usize, Option<usize>)> = vec![(root, 0, None)];

    while let Some((node, depth, parent)) = stack.pop() {
        let Some(data) = tree.node(node) else {
            continue;
        };
        let index = slots.len();
        slots.push(Slot {
            node,
            kind: data.kind,
            depth,
            children: Vec::new(),
            weight: 0.0,
            sector: Sector::FULL,
        });
        if let Some(parent) = parent {
            slots[parent].children.push(index);
        }
        if depth < max_depth {
            for child in tree.sorted_children(node).into_iter().rev() {
                stack.push((child, depth + 1, Some(index)));
            }
        }
    }

    slots
}

/// Own span plus everything laid out below it.
fn assign_weights(slots: &mut [Slot], config: &LayoutConfig) {
    for i in (0..slots.len()).rev() {
        let mut weight = config.span(slots[i].kind);
        if !slots[i].children.is_empty() {
            let below: f32 = slots[i].children.iter().map(|&c| slots[c].weight).sum();
            weight += config.subtree_buffer + below;
        }
        slots[i].weight = weight;
    }
}

/// Split every parent's sector among its children by weight.
fn assign_sectors(slots: &mut [Slot]) {
    for i in 0..slots.len() {
        if slots[i].children.is_empty() {
            continue;
        }
        let parent = slots[i].sector;
        let children = std::mem::take(&mut slots[i].children);
        let total: f32 = children.iter().map(|&c| slots[c].weight).sum();
        let count = children.len() as f32;

        let mut cursor = parent.start;
        for &c in &children {
            let share = if total > 0.0 {
                slots[c].weight / total
            } else {
                1.0 / count
            };
            let width = parent.width * share;
            slots[c].sector = Sector {
                start: cursor,
                width,
            };
            cursor += width;
        }
        slots[i].children = children;
    }
}

/// One radius per depth.
///
/// A node of span `s` in a sector of width `θ` on a ring of radius `r` is
/// clear of every other node on that ring when `r·θ >= (π/2)·s`. Consecutive
/// rings are at least one maximal separation apart.
fn ring_radii(slots: &[Slot], config: &LayoutConfig) -> Vec<f32> {
    let deepest = slots.iter().map(|s| s.depth).max().unwrap_or(0);
    let mut required = vec![0.0f32; deepest + 1];
    for slot in slots.iter().filter(|s| s.depth > 0) {
        let span = config.span(slot.kind);
        let needed = if slot.sector.width > 0.0 {
            FRAC_PI_2 * span / slot.sector.width
        } else {
            0.0
        };
        required[slot.depth] = required[slot.depth].max(needed);
    }

    let min_step = config.max_separation();
    let step = config.radius_growth_per_depth.max(min_step);
    let mut radii = vec![0.0f32; deepest + 1];
    for depth in 1..=deepest {
        let floor = if depth == 1 {
            config.base_radius.max(min_step)
        } else {
            radii[depth - 1] + step
        };
        radii[depth] = floor.max(required[depth]);
    }
    radii
}

/// Radial layout of the subtree at `root`, down to `max_depth` levels.
///
/// Pure and deterministic: the same tree and config always yield the same
/// cells, root first, then pre-order with directories before files.
pub fn layout_with_depth(
    tree: &FileTree,
    root: NodeId,
    max_depth: usize,
    config: &LayoutConfig,
) -> Vec<GridCell> {
    let mut slots = collect_slots(tree, root, max_depth);
    if slots.is_empty() {
        return Vec::new();
    }

    assign_weights(&mut slots, config);
    assign_sectors(&mut slots);
    let radii = ring_radii(&slots, config);

    let cells: Vec<GridCell> = slots
        .iter()
        .filter_map(|slot| {
            let node = tree.node(slot.node)?;
            let position = if slot.depth == 0 {
                Vec2::ZERO
            } else {
                Vec2::from_angle(slot.sector.center()) * radii[slot.depth]
            };
            Some(GridCell {
                x: position.x,
                y: position.y,
                elevation: slot.depth as f32 * config.elevation_step,
                depth: slot.depth,
                kind: slot.kind,
                path: node.path.clone(),
                sector: slot.sector,
                node: slot.node,
            })
        })
        .collect();

    debug!(
        cells = cells.len(),
        rings = radii.len().saturating_sub(1),
        outer_radius = radii.last().copied().unwrap_or(0.0),
        "radial layout computed"
    );
    cells
}

/// [`layout_with_depth`] using `config.max_depth`.
pub fn layout(tree: &FileTree, root: NodeId, config: &LayoutConfig) -> Vec<GridCell> {
    layout_with_depth(tree, root, config.max_depth, config)
}
