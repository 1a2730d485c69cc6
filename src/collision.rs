//! Force-directed overlap removal for laid-out cells.
//!
//! Each round finds every pair closer than its required separation and pushes
//! both cells apart along their center line, half the overlap each. The root
//! never moves; a cell colliding with it takes the whole correction.
//!
//! Rounds stop once nothing collides or after `max_iterations`. Like any
//! force-directed scheme this is not guaranteed to reach a fixed point, so
//! the cap is a safety bound and small residual overlap can remain.

use glam::Vec2;
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::debug;

use crate::config::LayoutConfig;
use crate::radial_layout::GridCell;

/// Distances below this count as coincident.
const EPSILON: f32 = 1e-4;

/// Slack when comparing a distance against its required separation.
pub const TOLERANCE: f32 = 1e-3;

const GOLDEN_ANGLE: f32 = 2.399_963;

/// Outcome of [`resolve_detailed`].
#[derive(Debug, Clone)]
pub struct Resolution {
    pub cells: Vec<GridCell>,
    /// Rounds that moved at least one cell.
    pub iterations: usize,
    /// Colliding pairs left when the resolver stopped.
    pub residual_collisions: usize,
}

/// Uniform grid bucketing cells by position.
///
/// With a bucket as wide as the largest separation, any colliding pair sits in
/// the same or an adjacent bucket.
struct SpatialHash {
    bucket: f32,
    buckets: HashMap<(i32, i32), Vec<usize>>,
}

impl SpatialHash {
    /// `bucket` is floored at [`EPSILON`] so degenerate configs still hash.
    fn build(cells: &[GridCell], bucket: f32) -> Self {
        let mut hash = Self {
            bucket: bucket.max(EPSILON),
            buckets: HashMap::new(),
        };
        for (i, cell) in cells.iter().enumerate() {
            let key = hash.key(cell.position());
            hash.buckets.entry(key).or_default().push(i);
        }
        hash
    }

    fn key(&self, p: Vec2) -> (i32, i32) {
        (
            (p.x / self.bucket).floor() as i32,
            (p.y / self.bucket).floor() as i32,
        )
    }

    fn neighbors(&self, p: Vec2) -> impl Iterator<Item = usize> + '_ {
        let (kx, ky) = self.key(p);
        (-1..=1)
            .flat_map(move |dx| (-1..=1).map(move |dy| (kx + dx, ky + dy)))
            .filter_map(move |key| self.buckets.get(&key))
            .flatten()
            .copied()
    }
}

fn required_separation(a: &GridCell, b: &GridCell, config: &LayoutConfig) -> f32 {
    config.min_separation(a.kind, b.kind)
}

/// Deterministic push direction for coincident cells, antisymmetric in `(i, j)`.
fn fallback_direction(i: usize, j: usize) -> Vec2 {
    let (lo, hi) = (i.min(j), i.max(j));
    let seed = (lo.wrapping_mul(31).wrapping_add(hi) % 1024) as f32;
    let d = Vec2::from_angle(seed * GOLDEN_ANGLE);
    if i == lo {
        -d
    } else {
        d
    }
}

/// Index pairs `(i, j)`, `i < j`, closer than their required separation.
pub fn find_collisions(cells: &[GridCell], config: &LayoutConfig) -> Vec<(usize, usize)> {
    let hash = SpatialHash::build(cells, config.max_separation());
    let mut pairs = Vec::new();

    for (i, a) in cells.iter().enumerate() {
        for j in hash.neighbors(a.position()) {
            if j <= i {
                continue;
            }
            let b = &cells[j];
            let distance = a.position().distance(b.position());
            if distance + TOLERANCE < required_separation(a, b, config) {
                pairs.push((i, j));
            }
        }
    }

    pairs.sort_unstable();
    pairs
}

/// Displacement for cell `i` gathered from all of its collisions.
fn gather_push(i: usize, cells: &[GridCell], hash: &SpatialHash, config: &LayoutConfig) -> Vec2 {
    let a = &cells[i];
    if a.is_root() {
        return Vec2::ZERO;
    }

    let mut push = Vec2::ZERO;
    for j in hash.neighbors(a.position()) {
        if j == i {
            continue;
        }
        let b = &cells[j];
        let delta = a.position() - b.position();
        let distance = delta.length();
        let required = required_separation(a, b, config);
        if distance + TOLERANCE >= required {
            continue;
        }

        let overlap = required - distance;
        let direction = if distance < EPSILON {
            fallback_direction(i, j)
        } else {
            delta / distance
        };
        let share = if b.is_root() { 1.0 } else { 0.5 };
        push += direction * overlap * share;
    }
    push
}

/// Push overlapping cells apart, reporting how the run ended.
///
/// Pure: `cells` is left untouched.
pub fn resolve_detailed(
    cells: &[GridCell],
    max_iterations: usize,
    config: &LayoutConfig,
) -> Resolution {
    let mut resolved = cells.to_vec();
    let bucket = config.max_separation();
    let mut iterations = 0;

    let residual = loop {
        let collisions = find_collisions(&resolved, config).len();
        if collisions == 0 || iterations >= max_iterations {
            break collisions;
        }

        let hash = SpatialHash::build(&resolved, bucket);
        let pushes: Vec<Vec2> = (0..resolved.len())
            .into_par_iter()
            .map(|i| gather_push(i, &resolved, &hash, config))
            .collect();

        for (cell, push) in resolved.iter_mut().zip(pushes) {
            if !cell.is_root() {
                cell.set_position(cell.position() + push);
            }
        }
        iterations += 1;
    };

    debug!(
        cells = resolved.len(),
        iterations,
        residual_collisions = residual,
        "collision resolution finished"
    );

    Resolution {
        cells: resolved,
        iterations,
        residual_collisions: residual,
    }
}

/// Best-effort overlap removal; never fails.
pub fn resolve(cells: &[GridCell], max_iterations: usize, config: &LayoutConfig) -> Vec<GridCell> {
    resolve_detailed(cells, max_iterations, config).cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radial_layout::{layout, layout_with_depth, Sector};
    use crate::tree::{build_tree, Entry, NodeKind};
    use indextree::Arena;
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn make_cells(specs: &[(f32, f32, NodeKind, usize)]) -> Vec<GridCell> {
        let mut arena: Arena<()> = Arena::new();
        specs
            .iter()
            .enumerate()
            .map(|(i, &(x, y, kind, depth))| GridCell {
                x,
                y,
                elevation: 0.0,
                depth,
                kind,
                path: PathBuf::from(format!("/cell_{}", i)),
                sector: Sector::FULL,
                node: arena.new_node(()),
            })
            .collect()
    }

    fn assert_separated(cells: &[GridCell], config: &LayoutConfig) {
        for (i, a) in cells.iter().enumerate() {
            for b in &cells[i + 1..] {
                let distance = a.position().distance(b.position());
                let required = config.min_separation(a.kind, b.kind);
                assert!(
                    distance + TOLERANCE >= required,
                    "{} and {} are {} apart, need {}",
                    a.path.display(),
                    b.path.display(),
                    distance,
                    required
                );
            }
        }
    }

    #[test]
    fn test_pair_is_pushed_apart_symmetrically() {
        let config = LayoutConfig::default();
        let cells = make_cells(&[
            (10.0, 0.0, NodeKind::File, 1),
            (10.5, 0.0, NodeKind::File, 1),
        ]);

        let out = resolve(&cells, 10, &config);

        assert_separated(&out, &config);
        let midpoint = (out[0].position() + out[1].position()) * 0.5;
        assert!((midpoint - Vec2::new(10.25, 0.0)).length() < 1e-4);
        assert!(out[0].x < 10.0 && out[1].x > 10.5);
    }

    #[test]
    fn test_root_is_pinned() {
        let config = LayoutConfig::default();
        let cells = make_cells(&[
            (0.0, 0.0, NodeKind::Directory, 0),
            (0.5, 0.0, NodeKind::File, 1),
        ]);

        let out = resolve(&cells, 10, &config);

        assert_eq!(out[0].position(), Vec2::ZERO);
        assert!(out[1].radius() + TOLERANCE >= config.min_separation(NodeKind::Directory, NodeKind::File));
    }

    #[test]
    fn test_coincident_cells_separate() {
        let config = LayoutConfig::default();
        let cells = make_cells(&[
            (5.0, 5.0, NodeKind::File, 1),
            (5.0, 5.0, NodeKind::Directory, 1),
        ]);

        let out = resolve(&cells, 10, &config);

        assert!(out.iter().all(|c| c.x.is_finite() && c.y.is_finite()));
        assert_separated(&out, &config);
    }

    #[test]
    fn test_chain_against_root_converges() {
        let config = LayoutConfig::default();
        let cells = make_cells(&[
            (0.0, 0.0, NodeKind::Directory, 0),
            (1.0, 0.0, NodeKind::File, 1),
            (2.0, 0.0, NodeKind::File, 2),
        ]);

        let resolution = resolve_detailed(&cells, 200, &config);

        assert_eq!(resolution.residual_collisions, 0);
        assert_separated(&resolution.cells, &config);
    }

    #[test]
    fn test_input_is_not_mutated() {
        let config = LayoutConfig::default();
        let cells = make_cells(&[
            (1.0, 1.0, NodeKind::File, 1),
            (1.2, 1.0, NodeKind::File, 1),
        ]);
        let snapshot = cells.clone();

        let _ = resolve(&cells, 10, &config);
        assert_eq!(cells, snapshot);
    }

    #[test]
    fn test_iteration_cap_is_respected() {
        let config = LayoutConfig::default();
        let cells = make_cells(&[
            (1.0, 1.0, NodeKind::File, 1),
            (1.2, 1.0, NodeKind::File, 1),
        ]);

        let resolution = resolve_detailed(&cells, 0, &config);
        assert_eq!(resolution.iterations, 0);
        assert_eq!(resolution.residual_collisions, 1);
        assert_eq!(resolution.cells, cells);
    }

    #[test]
    fn test_clear_layout_needs_no_rounds() {
        let mut entries = Vec::new();
        for d in 0..6 {
            for f in 0..(d * 7 + 1) {
                entries.push(Entry::file(format!("/repo/dir{}/file{}.rs", d, f)));
            }
            entries.push(Entry::file(format!("/repo/dir{}/nested/deep.rs", d)));
        }
        entries.push(Entry::file("/repo/Cargo.toml"));
        let tree = build_tree(&entries, "/repo");
        let config = LayoutConfig::default();
        let cells = layout(&tree, tree.get_root(), &config);

        assert!(find_collisions(&cells, &config).is_empty());
        let resolution = resolve_detailed(&cells, config.max_iterations, &config);
        assert_eq!(resolution.iterations, 0);
        assert_eq!(resolution.cells, cells);
    }

    #[test]
    fn test_compressed_layout_improves() {
        let entries: Vec<Entry> = (0..12).map(|i| Entry::file(format!("/p/f{}.rs", i))).collect();
        let tree = build_tree(&entries, "/p");
        let config = LayoutConfig::default();
        let mut cells = layout(&tree, tree.get_root(), &config);
        for cell in cells.iter_mut() {
            let squeezed = cell.position() * 0.5;
            cell.set_position(squeezed);
        }
        let before = find_collisions(&cells, &config).len();
        assert!(before > 0);

        let resolution = resolve_detailed(&cells, 200, &config);
        assert!(resolution.residual_collisions < before);
        assert_eq!(resolution.cells[0].position(), Vec2::ZERO);
    }

    #[test]
    fn test_zero_size_config_is_harmless() {
        let config = LayoutConfig {
            directory_footprint: 0.0,
            file_footprint: 0.0,
            min_sibling_gap: 0.0,
            ..LayoutConfig::default()
        };
        let cells = make_cells(&[
            (0.0, 0.0, NodeKind::Directory, 0),
            (3.0, 4.0, NodeKind::File, 1),
            (3.0, 4.0, NodeKind::File, 1),
        ]);

        assert!(find_collisions(&cells, &config).is_empty());
        let resolution = resolve_detailed(&cells, 10, &config);
        assert_eq!(resolution.iterations, 0);
        assert_eq!(resolution.cells, cells);

        let hash = SpatialHash::build(&cells, config.max_separation());
        assert!(hash.bucket > 0.0);
        assert_eq!(hash.neighbors(Vec2::new(3.0, 4.0)).count(), 2);
    }

    fn entries_strategy() -> impl Strategy<Value = Vec<Entry>> {
        prop::collection::vec(
            (prop::collection::vec(0u8..4, 0..4), 0u8..6, any::<bool>()),
            1..60,
        )
        .prop_map(|specs| {
            specs
                .into_iter()
                .map(|(dirs, leaf, is_dir)| {
                    let mut path = PathBuf::from("/r");
                    for d in dirs {
                        path.push(format!("d{}", d));
                    }
                    if is_dir {
                        path.push(format!("g{}", leaf));
                        Entry::dir(path)
                    } else {
                        path.push(format!("f{}.rs", leaf));
                        Entry::file(path)
                    }
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_resolved_layout_has_no_overlap(entries in entries_strategy()) {
            let tree = build_tree(&entries, "/r");
            let config = LayoutConfig::default();
            let cells = layout(&tree, tree.get_root(), &config);
            let resolved = resolve(&cells, config.max_iterations, &config);

            prop_assert_eq!(resolved.len(), tree.node_count());
            prop_assert!(find_collisions(&resolved, &config).is_empty());
            prop_assert_eq!(resolved[0].position(), Vec2::ZERO);
        }

        #[test]
        fn prop_depth_cap_respected(entries in entries_strategy(), cap in 0usize..4) {
            let tree = build_tree(&entries, "/r");
            let config = LayoutConfig::default();
            let cells = layout_with_depth(&tree, tree.get_root(), cap, &config);

            prop_assert!(cells.iter().all(|c| c.depth <= cap));
            let arena = tree.get_arena();
            let expected = tree
                .get_root()
                .descendants(arena)
                .filter(|id| id.ancestors(arena).count() - 1 <= cap)
                .count();
            prop_assert_eq!(cells.len(), expected);
        }
    }
}
