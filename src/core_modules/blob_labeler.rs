// THEORY:
// The `blob_labeler` is the spatial grouping layer. It turns the binary motion
// mask into a `LabelMap` in which every 8-connected region of "on" pixels carries
// its own label, numbered densely from 1.
//
// Two strategies produce the same map:
// 1.  **Union-find** (default): a single raster pass gives every horizontal run of
//     "on" pixels a provisional label and unions it with the labeled pixels above
//     it (NW, N, NE) in a disjoint-set forest. Resolving roots yields the final
//     partition in two deterministic passes.
// 2.  **Relaxation**: the same run seeding, followed by alternating forward and
//     backward raster sweeps that push the smallest label of every 3x3
//     neighborhood onto all of its "on" pixels until a full round changes nothing.
//     Slower, with a data-dependent number of sweeps, kept as a reference.
//
// Both end in the same compaction step: labels are renumbered 1..N in order of
// first appearance in row-major order, so both strategies agree label-for-label.
//
// The outermost one-pixel border of the mask is never labeled. Polygon
// approximation relies on that margin when it clamps its rays to the image.

use crate::core_modules::frame_buffer::FrameBuffer;
use crate::core_modules::label_map::{BACKGROUND, Label, LabelMap};
use serde::{Deserialize, Serialize};

/// Connected-component algorithm used by the labeler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelingStrategy {
    #[default]
    UnionFind,
    Relaxation,
}

/// 8-neighborhood offsets, clockwise from north.
const NEIGHBORS: [(i32, i32); 8] = [(0, -1), (1, -1), (1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0), (-1, -1)];

/// Labels the connected regions of `mask` into `labels` and returns the number of
/// regions. `labels` is resized to the mask dimensions if needed.
pub fn label(mask: &FrameBuffer, labels: &mut LabelMap, strategy: LabelingStrategy) -> usize {
    let (width, height) = mask.dimensions();
    labels.ensure_size(width, height);
    labels.clear();

    // Without an interior there is nothing to label.
    if width < 3 || height < 3 {
        return 0;
    }

    match strategy {
        LabelingStrategy::UnionFind => label_union_find(mask, labels),
        LabelingStrategy::Relaxation => label_relaxation(mask, labels),
    }

    compact(labels)
}

/// Disjoint-set forest over provisional labels. Index 0 is the background.
struct DisjointSet {
    parent: Vec<Label>,
}

impl DisjointSet {
    fn new() -> Self {
        Self { parent: vec![BACKGROUND] }
    }

    fn make_set(&mut self) -> Label {
        let label = self.parent.len() as Label;
        self.parent.push(label);
        label
    }

    fn find(&mut self, mut label: Label) -> Label {
        while self.parent[label as usize] != label {
            let grandparent = self.parent[self.parent[label as usize] as usize];
            self.parent[label as usize] = grandparent;
            label = grandparent;
        }
        label
    }

    fn union(&mut self, a: Label, b: Label) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a < root_b {
            self.parent[root_b as usize] = root_a;
        } else if root_b < root_a {
            self.parent[root_a as usize] = root_b;
        }
    }
}

fn label_union_find(mask: &FrameBuffer, labels: &mut LabelMap) {
    let (width, height) = mask.dimensions();
    let mut sets = DisjointSet::new();

    // --- 1. Provisional labels, merged with the row above ---
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            if !mask.is_on(x, y) {
                continue;
            }
            let west = labels.get(x - 1, y);
            let label = if west != BACKGROUND { west } else { sets.make_set() };
            labels.set(x, y, label);

            for nx in [x - 1, x, x + 1] {
                let above = labels.get(nx, y - 1);
                if above != BACKGROUND {
                    sets.union(label, above);
                }
            }
        }
    }

    // --- 2. Resolve every provisional label to its root ---
    for label in labels.as_mut_slice() {
        if *label != BACKGROUND {
            *label = sets.find(*label);
        }
    }
}

/// Gives every horizontal run of "on" interior pixels its own label.
fn seed_runs(mask: &FrameBuffer, labels: &mut LabelMap) {
    let (width, height) = mask.dimensions();
    let mut next: Label = 1;
    for y in 1..height - 1 {
        let mut in_run = false;
        for x in 1..width - 1 {
            if mask.is_on(x, y) {
                labels.set(x, y, next);
                in_run = true;
            } else if in_run {
                next += 1;
                in_run = false;
            }
        }
        if in_run {
            next += 1;
        }
    }
}

fn label_relaxation(mask: &FrameBuffer, labels: &mut LabelMap) {
    let (width, height) = mask.dimensions();
    seed_runs(mask, labels);

    loop {
        let mut changed = false;

        // --- Merge iteration A: top-left to bottom-right ---
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                changed |= merge_neighborhood(labels, x, y);
            }
        }

        // --- Merge iteration B: bottom-right to top-left ---
        for y in (1..height - 1).rev() {
            for x in (1..width - 1).rev() {
                changed |= merge_neighborhood(labels, x, y);
            }
        }

        if !changed {
            break;
        }
    }
}

/// Writes the lowest label of the 3x3 neighborhood onto the center and all of its
/// labeled neighbors. Returns whether any label changed.
fn merge_neighborhood(labels: &mut LabelMap, x: u32, y: u32) -> bool {
    let center = labels.get(x, y);
    if center == BACKGROUND {
        return false;
    }

    let neighbor = |dx: i32, dy: i32| ((x as i32 + dx) as u32, (y as i32 + dy) as u32);

    let mut lowest = center;
    for (dx, dy) in NEIGHBORS {
        let (nx, ny) = neighbor(dx, dy);
        let label = labels.get(nx, ny);
        if label != BACKGROUND && label < lowest {
            lowest = label;
        }
    }

    let mut changed = false;
    if center != lowest {
        labels.set(x, y, lowest);
        changed = true;
    }
    for (dx, dy) in NEIGHBORS {
        let (nx, ny) = neighbor(dx, dy);
        let label = labels.get(nx, ny);
        if label != BACKGROUND && label != lowest {
            labels.set(nx, ny, lowest);
            changed = true;
        }
    }
    changed
}

/// Renumbers labels to 1..N in row-major order of first appearance.
fn compact(labels: &mut LabelMap) -> usize {
    let max = labels.as_slice().iter().copied().max().unwrap_or(BACKGROUND);
    let mut remap = vec![BACKGROUND; max as usize + 1];
    let mut count: Label = 0;

    for label in labels.as_mut_slice() {
        if *label == BACKGROUND {
            continue;
        }
        let slot = &mut remap[*label as usize];
        if *slot == BACKGROUND {
            count += 1;
            *slot = count;
        }
        *label = *slot;
    }
    count as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame_buffer::{CHANNELS, MASK_ON};

    fn mask_from_rows(rows: &[&str]) -> FrameBuffer {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        let mut pixels = vec![0u8; (width * height) as usize * CHANNELS];
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                if c == '#' {
                    let i = (y * width as usize + x) * CHANNELS;
                    pixels[i..i + 3].fill(MASK_ON);
                }
                pixels[(y * width as usize + x) * CHANNELS + 3] = 255;
            }
        }
        FrameBuffer::from_raw(width, height, pixels).unwrap()
    }

    fn mask_from_labels(labels: &LabelMap) -> FrameBuffer {
        let mut pixels = vec![0u8; labels.as_slice().len() * CHANNELS];
        for (pixel, &label) in pixels.chunks_exact_mut(CHANNELS).zip(labels.as_slice()) {
            if label != BACKGROUND {
                pixel[..3].fill(MASK_ON);
            }
        }
        FrameBuffer::from_raw(labels.width(), labels.height(), pixels).unwrap()
    }

    /// Deterministic pseudo-random mask (LCG), roughly `density` percent on.
    fn noise_mask(width: u32, height: u32, seed: u64, density: u64) -> FrameBuffer {
        let mut state = seed;
        let mut pixels = vec![0u8; (width * height) as usize * CHANNELS];
        for pixel in pixels.chunks_exact_mut(CHANNELS) {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            if (state >> 33) % 100 < density {
                pixel[..3].fill(MASK_ON);
            }
        }
        FrameBuffer::from_raw(width, height, pixels).unwrap()
    }

    fn both(mask: &FrameBuffer) -> (LabelMap, usize) {
        let mut union_find = LabelMap::default();
        let mut relaxation = LabelMap::default();
        let a = label(mask, &mut union_find, LabelingStrategy::UnionFind);
        let b = label(mask, &mut relaxation, LabelingStrategy::Relaxation);
        assert_eq!(a, b);
        assert_eq!(union_find, relaxation);
        (union_find, a)
    }

    #[test]
    fn separate_regions_get_ordered_labels() {
        let mask = mask_from_rows(&[
            "........",
            ".##..#..",
            ".##..#..",
            "........",
            "...###..",
            "........",
        ]);
        let (labels, count) = both(&mask);
        assert_eq!(count, 3);
        assert_eq!(labels.get(1, 1), 1);
        assert_eq!(labels.get(2, 2), 1);
        assert_eq!(labels.get(5, 1), 2);
        assert_eq!(labels.get(4, 4), 3);
        assert_eq!(labels.get(0, 0), BACKGROUND);
    }

    #[test]
    fn diagonal_neighbors_are_connected() {
        let mask = mask_from_rows(&[
            "......",
            ".#....",
            "..#...",
            "...#..",
            "..#.#.",
            "......",
        ]);
        let (_, count) = both(&mask);
        assert_eq!(count, 1);
    }

    #[test]
    fn shapes_that_need_backward_merging_form_one_region() {
        // The right arm only meets the left arm at the bottom.
        let mask = mask_from_rows(&[
            ".........",
            ".#.....#.",
            ".#..#..#.",
            ".#..#..#.",
            ".#######.",
            ".........",
        ]);
        let (labels, count) = both(&mask);
        assert_eq!(count, 1);
        assert_eq!(labels.get(7, 1), labels.get(1, 1));
        assert_eq!(labels.get(4, 2), 1);
    }

    #[test]
    fn border_pixels_are_never_labeled() {
        let mask = mask_from_rows(&["#####", "#####", "#####", "#####", "#####"]);
        let (labels, count) = both(&mask);
        assert_eq!(count, 1);
        for x in 0..5 {
            assert_eq!(labels.get(x, 0), BACKGROUND);
            assert_eq!(labels.get(x, 4), BACKGROUND);
            assert_eq!(labels.get(0, x), BACKGROUND);
            assert_eq!(labels.get(4, x), BACKGROUND);
        }
        assert_eq!(labels.get(2, 2), 1);

        // A region touching only the border disappears entirely.
        let edge_only = mask_from_rows(&["#....", "#....", "#....", "#...."]);
        assert_eq!(both(&edge_only).1, 0);
    }

    #[test]
    fn runs_ending_a_row_do_not_join_runs_starting_the_next() {
        let mask = mask_from_rows(&[
            "......",
            "...##.",
            ".#....",
            "......",
        ]);
        let (_, count) = both(&mask);
        assert_eq!(count, 2);
    }

    #[test]
    fn tiny_masks_have_no_interior() {
        let mask = mask_from_rows(&["##", "##"]);
        let mut labels = LabelMap::default();
        assert_eq!(label(&mask, &mut labels, LabelingStrategy::UnionFind), 0);
        assert_eq!(labels.dimensions(), (2, 2));
    }

    #[test]
    fn strategies_agree_on_noisy_masks() {
        for seed in 1..6 {
            let mask = noise_mask(37, 23, seed, 45);
            let (labels, count) = both(&mask);
            assert_eq!(labels.distinct_labels(), count);
        }
    }

    #[test]
    fn relabeling_is_idempotent() {
        let mask = noise_mask(40, 30, 42, 40);
        let (first, count) = both(&mask);
        let (second, recount) = both(&mask_from_labels(&first));
        assert_eq!(count, recount);
        assert_eq!(first, second);
    }

    #[test]
    fn label_map_follows_mask_size() {
        let mut labels = LabelMap::new(2, 2);
        let mask = mask_from_rows(&["....", ".##.", "...."]);
        assert_eq!(label(&mask, &mut labels, LabelingStrategy::Relaxation), 1);
        assert_eq!(labels.dimensions(), (4, 3));
    }
}
