// THEORY:
// The `tracker` module is the behavioral layer of the engine. It turns the
// stateless `LabelMap` of a single frame into a list of `Blob`s and gives each of
// them an identity that survives from one frame to the next.
//
// This module solves the "data association problem" with nearest-neighbor matching
// on normalized mass centers.
//
// Key architectural principles:
// 1.  **Double buffering**: the tracker keeps exactly two blob lists, the current
//     frame and the previous one, as a two-slot ring. Each frame flips the slot
//     index and rebuilds the new current list in place, so the previous list is
//     always available for matching without any history beyond one frame.
// 2.  **Filtering before identity**: labels whose mass or bounding area fall
//     outside the configured bands never become blobs, and the optional
//     inner/outer rejection runs before matching, so identities are only spent on
//     blobs the caller will actually see.
// 3.  **Conflict resolution**: when two current blobs claim the same previous
//     identity the closer one keeps it. Losers get a second chance at any previous
//     identity nobody in the current frame holds, and otherwise receive the lowest
//     id unused by either frame.
// 4.  **Lifecycle**: a matched blob inherits the creation stamp of its predecessor
//     and stops being "new". Everything else is born in the current frame.

use crate::core_modules::blob::{Blob, BlobId, NormPoint, NormRect};
use crate::core_modules::label_map::{BACKGROUND, Label, LabelMap};
use crate::core_modules::polygon::{MIN_POLYGON_POINTS, approximate_polygon};
use crate::core_modules::timestamp::Timestamp;
use crate::pipeline::PipelineConfig;
use log::trace;
use serde::{Deserialize, Serialize};

/// Which nested blobs are discarded after filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectBlobsMethod {
    #[default]
    None,
    /// Drop blobs whose rectangle lies inside another blob's rectangle.
    Inner,
    /// Drop blobs whose rectangle encloses another blob's rectangle.
    Outer,
}

/// Selects one of the two double-buffered blob lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobSlot {
    Current,
    Previous,
}

/// Per-label sums gathered in a single pass over the label map.
#[derive(Debug, Clone, Copy)]
struct RawBlobStats {
    mass: u64,
    sum_x: u64,
    sum_y: u64,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl Default for RawBlobStats {
    fn default() -> Self {
        Self {
            mass: 0,
            sum_x: 0,
            sum_y: 0,
            min_x: u32::MAX,
            min_y: u32::MAX,
            max_x: 0,
            max_y: 0,
        }
    }
}

impl RawBlobStats {
    fn add(&mut self, x: u32, y: u32) {
        self.mass += 1;
        self.sum_x += x as u64;
        self.sum_y += y as u64;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }
}

/// Builds blobs from labeled regions and keeps their identities across frames.
#[derive(Debug, Clone, Default)]
pub struct BlobTracker {
    slots: [Vec<Blob>; 2],
    current: usize,
    raw: Vec<RawBlobStats>,
}

impl BlobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes this frame's labeling and returns the resulting blob list.
    pub fn process(&mut self, labels: &LabelMap, count: usize, config: &PipelineConfig, now: Timestamp) -> &[Blob] {
        // --- 1. Flip the ring: the old current list becomes the previous one ---
        self.current ^= 1;
        let mut blobs = std::mem::take(&mut self.slots[self.current]);
        blobs.clear();

        // --- 2. Aggregation, filtering and normalization ---
        self.aggregate(labels, count);
        build_blobs(&self.raw, labels.dimensions(), config, now, &mut blobs);
        let filtered = blobs.len();

        // --- 3. Inner/outer rejection ---
        reject_nested(&mut blobs, config.reject_blobs_method);

        // --- 4. Identity assignment ---
        if config.track_blobs {
            let previous = &mut self.slots[self.current ^ 1];
            assign_ids(&mut blobs, previous, config.track_blobs_max_norm_dist);
        } else {
            for (index, blob) in blobs.iter_mut().enumerate() {
                blob.id = Some(index as BlobId);
            }
        }

        // --- 5. Outline approximation ---
        if config.approximate_polygons {
            let points = config.polygon_points.max(MIN_POLYGON_POINTS);
            for blob in blobs.iter_mut() {
                blob.polygon = approximate_polygon(blob, labels, points);
            }
        }

        trace!(
            "blobs: {} labeled, {} after filtering, {} after rejection",
            count,
            filtered,
            blobs.len()
        );

        self.slots[self.current] = blobs;
        &self.slots[self.current]
    }

    fn aggregate(&mut self, labels: &LabelMap, count: usize) {
        self.raw.clear();
        self.raw.resize(count, RawBlobStats::default());

        let width = labels.width() as usize;
        if width == 0 {
            return;
        }
        for (index, &label) in labels.as_slice().iter().enumerate() {
            if label == BACKGROUND {
                continue;
            }
            if let Some(stats) = self.raw.get_mut(label as usize - 1) {
                stats.add((index % width) as u32, (index / width) as u32);
            }
        }
    }

    pub fn current(&self) -> &[Blob] {
        &self.slots[self.current]
    }

    pub fn previous(&self) -> &[Blob] {
        &self.slots[self.current ^ 1]
    }

    pub fn blobs(&self, slot: BlobSlot) -> &[Blob] {
        match slot {
            BlobSlot::Current => self.current(),
            BlobSlot::Previous => self.previous(),
        }
    }
}

fn in_band(value: f64, (min, max): (f64, f64)) -> bool {
    value >= min && value <= max
}

fn build_blobs(
    raw: &[RawBlobStats],
    (width, height): (u32, u32),
    config: &PipelineConfig,
    now: Timestamp,
    blobs: &mut Vec<Blob>,
) {
    let (w, h) = (width as f64, height as f64);
    let total = w * h;

    for (index, stats) in raw.iter().enumerate() {
        if stats.mass == 0 {
            continue;
        }
        let span_x = (stats.max_x - stats.min_x) as f64;
        let span_y = (stats.max_y - stats.min_y) as f64;
        let mass = stats.mass as f64 / total;
        let area = span_x * span_y / total;
        if !in_band(mass, config.blob_mass_range) || !in_band(area, config.blob_area_range) {
            continue;
        }

        let rect = NormRect::new(stats.min_x as f64 / w, stats.min_y as f64 / h, span_x / w, span_y / h);
        let mass_center = NormPoint::new(
            stats.sum_x as f64 / stats.mass as f64 / w,
            stats.sum_y as f64 / stats.mass as f64 / h,
        );
        blobs.push(Blob::new(rect, mass_center, mass, (index + 1) as Label, now));
    }
}

/// Removes nested blobs in blob order. A blob already removed no longer causes
/// others to be removed, so one of two identical rectangles always survives.
fn reject_nested(blobs: &mut Vec<Blob>, method: RejectBlobsMethod) {
    if method == RejectBlobsMethod::None {
        return;
    }

    let mut keep = vec![true; blobs.len()];
    for j in 0..blobs.len() {
        let rejected = (0..blobs.len()).any(|i| {
            i != j
                && keep[i]
                && match method {
                    RejectBlobsMethod::Inner => blobs[i].rect.contains(&blobs[j].rect),
                    RejectBlobsMethod::Outer => blobs[j].rect.contains(&blobs[i].rect),
                    RejectBlobsMethod::None => false,
                }
        });
        if rejected {
            keep[j] = false;
        }
    }

    let mut flags = keep.into_iter();
    blobs.retain(|_| flags.next().unwrap_or(true));
}

/// Lowest non-negative id not carried by any blob in `groups`.
fn lowest_free_id(groups: &[&[Blob]]) -> BlobId {
    let mut used: Vec<BlobId> = groups.iter().flat_map(|g| g.iter().filter_map(|b| b.id)).collect();
    used.sort_unstable();

    let mut candidate: BlobId = 0;
    for id in used {
        if id == candidate {
            candidate += 1;
        } else if id > candidate {
            break;
        }
    }
    candidate
}

fn assign_ids(current: &mut [Blob], previous: &mut [Blob], max_dist: f64) {
    // --- Every previous blob needs an id before it can be matched ---
    for i in 0..previous.len() {
        if previous[i].id.is_none() {
            let id = lowest_free_id(&[&*previous]);
            previous[i].id = Some(id);
        }
    }

    let n = current.len();
    let mut distances = vec![f64::INFINITY; n];
    let mut matched: Vec<Option<usize>> = vec![None; n];

    // --- Pass 1: nearest previous blob under the distance limit ---
    for (i, blob) in current.iter().enumerate() {
        for (j, prev) in previous.iter().enumerate() {
            let distance = blob.mass_center.distance(&prev.mass_center);
            if distance < max_dist && distance < distances[i] {
                distances[i] = distance;
                matched[i] = Some(j);
            }
        }
    }

    // --- Double claims: the closer blob wins, ties go to the earlier one ---
    for i in 0..n {
        for k in (i + 1)..n {
            match (matched[i], matched[k]) {
                (Some(a), Some(b)) if a == b => {
                    if distances[k] < distances[i] {
                        matched[i] = None;
                    } else {
                        matched[k] = None;
                    }
                }
                _ => {}
            }
        }
    }

    // --- Pass 2: losers may take any previous blob nobody holds ---
    for i in 0..n {
        if matched[i].is_some() {
            continue;
        }
        let mut best = f64::INFINITY;
        for (j, prev) in previous.iter().enumerate() {
            if matched.iter().enumerate().any(|(k, m)| k != i && *m == Some(j)) {
                continue;
            }
            let distance = current[i].mass_center.distance(&prev.mass_center);
            if distance < max_dist && distance < best {
                best = distance;
                matched[i] = Some(j);
            }
        }
    }

    // --- Carry identities forward ---
    for (blob, m) in current.iter_mut().zip(&matched) {
        blob.id = None;
        if let Some(j) = *m {
            let prev = &previous[j];
            blob.id = prev.id;
            blob.created = prev.created;
            blob.is_new = false;
        }
    }

    // --- Pass 3: fresh ids for everything still unresolved ---
    for i in 0..n {
        if current[i].id.is_none() {
            let id = lowest_free_id(&[&*current, &*previous]);
            current[i].id = Some(id);
        }
    }
}
