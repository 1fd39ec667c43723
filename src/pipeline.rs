// THEORY:
// The `pipeline` module is the top-level API for the entire motion engine.
// It encapsulates the full stack (background model, labeler, tracker, active zones)
// behind a single struct that is fed one raw RGBA frame at a time.
//
// Key architectural principles:
// 1.  **One engine per capture source**: all state lives inside a `VisionPipeline`
//     instance. There are no globals, so independent cameras get independent
//     pipelines.
// 2.  **Validate, then mutate**: a malformed frame is rejected before any state is
//     touched, so a bad frame never desynchronizes the images from each other.
// 3.  **Synchronous events**: zone handlers run inside `submit_frame`. The `&mut self`
//     receiver makes re-entering the pipeline from a handler impossible.
// 4.  **Forgiving configuration**: out-of-range settings are clamped with a warning,
//     never rejected.

use crate::core_modules::active_zone::ActiveZoneMonitor;
use crate::core_modules::background_model::BackgroundModel;
use crate::core_modules::blob_labeler;
use crate::core_modules::frame_buffer::{Frame, FrameBuffer};
use crate::core_modules::label_map::LabelMap;
use crate::core_modules::polygon::MIN_POLYGON_POINTS;
use crate::core_modules::timestamp::FrameClock;
use crate::core_modules::tracker::BlobTracker;
use log::{trace, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

// Re-export key data structures for the public API.
pub use crate::core_modules::active_zone::{ActiveZone, ZoneHandler, ZoneId};
pub use crate::core_modules::background_model::MirrorMode;
pub use crate::core_modules::blob::{Blob, BlobId, NormPoint, NormRect};
pub use crate::core_modules::blob_labeler::LabelingStrategy;
pub use crate::core_modules::timestamp::Timestamp;
pub use crate::core_modules::tracker::{BlobSlot, RejectBlobsMethod};
pub use crate::error::VisionError;

/// Configuration for the VisionPipeline. Every field has a default, so partial
/// JSON documents deserialize cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub mirror_mode: MirrorMode,
    /// Learn the background continuously instead of freezing the first frame.
    pub progressive_background: bool,
    /// Weight of the old background in each blend, in [0, 1].
    pub filter_feedback: f32,
    /// Luminance level of the difference image, in [0, 1], above which a pixel
    /// counts as moving.
    pub filter_threshold: f32,
    pub handle_blobs: bool,
    pub handle_zones: bool,
    pub track_blobs: bool,
    /// Maximum mass-center distance, in normalized units, for a blob to keep its id.
    pub track_blobs_max_norm_dist: f64,
    /// Inclusive (min, max) band for normalized blob mass.
    pub blob_mass_range: (f64, f64),
    /// Inclusive (min, max) band for normalized bounding-box area.
    pub blob_area_range: (f64, f64),
    pub reject_blobs_method: RejectBlobsMethod,
    pub approximate_polygons: bool,
    pub polygon_points: usize,
    pub zone_fill_threshold: f64,
    pub labeling: LabelingStrategy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mirror_mode: MirrorMode::None,
            progressive_background: true,
            filter_feedback: 0.92,
            filter_threshold: 0.4,
            handle_blobs: false,
            handle_zones: false,
            track_blobs: false,
            track_blobs_max_norm_dist: 0.15,
            blob_mass_range: (0.0002, 0.5),
            blob_area_range: (0.0002, 0.5),
            reject_blobs_method: RejectBlobsMethod::None,
            approximate_polygons: false,
            polygon_points: 6,
            zone_fill_threshold: 0.02,
            labeling: LabelingStrategy::UnionFind,
        }
    }
}

impl PipelineConfig {
    /// Returns a copy with every out-of-range value clamped. Each correction is
    /// logged as a warning.
    pub fn sanitized(mut self) -> Self {
        self.filter_feedback = clamp_logged("filter_feedback", self.filter_feedback, 0.0, 1.0);
        self.filter_threshold = clamp_logged("filter_threshold", self.filter_threshold, 0.0, 1.0);
        self.zone_fill_threshold = clamp_logged("zone_fill_threshold", self.zone_fill_threshold, 0.0, 1.0);
        self.track_blobs_max_norm_dist = clamp_logged(
            "track_blobs_max_norm_dist",
            self.track_blobs_max_norm_dist,
            0.0,
            f64::INFINITY,
        );
        self.blob_mass_range = sanitize_band("blob_mass_range", self.blob_mass_range);
        self.blob_area_range = sanitize_band("blob_area_range", self.blob_area_range);

        if self.polygon_points < MIN_POLYGON_POINTS {
            warn!(
                "polygon_points {} is below the minimum, using {}",
                self.polygon_points, MIN_POLYGON_POINTS
            );
            self.polygon_points = MIN_POLYGON_POINTS;
        }
        self
    }
}

fn clamp_logged<T: PartialOrd + Copy + Display>(name: &str, value: T, min: T, max: T) -> T {
    let clamped = if value > max {
        max
    } else if value >= min {
        value
    } else {
        // Below the minimum, or NaN.
        min
    };
    if clamped != value {
        warn!("{} = {} is out of range, using {}", name, value, clamped);
    }
    clamped
}

fn sanitize_band(name: &str, (min, max): (f64, f64)) -> (f64, f64) {
    let min = clamp_logged(name, min, 0.0, 1.0);
    let max = clamp_logged(name, max, 0.0, 1.0);
    if min > max {
        warn!("{} has min {} above max {}, swapping", name, min, max);
        (max, min)
    } else {
        (min, max)
    }
}

/// The result of a single `submit_frame` call. Borrows the pipeline until dropped.
#[derive(Debug, Clone, Copy)]
pub struct FrameReport<'a> {
    /// Blobs of this frame. Empty when blob handling is disabled.
    pub blobs: &'a [Blob],
    /// The binary motion mask.
    pub threshold_mask: &'a FrameBuffer,
    /// Connected components found before filtering and rejection.
    pub raw_blob_count: usize,
    /// Number of zones that flipped state during this frame.
    pub zone_transitions: usize,
    pub timestamp: Timestamp,
}

/// The main, top-level struct for the motion engine.
pub struct VisionPipeline {
    config: PipelineConfig,
    background: BackgroundModel,
    labels: LabelMap,
    tracker: BlobTracker,
    zones: ActiveZoneMonitor,
    clock: FrameClock,
    last_update: Option<Timestamp>,
}

impl Default for VisionPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl std::fmt::Debug for VisionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionPipeline")
            .field("config", &self.config)
            .field("dimensions", &self.background.dimensions())
            .field("zones", &self.zones)
            .field("last_update", &self.last_update)
            .finish()
    }
}

impl VisionPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let config = config.sanitized();
        Self {
            zones: ActiveZoneMonitor::new(config.zone_fill_threshold),
            config,
            background: BackgroundModel::new(),
            labels: LabelMap::default(),
            tracker: BlobTracker::new(),
            clock: FrameClock::new(),
            last_update: None,
        }
    }

    /// Replaces the active configuration. The zone fill threshold is applied to
    /// every existing zone at once.
    pub fn configure(&mut self, config: PipelineConfig) {
        self.config = config.sanitized();
        self.zones.set_fill_threshold(self.config.zone_fill_threshold);
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs one RGBA frame through the engine.
    pub fn submit_frame(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<FrameReport<'_>, VisionError> {
        let frame = Frame::new(pixels, width, height)?;
        let now = self.clock.tick();

        // --- 1. Temporal analysis: background, difference, mask ---
        self.background.update(&frame, &self.config);
        let mask = self.background.threshold();
        let (mask_width, mask_height) = mask.dimensions();
        self.labels.ensure_size(mask_width, mask_height);

        // --- 2. Spatial grouping and identity ---
        let mut raw_blob_count = 0;
        if self.config.handle_blobs {
            raw_blob_count = blob_labeler::label(mask, &mut self.labels, self.config.labeling);
            self.tracker.process(&self.labels, raw_blob_count, &self.config, now);
        }

        // --- 3. Zone events ---
        let zone_transitions = if self.config.handle_zones {
            self.zones.update(mask, now)
        } else {
            0
        };

        self.last_update = Some(now);
        trace!(
            "frame {}: {} raw blobs, {} zone transitions",
            now.frame_count, raw_blob_count, zone_transitions
        );

        Ok(FrameReport {
            blobs: if self.config.handle_blobs { self.tracker.current() } else { &[] },
            threshold_mask: self.background.threshold(),
            raw_blob_count,
            zone_transitions,
            timestamp: now,
        })
    }

    /// Replaces the learned background with the given frame.
    pub fn set_background(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<(), VisionError> {
        let frame = Frame::new(pixels, width, height)?;
        self.background.set_background(&frame, &self.config);
        let (mask_width, mask_height) = self.background.dimensions();
        self.labels.ensure_size(mask_width, mask_height);
        Ok(())
    }

    pub fn add_zone<F>(&mut self, id: ZoneId, rect: NormRect, on_change: F)
    where
        F: FnMut(&ActiveZone) + Send + 'static,
    {
        self.zones.add_zone(id, rect, on_change);
    }

    pub fn add_silent_zone(&mut self, id: ZoneId, rect: NormRect) {
        self.zones.add_silent_zone(id, rect);
    }

    pub fn add_boxed_zone(&mut self, id: ZoneId, rect: NormRect, on_change: Option<ZoneHandler>) {
        self.zones.add_boxed_zone(id, rect, on_change);
    }

    pub fn remove_zone(&mut self, id: ZoneId) -> usize {
        self.zones.remove_zone(id)
    }

    pub fn get_zone(&self, id: ZoneId) -> Option<&ActiveZone> {
        self.zones.get_zone(id)
    }

    pub fn set_zone_enabled(&mut self, id: ZoneId, enabled: bool) -> usize {
        self.zones.set_zone_enabled(id, enabled)
    }

    pub fn zones(&self) -> impl Iterator<Item = &ActiveZone> {
        self.zones.zones()
    }

    pub fn blobs(&self) -> &[Blob] {
        self.tracker.current()
    }

    pub fn previous_blobs(&self) -> &[Blob] {
        self.tracker.previous()
    }

    pub fn blobs_in(&self, slot: BlobSlot) -> &[Blob] {
        self.tracker.blobs(slot)
    }

    pub fn threshold_mask(&self) -> &FrameBuffer {
        self.background.threshold()
    }

    pub fn background_model(&self) -> &BackgroundModel {
        &self.background
    }

    pub fn label_map(&self) -> &LabelMap {
        &self.labels
    }

    /// Whether the motion mask is on at a normalized position.
    pub fn hit_test(&self, norm_x: f64, norm_y: f64) -> bool {
        self.background.threshold().hit_test(norm_x, norm_y)
    }

    pub fn last_update(&self) -> Option<Timestamp> {
        self.last_update
    }

    pub fn frame_count(&self) -> u64 {
        self.clock.frame_count()
    }
}
