// THEORY:
// The `BackgroundModel` is the temporal layer of the engine. It keeps a running
// estimate of what the scene looks like when nothing moves, and turns every new
// frame into a binary motion mask by comparing against that estimate.
//
// Per frame it maintains four same-sized images:
// 1.  **current**: the input frame, optionally mirrored.
// 2.  **background**: an exponential moving average of past frames when
//     progressive mode is on, otherwise the frozen first frame.
// 3.  **difference**: per-channel absolute difference of background and current.
// 4.  **threshold**: the binary mask, derived from the luminance of the difference.
//
// The first frame, and any frame whose dimensions differ from the previous one,
// resizes all four images and reseeds the background from that frame, so the mask
// for that tick is empty instead of full of stale-background noise.

use crate::core_modules::frame_buffer::{CHANNELS, Frame, FrameBuffer, MASK_OFF, MASK_ON, OPAQUE};
use crate::pipeline::PipelineConfig;
use log::debug;
use serde::{Deserialize, Serialize};

const LUMA_RED: f32 = 0.2126;
const LUMA_GREEN: f32 = 0.7152;
const LUMA_BLUE: f32 = 0.0722;

/// How the input frame is flipped before it enters the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorMode {
    #[default]
    None,
    Horizontal,
    Vertical,
    Both,
}

impl MirrorMode {
    /// (flip x, flip y)
    fn flips(self) -> (bool, bool) {
        match self {
            MirrorMode::None => (false, false),
            MirrorMode::Horizontal => (true, false),
            MirrorMode::Vertical => (false, true),
            MirrorMode::Both => (true, true),
        }
    }
}

/// Running background estimator and motion mask producer.
#[derive(Debug, Clone, Default)]
pub struct BackgroundModel {
    /// The latest input frame after mirroring.
    current: FrameBuffer,
    /// The learned background.
    background: FrameBuffer,
    /// |background - current| per channel.
    difference: FrameBuffer,
    /// Binary mask derived from `difference`.
    threshold: FrameBuffer,
    /// Whether `background` holds real data yet.
    seeded: bool,
}

impl BackgroundModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one frame through the model. Returns `true` when the internal images
    /// had to be resized (and the background was reseeded) for this frame.
    pub fn update(&mut self, frame: &Frame, config: &PipelineConfig) -> bool {
        let resized = self.resize(frame.width(), frame.height());

        mirror_into(&mut self.current, frame, config.mirror_mode);

        if resized || !self.seeded {
            self.background.copy_from(&self.current);
            self.seeded = true;
        } else if config.progressive_background {
            blend_into(&mut self.background, &self.current, config.filter_feedback);
        }

        absolute_difference(&self.background, &self.current, &mut self.difference);
        threshold_into(&self.difference, &mut self.threshold, config.filter_threshold);
        resized
    }

    /// Replaces the background with the given frame (mirrored like regular input).
    pub fn set_background(&mut self, frame: &Frame, config: &PipelineConfig) {
        self.resize(frame.width(), frame.height());
        mirror_into(&mut self.current, frame, config.mirror_mode);
        self.background.copy_from(&self.current);
        self.seeded = true;
    }

    fn resize(&mut self, width: u32, height: u32) -> bool {
        if self.background.dimensions() == (width, height) {
            return false;
        }
        debug!("adjusting background model images to {}x{}", width, height);
        self.current.ensure_size(width, height);
        self.background.ensure_size(width, height);
        self.difference.ensure_size(width, height);
        self.threshold.ensure_size(width, height);
        self.seeded = false;
        true
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.threshold.dimensions()
    }

    pub fn current(&self) -> &FrameBuffer {
        &self.current
    }

    pub fn background(&self) -> &FrameBuffer {
        &self.background
    }

    pub fn difference(&self) -> &FrameBuffer {
        &self.difference
    }

    /// The binary motion mask.
    pub fn threshold(&self) -> &FrameBuffer {
        &self.threshold
    }
}

fn mirror_into(target: &mut FrameBuffer, frame: &Frame, mode: MirrorMode) {
    let (flip_x, flip_y) = mode.flips();
    let height = frame.height();
    let stride = frame.width() as usize * CHANNELS;

    for (y, dst_row) in target.as_raw_mut().chunks_exact_mut(stride).enumerate() {
        let src_y = if flip_y { height - 1 - y as u32 } else { y as u32 };
        let src_row = frame.row(src_y);
        if flip_x {
            for (dst, src) in dst_row
                .chunks_exact_mut(CHANNELS)
                .zip(src_row.chunks_exact(CHANNELS).rev())
            {
                dst.copy_from_slice(src);
            }
        } else {
            dst_row.copy_from_slice(src_row);
        }
    }
}

fn blend_into(background: &mut FrameBuffer, current: &FrameBuffer, feedback: f32) {
    let keep = feedback;
    let take = 1.0 - feedback;
    for (bg, cur) in background
        .as_raw_mut()
        .chunks_exact_mut(CHANNELS)
        .zip(current.as_raw().chunks_exact(CHANNELS))
    {
        for c in 0..3 {
            bg[c] = (bg[c] as f32 * keep + cur[c] as f32 * take).round() as u8;
        }
        bg[3] = OPAQUE;
    }
}

fn absolute_difference(background: &FrameBuffer, current: &FrameBuffer, difference: &mut FrameBuffer) {
    for ((diff, bg), cur) in difference
        .as_raw_mut()
        .chunks_exact_mut(CHANNELS)
        .zip(background.as_raw().chunks_exact(CHANNELS))
        .zip(current.as_raw().chunks_exact(CHANNELS))
    {
        for c in 0..3 {
            diff[c] = bg[c].abs_diff(cur[c]);
        }
        diff[3] = OPAQUE;
    }
}

fn threshold_into(difference: &FrameBuffer, threshold: &mut FrameBuffer, level: f32) {
    let level = level * 255.0;
    for (mask, diff) in threshold
        .as_raw_mut()
        .chunks_exact_mut(CHANNELS)
        .zip(difference.as_raw().chunks_exact(CHANNELS))
    {
        let luma = LUMA_RED * diff[0] as f32 + LUMA_GREEN * diff[1] as f32 + LUMA_BLUE * diff[2] as f32;
        let value = if luma > level { MASK_ON } else { MASK_OFF };
        mask[0] = value;
        mask[1] = value;
        mask[2] = value;
        mask[3] = OPAQUE;
    }
}
