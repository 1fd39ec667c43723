// This file is an example of how to drive the `motion_zones` library.
//
// Usage: motion_zones [config.json] [dump_directory]
//
// It renders a synthetic scene (a bright square sliding over a dark background),
// feeds it to a pipeline actor with one zone on the right side of the frame, and
// logs zone transitions and tracked blobs. With a dump directory the final motion
// mask and label map are written there as PNG files.

use anyhow::Context;
use flexi_logger::Logger;
use log::info;
use motion_zones::actor_pipeline::PipelineHandle;
use motion_zones::core_modules::frame_buffer::CHANNELS;
use motion_zones::core_modules::utils::image_helper;
use motion_zones::pipeline::{NormRect, PipelineConfig};
use std::path::PathBuf;

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;
const SQUARE: u32 = 16;
const FRAMES: u32 = 36;
const STEP: u32 = 4;

fn render(square_x: Option<u32>) -> Vec<u8> {
    let mut pixels = vec![24u8; (WIDTH * HEIGHT) as usize * CHANNELS];
    for pixel in pixels.chunks_exact_mut(CHANNELS) {
        pixel[3] = 255;
    }
    if let Some(x0) = square_x {
        let y0 = (HEIGHT - SQUARE) / 2;
        for y in y0..y0 + SQUARE {
            for x in x0..(x0 + SQUARE).min(WIDTH) {
                let i = (y * WIDTH + x) as usize * CHANNELS;
                pixels[i..i + 3].fill(230);
            }
        }
    }
    pixels
}

fn load_config(path: Option<&String>) -> anyhow::Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig {
            handle_blobs: true,
            handle_zones: true,
            track_blobs: true,
            ..Default::default()
        });
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _logger = Logger::try_with_env_or_str("info")?.log_to_stdout().start()?;

    let args: Vec<String> = std::env::args().collect();
    let config = load_config(args.get(1))?;
    let dump_dir = args.get(2).map(PathBuf::from);
    info!("Motion Zones Engine - Example Runner");

    let pipeline = PipelineHandle::spawn(config);
    pipeline
        .add_zone(1, NormRect::new(0.6, 0.3, 0.3, 0.4), |zone| {
            info!(
                "zone {} {} at frame {} ({} ms, fill factor {:.3})",
                zone.id,
                if zone.movement_detected { "entered" } else { "cleared" },
                zone.changed_at.map(|t| t.frame_count).unwrap_or_default(),
                zone.changed_at.map(|t| t.millis()).unwrap_or_default(),
                zone.fill_factor
            );
        })
        .await?;

    // Seed the background with the empty scene.
    pipeline.submit_frame(render(None), WIDTH, HEIGHT).await?;

    for frame in 0..FRAMES {
        let x = 4 + frame * STEP;
        let square_x = (x + SQUARE < WIDTH).then_some(x);
        let summary = pipeline.submit_frame(render(square_x), WIDTH, HEIGHT).await?;
        for blob in &summary.blobs {
            info!(
                "frame {}: blob {:?} at ({:.3}, {:.3}) mass {:.4}{}",
                summary.timestamp.frame_count,
                blob.id,
                blob.mass_center.x,
                blob.mass_center.y,
                blob.mass,
                if blob.is_new { " (new)" } else { "" }
            );
        }
    }

    if let Some(dir) = dump_dir {
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        let snapshot = pipeline.snapshot().await?;
        image_helper::save_mask(dir.join("mask.png"), &snapshot.threshold_mask)?;
        image_helper::save_label_map(dir.join("labels.png"), &snapshot.labels)?;
        info!("wrote mask and label map to {}", dir.display());
    }

    pipeline.shutdown().await?;
    Ok(())
}
