use crate::core_modules::frame_buffer::FrameBuffer;
use crate::core_modules::label_map::{BACKGROUND, Label, LabelMap};
use image::ImageEncoder;
use std::path::Path;

/// Writes an RGBA buffer (the motion mask or any model image) as a PNG file.
pub fn save_mask<P: AsRef<Path>>(path: P, buffer: &FrameBuffer) -> Result<(), image::error::ImageError> {
    let output = std::fs::File::create(path)?;
    let encoder = image::codecs::png::PngEncoder::new(output);

    encoder.write_image(
        buffer.as_raw(),
        buffer.width(),
        buffer.height(),
        image::ExtendedColorType::Rgba8,
    )?;

    Ok(())
}

/// Writes a label map as a grayscale PNG. Background is black; each label gets
/// a gray level that differs from its neighbors in numbering.
pub fn save_label_map<P: AsRef<Path>>(path: P, labels: &LabelMap) -> Result<(), image::error::ImageError> {
    let gray: Vec<u8> = labels.as_slice().iter().map(|&label| label_intensity(label)).collect();

    let output = std::fs::File::create(path)?;
    let encoder = image::codecs::png::PngEncoder::new(output);

    encoder.write_image(&gray, labels.width(), labels.height(), image::ExtendedColorType::L8)?;

    Ok(())
}

fn label_intensity(label: Label) -> u8 {
    if label == BACKGROUND {
        0
    } else {
        (55 + (label.wrapping_mul(53) % 200)) as u8
    }
}
