//! Quadrant cropping of batch-rectified images.

use std::path::Path;

use anyhow::{bail, Context, Result};
use image::GenericImageView;

/// Exact geometric quarter of a `width` x `height` image holding `plate`:
/// 1 = top-left, 2 = top-right, 3 = bottom-left, 4 = bottom-right.
/// Returns (x, y, quarter_width, quarter_height).
pub fn quadrant_box(plate: u8, width: u32, height: u32) -> Result<(u32, u32, u32, u32)> {
    let half_w = width / 2;
    let half_h = height / 2;
    let (x, y) = match plate {
        1 => (0, 0),
        2 => (half_w, 0),
        3 => (0, half_h),
        4 => (half_w, half_h),
        other => bail!("plate {} is outside 1..4, cannot derive a quadrant", other),
    };
    // Right/bottom quadrants absorb the odd pixel of odd dimensions.
    let w = if x == 0 { half_w } else { width - half_w };
    let h = if y == 0 { half_h } else { height - half_h };
    Ok((x, y, w, h))
}

/// Crops one plate quadrant out of a rectified batch image. A crop covering
/// less than 10% of the source area indicates a degenerate source image and
/// is rejected.
pub fn crop_plate(rectified: &Path, plate: u8, dest: &Path) -> Result<()> {
    let img = image::open(rectified)
        .with_context(|| format!("failed to open rectified image {}", rectified.display()))?;
    let (width, height) = img.dimensions();
    let (x, y, w, h) = quadrant_box(plate, width, height)?;

    let src_area = width as u64 * height as u64;
    let crop_area = w as u64 * h as u64;
    if src_area == 0 || (crop_area as f64) < 0.10 * src_area as f64 {
        bail!(
            "degenerate crop for plate {} of {}: {}x{} out of {}x{}",
            plate,
            rectified.display(),
            w,
            h,
            width,
            height
        );
    }

    let cropped = img.crop_imm(x, y, w, h);
    cropped
        .save(dest)
        .with_context(|| format!("failed to write cropped plate image {}", dest.display()))?;
    Ok(())
}

/// Downscales an image to `target_width`, returning the factor applied so
/// that coordinates picked on the preview can be mapped back to full
/// resolution.
pub fn write_preview(source: &Path, dest: &Path, target_width: u32) -> Result<f64> {
    let img = image::open(source)
        .with_context(|| format!("failed to open image {}", source.display()))?;
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        bail!("image {} has zero extent", source.display());
    }
    let factor = target_width as f64 / width as f64;
    let new_h = ((height as f64) * factor).round().max(1.0) as u32;
    let preview = img.resize_exact(target_width, new_h, image::imageops::FilterType::Triangle);
    preview
        .save(dest)
        .with_context(|| format!("failed to write preview {}", dest.display()))?;
    Ok(factor)
}

/// Full-resolution dimensions of an image on disk.
pub fn dimensions(path: &Path) -> Result<(u32, u32)> {
    let img = image::open(path)
        .with_context(|| format!("failed to open image {}", path.display()))?;
    Ok(img.dimensions())
}
