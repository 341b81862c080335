//! Letterbox fitting of signature images into a field's box.

use crate::error::FieldError;
use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, RgbaImage};
use std::io::Cursor;

/// Largest box, in pixels, a signature is fitted into. One point maps to one pixel, so
/// this is far above any page-sized field.
pub const MAX_FIT_PIXELS: u64 = 25_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitPlan {
    pub resize_width: u32,
    pub resize_height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

/// Output of the fitter: a `width` x `height` RGBA canvas, PNG encoded.
#[derive(Debug, Clone)]
pub struct FittedImage {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

/// Computes where a `src_w` x `src_h` image lands inside the target box: scaled to fit
/// without cropping and centered on the constrained axis.
pub fn plan_fit(
    src_w: u32,
    src_h: u32,
    target_w: u32,
    target_h: u32,
) -> Result<FitPlan, FieldError> {
    if src_w == 0 || src_h == 0 {
        return Err(FieldError::ImageFit("source image has no pixels".to_string()));
    }
    if target_w == 0 || target_h == 0 {
        return Err(FieldError::ImageFit(format!(
            "target box {}x{} is empty",
            target_w, target_h
        )));
    }
    check_area(target_w, target_h)?;
    let source_aspect = src_w as f64 / src_h as f64;
    let target_aspect = target_w as f64 / target_h as f64;
    let plan = if source_aspect > target_aspect {
        let resize_height = ((target_w as f64 / source_aspect).round() as u32).clamp(1, target_h);
        FitPlan {
            resize_width: target_w,
            resize_height,
            offset_x: 0,
            offset_y: ((target_h - resize_height) as f64 / 2.0).round() as u32,
        }
    } else {
        let resize_width = ((target_h as f64 * source_aspect).round() as u32).clamp(1, target_w);
        FitPlan {
            resize_width,
            resize_height: target_h,
            offset_x: ((target_w - resize_width) as f64 / 2.0).round() as u32,
            offset_y: 0,
        }
    };
    Ok(plan)
}

/// Box dimensions in whole pixels; fractional sizes round to the nearest pixel.
pub fn target_pixels(width: f32, height: f32) -> Result<(u32, u32), FieldError> {
    let to_px = |v: f32| -> Result<u32, FieldError> {
        if !v.is_finite() || v < 0.0 || v > u32::MAX as f32 {
            return Err(FieldError::ImageFit(format!("target dimension {} is unusable", v)));
        }
        Ok(v.round() as u32)
    };
    let (w, h) = (to_px(width)?, to_px(height)?);
    check_area(w, h)?;
    Ok((w, h))
}

fn check_area(width: u32, height: u32) -> Result<(), FieldError> {
    match (width as u64).checked_mul(height as u64) {
        Some(area) if area <= MAX_FIT_PIXELS => Ok(()),
        _ => Err(FieldError::ImageFit(format!(
            "target box {}x{} exceeds {} pixels",
            width, height, MAX_FIT_PIXELS
        ))),
    }
}

pub fn fit_image(source: &[u8], target_w: u32, target_h: u32) -> Result<FittedImage, FieldError> {
    let decoded =
        image::load_from_memory(source).map_err(|err| FieldError::ImageDecode(err.to_string()))?;
    let (src_w, src_h) = decoded.dimensions();
    let plan = plan_fit(src_w, src_h, target_w, target_h)?;

    let resized = decoded
        .resize_exact(plan.resize_width, plan.resize_height, FilterType::Lanczos3)
        .to_rgba8();
    let mut canvas = RgbaImage::new(target_w, target_h);
    image::imageops::replace(
        &mut canvas,
        &resized,
        plan.offset_x as i64,
        plan.offset_y as i64,
    );

    let mut png = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|err| FieldError::ImageFit(err.to_string()))?;
    Ok(FittedImage {
        width: target_w,
        height: target_h,
        png,
    })
}

/// Extracts the raw bytes of a `data:image/...;base64,...` URI.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, FieldError> {
    let Some((header, payload)) = uri.split_once(',') else {
        return Err(FieldError::ImagePayload("data uri has no payload".to_string()));
    };
    if !header.starts_with("data:image/") || !header.ends_with(";base64") {
        return Err(FieldError::ImagePayload(format!(
            "unsupported data uri header {:?}",
            header
        )));
    }
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|err| FieldError::ImagePayload(err.to_string()))?;
    if bytes.is_empty() {
        return Err(FieldError::ImagePayload("data uri payload is empty".to_string()));
    }
    Ok(bytes)
}
