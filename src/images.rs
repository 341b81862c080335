use crate::error::FieldError;
use crate::fit::FittedImage;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use lopdf::{Document as LoDocument, ObjectId as LoObjectId, Stream as LoStream, dictionary};

const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddedFormat {
    // RGB samples with an 8-bit soft mask.
    Png,
    // DCT stream; transparency is flattened onto white.
    Jpeg,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EmbeddedImage {
    pub(crate) object_id: LoObjectId,
    pub(crate) format: EmbeddedFormat,
}

/// Embeds a fitted image, preferring the lossless path that keeps transparency.
pub(crate) fn embed_fitted(
    doc: &mut LoDocument,
    fitted: &FittedImage,
) -> Result<EmbeddedImage, FieldError> {
    match embed_png(doc, fitted) {
        Ok(image) => Ok(image),
        Err(primary) => embed_jpeg(doc, fitted).map_err(|fallback| {
            FieldError::ImageEmbed(format!("png: {}; jpeg fallback: {}", primary, fallback))
        }),
    }
}

fn decode_fitted(fitted: &FittedImage) -> Result<DynamicImage, String> {
    let decoded = image::load_from_memory_with_format(&fitted.png, ImageFormat::Png)
        .map_err(|err| err.to_string())?;
    if decoded.width() != fitted.width || decoded.height() != fitted.height {
        return Err(format!(
            "fitted image is {}x{}, expected {}x{}",
            decoded.width(),
            decoded.height(),
            fitted.width,
            fitted.height
        ));
    }
    Ok(decoded)
}

fn sample_count(width: u32, height: u32, channels: usize) -> Result<usize, String> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(channels))
        .ok_or_else(|| format!("{}x{} image is too large to embed", width, height))
}

fn embed_png(doc: &mut LoDocument, fitted: &FittedImage) -> Result<EmbeddedImage, String> {
    let rgba = decode_fitted(fitted)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut rgb = Vec::with_capacity(sample_count(width, height, 3)?);
    let mut alpha = Vec::with_capacity(sample_count(width, height, 1)?);
    let mut has_alpha = false;
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        if a != 255 {
            has_alpha = true;
        }
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };
    if has_alpha {
        let smask_id = doc.add_object(LoStream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha,
        ));
        dict.set("SMask", smask_id);
    }
    let object_id = doc.add_object(LoStream::new(dict, rgb));
    Ok(EmbeddedImage {
        object_id,
        format: EmbeddedFormat::Png,
    })
}

fn embed_jpeg(doc: &mut LoDocument, fitted: &FittedImage) -> Result<EmbeddedImage, String> {
    let rgba = decode_fitted(fitted)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut flat = RgbImage::new(width, height);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let blend = |c: u8| -> u8 {
            ((c as u32 * a as u32 + 255 * (255 - a as u32) + 127) / 255) as u8
        };
        flat.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }

    let mut data = Vec::new();
    DynamicImage::ImageRgb8(flat)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut data, JPEG_QUALITY))
        .map_err(|err| err.to_string())?;

    let stream = LoStream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        data,
    )
    .with_compression(false);
    let object_id = doc.add_object(stream);
    Ok(EmbeddedImage {
        object_id,
        format: EmbeddedFormat::Jpeg,
    })
}
