//! Embedded page-image extraction using lopdf.
//!
//! Used when PDFium is unavailable. Scanned paperwork carries one image XObject
//! per page (JPEG or raw pixels), which is taken as that page's raster.

use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use super::{cap_dimensions, PageRaster};
use crate::errors::{DomainError, DomainResult};

/// Extract the largest image of every page, in page order.
pub fn extract_pages(data: &[u8]) -> DomainResult<Vec<PageRaster>> {
    let doc = Document::load_mem(data)
        .map_err(|e| DomainError::Extraction(format!("Failed to parse PDF: {}", e)))?;

    // get_pages is keyed by 1-based page number, so iteration follows document order
    doc.get_pages()
        .into_values()
        .enumerate()
        .map(|(index, page_id)| {
            let image = largest_page_image(&doc, page_id).map_err(|e| match e {
                DomainError::Extraction(reason) => {
                    DomainError::Extraction(format!("Page {}: {}", index, reason))
                }
                other => other,
            })?;
            Ok(PageRaster::new(index, cap_dimensions(image)))
        })
        .collect()
}

fn largest_page_image(doc: &Document, page_id: ObjectId) -> DomainResult<DynamicImage> {
    let page_dict = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| DomainError::Extraction(format!("Page object error: {}", e)))?;

    let resources = resolve_dict_entry(doc, page_dict, b"Resources")?;
    let xobjects = resolve_dict_entry(doc, resources, b"XObject")?;

    let mut largest: Option<(u64, &Stream)> = None;
    for (_name, obj) in xobjects.iter() {
        let stream = match resolve_object(doc, obj) {
            Object::Stream(s) => s,
            _ => continue,
        };
        if !is_image_subtype(&stream.dict) {
            continue;
        }
        let width = get_int(&stream.dict, b"Width").unwrap_or(0).max(0) as u64;
        let height = get_int(&stream.dict, b"Height").unwrap_or(0).max(0) as u64;
        let area = width * height;
        if largest.map_or(true, |(best, _)| area > best) {
            largest = Some((area, stream));
        }
    }

    let (_, stream) = largest.ok_or_else(|| {
        DomainError::Extraction("No raster content on page and PDFium is unavailable".to_string())
    })?;
    decode_image_stream(doc, stream)
}

fn is_image_subtype(dict: &Dictionary) -> bool {
    dict.get(b"Subtype")
        .map(|obj| matches!(obj, Object::Name(ref n) if n == b"Image"))
        .unwrap_or(false)
}

fn has_filter(dict: &Dictionary, name: &[u8]) -> bool {
    match dict.get(b"Filter") {
        Ok(Object::Name(n)) => n == name,
        Ok(Object::Array(arr)) => arr.iter().any(|o| matches!(o, Object::Name(ref n) if n == name)),
        _ => false,
    }
}

fn decode_image_stream(doc: &Document, stream: &Stream) -> DomainResult<DynamicImage> {
    if has_filter(&stream.dict, b"DCTDecode") {
        // DCTDecode content is a complete JPEG file
        let image = image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)
            .map_err(|e| DomainError::Extraction(format!("Failed to decode embedded JPEG: {}", e)))?;
        return Ok(DynamicImage::ImageRgb8(image.to_rgb8()));
    }

    let content = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    if let Ok(image) = image::load_from_memory(&content) {
        return Ok(DynamicImage::ImageRgb8(image.to_rgb8()));
    }

    reconstruct_raw_image(doc, &stream.dict, content)
}

/// Rebuild an image from raw 8-bit samples using /Width, /Height and /ColorSpace.
fn reconstruct_raw_image(doc: &Document, dict: &Dictionary, raw: Vec<u8>) -> DomainResult<DynamicImage> {
    let width = get_int(dict, b"Width")? as u32;
    let height = get_int(dict, b"Height")? as u32;
    let bpc = get_int(dict, b"BitsPerComponent").unwrap_or(8);
    if bpc != 8 {
        return Err(DomainError::Extraction(format!("Unsupported bits per component: {}", bpc)));
    }

    let channels = determine_channels(doc, dict);
    let expected = width as usize * height as usize * channels;
    if raw.len() < expected {
        return Err(DomainError::Extraction(format!(
            "Raw pixel buffer too small: {} bytes, expected {} ({}x{}x{})",
            raw.len(), expected, width, height, channels
        )));
    }
    let mut raw = raw;
    raw.truncate(expected);

    let image = match channels {
        1 => GrayImage::from_raw(width, height, raw).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(width, height, raw).map(DynamicImage::ImageRgb8),
        _ => {
            return Err(DomainError::Extraction(format!("Unsupported channel count: {}", channels)));
        }
    };
    image
        .map(|img| DynamicImage::ImageRgb8(img.to_rgb8()))
        .ok_or_else(|| DomainError::Extraction("Failed to assemble raw image".to_string()))
}

fn determine_channels(doc: &Document, dict: &Dictionary) -> usize {
    let cs = match dict.get(b"ColorSpace") {
        Ok(obj) => resolve_object(doc, obj),
        Err(_) => return 3,
    };

    match cs {
        Object::Name(n) if n == b"DeviceGray" => 1,
        Object::Name(n) if n == b"DeviceCMYK" => 4,
        Object::Array(arr) => match arr.first() {
            Some(Object::Name(n)) if n == b"ICCBased" => arr
                .get(1)
                .map(|o| resolve_object(doc, o))
                .and_then(|o| o.as_stream().ok())
                .and_then(|s| get_int(&s.dict, b"N").ok())
                .unwrap_or(3) as usize,
            _ => 3,
        },
        _ => 3,
    }
}

fn resolve_object<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn resolve_dict_entry<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> DomainResult<&'a Dictionary> {
    let obj = dict.get(key).map_err(|_| {
        DomainError::Extraction(format!("Missing /{} in dictionary", String::from_utf8_lossy(key)))
    })?;
    resolve_object(doc, obj).as_dict().map_err(|_| {
        DomainError::Extraction(format!("/{} is not a dictionary", String::from_utf8_lossy(key)))
    })
}

fn get_int(dict: &Dictionary, key: &[u8]) -> DomainResult<i64> {
    dict.get(key)
        .and_then(Object::as_i64)
        .map_err(|_| {
            DomainError::Extraction(format!("Missing or invalid /{}", String::from_utf8_lossy(key)))
        })
}
