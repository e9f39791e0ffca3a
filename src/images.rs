use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;

use tempfile::TempPath;

use crate::model::{ImageBlock, ImageRef, MediaPart, Paragraph};

pub const EMU_PER_INCH: f64 = 914_400.0;
pub const POINTS_PER_INCH: f64 = 72.0;
/// Display width used when a drawing declares no extent.
pub const DEFAULT_IMAGE_WIDTH: f32 = 300.0;

pub fn emu_to_pt(emu: u64) -> f32 {
    (emu as f64 / EMU_PER_INCH * POINTS_PER_INCH) as f32
}

/// Scale (width, height) down proportionally so width fits `max_width`.
pub fn fit_width(width: f32, height: f32, max_width: f32) -> (f32, f32) {
    if width > max_width && width > 0.0 {
        (max_width, height * max_width / width)
    } else {
        (width, height)
    }
}

/// Displayed size in points from the stored extent, or from the default width
/// and the pixel aspect ratio when no usable extent exists.
pub fn display_size(
    extent_emu: Option<(u64, u64)>,
    pixel_dims: Option<(u32, u32)>,
    max_width: f32,
) -> (f32, f32) {
    if let Some((cx, cy)) = extent_emu.filter(|&(cx, cy)| cx > 0 && cy > 0) {
        return fit_width(emu_to_pt(cx), emu_to_pt(cy), max_width);
    }
    let width = DEFAULT_IMAGE_WIDTH.min(max_width);
    let height = match pixel_dims {
        Some((pw, ph)) if pw > 0 && ph > 0 => width * ph as f32 / pw as f32,
        _ => width,
    };
    (width, height)
}

/// File extension for an image content type ("image/jpeg" -> "jpg").
pub fn extension_for(content_type: &str) -> String {
    let subtype = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .rsplit('/')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    let ext: String = subtype.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    match ext.as_str() {
        "jpeg" | "pjpeg" => "jpg".to_string(),
        "" => "bin".to_string(),
        _ => ext,
    }
}

/// Pixel dimensions read from the image header.
pub fn pixel_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if let Some((w, h, _)) = jpeg_info(data) {
        return Some((w, h));
    }
    ::image::ImageReader::new(io::Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// (width, height, components) from a JPEG SOF marker.
pub(crate) fn jpeg_info(data: &[u8]) -> Option<(u32, u32, u8)> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }
    let mut i = 2;
    while i + 4 < data.len() {
        if data[i] != 0xFF {
            return None;
        }
        let marker = data[i + 1];
        if marker == 0xD9 {
            break;
        }
        let len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
        if (0xC0..=0xC2).contains(&marker) && i + 9 < data.len() {
            let height = u16::from_be_bytes([data[i + 5], data[i + 6]]) as u32;
            let width = u16::from_be_bytes([data[i + 7], data[i + 8]]) as u32;
            let components = data[i + 9];
            return Some((width, height, components));
        }
        i += 2 + len;
    }
    None
}

/// Temporary image files owned by one conversion. Every file is removed when
/// the guard is dropped, whichever way the conversion ends.
#[derive(Default)]
pub struct TempImages {
    paths: Vec<TempPath>,
}

impl TempImages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &std::path::Path> {
        self.paths.iter().map(|p| &**p)
    }

    /// Write `data` to a uniquely named temp file and track it.
    pub fn persist(&mut self, data: &[u8], extension: &str) -> io::Result<PathBuf> {
        let mut file = tempfile::Builder::new()
            .prefix("relayout-img-")
            .suffix(&format!(".{extension}"))
            .tempfile()?;
        file.write_all(data)?;
        file.flush()?;
        let path = file.into_temp_path();
        let owned = path.to_path_buf();
        self.paths.push(path);
        Ok(owned)
    }

    /// Delete all tracked files now. Failures are logged, not returned.
    pub fn close(self) {
        for path in self.paths {
            let display = path.to_path_buf();
            if let Err(e) = path.close() {
                log::warn!("could not remove temp image {}: {e}", display.display());
            }
        }
    }
}

/// Resolve one image reference to a placed image. Unresolvable references and
/// write failures are logged and skipped.
pub fn extract_image(
    image: &ImageRef,
    media: &HashMap<String, MediaPart>,
    temp: &mut TempImages,
    max_width: f32,
) -> Option<ImageBlock> {
    let Some(part) = media.get(&image.embed_id) else {
        log::warn!("skipping image: relationship {} not found", image.embed_id);
        return None;
    };
    let path = match temp.persist(&part.data, &extension_for(&part.content_type)) {
        Ok(path) => path,
        Err(e) => {
            log::warn!("skipping image {}: {e}", image.embed_id);
            return None;
        }
    };
    let (width, height) = display_size(image.extent_emu, pixel_dimensions(&part.data), max_width);
    log::debug!(
        "image {} -> {} ({width:.1}x{height:.1}pt)",
        image.embed_id,
        path.display()
    );
    Some(ImageBlock {
        path,
        width,
        height,
    })
}

/// All resolvable images of a paragraph, in document order.
pub fn extract_images(
    para: &Paragraph,
    media: &HashMap<String, MediaPart>,
    temp: &mut TempImages,
    max_width: f32,
) -> Vec<ImageBlock> {
    para.images
        .iter()
        .filter_map(|img| extract_image(img, media, temp, max_width))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_inch_is_72_points() {
        assert!((emu_to_pt(914_400) - 72.0).abs() < 1e-4);
    }

    #[test]
    fn jpeg_content_type_maps_to_jpg() {
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("image/png"), "png");
        assert_eq!(extension_for("image/svg+xml"), "svgxml");
        assert_eq!(extension_for(""), "bin");
    }

    #[test]
    fn missing_extent_uses_default_width() {
        let (w, h) = display_size(None, Some((200, 100)), 450.0);
        assert_eq!(w, DEFAULT_IMAGE_WIDTH);
        assert_eq!(h, 150.0);
        let (w, _) = display_size(None, None, 120.0);
        assert_eq!(w, 120.0);
    }

    #[test]
    fn oversized_images_shrink_to_content_width() {
        let (w, h) = fit_width(900.0, 600.0, 450.0);
        assert_eq!(w, 450.0);
        assert!((h - 300.0).abs() < 1e-4);
        assert!((w / h - 1.5).abs() < 1e-4);

        assert_eq!(fit_width(450.0, 100.0, 450.0), (450.0, 100.0));
        assert_eq!(fit_width(120.0, 80.0, 450.0), (120.0, 80.0));
        assert_eq!(fit_width(0.0, 50.0, 450.0), (0.0, 50.0));
    }

    #[test]
    fn declared_extent_is_scaled_to_fit() {
        // 10in x 5in declared on a 6.25in content width.
        let (w, h) = display_size(Some((914_400 * 10, 914_400 * 5)), Some((10, 10)), 450.0);
        assert!((w - 450.0).abs() < 1e-3);
        assert!((h - 225.0).abs() < 1e-3);
        let (w, h) = display_size(Some((914_400, 914_400 / 2)), None, 450.0);
        assert!((w - 72.0).abs() < 1e-3);
        assert!((h - 36.0).abs() < 1e-3);
    }

    #[test]
    fn temp_files_are_removed_on_drop() {
        let mut temp = TempImages::new();
        assert!(temp.is_empty());
        let path = temp.persist(b"abc", "png").unwrap();
        let second = temp.persist(b"def", "jpg").unwrap();
        assert_eq!(temp.len(), 2);
        assert_eq!(temp.paths().collect::<Vec<_>>(), vec![path.as_path(), second.as_path()]);
        assert!(path.exists());
        assert!(path.to_string_lossy().ends_with(".png"));
        drop(temp);
        assert!(!path.exists());
        assert!(!second.exists());
    }

    #[test]
    fn close_removes_files_immediately() {
        let mut temp = TempImages::new();
        let path = temp.persist(b"abc", "png").unwrap();
        temp.close();
        assert!(!path.exists());
    }
}
