//! SVG → PNG export for markup previews and committed posts.

use std::path::{Path, PathBuf};

use image::RgbaImage;

use crate::compositor::MAX_CANVAS;
use crate::error::{EngineError, EngineResult};

pub fn rasterize_svg(svg: &str) -> EngineResult<RgbaImage> {
    let mut opts = usvg::Options::default();
    opts.fontdb_mut().load_system_fonts();
    let tree = usvg::Tree::from_str(svg, &opts)
        .map_err(|e| EngineError::RenderFailure(format!("parse svg: {e}")))?;

    let size = tree.size().to_int_size();
    let (width, height) = (size.width(), size.height());
    if width > MAX_CANVAS || height > MAX_CANVAS {
        return Err(EngineError::RenderFailure(format!(
            "svg raster size too large: {width}x{height} (max {MAX_CANVAS}x{MAX_CANVAS})"
        )));
    }

    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| EngineError::RenderFailure("failed to allocate svg pixmap".into()))?;
    resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap.as_mut());

    let mut rgba = pixmap.take();
    demultiply_rgba8_in_place(&mut rgba);
    RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| EngineError::RenderFailure("pixmap size mismatch".into()))
}

/// Rasterize the SVG file at `svg_path` to a PNG alongside it.
pub fn export_png(svg_path: &Path) -> EngineResult<PathBuf> {
    let svg = std::fs::read_to_string(svg_path)?;
    let img = rasterize_svg(&svg)?;
    let png_path = svg_path.with_extension("png");
    img.save_with_format(&png_path, image::ImageFormat::Png)
        .map_err(|e| EngineError::Storage(format!("write {}: {e}", png_path.display())))?;
    Ok(png_path)
}

fn demultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 || a == 255 {
            continue;
        }
        px[0] = ((px[0] as u16 * 255 + a / 2) / a).min(255) as u8;
        px[1] = ((px[1] as u16 * 255 + a / 2) / a).min(255) as u8;
        px[2] = ((px[2] as u16 * 255 + a / 2) / a).min(255) as u8;
    }
}
