//! Raster Compositor
//!
//! Two strategies:
//! - geometry-driven: the template supplies a canvas size and slots; layers are
//!   composited in slot declaration order onto a transparent canvas.
//! - fallback: no geometry; a [`CardRenderer`] produces the finished canvas.
//!
//! Layering is best-effort by policy: an optional slot whose image cannot be
//! resolved or decoded is logged and skipped, and the render continues. Only
//! slots bound to a required field turn such a failure into `RenderFailure`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};

use crate::assets::AssetMounts;
use crate::error::{EngineError, EngineResult};
use crate::scanner::{Align, Fit, Slot, SlotKind};
use crate::templates::TemplateRecord;
use crate::text::{self, FontBook, TextBox};
use crate::validation::{parse_hex_color, RenderContext};

pub const DEFAULT_CANVAS: u32 = 1080;
pub const MAX_CANVAS: u32 = 8192;
pub const DEFAULT_FONT_SIZE: f32 = 36.0;
pub const DEFAULT_TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const DEFAULT_CTA: &str = "Αγόρασε τώρα";

/// Caller-supplied image references for image/logo slots.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayerSources<'a> {
    pub brand_logo_url: Option<&'a str>,
    /// Matched by slot `source` keys `extra1`, `extra2`, ...
    pub extra_images: &'a [String],
}

impl<'a> LayerSources<'a> {
    fn extra(&self, key: &str) -> Option<&'a str> {
        let index: usize = key.strip_prefix("extra")?.parse().ok()?;
        self.extra_images.get(index.checked_sub(1)?).map(String::as_str)
    }
}

/// Inputs to the fallback single-column card.
#[derive(Debug, Clone, PartialEq)]
pub struct PromoCard {
    pub title: String,
    pub price: String,
    pub cta: String,
    pub logo_path: Option<PathBuf>,
}

impl PromoCard {
    /// Card text from loose fields; missing values fall back to defaults.
    pub fn from_context(
        ctx: &RenderContext,
        product_id: Option<i64>,
        logo_path: Option<PathBuf>,
    ) -> Self {
        let pick = |key: &str| ctx.text(key).filter(|s| !s.trim().is_empty());
        let title = pick("title").unwrap_or_else(|| match product_id {
            Some(id) => format!("Προϊόν #{id}"),
            None => "Promo".to_string(),
        });
        Self {
            title,
            price: pick("price").unwrap_or_default(),
            cta: pick("cta").unwrap_or_else(|| DEFAULT_CTA.to_string()),
            logo_path,
        }
    }
}

/// External text-rendering collaborator for the fallback path. On success
/// the image file at `output` must exist.
pub trait CardRenderer: Send + Sync {
    fn render_card(&self, output: &Path, card: &PromoCard) -> EngineResult<()>;
}

/// Built-in single-column card: logo top-left, wrapped title, price, call to action.
pub struct SimpleCardRenderer {
    fonts: Arc<FontBook>,
    size: u32,
}

impl SimpleCardRenderer {
    pub fn new(fonts: Arc<FontBook>, size: u32) -> Self {
        Self { fonts, size }
    }
}

impl CardRenderer for SimpleCardRenderer {
    fn render_card(&self, output: &Path, card: &PromoCard) -> EngineResult<()> {
        let size = self.size.clamp(1, MAX_CANVAS);
        let mut canvas = RgbaImage::from_pixel(size, size, Rgba([20, 20, 20, 255]));

        if let Some(logo) = &card.logo_path {
            match image::open(logo) {
                Ok(img) => {
                    let piece = fit_into_box(&img, 200, 200, Fit::Contain);
                    imageops::overlay(&mut canvas, &piece, 40, 40);
                }
                Err(e) => {
                    tracing::warn!(path = %logo.display(), error = %e, "card logo skipped")
                }
            }
        }

        let margin = 80.0;
        let column_w = size as f32 - 2.0 * margin;
        let column = TextBox {
            x: margin,
            y: size as f32 * 0.35,
            width: Some(column_w),
            align: Align::Center,
        };
        let mut cursor = column;

        match self.fonts.select(true) {
            Some(font) => {
                let lines = text::wrap_words(&font, 72.0, &card.title, column_w, 3);
                for line in &lines {
                    text::draw_line(&mut canvas, &font, 72.0, DEFAULT_TEXT_COLOR, &cursor, line);
                    cursor = cursor.line(1, 86.0);
                }
            }
            None => tracing::warn!("no font available, card title not drawn"),
        }

        if let Some(font) = self.fonts.select(false) {
            if !card.price.is_empty() {
                cursor = cursor.line(1, 24.0);
                let green = Rgba([0x22, 0xc5, 0x5e, 255]);
                text::draw_line(&mut canvas, &font, 64.0, green, &cursor, &card.price);
            }
            let cta = TextBox {
                y: size as f32 - 160.0,
                ..column
            };
            text::draw_line(&mut canvas, &font, 44.0, DEFAULT_TEXT_COLOR, &cta, &card.cta);
        }

        canvas
            .save_with_format(output, image::ImageFormat::Png)
            .map_err(|e| {
                EngineError::RenderFailure(format!("write card {}: {e}", output.display()))
            })
    }
}

pub struct Compositor {
    mounts: AssetMounts,
    fonts: Arc<FontBook>,
    card_renderer: Box<dyn CardRenderer>,
}

impl Compositor {
    pub fn new(
        mounts: AssetMounts,
        fonts: Arc<FontBook>,
        card_renderer: Box<dyn CardRenderer>,
    ) -> Self {
        Self {
            mounts,
            fonts,
            card_renderer,
        }
    }

    /// Compositor with the built-in card renderer at `card_size` square.
    pub fn with_defaults(
        mounts: AssetMounts,
        fonts_dir: impl Into<PathBuf>,
        card_size: u32,
    ) -> Self {
        let fonts = Arc::new(FontBook::load(fonts_dir));
        let card = SimpleCardRenderer::new(Arc::clone(&fonts), card_size);
        Self::new(mounts, fonts, Box::new(card))
    }

    pub fn mounts(&self) -> &AssetMounts {
        &self.mounts
    }

    /// Geometry-driven render. Pure in (record, context, sources): equal inputs
    /// give bit-identical canvases.
    pub fn compose(
        &self,
        record: &TemplateRecord,
        ctx: &RenderContext,
        sources: &LayerSources<'_>,
    ) -> EngineResult<RgbaImage> {
        let canvas_spec = record.canvas().ok_or_else(|| {
            let id = &record.meta.id;
            EngineError::RenderFailure(format!("template '{id}' declares no canvas size"))
        })?;
        let (width, height) = (canvas_spec.width, canvas_spec.height);
        if width == 0 || height == 0 || width > MAX_CANVAS || height > MAX_CANVAS {
            return Err(EngineError::RenderFailure(format!(
                "canvas size {width}x{height} out of range (max {MAX_CANVAS})"
            )));
        }

        let mut canvas = RgbaImage::new(width, height);

        if let Some(bg) = canvas_spec.background.as_deref() {
            match self.open_reference(bg) {
                Ok(img) => {
                    let cover = fit_into_box(&img, width, height, Fit::Cover);
                    imageops::overlay(&mut canvas, &cover, 0, 0);
                }
                Err(e) => tracing::warn!(
                    template = %record.meta.id,
                    background = bg,
                    error = %e,
                    "background skipped"
                ),
            }
        }

        for slot in record.slots.iter() {
            match slot.kind {
                SlotKind::Image | SlotKind::Logo => {
                    let required = record
                        .meta
                        .fields
                        .get(&slot.field)
                        .is_some_and(|def| def.required);
                    if let Err(e) = self.paste_image_slot(&mut canvas, slot, ctx, sources) {
                        if required {
                            return Err(EngineError::RenderFailure(format!(
                                "required slot '{}': {e}",
                                slot.field
                            )));
                        }
                        tracing::warn!(
                            template = %record.meta.id,
                            slot = %slot.field,
                            error = %e,
                            "slot skipped"
                        );
                    }
                }
                SlotKind::Text => self.draw_text_slot(&mut canvas, slot, ctx),
            }
        }

        Ok(canvas)
    }

    /// Fallback render: the card renderer writes `scratch`, which becomes the canvas.
    pub fn compose_fallback(&self, card: &PromoCard, scratch: &Path) -> EngineResult<RgbaImage> {
        self.card_renderer.render_card(scratch, card)?;
        let canvas = image::open(scratch)
            .map_err(|e| EngineError::RenderFailure(format!("card output unreadable: {e}")))?
            .to_rgba8();
        if let Err(e) = std::fs::remove_file(scratch) {
            tracing::debug!(path = %scratch.display(), error = %e, "scratch file not removed");
        }
        Ok(canvas)
    }

    fn paste_image_slot(
        &self,
        canvas: &mut RgbaImage,
        slot: &Slot,
        ctx: &RenderContext,
        sources: &LayerSources<'_>,
    ) -> EngineResult<()> {
        let reference = match slot.kind {
            SlotKind::Logo => sources.brand_logo_url.map(str::to_string),
            _ => slot
                .source
                .as_deref()
                .and_then(|key| sources.extra(key))
                .map(str::to_string),
        }
        .or_else(|| ctx.text(&slot.field))
        .filter(|s| !s.trim().is_empty());

        let Some(reference) = reference else {
            tracing::debug!(slot = %slot.field, "no image supplied, slot left empty");
            return Ok(());
        };

        let img = self.open_reference(&reference)?;
        let w = slot.w.map(|v| v.round().max(1.0) as u32).unwrap_or(img.width());
        let h = slot.h.map(|v| v.round().max(1.0) as u32).unwrap_or(img.height());
        let piece = fit_into_box(&img, w, h, slot.fit.unwrap_or_default());
        imageops::overlay(canvas, &piece, slot.x.round() as i64, slot.y.round() as i64);
        Ok(())
    }

    fn draw_text_slot(&self, canvas: &mut RgbaImage, slot: &Slot, ctx: &RenderContext) {
        let value = ctx.text(&slot.field).unwrap_or_default();
        if value.is_empty() {
            return;
        }
        let Some(font) = self.fonts.select(slot.bold) else {
            tracing::warn!(slot = %slot.field, "no font available, text slot skipped");
            return;
        };
        let color = slot
            .color
            .as_deref()
            .and_then(parse_hex_color)
            .map(Rgba)
            .unwrap_or(DEFAULT_TEXT_COLOR);
        let px = slot.font_size.filter(|s| *s > 0.0).unwrap_or(DEFAULT_FONT_SIZE);
        let target = TextBox {
            x: slot.x,
            y: slot.y,
            width: slot.w.or(slot.width_px),
            align: slot.align.unwrap_or_default(),
        };

        let lines = match (target.width, slot.max_lines) {
            (Some(w), Some(max)) if max > 1 => {
                text::wrap_words(&font, px, &value, w, max as usize)
            }
            _ => vec![value],
        };
        let step = slot.line_height.filter(|h| *h > 0.0).unwrap_or(px * 1.2);
        for (i, line) in lines.iter().enumerate() {
            text::draw_line(canvas, &font, px, color, &target.line(i, step), line);
        }
    }

    fn open_reference(&self, reference: &str) -> EngineResult<DynamicImage> {
        let lowered = reference.trim().to_ascii_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            return Err(EngineError::RenderFailure(format!(
                "remote URLs are not supported for raster slots: {reference}"
            )));
        }
        let path = self.mounts.resolve(reference).ok_or_else(|| {
            EngineError::RenderFailure(format!(
                "reference outside recognized asset roots: {reference}"
            ))
        })?;
        Ok(image::open(&path)?)
    }
}

/// Scale `img` into a `w`x`h` box. Contain keeps the whole image, centered
/// with transparent padding; cover fills the box and crops the center.
pub fn fit_into_box(img: &DynamicImage, w: u32, h: u32, fit: Fit) -> RgbaImage {
    let (w, h) = (w.max(1), h.max(1));
    match fit {
        Fit::Cover => img.resize_to_fill(w, h, FilterType::Lanczos3).to_rgba8(),
        Fit::Contain => {
            let resized = img.resize(w, h, FilterType::Lanczos3).to_rgba8();
            let mut target = RgbaImage::new(w, h);
            let dx = (w.saturating_sub(resized.width()) / 2) as i64;
            let dy = (h.saturating_sub(resized.height()) / 2) as i64;
            imageops::overlay(&mut target, &resized, dx, dy);
            target
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([200, 10, 10, 255])))
    }

    #[test]
    fn contain_pads_with_transparency() {
        let out = fit_into_box(&solid(400, 200), 200, 200, Fit::Contain);
        assert_eq!(out.dimensions(), (200, 200));
        assert_eq!(out.get_pixel(100, 10).0[3], 0);
        assert_eq!(out.get_pixel(100, 100).0[3], 255);
    }

    #[test]
    fn cover_fills_the_box() {
        let out = fit_into_box(&solid(400, 200), 200, 200, Fit::Cover);
        assert_eq!(out.dimensions(), (200, 200));
        assert!(out.pixels().all(|p| p.0[3] == 255));
    }

    #[test]
    fn extra_sources_are_one_based() {
        let extras = vec!["/static/a.png".to_string(), "/static/b.png".to_string()];
        let sources = LayerSources { brand_logo_url: None, extra_images: &extras };
        assert_eq!(sources.extra("extra1"), Some("/static/a.png"));
        assert_eq!(sources.extra("extra2"), Some("/static/b.png"));
        assert_eq!(sources.extra("extra0"), None);
        assert_eq!(sources.extra("extra3"), None);
        assert_eq!(sources.extra("hero"), None);
    }

    #[test]
    fn card_defaults() {
        let card = PromoCard::from_context(&RenderContext::new(), Some(7), None);
        assert_eq!(card.title, "Προϊόν #7");
        assert_eq!(card.cta, DEFAULT_CTA);
        assert!(card.price.is_empty());

        let card = PromoCard::from_context(&RenderContext::new(), None, None);
        assert_eq!(card.title, "Promo");
    }
}
