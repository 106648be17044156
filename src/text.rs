//! Fonts and single-line text drawing.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use image::{Pixel, Rgba, RgbaImage};
use rusttype::{point, Font, Scale};
use usvg::fontdb;

use crate::scanner::Align;

pub const REGULAR_FONT_FILE: &str = "NotoSans-Regular.ttf";
pub const BOLD_FONT_FILE: &str = "NotoSans-Bold.ttf";

pub type SharedFont = Arc<Font<'static>>;

/// Regular/bold faces from the fonts directory, with a system sans-serif
/// face as the last resort.
pub struct FontBook {
    fonts_dir: PathBuf,
    regular: Option<SharedFont>,
    bold: Option<SharedFont>,
    fallback: OnceLock<Option<SharedFont>>,
}

impl FontBook {
    pub fn load(fonts_dir: impl Into<PathBuf>) -> Self {
        let fonts_dir = fonts_dir.into();
        let regular = load_font_file(&fonts_dir.join(REGULAR_FONT_FILE));
        let bold = load_font_file(&fonts_dir.join(BOLD_FONT_FILE));
        if regular.is_none() {
            tracing::debug!(
                dir = %fonts_dir.display(),
                "regular font missing, system fallback will be used"
            );
        }
        Self {
            fonts_dir,
            regular,
            bold,
            fallback: OnceLock::new(),
        }
    }

    pub fn fonts_dir(&self) -> &Path {
        &self.fonts_dir
    }

    /// Bold only when requested and present, then regular, then the system default.
    pub fn select(&self, bold: bool) -> Option<SharedFont> {
        if bold {
            if let Some(font) = &self.bold {
                return Some(Arc::clone(font));
            }
        }
        if let Some(font) = &self.regular {
            return Some(Arc::clone(font));
        }
        self.fallback.get_or_init(system_sans_serif).clone()
    }
}

fn load_font_file(path: &Path) -> Option<SharedFont> {
    let bytes = std::fs::read(path).ok()?;
    match Font::try_from_vec(bytes) {
        Some(font) => Some(Arc::new(font)),
        None => {
            tracing::warn!(path = %path.display(), "font file is not a usable TrueType face");
            None
        }
    }
}

fn system_sans_serif() -> Option<SharedFont> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    let query = fontdb::Query {
        families: &[fontdb::Family::SansSerif],
        ..Default::default()
    };
    let id = db.query(&query).or_else(|| db.faces().next().map(|f| f.id))?;
    let font = db.with_face_data(id, |data, index| {
        Font::try_from_vec_and_index(data.to_vec(), index)
    })??;
    Some(Arc::new(font))
}

/// Advance width of `text` at `px`.
pub fn measure_text(font: &Font<'static>, px: f32, text: &str) -> f32 {
    let scale = Scale::uniform(px);
    font.layout(text, scale, point(0.0, 0.0))
        .last()
        .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
        .unwrap_or(0.0)
}

/// Where a line goes: top edge at `y`, horizontal anchor from `x`, `width`
/// and `align`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextBox {
    pub x: f32,
    pub y: f32,
    pub width: Option<f32>,
    pub align: Align,
}

impl TextBox {
    /// Left edge of a line `line_w` wide. Without a width the box has zero
    /// width: center straddles `x`, right ends at `x`.
    pub fn line_left(&self, line_w: f32) -> f32 {
        let w = self.width.unwrap_or(0.0);
        match self.align {
            Align::Left => self.x,
            Align::Center => self.x + w / 2.0 - line_w / 2.0,
            Align::Right => self.x + w - line_w,
        }
    }

    pub fn line(&self, index: usize, step: f32) -> Self {
        Self {
            y: self.y + step * index as f32,
            ..*self
        }
    }
}

/// Draw one line of `text` at `px` into `target`.
pub fn draw_line(
    img: &mut RgbaImage,
    font: &Font<'static>,
    px: f32,
    color: Rgba<u8>,
    target: &TextBox,
    text: &str,
) {
    if text.is_empty() {
        return;
    }
    let left = target.line_left(measure_text(font, px, text));

    let scale = Scale::uniform(px);
    let ascent = font.v_metrics(scale).ascent;
    for glyph in font.layout(text, scale, point(left, target.y + ascent)) {
        let Some(bb) = glyph.pixel_bounding_box() else {
            continue;
        };
        glyph.draw(|gx, gy, coverage| {
            let cx = gx as i32 + bb.min.x;
            let cy = gy as i32 + bb.min.y;
            if cx < 0 || cy < 0 || cx as u32 >= img.width() || cy as u32 >= img.height() {
                return;
            }
            let alpha = (coverage * color.0[3] as f32).round() as u8;
            if alpha == 0 {
                return;
            }
            let src = Rgba([color.0[0], color.0[1], color.0[2], alpha]);
            img.get_pixel_mut(cx as u32, cy as u32).blend(&src);
        });
    }
}

/// Greedy word wrap by measured width.
pub fn wrap_words(
    font: &Font<'static>,
    px: f32,
    text: &str,
    max_width: f32,
    max_lines: usize,
) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if current.is_empty() || measure_text(font, px, &candidate) <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if max_lines > 0 && lines.len() > max_lines {
        lines.truncate(max_lines);
        if let Some(last) = lines.last_mut() {
            last.push('…');
        }
    }
    lines
}
