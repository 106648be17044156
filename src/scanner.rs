//! Annotation Scanner - slot geometry from template markup
//!
//! Walks the parsed markup tree and turns every `rect`/`text`/`image`/`g`
//! element carrying `data-slot="kind:field"` into a [`Slot`].

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

const SLOT_TAGS: [&str; 4] = ["rect", "text", "image", "g"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    Image,
    Text,
    Logo,
}

impl SlotKind {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Some(Self::Image),
            "text" => Some(Self::Text),
            "logo" => Some(Self::Logo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Fit {
    Cover,
    #[default]
    Contain,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

impl Align {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "start" => Some(Self::Left),
            "center" | "middle" => Some(Self::Center),
            "right" | "end" => Some(Self::Right),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Slot {
    pub kind: SlotKind,
    pub field: String,
    pub x: f32,
    pub y: f32,
    pub w: Option<f32>,
    pub h: Option<f32>,
    pub fit: Option<Fit>,
    pub align: Option<Align>,
    pub width_px: Option<f32>,
    pub max_lines: Option<u32>,
    pub line_height: Option<f32>,
    /// Extra-image key (`extra1`, `extra2`, ...) for image slots
    pub source: Option<String>,
    pub font_size: Option<f32>,
    pub color: Option<String>,
    #[serde(default)]
    pub bold: bool,
    pub tag: String,
}

/// Slots keyed by field name, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotMap {
    slots: Vec<Slot>,
}

impl SlotMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last wins: a later slot for the same field replaces the earlier one and
    /// takes the later declaration position.
    pub fn insert(&mut self, slot: Slot) {
        self.slots.retain(|s| s.field != slot.field);
        self.slots.push(slot);
    }

    pub fn get(&self, field: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.field == field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Serialize for SlotMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.slots.len()))?;
        for slot in &self.slots {
            map.serialize_entry(&slot.field, slot)?;
        }
        map.end()
    }
}

/// Result of scanning one markup body.
#[derive(Debug, Clone, Default)]
pub struct ScannedMarkup {
    /// Root `<svg>` size, from `width`/`height` or `viewBox`
    pub canvas: Option<(u32, u32)>,
    pub slots: SlotMap,
}

/// Scan a template body. Template tags are blanked out first, so an
/// attribute written as an expression reads as absent.
pub fn scan_markup(text: &str) -> Result<ScannedMarkup, roxmltree::Error> {
    let masked = mask_template_syntax(text);
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let doc = roxmltree::Document::parse_with_options(&masked, options)?;

    let root = doc.root_element();
    let canvas = if root.tag_name().name().eq_ignore_ascii_case("svg") {
        root_canvas(&root)
    } else {
        None
    };

    let mut slots = SlotMap::new();
    for node in doc.descendants().filter(|n| n.is_element()) {
        let tag = node.tag_name().name().to_ascii_lowercase();
        if !SLOT_TAGS.contains(&tag.as_str()) {
            continue;
        }
        let Some(annotation) = node.attribute("data-slot") else {
            continue;
        };
        let Some((kind, field)) = annotation.split_once(':') else {
            continue;
        };
        let Some(kind) = SlotKind::parse(kind) else {
            continue;
        };
        let field = field.trim();
        if field.is_empty() {
            continue;
        }

        let num = |name: &str| node.attribute(name).and_then(parse_number);
        let bold = node.attribute("data-bold").map(is_truthy).unwrap_or(false)
            || matches!(node.attribute("font-weight"), Some("bold" | "700" | "800" | "900"));

        slots.insert(Slot {
            kind,
            field: field.to_string(),
            x: num("x").unwrap_or(0.0),
            y: num("y").unwrap_or(0.0),
            w: num("width"),
            h: num("height"),
            fit: node.attribute("data-fit").and_then(|v| match v.trim() {
                "cover" => Some(Fit::Cover),
                "contain" => Some(Fit::Contain),
                _ => None,
            }),
            align: node.attribute("data-align").and_then(Align::parse),
            width_px: num("data-width"),
            max_lines: node
                .attribute("data-max-lines")
                .and_then(|v| v.trim().parse::<u32>().ok()),
            line_height: num("data-line-height"),
            source: node.attribute("data-source").map(|s| s.trim().to_string()),
            font_size: num("data-font-size"),
            color: node
                .attribute("data-color")
                .or_else(|| node.attribute("fill"))
                .map(|s| s.trim().to_string()),
            bold,
            tag,
        });
    }

    Ok(ScannedMarkup { canvas, slots })
}

/// Replace `{{ … }}`, `{% … %}` and `{# … #}` spans with spaces, keeping
/// newlines. An unterminated span is blanked to the end of the text.
fn mask_template_syntax(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('{') {
        let close = match rest[start..].chars().nth(1) {
            Some('{') => "}}",
            Some('%') => "%}",
            Some('#') => "#}",
            _ => {
                out.push_str(&rest[..=start]);
                rest = &rest[start + 1..];
                continue;
            }
        };
        out.push_str(&rest[..start]);
        let end = rest[start + 2..]
            .find(close)
            .map(|i| start + 2 + i + close.len())
            .unwrap_or(rest.len());
        out.extend(
            rest[start..end]
                .chars()
                .map(|c| if c == '\n' { '\n' } else { ' ' }),
        );
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

fn root_canvas(root: &roxmltree::Node) -> Option<(u32, u32)> {
    let w = root.attribute("width").and_then(parse_number);
    let h = root.attribute("height").and_then(parse_number);
    if let (Some(w), Some(h)) = (w, h) {
        return to_size(w, h);
    }
    let view_box: Vec<f32> = root
        .attribute("viewBox")?
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    match view_box.as_slice() {
        [_, _, w, h] => to_size(*w, *h),
        _ => None,
    }
}

fn to_size(w: f32, h: f32) -> Option<(u32, u32)> {
    if w >= 1.0 && h >= 1.0 {
        Some((w.round() as u32, h.round() as u32))
    } else {
        None
    }
}

/// Permissive number parse: `"40"`, `"40.5"`, `"40px"`. Anything else is absent.
fn parse_number(raw: &str) -> Option<f32> {
    let s = raw.trim();
    let s = s.strip_suffix("px").unwrap_or(s).trim();
    s.parse::<f32>().ok().filter(|v| v.is_finite())
}

fn is_truthy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "bold")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKUP: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="1080" height="1350">
  <rect data-slot="image:hero" x="0" y="0" width="1080" height="800" data-fit="cover"/>
  <image data-slot="logo:brand_logo" x="40" y="40" width="200" height="200" data-fit="contain"/>
  <text data-slot="text:title" x="540" y="900" data-align="middle" data-max-lines="2"
        font-weight="bold">{{ title }}</text>
  <text data-slot="text:price" x="{{ px }}" y="1000" data-font-size="big">{{ price }}</text>
  <rect data-slot="shape:decor" x="1" y="1"/>
  <circle data-slot="text:ignored" cx="1"/>
</svg>"##;

    #[test]
    fn scans_recognized_slots() {
        let scanned = scan_markup(MARKUP).unwrap();
        assert_eq!(scanned.canvas, Some((1080, 1350)));
        assert_eq!(scanned.slots.len(), 4);

        let hero = scanned.slots.get("hero").unwrap();
        assert_eq!(hero.kind, SlotKind::Image);
        assert_eq!(hero.fit, Some(Fit::Cover));
        assert_eq!(hero.w, Some(1080.0));

        let title = scanned.slots.get("title").unwrap();
        assert_eq!(title.align, Some(Align::Center));
        assert_eq!(title.max_lines, Some(2));
        assert!(title.bold);
        assert!(scanned.slots.get("decor").is_none());
        assert!(scanned.slots.get("ignored").is_none());
    }

    #[test]
    fn unparsable_numbers_are_absent() {
        let scanned = scan_markup(MARKUP).unwrap();
        let price = scanned.slots.get("price").unwrap();
        assert_eq!(price.x, 0.0);
        assert_eq!(price.y, 1000.0);
        assert_eq!(price.font_size, None);
    }

    #[test]
    fn duplicate_field_last_wins() {
        let markup = r#"<svg width="100" height="100">
  <text data-slot="text:title" x="1" y="1"/>
  <text data-slot="text:subtitle" x="5" y="5"/>
  <rect data-slot="text:title" x="9" y="9"/>
</svg>"#;
        let scanned = scan_markup(markup).unwrap();
        assert_eq!(scanned.slots.len(), 2);
        let title = scanned.slots.get("title").unwrap();
        assert_eq!(title.x, 9.0);
        assert_eq!(title.tag, "rect");
        let order: Vec<_> = scanned.slots.iter().map(|s| s.field.as_str()).collect();
        assert_eq!(order, vec!["subtitle", "title"]);
    }

    #[test]
    fn canvas_from_view_box() {
        let scanned = scan_markup(r#"<svg viewBox="0 0 1080 1080"></svg>"#).unwrap();
        assert_eq!(scanned.canvas, Some((1080, 1080)));
    }

    #[test]
    fn template_tags_do_not_break_the_scan() {
        let markup = r#"<svg width="100" height="100">
  {# header #}
  <text data-slot="text:title" x="{{ px }}" y="10">{% if title|length < 20 %}{{ title }}{% endif %}</text>
  <image data-slot="image:hero" x="0" y="20" width="100" height="{{ h }}"/>
  {% for i in items %}<rect x="{{ i }}"/>{% endfor %}
</svg>"#;
        let scanned = scan_markup(markup).unwrap();
        assert_eq!(scanned.canvas, Some((100, 100)));
        assert_eq!(scanned.slots.len(), 2);

        let title = scanned.slots.get("title").unwrap();
        assert_eq!(title.x, 0.0);
        assert_eq!(title.y, 10.0);
        let hero = scanned.slots.get("hero").unwrap();
        assert_eq!(hero.w, Some(100.0));
        assert_eq!(hero.h, None);
    }

    #[test]
    fn masking_keeps_plain_braces_and_lines() {
        let masked = mask_template_syntax("a{b}\n{{ x <\n y }}c{% open");
        assert_eq!(masked, "a{b}\n      \n     c       ");
    }

    #[test]
    fn malformed_markup_is_an_error() {
        assert!(scan_markup("<svg><rect></svg>").is_err());
    }
}
