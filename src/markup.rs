//! Markup Renderer - fills the template body with a sanitized context
//!
//! Autoescaping is always on: field values are caller-controlled.

use std::error::Error as _;

use tera::{Context, Tera};

use crate::error::{EngineError, EngineResult};
use crate::templates::{TemplateRecord, MARKUP_FILE};
use crate::validation::RenderContext;

pub fn render_markup(record: &TemplateRecord, context: &RenderContext) -> EngineResult<String> {
    let mut tera = Tera::default();
    tera.autoescape_on(vec![".svg", ".svg.j2"]);
    tera.add_raw_template(MARKUP_FILE, &record.markup)
        .map_err(render_error)?;

    let mut ctx = Context::new();
    // Declared and slotted fields without a value render as "".
    for name in record.meta.fields.keys() {
        ctx.insert(name.as_str(), "");
    }
    for slot in record.slots.iter() {
        ctx.insert(slot.field.as_str(), "");
    }
    for (key, value) in context.iter() {
        if value.is_null() {
            continue;
        }
        ctx.insert(key.as_str(), value);
    }
    ctx.insert("meta", &record.meta);

    tera.render(MARKUP_FILE, &ctx).map_err(render_error)
}

fn render_error(err: tera::Error) -> EngineError {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    EngineError::RenderFailure(message)
}
