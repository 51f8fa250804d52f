use std::sync::Arc;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use thiserror::Error;

use crate::blob::{BlobError, BlobStore};
use crate::models::{Event, Ticket};
use crate::ticketing::pass_id::decode_pass_id;

/// Single fixed template used for every ticket type. The catalog carries a
/// per-type template field, but it is not read here.
pub const TEMPLATE_PATH: &str = "ticket-type-pdf-templates/default-template.pdf";

const OVERLAY_FONT: &str = "TF9";
const LEFT_MARGIN: f32 = 72.0;
const HEADING_SIZE: f32 = 13.0;
const BODY_SIZE: f32 = 11.0;
const LINE_SPACING: f32 = 16.0;

// Vertical offsets measured from the top of the page.
const TYPE_LINE_OFFSET: f32 = 180.0;
const ATTENDEE_OFFSET: f32 = 214.0;
const POLICY_OFFSET: f32 = 286.0;
const PASS_ID_OFFSET: f32 = 386.0;

/// Policy text layout: greedy wrap width and the hard cap on drawn lines.
pub const POLICY_WRAP_CHARS: usize = 80;
pub const POLICY_MAX_LINES: usize = 5;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("failed to fetch ticket template: {0}")]
    Template(#[from] BlobError),

    #[error("malformed ticket template: {0}")]
    Malformed(#[from] lopdf::Error),

    #[error("failed to serialize ticket pdf: {0}")]
    Io(#[from] std::io::Error),

    #[error("ticket template has no pages")]
    EmptyTemplate,
}

/// Greedy line-fill: words accumulate onto a line until appending the next
/// one would exceed `max_chars`. A single word longer than `max_chars`
/// gets a line of its own.
pub fn word_wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if line.is_empty() {
            line.push_str(word);
        } else if line.len() + 1 + word.len() > max_chars {
            lines.push(std::mem::take(&mut line));
            line.push_str(word);
        } else {
            line.push(' ');
            line.push_str(word);
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// Renders a ticket by overlaying attendee and pass details onto the
/// fixed template fetched from object storage.
pub struct TicketPdfRenderer {
    blob: Arc<dyn BlobStore>,
}

impl TicketPdfRenderer {
    pub fn new(blob: Arc<dyn BlobStore>) -> Self {
        Self { blob }
    }

    pub async fn render(
        &self,
        ticket: &Ticket,
        event: &Event,
        ticket_type_name: &str,
        category_name: &str,
    ) -> Result<Vec<u8>, PdfError> {
        let template = self.blob.download(TEMPLATE_PATH).await?;
        render_on_template(&template, ticket, event, ticket_type_name, category_name)
    }
}

/// Pure overlay step, split out so it can be tested without a blob store.
pub fn render_on_template(
    template: &[u8],
    ticket: &Ticket,
    event: &Event,
    ticket_type_name: &str,
    category_name: &str,
) -> Result<Vec<u8>, PdfError> {
    let mut doc = Document::load_mem(template)?;
    let page_id = *doc
        .get_pages()
        .get(&1)
        .ok_or(PdfError::EmptyTemplate)?;
    let page_height = page_height(&doc, page_id);

    register_overlay_font(&mut doc, page_id)?;

    let mut ops: Vec<Operation> = Vec::new();
    let draw = |ops: &mut Vec<Operation>, y_offset: f32, size: f32, text: &str| {
        text_ops(ops, LEFT_MARGIN, page_height - y_offset, size, text);
    };

    draw(
        &mut ops,
        TYPE_LINE_OFFSET,
        HEADING_SIZE,
        &format!("{} - {}", category_name, ticket_type_name),
    );

    draw(&mut ops, ATTENDEE_OFFSET, BODY_SIZE, &ticket.attendee_name);
    draw(
        &mut ops,
        ATTENDEE_OFFSET + LINE_SPACING,
        BODY_SIZE,
        &ticket.attendee_email,
    );
    draw(
        &mut ops,
        ATTENDEE_OFFSET + 2.0 * LINE_SPACING,
        BODY_SIZE,
        &ticket.attendee_phone,
    );

    for (i, line) in word_wrap(&event.policy_text, POLICY_WRAP_CHARS)
        .iter()
        .take(POLICY_MAX_LINES)
        .enumerate()
    {
        draw(
            &mut ops,
            POLICY_OFFSET + i as f32 * LINE_SPACING,
            BODY_SIZE,
            line,
        );
    }

    draw(
        &mut ops,
        PASS_ID_OFFSET,
        HEADING_SIZE,
        &format!("Pass ID: {}", decode_pass_id(&ticket.pass_id)),
    );

    let content = Content { operations: ops };
    let overlay_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
    append_page_content(&mut doc, page_id, overlay_id)?;

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}

fn text_ops(ops: &mut Vec<Operation>, x: f32, y: f32, size: f32, text: &str) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new(
        "Tf",
        vec![Object::Name(OVERLAY_FONT.into()), Object::Real(size)],
    ));
    ops.push(Operation::new("Td", vec![Object::Real(x), Object::Real(y)]));
    ops.push(Operation::new("Tj", vec![Object::string_literal(text)]));
    ops.push(Operation::new("ET", vec![]));
}

fn numeric(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Walks the page's MediaBox, following Parent links for inherited boxes.
/// Falls back to A4 height when the template omits it.
fn page_height(doc: &Document, page_id: ObjectId) -> f32 {
    let mut current = page_id;
    for _ in 0..8 {
        let Ok(dict) = doc.get_object(current).and_then(Object::as_dict) else {
            break;
        };
        if let Ok(media_box) = dict.get(b"MediaBox") {
            let resolved = match media_box {
                Object::Reference(id) => doc.get_object(*id).ok(),
                other => Some(other),
            };
            if let Some(Object::Array(values)) = resolved {
                if let Some(height) = values.get(3).and_then(numeric) {
                    return height;
                }
            }
        }
        match dict.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => current = parent,
            Err(_) => break,
        }
    }
    842.0
}

/// Adds a Helvetica font object and registers it in the page's Resources
/// under [`OVERLAY_FONT`], handling direct, indirect and missing
/// Resources/Font dictionaries.
fn register_overlay_font(doc: &mut Document, page_id: ObjectId) -> Result<(), lopdf::Error> {
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    enum ResourcesSlot {
        OnPage,
        Missing,
        Indirect(ObjectId),
    }

    let (resources_slot, font_ref) = {
        let page = doc.get_object(page_id)?.as_dict()?;
        match page.get(b"Resources") {
            Ok(Object::Reference(id)) => {
                let font_ref = doc
                    .get_object(*id)
                    .and_then(Object::as_dict)
                    .ok()
                    .and_then(|res| match res.get(b"Font") {
                        Ok(Object::Reference(fid)) => Some(*fid),
                        _ => None,
                    });
                (ResourcesSlot::Indirect(*id), font_ref)
            }
            Ok(Object::Dictionary(res)) => {
                let font_ref = match res.get(b"Font") {
                    Ok(Object::Reference(fid)) => Some(*fid),
                    _ => None,
                };
                (ResourcesSlot::OnPage, font_ref)
            }
            _ => (ResourcesSlot::Missing, None),
        }
    };

    if let Some(fonts_id) = font_ref {
        let fonts = doc.get_object_mut(fonts_id)?;
        match fonts.as_dict_mut() {
            Ok(dict) => dict.set(OVERLAY_FONT, font_id),
            Err(_) => {
                *fonts = Object::Dictionary(dictionary! { OVERLAY_FONT => font_id });
            }
        }
        return Ok(());
    }

    match resources_slot {
        ResourcesSlot::Indirect(id) => {
            let resources = doc.get_object_mut(id)?.as_dict_mut()?;
            insert_overlay_font(resources, font_id);
        }
        ResourcesSlot::OnPage => {
            let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
            let resources = page.get_mut(b"Resources")?.as_dict_mut()?;
            insert_overlay_font(resources, font_id);
        }
        ResourcesSlot::Missing => {
            let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
            page.set(
                "Resources",
                dictionary! { "Font" => dictionary! { OVERLAY_FONT => font_id } },
            );
        }
    }
    Ok(())
}

fn insert_overlay_font(resources: &mut Dictionary, font_id: ObjectId) {
    match resources.get_mut(b"Font") {
        Ok(Object::Dictionary(fonts)) => fonts.set(OVERLAY_FONT, font_id),
        _ => resources.set("Font", dictionary! { OVERLAY_FONT => font_id }),
    }
}

fn append_page_content(
    doc: &mut Document,
    page_id: ObjectId,
    overlay_id: ObjectId,
) -> Result<(), lopdf::Error> {
    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    let existing = page.get(b"Contents").ok().cloned();
    match existing {
        Some(Object::Array(mut streams)) => {
            streams.push(Object::Reference(overlay_id));
            page.set("Contents", streams);
        }
        Some(single @ Object::Reference(_)) => {
            page.set("Contents", vec![single, Object::Reference(overlay_id)]);
        }
        _ => {
            page.set("Contents", Object::Reference(overlay_id));
        }
    }
    Ok(())
}

/// Minimal one-page template for tests.
#[cfg(test)]
pub(crate) fn blank_template() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(595),
            Object::Integer(842),
        ],
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![Object::Reference(page_id)],
        "Count" => 1,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("blank template serializes");
    bytes
}
