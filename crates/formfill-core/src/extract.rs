//! Field extraction
//!
//! Walks every page's `/Annots` array and emits one [`RawWidget`] per
//! annotation that carries both a field name and a rectangle. Names and
//! field types are inherited through the `/Parent` chain, so kid widgets of
//! a radio group report their parent's qualified name.

use crate::error::{ErrorKind, FormFillError};
use crate::text::decode_text_string;
use crate::widget::{BoundingBox, RawWidget, WidgetKind};
use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::Serialize;
use tracing::{debug, warn};

/// Guards against `/Parent` cycles in damaged files
const MAX_PARENT_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    /// Fail with `MalformedDocument` when the document has no AcroForm at all
    pub require_form: bool,
}

/// A recovered problem found during extraction
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExtractWarning {
    pub field_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Widgets in page-then-annotation order
    pub widgets: Vec<RawWidget>,
    pub warnings: Vec<ExtractWarning>,
    /// Whether the catalog carries an `/AcroForm` dictionary
    pub has_form: bool,
    pub page_count: u32,
}

/// A widget and the objects backing it
#[derive(Debug, Clone)]
pub(crate) struct LocatedWidget {
    pub widget: RawWidget,
    /// The annotation object (`/AS` lives here)
    pub annot_id: Option<ObjectId>,
    /// The nearest object in the `/Parent` chain carrying `/T` (`/V` lives here)
    pub field_id: Option<ObjectId>,
}

/// Parse document bytes
pub fn load_document(bytes: &[u8]) -> Result<Document, FormFillError> {
    Document::load_mem(bytes).map_err(|e| FormFillError::MalformedDocument(e.to_string()))
}

/// Extract raw widgets from document bytes
pub fn extract_fields(bytes: &[u8], options: ExtractOptions) -> Result<Extraction, FormFillError> {
    let doc = load_document(bytes)?;
    extract_from_document(&doc, options)
}

pub fn extract_from_document(
    doc: &Document,
    options: ExtractOptions,
) -> Result<Extraction, FormFillError> {
    let has_form = acroform(doc).is_some();
    if !has_form && options.require_form {
        return Err(FormFillError::MalformedDocument(
            "document has no interactive form (missing /AcroForm)".into(),
        ));
    }

    let (located, warnings) = locate_widgets(doc);
    debug!(
        widgets = located.len(),
        warnings = warnings.len(),
        has_form,
        "extracted form widgets"
    );

    Ok(Extraction {
        widgets: located.into_iter().map(|l| l.widget).collect(),
        warnings,
        has_form,
        page_count: doc.get_pages().len() as u32,
    })
}

/// Locate every named widget annotation, keeping object ids for write-back
pub(crate) fn locate_widgets(doc: &Document) -> (Vec<LocatedWidget>, Vec<ExtractWarning>) {
    let mut located = Vec::new();
    let mut warnings = Vec::new();

    for (page_num, page_id) in doc.get_pages() {
        let page = match doc.get_dictionary(page_id) {
            Ok(page) => page,
            Err(e) => {
                warn!(page = page_num, "page object unreadable: {}", e);
                continue;
            }
        };

        let annots = match page
            .get(b"Annots")
            .ok()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_array().ok())
        {
            Some(annots) => annots,
            None => continue,
        };

        for annot_obj in annots {
            let annot_id = annot_obj.as_reference().ok();
            let annot = match resolve(doc, annot_obj).and_then(|obj| obj.as_dict().ok()) {
                Some(annot) => annot,
                None => continue,
            };
            // Markup annotations reuse `/T` for their author
            if !is_widget(annot) {
                continue;
            }

            let (raw_id, field_id) = match qualified_name(doc, annot, annot_id) {
                Some(name) => name,
                None => continue,
            };
            let bbox = match read_rect(doc, annot) {
                Some(bbox) => bbox,
                None => {
                    debug!(field_id = %raw_id, "skipping widget without /Rect");
                    continue;
                }
            };

            let declared = inherited(doc, annot, b"FT").and_then(|obj| match obj {
                Object::Name(name) => Some(name.as_slice()),
                _ => None,
            });

            let (kind, unsupported_type) = match declared.and_then(WidgetKind::from_pdf_name) {
                Some(kind) => (kind, None),
                None => {
                    let declared = declared
                        .map(|n| String::from_utf8_lossy(n).into_owned())
                        .unwrap_or_else(|| "none".to_string());
                    warn!(
                        field_id = %raw_id,
                        field_type = %declared,
                        "unsupported field type, keeping as inert text"
                    );
                    warnings.push(ExtractWarning {
                        field_id: raw_id.clone(),
                        kind: ErrorKind::UnsupportedFieldType,
                        message: FormFillError::UnsupportedFieldType {
                            field_id: raw_id.clone(),
                            field_type: declared.clone(),
                        }
                        .to_string(),
                    });
                    (WidgetKind::Text, Some(declared))
                }
            };

            let mut widget = RawWidget::new(raw_id, page_num, bbox, kind);
            if kind == WidgetKind::Button {
                widget = widget.with_states(appearance_states(doc, annot));
            }
            widget.tooltip = inherited(doc, annot, b"TU").and_then(|obj| match obj {
                Object::String(bytes, _) => decode_text_string(bytes),
                _ => None,
            });
            widget.unsupported_type = unsupported_type;

            located.push(LocatedWidget {
                widget,
                annot_id,
                field_id,
            });
        }
    }

    (located, warnings)
}

/// Widget annotations, or merged field dictionaries that omit `/Subtype`
/// but declare a field type
fn is_widget(annot: &Dictionary) -> bool {
    match annot.get(b"Subtype") {
        Ok(Object::Name(name)) => name.as_slice() == b"Widget",
        Ok(_) => false,
        Err(_) => annot.has(b"FT"),
    }
}

/// The document's AcroForm dictionary, if any
pub(crate) fn acroform(doc: &Document) -> Option<&Dictionary> {
    let root = doc.trailer.get(b"Root").ok()?;
    let catalog = resolve(doc, root)?.as_dict().ok()?;
    resolve(doc, catalog.get(b"AcroForm").ok()?)?.as_dict().ok()
}

/// Follow a single indirect reference
fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn parent<'a>(doc: &'a Document, dict: &'a Dictionary) -> Option<(ObjectId, &'a Dictionary)> {
    let id = dict.get(b"Parent").ok()?.as_reference().ok()?;
    let parent = doc.get_dictionary(id).ok()?;
    Some((id, parent))
}

/// Join the `/T` partial names up the parent chain with `.`, returning the
/// qualified name and the id of the object holding the nearest `/T`.
fn qualified_name(
    doc: &Document,
    annot: &Dictionary,
    annot_id: Option<ObjectId>,
) -> Option<(String, Option<ObjectId>)> {
    let mut partials = Vec::new();
    let mut field_id = None;
    let mut current = (annot_id, annot);

    for _ in 0..MAX_PARENT_DEPTH {
        let (id, dict) = current;
        if let Ok(Object::String(bytes, _)) = dict.get(b"T") {
            if let Some(partial) = decode_text_string(bytes).filter(|p| !p.is_empty()) {
                if partials.is_empty() {
                    field_id = id;
                }
                partials.push(partial);
            }
        }
        match parent(doc, dict) {
            Some((parent_id, parent_dict)) => current = (Some(parent_id), parent_dict),
            None => break,
        }
    }

    if partials.is_empty() {
        return None;
    }
    partials.reverse();
    Some((partials.join("."), field_id))
}

/// Look `key` up on the annotation, then on each ancestor
fn inherited<'a>(doc: &'a Document, annot: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut dict = annot;
    for _ in 0..MAX_PARENT_DEPTH {
        if let Ok(obj) = dict.get(key) {
            return resolve(doc, obj);
        }
        dict = parent(doc, dict)?.1;
    }
    None
}

fn read_rect(doc: &Document, annot: &Dictionary) -> Option<BoundingBox> {
    let rect = resolve(doc, annot.get(b"Rect").ok()?)?.as_array().ok()?;
    if rect.len() != 4 {
        return None;
    }
    let mut coords = [0.0f64; 4];
    for (slot, obj) in coords.iter_mut().zip(rect) {
        *slot = number(resolve(doc, obj)?)?;
    }
    Some(BoundingBox::new(coords[0], coords[1], coords[2], coords[3]))
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Names of the normal appearance states (`/AP /N`), falling back to the
/// down appearances (`/AP /D`)
fn appearance_states(doc: &Document, annot: &Dictionary) -> Vec<String> {
    let ap = match annot
        .get(b"AP")
        .ok()
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok())
    {
        Some(ap) => ap,
        None => return Vec::new(),
    };

    for key in [&b"N"[..], &b"D"[..]] {
        let states = ap
            .get(key)
            .ok()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_dict().ok());
        if let Some(states) = states {
            let names: Vec<String> = states
                .iter()
                .map(|(name, _)| String::from_utf8_lossy(name).into_owned())
                .collect();
            if !names.is_empty() {
                return names;
            }
        }
    }
    Vec::new()
}
