//! Value writing
//!
//! Writes answers into a structural copy of a document. The copy is the
//! parsed object graph re-serialized, never a re-render: objects that no
//! answer touches come out exactly as a plain [`copy_document`] emits them.
//!
//! Per shape:
//! - text and choice fields get `/V` set to the answer on the field object
//! - exclusive groups get `/V` and `/AS` set to the selected option's on
//!   state, every other option to `Off`
//! - lone toggles get `/V` and `/AS` set to their on state or `Off`

use crate::error::{ErrorKind, FormFillError};
use crate::extract::{load_document, locate_widgets, LocatedWidget};
use crate::group::{logical_field, partition_by_base, FieldShape, LogicalField};
use crate::text::{decode_text_string, encode_text_string};
use crate::widget::{RawWidget, WidgetKind, OFF_STATE};
use lopdf::{Document, Object, ObjectId};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// On state used for toggles that declare no appearance states
const DEFAULT_ON_STATE: &str = "Yes";

/// An answer the writer did not apply
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SkippedAnswer {
    pub field_id: String,
    pub kind: ErrorKind,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FillReport {
    /// Base ids written, in answer key order
    pub filled: Vec<String>,
    pub skipped: Vec<SkippedAnswer>,
}

impl FillReport {
    pub fn skipped_ids(&self) -> Vec<String> {
        self.skipped.iter().map(|s| s.field_id.clone()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct FilledDocument {
    pub bytes: Vec<u8>,
    pub report: FillReport,
}

/// Value and appearance state of one widget as stored in a document
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WidgetState {
    pub raw_id: String,
    pub page: u32,
    pub value: Option<String>,
    pub appearance_state: Option<String>,
}

/// Truthy tokens for toggle answers, compared case-insensitively
pub fn is_truthy(answer: &str) -> bool {
    matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "1" | "on"
    )
}

/// Structural copy with no modifications
pub fn copy_document(bytes: &[u8]) -> Result<Vec<u8>, FormFillError> {
    let mut doc = load_document(bytes)?;
    serialize(&mut doc)
}

/// Write `answers` (keyed by base id) into a copy of `bytes`
pub fn fill_document(
    bytes: &[u8],
    answers: &BTreeMap<String, String>,
) -> Result<FilledDocument, FormFillError> {
    let mut doc = load_document(bytes)?;
    let (located, _) = locate_widgets(&doc);
    let groups = group_located(located);
    let index: HashMap<&str, usize> = groups
        .iter()
        .enumerate()
        .map(|(i, g)| (g.field.base_id.as_str(), i))
        .collect();

    let mut report = FillReport::default();
    let mut wrote_text = false;

    for (field_id, answer) in answers {
        let group = match index.get(field_id.as_str()) {
            Some(&i) => &groups[i],
            None => {
                warn!(field_id = %field_id, "answer for unknown field skipped");
                report.skipped.push(SkippedAnswer {
                    field_id: field_id.clone(),
                    kind: ErrorKind::FieldNotFound,
                    reason: FormFillError::FieldNotFound(field_id.clone()).to_string(),
                });
                continue;
            }
        };

        if let Some(declared) = group
            .field
            .widgets
            .iter()
            .find_map(|w| w.unsupported_type.clone())
        {
            warn!(field_id = %field_id, field_type = %declared, "answer for unsupported field skipped");
            report.skipped.push(SkippedAnswer {
                field_id: field_id.clone(),
                kind: ErrorKind::UnsupportedFieldType,
                reason: FormFillError::UnsupportedFieldType {
                    field_id: field_id.clone(),
                    field_type: declared,
                }
                .to_string(),
            });
            continue;
        }

        let result = match (group.field.shape, group.field.kind) {
            (FieldShape::ExclusiveGroup, _) => write_exclusive(&mut doc, group, answer),
            (_, WidgetKind::Button) => write_toggle(&mut doc, group, is_truthy(answer)),
            (_, WidgetKind::Text | WidgetKind::Choice) => {
                write_text(&mut doc, group, answer).map(|()| wrote_text = true)
            }
        };

        match result {
            Ok(()) => {
                debug!(field_id = %field_id, shape = ?group.field.shape, "field written");
                report.filled.push(field_id.clone());
            }
            Err(e) => {
                warn!(field_id = %field_id, "field could not be written: {}", e);
                report.skipped.push(SkippedAnswer {
                    field_id: field_id.clone(),
                    kind: e.kind(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if wrote_text {
        set_need_appearances(&mut doc)?;
    }

    let bytes = serialize(&mut doc)?;
    info!(
        filled = report.filled.len(),
        skipped = report.skipped.len(),
        size = bytes.len(),
        "document filled"
    );
    Ok(FilledDocument { bytes, report })
}

/// Fill and atomically write the result to `dest`
pub fn fill_to_path(
    bytes: &[u8],
    answers: &BTreeMap<String, String>,
    dest: &Path,
) -> Result<FillReport, FormFillError> {
    let filled = fill_document(bytes, answers)?;
    write_atomic(dest, &filled.bytes)?;
    Ok(filled.report)
}

/// Write `bytes` to `dest` through a temporary file in the same directory
/// renamed into place. `dest` either keeps its previous content or holds
/// all of `bytes`; the temporary file is removed on every failure path.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<(), FormFillError> {
    let dir = match dest.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let write_err =
        |e: std::io::Error| FormFillError::SerializationError(format!("{}: {}", dest.display(), e));

    let mut tmp = tempfile::Builder::new()
        .prefix(".formfill-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(dest).map_err(|e| write_err(e.error))?;

    debug!(path = %dest.display(), size = bytes.len(), "artifact written");
    Ok(())
}

/// Read back `/V` and `/AS` of every named widget
pub fn read_widget_states(bytes: &[u8]) -> Result<Vec<WidgetState>, FormFillError> {
    let doc = load_document(bytes)?;
    let (located, _) = locate_widgets(&doc);
    Ok(located
        .iter()
        .map(|l| WidgetState {
            raw_id: l.widget.raw_id.clone(),
            page: l.widget.page,
            value: l
                .field_id
                .and_then(|id| doc.get_dictionary(id).ok())
                .and_then(|dict| dict.get(b"V").ok())
                .and_then(object_text),
            appearance_state: l
                .annot_id
                .and_then(|id| doc.get_dictionary(id).ok())
                .and_then(|dict| dict.get(b"AS").ok())
                .and_then(object_text),
        })
        .collect())
}

fn object_text(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => decode_text_string(bytes),
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    }
}

/// A logical field with the object ids behind each of its widgets, in the
/// same order as `field.widgets`
struct LocatedGroup {
    field: LogicalField,
    /// `(annotation, value holder)` per widget
    objects: Vec<(Option<ObjectId>, Option<ObjectId>)>,
}

fn group_located(located: Vec<LocatedWidget>) -> Vec<LocatedGroup> {
    partition_by_base(located, |l| l.widget.raw_id.as_str())
        .into_iter()
        .map(|(base, members)| {
            let (widgets, objects): (Vec<RawWidget>, Vec<_>) = members
                .into_iter()
                .map(|l| (l.widget, (l.annot_id, l.field_id)))
                .unzip();
            LocatedGroup {
                field: logical_field(base, widgets),
                objects,
            }
        })
        .collect()
}

impl LocatedGroup {
    fn members(&self) -> impl Iterator<Item = Member<'_>> {
        self.field
            .widgets
            .iter()
            .zip(&self.objects)
            .map(|(widget, &(annot_id, field_id))| Member {
                widget,
                annot_id,
                field_id,
            })
    }
}

struct Member<'a> {
    widget: &'a RawWidget,
    annot_id: Option<ObjectId>,
    field_id: Option<ObjectId>,
}

fn write_text(doc: &mut Document, group: &LocatedGroup, answer: &str) -> Result<(), FormFillError> {
    let value = encode_text_string(answer);
    let mut written = Vec::new();
    for member in group.members() {
        let field_id = value_holder(&member)?;
        // Kids of one parent share the value object
        if written.contains(&field_id) {
            continue;
        }
        set_entry(doc, field_id, "V", value.clone())?;
        written.push(field_id);
    }
    Ok(())
}

fn write_exclusive(doc: &mut Document, group: &LocatedGroup, answer: &str) -> Result<(), FormFillError> {
    let selected = match group.field.option_index(answer) {
        Some(i) => Some(i),
        None if is_truthy(answer) => Some(0),
        None => None,
    };

    for member in group.members() {
        set_toggle(doc, &member, OFF_STATE)?;
    }
    if let Some(member) = selected.and_then(|i| group.members().nth(i)) {
        let on = member.widget.on_state().unwrap_or(DEFAULT_ON_STATE);
        set_toggle(doc, &member, on)?;
    }
    Ok(())
}

fn write_toggle(doc: &mut Document, group: &LocatedGroup, checked: bool) -> Result<(), FormFillError> {
    for member in group.members() {
        let state = if checked {
            member.widget.on_state().unwrap_or(DEFAULT_ON_STATE)
        } else {
            OFF_STATE
        };
        set_toggle(doc, &member, state)?;
    }
    Ok(())
}

fn set_toggle(doc: &mut Document, member: &Member<'_>, state: &str) -> Result<(), FormFillError> {
    let name = Object::Name(state.as_bytes().to_vec());
    set_entry(doc, value_holder(member)?, "V", name.clone())?;
    let annot_id = member.annot_id.ok_or_else(|| not_indirect(&member.widget.raw_id))?;
    set_entry(doc, annot_id, "AS", name)
}

fn value_holder(member: &Member<'_>) -> Result<ObjectId, FormFillError> {
    member
        .field_id
        .ok_or_else(|| not_indirect(&member.widget.raw_id))
}

fn not_indirect(raw_id: &str) -> FormFillError {
    FormFillError::MalformedDocument(format!(
        "widget {} is not an indirect object and cannot be updated",
        raw_id
    ))
}

fn set_entry(doc: &mut Document, id: ObjectId, key: &str, value: Object) -> Result<(), FormFillError> {
    match doc.get_object_mut(id) {
        Ok(Object::Dictionary(dict)) => {
            dict.set(key, value);
            Ok(())
        }
        _ => Err(FormFillError::MalformedDocument(format!(
            "object {} {} is not a dictionary",
            id.0, id.1
        ))),
    }
}

/// Ask viewers to regenerate text appearances from `/V`
fn set_need_appearances(doc: &mut Document) -> Result<(), FormFillError> {
    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(|root| root.as_reference())
        .map_err(|e| FormFillError::MalformedDocument(format!("no catalog: {}", e)))?;

    let acroform_ref = match doc.get_dictionary(catalog_id) {
        Ok(catalog) => match catalog.get(b"AcroForm") {
            Ok(Object::Reference(id)) => Some(*id),
            Ok(_) => None,
            // Widgets without a form dictionary: nothing to flag
            Err(_) => return Ok(()),
        },
        Err(e) => return Err(FormFillError::MalformedDocument(e.to_string())),
    };

    match acroform_ref {
        Some(id) => set_entry(doc, id, "NeedAppearances", Object::Boolean(true)),
        None => {
            if let Ok(Object::Dictionary(catalog)) = doc.get_object_mut(catalog_id) {
                if let Ok(Object::Dictionary(acroform)) = catalog.get_mut(b"AcroForm") {
                    acroform.set("NeedAppearances", Object::Boolean(true));
                }
            }
            Ok(())
        }
    }
}

fn serialize(doc: &mut Document) -> Result<Vec<u8>, FormFillError> {
    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| FormFillError::SerializationError(e.to_string()))?;
    Ok(output)
}
