//! Schema building
//!
//! Attaches externally produced guidance (label, description, required flag)
//! to grouped fields. Enrichment is best-effort: a field without metadata is
//! optional with an empty label, and a missing lookup never fails the build.

use crate::error::FormFillError;
use crate::extract::{extract_fields, ExtractOptions, ExtractWarning};
use crate::group::{group_widgets, FieldShape, LogicalField};
use crate::widget::WidgetKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Human guidance for one logical field
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FieldMetadata {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

/// Source of field metadata keyed by base id
pub trait MetadataLookup {
    fn lookup(&self, base_id: &str) -> Option<FieldMetadata>;
}

impl MetadataLookup for HashMap<String, FieldMetadata> {
    fn lookup(&self, base_id: &str) -> Option<FieldMetadata> {
        self.get(base_id).cloned()
    }
}

impl MetadataLookup for BTreeMap<String, FieldMetadata> {
    fn lookup(&self, base_id: &str) -> Option<FieldMetadata> {
        self.get(base_id).cloned()
    }
}

impl<T: MetadataLookup> MetadataLookup for Option<T> {
    fn lookup(&self, base_id: &str) -> Option<FieldMetadata> {
        self.as_ref().and_then(|inner| inner.lookup(base_id))
    }
}

/// Lookup used when enrichment is unavailable
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

impl MetadataLookup for NoMetadata {
    fn lookup(&self, _base_id: &str) -> Option<FieldMetadata> {
        None
    }
}

/// Ordered logical fields of one document; read-only once built
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FormSchema {
    pub fields: Vec<LogicalField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaFieldType {
    Text,
    Choice,
    ExclusiveGroup,
    Checkbox,
}

/// One selectable widget of an exclusive group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaOption {
    pub option_id: String,
    pub state: String,
    pub page: u32,
    pub coords: [f64; 4],
}

/// Client-facing description of a logical field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaField {
    pub field_id: String,
    pub label: String,
    pub description: String,
    #[serde(rename = "type")]
    pub field_type: SchemaFieldType,
    pub required: bool,
    pub page: u32,
    pub coords: [f64; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SchemaOption>,
}

/// One field per page, 1-based
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldPage {
    pub current_page: usize,
    pub total_pages: usize,
    pub field: SchemaField,
}

impl FormSchema {
    /// Attach metadata to grouped fields, keeping their order
    pub fn build(fields: Vec<LogicalField>, lookup: &dyn MetadataLookup) -> Self {
        let fields = fields
            .into_iter()
            .map(|mut field| {
                match lookup.lookup(&field.base_id) {
                    Some(meta) => {
                        field.required = meta.required;
                        field.human_label = Some(meta.label).filter(|l| !l.is_empty());
                        field.human_description =
                            Some(meta.description).filter(|d| !d.is_empty());
                    }
                    None => {
                        field.required = false;
                        field.human_label = None;
                        field.human_description = None;
                    }
                }
                field
            })
            .collect();
        Self { fields }
    }

    /// Extract, group and enrich in one step
    pub fn from_document(
        bytes: &[u8],
        options: ExtractOptions,
        lookup: &dyn MetadataLookup,
    ) -> Result<(Self, Vec<ExtractWarning>), FormFillError> {
        let extraction = extract_fields(bytes, options)?;
        let grouped = group_widgets(extraction.widgets);
        Ok((Self::build(grouped, lookup), extraction.warnings))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, base_id: &str) -> Option<&LogicalField> {
        self.fields.iter().find(|f| f.base_id == base_id)
    }

    pub fn contains(&self, base_id: &str) -> bool {
        self.field(base_id).is_some()
    }

    /// Base ids of required fields, in schema order
    pub fn required_ids(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.base_id.as_str())
    }

    pub fn rows(&self) -> Vec<SchemaField> {
        self.fields.iter().map(schema_field).collect()
    }

    pub fn page(&self, page_num: usize) -> Option<FieldPage> {
        if page_num == 0 {
            return None;
        }
        let field = self.fields.get(page_num - 1)?;
        Some(FieldPage {
            current_page: page_num,
            total_pages: self.fields.len(),
            field: schema_field(field),
        })
    }
}

fn schema_field(field: &LogicalField) -> SchemaField {
    let field_type = match (field.kind, field.shape) {
        (_, FieldShape::ExclusiveGroup) => SchemaFieldType::ExclusiveGroup,
        (WidgetKind::Button, _) => SchemaFieldType::Checkbox,
        (WidgetKind::Choice, _) => SchemaFieldType::Choice,
        (WidgetKind::Text, _) => SchemaFieldType::Text,
    };

    let options = if field.shape == FieldShape::ExclusiveGroup {
        field
            .widgets
            .iter()
            .filter_map(|w| {
                Some(SchemaOption {
                    option_id: w.raw_id.clone(),
                    state: w.on_state()?.to_string(),
                    page: w.page,
                    coords: w.bbox.to_array(),
                })
            })
            .collect()
    } else {
        Vec::new()
    };

    let first = &field.widgets[0];
    SchemaField {
        field_id: field.base_id.clone(),
        label: field.human_label.clone().unwrap_or_default(),
        description: field.human_description.clone().unwrap_or_default(),
        field_type,
        required: field.required,
        page: first.page,
        coords: first.bbox.to_array(),
        tooltip: field.widgets.iter().find_map(|w| w.tooltip.clone()),
        options,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::{BoundingBox, RawWidget};
    use pretty_assertions::assert_eq;

    fn names() -> Vec<LogicalField> {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        group_widgets(vec![
            RawWidget::new("First", 1, bbox, WidgetKind::Text),
            RawWidget::new("Middle", 1, bbox, WidgetKind::Text),
            RawWidget::new("Last", 1, bbox, WidgetKind::Text),
        ])
    }

    fn meta(label: &str, required: bool) -> FieldMetadata {
        FieldMetadata {
            label: label.to_string(),
            description: format!("Enter your {}", label.to_lowercase()),
            required,
        }
    }

    #[test]
    fn test_metadata_is_attached() {
        let mut lookup = HashMap::new();
        lookup.insert("First".to_string(), meta("First name", true));
        lookup.insert("Last".to_string(), meta("Last name", true));

        let schema = FormSchema::build(names(), &lookup);
        let first = schema.field("First").unwrap();
        assert!(first.required);
        assert_eq!(first.human_label.as_deref(), Some("First name"));

        let middle = schema.field("Middle").unwrap();
        assert!(!middle.required);
        assert_eq!(middle.human_label, None);
    }

    #[test]
    fn test_missing_enrichment_does_not_fail() {
        let schema = FormSchema::build(names(), &NoMetadata);
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.required_ids().count(), 0);
        assert!(schema.rows().iter().all(|r| r.label.is_empty()));
    }

    #[test]
    fn test_rows_keep_order() {
        let schema = FormSchema::build(names(), &NoMetadata);
        let ids: Vec<String> = schema.rows().into_iter().map(|r| r.field_id).collect();
        assert_eq!(ids, vec!["First", "Middle", "Last"]);
    }

    #[test]
    fn test_pagination() {
        let schema = FormSchema::build(names(), &NoMetadata);
        assert!(schema.page(0).is_none());
        assert!(schema.page(4).is_none());

        let page = schema.page(2).unwrap();
        assert_eq!(page.current_page, 2);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.field.field_id, "Middle");
    }

    #[test]
    fn test_exclusive_group_row_lists_options() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let fields = group_widgets(vec![
            RawWidget::new("Gender[0]", 1, bbox, WidgetKind::Button).with_states(["M"]),
            RawWidget::new("Gender[1]", 1, bbox, WidgetKind::Button).with_states(["F"]),
        ]);
        let schema = FormSchema::build(fields, &NoMetadata);
        let row = &schema.rows()[0];
        assert_eq!(row.field_type, SchemaFieldType::ExclusiveGroup);
        assert_eq!(row.options.len(), 2);
        assert_eq!(row.options[1].option_id, "Gender[1]");
        assert_eq!(row.options[1].state, "F");
    }

    #[test]
    fn test_row_type_serializes_snake_case() {
        let schema = FormSchema::build(names(), &NoMetadata);
        let json = serde_json::to_value(&schema.rows()[0]).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["field_id"], "First");
    }
}
