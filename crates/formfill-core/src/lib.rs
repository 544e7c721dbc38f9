//! AcroForm field extraction, grouping and write-back
//!
//! The pipeline, leaf first:
//! - [`extract`]: document bytes to raw widgets
//! - [`group`]: raw widgets to logical fields
//! - [`schema`]: logical fields plus external metadata to a [`FormSchema`]
//! - [`session`]: answers, validation and generation gating
//! - [`fill`]: answers written into a structural copy of the document
//!
//! Everything here is synchronous and holds no global state.

pub mod error;
pub mod extract;
pub mod fill;
pub mod group;
pub mod schema;
pub mod session;
pub mod text;
pub mod widget;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use error::{ErrorCategory, ErrorKind, FormFillError};
pub use extract::{extract_fields, ExtractOptions, ExtractWarning, Extraction};
pub use fill::{
    copy_document, fill_document, fill_to_path, read_widget_states, write_atomic, FillReport,
    FilledDocument, SkippedAnswer, WidgetState,
};
pub use group::{group_widgets, FieldShape, LogicalField};
pub use schema::{
    FieldMetadata, FieldPage, FormSchema, MetadataLookup, NoMetadata, SchemaField,
    SchemaFieldType, SchemaOption,
};
pub use session::{Progress, Session, SessionState, Validation};
pub use widget::{BoundingBox, RawWidget, WidgetKind, OFF_STATE};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FormBuilder;

    #[test]
    fn test_extraction_counts_pages() {
        let pdf = FormBuilder::new(3).build();
        let extraction = extract_fields(&pdf, ExtractOptions::default()).unwrap();
        assert_eq!(extraction.page_count, 3);
    }

    #[test]
    fn test_schema_from_document() {
        let pdf = FormBuilder::new(1)
            .text("First", 1, [0.0, 0.0, 10.0, 10.0])
            .checkbox("Agree", 1, [0.0, 20.0, 10.0, 30.0], "Yes")
            .build();

        let (schema, warnings) =
            FormSchema::from_document(&pdf, ExtractOptions::default(), &NoMetadata).unwrap();
        assert!(warnings.is_empty());
        let types: Vec<SchemaFieldType> = schema.rows().iter().map(|r| r.field_type).collect();
        assert_eq!(types, vec![SchemaFieldType::Text, SchemaFieldType::Checkbox]);
    }
}
