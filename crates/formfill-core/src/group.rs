//! Field grouping
//!
//! Consolidates raw widgets sharing a base identifier into logical fields.
//! Output order is first-seen order of base identifiers, and within a group
//! first-seen order of widgets; no hash iteration order leaks into it.

use crate::widget::{RawWidget, WidgetKind};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeSet, HashMap};

lazy_static! {
    /// Trailing repeat index such as `[0]` or `[12]`
    static ref REPEAT_SUFFIX: Regex = Regex::new(r"\[\d+\]$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldShape {
    Single,
    ExclusiveGroup,
    RepeatedText,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogicalField {
    pub base_id: String,
    /// Kind of the first widget
    pub kind: WidgetKind,
    #[serde(deserialize_with = "non_empty_widgets")]
    pub widgets: Vec<RawWidget>,
    pub shape: FieldShape,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_description: Option<String>,
}

impl LogicalField {
    /// Find the widget selected by an explicit option answer: its raw id or
    /// one of its "on" state names
    pub fn option_index(&self, answer: &str) -> Option<usize> {
        let answer = answer.trim();
        self.widgets
            .iter()
            .position(|w| w.raw_id == answer)
            .or_else(|| {
                self.widgets
                    .iter()
                    .position(|w| w.appearance_states.contains(answer))
            })
    }
}

fn non_empty_widgets<'de, D>(deserializer: D) -> Result<Vec<RawWidget>, D::Error>
where
    D: Deserializer<'de>,
{
    let widgets = Vec::<RawWidget>::deserialize(deserializer)?;
    if widgets.is_empty() {
        return Err(serde::de::Error::custom("logical field has no widgets"));
    }
    Ok(widgets)
}

/// Strip one trailing bracketed repeat index from a raw id
pub fn base_id(raw_id: &str) -> &str {
    match REPEAT_SUFFIX.find(raw_id) {
        Some(m) if m.start() > 0 => &raw_id[..m.start()],
        _ => raw_id,
    }
}

/// Group raw widgets (page-then-document order) into logical fields
pub fn group_widgets(widgets: Vec<RawWidget>) -> Vec<LogicalField> {
    partition_by_base(widgets, |w| w.raw_id.as_str())
        .into_iter()
        .map(|(base_id, widgets)| logical_field(base_id, widgets))
        .collect()
}

pub(crate) fn logical_field(base_id: String, widgets: Vec<RawWidget>) -> LogicalField {
    let kind = widgets[0].kind;
    let shape = classify(&widgets);
    LogicalField {
        base_id,
        kind,
        widgets,
        shape,
        required: false,
        human_label: None,
        human_description: None,
    }
}

/// Bucket items by the base id of their raw id, first-seen order throughout
pub(crate) fn partition_by_base<T, F>(items: Vec<T>, raw_id: F) -> Vec<(String, Vec<T>)>
where
    F: Fn(&T) -> &str,
{
    let mut order: Vec<(String, Vec<T>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for item in items {
        let base = base_id(raw_id(&item)).to_string();
        match index.get(&base) {
            Some(&i) => order[i].1.push(item),
            None => {
                index.insert(base.clone(), order.len());
                order.push((base, vec![item]));
            }
        }
    }
    order
}

/// Decide the shape of a group of widgets sharing one base id
pub fn classify(widgets: &[RawWidget]) -> FieldShape {
    if widgets.len() < 2 {
        return FieldShape::Single;
    }

    if widgets.iter().all(|w| w.kind == WidgetKind::Button) {
        let mut seen = BTreeSet::new();
        let exclusive = widgets.iter().all(|w| match w.on_state() {
            Some(on) => seen.insert(on),
            None => false,
        });
        if exclusive {
            return FieldShape::ExclusiveGroup;
        }
        return FieldShape::Single;
    }

    if widgets.iter().all(|w| w.kind == WidgetKind::Text) {
        let first_page = widgets[0].page;
        if widgets.iter().any(|w| w.page != first_page) {
            return FieldShape::RepeatedText;
        }
    }

    FieldShape::Single
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::BoundingBox;
    use pretty_assertions::assert_eq;

    fn text(id: &str, page: u32) -> RawWidget {
        RawWidget::new(id, page, BoundingBox::new(0.0, 0.0, 10.0, 10.0), WidgetKind::Text)
    }

    fn button(id: &str, on: &str) -> RawWidget {
        RawWidget::new(id, 1, BoundingBox::new(0.0, 0.0, 10.0, 10.0), WidgetKind::Button)
            .with_states([on])
    }

    #[test]
    fn test_field_without_widgets_does_not_deserialize() {
        let json = r#"{"base_id":"Ghost","kind":"text","widgets":[],"shape":"single"}"#;
        let err = serde_json::from_str::<LogicalField>(json).unwrap_err();
        assert!(err.to_string().contains("no widgets"));

        let field = &group_widgets(vec![text("Name", 1)])[0];
        let json = serde_json::to_string(field).unwrap();
        assert_eq!(&serde_json::from_str::<LogicalField>(&json).unwrap(), field);
    }

    #[test]
    fn test_base_id_strips_trailing_index_only() {
        assert_eq!(base_id("Gender[0]"), "Gender");
        assert_eq!(base_id("Gender[12]"), "Gender");
        assert_eq!(base_id("form1[0].Page1[0].Name[0]"), "form1[0].Page1[0].Name");
        assert_eq!(base_id("Name"), "Name");
        assert_eq!(base_id("Name[x]"), "Name[x]");
        assert_eq!(base_id("[0]"), "[0]");
    }

    #[test]
    fn test_groups_preserve_first_seen_order() {
        let fields = group_widgets(vec![
            text("Last[0]", 1),
            text("First[0]", 1),
            text("Last[1]", 2),
        ]);
        let ids: Vec<&str> = fields.iter().map(|f| f.base_id.as_str()).collect();
        assert_eq!(ids, vec!["Last", "First"]);
        assert_eq!(fields[0].widgets[0].raw_id, "Last[0]");
        assert_eq!(fields[0].widgets[1].raw_id, "Last[1]");
    }

    #[test]
    fn test_repeated_text_across_pages() {
        let fields = group_widgets(vec![text("Name[0]", 1), text("Name[1]", 3)]);
        assert_eq!(fields[0].shape, FieldShape::RepeatedText);
    }

    #[test]
    fn test_same_page_text_duplicates_are_single() {
        let fields = group_widgets(vec![text("Name[0]", 1), text("Name[1]", 1)]);
        assert_eq!(fields[0].shape, FieldShape::Single);
    }

    #[test]
    fn test_buttons_with_unique_states_are_exclusive() {
        let fields = group_widgets(vec![button("Gender[0]", "M"), button("Gender[1]", "F")]);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].shape, FieldShape::ExclusiveGroup);
        assert_eq!(fields[0].kind, WidgetKind::Button);
    }

    #[test]
    fn test_buttons_sharing_a_state_are_not_exclusive() {
        let fields = group_widgets(vec![button("Agree[0]", "Yes"), button("Agree[1]", "Yes")]);
        assert_eq!(fields[0].shape, FieldShape::Single);
    }

    #[test]
    fn test_single_checkbox_is_single() {
        let fields = group_widgets(vec![button("Agree", "Yes")]);
        assert_eq!(fields[0].shape, FieldShape::Single);
    }

    #[test]
    fn test_option_index_by_raw_id_or_state() {
        let fields = group_widgets(vec![button("Gender[0]", "M"), button("Gender[1]", "F")]);
        assert_eq!(fields[0].option_index("Gender[1]"), Some(1));
        assert_eq!(fields[0].option_index("M"), Some(0));
        assert_eq!(fields[0].option_index("true"), None);
    }
}
