//! Raw widget descriptors
//!
//! One [`RawWidget`] is produced per physical, page-positioned annotation
//! that carries a field name and a rectangle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The universal "off" appearance state of toggle widgets.
pub const OFF_STATE: &str = "Off";

/// Bounding rectangle in PDF user space, `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn to_array(self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// Field kind derived from the `/FT` marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetKind {
    Text,
    Choice,
    Button,
}

impl WidgetKind {
    /// Map a PDF field type name (`Tx`, `Ch`, `Btn`) to a kind
    pub fn from_pdf_name(name: &[u8]) -> Option<Self> {
        match name {
            b"Tx" => Some(WidgetKind::Text),
            b"Ch" => Some(WidgetKind::Choice),
            b"Btn" => Some(WidgetKind::Button),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawWidget {
    /// Fully qualified field name, possibly ending in a repeat index like `[0]`
    pub raw_id: String,
    /// 1-based page number
    pub page: u32,
    pub bbox: BoundingBox,
    pub kind: WidgetKind,
    /// Named appearance states other than [`OFF_STATE`] (Button only)
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub appearance_states: BTreeSet<String>,
    /// Alternate field name (`/TU`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    /// Declared field type when it is not Text/Choice/Button; such widgets
    /// are kept as `Text` but never written to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsupported_type: Option<String>,
}

impl RawWidget {
    pub fn new(raw_id: impl Into<String>, page: u32, bbox: BoundingBox, kind: WidgetKind) -> Self {
        Self {
            raw_id: raw_id.into(),
            page,
            bbox,
            kind,
            appearance_states: BTreeSet::new(),
            tooltip: None,
            unsupported_type: None,
        }
    }

    pub fn with_states<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.appearance_states = states
            .into_iter()
            .map(Into::into)
            .filter(|s| s != OFF_STATE)
            .collect();
        self
    }

    /// The state this widget shows when selected, if it has one
    pub fn on_state(&self) -> Option<&str> {
        self.appearance_states.iter().next().map(String::as_str)
    }
}
