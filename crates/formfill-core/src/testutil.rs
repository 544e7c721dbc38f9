//! In-memory AcroForm fixtures for tests
//!
//! Builds small but structurally complete PDFs with lopdf: a page tree, a
//! content stream per page, widget annotations and an `/AcroForm` whose
//! `/Fields` lists every terminal or parent field.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};

/// A radio group modelled as one parent field with kid widgets
#[derive(Debug, Clone)]
pub struct Radio {
    name: String,
    page: u32,
    options: Vec<(String, [f32; 4])>,
}

impl Radio {
    pub fn new(name: &str, page: u32, options: Vec<(&str, [f32; 4])>) -> Self {
        Self {
            name: name.to_string(),
            page,
            options: options
                .into_iter()
                .map(|(state, rect)| (state.to_string(), rect))
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Field {
        name: String,
        page: u32,
        rect: [f32; 4],
        field_type: &'static str,
        on_state: Option<String>,
        tooltip: Option<String>,
        value: Option<String>,
    },
    Radio(Radio),
    Link {
        page: u32,
        rect: [f32; 4],
    },
    Note {
        page: u32,
        rect: [f32; 4],
        author: String,
    },
}

#[derive(Debug, Clone)]
pub struct FormBuilder {
    pages: u32,
    entries: Vec<Entry>,
    acroform: bool,
}

impl FormBuilder {
    pub fn new(pages: u32) -> Self {
        Self {
            pages,
            entries: Vec::new(),
            acroform: true,
        }
    }

    fn field(
        mut self,
        name: &str,
        page: u32,
        rect: [f32; 4],
        field_type: &'static str,
        on_state: Option<&str>,
    ) -> Self {
        self.entries.push(Entry::Field {
            name: name.to_string(),
            page,
            rect,
            field_type,
            on_state: on_state.map(str::to_string),
            tooltip: None,
            value: None,
        });
        self
    }

    pub fn text(self, name: &str, page: u32, rect: [f32; 4]) -> Self {
        self.field(name, page, rect, "Tx", None)
    }

    pub fn text_with_tooltip(mut self, name: &str, page: u32, rect: [f32; 4], tooltip: &str) -> Self {
        self = self.text(name, page, rect);
        if let Some(Entry::Field { tooltip: slot, .. }) = self.entries.last_mut() {
            *slot = Some(tooltip.to_string());
        }
        self
    }

    pub fn text_with_value(mut self, name: &str, page: u32, rect: [f32; 4], value: &str) -> Self {
        self = self.text(name, page, rect);
        if let Some(Entry::Field { value: slot, .. }) = self.entries.last_mut() {
            *slot = Some(value.to_string());
        }
        self
    }

    pub fn choice(self, name: &str, page: u32, rect: [f32; 4]) -> Self {
        self.field(name, page, rect, "Ch", None)
    }

    pub fn checkbox(self, name: &str, page: u32, rect: [f32; 4], on_state: &str) -> Self {
        self.field(name, page, rect, "Btn", Some(on_state))
    }

    pub fn signature(self, name: &str, page: u32, rect: [f32; 4]) -> Self {
        self.field(name, page, rect, "Sig", None)
    }

    pub fn radio(mut self, radio: Radio) -> Self {
        self.entries.push(Entry::Radio(radio));
        self
    }

    /// A non-field annotation without `/T`
    pub fn link(mut self, page: u32, rect: [f32; 4]) -> Self {
        self.entries.push(Entry::Link { page, rect });
        self
    }

    /// A sticky note whose `/T` is its author, with a `/Popup` child
    pub fn note(mut self, page: u32, rect: [f32; 4], author: &str) -> Self {
        self.entries.push(Entry::Note {
            page,
            rect,
            author: author.to_string(),
        });
        self
    }

    pub fn without_acroform(mut self) -> Self {
        self.acroform = false;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let mut annots: Vec<Vec<Object>> = vec![Vec::new(); self.pages as usize];
        let mut fields = Vec::new();

        for entry in &self.entries {
            match entry {
                Entry::Field {
                    name,
                    page,
                    rect,
                    field_type,
                    on_state,
                    tooltip,
                    value,
                } => {
                    let mut dict = widget_dict(*rect);
                    dict.set("FT", Object::Name(field_type.as_bytes().to_vec()));
                    dict.set("T", literal(name));
                    if let Some(tooltip) = tooltip {
                        dict.set("TU", literal(tooltip));
                    }
                    if let Some(on_state) = on_state {
                        let ap = appearance(&mut doc, on_state);
                        dict.set("AP", ap);
                        dict.set("AS", Object::Name(b"Off".to_vec()));
                        dict.set("V", Object::Name(b"Off".to_vec()));
                    }
                    if let Some(value) = value {
                        dict.set("V", literal(value));
                    }
                    let id = doc.add_object(dict);
                    annots[(*page - 1) as usize].push(Object::Reference(id));
                    fields.push(Object::Reference(id));
                }
                Entry::Radio(radio) => {
                    let parent_id = doc.new_object_id();
                    let mut kids = Vec::new();
                    for (state, rect) in &radio.options {
                        let mut kid = widget_dict(*rect);
                        kid.set("Parent", Object::Reference(parent_id));
                        let ap = appearance(&mut doc, state);
                        kid.set("AP", ap);
                        kid.set("AS", Object::Name(b"Off".to_vec()));
                        let kid_id = doc.add_object(kid);
                        kids.push(Object::Reference(kid_id));
                        annots[(radio.page - 1) as usize].push(Object::Reference(kid_id));
                    }
                    let parent = Dictionary::from_iter(vec![
                        ("FT", Object::Name(b"Btn".to_vec())),
                        ("T", literal(&radio.name)),
                        // Radio | NoToggleToOff
                        ("Ff", Object::Integer(49152)),
                        ("V", Object::Name(b"Off".to_vec())),
                        ("Kids", Object::Array(kids)),
                    ]);
                    doc.objects.insert(parent_id, Object::Dictionary(parent));
                    fields.push(Object::Reference(parent_id));
                }
                Entry::Link { page, rect } => {
                    let link = Dictionary::from_iter(vec![
                        ("Type", Object::Name(b"Annot".to_vec())),
                        ("Subtype", Object::Name(b"Link".to_vec())),
                        ("Rect", rect_array(*rect)),
                    ]);
                    let id = doc.add_object(link);
                    annots[(*page - 1) as usize].push(Object::Reference(id));
                }
                Entry::Note { page, rect, author } => {
                    let note_id = doc.new_object_id();
                    let popup = Dictionary::from_iter(vec![
                        ("Type", Object::Name(b"Annot".to_vec())),
                        ("Subtype", Object::Name(b"Popup".to_vec())),
                        ("Rect", rect_array(*rect)),
                        ("Parent", Object::Reference(note_id)),
                    ]);
                    let popup_id = doc.add_object(popup);
                    let note = Dictionary::from_iter(vec![
                        ("Type", Object::Name(b"Annot".to_vec())),
                        ("Subtype", Object::Name(b"Text".to_vec())),
                        ("Rect", rect_array(*rect)),
                        ("T", literal(author)),
                        ("Contents", literal("Please double-check this")),
                        ("Popup", Object::Reference(popup_id)),
                    ]);
                    doc.objects.insert(note_id, Object::Dictionary(note));
                    annots[(*page - 1) as usize].push(Object::Reference(note_id));
                    annots[(*page - 1) as usize].push(Object::Reference(popup_id));
                }
            }
        }

        let mut page_ids: Vec<ObjectId> = Vec::new();
        for (i, page_annots) in annots.into_iter().enumerate() {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new(
                        "Tf",
                        vec![Object::Name(b"F1".to_vec()), Object::Integer(12)],
                    ),
                    Operation::new("Td", vec![Object::Integer(72), Object::Integer(740)]),
                    Operation::new(
                        "Tj",
                        vec![Object::String(
                            format!("Form page {}", i + 1).into_bytes(),
                            StringFormat::Literal,
                        )],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(
                Dictionary::new(),
                content.encode().unwrap_or_default(),
            ));

            let mut page = Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                (
                    "MediaBox",
                    Object::Array(vec![
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(612),
                        Object::Integer(792),
                    ]),
                ),
                ("Contents", Object::Reference(content_id)),
            ]);
            if !page_annots.is_empty() {
                page.set("Annots", Object::Array(page_annots));
            }
            page_ids.push(doc.add_object(page));
        }

        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(self.pages as i64)),
            (
                "Kids",
                Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
            ),
        ]);
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]);
        if self.acroform {
            let acroform = Dictionary::from_iter(vec![
                ("Fields", Object::Array(fields)),
                ("DA", literal("/Helv 0 Tf 0 g")),
            ]);
            let acroform_id = doc.add_object(acroform);
            catalog.set("AcroForm", Object::Reference(acroform_id));
        }
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).expect("fixture PDF serializes");
        buffer
    }
}

fn literal(text: &str) -> Object {
    Object::String(text.as_bytes().to_vec(), StringFormat::Literal)
}

fn rect_array(rect: [f32; 4]) -> Object {
    Object::Array(rect.iter().map(|v| Object::Real(*v)).collect())
}

fn widget_dict(rect: [f32; 4]) -> Dictionary {
    Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Annot".to_vec())),
        ("Subtype", Object::Name(b"Widget".to_vec())),
        ("Rect", rect_array(rect)),
    ])
}

/// `<< /N << /<on_state> .. /Off .. >> >>`
fn appearance(doc: &mut Document, on_state: &str) -> Object {
    let on = doc.add_object(Stream::new(Dictionary::new(), b"0 g 2 2 6 6 re f".to_vec()));
    let off = doc.add_object(Stream::new(Dictionary::new(), Vec::new()));
    let normal = Dictionary::from_iter(vec![
        (on_state, Object::Reference(on)),
        ("Off", Object::Reference(off)),
    ]);
    Object::Dictionary(Dictionary::from_iter(vec![("N", Object::Dictionary(normal))]))
}
