//! Shared fixtures for integration tests

#![allow(dead_code)]

#[path = "../../src/testutil.rs"]
mod builder;

pub use builder::{FormBuilder, Radio};

use std::collections::BTreeMap;

pub fn answers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Three text fields on one page, `Middle` optional
pub fn names_form() -> Vec<u8> {
    FormBuilder::new(1)
        .text("First", 1, [72.0, 700.0, 272.0, 720.0])
        .text("Middle", 1, [72.0, 670.0, 272.0, 690.0])
        .text("Last", 1, [72.0, 640.0, 272.0, 660.0])
        .build()
}

/// Two-page application: repeated name, a gender pair, a checkbox, a choice
pub fn application_form() -> Vec<u8> {
    FormBuilder::new(2)
        .text_with_tooltip("Name[0]", 1, [72.0, 700.0, 272.0, 720.0], "Full legal name")
        .checkbox("Gender[0]", 1, [72.0, 650.0, 84.0, 662.0], "M")
        .checkbox("Gender[1]", 1, [120.0, 650.0, 132.0, 662.0], "F")
        .choice("Country", 1, [72.0, 600.0, 272.0, 620.0])
        .text("Name[1]", 2, [72.0, 760.0, 272.0, 780.0])
        .checkbox("Agree", 2, [72.0, 100.0, 84.0, 112.0], "Yes")
        .build()
}
