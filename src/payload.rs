//! Prediction payload assembly.
//!
//! The wire contract is simple: a mapping of field name to value, with
//! binary-like values (file parts) split from JSON-compatible values. A
//! payload with no file parts goes out as a JSON body; one with file parts
//! goes out as `multipart/form-data`.

use serde_json::{Map, Value};

use crate::{Error, Result};

#[derive(Debug, Clone)]
struct FilePart {
    name: String,
    file_name: String,
    bytes: Vec<u8>,
}

/// Model input for predict / stream / async-submit calls.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    fields: Map<String, Value>,
    files: Vec<FilePart>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object; every member becomes a plain field.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self {
                fields,
                files: Vec::new(),
            }),
            _ => Err(Error::Config("payload must be a JSON object".to_owned())),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Attach a binary part; its presence switches the body to multipart.
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        self.files.push(FilePart {
            name: name.into(),
            file_name: file_name.into(),
            bytes,
        });
        self
    }

    pub fn is_multipart(&self) -> bool {
        !self.files.is_empty()
    }

    pub(crate) fn json_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub(crate) fn to_form(&self) -> reqwest::multipart::Form {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in &self.fields {
            form = form.text(name.clone(), field_text(value));
        }
        for part in &self.files {
            form = form.part(
                part.name.clone(),
                reqwest::multipart::Part::bytes(part.bytes.clone())
                    .file_name(part.file_name.clone()),
            );
        }
        form
    }

    pub(crate) fn to_blocking_form(&self) -> reqwest::blocking::multipart::Form {
        let mut form = reqwest::blocking::multipart::Form::new();
        for (name, value) in &self.fields {
            form = form.text(name.clone(), field_text(value));
        }
        for part in &self.files {
            form = form.part(
                part.name.clone(),
                reqwest::blocking::multipart::Part::bytes(part.bytes.clone())
                    .file_name(part.file_name.clone()),
            );
        }
        form
    }
}

fn field_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
