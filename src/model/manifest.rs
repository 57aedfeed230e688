use crate::model::{DatasetRef, Format, Upload};

/// How the binder fills a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Dataset reference parsed from the request path
    Ref,
    Text,
    Flag,
    /// Output format, negotiated against the selector suffix and `Accept`
    Format,
    /// Page size, clamped by the pagination rules
    Limit,
    /// Page offset, clamped by the pagination rules
    Offset,
    /// File part of a multipart body, or an inline text/JSON payload
    File,
}

/// One bindable field of a parameter shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A value produced by the binder for a single field
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    Ref(DatasetRef),
    Text(String),
    Flag(bool),
    Format(Format),
    Count(usize),
    File(Upload),
}

impl BoundValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            BoundValue::Ref(_) => "a dataset reference",
            BoundValue::Text(_) => "text",
            BoundValue::Flag(_) => "a boolean",
            BoundValue::Format(_) => "a format",
            BoundValue::Count(_) => "a count",
            BoundValue::File(_) => "a file",
        }
    }
}

/// A parameter shape the request binder can fill.
///
/// `FIELDS` is the manifest the binder walks; `assign` receives each typed
/// value by field name, so the struct keeps its own static field types.
pub trait Bindable: Default + Send + 'static {
    const FIELDS: &'static [FieldSpec];

    fn assign(&mut self, field: &'static str, value: BoundValue) -> Result<(), String>;

    /// Cross-field checks run after every field is assigned
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Error message for a value that does not fit the named field
pub fn mismatch(field: &str, value: &BoundValue) -> String {
    format!("parameter \"{}\" cannot hold {}", field, value.kind_name())
}
