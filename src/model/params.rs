use serde::Serialize;

use crate::logic::pagination::{self, PageToken, DEFAULT_LIMIT};
use crate::model::manifest::{mismatch, Bindable, BoundValue, FieldKind, FieldSpec};
use crate::model::{DatasetRef, Format, SaveRequest, Upload};

pub const ORDER_BY_UPDATED: &str = "updated";
pub const ORDER_BY_NAME: &str = "name";

/// Pagination and filtering shared by list-style requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListParams {
    pub limit: usize,
    pub offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peername: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
            order_by: None,
            peername: None,
            published: None,
        }
    }
}

impl ListParams {
    pub fn window(limit: usize, offset: usize) -> Self {
        Self {
            limit,
            offset,
            ..Default::default()
        }
    }

    pub fn page(&self) -> PageToken {
        pagination::page(self.limit, self.offset).with_order_by(self.order_by.clone())
    }

    fn assign_window(&mut self, field: &'static str, value: BoundValue) -> Result<(), String> {
        match (field, value) {
            ("limit", BoundValue::Count(limit)) => self.limit = limit,
            ("offset", BoundValue::Count(offset)) => self.offset = offset,
            (field, value) => return Err(mismatch(field, &value)),
        }
        Ok(())
    }
}

impl Bindable for ListParams {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::new("limit", FieldKind::Limit),
        FieldSpec::new("offset", FieldKind::Offset),
        FieldSpec::new("order_by", FieldKind::Text),
        FieldSpec::new("peername", FieldKind::Text),
        FieldSpec::new("published", FieldKind::Flag),
    ];

    fn assign(&mut self, field: &'static str, value: BoundValue) -> Result<(), String> {
        match (field, value) {
            ("order_by", BoundValue::Text(order_by)) => self.order_by = Some(order_by),
            ("peername", BoundValue::Text(peername)) => self.peername = Some(peername),
            ("published", BoundValue::Flag(published)) => self.published = Some(published),
            (field, value) => return self.assign_window(field, value),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), String> {
        match self.order_by.as_deref() {
            None | Some(ORDER_BY_UPDATED) | Some(ORDER_BY_NAME) => Ok(()),
            Some(other) => Err(format!(
                "order_by must be \"{ORDER_BY_UPDATED}\" or \"{ORDER_BY_NAME}\", got \"{other}\""
            )),
        }
    }
}

/// Parameters of a version-history request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogParams {
    pub reference: DatasetRef,
    pub list: ListParams,
    /// Only consult local history
    pub local: bool,
    /// Remote to fall back to; the configured default when unset
    pub remote: Option<String>,
    /// Go to the network before local history
    pub pull: bool,
}

impl Bindable for LogParams {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::new("reference", FieldKind::Ref).required(),
        FieldSpec::new("limit", FieldKind::Limit),
        FieldSpec::new("offset", FieldKind::Offset),
        FieldSpec::new("local", FieldKind::Flag),
        FieldSpec::new("remote", FieldKind::Text),
        FieldSpec::new("pull", FieldKind::Flag),
    ];

    fn assign(&mut self, field: &'static str, value: BoundValue) -> Result<(), String> {
        match (field, value) {
            ("reference", BoundValue::Ref(reference)) => self.reference = reference,
            ("local", BoundValue::Flag(local)) => self.local = local,
            ("remote", BoundValue::Text(remote)) => {
                self.remote = Some(remote).filter(|r| !r.is_empty())
            }
            ("pull", BoundValue::Flag(pull)) => self.pull = pull,
            (field, value) => return self.list.assign_window(field, value),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), String> {
        require_dataset_name(&self.reference)
    }
}

/// Parameters of a dataset read (`/get`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetParams {
    pub reference: DatasetRef,
    pub format: Format,
}

impl Bindable for GetParams {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::new("reference", FieldKind::Ref).required(),
        FieldSpec::new("format", FieldKind::Format),
    ];

    fn assign(&mut self, field: &'static str, value: BoundValue) -> Result<(), String> {
        match (field, value) {
            ("reference", BoundValue::Ref(reference)) => self.reference = reference,
            ("format", BoundValue::Format(format)) => self.format = format,
            (field, value) => return Err(mismatch(field, &value)),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), String> {
        require_dataset_name(&self.reference)?;
        if self.format == Format::Zip && self.reference.selector.is_some() {
            return Err("zip format exports a whole dataset and cannot be combined with a selector".to_string());
        }
        Ok(())
    }
}

/// Parameters of a SQL query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlParams {
    pub query: String,
    pub output_format: Format,
}

impl Bindable for SqlParams {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::new("query", FieldKind::Text).required(),
        FieldSpec::new("output_format", FieldKind::Format),
    ];

    fn assign(&mut self, field: &'static str, value: BoundValue) -> Result<(), String> {
        match (field, value) {
            ("query", BoundValue::Text(query)) => self.query = query,
            ("output_format", BoundValue::Format(format)) => self.output_format = format,
            (field, value) => return Err(mismatch(field, &value)),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), String> {
        if self.query.trim().is_empty() {
            return Err("query must not be empty".to_string());
        }
        if self.output_format == Format::Zip {
            return Err("sql output_format must be json or csv".to_string());
        }
        Ok(())
    }
}

/// Parameters of a publish or unpublish request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishParams {
    pub reference: DatasetRef,
    pub remote: Option<String>,
}

impl Bindable for PublishParams {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::new("reference", FieldKind::Ref).required(),
        FieldSpec::new("remote", FieldKind::Text),
    ];

    fn assign(&mut self, field: &'static str, value: BoundValue) -> Result<(), String> {
        match (field, value) {
            ("reference", BoundValue::Ref(reference)) => self.reference = reference,
            ("remote", BoundValue::Text(remote)) => {
                self.remote = Some(remote).filter(|r| !r.is_empty())
            }
            (field, value) => return Err(mismatch(field, &value)),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), String> {
        require_dataset_name(&self.reference)
    }
}

/// Parameters of a save request; the body usually arrives as a multipart file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveParams {
    pub reference: DatasetRef,
    pub title: Option<String>,
    pub message: Option<String>,
    pub body: Option<Upload>,
}

impl SaveParams {
    pub fn into_request(self) -> (DatasetRef, SaveRequest) {
        (
            self.reference,
            SaveRequest {
                title: self.title,
                message: self.message,
                body: self.body,
            },
        )
    }
}

impl Bindable for SaveParams {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::new("reference", FieldKind::Ref).required(),
        FieldSpec::new("title", FieldKind::Text),
        FieldSpec::new("message", FieldKind::Text),
        FieldSpec::new("body", FieldKind::File),
    ];

    fn assign(&mut self, field: &'static str, value: BoundValue) -> Result<(), String> {
        match (field, value) {
            ("reference", BoundValue::Ref(reference)) => self.reference = reference,
            ("title", BoundValue::Text(title)) => self.title = Some(title),
            ("message", BoundValue::Text(message)) => self.message = Some(message),
            ("body", BoundValue::File(body)) => self.body = Some(body),
            (field, value) => return Err(mismatch(field, &value)),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), String> {
        require_dataset_name(&self.reference)?;
        if self.reference.path.is_some() || self.reference.selector.is_some() {
            return Err("save targets a dataset, not a version or selector".to_string());
        }
        Ok(())
    }
}

/// Parameters of a profile photo or poster request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileImageParams {
    pub peername: Option<String>,
    pub id: Option<String>,
}

impl Bindable for ProfileImageParams {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::new("peername", FieldKind::Text),
        FieldSpec::new("id", FieldKind::Text),
    ];

    fn assign(&mut self, field: &'static str, value: BoundValue) -> Result<(), String> {
        match (field, value) {
            ("peername", BoundValue::Text(peername)) => {
                self.peername = Some(peername).filter(|p| !p.is_empty())
            }
            ("id", BoundValue::Text(id)) => self.id = Some(id).filter(|i| !i.is_empty()),
            (field, value) => return Err(mismatch(field, &value)),
        }
        Ok(())
    }
}

fn require_dataset_name(reference: &DatasetRef) -> Result<(), String> {
    if reference.has_name() {
        Ok(())
    } else {
        Err(format!(
            "reference \"{}\" must name a dataset (username/name)",
            reference
        ))
    }
}
