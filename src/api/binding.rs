use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Multipart, Path, Query, Request},
    http::header::{ACCEPT, CONTENT_TYPE},
    Form,
};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::ApiError;
use crate::logic::{negotiation, pagination};
use crate::model::{Bindable, BoundValue, DatasetRef, FieldKind, FieldSpec, OwnerContext, Upload};

/// Path capture that carries the dataset reference on every routed endpoint
pub const REFERENCE_CAPTURE: &str = "reference";

/// A body value before coercion to its declared field type
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    Json(Value),
    File(Upload),
}

/// Everything a request contributes to parameter binding, already pulled
/// out of the transport.
#[derive(Debug, Clone, Default)]
pub struct RawInput {
    /// Wildcard path capture holding the reference
    pub reference: Option<String>,
    /// Peername substituted for the `me` alias
    pub owner: Option<String>,
    pub query: Vec<(String, String)>,
    /// Structured body values; these win over query values of the same name
    pub body: Vec<(String, RawValue)>,
    pub accept: Option<String>,
}

/// Fill a parameter shape from raw request input.
///
/// Fields are visited in manifest order. The reference is parsed first so the
/// format field can negotiate against its selector, but it is assigned last
/// with the selector as negotiation left it.
pub fn bind<T: Bindable>(input: RawInput) -> Result<T, ApiError> {
    let RawInput {
        reference: path_reference,
        owner,
        query,
        body,
        accept,
    } = input;

    let mut values: HashMap<String, RawValue> = query
        .into_iter()
        .map(|(key, value)| (key, RawValue::Text(value)))
        .collect();
    // A null body value is absent and leaves the query value in place
    values.extend(
        body.into_iter()
            .filter(|(_, value)| !matches!(value, RawValue::Json(Value::Null))),
    );

    let ref_field = T::FIELDS.iter().find(|field| field.kind == FieldKind::Ref);
    let mut reference = match ref_field {
        Some(field) => parse_reference(field, path_reference, &mut values, owner.as_deref())?,
        None => None,
    };

    let mut target = T::default();
    for field in T::FIELDS {
        let raw = values.remove(field.name);
        let value = match field.kind {
            FieldKind::Ref => continue,
            FieldKind::Format => {
                let explicit = raw.map(|raw| text(field.name, raw)).transpose()?;
                let selector = reference.as_ref().and_then(|r| r.selector.as_deref());
                let negotiated =
                    negotiation::negotiate(explicit.as_deref(), selector, accept.as_deref())?;
                if let Some(reference) = reference.as_mut() {
                    reference.selector = negotiated.selector;
                }
                Some(BoundValue::Format(negotiated.format))
            }
            FieldKind::Limit => {
                let limit = raw.map(|raw| int(field.name, raw)).transpose()?;
                let (limit, _) = pagination::clamp(limit.unwrap_or(0), 0);
                Some(BoundValue::Count(limit))
            }
            FieldKind::Offset => {
                let offset = raw.map(|raw| int(field.name, raw)).transpose()?;
                let (_, offset) = pagination::clamp(1, offset.unwrap_or(0));
                Some(BoundValue::Count(offset))
            }
            FieldKind::Text => raw.map(|raw| text(field.name, raw).map(BoundValue::Text)).transpose()?,
            FieldKind::Flag => raw.map(|raw| flag(field.name, raw).map(BoundValue::Flag)).transpose()?,
            FieldKind::File => raw.map(|raw| BoundValue::File(upload(raw))),
        };

        match value {
            Some(value) => target.assign(field.name, value).map_err(ApiError::BadRequest)?,
            None if field.required => return Err(missing(field)),
            None => {}
        }
    }

    if let (Some(field), Some(reference)) = (ref_field, reference) {
        target
            .assign(field.name, BoundValue::Ref(reference))
            .map_err(ApiError::BadRequest)?;
    }
    target.validate().map_err(ApiError::BadRequest)?;

    Ok(target)
}

fn parse_reference(
    field: &FieldSpec,
    path_reference: Option<String>,
    values: &mut HashMap<String, RawValue>,
    owner: Option<&str>,
) -> Result<Option<DatasetRef>, ApiError> {
    let raw = match path_reference.filter(|raw| !raw.trim_matches('/').is_empty()) {
        Some(raw) => Some(raw),
        None => values
            .remove(field.name)
            .map(|raw| text(field.name, raw))
            .transpose()?
            .filter(|raw| !raw.is_empty()),
    };
    match raw {
        Some(raw) => Ok(Some(DatasetRef::resolve(&raw, owner)?)),
        None if field.required => Err(ApiError::BadRequest(
            "missing dataset reference".to_string(),
        )),
        None => Ok(None),
    }
}

fn missing(field: &FieldSpec) -> ApiError {
    ApiError::BadRequest(format!("missing required parameter \"{}\"", field.name))
}

fn text(field: &str, raw: RawValue) -> Result<String, ApiError> {
    match raw {
        RawValue::Text(text) | RawValue::Json(Value::String(text)) => Ok(text),
        RawValue::Json(value @ (Value::Number(_) | Value::Bool(_))) => Ok(value.to_string()),
        RawValue::Json(_) => Err(ApiError::BadRequest(format!(
            "parameter \"{}\" must be a string",
            field
        ))),
        RawValue::File(upload) => String::from_utf8(upload.bytes).map_err(|_| {
            ApiError::BadRequest(format!("parameter \"{}\" must be UTF-8 text", field))
        }),
    }
}

fn flag(field: &str, raw: RawValue) -> Result<bool, ApiError> {
    let parsed = match &raw {
        RawValue::Json(Value::Bool(value)) => Some(*value),
        RawValue::Json(Value::Number(n)) => n.as_i64().and_then(|n| match n {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        }),
        RawValue::Text(text) | RawValue::Json(Value::String(text)) => {
            match text.trim().to_ascii_lowercase().as_str() {
                "" | "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            }
        }
        _ => None,
    };
    parsed.ok_or_else(|| {
        ApiError::BadRequest(format!("parameter \"{}\" must be a boolean", field))
    })
}

fn int(field: &str, raw: RawValue) -> Result<i64, ApiError> {
    let parsed = match &raw {
        RawValue::Json(Value::Number(n)) => n.as_i64(),
        RawValue::Text(text) | RawValue::Json(Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        ApiError::BadRequest(format!("parameter \"{}\" must be an integer", field))
    })
}

fn upload(raw: RawValue) -> Upload {
    match raw {
        RawValue::File(upload) => upload,
        RawValue::Text(text) => Upload {
            bytes: text.into_bytes(),
            ..Default::default()
        },
        RawValue::Json(value) => Upload {
            filename: None,
            content_type: Some("application/json".to_string()),
            bytes: value.to_string().into_bytes(),
        },
    }
}

/// Extractor that binds a [`Bindable`] shape from path, query, body and headers
#[derive(Debug)]
pub struct Bound<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Bound<T>
where
    S: Send + Sync,
    T: Bindable,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let (mut parts, body) = req.into_parts();

        let owner = OwnerContext::from_request_parts(&mut parts, state)
            .await
            .unwrap_or_else(|never| match never {});

        let reference = if T::FIELDS.iter().any(|field| field.kind == FieldKind::Ref) {
            let Path(mut captures) =
                Path::<HashMap<String, String>>::from_request_parts(&mut parts, state)
                    .await
                    .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
            captures.remove(REFERENCE_CAPTURE)
        } else {
            None
        };

        let Query(query) = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

        let accept = header_text(&parts.headers, ACCEPT.as_str());
        let content_type = header_text(&parts.headers, CONTENT_TYPE.as_str()).unwrap_or_default();

        let req = Request::from_parts(parts, body);
        let body = read_body(req, state, &content_type).await?;

        let input = RawInput {
            reference,
            owner: owner.peername,
            query,
            body,
            accept,
        };
        log::debug!(
            "binding {} ({} query, {} body values)",
            std::any::type_name::<T>(),
            input.query.len(),
            input.body.len()
        );

        bind(input).map(Bound)
    }
}

fn header_text(headers: &axum::http::HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Structured body values; bodies of any other content type are not bound
async fn read_body<S: Send + Sync>(
    req: Request,
    state: &S,
    content_type: &str,
) -> Result<Vec<(String, RawValue)>, ApiError> {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match media_type.as_str() {
        "application/json" => {
            let bytes = Bytes::from_request(req, state)
                .await
                .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
            if bytes.iter().all(u8::is_ascii_whitespace) {
                return Ok(Vec::new());
            }
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(object)) => Ok(object
                    .into_iter()
                    .map(|(key, value)| (key, RawValue::Json(value)))
                    .collect()),
                Ok(_) => Err(ApiError::BadRequest(
                    "request body must be a JSON object".to_string(),
                )),
                Err(err) => Err(ApiError::BadRequest(format!("invalid JSON body: {}", err))),
            }
        }
        "application/x-www-form-urlencoded" => {
            let Form(fields) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
            Ok(fields
                .into_iter()
                .map(|(key, value)| (key, RawValue::Text(value)))
                .collect())
        }
        "multipart/form-data" => {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
            read_multipart(multipart).await
        }
        _ => Ok(Vec::new()),
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<Vec<(String, RawValue)>, ApiError> {
    let mut values = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(err.body_text()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        let value = if filename.is_some() {
            let bytes = field
                .bytes()
                .await
                .map_err(|err| ApiError::BadRequest(err.body_text()))?;
            RawValue::File(Upload {
                filename,
                content_type,
                bytes: bytes.to_vec(),
            })
        } else {
            let text = field
                .text()
                .await
                .map_err(|err| ApiError::BadRequest(err.body_text()))?;
            RawValue::Text(text)
        };
        values.push((name, value));
    }
    Ok(values)
}
