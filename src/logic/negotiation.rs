use crate::error::ApiError;
use crate::model::Format;

/// Selector a header-only CSV request falls back to
pub const BODY_SELECTOR: &str = "body";

/// Where a resolved format came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatSource {
    Default,
    Explicit,
    Suffix,
    Header,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub format: Format,
    pub source: FormatSource,
    /// Selector with any format suffix removed
    pub selector: Option<String>,
}

/// One media range of an `Accept` header with its `q` weight
struct MediaRange<'a> {
    media_type: &'a str,
    quality: f32,
}

/// Media ranges the client accepts; `q=0` entries are refusals and dropped
fn accepted_ranges(accept: &str) -> impl Iterator<Item = MediaRange<'_>> {
    accept
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let media_type = parts.next()?.trim();
            let quality = parts
                .filter_map(|param| param.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            (!media_type.is_empty()).then_some(MediaRange {
                media_type,
                quality,
            })
        })
        .filter(|range| range.quality > 0.0)
}

/// Preferred known format in an `Accept` header: highest `q` wins, ties go
/// to the first listed.
pub fn format_from_accept(accept: &str) -> Option<Format> {
    accepted_ranges(accept)
        .filter_map(|range| Format::from_media_type(range.media_type).map(|f| (f, range.quality)))
        .fold(None, |best: Option<(Format, f32)>, (format, quality)| match best {
            Some((_, best_quality)) if best_quality >= quality => best,
            _ => Some((format, quality)),
        })
        .map(|(format, _)| format)
}

/// Whether an `Accept` header admits `format`, by name or through `*/*` or
/// a `type/*` range.
pub fn accepts(accept: &str, format: Format) -> bool {
    let top_level = format.content_type().split('/').next().unwrap_or_default();
    accepted_ranges(accept).any(|range| {
        let media_type = range.media_type.to_ascii_lowercase();
        match media_type.strip_suffix("/*") {
            Some("*") => true,
            Some(range_top) => range_top == top_level,
            None => Format::from_media_type(&media_type) == Some(format),
        }
    })
}

/// Split a known format suffix off a selector: `body.csv` -> (`body`, `csv`).
///
/// Unknown suffixes stay part of the selector, since dotted selectors such as
/// `meta.title` address nested fields.
pub fn split_selector_suffix(selector: &str) -> (&str, Option<&str>) {
    match selector.rsplit_once('.') {
        Some((base, ext))
            if !base.is_empty() && !ext.contains('/') && Format::from_name(ext).is_some() =>
        {
            (base, Some(ext))
        }
        _ => (selector, None),
    }
}

/// Resolve the output format from an explicit parameter, a selector suffix and
/// an `Accept` header.
pub fn resolve(
    explicit: Option<&str>,
    suffix: Option<&str>,
    accept: Option<&str>,
) -> Result<(Format, FormatSource), ApiError> {
    let explicit = explicit.map(str::trim).filter(|name| !name.is_empty());
    let requested = match explicit {
        Some(name) => {
            let format = Format::from_name(name).ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "unknown format \"{}\", expected json, csv or zip",
                    name
                ))
            })?;
            Some((format, name, FormatSource::Explicit))
        }
        None => None,
    };
    let from_suffix = suffix.and_then(|ext| Format::from_name(ext).map(|format| (format, ext)));

    let chosen = match (requested, from_suffix) {
        (Some((format, name, _)), Some((suffix_format, ext))) if format != suffix_format => {
            return Err(ApiError::FormatConflict {
                requested: name.to_string(),
                other: format!("suffix \".{}\"", ext),
            });
        }
        (Some(requested), _) => Some(requested),
        (None, Some((format, ext))) => Some((format, ext, FormatSource::Suffix)),
        (None, None) => None,
    };

    let from_header = accept.and_then(|raw| format_from_accept(raw).map(|format| (format, raw)));

    match (chosen, from_header) {
        // A header only conflicts when it names a known format and does not
        // admit the requested one anywhere in its list
        (Some((format, name, _)), Some((_, raw))) if !accepts(raw, format) => {
            Err(ApiError::FormatConflict {
                requested: name.to_string(),
                other: format!("header \"Accept: {}\"", raw.trim()),
            })
        }
        (Some((format, _, source)), _) => Ok((format, source)),
        (None, Some((format, _))) => Ok((format, FormatSource::Header)),
        (None, None) => Ok((Format::Json, FormatSource::Default)),
    }
}

/// Resolve the format for a request that may address a selector.
///
/// A CSV request driven only by the `Accept` header targets the body when no
/// selector was given.
pub fn negotiate(
    explicit: Option<&str>,
    selector: Option<&str>,
    accept: Option<&str>,
) -> Result<Negotiated, ApiError> {
    let (selector, suffix) = match selector {
        Some(selector) => {
            let (base, suffix) = split_selector_suffix(selector);
            (Some(base), suffix)
        }
        None => (None, None),
    };
    let (format, source) = resolve(explicit, suffix, accept)?;

    let selector = match selector {
        None if source == FormatSource::Header && format == Format::Csv => {
            Some(BODY_SELECTOR.to_string())
        }
        selector => selector.map(str::to_string),
    };

    Ok(Negotiated {
        format,
        source,
        selector,
    })
}
