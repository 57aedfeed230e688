use serde::{Deserialize, Serialize};
use std::fmt;

/// Response representation a client can ask for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Json,
    Csv,
    Zip,
}

impl Format {
    /// Look up a format by its short name (`json`, `csv`, `zip`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Format::Json),
            "csv" => Some(Format::Csv),
            "zip" => Some(Format::Zip),
            _ => None,
        }
    }

    /// Look up a format by media type, ignoring parameters such as `q=`
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let essence = media_type.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "application/json" | "text/json" => Some(Format::Json),
            "text/csv" | "application/csv" => Some(Format::Csv),
            "application/zip" | "application/x-zip-compressed" => Some(Format::Zip),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Csv => "csv",
            Format::Zip => "zip",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Csv => "text/csv; charset=utf-8",
            Format::Zip => "application/zip",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name_and_media_type() {
        assert_eq!(Format::from_name("CSV"), Some(Format::Csv));
        assert_eq!(Format::from_name("xml"), None);
        assert_eq!(Format::from_media_type("text/csv; q=0.9"), Some(Format::Csv));
        assert_eq!(Format::from_media_type("*/*"), None);
        assert_eq!(
            serde_json::to_string(&Format::Zip).unwrap(),
            "\"zip\""
        );
    }
}
