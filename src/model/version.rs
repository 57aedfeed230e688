use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of a dataset's version history, as reported by the log or
/// fetch collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub username: String,
    pub name: String,
    /// Content-addressed path of this version
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    pub commit_time: DateTime<Utc>,
    pub commit_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
    pub body_rows: usize,
    pub body_size: usize,
    pub published: bool,
    /// True when the entry came from a remote rather than local history
    pub foreign: bool,
}

/// A file part received in a multipart body, or an inline payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Upload {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn is_csv(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("csv"))
            || self
                .filename
                .as_deref()
                .is_some_and(|name| name.to_ascii_lowercase().ends_with(".csv"))
    }
}

/// Input for writing a new version of a dataset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveRequest {
    pub title: Option<String>,
    pub message: Option<String>,
    pub body: Option<Upload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileImage {
    Photo,
    Poster,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub content_type: String,
    pub bytes: Vec<u8>,
}
