use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Username alias that stands for the caller's own identity.
pub const OWNER_ALIAS: &str = "me";

/// Path segment that clients may use in place of `@` in a URL path.
const VERSION_MARKER_SEGMENT: &str = "at";

/// A structured dataset reference: `username/name[@path][/selector]`
///
/// Built once per request from the request path and never mutated by the
/// layers that consume it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRef {
    pub username: String,
    /// Empty for username-only references
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Version path written after `@`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Sub-component of the dataset (e.g. `meta`, `body`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefError {
    #[error("unexpected character at position {position}: '{character}'")]
    UnexpectedCharacter {
        fragment: String,
        position: usize,
        character: char,
    },
    #[error("{reason} at position {position}: '{fragment}'")]
    Malformed {
        fragment: String,
        position: usize,
        reason: &'static str,
    },
    #[error("username \"{0}\" is a reserved alias and cannot name a dataset owner here")]
    ReservedUsername(String),
}

impl RefError {
    /// Byte offset of the violation, if the error is positional
    pub fn position(&self) -> Option<usize> {
        match self {
            RefError::UnexpectedCharacter { position, .. } | RefError::Malformed { position, .. } => {
                Some(*position)
            }
            RefError::ReservedUsername(_) => None,
        }
    }
}

impl DatasetRef {
    pub fn new(username: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            name: name.into(),
            path: None,
            selector: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn has_name(&self) -> bool {
        !self.name.is_empty()
    }

    /// `username/name` without version or selector
    pub fn alias(&self) -> String {
        if self.has_name() {
            format!("{}/{}", self.username, self.name)
        } else {
            self.username.clone()
        }
    }

    /// Parse a canonical reference string. The owner alias is always rejected.
    pub fn parse(input: &str) -> Result<Self, RefError> {
        let mut cursor = Cursor::new(input);

        let username = cursor.take_while(is_identifier_byte);
        if username.is_empty() {
            return Err(cursor.fail("empty reference"));
        }
        if username == OWNER_ALIAS {
            return Err(RefError::ReservedUsername(username.to_string()));
        }

        let mut reference = DatasetRef {
            username: username.to_string(),
            ..Default::default()
        };
        if cursor.at_end() {
            return Ok(reference);
        }
        if !cursor.eat(b'/') {
            return Err(cursor.unexpected());
        }

        let name = cursor.take_while(is_identifier_byte);
        if name.is_empty() {
            return Err(cursor.fail("missing dataset name"));
        }
        reference.name = name.to_string();

        if cursor.eat(b'@') {
            reference.path = Some(cursor.version_path()?);
        }
        if cursor.at_end() {
            return Ok(reference);
        }
        if !cursor.eat(b'/') {
            return Err(cursor.unexpected());
        }

        let selector_start = cursor.pos;
        let selector = cursor.take_while(is_selector_byte);
        if selector.is_empty() {
            return Err(cursor.fail("missing selector"));
        }
        if !cursor.at_end() {
            return Err(cursor.unexpected());
        }
        if selector.split('/').any(str::is_empty) {
            return Err(RefError::Malformed {
                fragment: selector.to_string(),
                position: selector_start,
                reason: "empty selector segment",
            });
        }
        reference.selector = Some(selector.to_string());

        Ok(reference)
    }

    /// Parse a reference taken from an HTTP path: strips a query string,
    /// decodes the `/at` version marker and trims the surrounding slashes.
    pub fn from_http_path(raw: &str) -> Result<Self, RefError> {
        Self::parse(&normalize_http_path(raw))
    }

    /// Like [`DatasetRef::from_http_path`], substituting the owner alias with a
    /// concrete peername when the caller supplied one.
    pub fn resolve(raw: &str, owner: Option<&str>) -> Result<Self, RefError> {
        let normalized = normalize_http_path(raw);
        match owner {
            Some(peername) if !peername.is_empty() => {
                Self::parse(&substitute_owner(&normalized, peername))
            }
            _ => Self::parse(&normalized),
        }
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)?;
        if self.has_name() {
            write!(f, "/{}", self.name)?;
        }
        if let Some(path) = &self.path {
            write!(f, "@{}", path)?;
        }
        if let Some(selector) = &self.selector {
            write!(f, "/{}", selector)?;
        }
        Ok(())
    }
}

impl FromStr for DatasetRef {
    type Err = RefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Bring a transport path into canonical reference form.
pub fn normalize_http_path(raw: &str) -> String {
    let without_query = raw.split_once('?').map_or(raw, |(path, _)| path);
    let decoded = replace_version_marker(without_query);
    let trimmed = decoded.strip_prefix('/').unwrap_or(&decoded);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    trimmed.to_string()
}

/// Replace the first `at` segment that follows the username and name with `@`.
fn replace_version_marker(path: &str) -> String {
    let (leading, body) = match path.strip_prefix('/') {
        Some(rest) => ("/", rest),
        None => ("", path),
    };
    let segments: Vec<&str> = body.split('/').collect();
    let Some(index) = segments
        .iter()
        .skip(2)
        .position(|segment| *segment == VERSION_MARKER_SEGMENT)
        .map(|found| found + 2)
    else {
        return path.to_string();
    };

    let head = segments[..index].join("/");
    let tail = segments[index + 1..].join("/");
    if tail.is_empty() {
        format!("{leading}{head}@")
    } else {
        format!("{leading}{head}@/{tail}")
    }
}

fn substitute_owner(normalized: &str, peername: &str) -> String {
    match normalized.strip_prefix(OWNER_ALIAS) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => format!("{peername}{rest}"),
        _ => normalized.to_string(),
    }
}

fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

fn is_path_byte(b: u8) -> bool {
    is_identifier_byte(b) || b == b'.'
}

fn is_selector_byte(b: u8) -> bool {
    is_path_byte(b) || b == b'/'
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    // Predicates only accept ASCII, so `pos` always lands on a char boundary.
    fn take_while(&mut self, accept: fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(accept) {
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    fn version_path(&mut self) -> Result<String, RefError> {
        let start = self.pos;
        if self.eat(b'/') {
            if self.take_while(is_path_byte).is_empty() || !self.eat(b'/') {
                return Err(self.fail("incomplete version path"));
            }
            if self.take_while(is_path_byte).is_empty() {
                return Err(self.fail("incomplete version path"));
            }
        } else if self.take_while(is_path_byte).is_empty() {
            return Err(self.fail("missing version path after '@'"));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn fail(&self, reason: &'static str) -> RefError {
        if self.at_end() {
            RefError::Malformed {
                fragment: self.input.to_string(),
                position: self.pos,
                reason,
            }
        } else {
            self.unexpected()
        }
    }

    fn unexpected(&self) -> RefError {
        let fragment = &self.input[self.pos..];
        RefError::UnexpectedCharacter {
            fragment: fragment.to_string(),
            position: self.pos,
            character: fragment.chars().next().unwrap_or('\0'),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_reference() {
        let reference = DatasetRef::parse("peer/cities@/ipfs/QmHash/body").unwrap();
        assert_eq!(reference.username, "peer");
        assert_eq!(reference.name, "cities");
        assert_eq!(reference.path.as_deref(), Some("/ipfs/QmHash"));
        assert_eq!(reference.selector.as_deref(), Some("body"));
    }

    #[test]
    fn test_parse_short_version_and_nested_selector() {
        let reference = DatasetRef::parse("peer/cities@QmHash/structure/schema").unwrap();
        assert_eq!(reference.path.as_deref(), Some("QmHash"));
        assert_eq!(reference.selector.as_deref(), Some("structure/schema"));
    }

    #[test]
    fn test_username_only_reference() {
        let reference = DatasetRef::parse("peer").unwrap();
        assert_eq!(reference.username, "peer");
        assert!(!reference.has_name());
        assert_eq!(reference.to_string(), "peer");
    }

    #[test]
    fn test_canonical_round_trip() {
        for canonical in [
            "peer/my_ds",
            "a-b/c_d-1",
            "peer/ds@/ipfs/QmAbc",
            "peer/ds@QmAbc/meta",
            "peer/ds/body.csv",
        ] {
            let reference = DatasetRef::parse(canonical).unwrap();
            assert_eq!(reference.to_string(), canonical);
            assert_eq!(canonical.parse::<DatasetRef>().unwrap(), reference);
        }
    }

    #[test]
    fn test_unexpected_character_position() {
        let err = DatasetRef::parse("peer/my+ds").unwrap_err();
        assert_eq!(err.to_string(), "unexpected character at position 7: '+'");
        match err {
            RefError::UnexpectedCharacter {
                position,
                character,
                fragment,
            } => {
                assert_eq!(position, 7);
                assert_eq!(character, '+');
                assert_eq!(fragment, "+ds");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_multibyte_character_is_reported_whole() {
        let err = DatasetRef::parse("peer/dé").unwrap_err();
        assert_eq!(err.position(), Some(6));
        assert_eq!(err.to_string(), "unexpected character at position 6: 'é'");
    }

    #[test]
    fn test_owner_alias_is_reserved() {
        let err = DatasetRef::parse("me/my_ds").unwrap_err();
        assert_eq!(err, RefError::ReservedUsername("me".to_string()));
        // Only the exact alias is reserved
        assert!(DatasetRef::parse("meg/my_ds").is_ok());
    }

    #[test]
    fn test_owner_alias_substitution() {
        let reference = DatasetRef::resolve("/me/my_ds/body", Some("peer")).unwrap();
        assert_eq!(reference.to_string(), "peer/my_ds/body");

        let err = DatasetRef::resolve("/me/my_ds", None).unwrap_err();
        assert!(matches!(err, RefError::ReservedUsername(_)));
    }

    #[test]
    fn test_malformed_references() {
        assert!(matches!(
            DatasetRef::parse("").unwrap_err(),
            RefError::Malformed { reason: "empty reference", .. }
        ));
        assert!(matches!(
            DatasetRef::parse("peer/").unwrap_err(),
            RefError::Malformed { reason: "missing dataset name", position: 5, .. }
        ));
        assert!(matches!(
            DatasetRef::parse("peer/ds@").unwrap_err(),
            RefError::Malformed { position: 8, .. }
        ));
        assert_eq!(DatasetRef::parse("peer@ds").unwrap_err().position(), Some(4));
        assert_eq!(DatasetRef::parse("peer/ds/body//x").unwrap_err().position(), Some(8));
    }

    #[test]
    fn test_malformed_message_names_fragment() {
        let err = DatasetRef::parse("peer/ds/body//x").unwrap_err();
        assert_eq!(err.to_string(), "empty selector segment at position 8: 'body//x'");

        let err = DatasetRef::parse("peer/").unwrap_err();
        assert_eq!(err.to_string(), "missing dataset name at position 5: 'peer/'");
    }

    #[test]
    fn test_http_path_normalization() {
        assert_eq!(normalize_http_path("/peer/ds/"), "peer/ds");
        assert_eq!(normalize_http_path("/peer/ds?limit=10"), "peer/ds");
        assert_eq!(
            normalize_http_path("/peer/ds/at/ipfs/QmHash/body"),
            "peer/ds@/ipfs/QmHash/body"
        );
        // A dataset literally named "at" is not a version marker
        assert_eq!(normalize_http_path("/peer/at"), "peer/at");
        // Only the first marker is decoded
        assert_eq!(
            normalize_http_path("/peer/ds/at/ipfs/at"),
            "peer/ds@/ipfs/at"
        );
    }

    #[test]
    fn test_from_http_path() {
        let reference = DatasetRef::from_http_path("/peer/ds/at/ipfs/QmHash/meta?x=1").unwrap();
        assert_eq!(reference.path.as_deref(), Some("/ipfs/QmHash"));
        assert_eq!(reference.selector.as_deref(), Some("meta"));
    }
}
