//! Safe URL construction for the EcoMarket API.
//!
//! Path parameters are checked for control characters and traversal
//! sequences, then percent-encoded as exactly one path segment. Query pairs
//! are form-encoded by `url`, so a value can never smuggle in an extra
//! parameter.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Characters that are rejected outright instead of escaped.
const DANGEROUS_CHARS: [char; 3] = ['\0', '\n', '\r'];

/// Traversal markers, compared against the lowercased segment.
const TRAVERSAL_PATTERNS: [&str; 6] = ["..", "%2e%2e", ".%2e", "%2e.", "..%2f", "..%5c"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("invalid base url: {0}")]
    InvalidBase(String),

    #[error("unsupported scheme '{0}', expected http or https")]
    UnsupportedScheme(String),

    #[error("dangerous character {character:?} in parameter '{param}'")]
    DangerousCharacter { param: String, character: char },

    #[error("path traversal detected in parameter '{param}': {value}")]
    PathTraversal { param: String, value: String },

    #[error("invalid resource id: {0}")]
    InvalidId(String),
}

/// Identifier accepted in resource paths: a non-negative integer or a UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Int(u64),
    Uuid(Uuid),
}

impl From<u64> for ResourceId {
    fn from(id: u64) -> Self {
        ResourceId::Int(id)
    }
}

impl From<Uuid> for ResourceId {
    fn from(id: Uuid) -> Self {
        ResourceId::Uuid(id)
    }
}

impl FromStr for ResourceId {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse::<u64>()
                .map(ResourceId::Int)
                .map_err(|_| UrlError::InvalidId(s.to_string()));
        }
        Uuid::parse_str(s)
            .map(ResourceId::Uuid)
            .map_err(|_| UrlError::InvalidId(s.to_string()))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Int(id) => write!(f, "{id}"),
            // Hyphenated lowercase regardless of how the UUID was written.
            ResourceId::Uuid(id) => write!(f, "{}", id.hyphenated()),
        }
    }
}

/// Builds absolute URLs below a fixed base.
#[derive(Debug, Clone)]
pub struct UrlBuilder {
    base: Url,
}

impl UrlBuilder {
    pub fn new(base_url: &str) -> Result<Self, UrlError> {
        let mut base = Url::parse(base_url).map_err(|e| UrlError::InvalidBase(e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(UrlError::UnsupportedScheme(base.scheme().to_string()));
        }
        if base.cannot_be_a_base() {
            return Err(UrlError::InvalidBase(base_url.to_string()));
        }
        base.set_query(None);
        base.set_fragment(None);
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Append `segments` to the base path and attach `query` pairs.
    pub fn build(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, UrlError> {
        for segment in segments {
            check_segment(segment)?;
        }
        for (name, value) in query {
            check_dangerous(name, name)?;
            check_dangerous(name, value)?;
        }

        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| UrlError::InvalidBase(self.base.to_string()))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }
}

fn check_segment(segment: &str) -> Result<(), UrlError> {
    check_dangerous("path", segment)?;
    let lowered = segment.to_ascii_lowercase();
    if TRAVERSAL_PATTERNS.iter().any(|p| lowered.contains(p)) {
        return Err(UrlError::PathTraversal {
            param: "path".to_string(),
            value: segment.to_string(),
        });
    }
    Ok(())
}

fn check_dangerous(param: &str, value: &str) -> Result<(), UrlError> {
    match value.chars().find(|c| DANGEROUS_CHARS.contains(c)) {
        Some(character) => Err(UrlError::DangerousCharacter {
            param: param.to_string(),
            character,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> UrlBuilder {
        UrlBuilder::new("http://localhost:3000/api/").unwrap()
    }

    #[test]
    fn joins_segments_below_base_path() {
        let url = builder().build(&["productos", "42"], &[]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/productos/42");
    }

    #[test]
    fn base_without_path_gets_single_slash() {
        let b = UrlBuilder::new("http://localhost:3000").unwrap();
        let url = b.build(&["categorias"], &[]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/categorias");
    }

    #[test]
    fn slash_inside_segment_is_escaped() {
        let url = builder().build(&["productos", "a/b"], &[]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/productos/a%2Fb");
    }

    #[test]
    fn query_values_cannot_inject_parameters() {
        let url = builder()
            .build(&["productos"], &[("categoria", "frutas&admin=true")])
            .unwrap();
        assert_eq!(url.query(), Some("categoria=frutas%26admin%3Dtrue"));
        assert_eq!(url.query_pairs().count(), 1);
    }

    #[test]
    fn traversal_is_rejected() {
        for value in ["..", "../etc/passwd", "%2E%2E", "..%2f", ".%2e"] {
            let err = builder().build(&["productos", value], &[]).unwrap_err();
            assert!(matches!(err, UrlError::PathTraversal { .. }), "{value}");
        }
    }

    #[test]
    fn control_characters_are_rejected() {
        let err = builder().build(&["productos", "1\r\nHost: evil"], &[]).unwrap_err();
        assert!(matches!(err, UrlError::DangerousCharacter { character: '\r', .. }));

        let err = builder().build(&["productos"], &[("q", "a\0b")]).unwrap_err();
        assert!(matches!(err, UrlError::DangerousCharacter { character: '\0', .. }));
    }

    #[test]
    fn rejects_non_http_schemes() {
        let err = UrlBuilder::new("ftp://example.com").unwrap_err();
        assert_eq!(err, UrlError::UnsupportedScheme("ftp".to_string()));
        assert!(matches!(UrlBuilder::new("not a url"), Err(UrlError::InvalidBase(_))));
    }

    #[test]
    fn resource_id_parsing() {
        assert_eq!("123".parse::<ResourceId>().unwrap(), ResourceId::Int(123));
        assert!("-1".parse::<ResourceId>().is_err());
        assert!("abc".parse::<ResourceId>().is_err());

        let id: ResourceId = "550E8400-E29B-41D4-A716-446655440000".parse().unwrap();
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }
}
