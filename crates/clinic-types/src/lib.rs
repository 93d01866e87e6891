//! Validated primitives shared across the clinic notification crates.
//!
//! Values crossing the document-store boundary arrive as untyped strings. The wrappers here are
//! constructed once at that boundary so the rest of the code can rely on them being well formed.

use serde::{Deserialize, Serialize};

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input contained a character not allowed in a document identifier
    #[error("Identifier contains a forbidden character: {0:?}")]
    ForbiddenChar(char),
    /// The input exceeded the maximum allowed length
    #[error("Text exceeds maximum length of {0} characters")]
    TooLong(usize),
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// Returns `Err(TextError::Empty)` if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Opaque identifier assigned to a document by the store.
///
/// The store decides the format and the value is kept byte for byte, whitespace included. The
/// only constraints enforced here are the ones that would break path-style addressing
/// (`notifications/{id}`): not blank, no slashes or control characters, bounded length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    pub const MAX_LEN: usize = 1500;

    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let raw = input.as_ref();
        if raw.trim().is_empty() {
            return Err(TextError::Empty);
        }
        if raw.len() > Self::MAX_LEN {
            return Err(TextError::TooLong(Self::MAX_LEN));
        }
        if let Some(c) = raw.chars().find(|c| *c == '/' || c.is_control()) {
            return Err(TextError::ForbiddenChar(c));
        }
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DocumentId {
    type Error = TextError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DocumentId> for String {
    fn from(value: DocumentId) -> Self {
        value.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_text_trims_input() {
        let text = NonEmptyText::new("  Dental  ").unwrap();
        assert_eq!(text.as_str(), "Dental");
    }

    #[test]
    fn test_non_empty_text_rejects_whitespace_only() {
        assert_eq!(NonEmptyText::new("   "), Err(TextError::Empty));
    }

    #[test]
    fn test_document_id_keeps_surrounding_whitespace() {
        let id = DocumentId::parse(" n-42 ").unwrap();
        assert_eq!(id.as_str(), " n-42 ");
        assert_ne!(id, DocumentId::parse("n-42").unwrap());

        let back: DocumentId = serde_json::from_str(&serde_json::to_string(&id).unwrap()).unwrap();
        assert_eq!(back.as_str(), " n-42 ");
    }

    #[test]
    fn test_document_id_rejects_blank_input() {
        assert_eq!(DocumentId::parse("  "), Err(TextError::Empty));
    }

    #[test]
    fn test_document_id_rejects_slash() {
        assert_eq!(
            DocumentId::parse("notifications/abc"),
            Err(TextError::ForbiddenChar('/'))
        );
    }

    #[test]
    fn test_document_id_rejects_overlong_input() {
        let long = "a".repeat(DocumentId::MAX_LEN + 1);
        assert_eq!(
            DocumentId::parse(long),
            Err(TextError::TooLong(DocumentId::MAX_LEN))
        );
    }

    #[test]
    fn test_document_id_deserialises_through_validation() {
        let id: DocumentId = serde_json::from_str("\"n-42\"").unwrap();
        assert_eq!(id.as_str(), "n-42");

        let bad = serde_json::from_str::<DocumentId>("\"\"");
        assert!(bad.is_err());
    }
}
