use std::fmt;

use serde::{Deserialize, Serialize};

use super::fields::FieldSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    #[default]
    Pending,
    Ok,
    Error,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Ok => "ok",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub identifier: String,
    pub status: EntryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub fields: FieldSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One resolved (or failed) identifier within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,
    pub content: String,
    pub metadata: EntryMetadata,
}

pub const UNKNOWN_KEY: &str = "unknown";

impl Entry {
    pub fn pending(identifier: impl Into<String>) -> Self {
        Self {
            key: String::new(),
            content: String::new(),
            metadata: EntryMetadata {
                identifier: identifier.into(),
                ..Default::default()
            },
        }
    }

    pub fn resolved(
        identifier: impl Into<String>,
        key: impl Into<String>,
        content: impl Into<String>,
        source: impl Into<String>,
        fields: FieldSet,
    ) -> Self {
        Self {
            key: key.into(),
            content: content.into(),
            metadata: EntryMetadata {
                identifier: identifier.into(),
                status: EntryStatus::Ok,
                source: Some(source.into()),
                fields,
                error: None,
            },
        }
    }

    pub fn failed(identifier: impl Into<String>, error: impl fmt::Display) -> Self {
        let identifier = identifier.into();
        let error = error.to_string();
        Self {
            key: UNKNOWN_KEY.to_string(),
            content: format!("Error: {identifier} → {error}"),
            metadata: EntryMetadata {
                identifier,
                status: EntryStatus::Error,
                source: None,
                fields: FieldSet::default(),
                error: Some(error),
            },
        }
    }

    pub fn status(&self) -> EntryStatus {
        self.metadata.status
    }

    pub fn is_ok(&self) -> bool {
        self.metadata.status == EntryStatus::Ok
    }

    pub fn has_error(&self) -> bool {
        self.metadata.status == EntryStatus::Error
    }

    pub fn identifier(&self) -> &str {
        &self.metadata.identifier
    }

    /// The record's own DOI field, else the identifier it was resolved from.
    pub fn doi(&self) -> &str {
        self.metadata
            .fields
            .non_empty("doi")
            .unwrap_or(&self.metadata.identifier)
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata.fields.non_empty("title")
    }

    pub fn year(&self) -> Option<u16> {
        self.metadata.fields.year_digits()?.parse().ok()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.metadata.error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_entry_shape() {
        let entry = Entry::failed("10.1000/x", "HTTP 500");
        assert_eq!(entry.key, UNKNOWN_KEY);
        assert_eq!(entry.content, "Error: 10.1000/x → HTTP 500");
        assert!(entry.has_error());
        assert_eq!(entry.error_message(), Some("HTTP 500"));
        assert_eq!(entry.status().to_string(), "error");
    }

    #[test]
    fn doi_prefers_record_field() {
        let mut fields = FieldSet::new();
        fields.set("doi", "10.1000/ABC");
        fields.set("year", "2021");
        let entry = Entry::resolved("10.1000/abc", "k", "@misc{k,}", "Crossref", fields);
        assert_eq!(entry.doi(), "10.1000/ABC");
        assert_eq!(entry.year(), Some(2021));

        let bare = Entry::pending("10.1000/zzz");
        assert_eq!(bare.doi(), "10.1000/zzz");
        assert_eq!(bare.status(), EntryStatus::Pending);
    }
}
