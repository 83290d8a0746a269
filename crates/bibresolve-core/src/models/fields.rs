use serde::{Deserialize, Serialize};

/// Field values extracted from one bibliographic record.
///
/// Well-known fields get typed slots; anything else lands in `extra`, kept in
/// the order it was first seen so unknown fields pass through unchanged.
/// Lookups by name are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSet {
    pub entry_type: Option<String>,
    pub key: Option<String>,

    pub title: Option<String>,
    pub author: Option<String>,
    pub journal: Option<String>,
    pub journal_full: Option<String>,
    pub journal_abbrev: Option<String>,
    pub volume: Option<String>,
    pub number: Option<String>,
    pub pages: Option<String>,
    pub year: Option<String>,
    pub month: Option<String>,
    pub publisher: Option<String>,
    pub doi: Option<String>,
    pub issn: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<(String, String)>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, name: &str) -> Option<&Option<String>> {
        let slot = match name {
            "entry_type" => &self.entry_type,
            "key" => &self.key,
            "title" => &self.title,
            "author" => &self.author,
            "journal" => &self.journal,
            "journal_full" => &self.journal_full,
            "journal_abbrev" => &self.journal_abbrev,
            "volume" => &self.volume,
            "number" => &self.number,
            "pages" => &self.pages,
            "year" => &self.year,
            "month" => &self.month,
            "publisher" => &self.publisher,
            "doi" => &self.doi,
            "issn" => &self.issn,
            "url" => &self.url,
            "abstract" => &self.abstract_text,
            _ => return None,
        };
        Some(slot)
    }

    fn slot_mut(&mut self, name: &str) -> Option<&mut Option<String>> {
        let slot = match name {
            "entry_type" => &mut self.entry_type,
            "key" => &mut self.key,
            "title" => &mut self.title,
            "author" => &mut self.author,
            "journal" => &mut self.journal,
            "journal_full" => &mut self.journal_full,
            "journal_abbrev" => &mut self.journal_abbrev,
            "volume" => &mut self.volume,
            "number" => &mut self.number,
            "pages" => &mut self.pages,
            "year" => &mut self.year,
            "month" => &mut self.month,
            "publisher" => &mut self.publisher,
            "doi" => &mut self.doi,
            "issn" => &mut self.issn,
            "url" => &mut self.url,
            "abstract" => &mut self.abstract_text,
            _ => return None,
        };
        Some(slot)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        match self.slot(&name) {
            Some(slot) => slot.as_deref(),
            None => self
                .extra
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.as_str()),
        }
    }

    /// Insert or replace a field. The name is lowercased first.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        if let Some(slot) = self.slot_mut(&name) {
            *slot = Some(value);
            return;
        }
        match self.extra.iter_mut().find(|(k, _)| *k == name) {
            Some((_, v)) => *v = value,
            None => self.extra.push((name, value)),
        }
    }

    /// Set the field only when it is missing.
    pub fn set_default(&mut self, name: &str, value: impl Into<String>) {
        if !self.contains(name) {
            self.set(name, value);
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        if let Some(slot) = self.slot_mut(&name) {
            return slot.take();
        }
        let pos = self.extra.iter().position(|(k, _)| *k == name)?;
        Some(self.extra.remove(pos).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Non-empty value of a field, treating `""` as absent.
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.trim().is_empty())
    }

    /// First run of four digits in `year`, if any.
    pub fn year_digits(&self) -> Option<&str> {
        let year = self.year.as_deref()?;
        let bytes = year.as_bytes();
        (0..bytes.len().saturating_sub(3))
            .find(|&i| bytes[i..i + 4].iter().all(u8::is_ascii_digit))
            .map(|i| &year[i..i + 4])
    }

    /// Authors split on the ` and ` separator, trimmed, empty names dropped.
    pub fn authors(&self) -> Vec<&str> {
        self.author
            .as_deref()
            .map(|a| {
                a.split(" and ")
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every populated field as `(name, value)`, known fields first.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        const KNOWN: &[&str] = &[
            "entry_type",
            "key",
            "title",
            "author",
            "journal",
            "journal_full",
            "journal_abbrev",
            "volume",
            "number",
            "pages",
            "year",
            "month",
            "publisher",
            "doi",
            "issn",
            "url",
            "abstract",
        ];
        KNOWN
            .iter()
            .filter_map(move |name| {
                self.slot(name)
                    .and_then(|s| s.as_deref())
                    .map(|v| (*name, v))
            })
            .chain(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
