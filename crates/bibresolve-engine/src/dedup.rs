use std::collections::{BTreeSet, HashMap};

use bibresolve_core::Entry;

/// Lowercased, whitespace-collapsed title used for matching.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Positions of a batch bucketed by identifier and by (title, year).
#[derive(Debug, Default)]
pub struct DuplicateIndex {
    by_identifier: HashMap<String, Vec<usize>>,
    by_title_year: HashMap<(String, String), Vec<usize>>,
}

impl DuplicateIndex {
    /// Entries without a title or year only take part in identifier matching.
    pub fn build<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> Self {
        let mut index = Self::default();
        for (pos, entry) in entries.into_iter().enumerate() {
            let identifier = entry.identifier().trim().to_lowercase();
            if !identifier.is_empty() {
                index.by_identifier.entry(identifier).or_default().push(pos);
            }

            let fields = &entry.metadata.fields;
            let title = normalize_title(fields.get("title").unwrap_or_default());
            if let Some(year) = fields.year_digits()
                && !title.is_empty()
            {
                index
                    .by_title_year
                    .entry((title, year.to_string()))
                    .or_default()
                    .push(pos);
            }
        }
        index
    }

    /// Every position after the first in each bucket, ascending.
    pub fn duplicates(&self) -> Vec<usize> {
        let marked: BTreeSet<usize> = self
            .by_identifier
            .values()
            .chain(self.by_title_year.values())
            .flat_map(|positions| positions.iter().skip(1).copied())
            .collect();
        marked.into_iter().collect()
    }
}

pub fn find_duplicates(entries: &[Entry]) -> Vec<usize> {
    DuplicateIndex::build(entries).duplicates()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bibresolve_core::FieldSet;

    fn entry(id: &str, title: &str, year: &str) -> Entry {
        let mut fields = FieldSet::new();
        if !title.is_empty() {
            fields.set("title", title);
        }
        if !year.is_empty() {
            fields.set("year", year);
        }
        Entry::resolved(id, "k", "", "Crossref", fields)
    }

    #[test]
    fn same_identifier_keeps_first() {
        let entries = vec![
            entry("10.1000/ABC", "One", "2020"),
            entry("10.1000/xyz", "Two", "2021"),
            entry("10.1000/abc", "Other", "2019"),
            entry("10.1000/Abc", "", ""),
        ];
        assert_eq!(find_duplicates(&entries), vec![2, 3]);
    }

    #[test]
    fn title_year_match_ignores_case_and_spacing() {
        let entries = vec![
            entry("10.1000/a", "Deep  Learning", "2015"),
            entry("10.1000/b", "deep learning", "2015"),
            entry("10.1000/c", "Deep Learning", "2016"),
        ];
        assert_eq!(find_duplicates(&entries), vec![1]);
    }

    #[test]
    fn entries_without_year_do_not_match_on_title() {
        let entries = vec![
            entry("10.1000/a", "Same", ""),
            entry("10.1000/b", "Same", ""),
        ];
        assert!(find_duplicates(&entries).is_empty());
    }

    #[test]
    fn union_of_both_indices_is_sorted() {
        let entries = vec![
            entry("10.1000/a", "T", "2000"),
            entry("10.1000/b", "T", "2000"),
            entry("10.1000/a", "U", "2001"),
            entry("10.1000/b", "V", "2002"),
        ];
        assert_eq!(find_duplicates(&entries), vec![1, 2, 3]);
    }
}
