use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bibresolve_core::config::ProcessingConfig;
use bibresolve_core::{
    AppConfig, BatchResult, BatchSummarizer, DefaultSummarizer, Entry, EntryStatus, ExecutionMode,
};
use chrono::Utc;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cache::CacheStore;
use crate::dedup::DuplicateIndex;
use crate::error::{EngineError, Result};
use crate::http::ResilientClient;
use crate::identifiers::{Doi, clean_doi};
use crate::keys::{UsedKeySet, make_key};
use crate::record::{
    extract_fields, insert_field_if_absent, order_fields, remove_field, replace_key, upsert_field,
};
use crate::resolver::SourceResolver;
use crate::sources::CrossrefClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started {
        index: usize,
        identifier: String,
    },
    Finished {
        index: usize,
        identifier: String,
        status: EntryStatus,
        completed: usize,
        total: usize,
    },
    DuplicatesRemoved {
        count: usize,
    },
}

/// Resolves a list of DOIs into finished entries.
///
/// Each identifier fails on its own: errors become error entries and the
/// batch always completes. Input order is preserved in the result.
pub struct BatchProcessor {
    settings: ProcessingConfig,
    resolver: SourceResolver,
    crossref: CrossrefClient,
    summarizer: Box<dyn BatchSummarizer>,
}

impl BatchProcessor {
    /// Build every collaborator from `config`. An invalid config is the only
    /// error this returns.
    pub fn new(config: &AppConfig) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(CacheStore::from_config(&config.cache));
        let http = ResilientClient::from_config(&config.network)?;
        let resolver = SourceResolver::new(http.clone(), cache.clone(), config.sources.clone());
        let crossref = CrossrefClient::new(http, cache, &config.sources.crossref_base);

        Ok(Self::with_components(
            config.processing.clone(),
            resolver,
            crossref,
        ))
    }

    pub fn with_components(
        settings: ProcessingConfig,
        resolver: SourceResolver,
        crossref: CrossrefClient,
    ) -> Self {
        Self {
            settings,
            resolver,
            crossref,
            summarizer: Box::new(DefaultSummarizer),
        }
    }

    pub fn with_summarizer(mut self, summarizer: Box<dyn BatchSummarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn settings(&self) -> &ProcessingConfig {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        self.resolver.cache()
    }

    pub async fn process<I, S>(&self, identifiers: I) -> BatchResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.process_with(identifiers, &|_| {}, &CancellationToken::new())
            .await
    }

    /// Like [`process`](Self::process), reporting progress and stopping the
    /// scheduling of new identifiers once `cancel` fires. Identifiers that
    /// were never started come back as `Cancelled` error entries.
    pub async fn process_with<I, S>(
        &self,
        identifiers: I,
        progress: &(dyn Fn(ProgressEvent) + Send + Sync),
        cancel: &CancellationToken,
    ) -> BatchResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: Vec<String> = identifiers
            .into_iter()
            .map(|id| clean_doi(id.as_ref()))
            .collect();
        let total = ids.len();
        if total == 0 {
            return BatchResult {
                finished_at: Some(Utc::now()),
                ..BatchResult::empty()
            };
        }

        let started = Instant::now();
        let mode = self.settings.execution_mode();
        info!("processing {total} identifiers ({mode:?})");

        let keys = Mutex::new(UsedKeySet::new());
        let completed = AtomicUsize::new(0);
        let mut slots: Vec<Option<Entry>> = vec![None; total];

        let run_one = |index: usize| {
            let identifier = &ids[index];
            let keys = &keys;
            let completed = &completed;
            async move {
                progress(ProgressEvent::Started {
                    index,
                    identifier: identifier.clone(),
                });

                let entry = match self.process_one(identifier, keys).await {
                    Ok(entry) => entry,
                    Err(e) => {
                        error!("failed to process {identifier}: {e}");
                        Entry::failed(identifier.as_str(), e)
                    }
                };

                progress(ProgressEvent::Finished {
                    index,
                    identifier: identifier.clone(),
                    status: entry.status(),
                    completed: completed.fetch_add(1, Ordering::SeqCst) + 1,
                    total,
                });
                (index, entry)
            }
        };

        match mode {
            ExecutionMode::Sequential => {
                for index in 0..total {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let (index, entry) = run_one(index).await;
                    slots[index] = Some(entry);
                }
            }
            ExecutionMode::Concurrent(limit) => {
                let mut results = futures::stream::iter(0..total)
                    .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
                    .map(&run_one)
                    .buffer_unordered(limit);
                while let Some((index, entry)) = results.next().await {
                    slots[index] = Some(entry);
                }
            }
        }

        let mut entries: Vec<Entry> = slots
            .into_iter()
            .zip(&ids)
            .map(|(slot, id)| {
                slot.unwrap_or_else(|| Entry::failed(id.as_str(), EngineError::Cancelled(id.clone())))
            })
            .collect();

        let duplicates_removed = if self.settings.remove_duplicates {
            remove_duplicates(&mut entries)
        } else {
            0
        };
        if duplicates_removed > 0 {
            info!("removed {duplicates_removed} duplicates");
            progress(ProgressEvent::DuplicatesRemoved {
                count: duplicates_removed,
            });
        }

        let failed_identifiers: Vec<String> = entries
            .iter()
            .filter(|e| e.has_error())
            .map(|e| e.identifier().to_string())
            .collect();
        let successful = entries.iter().filter(|e| e.is_ok()).count();
        let analytics = self.summarizer.summarize(&entries);
        let elapsed = started.elapsed();

        info!(
            "batch complete: {successful} successful, {} failed out of {total} in {:.2}s",
            failed_identifiers.len(),
            elapsed.as_secs_f64()
        );

        BatchResult {
            entries,
            successful,
            failed: failed_identifiers.len(),
            failed_identifiers,
            duplicates_removed,
            analytics,
            elapsed,
            finished_at: Some(Utc::now()),
        }
    }

    /// Resolve, enrich, key and rewrite one identifier.
    async fn process_one(&self, identifier: &str, keys: &Mutex<UsedKeySet>) -> Result<Entry> {
        let settings = &self.settings;
        let doi = if settings.validate_identifiers {
            Doi::parse(identifier)?
        } else {
            Doi::parse_lenient(identifier)?
        };

        let resolution = self.resolver.resolve(&doi).await?;
        let mut record = resolution.record;
        let mut fields = extract_fields(&record);

        let needs_enrichment =
            settings.fetch_abstracts || settings.use_abbrev_journal || !fields.contains("pages");
        let pages_added = needs_enrichment
            && self
                .crossref
                .enrich(&doi, &mut fields, settings.fetch_abstracts)
                .await;

        if settings.normalize_authors
            && let Some(author) = fields.get("author")
        {
            let collapsed = author.split_whitespace().collect::<Vec<_>>().join(" ");
            fields.set("author", collapsed);
        }

        let base = make_key(&fields, settings.key_pattern, &doi.value);
        let key = {
            let mut used = match keys.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            used.allocate(&base)
        };
        if let Some(old) = fields.get("key")
            && !old.is_empty()
            && old != key
        {
            record = replace_key(&record, old, &key);
        }
        fields.set("key", key.as_str());

        record = apply_journal(record, &mut fields, settings.use_abbrev_journal);

        if settings.include_abstracts {
            if let Some(text) = fields.non_empty("abstract") {
                record = upsert_field(&record, "abstract", text);
            }
        } else {
            fields.remove("abstract");
            record = remove_field(&record, "abstract");
        }

        if pages_added && let Some(pages) = fields.get("pages") {
            record = insert_field_if_absent(&record, "pages", pages);
        }

        record = order_fields(&record, settings.field_order.as_slice());
        debug!("processed {identifier} as {key} via {}", resolution.source);

        Ok(Entry::resolved(
            identifier,
            key,
            record,
            resolution.source.name(),
            fields,
        ))
    }
}

/// Abbreviated title when asked for and known, otherwise the record's own
/// journal or the full Crossref title.
fn apply_journal(
    record: String,
    fields: &mut bibresolve_core::FieldSet,
    use_abbrev: bool,
) -> String {
    if use_abbrev && let Some(abbrev) = fields.non_empty("journal_abbrev").map(str::to_string) {
        fields.set("journal", abbrev.as_str());
        return upsert_field(&record, "journal", &abbrev);
    }
    if let Some(full) = fields.non_empty("journal_full").map(str::to_string) {
        fields.set_default("journal", full);
        if let Some(journal) = fields.get("journal") {
            return upsert_field(&record, "journal", journal);
        }
    }
    record
}

/// Drop later duplicates among the successful entries. Error entries are
/// never removed. Returns how many entries were dropped.
fn remove_duplicates(entries: &mut Vec<Entry>) -> usize {
    let ok_positions: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_ok())
        .map(|(pos, _)| pos)
        .collect();
    let marked: Vec<usize> = DuplicateIndex::build(ok_positions.iter().map(|&pos| &entries[pos]))
        .duplicates()
        .into_iter()
        .map(|i| ok_positions[i])
        .collect();

    if marked.is_empty() {
        return 0;
    }
    let mut pos = 0;
    entries.retain(|_| {
        let keep = marked.binary_search(&pos).is_err();
        pos += 1;
        keep
    });
    marked.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bibresolve_core::FieldSet;

    fn ok(id: &str, title: &str) -> Entry {
        let mut fields = FieldSet::new();
        fields.set("title", title);
        fields.set("year", "2020");
        Entry::resolved(id, "k", "", "Crossref", fields)
    }

    #[test]
    fn dedup_skips_error_entries() {
        let mut entries = vec![
            ok("10.1000/a", "One"),
            Entry::failed("10.1000/a", "boom"),
            ok("10.1000/A", "Other"),
            ok("10.1000/b", "one"),
            Entry::failed("10.1000/a", "boom"),
        ];
        assert_eq!(remove_duplicates(&mut entries), 2);
        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_ok());
        assert!(entries[1].has_error());
        assert!(entries[2].has_error());
    }

    #[test]
    fn journal_prefers_abbreviation_when_asked() {
        let record = "@article{k,\n  journal = {Nature}\n}".to_string();
        let mut fields = FieldSet::new();
        fields.set("journal", "Nature");
        fields.set("journal_full", "Nature");
        fields.set("journal_abbrev", "Nat.");

        let out = apply_journal(record.clone(), &mut fields.clone(), false);
        assert_eq!(out, record);

        let out = apply_journal(record, &mut fields, true);
        assert_eq!(out, "@article{k,\n  journal = {Nat.}\n}");
        assert_eq!(fields.get("journal"), Some("Nat."));
    }

    #[test]
    fn journal_full_fills_missing_journal() {
        let record = "@misc{k,\n  title = {T}\n}".to_string();
        let mut fields = FieldSet::new();
        fields.set("journal_full", "Physical Review Letters");
        let out = apply_journal(record, &mut fields, true);
        assert!(out.contains("journal = {Physical Review Letters}"));
        assert_eq!(fields.get("journal"), Some("Physical Review Letters"));
    }
}
