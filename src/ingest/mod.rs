//! Fragment ingestor: raw bytes to normalized `RawRecord`s
//!
//! Content kind is decided by a strict JSON parse (markup otherwise).
//! Name, spatial key, map coordinate and cross-references are then
//! extracted best-effort. Only I/O failures (reading the fragment or
//! staging the record) are errors, and they are scoped to one source.

mod extract;
mod source;

pub use extract::Extractor;
pub use source::{DirectorySource, FragmentSource, MemorySource, SourceEntry};

use crate::config::IngestConfig;
use crate::record::{RawRecord, RecordId};
use crate::router::KnownEntityIndex;
use crate::storage::{ArtifactStore, StorageError};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("cannot read fragment {source_id}: {source}")]
    Io {
        source_id: String,
        source: std::io::Error,
    },
    #[error("cannot enumerate source: {0}")]
    Enumerate(String),
    #[error("empty source id")]
    EmptySourceId,
    #[error("invalid id pattern: {0}")]
    Pattern(String),
    #[error("staging failed: {0}")]
    Storage(#[from] StorageError),
    #[error("ingest worker failed: {0}")]
    Worker(String),
}

/// A source that could not be ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestFailure {
    pub source_id: String,
    pub reason: String,
}

/// Result of ingesting a whole source.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Unique records in source order (a repeated source id keeps its
    /// last occurrence, matching the staging overwrite)
    pub records: Vec<RawRecord>,
    pub failures: Vec<IngestFailure>,
    /// Entries whose id repeated an earlier entry
    pub duplicates: usize,
}

/// Turns raw fragments into staged records.
pub struct FragmentIngestor {
    store: Arc<dyn ArtifactStore>,
    known: Arc<KnownEntityIndex>,
    extractor: Extractor,
}

impl FragmentIngestor {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        known: Arc<KnownEntityIndex>,
        config: &IngestConfig,
    ) -> Result<Self, IngestError> {
        let extractor = Extractor::new(&config.extra_id_patterns)
            .map_err(|e| IngestError::Pattern(e.to_string()))?;
        Ok(Self {
            store,
            known,
            extractor,
        })
    }

    /// Build a record from raw bytes without touching the store.
    ///
    /// Never fails: undecodable bytes are replaced, and anything that
    /// cannot be extracted is left empty.
    pub fn parse(&self, raw: &[u8], source_id: &str) -> RawRecord {
        let text = String::from_utf8_lossy(raw).into_owned();
        let id = RecordId::new(source_id);
        let (kind, value) = self.extractor.detect(&text);

        let mut record = RawRecord::new(id.clone(), kind, text);
        record.canonical_name = match &value {
            Some(v) => self.extractor.structured_name(v),
            None => self.extractor.markup_name(&record.raw_content, &self.known),
        };
        record.spatial_key = self.extractor.spatial_key(&record.raw_content);
        record.map_coord = match &value {
            Some(v) => self.extractor.structured_coord(v),
            None => self.extractor.markup_coord(&record.raw_content),
        };
        record.cross_ref_ids = self.extractor.cross_refs(&record.raw_content, &id);
        record
    }

    /// Parse and stage one fragment. Re-ingesting a source id overwrites.
    pub fn ingest(&self, raw: &[u8], source_id: &str) -> Result<RawRecord, IngestError> {
        if source_id.trim().is_empty() {
            return Err(IngestError::EmptySourceId);
        }
        let record = self.parse(raw, source_id);
        self.store.save_record(&record)?;
        debug!(
            id = %record.id,
            kind = record.content_kind.as_str(),
            name = record.canonical_name.as_deref().unwrap_or("-"),
            "staged record"
        );
        Ok(record)
    }

    /// Ingest every entry of `source` on a bounded worker pool.
    ///
    /// Fails only if the source cannot be enumerated; per-entry failures
    /// are collected in the report.
    pub async fn ingest_source(
        self: &Arc<Self>,
        source: Arc<dyn FragmentSource>,
        concurrency: usize,
    ) -> Result<IngestReport, IngestError> {
        let entries = source.entries()?;
        info!(entries = entries.len(), "ingesting source");

        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut pending: HashMap<Id, (usize, String)> = HashMap::new();

        for (seq, entry) in entries.into_iter().enumerate() {
            // Waiting here keeps at most `concurrency` workers alive
            let permit = Arc::clone(&semaphore).acquire_owned().await.ok();
            let ingestor = Arc::clone(self);
            let source = Arc::clone(&source);
            let source_id = entry.source_id.clone();

            let handle = tasks.spawn(async move {
                let _permit = permit;
                let bytes = source.read(&entry).await?;
                // Staging touches SQLite, which blocks
                tokio::task::spawn_blocking(move || ingestor.ingest(&bytes, &entry.source_id))
                    .await
                    .map_err(|e| IngestError::Worker(e.to_string()))?
            });
            pending.insert(handle.id(), (seq, source_id));
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(e) => {
                    warn!(error = %e, "ingest worker panicked");
                    (e.id(), Err(IngestError::Worker(e.to_string())))
                }
            };
            if let Some((seq, source_id)) = pending.remove(&id) {
                outcomes.push((seq, source_id, result));
            }
        }
        outcomes.sort_by_key(|(seq, _, _)| *seq);

        let mut report = IngestReport::default();
        let mut position: HashMap<RecordId, usize> = HashMap::new();
        let mut repeated: Vec<usize> = Vec::new();

        for (_, source_id, result) in outcomes {
            match result {
                Ok(record) => match position.get(&record.id) {
                    Some(&at) => {
                        report.duplicates += 1;
                        report.records[at] = record;
                        repeated.push(at);
                    }
                    None => {
                        position.insert(record.id.clone(), report.records.len());
                        report.records.push(record);
                    }
                },
                Err(e) => {
                    warn!(source_id = %source_id, error = %e, "fragment not ingested");
                    report.failures.push(IngestFailure {
                        source_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        // Concurrent writers for a repeated id may have landed out of
        // order; restage the occurrence the report kept.
        for at in repeated {
            self.store.save_record(&report.records[at])?;
        }

        info!(
            records = report.records.len(),
            failures = report.failures.len(),
            duplicates = report.duplicates,
            "ingestion complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ContentKind;
    use crate::storage::{OpenStore, SqliteStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ingestor() -> (Arc<FragmentIngestor>, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let known = Arc::new(KnownEntityIndex::from_pairs([("Aurora Bushes", "region")]));
        let ingestor =
            FragmentIngestor::new(store.clone(), known, &IngestConfig::default()).unwrap();
        (Arc::new(ingestor), store)
    }

    // --- Scenario: structured and markup records yield the same spatial key ---

    #[test]
    fn structured_record_extracts_name_and_hex() {
        let (ingestor, _) = ingestor();
        let record = ingestor.ingest(br#"{"name": "Aurora Bushes", "hex": "W2S51"}"#, "rec-1").unwrap();

        assert_eq!(record.content_kind, ContentKind::StructuredData);
        assert_eq!(record.canonical_name.as_deref(), Some("Aurora Bushes"));
        assert_eq!(record.spatial_key.as_deref(), Some("W2S51"));
    }

    #[test]
    fn markup_record_without_name_still_gets_spatial_key() {
        let (ingestor, _) = ingestor();
        let record = ingestor.ingest(b"<div>Hex W2S51</div>", "rec-2").unwrap();

        assert_eq!(record.content_kind, ContentKind::Markup);
        assert_eq!(record.canonical_name, None);
        assert_eq!(record.spatial_key.as_deref(), Some("W2S51"));
    }

    #[test]
    fn malformed_content_is_not_an_error() {
        let (ingestor, _) = ingestor();
        let record = ingestor.ingest(&[0xff, 0xfe, b'{', b'x'], "rec-3").unwrap();

        assert_eq!(record.content_kind, ContentKind::Markup);
        assert_eq!(record.spatial_key, None);
        assert_eq!(record.map_coord, None);
        assert!(record.cross_ref_ids.is_empty());
    }

    #[test]
    fn reingest_overwrites_staged_record() {
        let (ingestor, store) = ingestor();
        ingestor.ingest(b"<p>first</p>", "same").unwrap();
        ingestor.ingest(b"<p>second</p>", "same").unwrap();

        assert_eq!(store.record_count().unwrap(), 1);
        let staged = store.load_record(&RecordId::new("same")).unwrap().unwrap();
        assert_eq!(staged.raw_content, "<p>second</p>");
    }

    #[test]
    fn empty_source_id_is_rejected() {
        let (ingestor, _) = ingestor();
        assert!(matches!(ingestor.ingest(b"x", "  "), Err(IngestError::EmptySourceId)));
    }

    #[tokio::test]
    async fn ingest_source_isolates_io_failures_and_keeps_order() {
        let (ingestor, store) = ingestor();
        let source = Arc::new(
            MemorySource::new()
                .with_fragment("b", "<p>b</p>")
                .with_unreadable("broken")
                .with_fragment("a", r#"{"name": "A"}"#)
                .with_fragment("b", "<p>b again</p>"),
        );

        let report = ingestor.ingest_source(source, 3).await.unwrap();

        let ids: Vec<&str> = report.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(report.records[0].raw_content, "<p>b again</p>");
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].source_id, "broken");
        assert_eq!(store.record_count().unwrap(), 2);
    }

    /// Panics on `panic-*` ids and tracks how many reads overlap.
    #[derive(Default)]
    struct TrackingSource {
        ids: Vec<String>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl FragmentSource for TrackingSource {
        fn entries(&self) -> Result<Vec<SourceEntry>, IngestError> {
            Ok(self
                .ids
                .iter()
                .map(|id| SourceEntry {
                    source_id: id.clone(),
                    locator: id.clone(),
                })
                .collect())
        }

        async fn read(&self, entry: &SourceEntry) -> Result<Vec<u8>, IngestError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if entry.source_id.starts_with("panic-") {
                panic!("reader crashed on {}", entry.source_id);
            }
            Ok(format!("<p>{}</p>", entry.source_id).into_bytes())
        }
    }

    #[tokio::test]
    async fn panicking_reader_is_reported_as_a_failure() {
        let (ingestor, _) = ingestor();
        let source = Arc::new(TrackingSource {
            ids: vec!["a".into(), "panic-b".into(), "c".into()],
            ..Default::default()
        });

        let report = ingestor.ingest_source(source, 2).await.unwrap();

        let ids: Vec<&str> = report.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].source_id, "panic-b");
        assert!(report.failures[0].reason.starts_with("ingest worker failed"));
    }

    #[tokio::test]
    async fn reads_never_exceed_the_concurrency_bound() {
        let (ingestor, store) = ingestor();
        let source = Arc::new(TrackingSource {
            ids: (0..40).map(|n| format!("rec-{}", n)).collect(),
            ..Default::default()
        });

        let report = ingestor.ingest_source(Arc::clone(&source) as Arc<dyn FragmentSource>, 3).await.unwrap();

        assert_eq!(report.records.len(), 40);
        assert_eq!(store.record_count().unwrap(), 40);
        assert!(source.peak.load(Ordering::SeqCst) <= 3);
    }
}
