/*!
Candidate selection: pulls document ids from a source, drops the ids that were already
considered, fetches the remaining documents and runs them through the content filters, one
document at a time and strictly left to right.

Everything is pull-based. The pipeline stops pulling as soon as the caller has enough documents,
the source runs dry, or a filter answers `Stop`.
*/
use crate::annjson;
use crate::data::{Dataset, Document};
use crate::error::Result;
use crate::filters::{settle, DocumentFilter, Verdict};
use ahash::AHashSet;
use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};

/// A lazily enumerated pool of documents. Ids are cheap; fetching a document may be expensive and
/// may fail, in which case the document is skipped.
pub trait DocumentSource {
    fn next_id(&mut self) -> Option<String>;

    /// Fetches the document of the id last returned by `next_id`.
    fn fetch(&mut self, id: &str) -> Result<Document>;
}

/// In-memory source, mainly for tests and for re-filtering a dataset.
#[derive(Debug, Default)]
pub struct MemorySource {
    queue: VecDeque<(String, Result<Document>)>,
    pending: Option<Result<Document>>,
    pulled: usize,
}

impl MemorySource {
    pub fn new(documents: impl IntoIterator<Item = (String, Result<Document>)>) -> Self {
        MemorySource {
            queue: documents.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Number of ids handed out so far.
    pub fn pulled(&self) -> usize {
        self.pulled
    }
}

impl From<Dataset> for MemorySource {
    fn from(dataset: Dataset) -> Self {
        MemorySource::new(dataset.into_iter().map(|(id, d)| (id, Ok(d))))
    }
}

impl DocumentSource for MemorySource {
    fn next_id(&mut self) -> Option<String> {
        let (id, document) = self.queue.pop_front()?;
        self.pulled += 1;
        self.pending = Some(document);
        Some(id)
    }

    fn fetch(&mut self, id: &str) -> Result<Document> {
        self.pending
            .take()
            .unwrap_or_else(|| Err(crate::Error::acquisition(id, "nothing pending")))
    }
}

/// Cheap exclusion on the id alone, applied before a document is fetched.
pub trait IdFilter {
    fn name(&self) -> &str;

    fn admits(&self, id: &str) -> bool;
}

/// Excludes the documents of the seed corpus and of every earlier iteration, candidates and
/// reviewed alike.
#[derive(Debug, Default, Clone)]
pub struct AlreadyConsidered {
    ids: AHashSet<String>,
}

impl AlreadyConsidered {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AlreadyConsidered {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Collects the ids found under `root` for iterations `0..iteration`.
    pub fn scan(root: &Path, iteration: u32) -> Result<Self> {
        let mut ids = AHashSet::default();
        ids.extend(annjson::list_ids(&root.join("iteration_0").join("base"))?);
        for number in 1..iteration {
            let folder = root.join(format!("iteration_{}", number));
            ids.extend(annjson::list_ids(&folder.join("candidates"))?);
            ids.extend(annjson::list_ids(&folder.join("reviewed"))?);
        }
        tracing::debug!(ids = ids.len(), "already considered documents");
        Ok(AlreadyConsidered { ids })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl IdFilter for AlreadyConsidered {
    fn name(&self) -> &str {
        "already-considered"
    }

    fn admits(&self, id: &str) -> bool {
        !self.ids.contains(id)
    }
}

/// Intervals shorter than this are assumed to have been served from a local cache when warming
/// caches, and are left out of the estimate.
const CACHED_INTERVAL: Duration = Duration::from_millis(250);
const SMOOTHING: f64 = 0.3;

/// Running estimate of the time needed per accepted document. Purely informational.
#[derive(Debug, Clone)]
pub struct Progress {
    target: usize,
    accepted: usize,
    served_from_cache: usize,
    average: Option<f64>,
    discount_cached: bool,
}

impl Progress {
    pub fn new(target: usize, discount_cached: bool) -> Self {
        Progress {
            target,
            accepted: 0,
            served_from_cache: 0,
            average: None,
            discount_cached,
        }
    }

    /// Records the time spent to obtain one more accepted document and returns the estimated time
    /// left, if any estimate is available.
    pub fn record(&mut self, elapsed: Duration) -> Option<Duration> {
        self.accepted += 1;
        if self.discount_cached && elapsed < CACHED_INTERVAL {
            self.served_from_cache += 1;
        } else {
            let secs = elapsed.as_secs_f64();
            self.average = Some(match self.average {
                Some(avg) => SMOOTHING * secs + (1.0 - SMOOTHING) * avg,
                None => secs,
            });
        }
        let left = self.target.saturating_sub(self.accepted);
        let eta = self.average.map(|avg| Duration::from_secs_f64(avg * left as f64));
        tracing::debug!(
            accepted = self.accepted,
            cached = self.served_from_cache,
            left,
            eta_secs = eta.map(|d| d.as_secs_f64()),
            "selection progress"
        );
        eta
    }

    pub fn average(&self) -> Option<Duration> {
        self.average.map(Duration::from_secs_f64)
    }
}

/// Why a selection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ended {
    TargetReached,
    SourceExhausted,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub dataset: Dataset,
    pub ended: Ended,
}

pub struct SelectionPipeline<S> {
    source: S,
    id_filters: Vec<Box<dyn IdFilter>>,
    filters: Vec<DocumentFilter>,
    stopped: bool,
}

impl<S: DocumentSource> SelectionPipeline<S> {
    pub fn new(source: S) -> Self {
        SelectionPipeline {
            source,
            id_filters: vec![],
            filters: vec![],
            stopped: false,
        }
    }

    pub fn id_filter(mut self, filter: impl IdFilter + 'static) -> Self {
        self.id_filters.push(Box::new(filter));
        self
    }

    pub fn filter(mut self, filter: DocumentFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Pulls until one document passes every filter. `None` when the source is exhausted or a
    /// filter stopped the selection.
    pub fn next_accepted(&mut self) -> Option<(String, Document)> {
        'source: while !self.stopped {
            let id = self.source.next_id()?;
            if let Some(f) = self.id_filters.iter().find(|f| !f.admits(&id)) {
                tracing::trace!(%id, filter = f.name(), "id excluded");
                continue;
            }
            let document = match self.source.fetch(&id) {
                Ok(document) => document,
                Err(e) if e.is_fatal() => {
                    tracing::error!(%id, error = %e, "acquisition failed, stopping");
                    self.stopped = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(%id, error = %e, "acquisition failed, skipping document");
                    continue;
                }
            };
            for filter in self.filters.iter_mut() {
                let decision = filter.decide(&id, &document);
                match settle(filter, &id, decision) {
                    Verdict::Accept => {}
                    Verdict::Reject => {
                        tracing::debug!(%id, filter = %filter, "rejected");
                        continue 'source;
                    }
                    Verdict::Stop => {
                        tracing::info!(%id, filter = %filter, "selection stopped");
                        self.stopped = true;
                        break 'source;
                    }
                }
            }
            return Some((id, document));
        }
        None
    }

    /// Collects up to `target` accepted documents. With `discount_cached`, documents obtained
    /// faster than a network fetch are left out of the time estimate.
    pub fn select(&mut self, target: usize, discount_cached: bool) -> Selection {
        let mut dataset = Dataset::new();
        let mut progress = Progress::new(target, discount_cached);
        let mut last = Instant::now();
        while dataset.len() < target {
            let Some((id, document)) = self.next_accepted() else {
                break;
            };
            tracing::info!(%id, selected = dataset.len() + 1, target, "document selected");
            dataset.insert(id, document);
            let now = Instant::now();
            progress.record(now - last);
            last = now;
        }
        let ended = if dataset.len() >= target {
            Ended::TargetReached
        } else if self.stopped {
            Ended::Stopped
        } else {
            Ended::SourceExhausted
        };
        Selection { dataset, ended }
    }
}

impl<S: DocumentSource> Iterator for SelectionPipeline<S> {
    type Item = (String, Document);

    fn next(&mut self) -> Option<Self::Item> {
        self.next_accepted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::filters::{KeywordFilter, ManualFilter, ScriptedConsole};
    use crate::Error;

    fn source(texts: &[&str]) -> MemorySource {
        MemorySource::new(texts.iter().enumerate().map(|(i, t)| {
            (
                i.to_string(),
                Ok(Document::new().with_part("abstract", *t)),
            )
        }))
    }

    #[test]
    fn test_stops_pulling_at_target() {
        let mut pipeline = SelectionPipeline::new(source(&["a", "b", "c", "d", "e"]))
            .filter(DocumentFilter::Stub);
        let selection = pipeline.select(2, false);
        assert_eq!(selection.ended, Ended::TargetReached);
        assert_eq!(selection.dataset.ids().collect::<Vec<_>>(), vec!["0", "1"]);
        assert_eq!(pipeline.source().pulled(), 2);
    }

    #[test]
    fn test_id_filters_run_before_fetching() {
        let documents = vec![
            (String::from("1"), Err(Error::acquisition("1", "must not be fetched"))),
            (String::from("2"), Ok(Document::new().with_part("t", "mutation"))),
        ];
        let mut pipeline = SelectionPipeline::new(MemorySource::new(documents))
            .id_filter(AlreadyConsidered::new(["1"]))
            .filter(DocumentFilter::Keyword(KeywordFilter::default()));
        let selection = pipeline.select(5, false);
        assert_eq!(selection.ended, Ended::SourceExhausted);
        assert_eq!(selection.dataset.ids().collect::<Vec<_>>(), vec!["2"]);
    }

    #[test]
    fn test_acquisition_errors_are_skipped() {
        let documents = vec![
            (String::from("1"), Err(Error::acquisition("1", "timeout"))),
            (String::from("2"), Ok(Document::new().with_part("t", "x"))),
        ];
        let mut pipeline = SelectionPipeline::new(MemorySource::new(documents));
        let accepted: Vec<_> = pipeline.by_ref().map(|(id, _)| id).collect();
        assert_eq!(accepted, vec!["2"]);
    }

    #[test]
    fn test_filters_short_circuit_left_to_right() {
        // The manual filter would fail on a second prompt, so it must only see the one document
        // that passes the keyword filter.
        let console = ScriptedConsole::new(["y"]);
        let mut pipeline = SelectionPipeline::new(source(&["plain", "a deletion", "plain"]))
            .filter(DocumentFilter::Keyword(KeywordFilter::default()))
            .filter(DocumentFilter::Manual(ManualFilter::new(
                Cache::in_memory(),
                Box::new(console),
            )));
        let selection = pipeline.select(10, false);
        assert_eq!(selection.dataset.ids().collect::<Vec<_>>(), vec!["1"]);
        assert_eq!(selection.ended, Ended::SourceExhausted);
    }

    #[test]
    fn test_manual_stop_ends_selection() {
        let console = ScriptedConsole::new(["n", "s", "y"]);
        let mut pipeline = SelectionPipeline::new(source(&["a", "b", "c", "d"])).filter(
            DocumentFilter::Manual(ManualFilter::new(Cache::in_memory(), Box::new(console))),
        );
        let selection = pipeline.select(10, false);
        assert_eq!(selection.ended, Ended::Stopped);
        assert!(selection.dataset.is_empty());
        assert_eq!(pipeline.source().pulled(), 2);
        assert!(pipeline.next().is_none());
        assert_eq!(pipeline.source().pulled(), 2);
    }

    #[test]
    fn test_progress_discounts_cached_documents() {
        let mut progress = Progress::new(4, true);
        assert_eq!(progress.record(Duration::from_millis(10)), None);
        let eta = progress.record(Duration::from_secs(2)).unwrap();
        assert_eq!(eta, Duration::from_secs(4));
        progress.record(Duration::from_secs(4));
        let average = progress.average().unwrap().as_secs_f64();
        assert!((average - 2.6).abs() < 1e-9);
    }

    #[test]
    fn test_already_considered_scan() {
        let root = tempfile::tempdir().unwrap();
        let base = Dataset::single("b1", Document::new().with_part("t", "x"));
        annjson::write_html(&base, &root.path().join("iteration_0/base/html")).unwrap();
        let candidates = Dataset::single("c1", Document::new().with_part("t", "x"));
        annjson::export(&candidates, &root.path().join("iteration_1/candidates"), 1.0).unwrap();
        let later = Dataset::single("c2", Document::new().with_part("t", "x"));
        annjson::export(&later, &root.path().join("iteration_2/candidates"), 1.0).unwrap();

        let considered = AlreadyConsidered::scan(root.path(), 2).unwrap();
        assert!(!considered.admits("b1"));
        assert!(!considered.admits("c1"));
        assert!(considered.admits("c2"));
    }
}
