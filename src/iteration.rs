/*!
Lifecycle of one bootstrapping iteration:

`NeedsTrainingData -> Trained -> CandidatesSelected -> Tagged -> Exported -> (review) -> Imported
-> Evaluated -> Closed`

No journal is kept. The state of an iteration is inferred from what its directory holds (the model
file, the candidates area, the reviewed area and the batch report), so an interrupted run resumes
where it stopped.
*/
use crate::annjson::{self, Incomplete, Layer, ANNJSON_DIR, HTML_DIR};
use crate::cache::Cache;
use crate::config::BootstrapConfig;
use crate::cross_validation::{CrossValidation, CrossValidationResult};
use crate::data::{Dataset, MergePolicy};
use crate::definer::{ExclusiveNlDefiner, PostProcessing};
use crate::error::{Error, Result};
use crate::external::ExternalTagger;
use crate::filters::{
    Console, DocumentFilter, KeywordFilter, ManualFilter, ManualStatsFilter, RegexEvidenceFilter,
};
use crate::metrics::{match_entities, Evaluator, Strictness, SubclassReport};
use crate::model::{Annotator, ModelTagger, SequenceModel};
use crate::reporter::{write_batch_results, CrossValidationTable, StatsLedger};
use crate::selection::{AlreadyConsidered, DocumentSource, Ended, Selection, SelectionPipeline};
use enum_iterator::Sequence;
use indexmap::IndexMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const MODEL_FILE: &str = "bin_model";
pub const CANDIDATES_DIR: &str = "candidates";
pub const REVIEWED_DIR: &str = "reviewed";
pub const BATCH_RESULTS_FILE: &str = "batch_results.txt";
pub const DEBUG_FILE: &str = "debug.txt";
pub const CROSS_VALIDATION_FILE: &str = "cross_validation.csv";
const ITERATION_PREFIX: &str = "iteration_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Sequence)]
pub enum IterationState {
    NeedsTrainingData,
    Trained,
    CandidatesSelected,
    Tagged,
    Exported,
    /// Reviewed annotations are available.
    Imported,
    Evaluated,
    Closed,
}

impl Display for IterationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NeedsTrainingData => "waiting for training",
            Self::Trained => "trained",
            Self::CandidatesSelected => "holding selected candidates",
            Self::Tagged => "tagged",
            Self::Exported => "exported for review",
            Self::Imported => "reviewed",
            Self::Evaluated => "evaluated",
            Self::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

pub fn iteration_dir(root: &Path, number: u32) -> PathBuf {
    root.join(format!("{}{}", ITERATION_PREFIX, number))
}

/// State of iteration `number` as recorded on disk.
pub fn infer_state(root: &Path, number: u32) -> IterationState {
    let dir = iteration_dir(root, number);
    let candidates = dir.join(CANDIDATES_DIR);
    if !candidates.is_dir() {
        return if dir.join(MODEL_FILE).is_file() {
            IterationState::Trained
        } else {
            IterationState::NeedsTrainingData
        };
    }
    if !candidates.join(ANNJSON_DIR).is_dir() {
        return IterationState::CandidatesSelected;
    }
    if !dir.join(REVIEWED_DIR).is_dir() {
        return IterationState::Exported;
    }
    if !dir.join(BATCH_RESULTS_FILE).is_file() {
        return IterationState::Imported;
    }
    if iteration_dir(root, number + 1).is_dir() {
        IterationState::Closed
    } else {
        IterationState::Evaluated
    }
}

/// Number of the iteration to work on: the highest existing one, or the next one when the
/// highest already holds both its candidates and its reviewed annotations. Iteration 0 holds
/// the seed corpus and is never worked on.
pub fn detect_iteration_number(root: &Path) -> Result<u32> {
    if !root.is_dir() {
        return Err(Error::MissingRoot(root.to_path_buf()));
    }
    let mut highest = None;
    for entry in std::fs::read_dir(root).map_err(|e| Error::io(root, e))? {
        let entry = entry.map_err(|e| Error::io(root, e))?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name();
        let number = name
            .to_str()
            .and_then(|n| n.strip_prefix(ITERATION_PREFIX))
            .and_then(|n| n.parse::<u32>().ok());
        if let Some(number) = number {
            highest = highest.max(Some(number));
        }
    }
    let number = match highest {
        None | Some(0) => 1,
        Some(n) => {
            let dir = iteration_dir(root, n);
            if dir.join(CANDIDATES_DIR).is_dir() && dir.join(REVIEWED_DIR).is_dir() {
                n + 1
            } else {
                n
            }
        }
    };
    tracing::debug!(number, "iteration detected");
    Ok(number)
}

/// Base corpus plus the reviewed documents of iterations `1..number`.
pub fn cumulative_corpus(config: &BootstrapConfig, number: u32) -> Result<Dataset> {
    let base = config.base_dir();
    if !base.is_dir() {
        return Err(Error::MissingBaseCorpus(base));
    }
    let mut dataset = annjson::read_corpus(&base)?;
    for previous in 1..number {
        let dir = iteration_dir(&config.root, previous);
        let html = dir.join(CANDIDATES_DIR).join(HTML_DIR);
        let reviewed = dir.join(REVIEWED_DIR);
        if !html.is_dir() || !reviewed.is_dir() {
            tracing::warn!(iteration = previous, "iteration has no reviewed documents");
            continue;
        }
        let mut documents = annjson::read_html_dir(&html)?;
        annjson::annotate(&mut documents, &reviewed, Layer::Gold, incomplete(config))?;
        dataset.extend_dataset(documents, MergePolicy::LastWins)?;
    }
    tracing::info!(documents = dataset.len(), until = number, "cumulative corpus loaded");
    Ok(dataset)
}

fn incomplete(config: &BootstrapConfig) -> Incomplete {
    if config.allow_incomplete {
        Incomplete::Skip
    } else {
        Incomplete::Reject
    }
}

/// Drives one iteration of the bootstrapping loop.
pub struct Iteration {
    config: BootstrapConfig,
    number: u32,
    dir: PathBuf,
    state: IterationState,
    model: Arc<dyn SequenceModel>,
    entity_tagger: Option<Arc<dyn Annotator>>,
    candidates: Dataset,
}

impl Iteration {
    /// Opens iteration `number`, or the detected current iteration when `None`, creating its
    /// directory.
    pub fn open(
        config: BootstrapConfig,
        model: Arc<dyn SequenceModel>,
        number: Option<u32>,
    ) -> Result<Self> {
        let number = match number {
            Some(n) => n,
            None => detect_iteration_number(&config.root)?,
        };
        if !config.root.is_dir() {
            return Err(Error::MissingRoot(config.root));
        }
        let dir = iteration_dir(&config.root, number);
        std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        let state = infer_state(&config.root, number);
        let entity_tagger = config
            .entity_tagger
            .as_ref()
            .map(|p| Arc::new(ExternalTagger::new(p)) as Arc<dyn Annotator>);
        tracing::info!(number, %state, "iteration opened");
        Ok(Iteration {
            config,
            number,
            dir,
            state,
            model,
            entity_tagger,
            candidates: Dataset::new(),
        })
    }

    /// Replaces the secondary entity tagger run after the model when tagging candidates.
    pub fn with_entity_tagger(mut self, tagger: Arc<dyn Annotator>) -> Self {
        self.entity_tagger = Some(tagger);
        self
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn state(&self) -> IterationState {
        self.state
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    pub fn candidates(&self) -> &Dataset {
        &self.candidates
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(MODEL_FILE)
    }

    fn candidates_dir(&self) -> PathBuf {
        self.dir.join(CANDIDATES_DIR)
    }

    fn reviewed_dir(&self) -> PathBuf {
        self.dir.join(REVIEWED_DIR)
    }

    fn require(&self, allowed: &[IterationState], action: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                iteration: self.number,
                state: self.state,
                action,
            })
        }
    }

    fn advance(&mut self, state: IterationState) {
        if state > self.state {
            tracing::info!(iteration = self.number, from = %self.state, to = %state, "state change");
            self.state = state;
        }
    }

    /// The current model with the annotators the filters expect after it.
    pub fn tagger(&self) -> ModelTagger {
        ModelTagger::new(self.model.clone(), self.model_path())
            .then(Arc::new(PostProcessing))
            .then(Arc::new(ExclusiveNlDefiner::default()))
    }

    /// Trains the model of this iteration on the cumulative corpus, unless the model file already
    /// exists. Returns whether a model was trained.
    pub fn learning(&mut self) -> Result<bool> {
        let model = self.model_path();
        if model.is_file() {
            tracing::info!(path = %model.display(), "model already trained");
            self.advance(IterationState::Trained);
            return Ok(false);
        }
        let corpus = cumulative_corpus(&self.config, self.number)?;
        tracing::info!(documents = corpus.len(), "training");
        self.model.train(&corpus, &model)?;
        self.advance(IterationState::Trained);
        Ok(true)
    }

    fn manual_filter(&self, console: Box<dyn Console>) -> Result<DocumentFilter> {
        let cache_dir = self.config.cache_dir();
        std::fs::create_dir_all(&cache_dir).map_err(|e| Error::io(&cache_dir, e))?;
        let highlighter = match &self.config.keywords {
            Some(keywords) => KeywordFilter::new(keywords)?,
            None => KeywordFilter::default(),
        };
        Ok(match &self.config.manual_labels {
            Some(labels) => DocumentFilter::ManualStats(ManualStatsFilter::new(
                Cache::open(cache_dir.join("manual_stats.jsonl"))?,
                console,
                labels,
            )?),
            None => DocumentFilter::Manual(
                ManualFilter::new(Cache::open(cache_dir.join("manual.jsonl"))?, console)
                    .with_highlighter(highlighter),
            ),
        })
    }

    fn evidence_filter(&self) -> Result<DocumentFilter> {
        let filter = match &self.config.pattern_file {
            Some(path) => RegexEvidenceFilter::from_file(path)?,
            None => RegexEvidenceFilter::with_default_patterns()?,
        }
        .min_found(self.config.min_found)?
        .offset_policy(self.config.offset_policy);
        let filter = if self.config.corroborate {
            filter.corroborate_with(Arc::new(self.tagger()), self.config.quick_threshold)
        } else {
            filter
        };
        Ok(DocumentFilter::RegexEvidence(filter))
    }

    /// The selection chain of this iteration: already considered ids are dropped, then the
    /// regex evidence filter and the operator decide. Trains the model first when needed, since
    /// the evidence filter tags with it.
    pub fn selection_pipeline<S: DocumentSource>(
        &mut self,
        source: S,
        console: Box<dyn Console>,
    ) -> Result<SelectionPipeline<S>> {
        self.learning()?;
        Ok(SelectionPipeline::new(source)
            .id_filter(AlreadyConsidered::scan(&self.config.root, self.number)?)
            .filter(self.evidence_filter()?)
            .filter(self.manual_filter(console)?))
    }

    /// Selects the candidate documents of this iteration and stores them in `candidates/html`.
    /// A selection that yields no document leaves the iteration untouched.
    pub fn docselection<S: DocumentSource>(
        &mut self,
        source: S,
        console: Box<dyn Console>,
    ) -> Result<Selection> {
        self.require(
            &[IterationState::Trained, IterationState::CandidatesSelected],
            "select candidates",
        )?;
        let mut pipeline = self.selection_pipeline(source, console)?;
        let selection = pipeline.select(self.config.docs, false);
        match selection.ended {
            Ended::TargetReached => {}
            ended => tracing::warn!(
                ?ended,
                selected = selection.dataset.len(),
                wanted = self.config.docs,
                "selection ended early"
            ),
        }
        if selection.dataset.is_empty() {
            return Err(Error::NoCandidates(self.number));
        }
        let html = self.candidates_dir().join(HTML_DIR);
        if html.is_dir() {
            std::fs::remove_dir_all(&html).map_err(|e| Error::io(&html, e))?;
        }
        annjson::write_html(&selection.dataset, &html)?;
        self.candidates = selection.dataset.clone();
        self.advance(IterationState::CandidatesSelected);
        Ok(selection)
    }

    /// Tags the candidates (model, post-processing, then the secondary entity tagger) and exports
    /// them for review.
    pub fn tagging(&mut self) -> Result<()> {
        self.require(&[IterationState::CandidatesSelected], "tag candidates")?;
        let html = self.candidates_dir().join(HTML_DIR);
        if self.candidates.is_empty() && html.is_dir() {
            self.candidates = annjson::read_html_dir(&html)?;
        }
        if self.candidates.is_empty() {
            return Err(Error::NoCandidates(self.number));
        }
        let tagger = ModelTagger::new(self.model.clone(), self.model_path())
            .then(Arc::new(PostProcessing));
        let tagger = match &self.entity_tagger {
            Some(entity_tagger) => tagger.then(entity_tagger.clone()),
            None => tagger,
        };
        tagger.annotate(&mut self.candidates)?;
        self.advance(IterationState::Tagged);

        annjson::export(&self.candidates, &self.candidates_dir(), self.config.threshold)?;
        self.write_debug()?;
        tracing::info!(
            documents = self.candidates.len(),
            predictions = self.candidates.predicted_annotations().count(),
            "candidates exported for review"
        );
        self.advance(IterationState::Exported);
        Ok(())
    }

    fn write_debug(&self) -> Result<()> {
        let out: String = self
            .candidates
            .iter()
            .flat_map(|(id, document)| {
                document.parts.iter().flat_map(move |(name, part)| {
                    part.predicted_annotations.iter().map(move |e| {
                        format!(
                            "{}\t{}\t{}\t{}\t{}\t{:?}\t{}\n",
                            id, name, e.offset, e.text, e.subclass, e.confidence, e.class_id
                        )
                    })
                })
            })
            .collect();
        let path = self.dir.join(DEBUG_FILE);
        std::fs::write(&path, out).map_err(|e| Error::io(&path, e))
    }

    /// Selection, tagging and export, after training when needed. Does nothing beyond training
    /// once the candidates are exported.
    pub fn before_annotation<S: DocumentSource>(
        &mut self,
        source: S,
        console: Box<dyn Console>,
    ) -> Result<()> {
        self.learning()?;
        if self.state >= IterationState::Exported {
            tracing::info!(iteration = self.number, "candidates already exported");
            return Ok(());
        }
        self.docselection(source, console)?;
        self.tagging()
    }

    /// Removes reviewed files of documents that are not candidates of this iteration.
    pub fn clean(&self) -> Result<usize> {
        let candidates = annjson::read_html_dir(&self.candidates_dir().join(HTML_DIR))?;
        annjson::clean_reviewed(&self.reviewed_dir(), &candidates)
    }

    /// Reads the candidates back with their exported predictions and the reviewed annotations as
    /// gold.
    pub fn manual_review_import(&mut self) -> Result<Dataset> {
        self.require(
            &[
                IterationState::Exported,
                IterationState::Imported,
                IterationState::Evaluated,
                IterationState::Closed,
            ],
            "import the review",
        )?;
        let reviewed = self.reviewed_dir();
        if !reviewed.is_dir() {
            return Err(Error::InvalidTransition {
                iteration: self.number,
                state: self.state,
                action: "import a review that was not delivered",
            });
        }
        let candidates = self.candidates_dir();
        let mut dataset = annjson::read_html_dir(&candidates.join(HTML_DIR))?;
        annjson::annotate(
            &mut dataset,
            &candidates.join(ANNJSON_DIR),
            Layer::Predicted,
            Incomplete::Keep,
        )?;
        let imported = annjson::annotate(
            &mut dataset,
            &reviewed,
            Layer::Gold,
            incomplete(&self.config),
        )?;
        tracing::info!(imported, documents = dataset.len(), "review imported");
        self.advance(IterationState::Imported);
        Ok(dataset)
    }

    /// Evaluates the predictions against the review, writes the batch report and appends the
    /// overlapping figures to the stats ledger.
    pub fn evaluation(&mut self, dataset: &mut Dataset) -> Result<SubclassReport> {
        self.require(
            &[
                IterationState::Imported,
                IterationState::Evaluated,
                IterationState::Closed,
            ],
            "evaluate",
        )?;
        ExclusiveNlDefiner::default().annotate(dataset)?;

        let mut raw = IndexMap::new();
        let mut detailed = vec![];
        for strictness in enum_iterator::all::<Strictness>() {
            let evaluator =
                Evaluator::new(strictness).division_by_zero(self.config.division_by_zero);
            let report = evaluator.evaluate_subclasses(dataset);
            detailed.push((strictness, report.total));
            raw.insert(strictness, report);
        }
        let alignments: Vec<_> = dataset
            .parts()
            .flat_map(|p| {
                match_entities(
                    &p.annotations,
                    &p.predicted_annotations,
                    Strictness::Overlapping,
                )
            })
            .collect();
        write_batch_results(
            &self.dir.join(BATCH_RESULTS_FILE),
            &alignments,
            &detailed,
            &raw,
        )?;

        let overlapping = raw
            .shift_remove(&Strictness::Overlapping)
            .unwrap_or_else(|| {
                Evaluator::new(Strictness::Overlapping)
                    .division_by_zero(self.config.division_by_zero)
                    .evaluate_subclasses(dataset)
            });
        StatsLedger::open(self.config.stats_file())?.append(
            self.number,
            self.config.threshold,
            &overlapping,
        )?;
        tracing::info!(
            iteration = self.number,
            precision = overlapping.total.precision,
            recall = overlapping.total.recall,
            f1 = overlapping.total.f1,
            "batch evaluated"
        );
        self.advance(IterationState::Evaluated);
        Ok(overlapping)
    }

    /// Cleanup, import and evaluation of the delivered review. Closes the iteration.
    pub fn after_annotation(&mut self) -> Result<SubclassReport> {
        let removed = self.clean()?;
        if removed > 0 {
            tracing::info!(removed, "stray reviewed files removed");
        }
        let mut dataset = self.manual_review_import()?;
        let report = self.evaluation(&mut dataset)?;
        self.advance(IterationState::Closed);
        Ok(report)
    }

    /// Cross-validates the model on the corpus available to this iteration. The table is written
    /// to the last closed iteration and the pooled overlapping figures go to the stats ledger.
    pub fn cross_validation(&self, folds: usize) -> Result<CrossValidationResult> {
        let corpus = cumulative_corpus(&self.config, self.number)?;
        let closed = self.number.saturating_sub(1);
        let dir = iteration_dir(&self.config.root, closed);
        std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        let table = CrossValidationTable::create(dir.join(CROSS_VALIDATION_FILE))?;
        let result = CrossValidation::new(folds)
            .division_by_zero(self.config.division_by_zero)
            .then(Arc::new(PostProcessing))
            .then(Arc::new(ExclusiveNlDefiner::default()))
            .run(&corpus, self.model.as_ref(), Some(&table))?;
        if let Some(pooled) = result.sum_of_folds.get(&Strictness::Overlapping) {
            StatsLedger::open(self.config.stats_file())?.append(
                closed,
                self.config.threshold,
                pooled,
            )?;
        }
        tracing::info!(folds, table = %table.path().display(), "cross-validation done");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BootstrapConfigBuilder;
    use crate::model::tests::LookupModel;
    use rstest::rstest;

    fn bootstrap_root() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        let base = root.path().join("iteration_0").join("base");
        let document = crate::data::tests::annotated_document(
            "The V600E mutation. Glycine to arginine.",
            &[(4, "V600E")],
        );
        let dataset = Dataset::single("100", document);
        annjson::write_html(&dataset, &base.join(HTML_DIR)).unwrap();
        annjson::write_annjson(&dataset, &base.join(ANNJSON_DIR), Layer::Gold, 1.0).unwrap();
        root
    }

    fn mkdirs(root: &Path, dirs: &[&str]) {
        for dir in dirs {
            std::fs::create_dir_all(root.join(dir)).unwrap();
        }
    }

    #[rstest]
    #[case(&[], 1)]
    #[case(&["iteration_0/base"], 1)]
    #[case(&["iteration_0/base", "iteration_1"], 1)]
    #[case(&["iteration_0/base", "iteration_1/candidates"], 1)]
    #[case(&["iteration_0/base", "iteration_1/candidates", "iteration_1/reviewed"], 2)]
    #[case(&["iteration_1/candidates", "iteration_1/reviewed", "iteration_3/candidates"], 3)]
    #[case(&["iteration_2", "iteration_10/reviewed", "iteration_10/candidates"], 11)]
    fn test_detect_iteration_number(#[case] dirs: &[&str], #[case] expected: u32) {
        let root = tempfile::tempdir().unwrap();
        mkdirs(root.path(), dirs);
        assert_eq!(detect_iteration_number(root.path()).unwrap(), expected);
    }

    #[test]
    fn test_resumes_at_open_iteration() {
        let root = bootstrap_root();
        mkdirs(
            root.path(),
            &[
                "iteration_1/candidates/annjson",
                "iteration_1/reviewed",
                "iteration_2/candidates/annjson",
                "iteration_2/reviewed",
                "iteration_3/candidates/annjson",
            ],
        );
        let config = BootstrapConfigBuilder::new(root.path())
            .unwrap()
            .build()
            .unwrap();
        let iteration = Iteration::open(config, Arc::new(LookupModel::default()), None).unwrap();
        assert_eq!(iteration.number(), 3);
        assert_eq!(iteration.state(), IterationState::Exported);
        assert!(!root.path().join("iteration_4").exists());
    }

    #[test]
    fn test_infer_state() {
        let root = tempfile::tempdir().unwrap();
        let r = root.path();
        assert_eq!(infer_state(r, 1), IterationState::NeedsTrainingData);
        mkdirs(r, &["iteration_1"]);
        std::fs::write(r.join("iteration_1").join(MODEL_FILE), b"m").unwrap();
        assert_eq!(infer_state(r, 1), IterationState::Trained);
        mkdirs(r, &["iteration_1/candidates"]);
        assert_eq!(infer_state(r, 1), IterationState::CandidatesSelected);
        mkdirs(r, &["iteration_1/candidates/annjson"]);
        assert_eq!(infer_state(r, 1), IterationState::Exported);
        mkdirs(r, &["iteration_1/reviewed"]);
        assert_eq!(infer_state(r, 1), IterationState::Imported);
        std::fs::write(r.join("iteration_1").join(BATCH_RESULTS_FILE), b"").unwrap();
        assert_eq!(infer_state(r, 1), IterationState::Evaluated);
        mkdirs(r, &["iteration_2"]);
        assert_eq!(infer_state(r, 1), IterationState::Closed);
    }

    #[test]
    fn test_learning_is_idempotent() {
        let root = bootstrap_root();
        let config = BootstrapConfigBuilder::new(root.path())
            .unwrap()
            .build()
            .unwrap();
        let model = Arc::new(LookupModel::default());
        let mut iteration = Iteration::open(config.clone(), model.clone(), None).unwrap();
        assert!(iteration.learning().unwrap());
        assert_eq!(iteration.state(), IterationState::Trained);

        let mut reopened = Iteration::open(config, model.clone(), None).unwrap();
        assert_eq!(reopened.state(), IterationState::Trained);
        assert!(!reopened.learning().unwrap());
        assert_eq!(*model.trained.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_missing_base_corpus() {
        let root = tempfile::tempdir().unwrap();
        let config = BootstrapConfigBuilder::new(root.path())
            .unwrap()
            .build()
            .unwrap();
        let mut iteration =
            Iteration::open(config, Arc::new(LookupModel::default()), None).unwrap();
        assert!(matches!(
            iteration.learning(),
            Err(Error::MissingBaseCorpus(_))
        ));
    }

    #[test]
    fn test_tagging_requires_candidates() {
        let root = bootstrap_root();
        let config = BootstrapConfigBuilder::new(root.path())
            .unwrap()
            .build()
            .unwrap();
        let mut iteration =
            Iteration::open(config, Arc::new(LookupModel::default()), None).unwrap();
        let err = iteration.tagging().unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                iteration: 1,
                state: IterationState::NeedsTrainingData,
                ..
            }
        ));
    }

    #[test]
    fn test_import_requires_review() {
        let root = bootstrap_root();
        mkdirs(root.path(), &["iteration_1/candidates/annjson"]);
        let config = BootstrapConfigBuilder::new(root.path())
            .unwrap()
            .build()
            .unwrap();
        let mut iteration =
            Iteration::open(config, Arc::new(LookupModel::default()), None).unwrap();
        assert_eq!(iteration.state(), IterationState::Exported);
        assert!(matches!(
            iteration.manual_review_import(),
            Err(Error::InvalidTransition { .. })
        ));
    }
}
