/*!
Operations on whole corpora outside the iteration lifecycle: mention statistics of the closed
iterations, and tagging or evaluating an external corpus with the secondary entity tagger.
*/
use crate::annjson::{self, Incomplete, Layer, ANNJSON_DIR, HTML_DIR};
use crate::config::BootstrapConfig;
use crate::data::{
    Dataset, MUT_CLASS_ID, SUBCLASS_NATURAL_LANGUAGE, SUBCLASS_SEMI_STANDARD, SUBCLASS_STANDARD,
};
use crate::definer::ExclusiveNlDefiner;
use crate::error::Result;
use crate::iteration::{iteration_dir, CANDIDATES_DIR, REVIEWED_DIR};
use crate::metrics::{DivByZeroStrat, Evaluator, Strictness, SubclassReport};
use crate::model::Annotator;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Mutation mentions of the reviewed documents of one iteration, by subclass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationStats {
    pub iteration: u32,
    pub documents: usize,
    pub standard: usize,
    pub natural_language: usize,
    pub semi_standard: usize,
}

impl IterationStats {
    pub fn total(&self) -> usize {
        self.standard + self.natural_language + self.semi_standard
    }

    pub fn non_standard(&self) -> usize {
        self.natural_language + self.semi_standard
    }

    pub fn non_standard_per_document(&self) -> f64 {
        if self.documents == 0 {
            0.0
        } else {
            self.non_standard() as f64 / self.documents as f64
        }
    }

    /// Counts the gold mutation mentions of `dataset`, whose subclasses must already be defined.
    pub fn count(iteration: u32, dataset: &Dataset) -> Self {
        let mut stats = IterationStats {
            iteration,
            documents: dataset.len(),
            ..Default::default()
        };
        for entity in dataset.annotations().filter(|e| e.class_id == MUT_CLASS_ID) {
            match entity.subclass {
                SUBCLASS_STANDARD => stats.standard += 1,
                SUBCLASS_NATURAL_LANGUAGE => stats.natural_language += 1,
                SUBCLASS_SEMI_STANDARD => stats.semi_standard += 1,
                other => tracing::debug!(subclass = other, "mention of unknown subclass"),
            }
        }
        stats
    }
}

impl Display for IterationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "iteration {}: total={} st={} nl+ss={} nl={} ss={} nl+ss/doc={:.2}",
            self.iteration,
            self.total(),
            self.standard,
            self.non_standard(),
            self.natural_language,
            self.semi_standard,
            self.non_standard_per_document()
        )
    }
}

/// Statistics of every iteration in `1..until` that has reviewed documents.
pub fn iteration_stats(config: &BootstrapConfig, until: u32) -> Result<Vec<IterationStats>> {
    let definer = ExclusiveNlDefiner::default();
    let mut all = vec![];
    for number in 1..until {
        let dir = iteration_dir(&config.root, number);
        let html = dir.join(CANDIDATES_DIR).join(HTML_DIR);
        let reviewed = dir.join(REVIEWED_DIR);
        if !html.is_dir() || !reviewed.is_dir() {
            continue;
        }
        let mut dataset = annjson::read_html_dir(&html)?;
        annjson::annotate(&mut dataset, &reviewed, Layer::Gold, Incomplete::Skip)?;
        definer.annotate(&mut dataset)?;
        all.push(IterationStats::count(number, &dataset));
    }
    Ok(all)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusMode {
    /// Tag the corpus and export the predictions.
    Predict,
    /// Evaluate previously exported predictions against the gold annotations of the corpus.
    Evaluate,
}

impl Display for CorpusMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Predict => write!(f, "predict"),
            Self::Evaluate => write!(f, "evaluate"),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown corpus mode `{0}`, expected `predict` or `evaluate`")]
pub struct ParsingCorpusModeError(String);

impl FromStr for CorpusMode {
    type Err = ParsingCorpusModeError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "predict" => Ok(Self::Predict),
            "evaluate" => Ok(Self::Evaluate),
            _ => Err(ParsingCorpusModeError(String::from(s))),
        }
    }
}

/// Tags the documents of `corpus` and exports them to `out`. Every prediction is exported as
/// pre-selected unless its confidence is 1.
pub fn tag_corpus(corpus: &Path, out: &Path, tagger: &dyn Annotator) -> Result<Dataset> {
    let mut dataset = annjson::read_html_dir(&corpus.join(HTML_DIR))?;
    tagger.annotate(&mut dataset)?;
    annjson::export(&dataset, out, 1.0)?;
    tracing::info!(
        documents = dataset.len(),
        predictions = dataset.predicted_annotations().count(),
        tagger = tagger.name(),
        "corpus tagged"
    );
    Ok(dataset)
}

/// Evaluates the predictions exported to `out` against the gold annotations of `corpus`.
pub fn evaluate_corpus(
    corpus: &Path,
    out: &Path,
    strictness: Strictness,
    strat: DivByZeroStrat,
) -> Result<SubclassReport> {
    let mut dataset = annjson::read_corpus(corpus)?;
    annjson::annotate(
        &mut dataset,
        &out.join(ANNJSON_DIR),
        Layer::Predicted,
        Incomplete::Keep,
    )?;
    ExclusiveNlDefiner::default().annotate(&mut dataset)?;
    Ok(Evaluator::new(strictness)
        .division_by_zero(strat)
        .evaluate_subclasses(&dataset))
}
