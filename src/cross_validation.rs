/*!
K-fold cross-validation of the delegated model on a corpus.

Every fold is evaluated at `Exact` and `Overlapping` strictness. Two aggregates are reported: the
average of the per-fold rows, and the sum of folds, whose metrics are recomputed from the summed
counts. They differ as soon as folds have different sizes.
*/
use crate::data::{Dataset, Fold};
use crate::error::{Error, Result};
use crate::metrics::{Bucket, DivByZeroStrat, Evaluator, Strictness, SubclassCounts, SubclassReport};
use crate::model::{Annotator, SequenceModel};
use crate::reporter::{CrossValidationTable, Row};
use either::Either as LeftOrRight;
use indexmap::IndexMap;
use ndarray::{Array2, Axis};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

/// Strictness settings every fold is evaluated at.
pub const STRICTNESSES: [Strictness; 2] = [Strictness::Exact, Strictness::Overlapping];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Average,
    SumOfFolds,
}

impl Display for Aggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Average => write!(f, "average"),
            Self::SumOfFolds => write!(f, "sum_of_folds"),
        }
    }
}

/// First column of a cross-validation row: a fold number or an aggregate.
pub type RowLabel = LeftOrRight<usize, Aggregate>;

#[derive(Debug, Clone)]
pub struct FoldResult {
    pub fold: usize,
    pub train_documents: usize,
    pub test_documents: usize,
    pub counts: IndexMap<Strictness, SubclassCounts>,
}

#[derive(Debug, Clone)]
pub struct CrossValidationResult {
    pub folds: Vec<FoldResult>,
    /// Column means of the fold rows, per strictness and bucket. A bucket is averaged over the
    /// folds where it occurs.
    pub average: IndexMap<Strictness, BTreeMap<Bucket, [f64; 8]>>,
    pub sum_of_folds: IndexMap<Strictness, SubclassReport>,
}

pub struct CrossValidation {
    folds: usize,
    strat: DivByZeroStrat,
    post: Vec<Arc<dyn Annotator>>,
}

impl CrossValidation {
    pub fn new(folds: usize) -> Self {
        CrossValidation {
            folds,
            strat: DivByZeroStrat::default(),
            post: vec![],
        }
    }

    pub fn division_by_zero(mut self, strat: DivByZeroStrat) -> Self {
        self.strat = strat;
        self
    }

    /// Annotator run on every tagged test split, in insertion order.
    pub fn then(mut self, annotator: Arc<dyn Annotator>) -> Self {
        self.post.push(annotator);
        self
    }

    fn evaluator(&self, strictness: Strictness) -> Evaluator {
        Evaluator::new(strictness).division_by_zero(self.strat)
    }

    fn run_fold(
        &self,
        fold: usize,
        split: Fold,
        model: &dyn SequenceModel,
        workdir: &std::path::Path,
    ) -> Result<FoldResult> {
        let Fold {
            mut train,
            mut test,
        } = split;
        train.prune();
        let model_path = workdir.join(format!("fold_{}.model", fold));
        tracing::info!(
            fold,
            train = train.len(),
            test = test.len(),
            "cross-validation fold"
        );
        model.train(&train, &model_path)?;
        model.tag(&mut test, &model_path)?;
        for annotator in &self.post {
            annotator.annotate(&mut test)?;
        }
        Ok(FoldResult {
            fold,
            train_documents: train.len(),
            test_documents: test.len(),
            counts: STRICTNESSES
                .iter()
                .map(|s| (*s, self.evaluator(*s).count(&test)))
                .collect(),
        })
    }

    /// Runs every fold of `dataset`. Rows are appended to `table` as they are computed.
    pub fn run(
        &self,
        dataset: &Dataset,
        model: &dyn SequenceModel,
        table: Option<&CrossValidationTable>,
    ) -> Result<CrossValidationResult> {
        let splits = dataset.n_fold_split(self.folds)?;
        let workdir = tempfile::Builder::new()
            .prefix("seedloop-cv-")
            .tempdir()
            .map_err(|e| Error::io(std::env::temp_dir(), e))?;

        let mut folds = Vec::with_capacity(splits.len());
        for (i, split) in splits.into_iter().enumerate() {
            let result = self.run_fold(i, split, model, workdir.path())?;
            if let Some(table) = table {
                for (strictness, counts) in &result.counts {
                    let report = self.evaluator(*strictness).report(counts);
                    table.append(RowLabel::Left(i), *strictness, &report)?;
                }
            }
            folds.push(result);
        }

        let mut average = IndexMap::new();
        let mut sum_of_folds = IndexMap::new();
        for strictness in STRICTNESSES {
            let evaluator = self.evaluator(strictness);
            let reports: Vec<SubclassReport> = folds
                .iter()
                .filter_map(|f| f.counts.get(&strictness))
                .map(|c| evaluator.report(c))
                .collect();
            average.insert(strictness, mean_rows(&reports));

            let mut summed = SubclassCounts::new();
            for fold in &folds {
                for (subclass, counts) in fold.counts.get(&strictness).into_iter().flatten() {
                    *summed.entry(*subclass).or_default() += *counts;
                }
            }
            sum_of_folds.insert(strictness, evaluator.report(&summed));
        }

        if let Some(table) = table {
            for (strictness, rows) in &average {
                table.append_rows(rows.iter().map(|(bucket, values)| {
                    Row::from_values(
                        vec![
                            RowLabel::Right(Aggregate::Average).to_string(),
                            strictness.to_string(),
                            bucket.to_string(),
                        ],
                        *values,
                    )
                }))?;
            }
            for (strictness, report) in &sum_of_folds {
                table.append(RowLabel::Right(Aggregate::SumOfFolds), *strictness, report)?;
            }
        }
        Ok(CrossValidationResult {
            folds,
            average,
            sum_of_folds,
        })
    }
}

fn mean_rows(reports: &[SubclassReport]) -> BTreeMap<Bucket, [f64; 8]> {
    let mut grouped: BTreeMap<Bucket, Vec<f64>> = BTreeMap::new();
    for report in reports {
        for (bucket, evaluation) in report.rows() {
            grouped
                .entry(bucket)
                .or_default()
                .extend(evaluation.to_array());
        }
    }
    grouped
        .into_iter()
        .filter_map(|(bucket, flat)| {
            let rows = Array2::from_shape_vec((flat.len() / 8, 8), flat).ok()?;
            let mean = rows.mean_axis(Axis(0))?;
            let mut values = [0.0; 8];
            values.iter_mut().zip(mean.iter()).for_each(|(v, m)| *v = *m);
            Some((bucket, values))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::annotated_document;
    use crate::data::Document;
    use crate::model::tests::LookupModel;

    /// Five documents; ids 1-3 form the first fold and 4-5 the second.
    fn corpus() -> Dataset {
        let documents: [(&str, Document); 5] = [
            ("1", annotated_document("V600E here.", &[(0, "V600E")])),
            ("2", annotated_document("V600E there.", &[])),
            ("3", annotated_document("V600E again.", &[(0, "V600E")])),
            ("4", annotated_document("V600E once more.", &[])),
            ("5", annotated_document("V600E at the end.", &[(0, "V600E")])),
        ];
        documents
            .into_iter()
            .map(|(id, d)| (id.to_string(), d))
            .collect()
    }

    #[test]
    fn test_average_and_sum_of_folds_differ() {
        let model = LookupModel::new(&[("V600E", 0, 0.9)]);
        let result = CrossValidation::new(2).run(&corpus(), &model, None).unwrap();

        // Training splits are pruned of documents without gold annotations.
        assert_eq!(*model.trained.lock().unwrap(), vec![1, 2]);
        assert_eq!(result.folds[0].test_documents, 3);
        assert_eq!(result.folds[1].test_documents, 2);

        let averaged = result.average[&Strictness::Exact][&Bucket::Total];
        let pooled = &result.sum_of_folds[&Strictness::Exact].total;
        assert_eq!(pooled.counts.tp, 3);
        assert_eq!(pooled.counts.fp, 2);
        assert!((pooled.precision - 0.6).abs() < 1e-9);
        assert!((averaged[5] - (2.0 / 3.0 + 0.5) / 2.0).abs() < 1e-9);
        assert!((averaged[5] - pooled.precision).abs() > 1e-3);
        assert_eq!(averaged[0], 1.5);
    }

    #[test]
    fn test_table_rows() {
        let dir = tempfile::tempdir().unwrap();
        let table = CrossValidationTable::create(dir.path().join("cross_validation.csv")).unwrap();
        let model = LookupModel::new(&[("V600E", 0, 0.9)]);
        CrossValidation::new(2)
            .run(&corpus(), &model, Some(&table))
            .unwrap();
        let content = std::fs::read_to_string(table.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        // Header, 2 folds x 2 strictness x (subclass 0 + total), then both aggregates.
        assert_eq!(lines.len(), 1 + 8 + 4 + 4);
        assert!(lines[1].starts_with("0, exact, 0, 2, 1, 0"));
        assert!(lines[9].starts_with("average, exact, 0, 1.5"));
        assert!(lines[16].starts_with("sum_of_folds, overlapping, total, 3, 2, 0"));
    }

    #[test]
    fn test_too_many_folds() {
        let model = LookupModel::default();
        assert!(matches!(
            CrossValidation::new(6).run(&corpus(), &model, None),
            Err(Error::InvalidFolds {
                documents: 5,
                folds: 6
            })
        ));
    }
}
