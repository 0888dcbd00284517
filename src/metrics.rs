/*!
Mention-level evaluation of predicted entities against gold entities.

Gold and predicted entities of a part are aligned greedily: pairs are tried in cartesian-product
order (gold outer, predicted inner) and the first pair that is equal under the chosen
`Strictness` wins; neither side may be matched twice. Whatever is left is a false negative (gold)
or a false positive (predicted).

A matched pair whose spans are not identical is a boundary error and is counted in both
`fp_overlap` and `fn_overlap`. Under `Strictness::Exact`, leftovers that still overlap are counted
the same way, so the overlap counts mean the same thing at every strictness and the reports of
different strictness settings can be compared column by column. At `Exact` the overlap counts sit
in the precision and recall denominators next to `fp` and `fn` and never in a numerator, so the
metrics are those of counting every such leftover as a plain false positive and false negative.
Only the split between misses and boundary errors is kept.
*/
use crate::data::{Dataset, Entity, Part};
use enum_iterator::Sequence;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;
use thiserror::Error;

/// Span equality rule used when matching entities. Entities of different classes never match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Sequence, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Same start and same end.
    Exact,
    /// The spans intersect.
    Overlapping,
    /// The intersection covers at least half of the shorter span.
    HalfOverlapping,
}

impl Strictness {
    pub fn matches(self, gold: &Entity, predicted: &Entity) -> bool {
        if gold.class_id != predicted.class_id {
            return false;
        }
        let (g_start, g_end) = (gold.offset, gold.end());
        let (p_start, p_end) = (predicted.offset, predicted.end());
        match self {
            Strictness::Exact => g_start == p_start && g_end == p_end,
            Strictness::Overlapping => g_start < p_end && p_start < g_end,
            Strictness::HalfOverlapping => {
                let intersection = g_end.min(p_end).saturating_sub(g_start.max(p_start));
                let shorter = (g_end - g_start).min(p_end - p_start);
                intersection > 0 && 2 * intersection >= shorter
            }
        }
    }
}

impl Display for Strictness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Strictness::Exact => "exact",
            Strictness::Overlapping => "overlapping",
            Strictness::HalfOverlapping => "half_overlapping",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Error)]
#[error("could not parse {0:?} into a strictness")]
pub struct ParsingStrictnessError(String);

impl FromStr for Strictness {
    type Err = ParsingStrictnessError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_ref() {
            "exact" => Ok(Strictness::Exact),
            "overlapping" => Ok(Strictness::Overlapping),
            "half_overlapping" => Ok(Strictness::HalfOverlapping),
            _ => Err(ParsingStrictnessError(String::from(s))),
        }
    }
}

/// What a metric is worth when its denominator is zero, e.g. for a subclass without any gold or
/// predicted entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivByZeroStrat {
    #[default]
    ReplaceBy0,
    ReplaceBy1,
    /// The metric is NaN.
    Undefined,
}

impl DivByZeroStrat {
    fn divide(self, numerator: f64, denominator: f64) -> f64 {
        if denominator != 0.0 {
            return numerator / denominator;
        }
        match self {
            DivByZeroStrat::ReplaceBy0 => 0.0,
            DivByZeroStrat::ReplaceBy1 => 1.0,
            DivByZeroStrat::Undefined => f64::NAN,
        }
    }
}

#[derive(Debug, Error)]
#[error("could not parse {0:?} into a division by zero strategy")]
pub struct ParsingDivByZeroStratError(String);

impl FromStr for DivByZeroStrat {
    type Err = ParsingDivByZeroStratError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_ref() {
            "replaceby0" | "replacebyzero" | "zero" | "0" => Ok(DivByZeroStrat::ReplaceBy0),
            "replaceby1" | "replacebyone" | "one" | "1" => Ok(DivByZeroStrat::ReplaceBy1),
            "undefined" | "nan" => Ok(DivByZeroStrat::Undefined),
            _ => Err(ParsingDivByZeroStratError(String::from(s))),
        }
    }
}

/// Raw match counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub tp: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
    pub fp_overlap: usize,
    pub fn_overlap: usize,
}

impl Add for Counts {
    type Output = Counts;
    fn add(self, rhs: Self) -> Self::Output {
        Counts {
            tp: self.tp + rhs.tp,
            fp: self.fp + rhs.fp,
            fn_: self.fn_ + rhs.fn_,
            fp_overlap: self.fp_overlap + rhs.fp_overlap,
            fn_overlap: self.fn_overlap + rhs.fn_overlap,
        }
    }
}

impl AddAssign for Counts {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for Counts {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Counts::default(), Add::add)
    }
}

impl Counts {
    /// Derives precision, recall and F1. Boundary errors count as errors at `Exact` strictness
    /// and as hits otherwise.
    pub fn evaluate(self, strictness: Strictness, strat: DivByZeroStrat) -> Evaluation {
        let (tp, fp, fn_) = (self.tp as f64, self.fp as f64, self.fn_ as f64);
        let (fp_ov, fn_ov) = (self.fp_overlap as f64, self.fn_overlap as f64);
        let (precision, recall) = match strictness {
            Strictness::Exact => (
                strat.divide(tp, tp + fp + fp_ov),
                strat.divide(tp, tp + fn_ + fn_ov),
            ),
            Strictness::Overlapping | Strictness::HalfOverlapping => (
                strat.divide(tp + fp_ov, tp + fp + fp_ov),
                strat.divide(tp + fn_ov, tp + fn_ + fn_ov),
            ),
        };
        let f1 = strat.divide(2.0 * precision * recall, precision + recall);
        Evaluation {
            counts: self,
            precision,
            recall,
            f1,
        }
    }
}

/// Counts plus the metrics derived from them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    #[serde(flatten)]
    pub counts: Counts,
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score")]
    pub f1: f64,
}

impl Evaluation {
    /// Counts then metrics, in the column order of the CSV reports.
    pub fn to_array(&self) -> [f64; 8] {
        let c = &self.counts;
        [
            c.tp as f64,
            c.fp as f64,
            c.fn_ as f64,
            c.fp_overlap as f64,
            c.fn_overlap as f64,
            self.precision,
            self.recall,
            self.f1,
        ]
    }
}

/// Stratum of an evaluation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bucket {
    Subclass(u8),
    Total,
}

impl Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bucket::Subclass(s) => write!(f, "{}", s),
            Bucket::Total => write!(f, "total"),
        }
    }
}

/// One side of an alignment is `None` when the other entity was left unmatched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alignment<'a> {
    pub gold: Option<&'a Entity>,
    pub predicted: Option<&'a Entity>,
}

impl Alignment<'_> {
    /// Subclass used for stratification: the gold one when there is a gold entity.
    pub fn subclass(&self) -> u8 {
        self.gold
            .or(self.predicted)
            .map(|e| e.subclass)
            .unwrap_or_default()
    }
}

/// Greedy first-found alignment of `gold` against `predicted`. Matched pairs come first, in
/// discovery order, followed by the unmatched gold and then the unmatched predicted entities.
pub fn match_entities<'a, G, P>(
    gold: G,
    predicted: P,
    strictness: Strictness,
) -> Vec<Alignment<'a>>
where
    G: IntoIterator<Item = &'a Entity>,
    P: IntoIterator<Item = &'a Entity>,
{
    let gold: Vec<&Entity> = gold.into_iter().collect();
    let predicted: Vec<&Entity> = predicted.into_iter().collect();
    let mut gold_used = vec![false; gold.len()];
    let mut predicted_used = vec![false; predicted.len()];
    let mut alignments = Vec::with_capacity(gold.len() + predicted.len());

    for (i, g) in gold.iter().enumerate() {
        for (j, p) in predicted.iter().enumerate() {
            if gold_used[i] || predicted_used[j] {
                continue;
            }
            if strictness.matches(g, p) {
                gold_used[i] = true;
                predicted_used[j] = true;
                alignments.push(Alignment {
                    gold: Some(g),
                    predicted: Some(p),
                });
            }
        }
    }
    alignments.extend(
        gold.iter()
            .zip(&gold_used)
            .filter(|(_, used)| !**used)
            .map(|(g, _)| Alignment {
                gold: Some(*g),
                predicted: None,
            }),
    );
    alignments.extend(
        predicted
            .iter()
            .zip(&predicted_used)
            .filter(|(_, used)| !**used)
            .map(|(p, _)| Alignment {
                gold: None,
                predicted: Some(*p),
            }),
    );
    alignments
}

/// Subclass-stratified counts.
pub type SubclassCounts = BTreeMap<u8, Counts>;

/// Evaluation of a dataset per subclass plus the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubclassReport {
    pub subclasses: BTreeMap<u8, Evaluation>,
    pub total: Evaluation,
}

impl SubclassReport {
    /// Every row, subclasses in ascending order then the total.
    pub fn rows(&self) -> impl Iterator<Item = (Bucket, &Evaluation)> {
        self.subclasses
            .iter()
            .map(|(s, e)| (Bucket::Subclass(*s), e))
            .chain(std::iter::once((Bucket::Total, &self.total)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluator {
    pub strictness: Strictness,
    pub strat: DivByZeroStrat,
}

impl Evaluator {
    pub fn new(strictness: Strictness) -> Self {
        Evaluator {
            strictness,
            strat: DivByZeroStrat::default(),
        }
    }

    pub fn division_by_zero(mut self, strat: DivByZeroStrat) -> Self {
        self.strat = strat;
        self
    }

    /// Counts of one part, bucketed by subclass.
    pub fn count_part(&self, part: &Part) -> SubclassCounts {
        let mut counts = SubclassCounts::new();
        let alignments = match_entities(
            &part.annotations,
            &part.predicted_annotations,
            self.strictness,
        );
        let mut leftover_gold = vec![];
        let mut leftover_predicted = vec![];
        for alignment in &alignments {
            let bucket = counts.entry(alignment.subclass()).or_default();
            match (alignment.gold, alignment.predicted) {
                (Some(g), Some(p)) if Strictness::Exact.matches(g, p) => bucket.tp += 1,
                (Some(_), Some(_)) => {
                    bucket.fp_overlap += 1;
                    bucket.fn_overlap += 1;
                }
                (Some(g), None) => leftover_gold.push(g),
                (None, Some(p)) => leftover_predicted.push(p),
                (None, None) => {}
            }
        }

        // Exact leftovers that overlap are boundary errors, not misses. See the module doc.
        let rematch = if self.strictness == Strictness::Exact {
            match_entities(leftover_gold, leftover_predicted, Strictness::Overlapping)
        } else {
            leftover_gold
                .into_iter()
                .map(|g| Alignment {
                    gold: Some(g),
                    predicted: None,
                })
                .chain(leftover_predicted.into_iter().map(|p| Alignment {
                    gold: None,
                    predicted: Some(p),
                }))
                .collect()
        };
        for alignment in rematch {
            let bucket = counts.entry(alignment.subclass()).or_default();
            match (alignment.gold, alignment.predicted) {
                (Some(_), Some(_)) => {
                    bucket.fp_overlap += 1;
                    bucket.fn_overlap += 1;
                }
                (Some(_), None) => bucket.fn_ += 1,
                (None, Some(_)) => bucket.fp += 1,
                (None, None) => {}
            }
        }
        counts
    }

    /// Counts of a dataset, bucketed by subclass.
    pub fn count(&self, dataset: &Dataset) -> SubclassCounts {
        let mut counts = SubclassCounts::new();
        for part in dataset.parts() {
            for (subclass, c) in self.count_part(part) {
                *counts.entry(subclass).or_default() += c;
            }
        }
        counts
    }

    pub fn evaluate(&self, dataset: &Dataset) -> Evaluation {
        self.count(dataset)
            .into_values()
            .sum::<Counts>()
            .evaluate(self.strictness, self.strat)
    }

    pub fn evaluate_subclasses(&self, dataset: &Dataset) -> SubclassReport {
        self.report(&self.count(dataset))
    }

    /// Turns stratified counts into a report, adding the total bucket.
    pub fn report(&self, counts: &SubclassCounts) -> SubclassReport {
        SubclassReport {
            subclasses: counts
                .iter()
                .map(|(s, c)| (*s, c.evaluate(self.strictness, self.strat)))
                .collect(),
            total: counts
                .values()
                .copied()
                .sum::<Counts>()
                .evaluate(self.strictness, self.strat),
        }
    }
}
