/*!
Text reports written to the bootstrap folder: the `stats.csv` ledger shared by every iteration,
the `batch_results.txt` of a reviewed batch and the per-iteration `cross_validation.csv`.
*/
use crate::error::{Error, Result};
use crate::metrics::{Alignment, Evaluation, Strictness, SubclassReport};
use indexmap::IndexMap;
use itertools::Itertools;
use std::fmt::Display;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Columns shared by every CSV report, after the row labels.
pub const EVALUATION_COLUMNS: &str =
    "tp, fp, fn, fp_overlap, fn_overlap, precision, recall, f1-score";

/// One CSV line: free-form labels followed by the eight evaluation columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    labels: Vec<String>,
    values: [f64; 8],
}

impl Row {
    pub fn new(labels: Vec<String>, evaluation: &Evaluation) -> Self {
        Self::from_values(labels, evaluation.to_array())
    }

    /// Row of already aggregated values, such as column means.
    pub fn from_values(labels: Vec<String>, values: [f64; 8]) -> Self {
        Row { labels, values }
    }

    pub fn values(&self) -> &[f64; 8] {
        &self.values
    }
}

impl Display for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let values = self.values.iter().map(|v| v.to_string());
        write!(f, "{}", self.labels.iter().cloned().chain(values).join(", "))
    }
}

fn append_lines(path: &Path, lines: impl IntoIterator<Item = String>) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::io(path, e))?;
    for line in lines {
        writeln!(file, "{}", line).map_err(|e| Error::io(path, e))?;
    }
    Ok(())
}

/// Append-only evaluation history of the whole bootstrap, one row per subclass and per
/// aggregate.
#[derive(Debug, Clone)]
pub struct StatsLedger {
    path: PathBuf,
}

impl StatsLedger {
    pub fn header() -> String {
        format!("iteration_number, subclass, threshold, {}", EVALUATION_COLUMNS)
    }

    /// Opens the ledger at `path`, writing the header when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            append_lines(&path, [Self::header()])?;
        }
        Ok(StatsLedger { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends every row of `report` under the given iteration and export threshold.
    pub fn append(&self, iteration: u32, threshold: f64, report: &SubclassReport) -> Result<()> {
        append_lines(
            &self.path,
            report.rows().map(|(bucket, evaluation)| {
                Row::new(
                    vec![
                        iteration.to_string(),
                        bucket.to_string(),
                        threshold.to_string(),
                    ],
                    evaluation,
                )
                .to_string()
            }),
        )
    }
}

fn mention(alignment: Option<&crate::data::Entity>) -> &str {
    alignment.map(|e| e.text.as_str()).unwrap_or("")
}

/// Writes the review summary of a batch: the side by side listing of annotated and predicted
/// mentions, one metrics line per strictness, then the stratified figures as JSON.
pub fn write_batch_results(
    path: &Path,
    alignments: &[Alignment<'_>],
    detailed: &[(Strictness, Evaluation)],
    raw: &IndexMap<Strictness, SubclassReport>,
) -> Result<()> {
    let width = alignments
        .iter()
        .map(|a| mention(a.gold).chars().count())
        .chain(std::iter::once("=====Annotated=====".len()))
        .max()
        .unwrap_or_default();
    let mut out = String::new();
    out.push_str(&format!(
        "{:<width$}\t|\t=====Predicted=====\n",
        "=====Annotated====="
    ));
    for alignment in alignments {
        out.push_str(&format!(
            "{:<width$}\t|\t{}\n",
            mention(alignment.gold),
            mention(alignment.predicted)
        ));
    }
    out.push_str(&"-".repeat(80));
    out.push_str("\n\n\n=====Detailed Results=====\n");
    for (strictness, e) in detailed {
        let c = &e.counts;
        out.push_str(&format!(
            "{}:\nTP={}\tFP={}\tFN={}\tFP_OVERLAP={}\tFN_OVERLAP={}\tPREC={:.3}%\tRECALL={:.3}%\tF-MEAS={:.3}%\n",
            strictness,
            c.tp,
            c.fp,
            c.fn_,
            c.fp_overlap,
            c.fn_overlap,
            100.0 * e.precision,
            100.0 * e.recall,
            100.0 * e.f1
        ));
    }
    out.push_str("\nRaw-Data:\n");
    out.push_str(&serde_json::to_string_pretty(raw)?);
    out.push('\n');
    std::fs::write(path, out).map_err(|e| Error::io(path, e))
}

/// Per-iteration cross-validation table. The file is truncated on creation.
#[derive(Debug)]
pub struct CrossValidationTable {
    path: PathBuf,
}

impl CrossValidationTable {
    pub fn header() -> String {
        format!("fold, strictness, subclass, {}", EVALUATION_COLUMNS)
    }

    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        std::fs::write(&path, format!("{}\n", Self::header())).map_err(|e| Error::io(&path, e))?;
        Ok(CrossValidationTable { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends the rows of one report under `label`, which names a fold or an aggregate.
    pub fn append(
        &self,
        label: impl Display,
        strictness: Strictness,
        report: &SubclassReport,
    ) -> Result<()> {
        let label = label.to_string();
        append_lines(
            &self.path,
            report.rows().map(|(bucket, evaluation)| {
                Row::new(
                    vec![label.clone(), strictness.to_string(), bucket.to_string()],
                    evaluation,
                )
                .to_string()
            }),
        )
    }

    pub fn append_rows(&self, rows: impl IntoIterator<Item = Row>) -> Result<()> {
        append_lines(&self.path, rows.into_iter().map(|r| r.to_string()))
    }
}
