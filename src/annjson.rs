/*!
Human-review interchange format. A corpus directory holds one `html/<id>.html` per document (one
element per part, its `id` attribute being the part name) and one `annjson/<id>.ann.json` per
document with the annotations of that document. Reviewed annotations come back as `.ann.json`
files, possibly prefixed (`<anything>-<id>.ann.json`) and possibly nested in sub-directories.

Offsets in `.ann.json` files are character offsets into the part text.
*/
use crate::data::{Dataset, Document, Entity};
use crate::error::{Error, Result};
use crate::selection::DocumentSource;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

pub const HTML_DIR: &str = "html";
pub const ANNJSON_DIR: &str = "annjson";
const HTML_SUFFIX: &str = ".html";
const ANNJSON_SUFFIX: &str = ".ann.json";
const WHO: &str = "ml:seedloop";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnDocument {
    #[serde(default)]
    anncomplete: bool,
    #[serde(default)]
    sources: Vec<Source>,
    #[serde(default)]
    entities: Vec<AnnEntity>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Source {
    name: String,
    id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnEntity {
    class_id: String,
    part: String,
    offsets: Vec<AnnOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confidence: Option<AnnConfidence>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnnOffset {
    start: usize,
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnnConfidence {
    state: String,
    who: Vec<String>,
    prob: f64,
}

/// Which annotation list of a part a file is read into or written from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Gold,
    Predicted,
}

/// What to do with a document whose annotation file is not marked complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Incomplete {
    /// Read its annotations anyway.
    Keep,
    /// Drop the document from the dataset.
    #[default]
    Skip,
    /// Fail the whole import.
    Reject,
}

/// Document id encoded in a file name: `<id><suffix>`.
pub fn document_id<'a>(file_name: &'a str, suffix: &str) -> Option<&'a str> {
    let stem = file_name.strip_suffix(suffix)?;
    (!stem.is_empty()).then_some(stem)
}

/// Known document id a file stem refers to. Annotation tools may prepend `<prefix>-` to the id,
/// so the whole stem is tried first, then what follows each `-` from the left.
pub fn known_id<'a>(stem: &'a str, is_known: impl Fn(&str) -> bool) -> Option<&'a str> {
    std::iter::once(stem)
        .chain(stem.match_indices('-').map(|(i, _)| &stem[i + 1..]))
        .find(|id| !id.is_empty() && is_known(id))
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)
        .map_err(|e| Error::io(dir, e))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::io(dir, e))?;
    entries.sort();
    Ok(entries)
}

/// Files under `dir` (recursively) whose name ends with `suffix`, sorted by path.
fn files_with_suffix(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let mut found = vec![];
    for path in sorted_entries(dir)? {
        if path.is_dir() {
            found.extend(files_with_suffix(&path, suffix)?);
        } else if file_name(&path).ends_with(suffix) {
            found.push(path);
        }
    }
    Ok(found)
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

/// Ids of the documents stored in a corpus directory (its `html/` sub-directory when present)
/// or of the annotation files in a review directory. A missing directory holds no ids.
pub fn list_ids(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }
    let html = dir.join(HTML_DIR);
    let (dir, suffix) = if html.is_dir() {
        (html.as_path(), HTML_SUFFIX)
    } else if files_with_suffix(dir, HTML_SUFFIX).is_ok_and(|f| !f.is_empty()) {
        (dir, HTML_SUFFIX)
    } else {
        (dir, ANNJSON_SUFFIX)
    };
    Ok(files_with_suffix(dir, suffix)?
        .iter()
        .filter_map(|p| document_id(file_name(p), suffix).map(String::from))
        .collect())
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn render_html(id: &str, document: &Document) -> String {
    let id = escape(id);
    let mut html = format!(
        "<!DOCTYPE html>\n<html id=\"{id}\" data-origid=\"{id}\">\n<head>\n<meta charset=\"UTF-8\">\n<title>{id}</title>\n</head>\n<body>\n<article>\n"
    );
    for (name, part) in &document.parts {
        html.push_str(&format!(
            "<section><p id=\"{}\">{}</p></section>\n",
            escape(name),
            escape(part.text())
        ));
    }
    html.push_str("</article>\n</body>\n</html>\n");
    html
}

/// Reads one HTML document; every `h1`-`h3` or `p` element with an `id` becomes a part.
pub fn read_html(path: &Path) -> Result<Document> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let selector = Selector::parse("h1[id], h2[id], h3[id], p[id]")
        .map_err(|e| Error::format(path, format!("{:?}", e)))?;
    let html = Html::parse_document(&raw);
    let mut document = Document::new();
    for element in html.select(&selector) {
        if let Some(name) = element.value().id() {
            document = document.with_part(name, element.text().collect::<String>());
        }
    }
    if document.parts.is_empty() {
        return Err(Error::format(path, "no part found"));
    }
    Ok(document)
}

/// Reads every `*.html` document of `dir`, in file name order.
pub fn read_html_dir(dir: &Path) -> Result<Dataset> {
    let mut dataset = Dataset::new();
    for path in files_with_suffix(dir, HTML_SUFFIX)? {
        let Some(id) = document_id(file_name(&path), HTML_SUFFIX) else {
            continue;
        };
        dataset.insert(id, read_html(&path)?);
    }
    Ok(dataset)
}

pub fn write_html(dataset: &Dataset, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    for (id, document) in dataset.iter() {
        let path = dir.join(format!("{}{}", id, HTML_SUFFIX));
        std::fs::write(&path, render_html(id, document)).map_err(|e| Error::io(&path, e))?;
    }
    Ok(())
}

/// Writes the `layer` annotations of every document. Predictions at or above `threshold` are
/// marked `pre-added` for the reviewer, the others `pre-selected`. Only gold files are marked
/// complete.
pub fn write_annjson(dataset: &Dataset, dir: &Path, layer: Layer, threshold: f64) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    for (id, document) in dataset.iter() {
        let mut ann = AnnDocument {
            anncomplete: layer == Layer::Gold,
            sources: vec![Source {
                name: String::from("MEDLINE"),
                id: id.to_string(),
            }],
            entities: vec![],
        };
        for (name, part) in &document.parts {
            let entities = match layer {
                Layer::Gold => &part.annotations,
                Layer::Predicted => &part.predicted_annotations,
            };
            ann.entities.extend(entities.iter().map(|e| AnnEntity {
                class_id: e.class_id.clone(),
                part: name.clone(),
                offsets: vec![AnnOffset {
                    start: e.offset,
                    text: e.text.clone(),
                }],
                confidence: e.confidence.map(|prob| AnnConfidence {
                    state: String::from(if prob >= threshold {
                        "pre-added"
                    } else {
                        "pre-selected"
                    }),
                    who: vec![String::from(WHO)],
                    prob,
                }),
            }));
        }
        let path = dir.join(format!("{}{}", id, ANNJSON_SUFFIX));
        let file = std::fs::File::create(&path).map_err(|e| Error::io(&path, e))?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &ann)?;
    }
    Ok(())
}

/// Reads every annotation file under `dir` into the `layer` list of the matching document of
/// `dataset`, replacing what the list held. Files of unknown documents are ignored. Returns the
/// number of documents annotated.
pub fn annotate(
    dataset: &mut Dataset,
    dir: &Path,
    layer: Layer,
    incomplete: Incomplete,
) -> Result<usize> {
    let mut annotated = 0;
    for path in files_with_suffix(dir, ANNJSON_SUFFIX)? {
        let Some(stem) = document_id(file_name(&path), ANNJSON_SUFFIX) else {
            continue;
        };
        let Some(id) = known_id(stem, |id| dataset.contains(id)) else {
            tracing::debug!(path = %path.display(), "annotations of unknown document");
            continue;
        };
        let raw = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        let ann: AnnDocument =
            serde_json::from_str(&raw).map_err(|e| Error::format(&path, e.to_string()))?;
        if !ann.anncomplete {
            match incomplete {
                Incomplete::Keep => {}
                Incomplete::Skip => {
                    tracing::warn!(%id, "document is not completely reviewed, ignoring it");
                    dataset.remove(id);
                    continue;
                }
                Incomplete::Reject => {
                    return Err(Error::format(&path, "document is not completely reviewed"))
                }
            }
        }

        let Some(document) = dataset.get_mut(id) else {
            continue;
        };
        for part in document.parts.values_mut() {
            match layer {
                Layer::Gold => part.annotations.clear(),
                Layer::Predicted => part.predicted_annotations.clear(),
            }
        }
        for entity in ann.entities {
            let Some(part) = document.part_mut(&entity.part) else {
                tracing::warn!(%id, part = %entity.part, "annotation of unknown part");
                continue;
            };
            for offset in entity.offsets {
                let mut e = Entity::new(&entity.class_id, offset.start, offset.text);
                e.confidence = match layer {
                    Layer::Gold => None,
                    Layer::Predicted => Some(entity.confidence.as_ref().map_or(1.0, |c| c.prob)),
                };
                let pushed = match layer {
                    Layer::Gold => part.push_annotation(e),
                    Layer::Predicted => part.push_prediction(e),
                };
                pushed.map_err(|err| Error::format(&path, err.to_string()))?;
            }
        }
        annotated += 1;
    }
    Ok(annotated)
}

/// Reads a corpus directory: documents from `html/` and gold annotations from `annjson/`.
pub fn read_corpus(dir: &Path) -> Result<Dataset> {
    let mut dataset = read_html_dir(&dir.join(HTML_DIR))?;
    let annjson = dir.join(ANNJSON_DIR);
    if annjson.is_dir() {
        annotate(&mut dataset, &annjson, Layer::Gold, Incomplete::Keep)?;
    }
    Ok(dataset)
}

/// Writes documents and predictions of `dataset` as a corpus directory for review.
pub fn export(dataset: &Dataset, dir: &Path, threshold: f64) -> Result<()> {
    write_html(dataset, &dir.join(HTML_DIR))?;
    write_annjson(dataset, &dir.join(ANNJSON_DIR), Layer::Predicted, threshold)
}

/// Deletes the files of `reviewed` that belong to none of the documents of `keep`. Returns how
/// many files were removed.
pub fn clean_reviewed(reviewed: &Path, keep: &Dataset) -> Result<usize> {
    if !reviewed.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for path in files_with_suffix(reviewed, "")? {
        let name = file_name(&path);
        let stem = name.split_once('.').map_or(name, |(stem, _)| stem);
        if known_id(stem, |id| keep.contains(id)).is_none() {
            tracing::info!(path = %path.display(), "removing reviewed file of unknown document");
            std::fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Lazy source over a directory of pre-fetched HTML documents.
#[derive(Debug)]
pub struct DirectorySource {
    files: VecDeque<(String, PathBuf)>,
    pending: Option<PathBuf>,
}

impl DirectorySource {
    /// Lists `dir` (or its `html/` sub-directory) up front; documents are only read when fetched.
    pub fn new(dir: &Path) -> Result<Self> {
        let html = dir.join(HTML_DIR);
        let dir = if html.is_dir() { html.as_path() } else { dir };
        let files = files_with_suffix(dir, HTML_SUFFIX)?
            .into_iter()
            .filter_map(|p| {
                let id = document_id(file_name(&p), HTML_SUFFIX)?.to_string();
                Some((id, p))
            })
            .collect();
        Ok(DirectorySource {
            files,
            pending: None,
        })
    }

    pub fn remaining(&self) -> usize {
        self.files.len()
    }
}

impl DocumentSource for DirectorySource {
    fn next_id(&mut self) -> Option<String> {
        let (id, path) = self.files.pop_front()?;
        self.pending = Some(path);
        Some(id)
    }

    fn fetch(&mut self, id: &str) -> Result<Document> {
        let path = self
            .pending
            .take()
            .ok_or_else(|| Error::acquisition(id, "no pending file"))?;
        read_html(&path).map_err(|e| Error::acquisition(id, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::annotated_document;
    use crate::data::MUT_CLASS_ID;
    use rstest::rstest;

    fn candidates() -> Dataset {
        let mut document = Document::new()
            .with_part("title", "BRAF & <CRAF>")
            .with_part("abstract", "The Δ508 and V600E variants.");
        let part = document.part_mut("abstract").unwrap();
        part.push_prediction(Entity::predicted(MUT_CLASS_ID, 4, "Δ508", 0.995))
            .unwrap();
        part.push_prediction(Entity::predicted(MUT_CLASS_ID, 13, "V600E", 0.4))
            .unwrap();
        Dataset::single("12345", document)
    }

    #[rstest]
    #[case("12345.ann.json", Some("12345"))]
    #[case("PMC-42.ann.json", Some("PMC-42"))]
    #[case("12345.html", None)]
    #[case(".ann.json", None)]
    fn test_document_id(#[case] name: &str, #[case] expected: Option<&str>) {
        assert_eq!(document_id(name, ANNJSON_SUFFIX), expected);
    }

    #[rstest]
    #[case("12345", Some("12345"))]
    #[case("aBc-12345", Some("12345"))]
    #[case("PMC-42", Some("PMC-42"))]
    #[case("aBc-PMC-42", Some("PMC-42"))]
    #[case("aBc-7", None)]
    fn test_known_id(#[case] stem: &str, #[case] expected: Option<&str>) {
        let known = ["12345", "PMC-42", "42"];
        assert_eq!(known_id(stem, |id| known.contains(&id)), expected);
    }

    #[test]
    fn test_hyphenated_ids_survive_a_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = Dataset::from_iter([
            (String::from("PMC-42"), annotated_document("V600E", &[(0, "V600E")])),
            (String::from("42"), annotated_document("K27M", &[])),
        ]);
        write_html(&corpus, &dir.path().join(HTML_DIR)).unwrap();
        write_annjson(&corpus, &dir.path().join(ANNJSON_DIR), Layer::Gold, 1.0).unwrap();

        let read = read_corpus(dir.path()).unwrap();
        assert_eq!(read.ids().collect::<Vec<_>>(), vec!["42", "PMC-42"]);
        assert_eq!(read.get("PMC-42").unwrap().annotations().count(), 1);
        assert_eq!(read.get("42").unwrap().annotations().count(), 0);
        assert_eq!(list_ids(dir.path()).unwrap(), vec!["42", "PMC-42"]);

        let keep = Dataset::single("PMC-42", Document::new().with_part("abstract", "V600E"));
        assert_eq!(clean_reviewed(&dir.path().join(ANNJSON_DIR), &keep).unwrap(), 1);
        assert!(dir.path().join(ANNJSON_DIR).join("PMC-42.ann.json").is_file());
    }

    #[test]
    fn test_export_then_import_as_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = candidates();
        export(&dataset, dir.path(), 0.99).unwrap();

        let mut read = read_html_dir(&dir.path().join(HTML_DIR)).unwrap();
        assert_eq!(read.get("12345").unwrap().text(), dataset.get("12345").unwrap().text());
        let n = annotate(
            &mut read,
            &dir.path().join(ANNJSON_DIR),
            Layer::Predicted,
            Incomplete::Keep,
        )
        .unwrap();
        assert_eq!(n, 1);
        assert_eq!(read, dataset);

        let raw =
            std::fs::read_to_string(dir.path().join(ANNJSON_DIR).join("12345.ann.json")).unwrap();
        let ann: AnnDocument = serde_json::from_str(&raw).unwrap();
        assert!(!ann.anncomplete);
        let states: Vec<_> = ann
            .entities
            .iter()
            .map(|e| e.confidence.as_ref().unwrap().state.as_str())
            .collect();
        assert_eq!(states, vec!["pre-added", "pre-selected"]);
    }

    #[rstest]
    #[case(Incomplete::Keep, Some(1))]
    #[case(Incomplete::Skip, Some(0))]
    #[case(Incomplete::Reject, None)]
    fn test_incomplete_review(#[case] policy: Incomplete, #[case] expected: Option<usize>) {
        let dir = tempfile::tempdir().unwrap();
        let mut reviewed = Dataset::single("7", annotated_document("V600E", &[(0, "V600E")]));
        write_annjson(&reviewed, dir.path(), Layer::Predicted, 1.0).unwrap();
        let result = annotate(&mut reviewed, dir.path(), Layer::Gold, policy);
        assert_eq!(result.ok(), expected);
        if policy == Incomplete::Skip {
            assert!(reviewed.is_empty());
        }
    }

    #[test]
    fn test_reviewed_files_are_read_recursively_and_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("member");
        let gold = Dataset::from_iter([
            (String::from("1"), annotated_document("V600E", &[(0, "V600E")])),
            (String::from("2"), annotated_document("K27M", &[(0, "K27M")])),
        ]);
        write_annjson(&gold, &nested, Layer::Gold, 1.0).unwrap();
        std::fs::rename(nested.join("2.ann.json"), nested.join("x-2.ann.json")).unwrap();

        let keep = Dataset::single("2", Document::new().with_part("abstract", "K27M"));
        assert_eq!(clean_reviewed(dir.path(), &keep).unwrap(), 1);

        let mut read = keep.clone();
        annotate(&mut read, dir.path(), Layer::Gold, Incomplete::Reject).unwrap();
        assert_eq!(read.annotations().count(), 1);
    }

    #[test]
    fn test_directory_source_is_lazy() {
        let dir = tempfile::tempdir().unwrap();
        write_html(&candidates(), &dir.path().join(HTML_DIR)).unwrap();
        std::fs::write(dir.path().join(HTML_DIR).join("999.html"), "<html></html>").unwrap();

        let mut source = DirectorySource::new(dir.path()).unwrap();
        assert_eq!(source.remaining(), 2);
        let id = source.next_id().unwrap();
        assert_eq!(id, "12345");
        assert_eq!(source.fetch(&id).unwrap().parts.len(), 2);
        let id = source.next_id().unwrap();
        assert!(matches!(source.fetch(&id), Err(Error::Acquisition { .. })));
        assert!(source.next_id().is_none());
    }
}
