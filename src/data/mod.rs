/*!
Corpus data model: a `Dataset` maps document ids to `Document`s, a document is an ordered list of
named `Part`s, and each part carries its text, the gold (human) annotations and the predicted
(machine) annotations.

All offsets are *character* offsets into the part text, which is what the review interchange
format uses.
*/
use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::fmt::Display;

mod sentences;

pub use sentences::{normalize_sentence, split_sentences, OffsetPolicy, Sentence};

/// Class id of mutation mentions.
pub const MUT_CLASS_ID: &str = "e_2";

/// Subclass of mentions written in standard notation (e.g. `p.V600E`).
pub const SUBCLASS_STANDARD: u8 = 0;
/// Subclass of natural language mentions (e.g. "valine to glutamic acid substitution").
pub const SUBCLASS_NATURAL_LANGUAGE: u8 = 1;
/// Subclass of semi-standard mentions.
pub const SUBCLASS_SEMI_STANDARD: u8 = 2;

/// An annotated span of a part. Gold entities have no confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub class_id: String,
    #[serde(default)]
    pub subclass: u8,
    pub offset: usize,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Entity {
    pub fn new(class_id: impl Into<String>, offset: usize, text: impl Into<String>) -> Self {
        Entity {
            class_id: class_id.into(),
            subclass: SUBCLASS_STANDARD,
            offset,
            text: text.into(),
            confidence: None,
        }
    }

    pub fn predicted(
        class_id: impl Into<String>,
        offset: usize,
        text: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Entity {
            confidence: Some(confidence),
            ..Entity::new(class_id, offset, text)
        }
    }

    pub fn with_subclass(mut self, subclass: u8) -> Self {
        self.subclass = subclass;
        self
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Exclusive end offset.
    pub fn end(&self) -> usize {
        self.offset + self.len()
    }

    /// Confidence used when comparing against thresholds. Gold entities count as fully
    /// confident.
    pub fn confidence_or_max(&self) -> f64 {
        self.confidence.unwrap_or(1.0)
    }
}

impl Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {:?})",
            self.class_id,
            self.offset,
            self.end(),
            self.text
        )
    }
}

/// A unit of text inside a document, e.g. a title or an abstract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Part {
    text: String,
    #[serde(default)]
    pub annotations: Vec<Entity>,
    #[serde(default)]
    pub predicted_annotations: Vec<Entity>,
    #[serde(skip)]
    sentences: OnceCell<Vec<Sentence>>,
}

impl PartialEq for Part {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
            && self.annotations == other.annotations
            && self.predicted_annotations == other.predicted_annotations
    }
}

impl Part {
    pub fn new(text: impl Into<String>) -> Self {
        Part {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length of the text in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Sentences of the part, computed on first access.
    pub fn sentences(&self) -> &[Sentence] {
        self.sentences.get_or_init(|| split_sentences(&self.text))
    }

    fn check_bounds(&self, entity: &Entity) -> Result<()> {
        let len = self.char_len();
        if entity.end() > len {
            return Err(Error::EntityOutOfBounds {
                offset: entity.offset,
                text: entity.text.clone(),
                len,
            });
        }
        Ok(())
    }

    /// Adds a gold annotation, rejecting entities that do not fit in the text.
    pub fn push_annotation(&mut self, entity: Entity) -> Result<()> {
        self.check_bounds(&entity)?;
        self.annotations.push(entity);
        Ok(())
    }

    /// Adds a predicted annotation, rejecting entities that do not fit in the text.
    pub fn push_prediction(&mut self, entity: Entity) -> Result<()> {
        self.check_bounds(&entity)?;
        self.predicted_annotations.push(entity);
        Ok(())
    }
}

/// A document is an ordered mapping of part name to `Part`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub parts: IndexMap<String, Part>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper adding a part with the given text.
    pub fn with_part(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.parts.insert(name.into(), Part::new(text));
        self
    }

    pub fn part(&self, name: &str) -> Option<&Part> {
        self.parts.get(name)
    }

    pub fn part_mut(&mut self, name: &str) -> Option<&mut Part> {
        self.parts.get_mut(name)
    }

    /// Text of every part joined by a single space.
    pub fn text(&self) -> String {
        self.parts
            .values()
            .map(Part::text)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn annotations(&self) -> impl Iterator<Item = &Entity> {
        self.parts.values().flat_map(|p| p.annotations.iter())
    }

    pub fn predicted_annotations(&self) -> impl Iterator<Item = &Entity> {
        self.parts.values().flat_map(|p| p.predicted_annotations.iter())
    }

    /// Start offset of each part in the document coordinate space, where parts are laid out one
    /// after another and each part consumes the span reported by `policy`.
    pub fn part_bases(&self, policy: OffsetPolicy) -> Vec<usize> {
        let mut bases = Vec::with_capacity(self.parts.len());
        let mut base = 0;
        for part in self.parts.values() {
            bases.push(base);
            base += policy.layout(part.sentences(), part.char_len()).consumed;
        }
        bases
    }

    /// First predicted annotation whose document-coordinate span intersects `[start, end)`.
    /// `bases` must come from `part_bases`.
    pub fn overlapping_prediction(
        &self,
        start: usize,
        end: usize,
        bases: &[usize],
    ) -> Option<&Entity> {
        self.parts
            .values()
            .zip(bases)
            .flat_map(|(part, base)| part.predicted_annotations.iter().map(move |e| (e, base)))
            .find(|(e, base)| {
                let (e_start, e_end) = (*base + e.offset, *base + e.end());
                e_start < end && start < e_end
            })
            .map(|(e, _)| e)
    }
}

/// What to do when two datasets share a document id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Fail on the first shared id.
    Reject,
    /// The document of the dataset being merged in replaces the existing one.
    #[default]
    LastWins,
}

/// Training and held-out halves of one cross-validation fold.
#[derive(Debug, Clone, Default)]
pub struct Fold {
    pub train: Dataset,
    pub test: Dataset,
}

/// Mapping of document id to `Document`, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    documents: IndexMap<String, Document>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dataset holding a single document.
    pub fn single(id: impl Into<String>, document: Document) -> Self {
        let mut dataset = Dataset::new();
        dataset.insert(id, document);
        dataset
    }

    /// Inserts a document, returning the one previously stored under the same id.
    pub fn insert(&mut self, id: impl Into<String>, document: Document) -> Option<Document> {
        self.documents.insert(id.into(), document)
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.documents.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Document> {
        self.documents.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Document> {
        self.documents.shift_remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.documents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Document)> {
        self.documents.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Document)> {
        self.documents.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn parts(&self) -> impl Iterator<Item = &Part> {
        self.documents.values().flat_map(|d| d.parts.values())
    }

    pub fn parts_mut(&mut self) -> impl Iterator<Item = &mut Part> {
        self.documents.values_mut().flat_map(|d| d.parts.values_mut())
    }

    pub fn annotations(&self) -> impl Iterator<Item = &Entity> {
        self.parts().flat_map(|p| p.annotations.iter())
    }

    pub fn predicted_annotations(&self) -> impl Iterator<Item = &Entity> {
        self.parts().flat_map(|p| p.predicted_annotations.iter())
    }

    /// Merges `other` into `self`. Documents of `other` keep their relative order and are
    /// appended after the existing ones.
    pub fn extend_dataset(&mut self, other: Dataset, policy: MergePolicy) -> Result<()> {
        for (id, document) in other.documents {
            if self.documents.contains_key(&id) {
                match policy {
                    MergePolicy::Reject => return Err(Error::DuplicateDocument(id)),
                    MergePolicy::LastWins => {
                        tracing::warn!(%id, "document present twice, keeping the latest copy");
                    }
                }
            }
            self.documents.insert(id, document);
        }
        Ok(())
    }

    /// Drops every part without gold annotations, then every document left without parts.
    pub fn prune(&mut self) {
        for document in self.documents.values_mut() {
            document.parts.retain(|_, part| !part.annotations.is_empty());
        }
        self.documents.retain(|_, document| !document.parts.is_empty());
    }

    /// Deterministic k-fold partition over the sorted document ids. Fold `i` tests on the `i`-th
    /// contiguous block of ids; the first `len % k` blocks hold one extra document. Every
    /// document is tested exactly once.
    pub fn n_fold_split(&self, folds: usize) -> Result<Vec<Fold>> {
        if folds < 2 || folds > self.len() {
            return Err(Error::InvalidFolds {
                documents: self.len(),
                folds,
            });
        }
        let mut ids: Vec<&String> = self.documents.keys().collect();
        ids.sort();

        let base = ids.len() / folds;
        let extra = ids.len() % folds;
        let mut result = Vec::with_capacity(folds);
        let mut start = 0;
        for fold in 0..folds {
            let size = base + usize::from(fold < extra);
            let test_ids = &ids[start..start + size];
            let mut split = Fold::default();
            for id in ids.iter() {
                let document = self.documents[id.as_str()].clone();
                if test_ids.contains(id) {
                    split.test.insert(id.as_str(), document);
                } else {
                    split.train.insert(id.as_str(), document);
                }
            }
            result.push(split);
            start += size;
        }
        Ok(result)
    }
}

impl IntoIterator for Dataset {
    type Item = (String, Document);
    type IntoIter = indexmap::map::IntoIter<String, Document>;
    fn into_iter(self) -> Self::IntoIter {
        self.documents.into_iter()
    }
}

impl FromIterator<(String, Document)> for Dataset {
    fn from_iter<T: IntoIterator<Item = (String, Document)>>(iter: T) -> Self {
        Dataset {
            documents: iter.into_iter().collect(),
        }
    }
}
