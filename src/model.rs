/*!
Seams to the delegated sequence-labelling model and to the other dataset annotators (post
processing, subclass definition, third-party entity taggers). The crate never looks inside a
model; it only asks for training and tagging.
*/
use crate::data::Dataset;
use crate::error::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A trainable tagger whose trained state lives in a single model file.
pub trait SequenceModel: Send + Sync {
    /// Trains on the gold annotations of `dataset` and writes the model to `model`.
    fn train(&self, dataset: &Dataset, model: &Path) -> Result<()>;

    /// Replaces the predicted annotations of `dataset` with the output of the model stored at
    /// `model`.
    fn tag(&self, dataset: &mut Dataset, model: &Path) -> Result<()>;
}

/// Anything that rewrites the annotations of a dataset in place.
pub trait Annotator: Send + Sync {
    fn name(&self) -> &str;

    fn annotate(&self, dataset: &mut Dataset) -> Result<()>;
}

/// A model bound to one model file, followed by the annotators that post-process its output.
/// Running it is what "asking the model" means for the filters.
#[derive(Clone)]
pub struct ModelTagger {
    model: Arc<dyn SequenceModel>,
    model_path: PathBuf,
    post: Vec<Arc<dyn Annotator>>,
}

impl ModelTagger {
    pub fn new(model: Arc<dyn SequenceModel>, model_path: impl Into<PathBuf>) -> Self {
        ModelTagger {
            model,
            model_path: model_path.into(),
            post: vec![],
        }
    }

    /// Appends an annotator run after tagging, in insertion order.
    pub fn then(mut self, annotator: Arc<dyn Annotator>) -> Self {
        self.post.push(annotator);
        self
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

impl Annotator for ModelTagger {
    fn name(&self) -> &str {
        "model"
    }

    fn annotate(&self, dataset: &mut Dataset) -> Result<()> {
        self.model.tag(dataset, &self.model_path)?;
        for annotator in &self.post {
            tracing::trace!(annotator = annotator.name(), "post-processing");
            annotator.annotate(dataset)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::{Entity, MUT_CLASS_ID};
    use std::sync::Mutex;

    /// Model that predicts every occurrence of fixed strings, with a fixed subclass and
    /// confidence. Records how often it was trained.
    #[derive(Default)]
    pub(crate) struct LookupModel {
        pub(crate) mentions: Vec<(String, u8, f64)>,
        pub(crate) trained: Mutex<Vec<usize>>,
    }

    impl LookupModel {
        pub(crate) fn new(mentions: &[(&str, u8, f64)]) -> Self {
            LookupModel {
                mentions: mentions
                    .iter()
                    .map(|(m, s, c)| (m.to_string(), *s, *c))
                    .collect(),
                trained: Mutex::new(vec![]),
            }
        }
    }

    impl SequenceModel for LookupModel {
        fn train(&self, dataset: &Dataset, model: &Path) -> Result<()> {
            self.trained.lock().unwrap().push(dataset.len());
            std::fs::write(model, b"model").map_err(|e| crate::Error::io(model, e))
        }

        fn tag(&self, dataset: &mut Dataset, _model: &Path) -> Result<()> {
            for part in dataset.parts_mut() {
                part.predicted_annotations.clear();
                let text = part.text().to_string();
                for (mention, subclass, confidence) in &self.mentions {
                    for (byte, _) in text.match_indices(mention.as_str()) {
                        let offset = text[..byte].chars().count();
                        part.push_prediction(
                            Entity::predicted(MUT_CLASS_ID, offset, mention, *confidence)
                                .with_subclass(*subclass),
                        )?;
                    }
                }
            }
            Ok(())
        }
    }

    struct Counter(Mutex<usize>);

    impl Annotator for Counter {
        fn name(&self) -> &str {
            "counter"
        }
        fn annotate(&self, dataset: &mut Dataset) -> Result<()> {
            *self.0.lock().unwrap() += dataset.predicted_annotations().count();
            Ok(())
        }
    }

    #[test]
    fn test_model_tagger_runs_post_processing_after_tagging() {
        let counter = Arc::new(Counter(Mutex::new(0)));
        let tagger = ModelTagger::new(
            Arc::new(LookupModel::new(&[("V600E", 0, 0.9)])),
            "unused",
        )
        .then(counter.clone());
        let mut dataset = Dataset::single(
            "1",
            crate::data::Document::new().with_part("abstract", "V600E and V600E"),
        );
        tagger.annotate(&mut dataset).unwrap();
        assert_eq!(*counter.0.lock().unwrap(), 2);
    }
}
