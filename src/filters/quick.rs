use crate::data::{Dataset, Document, SUBCLASS_STANDARD};
use crate::error::Result;
use crate::filters::Verdict;
use crate::model::Annotator;
use std::sync::Arc;

/// Runs the tagger on a copy of each document and accepts it iff the tagger found a
/// non-standard mention it is not sure about (`confidence <= threshold`).
#[derive(Clone)]
pub struct QuickModelFilter {
    tagger: Arc<dyn Annotator>,
    threshold: f64,
}

impl QuickModelFilter {
    pub fn new(tagger: Arc<dyn Annotator>, threshold: f64) -> Self {
        QuickModelFilter { tagger, threshold }
    }

    pub(crate) fn decide(&mut self, id: &str, document: &Document) -> Result<Verdict> {
        let mut copy = Dataset::single(id, document.clone());
        self.tagger.annotate(&mut copy)?;
        let found = copy
            .predicted_annotations()
            .find(|e| e.subclass != SUBCLASS_STANDARD && e.confidence_or_max() <= self.threshold);
        match found {
            Some(entity) => {
                tracing::debug!(%id, %entity, "uncertain non-standard mention");
                Ok(Verdict::Accept)
            }
            None => Ok(Verdict::Reject),
        }
    }
}
