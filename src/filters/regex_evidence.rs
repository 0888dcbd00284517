/*!
High-recall filter for natural language mutation mentions. Every sentence is normalized and
scanned with an ordered list of patterns; a document is accepted when enough sentences carry
evidence, or when the tagger independently flags one of the matched spans as an uncertain
non-standard mention.

Spans are reported in the coordinate space of the whole document: the parts are laid out one after
another as described by the configured `OffsetPolicy`, and each sentence sits at its offset inside
its part.
*/
use crate::data::{
    normalize_sentence, Dataset, Document, Entity, OffsetPolicy, SUBCLASS_STANDARD,
};
use crate::error::{Error, Result};
use crate::filters::Verdict;
use crate::model::Annotator;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;

const AMINO_ACIDS: [&str; 23] = [
    "alanine",
    "arginine",
    "asparagine",
    "aspartic acid",
    "aspartate",
    "cysteine",
    "glutamine",
    "glutamic acid",
    "glutamate",
    "glycine",
    "histidine",
    "isoleucine",
    "leucine",
    "lysine",
    "methionine",
    "phenylalanine",
    "proline",
    "serine",
    "threonine",
    "tryptophan",
    "tyrosine",
    "valine",
    "stop codon",
];

/// Patterns used when no pattern file is configured. They are written against normalized
/// sentences; `{AA}` stands for any amino acid name.
pub const DEFAULT_NL_PATTERNS: [&str; 6] = [
    r"\b{AA}\s+(?:\w+\s+){0,3}(?:to|by|with|for|into)\s+(?:an?\s+)?{AA}\b",
    r"\b(?:substitution|replacement|change|exchange|conversion)s?\s+of\s+(?:an?\s+|the\s+)?{AA}\b",
    r"\b{AA}\s+(?:at\s+|in\s+)?(?:position|residue|codon|amino acid)\s+\d+\b",
    r"\b(?:deletion|insertion|duplication|inversion)s?\s+of\s+(?:\w+\s+){0,3}(?:nucleotides?|bases?|base pairs?|bp|amino acids?|residues?|codons?|exons?)\b",
    r"\b(?:frameshift|nonsense|missense|splice site)\s+(?:mutation|variant|alteration)s?\s+(?:at|in|of)\s+(?:codon|position|exon|intron|residue)\s+\d+\b",
    r"\b(?:\w*\d+\w*\s+){1,3}(?:\w+\s+){1,4}(?:deletion|deleting|deleted|insertion|inserted)\b",
];

/// Replaces every `{AA}` placeholder with an alternation of amino acid names.
pub fn expand_pattern(pattern: &str) -> String {
    if !pattern.contains("{AA}") {
        return pattern.to_string();
    }
    let alternation = format!("(?:{})", AMINO_ACIDS.join("|"));
    pattern.replace("{AA}", &alternation)
}

/// One pattern hit, in document coordinates (characters, end exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvidenceSpan {
    /// Index of the pattern in the filter's pattern list.
    pub pattern: usize,
    pub start: usize,
    pub end: usize,
}

/// Result of scanning one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evidence {
    pub positive_sentences: usize,
    pub spans: Vec<EvidenceSpan>,
    /// Hits per pattern, aligned with the pattern list.
    pub hits: Vec<usize>,
    /// The scan was cut short because a matched span was corroborated by the tagger.
    pub early_accept: bool,
    /// Prediction overlapping the span that ended the scan.
    pub corroborating: Option<Entity>,
}

struct Corroboration {
    tagger: Arc<dyn Annotator>,
    threshold: f64,
}

pub struct RegexEvidenceFilter {
    patterns: Vec<Regex>,
    corroboration: Option<Corroboration>,
    min_found: usize,
    policy: OffsetPolicy,
}

impl RegexEvidenceFilter {
    /// Compiles `patterns` (after `{AA}` expansion). An invalid pattern is an error here, never
    /// later.
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| Regex::new(&expand_pattern(p.as_ref())))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(RegexEvidenceFilter {
            patterns,
            corroboration: None,
            min_found: 1,
            policy: OffsetPolicy::default(),
        })
    }

    pub fn with_default_patterns() -> Result<Self> {
        Self::new(DEFAULT_NL_PATTERNS)
    }

    /// Loads patterns from a JSON file holding an array of strings.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let patterns: Vec<String> = serde_json::from_str(&raw)
            .map_err(|e| Error::format(path, format!("expected an array of patterns: {}", e)))?;
        Self::new(patterns)
    }

    /// Corroborates regex hits with the tagger's own predictions.
    pub fn corroborate_with(mut self, tagger: Arc<dyn Annotator>, threshold: f64) -> Self {
        self.corroboration = Some(Corroboration { tagger, threshold });
        self
    }

    /// Sentences with evidence needed to accept a document, at least 1.
    pub fn min_found(mut self, min_found: usize) -> Result<Self> {
        if min_found == 0 {
            return Err(Error::FilterConfig(String::from("min_found must be at least 1")));
        }
        self.min_found = min_found;
        Ok(self)
    }

    pub fn offset_policy(mut self, policy: OffsetPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Regex::as_str)
    }

    /// Scans every sentence of `document` without involving the tagger.
    pub fn scan(&self, document: &Document) -> Evidence {
        self.scan_until(document, |_| false)
    }

    /// Scans until `accept` returns true for a span, in which case the evidence is marked as an
    /// early accept and the remaining sentences are skipped.
    fn scan_until(
        &self,
        document: &Document,
        mut accept: impl FnMut(&EvidenceSpan) -> bool,
    ) -> Evidence {
        let mut evidence = Evidence {
            hits: vec![0; self.patterns.len()],
            ..Default::default()
        };
        let bases = document.part_bases(self.policy);
        for (part, base) in document.parts.values().zip(bases) {
            let sentences = part.sentences();
            let layout = self.policy.layout(sentences, part.char_len());
            for (sentence, sentence_start) in sentences.iter().zip(layout.starts) {
                let normalized = normalize_sentence(&sentence.text);
                let mut positive = false;
                for (index, pattern) in self.patterns.iter().enumerate() {
                    let Some(m) = pattern.find(&normalized) else {
                        continue;
                    };
                    let from = normalized[..m.start()].chars().count();
                    let span = EvidenceSpan {
                        pattern: index,
                        start: base + sentence_start + from,
                        end: base + sentence_start + from + m.as_str().chars().count(),
                    };
                    evidence.hits[index] += 1;
                    evidence.spans.push(span);
                    positive = true;
                    if accept(&span) {
                        evidence.early_accept = true;
                        evidence.positive_sentences += 1;
                        return evidence;
                    }
                }
                if positive {
                    evidence.positive_sentences += 1;
                }
            }
        }
        evidence
    }

    fn log_hits(&self, id: &str, evidence: &Evidence) {
        for (pattern, hits) in self.patterns.iter().zip(&evidence.hits) {
            if *hits > 0 {
                tracing::debug!(%id, pattern = pattern.as_str(), hits, "pattern hits");
            }
        }
    }

    /// Tags `document` and scans it until a span overlaps an uncertain non-standard prediction.
    /// `None` without corroboration.
    fn corroborated_scan(
        &self,
        id: &str,
        document: &Document,
    ) -> Result<Option<(Evidence, Document)>> {
        let Some(corroboration) = &self.corroboration else {
            return Ok(None);
        };
        let mut tagged = Dataset::single(id, document.clone());
        corroboration.tagger.annotate(&mut tagged)?;
        let Some(tagged_document) = tagged.remove(id) else {
            return Err(Error::model(format!("tagger dropped document {}", id)));
        };
        let bases = tagged_document.part_bases(self.policy);

        let mut corroborating = None;
        let mut evidence = self.scan_until(document, |span| {
            corroborating = tagged_document
                .overlapping_prediction(span.start, span.end, &bases)
                .filter(|e| {
                    e.subclass != SUBCLASS_STANDARD
                        && e.confidence_or_max() <= corroboration.threshold
                })
                .cloned();
            corroborating.is_some()
        });
        evidence.corroborating = corroborating;
        Ok(Some((evidence, tagged_document)))
    }

    pub(crate) fn decide(&mut self, id: &str, document: &Document) -> Result<Verdict> {
        let Some((evidence, tagged_document)) = self.corroborated_scan(id, document)? else {
            let evidence = self.scan(document);
            self.log_hits(id, &evidence);
            return Ok(self.threshold_verdict(id, evidence.positive_sentences));
        };
        self.log_hits(id, &evidence);
        if let Some(mention) = &evidence.corroborating {
            tracing::debug!(%id, mention = %mention.text, "regex evidence corroborated");
            return Ok(Verdict::Accept);
        }

        let non_standard = tagged_document
            .predicted_annotations()
            .filter(|e| e.subclass != SUBCLASS_STANDARD)
            .count();
        let weight = evidence.positive_sentences + non_standard * self.min_found;
        Ok(self.threshold_verdict(id, weight))
    }

    fn threshold_verdict(&self, id: &str, weight: usize) -> Verdict {
        if weight >= self.min_found {
            tracing::debug!(%id, weight, "regex evidence found");
            Verdict::Accept
        } else {
            Verdict::Reject
        }
    }
}
