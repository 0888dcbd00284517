use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// A sentence of a part, with the character offset at which it starts in the part text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub offset: usize,
    pub text: String,
}

impl Sentence {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Splits `text` on Unicode sentence boundaries (UAX #29). Surrounding whitespace is trimmed
/// from each sentence and whitespace-only segments are dropped; offsets are character offsets
/// into `text`.
pub fn split_sentences(text: &str) -> Vec<Sentence> {
    let mut sentences = vec![];
    let mut chars_before = 0;
    let mut consumed_bytes = 0;
    for (byte_start, segment) in text.split_sentence_bound_indices() {
        // Keep a running character count instead of recounting from the start each time.
        chars_before += text[consumed_bytes..byte_start].chars().count();
        consumed_bytes = byte_start;

        let trimmed_start = segment.trim_start();
        let leading = segment[..segment.len() - trimmed_start.len()].chars().count();
        let trimmed = trimmed_start.trim_end();
        if !trimmed.is_empty() {
            sentences.push(Sentence {
                offset: chars_before + leading,
                text: trimmed.to_string(),
            });
        }
    }
    sentences
}

/// Lower-cases a sentence and replaces the punctuation class `. / \ - ( ) { } [ ] , %` with
/// spaces. Every character maps to exactly one character, so character offsets in the
/// normalized text are valid in the original sentence.
pub fn normalize_sentence(sentence: &str) -> String {
    sentence
        .chars()
        .map(|c| match c {
            '.' | '/' | '\\' | '-' | '(' | ')' | '{' | '}' | '[' | ']' | ',' | '%' => ' ',
            c => {
                let mut lower = c.to_lowercase();
                match (lower.next(), lower.next()) {
                    (Some(l), None) => l,
                    _ => c,
                }
            }
        })
        .collect()
}

/// How sentence offsets and part spans are computed when laying out a document in a single
/// coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OffsetPolicy {
    /// Use the offsets reported by the splitter; a part consumes its full length.
    #[default]
    Measured,
    /// Each sentence starts `n` characters after the end of the previous one and a part
    /// consumes the sum of its sentence lengths plus `n` per sentence.
    FixedSeparator(usize),
}

/// Result of laying out the sentences of one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Start of every sentence relative to the part.
    pub starts: Vec<usize>,
    /// Span the part occupies in the document coordinate space.
    pub consumed: usize,
}

impl OffsetPolicy {
    pub fn layout(&self, sentences: &[Sentence], part_len: usize) -> Layout {
        match self {
            OffsetPolicy::Measured => Layout {
                starts: sentences.iter().map(|s| s.offset).collect(),
                consumed: part_len,
            },
            OffsetPolicy::FixedSeparator(separator) => {
                let mut starts = Vec::with_capacity(sentences.len());
                let mut running = 0;
                for sentence in sentences {
                    starts.push(running);
                    running += sentence.char_len() + separator;
                }
                Layout {
                    starts,
                    consumed: running,
                }
            }
        }
    }
}
