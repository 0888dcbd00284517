/*!
Dataset annotators owned by this crate: the subclass definer, which tells standard mutation
notation apart from natural language mentions, and the post-processing pass that cleans the
boundaries of predicted mentions.
*/
use crate::data::{
    Dataset, Entity, MUT_CLASS_ID, SUBCLASS_NATURAL_LANGUAGE, SUBCLASS_SEMI_STANDARD,
    SUBCLASS_STANDARD,
};
use crate::error::Result;
use crate::model::Annotator;
use regex::{Regex, RegexSet};

/// Mention shapes written in standard notation (HGVS-like descriptions, protein one-letter
/// substitutions, dbSNP ids).
const STANDARD_NOTATION: [&str; 6] = [
    r"^(?:p\.)?[ACDEFGHIKLMNPQRSTVWY]\d+(?:[ACDEFGHIKLMNPQRSTVWY*X]|fs\*?\d*|del|dup|ins[A-Z]+)$",
    r"^p\.\(?[A-Z][a-z]{2}\d+(?:[A-Z][a-z]{2}|\*|Ter|fs(?:\*\d+)?|del|dup)\)?$",
    r"^[cgmnr]\.[-*]?\d+(?:[+-]\d+)?(?:_[-*]?\d+(?:[+-]\d+)?)?[ACGTUacgtu]>[ACGTUacgtu]$",
    r"^[cgmnr]\.[-*]?\d+(?:[+-]\d+)?(?:_[-*]?\d+(?:[+-]\d+)?)?(?:del|dup|inv|ins|delins)[ACGTUacgtu\d]*$",
    r"^rs\d+$",
    r"^[ACGT]\d+[ACGT]$",
];

/// Assigns every mutation mention exactly one subclass: standard notation, natural language or
/// semi-standard. Other classes are left alone.
pub struct ExclusiveNlDefiner {
    standard: RegexSet,
    word: Regex,
    min_words: usize,
}

impl Default for ExclusiveNlDefiner {
    fn default() -> Self {
        Self::new(3)
    }
}

impl ExclusiveNlDefiner {
    /// `min_words` is the number of words from which a mention that is not standard notation
    /// counts as natural language.
    pub fn new(min_words: usize) -> Self {
        // Both expressions are constants.
        ExclusiveNlDefiner {
            standard: RegexSet::new(STANDARD_NOTATION).expect("standard notation patterns"),
            word: Regex::new(r"^[A-Za-z]{3,}$").expect("word pattern"),
            min_words,
        }
    }

    pub fn define_string(&self, text: &str) -> u8 {
        let text = text.trim();
        if self.standard.is_match(text) {
            return SUBCLASS_STANDARD;
        }
        let words: Vec<&str> = text.split_whitespace().collect();
        let spelled = words.iter().filter(|w| self.word.is_match(w)).count();
        if words.len() >= self.min_words || (words.len() > 1 && spelled == words.len()) {
            SUBCLASS_NATURAL_LANGUAGE
        } else {
            SUBCLASS_SEMI_STANDARD
        }
    }

    fn define_entity(&self, entity: &mut Entity) {
        if entity.class_id == MUT_CLASS_ID {
            entity.subclass = self.define_string(&entity.text);
        }
    }
}

impl Annotator for ExclusiveNlDefiner {
    fn name(&self) -> &str {
        "exclusive-nl-definer"
    }

    fn annotate(&self, dataset: &mut Dataset) -> Result<()> {
        for part in dataset.parts_mut() {
            part.annotations
                .iter_mut()
                .chain(part.predicted_annotations.iter_mut())
                .for_each(|e| self.define_entity(e));
        }
        Ok(())
    }
}

const TRAILING: &[char] = &['.', ',', ';', ':', '!', '?'];

/// Trims whitespace, trailing punctuation and unbalanced brackets from predicted mentions, then
/// drops the mentions left empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostProcessing;

impl PostProcessing {
    /// Returns the trimmed `(offset, text)` of a mention, or `None` when nothing is left.
    pub fn trim(offset: usize, text: &str) -> Option<(usize, String)> {
        let mut chars: Vec<char> = text.chars().collect();
        let mut offset = offset;
        loop {
            let before = chars.len();
            while chars
                .first()
                .is_some_and(|c| c.is_whitespace() || (*c == '(' && !closes(&chars)))
            {
                chars.remove(0);
                offset += 1;
            }
            while chars.last().is_some_and(|c| {
                c.is_whitespace() || TRAILING.contains(c) || (*c == ')' && !opens(&chars))
            }) {
                chars.pop();
            }
            if chars.len() == before {
                break;
            }
        }
        (!chars.is_empty()).then(|| (offset, chars.into_iter().collect()))
    }
}

fn opens(chars: &[char]) -> bool {
    chars.iter().filter(|c| **c == '(').count() >= chars.iter().filter(|c| **c == ')').count()
}

fn closes(chars: &[char]) -> bool {
    chars.iter().filter(|c| **c == ')').count() >= chars.iter().filter(|c| **c == '(').count()
}

impl Annotator for PostProcessing {
    fn name(&self) -> &str {
        "post-processing"
    }

    fn annotate(&self, dataset: &mut Dataset) -> Result<()> {
        for part in dataset.parts_mut() {
            let predicted = std::mem::take(&mut part.predicted_annotations);
            for mut entity in predicted {
                match Self::trim(entity.offset, &entity.text) {
                    Some((offset, text)) => {
                        entity.offset = offset;
                        entity.text = text;
                        part.predicted_annotations.push(entity);
                    }
                    None => tracing::trace!(%entity, "dropping empty prediction"),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Document;
    use rstest::rstest;

    #[rstest]
    #[case("V600E", SUBCLASS_STANDARD)]
    #[case("p.V600E", SUBCLASS_STANDARD)]
    #[case("p.Val600Glu", SUBCLASS_STANDARD)]
    #[case("c.1799T>A", SUBCLASS_STANDARD)]
    #[case("c.35delG", SUBCLASS_STANDARD)]
    #[case("rs113488022", SUBCLASS_STANDARD)]
    #[case("valine to glutamic acid substitution at codon 600", SUBCLASS_NATURAL_LANGUAGE)]
    #[case("glycine arginine", SUBCLASS_NATURAL_LANGUAGE)]
    #[case("Val600Glu", SUBCLASS_SEMI_STANDARD)]
    #[case("600 V>E", SUBCLASS_SEMI_STANDARD)]
    fn test_define_string(#[case] text: &str, #[case] expected: u8) {
        assert_eq!(ExclusiveNlDefiner::default().define_string(text), expected);
    }

    #[test]
    fn test_definer_only_touches_mutations() {
        let mut document = Document::new().with_part("abstract", "BRAF glycine to arginine");
        let part = document.part_mut("abstract").unwrap();
        part.push_annotation(Entity::new("e_1", 0, "BRAF").with_subclass(7))
            .unwrap();
        part.push_prediction(Entity::predicted(MUT_CLASS_ID, 5, "glycine to arginine", 0.5))
            .unwrap();
        let mut dataset = Dataset::single("1", document);
        ExclusiveNlDefiner::default().annotate(&mut dataset).unwrap();
        let part = dataset.get("1").unwrap().part("abstract").unwrap();
        assert_eq!(part.annotations[0].subclass, 7);
        assert_eq!(part.predicted_annotations[0].subclass, SUBCLASS_NATURAL_LANGUAGE);
    }

    #[rstest]
    #[case(3, " V600E.", Some((4, "V600E")))]
    #[case(0, "(V600E", Some((1, "V600E")))]
    #[case(0, "p.(V600E)", Some((0, "p.(V600E)")))]
    #[case(0, "V600E),", Some((0, "V600E")))]
    #[case(0, " ., ", None)]
    fn test_trim(
        #[case] offset: usize,
        #[case] text: &str,
        #[case] expected: Option<(usize, &str)>,
    ) {
        let trimmed = PostProcessing::trim(offset, text);
        assert_eq!(trimmed.as_ref().map(|(o, t)| (*o, t.as_str())), expected);
    }

    #[test]
    fn test_post_processing_drops_empty() {
        let mut document = Document::new().with_part("abstract", "x V600E. y");
        let part = document.part_mut("abstract").unwrap();
        part.push_prediction(Entity::predicted(MUT_CLASS_ID, 2, "V600E.", 0.9))
            .unwrap();
        part.push_prediction(Entity::predicted(MUT_CLASS_ID, 7, ". ", 0.9))
            .unwrap();
        let mut dataset = Dataset::single("1", document);
        PostProcessing.annotate(&mut dataset).unwrap();
        let predicted = &dataset.get("1").unwrap().part("abstract").unwrap().predicted_annotations;
        assert_eq!(predicted.len(), 1);
        assert_eq!(predicted[0].text, "V600E");
    }
}
