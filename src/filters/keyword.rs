use crate::data::Document;
use crate::error::Result;
use crate::filters::Verdict;
use regex::{Regex, RegexBuilder};

/// Vocabulary of mutation-related stems used when no keywords are configured.
pub const DEFAULT_KEYWORDS: [&str; 6] = [
    r"mutat\w*",
    r"variat\w*",
    r"substit\w*",
    r"insert\w*",
    r"delet\w*",
    r"snp",
];

/// Accepts a document iff any case-insensitive keyword pattern matches the text of any of its
/// parts.
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    keywords: Vec<Regex>,
}

impl Default for KeywordFilter {
    fn default() -> Self {
        // The default vocabulary is known to compile.
        Self::new(DEFAULT_KEYWORDS).expect("default keywords are valid patterns")
    }
}

impl KeywordFilter {
    pub fn new<I, S>(keywords: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| RegexBuilder::new(k.as_ref()).case_insensitive(true).build())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(KeywordFilter { keywords })
    }

    /// Keyword spans in `text`, as byte ranges.
    pub fn matches<'t>(&'t self, text: &'t str) -> impl Iterator<Item = (usize, usize)> + 't {
        self.keywords
            .iter()
            .flat_map(move |k| k.find_iter(text).map(|m| (m.start(), m.end())))
    }

    pub(crate) fn decide(&self, document: &Document) -> Verdict {
        let found = document
            .parts
            .values()
            .any(|part| self.keywords.iter().any(|k| k.is_match(part.text())));
        if found {
            Verdict::Accept
        } else {
            Verdict::Reject
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("A novel MUTATION in BRAF", Verdict::Accept)]
    #[case("Single nucleotide polymorphisms (SNPs)", Verdict::Accept)]
    #[case("Protein folding kinetics", Verdict::Reject)]
    fn test_default_vocabulary(#[case] text: &str, #[case] expected: Verdict) {
        let document = Document::new()
            .with_part("title", "Title")
            .with_part("abstract", text);
        assert_eq!(KeywordFilter::default().decide(&document), expected);
    }

    #[test]
    fn test_invalid_keyword_fails_at_construction() {
        assert!(KeywordFilter::new(["(unclosed"]).is_err());
    }

    #[test]
    fn test_matches_reports_spans() {
        let filter = KeywordFilter::new(["braf"]).unwrap();
        let spans: Vec<_> = filter.matches("BRAF and braf").collect();
        assert_eq!(spans, vec![(0, 4), (9, 13)]);
    }
}
