/*!
Document filters decide, one document at a time, whether a document is worth showing to a human
annotator. Filters are a closed set of variants behind `DocumentFilter::decide`; new filters are
added as new variants.

A filter applied to a stream of `(id, Document)` pairs (`DocumentFilter::filter`) yields the
accepted pairs in input order and never pulls more input than it needs. The `Stop` verdict ends
the stream: nothing after it is pulled or yielded.
*/
use crate::data::Document;
use crate::error::Result;
use std::fmt::Display;

mod keyword;
mod manual;
mod quick;
mod regex_evidence;

pub use keyword::{KeywordFilter, DEFAULT_KEYWORDS};
pub use manual::{
    highlight, Console, ManualFilter, ManualStatsFilter, ScriptedConsole, Terminal,
};
pub use quick::QuickModelFilter;
pub use regex_evidence::{
    expand_pattern, Evidence, EvidenceSpan, RegexEvidenceFilter, DEFAULT_NL_PATTERNS,
};

/// Outcome of asking a filter about one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject,
    /// Stop the whole selection; the current document is not accepted.
    Stop,
}

pub enum DocumentFilter {
    /// Accepts everything. Used to warm caches without filtering.
    Stub,
    Keyword(KeywordFilter),
    Manual(ManualFilter),
    ManualStats(ManualStatsFilter),
    QuickModel(QuickModelFilter),
    RegexEvidence(RegexEvidenceFilter),
}

impl Display for DocumentFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Stub => "stub",
            Self::Keyword(_) => "keyword",
            Self::Manual(_) => "manual",
            Self::ManualStats(_) => "manual-stats",
            Self::QuickModel(_) => "quick-model",
            Self::RegexEvidence(_) => "regex-evidence",
        };
        write!(f, "{}", name)
    }
}

impl DocumentFilter {
    pub fn decide(&mut self, id: &str, document: &Document) -> Result<Verdict> {
        match self {
            Self::Stub => Ok(Verdict::Accept),
            Self::Keyword(f) => Ok(f.decide(document)),
            Self::Manual(f) => f.decide(id, document),
            Self::ManualStats(f) => f.decide(id, document),
            Self::QuickModel(f) => f.decide(id, document),
            Self::RegexEvidence(f) => f.decide(id, document),
        }
    }

    /// Only the manual variants may block on the operator.
    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Manual(_) | Self::ManualStats(_))
    }

    /// Lazily filters a stream of documents. Errors on a single document are logged and the
    /// document is rejected; fatal errors end the stream like a `Stop`.
    pub fn filter<I>(&mut self, documents: I) -> Filtered<'_, I::IntoIter>
    where
        I: IntoIterator<Item = (String, Document)>,
    {
        Filtered {
            filter: self,
            inner: documents.into_iter(),
            stopped: false,
        }
    }
}

/// Converts a fallible decision into a verdict, failing closed.
pub(crate) fn settle(filter: &DocumentFilter, id: &str, decision: Result<Verdict>) -> Verdict {
    match decision {
        Ok(verdict) => verdict,
        Err(e) if e.is_fatal() => {
            tracing::error!(%id, filter = %filter, error = %e, "filter failed, stopping");
            Verdict::Stop
        }
        Err(e) => {
            tracing::warn!(%id, filter = %filter, error = %e, "filter failed, rejecting document");
            Verdict::Reject
        }
    }
}

/// Iterator returned by `DocumentFilter::filter`.
pub struct Filtered<'f, I> {
    filter: &'f mut DocumentFilter,
    inner: I,
    stopped: bool,
}

impl<I> Iterator for Filtered<'_, I>
where
    I: Iterator<Item = (String, Document)>,
{
    type Item = (String, Document);

    fn next(&mut self) -> Option<Self::Item> {
        while !self.stopped {
            let (id, document) = self.inner.next()?;
            let decision = self.filter.decide(&id, &document);
            match settle(self.filter, &id, decision) {
                Verdict::Accept => return Some((id, document)),
                Verdict::Reject => continue,
                Verdict::Stop => self.stopped = true,
            }
        }
        None
    }
}
