use crate::cache::{Cache, Decision};
use crate::data::Document;
use crate::error::{Error, Result};
use crate::filters::{KeywordFilter, Verdict};
use indexmap::IndexMap;
use itertools::Itertools;
use std::collections::VecDeque;
use std::io::{BufRead, Write};

/// The operator at the other end of a manual filter.
pub trait Console {
    /// Presents a document.
    fn show(&mut self, id: &str, rendered: &str);

    /// Blocks until the operator answers `prompt`. Answers are returned verbatim.
    fn ask(&mut self, prompt: &str) -> Result<String>;
}

/// Console on standard input/output.
#[derive(Debug, Default)]
pub struct Terminal;

impl Console for Terminal {
    fn show(&mut self, id: &str, rendered: &str) {
        println!("http://www.ncbi.nlm.nih.gov/pubmed/{}", id);
        println!("{}", rendered);
    }

    fn ask(&mut self, prompt: &str) -> Result<String> {
        print!("{}", prompt);
        std::io::stdout()
            .flush()
            .map_err(|e| Error::io("<stdout>", e))?;
        let mut line = String::new();
        let read = std::io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| Error::io("<stdin>", e))?;
        if read == 0 {
            return Err(Error::InputClosed);
        }
        Ok(line.trim().to_string())
    }
}

/// Console replaying a fixed list of answers. Useful for unattended runs and tests. Running
/// out of answers behaves like a closed input.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    answers: VecDeque<String>,
    pub shown: Vec<String>,
    pub prompts: usize,
}

impl ScriptedConsole {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedConsole {
            answers: answers.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

impl Console for ScriptedConsole {
    fn show(&mut self, id: &str, _rendered: &str) {
        self.shown.push(id.to_string());
    }

    fn ask(&mut self, _prompt: &str) -> Result<String> {
        self.prompts += 1;
        self.answers.pop_front().ok_or(Error::InputClosed)
    }
}

const HIGHLIGHT: &str = "\x1b[1m\x1b[36m\x1b[4m";
const RESET: &str = "\x1b[0m";

/// Wraps each byte range of `spans` in ANSI bold/cyan/underline. Overlapping or out-of-order
/// spans are merged; ranges that do not fall on character boundaries are ignored.
pub fn highlight(text: &str, spans: &[(usize, usize)]) -> String {
    let mut sorted: Vec<(usize, usize)> = spans
        .iter()
        .copied()
        .filter(|(s, e)| s < e && text.is_char_boundary(*s) && text.is_char_boundary(*e))
        .collect();
    sorted.sort_unstable();

    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(sorted.len());
    for (start, end) in sorted {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }

    let mut out = String::with_capacity(text.len() + merged.len() * 16);
    let mut cursor = 0;
    for (start, end) in merged {
        out.push_str(&text[cursor..start]);
        out.push_str(HIGHLIGHT);
        out.push_str(&text[start..end]);
        out.push_str(RESET);
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}

fn render(document: &Document, highlighter: &KeywordFilter) -> String {
    let text = document.text();
    let spans: Vec<_> = highlighter.matches(&text).collect();
    highlight(&text, &spans)
}

/// Shows each uncached document to the operator and asks for yes, no or stop.
pub struct ManualFilter {
    cache: Cache,
    console: Box<dyn Console>,
    highlighter: KeywordFilter,
}

impl ManualFilter {
    pub fn new(cache: Cache, console: Box<dyn Console>) -> Self {
        ManualFilter {
            cache,
            console,
            highlighter: KeywordFilter::default(),
        }
    }

    pub fn with_highlighter(mut self, highlighter: KeywordFilter) -> Self {
        self.highlighter = highlighter;
        self
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub(crate) fn decide(&mut self, id: &str, document: &Document) -> Result<Verdict> {
        if let Some(decision) = self.cache.get(id) {
            tracing::debug!(%id, accepted = decision.accepted, "cached manual decision");
            return Ok(verdict_of(decision.accepted));
        }

        self.console.show(id, &render(document, &self.highlighter));
        let (accepted, answer) = loop {
            let answer = self.console.ask("do? ")?.to_lowercase();
            match answer.as_str() {
                "y" | "yes" => break (true, answer),
                "n" | "no" => break (false, answer),
                "s" | "stop" => return Ok(Verdict::Stop),
                _ => continue,
            }
        };
        self.cache.insert(
            id,
            Decision {
                accepted,
                answer: Some(answer),
            },
        )?;
        Ok(verdict_of(accepted))
    }
}

/// Like `ManualFilter`, but the operator picks one of several accept labels (or `no`). The chosen
/// label is stored in the cache and a running tally of labels is kept.
pub struct ManualStatsFilter {
    cache: Cache,
    console: Box<dyn Console>,
    highlighter: KeywordFilter,
    yes_answers: Vec<String>,
    tally: IndexMap<String, usize>,
}

impl ManualStatsFilter {
    pub fn new<I, S>(cache: Cache, console: Box<dyn Console>, yes_answers: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let yes_answers: Vec<String> = yes_answers
            .into_iter()
            .map(|a| a.as_ref().trim().to_lowercase())
            .collect();
        if yes_answers.is_empty() {
            return Err(Error::FilterConfig(String::from(
                "at least one accept label is required",
            )));
        }
        if let Some(reserved) = yes_answers.iter().find(|a| *a == "no" || *a == "stop") {
            return Err(Error::FilterConfig(format!(
                "`{}` cannot be an accept label",
                reserved
            )));
        }
        let tally = yes_answers
            .iter()
            .cloned()
            .chain(std::iter::once(String::from("no")))
            .map(|a| (a, 0))
            .collect();
        Ok(ManualStatsFilter {
            cache,
            console,
            highlighter: KeywordFilter::default(),
            yes_answers,
            tally,
        })
    }

    /// Count of each answer given during this run.
    pub fn tally(&self) -> &IndexMap<String, usize> {
        &self.tally
    }

    fn tally_line(&self) -> String {
        self.tally
            .iter()
            .map(|(label, count)| format!("{}: {}", label, count))
            .join("  ")
    }

    pub(crate) fn decide(&mut self, id: &str, document: &Document) -> Result<Verdict> {
        if let Some(decision) = self.cache.get(id) {
            return Ok(verdict_of(decision.accepted));
        }

        self.console.show(id, &render(document, &self.highlighter));
        let answer = loop {
            let prompt = format!("\n{}\n\nDo? (or stop): ", self.tally_line());
            let answer = self.console.ask(&prompt)?.to_lowercase();
            if answer == "stop" {
                tracing::info!(tally = %self.tally_line(), "manual selection stopped");
                return Ok(Verdict::Stop);
            }
            if answer == "no" || self.yes_answers.contains(&answer) {
                break answer;
            }
        };

        *self.tally.entry(answer.clone()).or_default() += 1;
        let accepted = self.yes_answers.contains(&answer);
        self.cache.insert(
            id,
            Decision {
                accepted,
                answer: Some(answer),
            },
        )?;
        Ok(verdict_of(accepted))
    }
}

fn verdict_of(accepted: bool) -> Verdict {
    if accepted {
        Verdict::Accept
    } else {
        Verdict::Reject
    }
}
