use seedloop::annjson::{self, Layer, ANNJSON_DIR, HTML_DIR};
use seedloop::data::MUT_CLASS_ID;
use seedloop::filters::ScriptedConsole;
use seedloop::{
    cumulative_corpus, detect_iteration_number, infer_state, BootstrapConfig,
    BootstrapConfigBuilder, Dataset, Document, Entity, Iteration, IterationState, MemorySource,
    SequenceModel, StatsLedger,
};
use std::path::Path;
use std::sync::{Arc, Mutex};

const MENTION: &str = "glycine to arginine";

/// Model that predicts every occurrence of one mention and remembers the size of its training
/// sets.
#[derive(Default)]
struct DictionaryModel {
    trained: Mutex<Vec<usize>>,
}

impl SequenceModel for DictionaryModel {
    fn train(&self, dataset: &Dataset, model: &Path) -> seedloop::Result<()> {
        self.trained.lock().unwrap().push(dataset.len());
        std::fs::write(model, b"dictionary").unwrap();
        Ok(())
    }

    fn tag(&self, dataset: &mut Dataset, _model: &Path) -> seedloop::Result<()> {
        for part in dataset.parts_mut() {
            part.predicted_annotations.clear();
            let text = part.text().to_string();
            for (byte, _) in text.match_indices(MENTION) {
                let offset = text[..byte].chars().count();
                part.push_prediction(Entity::predicted(MUT_CLASS_ID, offset, MENTION, 0.5))?;
            }
        }
        Ok(())
    }
}

fn document(text: &str, gold: &[(usize, &str)]) -> Document {
    let mut document = Document::new().with_part("abstract", text);
    let part = document.part_mut("abstract").unwrap();
    for (offset, mention) in gold {
        part.push_annotation(Entity::new(MUT_CLASS_ID, *offset, *mention))
            .unwrap();
    }
    document
}

fn setup(root: &Path) -> BootstrapConfig {
    let base = root.join("iteration_0").join("base");
    let seed = Dataset::single("100", document("The V600E mutation.", &[(4, "V600E")]));
    annjson::write_html(&seed, &base.join(HTML_DIR)).unwrap();
    annjson::write_annjson(&seed, &base.join(ANNJSON_DIR), Layer::Gold, 1.0).unwrap();

    let patterns = root.join("patterns.json");
    std::fs::write(&patterns, r#"["glycine"]"#).unwrap();
    BootstrapConfigBuilder::new(root)
        .unwrap()
        .docs(2)
        .pattern_file(patterns)
        .build()
        .unwrap()
}

fn pool() -> MemorySource {
    let documents: Dataset = [
        ("100", "The V600E mutation."),
        ("201", "A glycine to arginine substitution was found."),
        ("202", "Nothing of interest here."),
        ("203", "We saw glycine to arginine and V600E."),
        ("204", "Another glycine to arginine change."),
    ]
    .into_iter()
    .map(|(id, text)| (id.to_string(), document(text, &[])))
    .collect();
    MemorySource::from(documents)
}

#[test]
fn full_iteration_cycle() {
    let root = tempfile::tempdir().unwrap();
    let config = setup(root.path());
    let model = Arc::new(DictionaryModel::default());

    let mut iteration = Iteration::open(config.clone(), model.clone(), None).unwrap();
    assert_eq!(iteration.number(), 1);
    assert_eq!(iteration.state(), IterationState::NeedsTrainingData);
    iteration
        .before_annotation(pool(), Box::new(ScriptedConsole::new(["maybe", "y", "yes"])))
        .unwrap();
    assert_eq!(iteration.state(), IterationState::Exported);
    let selected: Vec<&str> = iteration.candidates().ids().collect();
    assert_eq!(selected, vec!["201", "203"]);
    assert_eq!(*model.trained.lock().unwrap(), vec![1]);

    let candidates = root.path().join("iteration_1").join("candidates");
    assert!(candidates.join("html").join("203.html").is_file());
    assert!(candidates.join("annjson").join("203.ann.json").is_file());
    assert!(root.path().join("iteration_1").join("debug.txt").is_file());
    assert_eq!(infer_state(root.path(), 1), IterationState::Exported);
    assert_eq!(detect_iteration_number(root.path()).unwrap(), 1);

    // The reviewer confirms the mentions, adds a missed one and leaves a stray file behind.
    let mut reviewed = annjson::read_html_dir(&candidates.join("html")).unwrap();
    let reviewed_dir = root.path().join("iteration_1").join("reviewed");
    for (id, offset) in [("201", 2), ("203", 7)] {
        reviewed
            .get_mut(id)
            .unwrap()
            .part_mut("abstract")
            .unwrap()
            .push_annotation(Entity::new(MUT_CLASS_ID, offset, MENTION))
            .unwrap();
    }
    reviewed
        .get_mut("203")
        .unwrap()
        .part_mut("abstract")
        .unwrap()
        .push_annotation(Entity::new(MUT_CLASS_ID, 31, "V600E"))
        .unwrap();
    annjson::write_annjson(&reviewed, &reviewed_dir, Layer::Gold, 1.0).unwrap();
    std::fs::write(reviewed_dir.join("999.ann.json"), "{}").unwrap();

    assert_eq!(infer_state(root.path(), 1), IterationState::Imported);
    assert_eq!(detect_iteration_number(root.path()).unwrap(), 2);

    let mut closing = Iteration::open(config.clone(), model.clone(), Some(1)).unwrap();
    let report = closing.after_annotation().unwrap();
    assert_eq!(closing.state(), IterationState::Closed);
    assert!(!reviewed_dir.join("999.ann.json").exists());
    assert_eq!(report.total.counts.tp, 2);
    assert_eq!(report.total.counts.fn_, 1);
    assert_eq!(report.total.counts.fp, 0);
    assert_eq!(report.total.precision, 1.0);
    assert!((report.total.recall - 2.0 / 3.0).abs() < 1e-9);

    let batch = std::fs::read_to_string(root.path().join("iteration_1").join("batch_results.txt"))
        .unwrap();
    assert!(batch.contains("=====Detailed Results====="));
    assert!(batch.contains("half_overlapping:"));
    let stats = std::fs::read_to_string(root.path().join("stats.csv")).unwrap();
    let lines: Vec<&str> = stats.lines().collect();
    assert_eq!(lines[0], StatsLedger::header());
    assert_eq!(lines.len(), 4);
    assert!(lines[3].starts_with("1, total, 0.99, 2, 0, 1"));

    // The next iteration trains on the seed corpus plus the reviewed batch.
    assert_eq!(cumulative_corpus(&config, 2).unwrap().len(), 3);
    let mut next = Iteration::open(config, model.clone(), None).unwrap();
    assert_eq!(next.number(), 2);
    assert!(next.learning().unwrap());
    assert_eq!(*model.trained.lock().unwrap(), vec![1, 3]);
}

#[test]
fn stop_ends_selection_without_candidates_after_it() {
    let root = tempfile::tempdir().unwrap();
    let config = setup(root.path());
    let model = Arc::new(DictionaryModel::default());
    let mut iteration = Iteration::open(config, model, None).unwrap();
    iteration.learning().unwrap();
    let selection = iteration
        .docselection(pool(), Box::new(ScriptedConsole::new(["y", "stop"])))
        .unwrap();
    assert_eq!(selection.ended, seedloop::Ended::Stopped);
    let selected: Vec<&str> = selection.dataset.ids().collect();
    assert_eq!(selected, vec!["201"]);
    assert_eq!(iteration.state(), IterationState::CandidatesSelected);
}

#[test]
fn answers_are_cached_across_runs() {
    let root = tempfile::tempdir().unwrap();
    let config = setup(root.path());
    let model = Arc::new(DictionaryModel::default());

    let mut first = Iteration::open(config.clone(), model.clone(), None).unwrap();
    first.learning().unwrap();
    first
        .docselection(pool(), Box::new(ScriptedConsole::new(["n", "y", "y"])))
        .unwrap();
    assert_eq!(
        first.candidates().ids().collect::<Vec<_>>(),
        vec!["203", "204"]
    );

    // Same decisions again without asking anything.
    let mut second = Iteration::open(config, model, None).unwrap();
    let selection = second
        .docselection(pool(), Box::new(ScriptedConsole::new(Vec::<String>::new())))
        .unwrap();
    assert_eq!(
        selection.dataset.ids().collect::<Vec<_>>(),
        vec!["203", "204"]
    );
}

#[test]
fn selection_trains_a_fresh_iteration_first() {
    let root = tempfile::tempdir().unwrap();
    let config = setup(root.path());
    let model = Arc::new(DictionaryModel::default());
    let mut iteration = Iteration::open(config, model.clone(), None).unwrap();
    assert_eq!(iteration.state(), IterationState::NeedsTrainingData);

    let selection = iteration
        .selection_pipeline(pool(), Box::new(ScriptedConsole::new(["y", "y"])))
        .unwrap()
        .select(2, false);
    assert_eq!(selection.dataset.ids().collect::<Vec<_>>(), vec!["201", "203"]);
    assert_eq!(*model.trained.lock().unwrap(), vec![1]);
    assert_eq!(iteration.state(), IterationState::Trained);
}

#[test]
fn selected_candidates_survive_a_restart() {
    let root = tempfile::tempdir().unwrap();
    let config = setup(root.path());
    let model = Arc::new(DictionaryModel::default());
    let mut first = Iteration::open(config.clone(), model.clone(), None).unwrap();
    first.learning().unwrap();
    first
        .docselection(pool(), Box::new(ScriptedConsole::new(["y", "y"])))
        .unwrap();
    drop(first);

    let candidates = root.path().join("iteration_1").join("candidates");
    assert!(candidates.join("html").join("201.html").is_file());
    let mut resumed = Iteration::open(config, model, Some(1)).unwrap();
    assert_eq!(resumed.state(), IterationState::CandidatesSelected);
    resumed.tagging().unwrap();
    assert_eq!(resumed.state(), IterationState::Exported);
    assert_eq!(resumed.candidates().ids().collect::<Vec<_>>(), vec!["201", "203"]);
    assert_eq!(resumed.candidates().predicted_annotations().count(), 2);
    assert!(candidates.join("annjson").join("203.ann.json").is_file());
}

#[test]
fn empty_selection_leaves_the_iteration_open() {
    let root = tempfile::tempdir().unwrap();
    let config = setup(root.path());
    let model = Arc::new(DictionaryModel::default());
    let mut iteration = Iteration::open(config, model, None).unwrap();
    iteration.learning().unwrap();
    let err = iteration
        .docselection(pool(), Box::new(ScriptedConsole::new(["stop"])))
        .unwrap_err();
    assert!(matches!(err, seedloop::Error::NoCandidates(1)));
    assert_eq!(iteration.state(), IterationState::Trained);
    assert_eq!(infer_state(root.path(), 1), IterationState::Trained);
    assert!(matches!(
        iteration.tagging(),
        Err(seedloop::Error::InvalidTransition { .. })
    ));
}
