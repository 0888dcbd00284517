/*!
Delegated models run as external processes. Datasets cross the process boundary as JSON files in
a scratch directory:

- `<trainer>/train <dataset.json> <model>` trains and writes the model file.
- `<trainer>/tag <model> <input.json> <output.json>` writes the input dataset back with its
  predicted annotations filled in.
- an entity tagger command is called as `<command> [args..] <input.json> <output.json>`.
*/
use crate::data::Dataset;
use crate::error::{Error, Result};
use crate::model::{Annotator, SequenceModel};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn scratch() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix("seedloop-")
        .tempdir()
        .map_err(|e| Error::io(std::env::temp_dir(), e))
}

fn write_dataset(dataset: &Dataset, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path).map_err(|e| Error::io(path, e))?;
    serde_json::to_writer(std::io::BufWriter::new(file), dataset)?;
    Ok(())
}

fn read_dataset(path: &Path) -> Result<Dataset> {
    let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
    Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
}

fn run(command: &mut Command) -> Result<()> {
    tracing::debug!(?command, "running external command");
    let output = command
        .output()
        .map_err(|e| Error::model(format!("could not run {:?}: {}", command.get_program(), e)))?;
    if !output.status.success() {
        return Err(Error::model(format!(
            "{:?} exited with {}: {}",
            command.get_program(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// Copies the predictions of `tagged` into `dataset`, document by document and part by part.
/// With `replace`, the existing predictions are dropped first.
fn merge_predictions(dataset: &mut Dataset, tagged: Dataset, replace: bool) -> Result<()> {
    for (id, tagged_document) in tagged {
        let Some(document) = dataset.get_mut(&id) else {
            tracing::warn!(%id, "tagger returned an unknown document");
            continue;
        };
        for (name, tagged_part) in tagged_document.parts {
            let Some(part) = document.part_mut(&name) else {
                continue;
            };
            if replace {
                part.predicted_annotations.clear();
            }
            for entity in tagged_part.predicted_annotations {
                part.push_prediction(entity)?;
            }
        }
    }
    Ok(())
}

/// Sequence model backed by the `train` and `tag` executables of a trainer installation.
#[derive(Debug, Clone)]
pub struct ExternalCommandModel {
    trainer: PathBuf,
}

impl ExternalCommandModel {
    pub fn new(trainer: impl Into<PathBuf>) -> Result<Self> {
        let trainer = trainer.into();
        if !trainer.is_dir() {
            return Err(Error::MissingTrainer(trainer));
        }
        Ok(ExternalCommandModel { trainer })
    }
}

impl SequenceModel for ExternalCommandModel {
    fn train(&self, dataset: &Dataset, model: &Path) -> Result<()> {
        let dir = scratch()?;
        let input = dir.path().join("train.json");
        write_dataset(dataset, &input)?;
        run(Command::new(self.trainer.join("train"))
            .arg(&input)
            .arg(model))?;
        if !model.exists() {
            return Err(Error::model(format!(
                "trainer did not write {}",
                model.display()
            )));
        }
        Ok(())
    }

    fn tag(&self, dataset: &mut Dataset, model: &Path) -> Result<()> {
        let dir = scratch()?;
        let (input, output) = (dir.path().join("in.json"), dir.path().join("out.json"));
        write_dataset(dataset, &input)?;
        run(Command::new(self.trainer.join("tag"))
            .arg(model)
            .arg(&input)
            .arg(&output))?;
        merge_predictions(dataset, read_dataset(&output)?, true)
    }
}

/// Third-party entity tagger run as a command. Its predictions are added to the existing ones.
#[derive(Debug, Clone)]
pub struct ExternalTagger {
    name: String,
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalTagger {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let name = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("external-tagger"));
        ExternalTagger {
            name,
            program,
            args: vec![],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl Annotator for ExternalTagger {
    fn name(&self) -> &str {
        &self.name
    }

    fn annotate(&self, dataset: &mut Dataset) -> Result<()> {
        let dir = scratch()?;
        let (input, output) = (dir.path().join("in.json"), dir.path().join("out.json"));
        write_dataset(dataset, &input)?;
        run(Command::new(&self.program)
            .args(&self.args)
            .arg(&input)
            .arg(&output))?;
        merge_predictions(dataset, read_dataset(&output)?, false)
    }
}
