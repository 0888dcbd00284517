/*!
Active-learning bootstrapping of an annotated mention corpus. Each iteration trains a delegated
sequence model on everything annotated so far, selects new documents worth a human's time,
pre-annotates them, hands them to a reviewer and measures how well the model did on the reviewed
batch.

# Iteration layout
```text
<root>/
  stats.csv
  iteration_0/base/{html,annjson}/
  iteration_<n>/
    bin_model
    candidates/{html,annjson}/
    reviewed/
    batch_results.txt
    debug.txt
    cross_validation.csv
```
The state of an iteration is inferred from this layout, see `IterationState`.

# Selection
Candidates are pulled lazily from a `DocumentSource`. Ids seen in an earlier iteration are dropped
before fetching, then every document goes through the content filters left to right:
* the regex evidence filter looks for natural language mentions in normalized sentences, possibly
    corroborated by the current model;
* the manual filter asks the operator, who can also stop the selection. Answers are cached.

# Evaluation
Predicted mentions are matched greedily against the reviewed ones, at `Exact`, `Overlapping` or
`HalfOverlapping` strictness. Counts and metrics are stratified by subclass (standard notation,
natural language and semi-standard mentions) with a total row.
*/

pub mod annjson;
mod cache;
mod config;
mod corpus;
mod cross_validation;
pub mod data;
mod definer;
mod error;
mod external;
pub mod filters;
mod iteration;
mod metrics;
mod model;
mod reporter;
mod selection;

// The public api starts here
pub use error::{Error, Result};

pub use cache::{Cache, Decision};

pub use config::{BootstrapConfig, BootstrapConfigBuilder, CONFIG_FILE};

pub use data::{Dataset, Document, Entity, MergePolicy, OffsetPolicy, Part};

pub use definer::{ExclusiveNlDefiner, PostProcessing};

pub use model::{Annotator, ModelTagger, SequenceModel};

pub use external::{ExternalCommandModel, ExternalTagger};

pub use metrics::{
    match_entities, Alignment, Bucket, Counts, DivByZeroStrat, Evaluation, Evaluator, Strictness,
    SubclassCounts, SubclassReport,
};

pub use selection::{
    AlreadyConsidered, DocumentSource, Ended, IdFilter, MemorySource, Progress, Selection,
    SelectionPipeline,
};

pub use iteration::{
    cumulative_corpus, detect_iteration_number, infer_state, iteration_dir, Iteration,
    IterationState,
};

pub use cross_validation::{Aggregate, CrossValidation, CrossValidationResult, RowLabel};

pub use reporter::{CrossValidationTable, Row, StatsLedger, EVALUATION_COLUMNS};

pub use corpus::{evaluate_corpus, iteration_stats, tag_corpus, CorpusMode, IterationStats};
