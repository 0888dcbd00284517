use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use seedloop::annjson::DirectorySource;
use seedloop::filters::{DocumentFilter, Terminal};
use seedloop::{
    detect_iteration_number, evaluate_corpus, infer_state, iteration_stats, tag_corpus,
    AlreadyConsidered, BootstrapConfig, BootstrapConfigBuilder, CorpusMode, DivByZeroStrat,
    ExternalCommandModel, ExternalTagger, Iteration, IterationState, Row, SelectionPipeline,
    SequenceModel, Strictness, SubclassReport, EVALUATION_COLUMNS,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(version, about = "Active-learning bootstrapping of an annotated mention corpus")]
struct Args {
    /// Raise the log level (-v debug, -vv trace). Without it, RUST_LOG applies.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Args)]
struct Common {
    /// Bootstrap folder.
    #[arg(long)]
    root: PathBuf,
    /// Trainer installation folder.
    #[arg(long)]
    trainer: Option<PathBuf>,
    /// Folder of pre-fetched documents to select from.
    #[arg(long)]
    pool: Option<PathBuf>,
    /// Confidence from which predictions are pre-added for the reviewer.
    #[arg(long)]
    threshold: Option<f64>,
    #[arg(long)]
    cache_dir: Option<PathBuf>,
    /// Fail the import when a reviewed document is not marked complete.
    #[arg(long)]
    strict_import: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Phase {
    /// Train, select, tag and export candidates.
    Before,
    /// Import and evaluate the delivered review.
    After,
    /// Evaluate a pending review, then start the next iteration.
    Auto,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one iteration of the bootstrapping loop.
    Run {
        #[command(flatten)]
        common: Common,
        #[arg(long)]
        iteration: Option<u32>,
        /// Documents to select.
        #[arg(long)]
        docs: Option<usize>,
        #[arg(long, value_enum, default_value_t = Phase::Auto)]
        phase: Phase,
    },
    /// Select candidates without tagging them.
    Select {
        #[command(flatten)]
        common: Common,
        #[arg(long)]
        count: usize,
        /// Only fetch the documents so that later runs find them cached.
        #[arg(long)]
        just_caching: bool,
    },
    /// Cross-validate the model on the corpus reviewed so far.
    CrossValidate {
        #[command(flatten)]
        common: Common,
        #[arg(long, default_value_t = 10)]
        folds: usize,
        #[arg(long)]
        iteration: Option<u32>,
    },
    /// Tag an external corpus, or evaluate the predictions exported for it.
    TagCorpus {
        #[arg(long)]
        corpus: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        mode: CorpusMode,
        /// Entity tagger command.
        #[arg(long)]
        tagger: Option<PathBuf>,
        #[arg(long, default_value_t = Strictness::Overlapping)]
        strictness: Strictness,
    },
    /// Mention statistics of the reviewed iterations.
    Stats {
        #[arg(long)]
        root: PathBuf,
    },
    /// Print the current iteration and the state of every iteration.
    State {
        #[arg(long)]
        root: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(common: &Common, docs: Option<usize>) -> anyhow::Result<BootstrapConfig> {
    let mut builder = BootstrapConfigBuilder::new(&common.root)
        .with_context(|| format!("could not load the configuration of {}", common.root.display()))?;
    if let Some(trainer) = &common.trainer {
        builder = builder.trainer(trainer);
    }
    if let Some(pool) = &common.pool {
        builder = builder.pool(pool);
    }
    if let Some(threshold) = common.threshold {
        builder = builder.threshold(threshold);
    }
    if let Some(cache_dir) = &common.cache_dir {
        builder = builder.cache_dir(cache_dir);
    }
    if let Some(docs) = docs {
        builder = builder.docs(docs);
    }
    if common.strict_import {
        builder = builder.allow_incomplete(false);
    }
    let config = builder.build().context("invalid bootstrap folder")?;
    tracing::debug!("configuration:\n {}", config);
    Ok(config)
}

fn load_model(config: &BootstrapConfig) -> anyhow::Result<Arc<dyn SequenceModel>> {
    let model = ExternalCommandModel::new(&config.trainer)
        .context("the trainer must be installed before bootstrapping")?;
    Ok(Arc::new(model))
}

fn pool(config: &BootstrapConfig) -> anyhow::Result<DirectorySource> {
    let Some(pool) = &config.pool else {
        bail!("no document pool configured, pass --pool or set `pool` in seedloop.json");
    };
    DirectorySource::new(pool).with_context(|| format!("could not list {}", pool.display()))
}

fn print_report(report: &SubclassReport) {
    println!("subclass, {}", EVALUATION_COLUMNS);
    for (bucket, evaluation) in report.rows() {
        println!("{}", Row::new(vec![bucket.to_string()], evaluation));
    }
}

fn run(
    config: BootstrapConfig,
    number: Option<u32>,
    phase: Phase,
) -> anyhow::Result<()> {
    let model = load_model(&config)?;
    let detected = detect_iteration_number(&config.root)?;
    match phase {
        Phase::Before => {
            let source = pool(&config)?;
            let mut iteration = Iteration::open(config, model, number)?;
            iteration.before_annotation(source, Box::new(Terminal))?;
        }
        Phase::After => {
            let number = number.unwrap_or_else(|| {
                if infer_state(&config.root, detected) >= IterationState::Imported {
                    detected
                } else {
                    detected.saturating_sub(1).max(1)
                }
            });
            let mut iteration = Iteration::open(config, model, Some(number))?;
            print_report(&iteration.after_annotation()?);
        }
        Phase::Auto => {
            let number = number.unwrap_or(detected);
            let previous = number.saturating_sub(1);
            if previous > 0 && infer_state(&config.root, previous) == IterationState::Imported {
                tracing::info!(iteration = previous, "evaluating the delivered review first");
                let mut closing = Iteration::open(config.clone(), model.clone(), Some(previous))?;
                print_report(&closing.after_annotation()?);
            }
            let source = pool(&config)?;
            let mut iteration = Iteration::open(config, model, Some(number))?;
            iteration.before_annotation(source, Box::new(Terminal))?;
        }
    }
    Ok(())
}

fn select(config: BootstrapConfig, count: usize, just_caching: bool) -> anyhow::Result<()> {
    let source = pool(&config)?;
    let selection = if just_caching {
        let number = detect_iteration_number(&config.root)?;
        SelectionPipeline::new(source)
            .id_filter(AlreadyConsidered::scan(&config.root, number)?)
            .filter(DocumentFilter::Stub)
            .select(count, true)
    } else {
        let model = load_model(&config)?;
        let mut iteration = Iteration::open(config, model, None)?;
        iteration
            .selection_pipeline(source, Box::new(Terminal))?
            .select(count, false)
    };
    tracing::info!(ended = ?selection.ended, selected = selection.dataset.len(), "selection done");
    for id in selection.dataset.ids() {
        println!("{}", id);
    }
    Ok(())
}

fn tag_external_corpus(
    corpus: PathBuf,
    out: PathBuf,
    mode: CorpusMode,
    tagger: Option<PathBuf>,
    strictness: Strictness,
) -> anyhow::Result<()> {
    match mode {
        CorpusMode::Predict => {
            let Some(tagger) = tagger else {
                bail!("--tagger is required to tag a corpus");
            };
            let tagged = tag_corpus(&corpus, &out, &ExternalTagger::new(tagger))
                .with_context(|| format!("could not tag {}", corpus.display()))?;
            println!("{} documents tagged into {}", tagged.len(), out.display());
        }
        CorpusMode::Evaluate => {
            let report = evaluate_corpus(&corpus, &out, strictness, DivByZeroStrat::default())
                .with_context(|| format!("could not evaluate {}", out.display()))?;
            print_report(&report);
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    tracing::debug!("seedloop v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Run {
            common,
            iteration,
            docs,
            phase,
        } => run(load_config(&common, docs)?, iteration, phase),
        Command::Select {
            common,
            count,
            just_caching,
        } => select(load_config(&common, None)?, count, just_caching),
        Command::CrossValidate {
            common,
            folds,
            iteration,
        } => {
            let config = load_config(&common, None)?;
            let model = load_model(&config)?;
            let iteration = Iteration::open(config, model, iteration)?;
            let result = iteration.cross_validation(folds)?;
            for (strictness, report) in &result.sum_of_folds {
                println!("{}", strictness);
                print_report(report);
            }
            Ok(())
        }
        Command::TagCorpus {
            corpus,
            out,
            mode,
            tagger,
            strictness,
        } => tag_external_corpus(corpus, out, mode, tagger, strictness),
        Command::Stats { root } => {
            let config = BootstrapConfigBuilder::new(&root)?.build()?;
            let number = detect_iteration_number(&root)?;
            for stats in iteration_stats(&config, number)? {
                println!("{}", stats);
            }
            Ok(())
        }
        Command::State { root } => {
            let number = detect_iteration_number(&root)
                .with_context(|| format!("could not inspect {}", root.display()))?;
            for previous in 1..=number {
                println!("iteration {}: {}", previous, infer_state(&root, previous));
            }
            println!("current iteration: {}", number);
            Ok(())
        }
    }
}
