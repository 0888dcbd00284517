/*!
Configuration of a bootstrapping run. Values come, in increasing priority, from the defaults, from
an optional `seedloop.json` in the bootstrap root and from the builder setters (the command line).
*/
use crate::data::OffsetPolicy;
use crate::error::{Error, Result};
use crate::metrics::DivByZeroStrat;
use either::Either as LeftOrRight;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};

/// Name of the optional configuration file in the bootstrap root.
pub const CONFIG_FILE: &str = "seedloop.json";
const DEFAULT_CACHE_DIR: &str = "cache";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapConfig {
    /// Bootstrap root. Never read from the configuration file, which lives inside it.
    #[serde(skip)]
    pub root: PathBuf,
    /// Installation directory of the external trainer.
    pub trainer: PathBuf,
    /// Predictions at or above this confidence are pre-added for the reviewer.
    pub threshold: f64,
    /// Number of new documents per iteration.
    pub docs: usize,
    /// Confidence at or below which a non-standard prediction makes a document interesting.
    pub quick_threshold: f64,
    pub min_found: usize,
    /// Corroborate regex evidence with the current model.
    pub corroborate: bool,
    pub pattern_file: Option<PathBuf>,
    pub keywords: Option<Vec<String>>,
    /// Accept labels of the statistics variant of the manual filter. The plain yes/no filter is
    /// used when unset.
    pub manual_labels: Option<Vec<String>>,
    pub cache_dir: Option<PathBuf>,
    /// Pool of pre-fetched documents to select from.
    pub pool: Option<PathBuf>,
    /// Secondary entity tagger run after the model when tagging candidates.
    pub entity_tagger: Option<PathBuf>,
    pub offset_policy: OffsetPolicy,
    /// Ignore reviewed documents that are not marked complete instead of failing the import.
    pub allow_incomplete: bool,
    pub division_by_zero: DivByZeroStrat,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        BootstrapConfig {
            root: PathBuf::from("resources/bootstrapping"),
            trainer: PathBuf::from("trainer"),
            threshold: 0.99,
            docs: 10,
            quick_threshold: 1.0,
            min_found: 1,
            corroborate: true,
            pattern_file: None,
            keywords: None,
            manual_labels: None,
            cache_dir: None,
            pool: None,
            entity_tagger: None,
            offset_policy: OffsetPolicy::default(),
            allow_incomplete: true,
            division_by_zero: DivByZeroStrat::default(),
        }
    }
}

impl Display for BootstrapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Bootstrap root: {}\n Trainer: {}\n Export threshold: {}\n Documents per iteration: {}\n Quick model threshold: {}\n Minimum evidence: {}\n Model corroboration: {}\n Cache: {}\n Offset policy: {:?}\n Ignore incomplete reviews: {}\n Division by zero: {:?}",
            self.root.display(),
            self.trainer.display(),
            self.threshold,
            self.docs,
            self.quick_threshold,
            self.min_found,
            self.corroborate,
            self.cache_dir().display(),
            self.offset_policy,
            self.allow_incomplete,
            self.division_by_zero
        )
    }
}

impl BootstrapConfig {
    /// Reads `seedloop.json` from `root` when present, defaults otherwise.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let path = root.join(CONFIG_FILE);
        let mut config = if path.is_file() {
            let raw = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
            tracing::debug!(path = %path.display(), "configuration file loaded");
            serde_json::from_str(&raw).map_err(|e| Error::format(&path, e.to_string()))?
        } else {
            BootstrapConfig::default()
        };
        config.root = root;
        Ok(config)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.root.join(DEFAULT_CACHE_DIR))
    }

    pub fn stats_file(&self) -> PathBuf {
        self.root.join("stats.csv")
    }

    pub fn base_dir(&self) -> PathBuf {
        self.root.join("iteration_0").join("base")
    }
}

/// Builds a `BootstrapConfig`, starting from the configuration file of the root.
pub struct BootstrapConfigBuilder {
    config: BootstrapConfig,
    cache_dir: LeftOrRight<PathBuf, &'static str>,
}

impl BootstrapConfigBuilder {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let config = BootstrapConfig::load(root.as_ref())?;
        let cache_dir = match &config.cache_dir {
            Some(dir) => LeftOrRight::Left(dir.clone()),
            None => LeftOrRight::Right(DEFAULT_CACHE_DIR),
        };
        Ok(BootstrapConfigBuilder { config, cache_dir })
    }

    pub fn trainer(mut self, trainer: impl Into<PathBuf>) -> Self {
        self.config.trainer = trainer.into();
        self
    }
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.config.threshold = threshold;
        self
    }
    pub fn docs(mut self, docs: usize) -> Self {
        self.config.docs = docs;
        self
    }
    pub fn quick_threshold(mut self, threshold: f64) -> Self {
        self.config.quick_threshold = threshold;
        self
    }
    pub fn min_found(mut self, min_found: usize) -> Self {
        self.config.min_found = min_found;
        self
    }
    pub fn corroborate(mut self, corroborate: bool) -> Self {
        self.config.corroborate = corroborate;
        self
    }
    pub fn pattern_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pattern_file = Some(path.into());
        self
    }
    pub fn keywords(mut self, keywords: Vec<String>) -> Self {
        self.config.keywords = Some(keywords);
        self
    }
    pub fn manual_labels(mut self, labels: Vec<String>) -> Self {
        self.config.manual_labels = Some(labels);
        self
    }
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = LeftOrRight::Left(dir.into());
        self
    }
    pub fn pool(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pool = Some(dir.into());
        self
    }
    pub fn entity_tagger(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.entity_tagger = Some(program.into());
        self
    }
    pub fn offset_policy(mut self, policy: OffsetPolicy) -> Self {
        self.config.offset_policy = policy;
        self
    }
    pub fn allow_incomplete(mut self, allow: bool) -> Self {
        self.config.allow_incomplete = allow;
        self
    }
    pub fn division_by_zero(mut self, strat: DivByZeroStrat) -> Self {
        self.config.division_by_zero = strat;
        self
    }

    /// Fails when the bootstrap root does not exist.
    pub fn build(self) -> Result<BootstrapConfig> {
        let mut config = self.config;
        if !config.root.is_dir() {
            return Err(Error::MissingRoot(config.root));
        }
        config.cache_dir = Some(match self.cache_dir {
            LeftOrRight::Left(dir) => dir,
            LeftOrRight::Right(relative) => config.root.join(relative),
        });
        Ok(config)
    }
}
