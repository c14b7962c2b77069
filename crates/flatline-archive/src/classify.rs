//! Business-module classification from container names.
//!
//! Walking a container chain outer to inner, the first container that is
//! neither a root container (timestamped export bundles, long descriptive
//! names) nor a batch container (`1_BATCH.zip`) names the group. Batch
//! containers inherit whatever their parent resolved to.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::error::{Error, Result};

pub const ROOT_GROUP: &str = "ROOT";

const DEFAULT_MAX_PLAIN_NAME_LEN: usize = 48;

static BATCH_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\d+[_-]?BATCH").unwrap());

static TIMESTAMP_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{8}|\d{4}[-_.]\d{2}[-_.]\d{2}").unwrap());

static NUMBER_PREFIX_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+[_\-. ]+").unwrap());

/// Trim and uppercase a group key.
pub fn canonical_group(name: &str) -> String {
    name.trim().to_uppercase()
}

/// Decides whether a container name belongs to a naming class.
pub trait ContainerPredicate: Send + Sync {
    fn matches(&self, name: &str) -> bool;
}

impl<F> ContainerPredicate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn matches(&self, name: &str) -> bool {
        self(name)
    }
}

/// Regex-backed predicate.
#[derive(Clone, Debug)]
pub struct PatternPredicate(Regex);

impl PatternPredicate {
    pub fn new(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|source| Error::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }
}

impl ContainerPredicate for PatternPredicate {
    fn matches(&self, name: &str) -> bool {
        self.0.is_match(name)
    }
}

/// Default root-container heuristic: a date/timestamp or an overlong name.
#[derive(Clone, Copy, Debug)]
pub struct TimestampOrLongName {
    pub max_plain_len: usize,
}

impl ContainerPredicate for TimestampOrLongName {
    fn matches(&self, name: &str) -> bool {
        TIMESTAMP_REGEX.is_match(name) || name.chars().count() > self.max_plain_len
    }
}

/// Default batch-container heuristic: `^\d+[_-]?BATCH`, case-insensitive.
#[derive(Clone, Copy, Debug, Default)]
pub struct NumberedBatch;

impl ContainerPredicate for NumberedBatch {
    fn matches(&self, name: &str) -> bool {
        BATCH_REGEX.is_match(name)
    }
}

/// Serializable classification settings.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifyOptions {
    /// Replaces the timestamp/long-name root heuristic.
    pub root_pattern: Option<String>,
    /// Replaces the `^\d+[_-]?BATCH` batch heuristic.
    pub batch_pattern: Option<String>,
    pub max_plain_name_len: usize,
    pub prefix_tokens: Option<usize>,
    pub allow: Vec<String>,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self {
            root_pattern: None,
            batch_pattern: None,
            max_plain_name_len: DEFAULT_MAX_PLAIN_NAME_LEN,
            prefix_tokens: None,
            allow: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct GroupClassifier {
    root: Arc<dyn ContainerPredicate>,
    batch: Arc<dyn ContainerPredicate>,
    prefix_tokens: Option<usize>,
    allow: Option<HashSet<String>>,
}

impl Default for GroupClassifier {
    fn default() -> Self {
        GroupClassifier::builder().build()
    }
}

impl fmt::Debug for GroupClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupClassifier")
            .field("prefix_tokens", &self.prefix_tokens)
            .field("allow", &self.allow)
            .finish_non_exhaustive()
    }
}

impl GroupClassifier {
    pub fn builder() -> GroupClassifierBuilder {
        GroupClassifierBuilder::default()
    }

    pub fn from_options(options: &ClassifyOptions) -> Result<Self> {
        let mut builder = GroupClassifier::builder().root_predicate(TimestampOrLongName {
            max_plain_len: options.max_plain_name_len,
        });
        if let Some(ref pattern) = options.root_pattern {
            builder = builder.root_predicate(PatternPredicate::new(pattern)?);
        }
        if let Some(ref pattern) = options.batch_pattern {
            builder = builder.batch_predicate(PatternPredicate::new(pattern)?);
        }
        if let Some(tokens) = options.prefix_tokens {
            builder = builder.prefix_tokens(tokens);
        }
        if !options.allow.is_empty() {
            builder = builder.allow(options.allow.iter());
        }
        Ok(builder.build())
    }

    /// Canonical module name for one container, or `None` when the
    /// container carries no business meaning.
    pub fn module_name(&self, container: &str) -> Option<String> {
        let stem = container_stem(container);
        let stem = stem.trim();
        if stem.is_empty() || self.batch.matches(stem) || self.root.matches(stem) {
            return None;
        }

        let stripped = NUMBER_PREFIX_REGEX.replace(stem, "");
        let stripped = stripped.trim();
        if stripped.is_empty() {
            return None;
        }

        let name = match self.prefix_tokens {
            Some(n) if n > 0 => stripped.split('_').take(n).collect::<Vec<_>>().join("_"),
            _ => stripped.to_string(),
        };

        let canonical = canonical_group(&name);
        match self.allow {
            Some(ref allow) if !allow.contains(&canonical) => None,
            _ => Some(canonical),
        }
    }

    /// One step of the outer-to-inner walk.
    pub fn resolve(&self, inherited: Option<&str>, container: &str) -> Option<String> {
        match inherited {
            Some(group) => Some(group.to_string()),
            None => self.module_name(container),
        }
    }

    pub fn classify<S: AsRef<str>>(&self, chain: &[S]) -> String {
        chain
            .iter()
            .find_map(|container| self.module_name(container.as_ref()))
            .unwrap_or_else(|| ROOT_GROUP.to_string())
    }
}

fn container_stem(container: &str) -> String {
    let last = container.rsplit(['/', '\\']).next().unwrap_or(container);
    let path = Path::new(last);
    match path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase()) {
        Some(ext) if ext == "zip" || ext == "xml" => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        _ => last.to_string(),
    }
}

pub struct GroupClassifierBuilder {
    root: Arc<dyn ContainerPredicate>,
    batch: Arc<dyn ContainerPredicate>,
    prefix_tokens: Option<usize>,
    allow: Option<HashSet<String>>,
}

impl Default for GroupClassifierBuilder {
    fn default() -> Self {
        Self {
            root: Arc::new(TimestampOrLongName {
                max_plain_len: DEFAULT_MAX_PLAIN_NAME_LEN,
            }),
            batch: Arc::new(NumberedBatch),
            prefix_tokens: None,
            allow: None,
        }
    }
}

impl GroupClassifierBuilder {
    pub fn root_predicate(mut self, predicate: impl ContainerPredicate + 'static) -> Self {
        self.root = Arc::new(predicate);
        self
    }

    pub fn batch_predicate(mut self, predicate: impl ContainerPredicate + 'static) -> Self {
        self.batch = Arc::new(predicate);
        self
    }

    pub fn prefix_tokens(mut self, tokens: usize) -> Self {
        self.prefix_tokens = Some(tokens);
        self
    }

    pub fn allow<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allow = Some(groups.into_iter().map(|g| canonical_group(g.as_ref())).collect());
        self
    }

    pub fn build(self) -> GroupClassifier {
        GroupClassifier {
            root: self.root,
            batch: self.batch,
            prefix_tokens: self.prefix_tokens,
            allow: self.allow,
        }
    }
}
