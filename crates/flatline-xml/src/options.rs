use serde::Deserialize;

pub const DEFAULT_PATH_SEPARATOR: &str = ".";
pub const DEFAULT_MAX_FIELD_LEN: usize = 300;
pub const DEFAULT_STREAMING_THRESHOLD_MB: u64 = 100;
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;
pub const DEFAULT_MAX_NESTING: usize = 1024;

/// How a document is parsed.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Pick by file size against `streaming_threshold_mb`.
    #[default]
    Auto,
    InMemory,
    Streaming,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlattenOptions {
    /// Explicit record element; auto-detected when unset.
    pub record_tag: Option<String>,
    pub path_separator: String,
    /// Values longer than this many characters are cut. `0` disables.
    pub max_field_len: usize,
    pub include_root: bool,
    pub streaming_threshold_mb: u64,
    pub chunk_size: usize,
    pub max_nesting: usize,
    pub mode: Mode,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            record_tag: None,
            path_separator: DEFAULT_PATH_SEPARATOR.to_string(),
            max_field_len: DEFAULT_MAX_FIELD_LEN,
            include_root: false,
            streaming_threshold_mb: DEFAULT_STREAMING_THRESHOLD_MB,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_nesting: DEFAULT_MAX_NESTING,
            mode: Mode::Auto,
        }
    }
}

impl FlattenOptions {
    pub fn record_tag(mut self, tag: impl Into<String>) -> Self {
        self.record_tag = Some(tag.into());
        self
    }

    pub fn path_separator(mut self, separator: impl Into<String>) -> Self {
        self.path_separator = separator.into();
        self
    }

    pub fn max_field_len(mut self, len: usize) -> Self {
        self.max_field_len = len;
        self
    }

    pub fn include_root(mut self, include: bool) -> Self {
        self.include_root = include;
        self
    }

    pub fn streaming_threshold_mb(mut self, mb: u64) -> Self {
        self.streaming_threshold_mb = mb;
        self
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    pub fn max_nesting(mut self, depth: usize) -> Self {
        self.max_nesting = depth.max(1);
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Whether a document of `size_bytes` should be streamed.
    pub fn should_stream(&self, size_bytes: u64) -> bool {
        match self.mode {
            Mode::InMemory => false,
            Mode::Streaming => true,
            Mode::Auto => size_bytes >= self.streaming_threshold_mb.saturating_mul(1024 * 1024),
        }
    }

    /// Trimmed explicit tag with any namespace prefix removed.
    pub(crate) fn explicit_tag(&self) -> Option<&str> {
        self.record_tag
            .as_deref()
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(|tag| tag.rsplit(':').next().unwrap_or(tag))
    }
}
