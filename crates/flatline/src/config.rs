use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use flatline_archive::{ClassifyOptions, ScanOptions};
use flatline_convert::ConvertOptions;
use flatline_xml::FlattenOptions;
use serde::Deserialize;

/// Settings file layout. Every section and key is optional.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub scan: ScanOptions,
    pub classify: ClassifyOptions,
    pub flatten: FlattenOptions,
    pub convert: ConvertOptions,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Reject settings that would make every run fail.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.scan.max_files == 0 {
            errors.push("scan.max_files must be positive");
        }
        if self.scan.max_compression_ratio <= 1.0 {
            errors.push("scan.max_compression_ratio must be greater than 1");
        }
        if self.flatten.path_separator.is_empty() {
            errors.push("flatten.path_separator must not be empty");
        }
        if self.convert.worker_ceiling == 0 {
            errors.push("convert.worker_ceiling must be positive");
        }
        if self.convert.workers == Some(0) {
            errors.push("convert.workers must be positive");
        }

        if !errors.is_empty() {
            bail!("invalid configuration:\n  - {}", errors.join("\n  - "));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use flatline_convert::OutputFormat;
    use flatline_xml::Mode;

    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.flatten, FlattenOptions::default());
        assert_eq!(config.convert, ConvertOptions::default());
        assert_eq!(config.scan.max_depth, ScanOptions::default().max_depth);
    }

    #[test]
    fn sections_override_selected_keys() {
        let config: Config = toml::from_str(
            r#"
            [scan]
            max_depth = 4

            [classify]
            prefix_tokens = 2
            allow = ["ar", "gl"]

            [flatten]
            record_tag = "invoice"
            mode = "streaming"

            [convert]
            format = "tsv"
            groups = ["AR"]
            timeout_ms = 1000

            [convert.group_overrides]
            "misc.xml" = "GL"
            "#,
        )
        .unwrap();

        assert_eq!(config.scan.max_depth, 4);
        assert_eq!(config.scan.max_files, ScanOptions::default().max_files);
        assert_eq!(config.classify.prefix_tokens, Some(2));
        assert_eq!(config.flatten.record_tag.as_deref(), Some("invoice"));
        assert_eq!(config.flatten.mode, Mode::Streaming);
        assert_eq!(config.convert.format, OutputFormat::Tsv);
        assert_eq!(config.convert.group_overrides["misc.xml"], "GL");
        assert_eq!(config.convert.worker_ceiling, 64);
    }

    #[test]
    fn unknown_sections_are_rejected() {
        assert!(toml::from_str::<Config>("[output]\npath = 'x'").is_err());
    }

    #[test]
    fn validation_reports_every_problem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flatline.toml");
        fs::write(&path, "[scan]\nmax_files = 0\n[convert]\nworker_ceiling = 0\n").unwrap();

        let message = format!("{:#}", Config::load(&path).unwrap_err());
        assert!(message.contains("scan.max_files"));
        assert!(message.contains("convert.worker_ceiling"));
    }

    #[test]
    fn missing_file_names_the_path() {
        let message = format!("{:#}", Config::load(Path::new("/nonexistent/flatline.toml")).unwrap_err());
        assert!(message.contains("/nonexistent/flatline.toml"));
    }
}
