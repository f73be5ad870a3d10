use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::constants;
use crate::error::{CatalogError, Result};

/// Tunable knobs for the similarity scorer and merge engine. Loaded from
/// `config.toml` when present, otherwise the defaults from `constants.rs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub threshold: f64,
    pub title_weight: f64,
    pub date_weight: f64,
    pub venue_weight: f64,
    pub category_weight: f64,
    pub date_window_days: i64,
    pub price_change_threshold: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: constants::MATCH_THRESHOLD,
            title_weight: constants::TITLE_WEIGHT,
            date_weight: constants::DATE_WEIGHT,
            venue_weight: constants::VENUE_WEIGHT,
            category_weight: constants::CATEGORY_WEIGHT,
            date_window_days: constants::DATE_WINDOW_DAYS,
            price_change_threshold: constants::PRICE_CHANGE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub matcher: MatcherConfig,
}

impl Config {
    /// Load configuration from `config.toml`, falling back to defaults when
    /// the file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            CatalogError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load_from("does-not-exist.toml").unwrap();
        assert_eq!(config.matcher.threshold, constants::MATCH_THRESHOLD);
        assert_eq!(config.matcher.date_window_days, constants::DATE_WINDOW_DAYS);
    }

    #[test]
    fn overrides_apply_and_omitted_keys_keep_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[matcher]\nthreshold = 0.8").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.matcher.threshold, 0.8);
        assert_eq!(config.matcher.title_weight, constants::TITLE_WEIGHT);
    }

    #[test]
    fn unreadable_path_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory exists but cannot be read as a file.
        let err = Config::load_from(dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::Config(_)));
    }
}
