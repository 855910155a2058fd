//! Startup configuration: the initial locale and the output mode. Both
//! take effect once, at startup; the locale can still be switched at
//! runtime through the language commands.

use crate::lang;
use serde::Deserialize;
use snafu::{Backtrace, ResultExt, Snafu};
use std::path::Path;

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("cannot read config {path}: {source}"))]
    ReadConfig {
        path: String,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("config {path} is not valid JSON: {source}"))]
    ParseConfig {
        path: String,
        source: serde_json::Error,
        backtrace: Backtrace,
    },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Initial locale key.
    pub language: String,
    /// Output mode: 0 = template record, 1 = text + favicon, 2 = text.
    #[serde(rename = "type")]
    pub message_type: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: "zh-cn".to_string(),
            message_type: 0,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).context(ReadConfigSnafu {
            path: path.display().to_string(),
        })?;
        serde_json::from_str(&text).context(ParseConfigSnafu {
            path: path.display().to_string(),
        })
    }

    /// Applies the startup settings to process state.
    pub fn apply(&self) {
        lang::init_language(&self.language);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_shipped_behavior() {
        let config = Config::default();
        assert_eq!(config.language, "zh-cn");
        assert_eq!(config.message_type, 0);
    }

    #[test]
    fn deserializes_partial_config() {
        let config: Config = serde_json::from_str(r#"{"type": 1}"#).unwrap();
        assert_eq!(config.message_type, 1);
        assert_eq!(config.language, "zh-cn");

        let config: Config = serde_json::from_str(r#"{"language": "en"}"#).unwrap();
        assert_eq!(config.language, "en");
        assert_eq!(config.message_type, 0);
    }

    #[test]
    fn apply_sets_the_startup_locale() {
        let _guard = lang::test_support::locale_lock();
        Config {
            language: "en".to_string(),
            message_type: 2,
        }
        .apply();
        assert_eq!(lang::current_language(), "en");
        lang::init_language("zh-cn");
    }
}
