//! Config loading.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::Config;
use crate::error::BrokerError;

/// Load configuration from the given path, or the default location.
///
/// A missing file yields the defaults; a file that exists but does not
/// parse or validate is an error.
pub fn load_config(path: Option<&str>) -> Result<Config, BrokerError> {
    let config_path = match path {
        Some(p) => PathBuf::from(p),
        None => default_config_path(),
    };
    let config = read_config(&config_path)?;
    config.validate()?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<Config, BrokerError> {
    if !path.exists() {
        info!(path = %path.display(), "no config file found, using defaults");
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| BrokerError::Config(format!("failed to read config: {e}")))?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| BrokerError::Config(format!("failed to parse config: {e}")))?;
    info!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Get the default config directory path.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("takeout")
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    config_dir().join("broker.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("takeout-{}-{name}", std::process::id()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("takeout-definitely-missing.toml");
        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.broker.customer_port, 8080);
    }

    #[test]
    fn file_is_parsed_and_validated() {
        let path = scratch_file("ok.toml", "[broker]\ncustomer_port = 9000\n");
        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.broker.customer_port, 9000);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn invalid_file_is_an_error() {
        let path = scratch_file("bad.toml", "restaurants = []\n");
        assert!(matches!(
            load_config(path.to_str()),
            Err(BrokerError::Config(_))
        ));
        std::fs::remove_file(path).unwrap();

        let path = scratch_file("garbage.toml", "[broker\n");
        assert!(matches!(
            load_config(path.to_str()),
            Err(BrokerError::Config(_))
        ));
        std::fs::remove_file(path).unwrap();
    }
}
