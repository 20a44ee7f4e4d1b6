use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Errors while loading a [`ChipWhispererConfig`].
#[derive(Debug, Error)]
pub enum Error {
    /// The file could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The file is not a valid configuration.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Glitch module settings needed to translate times into registers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChipWhispererConfig {
    /// Glitch clock frequency in Hz (`scope.clock.clkgen_freq`)
    pub clkgen_freq: f64,
    /// Only use whole glitch clock cycles for the offset.
    ///
    /// Needed when the glitch clock cannot be synchronized with the target.
    #[serde(default)]
    pub ext_only: bool,
    /// Dimension holding the glitch offset after the trigger
    pub offset_dimension: String,
    /// Dimension holding the pulse width, if the width is searched
    #[serde(default)]
    pub width_dimension: Option<String>,
}

impl ChipWhispererConfig {
    /// Loads a configuration from a JSON file.
    pub fn from_jsonfile(filepath: &str) -> Result<ChipWhispererConfig, Error> {
        let mut file = File::open(Path::new(filepath))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let config: ChipWhispererConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config() {
        let config = ChipWhispererConfig::from_jsonfile("config/cw-stm32.json")
            .expect("failed to read config file");
        assert_eq!(config.clkgen_freq, 24e6);
        assert!(!config.ext_only);
        assert_eq!(config.offset_dimension, "offset");
        assert_eq!(config.width_dimension.as_deref(), Some("width"));
    }

    #[test]
    fn test_optional_fields() {
        let config: ChipWhispererConfig =
            serde_json::from_str(r#"{ "clkgen-freq": 7384615.384615385, "offset-dimension": "t" }"#)
                .unwrap();
        assert!(!config.ext_only);
        assert_eq!(config.width_dimension, None);
    }
}
