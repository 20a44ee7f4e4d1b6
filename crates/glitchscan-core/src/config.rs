use crate::session::SearchConfig;
use crate::space::{Dimension, ParameterSpace, SpaceError};
use crate::strategy::{AdaptiveBisection, Chain, HillClimb, Raster, SearchStrategy};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors while loading a campaign configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The file is not a valid campaign.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// The dimensions do not form a valid space.
    #[error(transparent)]
    Space(#[from] SpaceError),
}

/// Strategy selection for configuration files.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StrategyConfig {
    /// [`Raster`]
    #[default]
    Raster,
    /// [`AdaptiveBisection`]
    Bisection {
        /// Seed lattice slices per dimension
        #[serde(default = "default_seed_divisions", rename = "seed-divisions")]
        seed_divisions: u64,
    },
    /// [`HillClimb`]
    HillClimb {
        /// Largest ring radius in grid steps
        #[serde(default = "default_max_radius", rename = "max-radius")]
        max_radius: u64,
    },
    /// [`Chain`] of the given stages
    Chain {
        /// Stages in order
        stages: Vec<StrategyConfig>,
    },
}

fn default_seed_divisions() -> u64 {
    1
}

fn default_max_radius() -> u64 {
    2
}

impl StrategyConfig {
    /// Instantiates the configured strategy.
    pub fn build(&self) -> Box<dyn SearchStrategy + Send + Sync> {
        match self {
            StrategyConfig::Raster => Box::new(Raster),
            StrategyConfig::Bisection { seed_divisions } => {
                Box::new(AdaptiveBisection::new(*seed_divisions))
            }
            StrategyConfig::HillClimb { max_radius } => Box::new(HillClimb::new(*max_radius)),
            StrategyConfig::Chain { stages } => Box::new(
                stages
                    .iter()
                    .fold(Chain::new(), |chain, stage| chain.then_boxed(stage.build())),
            ),
        }
    }
}

/// Serialized form of [`SearchConfig`]; durations in milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SearchSettings {
    /// See [`SearchConfig::budget`]
    pub budget: u64,
    /// See [`SearchConfig::max_retries`]
    pub max_retries: u32,
    /// Per-trial timeout in milliseconds
    pub trial_timeout_ms: u64,
    /// Pause after each trial in milliseconds
    pub iteration_delay_ms: Option<u64>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        let config = SearchConfig::default();
        SearchSettings {
            budget: config.budget,
            max_retries: config.max_retries,
            trial_timeout_ms: config.trial_timeout.as_millis() as u64,
            iteration_delay_ms: config.iteration_delay.map(|d| d.as_millis() as u64),
        }
    }
}

impl From<SearchSettings> for SearchConfig {
    fn from(settings: SearchSettings) -> Self {
        SearchConfig {
            budget: settings.budget,
            max_retries: settings.max_retries,
            trial_timeout: Duration::from_millis(settings.trial_timeout_ms),
            iteration_delay: settings.iteration_delay_ms.map(Duration::from_millis),
        }
    }
}

/// A glitching campaign: what to search and how.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CampaignConfig {
    /// Dimensions of the parameter space, in order
    pub dimensions: Vec<Dimension>,
    /// Search strategy, raster by default
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Budget, retries and pacing
    #[serde(default)]
    pub search: SearchSettings,
}

impl CampaignConfig {
    /// Loads and validates a campaign from a JSON file.
    pub fn from_jsonfile(filepath: &str) -> Result<CampaignConfig, ConfigError> {
        let mut file = File::open(Path::new(filepath))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_json_str(&contents)
    }

    /// Parses and validates a campaign from a JSON string.
    pub fn from_json_str(json: &str) -> Result<CampaignConfig, ConfigError> {
        let config: CampaignConfig = serde_json::from_str(json)?;
        config.space()?;
        Ok(config)
    }

    /// The parameter space spanned by the configured dimensions.
    pub fn space(&self) -> Result<ParameterSpace, SpaceError> {
        ParameterSpace::new(self.dimensions.clone())
    }

    /// The search configuration.
    pub fn search_config(&self) -> SearchConfig {
        self.search.clone().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAMPAIGN: &str = r#"{
        "dimensions": [
            { "name": "offset", "unit": "microseconds", "min": 10, "max": 60, "resolution": 5 },
            { "name": "repeat", "unit": "cycles", "domain": "discrete", "min": 1, "max": 4, "resolution": 1 }
        ],
        "strategy": {
            "kind": "chain",
            "stages": [
                { "kind": "bisection", "seed-divisions": 2 },
                { "kind": "hill-climb" }
            ]
        },
        "search": { "budget": 200, "trial-timeout-ms": 250 }
    }"#;

    #[test]
    fn test_parse_campaign() {
        let config = CampaignConfig::from_json_str(CAMPAIGN).unwrap();
        let space = config.space().unwrap();
        assert_eq!(space.grid_shape(), vec![11, 4]);
        assert_eq!(
            config.strategy,
            StrategyConfig::Chain {
                stages: vec![
                    StrategyConfig::Bisection { seed_divisions: 2 },
                    StrategyConfig::HillClimb { max_radius: 2 },
                ]
            }
        );
        let search = config.search_config();
        assert_eq!(search.budget, 200);
        assert_eq!(search.max_retries, 2);
        assert_eq!(search.trial_timeout, Duration::from_millis(250));
        assert_eq!(search.iteration_delay, None);
        assert_eq!(config.strategy.build().name(), "chain");
    }

    #[test]
    fn test_defaults() {
        let config = CampaignConfig::from_json_str(
            r#"{ "dimensions": [ { "name": "width", "unit": "nanoseconds", "min": 0, "max": 40, "resolution": 2 } ] }"#,
        )
        .unwrap();
        assert_eq!(config.strategy, StrategyConfig::Raster);
        assert_eq!(config.search_config(), SearchConfig::default());
    }

    #[test]
    fn test_invalid_dimension_rejected() {
        let result = CampaignConfig::from_json_str(
            r#"{ "dimensions": [ { "name": "width", "unit": "nanoseconds", "min": 5, "max": 5, "resolution": 1 } ] }"#,
        );
        assert!(matches!(result, Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_duplicate_dimension_rejected() {
        let result = CampaignConfig::from_json_str(
            r#"{ "dimensions": [
                { "name": "width", "unit": "nanoseconds", "min": 0, "max": 5, "resolution": 1 },
                { "name": "width", "unit": "nanoseconds", "min": 0, "max": 9, "resolution": 1 }
            ] }"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::Space(SpaceError::DuplicateDimension(_)))
        ));
    }
}
