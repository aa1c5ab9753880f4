//! Analysis and loader options
//!
//! Plain option structs with defaults, loadable from JSON documents. Missing
//! fields take their default value.

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::probability::Probability;
use crate::pwn_method::PwnMethodBitmap;

/// Which adjacency map an expansion walks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Who can reach the seeds (walks incoming edges)
    #[default]
    Forward,
    /// What the seeds can reach (walks outgoing edges)
    Reverse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzeObjectsOptions {
    pub method_filter: PwnMethodBitmap,
    pub direction: Direction,
    /// Round cap; `None` expands until nothing new is found
    pub max_depth: Option<u32>,
    /// Per-node edge cap; 0 disables the cap
    pub max_fanout: usize,
    pub min_probability: Probability,
    /// Follow edges back into objects finalized in earlier rounds
    pub backlinks: bool,
}

impl Default for AnalyzeObjectsOptions {
    fn default() -> Self {
        Self {
            method_filter: PwnMethodBitmap::all(),
            direction: Direction::Forward,
            max_depth: None,
            max_fanout: 0,
            min_probability: Probability::NEVER,
            backlinks: false,
        }
    }
}

impl AnalyzeObjectsOptions {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzePathsOptions {
    pub method_filter: PwnMethodBitmap,
    pub min_probability: Probability,
}

impl Default for AnalyzePathsOptions {
    fn default() -> Self {
        Self {
            method_filter: PwnMethodBitmap::all(),
            min_probability: Probability::NEVER,
        }
    }
}

impl AnalyzePathsOptions {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Configuration for bulk loading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Maximum concurrent producer threads
    pub max_workers: usize,
    /// Objects admitted per store lock acquisition
    pub batch_size: usize,
    /// Whether to keep loading after a producer fails
    pub continue_on_error: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            batch_size: 1000,
            continue_on_error: true,
        }
    }
}

impl LoaderConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PwnError;
    use crate::pwn_method::PwnMethod;

    #[test]
    fn test_defaults() {
        let options = AnalyzeObjectsOptions::default();
        assert_eq!(options.direction, Direction::Forward);
        assert_eq!(options.method_filter, PwnMethodBitmap::all());
        assert_eq!(options.min_probability, Probability::NEVER);
        assert!(options.max_depth.is_none());
    }

    #[test]
    fn test_partial_document() {
        let options = AnalyzeObjectsOptions::from_json_str(
            r#"{"direction": "reverse", "max_depth": 3, "method_filter": ["ResetPassword", "memberofgroup"]}"#,
        )
        .unwrap();
        assert_eq!(options.direction, Direction::Reverse);
        assert_eq!(options.max_depth, Some(3));
        assert_eq!(options.method_filter.count(), 2);
        assert!(options.method_filter.is_set(PwnMethod::MemberOfGroup));
        assert_eq!(options.max_fanout, 0);
    }

    #[test]
    fn test_out_of_range_probability_rejected() {
        let json = r#"{"min_probability": 250}"#;
        assert!(matches!(
            AnalyzeObjectsOptions::from_json_str(json),
            Err(PwnError::ConfigError(_))
        ));
        assert!(matches!(
            AnalyzePathsOptions::from_json_str(json),
            Err(PwnError::ConfigError(_))
        ));
    }

    #[test]
    fn test_unknown_method_rejected() {
        let result = AnalyzePathsOptions::from_json_str(r#"{"method_filter": ["Teleport"]}"#);
        assert!(matches!(result, Err(PwnError::ConfigError(_))));
    }

    #[test]
    fn test_round_trip() {
        let options = AnalyzePathsOptions {
            method_filter: PwnMethodBitmap::from(PwnMethod::DcSync),
            min_probability: Probability::new(25),
        };
        let json = serde_json::to_string(&options).unwrap();
        assert_eq!(AnalyzePathsOptions::from_json_str(&json).unwrap(), options);

        let loader = LoaderConfig::from_json_str(r#"{"max_workers": 8}"#).unwrap();
        assert_eq!(loader.max_workers, 8);
        assert_eq!(loader.batch_size, 1000);
    }
}
