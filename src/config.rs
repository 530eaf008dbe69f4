use alloc::sync::Arc;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::TiledCopyError;
use crate::layout::{Layout, MajorOrder, Shape};
use crate::partition::{CopyPlan, PartitionPolicy, ThreadArrangement};

/// Static mutex holding the harness configuration, initialized as `None`.
static HARNESS_CONFIG: spin::Mutex<Option<Arc<HarnessConfig>>> = spin::Mutex::new(None);

/// Which partitioning policies the harness runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicySelection {
    /// Scalar, striped partitions only.
    Striped,
    /// Vector-wide partitions only.
    #[default]
    Vectorized,
    /// Both, checking that they agree bit for bit.
    Both,
}

/// Configuration of the copy harness.
///
/// Defaults copy a `(256, 512)` column-major `f32` buffer in `(128, 64)` tiles with `(32, 8)`
/// units per tile and `(4, 1)` vectors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Full buffer shape.
    #[serde(default = "default_shape")]
    pub shape: Shape,

    /// Shape of the tile handled by one cube.
    #[serde(default = "default_tile")]
    pub tile: Shape,

    /// Arrangement of the units of a cube over a tile.
    #[serde(default = "default_threads")]
    pub threads: Shape,

    /// Vector shape used by the vectorized policy.
    #[serde(default = "default_vector")]
    pub vector: Shape,

    /// Memory order of the buffers.
    #[serde(default)]
    pub layout: MajorOrder,

    /// Policies to run.
    #[serde(default)]
    pub policy: PolicySelection,

    /// Number of mismatches reported before giving up.
    #[serde(default = "default_error_limit")]
    pub error_limit: usize,
}

fn default_shape() -> Shape {
    Shape::new(256, 512)
}

fn default_tile() -> Shape {
    Shape::new(128, 64)
}

fn default_threads() -> Shape {
    Shape::new(32, 8)
}

fn default_vector() -> Shape {
    Shape::new(4, 1)
}

fn default_error_limit() -> usize {
    10
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            shape: default_shape(),
            tile: default_tile(),
            threads: default_threads(),
            vector: default_vector(),
            layout: MajorOrder::default(),
            policy: PolicySelection::default(),
            error_limit: default_error_limit(),
        }
    }
}

impl HarnessConfig {
    /// Retrieves the current configuration, loading it from the current directory if not set.
    ///
    /// The first call looks for `tiled-copy.toml` in the current directory or its parents,
    /// then applies environment overrides. A malformed file isn't cached, so the error is
    /// reported again on the next call.
    pub fn get() -> Result<Arc<Self>, TiledCopyError> {
        let mut state = HARNESS_CONFIG.lock();
        if let Some(config) = state.as_ref() {
            return Ok(config.clone());
        }

        let config = Arc::new(Self::from_current_dir()?.override_from_env());
        *state = Some(config.clone());

        Ok(config)
    }

    /// Overrides configuration fields based on environment variables.
    pub fn override_from_env(self) -> Self {
        self.override_from(|key| std::env::var(key).ok())
    }

    /// Overrides configuration fields from `lookup`, ignoring unknown values.
    pub fn override_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(val) = lookup("TILED_COPY_POLICY") {
            match val.as_str() {
                "striped" => self.policy = PolicySelection::Striped,
                "vectorized" => self.policy = PolicySelection::Vectorized,
                "both" => self.policy = PolicySelection::Both,
                other => log::warn!("Ignoring unknown TILED_COPY_POLICY={other}"),
            }
        }

        if let Some(val) = lookup("TILED_COPY_LAYOUT") {
            match val.as_str() {
                "column" | "column_major" => self.layout = MajorOrder::ColumnMajor,
                "row" | "row_major" => self.layout = MajorOrder::RowMajor,
                other => log::warn!("Ignoring unknown TILED_COPY_LAYOUT={other}"),
            }
        }

        if let Some(val) = lookup("TILED_COPY_ERROR_LIMIT") {
            match val.parse() {
                Ok(limit) => self.error_limit = limit,
                Err(_) => log::warn!("Ignoring non-numeric TILED_COPY_ERROR_LIMIT={val}"),
            }
        }

        self
    }

    // Traverses up the directory tree until a config file is found or the root is reached.
    fn from_current_dir() -> Result<Self, TiledCopyError> {
        let Ok(mut dir) = std::env::current_dir() else {
            return Ok(Self::default());
        };

        loop {
            let path = dir.join("tiled-copy.toml");
            if path.is_file() {
                log::debug!("Loading harness config from {}", path.display());
                return Self::from_file_path(path);
            }

            if !dir.pop() {
                break;
            }
        }

        Ok(Self::default())
    }

    /// Loads configuration from a specified file path.
    pub fn from_file_path<P: AsRef<Path>>(path: P) -> Result<Self, TiledCopyError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|err| TiledCopyError::Config(err.to_string()))?;

        Self::from_toml(&content)
    }

    /// Parses a configuration from TOML text; missing fields take their default.
    pub fn from_toml(content: &str) -> Result<Self, TiledCopyError> {
        toml::from_str(content).map_err(|err| TiledCopyError::Config(err.to_string()))
    }

    /// The plans selected by [policy](Self::policy), validated.
    ///
    /// With [PolicySelection::Both] the striped plan comes first.
    pub fn plans(&self) -> Result<Vec<CopyPlan>, TiledCopyError> {
        let layout = Layout::new(self.shape, self.layout);
        let threads = ThreadArrangement::new(self.threads);
        let vectorized = PartitionPolicy::Vectorized {
            vector: self.vector,
        };

        let policies = match self.policy {
            PolicySelection::Striped => vec![PartitionPolicy::Striped],
            PolicySelection::Vectorized => vec![vectorized],
            PolicySelection::Both => vec![PartitionPolicy::Striped, vectorized],
        };

        policies
            .into_iter()
            .map(|policy| CopyPlan::new(layout, self.tile, threads, policy))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_gives_defaults() {
        let config = HarnessConfig::from_toml("").unwrap();

        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn partial_file_overrides_fields() {
        let config = HarnessConfig::from_toml(
            r#"
            policy = "both"
            layout = "row_major"
            shape = { rows = 64, cols = 64 }
            vector = { rows = 1, cols = 4 }
            "#,
        )
        .unwrap();

        assert_eq!(config.policy, PolicySelection::Both);
        assert_eq!(config.layout, MajorOrder::RowMajor);
        assert_eq!(config.shape, Shape::new(64, 64));
        assert_eq!(config.vector, Shape::new(1, 4));
        assert_eq!(config.tile, Shape::new(128, 64));
        assert_eq!(config.error_limit, 10);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let err = HarnessConfig::from_toml("policy = 3").unwrap_err();

        assert!(matches!(err, TiledCopyError::Config(_)));
    }

    #[test]
    fn environment_overrides_file() {
        let config = HarnessConfig::default().override_from(|key| match key {
            "TILED_COPY_POLICY" => Some("striped".into()),
            "TILED_COPY_LAYOUT" => Some("row".into()),
            "TILED_COPY_ERROR_LIMIT" => Some("3".into()),
            _ => None,
        });

        assert_eq!(config.policy, PolicySelection::Striped);
        assert_eq!(config.layout, MajorOrder::RowMajor);
        assert_eq!(config.error_limit, 3);
    }

    #[test]
    fn unknown_environment_values_are_ignored() {
        let config = HarnessConfig::default().override_from(|key| match key {
            "TILED_COPY_POLICY" => Some("diagonal".into()),
            "TILED_COPY_ERROR_LIMIT" => Some("many".into()),
            _ => None,
        });

        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn both_policies_run_striped_first() {
        let config = HarnessConfig {
            policy: PolicySelection::Both,
            ..Default::default()
        };
        let plans = config.plans().unwrap();

        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].policy(), PartitionPolicy::Striped);
        assert_eq!(
            plans[1].policy(),
            PartitionPolicy::Vectorized {
                vector: Shape::new(4, 1)
            }
        );
    }

    #[test]
    fn default_plan_matches_launch_geometry() {
        let plans = HarnessConfig::default().plans().unwrap();

        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].grid(), Shape::new(2, 8));
        assert_eq!(plans[0].units_per_tile(), 256);
        assert_eq!(plans[0].chunks_per_unit(), 8);
    }
}
