//! Build matrix expansion

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;

/// One concrete matrix combination (axis -> value)
pub type MatrixCombination = BTreeMap<String, String>;

/// Matrix configuration as defined in YAML
///
/// Every key other than `include` and `exclude` is an axis:
///
/// ```yaml
/// matrix:
///   python: ["3.6", "3.7"]
///   os: [linux]
///   exclude:
///     - python: "3.6"
///       os: linux
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatrixConfig {
    /// Extra combinations appended after expansion
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<BTreeMap<String, Value>>,

    /// Partial combinations removed from the expansion
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<BTreeMap<String, Value>>,

    /// Axis name -> values
    #[serde(flatten)]
    pub axes: BTreeMap<String, Vec<Value>>,
}

impl MatrixConfig {
    /// Validate axes and include/exclude entries
    pub fn validate(&self) -> Result<()> {
        for (axis, values) in &self.axes {
            if values.is_empty() {
                bail!("Matrix axis '{}' has no values", axis);
            }
            for value in values {
                scalar_to_string(value).map_err(|e| anyhow::anyhow!("Matrix axis '{}': {}", axis, e))?;
            }
        }

        for (kind, entries) in [("include", &self.include), ("exclude", &self.exclude)] {
            for entry in entries {
                if entry.is_empty() {
                    bail!("Matrix {} entry is empty", kind);
                }
                for (axis, value) in entry {
                    // an include-only matrix declares its axes through its entries
                    if !self.axes.is_empty() && !self.axes.contains_key(axis) {
                        bail!("Matrix {} references unknown axis '{}'", kind, axis);
                    }
                    scalar_to_string(value)
                        .map_err(|e| anyhow::anyhow!("Matrix {} '{}': {}", kind, axis, e))?;
                }
            }
        }

        if self.expand()?.is_empty() {
            bail!("Matrix excludes every combination, the stage would have no jobs");
        }

        Ok(())
    }

    /// Expand into concrete combinations
    ///
    /// Cartesian product in axis-name order with values in declared order,
    /// minus every combination matching an `exclude` entry, plus each
    /// `include` entry that is not already present. An empty matrix yields a
    /// single empty combination.
    pub fn expand(&self) -> Result<Vec<MatrixCombination>> {
        let mut combinations: Vec<MatrixCombination> = vec![BTreeMap::new()];

        for (axis, values) in &self.axes {
            let mut next = Vec::with_capacity(combinations.len() * values.len());
            for combination in &combinations {
                for value in values {
                    let mut extended = combination.clone();
                    extended.insert(axis.clone(), scalar_to_string(value)?);
                    next.push(extended);
                }
            }
            combinations = next;
        }

        let excludes = self
            .exclude
            .iter()
            .map(to_combination)
            .collect::<Result<Vec<_>>>()?;
        combinations.retain(|c| !excludes.iter().any(|ex| is_subset(ex, c)));

        for include in &self.include {
            let include = to_combination(include)?;
            if !combinations.contains(&include) {
                // An include only filling in extra keys replaces a bare placeholder
                if combinations.len() == 1 && combinations[0].is_empty() {
                    combinations.clear();
                }
                combinations.push(include);
            }
        }

        Ok(combinations)
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty() && self.include.is_empty()
    }
}

/// Render a combination as `python=3.6, os=linux`
pub fn describe_combination(combination: &MatrixCombination) -> String {
    combination
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

fn to_combination(entry: &BTreeMap<String, Value>) -> Result<MatrixCombination> {
    entry
        .iter()
        .map(|(k, v)| Ok((k.clone(), scalar_to_string(v)?)))
        .collect()
}

fn is_subset(partial: &MatrixCombination, full: &MatrixCombination) -> bool {
    partial.iter().all(|(k, v)| full.get(k) == Some(v))
}

fn scalar_to_string(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => bail!("matrix values must be scalars, got {:?}", other),
    }
}
