//! Job matrix - parameter axes and their cross-product

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

/// One named axis with its ordered values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixAxis {
    pub name: String,
    pub values: Vec<String>,
}

impl MatrixAxis {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// One combination of matrix values, in axis declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixCell {
    values: Vec<(String, String)>,
}

impl MatrixCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut cell = Self::new();
        for (key, value) in pairs {
            cell.set(key, value);
        }
        cell
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Insert a value, overwriting an existing key in place
    pub fn set(&mut self, key: String, value: String) {
        match self.values.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.values.push((key, value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Values joined for display, e.g. `3.7, ubuntu`
    pub fn label(&self) -> String {
        self.values
            .iter()
            .map(|(_, v)| v.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// True when every pair of `entry` is present in this cell
    fn contains_all(&self, entry: &MatrixCell) -> bool {
        entry.iter().all(|(k, v)| self.get(k) == Some(v))
    }
}

/// Declared matrix: axes plus `include` / `exclude` adjustments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Matrix {
    pub axes: Vec<MatrixAxis>,
    pub include: Vec<MatrixCell>,
    pub exclude: Vec<MatrixCell>,
}

impl Matrix {
    /// Parse the `strategy.matrix` mapping of a job
    pub fn from_mapping(mapping: &Mapping) -> Result<Self> {
        let mut matrix = Matrix::default();

        for (key, value) in mapping {
            let Some(name) = key.as_str() else {
                bail!("Matrix keys must be strings, got {:?}", key);
            };

            match name {
                "include" => matrix.include = parse_entries(name, value)?,
                "exclude" => matrix.exclude = parse_entries(name, value)?,
                axis => {
                    let Value::Sequence(items) = value else {
                        bail!("Matrix axis '{}' must be a list of values", axis);
                    };
                    let values = items.iter().map(render_value).collect();
                    matrix.axes.push(MatrixAxis::new(axis, values));
                }
            }
        }

        Ok(matrix)
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty() && self.include.is_empty()
    }

    fn is_axis(&self, key: &str) -> bool {
        self.axes.iter().any(|a| a.name == key)
    }

    /// Expand into job configurations.
    ///
    /// Cross-product of the axes (first axis varies slowest), minus every
    /// combination matching an `exclude` entry, plus `include` entries. An
    /// include entry extends each combination whose original axis values it
    /// agrees with; if it agrees with none it becomes a combination of its own.
    pub fn expand(&self) -> Vec<MatrixCell> {
        let mut cells = if self.axes.is_empty() {
            Vec::new()
        } else {
            let mut product = vec![MatrixCell::new()];
            for axis in &self.axes {
                let mut next = Vec::with_capacity(product.len() * axis.values.len());
                for cell in &product {
                    for value in &axis.values {
                        let mut combined = cell.clone();
                        combined.set(axis.name.clone(), value.clone());
                        next.push(combined);
                    }
                }
                product = next;
            }
            product
        };

        cells.retain(|cell| !self.exclude.iter().any(|entry| cell.contains_all(entry)));

        for entry in &self.include {
            let mut extended = false;
            for cell in cells.iter_mut() {
                let agrees = entry
                    .iter()
                    .filter(|(k, _)| self.is_axis(k))
                    .all(|(k, v)| cell.get(k) == Some(v));

                if agrees && !self.axes.is_empty() {
                    for (k, v) in entry.iter() {
                        cell.set(k.to_string(), v.to_string());
                    }
                    extended = true;
                }
            }
            if !extended {
                cells.push(entry.clone());
            }
        }

        if cells.is_empty() && self.is_empty() {
            cells.push(MatrixCell::new());
        }

        cells
    }
}

/// Job strategy: matrix plus concurrency and cancellation policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    pub matrix: Matrix,

    /// Maximum concurrently running instances of this job (None = unbounded)
    pub max_parallel: Option<usize>,

    /// Cancel sibling instances when one fails
    pub fail_fast: bool,
}

impl Default for Strategy {
    fn default() -> Self {
        Self {
            matrix: Matrix::default(),
            max_parallel: None,
            fail_fast: true,
        }
    }
}

fn parse_entries(section: &str, value: &Value) -> Result<Vec<MatrixCell>> {
    let Value::Sequence(items) = value else {
        bail!("Matrix '{}' must be a list of mappings", section);
    };

    items
        .iter()
        .map(|item| {
            let Value::Mapping(map) = item else {
                bail!("Matrix '{}' entries must be mappings", section);
            };
            let mut cell = MatrixCell::new();
            for (k, v) in map {
                let Some(key) = k.as_str() else {
                    bail!("Matrix '{}' keys must be strings", section);
                };
                cell.set(key.to_string(), render_value(v));
            }
            Ok(cell)
        })
        .collect()
}

/// Render a YAML value as the opaque string used by the runner
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Tagged(tagged) => render_value(&tagged.value),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}
