//! Density sources
//!
//! Deployments either keep a local table of densities keyed by label, or
//! receive the density inside the nutrient lookup record.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::DensitySource;
use crate::error::CollabResult;
use crate::models::FoodRecord;

/// Which density source a deployment uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DensitySourceKind {
    /// Local delimited table keyed by label
    #[default]
    Table,
    /// Field of the nutrient lookup record
    Embedded,
}

impl DensitySourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DensitySourceKind::Table => "table",
            DensitySourceKind::Embedded => "embedded",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "table" => Some(DensitySourceKind::Table),
            "embedded" => Some(DensitySourceKind::Embedded),
            _ => None,
        }
    }
}

/// Densities loaded from a `label;grams_per_cm3` file
#[derive(Debug, Clone, Default)]
pub struct DensityTable {
    densities: HashMap<String, f64>,
}

impl DensityTable {
    pub fn load(path: &Path) -> CollabResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Ok(Self::parse(&source))
    }

    /// Parse table rows, one `label;density` pair per line
    ///
    /// Blank lines and `#` comments are ignored. A first row whose value is
    /// not a number is taken as a header; later malformed rows are skipped.
    pub fn parse(source: &str) -> Self {
        let mut densities = HashMap::new();

        for (line_num, line) in source.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split(';');
            let label = fields.next().unwrap_or_default().trim().to_lowercase();
            let value = fields.next().map(str::trim).and_then(|v| v.parse::<f64>().ok());

            match value {
                Some(density) if !label.is_empty() => {
                    densities.insert(label, density);
                }
                _ if line_num == 0 => {}
                _ => {
                    tracing::warn!("Density table row {} skipped: '{}'", line_num + 1, line);
                }
            }
        }

        Self { densities }
    }

    pub fn len(&self) -> usize {
        self.densities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.densities.is_empty()
    }
}

impl DensitySource for DensityTable {
    fn kind(&self) -> DensitySourceKind {
        DensitySourceKind::Table
    }

    fn density_for(&self, label: &str, _food: Option<&FoodRecord>) -> Option<f64> {
        self.densities.get(&label.trim().to_lowercase()).copied()
    }
}

/// Density carried by the nutrient lookup record
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedDensity;

impl DensitySource for EmbeddedDensity {
    fn kind(&self) -> DensitySourceKind {
        DensitySourceKind::Embedded
    }

    fn density_for(&self, _label: &str, food: Option<&FoodRecord>) -> Option<f64> {
        food.and_then(|f| f.density)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_table() {
        let table = DensityTable::parse("label;density\npear;1.028\nApple ; 0.85\n\n# citrus\norange;0.96\n");
        assert_eq!(table.len(), 3);
        assert_eq!(table.density_for("pear", None), Some(1.028));
        assert_eq!(table.density_for("apple", None), Some(0.85));
        assert_eq!(table.density_for("Orange", None), Some(0.96));
        assert_eq!(table.density_for("kiwi", None), None);
    }

    #[test]
    fn test_parse_skips_malformed_rows() {
        let table = DensityTable::parse("banana;0.94\nkiwi\nmango;heavy\n;1.0\n");
        assert_eq!(table.len(), 1);
        assert_eq!(table.density_for("banana", None), Some(0.94));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("density.csv");
        std::fs::write(&path, "pear;1.028\n").unwrap();
        let table = DensityTable::load(&path).unwrap();
        assert_eq!(table.kind(), DensitySourceKind::Table);
        assert_eq!(table.density_for("pear", None), Some(1.028));
        assert!(DensityTable::load(&dir.path().join("missing.csv")).is_err());
    }

    #[test]
    fn test_embedded_density() {
        let food = FoodRecord {
            density: Some(1.05),
            ..Default::default()
        };
        assert_eq!(EmbeddedDensity.density_for("pear", Some(&food)), Some(1.05));
        assert_eq!(EmbeddedDensity.density_for("pear", Some(&FoodRecord::default())), None);
        assert_eq!(EmbeddedDensity.density_for("pear", None), None);
    }
}
