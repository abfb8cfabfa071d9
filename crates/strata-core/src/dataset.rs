//! Dataset definitions
//!
//! A dataset bundles everything that is fixed per pipeline: where raw
//! entities come from, which collection stages them, how they are projected
//! and which table receives them. Definitions are YAML; two presets are
//! compiled in.
//!
//! ```yaml
//! name: pokemon
//! collection: pokemon_raw
//! output_file: pokemon.csv
//! source:
//!   base_url: https://pokeapi.co/api/v2
//!   endpoint: pokemon
//!   shape: list_detail
//! fields:
//!   - name: id
//!     rule: number
//! table:
//!   name: pokemon
//!   columns:
//!     - { name: id, type: integer, primary_key: true }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{Error, Result};
use crate::projection::Projection;
use crate::schema::TableSchema;

/// Built-in dataset definitions, by name
pub const PRESETS: &[(&str, &str)] = &[
    ("pokemon", include_str!("../datasets/pokemon.yaml")),
    ("games", include_str!("../datasets/games.yaml")),
];

fn default_natural_key() -> String {
    "id".to_string()
}

fn default_results_field() -> String {
    "results".to_string()
}

fn default_detail_url_field() -> String {
    "url".to_string()
}

/// How the remote API delivers entities
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum SourceShape {
    /// A list of references, each pointing at a detail resource
    ListDetail {
        /// Array field of the list response
        #[serde(default = "default_results_field")]
        results_field: String,
        /// Field of each list entry holding the detail URL
        #[serde(default = "default_detail_url_field")]
        detail_url_field: String,
    },

    /// One response containing complete entities
    FlatList {
        /// Array field of the response; the body itself must be an array when unset
        #[serde(default, skip_serializing_if = "Option::is_none")]
        results_field: Option<String>,
    },
}

/// Remote API location and delivery shape
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceSpec {
    /// API base URL (overridable through configuration)
    pub base_url: String,

    /// List endpoint, relative to the base URL
    pub endpoint: String,

    /// Delivery shape
    #[serde(flatten)]
    pub shape: SourceShape,
}

/// A complete dataset definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetSpec {
    /// Dataset name
    pub name: String,

    /// Default document store collection for raw documents
    pub collection: String,

    /// File name of the intermediate CSV
    pub output_file: String,

    /// Natural key field of source entities (also the table's primary key)
    #[serde(default = "default_natural_key")]
    pub natural_key: String,

    /// Remote API
    pub source: SourceSpec,

    /// Ordered projection
    pub fields: Projection,

    /// Target table
    pub table: TableSchema,
}

impl DatasetSpec {
    /// Parse and validate a YAML definition
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let spec: Self = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Load a definition from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Look up a built-in preset by name
    pub fn preset(name: &str) -> Option<Result<Self>> {
        PRESETS
            .iter()
            .find(|(preset, _)| preset.eq_ignore_ascii_case(name))
            .map(|(_, yaml)| Self::from_yaml(yaml))
    }

    /// Resolve a preset name or a path to a YAML definition
    pub fn resolve(name_or_path: &str) -> Result<Self> {
        match Self::preset(name_or_path) {
            Some(spec) => spec,
            None => Self::load(name_or_path),
        }
    }

    /// Check the definition for internal consistency
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Error::InvalidDataset {
            dataset: self.name.clone(),
            message,
        };

        if self.fields.fields().is_empty() {
            return Err(invalid("at least one field is required".to_string()));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = self.fields.field_names().find(|n| !seen.insert(*n)) {
            return Err(invalid(format!("duplicate field '{}'", dup)));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = self
            .table
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .find(|n| !seen.insert(*n))
        {
            return Err(invalid(format!("duplicate column '{}'", dup)));
        }

        let keys: Vec<_> = self.table.columns.iter().filter(|c| c.primary_key).collect();
        let [pk] = keys.as_slice() else {
            return Err(invalid(format!(
                "table '{}' must declare exactly one primary key column, found {}",
                self.table.name,
                keys.len()
            )));
        };

        if pk.name != self.natural_key {
            return Err(invalid(format!(
                "primary key column '{}' does not match natural key '{}'",
                pk.name, self.natural_key
            )));
        }

        if !self.fields.field_names().any(|n| n == pk.name) {
            return Err(invalid(format!(
                "primary key column '{}' is not produced by any field",
                pk.name
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::FieldRule;
    use crate::schema::ColumnType;

    #[test]
    fn test_presets_parse_and_validate() {
        for (name, _) in PRESETS {
            let spec = DatasetSpec::preset(name).unwrap().unwrap();
            assert_eq!(&spec.name, name);
        }
    }

    #[test]
    fn test_pokemon_preset() {
        let spec = DatasetSpec::resolve("pokemon").unwrap();
        let names: Vec<&str> = spec.fields.field_names().collect();
        assert_eq!(
            names,
            vec![
                "id",
                "name",
                "height",
                "weight",
                "base_experience",
                "primary_type",
                "types",
                "abilities"
            ]
        );
        assert_eq!(spec.collection, "pokemon_raw");
        assert_eq!(
            spec.source.shape,
            SourceShape::ListDetail {
                results_field: "results".to_string(),
                detail_url_field: "url".to_string(),
            }
        );
        assert_eq!(
            spec.table.column("height").unwrap().column_type,
            ColumnType::Decimal { precision: 5, scale: 2 }
        );
        assert!(!spec.table.column("name").unwrap().nullable);
    }

    #[test]
    fn test_games_preset() {
        let spec = DatasetSpec::resolve("GAMES").unwrap();
        assert_eq!(spec.source.shape, SourceShape::FlatList { results_field: None });
        assert_eq!(spec.table.column("release_date").unwrap().column_type, ColumnType::Date);
        assert!(matches!(
            spec.fields.fields()[5].rule,
            FieldRule::Raw { source: None }
        ));
    }

    #[test]
    fn test_resolve_missing_path() {
        let err = DatasetSpec::resolve("/nonexistent/dataset.yaml").unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("berries.yaml");
        std::fs::write(
            &path,
            r#"
name: berries
collection: berries_raw
output_file: berries.csv
source:
  base_url: http://localhost:8080
  endpoint: berry
  shape: flat_list
  results_field: results
fields:
  - name: id
    rule: number
  - name: name
    rule: text
table:
  name: berries
  columns:
    - { name: id, type: bigint, primary_key: true }
    - { name: name, type: text }
"#,
        )
        .unwrap();

        let spec = DatasetSpec::load(&path).unwrap();
        assert_eq!(spec.natural_key, "id");
        assert_eq!(
            spec.source.shape,
            SourceShape::FlatList {
                results_field: Some("results".to_string())
            }
        );
    }

    fn minimal(table_columns: &str) -> String {
        format!(
            r#"
name: t
collection: c
output_file: t.csv
source: {{ base_url: "http://x", endpoint: e, shape: flat_list }}
fields:
  - {{ name: id, rule: number }}
  - {{ name: label, rule: text }}
table:
  name: t
  columns:
{table_columns}
"#
        )
    }

    #[test]
    fn test_validate_requires_single_primary_key() {
        let yaml = minimal("    - { name: id, type: integer }\n    - { name: label, type: text }");
        let err = DatasetSpec::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("exactly one primary key"));

        let yaml = minimal(
            "    - { name: id, type: integer, primary_key: true }\n    - { name: label, type: text, primary_key: true }",
        );
        assert!(DatasetSpec::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_validate_primary_key_matches_natural_key() {
        let yaml = minimal(
            "    - { name: id, type: integer }\n    - { name: label, type: text, primary_key: true }",
        );
        let err = DatasetSpec::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("does not match natural key"));
    }

    #[test]
    fn test_validate_duplicate_columns() {
        let yaml = minimal(
            "    - { name: id, type: integer, primary_key: true }\n    - { name: id, type: text }",
        );
        let err = DatasetSpec::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate column 'id'"));
    }
}
