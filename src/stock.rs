//! Literature carbon stock values per land-cover class.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::colors::Rgb;
use crate::config::LegendMode;
use crate::error::{GhgError, Result};
use crate::legend::ClassLegend;

const BUILTIN_STOCKS: &str = include_str!("../resources/stock_values.json");

/// Identifier of the stock source used when none is requested.
pub const DEFAULT_STOCK_SOURCE: &str = "hansis";

/// Stock values (t/ha) per class name, keyed by source identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockSources {
    sources: BTreeMap<String, BTreeMap<String, f64>>,
}

impl StockSources {
    pub fn builtin() -> Result<Self> {
        Self::from_json_str(BUILTIN_STOCKS)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let sources: Self = serde_json::from_str(content)?;
        for (source, values) in &sources.sources {
            if let Some((class, value)) = values.iter().find(|(_, v)| !v.is_finite()) {
                return Err(GhgError::InvalidConfig(format!(
                    "stock source '{}' has a non-finite value {} for class '{}'",
                    source, value, class
                )));
            }
        }
        Ok(sources)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn get(&self, source_name: &str) -> Result<&BTreeMap<String, f64>> {
        self.sources
            .get(source_name)
            .ok_or_else(|| GhgError::UnknownStockSource(source_name.to_string()))
    }

    /// Stock table of one source joined with the class legend.
    pub fn table(
        &self,
        source_name: &str,
        legend: &ClassLegend,
        mode: LegendMode,
    ) -> Result<StockTable> {
        StockTable::join_legend(source_name, self.get(source_name)?, legend, mode)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StockRow {
    pub class_name: String,
    pub description: String,
    pub raster_value: u8,
    pub color: Rgb,
    /// Carbon stock in t/ha.
    pub stock: f64,
}

/// Row of the stock table artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockTableEntry {
    #[serde(rename = "Class")]
    pub class_name: String,
    #[serde(rename = "Definition")]
    pub description: String,
    #[serde(rename = "GHG stock value [t/ha]")]
    pub stock: f64,
}

/// Stock values of one source with their class metadata, ordered by
/// raster value.
#[derive(Debug, Clone, PartialEq)]
pub struct StockTable {
    source_name: String,
    rows: Vec<StockRow>,
}

impl StockTable {
    pub fn join_legend(
        source_name: &str,
        values: &BTreeMap<String, f64>,
        legend: &ClassLegend,
        mode: LegendMode,
    ) -> Result<Self> {
        let mut rows = Vec::with_capacity(values.len());
        for (class_name, &stock) in values {
            let Some(label) = legend.lookup(class_name, source_name, mode)? else {
                continue;
            };
            rows.push(StockRow {
                class_name: class_name.clone(),
                description: label.description.clone(),
                raster_value: label.raster_value,
                color: label.color,
                stock,
            });
        }
        rows.sort_by_key(|r| r.raster_value);

        if rows.is_empty() {
            return Err(GhgError::InvalidConfig(format!(
                "stock source '{}' has no class in common with the class legend",
                source_name
            )));
        }
        debug!(
            "Stock source '{}' joined with legend: {} classes",
            source_name,
            rows.len()
        );

        Ok(Self {
            source_name: source_name.to_string(),
            rows,
        })
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn rows(&self) -> &[StockRow] {
        &self.rows
    }

    pub fn get(&self, class_name: &str) -> Option<&StockRow> {
        self.rows.iter().find(|r| r.class_name == class_name)
    }

    /// Class, definition and stock, sorted by stock ascending.
    pub fn filtered(&self) -> Vec<StockTableEntry> {
        let mut entries: Vec<StockTableEntry> = self
            .rows
            .iter()
            .map(|r| StockTableEntry {
                class_name: r.class_name.clone(),
                description: r.description.clone(),
                stock: r.stock,
            })
            .collect();
        entries.sort_by(|a, b| a.stock.total_cmp(&b.stock));
        entries
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::legend::tests::test_legend;

    pub(crate) fn hansis_table() -> StockTable {
        StockSources::builtin()
            .unwrap()
            .table(DEFAULT_STOCK_SOURCE, &test_legend(), LegendMode::Strict)
            .unwrap()
    }

    #[test]
    fn test_builtin_sources() {
        let sources = StockSources::builtin().unwrap();
        let hansis = sources.get("hansis").unwrap();
        assert_eq!(hansis["forest"], 253.0);
        assert_eq!(hansis["grass"], 161.5);
        assert_eq!(hansis["farmland"], 108.0);
        assert_eq!(hansis["built-up"], 71.0);
        assert!(matches!(
            sources.get("ipcc"),
            Err(GhgError::UnknownStockSource(_))
        ));
    }

    #[test]
    fn test_join_orders_by_raster_value() {
        let table = hansis_table();
        let names: Vec<&str> = table.rows().iter().map(|r| r.class_name.as_str()).collect();
        assert_eq!(names, vec!["forest", "grass", "farmland", "built-up"]);
        assert_eq!(table.get("grass").unwrap().description, "A grass patch");
        assert_eq!(table.source_name(), "hansis");
    }

    #[test]
    fn test_filtered_table_is_sorted_by_stock() {
        let filtered = hansis_table().filtered();
        let stocks: Vec<f64> = filtered.iter().map(|e| e.stock).collect();
        assert_eq!(stocks, vec![71.0, 108.0, 161.5, 253.0]);
        assert_eq!(filtered[0].class_name, "built-up");
        assert_eq!(filtered[0].description, "Sealed surface");
    }

    #[test]
    fn test_unknown_class_fails_in_strict_mode() {
        let sources =
            StockSources::from_json_str(r#"{"custom": {"forest": 200.0, "wetland": 500.0}}"#)
                .unwrap();
        let err = sources
            .table("custom", &test_legend(), LegendMode::Strict)
            .unwrap_err();
        assert!(err.to_string().contains("wetland"));

        let table = sources
            .table("custom", &test_legend(), LegendMode::Lenient)
            .unwrap();
        assert_eq!(table.rows().len(), 1);
    }
}
