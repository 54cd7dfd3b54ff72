//! Land-cover class legend supplied by the classification service.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

use crate::colors::{Rgb, NO_CHANGE_GRAY};
use crate::config::LegendMode;
use crate::error::{GhgError, Result};

/// Name of the class the classifier emits for low-confidence pixels.
pub const UNKNOWN_CLASS: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub osm_filter: Option<String>,
    pub raster_value: u8,
    pub color: Rgb,
}

/// Class name -> descriptor, iterated in raster value order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassLegend {
    labels: Vec<LabelDescriptor>,
}

impl ClassLegend {
    pub fn new(mut labels: Vec<LabelDescriptor>) -> Result<Self> {
        labels.sort_by_key(|l| l.raster_value);
        for pair in labels.windows(2) {
            if pair[0].raster_value == pair[1].raster_value {
                return Err(GhgError::InvalidConfig(format!(
                    "classes '{}' and '{}' share raster value {}",
                    pair[0].name, pair[1].name, pair[0].raster_value
                )));
            }
        }
        Ok(Self { labels })
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let map: BTreeMap<String, LabelDescriptor> = serde_json::from_str(content)?;
        Self::new(map.into_values().collect())
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn labels(&self) -> &[LabelDescriptor] {
        &self.labels
    }

    pub fn get(&self, name: &str) -> Option<&LabelDescriptor> {
        self.labels.iter().find(|l| l.name == name)
    }

    pub fn by_raster_value(&self, value: u8) -> Option<&LabelDescriptor> {
        self.labels.iter().find(|l| l.raster_value == value)
    }

    /// Look up a class referenced by a stock source.
    ///
    /// Strict mode fails with [`GhgError::UnknownStockClass`]; lenient mode
    /// logs and returns `None`.
    pub fn lookup(
        &self,
        name: &str,
        source_name: &str,
        mode: LegendMode,
    ) -> Result<Option<&LabelDescriptor>> {
        match (self.get(name), mode) {
            (Some(label), _) => Ok(Some(label)),
            (None, LegendMode::Strict) => Err(GhgError::UnknownStockClass {
                class: name.to_string(),
                source_name: source_name.to_string(),
            }),
            (None, LegendMode::Lenient) => {
                warn!(
                    "Stock source '{}' references unknown class '{}', skipping it",
                    source_name, name
                );
                Ok(None)
            }
        }
    }

    /// Raster value -> color.
    pub fn colormap(&self) -> BTreeMap<u8, Rgb> {
        self.labels.iter().map(|l| (l.raster_value, l.color)).collect()
    }

    /// Display legend for classification maps. The unknown class is gray.
    pub fn legend_entries(&self) -> BTreeMap<String, Rgb> {
        let mut entries: BTreeMap<String, Rgb> =
            self.labels.iter().map(|l| (l.name.clone(), l.color)).collect();
        entries.insert(UNKNOWN_CLASS.to_string(), NO_CHANGE_GRAY);
        entries
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn label(name: &str, description: &str, raster_value: u8) -> LabelDescriptor {
        LabelDescriptor {
            name: name.to_string(),
            description: description.to_string(),
            osm_filter: None,
            raster_value,
            color: Rgb::new(255 - raster_value, 255, 255),
        }
    }

    /// The legend used throughout the unit tests.
    pub(crate) fn test_legend() -> ClassLegend {
        ClassLegend::new(vec![
            label("unknown", "unknown", 0),
            label("forest", "A forest", 1),
            label("grass", "A grass patch", 2),
            label("farmland", "A farmland", 3),
            label("built-up", "Sealed surface", 4),
            label("permanent-crops", "permanent crops", 5),
            label("water", "water", 6),
        ])
        .unwrap()
    }

    #[test]
    fn test_legend_is_sorted_by_raster_value() {
        let legend = ClassLegend::new(vec![label("b", "", 2), label("a", "", 1)]).unwrap();
        let names: Vec<&str> = legend.labels().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_raster_values_are_rejected() {
        let result = ClassLegend::new(vec![label("a", "", 1), label("b", "", 1)]);
        assert!(matches!(result, Err(GhgError::InvalidConfig(_))));
    }

    #[test]
    fn test_strict_lookup_fails_on_unknown_class() {
        let legend = test_legend();
        let err = legend
            .lookup("wetland", "hansis", LegendMode::Strict)
            .unwrap_err();
        match err {
            GhgError::UnknownStockClass { class, source_name } => {
                assert_eq!(class, "wetland");
                assert_eq!(source_name, "hansis");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_lenient_lookup_skips_unknown_class() {
        let legend = test_legend();
        assert!(legend
            .lookup("wetland", "hansis", LegendMode::Lenient)
            .unwrap()
            .is_none());
        assert_eq!(
            legend
                .lookup("forest", "hansis", LegendMode::Strict)
                .unwrap()
                .map(|l| l.raster_value),
            Some(1)
        );
    }

    #[test]
    fn test_legend_from_json() {
        let json = r#"{
            "forest": {"name": "forest", "description": "A forest", "osm_filter": "landuse=forest",
                       "raster_value": 1, "color": [0, 128, 0]},
            "unknown": {"name": "unknown", "description": "unknown", "raster_value": 0, "color": [0, 0, 0]}
        }"#;
        let legend = ClassLegend::from_json_str(json).unwrap();
        assert_eq!(legend.labels().len(), 2);
        assert_eq!(legend.by_raster_value(1).unwrap().color, Rgb::new(0, 128, 0));
        assert_eq!(legend.legend_entries()["unknown"], NO_CHANGE_GRAY);
    }
}
