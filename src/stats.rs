//! Absolute emissions, summary tables and chart data.

use geo::{Area, MultiPolygon};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::colors::Rgb;
use crate::config::SQM_TO_HA;
use crate::crs::Reprojector;
use crate::error::Result;
use crate::model::Crs;
use crate::vectorize::ChangePolygons;

/// Change polygon with its absolute emission.
#[derive(Debug, Clone, PartialEq)]
pub struct EmissionPolygon {
    pub change_id: u16,
    pub class_before: String,
    pub class_after: String,
    pub geometry: MultiPolygon<f64>,
    pub area_m2: f64,
    /// t/ha
    pub emission_factor: f64,
    /// t
    pub emissions: f64,
    pub color: Rgb,
}

impl EmissionPolygon {
    pub fn label(&self) -> String {
        format!("{} to {}", self.class_before, self.class_after)
    }

    pub fn area_ha(&self) -> f64 {
        self.area_m2 * SQM_TO_HA
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmissionPolygons {
    pub crs: Crs,
    pub features: Vec<EmissionPolygon>,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Emission per polygon: area (ha) times emission factor (t/ha).
pub fn calculate_absolute_emissions_per_poly(changes: &ChangePolygons) -> EmissionPolygons {
    let features = changes
        .features
        .iter()
        .map(|f| {
            let area_m2 = f.geometry.unsigned_area();
            EmissionPolygon {
                change_id: f.change_id,
                class_before: f.factor.class_before.clone(),
                class_after: f.factor.class_after.clone(),
                geometry: f.geometry.clone(),
                area_m2,
                emission_factor: f.factor.emission_factor,
                emissions: area_m2 * SQM_TO_HA * f.factor.emission_factor,
                color: f.factor.color,
            }
        })
        .collect();
    EmissionPolygons {
        crs: changes.crs,
        features,
    }
}

/// Metric row of the summary and area info tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    #[serde(rename = "Metric name")]
    pub metric: String,
    #[serde(rename = "Value")]
    pub value: f64,
}

impl MetricRow {
    fn new(metric: &str, value: f64) -> Self {
        Self {
            metric: metric.to_string(),
            value,
        }
    }
}

/// Totals over all change polygons. Shares are percent of the AOI area.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub aoi_area_ha: f64,
    pub change_area_ha: f64,
    pub change_share_pct: f64,
    pub emitting_area_ha: f64,
    pub emitting_share_pct: f64,
    pub sink_area_ha: f64,
    pub sink_share_pct: f64,
    pub gross_emissions_t: f64,
    pub gross_sink_t: f64,
    pub net_emissions_t: f64,
}

impl SummaryStats {
    /// Summary over polygons whose AOI has `aoi_area_m2` in the same CRS.
    pub fn from_polygons(features: &[EmissionPolygon], aoi_area_m2: f64) -> Self {
        let emitting = features.iter().filter(|f| f.emissions > 0.0);
        let sinks = features.iter().filter(|f| f.emissions < 0.0);

        let change_area: f64 = features.iter().map(|f| f.area_m2).sum();
        let emitting_area: f64 = emitting.clone().map(|f| f.area_m2).sum();
        let sink_area: f64 = sinks.clone().map(|f| f.area_m2).sum();
        let share = |area: f64| {
            if aoi_area_m2 > 0.0 {
                area / aoi_area_m2 * 100.0
            } else {
                0.0
            }
        };

        Self {
            aoi_area_ha: aoi_area_m2 * SQM_TO_HA,
            change_area_ha: change_area * SQM_TO_HA,
            change_share_pct: share(change_area),
            emitting_area_ha: emitting_area * SQM_TO_HA,
            emitting_share_pct: share(emitting_area),
            sink_area_ha: sink_area * SQM_TO_HA,
            sink_share_pct: share(sink_area),
            gross_emissions_t: emitting.map(|f| f.emissions).sum(),
            gross_sink_t: sinks.map(|f| f.emissions).sum(),
            net_emissions_t: features.iter().map(|f| f.emissions).sum(),
        }
    }

    /// Gross emissions, sink and net balance in tonnes, one decimal.
    pub fn emission_table(&self) -> Vec<MetricRow> {
        vec![
            MetricRow::new("Total gross emissions [t]", round_to(self.gross_emissions_t, 1)),
            MetricRow::new("Total sink [t]", round_to(self.gross_sink_t, 1)),
            MetricRow::new("Net emissions [t]", round_to(self.net_emissions_t, 1)),
        ]
    }

    pub fn area_info_table(&self) -> Vec<MetricRow> {
        vec![
            MetricRow::new("Area of interest [ha]", round_to(self.aoi_area_ha, 1)),
            MetricRow::new("Change share [%]", round_to(self.change_share_pct, 2)),
            MetricRow::new("Emitting area [ha]", round_to(self.emitting_area_ha, 2)),
            MetricRow::new("Emitting area share [%]", round_to(self.emitting_share_pct, 1)),
            MetricRow::new("Sink area [ha]", round_to(self.sink_area_ha, 2)),
            MetricRow::new("Sink area share [%]", round_to(self.sink_share_pct, 1)),
        ]
    }
}

/// Summary statistics with the WGS84 AOI measured in the polygons' CRS.
pub fn summary_stats(emissions: &EmissionPolygons, aoi: &MultiPolygon<f64>) -> Result<SummaryStats> {
    let projected = Reprojector::new(Crs::WGS84, emissions.crs)?.transform_multi_polygon(aoi)?;
    Ok(SummaryStats::from_polygons(
        &emissions.features,
        projected.unsigned_area(),
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeTypeRow {
    #[serde(rename = "Change")]
    pub label: String,
    #[serde(rename = "Area [ha]")]
    pub area_ha: f64,
    #[serde(rename = "Total emissions [t]")]
    pub emissions: f64,
}

impl ChangeTypeRow {
    pub fn rounded(&self) -> Self {
        Self {
            label: self.label.clone(),
            area_ha: round_to(self.area_ha, 2),
            emissions: round_to(self.emissions, 2),
        }
    }
}

/// Area and emissions per change label, most negative emissions first.
pub fn get_change_type_table(emissions: &EmissionPolygons) -> Vec<ChangeTypeRow> {
    let mut groups: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for f in &emissions.features {
        let entry = groups.entry(f.label()).or_insert((0.0, 0.0));
        entry.0 += f.area_ha();
        entry.1 += f.emissions;
    }

    let mut rows: Vec<ChangeTypeRow> = groups
        .into_iter()
        .map(|(label, (area_ha, emissions))| ChangeTypeRow {
            label,
            area_ha,
            emissions,
        })
        .collect();
    rows.sort_by(|a, b| {
        a.emissions
            .total_cmp(&b.emissions)
            .then_with(|| a.label.cmp(&b.label))
    });
    rows
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Pie,
    Bar,
}

/// Series of a two dimensional chart. Rendering is left to the consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub x: Vec<String>,
    pub y: Vec<f64>,
    pub color: Vec<Rgb>,
    pub chart_type: ChartType,
}

fn sorted_by_emissions(emissions: &EmissionPolygons) -> Vec<&EmissionPolygon> {
    let mut features: Vec<&EmissionPolygon> = emissions.features.iter().collect();
    features.sort_by(|a, b| a.emissions.total_cmp(&b.emissions));
    features
}

fn chart(
    emissions: &EmissionPolygons,
    chart_type: ChartType,
    value: impl Fn(&EmissionPolygon) -> f64,
) -> ChartData {
    let features = sorted_by_emissions(emissions);
    ChartData {
        x: features.iter().map(|f| f.label()).collect(),
        y: features.iter().map(|&f| value(f)).collect(),
        color: features.iter().map(|f| f.color).collect(),
        chart_type,
    }
}

/// Change area per change type in hectares.
pub fn area_chart(emissions: &EmissionPolygons) -> ChartData {
    chart(emissions, ChartType::Pie, EmissionPolygon::area_ha)
}

/// Emissions per change type in tonnes.
pub fn emission_chart(emissions: &EmissionPolygons) -> ChartData {
    chart(emissions, ChartType::Bar, |f| f.emissions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emission_factor::tests::hansis_factors;
    use crate::vectorize::ChangePolygon;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use geo::{polygon, MultiPolygon};

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
        ]])
    }

    fn feature(change_id: u16, class_before: &str, class_after: &str, area_m2: f64, emissions: f64) -> EmissionPolygon {
        EmissionPolygon {
            change_id,
            class_before: class_before.to_string(),
            class_after: class_after.to_string(),
            geometry: MultiPolygon::new(vec![]),
            area_m2,
            emission_factor: emissions / (area_m2 * SQM_TO_HA),
            emissions,
            color: Rgb::new(0, 0, 0),
        }
    }

    #[test]
    fn test_calculate_absolute_emissions_per_poly() {
        let factors = hansis_factors();
        let mut big = factors.by_id(2).unwrap().clone();
        big.emission_factor = -1.5;
        let mut small = factors.by_id(7).unwrap().clone();
        small.emission_factor = 10.0;

        let changes = ChangePolygons {
            crs: Crs::from_epsg(32632),
            features: vec![
                ChangePolygon {
                    change_id: 2,
                    geometry: square(0.0, 0.0, 100.0),
                    factor: big,
                },
                ChangePolygon {
                    change_id: 7,
                    geometry: square(500.0, 500.0, 1.0),
                    factor: small,
                },
            ],
        };
        let result = calculate_absolute_emissions_per_poly(&changes);
        assert_eq!(result.crs, Crs::from_epsg(32632));
        assert_relative_eq!(result.features[0].emissions, -1.5, epsilon = 1e-12);
        assert_relative_eq!(result.features[1].emissions, 0.001, epsilon = 1e-12);
        assert_eq!(result.features[0].label(), "forest to grass");
    }

    #[test]
    fn test_summary_stats() {
        // 0.1 ha AOI, one emitting and one sink polygon of 0.01 ha each
        let features = vec![
            feature(2, "forest", "grass", 100.0, 1.0),
            feature(5, "grass", "forest", 100.0, -1.0),
        ];
        let stats = SummaryStats::from_polygons(&features, 1000.0);

        assert_relative_eq!(stats.aoi_area_ha, 0.1, epsilon = 1e-12);
        assert_relative_eq!(stats.gross_emissions_t, 1.0, epsilon = 1e-12);
        assert_relative_eq!(stats.gross_sink_t, -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(stats.net_emissions_t, 0.0);
        assert_relative_eq!(stats.emitting_share_pct, 10.0, epsilon = 1e-12);
        assert_relative_eq!(stats.sink_share_pct, 10.0, epsilon = 1e-12);
        assert_relative_eq!(stats.change_share_pct, 20.0, epsilon = 1e-12);

        let table = stats.emission_table();
        assert_eq!(table[0].metric, "Total gross emissions [t]");
        assert_eq!(table[0].value, 1.0);
        assert_eq!(table[1].value, -1.0);
        assert_eq!(table[2].value, 0.0);

        let area_info = stats.area_info_table();
        assert_eq!(area_info.len(), 6);
        assert_eq!(area_info[0].value, 0.1);
        assert_eq!(area_info[3].value, 10.0);
    }

    #[test]
    fn test_zero_emission_rows_count_only_towards_change_area() {
        let features = vec![
            feature(2, "forest", "grass", 100.0, 1.0),
            feature(6, "grass", "grass", 300.0, 0.0),
        ];
        let stats = SummaryStats::from_polygons(&features, 1000.0);
        assert_relative_eq!(stats.change_share_pct, 40.0, epsilon = 1e-12);
        assert_relative_eq!(stats.emitting_share_pct, 10.0, epsilon = 1e-12);
        assert_eq!(stats.sink_area_ha, 0.0);
        assert_eq!(stats.gross_sink_t, 0.0);
    }

    #[test]
    fn test_change_type_table() {
        let emissions = EmissionPolygons {
            crs: Crs::from_epsg(32632),
            features: vec![
                feature(2, "forest", "grass", 100.0, 0.915),
                feature(13, "built-up", "forest", 200.0, -3.64),
                feature(7, "grass", "farmland", 50.0, 0.2675),
                feature(8, "grass", "built-up", 100.0, 0.905),
            ],
        };
        let table = get_change_type_table(&emissions);
        let labels: Vec<&str> = table.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["built-up to forest", "grass to farmland", "grass to built-up", "forest to grass"]
        );

        // areas add up to the change area of the summary
        let total: f64 = table.iter().map(|r| r.area_ha).sum();
        let stats = SummaryStats::from_polygons(&emissions.features, 10_000.0);
        assert_relative_eq!(total, stats.change_area_ha, epsilon = 1e-12);

        assert_eq!(table[1].rounded().emissions, 0.27);
    }

    #[test]
    fn test_charts_are_sorted_by_emissions() {
        let emissions = EmissionPolygons {
            crs: Crs::from_epsg(32632),
            features: vec![
                feature(2, "forest", "grass", 100.0, 0.915),
                feature(13, "built-up", "forest", 200.0, -3.64),
            ],
        };
        let areas = area_chart(&emissions);
        assert_eq!(areas.chart_type, ChartType::Pie);
        assert_eq!(areas.x, vec!["built-up to forest", "forest to grass"]);
        assert_relative_eq!(areas.y[0], 0.02, epsilon = 1e-12);

        let bars = emission_chart(&emissions);
        assert_eq!(bars.chart_type, ChartType::Bar);
        assert_eq!(bars.y, vec![-3.64, 0.915]);
    }
}
