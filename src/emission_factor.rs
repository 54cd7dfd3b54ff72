//! Emission factors for every ordered pair of land-cover classes.

use serde::Serialize;

use crate::colors::{get_colors, DivergingScale, Rgb};
use crate::config::EngineConfig;
use crate::error::{GhgError, Result};
use crate::stock::StockTable;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmissionFactorRow {
    pub change_id: u16,
    pub class_before: String,
    pub raster_value_before: u8,
    pub class_after: String,
    pub raster_value_after: u8,
    /// Stock before minus stock after, in t/ha. Positive values are emissions.
    pub emission_factor: f64,
    #[serde(serialize_with = "serialize_hex")]
    pub color: Rgb,
}

fn serialize_hex<S: serde::Serializer>(color: &Rgb, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&color.to_hex())
}

impl EmissionFactorRow {
    /// Display label of the transition, e.g. `forest to grass`.
    pub fn label(&self) -> String {
        format!("{} to {}", self.class_before, self.class_after)
    }

    pub fn is_identity(&self) -> bool {
        self.raster_value_before == self.raster_value_after
    }
}

/// Cross join of a stock table with itself.
#[derive(Debug, Clone, PartialEq)]
pub struct EmissionFactorTable {
    rows: Vec<EmissionFactorRow>,
    /// Change id per `(before << 8) | after` raster value pair.
    pair_index: Vec<Option<u16>>,
}

impl EmissionFactorTable {
    /// Build the table from stock rows in raster value order.
    ///
    /// Change ids are assigned densely from 1 in cross join order, skipping the
    /// codes reserved for "no change" and "unknown".
    pub fn from_stock_table(stocks: &StockTable, config: &EngineConfig) -> Result<Self> {
        let classes = stocks.rows();
        let n_rows = classes.len() * classes.len();
        let reserved = [config.no_change_value, config.unknown_change_value];

        let mut rows = Vec::with_capacity(n_rows);
        let mut next_id: u32 = 1;
        for before in classes {
            for after in classes {
                while reserved.iter().any(|&r| u32::from(r) == next_id) {
                    next_id += 1;
                }
                let change_id = u16::try_from(next_id).map_err(|_| {
                    GhgError::InvalidConfig(format!(
                        "{} classes produce more change types than fit in the change raster",
                        classes.len()
                    ))
                })?;
                next_id += 1;

                rows.push(EmissionFactorRow {
                    change_id,
                    class_before: before.class_name.clone(),
                    raster_value_before: before.raster_value,
                    class_after: after.class_name.clone(),
                    raster_value_after: after.raster_value,
                    emission_factor: before.stock - after.stock,
                    color: Rgb::new(0, 0, 0),
                });
            }
        }

        let factors: Vec<f64> = rows.iter().map(|r| r.emission_factor).collect();
        for (row, color) in rows.iter_mut().zip(get_colors(&factors)) {
            row.color = color;
        }

        Ok(Self::from_rows(rows))
    }

    fn from_rows(rows: Vec<EmissionFactorRow>) -> Self {
        let mut pair_index = vec![None; 1 << 16];
        for row in &rows {
            let key = (usize::from(row.raster_value_before) << 8) | usize::from(row.raster_value_after);
            pair_index[key] = Some(row.change_id);
        }
        Self { rows, pair_index }
    }

    pub fn rows(&self) -> &[EmissionFactorRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn by_id(&self, change_id: u16) -> Option<&EmissionFactorRow> {
        self.rows.iter().find(|r| r.change_id == change_id)
    }

    /// Change id of a transition between two raster values.
    pub fn change_id_for(&self, before: u8, after: u8) -> Option<u16> {
        self.pair_index[(usize::from(before) << 8) | usize::from(after)]
    }

    /// Diverging scale spanning every factor of the table.
    pub fn scale(&self) -> DivergingScale {
        let factors: Vec<f64> = self.rows.iter().map(|r| r.emission_factor).collect();
        DivergingScale::symmetric(&factors)
    }
}
