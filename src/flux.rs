//! Per-pixel carbon flux derived from a change raster.

use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};

use crate::change::ChangeInfo;
use crate::colors::{DivergingScale, Rgb};
use crate::emission_factor::EmissionFactorTable;
use crate::error::{GhgError, Result};
use crate::model::MaskedRaster;

pub type FluxRaster = MaskedRaster<f64>;

/// Flux raster in tonnes per pixel with a change id keyed legend.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxInfo {
    pub raster: FluxRaster,
    pub colormap: BTreeMap<u16, Rgb>,
    /// Scale over the per-pixel flux of every table row, for coloring raw values.
    pub scale: DivergingScale,
    pub nodata: f64,
}

impl FluxInfo {
    pub fn color_for(&self, flux: f64) -> Rgb {
        self.scale.color_for(flux)
    }
}

/// Map each change id to its emission factor scaled to one pixel.
///
/// `per_pixel_factor` is the pixel area divided by the area the stock values
/// refer to. No-change cells are exactly `0.0`; unknown cells stay invalid
/// and hold `unknown_emissions_value`.
pub fn get_change_emissions_info(
    changes: &ChangeInfo,
    factors: &EmissionFactorTable,
    no_change_value: u16,
    per_pixel_factor: f64,
    unknown_emissions_value: f64,
) -> Result<FluxInfo> {
    let pixel_flux: HashMap<u16, f64> = factors
        .rows()
        .iter()
        .map(|r| (r.change_id, r.emission_factor * per_pixel_factor))
        .collect();

    let raster = &changes.raster;
    let data: Vec<f64> = (0..raster.len())
        .into_par_iter()
        .map(|i| {
            if !raster.valid[i] {
                return Ok(unknown_emissions_value);
            }
            let id = raster.data[i];
            if id == no_change_value {
                return Ok(0.0);
            }
            pixel_flux
                .get(&id)
                .copied()
                .ok_or(GhgError::ChangeIdNotInTable { change_id: id })
        })
        .collect::<Result<_>>()?;

    let values: Vec<f64> = pixel_flux.values().copied().collect();
    let scale = DivergingScale::symmetric(&values);
    let mut colormap: BTreeMap<u16, Rgb> = pixel_flux
        .iter()
        .map(|(&id, &flux)| (id, scale.color_for(flux)))
        .collect();
    colormap.insert(no_change_value, scale.color_for(0.0));

    Ok(FluxInfo {
        raster: MaskedRaster::new(
            raster.width,
            raster.height,
            data,
            raster.valid.clone(),
            raster.transform,
            raster.crs,
        )?,
        colormap,
        scale,
        nodata: unknown_emissions_value,
    })
}
