mod table;
mod vector;

pub use table::{write_json, write_table_csv};
pub use vector::{polygons_to_geojson, write_polygons_geojson};

use anyhow::{Context, Result};
use gdal::raster::{Buffer, GdalType};
use gdal::spatial_ref::SpatialRef;
use gdal::{DriverManager, Metadata};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::change::ChangeInfo;
use crate::colors::Rgb;
use crate::emission_factor::EmissionFactorTable;
use crate::flux::FluxInfo;
use crate::legend::ClassLegend;
use crate::model::{ClassificationRaster, MaskedRaster};

/// Fill value of invalid classification cells.
pub const CLASSIFICATION_NODATA: u8 = 0;

pub const NO_CHANGE_LABEL: &str = "no LULC change";

/// Legend written next to each raster: label -> hex color and raster value
/// -> hex color.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RasterLegend {
    pub title: String,
    pub entries: BTreeMap<String, String>,
    pub values: BTreeMap<u16, String>,
}

fn hex_values<K: Copy + Into<u16>>(colormap: &BTreeMap<K, Rgb>) -> BTreeMap<u16, String> {
    colormap
        .iter()
        .map(|(&k, color)| (k.into(), color.to_hex()))
        .collect()
}

/// Path of the legend written next to `raster_path`.
pub fn legend_path(raster_path: &Path) -> PathBuf {
    raster_path.with_extension("legend.json")
}

#[derive(Default)]
pub struct GeoTiffWriter {}

impl GeoTiffWriter {
    pub fn new() -> Self {
        Self {}
    }

    pub fn write_classification(
        &self,
        raster: &ClassificationRaster,
        legend: &ClassLegend,
        title: &str,
        output_path: &Path,
    ) -> Result<()> {
        self.write_band(
            raster,
            raster.filled(CLASSIFICATION_NODATA),
            f64::from(CLASSIFICATION_NODATA),
            title,
            output_path,
        )?;
        let entries = legend
            .legend_entries()
            .into_iter()
            .map(|(name, color)| (name, color.to_hex()))
            .collect();
        self.write_legend(title, entries, hex_values(&legend.colormap()), output_path)
    }

    pub fn write_changes(
        &self,
        changes: &ChangeInfo,
        factors: &EmissionFactorTable,
        no_change_value: u16,
        output_path: &Path,
    ) -> Result<()> {
        let title = "LULC change";
        self.write_band(
            &changes.raster,
            changes.raster.filled(changes.nodata),
            f64::from(changes.nodata),
            title,
            output_path,
        )?;

        let mut entries = BTreeMap::new();
        for (&id, color) in &changes.colormap {
            let label = if id == no_change_value {
                NO_CHANGE_LABEL.to_string()
            } else {
                factors
                    .by_id(id)
                    .map(|row| row.label())
                    .with_context(|| format!("Change id {} has no factor row", id))?
            };
            entries.insert(label, color.to_hex());
        }
        self.write_legend(title, entries, hex_values(&changes.colormap), output_path)
    }

    pub fn write_flux(
        &self,
        flux: &FluxInfo,
        factors: &EmissionFactorTable,
        output_path: &Path,
    ) -> Result<()> {
        let title = "LULC change emissions [t per pixel]";
        self.write_band(
            &flux.raster,
            flux.raster.filled(flux.nodata),
            flux.nodata,
            title,
            output_path,
        )?;

        let entries = factors
            .rows()
            .iter()
            .filter(|row| !row.is_identity())
            .filter_map(|row| {
                flux.colormap
                    .get(&row.change_id)
                    .map(|color| (row.label(), color.to_hex()))
            })
            .collect();
        self.write_legend(title, entries, hex_values(&flux.colormap), output_path)
    }

    fn write_band<T: Copy + GdalType, V>(
        &self,
        raster: &MaskedRaster<V>,
        data: Vec<T>,
        nodata: f64,
        title: &str,
        output_path: &Path,
    ) -> Result<()> {
        let (cols, rows) = (raster.width, raster.height);
        tracing::info!("Writing {} GeoTIFF: {} x {} pixels", title, cols, rows);

        let driver =
            DriverManager::get_driver_by_name("GTiff").context("Failed to get GTiff driver")?;
        let mut dataset = driver
            .create_with_band_type::<T, _>(output_path, cols, rows, 1)
            .context("Failed to create dataset")?;

        dataset
            .set_geo_transform(&raster.transform.0)
            .context("Failed to set geo transform")?;
        let srs = SpatialRef::from_epsg(raster.crs.epsg)
            .with_context(|| format!("Failed to create SpatialRef from {}", raster.crs))?;
        let wkt = srs
            .to_wkt()
            .context("Failed to convert SpatialRef to WKT")?;
        dataset
            .set_projection(&wkt)
            .context("Failed to set projection")?;
        dataset
            .set_description(title)
            .context("Failed to set description")?;

        let mut band = dataset.rasterband(1).context("Failed to get raster band")?;
        band.set_no_data_value(Some(nodata))
            .context("Failed to set no data value")?;

        let mut buffer = Buffer::new((cols, rows), data);
        band.write((0, 0), (cols, rows), &mut buffer)
            .context("Failed to write raster data")?;

        Ok(())
    }

    fn write_legend(
        &self,
        title: &str,
        entries: BTreeMap<String, String>,
        values: BTreeMap<u16, String>,
        output_path: &Path,
    ) -> Result<()> {
        let legend = RasterLegend {
            title: title.to_string(),
            entries,
            values,
        };
        write_json(&legend, &legend_path(output_path))
    }
}
