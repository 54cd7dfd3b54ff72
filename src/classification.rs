//! Interface to the land-cover classification collaborator.

use chrono::{Datelike, NaiveDate, Utc};
use gdal::Dataset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::BoundingBox;
use crate::error::{GhgError, Result};
use crate::legend::{ClassLegend, UNKNOWN_CLASS};
use crate::model::{ClassificationRaster, Crs, GeoTransform, MaskedRaster};
use crate::stock::DEFAULT_STOCK_SOURCE;

/// First year with classifier coverage.
pub const FIRST_YEAR: i32 = 2017;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub bbox: BoundingBox,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Pixels classified with lower confidence are returned as unknown.
    pub threshold: f64,
}

impl ClassificationRequest {
    /// Request covering July of `year`.
    pub fn for_july(bbox: BoundingBox, year: i32, threshold: f64) -> Result<Self> {
        let date = |day| {
            NaiveDate::from_ymd_opt(year, 7, day)
                .ok_or_else(|| GhgError::InvalidInput(format!("invalid year {}", year)))
        };
        Ok(Self {
            bbox,
            start_date: date(1)?,
            end_date: date(31)?,
            threshold,
        })
    }
}

/// Supplier of classification rasters.
///
/// Pixels below the confidence threshold, or outside the data, are invalid
/// in the returned raster.
pub trait ClassificationSource {
    fn class_legend(&self) -> Result<ClassLegend>;

    fn classify(&self, request: &ClassificationRequest) -> Result<ClassificationRaster>;
}

/// Parameters of one computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeInput {
    pub start_year: i32,
    pub end_year: i32,
    #[serde(default = "default_stock_source")]
    pub stock_source: String,
}

fn default_stock_source() -> String {
    DEFAULT_STOCK_SOURCE.to_string()
}

impl ComputeInput {
    pub fn new(start_year: i32, end_year: i32) -> Self {
        Self {
            start_year,
            end_year,
            stock_source: default_stock_source(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_for(Utc::now().year())
    }

    /// Validate against a given current year.
    pub fn validate_for(&self, current_year: i32) -> Result<()> {
        let last_year = current_year - 1;
        if self.start_year < FIRST_YEAR {
            return Err(GhgError::InvalidInput(format!(
                "The period must start in {} or later, got {}.",
                FIRST_YEAR, self.start_year
            )));
        }
        if self.end_year <= self.start_year {
            return Err(GhgError::InvalidInput(
                "Period start must be before period end.".to_string(),
            ));
        }
        if self.end_year > last_year {
            return Err(GhgError::InvalidInput(format!(
                "The period must end in {} or earlier, got {}.",
                last_year, self.end_year
            )));
        }
        Ok(())
    }
}

/// Classifications read from one GeoTIFF per year.
///
/// Cells equal to the band's nodata value or to the legend's unknown class
/// are invalid.
pub struct GeoTiffSource {
    legend: ClassLegend,
    rasters: BTreeMap<i32, PathBuf>,
}

impl GeoTiffSource {
    pub fn new(legend: ClassLegend) -> Self {
        Self {
            legend,
            rasters: BTreeMap::new(),
        }
    }

    pub fn with_raster(mut self, year: i32, path: impl Into<PathBuf>) -> Self {
        self.rasters.insert(year, path.into());
        self
    }

    fn read(&self, path: &Path) -> Result<ClassificationRaster> {
        let dataset = Dataset::open(path)?;
        let (width, height) = dataset.raster_size();
        let transform = GeoTransform(dataset.geo_transform()?);
        let crs = read_crs(&dataset)?;

        let band = dataset.rasterband(1)?;
        let nodata = band.no_data_value();
        let buffer = band.read_as::<u8>((0, 0), (width, height), (width, height), None)?;
        let (_, data) = buffer.into_shape_and_vec();

        let unknown = self.legend.get(UNKNOWN_CLASS).map(|l| l.raster_value);
        let valid = data
            .iter()
            .map(|&v| nodata != Some(f64::from(v)) && unknown != Some(v))
            .collect();
        debug!(
            "Read classification {:?}: {}x{} in {}",
            path, width, height, crs
        );
        MaskedRaster::new(width, height, data, valid, transform, crs)
    }
}

fn read_crs(dataset: &Dataset) -> Result<Crs> {
    let srs = dataset.spatial_ref()?;
    let code = match srs.auth_code() {
        Ok(code) => code,
        Err(_) => {
            let mut srs = srs;
            srs.auto_identify_epsg()?;
            srs.auth_code()?
        }
    };
    u32::try_from(code)
        .map(Crs::from_epsg)
        .map_err(|_| GhgError::InvalidRaster(format!("invalid EPSG code {}", code)))
}

impl ClassificationSource for GeoTiffSource {
    fn class_legend(&self) -> Result<ClassLegend> {
        Ok(self.legend.clone())
    }

    fn classify(&self, request: &ClassificationRequest) -> Result<ClassificationRaster> {
        let year = request.end_date.year();
        let path = self.rasters.get(&year).ok_or_else(|| {
            GhgError::InvalidInput(format!("no classification available for {}", year))
        })?;
        info!("Loading classification for {} from {:?}", year, path);
        self.read(path)
    }
}
