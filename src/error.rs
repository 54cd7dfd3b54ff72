//! Error types for the emission engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GhgError>;

/// Coarse grouping of [`GhgError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Broken stock tables, legends or configuration files.
    Configuration,
    /// Recoverable by changing the request (AOI, years, ...).
    User,
    /// A broken internal invariant. Indicates a bug, not bad input.
    Internal,
    /// Failure reported by GDAL, the file system or a decoder.
    External,
}

#[derive(Error, Debug)]
pub enum GhgError {
    #[error("stock source '{source_name}' references class '{class}' which is not part of the class legend")]
    UnknownStockClass { class: String, source_name: String },

    #[error("unknown stock source '{0}'")]
    UnknownStockSource(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no LULC changes were detected between the two timestamps in {bbox}")]
    NoChangeDetected { bbox: String },

    #[error("the selected area {bbox} is outside of the supported region {region}")]
    AoiOutsideSupportedRegion { bbox: String, region: String },

    #[error("the selected area is too large: {area_km2:.2} km² (maximum {max_km2} km²)")]
    AoiTooLarge { area_km2: f64, max_km2: f64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("classification rasters differ in {what}: {left} vs {right}")]
    RasterMismatch {
        what: &'static str,
        left: String,
        right: String,
    },

    #[error("change id {change_id} is present in the raster but missing from the emission factor table")]
    ChangeIdNotInTable { change_id: u16 },

    #[error("invalid raster: {0}")]
    InvalidRaster(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
}

impl GhgError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GhgError::UnknownStockClass { .. }
            | GhgError::UnknownStockSource(_)
            | GhgError::InvalidConfig(_) => ErrorKind::Configuration,
            GhgError::NoChangeDetected { .. }
            | GhgError::AoiOutsideSupportedRegion { .. }
            | GhgError::AoiTooLarge { .. }
            | GhgError::InvalidInput(_) => ErrorKind::User,
            GhgError::RasterMismatch { .. }
            | GhgError::ChangeIdNotInTable { .. }
            | GhgError::InvalidRaster(_) => ErrorKind::Internal,
            GhgError::Gdal(_)
            | GhgError::Io(_)
            | GhgError::Json(_)
            | GhgError::Csv(_)
            | GhgError::GeoJson(_) => ErrorKind::External,
        }
    }

    pub fn is_user_error(&self) -> bool {
        self.kind() == ErrorKind::User
    }

    /// Text suitable for showing to the person who requested the computation.
    pub fn user_message(&self) -> String {
        match self {
            GhgError::NoChangeDetected { .. } => {
                "No LULC changes were detected between the two timestamps in the selected area. \
                 This is not the same as zero net emissions: there is no change to attribute \
                 emissions to. Please select a different area or period."
                    .to_string()
            }
            GhgError::AoiOutsideSupportedRegion { .. } => {
                "The selected area is outside of the supported region. Please select an area within it."
                    .to_string()
            }
            GhgError::AoiTooLarge { area_km2, max_km2 } => format!(
                "The selected area is too large: {:.2} km². Currently, the maximum allowed area is {} km². \
                 Please select a smaller area or a sub-region of your selected area.",
                area_km2, max_km2
            ),
            GhgError::InvalidInput(msg) => msg.clone(),
            _ => "The computation failed unexpectedly.".to_string(),
        }
    }
}
