pub mod aoi;
pub mod change;
pub mod classification;
pub mod colors;
pub mod config;
pub mod crs;
pub mod emission_factor;
pub mod error;
pub mod flux;
pub mod legend;
pub mod model;
pub mod pipeline;
pub mod stats;
pub mod stock;
pub mod vectorize;
pub mod writer;

pub use aoi::Aoi;
pub use classification::{ClassificationRequest, ClassificationSource, ComputeInput, GeoTiffSource};
pub use config::{EngineConfig, LegendMode};
pub use emission_factor::EmissionFactorTable;
pub use error::{GhgError, Result};
pub use legend::ClassLegend;
pub use model::{ClassificationRaster, Crs, GeoTransform, MaskedRaster};
pub use pipeline::{compute, ComputationResult, EmissionCalculator};
pub use stock::{StockSources, StockTable};
pub use writer::GeoTiffWriter;
