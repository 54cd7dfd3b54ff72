//! End-to-end emission computation.

use tracing::{debug, info};

use crate::aoi::{mask_raster, Aoi};
use crate::change::{get_change_info, ChangeInfo};
use crate::classification::{ClassificationRequest, ClassificationSource, ComputeInput};
use crate::config::EngineConfig;
use crate::emission_factor::EmissionFactorTable;
use crate::error::Result;
use crate::flux::{get_change_emissions_info, FluxInfo};
use crate::legend::ClassLegend;
use crate::model::ClassificationRaster;
use crate::stats::{
    area_chart, calculate_absolute_emissions_per_poly, emission_chart, get_change_type_table,
    summary_stats, ChangeTypeRow, ChartData, EmissionPolygons, SummaryStats,
};
use crate::stock::{StockSources, StockTable};
use crate::vectorize::{convert_change_raster, ChangePolygons};

/// Change detection and emission attribution for one factor table.
#[derive(Debug, Clone)]
pub struct EmissionCalculator {
    factors: EmissionFactorTable,
    config: EngineConfig,
}

impl EmissionCalculator {
    pub fn new(factors: EmissionFactorTable, config: EngineConfig) -> Self {
        Self { factors, config }
    }

    pub fn factors(&self) -> &EmissionFactorTable {
        &self.factors
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Change raster and per-pixel flux raster between two classifications.
    pub fn derive_lulc_changes(
        &self,
        before: &ClassificationRaster,
        after: &ClassificationRaster,
    ) -> Result<(ChangeInfo, FluxInfo)> {
        debug!("Deriving LULC changes");
        let changes = self.get_change_info(before, after)?;
        let flux = self.get_change_emissions_info(&changes)?;
        Ok((changes, flux))
    }

    pub fn get_change_info(
        &self,
        before: &ClassificationRaster,
        after: &ClassificationRaster,
    ) -> Result<ChangeInfo> {
        get_change_info(
            before,
            after,
            &self.factors,
            self.config.unknown_change_value,
            self.config.no_change_value,
        )
    }

    pub fn get_change_emissions_info(&self, changes: &ChangeInfo) -> Result<FluxInfo> {
        get_change_emissions_info(
            changes,
            &self.factors,
            self.config.no_change_value,
            self.config.emission_per_pixel_factor(),
            self.config.unknown_emissions_value,
        )
    }

    pub fn convert_change_raster(&self, changes: &ChangeInfo) -> Result<ChangePolygons> {
        convert_change_raster(changes, &self.factors, self.config.no_change_value)
    }
}

/// Everything one computation produces.
#[derive(Debug, Clone)]
pub struct ComputationResult {
    pub input: ComputeInput,
    pub legend: ClassLegend,
    pub stocks: StockTable,
    pub factors: EmissionFactorTable,
    pub before: ClassificationRaster,
    pub after: ClassificationRaster,
    pub changes: ChangeInfo,
    pub flux: FluxInfo,
    pub emissions: EmissionPolygons,
    pub summary: SummaryStats,
    pub change_types: Vec<ChangeTypeRow>,
    pub area_chart: ChartData,
    pub emission_chart: ChartData,
}

/// Run the whole chain for one AOI and period.
///
/// Either every result is produced or an error is returned.
pub fn compute<S: ClassificationSource + ?Sized>(
    source: &S,
    aoi: &Aoi,
    input: &ComputeInput,
    stocks: &StockSources,
    config: &EngineConfig,
) -> Result<ComputationResult> {
    config.validate()?;
    input.validate()?;
    aoi.validate(config)?;

    let legend = source.class_legend()?;
    let stock_table = stocks.table(&input.stock_source, &legend, config.legend_mode)?;
    let factors = EmissionFactorTable::from_stock_table(&stock_table, config)?;
    info!(
        "Using stock source '{}' with {} change types",
        stock_table.source_name(),
        factors.len()
    );

    let bbox = aoi.bounds()?;
    let threshold = config.classification_threshold;
    let mut before =
        source.classify(&ClassificationRequest::for_july(bbox, input.start_year, threshold)?)?;
    let mut after =
        source.classify(&ClassificationRequest::for_july(bbox, input.end_year, threshold)?)?;
    mask_raster(&mut before, aoi)?;
    mask_raster(&mut after, aoi)?;

    let calculator = EmissionCalculator::new(factors, config.clone());
    let (changes, flux) = calculator.derive_lulc_changes(&before, &after)?;
    let polygons = calculator.convert_change_raster(&changes)?;

    let emissions = calculate_absolute_emissions_per_poly(&polygons);
    let summary = summary_stats(&emissions, aoi.geometry())?;
    let change_types = get_change_type_table(&emissions);
    info!(
        "Net emissions between {} and {}: {:.1} t",
        input.start_year, input.end_year, summary.net_emissions_t
    );

    Ok(ComputationResult {
        input: input.clone(),
        legend,
        stocks: stock_table,
        area_chart: area_chart(&emissions),
        emission_chart: emission_chart(&emissions),
        factors: calculator.factors().clone(),
        before,
        after,
        changes,
        flux,
        emissions,
        summary,
        change_types,
    })
}
