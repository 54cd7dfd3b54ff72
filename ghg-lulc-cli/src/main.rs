use anyhow::{Context, Result};
use clap::Parser;
use ghg_lulc::writer::{write_json, write_polygons_geojson, write_table_csv, GeoTiffWriter};
use ghg_lulc::{
    compute, Aoi, ClassLegend, ComputationResult, ComputeInput, EngineConfig, GeoTiffSource,
    LegendMode, StockSources,
};
use rayon::ThreadPoolBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Classification GeoTIFF of the first year
    #[arg(value_name = "BEFORE")]
    before: PathBuf,

    /// Classification GeoTIFF of the second year
    #[arg(value_name = "AFTER")]
    after: PathBuf,

    /// Class legend of the classifications (JSON)
    #[arg(short, long, value_name = "FILE")]
    legend: PathBuf,

    /// Area of interest (GeoJSON, WGS84)
    #[arg(short, long, value_name = "FILE")]
    aoi: PathBuf,

    /// First year of the period
    #[arg(long)]
    start_year: i32,

    /// Last year of the period
    #[arg(long)]
    end_year: i32,

    /// Identifier of the carbon stock source
    #[arg(long, default_value = ghg_lulc::stock::DEFAULT_STOCK_SOURCE)]
    stock_source: String,

    /// Stock values (JSON) to use instead of the built-in table
    #[arg(long, value_name = "FILE")]
    stocks: Option<PathBuf>,

    /// Engine configuration (JSON)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Skip stock classes missing from the legend instead of failing
    #[arg(long)]
    lenient: bool,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,

    /// Number of worker threads (default: number of CPU cores)
    #[arg(short, long)]
    threads: Option<usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let start_time = std::time::Instant::now();

    if let Some(threads) = args.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to build thread pool")?;
    }

    fs::create_dir_all(&args.output)?;

    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load configuration {:?}", path))?,
        None => EngineConfig::default(),
    };
    if args.lenient {
        config.legend_mode = LegendMode::Lenient;
    }

    let stocks = match &args.stocks {
        Some(path) => StockSources::from_json_file(path)
            .with_context(|| format!("Failed to load stock values {:?}", path))?,
        None => StockSources::builtin()?,
    };
    let legend = ClassLegend::from_json_file(&args.legend)
        .with_context(|| format!("Failed to load class legend {:?}", args.legend))?;
    let aoi = Aoi::from_geojson_file(&args.aoi)
        .with_context(|| format!("Failed to load AOI {:?}", args.aoi))?;

    let input = ComputeInput {
        start_year: args.start_year,
        end_year: args.end_year,
        stock_source: args.stock_source.clone(),
    };
    let source = GeoTiffSource::new(legend)
        .with_raster(args.start_year, &args.before)
        .with_raster(args.end_year, &args.after);

    info!(
        "Computing LULC change emissions {} to {}",
        input.start_year, input.end_year
    );
    let result = match compute(&source, &aoi, &input, &stocks, &config) {
        Ok(result) => result,
        Err(e) if e.is_user_error() => {
            error!("{}", e.user_message());
            anyhow::bail!(e);
        }
        Err(e) => return Err(e.into()),
    };

    write_artifacts(&result, &config, &args.output)?;

    let elapsed = start_time.elapsed();
    info!("Total processing time: {:?}", elapsed);

    Ok(())
}

fn write_artifacts(result: &ComputationResult, config: &EngineConfig, output: &Path) -> Result<()> {
    let writer = GeoTiffWriter::new();

    writer.write_classification(
        &result.before,
        &result.legend,
        &format!("LULC classification {}", result.input.start_year),
        &output.join("lulc_classification_before.tif"),
    )?;
    writer.write_classification(
        &result.after,
        &result.legend,
        &format!("LULC classification {}", result.input.end_year),
        &output.join("lulc_classification_after.tif"),
    )?;
    writer.write_changes(
        &result.changes,
        &result.factors,
        config.no_change_value,
        &output.join("LULC_change.tif"),
    )?;
    writer.write_flux(
        &result.flux,
        &result.factors,
        &output.join("LULC_change_emissions.tif"),
    )?;

    write_polygons_geojson(&result.emissions, &output.join("LULC_emissions.geojson"))?;

    write_table_csv(&result.stocks.filtered(), &output.join("stock.csv"))?;
    let change_types: Vec<_> = result.change_types.iter().map(|r| r.rounded()).collect();
    write_table_csv(&change_types, &output.join("stats_change_type.csv"))?;
    write_table_csv(&result.summary.emission_table(), &output.join("summary.csv"))?;
    write_table_csv(&result.summary.area_info_table(), &output.join("area_info.csv"))?;

    write_json(&result.area_chart, &output.join("area_plot.json"))?;
    write_json(&result.emission_chart, &output.join("emission_plot.json"))?;

    info!("Written results to {:?}", output);
    Ok(())
}
