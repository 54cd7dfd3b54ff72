//! Area of interest handling.

use geo::{Area, BoundingRect, Contains, Intersects, MultiPolygon, Point, Polygon};
use geojson::GeoJson;
use std::path::Path;
use tracing::debug;

use crate::config::{BoundingBox, EngineConfig};
use crate::crs::{estimate_utm, Reprojector};
use crate::error::{GhgError, Result};
use crate::model::{Crs, MaskedRaster};

/// Area of interest in WGS84 lon/lat.
#[derive(Debug, Clone, PartialEq)]
pub struct Aoi {
    geometry: MultiPolygon<f64>,
}

fn collect_polygons(geometry: geo::Geometry<f64>, out: &mut Vec<Polygon<f64>>) -> Result<()> {
    match geometry {
        geo::Geometry::Polygon(p) => out.push(p),
        geo::Geometry::MultiPolygon(mp) => out.extend(mp.0),
        geo::Geometry::GeometryCollection(gc) => {
            for g in gc {
                collect_polygons(g, out)?;
            }
        }
        _ => {
            return Err(GhgError::InvalidInput(
                "the area of interest must consist of polygons".to_string(),
            ))
        }
    }
    Ok(())
}

impl Aoi {
    pub fn new(geometry: MultiPolygon<f64>) -> Result<Self> {
        if geometry.0.is_empty() {
            return Err(GhgError::InvalidInput(
                "the area of interest is empty".to_string(),
            ));
        }
        Ok(Self { geometry })
    }

    /// Read a GeoJSON geometry, feature or feature collection.
    pub fn from_geojson_str(content: &str) -> Result<Self> {
        let geometries = match content.parse::<GeoJson>()? {
            GeoJson::Geometry(g) => vec![g],
            GeoJson::Feature(f) => f.geometry.into_iter().collect(),
            GeoJson::FeatureCollection(fc) => {
                fc.features.into_iter().filter_map(|f| f.geometry).collect()
            }
        };

        let mut polygons = Vec::new();
        for g in geometries {
            collect_polygons(geo::Geometry::try_from(g)?, &mut polygons)?;
        }
        Self::new(MultiPolygon::new(polygons))
    }

    pub fn from_geojson_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_geojson_str(&content)
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    pub fn bounds(&self) -> Result<BoundingBox> {
        let rect = self.geometry.bounding_rect().ok_or_else(|| {
            GhgError::InvalidInput("the area of interest has no extent".to_string())
        })?;
        Ok(BoundingBox::new(
            rect.min().x,
            rect.min().y,
            rect.max().x,
            rect.max().y,
        ))
    }

    /// Area in square metres, measured in the UTM zone of the AOI centre.
    pub fn utm_area_m2(&self) -> Result<f64> {
        let (lon, lat) = self.bounds()?.center();
        let utm = estimate_utm(lon, lat);
        let projected = Reprojector::new(Crs::WGS84, utm)?.transform_multi_polygon(&self.geometry)?;
        Ok(projected.unsigned_area())
    }

    /// Check the AOI against the supported region and the size limit.
    pub fn validate(&self, config: &EngineConfig) -> Result<()> {
        if let Some(region) = config.supported_region {
            if !self.geometry.intersects(&region.to_rect()) {
                return Err(GhgError::AoiOutsideSupportedRegion {
                    bbox: self.bounds()?.to_string(),
                    region: region.to_string(),
                });
            }
        }

        let area_km2 = self.utm_area_m2()? / 1_000_000.0;
        debug!("AOI area: {:.2} km²", area_km2);
        if area_km2 > config.max_aoi_area_km2 {
            return Err(GhgError::AoiTooLarge {
                area_km2,
                max_km2: config.max_aoi_area_km2,
            });
        }
        Ok(())
    }
}

/// Invalidate every cell whose pixel centre lies outside the AOI.
pub fn mask_raster<T>(raster: &mut MaskedRaster<T>, aoi: &Aoi) -> Result<()> {
    let geometry = Reprojector::new(Crs::WGS84, raster.crs)?.transform_multi_polygon(aoi.geometry())?;
    let width = raster.width;
    let transform = raster.transform;
    let mut masked = 0usize;
    for (i, valid) in raster.valid.iter_mut().enumerate() {
        if !*valid {
            continue;
        }
        let (x, y) = transform.pixel_center(i % width, i / width);
        if !geometry.contains(&Point::new(x, y)) {
            *valid = false;
            masked += 1;
        }
    }
    debug!("Masked {} cells outside the AOI", masked);
    Ok(())
}
