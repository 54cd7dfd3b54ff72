//! Projected CRS estimation and coordinate reprojection.

use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use tracing::debug;

use crate::error::Result;
use crate::model::Crs;

/// WGS84 UTM zone containing a lon/lat position.
pub fn estimate_utm(lon: f64, lat: f64) -> Crs {
    let zone = (((lon + 180.0) / 6.0).floor() as i64 + 1).clamp(1, 60) as u32;
    if lat >= 0.0 {
        Crs::from_epsg(32600 + zone)
    } else {
        Crs::from_epsg(32700 + zone)
    }
}

/// Spatial reference with x = easting/longitude, y = northing/latitude.
pub fn spatial_ref(crs: Crs) -> Result<SpatialRef> {
    let mut srs = SpatialRef::from_epsg(crs.epsg)?;
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    Ok(srs)
}

/// Transformation between two CRS. A no-op when both are the same.
pub struct Reprojector {
    transform: Option<CoordTransform>,
}

impl Reprojector {
    pub fn new(source: Crs, target: Crs) -> Result<Self> {
        let transform = if source == target {
            None
        } else {
            debug!("Reprojecting from {} to {}", source, target);
            Some(CoordTransform::new(
                &spatial_ref(source)?,
                &spatial_ref(target)?,
            )?)
        };
        Ok(Self { transform })
    }

    pub fn transform_point(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let mut xs = [x];
        let mut ys = [y];
        if let Some(t) = &self.transform {
            t.transform_coords(&mut xs, &mut ys, &mut [])?;
        }
        Ok((xs[0], ys[0]))
    }

    fn transform_ring(&self, ring: &LineString<f64>) -> Result<LineString<f64>> {
        let Some(t) = &self.transform else {
            return Ok(ring.clone());
        };
        let mut xs: Vec<f64> = ring.coords().map(|c| c.x).collect();
        let mut ys: Vec<f64> = ring.coords().map(|c| c.y).collect();
        t.transform_coords(&mut xs, &mut ys, &mut [])?;
        Ok(xs
            .into_iter()
            .zip(ys)
            .map(|(x, y)| Coord { x, y })
            .collect())
    }

    pub fn transform_polygon(&self, polygon: &Polygon<f64>) -> Result<Polygon<f64>> {
        let exterior = self.transform_ring(polygon.exterior())?;
        let interiors = polygon
            .interiors()
            .iter()
            .map(|ring| self.transform_ring(ring))
            .collect::<Result<Vec<_>>>()?;
        Ok(Polygon::new(exterior, interiors))
    }

    pub fn transform_multi_polygon(&self, geometry: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
        geometry
            .iter()
            .map(|p| self.transform_polygon(p))
            .collect::<Result<Vec<_>>>()
            .map(MultiPolygon::new)
    }
}

/// Whether the PROJ database can resolve EPSG codes on this system.
pub fn proj_available() -> bool {
    SpatialRef::from_epsg(32632).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use geo::polygon;

    #[test]
    fn test_estimate_utm() {
        assert_eq!(estimate_utm(2.5, 2.5), Crs::from_epsg(32631));
        assert_eq!(estimate_utm(8.67, 49.4), Crs::from_epsg(32632));
        assert_eq!(estimate_utm(13.4, 52.5), Crs::from_epsg(32633));
        assert_eq!(estimate_utm(-70.6, -33.4), Crs::from_epsg(32719));
        assert_eq!(estimate_utm(180.0, 10.0), Crs::from_epsg(32660));
    }

    #[test]
    fn test_same_crs_is_a_no_op() {
        let reprojector = Reprojector::new(Crs::WGS84, Crs::WGS84).unwrap();
        let square = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)];
        assert_eq!(reprojector.transform_polygon(&square).unwrap(), square);
    }

    #[test]
    fn test_reproject_to_utm() {
        if !proj_available() {
            eprintln!("PROJ database not available, skipping test");
            return;
        }
        let reprojector = Reprojector::new(Crs::WGS84, Crs::from_epsg(32632)).unwrap();
        // central meridian of zone 32 on the equator
        let (x, y) = reprojector.transform_point(9.0, 0.0).unwrap();
        assert_abs_diff_eq!(x, 500_000.0, epsilon = 1e-3);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-3);
    }
}
