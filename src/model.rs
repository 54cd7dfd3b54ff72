use serde::{Deserialize, Serialize};

use crate::error::{GhgError, Result};

/// GDAL style affine transform from pixel to map coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    /// North-up transform with square pixels.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_size: f64) -> Self {
        Self([origin_x, pixel_size, 0.0, origin_y, 0.0, -pixel_size])
    }

    /// Map coordinates of a grid corner `(col, row)`.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let gt = &self.0;
        (
            gt[0] + col * gt[1] + row * gt[2],
            gt[3] + col * gt[4] + row * gt[5],
        )
    }

    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Map coordinates of the outer corners: `(min_x, min_y, max_x, max_y)`.
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let corners = [
            self.apply(0.0, 0.0),
            self.apply(width as f64, 0.0),
            self.apply(0.0, height as f64),
            self.apply(width as f64, height as f64),
        ];
        corners.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), &(x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        )
    }
}

/// Coordinate reference system identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs {
    pub epsg: u32,
}

impl Crs {
    pub const WGS84: Crs = Crs { epsg: 4326 };

    pub fn from_epsg(epsg: u32) -> Self {
        Self { epsg }
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

/// Georeferenced grid with a per-cell validity channel.
///
/// `valid[i] == false` marks a cell outside the AOI, below the confidence
/// threshold or otherwise unknown. Its entry in `data` carries no meaning.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedRaster<T> {
    pub width: usize,
    pub height: usize,
    pub data: Vec<T>,
    pub valid: Vec<bool>,
    pub transform: GeoTransform,
    pub crs: Crs,
}

pub type ClassificationRaster = MaskedRaster<u8>;

impl<T: Copy + PartialEq> MaskedRaster<T> {
    pub fn new(
        width: usize,
        height: usize,
        data: Vec<T>,
        valid: Vec<bool>,
        transform: GeoTransform,
        crs: Crs,
    ) -> Result<Self> {
        let cells = width * height;
        if data.len() != cells || valid.len() != cells {
            return Err(GhgError::InvalidRaster(format!(
                "a {}x{} grid needs {} cells, got {} values and {} mask entries",
                width,
                height,
                cells,
                data.len(),
                valid.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
            valid,
            transform,
            crs,
        })
    }

    /// Raster without invalid cells.
    pub fn fully_valid(
        width: usize,
        height: usize,
        data: Vec<T>,
        transform: GeoTransform,
        crs: Crs,
    ) -> Result<Self> {
        let valid = vec![true; data.len()];
        Self::new(width, height, data, valid, transform, crs)
    }

    /// Raster where every cell equal to `nodata` is invalid.
    pub fn with_nodata(
        width: usize,
        height: usize,
        data: Vec<T>,
        nodata: T,
        transform: GeoTransform,
        crs: Crs,
    ) -> Result<Self> {
        let valid = data.iter().map(|v| *v != nodata).collect();
        Self::new(width, height, data, valid, transform, crs)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    /// Value of a valid cell, `None` for invalid cells.
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        let i = self.index(row, col);
        self.valid[i].then(|| self.data[i])
    }

    pub fn invalid_count(&self) -> usize {
        self.valid.iter().filter(|v| !**v).count()
    }

    /// Data with every invalid cell replaced by `fill`.
    pub fn filled(&self, fill: T) -> Vec<T> {
        self.data
            .iter()
            .zip(&self.valid)
            .map(|(v, ok)| if *ok { *v } else { fill })
            .collect()
    }

    /// Fail unless `other` covers the same grid in the same CRS.
    pub fn ensure_same_grid<U>(&self, other: &MaskedRaster<U>) -> Result<()> {
        if (self.width, self.height) != (other.width, other.height) {
            return Err(GhgError::RasterMismatch {
                what: "shape",
                left: format!("{}x{}", self.width, self.height),
                right: format!("{}x{}", other.width, other.height),
            });
        }
        if self.transform != other.transform {
            return Err(GhgError::RasterMismatch {
                what: "transform",
                left: format!("{:?}", self.transform.0),
                right: format!("{:?}", other.transform.0),
            });
        }
        if self.crs != other.crs {
            return Err(GhgError::RasterMismatch {
                what: "crs",
                left: self.crs.to_string(),
                right: other.crs.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(width: usize, height: usize) -> ClassificationRaster {
        MaskedRaster::fully_valid(
            width,
            height,
            vec![1; width * height],
            GeoTransform::north_up(0.0, 0.0, 1.0),
            Crs::WGS84,
        )
        .unwrap()
    }

    #[test]
    fn test_geotransform() {
        let gt = GeoTransform::north_up(8.0, 50.0, 0.5);
        assert_eq!(gt.apply(0.0, 0.0), (8.0, 50.0));
        assert_eq!(gt.pixel_center(1, 1), (8.75, 49.25));
        assert_eq!(gt.bounds(4, 2), (8.0, 49.0, 10.0, 50.0));
    }

    #[test]
    fn test_shape_is_checked() {
        let result = MaskedRaster::<u8>::fully_valid(
            2,
            2,
            vec![1, 2, 3],
            GeoTransform::north_up(0.0, 0.0, 1.0),
            Crs::WGS84,
        );
        assert!(matches!(result, Err(GhgError::InvalidRaster(_))));
    }

    #[test]
    fn test_nodata_and_fill() {
        let r = MaskedRaster::with_nodata(
            2,
            1,
            vec![0u8, 3],
            0,
            GeoTransform::north_up(0.0, 0.0, 1.0),
            Crs::WGS84,
        )
        .unwrap();
        assert_eq!(r.get(0, 0), None);
        assert_eq!(r.get(0, 1), Some(3));
        assert_eq!(r.invalid_count(), 1);
        assert_eq!(r.filled(9), vec![9, 3]);
    }

    #[test]
    fn test_grid_mismatch() {
        let a = raster(2, 2);
        assert!(a.ensure_same_grid(&raster(2, 2)).is_ok());
        assert!(matches!(
            a.ensure_same_grid(&raster(3, 2)),
            Err(GhgError::RasterMismatch { what: "shape", .. })
        ));

        let mut b = raster(2, 2);
        b.crs = Crs::from_epsg(32632);
        assert!(matches!(
            a.ensure_same_grid(&b),
            Err(GhgError::RasterMismatch { what: "crs", .. })
        ));
    }
}
