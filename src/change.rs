//! Cell-by-cell change detection between two classifications.

use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::colors::{categorical_color, Rgb, NO_CHANGE_GRAY};
use crate::emission_factor::EmissionFactorTable;
use crate::error::{GhgError, Result};
use crate::model::{ClassificationRaster, MaskedRaster};

pub type ChangeRaster = MaskedRaster<u16>;

/// Change id raster with its legend.
///
/// Unknown cells are invalid in `raster` and hold `nodata` in `raster.data`.
/// The legend never contains `nodata`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeInfo {
    pub raster: ChangeRaster,
    pub colormap: BTreeMap<u16, Rgb>,
    pub nodata: u16,
}

/// Assign every cell the change id of its (before, after) class pair.
///
/// Cells where either input is invalid, or whose pair has no factor row,
/// become `unknown_value` and invalid. Valid cells with equal classes are
/// `no_change_value`, whether or not the table has a row for the pair.
pub fn get_change_info(
    before: &ClassificationRaster,
    after: &ClassificationRaster,
    factors: &EmissionFactorTable,
    unknown_value: u16,
    no_change_value: u16,
) -> Result<ChangeInfo> {
    before.ensure_same_grid(after)?;
    if unknown_value == no_change_value {
        return Err(GhgError::InvalidConfig(format!(
            "unknown and no-change codes must differ (both {})",
            unknown_value
        )));
    }
    if let Some(row) = factors
        .rows()
        .iter()
        .find(|r| r.change_id == unknown_value || r.change_id == no_change_value)
    {
        return Err(GhgError::InvalidConfig(format!(
            "change id {} of '{}' collides with a reserved code",
            row.change_id,
            row.label()
        )));
    }

    let cells: Vec<(u16, bool)> = (0..before.len())
        .into_par_iter()
        .map(|i| {
            if !(before.valid[i] && after.valid[i]) {
                return (unknown_value, false);
            }
            let (b, a) = (before.data[i], after.data[i]);
            if b == a {
                return (no_change_value, true);
            }
            match factors.change_id_for(b, a) {
                Some(id) => (id, true),
                None => (unknown_value, false),
            }
        })
        .collect();
    let (data, valid): (Vec<u16>, Vec<bool>) = cells.into_iter().unzip();

    let raster = MaskedRaster::new(
        before.width,
        before.height,
        data,
        valid,
        before.transform,
        before.crs,
    )?;
    debug!(
        "Derived change raster {}x{} with {} unknown cells",
        raster.width,
        raster.height,
        raster.invalid_count()
    );

    let colormap = change_colormap(&raster, no_change_value);
    Ok(ChangeInfo {
        raster,
        colormap,
        nodata: unknown_value,
    })
}

/// Categorical legend over the change ids present in valid cells.
///
/// Each id is colored by its ratio to the largest present id. The no-change
/// code is always gray.
pub fn change_colormap(raster: &ChangeRaster, no_change_value: u16) -> BTreeMap<u16, Rgb> {
    let present: BTreeSet<u16> = raster
        .data
        .iter()
        .zip(&raster.valid)
        .filter(|(_, ok)| **ok)
        .map(|(v, _)| *v)
        .collect();

    let mut colormap = BTreeMap::new();
    if let Some(&max_id) = present.iter().next_back() {
        for &id in &present {
            let fraction = if max_id == 0 {
                0.0
            } else {
                f64::from(id) / f64::from(max_id)
            };
            colormap.insert(id, categorical_color(fraction));
        }
    }
    colormap.insert(no_change_value, NO_CHANGE_GRAY);
    colormap
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emission_factor::tests::hansis_factors;
    use crate::model::{Crs, GeoTransform};

    const U: u16 = u16::MAX;

    fn classification(rows: &[[u8; 5]]) -> ClassificationRaster {
        let data: Vec<u8> = rows.iter().flatten().copied().collect();
        MaskedRaster::with_nodata(
            5,
            rows.len(),
            data,
            0,
            GeoTransform::north_up(8.0, 49.0, 0.0001),
            Crs::WGS84,
        )
        .unwrap()
    }

    fn five_by_five() -> (ClassificationRaster, ClassificationRaster) {
        let before = classification(&[
            [1, 2, 3, 4, 5],
            [1, 2, 3, 4, 5],
            [1, 2, 3, 4, 5],
            [1, 2, 3, 4, 5],
            [1, 2, 3, 4, 0],
        ]);
        let after = classification(&[
            [1, 2, 3, 4, 5],
            [2, 3, 4, 5, 0],
            [3, 4, 5, 1, 2],
            [4, 5, 1, 2, 3],
            [1, 2, 3, 0, 1],
        ]);
        (before, after)
    }

    #[test]
    fn test_get_change_info() {
        let (before, after) = five_by_five();
        let info = get_change_info(&before, &after, &hansis_factors(), U, 0).unwrap();

        let expected: Vec<u16> = [
            [0, 0, 0, 0, 0],
            [2, 7, 12, U, U],
            [3, 8, U, 13, U],
            [4, U, 9, 14, U],
            [0, 0, 0, U, U],
        ]
        .iter()
        .flatten()
        .copied()
        .collect();
        assert_eq!(info.raster.filled(U), expected);
        assert_eq!(info.nodata, U);

        let expected_colormap: BTreeMap<u16, Rgb> = [
            (0, NO_CHANGE_GRAY),
            (2, Rgb::new(107, 110, 207)),
            (3, Rgb::new(99, 121, 57)),
            (4, Rgb::new(140, 162, 82)),
            (7, Rgb::new(231, 186, 82)),
            (8, Rgb::new(231, 203, 148)),
            (9, Rgb::new(132, 60, 57)),
            (12, Rgb::new(165, 81, 148)),
            (13, Rgb::new(206, 109, 189)),
            (14, Rgb::new(222, 158, 214)),
        ]
        .into_iter()
        .collect();
        assert_eq!(info.colormap, expected_colormap);
    }

    #[test]
    fn test_identical_rasters_have_no_change() {
        let (before, _) = five_by_five();
        let info = get_change_info(&before, &before, &hansis_factors(), U, 0).unwrap();
        for i in 0..info.raster.len() {
            if before.valid[i] {
                assert_eq!(info.raster.data[i], 0);
                assert!(info.raster.valid[i]);
            } else {
                assert_eq!(info.raster.data[i], U);
                assert!(!info.raster.valid[i]);
            }
        }
    }

    #[test]
    fn test_masking_only_grows() {
        let (before, after) = five_by_five();
        let info = get_change_info(&before, &after, &hansis_factors(), U, 0).unwrap();
        for i in 0..info.raster.len() {
            if !before.valid[i] || !after.valid[i] {
                assert!(!info.raster.valid[i]);
            }
        }
        assert!(info.raster.invalid_count() > before.invalid_count() + after.invalid_count());
    }

    #[test]
    fn test_colormap_of_single_change() {
        let raster = MaskedRaster::new(
            2,
            1,
            vec![2u16, 7],
            vec![true, false],
            GeoTransform::north_up(0.0, 0.0, 1.0),
            Crs::WGS84,
        )
        .unwrap();
        let colormap = change_colormap(&raster, 0);
        assert_eq!(colormap.len(), 2);
        assert_eq!(colormap[&2], Rgb::new(222, 158, 214));
        assert_eq!(colormap[&0], NO_CHANGE_GRAY);
    }

    #[test]
    fn test_mismatched_grids_are_rejected() {
        let (before, _) = five_by_five();
        let mut after = before.clone();
        after.transform = GeoTransform::north_up(9.0, 49.0, 0.0001);
        let result = get_change_info(&before, &after, &hansis_factors(), U, 0);
        assert!(matches!(
            result,
            Err(GhgError::RasterMismatch { what: "transform", .. })
        ));
    }
}
