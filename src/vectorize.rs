//! Polygonization of the change raster.
//!
//! Regions are traced along pixel edges with the region kept on the left
//! of every edge. At vertices shared by two diagonal pixels the tracer turns
//! left first, so diagonal neighbours end up in separate rings
//! (4-connectivity). Rings winding one way are exteriors, the others holes.
//! All polygons of one change id form a single dissolved multipolygon.

use geo::{BoundingRect, Coord, LineString, MapCoords, MultiPolygon, Polygon};
use rayon::prelude::*;
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::change::{ChangeInfo, ChangeRaster};
use crate::crs::{estimate_utm, Reprojector};
use crate::emission_factor::{EmissionFactorRow, EmissionFactorTable};
use crate::error::{GhgError, Result};
use crate::model::Crs;

const EAST: usize = 0;
const SOUTH: usize = 1;
const WEST: usize = 2;
const NORTH: usize = 3;
const DX: [i64; 4] = [1, 0, -1, 0];
const DY: [i64; 4] = [0, 1, 0, -1];

/// Dissolved polygon of one change type joined with its factor row.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangePolygon {
    pub change_id: u16,
    pub geometry: MultiPolygon<f64>,
    pub factor: EmissionFactorRow,
}

/// Change polygons in a projected CRS, one per change id, sorted by id.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangePolygons {
    pub crs: Crs,
    pub features: Vec<ChangePolygon>,
}

struct Ring {
    coords: Vec<Coord<f64>>,
    signed_area: f64,
    /// Centre of the region pixel left of the first edge.
    seed: Coord<f64>,
}

/// Outgoing boundary edges per grid vertex as a bit set of directions.
fn boundary_edges(mask: &[bool], width: usize, height: usize) -> Vec<u8> {
    let vw = width + 1;
    let inside = |r: i64, c: i64| {
        r >= 0
            && c >= 0
            && (r as usize) < height
            && (c as usize) < width
            && mask[r as usize * width + c as usize]
    };

    let mut out = vec![0u8; vw * (height + 1)];
    for r in 0..height {
        for c in 0..width {
            if !mask[r * width + c] {
                continue;
            }
            let (ri, ci) = (r as i64, c as i64);
            if !inside(ri - 1, ci) {
                out[r * vw + c + 1] |= 1 << WEST;
            }
            if !inside(ri, ci - 1) {
                out[r * vw + c] |= 1 << SOUTH;
            }
            if !inside(ri + 1, ci) {
                out[(r + 1) * vw + c] |= 1 << EAST;
            }
            if !inside(ri, ci + 1) {
                out[(r + 1) * vw + c + 1] |= 1 << NORTH;
            }
        }
    }
    out
}

fn vertex_coord(v: usize, vw: usize) -> Coord<f64> {
    Coord {
        x: (v % vw) as f64,
        y: (v / vw) as f64,
    }
}

fn left_pixel_center(v: usize, d: usize, vw: usize) -> Coord<f64> {
    let (x, y) = ((v % vw) as f64, (v / vw) as f64);
    let (col, row) = match d {
        WEST => (x - 1.0, y),
        SOUTH => (x, y),
        EAST => (x, y - 1.0),
        _ => (x - 1.0, y - 1.0),
    };
    Coord {
        x: col + 0.5,
        y: row + 0.5,
    }
}

fn shoelace(coords: &[Coord<f64>]) -> f64 {
    let n = coords.len();
    (0..n)
        .map(|i| {
            let (a, b) = (coords[i], coords[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum::<f64>()
        / 2.0
}

fn trace_ring(out: &[u8], visited: &mut [u8], vw: usize, start_v: usize, start_d: usize) -> Ring {
    let mut coords = vec![vertex_coord(start_v, vw)];
    let (mut v, mut d) = (start_v, start_d);
    loop {
        visited[v] |= 1 << d;
        let x = (v % vw) as i64 + DX[d];
        let y = (v / vw) as i64 + DY[d];
        let w = y as usize * vw + x as usize;

        // left, straight, right
        let Some(next) = [(d + 3) % 4, d, (d + 1) % 4]
            .into_iter()
            .find(|nd| out[w] & (1 << nd) != 0)
        else {
            break;
        };
        if w == start_v && next == start_d {
            if next == d {
                coords.remove(0);
            }
            break;
        }
        if next != d {
            coords.push(vertex_coord(w, vw));
        }
        v = w;
        d = next;
    }

    Ring {
        signed_area: shoelace(&coords),
        seed: left_pixel_center(start_v, start_d, vw),
        coords,
    }
}

/// 4-connected component label per cell (`u32::MAX` outside the mask) and
/// the number of components.
fn label_components(mask: &[bool], width: usize, height: usize) -> (Vec<u32>, usize) {
    let mut labels = vec![u32::MAX; mask.len()];
    let mut next = 0u32;
    let mut stack = Vec::new();
    for start in 0..mask.len() {
        if !mask[start] || labels[start] != u32::MAX {
            continue;
        }
        labels[start] = next;
        stack.push(start);
        while let Some(i) = stack.pop() {
            let (r, c) = (i / width, i % width);
            let neighbours = [
                (r > 0).then(|| i - width),
                (r + 1 < height).then(|| i + width),
                (c > 0).then(|| i - 1),
                (c + 1 < width).then(|| i + 1),
            ];
            for n in neighbours.into_iter().flatten() {
                if mask[n] && labels[n] == u32::MAX {
                    labels[n] = next;
                    stack.push(n);
                }
            }
        }
        next += 1;
    }
    (labels, next as usize)
}

/// Polygons of the `true` cells of `mask`, in grid coordinates
/// (x = column, y = row).
///
/// Every ring bounds exactly one 4-connected component, so a hole belongs to
/// the shell traced around the component of its seed pixel.
pub fn trace_polygons(mask: &[bool], width: usize, height: usize) -> Vec<Polygon<f64>> {
    let vw = width + 1;
    let out = boundary_edges(mask, width, height);
    let mut visited = vec![0u8; out.len()];

    let mut rings = Vec::new();
    for v in 0..out.len() {
        while out[v] & !visited[v] != 0 {
            let d = (out[v] & !visited[v]).trailing_zeros() as usize;
            rings.push(trace_ring(&out, &mut visited, vw, v, d));
        }
    }

    let (labels, components) = label_components(mask, width, height);
    let component = |seed: Coord<f64>| labels[seed.y as usize * width + seed.x as usize] as usize;
    let (exteriors, holes): (Vec<Ring>, Vec<Ring>) =
        rings.into_iter().partition(|r| r.signed_area < 0.0);

    let mut shell_of = vec![usize::MAX; components];
    for (i, shell) in exteriors.iter().enumerate() {
        shell_of[component(shell.seed)] = i;
    }

    let mut interiors: Vec<Vec<LineString<f64>>> = vec![Vec::new(); exteriors.len()];
    for hole in holes {
        if let Some(list) = interiors.get_mut(shell_of[component(hole.seed)]) {
            list.push(LineString::from(hole.coords));
        }
    }

    exteriors
        .into_iter()
        .zip(interiors)
        .map(|(shell, holes)| Polygon::new(LineString::from(shell.coords), holes))
        .collect()
}

/// Dissolved polygons per change id in the raster's CRS.
///
/// Only valid cells take part; ids in `exclude` are skipped.
pub fn polygonize(raster: &ChangeRaster, exclude: &[u16]) -> Vec<(u16, MultiPolygon<f64>)> {
    let ids: Vec<u16> = raster
        .data
        .iter()
        .zip(&raster.valid)
        .filter(|(v, ok)| **ok && !exclude.contains(v))
        .map(|(v, _)| *v)
        .collect::<BTreeSet<u16>>()
        .into_iter()
        .collect();

    let gt = raster.transform;
    ids.into_par_iter()
        .map(|id| {
            let mask: Vec<bool> = raster
                .data
                .iter()
                .zip(&raster.valid)
                .map(|(v, ok)| *ok && *v == id)
                .collect();
            let polygons: Vec<Polygon<f64>> = trace_polygons(&mask, raster.width, raster.height)
                .into_iter()
                .map(|p| {
                    p.map_coords(move |c| {
                        let (x, y) = gt.apply(c.x, c.y);
                        Coord { x, y }
                    })
                })
                .collect();
            (id, MultiPolygon::new(polygons))
        })
        .collect()
}

/// Vectorize the change raster, join the factor rows and reproject to the
/// UTM zone of the changed area.
///
/// No-change and unknown cells are left out. Fails with
/// [`GhgError::NoChangeDetected`] when nothing remains.
pub fn convert_change_raster(
    changes: &ChangeInfo,
    factors: &EmissionFactorTable,
    no_change_value: u16,
) -> Result<ChangePolygons> {
    let raster = &changes.raster;
    debug!(
        "Converting change raster of shape {}x{} to vector",
        raster.width, raster.height
    );

    let dissolved = polygonize(raster, &[no_change_value, changes.nodata]);
    if dissolved.is_empty() {
        let (min_x, min_y, max_x, max_y) = raster.transform.bounds(raster.width, raster.height);
        return Err(GhgError::NoChangeDetected {
            bbox: format!("({}, {}, {}, {})", min_x, min_y, max_x, max_y),
        });
    }

    let all: MultiPolygon<f64> = dissolved
        .iter()
        .flat_map(|(_, mp)| mp.0.iter().cloned())
        .collect();
    let center = all
        .bounding_rect()
        .map(|r| r.center())
        .ok_or_else(|| GhgError::InvalidRaster("change polygons have no extent".to_string()))?;
    let (lon, lat) = Reprojector::new(raster.crs, Crs::WGS84)?.transform_point(center.x, center.y)?;
    let target = estimate_utm(lon, lat);
    let reprojector = Reprojector::new(raster.crs, target)?;

    let features = dissolved
        .into_iter()
        .map(|(change_id, geometry)| {
            let factor = factors
                .by_id(change_id)
                .ok_or(GhgError::ChangeIdNotInTable { change_id })?
                .clone();
            Ok(ChangePolygon {
                change_id,
                geometry: reprojector.transform_multi_polygon(&geometry)?,
                factor,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    info!(
        "Vectorized {} change types, reprojected to {}",
        features.len(),
        target
    );
    Ok(ChangePolygons {
        crs: target,
        features,
    })
}
