//! Scene footprints in the rasters' native projected CRS.

mod mask;

use geo::orient::{Direction, Orient};
use geo::{BooleanOps, ConvexHull, MultiPolygon, Polygon, SimplifyVwPreserve};

use crate::error::{Error, Result};
use crate::geometry::{map_rings, polygon_errors, validate_polygon, ProjectedPolygon};
use crate::projection::Crs;
use crate::raster::{Raster, RasterSource};

/// Staircase steps smaller than this many square pixels are smoothed away.
const STAIRCASE_AREA: f64 = 1.0;

/// Footprint of one scene made of `rasters`.
///
/// With `use_data_footprint` the boundary follows the valid pixels, otherwise
/// it is the union of the pixel-grid outlines.
pub fn trace(rasters: &[Raster], use_data_footprint: bool) -> Result<ProjectedPolygon> {
    if use_data_footprint {
        data_footprint(rasters)
    } else {
        outline(rasters.iter().map(|r| &r.source))
    }
}

/// Union of the pixel-grid outlines of `sources`.
pub fn outline<'a, I>(sources: I) -> Result<ProjectedPolygon>
where
    I: IntoIterator<Item = &'a RasterSource>,
{
    let sources: Vec<&RasterSource> = sources.into_iter().collect();
    let crs = common_crs(&sources)?;

    let mut outlines = Vec::with_capacity(sources.len());
    for source in &sources {
        let polygon = source.outline().orient(Direction::Default);
        if polygon_errors(&polygon).is_empty() {
            outlines.push(polygon);
        } else {
            return Err(Error::EmptyFootprint(format!(
                "{} has a degenerate {}x{} pixel grid",
                source.name, source.cols, source.rows
            )));
        }
    }

    let merged = union_all(outlines.into_iter().map(|p| MultiPolygon(vec![p])));
    single_part(merged, crs)
}

/// Boundary of the valid (finite, non-nodata) pixels of `rasters`.
///
/// Interior gaps become holes; several disjoint parts are replaced by their
/// convex hull so the result keeps a single outer ring.
pub fn data_footprint(rasters: &[Raster]) -> Result<ProjectedPolygon> {
    let sources: Vec<&RasterSource> = rasters.iter().map(|r| &r.source).collect();
    let crs = common_crs(&sources)?;

    let mut parts = Vec::with_capacity(rasters.len());
    for raster in rasters {
        let source = &raster.source;
        let mask = raster.valid_mask();
        let polygons: Vec<Polygon<f64>> = mask::valid_polygons(&mask, source.cols, source.rows)
            .into_iter()
            .map(|p| to_projected(&smooth_staircase(p), source))
            .collect();
        tracing::debug!(
            "{}: {} valid region(s) out of {} pixels",
            source.name,
            polygons.len(),
            mask.len()
        );
        if !polygons.is_empty() {
            parts.push(MultiPolygon(polygons));
        }
    }

    if parts.is_empty() {
        let names: Vec<&str> = sources.iter().map(|s| s.name.as_str()).collect();
        return Err(Error::EmptyFootprint(format!(
            "no valid pixels in {}",
            names.join(", ")
        )));
    }

    single_part(union_all(parts), crs)
}

fn common_crs(sources: &[&RasterSource]) -> Result<Crs> {
    let Some(first) = sources.first() else {
        return Err(Error::InvalidParameter(
            "a footprint needs at least one raster".to_string(),
        ));
    };
    for other in &sources[1..] {
        if !first.crs.is_equivalent(&other.crs) {
            return Err(Error::Geometry(format!(
                "CRS mismatch between {} ({}) and {} ({})",
                first.name,
                first.crs.definition(),
                other.name,
                other.crs.definition()
            )));
        }
    }
    Ok(first.crs.clone())
}

fn union_all<I>(parts: I) -> MultiPolygon<f64>
where
    I: IntoIterator<Item = MultiPolygon<f64>>,
{
    let mut parts = parts.into_iter();
    let Some(mut merged) = parts.next() else {
        return MultiPolygon(vec![]);
    };
    for part in parts {
        // rasters of one scene usually share a grid
        if part != merged {
            merged = merged.union(&part);
        }
    }
    merged
}

fn single_part(merged: MultiPolygon<f64>, crs: Crs) -> Result<ProjectedPolygon> {
    let parts = merged.0.len();
    let polygon = if parts > 1 {
        tracing::warn!(
            "Footprint has {} disjoint parts, using their convex hull",
            parts
        );
        merged.convex_hull()
    } else {
        merged
            .0
            .into_iter()
            .next()
            .ok_or_else(|| Error::EmptyFootprint("footprint union is empty".to_string()))?
    };
    let polygon = polygon.orient(Direction::Default);
    validate_polygon(&polygon)?;
    Ok(ProjectedPolygon { polygon, crs })
}

fn smooth_staircase(polygon: Polygon<f64>) -> Polygon<f64> {
    let smoothed = polygon.simplify_vw_preserve(&STAIRCASE_AREA);
    if polygon_errors(&smoothed).is_empty() {
        smoothed
    } else {
        polygon
    }
}

fn to_projected(polygon: &Polygon<f64>, source: &RasterSource) -> Polygon<f64> {
    let gt = &source.geo_transform;
    map_rings(polygon, |ring| ring.coords().map(|c| gt.apply(c.x, c.y)).collect())
        .orient(Direction::Default)
}
