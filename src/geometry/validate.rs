//! Simple-polygon checks shared by the tracer and the simplifier.

use std::collections::HashSet;

use geo::line_intersection::{line_intersection, LineIntersection};
use geo::{Area, Line, LineString, Polygon};

use crate::error::{Error, Result};

/// Fails with [`Error::Geometry`] listing every problem found.
pub fn validate_polygon(polygon: &Polygon<f64>) -> Result<()> {
    let errors = polygon_errors(polygon);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Geometry(errors.join("; ")))
    }
}

/// Everything that keeps `polygon` from being a valid simple polygon with holes.
///
/// Checks ring size, closure, finiteness, zero area, repeated vertices,
/// self-intersections and crossings between rings. Rings may touch each other
/// at a single point.
pub fn polygon_errors(polygon: &Polygon<f64>) -> Vec<String> {
    let mut rings: Vec<(String, &LineString<f64>)> =
        vec![("exterior ring".to_string(), polygon.exterior())];
    for (i, interior) in polygon.interiors().iter().enumerate() {
        rings.push((format!("interior ring {}", i), interior));
    }

    let mut errors: Vec<String> = rings
        .iter()
        .filter_map(|(name, ring)| ring_error(ring).map(|e| format!("{} {}", name, e)))
        .collect();
    if !errors.is_empty() {
        return errors;
    }

    if let Some((a, b)) = first_intersection(&rings.iter().map(|(_, r)| *r).collect::<Vec<_>>()) {
        if a == b {
            errors.push(format!("{} has a self-intersection", rings[a].0));
        } else {
            errors.push(format!("{} crosses {}", rings[a].0, rings[b].0));
        }
    }
    errors
}

fn ring_error(ring: &LineString<f64>) -> Option<String> {
    let coords = &ring.0;
    if coords.len() < 4 {
        return Some("must have at least 3 distinct points".to_string());
    }
    if coords.first() != coords.last() {
        return Some("is not closed".to_string());
    }
    if let Some(idx) = coords
        .iter()
        .position(|c| !c.x.is_finite() || !c.y.is_finite())
    {
        return Some(format!("has a non-finite coordinate at index {}", idx));
    }
    if Polygon::new(ring.clone(), vec![]).unsigned_area() <= 0.0 {
        return Some("has zero area".to_string());
    }

    let mut seen = HashSet::new();
    for c in &coords[..coords.len() - 1] {
        if !seen.insert((c.x.to_bits(), c.y.to_bits())) {
            return Some(format!("touches itself at ({}, {})", c.x, c.y));
        }
    }
    None
}

struct Edge {
    ring: usize,
    index: usize,
    line: Line<f64>,
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
}

/// Sweep over edges sorted by min x; returns the ring indices of the first
/// offending pair.
fn first_intersection(rings: &[&LineString<f64>]) -> Option<(usize, usize)> {
    let ring_edges: Vec<usize> = rings.iter().map(|r| r.0.len() - 1).collect();
    let mut edges: Vec<Edge> = rings
        .iter()
        .enumerate()
        .flat_map(|(ring, ls)| {
            ls.lines().enumerate().map(move |(index, line)| Edge {
                ring,
                index,
                line,
                min_x: line.start.x.min(line.end.x),
                max_x: line.start.x.max(line.end.x),
                min_y: line.start.y.min(line.end.y),
                max_y: line.start.y.max(line.end.y),
            })
        })
        .collect();
    edges.sort_by(|a, b| a.min_x.total_cmp(&b.min_x));

    for (i, a) in edges.iter().enumerate() {
        for b in &edges[i + 1..] {
            if b.min_x > a.max_x {
                break;
            }
            if b.min_y > a.max_y || b.max_y < a.min_y {
                continue;
            }
            if edges_conflict(a, b, &ring_edges) {
                return Some((a.ring, b.ring));
            }
        }
    }
    None
}

fn edges_conflict(a: &Edge, b: &Edge, ring_edges: &[usize]) -> bool {
    let Some(intersection) = line_intersection(a.line, b.line) else {
        return false;
    };

    if let LineIntersection::Collinear { intersection } = intersection {
        // overlapping edges, including a spike doubling back on itself
        return intersection.start != intersection.end;
    }
    let LineIntersection::SinglePoint {
        intersection,
        is_proper,
    } = intersection
    else {
        return false;
    };

    if a.ring != b.ring {
        return is_proper;
    }

    let n = ring_edges[a.ring];
    let (lo, hi) = (a.index.min(b.index), a.index.max(b.index));
    let adjacent = hi - lo == 1 || (lo == 0 && hi == n - 1);
    if adjacent {
        return false;
    }
    let at_a_end = intersection == a.line.start || intersection == a.line.end;
    let at_b_end = intersection == b.line.start || intersection == b.line.end;
    !(at_a_end && at_b_end)
}
