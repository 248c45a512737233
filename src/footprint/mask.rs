//! Boundary tracing of a validity mask on the pixel-corner lattice.
//!
//! Every valid cell contributes the sides it shares with an invalid (or
//! out-of-grid) neighbour as directed edges with the valid cell on the left.
//! Linking the edges gives counter-clockwise outer rings and clockwise holes
//! in (col, row) coordinates.

use std::collections::HashMap;

use geo::{Contains, Coord, LineString, Polygon};

type Vertex = (i64, i64);

/// Polygons, in pixel-corner coordinates, covering exactly the valid cells.
pub(crate) fn valid_polygons(mask: &[bool], cols: usize, rows: usize) -> Vec<Polygon<f64>> {
    let rings = trace_rings(mask, cols, rows);

    let (outers, holes): (Vec<Vec<Vertex>>, Vec<Vec<Vertex>>) =
        rings.into_iter().partition(|ring| twice_area(ring) > 0);

    let mut outer_polygons: Vec<(i64, Polygon<f64>, Vec<LineString<f64>>)> = outers
        .into_iter()
        .map(|ring| {
            let area = twice_area(&ring);
            (area, Polygon::new(to_line_string(&ring), vec![]), Vec::new())
        })
        .collect();

    for hole in holes {
        let inside = interior_point(&hole);
        let owner = outer_polygons
            .iter_mut()
            .filter(|(_, polygon, _)| polygon.contains(&inside))
            .min_by_key(|(area, _, _)| *area);
        if let Some((_, _, interiors)) = owner {
            interiors.push(to_line_string(&hole));
        }
    }

    outer_polygons
        .into_iter()
        .map(|(_, polygon, interiors)| {
            let (exterior, _) = polygon.into_inner();
            Polygon::new(exterior, interiors)
        })
        .collect()
}

fn trace_rings(mask: &[bool], cols: usize, rows: usize) -> Vec<Vec<Vertex>> {
    let valid = |c: i64, r: i64| -> bool {
        c >= 0
            && r >= 0
            && (c as usize) < cols
            && (r as usize) < rows
            && mask[r as usize * cols + c as usize]
    };

    let mut edges: Vec<(Vertex, Vertex)> = Vec::new();
    for r in 0..rows as i64 {
        for c in 0..cols as i64 {
            if !valid(c, r) {
                continue;
            }
            if !valid(c, r - 1) {
                edges.push(((c, r), (c + 1, r)));
            }
            if !valid(c + 1, r) {
                edges.push(((c + 1, r), (c + 1, r + 1)));
            }
            if !valid(c, r + 1) {
                edges.push(((c + 1, r + 1), (c, r + 1)));
            }
            if !valid(c - 1, r) {
                edges.push(((c, r + 1), (c, r)));
            }
        }
    }

    let mut outgoing: HashMap<Vertex, Vec<usize>> = HashMap::new();
    for (i, (start, _)) in edges.iter().enumerate() {
        outgoing.entry(*start).or_default().push(i);
    }

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();
    for first in 0..edges.len() {
        if used[first] {
            continue;
        }
        used[first] = true;
        let origin = edges[first].0;
        let mut path = vec![origin];
        let mut current = first;

        loop {
            let (from, to) = edges[current];
            if to == origin {
                break;
            }
            let incoming = (to.0 - from.0, to.1 - from.1);
            let next = outgoing
                .get(&to)
                .into_iter()
                .flatten()
                .copied()
                .filter(|&e| !used[e])
                .max_by_key(|&e| {
                    let (a, b) = edges[e];
                    let out = (b.0 - a.0, b.1 - a.1);
                    // prefer the left turn at saddle points
                    incoming.0 * out.1 - incoming.1 * out.0
                });
            let Some(next) = next else {
                break;
            };
            used[next] = true;
            path.push(to);
            current = next;
        }

        rings.extend(split_at_repeats(path));
    }

    rings
        .into_iter()
        .map(remove_collinear)
        .filter(|ring| ring.len() >= 4)
        .collect()
}

/// Cuts a ring that passes through the same vertex twice into simple loops.
fn split_at_repeats(path: Vec<Vertex>) -> Vec<Vec<Vertex>> {
    let mut stack: Vec<Vertex> = Vec::with_capacity(path.len());
    let mut position: HashMap<Vertex, usize> = HashMap::new();
    let mut loops = Vec::new();

    for v in path {
        if let Some(&i) = position.get(&v) {
            let pinched: Vec<Vertex> = stack.drain(i..).collect();
            for u in &pinched {
                position.remove(u);
            }
            loops.push(pinched);
        }
        position.insert(v, stack.len());
        stack.push(v);
    }
    loops.push(stack);
    loops
}

/// Keeps only the vertices where the ring changes direction. Input and output are open rings.
fn remove_collinear(ring: Vec<Vertex>) -> Vec<Vertex> {
    let n = ring.len();
    if n < 3 {
        return ring;
    }
    (0..n)
        .filter(|&i| {
            let prev = ring[(i + n - 1) % n];
            let here = ring[i];
            let next = ring[(i + 1) % n];
            let d_in = (here.0 - prev.0, here.1 - prev.1);
            let d_out = (next.0 - here.0, next.1 - here.1);
            d_in.0 * d_out.1 - d_in.1 * d_out.0 != 0
        })
        .map(|i| ring[i])
        .collect()
}

/// Shoelace sum of an open ring; positive for counter-clockwise rings.
fn twice_area(ring: &[Vertex]) -> i64 {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let (x1, y1) = ring[i];
            let (x2, y2) = ring[(i + 1) % n];
            x1 * y2 - x2 * y1
        })
        .sum()
}

/// Centre of the valid cell to the left of the hole's first edge.
fn interior_point(hole: &[Vertex]) -> Coord<f64> {
    let (x1, y1) = hole[0];
    let (x2, y2) = hole[1 % hole.len()];
    let (dx, dy) = ((x2 - x1).signum() as f64, (y2 - y1).signum() as f64);
    Coord {
        x: x1 as f64 + dx * 0.5 - dy * 0.5,
        y: y1 as f64 + dy * 0.5 + dx * 0.5,
    }
}

fn to_line_string(ring: &[Vertex]) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = ring
        .iter()
        .map(|&(x, y)| Coord {
            x: x as f64,
            y: y as f64,
        })
        .collect();
    if let Some(&first) = coords.first() {
        coords.push(first);
    }
    LineString::from(coords)
}
