//! Geometry derivation for chains and groups.

use geo::Contains;
use geo_types::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPolygon, Point,
    Polygon,
};


/// A group member whose geometry could be resolved.
#[derive(Debug, Clone)]
pub struct ResolvedMember {
    pub role: String,
    pub geometry: Geometry<f64>,
}

/// Derive a chain's geometry from its resolved coordinates.
///
/// A chain is an area when it has more than three points and is closed; a
/// single point degrades to a point; everything else is a path.
pub fn chain_geometry(coords: &[Coord<f64>]) -> Option<Geometry<f64>> {
    match coords {
        [] => None,
        [only] => Some(Geometry::Point(Point(*only))),
        [first, .., last] if coords.len() > 3 && first == last => Some(Geometry::Polygon(
            Polygon::new(LineString::from(coords.to_vec()), Vec::new()),
        )),
        _ => Some(Geometry::LineString(LineString::from(coords.to_vec()))),
    }
}

/// Aggregate resolved member geometries according to the group's `type` tag.
/// Returns `None` when no member geometry is available.
pub fn group_geometry(kind: Option<&str>, members: &[ResolvedMember]) -> Option<Geometry<f64>> {
    let typed = match kind.map(str::to_ascii_lowercase).as_deref() {
        Some("route") | Some("multilinestring") => multi_line(members),
        Some("multipolygon") | Some("boundary") => areas(members),
        _ => None,
    };
    typed.or_else(|| collection(members))
}

fn multi_line(members: &[ResolvedMember]) -> Option<Geometry<f64>> {
    let mut lines = Vec::new();
    for member in members {
        match &member.geometry {
            Geometry::LineString(line) => lines.push(line.clone()),
            Geometry::Polygon(polygon) => lines.push(polygon.exterior().clone()),
            Geometry::MultiLineString(multi) => lines.extend(multi.0.iter().cloned()),
            _ => {}
        }
    }
    if lines.is_empty() {
        None
    } else {
        Some(Geometry::MultiLineString(MultiLineString::new(lines)))
    }
}

fn areas(members: &[ResolvedMember]) -> Option<Geometry<f64>> {
    let mut outer_rings = Vec::new();
    let mut inner_rings = Vec::new();
    let mut outer_parts = Vec::new();
    let mut inner_parts = Vec::new();

    for member in members {
        let inner = member.role.eq_ignore_ascii_case("inner");
        let (rings, parts) = if inner {
            (&mut inner_rings, &mut inner_parts)
        } else {
            (&mut outer_rings, &mut outer_parts)
        };
        match &member.geometry {
            Geometry::Polygon(polygon) => rings.push(polygon.exterior().clone()),
            Geometry::LineString(line) if is_ring(line) => rings.push(line.clone()),
            Geometry::LineString(line) => parts.push(line.clone()),
            _ => {}
        }
    }

    outer_rings.extend(merge_lines(outer_parts).into_iter().filter(is_ring));
    inner_rings.extend(merge_lines(inner_parts).into_iter().filter(is_ring));

    match outer_rings.len() {
        0 => None,
        1 => {
            let outer = outer_rings.remove(0);
            Some(Geometry::Polygon(Polygon::new(outer, inner_rings)))
        }
        _ => {
            let mut holes: Vec<Vec<LineString<f64>>> = vec![Vec::new(); outer_rings.len()];
            let shells: Vec<Polygon<f64>> = outer_rings
                .iter()
                .map(|ring| Polygon::new(ring.clone(), Vec::new()))
                .collect();
            for ring in inner_rings {
                let hole = Polygon::new(ring.clone(), Vec::new());
                if let Some(index) = shells.iter().position(|shell| shell.contains(&hole)) {
                    holes[index].push(ring);
                }
            }
            let polygons = outer_rings
                .into_iter()
                .zip(holes)
                .map(|(outer, inners)| Polygon::new(outer, inners))
                .collect();
            Some(Geometry::MultiPolygon(MultiPolygon::new(polygons)))
        }
    }
}

fn collection(members: &[ResolvedMember]) -> Option<Geometry<f64>> {
    match members {
        [] => None,
        [only] => Some(only.geometry.clone()),
        _ => Some(Geometry::GeometryCollection(GeometryCollection::new_from(
            members.iter().map(|m| m.geometry.clone()).collect(),
        ))),
    }
}

fn is_ring(line: &LineString<f64>) -> bool {
    line.0.len() >= 4 && line.is_closed()
}

/// Join line parts that share endpoints into longer lines. Parts are
/// reversed where needed; parts that touch nothing are returned unchanged.
pub fn merge_lines(parts: Vec<LineString<f64>>) -> Vec<LineString<f64>> {
    let mut pending: Vec<Vec<Coord<f64>>> = parts
        .into_iter()
        .map(|line| line.0)
        .filter(|coords| coords.len() >= 2)
        .collect();
    let mut merged = Vec::new();

    while let Some(mut current) = pending.pop() {
        loop {
            if current.first() == current.last() {
                break;
            }
            let Some((index, joined)) = find_joinable(&current, &pending) else {
                break;
            };
            let part = pending.swap_remove(index);
            current = joined(current, part);
        }
        merged.push(LineString::from(current));
    }

    merged
}

type Join = fn(Vec<Coord<f64>>, Vec<Coord<f64>>) -> Vec<Coord<f64>>;

fn find_joinable(current: &[Coord<f64>], pending: &[Vec<Coord<f64>>]) -> Option<(usize, Join)> {
    let (start, end) = (current.first()?, current.last()?);
    pending.iter().enumerate().find_map(|(index, part)| {
        let (part_start, part_end) = (part.first()?, part.last()?);
        let join: Join = if end == part_start {
            append
        } else if end == part_end {
            append_reversed
        } else if start == part_end {
            prepend
        } else if start == part_start {
            prepend_reversed
        } else {
            return None;
        };
        Some((index, join))
    })
}

fn append(mut current: Vec<Coord<f64>>, part: Vec<Coord<f64>>) -> Vec<Coord<f64>> {
    current.extend(part.into_iter().skip(1));
    current
}

fn append_reversed(current: Vec<Coord<f64>>, mut part: Vec<Coord<f64>>) -> Vec<Coord<f64>> {
    part.reverse();
    append(current, part)
}

fn prepend(current: Vec<Coord<f64>>, part: Vec<Coord<f64>>) -> Vec<Coord<f64>> {
    append(part, current)
}

fn prepend_reversed(current: Vec<Coord<f64>>, mut part: Vec<Coord<f64>>) -> Vec<Coord<f64>> {
    part.reverse();
    append(part, current)
}
