//! Conversions between shapes and [`geo_types`] geometries, and WKB export through the `wkb` crate.
//!
//! Only the planar X/Y coordinates cross this boundary. Z and M are dropped.
use crate::result::{Error, Result};
use crate::types::*;
use byteorder::{ByteOrder, LittleEndian};
use geo_types::{coord, Coord, Geometry, LineString, MultiLineString, MultiPolygon};
use std::io::Cursor;

fn coords(points: &[Point]) -> Vec<Coord<f64>> {
    points.iter().map(|p| coord! { x: p.x, y: p.y }).collect()
}

fn points(line: &LineString<f64>) -> Vec<Point> {
    line.coords().map(|c| Point::new(c.x, c.y)).collect()
}

/// Twice the signed area of a ring, negative when it winds clockwise.
fn signed_area(ring: &[Point]) -> f64 {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let (a, b) = (ring[i], ring[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum()
}

/// Whether a ring winds clockwise, which marks an outer ring in a polygon shape.
pub fn is_clockwise(ring: &[Point]) -> bool {
    signed_area(ring) < 0.0
}

/// Points of a ring, reversed if needed so that it winds the requested way.
fn oriented(line: &LineString<f64>, clockwise: bool) -> Vec<Point> {
    let mut ring = points(line);
    if ring.len() > 2 && is_clockwise(&ring) != clockwise {
        ring.reverse();
    }
    ring
}

fn part_slices<'a>(parts: &[i32], points: &'a [Point]) -> Vec<&'a [Point]> {
    part_ranges(parts, points.len())
        .into_iter()
        .map(|r| &points[r])
        .collect()
}

/// Group polygon rings into polygons.
///
/// A clockwise ring opens a new polygon and a counter-clockwise ring becomes
/// a hole of the closest preceding one. A hole with nothing before it is
/// kept as an outer ring.
fn rings_to_polygons(rings: &[&[Point]]) -> MultiPolygon<f64> {
    let mut polygons: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();
    for ring in rings {
        let line = LineString::from(coords(ring));
        match polygons.last_mut() {
            Some((_, holes)) if !is_clockwise(ring) => holes.push(line),
            _ => polygons.push((line, Vec::new())),
        }
    }
    polygons
        .into_iter()
        .map(|(exterior, holes)| geo_types::Polygon::new(exterior, holes))
        .collect()
}

fn triangle(a: Point, b: Point, c: Point) -> geo_types::Polygon<f64> {
    geo_types::Polygon::new(LineString::from(coords(&[a, b, c, a])), Vec::new())
}

fn patches_to_polygons(patch: &MultiPatch) -> MultiPolygon<f64> {
    let mut polygons: Vec<geo_types::Polygon<f64>> = Vec::new();
    // the polygon that following inner rings attach to
    let mut open: Option<usize> = None;
    let mut ring_sequence = false;

    for (part_type, pts) in patch.patches() {
        match part_type {
            PartType::TriangleStrip => {
                for w in pts.windows(3) {
                    polygons.push(triangle(w[0], w[1], w[2]));
                }
                open = None;
                ring_sequence = false;
            }
            PartType::TriangleFan => {
                if let Some((first, rest)) = pts.split_first() {
                    for w in rest.windows(2) {
                        polygons.push(triangle(*first, w[0], w[1]));
                    }
                }
                open = None;
                ring_sequence = false;
            }
            PartType::OuterRing | PartType::FirstRing => {
                polygons.push(geo_types::Polygon::new(LineString::from(coords(pts)), Vec::new()));
                open = Some(polygons.len() - 1);
                ring_sequence = part_type == PartType::FirstRing;
            }
            PartType::InnerRing | PartType::Ring => {
                let attach = part_type == PartType::InnerRing || ring_sequence;
                match open.and_then(|i| polygons.get_mut(i)) {
                    Some(polygon) if attach => {
                        polygon.interiors_push(LineString::from(coords(pts)));
                    }
                    _ => {
                        polygons.push(geo_types::Polygon::new(
                            LineString::from(coords(pts)),
                            Vec::new(),
                        ));
                        open = Some(polygons.len() - 1);
                        ring_sequence = false;
                    }
                }
            }
        }
    }
    MultiPolygon(polygons)
}

impl Shape {
    /// Planar geometry of this shape, `None` for a null shape.
    ///
    /// Point types become points, multipoints become multipoints, polylines
    /// become multilinestrings with one linestring per part and polygons
    /// become multipolygons with rings grouped by winding. Multipatch
    /// triangles and rings become polygons.
    pub fn to_geo(&self) -> Result<Option<Geometry<f64>>> {
        let point = |p: &Point| Geometry::Point(geo_types::Point::new(p.x, p.y));
        let multi_point = |pts: &[Point]| {
            Geometry::MultiPoint(pts.iter().map(|p| geo_types::Point::new(p.x, p.y)).collect())
        };
        let lines = |parts: &[i32], pts: &[Point]| {
            Geometry::MultiLineString(MultiLineString(
                part_slices(parts, pts)
                    .into_iter()
                    .map(|part| LineString::from(coords(part)))
                    .collect(),
            ))
        };
        let polygons = |parts: &[i32], pts: &[Point]| {
            Geometry::MultiPolygon(rings_to_polygons(&part_slices(parts, pts)))
        };

        let geometry = match self {
            Shape::Null => return Ok(None),
            Shape::Point(p) => point(p),
            Shape::PointM(p) => point(&Point::from(*p)),
            Shape::PointZ(p) => point(&Point::from(*p)),
            Shape::MultiPoint(g) => multi_point(&g.points),
            Shape::MultiPointM(g) => multi_point(&g.points),
            Shape::MultiPointZ(g) => multi_point(&g.points),
            Shape::PolyLine(g) => lines(&g.parts, &g.points),
            Shape::PolyLineM(g) => lines(&g.parts, &g.points),
            Shape::PolyLineZ(g) => lines(&g.parts, &g.points),
            Shape::Polygon(g) => polygons(&g.parts, &g.points),
            Shape::PolygonM(g) => polygons(&g.parts, &g.points),
            Shape::PolygonZ(g) => polygons(&g.parts, &g.points),
            Shape::MultiPatch(g) => Geometry::MultiPolygon(patches_to_polygons(g)),
        };
        Ok(Some(geometry))
    }

    /// Build a two dimensional shape from a planar geometry.
    ///
    /// Lines and linestrings become polylines, rectangles, triangles and
    /// polygons become polygon shapes with outer rings clockwise and holes
    /// counter-clockwise.
    pub fn from_geo(geometry: &Geometry<f64>) -> Result<Shape> {
        let shape = match geometry {
            Geometry::Point(p) => Shape::Point(Point::new(p.x(), p.y())),
            Geometry::MultiPoint(mp) => Shape::MultiPoint(MultiPoint::from_geo(mp)),
            Geometry::Line(l) => Shape::PolyLine(PolyLine::new(vec![vec![
                Point::new(l.start.x, l.start.y),
                Point::new(l.end.x, l.end.y),
            ]])),
            Geometry::LineString(ls) => Shape::PolyLine(PolyLine::new(vec![points(ls)])),
            Geometry::MultiLineString(mls) => Shape::PolyLine(PolyLine::from_geo(mls)),
            Geometry::Polygon(p) => {
                Shape::Polygon(Polygon::from_geo(&MultiPolygon(vec![p.clone()])))
            }
            Geometry::MultiPolygon(mp) => Shape::Polygon(Polygon::from_geo(mp)),
            Geometry::Rect(r) => {
                Shape::Polygon(Polygon::from_geo(&MultiPolygon(vec![r.to_polygon()])))
            }
            Geometry::Triangle(t) => {
                Shape::Polygon(Polygon::from_geo(&MultiPolygon(vec![t.to_polygon()])))
            }
            Geometry::GeometryCollection(_) => {
                return Err(Error::UnsupportedGeometryType("GeometryCollection"))
            }
        };
        Ok(shape)
    }

    /// Well-known binary of the shape's planar geometry, `None` for a null shape.
    pub fn to_wkb(&self) -> Result<Option<Vec<u8>>> {
        match self.to_geo()? {
            Some(geometry) => {
                let bytes = wkb::geom_to_wkb(&geometry).map_err(|_| Error::GeomEncodeError)?;
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }

    /// Parse well-known binary into a two dimensional shape.
    ///
    /// Only little endian WKB of the seven planar geometry types is accepted.
    pub fn from_wkb(bytes: &[u8]) -> Result<Shape> {
        WkbScan { buf: bytes, pos: 0 }.geometry(0)?;
        let mut cursor = Cursor::new(bytes);
        let geometry = wkb::wkb_to_geom(&mut cursor).map_err(|_| Error::GeomDecodeError)?;
        Shape::from_geo(&geometry)
    }
}

// nested collections deeper than this are refused
const MAX_WKB_DEPTH: usize = 32;

// byte order plus type code
const WKB_HEADER_LEN: usize = 5;

/// Walks the WKB layout the `wkb` decoder expects without building anything.
///
/// That decoder panics on byte orders and type codes it does not know and
/// sizes its buffers from declared counts, so every count is checked against
/// the bytes that are actually left before it gets there.
struct WkbScan<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WkbScan<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(Error::GeomDecodeError)?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    // a count of items at least `width` bytes each, all of which must fit
    fn count(&mut self, width: usize) -> Result<usize> {
        let count = self.u32()? as usize;
        match count.checked_mul(width) {
            Some(len) if len <= self.buf.len() - self.pos => Ok(count),
            _ => Err(Error::GeomDecodeError),
        }
    }

    fn points(&mut self) -> Result<()> {
        let count = self.count(16)?;
        self.take(count * 16)?;
        Ok(())
    }

    fn geometry(&mut self, depth: usize) -> Result<()> {
        if depth > MAX_WKB_DEPTH {
            return Err(Error::GeomDecodeError);
        }
        // 1 is little endian, the only order the decoder reads
        if self.take(1)?[0] != 1 {
            return Err(Error::GeomDecodeError);
        }
        match self.u32()? {
            1 => {
                self.take(16)?;
            }
            // multipoints are a bare coordinate list, same as a linestring
            2 | 4 => self.points()?,
            3 => {
                let rings = self.count(4)?;
                if rings == 0 {
                    return Err(Error::GeomDecodeError);
                }
                for _ in 0..rings {
                    self.points()?;
                }
            }
            5..=7 => {
                let members = self.count(WKB_HEADER_LEN)?;
                for _ in 0..members {
                    self.geometry(depth + 1)?;
                }
            }
            _ => return Err(Error::GeomDecodeError),
        }
        Ok(())
    }
}

impl MultiPoint {
    pub fn from_geo(points: &geo_types::MultiPoint<f64>) -> Self {
        MultiPoint::new(points.0.iter().map(|p| Point::new(p.x(), p.y())).collect())
    }
}

impl PolyLine {
    pub fn from_geo(lines: &MultiLineString<f64>) -> Self {
        PolyLine::new(lines.0.iter().map(points).collect())
    }
}

impl Polygon {
    /// One ring per exterior and interior, exteriors wound clockwise and holes counter-clockwise.
    pub fn from_geo(polygons: &MultiPolygon<f64>) -> Self {
        let mut rings = Vec::new();
        for polygon in &polygons.0 {
            rings.push(oriented(polygon.exterior(), true));
            for hole in polygon.interiors() {
                rings.push(oriented(hole, false));
            }
        }
        Polygon::new(rings)
    }
}
