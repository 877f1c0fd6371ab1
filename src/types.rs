use crate::shape_type::ShapeType;
use std::ops;

/// Measures below this value are "no data" by convention of shapefile producers.
pub const NO_DATA_THRESHOLD: f64 = -1.0e38;

/// The value written for a missing measure.
pub const NO_DATA: f64 = -1.0e39;

/// Whether a measure is the "no data" sentinel.
///
/// The codec never applies this itself; measures are passed through bit-for-bit.
pub fn is_no_data(m: f64) -> bool {
    m < NO_DATA_THRESHOLD
}

/// An axis aligned box as stored in the payload of every multi-point or multi-part record.
///
/// The box is taken from the bytes as-is. Some producers write degenerate or
/// inverted boxes and decoding keeps them that way.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BoundingBox {
    pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        BoundingBox {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// The smallest box holding every point, or an all-zero box when there are none.
    pub fn from_points(points: &[Point]) -> Self {
        let mut iter = points.iter();
        let first = match iter.next() {
            Some(p) => p,
            None => return BoundingBox::default(),
        };
        let mut bbox = BoundingBox::new(first.x, first.y, first.x, first.y);
        for p in iter {
            bbox.x_min = bbox.x_min.min(p.x);
            bbox.y_min = bbox.y_min.min(p.y);
            bbox.x_max = bbox.x_max.max(p.x);
            bbox.y_max = bbox.y_max.max(p.y);
        }
        bbox
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x_min: self.x_min.min(other.x_min),
            y_min: self.y_min.min(other.y_min),
            x_max: self.x_max.max(other.x_max),
            y_max: self.y_max.max(other.y_max),
        }
    }

    /// `false` for inverted boxes, which the format does not forbid.
    pub fn is_valid(&self) -> bool {
        self.x_min <= self.x_max && self.y_min <= self.y_max
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }
}

/// A 2D vertex.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}

/// A 2D vertex with a measure.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointM {
    pub x: f64,
    pub y: f64,
    pub m: f64,
}

impl PointM {
    pub fn new(x: f64, y: f64, m: f64) -> Self {
        PointM { x, y, m }
    }
}

/// A 3D vertex with a measure. The measure is 0 when the producer had none.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointZ {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub m: f64,
}

impl PointZ {
    pub fn new(x: f64, y: f64, z: f64, m: f64) -> Self {
        PointZ { x, y, z, m }
    }

    pub fn without_m(x: f64, y: f64, z: f64) -> Self {
        PointZ { x, y, z, m: 0.0 }
    }
}

/// Minimum and maximum of a Z or M block.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Range { min, max }
    }

    /// Range over the values that are not "no data"; all-zero when none qualify.
    pub fn of(values: &[f64]) -> Self {
        let mut iter = values.iter().copied().filter(|v| !is_no_data(*v));
        let first = match iter.next() {
            Some(v) => v,
            None => return Range::default(),
        };
        iter.fold(Range::new(first, first), |r, v| {
            Range::new(r.min.min(v), r.max.max(v))
        })
    }

    pub fn union(&self, other: &Range) -> Range {
        Range::new(self.min.min(other.min), self.max.max(other.max))
    }
}

/// A Z or M block: the stored range followed by one value per point.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ordinates {
    pub range: Range,
    pub values: Vec<f64>,
}

impl Ordinates {
    /// Build a block and compute its range from the values.
    pub fn new(values: Vec<f64>) -> Self {
        Ordinates {
            range: Range::of(&values),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The stored range, or `None` when no value is a real measure.
    pub fn measured_range(&self) -> Option<Range> {
        if self.values.iter().all(|v| is_no_data(*v)) {
            return None;
        }
        Some(self.range)
    }
}

/// How a multipatch part's points are to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartType {
    TriangleStrip,
    TriangleFan,
    OuterRing,
    InnerRing,
    FirstRing,
    Ring,
}

/// Wire value to part type. Position in this table is the on-disk integer.
pub const PART_TYPES: [PartType; 6] = [
    PartType::TriangleStrip,
    PartType::TriangleFan,
    PartType::OuterRing,
    PartType::InnerRing,
    PartType::FirstRing,
    PartType::Ring,
];

impl PartType {
    /// `None` for any value outside `0..=5`. Callers must treat that as bad input.
    pub fn from_i32(value: i32) -> Option<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|i| PART_TYPES.get(i).copied())
    }

    pub fn to_i32(self) -> i32 {
        match self {
            PartType::TriangleStrip => 0,
            PartType::TriangleFan => 1,
            PartType::OuterRing => 2,
            PartType::InnerRing => 3,
            PartType::FirstRing => 4,
            PartType::Ring => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiPoint {
    pub bbox: BoundingBox,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiPointM {
    pub bbox: BoundingBox,
    pub points: Vec<Point>,
    pub m: Ordinates,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiPointZ {
    pub bbox: BoundingBox,
    pub points: Vec<Point>,
    pub z: Ordinates,
    pub m: Option<Ordinates>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolyLine {
    pub bbox: BoundingBox,
    pub parts: Vec<i32>,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolyLineM {
    pub bbox: BoundingBox,
    pub parts: Vec<i32>,
    pub points: Vec<Point>,
    pub m: Ordinates,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolyLineZ {
    pub bbox: BoundingBox,
    pub parts: Vec<i32>,
    pub points: Vec<Point>,
    pub z: Ordinates,
    pub m: Option<Ordinates>,
}

/// Rings of a polygon share one point array; exterior rings run clockwise, holes counter-clockwise.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polygon {
    pub bbox: BoundingBox,
    pub parts: Vec<i32>,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolygonM {
    pub bbox: BoundingBox,
    pub parts: Vec<i32>,
    pub points: Vec<Point>,
    pub m: Ordinates,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolygonZ {
    pub bbox: BoundingBox,
    pub parts: Vec<i32>,
    pub points: Vec<Point>,
    pub z: Ordinates,
    pub m: Option<Ordinates>,
}

/// A composite 3D surface built from typed parts over one flattened point array.
///
/// `parts` and `part_types` run in parallel, and `z` (and `m`, when present)
/// hold one value per point.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiPatch {
    pub bbox: BoundingBox,
    pub parts: Vec<i32>,
    pub part_types: Vec<PartType>,
    pub points: Vec<Point>,
    pub z: Ordinates,
    pub m: Option<Ordinates>,
}

// flatten a list of parts into start offsets plus one point array; parts
// without points are dropped since an offset has to index a point
fn flatten<P: Copy>(parts: &[Vec<P>]) -> (Vec<i32>, Vec<P>) {
    let mut offsets = Vec::with_capacity(parts.len());
    let mut points = Vec::with_capacity(parts.iter().map(Vec::len).sum());
    for part in parts.iter().filter(|p| !p.is_empty()) {
        offsets.push(points.len() as i32);
        points.extend_from_slice(part);
    }
    (offsets, points)
}

fn xy<P: Into<Point> + Copy>(points: &[P]) -> Vec<Point> {
    points.iter().map(|p| (*p).into()).collect()
}

impl From<PointM> for Point {
    fn from(p: PointM) -> Self {
        Point::new(p.x, p.y)
    }
}

impl From<PointZ> for Point {
    fn from(p: PointZ) -> Self {
        Point::new(p.x, p.y)
    }
}

/// Index ranges into the point array, one per part.
///
/// Offsets are trusted to be valid here (decoding checks them); anything out
/// of order is clamped so that a hand-built value never panics.
pub fn part_ranges(parts: &[i32], num_points: usize) -> Vec<ops::Range<usize>> {
    let mut out = Vec::with_capacity(parts.len());
    for (i, start) in parts.iter().enumerate() {
        let start = usize::try_from(*start).unwrap_or(0).min(num_points);
        let end = match parts.get(i + 1) {
            Some(next) => usize::try_from(*next).unwrap_or(0).min(num_points),
            None => num_points,
        };
        out.push(start..end.max(start));
    }
    out
}

impl MultiPoint {
    pub fn new(points: Vec<Point>) -> Self {
        MultiPoint {
            bbox: BoundingBox::from_points(&points),
            points,
        }
    }
}

impl MultiPointM {
    pub fn new(points: Vec<PointM>) -> Self {
        let xy = xy(&points);
        MultiPointM {
            bbox: BoundingBox::from_points(&xy),
            points: xy,
            m: Ordinates::new(points.iter().map(|p| p.m).collect()),
        }
    }
}

impl MultiPointZ {
    pub fn new(points: Vec<PointZ>) -> Self {
        let xy = xy(&points);
        MultiPointZ {
            bbox: BoundingBox::from_points(&xy),
            points: xy,
            z: Ordinates::new(points.iter().map(|p| p.z).collect()),
            m: Some(Ordinates::new(points.iter().map(|p| p.m).collect())),
        }
    }

    /// Drop the M block so the record is written without measures.
    pub fn without_measures(mut self) -> Self {
        self.m = None;
        self
    }
}

// the 2D, M and Z variants of polylines and polygons only differ in name, so
// one macro builds all of their constructors and part accessors
macro_rules! multi_part_impl {
    ($t:ident) => {
        impl $t {
            /// Build from a list of parts, computing the box and part offsets.
            pub fn new(parts: Vec<Vec<Point>>) -> Self {
                let (offsets, points) = flatten(&parts);
                $t {
                    bbox: BoundingBox::from_points(&points),
                    parts: offsets,
                    points,
                }
            }
        }
    };
    ($t:ident, m) => {
        impl $t {
            /// Build from a list of measured parts, computing the box, part offsets and M range.
            pub fn new(parts: Vec<Vec<PointM>>) -> Self {
                let (offsets, points) = flatten(&parts);
                let xy = xy(&points);
                $t {
                    bbox: BoundingBox::from_points(&xy),
                    parts: offsets,
                    points: xy,
                    m: Ordinates::new(points.iter().map(|p| p.m).collect()),
                }
            }
        }
    };
    ($t:ident, z) => {
        impl $t {
            /// Build from a list of 3D parts, computing the box, part offsets and Z/M ranges.
            pub fn new(parts: Vec<Vec<PointZ>>) -> Self {
                let (offsets, points) = flatten(&parts);
                let xy = xy(&points);
                $t {
                    bbox: BoundingBox::from_points(&xy),
                    parts: offsets,
                    points: xy,
                    z: Ordinates::new(points.iter().map(|p| p.z).collect()),
                    m: Some(Ordinates::new(points.iter().map(|p| p.m).collect())),
                }
            }

            /// Drop the M block so the record is written without measures.
            pub fn without_measures(mut self) -> Self {
                self.m = None;
                self
            }
        }
    };
}

multi_part_impl!(PolyLine);
multi_part_impl!(Polygon);
multi_part_impl!(PolyLineM, m);
multi_part_impl!(PolygonM, m);
multi_part_impl!(PolyLineZ, z);
multi_part_impl!(PolygonZ, z);

impl MultiPatch {
    /// Build from typed patches, computing the box, part offsets and Z/M ranges.
    ///
    /// Patches without points are dropped along with their part type.
    pub fn new(patches: Vec<(PartType, Vec<PointZ>)>) -> Self {
        let (part_types, parts): (Vec<PartType>, Vec<Vec<PointZ>>) =
            patches.into_iter().filter(|(_, p)| !p.is_empty()).unzip();
        let (offsets, points) = flatten(&parts);
        let xy = xy(&points);
        MultiPatch {
            bbox: BoundingBox::from_points(&xy),
            parts: offsets,
            part_types,
            points: xy,
            z: Ordinates::new(points.iter().map(|p| p.z).collect()),
            m: Some(Ordinates::new(points.iter().map(|p| p.m).collect())),
        }
    }

    pub fn without_measures(mut self) -> Self {
        self.m = None;
        self
    }

    /// Each part's type alongside the slice of points it covers.
    pub fn patches(&self) -> impl Iterator<Item = (PartType, &[Point])> + '_ {
        part_ranges(&self.parts, self.points.len())
            .into_iter()
            .zip(self.part_types.iter())
            .map(move |(r, t)| (*t, &self.points[r]))
    }
}

/// A decoded geometry record of any type.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Null,
    Point(Point),
    PolyLine(PolyLine),
    Polygon(Polygon),
    MultiPoint(MultiPoint),
    PointZ(PointZ),
    PolyLineZ(PolyLineZ),
    PolygonZ(PolygonZ),
    MultiPointZ(MultiPointZ),
    PointM(PointM),
    PolyLineM(PolyLineM),
    PolygonM(PolygonM),
    MultiPointM(MultiPointM),
    MultiPatch(MultiPatch),
}

macro_rules! shape_from {
    ($($t:ident),*) => {
        $(
            impl From<$t> for Shape {
                fn from(g: $t) -> Self {
                    Shape::$t(g)
                }
            }
        )*
    };
}

shape_from! {
    Point, PolyLine, Polygon, MultiPoint, PointZ, PolyLineZ, PolygonZ,
    MultiPointZ, PointM, PolyLineM, PolygonM, MultiPointM, MultiPatch
}

impl Shape {
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Shape::Null => ShapeType::Null,
            Shape::Point(_) => ShapeType::Point,
            Shape::PolyLine(_) => ShapeType::PolyLine,
            Shape::Polygon(_) => ShapeType::Polygon,
            Shape::MultiPoint(_) => ShapeType::MultiPoint,
            Shape::PointZ(_) => ShapeType::PointZ,
            Shape::PolyLineZ(_) => ShapeType::PolyLineZ,
            Shape::PolygonZ(_) => ShapeType::PolygonZ,
            Shape::MultiPointZ(_) => ShapeType::MultiPointZ,
            Shape::PointM(_) => ShapeType::PointM,
            Shape::PolyLineM(_) => ShapeType::PolyLineM,
            Shape::PolygonM(_) => ShapeType::PolygonM,
            Shape::MultiPointM(_) => ShapeType::MultiPointM,
            Shape::MultiPatch(_) => ShapeType::MultiPatch,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Shape::Null)
    }

    /// The stored bounding box, or a zero-area box for single points. `None` for null shapes.
    pub fn bbox(&self) -> Option<BoundingBox> {
        let point_box = |x: f64, y: f64| BoundingBox::new(x, y, x, y);
        let bbox = match self {
            Shape::Null => return None,
            Shape::Point(p) => point_box(p.x, p.y),
            Shape::PointZ(p) => point_box(p.x, p.y),
            Shape::PointM(p) => point_box(p.x, p.y),
            Shape::PolyLine(g) => g.bbox,
            Shape::Polygon(g) => g.bbox,
            Shape::MultiPoint(g) => g.bbox,
            Shape::PolyLineZ(g) => g.bbox,
            Shape::PolygonZ(g) => g.bbox,
            Shape::MultiPointZ(g) => g.bbox,
            Shape::PolyLineM(g) => g.bbox,
            Shape::PolygonM(g) => g.bbox,
            Shape::MultiPointM(g) => g.bbox,
            Shape::MultiPatch(g) => g.bbox,
        };
        Some(bbox)
    }

    pub fn z_range(&self) -> Option<Range> {
        match self {
            Shape::PointZ(p) => Some(Range::new(p.z, p.z)),
            Shape::PolyLineZ(g) => Some(g.z.range),
            Shape::PolygonZ(g) => Some(g.z.range),
            Shape::MultiPointZ(g) => Some(g.z.range),
            Shape::MultiPatch(g) => Some(g.z.range),
            _ => None,
        }
    }

    /// The measure range, or `None` when the shape carries no real measure.
    pub fn m_range(&self) -> Option<Range> {
        let single = |m: f64| (!is_no_data(m)).then(|| Range::new(m, m));
        match self {
            Shape::PointZ(p) => single(p.m),
            Shape::PointM(p) => single(p.m),
            Shape::PolyLineM(g) => g.m.measured_range(),
            Shape::PolygonM(g) => g.m.measured_range(),
            Shape::MultiPointM(g) => g.m.measured_range(),
            Shape::PolyLineZ(g) => g.m.as_ref().and_then(Ordinates::measured_range),
            Shape::PolygonZ(g) => g.m.as_ref().and_then(Ordinates::measured_range),
            Shape::MultiPointZ(g) => g.m.as_ref().and_then(Ordinates::measured_range),
            Shape::MultiPatch(g) => g.m.as_ref().and_then(Ordinates::measured_range),
            _ => None,
        }
    }
}
