use crate::result::{Error, Malformation, Result};
use crate::shape_type::ShapeType;
use crate::types::*;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::io::Write;

/// Binary encoding of a single shape record's content, following the ESRI
/// Shapefile Technical Description (July 1998).
///
/// The content is everything after the 4-byte shape type tag. All numbers are
/// little endian and every field sits at an offset derived from the widths and
/// counts before it.
pub trait ShapeCodec: Sized {
    const SHAPE_TYPE: ShapeType;

    /// Number of bytes [`ShapeCodec::encode`] is expected to produce.
    fn content_length(&self) -> usize;

    /// Parse a value from content bytes.
    ///
    /// Fails with a malformed record error if the buffer is too short for the
    /// counts it declares, a count is negative or part offsets are out of order.
    fn decode(content: &[u8]) -> Result<Self>;

    /// Write the content bytes.
    ///
    /// Part offsets and counts are checked before anything is written, so a
    /// value the decoder would reject is never produced.
    fn encode(&self, w: &mut impl Write) -> Result<()>;

    /// Encode into a fresh buffer, checking the result against [`ShapeCodec::content_length`].
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let declared = self.content_length();
        let mut buf = Vec::with_capacity(declared);
        self.encode(&mut buf)?;
        check_length(Self::SHAPE_TYPE, declared, buf.len())?;
        Ok(buf)
    }
}

fn check_length(shape_type: ShapeType, declared: usize, actual: usize) -> Result<()> {
    if declared != actual {
        return Err(Error::LengthMismatch {
            record: 0,
            shape_type: shape_type.to_i32(),
            declared,
            actual,
        });
    }
    Ok(())
}

const BBOX_LEN: usize = 32;

fn ordinates_len(num_points: usize) -> usize {
    16 + 8 * num_points
}

fn multi_point_len(num_points: usize) -> usize {
    BBOX_LEN + 4 + 16 * num_points
}

fn multi_part_len(num_parts: usize, num_points: usize) -> usize {
    BBOX_LEN + 8 + 4 * num_parts + 16 * num_points
}

/// Part offsets must each index a point and be strictly increasing, so
/// every part holds at least one point.
fn check_parts(parts: &[i32], num_points: usize) -> std::result::Result<(), Malformation> {
    for (index, value) in parts.iter().enumerate() {
        let in_range = usize::try_from(*value).map_or(false, |v| v < num_points);
        if !in_range {
            return Err(Malformation::PartOutOfRange {
                index,
                value: *value,
                num_points,
            });
        }
        if index > 0 && *value <= parts[index - 1] {
            return Err(Malformation::NonMonotonicParts { index });
        }
    }
    Ok(())
}

/// A single running cursor over record content.
///
/// Every read is bounds checked against the slice before it happens, and
/// each field's offset is the cursor position left behind by the previous one.
pub(crate) struct ContentReader<'a> {
    buf: &'a [u8],
    pos: usize,
    shape_type: ShapeType,
}

impl<'a> ContentReader<'a> {
    pub(crate) fn new(buf: &'a [u8], shape_type: ShapeType) -> Self {
        ContentReader {
            buf,
            pos: 0,
            shape_type,
        }
    }

    fn malformed(&self, reason: Malformation) -> Error {
        Error::malformed(self.shape_type.to_i32(), reason)
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(self.malformed(Malformation::Truncated {
                offset: self.pos,
                needed: len,
                available: self.remaining(),
            }));
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    // `count` fixed-width items in one go, so a huge declared count fails
    // before anything is allocated for it
    fn block(&mut self, count: usize, width: usize) -> Result<&'a [u8]> {
        match count.checked_mul(width) {
            Some(len) => self.take(len),
            None => Err(self.malformed(Malformation::Truncated {
                offset: self.pos,
                needed: usize::MAX,
                available: self.remaining(),
            })),
        }
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    fn f64(&mut self) -> Result<f64> {
        Ok(LittleEndian::read_f64(self.take(8)?))
    }

    fn count(&mut self, field: &'static str) -> Result<usize> {
        let value = self.i32()?;
        usize::try_from(value)
            .map_err(|_| self.malformed(Malformation::NegativeCount { field, value }))
    }

    fn bbox(&mut self) -> Result<BoundingBox> {
        let x_min = self.f64()?;
        let y_min = self.f64()?;
        let x_max = self.f64()?;
        let y_max = self.f64()?;
        Ok(BoundingBox::new(x_min, y_min, x_max, y_max))
    }

    fn i32s(&mut self, count: usize) -> Result<Vec<i32>> {
        let bytes = self.block(count, 4)?;
        Ok(bytes.chunks_exact(4).map(LittleEndian::read_i32).collect())
    }

    fn f64s(&mut self, count: usize) -> Result<Vec<f64>> {
        let bytes = self.block(count, 8)?;
        Ok(bytes.chunks_exact(8).map(LittleEndian::read_f64).collect())
    }

    fn points(&mut self, count: usize) -> Result<Vec<Point>> {
        let bytes = self.block(count, 16)?;
        Ok(bytes
            .chunks_exact(16)
            .map(|c| Point::new(LittleEndian::read_f64(&c[..8]), LittleEndian::read_f64(&c[8..])))
            .collect())
    }

    fn ordinates(&mut self, count: usize) -> Result<Ordinates> {
        let min = self.f64()?;
        let max = self.f64()?;
        let values = self.f64s(count)?;
        Ok(Ordinates {
            range: Range::new(min, max),
            values,
        })
    }

    // the M block of Z types may be left off entirely
    fn optional_ordinates(&mut self, count: usize) -> Result<Option<Ordinates>> {
        if self.remaining() == 0 {
            return Ok(None);
        }
        self.ordinates(count).map(Some)
    }

    fn parts(&mut self, num_parts: usize, num_points: usize) -> Result<Vec<i32>> {
        let parts = self.i32s(num_parts)?;
        check_parts(&parts, num_points).map_err(|reason| self.malformed(reason))?;
        Ok(parts)
    }

    fn part_types(&mut self, num_parts: usize) -> Result<Vec<PartType>> {
        let raw = self.i32s(num_parts)?;
        raw.into_iter()
            .enumerate()
            .map(|(part, value)| {
                PartType::from_i32(value).ok_or(Error::InvalidPartType {
                    record: 0,
                    shape_type: self.shape_type.to_i32(),
                    part,
                    value,
                })
            })
            .collect()
    }

    fn finish(self) {
        if self.remaining() > 0 {
            log::debug!(
                "ignoring {} trailing bytes after {} content",
                self.remaining(),
                self.shape_type
            );
        }
    }
}

fn write_bbox(w: &mut impl Write, bbox: &BoundingBox) -> Result<()> {
    w.write_f64::<LittleEndian>(bbox.x_min)?;
    w.write_f64::<LittleEndian>(bbox.y_min)?;
    w.write_f64::<LittleEndian>(bbox.x_max)?;
    w.write_f64::<LittleEndian>(bbox.y_max)?;
    Ok(())
}

fn write_points(w: &mut impl Write, points: &[Point]) -> Result<()> {
    for p in points {
        w.write_f64::<LittleEndian>(p.x)?;
        w.write_f64::<LittleEndian>(p.y)?;
    }
    Ok(())
}

fn write_ordinates(w: &mut impl Write, ordinates: &Ordinates) -> Result<()> {
    w.write_f64::<LittleEndian>(ordinates.range.min)?;
    w.write_f64::<LittleEndian>(ordinates.range.max)?;
    for v in &ordinates.values {
        w.write_f64::<LittleEndian>(*v)?;
    }
    Ok(())
}

fn checked_count(shape_type: ShapeType, field: &'static str, count: usize) -> Result<i32> {
    i32::try_from(count).map_err(|_| Error::CountOverflow {
        record: 0,
        shape_type: shape_type.to_i32(),
        field,
        count,
    })
}

fn check_multi_part(shape_type: ShapeType, parts: &[i32], num_points: usize) -> Result<()> {
    checked_count(shape_type, "part", parts.len())?;
    checked_count(shape_type, "point", num_points)?;
    check_parts(parts, num_points).map_err(|reason| Error::malformed(shape_type.to_i32(), reason))
}

fn write_multi_point(
    w: &mut impl Write,
    shape_type: ShapeType,
    bbox: &BoundingBox,
    points: &[Point],
) -> Result<()> {
    let num_points = checked_count(shape_type, "point", points.len())?;
    write_bbox(w, bbox)?;
    w.write_i32::<LittleEndian>(num_points)?;
    write_points(w, points)
}

// offsets and counts are validated by the caller
fn write_parts(
    w: &mut impl Write,
    bbox: &BoundingBox,
    parts: &[i32],
    num_points: usize,
) -> Result<()> {
    write_bbox(w, bbox)?;
    w.write_i32::<LittleEndian>(parts.len() as i32)?;
    w.write_i32::<LittleEndian>(num_points as i32)?;
    for part in parts {
        w.write_i32::<LittleEndian>(*part)?;
    }
    Ok(())
}

fn write_multi_part(
    w: &mut impl Write,
    shape_type: ShapeType,
    bbox: &BoundingBox,
    parts: &[i32],
    points: &[Point],
) -> Result<()> {
    check_multi_part(shape_type, parts, points.len())?;
    write_parts(w, bbox, parts, points.len())?;
    write_points(w, points)
}

impl ShapeCodec for Point {
    const SHAPE_TYPE: ShapeType = ShapeType::Point;

    fn content_length(&self) -> usize {
        16
    }

    fn decode(content: &[u8]) -> Result<Self> {
        let mut r = ContentReader::new(content, Self::SHAPE_TYPE);
        let x = r.f64()?;
        let y = r.f64()?;
        r.finish();
        Ok(Point { x, y })
    }

    fn encode(&self, w: &mut impl Write) -> Result<()> {
        w.write_f64::<LittleEndian>(self.x)?;
        w.write_f64::<LittleEndian>(self.y)?;
        Ok(())
    }
}

impl ShapeCodec for PointM {
    const SHAPE_TYPE: ShapeType = ShapeType::PointM;

    fn content_length(&self) -> usize {
        24
    }

    fn decode(content: &[u8]) -> Result<Self> {
        let mut r = ContentReader::new(content, Self::SHAPE_TYPE);
        let x = r.f64()?;
        let y = r.f64()?;
        let m = r.f64()?;
        r.finish();
        Ok(PointM { x, y, m })
    }

    fn encode(&self, w: &mut impl Write) -> Result<()> {
        w.write_f64::<LittleEndian>(self.x)?;
        w.write_f64::<LittleEndian>(self.y)?;
        w.write_f64::<LittleEndian>(self.m)?;
        Ok(())
    }
}

impl ShapeCodec for PointZ {
    const SHAPE_TYPE: ShapeType = ShapeType::PointZ;

    fn content_length(&self) -> usize {
        32
    }

    // some older producers stop after z
    fn decode(content: &[u8]) -> Result<Self> {
        let mut r = ContentReader::new(content, Self::SHAPE_TYPE);
        let x = r.f64()?;
        let y = r.f64()?;
        let z = r.f64()?;
        let m = if r.remaining() == 0 { 0.0 } else { r.f64()? };
        r.finish();
        Ok(PointZ { x, y, z, m })
    }

    fn encode(&self, w: &mut impl Write) -> Result<()> {
        w.write_f64::<LittleEndian>(self.x)?;
        w.write_f64::<LittleEndian>(self.y)?;
        w.write_f64::<LittleEndian>(self.z)?;
        w.write_f64::<LittleEndian>(self.m)?;
        Ok(())
    }
}

// multipoints: bbox, point count, points, then the Z and M blocks for the
// variants that carry them
macro_rules! multi_point_codec {
    ($t:ident) => {
        impl ShapeCodec for $t {
            const SHAPE_TYPE: ShapeType = ShapeType::$t;

            fn content_length(&self) -> usize {
                multi_point_len(self.points.len())
            }

            fn decode(content: &[u8]) -> Result<Self> {
                let mut r = ContentReader::new(content, Self::SHAPE_TYPE);
                let bbox = r.bbox()?;
                let num_points = r.count("point")?;
                let points = r.points(num_points)?;
                r.finish();
                Ok($t { bbox, points })
            }

            fn encode(&self, w: &mut impl Write) -> Result<()> {
                write_multi_point(w, Self::SHAPE_TYPE, &self.bbox, &self.points)
            }
        }
    };
    ($t:ident, m) => {
        impl ShapeCodec for $t {
            const SHAPE_TYPE: ShapeType = ShapeType::$t;

            fn content_length(&self) -> usize {
                let n = self.points.len();
                multi_point_len(n) + ordinates_len(n)
            }

            fn decode(content: &[u8]) -> Result<Self> {
                let mut r = ContentReader::new(content, Self::SHAPE_TYPE);
                let bbox = r.bbox()?;
                let num_points = r.count("point")?;
                let points = r.points(num_points)?;
                let m = r.ordinates(num_points)?;
                r.finish();
                Ok($t { bbox, points, m })
            }

            fn encode(&self, w: &mut impl Write) -> Result<()> {
                write_multi_point(w, Self::SHAPE_TYPE, &self.bbox, &self.points)?;
                write_ordinates(w, &self.m)
            }
        }
    };
    ($t:ident, z) => {
        impl ShapeCodec for $t {
            const SHAPE_TYPE: ShapeType = ShapeType::$t;

            fn content_length(&self) -> usize {
                let n = self.points.len();
                let m_len = if self.m.is_some() { ordinates_len(n) } else { 0 };
                multi_point_len(n) + ordinates_len(n) + m_len
            }

            fn decode(content: &[u8]) -> Result<Self> {
                let mut r = ContentReader::new(content, Self::SHAPE_TYPE);
                let bbox = r.bbox()?;
                let num_points = r.count("point")?;
                let points = r.points(num_points)?;
                let z = r.ordinates(num_points)?;
                let m = r.optional_ordinates(num_points)?;
                r.finish();
                Ok($t { bbox, points, z, m })
            }

            fn encode(&self, w: &mut impl Write) -> Result<()> {
                write_multi_point(w, Self::SHAPE_TYPE, &self.bbox, &self.points)?;
                write_ordinates(w, &self.z)?;
                if let Some(m) = &self.m {
                    write_ordinates(w, m)?;
                }
                Ok(())
            }
        }
    };
}

multi_point_codec!(MultiPoint);
multi_point_codec!(MultiPointM, m);
multi_point_codec!(MultiPointZ, z);

// polylines and polygons share one layout: bbox, part and point counts,
// part offsets, points, then the Z and M blocks where the type has them
macro_rules! multi_part_codec {
    ($t:ident) => {
        impl ShapeCodec for $t {
            const SHAPE_TYPE: ShapeType = ShapeType::$t;

            fn content_length(&self) -> usize {
                multi_part_len(self.parts.len(), self.points.len())
            }

            fn decode(content: &[u8]) -> Result<Self> {
                let mut r = ContentReader::new(content, Self::SHAPE_TYPE);
                let bbox = r.bbox()?;
                let num_parts = r.count("part")?;
                let num_points = r.count("point")?;
                let parts = r.parts(num_parts, num_points)?;
                let points = r.points(num_points)?;
                r.finish();
                Ok($t {
                    bbox,
                    parts,
                    points,
                })
            }

            fn encode(&self, w: &mut impl Write) -> Result<()> {
                write_multi_part(w, Self::SHAPE_TYPE, &self.bbox, &self.parts, &self.points)
            }
        }
    };
    ($t:ident, m) => {
        impl ShapeCodec for $t {
            const SHAPE_TYPE: ShapeType = ShapeType::$t;

            fn content_length(&self) -> usize {
                let n = self.points.len();
                multi_part_len(self.parts.len(), n) + ordinates_len(n)
            }

            fn decode(content: &[u8]) -> Result<Self> {
                let mut r = ContentReader::new(content, Self::SHAPE_TYPE);
                let bbox = r.bbox()?;
                let num_parts = r.count("part")?;
                let num_points = r.count("point")?;
                let parts = r.parts(num_parts, num_points)?;
                let points = r.points(num_points)?;
                let m = r.ordinates(num_points)?;
                r.finish();
                Ok($t {
                    bbox,
                    parts,
                    points,
                    m,
                })
            }

            fn encode(&self, w: &mut impl Write) -> Result<()> {
                write_multi_part(w, Self::SHAPE_TYPE, &self.bbox, &self.parts, &self.points)?;
                write_ordinates(w, &self.m)
            }
        }
    };
    ($t:ident, z) => {
        impl ShapeCodec for $t {
            const SHAPE_TYPE: ShapeType = ShapeType::$t;

            fn content_length(&self) -> usize {
                let n = self.points.len();
                let m_len = if self.m.is_some() { ordinates_len(n) } else { 0 };
                multi_part_len(self.parts.len(), n) + ordinates_len(n) + m_len
            }

            fn decode(content: &[u8]) -> Result<Self> {
                let mut r = ContentReader::new(content, Self::SHAPE_TYPE);
                let bbox = r.bbox()?;
                let num_parts = r.count("part")?;
                let num_points = r.count("point")?;
                let parts = r.parts(num_parts, num_points)?;
                let points = r.points(num_points)?;
                let z = r.ordinates(num_points)?;
                let m = r.optional_ordinates(num_points)?;
                r.finish();
                Ok($t {
                    bbox,
                    parts,
                    points,
                    z,
                    m,
                })
            }

            fn encode(&self, w: &mut impl Write) -> Result<()> {
                write_multi_part(w, Self::SHAPE_TYPE, &self.bbox, &self.parts, &self.points)?;
                write_ordinates(w, &self.z)?;
                if let Some(m) = &self.m {
                    write_ordinates(w, m)?;
                }
                Ok(())
            }
        }
    };
}

multi_part_codec!(PolyLine);
multi_part_codec!(Polygon);
multi_part_codec!(PolyLineM, m);
multi_part_codec!(PolygonM, m);
multi_part_codec!(PolyLineZ, z);
multi_part_codec!(PolygonZ, z);

impl ShapeCodec for MultiPatch {
    const SHAPE_TYPE: ShapeType = ShapeType::MultiPatch;

    fn content_length(&self) -> usize {
        let num_parts = self.parts.len();
        let n = self.points.len();
        let m_len = if self.m.is_some() { ordinates_len(n) } else { 0 };
        // part offsets and part types are both one int per part
        multi_part_len(num_parts, n) + 4 * num_parts + ordinates_len(n) + m_len
    }

    fn decode(content: &[u8]) -> Result<Self> {
        let mut r = ContentReader::new(content, Self::SHAPE_TYPE);
        let bbox = r.bbox()?;
        let num_parts = r.count("part")?;
        let num_points = r.count("point")?;
        let parts = r.parts(num_parts, num_points)?;
        let part_types = r.part_types(num_parts)?;
        let points = r.points(num_points)?;
        let z = r.ordinates(num_points)?;
        let m = r.optional_ordinates(num_points)?;
        r.finish();
        Ok(MultiPatch {
            bbox,
            parts,
            part_types,
            points,
            z,
            m,
        })
    }

    fn encode(&self, w: &mut impl Write) -> Result<()> {
        if self.part_types.len() != self.parts.len() {
            return Err(Error::malformed(
                Self::SHAPE_TYPE.to_i32(),
                Malformation::PartTypeCount {
                    parts: self.parts.len(),
                    part_types: self.part_types.len(),
                },
            ));
        }
        check_multi_part(Self::SHAPE_TYPE, &self.parts, self.points.len())?;
        write_parts(w, &self.bbox, &self.parts, self.points.len())?;
        // part types sit between the offsets and the points
        for part_type in &self.part_types {
            w.write_i32::<LittleEndian>(part_type.to_i32())?;
        }
        write_points(w, &self.points)?;
        write_ordinates(w, &self.z)?;
        if let Some(m) = &self.m {
            write_ordinates(w, m)?;
        }
        Ok(())
    }
}

// dispatch a method call to whichever codec handles the shape's variant
macro_rules! for_each_shape {
    ($shape:expr, $g:ident => $body:expr, null => $null:expr) => {
        match $shape {
            Shape::Null => $null,
            Shape::Point($g) => $body,
            Shape::PolyLine($g) => $body,
            Shape::Polygon($g) => $body,
            Shape::MultiPoint($g) => $body,
            Shape::PointZ($g) => $body,
            Shape::PolyLineZ($g) => $body,
            Shape::PolygonZ($g) => $body,
            Shape::MultiPointZ($g) => $body,
            Shape::PointM($g) => $body,
            Shape::PolyLineM($g) => $body,
            Shape::PolygonM($g) => $body,
            Shape::MultiPointM($g) => $body,
            Shape::MultiPatch($g) => $body,
        }
    };
}

impl Shape {
    /// Decode record content (without its tag) using the codec for `shape_type`.
    pub fn decode(shape_type: ShapeType, content: &[u8]) -> Result<Shape> {
        let shape = match shape_type {
            ShapeType::Null => Shape::Null,
            ShapeType::Point => Shape::Point(Point::decode(content)?),
            ShapeType::PolyLine => Shape::PolyLine(PolyLine::decode(content)?),
            ShapeType::Polygon => Shape::Polygon(Polygon::decode(content)?),
            ShapeType::MultiPoint => Shape::MultiPoint(MultiPoint::decode(content)?),
            ShapeType::PointZ => Shape::PointZ(PointZ::decode(content)?),
            ShapeType::PolyLineZ => Shape::PolyLineZ(PolyLineZ::decode(content)?),
            ShapeType::PolygonZ => Shape::PolygonZ(PolygonZ::decode(content)?),
            ShapeType::MultiPointZ => Shape::MultiPointZ(MultiPointZ::decode(content)?),
            ShapeType::PointM => Shape::PointM(PointM::decode(content)?),
            ShapeType::PolyLineM => Shape::PolyLineM(PolyLineM::decode(content)?),
            ShapeType::PolygonM => Shape::PolygonM(PolygonM::decode(content)?),
            ShapeType::MultiPointM => Shape::MultiPointM(MultiPointM::decode(content)?),
            ShapeType::MultiPatch => Shape::MultiPatch(MultiPatch::decode(content)?),
        };
        Ok(shape)
    }

    /// Length of the content after the shape type tag. Zero for null shapes.
    pub fn content_length(&self) -> usize {
        for_each_shape!(self, g => g.content_length(), null => 0)
    }

    pub fn encode(&self, w: &mut impl Write) -> Result<()> {
        for_each_shape!(self, g => g.encode(w), null => Ok(()))
    }

    /// Encode the content, failing with a length mismatch if it disagrees with
    /// [`Shape::content_length`].
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let declared = self.content_length();
        let mut buf = Vec::with_capacity(declared);
        self.encode(&mut buf)?;
        check_length(self.shape_type(), declared, buf.len())?;
        Ok(buf)
    }
}
