use crate::result::{Error, Malformation, Result};
use crate::shape_type::ShapeType;
use crate::types::Shape;
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Size of the header in front of every record in the main file.
pub const RECORD_HEADER_LEN: u64 = 8;
/// Size of one entry in the index file.
pub const INDEX_ENTRY_LEN: u64 = 8;

/// The big endian header in front of each record of the main file.
///
/// `content_length` counts 16-bit words and includes the 4-byte shape type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub number: i32,
    pub content_length: i32,
}

impl RecordHeader {
    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        Ok(RecordHeader {
            number: r.read_i32::<BigEndian>()?,
            content_length: r.read_i32::<BigEndian>()?,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_i32::<BigEndian>(self.number)?;
        w.write_i32::<BigEndian>(self.content_length)?;
        Ok(())
    }
}

/// One fixed-size entry of the index file, locating a record in the main file.
///
/// Both fields count 16-bit words. `offset` points at the record header and
/// `content_length` matches the record header's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub offset: i32,
    pub content_length: i32,
}

impl IndexEntry {
    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        Ok(IndexEntry {
            offset: r.read_i32::<BigEndian>()?,
            content_length: r.read_i32::<BigEndian>()?,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_i32::<BigEndian>(self.offset)?;
        w.write_i32::<BigEndian>(self.content_length)?;
        Ok(())
    }

    pub fn offset_bytes(&self) -> u64 {
        u64::try_from(self.offset).unwrap_or(0) * 2
    }

    pub fn content_bytes(&self) -> u64 {
        u64::try_from(self.content_length).unwrap_or(0) * 2
    }

    /// Position just past the end of the record this entry points at.
    pub fn end_bytes(&self) -> u64 {
        self.offset_bytes() + RECORD_HEADER_LEN + self.content_bytes()
    }
}

/// A decoded record together with its 1-based position in the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub number: u32,
    pub shape: Shape,
}

impl Record {
    pub fn shape_type(&self) -> ShapeType {
        self.shape.shape_type()
    }
}

/// Decode record content, that is the shape type tag followed by the payload.
///
/// Any error is stamped with `number`. A tag outside the known set yields a
/// malformed record carrying the raw tag; content too short to even hold the
/// tag is reported with shape type -1.
pub fn decode_record(number: u32, content: &[u8]) -> Result<Shape> {
    if content.len() < 4 {
        return Err(Error::malformed(
            -1,
            Malformation::Truncated {
                offset: 0,
                needed: 4,
                available: content.len(),
            },
        )
        .at_record(number));
    }
    let tag = LittleEndian::read_i32(&content[..4]);
    let shape_type = ShapeType::from_i32(tag)
        .ok_or_else(|| Error::malformed(tag, Malformation::UnknownShapeType).at_record(number))?;
    log::trace!("record {}: {} shape, {} bytes", number, shape_type, content.len());
    Shape::decode(shape_type, &content[4..]).map_err(|e| e.at_record(number))
}

/// Frame a shape as a complete main file record: header, tag and payload.
///
/// The payload is checked against its declared length before anything is
/// returned, so a caller never sees a half-valid record.
pub fn encode_record(number: u32, shape: &Shape) -> Result<Vec<u8>> {
    let payload = shape.to_bytes().map_err(|e| e.at_record(number))?;
    let content_len = 4 + payload.len();
    let too_large = || Error::TooLarge {
        record: number,
        shape_type: shape.shape_type().to_i32(),
        bytes: content_len as u64,
    };
    let content_length = i32::try_from(content_len / 2).map_err(|_| too_large())?;
    let number_field = i32::try_from(number).map_err(|_| too_large())?;

    let mut buf = Vec::with_capacity(RECORD_HEADER_LEN as usize + content_len);
    RecordHeader {
        number: number_field,
        content_length,
    }
    .write(&mut buf)?;
    buf.write_i32::<LittleEndian>(shape.shape_type().to_i32())?;
    buf.extend_from_slice(&payload);
    Ok(buf)
}
