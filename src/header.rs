use crate::result::{Error, Result};
use crate::shape_type::ShapeType;
use crate::types::{BoundingBox, Range};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Magic number at the start of every main and index file.
pub const FILE_CODE: i32 = 9994;
pub const VERSION: i32 = 1000;
/// Size of the file header in bytes, shared by the main and index files.
pub const HEADER_LEN: u64 = 100;

/// The 100-byte header that opens both the `.shp` and the `.shx` file.
///
/// The two files carry the same header apart from `file_length`, which is
/// the length of the file it sits in, counted in 16-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FileHeader {
    pub file_length: i32,
    pub shape_type: ShapeType,
    pub bbox: BoundingBox,
    pub z_range: Range,
    pub m_range: Range,
}

impl FileHeader {
    /// Header of an empty dataset.
    pub fn new(shape_type: ShapeType) -> Self {
        FileHeader {
            file_length: (HEADER_LEN / 2) as i32,
            shape_type,
            ..Default::default()
        }
    }

    /// File length in bytes.
    pub fn file_len_bytes(&self) -> u64 {
        u64::try_from(self.file_length).unwrap_or(0) * 2
    }

    pub fn with_file_length(mut self, words: i32) -> Self {
        self.file_length = words;
        self
    }

    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let file_code = r.read_i32::<BigEndian>()?;
        if file_code != FILE_CODE {
            return Err(Error::InvalidHeader(format!(
                "file code is {} instead of {}",
                file_code, FILE_CODE
            )));
        }
        // five unused big endian integers
        let mut unused = [0u8; 20];
        r.read_exact(&mut unused)?;
        let file_length = r.read_i32::<BigEndian>()?;
        if file_length < (HEADER_LEN / 2) as i32 {
            return Err(Error::InvalidHeader(format!(
                "file length of {} words is shorter than the header",
                file_length
            )));
        }
        let version = r.read_i32::<LittleEndian>()?;
        if version != VERSION {
            log::warn!("unexpected shapefile version {}, reading anyway", version);
        }
        let tag = r.read_i32::<LittleEndian>()?;
        let shape_type = ShapeType::from_i32(tag)
            .ok_or_else(|| Error::InvalidHeader(format!("unknown shape type {}", tag)))?;

        let x_min = r.read_f64::<LittleEndian>()?;
        let y_min = r.read_f64::<LittleEndian>()?;
        let x_max = r.read_f64::<LittleEndian>()?;
        let y_max = r.read_f64::<LittleEndian>()?;
        let z_range = Range::new(r.read_f64::<LittleEndian>()?, r.read_f64::<LittleEndian>()?);
        let m_range = Range::new(r.read_f64::<LittleEndian>()?, r.read_f64::<LittleEndian>()?);

        Ok(FileHeader {
            file_length,
            shape_type,
            bbox: BoundingBox::new(x_min, y_min, x_max, y_max),
            z_range,
            m_range,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_i32::<BigEndian>(FILE_CODE)?;
        for _ in 0..5 {
            w.write_i32::<BigEndian>(0)?;
        }
        w.write_i32::<BigEndian>(self.file_length)?;
        w.write_i32::<LittleEndian>(VERSION)?;
        w.write_i32::<LittleEndian>(self.shape_type.to_i32())?;
        w.write_f64::<LittleEndian>(self.bbox.x_min)?;
        w.write_f64::<LittleEndian>(self.bbox.y_min)?;
        w.write_f64::<LittleEndian>(self.bbox.x_max)?;
        w.write_f64::<LittleEndian>(self.bbox.y_max)?;
        w.write_f64::<LittleEndian>(self.z_range.min)?;
        w.write_f64::<LittleEndian>(self.z_range.max)?;
        w.write_f64::<LittleEndian>(self.m_range.min)?;
        w.write_f64::<LittleEndian>(self.m_range.max)?;
        Ok(())
    }
}
