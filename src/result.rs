/// The result returned by many methods within the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while decoding, encoding or sequencing shapefile records.
///
/// Record numbers are 1-based. The codec itself works on bare payloads and
/// does not know which record it is looking at, so errors produced by it carry
/// `record: 0` until record framing stamps the real number with [`Error::at_record`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("record {record} (shape type {shape_type}) is malformed: {reason}")]
    MalformedRecord {
        record: u32,
        shape_type: i32,
        reason: Malformation,
    },
    #[error("record {record} (type {shape_type}): part {part} has unknown part type {value}")]
    InvalidPartType {
        record: u32,
        shape_type: i32,
        part: usize,
        value: i32,
    },
    #[error("record {record} (type {shape_type}) encoded to {actual} bytes, declared {declared}")]
    LengthMismatch {
        record: u32,
        shape_type: i32,
        declared: usize,
        actual: usize,
    },
    #[error("record {record} has shape type {found} but the dataset holds shape type {expected}")]
    ShapeTypeMismatch {
        record: u32,
        expected: i32,
        found: i32,
    },
    #[error("record {record} does not exist, the type {shape_type} dataset holds {len}")]
    NoSuchRecord {
        record: u32,
        shape_type: i32,
        len: usize,
    },
    #[error("record {record} (type {shape_type}) would grow the file past {bytes} bytes")]
    TooLarge {
        record: u32,
        shape_type: i32,
        bytes: u64,
    },
    #[error("record {record} (type {shape_type}): {field} count {count} overflows 32 bits")]
    CountOverflow {
        record: u32,
        shape_type: i32,
        field: &'static str,
        count: usize,
    },
    #[error("I/O failure at record {record}")]
    RecordIo {
        record: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O failure")]
    Io(#[from] std::io::Error),
    #[error("invalid file header: {0}")]
    InvalidHeader(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("{0} geometries cannot be represented as a shape")]
    UnsupportedGeometryType(&'static str),
    #[error("Error encoding WKB geometry")]
    GeomEncodeError,
    #[error("Error decoding WKB geometry")]
    GeomDecodeError,
}

/// The specific way a record's content failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Malformation {
    #[error("needed {needed} bytes at offset {offset} but only {available} remain")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("{field} count is negative ({value})")]
    NegativeCount { field: &'static str, value: i32 },
    #[error("part {index} starts at point {value}, outside 0..{num_points}")]
    PartOutOfRange {
        index: usize,
        value: i32,
        num_points: usize,
    },
    #[error("part {index} does not start after the previous part")]
    NonMonotonicParts { index: usize },
    #[error("unrecognised shape type tag")]
    UnknownShapeType,
    #[error("record header declares {header} words but the index entry declares {index}")]
    IndexMismatch { header: i32, index: i32 },
    #[error("content length of {0} words is too short to hold a shape type")]
    ContentTooShort(i32),
    #[error("{parts} part offsets but {part_types} part types")]
    PartTypeCount { parts: usize, part_types: usize },
}

impl Error {
    pub(crate) fn malformed(shape_type: i32, reason: Malformation) -> Self {
        Error::MalformedRecord {
            record: 0,
            shape_type,
            reason,
        }
    }

    /// Attach a record number to an error coming out of the codec.
    ///
    /// Errors that already carry a record number, or that are not tied to a
    /// single record, are returned unchanged.
    pub fn at_record(self, number: u32) -> Self {
        match self {
            Error::MalformedRecord {
                record: 0,
                shape_type,
                reason,
            } => Error::MalformedRecord {
                record: number,
                shape_type,
                reason,
            },
            Error::InvalidPartType {
                record: 0,
                shape_type,
                part,
                value,
            } => Error::InvalidPartType {
                record: number,
                shape_type,
                part,
                value,
            },
            Error::CountOverflow {
                record: 0,
                shape_type,
                field,
                count,
            } => Error::CountOverflow {
                record: number,
                shape_type,
                field,
                count,
            },
            Error::LengthMismatch {
                record: 0,
                shape_type,
                declared,
                actual,
            } => Error::LengthMismatch {
                record: number,
                shape_type,
                declared,
                actual,
            },
            Error::ShapeTypeMismatch {
                record: 0,
                expected,
                found,
            } => Error::ShapeTypeMismatch {
                record: number,
                expected,
                found,
            },
            Error::Io(source) => Error::RecordIo {
                record: number,
                source,
            },
            other => other,
        }
    }

    /// The record this error is about, if it is tied to one.
    pub fn record(&self) -> Option<u32> {
        match self {
            Error::MalformedRecord { record, .. }
            | Error::InvalidPartType { record, .. }
            | Error::LengthMismatch { record, .. }
            | Error::ShapeTypeMismatch { record, .. }
            | Error::NoSuchRecord { record, .. }
            | Error::TooLarge { record, .. }
            | Error::CountOverflow { record, .. }
            | Error::RecordIo { record, .. } => Some(*record).filter(|r| *r > 0),
            _ => None,
        }
    }

    /// The raw shape type tag of the record this error is about, if known.
    ///
    /// -1 means the tag itself could not be read.
    pub fn shape_type(&self) -> Option<i32> {
        match self {
            Error::MalformedRecord { shape_type, .. }
            | Error::InvalidPartType { shape_type, .. }
            | Error::LengthMismatch { shape_type, .. }
            | Error::NoSuchRecord { shape_type, .. }
            | Error::TooLarge { shape_type, .. }
            | Error::CountOverflow { shape_type, .. } => Some(*shape_type),
            Error::ShapeTypeMismatch { found, .. } => Some(*found),
            _ => None,
        }
    }

    /// Whether the error came from the underlying storage rather than the data in it.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_) | Error::RecordIo { .. })
    }
}
