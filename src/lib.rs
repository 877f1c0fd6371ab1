//! Reading and writing the geometry half of an ESRI Shapefile: the `.shp`
//! main file and its `.shx` index.
//!
//! Every record type of the format is supported, from Null through
//! MultiPatch, including the measured (M) variants. Records are decoded
//! from a single bounds checked cursor, so damaged or hostile input yields an
//! [`Error`] naming the record and shape type instead of a panic.
//!
//! ```no_run
//! use shp::{ShapefileReader, ShapefileWriter, Shape, ShapeType, Point};
//!
//! # fn main() -> shp::Result<()> {
//! let mut writer = ShapefileWriter::create("wells", ShapeType::Point)?;
//! writer.append(&Shape::Point(Point::new(-105.2, 40.0)))?;
//! writer.finish()?;
//!
//! let mut reader = ShapefileReader::open("wells")?;
//! for record in reader.records() {
//!     let record = record?;
//!     println!("{}: {:?}", record.number, record.shape.to_geo()?);
//! }
//! # Ok(())
//! # }
//! ```
pub mod config;
pub mod geo;
pub mod header;
pub mod progress;
pub mod reader;
pub mod record;
mod result;
pub mod shape_type;
pub mod shp_codec;
pub mod types;
pub mod writer;

pub use crate::config::{MalformedPolicy, ReadOptions};
pub use crate::header::FileHeader;
pub use crate::progress::{NoProgress, Progress};
pub use crate::reader::{Records, ShapefileReader};
pub use crate::record::{decode_record, encode_record, IndexEntry, Record, RecordHeader};
pub use crate::result::{Error, Malformation, Result};
pub use crate::shape_type::ShapeType;
pub use crate::shp_codec::ShapeCodec;
#[doc(inline)]
pub use crate::types::*;
pub use crate::writer::ShapefileWriter;
