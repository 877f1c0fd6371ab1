use crate::config::{MalformedPolicy, ReadOptions};
use crate::header::{FileHeader, HEADER_LEN};
use crate::progress::{fraction, Progress};
use crate::record::{
    decode_record, IndexEntry, Record, RecordHeader, INDEX_ENTRY_LEN, RECORD_HEADER_LEN,
};
use crate::result::{Error, Malformation, Result};
use crate::shape_type::ShapeType;
use byteorder::{ByteOrder, LittleEndian};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Read access to a `.shp`/`.shx` file pair.
///
/// The index file is loaded when the reader is created. Record boundaries
/// always come from the index, so a damaged record never shifts the ones
/// after it.
pub struct ShapefileReader<R> {
    shp: R,
    header: FileHeader,
    shp_len: u64,
    entries: Vec<IndexEntry>,
    options: ReadOptions,
}

impl ShapefileReader<BufReader<File>> {
    /// Open `<path>.shp` and `<path>.shx`. Any extension on `path` is replaced.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let shp = File::open(path.with_extension("shp"))?;
        let shx = File::open(path.with_extension("shx"))?;
        Self::new(BufReader::new(shp), BufReader::new(shx))
    }
}

impl<R: Read + Seek> ShapefileReader<R> {
    pub fn new<I: Read + Seek>(mut shp: R, mut shx: I) -> Result<Self> {
        let shp_len = shp.seek(SeekFrom::End(0))?;
        shp.seek(SeekFrom::Start(0))?;
        let header = FileHeader::read(&mut shp)?;
        if header.file_len_bytes() != shp_len {
            log::warn!(
                "main file header declares {} bytes but the file holds {}",
                header.file_len_bytes(),
                shp_len
            );
        }

        let shx_len = shx.seek(SeekFrom::End(0))?;
        shx.seek(SeekFrom::Start(0))?;
        let index_header = FileHeader::read(&mut shx)?;
        if index_header.shape_type != header.shape_type {
            return Err(Error::InvalidHeader(format!(
                "main file holds {} shapes but the index file declares {}",
                header.shape_type, index_header.shape_type
            )));
        }
        let index_len = index_header.file_len_bytes();
        if (index_len - HEADER_LEN) % INDEX_ENTRY_LEN != 0 {
            return Err(Error::InvalidHeader(format!(
                "index file length of {} bytes is not a whole number of entries",
                index_len
            )));
        }
        if index_len > shx_len {
            return Err(Error::InvalidHeader(format!(
                "index file header declares {} bytes but the file holds {}",
                index_len, shx_len
            )));
        }

        let count = (index_len - HEADER_LEN) / INDEX_ENTRY_LEN;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(IndexEntry::read(&mut shx)?);
        }
        log::debug!("opened {} dataset with {} records", header.shape_type, entries.len());

        Ok(ShapefileReader {
            shp,
            header,
            shp_len,
            entries,
            options: ReadOptions::default(),
        })
    }

    pub fn with_options(mut self, options: ReadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn shape_type(&self) -> ShapeType {
        self.header.shape_type
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index entry of a 1-based record number.
    pub fn index_entry(&self, number: u32) -> Option<&IndexEntry> {
        let i = usize::try_from(number).ok()?.checked_sub(1)?;
        self.entries.get(i)
    }

    /// Read and decode a single record by its 1-based number.
    pub fn read_record(&mut self, number: u32) -> Result<Record> {
        let entry = *self.index_entry(number).ok_or(Error::NoSuchRecord {
            record: number,
            shape_type: self.header.shape_type.to_i32(),
            len: self.len(),
        })?;
        let content = self
            .read_content(number, &entry)
            .map_err(|e| e.at_record(number))?;
        let shape = decode_record(number, &content)?;
        if !shape.is_null() && shape.shape_type() != self.header.shape_type {
            return Err(Error::ShapeTypeMismatch {
                record: number,
                expected: self.header.shape_type.to_i32(),
                found: shape.shape_type().to_i32(),
            });
        }
        Ok(Record { number, shape })
    }

    fn read_content(&mut self, number: u32, entry: &IndexEntry) -> Result<Vec<u8>> {
        if entry.content_length < 2 {
            return Err(Error::malformed(
                -1,
                Malformation::ContentTooShort(entry.content_length),
            ));
        }
        let offset = entry.offset_bytes();
        if offset < HEADER_LEN || entry.end_bytes() > self.shp_len {
            return Err(Error::malformed(
                -1,
                Malformation::Truncated {
                    offset: offset as usize,
                    needed: (RECORD_HEADER_LEN + entry.content_bytes()) as usize,
                    available: self.shp_len.saturating_sub(offset) as usize,
                },
            ));
        }

        self.shp.seek(SeekFrom::Start(offset))?;
        let header = RecordHeader::read(&mut self.shp)?;
        let mut content = vec![0u8; entry.content_bytes() as usize];
        self.shp.read_exact(&mut content)?;

        if self.options.verify_record_headers {
            if header.content_length != entry.content_length {
                return Err(Error::malformed(
                    LittleEndian::read_i32(&content[..4]),
                    Malformation::IndexMismatch {
                        header: header.content_length,
                        index: entry.content_length,
                    },
                ));
            }
            if i64::from(header.number) != i64::from(number) {
                log::warn!(
                    "record {} is numbered {} in the main file",
                    number,
                    header.number
                );
            }
        }
        Ok(content)
    }

    /// Iterate over every record in file order.
    ///
    /// Each call starts again from the first record.
    pub fn records(&mut self) -> Records<'_, R> {
        Records {
            reader: self,
            next: 1,
            done: false,
        }
    }

    /// Read every record, reporting progress and polling for cancellation between records.
    ///
    /// Under [`MalformedPolicy::Skip`] bad records are logged and left out of
    /// the result; IO failures always abort.
    pub fn read_all_with<P: Progress>(&mut self, progress: &mut P) -> Result<Vec<Record>> {
        let total = self.len();
        let mut out = Vec::with_capacity(total);
        for (i, number) in (1..=total as u32).enumerate() {
            if progress.cancelled() {
                return Err(Error::Cancelled);
            }
            match self.read_record(number) {
                Ok(record) => out.push(record),
                Err(e) if !e.is_io() && self.options.on_malformed == MalformedPolicy::Skip => {
                    log::warn!("skipping record {}: {}", number, e);
                }
                Err(e) => return Err(e),
            }
            progress.progress(fraction(i + 1, total));
        }
        Ok(out)
    }
}

/// Lazy iterator over the records of a [`ShapefileReader`].
pub struct Records<'a, R> {
    reader: &'a mut ShapefileReader<R>,
    next: u32,
    done: bool,
}

impl<'a, R: Read + Seek> Iterator for Records<'a, R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done && (self.next as usize) <= self.reader.len() {
            let number = self.next;
            self.next += 1;
            let skip = self.reader.options.on_malformed == MalformedPolicy::Skip;
            match self.reader.read_record(number) {
                Ok(record) => return Some(Ok(record)),
                Err(e) if skip && !e.is_io() => {
                    log::warn!("skipping record {}: {}", number, e);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        let remaining = (self.reader.len() + 1).saturating_sub(self.next as usize);
        (0, Some(remaining))
    }
}
