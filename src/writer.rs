use crate::header::{FileHeader, HEADER_LEN};
use crate::progress::{fraction, Progress};
use crate::record::{encode_record, IndexEntry, INDEX_ENTRY_LEN};
use crate::result::{Error, Result};
use crate::shape_type::ShapeType;
use crate::types::{BoundingBox, Range, Shape};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Appends records to a `.shp`/`.shx` file pair.
///
/// Both file headers are rewritten after every append, so the pair on disk
/// always describes exactly the records appended so far. When an append
/// fails after the headers were touched, the headers for the previous records
/// are written back. Bytes a failed append left behind lie past the declared
/// file lengths and are overwritten by the next append.
pub struct ShapefileWriter<W> {
    shp: W,
    shx: W,
    header: FileHeader,
    num_records: u32,
    // end of the last record in the main file, in bytes
    offset: u64,
    extent: Extent,
}

/// Extents of the non-null records so far. Each part stays `None` until a
/// record actually contributes to it.
#[derive(Debug, Clone, Copy, Default)]
struct Extent {
    bbox: Option<BoundingBox>,
    z: Option<Range>,
    m: Option<Range>,
}

impl Extent {
    // a zero range in an existing header is how "no values" gets written
    fn from_header(header: &FileHeader, num_records: u32) -> Self {
        if num_records == 0 {
            return Extent::default();
        }
        let known = |r: Range| Some(r).filter(|r| *r != Range::default());
        Extent {
            bbox: Some(header.bbox),
            z: known(header.z_range),
            m: known(header.m_range),
        }
    }

    fn extend(&mut self, shape: &Shape) {
        let bbox = match shape.bbox() {
            Some(bbox) => bbox,
            None => return,
        };
        self.bbox = union(self.bbox, Some(bbox), BoundingBox::union);
        self.z = union(self.z, shape.z_range(), Range::union);
        self.m = union(self.m, shape.m_range(), Range::union);
    }

    fn apply(&self, header: &mut FileHeader) {
        header.bbox = self.bbox.unwrap_or_default();
        header.z_range = self.z.unwrap_or_default();
        header.m_range = self.m.unwrap_or_default();
    }
}

fn union<T: Copy>(a: Option<T>, b: Option<T>, f: impl Fn(&T, &T) -> T) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(f(&a, &b)),
        (a, b) => a.or(b),
    }
}

impl ShapefileWriter<File> {
    /// Create `<path>.shp` and `<path>.shx`, truncating existing files.
    pub fn create<P: AsRef<Path>>(path: P, shape_type: ShapeType) -> Result<Self> {
        let path = path.as_ref();
        let shp = File::create(path.with_extension("shp"))?;
        let shx = File::create(path.with_extension("shx"))?;
        Self::new(shp, shx, shape_type)
    }

    /// Open an existing pair to append further records.
    pub fn open_append<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        let shp = options.open(path.with_extension("shp"))?;
        let shx = options.open(path.with_extension("shx"))?;
        Self::resume(shp, shx)
    }
}

impl<W: Write + Seek> ShapefileWriter<W> {
    /// Start an empty dataset, writing both headers.
    pub fn new(shp: W, shx: W, shape_type: ShapeType) -> Result<Self> {
        let mut writer = ShapefileWriter {
            shp,
            shx,
            header: FileHeader::new(shape_type),
            num_records: 0,
            offset: HEADER_LEN,
            extent: Extent::default(),
        };
        writer.write_headers()?;
        Ok(writer)
    }

    pub fn shape_type(&self) -> ShapeType {
        self.header.shape_type
    }

    pub fn len(&self) -> usize {
        self.num_records as usize
    }

    pub fn is_empty(&self) -> bool {
        self.num_records == 0
    }

    /// Bounding box of every non-null record appended so far.
    pub fn extent(&self) -> Option<BoundingBox> {
        self.extent.bbox
    }

    /// Header as currently written to the main file.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Append a shape, returning its 1-based record number.
    ///
    /// Null shapes are accepted in any dataset. Anything else must match the
    /// dataset's shape type. The record is encoded and checked in full
    /// before any byte is written.
    pub fn append(&mut self, shape: &Shape) -> Result<u32> {
        let number = self.num_records + 1;
        if !shape.is_null() && shape.shape_type() != self.header.shape_type {
            return Err(Error::ShapeTypeMismatch {
                record: number,
                expected: self.header.shape_type.to_i32(),
                found: shape.shape_type().to_i32(),
            });
        }
        let bytes = encode_record(number, shape)?;
        let end = self.offset + bytes.len() as u64;
        let too_large = || Error::TooLarge {
            record: number,
            shape_type: shape.shape_type().to_i32(),
            bytes: end,
        };
        let offset_words = i32::try_from(self.offset / 2).map_err(|_| too_large())?;
        i32::try_from(end / 2).map_err(|_| too_large())?;
        let entry = IndexEntry {
            offset: offset_words,
            // record header and content share this length field
            content_length: i32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        };

        // the record and its index entry land past both declared lengths
        self.write_record(&bytes, &entry).map_err(|e| e.at_record(number))?;

        let previous = (self.header, self.extent, self.offset, self.num_records);
        self.offset = end;
        self.num_records = number;
        self.extent.extend(shape);
        if let Err(e) = self.write_headers() {
            (self.header, self.extent, self.offset, self.num_records) = previous;
            if let Err(restore) = self.write_headers() {
                log::warn!(
                    "could not restore headers after failing to append record {}: {}",
                    number,
                    restore
                );
            }
            return Err(e.at_record(number));
        }
        log::trace!("appended record {} at byte {}", number, entry.offset_bytes());
        Ok(number)
    }

    fn write_record(&mut self, bytes: &[u8], entry: &IndexEntry) -> Result<()> {
        self.shp.seek(SeekFrom::Start(self.offset))?;
        self.shp.write_all(bytes)?;
        self.shx
            .seek(SeekFrom::Start(index_position(self.num_records)))?;
        entry.write(&mut self.shx)?;
        Ok(())
    }

    fn write_headers(&mut self) -> Result<()> {
        self.header.file_length = (self.offset / 2) as i32;
        self.extent.apply(&mut self.header);
        self.shp.seek(SeekFrom::Start(0))?;
        self.header.write(&mut self.shp)?;

        let index_len = index_position(self.num_records);
        self.shx.seek(SeekFrom::Start(0))?;
        self.header
            .with_file_length((index_len / 2) as i32)
            .write(&mut self.shx)?;
        log::debug!(
            "headers updated: {} records, main file {} bytes",
            self.num_records,
            self.offset
        );
        Ok(())
    }

    /// Append several shapes, reporting progress and polling for cancellation between them.
    ///
    /// Returns the number of the last record written. Records appended before
    /// a failure or cancellation stay in the dataset.
    pub fn append_all_with<P: Progress>(
        &mut self,
        shapes: &[Shape],
        progress: &mut P,
    ) -> Result<u32> {
        let mut last = self.num_records;
        for (i, shape) in shapes.iter().enumerate() {
            if progress.cancelled() {
                return Err(Error::Cancelled);
            }
            last = self.append(shape)?;
            progress.progress(fraction(i + 1, shapes.len()));
        }
        Ok(last)
    }

    /// Flush both files and hand them back.
    pub fn finish(mut self) -> Result<(W, W)> {
        self.shp.flush()?;
        self.shx.flush()?;
        Ok((self.shp, self.shx))
    }
}

impl<W: Read + Write + Seek> ShapefileWriter<W> {
    /// Continue an existing dataset. New records are numbered from `len() + 1`
    /// and placed at the end of the main file as declared by its header.
    pub fn resume(mut shp: W, mut shx: W) -> Result<Self> {
        shp.seek(SeekFrom::Start(0))?;
        let header = FileHeader::read(&mut shp)?;
        shx.seek(SeekFrom::Start(0))?;
        let index_header = FileHeader::read(&mut shx)?;
        if index_header.shape_type != header.shape_type {
            return Err(Error::InvalidHeader(format!(
                "main file holds {} shapes but the index file declares {}",
                header.shape_type, index_header.shape_type
            )));
        }
        let index_body = index_header.file_len_bytes() - HEADER_LEN;
        if index_body % INDEX_ENTRY_LEN != 0 {
            return Err(Error::InvalidHeader(format!(
                "index file length of {} bytes is not a whole number of entries",
                index_header.file_len_bytes()
            )));
        }
        let num_records = u32::try_from(index_body / INDEX_ENTRY_LEN)
            .map_err(|_| Error::InvalidHeader("index file holds too many entries".into()))?;

        let offset = header.file_len_bytes();
        if num_records > 0 {
            shx.seek(SeekFrom::Start(index_position(num_records - 1)))?;
            let last = IndexEntry::read(&mut shx)?;
            if last.end_bytes() != offset {
                return Err(Error::InvalidHeader(format!(
                    "last index entry ends at byte {} but the main file is {} bytes",
                    last.end_bytes(),
                    offset
                )));
            }
        }
        log::debug!("resuming {} dataset after record {}", header.shape_type, num_records);

        Ok(ShapefileWriter {
            shp,
            shx,
            extent: Extent::from_header(&header, num_records),
            header,
            num_records,
            offset,
        })
    }
}

fn index_position(entries: u32) -> u64 {
    HEADER_LEN + u64::from(entries) * INDEX_ENTRY_LEN
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::reader::ShapefileReader;
    use crate::result::Malformation;
    use crate::types::{Point, PointZ, PolyLine, PolyLineZ, Polygon, NO_DATA};
    use std::cell::Cell;
    use std::io::{self, Cursor};
    use std::rc::Rc;

    // an in-memory file that fails one write starting at a chosen position
    struct Flaky {
        inner: Cursor<Vec<u8>>,
        fail_at: Rc<Cell<Option<u64>>>,
    }

    impl Flaky {
        fn new(fail_at: Rc<Cell<Option<u64>>>) -> Self {
            Flaky {
                inner: Cursor::new(Vec::new()),
                fail_at,
            }
        }
    }

    impl Write for Flaky {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_at.get() == Some(self.inner.position()) {
                self.fail_at.set(None);
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    impl Read for Flaky {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Seek for Flaky {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    fn square(x: f64, y: f64) -> Shape {
        Shape::Polygon(Polygon::new(vec![vec![
            Point::new(x, y),
            Point::new(x, y + 1.0),
            Point::new(x + 1.0, y + 1.0),
            Point::new(x + 1.0, y),
            Point::new(x, y),
        ]]))
    }

    fn memory(shape_type: ShapeType) -> ShapefileWriter<Cursor<Vec<u8>>> {
        ShapefileWriter::new(Cursor::new(Vec::new()), Cursor::new(Vec::new()), shape_type).unwrap()
    }

    #[test]
    fn empty_dataset() {
        let (shp, shx) = memory(ShapeType::Point).finish().unwrap();
        assert_eq!(shp.get_ref().len(), 100);
        assert_eq!(shx.get_ref().len(), 100);
        let reader = ShapefileReader::new(shp, shx).unwrap();
        assert!(reader.is_empty());
        assert_eq!(reader.header().file_length, 50);
    }

    #[test]
    fn files_stay_consistent_after_each_append() {
        let mut writer = memory(ShapeType::Polygon);
        for i in 0..3 {
            let number = writer.append(&square(i as f64, 0.0)).unwrap();
            assert_eq!(number, i + 1);

            // every intermediate state reads back as a complete dataset
            let shp = Cursor::new(writer.shp.get_ref().clone());
            let shx = Cursor::new(writer.shx.get_ref().clone());
            let mut reader = ShapefileReader::new(shp, shx).unwrap();
            assert_eq!(reader.len(), number as usize);
            assert_eq!(
                reader.header().file_len_bytes(),
                writer.shp.get_ref().len() as u64
            );
            assert_eq!(reader.records().filter(|r| r.is_ok()).count(), number as usize);
        }
        assert_eq!(writer.extent(), Some(BoundingBox::new(0.0, 0.0, 3.0, 1.0)));
    }

    #[test]
    fn index_entries_point_at_records() {
        let mut writer = memory(ShapeType::Point);
        writer.append(&Shape::Point(Point::new(1.0, 1.0))).unwrap();
        writer.append(&Shape::Null).unwrap();
        writer.append(&Shape::Point(Point::new(2.0, 2.0))).unwrap();
        let (shp, shx) = writer.finish().unwrap();
        let shx = shx.into_inner();

        let entry = |n: usize| {
            let at = 100 + n * 8;
            let word = |i: usize| i32::from_be_bytes(shx[i..i + 4].try_into().unwrap());
            (word(at), word(at + 4))
        };
        // point records are 8 + 20 bytes, the null record 8 + 4
        assert_eq!(entry(0), (50, 10));
        assert_eq!(entry(1), (64, 2));
        assert_eq!(entry(2), (70, 10));
        assert_eq!(shp.get_ref().len(), 168);
    }

    #[test]
    fn nulls_do_not_touch_extent() {
        let mut writer = memory(ShapeType::Polygon);
        writer.append(&Shape::Null).unwrap();
        assert_eq!(writer.extent(), None);
        writer.append(&square(2.0, 2.0)).unwrap();
        writer.append(&Shape::Null).unwrap();
        assert_eq!(writer.extent(), Some(BoundingBox::new(2.0, 2.0, 3.0, 3.0)));
        assert_eq!(writer.len(), 3);
    }

    #[test]
    fn z_and_m_ranges_reach_the_header() {
        let mut writer = memory(ShapeType::PolyLineZ);
        let line = |z: f64, m: f64| {
            Shape::PolyLineZ(PolyLineZ::new(vec![vec![
                PointZ::new(0.0, 0.0, z, m),
                PointZ::new(1.0, 1.0, z + 1.0, m),
            ]]))
        };
        writer.append(&line(5.0, 1.0)).unwrap();
        writer.append(&line(-2.0, 3.0)).unwrap();
        assert_eq!(writer.header().z_range, Range::new(-2.0, 6.0));
        assert_eq!(writer.header().m_range, Range::new(1.0, 3.0));
    }

    #[test]
    fn no_data_measures_stay_out_of_the_header() {
        let mut writer = memory(ShapeType::PointZ);
        writer
            .append(&Shape::PointZ(PointZ::new(1.0, 1.0, 2.0, NO_DATA)))
            .unwrap();
        assert_eq!(writer.header().m_range, Range::default());
        assert_eq!(writer.header().z_range, Range::new(2.0, 2.0));
        writer
            .append(&Shape::PointZ(PointZ::new(2.0, 2.0, 4.0, 5.0)))
            .unwrap();
        assert_eq!(writer.header().m_range, Range::new(5.0, 5.0));
        assert_eq!(writer.header().z_range, Range::new(2.0, 4.0));

        // a resumed dataset with no measures yet does not start from zero
        let mut writer = memory(ShapeType::PointZ);
        writer
            .append(&Shape::PointZ(PointZ::new(1.0, 1.0, 2.0, NO_DATA)))
            .unwrap();
        let (shp, shx) = writer.finish().unwrap();
        let mut writer = ShapefileWriter::resume(shp, shx).unwrap();
        writer
            .append(&Shape::PointZ(PointZ::new(2.0, 2.0, 4.0, 7.0)))
            .unwrap();
        assert_eq!(writer.header().m_range, Range::new(7.0, 7.0));
        assert_eq!(writer.header().z_range, Range::new(2.0, 4.0));
    }

    #[test]
    fn bad_part_offsets_write_nothing() {
        let mut writer = memory(ShapeType::PolyLine);
        let line = PolyLine {
            bbox: BoundingBox::default(),
            parts: vec![0, 0],
            points: vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)],
        };
        match writer.append(&Shape::PolyLine(line)).unwrap_err() {
            Error::MalformedRecord {
                record: 1,
                shape_type: 3,
                reason: Malformation::NonMonotonicParts { index: 1 },
            } => {}
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(writer.shp.get_ref().len(), 100);
        assert_eq!(writer.shx.get_ref().len(), 100);
        assert!(writer.is_empty());
    }

    #[test]
    fn failed_header_write_restores_previous_headers() {
        let shp_fault = Rc::new(Cell::new(None));
        let shx_fault = Rc::new(Cell::new(None));
        let mut writer = ShapefileWriter::new(
            Flaky::new(shp_fault.clone()),
            Flaky::new(shx_fault.clone()),
            ShapeType::Polygon,
        )
        .unwrap();
        writer.append(&square(0.0, 0.0)).unwrap();

        // the main file header goes through, the index header does not
        shx_fault.set(Some(0));
        let err = writer.append(&square(1.0, 1.0)).unwrap_err();
        assert!(matches!(err, Error::RecordIo { record: 2, .. }));
        assert_eq!(writer.len(), 1);
        assert_eq!(writer.extent(), Some(BoundingBox::new(0.0, 0.0, 1.0, 1.0)));
        assert_eq!(shp_fault.get(), None);

        let (shp, shx) = writer.finish().unwrap();
        let mut writer = ShapefileWriter::resume(shp, shx).unwrap();
        assert_eq!(writer.len(), 1);
        assert_eq!(writer.append(&square(2.0, 2.0)).unwrap(), 2);
        let (shp, shx) = writer.finish().unwrap();

        let mut reader = ShapefileReader::new(shp.inner, shx.inner).unwrap();
        let shapes: Vec<Shape> = reader.records().map(|r| r.unwrap().shape).collect();
        assert_eq!(shapes, vec![square(0.0, 0.0), square(2.0, 2.0)]);
    }

    #[test]
    fn wrong_shape_type_writes_nothing() {
        let mut writer = memory(ShapeType::Polygon);
        writer.append(&square(0.0, 0.0)).unwrap();
        let before = writer.shp.get_ref().clone();
        let err = writer
            .append(&Shape::Point(Point::new(0.0, 0.0)))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeTypeMismatch {
                record: 2,
                expected: 5,
                found: 1
            }
        ));
        assert_eq!(writer.shp.get_ref(), &before);
        assert_eq!(writer.len(), 1);
    }

    #[test]
    fn length_mismatch_writes_nothing() {
        let mut writer = memory(ShapeType::PolyLineZ);
        let mut line = PolyLineZ::new(vec![vec![
            PointZ::new(0.0, 0.0, 1.0, 0.0),
            PointZ::new(1.0, 1.0, 2.0, 0.0),
        ]]);
        line.z.values.pop();
        let err = writer.append(&Shape::PolyLineZ(line)).unwrap_err();
        assert!(matches!(err, Error::LengthMismatch { record: 1, .. }));
        assert_eq!(writer.shp.get_ref().len(), 100);
        assert!(writer.is_empty());
    }

    #[test]
    fn resume_continues_numbering() {
        let mut writer = memory(ShapeType::Polygon);
        writer.append(&square(0.0, 0.0)).unwrap();
        writer.append(&square(1.0, 0.0)).unwrap();
        let (shp, shx) = writer.finish().unwrap();

        let mut writer = ShapefileWriter::resume(shp, shx).unwrap();
        assert_eq!(writer.len(), 2);
        assert_eq!(writer.append(&square(5.0, 5.0)).unwrap(), 3);
        assert_eq!(writer.extent(), Some(BoundingBox::new(0.0, 0.0, 6.0, 6.0)));
        let (shp, shx) = writer.finish().unwrap();

        let mut reader = ShapefileReader::new(shp, shx).unwrap();
        let records: Vec<_> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].shape, square(0.0, 0.0));
        assert_eq!(records[2].number, 3);
        assert_eq!(records[2].shape, square(5.0, 5.0));
    }

    #[test]
    fn resume_rejects_inconsistent_pair() {
        let mut writer = memory(ShapeType::Point);
        writer.append(&Shape::Point(Point::new(1.0, 1.0))).unwrap();
        let (shp, shx) = writer.finish().unwrap();
        let mut shp = shp.into_inner();
        // claim one more word in the main file than the index accounts for
        shp[24..28].copy_from_slice(&65i32.to_be_bytes());
        assert!(matches!(
            ShapefileWriter::resume(Cursor::new(shp), shx),
            Err(Error::InvalidHeader(_))
        ));
    }

    #[test]
    fn append_all_reports_progress() {
        struct Count(Vec<f64>);
        impl Progress for Count {
            fn progress(&mut self, fraction: f64) {
                self.0.push(fraction);
            }
        }

        let shapes = vec![square(0.0, 0.0), Shape::Null, square(1.0, 1.0), square(2.0, 2.0)];
        let mut writer = memory(ShapeType::Polygon);
        let mut progress = Count(Vec::new());
        assert_eq!(writer.append_all_with(&shapes, &mut progress).unwrap(), 4);
        assert_eq!(progress.0, vec![0.25, 0.5, 0.75, 1.0]);
        assert_eq!(writer.append_all_with(&[], &mut NoProgress).unwrap(), 4);
    }

    #[test]
    fn append_all_stops_when_cancelled() {
        struct CancelAfter(usize);
        impl Progress for CancelAfter {
            fn progress(&mut self, _fraction: f64) {
                self.0 = self.0.saturating_sub(1);
            }
            fn cancelled(&self) -> bool {
                self.0 == 0
            }
        }

        let shapes = vec![square(0.0, 0.0), square(1.0, 1.0), square(2.0, 2.0)];
        let mut writer = memory(ShapeType::Polygon);
        let err = writer
            .append_all_with(&shapes, &mut CancelAfter(2))
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(writer.len(), 2);
    }

    #[test]
    fn appends_to_files_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parcels");
        let mut writer = ShapefileWriter::create(&path, ShapeType::Polygon).unwrap();
        writer.append(&square(0.0, 0.0)).unwrap();
        writer.finish().unwrap();

        let mut writer = ShapefileWriter::open_append(&path).unwrap();
        assert_eq!(writer.append(&Shape::Null).unwrap(), 2);
        assert_eq!(writer.append(&square(3.0, 3.0)).unwrap(), 3);
        writer.finish().unwrap();

        let mut reader = ShapefileReader::open(&path).unwrap();
        let numbers: Vec<u32> = reader.records().map(|r| r.unwrap().number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(reader.header().bbox, BoundingBox::new(0.0, 0.0, 4.0, 4.0));
    }

    #[test]
    fn decode_errors_are_not_write_errors() {
        // a reader over a pair with a bad payload reports it against the record
        let mut writer = memory(ShapeType::Polygon);
        writer.append(&square(0.0, 0.0)).unwrap();
        let (shp, shx) = writer.finish().unwrap();
        let mut shp = shp.into_inner();
        // negative part count
        shp[100 + 8 + 4 + 32..100 + 8 + 4 + 36].copy_from_slice(&(-1i32).to_le_bytes());
        let mut reader = ShapefileReader::new(Cursor::new(shp), shx).unwrap();
        match reader.read_record(1).unwrap_err() {
            Error::MalformedRecord {
                record: 1,
                reason: Malformation::NegativeCount { .. },
                ..
            } => {}
            other => panic!("unexpected error {:?}", other),
        }
    }
}
