//
// Copyright (c) geolayers contributors. All rights reserved.
//

//! Read polyline geometries from an [ESRI Shapefile][esri] (`.shp`) buffer.
//!
//! [esri]: https://www.esri.com/content/dam/esrisites/sitecore-archive/Files/Pdfs/library/whitepapers/pdfs/shapefile.pdf
//!
//! ```rust,no_run
//! use geolayers::shp;
//!
//! let raw = std::fs::read("shapes/roads.shp").unwrap();
//! for geom in shp::decode(&raw).unwrap() {
//!     println!("{} with {} points", geom.type_name(), geom.num_points());
//! }
//! ```

use crate::error::{Error, Result};
use crate::types::{Geometry, LineString, MultiLineString, Point};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Fixed size of the main file header.
pub const HEADER_LEN: usize = 100;
/// Record number and content length, both big-endian.
pub const RECORD_HEADER_LEN: usize = 8;
pub const SHAPE_POLYLINE: i32 = 3;

const FILE_CODE: i32 = 9994;

/// Main file header.
///
/// ```text
/// offset  field         type     order
/// 0       file code     i32      big
/// 24      file length   i32      big     (16-bit words, header included)
/// 28      version       i32      little
/// 32      shape type    i32      little
/// 36      bbox          4 x f64  little  (xmin, ymin, xmax, ymax)
/// ```
#[derive(PartialEq, Clone, Debug)]
pub struct ShpHeader {
    pub file_code: i32,
    pub file_length: i32,
    pub version: i32,
    pub shape_type: i32,
    pub bbox: [f64; 4],
}

impl ShpHeader {
    pub fn read(raw: &[u8]) -> Result<Self> {
        if raw.len() < HEADER_LEN {
            return Err(Error::MalformedShapefile(format!(
                "buffer of {} bytes is shorter than the {} byte header",
                raw.len(),
                HEADER_LEN
            )));
        }
        let mut rdr = Reader::new(raw);
        let file_code = rdr.i32_be(0, "file code")?;
        let file_length = rdr.i32_be(24, "file length")?;
        let version = rdr.i32_le(28, "version")?;
        let shape_type = rdr.i32_le(32, "shape type")?;
        let mut bbox = [0.0; 4];
        for (i, v) in bbox.iter_mut().enumerate() {
            *v = rdr.f64_le(36 + i * 8, "bounding box")?;
        }
        Ok(ShpHeader { file_code, file_length, version, shape_type, bbox })
    }

    /// Declared file length in bytes.
    pub fn byte_length(&self) -> i64 {
        self.file_length as i64 * 2
    }
}

/// What to do with a record whose shape type is not a polyline.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum UnsupportedShape {
    /// End the scan and return what was decoded so far.
    #[default]
    Stop,
    /// Jump over the record using its declared content length and continue.
    Skip,
}

#[derive(Clone, Debug, Default)]
pub struct ShapefileDecoder {
    pub on_unsupported: UnsupportedShape,
}

impl ShapefileDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_unsupported(mut self) -> Self {
        self.on_unsupported = UnsupportedShape::Skip;
        self
    }

    /// Decodes every polyline record in file order.
    pub fn decode(&self, raw: &[u8]) -> Result<Vec<Geometry>> {
        let header = ShpHeader::read(raw)?;
        if header.file_code != FILE_CODE {
            tracing::debug!(file_code = header.file_code, "unexpected shapefile file code");
        }
        let file_len = header.byte_length();
        let mut rdr = Reader::new(raw);
        let mut geometries = Vec::new();
        let mut offset = HEADER_LEN;

        while (offset as i64) < file_len {
            let content_words = rdr.i32_be(offset + 4, "record content length")?;
            let shape_at = offset + RECORD_HEADER_LEN;
            let shape_type = rdr.i32_le(shape_at, "shape type")?;

            if shape_type != SHAPE_POLYLINE {
                match self.on_unsupported {
                    UnsupportedShape::Stop => {
                        tracing::debug!(shape_type, offset, "stopping at non-polyline record");
                        break;
                    }
                    UnsupportedShape::Skip => {
                        let content_len = usize::try_from(content_words).map_err(|_| {
                            Error::MalformedShapefile(format!(
                                "negative content length {} in record at offset {}",
                                content_words, offset
                            ))
                        })?;
                        tracing::debug!(shape_type, offset, "skipping non-polyline record");
                        offset = checked_offset(shape_at, content_len, 2, offset)?;
                        continue;
                    }
                }
            }

            let (geometry, next) = read_polyline(&mut rdr, shape_at)?;
            geometries.push(geometry);
            offset = next;
        }

        tracing::debug!(records = geometries.len(), bytes = raw.len(), "decoded shapefile");
        Ok(geometries)
    }
}

/// Decodes with the default options.
pub fn decode(raw: &[u8]) -> Result<Vec<Geometry>> {
    ShapefileDecoder::default().decode(raw)
}

// Polyline record content, offsets relative to the shape type:
//
//   0   shape type   i32
//   4   bbox         4 x f64
//   36  numParts     i32
//   40  numPoints    i32
//   44  parts        numParts x i32
//   X   points       numPoints x (f64, f64)     X = 44 + 4 * numParts
//
// Returns the geometry and the offset just past the point block.
fn read_polyline(rdr: &mut Reader, at: usize) -> Result<(Geometry, usize)> {
    let num_parts = rdr.i32_le(at + 36, "numParts")?;
    let num_points = rdr.i32_le(at + 40, "numPoints")?;
    let (num_parts, num_points) = match (usize::try_from(num_parts), usize::try_from(num_points)) {
        (Ok(parts), Ok(points)) => (parts, points),
        _ => {
            return Err(Error::MalformedShapefile(format!(
                "negative part or point count ({}, {}) in record at offset {}",
                num_parts, num_points, at
            )))
        }
    };

    let parts_at = at + 44;
    let points_at = checked_offset(parts_at, num_parts, 4, at)?;
    let end = checked_offset(points_at, num_points, 16, at)?;
    if end > rdr.len() {
        return Err(Error::MalformedShapefile(format!(
            "record at offset {} declares {} parts and {} points, \
             extending to byte {} of a {} byte buffer",
            at,
            num_parts,
            num_points,
            end,
            rdr.len()
        )));
    }

    let mut parts = Vec::with_capacity(num_parts);
    for i in 0..num_parts {
        parts.push(rdr.i32_le(parts_at + i * 4, "part index")?);
    }

    let mut points = Vec::with_capacity(num_points);
    for i in 0..num_points {
        let x = rdr.f64_le(points_at + i * 16, "point x")?;
        let y = rdr.f64_le(points_at + i * 16 + 8, "point y")?;
        points.push(Point { x, y });
    }

    let mut lines = Vec::with_capacity(num_parts);
    for (i, &start) in parts.iter().enumerate() {
        let stop = parts.get(i + 1).copied().unwrap_or(num_points as i32);
        let range = usize::try_from(start)
            .ok()
            .zip(usize::try_from(stop).ok())
            .filter(|(start, stop)| start <= stop && *stop <= num_points);
        let (start, stop) = range.ok_or_else(|| {
            Error::MalformedShapefile(format!(
                "part {} spans points {}..{} of {} in record at offset {}",
                i, start, stop, num_points, at
            ))
        })?;
        lines.push(LineString { points: points[start..stop].to_vec() });
    }

    let geometry = if lines.len() == 1 {
        Geometry::LineString(lines.remove(0))
    } else {
        Geometry::MultiLineString(MultiLineString { lines })
    };
    Ok((geometry, end))
}

fn checked_offset(base: usize, count: usize, size: usize, record_at: usize) -> Result<usize> {
    count
        .checked_mul(size)
        .and_then(|n| base.checked_add(n))
        .ok_or_else(|| {
            Error::MalformedShapefile(format!("offset overflow in record at offset {}", record_at))
        })
}

// Positioned reads over the whole buffer; any read past the end is a MalformedShapefile.
struct Reader<'a> {
    raw: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    fn new(raw: &'a [u8]) -> Self {
        Reader { raw: Cursor::new(raw) }
    }

    fn len(&self) -> usize {
        self.raw.get_ref().len()
    }

    fn seek(&mut self, offset: usize) {
        self.raw.set_position(offset as u64);
    }

    fn past_end(&self, offset: usize, field: &str) -> Error {
        Error::MalformedShapefile(format!(
            "{} at offset {} runs past the end of a {} byte buffer",
            field,
            offset,
            self.len()
        ))
    }

    fn i32_be(&mut self, offset: usize, field: &str) -> Result<i32> {
        self.seek(offset);
        self.raw.read_i32::<BigEndian>().map_err(|_| self.past_end(offset, field))
    }

    fn i32_le(&mut self, offset: usize, field: &str) -> Result<i32> {
        self.seek(offset);
        self.raw.read_i32::<LittleEndian>().map_err(|_| self.past_end(offset, field))
    }

    fn f64_le(&mut self, offset: usize, field: &str) -> Result<f64> {
        self.seek(offset);
        self.raw.read_f64::<LittleEndian>().map_err(|_| self.past_end(offset, field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    enum Shape<'a> {
        Polyline(&'a [i32], &'a [(f64, f64)]),
        Point(f64, f64),
    }

    fn record_content(shape: &Shape) -> Vec<u8> {
        let mut w = Vec::new();
        match shape {
            Shape::Polyline(parts, points) => {
                w.write_i32::<LittleEndian>(SHAPE_POLYLINE).unwrap();
                for _ in 0..4 {
                    w.write_f64::<LittleEndian>(0.0).unwrap();
                }
                w.write_i32::<LittleEndian>(parts.len() as i32).unwrap();
                w.write_i32::<LittleEndian>(points.len() as i32).unwrap();
                for part in parts.iter() {
                    w.write_i32::<LittleEndian>(*part).unwrap();
                }
                for (x, y) in points.iter() {
                    w.write_f64::<LittleEndian>(*x).unwrap();
                    w.write_f64::<LittleEndian>(*y).unwrap();
                }
            }
            Shape::Point(x, y) => {
                w.write_i32::<LittleEndian>(1).unwrap();
                w.write_f64::<LittleEndian>(*x).unwrap();
                w.write_f64::<LittleEndian>(*y).unwrap();
            }
        }
        w
    }

    fn shp(shapes: &[Shape]) -> Vec<u8> {
        let mut body = Vec::new();
        for (i, shape) in shapes.iter().enumerate() {
            let content = record_content(shape);
            body.write_i32::<BigEndian>(i as i32 + 1).unwrap();
            body.write_i32::<BigEndian>((content.len() / 2) as i32).unwrap();
            body.extend_from_slice(&content);
        }
        let mut w = Vec::new();
        w.write_i32::<BigEndian>(FILE_CODE).unwrap();
        w.extend_from_slice(&[0u8; 20]);
        w.write_i32::<BigEndian>(((HEADER_LEN + body.len()) / 2) as i32).unwrap();
        w.write_i32::<LittleEndian>(1000).unwrap();
        w.write_i32::<LittleEndian>(SHAPE_POLYLINE).unwrap();
        w.extend_from_slice(&[0u8; 64]);
        assert_eq!(w.len(), HEADER_LEN);
        w.extend_from_slice(&body);
        w
    }

    fn coords(geom: &Geometry) -> Vec<Vec<(f64, f64)>> {
        let line = |l: &LineString| l.points().map(|p| (p.x, p.y)).collect::<Vec<_>>();
        match geom {
            Geometry::LineString(l) => vec![line(l)],
            Geometry::MultiLineString(m) => m.lines().map(line).collect(),
            other => panic!("unexpected geometry {:?}", other),
        }
    }

    #[test]
    fn test_read_header() {
        let raw = shp(&[]);
        let header = ShpHeader::read(&raw).unwrap();
        assert_eq!(header.file_code, 9994);
        assert_eq!(header.file_length, 50);
        assert_eq!(header.byte_length(), 100);
        assert_eq!(header.version, 1000);
        assert_eq!(header.shape_type, SHAPE_POLYLINE);
    }

    #[test]
    fn test_empty_file() {
        // file length 50 words -> 100 bytes -> no records scanned
        let raw = shp(&[]);
        assert!(decode(&raw).unwrap().is_empty());
    }

    #[test]
    fn test_short_buffer() {
        let raw = vec![0u8; 99];
        match decode(&raw) {
            Err(Error::MalformedShapefile(_)) => {}
            other => panic!("expected MalformedShapefile, got {:?}", other),
        }
    }

    #[test]
    fn test_read_line_bit_exact() {
        let points = [
            (0.1, -0.2),
            (-123.456789012345, 45.000000000001),
            (1e300, f64::MIN_POSITIVE),
            (-0.0, 7.5),
        ];
        let raw = shp(&[Shape::Polyline(&[0], &points)]);
        let geoms = decode(&raw).unwrap();
        assert_eq!(geoms.len(), 1);
        match &geoms[0] {
            Geometry::LineString(line) => {
                assert_eq!(line.points.len(), 4);
                for (p, (x, y)) in line.points().zip(points.iter()) {
                    assert_eq!(p.x.to_bits(), x.to_bits());
                    assert_eq!(p.y.to_bits(), y.to_bits());
                }
            }
            other => panic!("expected LineString, got {:?}", other),
        }
    }

    #[test]
    fn test_read_multiline() {
        let points = [(0., 0.), (1., 1.), (2., 2.), (10., 10.), (11., 11.)];
        let raw = shp(&[
            Shape::Polyline(&[0, 3], &points),
            Shape::Polyline(&[0], &points[..2]),
        ]);
        let geoms = decode(&raw).unwrap();
        assert_eq!(geoms.len(), 2);
        assert_eq!(geoms[0].type_name(), "MultiLineString");
        assert_eq!(
            coords(&geoms[0]),
            vec![vec![(0., 0.), (1., 1.), (2., 2.)], vec![(10., 10.), (11., 11.)]]
        );
        assert_eq!(geoms[0].num_points(), 5);
        assert_eq!(geoms[1].type_name(), "LineString");
        assert_eq!(coords(&geoms[1]), vec![vec![(0., 0.), (1., 1.)]]);
    }

    #[test]
    fn test_zero_parts() {
        let raw = shp(&[Shape::Polyline(&[], &[])]);
        let geoms = decode(&raw).unwrap();
        assert_eq!(geoms, vec![Geometry::MultiLineString(MultiLineString::default())]);
    }

    #[test]
    fn test_stop_at_unsupported() {
        let line = [(0., 0.), (1., 1.)];
        let raw = shp(&[
            Shape::Polyline(&[0], &line),
            Shape::Point(5., 5.),
            Shape::Polyline(&[0], &line),
        ]);
        assert_eq!(decode(&raw).unwrap().len(), 1);
    }

    #[test]
    fn test_skip_unsupported() {
        let line = [(0., 0.), (1., 1.)];
        let other = [(2., 2.), (3., 3.), (4., 4.)];
        let raw = shp(&[
            Shape::Polyline(&[0], &line),
            Shape::Point(5., 5.),
            Shape::Polyline(&[0], &other),
        ]);
        let geoms = ShapefileDecoder::new().skip_unsupported().decode(&raw).unwrap();
        assert_eq!(geoms.len(), 2);
        assert_eq!(coords(&geoms[1]), vec![vec![(2., 2.), (3., 3.), (4., 4.)]]);
    }

    #[test]
    fn test_skip_negative_content_length() {
        let line = [(0., 0.), (1., 1.)];
        let mut raw = shp(&[Shape::Polyline(&[0], &line), Shape::Point(5., 5.)]);
        let line_len = record_content(&Shape::Polyline(&[0], &line)).len();
        let point_at = HEADER_LEN + RECORD_HEADER_LEN + line_len;
        raw[point_at + 4..point_at + 8].copy_from_slice(&(-10i32).to_be_bytes());
        match ShapefileDecoder::new().skip_unsupported().decode(&raw) {
            Err(Error::MalformedShapefile(msg)) => assert!(msg.contains("-10"), "{}", msg),
            other => panic!("expected MalformedShapefile, got {:?}", other),
        }
        // stopping never reads the content length
        assert_eq!(decode(&raw).unwrap().len(), 1);
    }

    #[test]
    fn test_truncated_record() {
        let line = [(0., 0.), (1., 1.), (2., 2.)];
        let mut raw = shp(&[Shape::Polyline(&[0], &line)]);
        raw.truncate(raw.len() - 8);
        match decode(&raw) {
            Err(Error::MalformedShapefile(msg)) => assert!(msg.contains("3 points"), "{}", msg),
            other => panic!("expected MalformedShapefile, got {:?}", other),
        }
    }

    #[test]
    fn test_declared_length_past_buffer() {
        let mut raw = shp(&[]);
        // claim one more record than present
        raw[24..28].copy_from_slice(&60i32.to_be_bytes());
        assert!(matches!(decode(&raw), Err(Error::MalformedShapefile(_))));
    }

    #[test]
    fn test_bad_part_index() {
        let line = [(0., 0.), (1., 1.)];
        let raw = shp(&[Shape::Polyline(&[0, 5], &line)]);
        assert!(matches!(decode(&raw), Err(Error::MalformedShapefile(_))));
    }
}
