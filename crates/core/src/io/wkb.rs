//! Well-known-binary geometry codec.
//!
//! Little-endian WKB for the two geometry types the pipeline persists:
//! Point (type 1) and LineString (type 2). Nothing else is accepted.

use byteorder::{LittleEndian, ReadBytesExt};
use geo::{Coord, LineString, Point};
use std::io::Cursor;

use crate::error::{Error, Result};

const BYTE_ORDER_LE: u8 = 1;
const WKB_POINT: u32 = 1;
const WKB_LINESTRING: u32 = 2;

/// Encode a polyline as little-endian WKB.
pub fn encode_linestring(line: &LineString<f64>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9 + 16 * line.0.len());
    buf.push(BYTE_ORDER_LE);
    buf.extend_from_slice(&WKB_LINESTRING.to_le_bytes());
    buf.extend_from_slice(&(line.0.len() as u32).to_le_bytes());
    for coord in &line.0 {
        buf.extend_from_slice(&coord.x.to_le_bytes());
        buf.extend_from_slice(&coord.y.to_le_bytes());
    }
    buf
}

/// Decode a little-endian WKB LineString.
pub fn decode_linestring(buf: &[u8]) -> Result<LineString<f64>> {
    let mut cursor = Cursor::new(buf);
    expect_header(&mut cursor, WKB_LINESTRING)?;
    let n = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| Error::Wkb("truncated point count".into()))? as usize;
    let mut coords = Vec::with_capacity(n);
    for _ in 0..n {
        let x = cursor
            .read_f64::<LittleEndian>()
            .map_err(|_| Error::Wkb("truncated coordinate".into()))?;
        let y = cursor
            .read_f64::<LittleEndian>()
            .map_err(|_| Error::Wkb("truncated coordinate".into()))?;
        coords.push(Coord { x, y });
    }
    Ok(LineString::new(coords))
}

/// Encode a point as little-endian WKB.
pub fn encode_point(point: &Point<f64>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(21);
    buf.push(BYTE_ORDER_LE);
    buf.extend_from_slice(&WKB_POINT.to_le_bytes());
    buf.extend_from_slice(&point.x().to_le_bytes());
    buf.extend_from_slice(&point.y().to_le_bytes());
    buf
}

/// Decode a little-endian WKB Point.
pub fn decode_point(buf: &[u8]) -> Result<Point<f64>> {
    let mut cursor = Cursor::new(buf);
    expect_header(&mut cursor, WKB_POINT)?;
    let x = cursor
        .read_f64::<LittleEndian>()
        .map_err(|_| Error::Wkb("truncated coordinate".into()))?;
    let y = cursor
        .read_f64::<LittleEndian>()
        .map_err(|_| Error::Wkb("truncated coordinate".into()))?;
    Ok(Point::new(x, y))
}

fn expect_header(cursor: &mut Cursor<&[u8]>, wkb_type: u32) -> Result<()> {
    let order = cursor
        .read_u8()
        .map_err(|_| Error::Wkb("empty buffer".into()))?;
    if order != BYTE_ORDER_LE {
        return Err(Error::Wkb(format!("unsupported byte order {}", order)));
    }
    let actual = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| Error::Wkb("truncated geometry type".into()))?;
    if actual != wkb_type {
        return Err(Error::Wkb(format!(
            "expected geometry type {}, found {}",
            wkb_type, actual
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linestring_roundtrip() {
        let line = LineString::from(vec![(0.0, 0.0), (10.5, -3.25), (100.0, 42.0)]);
        let decoded = decode_linestring(&encode_linestring(&line)).unwrap();
        assert_eq!(decoded, line);
    }

    #[test]
    fn test_point_roundtrip() {
        let p = Point::new(1234.5, -9876.25);
        assert_eq!(decode_point(&encode_point(&p)).unwrap(), p);
    }

    #[test]
    fn test_known_point_bytes() {
        // WKB for POINT(1 2), little-endian
        let buf = encode_point(&Point::new(1.0, 2.0));
        assert_eq!(buf[0], 1);
        assert_eq!(&buf[1..5], &[1, 0, 0, 0]);
        assert_eq!(buf.len(), 21);
    }

    #[test]
    fn test_rejects_wrong_type() {
        let buf = encode_point(&Point::new(0.0, 0.0));
        assert!(matches!(decode_linestring(&buf), Err(Error::Wkb(_))));
    }

    #[test]
    fn test_rejects_truncated() {
        let mut buf = encode_linestring(&LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]));
        buf.truncate(buf.len() - 4);
        assert!(matches!(decode_linestring(&buf), Err(Error::Wkb(_))));
    }

    #[test]
    fn test_rejects_big_endian() {
        let mut buf = encode_point(&Point::new(0.0, 0.0));
        buf[0] = 0;
        assert!(matches!(decode_point(&buf), Err(Error::Wkb(_))));
    }
}
