//! Self-describing columnar binary tables.
//!
//! The pipeline's intermediate format: whole-table load/store, one data
//! block per column, optional DEFLATE compression per block. Layout:
//!
//! ```text
//! magic "SNTB" | version u16 | header_len u32 | header JSON | blocks...
//! ```
//!
//! The JSON header carries the row count, an optional CRS tag, and per
//! column the name, type, raw and stored block sizes, and a compression
//! flag — enough to read the file with no out-of-band knowledge.
//! Writes go through a sibling temp file and a rename, so a crashed run
//! never leaves a half-written table behind.

use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::crs::Crs;
use crate::error::{Error, Result};

const MAGIC: &[u8; 4] = b"SNTB";
const VERSION: u16 = 1;

/// Blocks smaller than this are stored raw even when compression is on.
#[cfg(feature = "deflate")]
const COMPRESSION_THRESHOLD: usize = 512;

/// Column element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    U64,
    F64,
    U8,
    Bool,
    Str,
    Bin,
}

/// A typed column of values.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    U64(Vec<u64>),
    F64(Vec<f64>),
    U8(Vec<u8>),
    Bool(Vec<bool>),
    Str(Vec<String>),
    Bin(Vec<Vec<u8>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::U64(v) => v.len(),
            Column::F64(v) => v.len(),
            Column::U8(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::Str(v) => v.len(),
            Column::Bin(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Column::U64(_) => ColumnType::U64,
            Column::F64(_) => ColumnType::F64,
            Column::U8(_) => ColumnType::U8,
            Column::Bool(_) => ColumnType::Bool,
            Column::Str(_) => ColumnType::Str,
            Column::Bin(_) => ColumnType::Bin,
        }
    }

    pub fn as_u64(&self) -> Option<&[u64]> {
        match self {
            Column::U64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            Column::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<&[u8]> {
        match self {
            Column::U8(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<&[bool]> {
        match self {
            Column::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&[String]> {
        match self {
            Column::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bin(&self) -> Option<&[Vec<u8>]> {
        match self {
            Column::Bin(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ColumnMeta {
    name: String,
    dtype: ColumnType,
    raw_len: u64,
    stored_len: u64,
    compressed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    rows: u64,
    crs: Option<Crs>,
    columns: Vec<ColumnMeta>,
}

/// An ordered collection of equal-length named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    rows: usize,
    crs: Option<Crs>,
    columns: Vec<(String, Column)>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_crs(crs: Crs) -> Self {
        Self {
            crs: Some(crs),
            ..Self::default()
        }
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    pub fn n_rows(&self) -> usize {
        self.rows
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Append a column. The first column fixes the row count; later
    /// columns must match it, and names must be unique.
    pub fn push_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if self.columns.iter().any(|(n, _)| *n == name) {
            return Err(Error::Table(format!("duplicate column \"{}\"", name)));
        }
        if self.columns.is_empty() {
            self.rows = column.len();
        } else if column.len() != self.rows {
            return Err(Error::Table(format!(
                "column \"{}\" has {} rows, table has {}",
                name,
                column.len(),
                self.rows
            )));
        }
        self.columns.push((name, column));
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    /// Columns in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(n, c)| (n.as_str(), c))
    }

    /// Write the table. The data lands under `path` atomically: it is
    /// staged to a sibling temp file and renamed into place.
    pub fn write(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("snt.tmp");
        let mut metas = Vec::with_capacity(self.columns.len());
        let mut blocks = Vec::with_capacity(self.columns.len());
        for (name, column) in &self.columns {
            let raw = encode_column(column);
            let raw_len = raw.len() as u64;
            let (stored, compressed) = maybe_compress(raw);
            metas.push(ColumnMeta {
                name: name.clone(),
                dtype: column.column_type(),
                raw_len,
                stored_len: stored.len() as u64,
                compressed,
            });
            blocks.push(stored);
        }

        let header = Header {
            rows: self.rows as u64,
            crs: self.crs.clone(),
            columns: metas,
        };
        let header_json = serde_json::to_vec(&header)?;

        let mut writer = BufWriter::new(File::create(&tmp)?);
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&(header_json.len() as u32).to_le_bytes())?;
        writer.write_all(&header_json)?;
        for block in &blocks {
            writer.write_all(block)?;
        }
        writer.flush()?;
        drop(writer);
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Load a table written by [`Table::write`].
    pub fn read(path: &Path) -> Result<Table> {
        let mut reader = BufReader::new(File::open(path)?);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::Table("bad magic".into()));
        }
        let version = reader.read_u16::<LittleEndian>()?;
        if version != VERSION {
            return Err(Error::Table(format!("unsupported version {}", version)));
        }
        let header_len = reader.read_u32::<LittleEndian>()? as usize;
        let mut header_json = vec![0u8; header_len];
        reader.read_exact(&mut header_json)?;
        let header: Header = serde_json::from_slice(&header_json)?;

        let rows = header.rows as usize;
        let mut table = Table {
            rows,
            crs: header.crs.clone(),
            columns: Vec::with_capacity(header.columns.len()),
        };
        for meta in &header.columns {
            let mut stored = vec![0u8; meta.stored_len as usize];
            reader.read_exact(&mut stored)?;
            let raw = maybe_decompress(stored, meta.compressed, meta.raw_len as usize)?;
            let column = decode_column(meta.dtype, rows, &raw)?;
            table.columns.push((meta.name.clone(), column));
        }
        Ok(table)
    }
}

fn encoded_len(column: &Column) -> usize {
    match column {
        Column::U64(v) => 8 * v.len(),
        Column::F64(v) => 8 * v.len(),
        Column::U8(v) => v.len(),
        Column::Bool(v) => v.len(),
        Column::Str(v) => v.iter().map(|s| 4 + s.len()).sum(),
        Column::Bin(v) => v.iter().map(|b| 4 + b.len()).sum(),
    }
}

fn encode_column(column: &Column) -> Vec<u8> {
    let mut buf = Vec::with_capacity(encoded_len(column));
    match column {
        Column::U64(values) => {
            for v in values {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
        Column::F64(values) => {
            for v in values {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
        Column::U8(values) => buf.extend_from_slice(values),
        Column::Bool(values) => buf.extend(values.iter().map(|&b| b as u8)),
        Column::Str(values) => {
            for s in values {
                buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
        }
        Column::Bin(values) => {
            for b in values {
                buf.extend_from_slice(&(b.len() as u32).to_le_bytes());
                buf.extend_from_slice(b);
            }
        }
    }
    buf
}

fn decode_column(dtype: ColumnType, rows: usize, buf: &[u8]) -> Result<Column> {
    let mut cursor = std::io::Cursor::new(buf);
    let column = match dtype {
        ColumnType::U64 => {
            let mut values = Vec::with_capacity(rows);
            for _ in 0..rows {
                values.push(cursor.read_u64::<LittleEndian>().map_err(truncated)?);
            }
            Column::U64(values)
        }
        ColumnType::F64 => {
            let mut values = Vec::with_capacity(rows);
            for _ in 0..rows {
                values.push(cursor.read_f64::<LittleEndian>().map_err(truncated)?);
            }
            Column::F64(values)
        }
        ColumnType::U8 => {
            let mut values = vec![0u8; rows];
            cursor.read_exact(&mut values).map_err(truncated)?;
            Column::U8(values)
        }
        ColumnType::Bool => {
            let mut raw = vec![0u8; rows];
            cursor.read_exact(&mut raw).map_err(truncated)?;
            let mut values = Vec::with_capacity(rows);
            for byte in raw {
                match byte {
                    0 => values.push(false),
                    1 => values.push(true),
                    other => {
                        return Err(Error::Table(format!("invalid bool byte {}", other)));
                    }
                }
            }
            Column::Bool(values)
        }
        ColumnType::Str => {
            let mut values = Vec::with_capacity(rows);
            for _ in 0..rows {
                let len = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
                let mut bytes = vec![0u8; len];
                cursor.read_exact(&mut bytes).map_err(truncated)?;
                let s = String::from_utf8(bytes)
                    .map_err(|_| Error::Table("invalid UTF-8 in string column".into()))?;
                values.push(s);
            }
            Column::Str(values)
        }
        ColumnType::Bin => {
            let mut values = Vec::with_capacity(rows);
            for _ in 0..rows {
                let len = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
                let mut bytes = vec![0u8; len];
                cursor.read_exact(&mut bytes).map_err(truncated)?;
                values.push(bytes);
            }
            Column::Bin(values)
        }
    };
    if cursor.position() as usize != buf.len() {
        return Err(Error::Table("trailing bytes in column block".into()));
    }
    Ok(column)
}

fn truncated(_: std::io::Error) -> Error {
    Error::Table("truncated column block".into())
}

#[cfg(feature = "deflate")]
fn maybe_compress(raw: Vec<u8>) -> (Vec<u8>, bool) {
    if raw.len() < COMPRESSION_THRESHOLD {
        return (raw, false);
    }
    let mut encoder = flate2::write::ZlibEncoder::new(
        Vec::with_capacity(raw.len() / 2),
        flate2::Compression::default(),
    );
    // Vec sink; write cannot fail, fall back to raw if it somehow does
    if encoder.write_all(&raw).is_err() {
        return (raw, false);
    }
    match encoder.finish() {
        Ok(compressed) if compressed.len() < raw.len() => (compressed, true),
        _ => (raw, false),
    }
}

#[cfg(not(feature = "deflate"))]
fn maybe_compress(raw: Vec<u8>) -> (Vec<u8>, bool) {
    (raw, false)
}

fn maybe_decompress(stored: Vec<u8>, compressed: bool, raw_len: usize) -> Result<Vec<u8>> {
    if !compressed {
        return Ok(stored);
    }
    #[cfg(feature = "deflate")]
    {
        let mut decoder = flate2::read::ZlibDecoder::new(stored.as_slice());
        let mut raw = Vec::with_capacity(raw_len);
        decoder
            .read_to_end(&mut raw)
            .map_err(|e| Error::Table(format!("DEFLATE: {}", e)))?;
        if raw.len() != raw_len {
            return Err(Error::Table("decompressed size mismatch".into()));
        }
        Ok(raw)
    }
    #[cfg(not(feature = "deflate"))]
    {
        let _ = raw_len;
        Err(Error::Table(
            "table has compressed columns; enable the deflate feature".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Table {
        let mut table = Table::with_crs(Crs::Epsg(5070));
        table
            .push_column("id", Column::U64(vec![1, 2, 3]))
            .unwrap();
        table
            .push_column("length", Column::F64(vec![10.5, 0.25, 99.0]))
            .unwrap();
        table
            .push_column("loop", Column::Bool(vec![false, true, false]))
            .unwrap();
        table
            .push_column(
                "name",
                Column::Str(vec!["Clinch River".into(), "".into(), "Powell River".into()]),
            )
            .unwrap();
        table
            .push_column(
                "geometry",
                Column::Bin(vec![vec![1, 2, 3], vec![], vec![255; 700]]),
            )
            .unwrap();
        table
    }

    #[test]
    fn test_row_count_enforced() {
        let mut table = Table::new();
        table.push_column("a", Column::U64(vec![1, 2])).unwrap();
        assert!(matches!(
            table.push_column("b", Column::U64(vec![1])),
            Err(Error::Table(_))
        ));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let mut table = Table::new();
        table.push_column("a", Column::U64(vec![1])).unwrap();
        assert!(matches!(
            table.push_column("a", Column::U64(vec![2])),
            Err(Error::Table(_))
        ));
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowlines.snt");
        let table = sample_table();
        table.write(&path).unwrap();
        let loaded = Table::read(&path).unwrap();
        assert_eq!(loaded, table);
        assert_eq!(loaded.crs(), Some(&Crs::Epsg(5070)));
    }

    #[test]
    fn test_roundtrip_large_compressible_column() {
        // Big enough to cross the compression threshold
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.snt");
        let mut table = Table::new();
        table
            .push_column("v", Column::U64((0..10_000).map(|i| i % 7).collect()))
            .unwrap();
        table.write(&path).unwrap();
        assert_eq!(Table::read(&path).unwrap(), table);
    }

    #[test]
    fn test_empty_table_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.snt");
        let table = Table::new();
        table.write(&path).unwrap();
        let loaded = Table::read(&path).unwrap();
        assert_eq!(loaded.n_rows(), 0);
        assert_eq!(loaded.n_columns(), 0);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.snt");
        std::fs::write(&path, b"NOPEnope").unwrap();
        assert!(matches!(Table::read(&path), Err(Error::Table(_))));
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.snt");
        sample_table().write(&path).unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("t.snt")]);
    }
}
