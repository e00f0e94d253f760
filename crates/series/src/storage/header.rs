//! File header encoding.
//!
//! ## Header Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  header_size: i32 (multiple of the item size)                │
//! │  format version: 4 x i32 (major, minor, build, revision)     │
//! │  type_name: string                                           │
//! │  page_size: i32                                              │
//! │  serializer_name: string                                     │
//! │  serializer version: 4 x i32                                 │
//! │  serializer section (item size, shape, block size ...)       │
//! │  index section (key name, uniqueness, field tree ...)        │
//! │  zero padding up to header_size                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Strings are an unsigned varint byte
//! length followed by UTF-8. Absent version components are stored as `-1`.

use crate::codec::varint;
use crate::error::{Result, SeriesError};
use std::fmt;

/// Current file format version.
pub const FORMAT_VERSION: Version = Version::new(1, 0);

/// Size of the leading `header_size` field.
pub const HEADER_SIZE_FIELD: usize = 4;

/// A `(major, minor[, build[, revision]])` version tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    /// Major component.
    pub major: i32,
    /// Minor component.
    pub minor: i32,
    /// Optional build component.
    pub build: Option<i32>,
    /// Optional revision component, only present with a build.
    pub revision: Option<i32>,
}

impl Version {
    /// Creates a two-component version.
    pub const fn new(major: i32, minor: i32) -> Self {
        Self {
            major,
            minor,
            build: None,
            revision: None,
        }
    }

    /// Adds a build component.
    pub const fn with_build(mut self, build: i32) -> Self {
        self.build = Some(build);
        self
    }

    /// Adds a revision component.
    pub const fn with_revision(mut self, revision: i32) -> Self {
        self.revision = Some(revision);
        self
    }

    /// Returns the number of present components (2, 3 or 4).
    pub fn components(&self) -> usize {
        match (self.build, self.revision) {
            (None, _) => 2,
            (Some(_), None) => 3,
            (Some(_), Some(_)) => 4,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if let Some(build) = self.build {
            write!(f, ".{build}")?;
            if let Some(revision) = self.revision {
                write!(f, ".{revision}")?;
            }
        }
        Ok(())
    }
}

/// Supported file format versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    /// Initial layout.
    V1_0,
}

impl FormatVersion {
    /// Maps a stored version to a supported format.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::UnsupportedVersion` for anything else.
    pub fn parse(version: Version) -> Result<Self> {
        match (version.major, version.minor) {
            (1, 0) => Ok(Self::V1_0),
            _ => Err(SeriesError::UnsupportedVersion(version)),
        }
    }
}

/// Parsed file header.
#[derive(Debug, Clone)]
pub struct FileHeader {
    /// Size of the header region in bytes.
    pub header_size: usize,
    /// File format version.
    pub version: Version,
    /// Logical record type name.
    pub type_name: String,
    /// Page size in bytes.
    pub page_size: usize,
    /// Item serializer type name.
    pub serializer_name: String,
    /// Item serializer version.
    pub serializer_version: Version,
    /// Bytes following the serializer section (index section plus padding).
    pub extra: Vec<u8>,
}

impl FileHeader {
    /// Returns a reader over the index section.
    pub fn extra_reader(&self) -> HeaderReader<'_> {
        HeaderReader::new(&self.extra)
    }
}

/// Little-endian header encoder.
#[derive(Debug, Default)]
pub struct HeaderWriter {
    buf: Vec<u8>,
}

impl HeaderWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Writes a boolean as one byte.
    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    /// Writes an `i32`.
    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a `u64`.
    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an `f64`.
    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) {
        let mut len = [0u8; varint::MAX_VARINT_LEN];
        let n = varint::encode_unsigned(&mut len, 0, value.len() as u64);
        self.buf.extend_from_slice(&len[..n]);
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Writes a version as four `i32`s.
    pub fn write_version(&mut self, version: Version) {
        self.write_i32(version.major);
        self.write_i32(version.minor);
        self.write_i32(version.build.unwrap_or(-1));
        self.write_i32(version.revision.unwrap_or(-1));
    }

    /// Overwrites an `i32` written earlier at `offset`.
    pub(crate) fn patch_i32(&mut self, offset: usize, value: i32) {
        self.buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Pads with zeros up to `len` bytes.
    pub(crate) fn pad_to(&mut self, len: usize) {
        if self.buf.len() < len {
            self.buf.resize(len, 0);
        }
    }

    /// Returns the number of bytes written.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true when nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consumes the writer, returning the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Little-endian header decoder.
#[derive(Debug, Clone)]
pub struct HeaderReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> HeaderReader<'a> {
    /// Creates a reader over `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Returns the current read position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the unread bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.saturating_add(len);
        let bytes = self.buf.get(self.pos..end).ok_or_else(|| {
            SeriesError::Corruption(format!(
                "header truncated: {len} bytes needed at offset {}",
                self.pos
            ))
        })?;
        self.pos += len;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a boolean.
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(SeriesError::Corruption(format!(
                "invalid boolean byte {other:#04x} in header"
            ))),
        }
    }

    /// Reads an `i32`.
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    /// Reads a `u64`.
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    /// Reads an `f64`.
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take_array()?))
    }

    /// Reads `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let len = varint::decode_unsigned(self.buf, &mut self.pos)
            .map_err(|e| SeriesError::Corruption(format!("bad string length in header: {e}")))?;
        let len = usize::try_from(len)
            .map_err(|_| SeriesError::Corruption(format!("string length {len} in header")))?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| SeriesError::Corruption(format!("invalid UTF-8 in header: {e}")))
    }

    /// Reads a version written by [`HeaderWriter::write_version`].
    pub fn read_version(&mut self) -> Result<Version> {
        let major = self.read_i32()?;
        let minor = self.read_i32()?;
        let build = self.read_i32()?;
        let revision = self.read_i32()?;
        if major < 0 || minor < 0 || build < -1 || revision < -1 || (build == -1 && revision != -1)
        {
            return Err(SeriesError::Corruption(format!(
                "invalid version {major}.{minor}.{build}.{revision} in header"
            )));
        }
        let mut version = Version::new(major, minor);
        if build >= 0 {
            version = version.with_build(build);
        }
        if revision >= 0 {
            version = version.with_revision(revision);
        }
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_roundtrip() {
        let mut writer = HeaderWriter::new();
        writer.write_i32(-7);
        writer.write_string("demo.Tick");
        writer.write_u64(u64::MAX);
        writer.write_f64(0.25);
        writer.write_bool(true);
        let bytes = writer.into_bytes();

        let mut reader = HeaderReader::new(&bytes);
        assert_eq!(reader.read_i32().unwrap(), -7);
        assert_eq!(reader.read_string().unwrap(), "demo.Tick");
        assert_eq!(reader.read_u64().unwrap(), u64::MAX);
        assert_eq!(reader.read_f64().unwrap(), 0.25);
        assert!(reader.read_bool().unwrap());
        assert!(reader.remaining().is_empty());
    }

    #[test]
    fn test_version_components() {
        for version in [
            Version::new(1, 0),
            Version::new(1, 2).with_build(3),
            Version::new(4, 5).with_build(6).with_revision(7),
        ] {
            let mut writer = HeaderWriter::new();
            writer.write_version(version);
            let bytes = writer.into_bytes();
            assert_eq!(bytes.len(), 16);
            let parsed = HeaderReader::new(&bytes).read_version().unwrap();
            assert_eq!(parsed, version);
        }
        assert_eq!(Version::new(1, 2).with_build(3).components(), 3);
        assert_eq!(Version::new(1, 2).with_build(3).to_string(), "1.2.3");
    }

    #[test]
    fn test_revision_without_build_rejected() {
        let mut writer = HeaderWriter::new();
        writer.write_i32(1);
        writer.write_i32(0);
        writer.write_i32(-1);
        writer.write_i32(5);
        let bytes = writer.into_bytes();
        assert!(matches!(
            HeaderReader::new(&bytes).read_version(),
            Err(SeriesError::Corruption(_))
        ));
    }

    #[test]
    fn test_truncated_header() {
        let bytes = [1u8, 0];
        assert!(matches!(
            HeaderReader::new(&bytes).read_i32(),
            Err(SeriesError::Corruption(_))
        ));
    }

    #[test]
    fn test_unknown_format_version() {
        assert_eq!(FormatVersion::parse(Version::new(1, 0)).unwrap(), FormatVersion::V1_0);
        assert!(matches!(
            FormatVersion::parse(Version::new(2, 0)),
            Err(SeriesError::UnsupportedVersion(_))
        ));
    }
}
