//! Fixed-size item serializers.
//!
//! The paged engine moves items of one fixed size. An [`ItemSerializer`]
//! converts between an item and its slot bytes and records its own
//! configuration in the file header, so a file can be reopened and checked
//! against the caller's expectations.

use crate::error::{Result, SeriesError};
use crate::field::{Record, Shape, Value, ValueKind};
use crate::storage::{HeaderReader, HeaderWriter, Version};
use std::marker::PhantomData;

/// Converts items to and from fixed-size slots.
pub trait ItemSerializer: Sized {
    /// Item type moved by the engine.
    type Item;

    /// Serializer name recorded in the file header.
    const TYPE_NAME: &'static str;

    /// Version of the serializer's header section.
    const VERSION: Version;

    /// Returns the slot size in bytes.
    fn item_size(&self) -> usize;

    /// Returns true when items may be transferred through mapped views.
    fn supports_mapping(&self) -> bool {
        true
    }

    /// Writes the serializer configuration into the header.
    fn write_header(&self, writer: &mut HeaderWriter);

    /// Rebuilds the serializer from a header section written by `version`.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::UnsupportedVersion` for unknown versions and
    /// `SeriesError::TypeMismatch` when the stored configuration does not
    /// match this serializer.
    fn read_header(reader: &mut HeaderReader<'_>, version: Version) -> Result<Self>;

    /// Encodes `item` into `out`, which is exactly one slot long.
    fn encode(&self, item: &Self::Item, out: &mut [u8]) -> Result<()>;

    /// Decodes one slot.
    fn decode(&self, bytes: &[u8]) -> Result<Self::Item>;
}

fn check_version(version: Version) -> Result<()> {
    match (version.major, version.minor) {
        (1, 0) => Ok(()),
        _ => Err(SeriesError::UnsupportedVersion(version)),
    }
}

fn read_size(reader: &mut HeaderReader<'_>, what: &str) -> Result<usize> {
    let size = reader.read_i32()?;
    usize::try_from(size)
        .ok()
        .filter(|&s| s > 0)
        .ok_or_else(|| SeriesError::Corruption(format!("invalid {what} {size} in header")))
}

const STRUCT_SHAPE_TAG: u8 = 0xff;

pub(crate) fn write_shape(writer: &mut HeaderWriter, shape: &Shape) {
    match shape {
        Shape::Scalar(kind) => writer.write_u8(*kind as u8),
        Shape::Struct(fields) => {
            writer.write_u8(STRUCT_SHAPE_TAG);
            writer.write_i32(fields.len() as i32);
            for (name, sub) in fields {
                writer.write_string(name);
                write_shape(writer, sub);
            }
        }
    }
}

pub(crate) fn read_shape(reader: &mut HeaderReader<'_>) -> Result<Shape> {
    let tag = reader.read_u8()?;
    if tag != STRUCT_SHAPE_TAG {
        return ValueKind::from_u8(tag)
            .map(Shape::Scalar)
            .ok_or_else(|| SeriesError::Corruption(format!("unknown value kind {tag} in shape")));
    }
    let count = reader.read_i32()?;
    if count < 0 {
        return Err(SeriesError::Corruption(format!(
            "negative field count {count} in shape"
        )));
    }
    let mut fields = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = reader.read_string()?;
        fields.push((name, read_shape(reader)?));
    }
    Ok(Shape::Struct(fields))
}

/// Stores records in their native little-endian layout.
#[derive(Debug)]
pub struct FixedSerializer<T: Record> {
    shape: Shape,
    item_size: usize,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Clone for FixedSerializer<T> {
    fn clone(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            item_size: self.item_size,
            _record: PhantomData,
        }
    }
}

impl<T: Record> Default for FixedSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> FixedSerializer<T> {
    /// Creates a serializer for `T`.
    pub fn new() -> Self {
        let shape = T::shape();
        Self {
            item_size: shape.byte_size(),
            shape,
            _record: PhantomData,
        }
    }
}

impl<T: Record> ItemSerializer for FixedSerializer<T> {
    type Item = T;

    const TYPE_NAME: &'static str = "fixed";
    const VERSION: Version = Version::new(1, 0);

    fn item_size(&self) -> usize {
        self.item_size
    }

    fn write_header(&self, writer: &mut HeaderWriter) {
        writer.write_i32(self.item_size as i32);
        write_shape(writer, &self.shape);
    }

    fn read_header(reader: &mut HeaderReader<'_>, version: Version) -> Result<Self> {
        check_version(version)?;
        let item_size = read_size(reader, "item size")?;
        let stored = read_shape(reader)?;
        let expected = Self::new();
        if stored != expected.shape || item_size != expected.item_size {
            return Err(SeriesError::TypeMismatch {
                expected: format!("{} {:?}", T::type_name(), expected.shape),
                found: format!("{stored:?} ({item_size} bytes)"),
            });
        }
        Ok(expected)
    }

    fn encode(&self, item: &T, out: &mut [u8]) -> Result<()> {
        let value = item.to_value();
        if !value.matches(&self.shape) {
            return Err(SeriesError::Serializer(format!(
                "{} produced a value that does not match its shape",
                T::type_name()
            )));
        }
        value.write_le(out)?;
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        let (value, _) = Value::read_le(&self.shape, bytes)?;
        T::from_value(value)
    }
}

/// Stores opaque codec blocks of a fixed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSerializer {
    block_size: usize,
}

impl BlockSerializer {
    /// Creates a serializer for blocks of `block_size` bytes.
    pub fn new(block_size: usize) -> Self {
        Self { block_size }
    }

    /// Returns the block size.
    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

impl ItemSerializer for BlockSerializer {
    type Item = Vec<u8>;

    const TYPE_NAME: &'static str = "block";
    const VERSION: Version = Version::new(1, 0);

    fn item_size(&self) -> usize {
        self.block_size
    }

    fn write_header(&self, writer: &mut HeaderWriter) {
        writer.write_i32(self.block_size as i32);
    }

    fn read_header(reader: &mut HeaderReader<'_>, version: Version) -> Result<Self> {
        check_version(version)?;
        Ok(Self::new(read_size(reader, "block size")?))
    }

    fn encode(&self, item: &Vec<u8>, out: &mut [u8]) -> Result<()> {
        if item.len() > out.len() {
            return Err(SeriesError::Serializer(format!(
                "block of {} bytes exceeds the slot size {}",
                item.len(),
                out.len()
            )));
        }
        out[..item.len()].copy_from_slice(item);
        out[item.len()..].fill(0);
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_header_roundtrip() {
        let serializer = FixedSerializer::<i64>::new();
        assert_eq!(serializer.item_size(), 8);
        let mut writer = HeaderWriter::new();
        serializer.write_header(&mut writer);
        let bytes = writer.into_bytes();
        let reopened =
            FixedSerializer::<i64>::read_header(&mut HeaderReader::new(&bytes), Version::new(1, 0))
                .unwrap();
        assert_eq!(reopened.item_size(), 8);

        assert!(matches!(
            FixedSerializer::<u64>::read_header(&mut HeaderReader::new(&bytes), Version::new(1, 0)),
            Err(SeriesError::TypeMismatch { .. })
        ));
        assert!(matches!(
            FixedSerializer::<i64>::read_header(&mut HeaderReader::new(&bytes), Version::new(2, 0)),
            Err(SeriesError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_fixed_encode_decode() {
        let serializer = FixedSerializer::<f64>::new();
        let mut slot = [0u8; 8];
        serializer.encode(&-2.5, &mut slot).unwrap();
        assert_eq!(slot, (-2.5f64).to_le_bytes());
        assert_eq!(serializer.decode(&slot).unwrap(), -2.5);
    }

    #[test]
    fn test_block_encode_pads_slot() {
        let serializer = BlockSerializer::new(8);
        let mut slot = [0xaau8; 8];
        serializer.encode(&vec![1, 2, 3], &mut slot).unwrap();
        assert_eq!(slot, [1, 2, 3, 0, 0, 0, 0, 0]);
        assert!(serializer.encode(&vec![0; 9], &mut slot).is_err());
    }

    #[test]
    fn test_shape_roundtrip() {
        let shape = Shape::structure([
            ("a", Shape::Scalar(ValueKind::Bool)),
            ("b", Shape::structure([("c", Shape::Scalar(ValueKind::F32))])),
        ]);
        let mut writer = HeaderWriter::new();
        write_shape(&mut writer, &shape);
        let bytes = writer.into_bytes();
        assert_eq!(read_shape(&mut HeaderReader::new(&bytes)).unwrap(), shape);
    }
}
