//! Record shapes and dynamic values.
//!
//! A [`Record`] declares its [`Shape`] (scalar kinds and named nested
//! structs) and converts itself to and from a [`Value`] tree. Field codecs
//! and the fixed-size item serializer only ever see `Value`s, so no runtime
//! reflection is needed to compile a codec for a record type.

use crate::error::{Result, SeriesError};

/// Scalar kinds a record field may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueKind {
    /// `bool`, stored as one byte.
    Bool = 0,
    /// `u8`
    U8 = 1,
    /// `i8`
    I8 = 2,
    /// `i16`
    I16 = 3,
    /// `u16`
    U16 = 4,
    /// `i32`
    I32 = 5,
    /// `u32`
    U32 = 6,
    /// `i64`
    I64 = 7,
    /// `u64`
    U64 = 8,
    /// `f32`
    F32 = 9,
    /// `f64`
    F64 = 10,
}

impl ValueKind {
    /// Creates a ValueKind from a u8 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Bool),
            1 => Some(Self::U8),
            2 => Some(Self::I8),
            3 => Some(Self::I16),
            4 => Some(Self::U16),
            5 => Some(Self::I32),
            6 => Some(Self::U32),
            7 => Some(Self::I64),
            8 => Some(Self::U64),
            9 => Some(Self::F32),
            10 => Some(Self::F64),
            _ => None,
        }
    }

    /// Returns the Rust name of the kind.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    /// Returns the native size of the kind in bytes.
    pub fn byte_size(self) -> usize {
        match self {
            Self::Bool | Self::U8 | Self::I8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    /// Returns true for one-byte kinds.
    pub fn is_byte_sized(self) -> bool {
        self.byte_size() == 1
    }

    /// Returns true for floating point kinds.
    pub fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Returns true for integer kinds (`bool` excluded).
    pub fn is_integer(self) -> bool {
        !self.is_float() && self != Self::Bool
    }

    /// Returns the inclusive range of an integer kind.
    pub(crate) fn int_range(self) -> Option<(i128, i128)> {
        let range = match self {
            Self::U8 => (0, u8::MAX as i128),
            Self::I8 => (i8::MIN as i128, i8::MAX as i128),
            Self::I16 => (i16::MIN as i128, i16::MAX as i128),
            Self::U16 => (0, u16::MAX as i128),
            Self::I32 => (i32::MIN as i128, i32::MAX as i128),
            Self::U32 => (0, u32::MAX as i128),
            Self::I64 => (i64::MIN as i128, i64::MAX as i128),
            Self::U64 => (0, u64::MAX as i128),
            _ => return None,
        };
        Some(range)
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A dynamically typed record value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `bool`
    Bool(bool),
    /// `u8`
    U8(u8),
    /// `i8`
    I8(i8),
    /// `i16`
    I16(i16),
    /// `u16`
    U16(u16),
    /// `i32`
    I32(i32),
    /// `u32`
    U32(u32),
    /// `i64`
    I64(i64),
    /// `u64`
    U64(u64),
    /// `f32`
    F32(f32),
    /// `f64`
    F64(f64),
    /// Nested struct, fields in declaration order.
    Struct(Vec<Value>),
}

impl Value {
    /// Returns the scalar kind, or `None` for structs.
    pub fn kind(&self) -> Option<ValueKind> {
        let kind = match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::U8(_) => ValueKind::U8,
            Self::I8(_) => ValueKind::I8,
            Self::I16(_) => ValueKind::I16,
            Self::U16(_) => ValueKind::U16,
            Self::I32(_) => ValueKind::I32,
            Self::U32(_) => ValueKind::U32,
            Self::I64(_) => ValueKind::I64,
            Self::U64(_) => ValueKind::U64,
            Self::F32(_) => ValueKind::F32,
            Self::F64(_) => ValueKind::F64,
            Self::Struct(_) => return None,
        };
        Some(kind)
    }

    /// Returns the default (zero) value of a kind.
    pub fn zero(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Bool => Self::Bool(false),
            ValueKind::U8 => Self::U8(0),
            ValueKind::I8 => Self::I8(0),
            ValueKind::I16 => Self::I16(0),
            ValueKind::U16 => Self::U16(0),
            ValueKind::I32 => Self::I32(0),
            ValueKind::U32 => Self::U32(0),
            ValueKind::I64 => Self::I64(0),
            ValueKind::U64 => Self::U64(0),
            ValueKind::F32 => Self::F32(0.0),
            ValueKind::F64 => Self::F64(0.0),
        }
    }

    /// Widens an integer value to `i128`.
    pub(crate) fn to_i128(&self) -> Option<i128> {
        let value = match *self {
            Self::U8(v) => v as i128,
            Self::I8(v) => v as i128,
            Self::I16(v) => v as i128,
            Self::U16(v) => v as i128,
            Self::I32(v) => v as i128,
            Self::U32(v) => v as i128,
            Self::I64(v) => v as i128,
            Self::U64(v) => v as i128,
            _ => return None,
        };
        Some(value)
    }

    /// Narrows `value` to an integer kind.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Overflow` when `value` is outside the kind's range.
    pub(crate) fn from_i128(kind: ValueKind, value: i128) -> Result<Self> {
        let (min, max) = kind.int_range().ok_or_else(|| {
            SeriesError::Serializer(format!("{kind} is not an integer kind"))
        })?;
        if value < min || value > max {
            return Err(SeriesError::Overflow(format!(
                "value {value} does not fit into {kind}"
            )));
        }
        let narrowed = match kind {
            ValueKind::U8 => Self::U8(value as u8),
            ValueKind::I8 => Self::I8(value as i8),
            ValueKind::I16 => Self::I16(value as i16),
            ValueKind::U16 => Self::U16(value as u16),
            ValueKind::I32 => Self::I32(value as i32),
            ValueKind::U32 => Self::U32(value as u32),
            ValueKind::I64 => Self::I64(value as i64),
            ValueKind::U64 => Self::U64(value as u64),
            _ => unreachable!("int_range only covers integer kinds"),
        };
        Ok(narrowed)
    }

    /// Widens a float value to `f64`.
    pub(crate) fn to_f64(&self) -> Option<f64> {
        match *self {
            Self::F32(v) => Some(v as f64),
            Self::F64(v) => Some(v),
            _ => None,
        }
    }

    /// Converts a struct value into a field cursor.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Serializer` for scalar values.
    pub fn into_fields(self) -> Result<Fields> {
        match self {
            Self::Struct(values) => Ok(Fields {
                values: values.into_iter(),
            }),
            other => Err(SeriesError::Serializer(format!(
                "expected a struct value, got {other:?}"
            ))),
        }
    }

    /// Writes the value in its native little-endian layout.
    pub(crate) fn write_le(&self, out: &mut [u8]) -> Result<usize> {
        fn put(out: &mut [u8], bytes: &[u8]) -> Result<usize> {
            let left = out.len();
            let slot = out.get_mut(..bytes.len()).ok_or_else(|| {
                SeriesError::Serializer(format!(
                    "record buffer too small ({} bytes left, {} needed)",
                    left,
                    bytes.len()
                ))
            })?;
            slot.copy_from_slice(bytes);
            Ok(bytes.len())
        }

        match self {
            Self::Bool(v) => put(out, &[*v as u8]),
            Self::U8(v) => put(out, &[*v]),
            Self::I8(v) => put(out, &v.to_le_bytes()),
            Self::I16(v) => put(out, &v.to_le_bytes()),
            Self::U16(v) => put(out, &v.to_le_bytes()),
            Self::I32(v) => put(out, &v.to_le_bytes()),
            Self::U32(v) => put(out, &v.to_le_bytes()),
            Self::I64(v) => put(out, &v.to_le_bytes()),
            Self::U64(v) => put(out, &v.to_le_bytes()),
            Self::F32(v) => put(out, &v.to_le_bytes()),
            Self::F64(v) => put(out, &v.to_le_bytes()),
            Self::Struct(values) => {
                let mut written = 0;
                for value in values {
                    written += value.write_le(&mut out[written..])?;
                }
                Ok(written)
            }
        }
    }

    /// Reads a value of `shape` from its native little-endian layout.
    pub(crate) fn read_le(shape: &Shape, bytes: &[u8]) -> Result<(Self, usize)> {
        match shape {
            Shape::Scalar(kind) => {
                let size = kind.byte_size();
                let raw = bytes.get(..size).ok_or_else(|| {
                    SeriesError::Serializer(format!(
                        "record buffer too small for {kind} ({} bytes left)",
                        bytes.len()
                    ))
                })?;
                let mut wide = [0u8; 8];
                wide[..size].copy_from_slice(raw);
                let value = match kind {
                    ValueKind::Bool => Self::Bool(raw[0] != 0),
                    ValueKind::U8 => Self::U8(raw[0]),
                    ValueKind::I8 => Self::I8(raw[0] as i8),
                    ValueKind::I16 => Self::I16(i16::from_le_bytes([raw[0], raw[1]])),
                    ValueKind::U16 => Self::U16(u16::from_le_bytes([raw[0], raw[1]])),
                    ValueKind::I32 => {
                        Self::I32(i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
                    }
                    ValueKind::U32 => {
                        Self::U32(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
                    }
                    ValueKind::I64 => Self::I64(i64::from_le_bytes(wide)),
                    ValueKind::U64 => Self::U64(u64::from_le_bytes(wide)),
                    ValueKind::F32 => Self::F32(f32::from_bits(u32::from_le_bytes([
                        wide[0], wide[1], wide[2], wide[3],
                    ]))),
                    ValueKind::F64 => Self::F64(f64::from_bits(u64::from_le_bytes(wide))),
                };
                Ok((value, size))
            }
            Shape::Struct(fields) => {
                let mut values = Vec::with_capacity(fields.len());
                let mut consumed = 0;
                for (_, field_shape) in fields {
                    let (value, size) = Self::read_le(field_shape, &bytes[consumed..])?;
                    values.push(value);
                    consumed += size;
                }
                Ok((Self::Struct(values), consumed))
            }
        }
    }

    /// Returns true when the value structurally matches `shape`.
    pub(crate) fn matches(&self, shape: &Shape) -> bool {
        match (self, shape) {
            (Self::Struct(values), Shape::Struct(fields)) => {
                values.len() == fields.len()
                    && values.iter().zip(fields).all(|(v, (_, s))| v.matches(s))
            }
            (value, Shape::Scalar(kind)) => value.kind() == Some(*kind),
            _ => false,
        }
    }
}

macro_rules! scalar_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }

            impl TryFrom<Value> for $ty {
                type Error = SeriesError;

                fn try_from(value: Value) -> Result<Self> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(SeriesError::Serializer(format!(
                            "expected {}, got {:?}",
                            stringify!($ty),
                            other
                        ))),
                    }
                }
            }
        )*
    };
}

scalar_conversions! {
    bool => Bool,
    u8 => U8,
    i8 => I8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

/// Sequential cursor over the fields of a struct value.
///
/// Used by [`Record::from_value`] implementations to pull fields in
/// declaration order.
#[derive(Debug)]
pub struct Fields {
    values: std::vec::IntoIter<Value>,
}

impl Fields {
    /// Takes the next field and converts it to `V`.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Serializer` when the struct has no more fields
    /// or the field has a different kind.
    pub fn next<V: TryFrom<Value, Error = SeriesError>>(&mut self) -> Result<V> {
        let value = self.values.next().ok_or_else(|| {
            SeriesError::Serializer("struct value has fewer fields than expected".to_string())
        })?;
        V::try_from(value)
    }

    /// Takes the next field as a nested record.
    pub fn next_record<R: Record>(&mut self) -> Result<R> {
        let value = self.values.next().ok_or_else(|| {
            SeriesError::Serializer("struct value has fewer fields than expected".to_string())
        })?;
        R::from_value(value)
    }
}

/// Declared shape of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// A single scalar.
    Scalar(ValueKind),
    /// Named fields in declaration order.
    Struct(Vec<(String, Shape)>),
}

impl Shape {
    /// Builds a struct shape from `(name, shape)` pairs.
    pub fn structure<'a>(fields: impl IntoIterator<Item = (&'a str, Shape)>) -> Self {
        Self::Struct(
            fields
                .into_iter()
                .map(|(name, shape)| (name.to_string(), shape))
                .collect(),
        )
    }

    /// Returns the size of the native little-endian layout in bytes.
    pub fn byte_size(&self) -> usize {
        match self {
            Self::Scalar(kind) => kind.byte_size(),
            Self::Struct(fields) => fields.iter().map(|(_, s)| s.byte_size()).sum(),
        }
    }
}

/// A fixed-shape record stored in a series file.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone)]
/// struct Tick { key: u8, value: i32 }
///
/// impl Record for Tick {
///     fn type_name() -> &'static str { "demo.Tick" }
///     fn shape() -> Shape {
///         Shape::structure([
///             ("key", Shape::Scalar(ValueKind::U8)),
///             ("value", Shape::Scalar(ValueKind::I32)),
///         ])
///     }
///     fn to_value(&self) -> Value {
///         Value::Struct(vec![self.key.into(), self.value.into()])
///     }
///     fn from_value(value: Value) -> Result<Self> {
///         let mut fields = value.into_fields()?;
///         Ok(Self { key: fields.next()?, value: fields.next()? })
///     }
/// }
/// ```
pub trait Record: Sized + Clone {
    /// Logical type name recorded in file headers.
    fn type_name() -> &'static str;

    /// Declared field layout.
    fn shape() -> Shape;

    /// Converts the record into a value matching [`Record::shape`].
    fn to_value(&self) -> Value;

    /// Rebuilds the record from a decoded value.
    fn from_value(value: Value) -> Result<Self>;
}

macro_rules! scalar_records {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Record for $ty {
                fn type_name() -> &'static str {
                    stringify!($ty)
                }

                fn shape() -> Shape {
                    Shape::Scalar(ValueKind::$kind)
                }

                fn to_value(&self) -> Value {
                    Value::from(*self)
                }

                fn from_value(value: Value) -> Result<Self> {
                    <$ty>::try_from(value)
                }
            }
        )*
    };
}

scalar_records! {
    bool => Bool,
    u8 => U8,
    i8 => I8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_le_layout_roundtrip() {
        let shape = Shape::structure([
            ("a", Shape::Scalar(ValueKind::U8)),
            ("b", Shape::Scalar(ValueKind::I32)),
            (
                "c",
                Shape::structure([
                    ("x", Shape::Scalar(ValueKind::F32)),
                    ("y", Shape::Scalar(ValueKind::U64)),
                ]),
            ),
        ]);
        assert_eq!(shape.byte_size(), 1 + 4 + 4 + 8);

        let value = Value::Struct(vec![
            Value::U8(7),
            Value::I32(-12345),
            Value::Struct(vec![Value::F32(-5.5), Value::U64(u64::MAX)]),
        ]);
        assert!(value.matches(&shape));

        let mut buf = vec![0u8; shape.byte_size()];
        assert_eq!(value.write_le(&mut buf).unwrap(), 17);
        let (decoded, consumed) = Value::read_le(&shape, &buf).unwrap();
        assert_eq!(consumed, 17);
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_from_i128_range_checked() {
        assert_eq!(Value::from_i128(ValueKind::I16, -5).unwrap(), Value::I16(-5));
        assert!(matches!(
            Value::from_i128(ValueKind::U8, 256),
            Err(SeriesError::Overflow(_))
        ));
        assert!(matches!(
            Value::from_i128(ValueKind::U32, -1),
            Err(SeriesError::Overflow(_))
        ));
    }

    #[test]
    fn test_fields_cursor() {
        let mut fields = Value::Struct(vec![Value::U8(1), Value::F64(2.5)])
            .into_fields()
            .unwrap();
        assert_eq!(fields.next::<u8>().unwrap(), 1);
        assert!(fields.next::<i32>().is_err());
        assert!(fields.next::<u8>().is_err());
    }

    #[test]
    fn test_scalar_record() {
        assert_eq!(<i64 as Record>::type_name(), "i64");
        assert_eq!(i64::from_value(42i64.to_value()).unwrap(), 42);
    }

    #[test]
    fn test_small_scalar_records() {
        assert_eq!(bool::shape(), Shape::Scalar(ValueKind::Bool));
        assert_eq!(i8::shape(), Shape::Scalar(ValueKind::I8));
        assert!(bool::from_value(true.to_value()).unwrap());
        assert_eq!(i8::from_value((-100i8).to_value()).unwrap(), -100);
        assert!(i8::from_value(Value::U8(1)).is_err());

        let mut raw = [0u8; 1];
        (-3i8).to_value().write_le(&mut raw).unwrap();
        let (value, len) = Value::read_le(&i8::shape(), &raw).unwrap();
        assert_eq!(len, 1);
        assert_eq!(i8::from_value(value).unwrap(), -3);
    }
}
