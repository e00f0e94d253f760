//! Field tree compiler and the record codec built on it.
//!
//! Freezing a [`Field`] tree resolves every state name to a slot and yields a
//! [`Program`]: the same tree with all configuration checked and all
//! arithmetic constants precomputed. Programs are evaluated directly; each
//! record is encoded either in init mode (first record of a block, values
//! written from zero) or in delta mode (differences to the previous record).
//!
//! ```text
//!   Field tree ──freeze──► Program ──encode(Init | Delta)──► CodecWriter
//!                               └────decode(Init | Delta)──◄ CodecReader
//! ```

use crate::codec::{CodecReader, CodecWriter};
use crate::error::{Result, SeriesError};
use crate::field::descriptor::{DeltaType, Field};
use crate::field::state::StateStore;
use crate::field::value::{Record, Value, ValueKind};
use std::iter::Peekable;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

/// Largest scaled magnitude an `f32` represents exactly.
const F32_MAX_SCALED: f64 = 16_777_216.0;

/// Largest scaled magnitude an `f64` represents exactly.
const F64_MAX_SCALED: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Init,
    Delta,
}

/// Compiled form of a frozen field tree.
#[derive(Debug)]
enum Program {
    Simple {
        kind: ValueKind,
    },
    ScaledInt {
        kind: ValueKind,
        slot: usize,
        divider: i128,
        delta_type: DeltaType,
    },
    ScaledFloat {
        kind: ValueKind,
        slot: usize,
        multiplier: f64,
        divider: f64,
        max_scaled: f64,
        tolerance: Option<f64>,
        delta_type: DeltaType,
    },
    Constant(Value),
    Complex(Vec<Program>),
}

/// Interprets a state slot as the integer it represents.
///
/// `u64` state holds the raw bit pattern; everything else is signed.
fn logical(kind: ValueKind, state: i64) -> i128 {
    if kind == ValueKind::U64 {
        state as u64 as i128
    } else {
        state as i128
    }
}

fn from_logical(kind: ValueKind, value: i128) -> i64 {
    if kind == ValueKind::U64 {
        value as u64 as i64
    } else {
        value as i64
    }
}

fn write_delta(
    writer: &mut CodecWriter,
    kind: ValueKind,
    delta_type: DeltaType,
    previous: i64,
    current: i64,
) -> Result<bool> {
    let (old, new) = (logical(kind, previous), logical(kind, current));
    match delta_type {
        DeltaType::Signed => Ok(writer.write_signed(current.wrapping_sub(previous))),
        DeltaType::Positive => {
            if new < old {
                return Err(SeriesError::Serializer(format!(
                    "value decreased from {old} to {new} in an increasing-only field"
                )));
            }
            Ok(writer.write_unsigned((new - old) as u64))
        }
        DeltaType::Negative => {
            if new > old {
                return Err(SeriesError::Serializer(format!(
                    "value increased from {old} to {new} in a decreasing-only field"
                )));
            }
            Ok(writer.write_unsigned((old - new) as u64))
        }
    }
}

fn read_delta(
    reader: &mut CodecReader<'_>,
    kind: ValueKind,
    delta_type: DeltaType,
    previous: i64,
) -> Result<i64> {
    match delta_type {
        DeltaType::Signed => Ok(previous.wrapping_add(reader.read_signed()?)),
        DeltaType::Positive => {
            let delta = reader.read_unsigned()? as i128;
            Ok(from_logical(kind, logical(kind, previous) + delta))
        }
        DeltaType::Negative => {
            let delta = reader.read_unsigned()? as i128;
            Ok(from_logical(kind, logical(kind, previous) - delta))
        }
    }
}

impl Program {
    fn compile(field: &Field, store: &mut StateStore) -> Result<Self> {
        let program = match field {
            Field::Simple(f) => Self::Simple { kind: f.kind() },
            Field::ScaledDeltaInt(f) => Self::ScaledInt {
                kind: f.kind(),
                slot: store.register(f.state_name())?,
                divider: f.divider() as i128,
                delta_type: f.delta_type(),
            },
            Field::ScaledDeltaFloat(f) => Self::ScaledFloat {
                kind: f.kind(),
                slot: store.register(f.state_name())?,
                multiplier: f.multiplier() as f64,
                divider: f.divider() as f64,
                max_scaled: if f.kind() == ValueKind::F32 {
                    F32_MAX_SCALED
                } else {
                    F64_MAX_SCALED
                },
                tolerance: f.tolerance(),
                delta_type: f.delta_type(),
            },
            Field::Constant(f) => Self::Constant(f.value().clone()),
            Field::Complex(f) => Self::Complex(
                f.fields()
                    .iter()
                    .map(|named| Self::compile(named.field(), store))
                    .collect::<Result<_>>()?,
            ),
        };
        Ok(program)
    }

    /// Encodes `value`, updating `state`. Returns false as soon as the block
    /// is full; the caller discards the partial record.
    fn encode(
        &self,
        value: &Value,
        mode: Mode,
        writer: &mut CodecWriter,
        state: &mut [i64],
    ) -> Result<bool> {
        match self {
            Self::Simple { kind } => {
                let byte = match (kind, value) {
                    (ValueKind::Bool, Value::Bool(v)) => *v as u8,
                    (ValueKind::U8, Value::U8(v)) => *v,
                    (ValueKind::I8, Value::I8(v)) => *v as u8,
                    _ => return Err(kind_mismatch(*kind, value)),
                };
                Ok(writer.write_byte(byte))
            }
            Self::ScaledInt {
                kind,
                slot,
                divider,
                delta_type,
            } => {
                let raw = value
                    .to_i128()
                    .filter(|_| value.kind() == Some(*kind))
                    .ok_or_else(|| kind_mismatch(*kind, value))?;
                if raw % divider != 0 {
                    return Err(SeriesError::Serializer(format!(
                        "value {raw} is not a multiple of divider {divider}"
                    )));
                }
                let current = from_logical(*kind, raw / divider);
                let fits = match mode {
                    Mode::Init => writer.write_signed(current),
                    Mode::Delta => write_delta(writer, *kind, *delta_type, state[*slot], current)?,
                };
                state[*slot] = current;
                Ok(fits)
            }
            Self::ScaledFloat {
                kind,
                slot,
                multiplier,
                divider,
                max_scaled,
                tolerance,
                delta_type,
            } => {
                let raw = value
                    .to_f64()
                    .filter(|_| value.kind() == Some(*kind))
                    .ok_or_else(|| kind_mismatch(*kind, value))?;
                if !raw.is_finite() {
                    return Err(SeriesError::Serializer(format!(
                        "cannot encode non-finite value {raw}"
                    )));
                }
                let scaled = (raw * multiplier / divider).round();
                if scaled.abs() > *max_scaled {
                    return Err(SeriesError::Overflow(format!(
                        "scaled value {scaled} of {raw} exceeds the {kind} limit {max_scaled}"
                    )));
                }
                if let Some(tolerance) = tolerance {
                    let restored = narrow_float(*kind, scaled * divider / multiplier);
                    if (restored - raw).abs() > *tolerance {
                        return Err(SeriesError::Serializer(format!(
                            "value {raw} would be stored as {restored} (tolerance {tolerance})"
                        )));
                    }
                }
                let current = scaled as i64;
                let fits = match mode {
                    Mode::Init => writer.write_signed(current),
                    Mode::Delta => write_delta(writer, *kind, *delta_type, state[*slot], current)?,
                };
                state[*slot] = current;
                Ok(fits)
            }
            Self::Constant(_) => Ok(true),
            Self::Complex(programs) => {
                let Value::Struct(values) = value else {
                    return Err(SeriesError::Serializer(format!(
                        "expected a struct value, got {value:?}"
                    )));
                };
                if values.len() != programs.len() {
                    return Err(SeriesError::Serializer(format!(
                        "struct value has {} fields, codec expects {}",
                        values.len(),
                        programs.len()
                    )));
                }
                for (program, value) in programs.iter().zip(values) {
                    if !program.encode(value, mode, writer, state)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    fn decode(&self, reader: &mut CodecReader<'_>, mode: Mode, state: &mut [i64]) -> Result<Value> {
        match self {
            Self::Simple { kind } => {
                let byte = reader.read_byte()?;
                Ok(match kind {
                    ValueKind::Bool => Value::Bool(byte != 0),
                    ValueKind::I8 => Value::I8(byte as i8),
                    _ => Value::U8(byte),
                })
            }
            Self::ScaledInt {
                kind,
                slot,
                divider,
                delta_type,
            } => {
                let current = match mode {
                    Mode::Init => reader.read_signed()?,
                    Mode::Delta => read_delta(reader, *kind, *delta_type, state[*slot])?,
                };
                state[*slot] = current;
                Value::from_i128(*kind, logical(*kind, current) * divider)
            }
            Self::ScaledFloat {
                kind,
                slot,
                multiplier,
                divider,
                delta_type,
                ..
            } => {
                let current = match mode {
                    Mode::Init => reader.read_signed()?,
                    Mode::Delta => read_delta(reader, *kind, *delta_type, state[*slot])?,
                };
                state[*slot] = current;
                let restored = current as f64 * divider / multiplier;
                Ok(if *kind == ValueKind::F32 {
                    Value::F32(restored as f32)
                } else {
                    Value::F64(restored)
                })
            }
            Self::Constant(value) => Ok(value.clone()),
            Self::Complex(programs) => programs
                .iter()
                .map(|program| program.decode(reader, mode, state))
                .collect::<Result<Vec<_>>>()
                .map(Value::Struct),
        }
    }
}

fn narrow_float(kind: ValueKind, value: f64) -> f64 {
    if kind == ValueKind::F32 {
        value as f32 as f64
    } else {
        value
    }
}

fn kind_mismatch(expected: ValueKind, value: &Value) -> SeriesError {
    SeriesError::Serializer(format!("expected a {expected} value, got {value:?}"))
}

/// Record codec compiled from a frozen field tree.
///
/// One `serialize` call writes one block: the first record in init mode,
/// then deltas until the block is full or the input ends. One `deserialize`
/// call decodes one block. Clones share the compiled program.
///
/// # Example
///
/// ```rust,ignore
/// let mut codec = DynamicSerializer::<i64>::new()?;
/// let mut writer = CodecWriter::new(4096)?;
/// let mut input = values.into_iter().peekable();
/// while codec.serialize(&mut writer, &mut input)? {
///     blocks.push(writer.block().to_vec());
/// }
/// ```
#[derive(Debug)]
pub struct DynamicSerializer<T: Record> {
    field: Arc<Field>,
    program: Arc<Program>,
    states: Arc<StateStore>,
    /// Running state after the last encoded or decoded record.
    state: Vec<i64>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Clone for DynamicSerializer<T> {
    fn clone(&self) -> Self {
        Self {
            field: Arc::clone(&self.field),
            program: Arc::clone(&self.program),
            states: Arc::clone(&self.states),
            state: self.state.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Record> DynamicSerializer<T> {
    /// Compiles the default field tree of `T` (see [`Field::from_shape`]).
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Configuration` when the default tree is invalid
    /// for the record shape.
    pub fn new() -> Result<Self> {
        Self::with_field(Field::from_shape(&T::shape()))
    }

    /// Freezes `field` and compiles it for `T`.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Configuration` when the tree is invalid or does
    /// not match the shape of `T`.
    pub fn with_field(mut field: Field) -> Result<Self> {
        field.check_shape(&T::shape(), "")?;
        field.make_readonly()?;
        let mut states = StateStore::new();
        let program = Program::compile(&field, &mut states)?;
        Ok(Self {
            field: Arc::new(field),
            program: Arc::new(program),
            state: vec![0; states.len()],
            states: Arc::new(states),
            _record: PhantomData,
        })
    }

    /// Returns the frozen field tree.
    pub fn field(&self) -> &Field {
        &self.field
    }

    /// Returns the largest encoded size of one record.
    pub fn max_record_size(&self) -> usize {
        self.field.max_byte_size()
    }

    /// Returns the running value of the state variable `name` after the
    /// last call, in scaled units.
    pub fn state(&self, name: &str) -> Option<i64> {
        self.states.slot(name).map(|slot| self.state[slot])
    }

    /// Encodes records from `records` into one block.
    ///
    /// Records are consumed only once they fit. The block is finished in
    /// `writer` (see [`CodecWriter::block`]) and padded to the block size
    /// when it filled up.
    ///
    /// Returns `true` when unconsumed input remains.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Serializer` or `SeriesError::Overflow` when a
    /// record cannot be encoded, including a record too large for an empty
    /// block. The record stays unconsumed.
    pub fn serialize<I>(
        &mut self,
        writer: &mut CodecWriter,
        records: &mut Peekable<I>,
    ) -> Result<bool>
    where
        I: Iterator<Item = T>,
    {
        writer.reset();
        let mut committed = vec![0i64; self.state.len()];
        let mut staged = committed.clone();
        let mut count = 0u64;
        let mut full = false;

        while let Some(record) = records.peek() {
            let start = writer.position();
            let mode = if count == 0 { Mode::Init } else { Mode::Delta };
            if self
                .program
                .encode(&record.to_value(), mode, writer, &mut staged)?
            {
                committed.copy_from_slice(&staged);
                count += 1;
                records.next();
            } else {
                writer.set_position(start);
                if count == 0 {
                    return Err(SeriesError::Serializer(format!(
                        "record does not fit into an empty block of {} bytes",
                        writer.block_size()
                    )));
                }
                full = true;
                break;
            }
        }

        writer.finish_block(count, full)?;
        self.state = committed;
        Ok(records.peek().is_some())
    }

    /// Decodes up to `max_count` records of one block into `out`.
    ///
    /// The content hash is verified when the whole block was decoded.
    ///
    /// Returns the number of records decoded.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::ChecksumMismatch` for corrupted blocks and
    /// `SeriesError::Serializer` for malformed content.
    pub fn deserialize(
        &mut self,
        reader: &mut CodecReader<'_>,
        out: &mut Vec<T>,
        max_count: usize,
    ) -> Result<usize> {
        let count = reader.read_header()?;
        let take = usize::try_from(count).map_or(max_count, |c| c.min(max_count));
        let mut state = vec![0i64; self.state.len()];
        out.reserve(take);
        for i in 0..take {
            let mode = if i == 0 { Mode::Init } else { Mode::Delta };
            let value = self.program.decode(reader, mode, &mut state)?;
            out.push(T::from_value(value)?);
        }
        if take as u64 == count {
            if let Err(e) = reader.verify_hash() {
                warn!(records = count, "block failed verification: {}", e);
                return Err(e);
            }
        }
        self.state = state;
        Ok(take)
    }

    /// Returns the record count stored in an encoded block.
    pub fn block_count(block: &[u8]) -> Result<u64> {
        CodecReader::new(block).read_header()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::descriptor::{ComplexField, ConstantField, Precision};
    use crate::field::value::{Fields, Shape};

    #[derive(Debug, Clone, PartialEq)]
    struct Tick {
        key: u8,
        value: i32,
        price: f32,
    }

    impl Record for Tick {
        fn type_name() -> &'static str {
            "test.Tick"
        }

        fn shape() -> Shape {
            Shape::structure([
                ("key", Shape::Scalar(ValueKind::U8)),
                ("value", Shape::Scalar(ValueKind::I32)),
                ("price", Shape::Scalar(ValueKind::F32)),
            ])
        }

        fn to_value(&self) -> Value {
            Value::Struct(vec![self.key.into(), self.value.into(), self.price.into()])
        }

        fn from_value(value: Value) -> Result<Self> {
            let mut fields: Fields = value.into_fields()?;
            Ok(Self {
                key: fields.next()?,
                value: fields.next()?,
                price: fields.next()?,
            })
        }
    }

    fn tick_codec() -> DynamicSerializer<Tick> {
        let mut field = Field::from_shape(&Tick::shape());
        field
            .path_mut("price")
            .unwrap()
            .as_scaled_float_mut()
            .unwrap()
            .set_multiplier(100)
            .unwrap();
        DynamicSerializer::with_field(field).unwrap()
    }

    fn roundtrip<T: Record>(
        codec: &mut DynamicSerializer<T>,
        records: &[T],
        block_size: usize,
    ) -> Vec<T> {
        let mut writer = CodecWriter::new(block_size).unwrap();
        let mut input = records.iter().cloned().peekable();
        let mut out = Vec::new();
        loop {
            let more = codec.serialize(&mut writer, &mut input).unwrap();
            let block = writer.block().to_vec();
            codec
                .deserialize(&mut CodecReader::new(&block), &mut out, usize::MAX)
                .unwrap();
            if !more {
                break;
            }
        }
        out
    }

    #[test]
    fn test_struct_roundtrip() {
        let ticks = vec![
            Tick { key: 10, value: 100, price: -5.5 },
            Tick { key: 11, value: 100, price: -5.0 },
            Tick { key: 12, value: 50, price: 0.0 },
        ];
        let mut codec = tick_codec();
        assert_eq!(roundtrip(&mut codec, &ticks, 4096), ticks);
        assert_eq!(codec.state("value"), Some(50));
        assert_eq!(codec.state("price"), Some(0));
    }

    #[test]
    fn test_blocks_split_when_full() {
        let values: Vec<i64> = (0..500).map(|i| i * 1_000_003).collect();
        let mut codec = DynamicSerializer::<i64>::new().unwrap();
        let mut writer = CodecWriter::new(64).unwrap();
        let mut input = values.iter().copied().peekable();

        let mut blocks = 0;
        let mut out = Vec::new();
        loop {
            let more = codec.serialize(&mut writer, &mut input).unwrap();
            let block = writer.block().to_vec();
            if more {
                assert_eq!(block.len(), 64);
            }
            codec
                .deserialize(&mut CodecReader::new(&block), &mut out, usize::MAX)
                .unwrap();
            blocks += 1;
            if !more {
                break;
            }
        }
        assert!(blocks > 1);
        assert_eq!(out, values);
    }

    #[test]
    fn test_partial_decode_skips_hash() {
        let mut codec = DynamicSerializer::<i32>::new().unwrap();
        let mut writer = CodecWriter::new(256).unwrap();
        let mut input = [5, 6, 7, 8].into_iter().peekable();
        assert!(!codec.serialize(&mut writer, &mut input).unwrap());
        let mut block = writer.block().to_vec();
        let last = block.len() - 1;
        block[last] ^= 0xff;

        let mut out = Vec::new();
        assert_eq!(
            codec
                .deserialize(&mut CodecReader::new(&block), &mut out, 1)
                .unwrap(),
            1
        );
        assert_eq!(out, vec![5]);
        assert!(matches!(
            codec.deserialize(&mut CodecReader::new(&block), &mut out, 10),
            Err(SeriesError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_divider_requires_multiple() {
        let mut field = Field::from_shape(&i64::shape());
        field.as_scaled_int_mut().unwrap().set_divider(10).unwrap();
        let mut codec = DynamicSerializer::<i64>::with_field(field).unwrap();
        assert_eq!(roundtrip(&mut codec, &[10, 20, -30], 128), vec![10, 20, -30]);
        assert_eq!(codec.state("value"), Some(-3));

        let mut writer = CodecWriter::new(128).unwrap();
        let mut input = [15i64].into_iter().peekable();
        assert!(matches!(
            codec.serialize(&mut writer, &mut input),
            Err(SeriesError::Serializer(_))
        ));
    }

    #[test]
    fn test_positive_delta_rejects_decrease() {
        let mut field = Field::from_shape(&u64::shape());
        field
            .as_scaled_int_mut()
            .unwrap()
            .set_delta_type(DeltaType::Positive)
            .unwrap();
        let mut codec = DynamicSerializer::<u64>::with_field(field).unwrap();
        let values = [0, 1, u64::MAX - 1, u64::MAX];
        assert_eq!(roundtrip(&mut codec, &values, 128), values);

        let mut writer = CodecWriter::new(128).unwrap();
        let mut input = [5u64, 4].into_iter().peekable();
        assert!(matches!(
            codec.serialize(&mut writer, &mut input),
            Err(SeriesError::Serializer(_))
        ));
    }

    #[test]
    fn test_negative_delta() {
        let mut field = Field::from_shape(&i16::shape());
        field
            .as_scaled_int_mut()
            .unwrap()
            .set_delta_type(DeltaType::Negative)
            .unwrap();
        let mut codec = DynamicSerializer::<i16>::with_field(field).unwrap();
        let values = [i16::MAX, 0, -1, i16::MIN];
        assert_eq!(roundtrip(&mut codec, &values, 128), values);
    }

    #[test]
    fn test_float_overflow_and_precision() {
        let mut field = Field::from_shape(&f32::shape());
        field
            .as_scaled_float_mut()
            .unwrap()
            .set_multiplier(100)
            .unwrap();
        let mut codec = DynamicSerializer::<f32>::with_field(field).unwrap();
        let mut writer = CodecWriter::new(128).unwrap();

        let mut input = [200_000.0f32].into_iter().peekable();
        assert!(matches!(
            codec.serialize(&mut writer, &mut input),
            Err(SeriesError::Overflow(_))
        ));

        let mut input = [1.234f32].into_iter().peekable();
        assert!(matches!(
            codec.serialize(&mut writer, &mut input),
            Err(SeriesError::Serializer(_))
        ));

        let mut input = [f32::NAN].into_iter().peekable();
        assert!(matches!(
            codec.serialize(&mut writer, &mut input),
            Err(SeriesError::Serializer(_))
        ));
    }

    #[test]
    fn test_unchecked_precision_rounds() {
        let mut field = Field::from_shape(&f64::shape());
        let float = field.as_scaled_float_mut().unwrap();
        float.set_multiplier(10).unwrap();
        float.set_precision(Precision::Unchecked).unwrap();
        let mut codec = DynamicSerializer::<f64>::with_field(field).unwrap();
        assert_eq!(roundtrip(&mut codec, &[1.26, 1.34], 128), vec![1.3, 1.3]);
    }

    #[test]
    fn test_constant_field_not_stored() {
        let mut root = ComplexField::new();
        root.add("key", Field::Constant(ConstantField::new(Value::U8(7))))
            .unwrap();
        root.add("value", Field::from_shape(&i32::shape())).unwrap();
        root.add("price", Field::from_shape(&f32::shape())).unwrap();
        let mut codec = DynamicSerializer::<Tick>::with_field(Field::Complex(root)).unwrap();

        let ticks = vec![Tick { key: 1, value: 3, price: 2.0 }];
        let decoded = roundtrip(&mut codec, &ticks, 128);
        assert_eq!(decoded, vec![Tick { key: 7, value: 3, price: 2.0 }]);
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Span {
        start: i64,
        end: i64,
    }

    impl Record for Span {
        fn type_name() -> &'static str {
            "test.Span"
        }

        fn shape() -> Shape {
            Shape::structure([
                ("start", Shape::Scalar(ValueKind::I64)),
                ("end", Shape::Scalar(ValueKind::I64)),
            ])
        }

        fn to_value(&self) -> Value {
            Value::Struct(vec![self.start.into(), self.end.into()])
        }

        fn from_value(value: Value) -> Result<Self> {
            let mut fields = value.into_fields()?;
            Ok(Self {
                start: fields.next()?,
                end: fields.next()?,
            })
        }
    }

    #[test]
    fn test_record_too_large_for_block() {
        let mut writer = CodecWriter::new(crate::codec::MIN_BLOCK_SIZE).unwrap();

        let mut codec = DynamicSerializer::<i64>::new().unwrap();
        let mut input = [i64::MIN].into_iter().peekable();
        assert!(!codec.serialize(&mut writer, &mut input).unwrap());

        let mut codec = DynamicSerializer::<Span>::new().unwrap();
        assert_eq!(codec.max_record_size(), 20);
        let mut input = [Span { start: i64::MIN, end: i64::MAX }]
            .into_iter()
            .peekable();
        assert!(matches!(
            codec.serialize(&mut writer, &mut input),
            Err(SeriesError::Serializer(_))
        ));
        assert!(input.peek().is_some());
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        assert!(matches!(
            DynamicSerializer::<i32>::with_field(Field::from_shape(&i64::shape())),
            Err(SeriesError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_input_writes_empty_block() {
        let mut codec = DynamicSerializer::<i32>::new().unwrap();
        let mut writer = CodecWriter::new(64).unwrap();
        let mut input = std::iter::empty::<i32>().peekable();
        assert!(!codec.serialize(&mut writer, &mut input).unwrap());
        assert_eq!(DynamicSerializer::<i32>::block_count(writer.block()).unwrap(), 0);
    }
}
