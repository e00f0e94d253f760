//! Field descriptors: the declarative codec tree.
//!
//! A [`Field`] describes how one value (or sub-structure) of a record is
//! encoded and which delta state it owns. Descriptors are configured through
//! setters, then frozen by [`Field::make_readonly`], which validates the
//! configuration and rejects any further mutation with
//! `SeriesError::InvalidState`.
//!
//! | Variant            | Stored as                                   | State |
//! |--------------------|---------------------------------------------|-------|
//! | `Simple`           | one raw byte                                | none  |
//! | `ScaledDeltaInt`   | varint of `value / divider`, then deltas    | 1     |
//! | `ScaledDeltaFloat` | varint of `round(v * mul / div)`, deltas    | 1     |
//! | `Constant`         | nothing                                     | none  |
//! | `Complex`          | sub-fields in declaration order             | sum   |

use crate::codec::MAX_VARINT_LEN;
use crate::error::{Result, SeriesError};
use crate::field::state::StateStore;
use crate::field::value::{Shape, Value, ValueKind};
use crate::storage::{HeaderReader, HeaderWriter, Version};

/// Direction constraint on the stored delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DeltaType {
    /// Any delta, stored as a signed varint.
    #[default]
    Signed = 0,
    /// Values only increase; the delta is stored unsigned.
    Positive = 1,
    /// Values only decrease; the delta magnitude is stored unsigned.
    Negative = 2,
}

impl DeltaType {
    /// Creates a DeltaType from a u8 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Signed),
            1 => Some(Self::Positive),
            2 => Some(Self::Negative),
            _ => None,
        }
    }
}

/// Precision check applied when encoding floats.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Precision {
    /// Tolerate one hundredth of one encoding step (`divider / multiplier`).
    #[default]
    Auto,
    /// Tolerate an absolute difference.
    Absolute(f64),
    /// No check.
    Unchecked,
}

/// Header format of a field descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldFormat {
    V1_0,
    /// Adds the precision setting of float fields.
    V1_1,
}

impl FieldFormat {
    fn version(self) -> Version {
        match self {
            Self::V1_0 => Version::new(1, 0),
            Self::V1_1 => Version::new(1, 1),
        }
    }

    fn parse(version: Version) -> Result<Self> {
        match (version.major, version.minor) {
            (1, 0) => Ok(Self::V1_0),
            (1, 1) => Ok(Self::V1_1),
            _ => Err(SeriesError::UnsupportedVersion(version)),
        }
    }
}

const TAG_SIMPLE: &str = "simple";
const TAG_SCALED_INT: &str = "scaled_delta_int";
const TAG_SCALED_FLOAT: &str = "scaled_delta_float";
const TAG_CONSTANT: &str = "constant";
const TAG_COMPLEX: &str = "complex";

/// Value tag marking a struct in a serialized constant.
const STRUCT_VALUE_TAG: u8 = 0xff;

fn ensure_mutable(readonly: bool, what: &str) -> Result<()> {
    if readonly {
        return Err(SeriesError::InvalidState(format!(
            "{what} cannot be changed after the field was made read-only"
        )));
    }
    Ok(())
}

/// A raw one-byte value (`bool`, `u8`, `i8`).
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleField {
    kind: ValueKind,
    readonly: bool,
}

impl SimpleField {
    /// Creates a simple field of `kind`.
    pub fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            readonly: false,
        }
    }

    /// Returns the value kind.
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    fn validate(&self) -> Result<()> {
        if !self.kind.is_byte_sized() {
            return Err(SeriesError::Configuration(format!(
                "simple fields hold one byte, {} needs {}",
                self.kind,
                self.kind.byte_size()
            )));
        }
        Ok(())
    }
}

/// An integer stored as a scaled delta from the previous record.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledDeltaIntField {
    kind: ValueKind,
    state_name: String,
    divider: u64,
    multiplier: u64,
    delta_type: DeltaType,
    readonly: bool,
}

impl ScaledDeltaIntField {
    /// Creates a field of integer `kind` with divider 1 and signed deltas.
    pub fn new(kind: ValueKind, state_name: impl Into<String>) -> Self {
        Self {
            kind,
            state_name: state_name.into(),
            divider: 1,
            multiplier: 1,
            delta_type: DeltaType::Signed,
            readonly: false,
        }
    }

    /// Returns the value kind.
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Returns the state variable name.
    pub fn state_name(&self) -> &str {
        &self.state_name
    }

    /// Returns the divider.
    pub fn divider(&self) -> u64 {
        self.divider
    }

    /// Returns the multiplier (always 1 for a valid integer field).
    pub fn multiplier(&self) -> u64 {
        self.multiplier
    }

    /// Returns the delta type.
    pub fn delta_type(&self) -> DeltaType {
        self.delta_type
    }

    /// Sets the divider applied before delta encoding.
    pub fn set_divider(&mut self, divider: u64) -> Result<()> {
        ensure_mutable(self.readonly, "divider")?;
        self.divider = divider;
        Ok(())
    }

    /// Sets the multiplier. Only 1 passes validation for integer fields.
    pub fn set_multiplier(&mut self, multiplier: u64) -> Result<()> {
        ensure_mutable(self.readonly, "multiplier")?;
        self.multiplier = multiplier;
        Ok(())
    }

    /// Sets the delta direction constraint.
    pub fn set_delta_type(&mut self, delta_type: DeltaType) -> Result<()> {
        ensure_mutable(self.readonly, "delta type")?;
        self.delta_type = delta_type;
        Ok(())
    }

    /// Renames the state variable.
    pub fn set_state_name(&mut self, name: impl Into<String>) -> Result<()> {
        ensure_mutable(self.readonly, "state name")?;
        self.state_name = name.into();
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let (_, max) = self.kind.int_range().ok_or_else(|| {
            SeriesError::Configuration(format!(
                "scaled delta integer field cannot hold {}",
                self.kind
            ))
        })?;
        if self.divider < 1 || self.divider as i128 > max {
            return Err(SeriesError::Configuration(format!(
                "divider {} must be in [1, {max}] for {}",
                self.divider, self.kind
            )));
        }
        if self.multiplier != 1 {
            return Err(SeriesError::Configuration(format!(
                "multiplier {} is only supported by floating point fields",
                self.multiplier
            )));
        }
        Ok(())
    }
}

/// A float stored as a rounded, scaled delta from the previous record.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledDeltaFloatField {
    kind: ValueKind,
    state_name: String,
    multiplier: u64,
    divider: u64,
    precision: Precision,
    delta_type: DeltaType,
    readonly: bool,
}

impl ScaledDeltaFloatField {
    /// Creates a field of float `kind` with multiplier and divider 1.
    pub fn new(kind: ValueKind, state_name: impl Into<String>) -> Self {
        Self {
            kind,
            state_name: state_name.into(),
            multiplier: 1,
            divider: 1,
            precision: Precision::Auto,
            delta_type: DeltaType::Signed,
            readonly: false,
        }
    }

    /// Returns the value kind.
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Returns the state variable name.
    pub fn state_name(&self) -> &str {
        &self.state_name
    }

    /// Returns the multiplier.
    pub fn multiplier(&self) -> u64 {
        self.multiplier
    }

    /// Returns the divider.
    pub fn divider(&self) -> u64 {
        self.divider
    }

    /// Returns the precision check.
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Returns the delta type.
    pub fn delta_type(&self) -> DeltaType {
        self.delta_type
    }

    /// Sets the multiplier applied before rounding.
    pub fn set_multiplier(&mut self, multiplier: u64) -> Result<()> {
        ensure_mutable(self.readonly, "multiplier")?;
        self.multiplier = multiplier;
        Ok(())
    }

    /// Sets the divider applied before rounding.
    pub fn set_divider(&mut self, divider: u64) -> Result<()> {
        ensure_mutable(self.readonly, "divider")?;
        self.divider = divider;
        Ok(())
    }

    /// Sets the precision check.
    pub fn set_precision(&mut self, precision: Precision) -> Result<()> {
        ensure_mutable(self.readonly, "precision")?;
        self.precision = precision;
        Ok(())
    }

    /// Sets the delta direction constraint.
    pub fn set_delta_type(&mut self, delta_type: DeltaType) -> Result<()> {
        ensure_mutable(self.readonly, "delta type")?;
        self.delta_type = delta_type;
        Ok(())
    }

    /// Renames the state variable.
    pub fn set_state_name(&mut self, name: impl Into<String>) -> Result<()> {
        ensure_mutable(self.readonly, "state name")?;
        self.state_name = name.into();
        Ok(())
    }

    /// Returns the tolerance the precision check applies, if any.
    pub fn tolerance(&self) -> Option<f64> {
        match self.precision {
            Precision::Auto => Some(self.divider as f64 / self.multiplier as f64 / 100.0),
            Precision::Absolute(tolerance) => Some(tolerance),
            Precision::Unchecked => None,
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.kind.is_float() {
            return Err(SeriesError::Configuration(format!(
                "scaled delta float field cannot hold {}",
                self.kind
            )));
        }
        if self.multiplier < 1 || self.divider < 1 {
            return Err(SeriesError::Configuration(format!(
                "multiplier {} and divider {} must both be at least 1",
                self.multiplier, self.divider
            )));
        }
        if let Precision::Absolute(tolerance) = self.precision {
            if !tolerance.is_finite() || tolerance <= 0.0 {
                return Err(SeriesError::Configuration(format!(
                    "precision tolerance {tolerance} must be a positive number"
                )));
            }
        }
        Ok(())
    }
}

/// A value that is never stored; decoding materializes it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantField {
    value: Value,
    readonly: bool,
}

impl ConstantField {
    /// Creates a constant field.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            readonly: false,
        }
    }

    /// Returns the constant.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Replaces the constant.
    pub fn set_value(&mut self, value: Value) -> Result<()> {
        ensure_mutable(self.readonly, "constant value")?;
        self.value = value;
        Ok(())
    }
}

/// A named sub-field of a [`ComplexField`].
#[derive(Debug, Clone, PartialEq)]
pub struct NamedField {
    name: String,
    field: Field,
}

impl NamedField {
    /// Returns the field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the descriptor.
    pub fn field(&self) -> &Field {
        &self.field
    }
}

/// An ordered list of named sub-fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComplexField {
    fields: Vec<NamedField>,
    readonly: bool,
}

impl ComplexField {
    /// Creates an empty complex field.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the sub-fields in declaration order.
    pub fn fields(&self) -> &[NamedField] {
        &self.fields
    }

    /// Appends a sub-field.
    pub fn add(&mut self, name: impl Into<String>, field: Field) -> Result<()> {
        ensure_mutable(self.readonly, "field list")?;
        self.fields.push(NamedField {
            name: name.into(),
            field,
        });
        Ok(())
    }

    /// Returns the sub-field called `name`.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.field)
    }

    /// Returns the sub-field called `name` for configuration.
    pub fn field_mut(&mut self, name: &str) -> Result<&mut Field> {
        ensure_mutable(self.readonly, "sub-field")?;
        self.fields
            .iter_mut()
            .find(|f| f.name == name)
            .map(|f| &mut f.field)
            .ok_or_else(|| SeriesError::Configuration(format!("no sub-field named '{name}'")))
    }

    /// Replaces the descriptor of the sub-field called `name`.
    pub fn replace(&mut self, name: &str, field: Field) -> Result<()> {
        *self.field_mut(name)? = field;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(SeriesError::Configuration(
                "complex field has no sub-fields".to_string(),
            ));
        }
        for (i, named) in self.fields.iter().enumerate() {
            if named.name.is_empty() {
                return Err(SeriesError::Configuration(format!(
                    "sub-field #{i} has an empty name"
                )));
            }
            if self.fields[..i].iter().any(|f| f.name == named.name) {
                return Err(SeriesError::Configuration(format!(
                    "sub-field name '{}' is used twice",
                    named.name
                )));
            }
        }
        Ok(())
    }
}

/// A field descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// Raw byte.
    Simple(SimpleField),
    /// Scaled-delta integer.
    ScaledDeltaInt(ScaledDeltaIntField),
    /// Scaled-delta float.
    ScaledDeltaFloat(ScaledDeltaFloatField),
    /// Constant, not stored.
    Constant(ConstantField),
    /// Nested struct.
    Complex(ComplexField),
}

impl Field {
    /// Builds the default descriptor tree for `shape`.
    ///
    /// One-byte kinds become [`SimpleField`]s, other integers
    /// [`ScaledDeltaIntField`]s, floats [`ScaledDeltaFloatField`]s and
    /// structs [`ComplexField`]s. State variables are named after the field
    /// path (`"quote.price"`); a scalar root uses `"value"`.
    pub fn from_shape(shape: &Shape) -> Self {
        Self::from_shape_at("", shape)
    }

    fn from_shape_at(path: &str, shape: &Shape) -> Self {
        match shape {
            Shape::Scalar(kind) => {
                let state = if path.is_empty() { "value" } else { path };
                if kind.is_byte_sized() {
                    Self::Simple(SimpleField::new(*kind))
                } else if kind.is_float() {
                    Self::ScaledDeltaFloat(ScaledDeltaFloatField::new(*kind, state))
                } else {
                    Self::ScaledDeltaInt(ScaledDeltaIntField::new(*kind, state))
                }
            }
            Shape::Struct(fields) => {
                let fields = fields
                    .iter()
                    .map(|(name, sub)| {
                        let sub_path = if path.is_empty() {
                            name.clone()
                        } else {
                            format!("{path}.{name}")
                        };
                        NamedField {
                            name: name.clone(),
                            field: Self::from_shape_at(&sub_path, sub),
                        }
                    })
                    .collect();
                Self::Complex(ComplexField {
                    fields,
                    readonly: false,
                })
            }
        }
    }

    /// Returns the header tag of the variant.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Simple(_) => TAG_SIMPLE,
            Self::ScaledDeltaInt(_) => TAG_SCALED_INT,
            Self::ScaledDeltaFloat(_) => TAG_SCALED_FLOAT,
            Self::Constant(_) => TAG_CONSTANT,
            Self::Complex(_) => TAG_COMPLEX,
        }
    }

    /// Returns true once the descriptor has been frozen.
    pub fn is_readonly(&self) -> bool {
        match self {
            Self::Simple(f) => f.readonly,
            Self::ScaledDeltaInt(f) => f.readonly,
            Self::ScaledDeltaFloat(f) => f.readonly,
            Self::Constant(f) => f.readonly,
            Self::Complex(f) => f.readonly,
        }
    }

    /// Returns the largest number of bytes one value may take in a block.
    pub fn max_byte_size(&self) -> usize {
        match self {
            Self::Simple(_) => 1,
            Self::ScaledDeltaInt(_) | Self::ScaledDeltaFloat(_) => MAX_VARINT_LEN,
            Self::Constant(_) => 0,
            Self::Complex(f) => f.fields.iter().map(|n| n.field.max_byte_size()).sum(),
        }
    }

    /// Validates the tree and freezes it.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Configuration` for invalid settings or state
    /// name collisions. The tree is left unchanged on error.
    pub fn make_readonly(&mut self) -> Result<()> {
        self.validate_tree(&mut StateStore::new())?;
        self.set_readonly();
        Ok(())
    }

    /// Validates the whole tree, registering state names in `store`.
    pub(crate) fn validate_tree(&self, store: &mut StateStore) -> Result<()> {
        match self {
            Self::Simple(f) => f.validate(),
            Self::ScaledDeltaInt(f) => {
                f.validate()?;
                store.register(&f.state_name).map(|_| ())
            }
            Self::ScaledDeltaFloat(f) => {
                f.validate()?;
                store.register(&f.state_name).map(|_| ())
            }
            Self::Constant(_) => Ok(()),
            Self::Complex(f) => {
                f.validate()?;
                for named in &f.fields {
                    named.field.validate_tree(store)?;
                }
                Ok(())
            }
        }
    }

    fn set_readonly(&mut self) {
        match self {
            Self::Simple(f) => f.readonly = true,
            Self::ScaledDeltaInt(f) => f.readonly = true,
            Self::ScaledDeltaFloat(f) => f.readonly = true,
            Self::Constant(f) => f.readonly = true,
            Self::Complex(f) => {
                f.readonly = true;
                for named in &mut f.fields {
                    named.field.set_readonly();
                }
            }
        }
    }

    /// Returns the complex variant for configuration.
    pub fn as_complex_mut(&mut self) -> Result<&mut ComplexField> {
        match self {
            Self::Complex(f) => Ok(f),
            other => Err(wrong_variant(TAG_COMPLEX, other)),
        }
    }

    /// Returns the scaled-delta integer variant for configuration.
    pub fn as_scaled_int_mut(&mut self) -> Result<&mut ScaledDeltaIntField> {
        match self {
            Self::ScaledDeltaInt(f) => Ok(f),
            other => Err(wrong_variant(TAG_SCALED_INT, other)),
        }
    }

    /// Returns the scaled-delta float variant for configuration.
    pub fn as_scaled_float_mut(&mut self) -> Result<&mut ScaledDeltaFloatField> {
        match self {
            Self::ScaledDeltaFloat(f) => Ok(f),
            other => Err(wrong_variant(TAG_SCALED_FLOAT, other)),
        }
    }

    /// Resolves a dotted path (`"quote.price"`) for configuration.
    pub fn path_mut(&mut self, path: &str) -> Result<&mut Field> {
        let mut current = self;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            current = current.as_complex_mut()?.field_mut(segment)?;
        }
        Ok(current)
    }

    /// Checks that the tree can encode values of `shape`.
    pub(crate) fn check_shape(&self, shape: &Shape, path: &str) -> Result<()> {
        let mismatch = |detail: String| {
            let at = if path.is_empty() { "<root>" } else { path };
            Err(SeriesError::Configuration(format!(
                "field tree does not match record shape at {at}: {detail}"
            )))
        };
        match (self, shape) {
            (Self::Simple(f), Shape::Scalar(kind)) if f.kind == *kind => Ok(()),
            (Self::ScaledDeltaInt(f), Shape::Scalar(kind)) if f.kind == *kind => Ok(()),
            (Self::ScaledDeltaFloat(f), Shape::Scalar(kind)) if f.kind == *kind => Ok(()),
            (Self::Constant(f), shape) if f.value.matches(shape) => Ok(()),
            (Self::Complex(f), Shape::Struct(fields)) => {
                if f.fields.len() != fields.len() {
                    return mismatch(format!(
                        "{} sub-fields for {} record fields",
                        f.fields.len(),
                        fields.len()
                    ));
                }
                for (named, (name, sub_shape)) in f.fields.iter().zip(fields) {
                    if &named.name != name {
                        return mismatch(format!("sub-field '{}' for '{name}'", named.name));
                    }
                    let sub_path = if path.is_empty() {
                        name.clone()
                    } else {
                        format!("{path}.{name}")
                    };
                    named.field.check_shape(sub_shape, &sub_path)?;
                }
                Ok(())
            }
            (field, shape) => mismatch(format!("{} cannot hold {shape:?}", field.tag())),
        }
    }

    /// Serializes the descriptor (tag, version, configuration).
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::Serializer` when a constant value cannot be
    /// written.
    pub fn write_to(&self, writer: &mut HeaderWriter) -> Result<()> {
        writer.write_string(self.tag());
        match self {
            Self::Simple(f) => {
                writer.write_version(FieldFormat::V1_0.version());
                writer.write_u8(f.kind as u8);
            }
            Self::ScaledDeltaInt(f) => {
                writer.write_version(FieldFormat::V1_0.version());
                writer.write_u8(f.kind as u8);
                writer.write_string(&f.state_name);
                writer.write_u64(f.divider);
                writer.write_u8(f.delta_type as u8);
            }
            Self::ScaledDeltaFloat(f) => {
                writer.write_version(FieldFormat::V1_1.version());
                writer.write_u8(f.kind as u8);
                writer.write_string(&f.state_name);
                writer.write_u64(f.multiplier);
                writer.write_u64(f.divider);
                writer.write_u8(f.delta_type as u8);
                match f.precision {
                    Precision::Auto => {
                        writer.write_u8(0);
                        writer.write_f64(0.0);
                    }
                    Precision::Absolute(tolerance) => {
                        writer.write_u8(1);
                        writer.write_f64(tolerance);
                    }
                    Precision::Unchecked => {
                        writer.write_u8(2);
                        writer.write_f64(0.0);
                    }
                }
            }
            Self::Constant(f) => {
                writer.write_version(FieldFormat::V1_0.version());
                write_value(writer, &f.value)?;
            }
            Self::Complex(f) => {
                writer.write_version(FieldFormat::V1_0.version());
                writer.write_i32(f.fields.len() as i32);
                for named in &f.fields {
                    writer.write_string(&named.name);
                    named.field.write_to(writer)?;
                }
            }
        }
        Ok(())
    }

    /// Deserializes a descriptor written by [`Field::write_to`].
    ///
    /// The result is not frozen; compiling it freezes it.
    ///
    /// # Errors
    ///
    /// Returns `SeriesError::UnknownFieldKind` for unknown tags,
    /// `SeriesError::UnsupportedVersion` for unknown versions and
    /// `SeriesError::Corruption` for malformed configuration.
    pub fn read_from(reader: &mut HeaderReader<'_>) -> Result<Self> {
        let tag = reader.read_string()?;
        let version = reader.read_version()?;
        let format = FieldFormat::parse(version)?;
        match (tag.as_str(), format) {
            (TAG_SIMPLE, FieldFormat::V1_0) => {
                Ok(Self::Simple(SimpleField::new(read_kind(reader)?)))
            }
            (TAG_SCALED_INT, FieldFormat::V1_0) => {
                let mut field = ScaledDeltaIntField::new(read_kind(reader)?, reader.read_string()?);
                field.divider = reader.read_u64()?;
                field.delta_type = read_delta_type(reader)?;
                Ok(Self::ScaledDeltaInt(field))
            }
            (TAG_SCALED_FLOAT, format) => {
                let mut field =
                    ScaledDeltaFloatField::new(read_kind(reader)?, reader.read_string()?);
                field.multiplier = reader.read_u64()?;
                field.divider = reader.read_u64()?;
                field.delta_type = read_delta_type(reader)?;
                if format == FieldFormat::V1_1 {
                    let mode = reader.read_u8()?;
                    let tolerance = reader.read_f64()?;
                    field.precision = match mode {
                        0 => Precision::Auto,
                        1 => Precision::Absolute(tolerance),
                        2 => Precision::Unchecked,
                        other => {
                            return Err(SeriesError::Corruption(format!(
                                "unknown precision mode {other}"
                            )))
                        }
                    };
                }
                Ok(Self::ScaledDeltaFloat(field))
            }
            (TAG_CONSTANT, FieldFormat::V1_0) => {
                Ok(Self::Constant(ConstantField::new(read_value(reader)?)))
            }
            (TAG_COMPLEX, FieldFormat::V1_0) => {
                let count = reader.read_i32()?;
                if count < 0 {
                    return Err(SeriesError::Corruption(format!(
                        "negative sub-field count {count}"
                    )));
                }
                let mut complex = ComplexField::new();
                for _ in 0..count {
                    let name = reader.read_string()?;
                    let field = Self::read_from(reader)?;
                    complex.fields.push(NamedField { name, field });
                }
                Ok(Self::Complex(complex))
            }
            (TAG_SIMPLE | TAG_SCALED_INT | TAG_CONSTANT | TAG_COMPLEX, _) => {
                Err(SeriesError::UnsupportedVersion(version))
            }
            (other, _) => Err(SeriesError::UnknownFieldKind(other.to_string())),
        }
    }
}

fn wrong_variant(expected: &str, found: &Field) -> SeriesError {
    SeriesError::Configuration(format!("expected a {expected} field, found {}", found.tag()))
}

fn read_kind(reader: &mut HeaderReader<'_>) -> Result<ValueKind> {
    let raw = reader.read_u8()?;
    ValueKind::from_u8(raw)
        .ok_or_else(|| SeriesError::Corruption(format!("unknown value kind {raw}")))
}

fn read_delta_type(reader: &mut HeaderReader<'_>) -> Result<DeltaType> {
    let raw = reader.read_u8()?;
    DeltaType::from_u8(raw)
        .ok_or_else(|| SeriesError::Corruption(format!("unknown delta type {raw}")))
}

fn write_value(writer: &mut HeaderWriter, value: &Value) -> Result<()> {
    if let Value::Struct(values) = value {
        writer.write_u8(STRUCT_VALUE_TAG);
        writer.write_i32(values.len() as i32);
        for v in values {
            write_value(writer, v)?;
        }
        return Ok(());
    }
    let kind = value
        .kind()
        .ok_or_else(|| SeriesError::Serializer(format!("{value:?} has no scalar kind")))?;
    writer.write_u8(kind as u8);
    let mut raw = [0u8; 8];
    let len = value.write_le(&mut raw)?;
    writer.write_bytes(&raw[..len]);
    Ok(())
}

fn read_value(reader: &mut HeaderReader<'_>) -> Result<Value> {
    let tag = reader.read_u8()?;
    if tag == STRUCT_VALUE_TAG {
        let count = reader.read_i32()?;
        if count < 0 {
            return Err(SeriesError::Corruption(format!(
                "negative struct length {count} in constant"
            )));
        }
        let values = (0..count)
            .map(|_| read_value(reader))
            .collect::<Result<Vec<_>>>()?;
        return Ok(Value::Struct(values));
    }
    let kind = ValueKind::from_u8(tag)
        .ok_or_else(|| SeriesError::Corruption(format!("unknown value kind {tag} in constant")))?;
    let raw = reader.read_bytes(kind.byte_size())?;
    let (value, _) = Value::read_le(&Shape::Scalar(kind), raw)?;
    Ok(value)
}
