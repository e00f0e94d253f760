//! Field codec tree.
//!
//! Records are described by a [`Shape`] and converted to dynamic [`Value`]s.
//! A tree of [`Field`] descriptors says how every value is encoded; the tree
//! is frozen and compiled into a [`DynamicSerializer`] that packs records
//! into delta-encoded blocks.
//!
//! ```text
//! Record ──to_value──► Value ──Field tree──► varints in a block
//! Record ◄─from_value── Value ◄─Field tree── varints in a block
//! ```

pub mod compiler;
pub mod descriptor;
pub mod state;
pub mod value;

pub use compiler::DynamicSerializer;
pub use descriptor::{
    ComplexField, ConstantField, DeltaType, Field, NamedField, Precision, ScaledDeltaFloatField,
    ScaledDeltaIntField, SimpleField,
};
pub use state::StateStore;
pub use value::{Fields, Record, Shape, Value, ValueKind};
