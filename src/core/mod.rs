//! Core type system components
//!
//! Type atoms, the union-type algebra over them, cast compatibility and
//! template substitution. Everything here is an immutable value type.

pub mod atom;
pub mod cast;
pub mod flow_type;
pub mod fqsen;
pub mod template;
pub mod union;

pub use atom::{
    ArrayKey, ArrayShape, CallableType, GenericArray, LiteralValue, ScalarKind, ShapeField, TemplateRef,
    TypeAtom,
};
pub use cast::{can_cast_to, CastMode, ClassGraph, FlatGraph};
pub use flow_type::FlowType;
pub use fqsen::Fqsen;
pub use template::{bind_from_arguments, substitute_templates, TemplateBindings};
pub use union::{TypeLimits, UnionType};
