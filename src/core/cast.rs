//! Cast compatibility between union types
//!
//! `can_cast_to` answers "may a value of `source` be used where `target` is
//! expected". Unknown atoms (`mixed`, templates, `static`) are accepted
//! optimistically. `intersect` and `exclude` are the set operations used by
//! `instanceof` / `is_*` narrowing; they go through the same rules.

use crate::core::atom::{ArrayShape, GenericArray, ScalarKind, TypeAtom};
use crate::core::fqsen::Fqsen;
use crate::core::union::{TypeLimits, UnionType};

/// Class relationships needed by the cast rules
pub trait ClassGraph {
    /// True if `class` is `ancestor` or extends / implements it
    fn is_subclass_of(&self, class: &Fqsen, ancestor: &Fqsen) -> bool;

    fn is_interface(&self, _class: &Fqsen) -> bool {
        false
    }

    /// Classes the graph has no declaration for are treated as opaque
    fn is_known(&self, _class: &Fqsen) -> bool {
        true
    }
}

/// A graph where a class is only related to itself
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatGraph;

impl ClassGraph for FlatGraph {
    fn is_subclass_of(&self, class: &Fqsen, ancestor: &Fqsen) -> bool {
        class == ancestor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastMode {
    Strict,
    /// Also allow scalar-to-scalar coercions (int, float, string, bool)
    Weak,
}

pub fn can_cast_to(source: &UnionType, target: &UnionType, graph: &dyn ClassGraph, mode: CastMode) -> bool {
    if source.is_empty() || source.is_mixed() || (target.is_mixed() && (target.is_nullable() || !source.is_nullable())) {
        return true;
    }
    if source.is_nullable() && !target.is_nullable() {
        return false;
    }
    source
        .atoms()
        .iter()
        .all(|atom| target.atoms().iter().any(|t| atom_can_cast(atom, t, graph, mode)))
}

pub fn atom_can_cast(source: &TypeAtom, target: &TypeAtom, graph: &dyn ClassGraph, mode: CastMode) -> bool {
    if source == target {
        return true;
    }
    match (source, target) {
        (_, TypeAtom::Mixed) | (_, TypeAtom::Template(_)) => true,
        (TypeAtom::Mixed, _) | (TypeAtom::Template(_), _) | (TypeAtom::Never, _) => true,
        (TypeAtom::StaticSelf, t) => t.is_object_like(),

        (TypeAtom::Literal(v), TypeAtom::Scalar(k)) if v.kind() == *k => true,
        (TypeAtom::Literal(v), TypeAtom::Scalar(ScalarKind::Float)) if v.kind() == ScalarKind::Int => true,
        (TypeAtom::Scalar(ScalarKind::Int), TypeAtom::Scalar(ScalarKind::Float)) => true,
        (s, t) if mode == CastMode::Weak && is_coercible_scalar(s) && is_coercible_scalar(t) => true,

        (TypeAtom::Instance { class, args }, TypeAtom::Instance { class: target_class, args: target_args }) => {
            if !graph.is_subclass_of(class, target_class) {
                return false;
            }
            if args.is_empty() || target_args.is_empty() || args.len() != target_args.len() {
                return true;
            }
            args.iter()
                .zip(target_args.iter())
                .all(|(a, t)| can_cast_to(a, t, graph, CastMode::Strict))
        }
        (TypeAtom::Instance { .. } | TypeAtom::Object, TypeAtom::Object) => true,
        // an unspecified object may be any class
        (TypeAtom::Object, TypeAtom::Instance { .. }) => true,
        (TypeAtom::Instance { class, .. }, TypeAtom::Callable(_)) => class.is("Closure"),
        (TypeAtom::Callable(_), TypeAtom::Instance { class, .. }) => class.is("Closure"),
        (TypeAtom::Callable(s), TypeAtom::Callable(t)) => callable_can_cast(s.ret.as_ref(), t.ret.as_ref(), graph),
        (TypeAtom::Scalar(ScalarKind::String) | TypeAtom::Literal(_), TypeAtom::Callable(c)) => {
            c.params.is_none() && source.scalar_kind() == Some(ScalarKind::String)
        }
        (TypeAtom::ArrayShape(s), TypeAtom::Callable(c)) => c.params.is_none() && s.len() == 2,

        (TypeAtom::ArrayShape(s), TypeAtom::GenericArray(g)) => shape_to_generic(s, g, graph, mode),
        (TypeAtom::ArrayShape(s), TypeAtom::ArrayShape(t)) => shape_to_shape(s, t, graph, mode),
        (TypeAtom::GenericArray(s), TypeAtom::GenericArray(t)) => {
            (!t.non_empty || s.non_empty)
                && (!t.is_list || s.is_list)
                && can_cast_to(&s.key, &t.key, graph, mode)
                && can_cast_to(&s.value, &t.value, graph, mode)
        }
        (TypeAtom::GenericArray(s), TypeAtom::ArrayShape(t)) => {
            t.fields().values().all(|f| can_cast_to(&s.value, &f.ty, graph, mode))
        }
        _ => false,
    }
}

fn is_coercible_scalar(atom: &TypeAtom) -> bool {
    atom.scalar_kind().map_or(false, ScalarKind::is_coercible)
}

fn callable_can_cast(source_ret: &UnionType, target_ret: &UnionType, graph: &dyn ClassGraph) -> bool {
    can_cast_to(source_ret, target_ret, graph, CastMode::Weak)
}

fn shape_to_generic(shape: &ArrayShape, g: &GenericArray, graph: &dyn ClassGraph, mode: CastMode) -> bool {
    if g.non_empty && !shape.has_required_field() {
        return false;
    }
    if g.is_list && !shape.is_list() {
        return false;
    }
    shape.fields().iter().all(|(key, field)| {
        can_cast_to(&key.literal_type(), &g.key, graph, mode) && can_cast_to(&field.ty, &g.value, graph, mode)
    })
}

fn shape_to_shape(source: &ArrayShape, target: &ArrayShape, graph: &dyn ClassGraph, mode: CastMode) -> bool {
    target.fields().iter().all(|(key, field)| match source.field(key) {
        Some(s) => (field.optional || !s.optional) && can_cast_to(&s.ty, &field.ty, graph, mode),
        None => field.optional,
    })
}

/// Values of `source` that are also values of `target`.
///
/// Source atoms castable to the target are kept; target atoms narrower than
/// a source atom replace it; unrelated atoms are dropped. Interfaces and
/// unknown classes may be implemented by the target class, so they are
/// replaced rather than dropped.
pub fn intersect(source: &UnionType, target: &UnionType, graph: &dyn ClassGraph, limits: TypeLimits) -> UnionType {
    let nullable = source.is_nullable() && target.is_nullable();
    if source.is_mixed() {
        return UnionType::from_atoms_with(target.atoms().iter().cloned(), nullable, limits);
    }
    source.flat_map_atoms(nullable, limits, |atom| {
        if target.is_mixed() || target.atoms().iter().any(|t| atom_is_member(atom, t, graph)) {
            return vec![atom.clone()];
        }
        target
            .atoms()
            .iter()
            .filter(|t| narrower_than(t, atom, graph))
            .cloned()
            .collect()
    })
}

fn narrower_than(candidate: &TypeAtom, wide: &TypeAtom, graph: &dyn ClassGraph) -> bool {
    match (candidate, wide) {
        (TypeAtom::Instance { class, .. }, TypeAtom::Instance { class: wide_class, .. }) => {
            graph.is_subclass_of(class, wide_class)
                || graph.is_interface(wide_class)
                || graph.is_interface(class)
                || !graph.is_known(wide_class)
        }
        (c, TypeAtom::Object) => c.is_object_like(),
        (TypeAtom::Instance { class, .. }, TypeAtom::Callable(_)) => class.is("Closure"),
        (c, w) => atom_is_member(c, w, graph),
    }
}

/// Whether every run-time value of `atom` is a value of `target`. Unlike a
/// strict cast, an int is never a float here.
fn atom_is_member(atom: &TypeAtom, target: &TypeAtom, graph: &dyn ClassGraph) -> bool {
    match (atom, target) {
        (TypeAtom::Scalar(ScalarKind::Int), TypeAtom::Scalar(ScalarKind::Float)) => false,
        (TypeAtom::Literal(_), TypeAtom::Scalar(ScalarKind::Float)) => false,
        _ => atom_can_cast(atom, target, graph, CastMode::Strict),
    }
}

/// Values of `source` that are not values of `target`. Only atoms wholly
/// contained in the target are removed.
pub fn exclude(source: &UnionType, target: &UnionType, graph: &dyn ClassGraph) -> UnionType {
    if target.is_mixed() {
        return source.subtract(target);
    }
    let nullable = source.is_nullable() && !target.is_nullable();
    source.flat_map_atoms(nullable, TypeLimits::default(), |atom| {
        let contained = !atom.is_opaque()
            && target.atoms().iter().any(|t| atom_is_member(atom, t, graph));
        if contained {
            vec![]
        } else {
            vec![atom.clone()]
        }
    })
}
