//! Union types and the set algebra over them
//!
//! A `UnionType` is a set of [`TypeAtom`]s plus a nullability flag. It is
//! always kept normalized: no duplicates, `mixed` never shares the set with
//! another atom, literals are folded into their scalar kind once they fan
//! out past [`TypeLimits::literal_fanout`].

use crate::core::atom::{
    ArrayKey, ArrayShape, CallableType, GenericArray, LiteralValue, ScalarKind, ShapeField, TypeAtom,
};
use crate::core::fqsen::Fqsen;
use serde::{Serialize, Serializer};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Bounds that keep literal and shape tracking from exploding in loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeLimits {
    /// Literals of one kind (or array shapes) at which the union collapses
    pub literal_fanout: usize,
    /// Shapes with more fields than this become generic arrays
    pub max_shape_fields: usize,
}

impl Default for TypeLimits {
    fn default() -> Self {
        Self { literal_fanout: 8, max_shape_fields: 64 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UnionType {
    atoms: SmallVec<[TypeAtom; 2]>,
    nullable: bool,
    has_assoc_keys: bool,
}

impl UnionType {
    /// The empty union: no value can have this type (unreachable)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn null() -> Self {
        Self { atoms: SmallVec::new(), nullable: true, has_assoc_keys: false }
    }

    pub fn mixed() -> Self {
        Self::of(TypeAtom::Mixed).with_null()
    }

    pub fn non_null_mixed() -> Self {
        Self::of(TypeAtom::Mixed)
    }

    pub fn never() -> Self {
        Self::of(TypeAtom::Never)
    }

    pub fn of(atom: TypeAtom) -> Self {
        Self::from_atoms(std::iter::once(atom), false)
    }

    pub fn scalar(kind: ScalarKind) -> Self {
        Self::of(TypeAtom::Scalar(kind))
    }

    pub fn int() -> Self {
        Self::scalar(ScalarKind::Int)
    }

    pub fn float() -> Self {
        Self::scalar(ScalarKind::Float)
    }

    pub fn string() -> Self {
        Self::scalar(ScalarKind::String)
    }

    pub fn bool() -> Self {
        Self::scalar(ScalarKind::Bool)
    }

    pub fn int_or_float() -> Self {
        Self::from_atoms(
            [TypeAtom::Scalar(ScalarKind::Int), TypeAtom::Scalar(ScalarKind::Float)],
            false,
        )
    }

    /// `int|string`, the type of array keys
    pub fn array_key() -> Self {
        Self::from_atoms(
            [TypeAtom::Scalar(ScalarKind::Int), TypeAtom::Scalar(ScalarKind::String)],
            false,
        )
    }

    pub fn literal(value: LiteralValue) -> Self {
        Self::of(TypeAtom::Literal(value))
    }

    pub fn literal_int(n: i64) -> Self {
        Self::literal(LiteralValue::Int(n))
    }

    pub fn literal_string(s: &str) -> Self {
        Self::literal(LiteralValue::String(Arc::from(s)))
    }

    pub fn literal_bool(b: bool) -> Self {
        Self::literal(LiteralValue::Bool(b))
    }

    pub fn instance(class: Fqsen) -> Self {
        Self::of(TypeAtom::instance(class))
    }

    pub fn instance_with_args(class: Fqsen, args: Vec<UnionType>) -> Self {
        Self::of(TypeAtom::Instance { class, args })
    }

    pub fn object() -> Self {
        Self::of(TypeAtom::Object)
    }

    /// Generic `array`
    pub fn array() -> Self {
        Self::of(TypeAtom::GenericArray(GenericArray::any()))
    }

    pub fn array_of(key: UnionType, value: UnionType) -> Self {
        Self::of(TypeAtom::GenericArray(GenericArray::new(key, value)))
    }

    pub fn list_of(value: UnionType) -> Self {
        Self::of(TypeAtom::GenericArray(GenericArray::list(value)))
    }

    /// `array{}`, the type of `[]`
    pub fn empty_array() -> Self {
        Self::of(TypeAtom::ArrayShape(ArrayShape::empty()))
    }

    pub fn shape(shape: ArrayShape) -> Self {
        Self::of(TypeAtom::ArrayShape(shape))
    }

    pub fn callable() -> Self {
        Self::of(TypeAtom::Callable(CallableType::any()))
    }

    pub fn template(name: &str, owner: Fqsen) -> Self {
        Self::of(TypeAtom::Template(crate::core::atom::TemplateRef::new(name, owner)))
    }

    pub fn from_atoms(atoms: impl IntoIterator<Item = TypeAtom>, nullable: bool) -> Self {
        Self::normalize(atoms.into_iter().collect(), nullable, TypeLimits::default())
    }

    pub fn from_atoms_with(
        atoms: impl IntoIterator<Item = TypeAtom>,
        nullable: bool,
        limits: TypeLimits,
    ) -> Self {
        Self::normalize(atoms.into_iter().collect(), nullable, limits)
    }

    fn normalize(mut atoms: Vec<TypeAtom>, nullable: bool, limits: TypeLimits) -> Self {
        if atoms.iter().any(|a| matches!(a, TypeAtom::Mixed)) {
            return Self { atoms: SmallVec::from_elem(TypeAtom::Mixed, 1), nullable, has_assoc_keys: true };
        }

        let had_never = atoms.iter().any(|a| matches!(a, TypeAtom::Never));
        atoms.retain(|a| !matches!(a, TypeAtom::Never));

        let mut unique: Vec<TypeAtom> = Vec::with_capacity(atoms.len());
        for atom in atoms {
            let atom = match atom {
                TypeAtom::ArrayShape(shape) if shape.len() > limits.max_shape_fields => {
                    TypeAtom::GenericArray(shape.to_generic(limits))
                }
                other => other,
            };
            if !unique.contains(&atom) {
                unique.push(atom);
            }
        }

        // true|false is bool
        let has_true = unique.contains(&TypeAtom::Literal(LiteralValue::Bool(true)));
        let has_false = unique.contains(&TypeAtom::Literal(LiteralValue::Bool(false)));
        if has_true && has_false {
            unique.retain(|a| !matches!(a, TypeAtom::Literal(LiteralValue::Bool(_))));
            if !unique.contains(&TypeAtom::Scalar(ScalarKind::Bool)) {
                unique.push(TypeAtom::Scalar(ScalarKind::Bool));
            }
        }

        // Literals subsumed by their scalar kind, or fanned out past the limit
        for kind in [ScalarKind::Bool, ScalarKind::Int, ScalarKind::String] {
            let literal_count = unique
                .iter()
                .filter(|a| matches!(a, TypeAtom::Literal(v) if v.kind() == kind))
                .count();
            if literal_count == 0 {
                continue;
            }
            let has_scalar = unique.contains(&TypeAtom::Scalar(kind));
            if has_scalar || literal_count >= limits.literal_fanout {
                let mut inserted = has_scalar;
                unique = unique
                    .into_iter()
                    .filter_map(|a| match a {
                        TypeAtom::Literal(ref v) if v.kind() == kind => {
                            if inserted {
                                None
                            } else {
                                inserted = true;
                                Some(TypeAtom::Scalar(kind))
                            }
                        }
                        other => Some(other),
                    })
                    .collect();
            }
        }

        // Too many distinct shapes: fold them into one generic array
        let shape_count = unique.iter().filter(|a| matches!(a, TypeAtom::ArrayShape(_))).count();
        if shape_count > 1 && shape_count >= limits.literal_fanout {
            let mut merged: Option<GenericArray> = None;
            unique.retain(|a| match a {
                TypeAtom::ArrayShape(shape) => {
                    let g = shape.to_generic(limits);
                    merged = Some(match merged.take() {
                        None => g,
                        Some(m) => merge_generic(&m, &g, limits),
                    });
                    false
                }
                _ => true,
            });
            if let Some(g) = merged {
                unique.push(TypeAtom::GenericArray(g));
            }
        }

        // Generic arrays subsumed by a wider sibling
        let generics: Vec<GenericArray> = unique
            .iter()
            .filter_map(|a| match a {
                TypeAtom::GenericArray(g) => Some(g.clone()),
                _ => None,
            })
            .collect();
        if generics.len() > 1 {
            unique.retain(|a| match a {
                TypeAtom::GenericArray(g) => !generics.iter().any(|other| other != g && g.is_subsumed_by(other)),
                _ => true,
            });
        }

        if unique.is_empty() && had_never && !nullable {
            unique.push(TypeAtom::Never);
        }

        let has_assoc_keys = unique.iter().any(|a| match a {
            TypeAtom::ArrayShape(s) => !s.is_list(),
            TypeAtom::GenericArray(g) => !g.is_list,
            _ => false,
        });

        Self { atoms: SmallVec::from_vec(unique), nullable, has_assoc_keys }
    }

    pub fn atoms(&self) -> &[TypeAtom] {
        &self.atoms
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn has_assoc_keys(&self) -> bool {
        self.has_assoc_keys
    }

    /// No possible value: the result of an impossible narrowing
    pub fn is_empty(&self) -> bool {
        !self.nullable && self.atoms.iter().all(|a| matches!(a, TypeAtom::Never))
    }

    /// Declared or inferred `never`: evaluation does not complete
    pub fn is_never(&self) -> bool {
        !self.nullable && self.atoms.len() == 1 && matches!(self.atoms[0], TypeAtom::Never)
    }

    pub fn is_null(&self) -> bool {
        self.nullable && self.atoms.is_empty()
    }

    pub fn is_mixed(&self) -> bool {
        self.atoms.iter().any(|a| matches!(a, TypeAtom::Mixed))
    }

    /// Contains an atom the analysis cannot see through
    pub fn has_opaque_atom(&self) -> bool {
        self.atoms.iter().any(TypeAtom::is_opaque)
    }

    pub fn contains(&self, atom: &TypeAtom) -> bool {
        self.atoms.contains(atom)
    }

    /// The single literal value, if this type is exactly one literal
    pub fn literal_value(&self) -> Option<&LiteralValue> {
        match self.atoms.as_slice() {
            [TypeAtom::Literal(v)] if !self.nullable => Some(v),
            _ => None,
        }
    }

    pub fn is_array_like(&self) -> bool {
        !self.atoms.is_empty() && self.atoms.iter().all(TypeAtom::is_array_like)
    }

    pub fn has_object(&self) -> bool {
        self.atoms.iter().any(TypeAtom::is_object_like)
    }

    pub fn union(&self, other: &UnionType) -> UnionType {
        self.union_with(other, TypeLimits::default())
    }

    pub fn union_with(&self, other: &UnionType, limits: TypeLimits) -> UnionType {
        if other.is_empty() && !other.is_never() {
            return self.clone();
        }
        if self.is_empty() && !self.is_never() {
            return other.clone();
        }
        let atoms = self.atoms.iter().chain(other.atoms.iter()).cloned().collect();
        Self::normalize(atoms, self.nullable || other.nullable, limits)
    }

    pub fn union_all(types: impl IntoIterator<Item = UnionType>, limits: TypeLimits) -> UnionType {
        let mut atoms = Vec::new();
        let mut nullable = false;
        let mut had_never = false;
        for ty in types {
            nullable |= ty.nullable;
            had_never |= ty.is_never();
            atoms.extend(ty.atoms.into_iter());
        }
        if atoms.is_empty() && !nullable && !had_never {
            return Self::empty();
        }
        Self::normalize(atoms, nullable, limits)
    }

    pub fn with_null(&self) -> UnionType {
        Self { nullable: true, ..self.clone() }
    }

    /// Remove `null`; `mixed` becomes non-null mixed
    pub fn without_null(&self) -> UnionType {
        Self { nullable: false, ..self.clone() }
    }

    /// Keep atoms satisfying `keep`; nullability is preserved
    pub fn filter_atoms(&self, mut keep: impl FnMut(&TypeAtom) -> bool) -> UnionType {
        let atoms = self.atoms.iter().filter(|a| keep(a)).cloned().collect();
        Self::normalize(atoms, self.nullable, TypeLimits::default())
    }

    /// Replace each atom with zero or more atoms
    pub fn flat_map_atoms(
        &self,
        nullable: bool,
        limits: TypeLimits,
        mut f: impl FnMut(&TypeAtom) -> Vec<TypeAtom>,
    ) -> UnionType {
        let atoms = self.atoms.iter().flat_map(|a| f(a)).collect();
        Self::normalize(atoms, nullable, limits)
    }

    pub fn map_atoms(&self, limits: TypeLimits, mut f: impl FnMut(&TypeAtom) -> TypeAtom) -> UnionType {
        self.flat_map_atoms(self.nullable, limits, |a| vec![f(a)])
    }

    /// Values of this type that convert to `true`
    pub fn non_falsey(&self) -> UnionType {
        self.flat_map_atoms(false, TypeLimits::default(), |atom| match atom {
            TypeAtom::Scalar(ScalarKind::Bool) => vec![TypeAtom::Literal(LiteralValue::Bool(true))],
            TypeAtom::Literal(v) if !v.is_truthy() => vec![],
            TypeAtom::ArrayShape(s) if s.is_empty() => vec![],
            TypeAtom::GenericArray(g) => vec![TypeAtom::GenericArray(g.with_non_empty(true))],
            TypeAtom::Never => vec![],
            other => vec![other.clone()],
        })
    }

    /// Values of this type that convert to `false`
    pub fn non_truthy(&self) -> UnionType {
        self.flat_map_atoms(self.nullable, TypeLimits::default(), |atom| match atom {
            TypeAtom::Scalar(ScalarKind::Bool) => vec![TypeAtom::Literal(LiteralValue::Bool(false))],
            TypeAtom::Scalar(ScalarKind::Int) => vec![TypeAtom::Literal(LiteralValue::Int(0))],
            TypeAtom::Scalar(ScalarKind::String) => vec![
                TypeAtom::Literal(LiteralValue::String(Arc::from(""))),
                TypeAtom::Literal(LiteralValue::String(Arc::from("0"))),
            ],
            TypeAtom::Scalar(ScalarKind::Float) => vec![atom.clone()],
            TypeAtom::ArrayShape(s) if s.has_required_field() => vec![],
            TypeAtom::ArrayShape(_) => vec![TypeAtom::ArrayShape(ArrayShape::empty())],
            TypeAtom::GenericArray(g) if g.non_empty => vec![],
            TypeAtom::GenericArray(_) => vec![TypeAtom::ArrayShape(ArrayShape::empty())],
            TypeAtom::Mixed | TypeAtom::Template(_) => vec![atom.clone()],
            a if a.is_always_truthy() => vec![],
            other => vec![other.clone()],
        })
    }

    pub fn can_be_truthy(&self) -> bool {
        self.atoms.iter().any(|a| !a.is_always_falsey())
    }

    pub fn can_be_falsey(&self) -> bool {
        self.nullable || self.atoms.iter().any(|a| !a.is_always_truthy())
    }

    /// Literals become scalars, shapes become generic arrays; generic arrays
    /// are merged into a single atom
    pub fn generalize(&self, limits: TypeLimits) -> UnionType {
        let mut merged: Option<GenericArray> = None;
        let mut atoms = Vec::new();
        for atom in &self.atoms {
            match atom.generalized(limits) {
                TypeAtom::GenericArray(g) => {
                    merged = Some(match merged.take() {
                        None => g,
                        Some(m) => merge_generic(&m, &g, limits),
                    });
                }
                other => atoms.push(other),
            }
        }
        atoms.extend(merged.map(TypeAtom::GenericArray));
        Self::normalize(atoms, self.nullable, limits)
    }

    /// Key type when iterating with `foreach`
    pub fn iterable_key_type(&self, limits: TypeLimits) -> UnionType {
        UnionType::union_all(
            self.atoms.iter().map(|atom| match atom {
                TypeAtom::ArrayShape(s) => s.key_union(),
                TypeAtom::GenericArray(g) => (*g.key).clone(),
                TypeAtom::Instance { args, .. } if args.len() == 2 => args[0].clone(),
                TypeAtom::Instance { args, .. } if args.len() == 1 => UnionType::mixed(),
                _ => UnionType::mixed(),
            }),
            limits,
        )
    }

    /// Value type when iterating with `foreach`
    pub fn iterable_value_type(&self, limits: TypeLimits) -> UnionType {
        UnionType::union_all(
            self.atoms.iter().map(|atom| match atom {
                TypeAtom::ArrayShape(s) => s.value_union(limits),
                TypeAtom::GenericArray(g) => (*g.value).clone(),
                TypeAtom::Instance { args, .. } if !args.is_empty() => args[args.len() - 1].clone(),
                _ => UnionType::mixed(),
            }),
            limits,
        )
    }

    /// True if iterating this value can never run the loop body
    pub fn is_definitely_empty_iterable(&self) -> bool {
        !self.nullable
            && !self.atoms.is_empty()
            && self.atoms.iter().all(|a| matches!(a, TypeAtom::ArrayShape(s) if s.is_empty()))
    }

    /// True if iterating this value always runs the loop body at least once
    pub fn is_definitely_non_empty_iterable(&self) -> bool {
        !self.nullable
            && !self.atoms.is_empty()
            && self.atoms.iter().all(|a| match a {
                TypeAtom::ArrayShape(s) => s.has_required_field(),
                TypeAtom::GenericArray(g) => g.non_empty,
                _ => false,
            })
    }

    /// Type read from `$value[key]`; `key` is `None` when not a literal
    pub fn offset_type(&self, key: Option<&ArrayKey>, limits: TypeLimits) -> UnionType {
        let mut parts = Vec::new();
        for atom in &self.atoms {
            let part = match atom {
                TypeAtom::ArrayShape(shape) => match key {
                    Some(k) => match shape.field(k) {
                        Some(field) => field.ty.clone(),
                        None => UnionType::null(),
                    },
                    None => shape.value_union(limits).with_null(),
                },
                TypeAtom::GenericArray(g) => (*g.value).clone(),
                TypeAtom::Scalar(ScalarKind::String) | TypeAtom::Literal(LiteralValue::String(_)) => {
                    UnionType::string()
                }
                TypeAtom::Scalar(_) | TypeAtom::Literal(_) => UnionType::null(),
                _ => UnionType::mixed(),
            };
            parts.push(part);
        }
        if self.nullable {
            parts.push(UnionType::null());
        }
        UnionType::union_all(parts, limits)
    }

    /// Type after `$value[key] = assigned` (`key` of `None` means `$value[]`)
    pub fn with_offset_assigned(
        &self,
        key: Option<ArrayKey>,
        dynamic_key: Option<&UnionType>,
        assigned: &UnionType,
        limits: TypeLimits,
    ) -> UnionType {
        let base = if self.atoms.is_empty() {
            // null or undefined becomes a fresh array
            UnionType::empty_array()
        } else {
            self.without_null()
        };
        base.flat_map_atoms(false, limits, |atom| match atom {
            TypeAtom::ArrayShape(shape) => match (&key, dynamic_key) {
                (Some(k), _) => vec![TypeAtom::ArrayShape(
                    shape.with_field(k.clone(), ShapeField::required(assigned.clone())),
                )],
                (None, None) => {
                    let index = ArrayKey::Int(shape.next_index());
                    vec![TypeAtom::ArrayShape(shape.with_field(index, ShapeField::required(assigned.clone())))]
                }
                (None, Some(k)) => {
                    let g = shape.to_generic(limits);
                    vec![TypeAtom::GenericArray(GenericArray {
                        key: Box::new(g.key.union_with(&k.generalize(limits), limits)),
                        value: Box::new(g.value.union_with(assigned, limits)),
                        non_empty: true,
                        is_list: false,
                    })]
                }
            },
            TypeAtom::GenericArray(g) => {
                let (new_key, is_list) = match (&key, dynamic_key) {
                    (None, None) => ((*g.key).clone(), g.is_list),
                    (Some(k), _) => (g.key.union_with(&k.literal_type().generalize(limits), limits), false),
                    (None, Some(k)) => (g.key.union_with(&k.generalize(limits), limits), false),
                };
                vec![TypeAtom::GenericArray(GenericArray {
                    key: Box::new(new_key),
                    value: Box::new(g.value.union_with(assigned, limits)),
                    non_empty: true,
                    is_list,
                })]
            }
            // strings accept single-character writes; objects may be ArrayAccess
            other => vec![other.clone()],
        })
    }

    /// Remove the atoms of `other` (and `null` if `other` is nullable).
    /// Purely structural: subclass relations are handled by `core::cast`.
    pub fn subtract(&self, other: &UnionType) -> UnionType {
        if other.is_mixed() {
            let nullable = self.nullable && !other.nullable;
            return Self { atoms: SmallVec::new(), nullable, has_assoc_keys: false };
        }
        let removed_kinds: Vec<ScalarKind> = other
            .atoms
            .iter()
            .filter_map(|a| match a {
                TypeAtom::Scalar(k) => Some(*k),
                _ => None,
            })
            .collect();
        let atoms = self
            .atoms
            .iter()
            .filter(|a| !other.atoms.contains(a))
            .filter(|a| !matches!(a, TypeAtom::Literal(v) if removed_kinds.contains(&v.kind())))
            .cloned()
            .collect();
        Self::normalize(atoms, self.nullable && !other.nullable, TypeLimits::default())
    }

    /// Remove offset `key` from every shape (`unset($a['k'])`)
    pub fn without_offset(&self, key: &ArrayKey) -> UnionType {
        self.map_atoms(TypeLimits::default(), |atom| match atom {
            TypeAtom::ArrayShape(shape) => TypeAtom::ArrayShape(shape.without_field(key)),
            TypeAtom::GenericArray(g) => TypeAtom::GenericArray(GenericArray { non_empty: false, is_list: false, ..g.clone() }),
            other => other.clone(),
        })
    }
}

fn merge_generic(a: &GenericArray, b: &GenericArray, limits: TypeLimits) -> GenericArray {
    GenericArray {
        key: Box::new(a.key.union_with(&b.key, limits)),
        value: Box::new(a.value.union_with(&b.value, limits)),
        non_empty: a.non_empty && b.non_empty,
        is_list: a.is_list && b.is_list,
    }
}

impl PartialEq for UnionType {
    fn eq(&self, other: &Self) -> bool {
        self.nullable == other.nullable
            && self.atoms.len() == other.atoms.len()
            && self.atoms.iter().all(|a| other.atoms.contains(a))
    }
}

impl Eq for UnionType {}

impl fmt::Display for UnionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_mixed() {
            return if self.nullable { write!(f, "mixed") } else { write!(f, "non-null-mixed") };
        }
        match (self.atoms.as_slice(), self.nullable) {
            ([], true) => write!(f, "null"),
            ([], false) => write!(f, "never"),
            ([single], true) => write!(f, "?{}", single),
            (atoms, nullable) => {
                let mut parts: Vec<String> = atoms.iter().map(|a| a.to_string()).collect();
                if nullable {
                    parts.push("null".to_string());
                }
                write!(f, "{}", parts.join("|"))
            }
        }
    }
}

impl Serialize for UnionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_is_order_insensitive() {
        let a = UnionType::int().union(&UnionType::string());
        let b = UnionType::string().union(&UnionType::int());
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "int|string");
    }

    #[test]
    fn test_mixed_absorbs_everything() {
        let u = UnionType::int().union(&UnionType::non_null_mixed());
        assert_eq!(u.atoms().len(), 1);
        assert!(u.is_mixed());
        assert!(!u.is_nullable());
        assert_eq!(u.with_null().to_string(), "mixed");
    }

    #[test]
    fn test_literals_subsumed_and_fanout() {
        let u = UnionType::literal_int(1).union(&UnionType::int());
        assert_eq!(u, UnionType::int());

        let limits = TypeLimits { literal_fanout: 3, max_shape_fields: 64 };
        let u = UnionType::union_all((0..3).map(UnionType::literal_int), limits);
        assert_eq!(u, UnionType::int());

        let u = UnionType::union_all((0..2).map(UnionType::literal_int), limits);
        assert_eq!(u.atoms().len(), 2);
    }

    #[test]
    fn test_true_false_is_bool() {
        let u = UnionType::literal_bool(true).union(&UnionType::literal_bool(false));
        assert_eq!(u, UnionType::bool());
    }

    #[test]
    fn test_never_only_alone() {
        let u = UnionType::never().union(&UnionType::int());
        assert_eq!(u, UnionType::int());
        assert!(UnionType::never().is_never());
        assert!(UnionType::empty().is_empty());
        assert!(!UnionType::null().is_empty());
    }

    #[test]
    fn test_truthiness_projections() {
        let u = UnionType::from_atoms(
            [TypeAtom::Scalar(ScalarKind::Int), TypeAtom::Scalar(ScalarKind::Bool)],
            true,
        );
        assert_eq!(u.non_falsey().to_string(), "int|true");
        assert_eq!(u.non_truthy().to_string(), "0|false|null");

        let s = UnionType::string().non_truthy();
        assert_eq!(s.to_string(), "''|'0'");

        let obj = UnionType::instance(Fqsen::new("Foo")).with_null();
        assert_eq!(obj.non_truthy(), UnionType::null());
        assert_eq!(obj.non_falsey(), UnionType::instance(Fqsen::new("Foo")));

        let xml = UnionType::instance(Fqsen::new("SimpleXMLElement"));
        assert_eq!(xml.non_truthy(), xml);
    }

    #[test]
    fn test_array_truthiness() {
        let arr = UnionType::list_of(UnionType::int());
        assert_eq!(arr.non_falsey().to_string(), "non-empty-list<int>");
        assert_eq!(arr.non_truthy(), UnionType::empty_array());
        assert!(UnionType::empty_array().non_falsey().is_empty());
    }

    #[test]
    fn test_offset_assignment_builds_shapes() {
        let limits = TypeLimits::default();
        let a = UnionType::empty_array()
            .with_offset_assigned(None, None, &UnionType::literal_int(1), limits)
            .with_offset_assigned(Some(ArrayKey::String(Arc::from("k"))), None, &UnionType::string(), limits);
        assert_eq!(a.to_string(), "array{0:1,k:string}");
        assert!(a.has_assoc_keys());
        assert_eq!(a.offset_type(Some(&ArrayKey::Int(0)), limits), UnionType::literal_int(1));
    }

    #[test]
    fn test_generic_subsumption() {
        let a = UnionType::list_of(UnionType::int());
        let b = a.non_falsey();
        assert_eq!(a.union(&b), a);
    }

    #[test]
    fn test_generalize_merges_arrays() {
        let limits = TypeLimits::default();
        let one = UnionType::empty_array().with_offset_assigned(None, None, &UnionType::literal_int(1), limits);
        let two = one.with_offset_assigned(None, None, &UnionType::literal_int(1), limits);
        let u = UnionType::empty_array().union(&one).union(&two);
        assert_eq!(u.generalize(limits).to_string(), "list<int>");
    }
}
